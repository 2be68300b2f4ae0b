//! Connection and listener observers
//!
//! `indy_agent_connect` and `indy_agent_listen` complete once like any other
//! call, but afterwards keep calling back for every incoming message or
//! connection. Those callbacks carry a connection or listener handle instead
//! of a command handle, so they bypass the registry: each handle owns an
//! inbox here and the trampolines below push into it.
//!
//! An event may arrive before the caller has seen the handle it belongs to,
//! for example a first message sent right after the connect callback. It is
//! buffered in an inbox created on demand and handed over when the handle is
//! attached.

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::marshal::copy_c_str;
use crate::ffi::types::Field;
use crate::status;
use std::collections::HashMap;
use std::os::raw::c_char;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// `(connection_handle, err, message)`
pub type MessageCallback = extern "C" fn(i32, i32, *const c_char);

/// `(listener_handle, err, connection_handle, sender_did, receiver_did)`
pub type ConnectionCallback = extern "C" fn(i32, i32, i32, *const c_char, *const c_char);

struct Inbox<T> {
    sender: UnboundedSender<T>,
    /// Present until someone attaches to the handle
    buffered: Option<UnboundedReceiver<T>>,
}

struct Inboxes<T> {
    by_handle: HashMap<i32, Inbox<T>>,
}

impl<T> Inboxes<T> {
    fn new() -> Self {
        Self {
            by_handle: HashMap::new(),
        }
    }

    fn push(&mut self, handle: i32, event: T) {
        let inbox = self.by_handle.entry(handle).or_insert_with(|| {
            let (sender, receiver) = unbounded_channel();
            Inbox {
                sender,
                buffered: Some(receiver),
            }
        });

        if inbox.sender.send(event).is_err() {
            debug!(handle, "Observer dropped; event discarded");
        }
    }

    fn attach(&mut self, handle: i32) -> UnboundedReceiver<T> {
        if let Some(receiver) = self
            .by_handle
            .get_mut(&handle)
            .and_then(|inbox| inbox.buffered.take())
        {
            return receiver;
        }

        let (sender, receiver) = unbounded_channel();
        self.by_handle.insert(
            handle,
            Inbox {
                sender,
                buffered: None,
            },
        );
        receiver
    }

    fn forget(&mut self, handle: i32) -> bool {
        self.by_handle.remove(&handle).is_some()
    }
}

static MESSAGES: OnceLock<Mutex<Inboxes<BridgeResult<String>>>> = OnceLock::new();

static CONNECTIONS: OnceLock<Mutex<Inboxes<BridgeResult<IncomingConnection>>>> = OnceLock::new();

fn messages() -> MutexGuard<'static, Inboxes<BridgeResult<String>>> {
    MESSAGES
        .get_or_init(|| Mutex::new(Inboxes::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn connections() -> MutexGuard<'static, Inboxes<BridgeResult<IncomingConnection>>> {
    CONNECTIONS
        .get_or_init(|| Mutex::new(Inboxes::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// An open agent connection and the messages arriving on it
#[derive(Debug)]
pub struct Connection {
    handle: i32,
    messages: UnboundedReceiver<BridgeResult<String>>,
}

impl Connection {
    pub(crate) fn attach(handle: i32) -> Self {
        Self {
            handle,
            messages: messages().attach(handle),
        }
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the connection has been closed and every buffered
    /// message was read.
    pub async fn next_message(&mut self) -> Option<BridgeResult<String>> {
        self.messages.recv().await
    }

    /// The next message, if one is already waiting
    pub fn try_next_message(&mut self) -> Option<BridgeResult<String>> {
        self.messages.try_recv().ok()
    }
}

/// A connection accepted by a listener
#[derive(Debug)]
pub struct IncomingConnection {
    pub connection: Connection,
    pub sender_did: String,
    pub receiver_did: String,
}

/// A listening endpoint and the connections it accepts
#[derive(Debug)]
pub struct Listener {
    handle: i32,
    connections: UnboundedReceiver<BridgeResult<IncomingConnection>>,
}

impl Listener {
    pub(crate) fn attach(handle: i32) -> Self {
        Self {
            handle,
            connections: connections().attach(handle),
        }
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Wait for the next accepted connection
    ///
    /// Returns `None` once the listener has been closed and every buffered
    /// connection was read.
    pub async fn next_connection(&mut self) -> Option<BridgeResult<IncomingConnection>> {
        self.connections.recv().await
    }

    pub fn try_next_connection(&mut self) -> Option<BridgeResult<IncomingConnection>> {
        self.connections.try_recv().ok()
    }
}

/// Stop observing a connection; its `Connection` drains and then ends
pub(crate) fn forget_connection(handle: i32) -> bool {
    messages().forget(handle)
}

/// Stop observing a listener; its `Listener` drains and then ends
pub(crate) fn forget_listener(handle: i32) -> bool {
    connections().forget(handle)
}

/// Whether messages for `handle` are being observed or buffered
pub fn is_observed_connection(handle: i32) -> bool {
    messages().by_handle.contains_key(&handle)
}

/// Whether connections for `handle` are being observed or buffered
pub fn is_observed_listener(handle: i32) -> bool {
    connections().by_handle.contains_key(&handle)
}

/// Copy a string the native side lends for the duration of a callback
///
/// # Safety
///
/// `ptr` must be null or a NUL-terminated string valid for this call.
unsafe fn owned_string(ptr: *const c_char) -> BridgeResult<String> {
    Field::Str(copy_c_str(ptr))
        .into_string()
        .map_err(BridgeError::Marshal)
}

pub(crate) extern "C" fn message_callback(connection_handle: i32, err: i32, message: *const c_char) {
    trace!(connection = connection_handle, err, "Agent message");
    let event = status::translate(err)
        .map_err(BridgeError::AsynchronousFailure)
        // Safety: the native side keeps `message` alive for the duration of the callback
        .and_then(|()| unsafe { owned_string(message) });
    messages().push(connection_handle, event);
}

pub(crate) extern "C" fn connection_callback(
    listener_handle: i32,
    err: i32,
    connection_handle: i32,
    sender_did: *const c_char,
    receiver_did: *const c_char,
) {
    trace!(
        listener = listener_handle,
        connection = connection_handle,
        err,
        "Agent connection"
    );
    let event = status::translate(err)
        .map_err(BridgeError::AsynchronousFailure)
        .and_then(|()| {
            let sender_did = unsafe { owned_string(sender_did) }?;
            let receiver_did = unsafe { owned_string(receiver_did) }?;
            Ok(IncomingConnection {
                connection: Connection::attach(connection_handle),
                sender_did,
                receiver_did,
            })
        });
    connections().push(listener_handle, event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::CString;

    // Handles are process-wide; each test uses its own range.

    fn send_message(connection: i32, err: i32, message: Option<&str>) {
        let message = message.map(|m| CString::new(m).unwrap());
        let ptr = message.as_ref().map_or(std::ptr::null(), |m| m.as_ptr());
        message_callback(connection, err, ptr);
    }

    #[test]
    fn test_messages_before_attach_are_buffered() {
        send_message(-1001, 0, Some("early"));
        let mut connection = Connection::attach(-1001);
        send_message(-1001, 0, Some("late"));

        assert_eq!(connection.try_next_message().unwrap().unwrap(), "early");
        assert_eq!(connection.try_next_message().unwrap().unwrap(), "late");
        assert!(connection.try_next_message().is_none());
        assert!(forget_connection(-1001));
    }

    #[test]
    fn test_message_failures_are_delivered() {
        let mut connection = Connection::attach(-1101);
        send_message(-1101, 112, None);
        send_message(-1101, 0, None);

        let failure = connection.try_next_message().unwrap().unwrap_err();
        assert_eq!(failure.native_code(), Some(112));
        assert!(matches!(
            connection.try_next_message(),
            Some(Err(BridgeError::Marshal(_)))
        ));
        forget_connection(-1101);
    }

    #[test]
    fn test_forget_ends_the_stream() {
        let mut connection = Connection::attach(-1201);
        send_message(-1201, 0, Some("last"));
        assert!(forget_connection(-1201));
        assert!(!is_observed_connection(-1201));

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            assert_eq!(connection.next_message().await.unwrap().unwrap(), "last");
            assert!(connection.next_message().await.is_none());
        });
    }

    #[test]
    fn test_dropped_connection_discards_messages() {
        let connection = Connection::attach(-1301);
        drop(connection);
        send_message(-1301, 0, Some("nobody listens"));
        assert!(is_observed_connection(-1301));
        assert!(forget_connection(-1301));
    }

    #[test]
    fn test_incoming_connection_attaches_its_messages() {
        let mut listener = Listener::attach(-1401);
        let (sender, receiver) = (
            CString::new("Th7MpTaRZVRYnPiabds81Y").unwrap(),
            CString::new("V4SGRU86Z58d6TV7PBUe6f").unwrap(),
        );

        connection_callback(-1401, 0, -1402, sender.as_ptr(), receiver.as_ptr());
        send_message(-1402, 0, Some("hi"));

        let mut incoming = listener.try_next_connection().unwrap().unwrap();
        assert_eq!(incoming.connection.handle(), -1402);
        assert_eq!(incoming.sender_did, "Th7MpTaRZVRYnPiabds81Y");
        assert_eq!(incoming.receiver_did, "V4SGRU86Z58d6TV7PBUe6f");
        assert_eq!(incoming.connection.try_next_message().unwrap().unwrap(), "hi");

        forget_connection(-1402);
        assert!(forget_listener(-1401));
    }

    #[test]
    fn test_failed_connection_attaches_nothing() {
        let mut listener = Listener::attach(-1501);
        connection_callback(-1501, 0, -1502, std::ptr::null(), std::ptr::null());

        assert!(matches!(
            listener.try_next_connection(),
            Some(Err(BridgeError::Marshal(_)))
        ));
        assert!(!is_observed_connection(-1502));
        forget_listener(-1501);
    }
}
