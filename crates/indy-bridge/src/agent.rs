//! Agent operations
//!
//! Connecting and listening complete once with the new handle. What follows
//! (incoming messages and connections) arrives through the observer callbacks
//! in `observers` and is read from the returned `Connection` or `Listener`.

use crate::bridge::Bridge;
use crate::error::BridgeResult;
use crate::ffi::{HandleResult, UnitResult};
use crate::observers::{self, ConnectionCallback, MessageCallback};

pub use crate::observers::{Connection, IncomingConnection, Listener};

/// Opens a connection from `sender_did` to `receiver_did`.
pub async fn agent_connect(
    bridge: &Bridge,
    pool_handle: i32,
    wallet_handle: i32,
    sender_did: &str,
    receiver_did: &str,
) -> BridgeResult<Connection> {
    // Safety: (h, i32, i32, char*, char*, cb(h, err, i32), msg_cb(c, err, char*)) -> i32
    let connection_handle = unsafe {
        bridge.call_with::<HandleResult, _, _>("indy_agent_connect", |ctx, on_connected| {
            Ok((
                pool_handle,
                wallet_handle,
                ctx.c_str(sender_did)?,
                ctx.c_str(receiver_did)?,
                on_connected,
                observers::message_callback as MessageCallback,
            ))
        })
    }
    .await?;

    Ok(Connection::attach(connection_handle))
}

/// Starts listening on `endpoint`.
pub async fn agent_listen(bridge: &Bridge, endpoint: &str) -> BridgeResult<Listener> {
    // Safety: (h, char*, cb(h, err, i32), conn_cb(l, err, i32, char*, char*),
    // msg_cb(c, err, char*)) -> i32
    let listener_handle = unsafe {
        bridge.call_with::<HandleResult, _, _>("indy_agent_listen", |ctx, on_listening| {
            Ok((
                ctx.c_str(endpoint)?,
                on_listening,
                observers::connection_callback as ConnectionCallback,
                observers::message_callback as MessageCallback,
            ))
        })
    }
    .await?;

    Ok(Listener::attach(listener_handle))
}

/// Adds `did` to the identities served by a listener.
pub async fn agent_add_identity(
    bridge: &Bridge,
    listener_handle: i32,
    pool_handle: i32,
    wallet_handle: i32,
    did: &str,
) -> BridgeResult<()> {
    // Safety: (h, i32, i32, i32, char*, cb(h, err, i32)) -> i32
    unsafe {
        bridge.call::<HandleResult, _, _>("indy_agent_add_identity", |ctx| {
            Ok((listener_handle, pool_handle, wallet_handle, ctx.c_str(did)?))
        })
    }
    .await
    .map(|_listener| ())
}

pub async fn agent_remove_identity(
    bridge: &Bridge,
    listener_handle: i32,
    wallet_handle: i32,
    did: &str,
) -> BridgeResult<()> {
    // Safety: (h, i32, i32, char*, cb(h, err, i32)) -> i32
    unsafe {
        bridge.call::<HandleResult, _, _>("indy_agent_remove_identity", |ctx| {
            Ok((listener_handle, wallet_handle, ctx.c_str(did)?))
        })
    }
    .await
    .map(|_listener| ())
}

/// Sends `message` over an open connection.
pub async fn agent_send(bridge: &Bridge, connection_handle: i32, message: &str) -> BridgeResult<()> {
    // Safety: (h, i32, char*, cb(h, err)) -> i32
    unsafe {
        bridge.call::<UnitResult, _, _>("indy_agent_send", |ctx| {
            Ok((connection_handle, ctx.c_str(message)?))
        })
    }
    .await
}

pub async fn agent_close_connection(bridge: &Bridge, connection_handle: i32) -> BridgeResult<()> {
    // Safety: (h, i32, cb(h, err)) -> i32
    unsafe {
        bridge.call::<UnitResult, _, _>("indy_agent_close_connection", |_| {
            Ok((connection_handle,))
        })
    }
    .await?;

    observers::forget_connection(connection_handle);
    Ok(())
}

pub async fn agent_close_listener(bridge: &Bridge, listener_handle: i32) -> BridgeResult<()> {
    // Safety: (h, i32, cb(h, err)) -> i32
    unsafe {
        bridge.call::<UnitResult, _, _>("indy_agent_close_listener", |_| Ok((listener_handle,)))
    }
    .await?;

    observers::forget_listener(listener_handle);
    Ok(())
}
