//! Callback registry
//!
//! Maps correlation tokens to pending calls. Each pending call owns the
//! sending half of a oneshot channel; the caller holds the receiving half in a
//! `CallHandle`. A call leaves the map exactly once, through `resolve`,
//! `discard`, or `sweep`, and its token is then remembered in a bounded
//! tombstone window so a repeated callback is reported as `AlreadyResolved`.
//!
//! Tokens are allocated process-wide by `dispatch`, because native callbacks
//! carry nothing but the token. A token stays reserved until it leaves the
//! tombstone window or its registry is dropped.

use crate::dispatch;
use crate::ffi::types::Field;
use crate::status::Outcome;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Default number of settled tokens remembered per registry
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = indy_config::settings::DEFAULT_TOMBSTONE_CAPACITY;

/// Outcome as delivered by a trampoline, before shape decoding
pub type RawOutcome = Outcome<Vec<Field>>;

/// Opaque handle matching a callback to the call that triggered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(i32);

impl CorrelationToken {
    pub fn from_raw(raw: i32) -> Self {
        CorrelationToken(raw)
    }

    /// Value passed to the native library as the command handle
    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry invariant violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no pending call for token {0}")]
    UnknownToken(CorrelationToken),

    #[error("call {0} was already settled")]
    AlreadyResolved(CorrelationToken),
}

impl RegistryError {
    pub fn token(&self) -> CorrelationToken {
        match self {
            RegistryError::UnknownToken(token) | RegistryError::AlreadyResolved(token) => *token,
        }
    }
}

/// How a call left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// A callback delivered its outcome
    Resolved,
    /// The native call failed synchronously; no callback will come
    Rejected,
    /// Reclaimed after the caller stopped waiting; the first late callback
    /// is accepted and turns this into `Resolved`
    Swept,
}

struct PendingCall {
    sender: oneshot::Sender<RawOutcome>,
    registered_at: Instant,
}

#[derive(Default)]
struct Entries {
    pending: HashMap<CorrelationToken, PendingCall>,
    settled: HashMap<CorrelationToken, Settled>,
    /// Settle order, oldest first
    tombstones: VecDeque<CorrelationToken>,
}

impl Entries {
    /// Record a settled token; returns tokens pushed out of the window
    fn settle(
        &mut self,
        token: CorrelationToken,
        how: Settled,
        capacity: usize,
    ) -> Vec<CorrelationToken> {
        self.settled.insert(token, how);
        self.tombstones.push_back(token);

        let mut evicted = Vec::new();
        while self.tombstones.len() > capacity {
            if let Some(old) = self.tombstones.pop_front() {
                self.settled.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }
}

/// Table of outstanding native calls
///
/// Safe to share across threads; every operation takes the single internal
/// lock once. Constructed behind an `Arc` because trampolines reach it through
/// a weak route.
pub struct Registry {
    entries: Mutex<Entries>,
    faults: Mutex<Vec<RegistryError>>,
    tombstone_capacity: usize,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Self::with_tombstone_capacity(DEFAULT_TOMBSTONE_CAPACITY)
    }

    /// A registry remembering up to `capacity` settled tokens (at least one)
    pub fn with_tombstone_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Entries::default()),
            faults: Mutex::new(Vec::new()),
            tombstone_capacity: capacity.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending call
    pub fn register(self: &Arc<Self>) -> (CorrelationToken, CallHandle) {
        let token = dispatch::claim(Arc::downgrade(self));
        let (sender, receiver) = oneshot::channel();

        self.lock().pending.insert(
            token,
            PendingCall {
                sender,
                registered_at: Instant::now(),
            },
        );

        trace!(token = token.as_raw(), "Registered pending call");
        (token, CallHandle { token, receiver })
    }

    /// Deliver an outcome to the pending call and remove it
    ///
    /// A caller that already stopped waiting is not an error: the outcome is
    /// dropped and the entry is still freed.
    pub fn resolve(&self, token: CorrelationToken, outcome: RawOutcome) -> Result<(), RegistryError> {
        let (call, evicted) = {
            let mut entries = self.lock();
            match entries.pending.remove(&token) {
                Some(call) => {
                    let evicted = entries.settle(token, Settled::Resolved, self.tombstone_capacity);
                    (call, evicted)
                }
                None => {
                    return match entries.settled.get_mut(&token) {
                        Some(how) if *how == Settled::Swept => {
                            // The one callback a swept call was still owed
                            *how = Settled::Resolved;
                            debug!(token = token.as_raw(), "Late callback for swept call ignored");
                            Ok(())
                        }
                        Some(_) => Err(RegistryError::AlreadyResolved(token)),
                        None => Err(RegistryError::UnknownToken(token)),
                    };
                }
            }
        };

        dispatch::release(evicted);

        if call.sender.send(outcome).is_err() {
            debug!(token = token.as_raw(), "Caller stopped waiting; result dropped");
        }
        Ok(())
    }

    /// Remove a call whose native function failed synchronously
    ///
    /// The caller's handle observes `None`.
    pub fn discard(&self, token: CorrelationToken) -> Result<(), RegistryError> {
        let (call, evicted) = {
            let mut entries = self.lock();
            match entries.pending.remove(&token) {
                Some(call) => {
                    let evicted = entries.settle(token, Settled::Rejected, self.tombstone_capacity);
                    (call, evicted)
                }
                None if entries.settled.contains_key(&token) => {
                    return Err(RegistryError::AlreadyResolved(token))
                }
                None => return Err(RegistryError::UnknownToken(token)),
            }
        };

        dispatch::release(evicted);
        drop(call);
        Ok(())
    }

    /// Reclaim calls nobody awaits any more
    ///
    /// Only entries whose handle was dropped or closed, and that are at least
    /// `older_than` old, are removed. Returns the number removed.
    pub fn sweep(&self, older_than: Duration) -> usize {
        let mut evicted = Vec::new();
        let swept = {
            let mut entries = self.lock();
            let stale: Vec<CorrelationToken> = entries
                .pending
                .iter()
                .filter(|(_, call)| {
                    call.sender.is_closed() && call.registered_at.elapsed() >= older_than
                })
                .map(|(token, _)| *token)
                .collect();

            for token in &stale {
                entries.pending.remove(token);
                evicted.extend(entries.settle(*token, Settled::Swept, self.tombstone_capacity));
            }
            stale.len()
        };

        dispatch::release(evicted);

        if swept > 0 {
            debug!(swept, "Swept abandoned calls");
        }
        swept
    }

    /// Number of pending calls
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn is_pending(&self, token: CorrelationToken) -> bool {
        self.lock().pending.contains_key(&token)
    }

    /// How a recently settled token left the registry
    pub fn settled(&self, token: CorrelationToken) -> Option<Settled> {
        self.lock().settled.get(&token).copied()
    }

    pub fn tombstone_capacity(&self) -> usize {
        self.tombstone_capacity
    }

    pub(crate) fn record_fault(&self, fault: RegistryError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault);
    }

    /// Drain the faults detected on the callback path
    pub fn take_faults(&self) -> Vec<RegistryError> {
        std::mem::take(&mut *self.faults.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        let tokens: Vec<CorrelationToken> = entries
            .pending
            .keys()
            .chain(entries.tombstones.iter())
            .copied()
            .collect();
        if !entries.pending.is_empty() {
            debug!(abandoned = entries.pending.len(), "Registry dropped with pending calls");
        }
        dispatch::release(tokens);
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        f.debug_struct("Registry")
            .field("pending", &entries.pending.len())
            .field("tombstones", &entries.tombstones.len())
            .field("tombstone_capacity", &self.tombstone_capacity)
            .finish()
    }
}

/// The caller's side of a pending call
///
/// Resolves to `Some(outcome)` once, or `None` if the call was discarded or
/// its registry went away.
#[derive(Debug)]
pub struct CallHandle {
    token: CorrelationToken,
    receiver: oneshot::Receiver<RawOutcome>,
}

impl CallHandle {
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    /// Take the outcome if it has already arrived
    pub fn try_take(&mut self) -> Option<RawOutcome> {
        self.receiver.try_recv().ok()
    }

    /// Stop waiting; a later resolve is dropped and the entry becomes sweepable
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Future for CallHandle {
    type Output = Option<RawOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}
