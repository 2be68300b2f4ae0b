//! Callback routing
//!
//! A native callback carries only its command handle, so trampolines cannot be
//! bound to a registry. This module allocates tokens for every registry in
//! the process and remembers which registry owns each one; `complete` uses
//! that route to deliver a trampoline's outcome.

use crate::registry::{CorrelationToken, RawOutcome, Registry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::error;

struct Routes {
    next: i32,
    owners: HashMap<CorrelationToken, Weak<Registry>>,
}

static ROUTES: OnceLock<Mutex<Routes>> = OnceLock::new();

static UNROUTED: AtomicU64 = AtomicU64::new(0);

fn routes() -> MutexGuard<'static, Routes> {
    ROUTES
        .get_or_init(|| {
            Mutex::new(Routes {
                next: 1,
                owners: HashMap::new(),
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Allocate a token not routed to any registry and route it to `owner`
///
/// Tokens count up from 1 and wrap from `i32::MAX` back to 1.
pub(crate) fn claim(owner: Weak<Registry>) -> CorrelationToken {
    let mut routes = routes();
    loop {
        let token = CorrelationToken::from_raw(routes.next);
        routes.next = if routes.next == i32::MAX {
            1
        } else {
            routes.next + 1
        };

        if !routes.owners.contains_key(&token) {
            routes.owners.insert(token, owner);
            return token;
        }
    }
}

/// Make tokens available for reuse
pub(crate) fn release(tokens: impl IntoIterator<Item = CorrelationToken>) {
    let mut tokens = tokens.into_iter().peekable();
    if tokens.peek().is_none() {
        return;
    }

    let mut routes = routes();
    for token in tokens {
        routes.owners.remove(&token);
    }
}

/// Deliver a trampoline's outcome to the registry that owns the token
///
/// Never fails: a registry fault is logged and recorded on that registry, and
/// a token nobody owns is logged and counted.
pub fn complete(command_handle: i32, outcome: RawOutcome) {
    let token = CorrelationToken::from_raw(command_handle);
    let owner = routes().owners.get(&token).and_then(Weak::upgrade);

    match owner {
        Some(registry) => {
            if let Err(fault) = registry.resolve(token, outcome) {
                error!(token = command_handle, %fault, "Registry fault on native callback");
                registry.record_fault(fault);
            }
        }
        None => {
            UNROUTED.fetch_add(1, Ordering::Relaxed);
            error!(token = command_handle, "Native callback for a token no registry owns");
        }
    }
}

/// Number of callbacks that arrived for tokens no registry owns
pub fn unrouted_callbacks() -> u64 {
    UNROUTED.load(Ordering::Relaxed)
}

/// Number of tokens currently reserved, across all registries
pub fn routed_tokens() -> usize {
    routes().owners.len()
}
