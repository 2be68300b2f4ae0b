//! Registry properties
//!
//! Resolve-once, token uniqueness, and delivery to the right caller under
//! arbitrary completion orders and concurrent access.

use indy_bridge::ffi::Field;
use indy_bridge::{CorrelationToken, NativeError, RawOutcome, Registry, RegistryError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use std::collections::HashSet;
use std::ffi::CString;
use std::sync::Arc;
use std::thread;

fn payload(index: usize) -> RawOutcome {
    Ok(vec![
        Field::Int(index as i32),
        Field::Str(Some(CString::new(format!("payload-{}", index)).unwrap())),
    ])
}

// ===== Properties =====

proptest! {
    #[test]
    fn prop_any_completion_order_reaches_the_issuer(
        order in (1usize..48).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let registry = Registry::new();
        let mut calls: Vec<_> = (0..order.len()).map(|_| registry.register()).collect();

        for &index in &order {
            prop_assert!(registry.resolve(calls[index].0, payload(index)).is_ok());
        }

        prop_assert!(registry.is_empty());
        for (index, (_, handle)) in calls.iter_mut().enumerate() {
            prop_assert_eq!(handle.try_take(), Some(payload(index)));
        }
    }

    #[test]
    fn prop_only_the_first_resolve_succeeds(attempts in 1usize..6) {
        let registry = Registry::new();
        let (token, mut handle) = registry.register();

        let results: Vec<_> = (0..attempts)
            .map(|i| registry.resolve(token, payload(i)))
            .collect();

        prop_assert_eq!(&results[0], &Ok(()));
        for result in &results[1..] {
            prop_assert_eq!(result, &Err(RegistryError::AlreadyResolved(token)));
        }
        prop_assert_eq!(handle.try_take(), Some(payload(0)));
    }

    #[test]
    fn prop_pending_tokens_are_unique(count in 1usize..256) {
        let registry = Registry::new();
        let calls: Vec<_> = (0..count).map(|_| registry.register()).collect();
        let tokens: HashSet<CorrelationToken> = calls.iter().map(|(t, _)| *t).collect();
        prop_assert_eq!(tokens.len(), count);
        prop_assert_eq!(registry.len(), count);
    }
}

// ===== Unknown and settled tokens =====

#[rstest]
#[case(0)]
#[case(-1)]
#[case(i32::MIN)]
fn test_never_registered_token_is_unknown(#[case] raw: i32) {
    let registry = Registry::new();
    let token = CorrelationToken::from_raw(raw);
    assert_eq!(
        registry.resolve(token, Ok(Vec::new())),
        Err(RegistryError::UnknownToken(token))
    );
}

#[test]
fn test_token_of_another_registry_is_unknown() {
    let first = Registry::new();
    let second = Registry::new();
    let (token, _handle) = first.register();

    assert_eq!(
        second.resolve(token, Ok(Vec::new())),
        Err(RegistryError::UnknownToken(token))
    );
    assert!(first.is_pending(token));
}

#[test]
fn test_round_trip_payload_is_structurally_equal() {
    let registry = Registry::new();
    let (token, mut handle) = registry.register();

    registry.resolve(token, payload(7)).unwrap();

    assert_eq!(handle.try_take(), Some(payload(7)));
}

#[test]
fn test_failure_outcome_round_trip() {
    let registry = Registry::new();
    let (token, mut handle) = registry.register();

    registry.resolve(token, Err(NativeError::new(206))).unwrap();

    assert_eq!(handle.try_take(), Some(Err(NativeError::new(206))));
}

// ===== Concurrency =====

#[test]
fn test_concurrent_register_and_resolve() {
    let registry = Registry::new();
    let threads = 8;
    let per_thread = 200;

    let workers: Vec<_> = (0..threads)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut delivered = 0;
                for i in 0..per_thread {
                    let index = t * per_thread + i;
                    let (token, mut handle) = registry.register();
                    let resolver = Arc::clone(&registry);
                    thread::spawn(move || resolver.resolve(token, payload(index)))
                        .join()
                        .unwrap()
                        .unwrap();
                    if handle.try_take() == Some(payload(index)) {
                        delivered += 1;
                    }
                }
                delivered
            })
        })
        .collect();

    let delivered: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(delivered, threads * per_thread);
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_awaiting_tasks_receive_their_own_outcomes() {
    let registry = Registry::new();
    let calls: Vec<_> = (0..64).map(|_| registry.register()).collect();

    let mut waiters = Vec::new();
    let mut tokens = Vec::new();
    for (index, (token, handle)) in calls.into_iter().enumerate() {
        tokens.push((index, token));
        waiters.push(tokio::spawn(async move { (index, handle.await) }));
    }

    let resolver = Arc::clone(&registry);
    thread::spawn(move || {
        for (index, token) in tokens.into_iter().rev() {
            resolver.resolve(token, payload(index)).unwrap();
        }
    })
    .join()
    .unwrap();

    for waiter in waiters {
        let (index, outcome) = waiter.await.unwrap();
        assert_eq!(outcome, Some(payload(index)));
    }
    assert!(registry.is_empty());
}
