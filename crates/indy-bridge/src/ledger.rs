//! Ledger requests
//!
//! Thin typed wrappers over the `indy_*` ledger entry points. Every one of them
//! completes with a JSON string through a `(h, err, char*)` callback; the JSON
//! is passed through untouched.
//!
//! Handles (`pool_handle`, `wallet_handle`) come from the pool and wallet APIs
//! of the same native library.

use crate::bridge::Bridge;
use crate::error::BridgeResult;
use crate::ffi::StringResult;

/// Signs a request with the submitter's key and sends it to the pool.
///
/// Returns the pool's reply as JSON.
pub async fn sign_and_submit_request(
    bridge: &Bridge,
    pool_handle: i32,
    wallet_handle: i32,
    submitter_did: &str,
    request_json: &str,
) -> BridgeResult<String> {
    // Safety: (h, i32, i32, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_sign_and_submit_request", |ctx| {
            Ok((
                pool_handle,
                wallet_handle,
                ctx.c_str(submitter_did)?,
                ctx.c_str(request_json)?,
            ))
        })
    }
    .await
}

/// Sends an already signed request to the pool.
pub async fn submit_request(
    bridge: &Bridge,
    pool_handle: i32,
    request_json: &str,
) -> BridgeResult<String> {
    // Safety: (h, i32, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_submit_request", |ctx| {
            Ok((pool_handle, ctx.c_str(request_json)?))
        })
    }
    .await
}

/// Builds a GET_DDO request.
pub async fn build_get_ddo_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_ddo_request", |ctx| {
            Ok((ctx.c_str(submitter_did)?, ctx.c_str(target_did)?))
        })
    }
    .await
}

/// Builds a NYM request.
///
/// `verkey`, `alias` and `role` are optional and sent as null when absent.
pub async fn build_nym_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
    verkey: Option<&str>,
    alias: Option<&str>,
    role: Option<&str>,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, char*?, char*?, char*?, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_nym_request", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                ctx.c_str(target_did)?,
                ctx.opt_c_str(verkey)?,
                ctx.opt_c_str(alias)?,
                ctx.opt_c_str(role)?,
            ))
        })
    }
    .await
}

/// Builds an ATTRIB request. At least one of `hash`, `raw` or `enc` is
/// expected by the ledger; the bridge does not check.
pub async fn build_attrib_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
    hash: Option<&str>,
    raw: Option<&str>,
    enc: Option<&str>,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, char*?, char*?, char*?, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_attrib_request", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                ctx.c_str(target_did)?,
                ctx.opt_c_str(hash)?,
                ctx.opt_c_str(raw)?,
                ctx.opt_c_str(enc)?,
            ))
        })
    }
    .await
}

/// Builds a GET_ATTRIB request for attribute `data`.
pub async fn build_get_attrib_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
    data: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_attrib_request", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                ctx.c_str(target_did)?,
                ctx.c_str(data)?,
            ))
        })
    }
    .await
}

pub async fn build_get_nym_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_nym_request", |ctx| {
            Ok((ctx.c_str(submitter_did)?, ctx.c_str(target_did)?))
        })
    }
    .await
}

/// Builds a SCHEMA request; `data` holds name, version and attr_names.
pub async fn build_schema_request(
    bridge: &Bridge,
    submitter_did: &str,
    data: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_schema_request", |ctx| {
            Ok((ctx.c_str(submitter_did)?, ctx.c_str(data)?))
        })
    }
    .await
}

pub async fn build_get_schema_request(
    bridge: &Bridge,
    submitter_did: &str,
    dest: &str,
    data: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_schema_request", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                ctx.c_str(dest)?,
                ctx.c_str(data)?,
            ))
        })
    }
    .await
}

/// Builds a CLAIM_DEF transaction for the schema with sequence number `xref`.
pub async fn build_claim_def_txn(
    bridge: &Bridge,
    submitter_did: &str,
    xref: i32,
    signature_type: &str,
    data: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, i32, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_claim_def_txn", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                xref,
                ctx.c_str(signature_type)?,
                ctx.c_str(data)?,
            ))
        })
    }
    .await
}

pub async fn build_get_claim_def_txn(
    bridge: &Bridge,
    submitter_did: &str,
    xref: i32,
    signature_type: &str,
    origin: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, i32, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_claim_def_txn", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                xref,
                ctx.c_str(signature_type)?,
                ctx.c_str(origin)?,
            ))
        })
    }
    .await
}

/// Builds a NODE request.
pub async fn build_node_request(
    bridge: &Bridge,
    submitter_did: &str,
    target_did: &str,
    data: &str,
) -> BridgeResult<String> {
    // Safety: (h, char*, char*, char*, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_node_request", |ctx| {
            Ok((
                ctx.c_str(submitter_did)?,
                ctx.c_str(target_did)?,
                ctx.c_str(data)?,
            ))
        })
    }
    .await
}

/// Builds a GET_TXN request for ledger sequence number `seq_no`.
pub async fn build_get_txn_request(
    bridge: &Bridge,
    submitter_did: &str,
    seq_no: i32,
) -> BridgeResult<String> {
    // Safety: (h, char*, i32, cb(h, err, char*)) -> i32
    unsafe {
        bridge.call::<StringResult, _, _>("indy_build_get_txn_request", |ctx| {
            Ok((ctx.c_str(submitter_did)?, seq_no))
        })
    }
    .await
}
