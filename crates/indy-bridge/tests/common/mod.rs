//! Simulated native library shared by the integration tests
//!
//! Every mock follows the native calling convention
//! `fn(command_handle, args..., callback) -> status`. They differ in when and
//! how the callback fires: immediately, from another thread, never, twice, or
//! later on demand through `fire`.

#![allow(dead_code)]

use indy_bridge::ffi::SymbolTable;
use indy_bridge::CorrelationToken;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

pub type StringCallback = extern "C" fn(i32, i32, *const c_char);
pub type UnitCallback = extern "C" fn(i32, i32);

struct Deferred {
    handle: i32,
    name: String,
    callback: StringCallback,
}

/// Calls accepted by `mock_deferred` whose callback has not fired yet
static DEFERRED: Mutex<Vec<Deferred>> = Mutex::new(Vec::new());

/// Callbacks already fired through `fire`, by command handle
static FIRED: Mutex<Vec<(i32, StringCallback)>> = Mutex::new(Vec::new());

fn arg(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Accepts the call and parks its callback until `fire`
pub extern "C" fn mock_deferred(handle: i32, name: *const c_char, cb: StringCallback) -> i32 {
    DEFERRED.lock().unwrap().push(Deferred {
        handle,
        name: arg(name),
        callback: cb,
    });
    0
}

/// Refuses the call with CommonInvalidParam1; the callback never fires
pub extern "C" fn mock_reject(_handle: i32, _name: *const c_char, _cb: StringCallback) -> i32 {
    100
}

/// Fires the callback before returning
pub extern "C" fn mock_immediate(handle: i32, name: *const c_char, cb: StringCallback) -> i32 {
    let reply = CString::new(format!("echo:{}", arg(name))).unwrap();
    cb(handle, 0, reply.as_ptr());
    0
}

/// Fires the callback from a freshly spawned thread
pub extern "C" fn mock_threaded(handle: i32, name: *const c_char, cb: StringCallback) -> i32 {
    let name = arg(name);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        let reply = CString::new(format!("from-thread:{}", name)).unwrap();
        cb(handle, 0, reply.as_ptr());
    });
    0
}

/// Fires the callback twice
pub extern "C" fn mock_double_fire(handle: i32, name: *const c_char, cb: StringCallback) -> i32 {
    let first = CString::new(format!("first:{}", arg(name))).unwrap();
    let second = CString::new("second").unwrap();
    cb(handle, 0, first.as_ptr());
    cb(handle, 0, second.as_ptr());
    0
}

/// Fires the callback and then reports a synchronous failure anyway
pub extern "C" fn mock_fire_then_reject(
    handle: i32,
    _name: *const c_char,
    cb: StringCallback,
) -> i32 {
    let reply = CString::new("ignored").unwrap();
    cb(handle, 0, reply.as_ptr());
    113
}

/// Accepts the call and reports LedgerInvalidTransaction through the callback
pub extern "C" fn mock_async_failure(handle: i32, _name: *const c_char, cb: StringCallback) -> i32 {
    cb(handle, 304, std::ptr::null());
    0
}

/// Reports success with a null string
pub extern "C" fn mock_null_payload(handle: i32, _name: *const c_char, cb: StringCallback) -> i32 {
    cb(handle, 0, std::ptr::null());
    0
}

/// Unit-shaped call that completes immediately
pub extern "C" fn mock_unit(handle: i32, cb: UnitCallback) -> i32 {
    cb(handle, 0);
    0
}

/// Native library exposing every mock under its own name
pub fn mock_library() -> Arc<SymbolTable> {
    Arc::new(
        SymbolTable::new("mock-indy")
            .with("mock_deferred", mock_deferred as *const ())
            .with("mock_reject", mock_reject as *const ())
            .with("mock_immediate", mock_immediate as *const ())
            .with("mock_threaded", mock_threaded as *const ())
            .with("mock_double_fire", mock_double_fire as *const ())
            .with("mock_fire_then_reject", mock_fire_then_reject as *const ())
            .with("mock_async_failure", mock_async_failure as *const ())
            .with("mock_null_payload", mock_null_payload as *const ())
            .with("mock_unit", mock_unit as *const ()),
    )
}

/// Fire the parked callback for `token` with `err` and `payload`
///
/// Panics if no deferred call holds that token.
pub fn fire(token: CorrelationToken, err: i32, payload: Option<&str>) {
    let deferred = {
        let mut parked = DEFERRED.lock().unwrap();
        let index = parked
            .iter()
            .position(|d| d.handle == token.as_raw())
            .unwrap_or_else(|| panic!("no deferred call for {}", token));
        parked.remove(index)
    };

    FIRED
        .lock()
        .unwrap()
        .push((deferred.handle, deferred.callback));
    invoke_callback(deferred.callback, deferred.handle, err, payload);
}

/// Fire the callback of an already fired call once more, as a faulty
/// native library would
///
/// Panics if `fire` never fired that token.
pub fn fire_again(token: CorrelationToken, err: i32, payload: Option<&str>) {
    let callback = FIRED
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|(handle, _)| *handle == token.as_raw())
        .map(|(_, callback)| *callback)
        .unwrap_or_else(|| panic!("{} was never fired", token));
    invoke_callback(callback, token.as_raw(), err, payload);
}

fn invoke_callback(callback: StringCallback, handle: i32, err: i32, payload: Option<&str>) {
    let payload = payload.map(|p| CString::new(p).unwrap());
    let ptr = payload.as_ref().map_or(std::ptr::null(), |p| p.as_ptr());
    callback(handle, err, ptr);
}

/// Name argument the deferred call for `token` was made with
pub fn deferred_name(token: CorrelationToken) -> Option<String> {
    DEFERRED
        .lock()
        .unwrap()
        .iter()
        .find(|d| d.handle == token.as_raw())
        .map(|d| d.name.clone())
}

/// Number of deferred calls still parked
pub fn deferred_count() -> usize {
    DEFERRED.lock().unwrap().len()
}
