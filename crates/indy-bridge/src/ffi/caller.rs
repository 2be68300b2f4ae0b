//! FFI function calling using direct function pointers
//!
//! Every native entry point has the shape
//! `fn(command_handle: i32, args..., callback) -> i32`. The argument list is a
//! tuple of primitive C values, so the call is a direct function pointer cast
//! chosen by the tuple's types; no dynamic FFI library is involved.

use std::os::raw::c_char;

mod private {
    pub trait Sealed {}
}

/// A primitive value that can be passed to a native entry point
pub trait NativeArg: private::Sealed + Copy {
    /// C type name for diagnostics
    const C_TYPE: &'static str;
}

macro_rules! native_arg {
    ($($ty:ty => $name:expr),+ $(,)?) => {
        $(
            impl private::Sealed for $ty {}
            impl NativeArg for $ty {
                const C_TYPE: &'static str = $name;
            }
        )+
    };
}

/// `c_char` is `i8` on some targets and `u8` on others (aarch64 Linux)
const CHAR_IS_SIGNED: bool = (c_char::MIN as i32) < 0;

// Whichever byte pointer `*const c_char` is on this target is the string
// pointer; the other is a plain byte pointer.
native_arg! {
    i32 => "c_int32",
    u32 => "c_uint32",
    u8 => "c_uint8",
    *const i8 => if CHAR_IS_SIGNED { "c_char_p" } else { "POINTER(c_int8)" },
    *const u8 => if CHAR_IS_SIGNED { "POINTER(c_uint8)" } else { "c_char_p" },
}

// Callbacks that travel as ordinary arguments, for entry points taking more
// than one
native_arg! {
    (extern "C" fn(i32, i32, i32)) => "CFUNCTYPE(c_int32,c_int32,c_int32)",
    (extern "C" fn(i32, i32, *const c_char)) => "CFUNCTYPE(c_int32,c_int32,c_char_p)",
    (extern "C" fn(i32, i32, i32, *const c_char, *const c_char)) =>
        "CFUNCTYPE(c_int32,c_int32,c_int32,c_char_p,c_char_p)",
}

/// The argument list of a native call
pub trait NativeArgs: Copy {
    /// Number of arguments between the command handle and the callback
    const ARITY: usize;

    /// C type names of the arguments, in order
    fn c_types() -> Vec<&'static str>;

    /// Call the entry point with these arguments
    ///
    /// # Safety
    ///
    /// `fn_ptr` must point to an `extern "C"` function whose parameters are
    /// exactly `(i32, Self..., C)` and whose return type is `i32`, and every
    /// pointer argument must be valid for the duration of the call.
    unsafe fn call<C: Copy>(self, fn_ptr: *const (), command_handle: i32, callback: C) -> i32;

    /// Call an entry point whose callbacks are already among the arguments
    ///
    /// # Safety
    ///
    /// `fn_ptr` must point to an `extern "C"` function whose parameters are
    /// exactly `(i32, Self...)` and whose return type is `i32`.
    unsafe fn call_plain(self, fn_ptr: *const (), command_handle: i32) -> i32;
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! native_args {
    ($($arg:ident),*) => {
        impl<$($arg: NativeArg),*> NativeArgs for ($($arg,)*) {
            const ARITY: usize = count!($($arg)*);

            fn c_types() -> Vec<&'static str> {
                vec![$($arg::C_TYPE),*]
            }

            #[allow(non_snake_case)]
            unsafe fn call<C: Copy>(
                self,
                fn_ptr: *const (),
                command_handle: i32,
                callback: C,
            ) -> i32 {
                let function: extern "C" fn(i32, $($arg,)* C) -> i32 =
                    std::mem::transmute_copy(&fn_ptr);
                let ($($arg,)*) = self;
                function(command_handle, $($arg,)* callback)
            }

            #[allow(non_snake_case)]
            unsafe fn call_plain(self, fn_ptr: *const (), command_handle: i32) -> i32 {
                let function: extern "C" fn(i32, $($arg,)*) -> i32 =
                    std::mem::transmute_copy(&fn_ptr);
                let ($($arg,)*) = self;
                function(command_handle, $($arg,)*)
            }
        }
    };
}

native_args!();
native_args!(A);
native_args!(A, B);
native_args!(A, B, C1);
native_args!(A, B, C1, D);
native_args!(A, B, C1, D, E);
native_args!(A, B, C1, D, E, F);
native_args!(A, B, C1, D, E, F, G);
native_args!(A, B, C1, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicI32, Ordering};

    static LAST_HANDLE: AtomicI32 = AtomicI32::new(0);

    extern "C" fn two_args(
        command_handle: i32,
        wallet: i32,
        name: *const c_char,
        _cb: extern "C" fn(i32, i32),
    ) -> i32 {
        LAST_HANDLE.store(command_handle, Ordering::SeqCst);
        let name = unsafe { CStr::from_ptr(name) }.to_str().unwrap();
        if name == "steward" {
            wallet
        } else {
            -1
        }
    }

    extern "C" fn no_args(command_handle: i32, cb: extern "C" fn(i32, i32)) -> i32 {
        cb(command_handle, 7);
        0
    }

    static CALLBACK_STATUS: AtomicI32 = AtomicI32::new(-1);

    extern "C" fn record_status(_command_handle: i32, err: i32) {
        CALLBACK_STATUS.store(err, Ordering::SeqCst);
    }

    #[test]
    fn test_arity_and_types() {
        assert_eq!(<() as NativeArgs>::ARITY, 0);
        assert_eq!(<(i32, *const c_char, u8) as NativeArgs>::ARITY, 3);
        assert_eq!(
            <(i32, *const c_char, u32) as NativeArgs>::c_types(),
            vec!["c_int32", "c_char_p", "c_uint32"]
        );
    }

    #[test]
    fn test_string_pointer_label_follows_c_char() {
        assert_eq!(<*const c_char as NativeArg>::C_TYPE, "c_char_p");

        let labels = [
            <*const i8 as NativeArg>::C_TYPE,
            <*const u8 as NativeArg>::C_TYPE,
        ];
        assert_eq!(labels.iter().filter(|l| **l == "c_char_p").count(), 1);
    }

    #[test]
    fn test_call_passes_handle_and_args() {
        let name = std::ffi::CString::new("steward").unwrap();
        let callback: extern "C" fn(i32, i32) = record_status;
        let status = unsafe {
            (12i32, name.as_ptr()).call(two_args as *const (), 41, callback)
        };
        assert_eq!(status, 12);
        assert_eq!(LAST_HANDLE.load(Ordering::SeqCst), 41);
    }

    extern "C" fn callback_in_the_middle(
        command_handle: i32,
        cb: extern "C" fn(i32, i32, i32),
        wallet: i32,
    ) -> i32 {
        cb(command_handle, 0, wallet);
        0
    }

    static MIDDLE_RESULT: AtomicI32 = AtomicI32::new(0);

    extern "C" fn record_handle(_command_handle: i32, _err: i32, handle: i32) {
        MIDDLE_RESULT.store(handle, Ordering::SeqCst);
    }

    #[test]
    fn test_call_plain_with_callback_argument() {
        let callback: extern "C" fn(i32, i32, i32) = record_handle;
        assert_eq!(
            <(extern "C" fn(i32, i32, i32), i32) as NativeArgs>::c_types(),
            vec!["CFUNCTYPE(c_int32,c_int32,c_int32)", "c_int32"]
        );

        let status = unsafe { (callback, 88i32).call_plain(callback_in_the_middle as *const (), 5) };
        assert_eq!(status, 0);
        assert_eq!(MIDDLE_RESULT.load(Ordering::SeqCst), 88);
    }

    #[test]
    fn test_call_without_args() {
        let callback: extern "C" fn(i32, i32) = record_status;
        let status = unsafe { ().call(no_args as *const (), 3, callback) };
        assert_eq!(status, 0);
        assert_eq!(CALLBACK_STATUS.load(Ordering::SeqCst), 7);
    }
}
