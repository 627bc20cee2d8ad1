// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The declared libcrypto symbols and thin safe wrappers over them.

use crate::{CryptoError, LibCryptoFn};
use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void, CStr};

// Raw object-pointer aliases; libcrypto types stay opaque on this side.
pub(crate) type Bio = *mut c_void;
pub(crate) type Pkcs7 = *mut c_void;
pub(crate) type X509 = *mut c_void;
pub(crate) type X509Store = *mut c_void;
pub(crate) type Stack = *mut c_void;

macro_rules! libcrypto_fn {
    ($ident:ident, $name:literal, $ty:ty) => {
        pub(crate) static $ident: LibCryptoFn<$ty> =
            LibCryptoFn::new($name, concat!($name, "\0").as_bytes());
    };
}

libcrypto_fn!(EVP_SHA256, "EVP_sha256", unsafe extern "C" fn() -> *const c_void);
libcrypto_fn!(
    EVP_DIGEST,
    "EVP_Digest",
    unsafe extern "C" fn(*const c_void, usize, *mut u8, *mut c_uint, *const c_void, *mut c_void) -> c_int
);

libcrypto_fn!(BIO_NEW_MEM_BUF, "BIO_new_mem_buf", unsafe extern "C" fn(*const c_void, c_int) -> Bio);
libcrypto_fn!(BIO_FREE, "BIO_free", unsafe extern "C" fn(Bio) -> c_int);

libcrypto_fn!(D2I_PKCS7_BIO, "d2i_PKCS7_bio", unsafe extern "C" fn(Bio, *mut Pkcs7) -> Pkcs7);
libcrypto_fn!(PKCS7_FREE, "PKCS7_free", unsafe extern "C" fn(Pkcs7));
libcrypto_fn!(
    PKCS7_VERIFY,
    "PKCS7_verify",
    unsafe extern "C" fn(Pkcs7, Stack, X509Store, Bio, Bio, c_int) -> c_int
);
libcrypto_fn!(
    PKCS7_GET0_SIGNERS,
    "PKCS7_get0_signers",
    unsafe extern "C" fn(Pkcs7, Stack, c_int) -> Stack
);

libcrypto_fn!(
    PEM_READ_BIO_X509,
    "PEM_read_bio_X509",
    unsafe extern "C" fn(Bio, *mut X509, *const c_void, *mut c_void) -> X509
);
libcrypto_fn!(X509_FREE, "X509_free", unsafe extern "C" fn(X509));
libcrypto_fn!(X509_STORE_NEW, "X509_STORE_new", unsafe extern "C" fn() -> X509Store);
libcrypto_fn!(X509_STORE_FREE, "X509_STORE_free", unsafe extern "C" fn(X509Store));
libcrypto_fn!(
    X509_STORE_ADD_CERT,
    "X509_STORE_add_cert",
    unsafe extern "C" fn(X509Store, X509) -> c_int
);
libcrypto_fn!(
    X509_GET_SUBJECT_NAME,
    "X509_get_subject_name",
    unsafe extern "C" fn(X509) -> *mut c_void
);
libcrypto_fn!(
    X509_NAME_ONELINE,
    "X509_NAME_oneline",
    unsafe extern "C" fn(*mut c_void, *mut c_char, c_int) -> *mut c_char
);

libcrypto_fn!(OPENSSL_SK_NUM, "OPENSSL_sk_num", unsafe extern "C" fn(Stack) -> c_int);
libcrypto_fn!(OPENSSL_SK_VALUE, "OPENSSL_sk_value", unsafe extern "C" fn(Stack, c_int) -> *mut c_void);
libcrypto_fn!(OPENSSL_SK_FREE, "OPENSSL_sk_free", unsafe extern "C" fn(Stack));
libcrypto_fn!(
    CRYPTO_FREE,
    "CRYPTO_free",
    unsafe extern "C" fn(*mut c_void, *const c_char, c_int)
);

libcrypto_fn!(ERR_GET_ERROR, "ERR_get_error", unsafe extern "C" fn() -> c_ulong);
libcrypto_fn!(
    ERR_ERROR_STRING_N,
    "ERR_error_string_n",
    unsafe extern "C" fn(c_ulong, *mut c_char, usize) -> *mut c_char
);

/// Render the library's pending error queue head, for diagnostics.
pub(crate) fn last_error_string(context: &str) -> String {
    let detail = (|| {
        let code = unsafe { (ERR_GET_ERROR.get().ok()?)() };
        if code == 0 {
            return None;
        }
        let mut buf = [0u8; 256];
        unsafe {
            (ERR_ERROR_STRING_N.get().ok()?)(code, buf.as_mut_ptr().cast::<c_char>(), buf.len());
        }
        let cstr = CStr::from_bytes_until_nul(&buf).ok()?;
        Some(cstr.to_string_lossy().into_owned())
    })();
    match detail {
        Some(d) => format!("{context}: {d}"),
        None => context.to_string(),
    }
}

/// Free a string allocated by the library (e.g. `X509_NAME_oneline`).
pub(crate) fn openssl_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    if let Ok(f) = CRYPTO_FREE.get() {
        unsafe { f(ptr, c"am-crypto".as_ptr(), 0) };
    }
}

pub(crate) fn evp_sha256_digest(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let md = unsafe { (EVP_SHA256.get()?)() };
    if md.is_null() {
        return Err(CryptoError::Verify(last_error_string("EVP_sha256")));
    }
    let mut out = vec![0u8; 64];
    let mut len: c_uint = 0;
    let ok = unsafe {
        (EVP_DIGEST.get()?)(
            data.as_ptr().cast::<c_void>(),
            data.len(),
            out.as_mut_ptr(),
            &mut len,
            md,
            std::ptr::null_mut(),
        )
    };
    if ok != 1 {
        return Err(CryptoError::Verify(last_error_string("EVP_Digest failed")));
    }
    out.truncate(len as usize);
    Ok(out)
}
