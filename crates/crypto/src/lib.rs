// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! am-crypto: a typed symbol table over the system's libcrypto.
//!
//! The manager does not implement cryptographic primitives; it resolves
//! them from a versioned shared library at runtime. On first use the
//! loader probes the platform's library names, checks that the library's
//! self-reported version lies within the supported window, and then
//! resolves each declared function lazily. When the version gate fails,
//! the library is unloaded and every typed symbol stays permanently
//! unresolved; callers see that as a `System` failure.

mod symbols;
mod verify;

pub use verify::verify_signer_chain;

use am_core::{Error, ErrorKind};
use libloading::Library;
use std::ffi::c_ulong;
use std::sync::OnceLock;
use thiserror::Error as ThisError;

/// Minimum supported libcrypto version (3.0.0), inclusive.
pub const MIN_CRYPTO_VERSION: c_ulong = 0x3000_0000;
/// Maximum supported libcrypto version (4.0.0), exclusive.
pub const MAX_CRYPTO_VERSION: c_ulong = 0x4000_0000;

#[cfg(target_os = "macos")]
const LIBRARY_CANDIDATES: &[&str] = &["libcrypto.3.dylib", "libcrypto.dylib"];
#[cfg(not(target_os = "macos"))]
const LIBRARY_CANDIDATES: &[&str] = &["libcrypto.so.3", "libcrypto.so.1.1", "libcrypto.so"];

#[derive(Debug, Clone, ThisError)]
pub enum CryptoError {
    #[error("could not find a suitable libcrypto: {0}")]
    LoadFailed(String),

    #[error("loaded libcrypto {library}, but the version is too old: {version:#010x} (minimum supported version is {MIN_CRYPTO_VERSION:#010x})")]
    VersionTooOld { library: String, version: c_ulong },

    #[error("loaded libcrypto {library}, but the version is too new: {version:#010x} (maximum supported version is {MAX_CRYPTO_VERSION:#010x})")]
    VersionTooNew { library: String, version: c_ulong },

    #[error("failed to resolve libcrypto symbol {0}")]
    UnresolvedSymbol(&'static str),

    #[error("{0}")]
    Verify(String),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        let kind = match &e {
            CryptoError::Verify(_) => ErrorKind::Security,
            _ => ErrorKind::System,
        };
        Error::new(kind, e.to_string())
    }
}

static LIBRARY: OnceLock<Result<&'static Library, CryptoError>> = OnceLock::new();

/// Check whether the version lies in the supported window.
pub fn version_in_bounds(version: c_ulong) -> bool {
    (MIN_CRYPTO_VERSION..MAX_CRYPTO_VERSION).contains(&version)
}

/// Load and version-gate the library. Idempotent; the first outcome sticks.
pub fn initialize() -> Result<(), CryptoError> {
    library().map(|_| ())
}

pub(crate) fn library() -> Result<&'static Library, CryptoError> {
    LIBRARY.get_or_init(load_library).clone()
}

fn load_library() -> Result<&'static Library, CryptoError> {
    let mut last_error = String::from("no library candidates for this platform");

    for name in LIBRARY_CANDIDATES {
        let lib = match unsafe { Library::new(name) } {
            Ok(lib) => lib,
            Err(e) => {
                last_error = format!("{name}: {e}");
                continue;
            }
        };

        let version = match unsafe {
            lib.get::<unsafe extern "C" fn() -> c_ulong>(b"OpenSSL_version_num\0")
        } {
            Ok(f) => unsafe { f() },
            Err(_) => {
                // An unversionable library is not trustworthy; dropping
                // `lib` unloads it.
                last_error =
                    format!("{name}: symbol 'OpenSSL_version_num' was not found");
                continue;
            }
        };

        if version < MIN_CRYPTO_VERSION {
            return Err(CryptoError::VersionTooOld {
                library: name.to_string(),
                version,
            });
        }
        if version >= MAX_CRYPTO_VERSION {
            return Err(CryptoError::VersionTooNew {
                library: name.to_string(),
                version,
            });
        }

        tracing::debug!(library = name, version = format!("{version:#010x}"), "libcrypto loaded");
        return Ok(&*Box::leak(Box::new(lib)));
    }

    Err(CryptoError::LoadFailed(last_error))
}

/// A lazily resolved function from libcrypto.
///
/// Resolution happens once; a failure (library unusable or symbol absent)
/// is remembered and every later call keeps failing.
pub struct LibCryptoFn<T> {
    name: &'static str,
    symbol: &'static [u8],
    resolved: OnceLock<Result<T, CryptoError>>,
}

impl<T: Copy + 'static> LibCryptoFn<T> {
    /// `symbol` must be nul-terminated.
    pub const fn new(name: &'static str, symbol: &'static [u8]) -> Self {
        Self {
            name,
            symbol,
            resolved: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<T, CryptoError> {
        self.resolved
            .get_or_init(|| {
                let lib = library()?;
                let symbol = unsafe { lib.get::<T>(self.symbol) }
                    .map_err(|_| CryptoError::UnresolvedSymbol(self.name))?;
                Ok(*symbol)
            })
            .clone()
    }
}

/// One-shot SHA-256 through the loaded library's EVP interface.
pub fn checksum_sha256(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    symbols::evp_sha256_digest(data)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
