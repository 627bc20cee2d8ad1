// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PKCS#7 signature verification against a configured CA list.

use crate::symbols::{self, Bio, Pkcs7, Stack, X509Store, X509};
use crate::CryptoError;
use std::ffi::{c_int, c_void, CStr};

/// Frees a library object when the scope ends.
struct Guard {
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl Guard {
    fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

fn mem_bio(data: &[u8]) -> Result<(Bio, Guard), CryptoError> {
    let new_mem_buf = symbols::BIO_NEW_MEM_BUF.get()?;
    let bio_free = symbols::BIO_FREE.get()?;
    let bio = unsafe { new_mem_buf(data.as_ptr().cast::<c_void>(), data.len() as c_int) };
    if bio.is_null() {
        return Err(CryptoError::Verify(symbols::last_error_string(
            "BIO_new_mem_buf failed",
        )));
    }
    Ok((bio, Guard::new(move || unsafe {
        bio_free(bio);
    })))
}

/// Verify a DER-encoded PKCS#7 signature over `content` against the given
/// PEM CA certificates.
///
/// Returns the subject names of the verified signer certificates. The
/// caller keeps the `content` buffer alive for the duration of the call;
/// the memory BIOs borrow it.
pub fn verify_signer_chain(
    content: &[u8],
    signature_der: &[u8],
    ca_certificates_pem: &[Vec<u8>],
) -> Result<Vec<String>, CryptoError> {
    if ca_certificates_pem.is_empty() {
        return Err(CryptoError::Verify(
            "no CA certificates configured for signature verification".into(),
        ));
    }

    // The signature structure
    let (sig_bio, _sig_bio_guard) = mem_bio(signature_der)?;
    let p7: Pkcs7 =
        unsafe { (symbols::D2I_PKCS7_BIO.get()?)(sig_bio, std::ptr::null_mut()) };
    if p7.is_null() {
        return Err(CryptoError::Verify(symbols::last_error_string(
            "could not parse the PKCS#7 signature",
        )));
    }
    let pkcs7_free = symbols::PKCS7_FREE.get()?;
    let _p7_guard = Guard::new(move || unsafe { pkcs7_free(p7) });

    // The trust store built from the configured CA list
    let store: X509Store = unsafe { (symbols::X509_STORE_NEW.get()?)() };
    if store.is_null() {
        return Err(CryptoError::Verify(symbols::last_error_string(
            "X509_STORE_new failed",
        )));
    }
    let store_free = symbols::X509_STORE_FREE.get()?;
    let _store_guard = Guard::new(move || unsafe { store_free(store) });

    let pem_read = symbols::PEM_READ_BIO_X509.get()?;
    let add_cert = symbols::X509_STORE_ADD_CERT.get()?;
    let x509_free = symbols::X509_FREE.get()?;

    for pem in ca_certificates_pem {
        let (ca_bio, _ca_bio_guard) = mem_bio(pem)?;
        let mut found = 0usize;
        loop {
            let cert: X509 = unsafe {
                pem_read(ca_bio, std::ptr::null_mut(), std::ptr::null(), std::ptr::null_mut())
            };
            if cert.is_null() {
                break;
            }
            let added = unsafe { add_cert(store, cert) };
            unsafe { x509_free(cert) };
            if added != 1 {
                return Err(CryptoError::Verify(symbols::last_error_string(
                    "could not add CA certificate to the trust store",
                )));
            }
            found += 1;
        }
        if found == 0 {
            return Err(CryptoError::Verify(
                "CA certificate file contains no PEM certificate".into(),
            ));
        }
    }

    // The actual verification
    let (content_bio, _content_bio_guard) = mem_bio(content)?;
    let verified = unsafe {
        (symbols::PKCS7_VERIFY.get()?)(
            p7,
            std::ptr::null_mut(),
            store,
            content_bio,
            std::ptr::null_mut(),
            0,
        )
    };
    if verified != 1 {
        return Err(CryptoError::Verify(symbols::last_error_string(
            "signature verification failed",
        )));
    }

    signer_subjects(p7)
}

fn signer_subjects(p7: Pkcs7) -> Result<Vec<String>, CryptoError> {
    let signers: Stack =
        unsafe { (symbols::PKCS7_GET0_SIGNERS.get()?)(p7, std::ptr::null_mut(), 0) };
    if signers.is_null() {
        return Err(CryptoError::Verify(symbols::last_error_string(
            "could not extract the signer certificates",
        )));
    }
    let sk_free = symbols::OPENSSL_SK_FREE.get()?;
    let _signers_guard = Guard::new(move || unsafe { sk_free(signers) });

    let sk_num = symbols::OPENSSL_SK_NUM.get()?;
    let sk_value = symbols::OPENSSL_SK_VALUE.get()?;
    let subject_name = symbols::X509_GET_SUBJECT_NAME.get()?;
    let oneline = symbols::X509_NAME_ONELINE.get()?;

    let count = unsafe { sk_num(signers) };
    let mut subjects = Vec::with_capacity(count.max(0) as usize);
    for i in 0..count {
        let cert = unsafe { sk_value(signers, i) };
        if cert.is_null() {
            continue;
        }
        let name = unsafe { subject_name(cert) };
        let line = unsafe { oneline(name, std::ptr::null_mut(), 0) };
        if line.is_null() {
            continue;
        }
        let subject = unsafe { CStr::from_ptr(line) }.to_string_lossy().into_owned();
        symbols::openssl_free(line.cast::<c_void>());
        subjects.push(subject);
    }
    Ok(subjects)
}
