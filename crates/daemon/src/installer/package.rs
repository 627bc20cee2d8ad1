// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The package container format.
//!
//! A package is a gzipped tar stream:
//! - `--PACKAGE-HEADER--`: YAML header document plus
//!   `{ applicationId, diskSpaceUsed }`
//! - `info.yaml` and the payload files, in any order after the manifest
//! - `--PACKAGE-FOOTER--`: YAML header document plus
//!   `{ digest, signature? }`
//!
//! A running SHA-256 over every payload entry (name, mode, content) must
//! match the footer digest; the optional signature is a base64 PKCS#7
//! structure over the hex digest.

use am_core::{Application, Error, ErrorKind, Result};
use am_manifest::{check_header, split_documents};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

pub const PACKAGE_HEADER_NAME: &str = "--PACKAGE-HEADER--";
pub const PACKAGE_FOOTER_NAME: &str = "--PACKAGE-FOOTER--";
pub const HEADER_FORMAT_TYPE: &str = "am-package-header";
pub const FOOTER_FORMAT_TYPE: &str = "am-package-footer";
pub const PACKAGE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderBody {
    application_id: String,
    disk_space_used: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FooterBody {
    digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

/// What a fully read package contained.
pub struct PackageContents {
    pub application: Application,
    pub manifest_text: String,
    pub disk_space_used: u64,
    /// Hex SHA-256 over the payload
    pub digest: String,
    /// Decoded PKCS#7 DER, when the package is signed
    pub signature: Option<Vec<u8>>,
    /// Where the payload was staged
    pub staging_dir: PathBuf,
}

struct PayloadDigest(Sha256);

impl PayloadDigest {
    fn new() -> Self {
        Self(Sha256::new())
    }

    fn add_entry(&mut self, name: &str, mode: u32, content: &[u8]) {
        self.0.update(name.as_bytes());
        self.0.update(mode.to_le_bytes());
        self.0.update(content);
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Read a package stream, staging its payload into
/// `<install_dir>/<application-id>+`.
///
/// The caller owns the staging directory afterwards, including removal
/// on every failure path past this point. Failures inside remove it
/// here.
pub fn read_and_stage(package: &Path, install_dir: &Path) -> Result<PackageContents> {
    let file = std::fs::File::open(package)
        .map_err(|e| Error::io(format!("cannot open package {}: {}", package.display(), e)))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut entries = archive
        .entries()
        .map_err(|e| Error::io(format!("cannot read package: {e}")))?;

    // 1. header
    let (name, _, content) = next_entry(&mut entries)?
        .ok_or_else(|| Error::parse("package is empty"))?;
    if name != PACKAGE_HEADER_NAME {
        return Err(Error::parse(format!(
            "package does not start with {PACKAGE_HEADER_NAME} (got {name:?})"
        )));
    }
    let header: HeaderBody = parse_meta_entry(&content, HEADER_FORMAT_TYPE)?;

    // 2. manifest
    let (name, mode, manifest_bytes) = next_entry(&mut entries)?
        .ok_or_else(|| Error::parse("package ends after the header"))?;
    if name != "info.yaml" {
        return Err(Error::parse(format!(
            "expected info.yaml after the package header (got {name:?})"
        )));
    }
    let manifest_text = String::from_utf8(manifest_bytes.clone())
        .map_err(|_| Error::parse("info.yaml is not valid UTF-8"))?;

    let staging_dir = install_dir.join(format!("{}+", header.application_id));
    let application = am_manifest::parse_info(&manifest_text, &staging_dir)
        .map_err(am_core::Error::from)?;
    if application.id != header.application_id {
        return Err(Error::parse(format!(
            "package header names {:?} but the manifest id is {:?}",
            header.application_id, application.id
        )));
    }

    // stale staging from a crashed install
    if staging_dir.exists() {
        std::fs::remove_dir_all(&staging_dir)?;
    }
    std::fs::create_dir_all(&staging_dir)?;

    let result = stage_payload(
        &mut entries,
        &staging_dir,
        (name.as_str(), mode, manifest_bytes.as_slice()),
    );
    match result {
        Ok((digest, signature)) => Ok(PackageContents {
            application,
            manifest_text,
            disk_space_used: header.disk_space_used,
            digest,
            signature,
            staging_dir,
        }),
        Err(e) => {
            let _ = std::fs::remove_dir_all(&staging_dir);
            Err(e)
        }
    }
}

type TarEntries<'a> = tar::Entries<'a, GzDecoder<std::fs::File>>;

fn stage_payload(
    entries: &mut TarEntries<'_>,
    staging_dir: &Path,
    manifest: (&str, u32, &[u8]),
) -> Result<(String, Option<Vec<u8>>)> {
    let mut digest = PayloadDigest::new();

    let (manifest_name, manifest_mode, manifest_bytes) = manifest;
    write_staged(staging_dir, Path::new(manifest_name), manifest_mode, manifest_bytes)?;
    digest.add_entry(manifest_name, manifest_mode, manifest_bytes);

    let mut footer: Option<FooterBody> = None;
    while let Some((name, mode, content)) = next_entry(entries)? {
        if name == PACKAGE_FOOTER_NAME {
            footer = Some(parse_meta_entry(&content, FOOTER_FORMAT_TYPE)?);
            break;
        }
        let relative = sanitize_entry_path(&name)?;
        write_staged(staging_dir, &relative, mode, &content)?;
        digest.add_entry(&name, mode, &content);
    }

    let Some(footer) = footer else {
        return Err(Error::parse(format!("package has no {PACKAGE_FOOTER_NAME}")));
    };

    let computed = digest.finish();
    if computed != footer.digest {
        return Err(Error::security(format!(
            "package digest mismatch: expected {}, computed {}",
            footer.digest, computed
        )));
    }

    let signature = match footer.signature {
        Some(b64) => Some(
            base64_decode(&b64)
                .ok_or_else(|| Error::parse("package signature is not valid base64"))?,
        ),
        None => None,
    };
    Ok((computed, signature))
}

fn next_entry(entries: &mut TarEntries<'_>) -> Result<Option<(String, u32, Vec<u8>)>> {
    let Some(entry) = entries.next() else {
        return Ok(None);
    };
    let mut entry = entry.map_err(|e| Error::io(format!("corrupt package entry: {e}")))?;
    if entry.header().entry_type().is_dir() {
        return next_entry(entries);
    }
    let name = entry
        .path()
        .map_err(|e| Error::parse(format!("bad entry path: {e}")))?
        .to_string_lossy()
        .into_owned();
    let mode = entry.header().mode().unwrap_or(0o644);
    let mut content = Vec::new();
    entry
        .read_to_end(&mut content)
        .map_err(|e| Error::io(format!("cannot read package entry {name:?}: {e}")))?;
    Ok(Some((name, mode, content)))
}

fn parse_meta_entry<T: serde::de::DeserializeOwned>(content: &[u8], format_type: &str) -> Result<T> {
    let text = std::str::from_utf8(content)
        .map_err(|_| Error::parse("package metadata is not valid UTF-8"))?;
    let docs = split_documents(text).map_err(am_core::Error::from)?;
    check_header(&docs, 2, &[format_type], PACKAGE_FORMAT_VERSION).map_err(am_core::Error::from)?;
    serde_yaml::from_value(docs[1].clone())
        .map_err(|e| Error::parse(format!("bad package metadata: {e}")))
}

fn sanitize_entry_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(Error::security(format!("absolute path in package: {name:?}")));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(Error::security(format!(
                    "unsafe path in package: {name:?}"
                )))
            }
        }
    }
    Ok(path.to_path_buf())
}

fn write_staged(staging_dir: &Path, relative: &Path, mode: u32, content: &[u8]) -> Result<()> {
    let target = staging_dir.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode));
    }
    Ok(())
}

/// Build a package from an application directory (developer tooling and
/// tests). The directory must contain an `info.yaml`.
pub fn create_package(app_dir: &Path, output: &Path) -> Result<()> {
    let manifest_path = app_dir.join("info.yaml");
    let manifest_text = std::fs::read_to_string(&manifest_path)
        .map_err(|e| Error::io(format!("cannot read {}: {}", manifest_path.display(), e)))?;
    let application = am_manifest::parse_info(&manifest_text, app_dir)
        .map_err(am_core::Error::from)?;

    // gather payload entries (info.yaml first, then sorted for a stable
    // digest)
    let mut files = Vec::new();
    collect_files(app_dir, Path::new(""), &mut files)?;
    files.retain(|f| f != Path::new("info.yaml"));
    files.sort();

    let mut payload: Vec<(String, u32, Vec<u8>)> = Vec::with_capacity(files.len() + 1);
    let mut disk_space_used = 0u64;
    for relative in std::iter::once(PathBuf::from("info.yaml")).chain(files) {
        let absolute = app_dir.join(&relative);
        let content = std::fs::read(&absolute)?;
        let mode = file_mode(&absolute);
        disk_space_used += content.len() as u64;
        payload.push((relative.to_string_lossy().into_owned(), mode, content));
    }

    let mut digest = PayloadDigest::new();
    for (name, mode, content) in &payload {
        digest.add_entry(name, *mode, content);
    }
    let digest = digest.finish();

    let file = std::fs::File::create(output)
        .map_err(|e| Error::io(format!("cannot create {}: {}", output.display(), e)))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, flate2::Compression::default()));

    let header = meta_entry_text(
        HEADER_FORMAT_TYPE,
        &HeaderBody {
            application_id: application.id.clone(),
            disk_space_used,
        },
    )?;
    append_entry(&mut builder, PACKAGE_HEADER_NAME, 0o644, header.as_bytes())?;
    for (name, mode, content) in &payload {
        append_entry(&mut builder, name, *mode, content)?;
    }
    let footer = meta_entry_text(
        FOOTER_FORMAT_TYPE,
        &FooterBody {
            digest,
            signature: None,
        },
    )?;
    append_entry(&mut builder, PACKAGE_FOOTER_NAME, 0o644, footer.as_bytes())?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io(format!("cannot finish package: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::io(format!("cannot finish package: {e}")))?;
    Ok(())
}

fn meta_entry_text<T: Serialize>(format_type: &str, body: &T) -> Result<String> {
    let body_yaml =
        serde_yaml::to_string(body).map_err(|e| Error::parse(e.to_string()))?;
    Ok(format!(
        "formatType: {format_type}\nformatVersion: {PACKAGE_FORMAT_VERSION}\n---\n{body_yaml}"
    ))
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    mode: u32,
    content: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder
        .append_data(&mut header, name, content)
        .map_err(|e| Error::io(format!("cannot append {name:?}: {e}")))
}

fn collect_files(base: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(base.join(relative))? {
        let entry = entry?;
        let name = entry.file_name();
        let child = relative.join(&name);
        if entry.file_type()?.is_dir() {
            collect_files(base, &child, out)?;
        } else {
            out.push(child);
        }
    }
    Ok(())
}

fn file_mode(path: &Path) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o644)
    }
    #[cfg(not(unix))]
    {
        0o644
    }
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .ok()
}

/// Encode a PKCS#7 signature for embedding in a footer.
pub fn base64_encode(input: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(input)
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
