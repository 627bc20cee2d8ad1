// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The binary application database.
//!
//! Layout: an 8-byte magic, a `u32` format version, a `u32` entry count,
//! then one length-prefixed JSON record per application, all little
//! endian. Writes go to a sibling temp file that is fsync'd and renamed
//! into place, so readers only ever observe complete databases.

use am_core::Application;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DB_MAGIC: [u8; 8] = *b"am-appdb";
pub const DB_VERSION: u32 = 2;

/// Upper bound for a single record; anything larger is corruption.
const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Recoverable: the caller recreates the database from a scan.
    #[error("not a valid application database: {reason}")]
    Invalid { reason: String },
}

impl DbError {
    fn invalid(reason: impl Into<String>) -> Self {
        DbError::Invalid {
            reason: reason.into(),
        }
    }

    /// True when the database should be recreated rather than reported.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DbError::Invalid { .. })
            || matches!(self, DbError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationDb {
    path: PathBuf,
}

impl ApplicationDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<Vec<Application>, DbError> {
        let mut file = File::open(&self.path)?;

        let mut magic = [0u8; 8];
        read_exact_or_invalid(&mut file, &mut magic, "truncated magic")?;
        if magic != DB_MAGIC {
            return Err(DbError::invalid("wrong magic"));
        }

        let version = read_u32(&mut file, "truncated version")?;
        if version != DB_VERSION {
            return Err(DbError::invalid(format!(
                "unknown version {version} (expected {DB_VERSION})"
            )));
        }

        let count = read_u32(&mut file, "truncated entry count")?;
        let mut apps = Vec::with_capacity(count.min(1024) as usize);
        for i in 0..count {
            let len = read_u32(&mut file, "truncated record length")?;
            if len > MAX_RECORD_LEN {
                return Err(DbError::invalid(format!(
                    "record {i} has an implausible length of {len} bytes"
                )));
            }
            let mut record = vec![0u8; len as usize];
            read_exact_or_invalid(&mut file, &mut record, "truncated record")?;
            let app: Application = serde_json::from_slice(&record)
                .map_err(|e| DbError::invalid(format!("record {i} does not parse: {e}")))?;
            apps.push(app);
        }
        Ok(apps)
    }

    pub fn write(&self, apps: &[Application]) -> Result<(), DbError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&DB_MAGIC)?;
            file.write_all(&DB_VERSION.to_le_bytes())?;
            file.write_all(&(apps.len() as u32).to_le_bytes())?;
            for app in apps {
                let record = serde_json::to_vec(app)?;
                file.write_all(&(record.len() as u32).to_le_bytes())?;
                file.write_all(&record)?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn read_exact_or_invalid(file: &mut File, buf: &mut [u8], what: &str) -> Result<(), DbError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DbError::invalid(what)
        } else {
            DbError::Io(e)
        }
    })
}

fn read_u32(file: &mut File, what: &str) -> Result<u32, DbError> {
    let mut buf = [0u8; 4];
    read_exact_or_invalid(file, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
