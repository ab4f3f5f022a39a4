//! Checksums used by the post-copy integrity check.
//!
//! This module provides:
//! - Multiple checksum algorithms (CRC32, MD5, SHA-256, BLAKE3)
//! - Streaming computation over any reader
//! - Source/destination comparison through the `FileSystem` trait

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use crate::fs_ops::FileSystem;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// CRC32 (fast, 32-bit)
    Crc32,
    /// MD5 (deprecated, but included for compatibility)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc32 => write!(f, "crc32"),
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crc32" => Ok(Self::Crc32),
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "Invalid hash algorithm '{}'. Must be 'crc32', 'md5', 'sha256', or 'blake3'",
                other
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher over one of the supported algorithms.
enum Hasher {
    Crc32(u32),
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => Hasher::Crc32(0xffff_ffff),
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(<sha2::Sha256 as sha2::Digest>::new()),
            ChecksumAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Crc32(crc) => {
                for &byte in data {
                    *crc ^= byte as u32;
                    for _ in 0..8 {
                        *crc = if *crc & 1 == 1 {
                            (*crc >> 1) ^ 0xedb8_8320
                        } else {
                            *crc >> 1
                        };
                    }
                }
            }
            Hasher::Md5(context) => context.consume(data),
            Hasher::Sha256(hasher) => sha2::Digest::update(hasher, data),
            Hasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> ChecksumValue {
        match self {
            Hasher::Crc32(crc) => {
                ChecksumValue::new(ChecksumAlgorithm::Crc32, format!("{:08x}", crc ^ 0xffff_ffff))
            }
            Hasher::Md5(context) => {
                ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", context.compute()))
            }
            Hasher::Sha256(hasher) => ChecksumValue::new(
                ChecksumAlgorithm::Sha256,
                format!("{:x}", sha2::Digest::finalize(hasher)),
            ),
            Hasher::Blake3(hasher) => {
                ChecksumValue::new(ChecksumAlgorithm::Blake3, hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Compute a checksum over everything the reader yields.
pub fn checksum_reader<R: Read + ?Sized>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> io::Result<ChecksumValue> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 65536];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

/// Compute the checksum of a file reached through `fs`.
pub fn compute_file_checksum(
    fs: &dyn FileSystem,
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> io::Result<ChecksumValue> {
    let mut reader = fs.open_read(path)?;
    checksum_reader(&mut reader, algorithm)
}

/// Compare a source file with its copy.
///
/// The copy starts `destination_offset` bytes into the destination (non-zero
/// when appending); everything before it is ignored.
/// Returns `Ok(None)` when both match, `Ok(Some(reason))` on a mismatch.
pub fn verify_copy(
    fs: &dyn FileSystem,
    source: &Path,
    destination: &Path,
    destination_offset: u64,
    algorithm: ChecksumAlgorithm,
) -> io::Result<Option<String>> {
    let expected = compute_file_checksum(fs, source, algorithm)?;

    let mut reader = fs.open_read(destination)?;
    let skipped = io::copy(&mut reader.by_ref().take(destination_offset), &mut io::sink())?;
    if skipped < destination_offset {
        return Ok(Some(format!(
            "destination is {} bytes, expected at least {}",
            skipped, destination_offset
        )));
    }
    let actual = checksum_reader(&mut reader, algorithm)?;
    if expected == actual {
        Ok(None)
    } else {
        Ok(Some(format!("expected {}, found {}", expected, actual)))
    }
}
