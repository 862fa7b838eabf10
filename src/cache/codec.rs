//! Encoding Pipeline
//!
//! Turns a [`CacheEntry`] into a storable string and back:
//! serialize, optionally gzip (size-triggered), optionally obfuscate.
//!
//! Obfuscation is URL-safe base64. It discourages casual inspection and
//! offers no confidentiality.

use std::io::{Read, Write};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::CodecError;

/// Envelope version written by this pipeline
pub const RECORD_VERSION: u32 = 1;

// == Flags ==
/// Steps applied to a record's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeFlags {
    pub compressed: bool,
    pub obfuscated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    v: u32,
    flags: EncodeFlags,
    payload: String,
}

// == Codec ==
/// Record encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    /// Entry JSON strictly longer than this is compressed when compression is on
    pub compress_threshold: usize,
}

impl Codec {
    pub fn new(compress_threshold: usize) -> Self {
        Self { compress_threshold }
    }

    // == Encode ==
    /// Encodes an entry.
    ///
    /// # Arguments
    /// * `entry` - Entry to encode
    /// * `compress` - Allow the size-triggered compression step
    /// * `obfuscate` - Apply the obfuscation step
    pub fn encode(
        &self,
        entry: &CacheEntry,
        compress: bool,
        obfuscate: bool,
    ) -> Result<String, CodecError> {
        let json = serde_json::to_string(entry)?;
        let mut flags = EncodeFlags::default();

        let mut payload = if compress && json.len() > self.compress_threshold {
            flags.compressed = true;
            STANDARD.encode(gzip(json.as_bytes())?)
        } else {
            json
        };

        if obfuscate {
            flags.obfuscated = true;
            payload = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        }

        Ok(serde_json::to_string(&Record {
            v: RECORD_VERSION,
            flags,
            payload,
        })?)
    }

    // == Decode ==
    /// Decodes a stored string, reversing exactly the steps its flags name.
    pub fn decode(&self, raw: &str) -> Result<CacheEntry, CodecError> {
        let record: Record = serde_json::from_str(raw)?;
        if record.v != RECORD_VERSION {
            return Err(CodecError::Version(record.v));
        }

        let mut payload = record.payload;

        if record.flags.obfuscated {
            let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes())?;
            payload = String::from_utf8(bytes)
                .map_err(|e| CodecError::Payload(format!("obfuscated payload: {e}")))?;
        }

        if record.flags.compressed {
            let bytes = STANDARD.decode(payload.as_bytes())?;
            payload = gunzip(&bytes)?;
        }

        let entry: CacheEntry = serde_json::from_str(&payload)?;
        entry.validate()?;
        Ok(entry)
    }

    /// Reads the flags of a record without decoding its payload.
    pub fn peek_flags(&self, raw: &str) -> Option<EncodeFlags> {
        serde_json::from_str::<Record>(raw).ok().map(|r| r.flags)
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CodecError::Payload(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Payload(format!("gzip: {e}")))
}

fn gunzip(bytes: &[u8]) -> Result<String, CodecError> {
    let mut out = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut out)
        .map_err(|e| CodecError::Payload(format!("gunzip: {e}")))?;
    Ok(out)
}
