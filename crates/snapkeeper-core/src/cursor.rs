//! Opaque pagination cursors.
//!
//! A cursor is the URL-safe base64 of an RFC 3339 timestamp (nanosecond
//! precision) followed by the first four bytes of its SHA-256 digest. Tokens
//! are only accepted if the checksum matches and the timestamp re-encodes to
//! exactly the same text.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::CursorError;

const CHECKSUM_LEN: usize = 4;

/// Encodes and decodes pagination cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorCodec;

impl CursorCodec {
    pub fn encode(timestamp: DateTime<Utc>) -> String {
        let text = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut bytes = text.into_bytes();
        let checksum = checksum(&bytes);
        bytes.extend_from_slice(&checksum);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn decode(token: &str) -> Result<DateTime<Utc>, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| CursorError::Encoding)?;
        if bytes.len() <= CHECKSUM_LEN {
            return Err(CursorError::Encoding);
        }

        let (text, expected) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if checksum(text).as_slice() != expected {
            return Err(CursorError::Checksum);
        }

        let text = std::str::from_utf8(text)
            .map_err(|_| CursorError::Timestamp("not UTF-8".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(text)
            .map_err(|e| CursorError::Timestamp(e.to_string()))?
            .with_timezone(&Utc);

        if timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true) != text {
            return Err(CursorError::Timestamp(format!(
                "non-canonical timestamp '{}'",
                text
            )));
        }

        Ok(timestamp)
    }
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}
