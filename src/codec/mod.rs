//! Pure value conversions shared by the dialect translator and the
//! connection runtime: JSON byte forms, gzip framing, PNG signature
//! checks, and the guid byte form. Deterministic and side-effect free;
//! failures surface as conversion errors.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::core::{DbError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

/// Serialize any `serde`-encodable object into its JSON byte form.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| DbError::conversion(std::any::type_name::<T>(), format!("json: {}", e)))
}

pub fn from_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| DbError::conversion("json bytes", format!("{}: {}", std::any::type_name::<T>(), e)))
}

pub fn json_value_to_bytes(value: &serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DbError::conversion("json value", format!("bytes: {}", e)))
}

pub fn json_value_from_bytes(bytes: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(bytes).map_err(|e| DbError::conversion("bytes", format!("json value: {}", e)))
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| DbError::conversion("bytes", format!("gzip: {}", e)))
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DbError::conversion("gzip bytes", format!("bytes: {}", e)))?;
    Ok(out)
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes[..8] == PNG_SIGNATURE
}

/// Images travel as PNG-encoded byte arrays; the pixel codec itself is
/// pluggable, so the core only checks the frame.
pub fn ensure_png(bytes: &[u8]) -> Result<&[u8]> {
    if is_png(bytes) {
        Ok(bytes)
    } else {
        Err(DbError::conversion("bytes", "png image"))
    }
}

pub fn guid_bytes(guid: Uuid) -> [u8; 16] {
    *guid.as_bytes()
}

pub fn guid_from_bytes(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).map_err(|_| DbError::conversion(format!("{} bytes", bytes.len()), "guid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_round_trip() {
        let data = b"a body long enough for the frame to matter".repeat(8);
        let packed = gzip(&data).unwrap();
        assert!(is_gzip(&packed));
        assert_eq!(gunzip(&packed).unwrap(), data);
    }

    #[test]
    fn test_json_round_trip() {
        let v = serde_json::json!({"name": "Ada", "age": 36});
        let bytes = json_value_to_bytes(&v).unwrap();
        assert_eq!(json_value_from_bytes(&bytes).unwrap(), v);
    }

    #[test]
    fn test_png_signature() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 0, 0]);
        assert!(ensure_png(&png).is_ok());
        assert!(ensure_png(b"notapng").is_err());
    }

    #[test]
    fn test_guid_bytes_round_trip() {
        let g = Uuid::new_v4();
        assert_eq!(guid_from_bytes(&guid_bytes(g)).unwrap(), g);
    }

    #[test]
    fn test_guid_from_bad_slice() {
        assert!(guid_from_bytes(&[1, 2, 3]).is_err());
    }
}
