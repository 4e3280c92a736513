//! Compressed JSON envelope used by the sync protocol.
//!
//! Requests are compact JSON compressed with zstd (gzip is available for
//! servers that predate zstd). Responses are decoded by trying, in order:
//!
//! 1. a complete zstd frame,
//! 2. a streaming zstd decode that tolerates a frame header followed by a
//!    plain JSON tail,
//! 3. gzip, zlib and raw deflate,
//! 4. plain UTF-8 JSON.
//!
//! When every strategy fails the error lists what each one reported.

use std::io::Read;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProtoError, ProtoResult};

/// First four bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// First sixteen bytes of an SQLite database file.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Upper bound on JSON start candidates tried after a zstd header.
const MAX_TAIL_CANDIDATES: usize = 64;

/// Read granularity for the streaming decoder.
const STREAM_CHUNK: usize = 16 * 1024;

/// Body compression for outgoing envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Zstd,
    Gzip,
}

/// Encodes request bodies and decodes response bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    compression: Compression,
}

impl EnvelopeCodec {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Serialize `value` to compact JSON and compress it.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> ProtoResult<Vec<u8>> {
        let json =
            serde_json::to_vec(value).map_err(|e| ProtoError::encoding_failed(e.to_string()))?;
        self.compress(&json)
    }

    /// Compress raw bytes with the configured compressor.
    pub fn compress(&self, raw: &[u8]) -> ProtoResult<Vec<u8>> {
        match self.compression {
            Compression::Zstd => zstd::encode_all(raw, zstd::DEFAULT_COMPRESSION_LEVEL)
                .map_err(|e| ProtoError::encoding_failed(format!("zstd: {e}"))),
            Compression::Gzip => {
                use std::io::Write;
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(raw)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| ProtoError::encoding_failed(format!("gzip: {e}")))
            }
        }
    }

    /// Undo zstd or gzip compression; other bytes are returned unchanged.
    pub fn decompress(&self, payload: &[u8]) -> Vec<u8> {
        if payload.starts_with(&ZSTD_MAGIC) {
            if let Ok(raw) = zstd::decode_all(payload) {
                return raw;
            }
        }
        if payload.starts_with(&[0x1f, 0x8b]) {
            if let Ok(raw) = inflate(flate2::read::GzDecoder::new(payload)) {
                return raw;
            }
        }
        payload.to_vec()
    }

    /// Decode a response body into a JSON value.
    pub fn decode(&self, payload: &[u8]) -> ProtoResult<Value> {
        let mut attempts: Vec<(String, String)> = Vec::new();

        match zstd::decode_all(payload) {
            Ok(raw) => match serde_json::from_slice::<Value>(&raw) {
                Ok(value) => return Ok(found("zstd", value)),
                Err(e) => {
                    attempts.push(("zstd".into(), format!("decompressed but not JSON: {e}")))
                }
            },
            Err(e) => attempts.push(("zstd".into(), e.to_string())),
        }

        match decode_zstd_partial(payload) {
            Ok(value) => return Ok(found("zstd-stream", value)),
            Err(e) => attempts.push(("zstd-stream".into(), e)),
        }

        let deflate_family: [(&str, fn(&[u8]) -> Result<Vec<u8>, String>); 3] = [
            ("gzip", |p| inflate(flate2::read::GzDecoder::new(p))),
            ("zlib", |p| inflate(flate2::read::ZlibDecoder::new(p))),
            ("deflate", |p| inflate(flate2::read::DeflateDecoder::new(p))),
        ];
        for (name, decompress) in deflate_family {
            let parsed = decompress(payload)
                .and_then(|raw| serde_json::from_slice::<Value>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(value) => return Ok(found(name, value)),
                Err(e) => attempts.push((name.into(), e)),
            }
        }

        match std::str::from_utf8(payload) {
            Ok(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => return Ok(found("plain", value)),
                Err(e) => attempts.push(("plain".into(), e.to_string())),
            },
            Err(e) => attempts.push(("plain".into(), e.to_string())),
        }

        Err(ProtoError::Undecodable { attempts })
    }

    /// Decode a response body into `T`.
    pub fn decode_as<T: DeserializeOwned>(&self, payload: &[u8]) -> ProtoResult<T> {
        let value = self.decode(payload)?;
        serde_json::from_value(value).map_err(|e| ProtoError::Undecodable {
            attempts: vec![("shape".into(), e.to_string())],
        })
    }
}

fn found(strategy: &str, value: Value) -> Value {
    debug!(strategy, "Decoded sync envelope");
    value
}

fn inflate<R: Read>(mut reader: R) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

/// Streaming zstd decode keeping whatever output precedes a failure; when
/// that is not JSON, look for a JSON document after the frame magic.
fn decode_zstd_partial(payload: &[u8]) -> Result<Value, String> {
    if !payload.starts_with(&ZSTD_MAGIC) {
        return Err("no zstd frame magic".to_string());
    }

    let mut partial = Vec::new();
    let mut stream_error = None;
    match zstd::stream::read::Decoder::new(payload) {
        Ok(mut decoder) => {
            let mut chunk = vec![0u8; STREAM_CHUNK];
            loop {
                match decoder.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => partial.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        Err(e) => stream_error = Some(e.to_string()),
    }

    if !partial.is_empty() {
        if let Ok(value) = serde_json::from_slice::<Value>(&partial) {
            return Ok(value);
        }
    }

    let tail = &payload[ZSTD_MAGIC.len()..];
    let candidates = tail
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{' || **b == b'[')
        .map(|(i, _)| i)
        .take(MAX_TAIL_CANDIDATES);
    for start in candidates {
        let mut stream = serde_json::Deserializer::from_slice(&tail[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Ok(value);
        }
    }

    Err(match stream_error {
        Some(e) => format!("{e}; no JSON after frame header"),
        None => "no JSON after frame header".to_string(),
    })
}

/// Turn a downloaded collection body into SQLite file bytes.
///
/// The body is usually a zstd frame; some servers send the file as is.
pub fn decompress_collection(payload: &[u8]) -> ProtoResult<Vec<u8>> {
    if payload.starts_with(SQLITE_MAGIC) {
        return Ok(payload.to_vec());
    }

    let mut attempts = Vec::new();
    match zstd::decode_all(payload) {
        Ok(raw) if raw.starts_with(SQLITE_MAGIC) => return Ok(raw),
        Ok(_) => attempts.push(("zstd".into(), "output is not an SQLite file".into())),
        Err(e) => attempts.push(("zstd".into(), e.to_string())),
    }
    match inflate(flate2::read::GzDecoder::new(payload)) {
        Ok(raw) if raw.starts_with(SQLITE_MAGIC) => return Ok(raw),
        Ok(_) => attempts.push(("gzip".into(), "output is not an SQLite file".into())),
        Err(e) => attempts.push(("gzip".into(), e)),
    }
    Err(ProtoError::Undecodable { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({"key": "abc123", "nested": [1, 2, {"x": null}]})
    }

    #[test]
    fn test_full_zstd_frame() {
        let codec = EnvelopeCodec::default();
        let bytes = codec.encode(&sample()).unwrap();
        assert!(bytes.starts_with(&ZSTD_MAGIC));
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_frame_header_followed_by_plain_json() {
        let mut bytes = ZSTD_MAGIC.to_vec();
        bytes.extend_from_slice(serde_json::to_string(&sample()).unwrap().as_bytes());
        assert_eq!(EnvelopeCodec::default().decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_plain_json() {
        let bytes = serde_json::to_vec(&sample()).unwrap();
        assert_eq!(EnvelopeCodec::default().decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_gzip_round_trip() {
        let codec = EnvelopeCodec::new(Compression::Gzip);
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_zlib_payload() {
        use std::io::Write;
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&serde_json::to_vec(&sample()).unwrap())
            .unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(EnvelopeCodec::default().decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let err = EnvelopeCodec::default()
            .decode(b"\xff\xfe\xfd not json at all")
            .unwrap_err();
        match err {
            ProtoError::Undecodable { attempts } => {
                let names: Vec<&str> = attempts.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(
                    names,
                    vec!["zstd", "zstd-stream", "gzip", "zlib", "deflate", "plain"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_as_struct() {
        #[derive(serde::Deserialize)]
        struct HostKey {
            key: String,
        }
        let codec = EnvelopeCodec::default();
        let bytes = codec.encode(&json!({"key": "k"})).unwrap();
        let parsed: HostKey = codec.decode_as(&bytes).unwrap();
        assert_eq!(parsed.key, "k");
    }

    #[test]
    fn test_decompress_passthrough() {
        let codec = EnvelopeCodec::default();
        assert_eq!(codec.decompress(b"OK"), b"OK");
        let zstd = codec.compress(b"OK").unwrap();
        assert_eq!(codec.decompress(&zstd), b"OK");
        let gzip = EnvelopeCodec::new(Compression::Gzip).compress(b"OK").unwrap();
        assert_eq!(codec.decompress(&gzip), b"OK");
    }

    #[test]
    fn test_decompress_collection() {
        let mut db = SQLITE_MAGIC.to_vec();
        db.extend_from_slice(&[0u8; 64]);
        assert_eq!(decompress_collection(&db).unwrap(), db);

        let compressed = EnvelopeCodec::default().compress(&db).unwrap();
        assert_eq!(decompress_collection(&compressed).unwrap(), db);

        assert!(decompress_collection(b"<html>error</html>").is_err());
    }
}
