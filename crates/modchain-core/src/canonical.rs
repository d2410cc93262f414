//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is critical: the same record, commit or file map
//! always produces identical bytes, and therefore an identical content id in
//! any backend that hashes its input.

use ciborium::value::Value;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::record::{ContentCommit, FileMap, VersionRecord};
use crate::types::ContentId;

/// Version record field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const CONTENT: u64 = 0;
    pub const SCHEMA: u64 = 1;
    pub const PREV: u64 = 2;
    pub const NAME: u64 = 3;
    pub const CREATED: u64 = 4;
    pub const UPDATED: u64 = 5;
    pub const KEY: u64 = 6;
    pub const URL: u64 = 7;
    pub const SIGNATURE: u64 = 8;
}

/// Content commit field keys.
mod commit_keys {
    pub const DATA: u64 = 0;
    pub const COMMENT: u64 = 1;
    pub const TIME: u64 = 2;
}

/// Encode the signed subset of a record (every field except the signature).
pub fn record_signing_bytes(record: &VersionRecord) -> Vec<u8> {
    encode_canonical(&Value::Map(signed_entries(record)))
}

/// Encode a full record, signature included.
pub fn record_bytes(record: &VersionRecord) -> Vec<u8> {
    let mut entries = signed_entries(record);
    entries.push((
        int(keys::SIGNATURE),
        Value::Bytes(record.signature.0.to_vec()),
    ));
    encode_canonical(&Value::Map(entries))
}

/// Encode a content commit.
pub fn commit_bytes(commit: &ContentCommit) -> Vec<u8> {
    let entries = vec![
        (int(commit_keys::DATA), text(commit.data.as_str())),
        (int(commit_keys::COMMENT), opt_text(commit.comment.as_deref())),
        (int(commit_keys::TIME), Value::Integer(commit.time.into())),
    ];
    encode_canonical(&Value::Map(entries))
}

/// Encode a file map as a text-keyed map.
pub fn file_map_bytes(map: &FileMap) -> Vec<u8> {
    let entries = map
        .iter()
        .map(|(path, id)| (text(path), text(id.as_str())))
        .collect();
    encode_canonical(&Value::Map(entries))
}

fn signed_entries(record: &VersionRecord) -> Vec<(Value, Value)> {
    // Build map entries in key order (already sorted 0-7)
    vec![
        (int(keys::CONTENT), text(record.content.as_str())),
        (
            int(keys::SCHEMA),
            opt_text(record.schema.as_ref().map(ContentId::as_str)),
        ),
        (
            int(keys::PREV),
            opt_text(record.prev.as_ref().map(ContentId::as_str)),
        ),
        (int(keys::NAME), text(&record.name)),
        (int(keys::CREATED), Value::Integer(record.created.into())),
        (int(keys::UPDATED), Value::Integer(record.updated.into())),
        (int(keys::KEY), Value::Bytes(record.key.0.to_vec())),
        (int(keys::URL), opt_text(record.url.as_deref())),
    ]
}

fn int(key: u64) -> Value {
    Value::Integer(key.into())
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => text(s),
        None => Value::Null,
    }
}

/// Encode a CBOR Value to canonical bytes.
fn encode_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
///
/// Only the variants built in this module reach here.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => unreachable!("floats are never part of canonical values"),
        _ => unreachable!("unsupported CBOR value type in canonical values"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Parse bytes into a top-level CBOR map.
fn decode_map(bytes: &[u8]) -> Result<Vec<(Value, Value)>, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(CoreError::MalformedRecord("expected map".into())),
    }
}

/// Reject input that decodes fine but is not in canonical form.
fn ensure_canonical(input: &[u8], reencoded: &[u8]) -> Result<(), CoreError> {
    if input == reencoded {
        Ok(())
    } else {
        Err(CoreError::MalformedRecord("non-canonical encoding".into()))
    }
}

fn get(map: &[(Value, Value)], key: u64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
        .map(|(_, v)| v)
}

fn req_text(map: &[(Value, Value)], key: u64, field: &str) -> Result<String, CoreError> {
    match get(map, key) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(CoreError::MalformedRecord(format!("invalid {field}"))),
    }
}

fn req_opt_text(map: &[(Value, Value)], key: u64, field: &str) -> Result<Option<String>, CoreError> {
    match get(map, key) {
        Some(Value::Text(s)) => Ok(Some(s.clone())),
        Some(Value::Null) | None => Ok(None),
        _ => Err(CoreError::MalformedRecord(format!("invalid {field}"))),
    }
}

fn req_i64(map: &[(Value, Value)], key: u64, field: &str) -> Result<i64, CoreError> {
    match get(map, key) {
        Some(Value::Integer(i)) => i64::try_from(i128::from(*i))
            .map_err(|_| CoreError::MalformedRecord(format!("{field} out of range"))),
        _ => Err(CoreError::MalformedRecord(format!("missing {field}"))),
    }
}

fn req_bytes<const N: usize>(
    map: &[(Value, Value)],
    key: u64,
    field: &str,
) -> Result<[u8; N], CoreError> {
    match get(map, key) {
        Some(Value::Bytes(b)) => b
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::MalformedRecord(format!("invalid {field} length"))),
        _ => Err(CoreError::MalformedRecord(format!("invalid {field}"))),
    }
}

/// Decode a version record from its canonical stored form.
pub fn decode_record(bytes: &[u8]) -> Result<VersionRecord, CoreError> {
    let map = decode_map(bytes)?;

    let record = VersionRecord {
        content: ContentId::new(req_text(&map, keys::CONTENT, "content")?),
        schema: req_opt_text(&map, keys::SCHEMA, "schema")?.map(ContentId::new),
        prev: req_opt_text(&map, keys::PREV, "prev")?.map(ContentId::new),
        name: req_text(&map, keys::NAME, "name")?,
        created: req_i64(&map, keys::CREATED, "created")?,
        updated: req_i64(&map, keys::UPDATED, "updated")?,
        key: Ed25519PublicKey(req_bytes::<32>(&map, keys::KEY, "key")?),
        url: req_opt_text(&map, keys::URL, "url")?,
        signature: Ed25519Signature(req_bytes::<64>(&map, keys::SIGNATURE, "signature")?),
    };

    ensure_canonical(bytes, &record_bytes(&record))?;
    Ok(record)
}

/// Decode a content commit.
pub fn decode_commit(bytes: &[u8]) -> Result<ContentCommit, CoreError> {
    let map = decode_map(bytes)?;

    let commit = ContentCommit {
        data: ContentId::new(req_text(&map, commit_keys::DATA, "data")?),
        comment: req_opt_text(&map, commit_keys::COMMENT, "comment")?,
        time: req_i64(&map, commit_keys::TIME, "time")?,
    };

    ensure_canonical(bytes, &commit_bytes(&commit))?;
    Ok(commit)
}

/// Decode a file map.
pub fn decode_file_map(bytes: &[u8]) -> Result<FileMap, CoreError> {
    let entries = decode_map(bytes)?;

    let mut map = FileMap::new();
    for (k, v) in entries {
        match (k, v) {
            (Value::Text(path), Value::Text(id)) => map.insert(path, ContentId::new(id))?,
            _ => return Err(CoreError::MalformedRecord("invalid file map entry".into())),
        }
    }

    ensure_canonical(bytes, &file_map_bytes(&map))?;
    Ok(map)
}
