//! Canonical record serialization for deterministic CID computation.
//!
//! Canonicalization is a two-step process:
//!
//! 1. The variant payload is serialized to structural JSON with stable
//!    snake_case field names, unset optional fields omitted, single-line
//!    output.
//! 2. That JSON is parsed into a generic tree and re-serialized with
//!    lexicographically sorted object keys at every nesting depth. Sequences
//!    keep their original order.
//!
//! The second step is what makes the encoding independent of the runtime's
//! map iteration order, so any producer that follows both steps yields
//! byte-identical output for the same record.
//!
//! Floats are rejected everywhere, including extension payloads: float
//! stringification is not portable across languages, and canonical bytes
//! must be reproducible by every implementation. Use integers (millis,
//! bytes, basis points) for numeric values.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::record::{AgentV1, AgentV2, AgentV3, Record, SchemaVersion};

/// Serializes any value into canonical JSON bytes.
///
/// Canonical JSON has object keys sorted by UTF-8 byte order, no whitespace,
/// UTF-8 output and integer-only numbers.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] if the value cannot be serialized or
/// contains float values.
#[must_use = "canonical bytes should be used for hashing or storage"]
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)
        .map_err(|e| Error::InvalidRecord(format!("serialization failed: {e}")))?;
    let mut out = Vec::<u8>::new();
    write_value(&v, &mut out)?;
    Ok(out)
}

/// Encodes a record into its canonical byte form.
///
/// The payload is serialized flat, carrying its `schema_version` field, so
/// the variant identity is part of the canonical bytes. An all-default
/// payload canonicalizes to `{}`.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] when serialization fails or the payload
/// contains floats.
pub fn canonical(record: &Record) -> Result<Vec<u8>> {
    match record {
        Record::V1(a) => to_canonical_bytes(a),
        Record::V2(a) => to_canonical_bytes(a),
        Record::V3(a) => to_canonical_bytes(a),
    }
}

/// Encodes an optional record, mapping absence to empty bytes.
///
/// Streams use `None` to represent holes; those canonicalize to zero bytes
/// rather than an error.
///
/// # Errors
///
/// Propagates [`canonical`] errors for present records.
pub fn canonical_opt(record: Option<&Record>) -> Result<Vec<u8>> {
    record.map_or_else(|| Ok(Vec::new()), canonical)
}

/// Decodes canonical bytes back into a record.
///
/// The variant is selected by the top-level `schema_version` field via
/// [`detect_version`]; the rest of the document is deserialized into that
/// variant's payload.
///
/// # Errors
///
/// Returns [`Error::InvalidEncoding`] on malformed input and
/// [`Error::UnsupportedVersion`] on unknown variant tags.
pub fn decode(bytes: &[u8]) -> Result<Record> {
    if bytes.is_empty() {
        return Err(Error::InvalidEncoding("empty input".to_string()));
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidEncoding(format!("malformed JSON: {e}")))?;
    if !value.is_object() {
        return Err(Error::InvalidEncoding(
            "record document must be a JSON object".to_string(),
        ));
    }

    let version = detect_version_value(&value)?;
    let record = match version {
        SchemaVersion::V1Alpha1 => Record::V1(from_value::<AgentV1>(value)?),
        SchemaVersion::V1Alpha2 => Record::V2(from_value::<AgentV2>(value)?),
        SchemaVersion::V1Alpha3 => Record::V3(from_value::<AgentV3>(value)?),
    };
    Ok(record)
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidEncoding(format!("payload does not match schema: {e}")))
}

/// Detects the schema version of a raw record document.
///
/// A document without a `schema_version` field defaults to the earliest
/// supported variant (`v1alpha1`); a warning is logged because producers
/// are expected to tag their records explicitly.
///
/// # Errors
///
/// Returns [`Error::InvalidEncoding`] on malformed input and
/// [`Error::UnsupportedVersion`] on unknown tags.
pub fn detect_version(bytes: &[u8]) -> Result<SchemaVersion> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidEncoding(format!("malformed JSON: {e}")))?;
    detect_version_value(&value)
}

fn detect_version_value(value: &Value) -> Result<SchemaVersion> {
    match value.get("schema_version") {
        Some(Value::String(tag)) if !tag.is_empty() => SchemaVersion::parse(tag),
        Some(Value::String(_)) | None => {
            tracing::warn!(
                default = SchemaVersion::V1Alpha1.as_str(),
                "record has no schema_version, defaulting to earliest supported variant"
            );
            Ok(SchemaVersion::V1Alpha1)
        }
        Some(other) => Err(Error::InvalidEncoding(format!(
            "schema_version must be a string, got {other}"
        ))),
    }
}

fn write_value(v: &Value, out: &mut Vec<u8>) -> Result<()> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => {
            // serde_json writes the quoted, escaped form with no whitespace.
            serde_json::to_writer(&mut *out, s)
                .map_err(|e| Error::Internal(format!("string write failed: {e}")))?;
        }
        Value::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<()> {
    out.push(b'{');

    // Sort keys by UTF-8 byte order regardless of insertion order.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, *k)
            .map_err(|e| Error::Internal(format!("key write failed: {e}")))?;
        out.push(b':');
        if let Some(val) = map.get(*k) {
            write_value(val, out)?;
        }
    }

    out.push(b'}');
    Ok(())
}

fn write_number(n: &Number, out: &mut Vec<u8>) -> Result<()> {
    use std::io::Write;

    if let Some(i) = n.as_i64() {
        write!(out, "{i}").map_err(|e| Error::Internal(format!("number write failed: {e}")))?;
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        write!(out, "{u}").map_err(|e| Error::Internal(format!("number write failed: {e}")))?;
        return Ok(());
    }

    // serde_json::Number only stores a float when the value does not fit an
    // integer, so reaching here means the payload carried a float.
    Err(Error::InvalidRecord(
        "float values are not allowed in record payloads (use integers)".to_string(),
    ))
}
