//! Generated protobuf types for the Cairn wire protocol.
//!
//! This crate provides the Rust types generated from the `proto/`
//! definitions plus the conversions between wire messages and the domain
//! model in `cairn-core`. All cross-language contracts are defined via
//! Protobuf.

#![forbid(unsafe_code)]
#![allow(missing_docs)] // Generated code doesn't have docs

#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod generated {
    // Include generated code; all types are re-exported at crate root.
    include!(concat!(env!("OUT_DIR"), "/cairn.v1.rs"));
}

pub use generated::*;

pub mod convert;
pub mod status;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ref_roundtrips_through_prost() {
        use prost::Message;

        let record_ref = RecordRef {
            cid: "bafytestcid".to_string(),
        };
        let encoded = record_ref.encode_to_vec();
        let decoded = RecordRef::decode(encoded.as_slice()).expect("decode");
        assert_eq!(decoded.cid, "bafytestcid");
    }

    #[test]
    fn record_meta_annotations_are_ordered() {
        let mut meta = RecordMeta::default();
        meta.annotations.insert("z".into(), "1".into());
        meta.annotations.insert("a".into(), "2".into());

        // btree_map config keeps map fields deterministic.
        let keys: Vec<_> = meta.annotations.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "z".to_string()]);
    }
}
