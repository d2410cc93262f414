//! Golden test vectors for deterministic verification.
//!
//! Commits and file maps contain no key material, so their canonical bytes
//! are fixed here in hex. Records are checked for determinism and for
//! surviving a decode unchanged.

use modchain_core::{ContentCommit, ContentId, FileMap, Keypair, VersionRecord};

/// What a golden vector encodes.
#[derive(Debug, Clone)]
pub enum VectorInput {
    Commit {
        data: &'static str,
        comment: Option<&'static str>,
        time: i64,
    },
    FileMap(&'static [(&'static str, &'static str)]),
    Record {
        seed: [u8; 32],
        name: &'static str,
        content: &'static str,
        prev: Option<&'static str>,
        created: i64,
        updated: i64,
    },
}

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub input: VectorInput,
    /// Expected canonical bytes (hex). Empty when the bytes depend on a key.
    pub expected_hex: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "commit with comment",
            input: VectorInput::Commit {
                data: "ab",
                comment: Some("hi"),
                time: 1000,
            },
            expected_hex: "a30062616201626869021903e8",
        },
        GoldenVector {
            name: "commit without comment",
            input: VectorInput::Commit {
                data: "x",
                comment: None,
                time: 0,
            },
            expected_hex: "a300617801f60200",
        },
        GoldenVector {
            name: "file map sorted by encoded key",
            input: VectorInput::FileMap(&[("a.py", "x"), ("b", "y")]),
            expected_hex: "a26162617964612e70796178",
        },
        GoldenVector {
            name: "empty file map",
            input: VectorInput::FileMap(&[]),
            expected_hex: "a0",
        },
        GoldenVector {
            name: "genesis record",
            input: VectorInput::Record {
                seed: [0x42; 32],
                name: "calc",
                content: "c0ffee",
                prev: None,
                created: 1736870400000,
                updated: 1736870400000,
            },
            expected_hex: "",
        },
        GoldenVector {
            name: "linked record",
            input: VectorInput::Record {
                seed: [0x42; 32],
                name: "calc",
                content: "beef",
                prev: Some("c0ffee"),
                created: 1736870400000,
                updated: 1736870401000,
            },
            expected_hex: "",
        },
    ]
}

/// Canonical bytes for a vector.
pub fn encode_vector(vector: &GoldenVector) -> Vec<u8> {
    match &vector.input {
        VectorInput::Commit {
            data,
            comment,
            time,
        } => ContentCommit::new(ContentId::new(*data), comment.map(str::to_string), *time)
            .to_bytes(),
        VectorInput::FileMap(entries) => {
            let mut map = FileMap::new();
            for (path, id) in entries.iter() {
                // Vector paths are valid by construction
                let _ = map.insert(*path, ContentId::new(*id));
            }
            map.to_bytes()
        }
        VectorInput::Record { .. } => record_from_vector(vector)
            .map(|r| r.to_bytes())
            .unwrap_or_default(),
    }
}

/// Build and sign the record of a record vector.
pub fn record_from_vector(vector: &GoldenVector) -> Option<VersionRecord> {
    let VectorInput::Record {
        seed,
        name,
        content,
        prev,
        created,
        updated,
    } = &vector.input
    else {
        return None;
    };

    let keypair = Keypair::from_seed(seed);
    let mut builder = VersionRecord::builder(*name, ContentId::new(*content))
        .created(*created)
        .updated(*updated);
    if let Some(prev) = prev {
        builder = builder.prev(ContentId::new(*prev));
    }
    Some(builder.sign(&keypair))
}

/// Verify all golden vectors.
///
/// Returns `(name, passed, actual hex)` for each vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let bytes = encode_vector(v);
            let hex = hex::encode(&bytes);

            let passed = if v.expected_hex.is_empty() {
                // Key-dependent: deterministic and stable under decode
                let again = encode_vector(v);
                let decoded = VersionRecord::from_bytes(&bytes);
                !bytes.is_empty()
                    && bytes == again
                    && decoded.map(|r| r.verify_signature().is_ok()).unwrap_or(false)
            } else {
                hex == v.expected_hex
            };

            (v.name.to_string(), passed, hex)
        })
        .collect()
}
