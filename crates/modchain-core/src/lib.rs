//! # modchain core
//!
//! Pure primitives for modchain: version records, content commits, file maps
//! and their canonical encoding.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`VersionRecord`] - One signed, immutable version of a module
//! - [`ContentCommit`] - Wraps a file map with a comment and time
//! - [`FileMap`] - Relative path to blob id mapping
//! - [`ContentId`] - Opaque content-addressed identifier
//! - [`Keypair`] / [`Signer`] - Ed25519 signing identities
//!
//! ## Canonicalization
//!
//! Everything stored in a content-addressable backend is encoded using
//! deterministic CBOR. See the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod record;
pub mod tree;
pub mod types;
pub mod validation;

pub use canonical::{decode_commit, decode_file_map, decode_record, record_signing_bytes};
pub use crypto::{verify, Address, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, Signer};
pub use error::{CoreError, ValidationError};
pub use keystore::{KeyStore, MemoryKeyStore};
pub use record::{ContentCommit, FileMap, VersionRecord, VersionRecordBuilder};
pub use tree::{validate_module_name, validate_path, FileTree};
pub use types::{now_millis, ContentId};
pub use validation::{validate_link, validate_record, validate_record_structure};
