//! Version records: the atomic unit of module history.
//!
//! A version record is an immutable, signed snapshot pointer. Once created it
//! is never edited; a new version is a new record whose `prev` points at the
//! old one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::{Address, Ed25519Signature, Signer};
use crate::error::CoreError;
use crate::tree::validate_path;
use crate::types::ContentId;

/// One signed version of a module.
///
/// The record's own id is whatever the content-addressable backend returns
/// for [`VersionRecord::to_bytes`]; it is never stored inside the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Id of the [`ContentCommit`] for this version.
    pub content: ContentId,

    /// Id of the serialized interface description, if one was registered.
    pub schema: Option<ContentId>,

    /// Id of the previous version for this (owner, name), `None` for the first.
    pub prev: Option<ContentId>,

    /// Module name.
    pub name: String,

    /// Creation time of the first version (Unix milliseconds).
    pub created: i64,

    /// Time this version was made (Unix milliseconds).
    pub updated: i64,

    /// Owner address. Fixed for the lifetime of the module.
    pub key: Address,

    /// Optional hint where the module is currently served.
    pub url: Option<String>,

    /// Ed25519 signature over every field above.
    pub signature: Ed25519Signature,
}

impl VersionRecord {
    /// Start building a record for `name` pointing at `content`.
    pub fn builder(name: impl Into<String>, content: ContentId) -> VersionRecordBuilder {
        VersionRecordBuilder::new(name, content)
    }

    /// The exact bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        canonical::record_signing_bytes(self)
    }

    /// The canonical stored form (signed fields plus signature).
    pub fn to_bytes(&self) -> Vec<u8> {
        canonical::record_bytes(self)
    }

    /// Decode a record from its canonical stored form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        canonical::decode_record(bytes)
    }

    /// Set the key to `signer`'s address and sign every other field.
    pub fn signed_by(mut self, signer: &dyn Signer) -> Self {
        self.key = signer.address();
        self.signature = signer.sign(&self.signing_bytes());
        self
    }

    /// Whether the signature is still the all-zero placeholder.
    pub fn is_unsigned(&self) -> bool {
        self.signature == Ed25519Signature::ZERO
    }

    /// Check the signature against the record's own key.
    pub fn verify_signature(&self) -> Result<(), CoreError> {
        self.key.verify(&self.signing_bytes(), &self.signature)
    }

    /// Owner address.
    pub fn owner(&self) -> &Address {
        &self.key
    }

    /// Whether this is the first version of its module.
    pub fn is_genesis(&self) -> bool {
        self.prev.is_none()
    }

    /// Creation time in fractional seconds.
    pub fn created_secs(&self) -> f64 {
        self.created as f64 / 1000.0
    }

    /// Update time in fractional seconds.
    pub fn updated_secs(&self) -> f64 {
        self.updated as f64 / 1000.0
    }
}

/// Builder for creating signed version records.
pub struct VersionRecordBuilder {
    content: ContentId,
    schema: Option<ContentId>,
    prev: Option<ContentId>,
    name: String,
    created: Option<i64>,
    updated: i64,
    url: Option<String>,
}

impl VersionRecordBuilder {
    /// Start building a record.
    pub fn new(name: impl Into<String>, content: ContentId) -> Self {
        Self {
            content,
            schema: None,
            prev: None,
            name: name.into(),
            created: None,
            updated: 0,
            url: None,
        }
    }

    /// Set the schema blob id.
    pub fn schema(mut self, schema: Option<ContentId>) -> Self {
        self.schema = schema;
        self
    }

    /// Set the previous record id.
    pub fn prev(mut self, prev: ContentId) -> Self {
        self.prev = Some(prev);
        self
    }

    /// Carry over the creation time of an earlier version.
    pub fn created(mut self, ts: i64) -> Self {
        self.created = Some(ts);
        self
    }

    /// Set the update time. Also the creation time unless `created` is set.
    pub fn updated(mut self, ts: i64) -> Self {
        self.updated = ts;
        self
    }

    /// Set the url hint.
    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    /// Build the record for `key` with a zero signature, to be signed
    /// elsewhere over [`VersionRecord::signing_bytes`].
    pub fn unsigned(self, key: Address) -> VersionRecord {
        VersionRecord {
            content: self.content,
            schema: self.schema,
            prev: self.prev,
            name: self.name,
            created: self.created.unwrap_or(self.updated),
            updated: self.updated,
            key,
            url: self.url,
            signature: Ed25519Signature::ZERO,
        }
    }

    /// Build and sign the record.
    pub fn sign(self, signer: &dyn Signer) -> VersionRecord {
        self.unsigned(signer.address()).signed_by(signer)
    }
}

/// Wraps a file map with commit metadata.
///
/// Kept apart from the file map so the comment and time never change the id
/// used to detect unchanged content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCommit {
    /// Id of the [`FileMap`].
    pub data: ContentId,
    pub comment: Option<String>,
    /// Unix milliseconds.
    pub time: i64,
}

impl ContentCommit {
    pub fn new(data: ContentId, comment: Option<String>, time: i64) -> Self {
        Self { data, comment, time }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        canonical::commit_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        canonical::decode_commit(bytes)
    }
}

/// Ordered mapping of relative file path to blob id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMap {
    entries: BTreeMap<String, ContentId>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path. Rejects paths that would escape a module directory.
    pub fn insert(&mut self, path: impl Into<String>, id: ContentId) -> Result<(), CoreError> {
        let path = path.into();
        validate_path(&path)?;
        self.entries.insert(path, id);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ContentId> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContentId)> {
        self.entries.iter().map(|(p, id)| (p.as_str(), id))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every blob id referenced by this map.
    pub fn blob_ids(&self) -> impl Iterator<Item = &ContentId> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        canonical::file_map_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        canonical::decode_file_map(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn record(keypair: &Keypair) -> VersionRecord {
        VersionRecord::builder("calc", ContentId::for_bytes(b"commit"))
            .updated(1_736_870_400_000)
            .sign(keypair)
    }

    #[test]
    fn test_builder_sets_created_from_updated() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let r = record(&keypair);
        assert_eq!(r.created, r.updated);
        assert!(r.is_genesis());
        assert_eq!(r.key, keypair.public_key());
        assert!(r.verify_signature().is_ok());
    }

    #[test]
    fn test_builder_keeps_created() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let r = VersionRecord::builder("calc", ContentId::for_bytes(b"c2"))
            .prev(ContentId::for_bytes(b"v1"))
            .created(1000)
            .updated(2000)
            .sign(&keypair);
        assert_eq!(r.created, 1000);
        assert_eq!(r.updated, 2000);
        assert!(!r.is_genesis());
        assert_eq!(r.created_secs(), 1.0);
    }

    #[test]
    fn test_tampered_fields_fail_verification() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let original = record(&keypair);

        let mut r = original.clone();
        r.name = "calc2".into();
        assert!(r.verify_signature().is_err());

        let mut r = original.clone();
        r.updated += 1;
        assert!(r.verify_signature().is_err());

        let mut r = original.clone();
        r.prev = Some(ContentId::for_bytes(b"forged"));
        assert!(r.verify_signature().is_err());

        let mut r = original.clone();
        r.url = Some("http://elsewhere".into());
        assert!(r.verify_signature().is_err());

        let mut r = original;
        r.key = Keypair::generate().public_key();
        assert!(r.verify_signature().is_err());
    }

    #[test]
    fn test_file_map_rejects_bad_paths() {
        let mut map = FileMap::new();
        assert!(map.insert("../x", ContentId::new("a")).is_err());
        assert!(map.insert("ok/x.py", ContentId::new("a")).is_ok());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_unsigned_then_signed_elsewhere() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let unsigned = VersionRecord::builder("calc", ContentId::for_bytes(b"commit"))
            .updated(1_000)
            .unsigned(keypair.public_key());
        assert!(unsigned.is_unsigned());
        assert!(unsigned.verify_signature().is_err());

        let mut signed = unsigned.clone();
        signed.signature = keypair.sign(&unsigned.signing_bytes());
        assert!(signed.verify_signature().is_ok());
        assert_eq!(signed, unsigned.signed_by(&keypair));
    }
}
