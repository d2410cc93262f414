//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use modchain_core::{ContentId, FileTree, Keypair, VersionRecord};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a content id in the hex Blake3 form the bundled stores produce.
pub fn content_id() -> impl Strategy<Value = ContentId> {
    any::<Vec<u8>>().prop_map(|bytes| ContentId::for_bytes(&bytes))
}

/// Generate a module name.
pub fn module_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,23}".prop_map(String::from)
}

/// Generate a relative file path of one to three segments.
pub fn file_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,7}(\\.py)?", 1..=3).prop_map(|parts| parts.join("/"))
}

/// Generate file contents of specified max length.
pub fn contents(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// Generate a file tree with up to `max_files` files.
///
/// A path that would also be a directory of another path is dropped.
pub fn file_tree(max_files: usize) -> impl Strategy<Value = FileTree> {
    prop::collection::btree_map(file_path(), contents(256), 1..=max_files.max(1)).prop_map(
        |files| {
            let mut tree = FileTree::new();
            for (path, data) in &files {
                let shadowed = files
                    .keys()
                    .any(|other| other.starts_with(&format!("{path}/")));
                if !shadowed {
                    let _ = tree.insert(path.clone(), data.clone());
                }
            }
            tree
        },
    )
}

/// Generate a reasonable timestamp in milliseconds.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Parameters for generating a version record.
#[derive(Debug, Clone)]
pub struct RecordParams {
    pub keypair: Keypair,
    pub name: String,
    pub content: ContentId,
    pub schema: Option<ContentId>,
    pub prev: Option<ContentId>,
    pub created: i64,
    pub age: i64,
    pub url: Option<String>,
}

impl Arbitrary for RecordParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(), // seed
            module_name(),
            content_id(),
            proptest::option::of(content_id()),
            proptest::option::of(content_id()),
            timestamp(),
            0i64..=86_400_000i64, // updated - created
            proptest::option::of("[a-z0-9.]{1,16}:[0-9]{2,5}"),
        )
            .prop_map(
                |(seed, name, content, schema, prev, created, age, url)| RecordParams {
                    keypair: Keypair::from_seed(&seed),
                    name,
                    content,
                    schema,
                    prev,
                    created,
                    age,
                    url,
                },
            )
            .boxed()
    }
}

impl RecordParams {
    /// Build and sign the record.
    pub fn record(&self) -> VersionRecord {
        let mut builder = VersionRecord::builder(self.name.clone(), self.content.clone())
            .schema(self.schema.clone())
            .url(self.url.clone())
            .created(self.created)
            .updated(self.created + self.age);

        if let Some(prev) = &self.prev {
            builder = builder.prev(prev.clone());
        }

        builder.sign(&self.keypair)
    }
}
