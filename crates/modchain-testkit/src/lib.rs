//! # modchain testkit
//!
//! Testing utilities for modchain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed encodings of commits and file maps
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A registry over a memory store and a temporary directory
//!
//! ## Golden Vectors
//!
//! ```rust
//! use modchain_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, hex) in verify_all_vectors() {
//!     assert!(ok, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use modchain_testkit::generators::file_tree;
//!
//! proptest! {
//!     #[test]
//!     fn tree_paths_are_valid(tree in file_tree(8)) {
//!         for path in tree.paths() {
//!             prop_assert!(modchain_core::validate_path(path).is_ok());
//!         }
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use modchain_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let files = fixture.files(&[("main.py", "print(1)")]);
//! assert_eq!(files.len(), 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, TestFixture};
pub use generators::{file_tree, module_name, RecordParams};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
