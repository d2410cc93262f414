//! # modchain auth
//!
//! Signed, timestamped envelopes used to authenticate writes.
//!
//! A caller hashes its payload, stamps a time and cost, and signs the compact
//! JSON of `{data_hash, time, cost}`. The receiver rejects envelopes outside
//! the freshness window, with a bad signature, or whose hash does not match
//! the payload it actually received.
//!
//! ```rust
//! use modchain_auth::Auth;
//! use modchain_core::Keypair;
//!
//! let auth = Auth::default();
//! let keypair = Keypair::derive("k1");
//! let envelope = auth.sign("payload", &keypair).unwrap();
//! auth.verify_data(&envelope, "payload").unwrap();
//! ```

pub mod auth;
pub mod envelope;
pub mod error;

pub use auth::{Auth, AuthConfig, HashMode};
pub use envelope::Envelope;
pub use error::{AuthError, Result};
