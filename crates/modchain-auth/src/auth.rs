//! Signing and verification of envelopes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use modchain_core::{now_millis, verify, Signer};

use crate::envelope::{signing_bytes, Envelope};
use crate::error::{AuthError, Result};

/// How payloads are reduced to the signed `data_hash`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Hex Blake3 of the compact JSON payload.
    #[default]
    Blake3,
    /// The compact JSON payload itself.
    Identity,
}

/// Configuration for [`Auth`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Freshness window. Envelopes further than this from now are stale.
    pub max_age: Duration,
    /// Payload hashing.
    pub hash: HashMode,
    /// Cost stamped on envelopes when none is given.
    pub default_cost: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            hash: HashMode::Blake3,
            default_cost: 1,
        }
    }
}

/// Signs payloads into envelopes and verifies them.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    config: AuthConfig,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Reduce a payload to its `data_hash`.
    pub fn hash<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let json = serde_json::to_string(payload)?;
        Ok(match self.config.hash {
            HashMode::Blake3 => blake3::hash(json.as_bytes()).to_hex().to_string(),
            HashMode::Identity => json,
        })
    }

    /// Sign `payload` now with the default cost.
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T, signer: &dyn Signer) -> Result<Envelope> {
        self.sign_at(payload, signer, now_millis(), self.config.default_cost)
    }

    /// Sign `payload` with an explicit time and cost.
    pub fn sign_at<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        signer: &dyn Signer,
        time: i64,
        cost: u64,
    ) -> Result<Envelope> {
        let data_hash = self.hash(payload)?;
        let signature = signer.sign(&signing_bytes(&data_hash, time, cost)?);

        Ok(Envelope {
            data_hash,
            time,
            cost,
            key: signer.address(),
            signature,
        })
    }

    /// Check freshness and signature.
    pub fn verify(&self, envelope: &Envelope) -> Result<()> {
        self.check(envelope, self.config.max_age, now_millis())
    }

    /// Check freshness, signature, and that `payload` is what was signed.
    pub fn verify_data<T: Serialize + ?Sized>(&self, envelope: &Envelope, payload: &T) -> Result<()> {
        self.verify(envelope)?;
        if self.hash(payload)? != envelope.data_hash {
            return Err(AuthError::DataMismatch);
        }
        Ok(())
    }

    /// Check freshness and signature with a per-call window.
    pub fn verify_with_max_age(&self, envelope: &Envelope, max_age: Duration) -> Result<()> {
        self.check(envelope, max_age, now_millis())
    }

    fn check(&self, envelope: &Envelope, max_age: Duration, now: i64) -> Result<()> {
        // Absolute difference: clocks ahead of ours are held to the same window.
        let age = Duration::from_millis(now.abs_diff(envelope.time));
        if age > max_age {
            debug!(?age, ?max_age, "rejecting stale envelope");
            return Err(AuthError::StaleEnvelope { age, max_age });
        }

        if !verify(&envelope.signing_bytes()?, &envelope.signature, &envelope.key) {
            return Err(AuthError::SignatureInvalid);
        }

        Ok(())
    }
}
