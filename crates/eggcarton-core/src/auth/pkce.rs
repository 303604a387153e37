//! PKCE verifier/challenge generation (RFC 7636, S256 only)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::error::EntropyError;

/// Raw random bytes behind each verifier (encodes to 43 characters)
const VERIFIER_BYTES: usize = 32;

/// The only challenge method we send
pub const CHALLENGE_METHOD: &str = "S256";

/// A single-use verifier and the challenge derived from it.
///
/// Lives only for one login attempt. The challenge goes into the
/// authorization URL; the verifier is consumed by the code exchange.
#[derive(Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Draw a fresh verifier from the OS random source and derive its challenge.
    ///
    /// Fails if the OS source is unavailable rather than falling back to a
    /// weaker generator.
    pub fn generate() -> Result<Self, EntropyError> {
        let mut bytes = [0u8; VERIFIER_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;

        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);

        Ok(Self {
            verifier,
            challenge,
        })
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Split into (verifier, challenge)
    pub fn into_parts(self) -> (String, String) {
        (self.verifier, self.challenge)
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// BASE64URL(SHA256(ASCII(verifier))), unpadded
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
