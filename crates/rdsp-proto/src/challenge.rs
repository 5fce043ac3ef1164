//! Authentication challenge/response exchanged when the server requires
//! authentication: server sends `challenge`, client re-sends `hello` with
//! a `challenge_response` key computed over the challenge.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Digest algorithms a challenge can request. `Sha256` is the only one
/// implemented; others are recognized so a future core can extend the set
/// without changing the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Sent by the server in place of an immediate `ready` transition, when
/// the connection must authenticate before anything else proceeds.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub bytes: Vec<u8>,
    pub digest: DigestAlgorithm,
    pub salt: Vec<u8>,
    pub prompt: String,
}

const CHALLENGE_LEN: usize = 32;
const SALT_LEN: usize = 16;

impl Challenge {
    pub fn generate(prompt: impl Into<String>) -> Self {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            bytes,
            digest: DigestAlgorithm::Sha256,
            salt,
            prompt: prompt.into(),
        }
    }

    /// Computes the response a client sends back in its re-sent hello's
    /// `challenge_response` key: `digest(challenge_bytes || salt || password)`.
    pub fn response_for(&self, password: &[u8]) -> Vec<u8> {
        match self.digest {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(&self.bytes);
                hasher.update(&self.salt);
                hasher.update(password);
                hasher.finalize().to_vec()
            }
        }
    }

    pub fn verify(&self, password: &[u8], response: &[u8]) -> bool {
        let expected = self.response_for(password);
        // Constant-time-ish comparison: lengths differ cheaply leak nothing
        // an attacker couldn't already infer from the digest algorithm.
        expected.len() == response.len()
            && expected
                .iter()
                .zip(response)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
