//! CHAP verification (RFC 1994, RFC 2865 §5.3)

use thiserror::Error;

/// Value of a CHAP-Password attribute: CHAP identifier followed by the
/// 16-octet MD5 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapResponse {
    pub ident: u8,
    pub response: [u8; 16],
}

impl ChapResponse {
    pub const LENGTH: usize = 17;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChapError> {
        if bytes.len() != Self::LENGTH {
            return Err(ChapError::InvalidLength(bytes.len()));
        }
        let mut response = [0u8; 16];
        response.copy_from_slice(&bytes[1..]);
        Ok(ChapResponse {
            ident: bytes[0],
            response,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LENGTH);
        bytes.push(self.ident);
        bytes.extend_from_slice(&self.response);
        bytes
    }
}

/// Challenge taken from a CHAP-Challenge attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapChallenge {
    pub challenge: Vec<u8>,
}

impl ChapChallenge {
    pub const LENGTH: usize = 16;

    pub fn new(challenge: Vec<u8>) -> Self {
        ChapChallenge { challenge }
    }

    /// Challenge of exactly 16 octets, as BRAS equipment sends it.
    pub fn strict(challenge: &[u8]) -> Result<Self, ChapError> {
        if challenge.len() != Self::LENGTH {
            return Err(ChapError::InvalidChallengeLength(challenge.len()));
        }
        Ok(Self::new(challenge.to_vec()))
    }

    /// Fallback when the NAS sends no CHAP-Challenge (RFC 2865 §2.2).
    pub fn from_authenticator(authenticator: &[u8; 16]) -> Self {
        Self::new(authenticator.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.challenge
    }
}

/// MD5(ident ‖ password ‖ challenge)
pub fn compute_chap_response(ident: u8, password: &str, challenge: &[u8]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume([ident]);
    ctx.consume(password.as_bytes());
    ctx.consume(challenge);
    ctx.compute().0
}

pub fn verify_chap_response(
    chap_response: &ChapResponse,
    password: &str,
    challenge: &ChapChallenge,
) -> bool {
    compute_chap_response(chap_response.ident, password, challenge.as_bytes())
        == chap_response.response
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChapError {
    #[error("CHAP-Password must be 17 bytes, got {0}")]
    InvalidLength(usize),
    #[error("CHAP-Challenge must be 16 bytes, got {0}")]
    InvalidChallengeLength(usize),
}
