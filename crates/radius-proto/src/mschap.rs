//! MS-CHAP version 2 (RFC 2759) and MPPE key derivation (RFC 3079)
//!
//! The NAS relays the peer's MS-CHAP2-Response together with the
//! MS-CHAP-Challenge it issued. Verification recomputes the NT-Response from
//! the cleartext password; on success the server answers with the
//! authenticator response and the MPPE session keys the NAS needs to
//! encrypt the link.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use md4::Md4;
use sha1::{Digest, Sha1};
use thiserror::Error;

const AUTH_MAGIC_1: &[u8] = b"Magic server to client signing constant";
const AUTH_MAGIC_2: &[u8] = b"Pad to make it do more than one iteration";

const MPPE_MAGIC_1: &[u8] = b"This is the MPPE Master Key";
const MPPE_MAGIC_2: &[u8] =
    b"On the client side, this is the send key; on the server side, it is the receive key.";
const MPPE_MAGIC_3: &[u8] =
    b"On the client side, this is the receive key; on the server side, it is the send key.";
const SHS_PAD_1: [u8; 40] = [0x00; 40];
const SHS_PAD_2: [u8; 40] = [0xF2; 40];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsChapError {
    #[error("MS-CHAP-Challenge must be 16 bytes, got {0}")]
    InvalidChallengeLength(usize),
    #[error("MS-CHAP2-Response must be 50 bytes, got {0}")]
    InvalidResponseLength(usize),
    #[error("MS-CHAP2 NT-Response mismatch")]
    ResponseMismatch,
}

/// Parsed MS-CHAP2-Response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChapV2Response {
    pub ident: u8,
    pub peer_challenge: [u8; 16],
    pub nt_response: [u8; 24],
}

impl MsChapV2Response {
    pub const LENGTH: usize = 50;

    /// Layout: ident(1) flags(1) peer-challenge(16) reserved(8) nt-response(24)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MsChapError> {
        if bytes.len() != Self::LENGTH {
            return Err(MsChapError::InvalidResponseLength(bytes.len()));
        }
        let mut peer_challenge = [0u8; 16];
        peer_challenge.copy_from_slice(&bytes[2..18]);
        let mut nt_response = [0u8; 24];
        nt_response.copy_from_slice(&bytes[26..50]);
        Ok(MsChapV2Response {
            ident: bytes[0],
            peer_challenge,
            nt_response,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; Self::LENGTH];
        bytes[0] = self.ident;
        bytes[2..18].copy_from_slice(&self.peer_challenge);
        bytes[26..50].copy_from_slice(&self.nt_response);
        bytes
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChapV2Success {
    pub ident: u8,
    /// "S=" followed by 40 upper-case hex digits
    pub authenticator_response: String,
    pub send_key: [u8; 16],
    pub recv_key: [u8; 16],
}

impl MsChapV2Success {
    /// MS-CHAP2-Success value: ident followed by the authenticator response (43 bytes).
    pub fn success_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(1 + self.authenticator_response.len());
        value.push(self.ident);
        value.extend_from_slice(self.authenticator_response.as_bytes());
        value
    }
}

/// MD4 of the UTF-16LE password.
pub fn nt_password_hash(password: &str) -> [u8; 16] {
    let unicode: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    md4(&unicode)
}

pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    md4(password_hash)
}

fn md4(data: &[u8]) -> [u8; 16] {
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&Md4::digest(data));
    hash
}

/// First 8 octets of SHA1(peer-challenge ‖ authenticator-challenge ‖ username).
pub fn challenge_hash(
    peer_challenge: &[u8; 16],
    authenticator_challenge: &[u8; 16],
    username: &str,
) -> [u8; 8] {
    let digest = Sha1::new()
        .chain_update(peer_challenge)
        .chain_update(authenticator_challenge)
        .chain_update(username.as_bytes())
        .finalize();
    let mut hash = [0u8; 8];
    hash.copy_from_slice(&digest[..8]);
    hash
}

/// Spread 56 key bits over 8 octets, leaving the parity bit (LSB) clear.
fn des_key(raw: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[0] = raw[0] & 0xFE;
    key[1] = (raw[0] << 7) | (raw[1] >> 1);
    key[2] = (raw[1] << 6) | (raw[2] >> 2);
    key[3] = (raw[2] << 5) | (raw[3] >> 3);
    key[4] = (raw[3] << 4) | (raw[4] >> 4);
    key[5] = (raw[4] << 3) | (raw[5] >> 5);
    key[6] = (raw[5] << 2) | (raw[6] >> 6);
    key[7] = raw[6] << 1;
    for octet in key.iter_mut() {
        *octet &= 0xFE;
    }
    key
}

fn des_encrypt(raw_key: &[u8], clear: &[u8; 8]) -> [u8; 8] {
    let key = des_key(raw_key);
    let cipher = Des::new(GenericArray::from_slice(&key));
    let mut block = GenericArray::clone_from_slice(&clear[..]);
    cipher.encrypt_block(&mut block);
    let mut out = [0u8; 8];
    out.copy_from_slice(&block);
    out
}

/// DES-encrypt the challenge under three keys cut from the zero-padded hash.
pub fn challenge_response(challenge: &[u8; 8], password_hash: &[u8; 16]) -> [u8; 24] {
    let mut padded = [0u8; 21];
    padded[..16].copy_from_slice(password_hash);

    let mut response = [0u8; 24];
    for (i, raw_key) in padded.chunks(7).enumerate() {
        response[i * 8..(i + 1) * 8].copy_from_slice(&des_encrypt(raw_key, challenge));
    }
    response
}

pub fn generate_nt_response(
    authenticator_challenge: &[u8; 16],
    peer_challenge: &[u8; 16],
    username: &str,
    password: &str,
) -> [u8; 24] {
    let challenge = challenge_hash(peer_challenge, authenticator_challenge, username);
    challenge_response(&challenge, &nt_password_hash(password))
}

pub fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; 24],
    peer_challenge: &[u8; 16],
    authenticator_challenge: &[u8; 16],
    username: &str,
) -> String {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));

    let digest = Sha1::new()
        .chain_update(password_hash_hash)
        .chain_update(nt_response)
        .chain_update(AUTH_MAGIC_1)
        .finalize();
    let challenge = challenge_hash(peer_challenge, authenticator_challenge, username);
    let digest = Sha1::new()
        .chain_update(digest)
        .chain_update(challenge)
        .chain_update(AUTH_MAGIC_2)
        .finalize();

    let hex: String = digest.iter().map(|b| format!("{:02X}", b)).collect();
    format!("S={}", hex)
}

pub fn master_key(password_hash_hash: &[u8; 16], nt_response: &[u8; 24]) -> [u8; 16] {
    let digest = Sha1::new()
        .chain_update(password_hash_hash)
        .chain_update(nt_response)
        .chain_update(MPPE_MAGIC_1)
        .finalize();
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

pub fn asymmetric_start_key(master_key: &[u8; 16], is_send: bool, is_server: bool) -> [u8; 16] {
    let magic = if is_send == is_server {
        MPPE_MAGIC_3
    } else {
        MPPE_MAGIC_2
    };
    let digest = Sha1::new()
        .chain_update(master_key)
        .chain_update(SHS_PAD_1)
        .chain_update(magic)
        .chain_update(SHS_PAD_2)
        .finalize();
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// 128-bit MPPE keys from the server's point of view: `(send, recv)`.
pub fn mppe_keys(password: &str, nt_response: &[u8; 24]) -> ([u8; 16], [u8; 16]) {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));
    let master = master_key(&password_hash_hash, nt_response);
    (
        asymmetric_start_key(&master, true, true),
        asymmetric_start_key(&master, false, true),
    )
}

/// Verify an MS-CHAP2-Response against the cleartext password.
pub fn verify_mschap_v2(
    authenticator_challenge: &[u8],
    response: &[u8],
    username: &str,
    password: &str,
) -> Result<MsChapV2Success, MsChapError> {
    let authenticator_challenge: [u8; 16] = authenticator_challenge
        .try_into()
        .map_err(|_| MsChapError::InvalidChallengeLength(authenticator_challenge.len()))?;
    let response = MsChapV2Response::from_bytes(response)?;

    let expected = generate_nt_response(
        &authenticator_challenge,
        &response.peer_challenge,
        username,
        password,
    );
    if expected != response.nt_response {
        return Err(MsChapError::ResponseMismatch);
    }

    let (send_key, recv_key) = mppe_keys(password, &response.nt_response);
    Ok(MsChapV2Success {
        ident: response.ident,
        authenticator_response: generate_authenticator_response(
            password,
            &response.nt_response,
            &response.peer_challenge,
            &authenticator_challenge,
            username,
        ),
        send_key,
        recv_key,
    })
}
