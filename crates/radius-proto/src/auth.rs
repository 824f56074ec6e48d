//! Authenticator computation and the User-Password cipher (RFC 2865 §3, §5.2;
//! RFC 2866 §3; RFC 5176 §2.3)

use crate::packet::{Packet, PacketError};
use rand::Rng;

pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// MD5 over the encoded packet with `authenticator` spliced into the header,
/// followed by the shared secret.
fn digest_with(packet: &Packet, authenticator: &[u8; 16], secret: &[u8]) -> Result<[u8; 16], PacketError> {
    let mut data = packet.encode()?;
    data[4..20].copy_from_slice(authenticator);
    data.extend_from_slice(secret);
    Ok(md5::compute(&data).0)
}

/// Response Authenticator = MD5(Code + ID + Length + RequestAuth + Attributes + Secret)
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest_with(packet, request_authenticator, secret)
}

pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|expected| expected == response.authenticator)
        .unwrap_or(false)
}

/// Request Authenticator for Accounting-Request, Disconnect-Request and
/// CoA-Request: the digest is taken with sixteen zero octets in the
/// authenticator field.
pub fn calculate_accounting_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest_with(packet, &[0u8; 16], secret)
}

pub fn verify_accounting_request_authenticator(packet: &Packet, secret: &[u8]) -> bool {
    calculate_accounting_request_authenticator(packet, secret)
        .map(|expected| expected == packet.authenticator)
        .unwrap_or(false)
}

/// Sign a response built with [`Packet::reply_to`].
pub fn sign_response(
    response: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), PacketError> {
    response.authenticator = calculate_response_authenticator(response, request_authenticator, secret)?;
    Ok(())
}

/// Sign a request whose authenticator is derived from its content.
pub fn sign_request(request: &mut Packet, secret: &[u8]) -> Result<(), PacketError> {
    request.authenticator = calculate_accounting_request_authenticator(request, secret)?;
    Ok(())
}

/// XOR `data` in 16-octet blocks with the MD5 chain seeded by `secret` and
/// `seed`. The chain feeds on ciphertext, so `encrypting` selects which
/// side of the XOR is carried forward.
fn md5_stream(data: &[u8], secret: &[u8], seed: &[u8], encrypting: bool) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len());
    let mut previous = seed.to_vec();

    for block in data.chunks(16) {
        let mut ctx = md5::Context::new();
        ctx.consume(secret);
        ctx.consume(&previous);
        let pad = ctx.compute();

        let transformed: Vec<u8> = block.iter().zip(pad.0.iter()).map(|(b, p)| b ^ p).collect();
        previous = if encrypting { transformed.clone() } else { block.to_vec() };
        output.extend_from_slice(&transformed);
    }
    output
}

/// Hide a User-Password value. Input is zero-padded to a multiple of 16 octets.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let padded_len = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(padded_len, 0);
    md5_stream(&padded, secret, authenticator, true)
}

pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<String, PacketError> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 || encrypted.len() > 128 {
        return Err(PacketError::AttributeError(format!(
            "User-Password length {} is not a multiple of 16 in 16..=128",
            encrypted.len()
        )));
    }

    let mut plain = md5_stream(encrypted, secret, authenticator, false);
    while plain.last() == Some(&0) {
        plain.pop();
    }
    String::from_utf8(plain)
        .map_err(|e| PacketError::AttributeError(format!("User-Password is not UTF-8: {}", e)))
}

/// Salt-encrypt a Tunnel-Password style value (RFC 2548 §2.4.2 / RFC 2868 §3.5).
///
/// The plaintext is prefixed with its length octet and zero-padded; the
/// two-octet salt must have its high bit set.
pub fn encrypt_salted(
    value: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Vec<u8> {
    let mut plain = Vec::with_capacity(value.len() + 16);
    plain.push(value.len() as u8);
    plain.extend_from_slice(value);
    let padded_len = plain.len().div_ceil(16) * 16;
    plain.resize(padded_len, 0);

    let mut seed = request_authenticator.to_vec();
    seed.extend_from_slice(&salt);

    let mut out = salt.to_vec();
    out.extend(md5_stream(&plain, secret, &seed, true));
    out
}

/// Random salt with the mandatory high bit.
pub fn generate_salt() -> [u8; 2] {
    let mut salt = [0u8; 2];
    rand::rng().fill(&mut salt);
    salt[0] |= 0x80;
    salt
}
