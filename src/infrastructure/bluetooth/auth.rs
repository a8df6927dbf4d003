//! Device authentication: challenge/response cipher and hardware
//! classification.
//!
//! The dongle proves itself by encrypting a version-keyed plaintext with a
//! key derived from its own SystemID. The plaintext table is a shared
//! secret baked into every client of this protocol, an inherited weakness
//! of the wire format, kept for compatibility rather than "fixed".

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use crate::domain::models::HardwareType;
use crate::error::AuthError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Bytes of ciphertext proof compared on the wire.
pub const PROOF_LEN: usize = 16;
/// Minimum challenge-response payload: opcode echo + 16 proof bytes.
pub const MIN_RESPONSE_LEN: usize = PROOF_LEN + 1;

/// Fixed plaintexts keyed by the first three characters of the
/// software-revision string. Versions absent from the table fail
/// verification outright; the protocol never guesses.
const AUTH_PLAINTEXTS: &[(&str, &str)] = &[
    ("1.0", "EmulStickAuth-G1"),
    ("2.0", "EmulStickAuth-G2"),
];

/// Best-effort dongle-generation heuristic over the hardware-revision
/// string. Vendor firmware strings are not a formal identification
/// protocol; unmatched strings fall back to Unknown, which downstream
/// code treats as legacy.
pub fn classify_hardware(hardware_version: &str) -> HardwareType {
    let hw = hardware_version.to_ascii_uppercase();
    if hw.contains("ESP32-S3") {
        HardwareType::ModernUnicodeCapable
    } else if hw.contains("TI") || hw.contains("CC2650") {
        HardwareType::LegacyTi
    } else if hw.contains("WCH") || hw.contains("CH582") {
        HardwareType::LegacyWch
    } else {
        HardwareType::Unknown
    }
}

/// Plaintext for a software-revision string, keyed by its first 3 chars.
pub fn plaintext_for(software_version: &str) -> Option<&'static str> {
    let key: String = software_version.chars().take(3).collect();
    AUTH_PLAINTEXTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, plaintext)| *plaintext)
}

/// AES-256 key: SHA-256 over the lowercase hex rendering of the SystemID.
pub fn derive_key(system_id: &[u8; 8]) -> [u8; 32] {
    let hex: String = system_id.iter().map(|b| format!("{b:02x}")).collect();
    let digest = Sha256::digest(hex.as_bytes());
    digest.into()
}

/// The 16 proof bytes this client expects from a genuine dongle:
/// AES-256-CBC (zero IV, PKCS7) over the plaintext, Base64-encoded,
/// truncated to the first 16 characters as UTF-8 bytes.
pub fn expected_proof(system_id: &[u8; 8], plaintext: &str) -> [u8; PROOF_LEN] {
    let key = derive_key(system_id);
    let iv = [0u8; 16];
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    let encoded = BASE64.encode(ciphertext);

    let mut proof = [0u8; PROOF_LEN];
    // Base64 of a full AES block is always longer than 16 characters.
    proof.copy_from_slice(&encoded.as_bytes()[..PROOF_LEN]);
    proof
}

/// Pull the 16 proof bytes out of a challenge-response notification
/// (`[echo, proof[0..16], ..]`). Short payloads yield `None`.
pub fn extract_proof(payload: &[u8]) -> Option<&[u8]> {
    if payload.len() < MIN_RESPONSE_LEN {
        return None;
    }
    Some(&payload[1..1 + PROOF_LEN])
}

/// Compare the dongle's proof bytes against the locally computed ones.
pub fn verify(
    system_id: &[u8; 8],
    software_version: &str,
    proof: &[u8],
) -> Result<(), AuthError> {
    let plaintext = plaintext_for(software_version)
        .ok_or_else(|| AuthError::UnsupportedVersion(software_version.to_string()))?;

    if expected_proof(system_id, plaintext) == proof {
        Ok(())
    } else {
        Err(AuthError::CiphertextMismatch)
    }
}
