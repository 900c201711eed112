//! AES-256-CBC decryption of provider webhook payloads.
//!
//! The provider sends the payload as hex-encoded ciphertext, PKCS#7 padded, encrypted with a key and IV that are
//! shared out of band. The plaintext must be a JSON object.
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use dpg_common::Secret;
use serde_json::{Map, Value};
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;
const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("{0} is not valid hex")]
    InvalidHex(&'static str),
    #[error("{name} must be {expected} bytes long, but is {actual} bytes")]
    InvalidLength { name: &'static str, expected: usize, actual: usize },
}

#[derive(Debug, Clone, Error)]
pub enum DecryptionError {
    #[error("Payload is not valid hex. {0}")]
    InvalidHex(String),
    #[error("Ciphertext length of {0} bytes is not a positive multiple of the block size")]
    InvalidLength(usize),
    #[error("Ciphertext could not be decrypted. The key, IV or padding is wrong.")]
    BadPadding,
    #[error("Decrypted payload is not valid UTF-8")]
    NotUtf8,
    #[error("Decrypted payload is not a JSON object. {0}")]
    NotJsonObject(String),
}

/// Decrypts provider payloads. Holds only the key material, so it is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct PayloadDecryptor {
    key: Secret<[u8; KEY_LENGTH]>,
    iv: Secret<[u8; IV_LENGTH]>,
}

impl PayloadDecryptor {
    /// Builds a decryptor from hex-encoded key (32 bytes) and IV (16 bytes).
    pub fn from_hex(key_hex: &str, iv_hex: &str) -> Result<Self, ConfigurationError> {
        let key = decode_fixed::<KEY_LENGTH>(key_hex, "AES key")?;
        let iv = decode_fixed::<IV_LENGTH>(iv_hex, "AES IV")?;
        Ok(Self { key: Secret::new(key), iv: Secret::new(iv) })
    }

    pub fn decrypt(&self, hex_ciphertext: &str) -> Result<Map<String, Value>, DecryptionError> {
        let ciphertext = hex::decode(hex_ciphertext.trim()).map_err(|e| DecryptionError::InvalidHex(e.to_string()))?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(DecryptionError::InvalidLength(ciphertext.len()));
        }
        let plaintext = Aes256CbcDec::new(self.key.reveal().into(), self.iv.reveal().into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| DecryptionError::BadPadding)?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| DecryptionError::NotUtf8)?;
        match serde_json::from_str::<Value>(&plaintext) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DecryptionError::NotJsonObject(format!("Found {}", json_kind(&other)))),
            Err(e) => Err(DecryptionError::NotJsonObject(e.to_string())),
        }
    }

    /// The inverse of [`decrypt`](Self::decrypt). Useful for tests and tooling that need to simulate the provider.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(self.key.reveal().into(), self.iv.reveal().into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        hex::encode(ciphertext)
    }

    pub fn encrypt_json(&self, payload: &Value) -> String {
        self.encrypt(&payload.to_string())
    }
}

fn decode_fixed<const N: usize>(value: &str, name: &'static str) -> Result<[u8; N], ConfigurationError> {
    let bytes = hex::decode(value.trim()).map_err(|_| ConfigurationError::InvalidHex(name))?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| ConfigurationError::InvalidLength { name, expected: N, actual })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
