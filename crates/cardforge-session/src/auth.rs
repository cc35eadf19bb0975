//! RSA keypair management, password hashing, and Setup-packet parsing.
//!
//! This module is the crypto/parsing half of §4.4's auth flow: it owns the
//! long-lived RSA key pair, decrypts the password field of a Setup packet,
//! and hashes passwords for storage. Account lookup/creation and the
//! ban/whitelist/duplicate-login orchestration around it live in
//! [`crate::registry`], since those need the player registry and an
//! account store this module doesn't know about.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const RSA_BITS: usize = 2048;
/// The decrypted credential field reserves its first 32 bytes for an
/// (unused, per §9) AES session key; anything shorter can't contain a
/// password at all.
const RESERVED_KEY_LEN: usize = 32;

/// The server's long-lived RSA key pair, used to decrypt the password
/// field clients encrypt with the public key published on connect.
pub struct AuthManager {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl AuthManager {
    /// Loads the key pair from `key_path`, generating and persisting a
    /// fresh one (mode 0600) if it doesn't exist yet.
    pub fn load_or_generate(key_path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let key_path = key_path.as_ref();
        if key_path.exists() {
            let der = std::fs::read(key_path)?;
            let private_key = RsaPrivateKey::from_pkcs1_der(&der)?;
            let public_key = RsaPublicKey::from(&private_key);
            return Ok(AuthManager { private_key, public_key });
        }

        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)?;
        let public_key = RsaPublicKey::from(&private_key);

        let der = private_key.to_pkcs1_der()?;
        std::fs::write(key_path, der.as_bytes())?;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;

        Ok(AuthManager { private_key, public_key })
    }

    /// DER-encoded public key, published as an early packet before Setup.
    pub fn public_key_der(&self) -> Result<Vec<u8>, AuthError> {
        Ok(self.public_key.to_pkcs1_der()?.into_vec())
    }

    /// Decrypts the Setup packet's password field (PKCS#1 v1.5).
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(AuthError::from)
    }
}

/// The cleartext credential field, split into its reserved AES-key prefix
/// (present but unused, per §9's Open Questions) and the actual password.
pub struct Credential {
    pub reserved_key: Option<[u8; RESERVED_KEY_LEN]>,
    pub password: String,
}

/// Splits a decrypted credential field. Fails if it's too short to even
/// contain the reserved key prefix.
pub fn split_credential(cleartext: Vec<u8>) -> Result<Credential, AuthError> {
    if cleartext.len() < RESERVED_KEY_LEN {
        return Err(AuthError::BadCredential);
    }
    let mut reserved_key = [0u8; RESERVED_KEY_LEN];
    reserved_key.copy_from_slice(&cleartext[..RESERVED_KEY_LEN]);
    let password = String::from_utf8_lossy(&cleartext[RESERVED_KEY_LEN..]).into_owned();
    Ok(Credential { reserved_key: Some(reserved_key), password })
}

/// SHA-256 of `password || salt`, hex-encoded, as stored in `userinfo.password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// A fresh 64-bit CSPRNG salt, rendered as hex, for a newly created account.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The exact five fields carried by a Setup packet's CBOR array.
#[derive(Debug, Clone)]
pub struct SetupFields {
    pub screen_name: String,
    pub password_cipher: Vec<u8>,
    pub md5: String,
    pub version: String,
    pub uuid: String,
}

/// Parses the Setup payload: a tagged array of exactly five byte-strings.
pub fn parse_setup(data: &[u8]) -> Result<SetupFields, AuthError> {
    let value: ciborium::Value =
        ciborium::from_reader(data).map_err(|e| AuthError::MalformedSetup(e.to_string()))?;
    let ciborium::Value::Array(elems) = value else {
        return Err(AuthError::MalformedSetup("setup payload is not an array".into()));
    };
    if elems.len() != 5 {
        return Err(AuthError::MalformedSetup(format!(
            "expected 5 fields, got {}",
            elems.len()
        )));
    }
    let text = |v: &ciborium::Value| -> Result<String, AuthError> {
        v.as_text()
            .map(str::to_string)
            .ok_or_else(|| AuthError::MalformedSetup("expected a text field".into()))
    };
    let bytes = |v: &ciborium::Value| -> Result<Vec<u8>, AuthError> {
        v.as_bytes()
            .cloned()
            .ok_or_else(|| AuthError::MalformedSetup("expected a byte-string field".into()))
    };
    Ok(SetupFields {
        screen_name: text(&elems[0])?,
        password_cipher: bytes(&elems[1])?,
        md5: text(&elems[2])?,
        version: text(&elems[3])?,
        uuid: text(&elems[4])?,
    })
}

/// True if `text` contains any of `ban_words` as a substring.
pub fn contains_ban_word(text: &str, ban_words: &[String]) -> bool {
    ban_words.iter().any(|word| !word.is_empty() && text.contains(word.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_is_deterministic_per_salt() {
        let a = hash_password("hunter2", "deadbeef");
        let b = hash_password("hunter2", "deadbeef");
        let c = hash_password("hunter2", "f00dface");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn salts_are_distinct() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn setup_round_trips_through_cbor() {
        let mut buf = Vec::new();
        let elems = vec![
            ciborium::Value::Text("alice".into()),
            ciborium::Value::Bytes(vec![1, 2, 3]),
            ciborium::Value::Text("md5-abc".into()),
            ciborium::Value::Text("0.5.14".into()),
            ciborium::Value::Text("uuid-1".into()),
        ];
        ciborium::into_writer(&ciborium::Value::Array(elems), &mut buf).unwrap();
        let fields = parse_setup(&buf).unwrap();
        assert_eq!(fields.screen_name, "alice");
        assert_eq!(fields.uuid, "uuid-1");
    }

    #[test]
    fn rejects_setup_with_wrong_arity() {
        let mut buf = Vec::new();
        ciborium::into_writer(&ciborium::Value::Array(vec![ciborium::Value::Text("x".into())]), &mut buf).unwrap();
        assert!(parse_setup(&buf).is_err());
    }

    #[test]
    fn splits_reserved_key_from_password() {
        let mut cleartext = vec![0u8; 32];
        cleartext.extend_from_slice(b"hunter2");
        let cred = split_credential(cleartext).unwrap();
        assert_eq!(cred.password, "hunter2");
        assert!(cred.reserved_key.is_some());
    }

    #[test]
    fn rejects_credential_shorter_than_reserved_prefix() {
        assert!(split_credential(vec![0u8; 10]).is_err());
    }

    #[test]
    fn detects_ban_words() {
        let words = vec!["badword".to_string()];
        assert!(contains_ban_word("this has a badword in it", &words));
        assert!(!contains_ban_word("this is clean", &words));
    }
}
