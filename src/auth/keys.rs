//! Signing key material and the registry-compatible key identifier.
//!
//! The registry matches a token's `kid` header against the certificate it
//! was configured with. The identifier is derived from the certificate's
//! public key:
//!
//! 1. SHA-256 over the DER `SubjectPublicKeyInfo`
//! 2. the first 240 bits, base32 encoded without padding (48 characters)
//! 3. split into twelve groups of four joined with `:`

use std::fs;
use std::path::Path;

use data_encoding::BASE32_NOPAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

use crate::{Error, Result};

/// Bytes of the SPKI digest that feed the key identifier.
const KEY_ID_DIGEST_BYTES: usize = 30;

/// RSA private key plus the key identifier of its certificate.
pub struct SigningKey {
    key_id: String,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load a PEM certificate and its PEM RSA private key (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or parsed, if the
    /// certificate does not carry an RSA public key, or if the private key is
    /// not the certificate's.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = read_file(cert_path)?;
        let key_pem = read_file(key_path)?;
        let key = Self::from_pem(&cert_pem, &key_pem)?;
        debug!(
            cert = %cert_path.display(),
            key_id = %key.key_id,
            "Signing key loaded"
        );
        Ok(key)
    }

    /// Build a signing key from in-memory PEM blocks.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SigningKey::load`], minus file access.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let (_, pem) = parse_x509_pem(cert_pem)
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate PEM: {e}")))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate: {e}")))?;

        let spki = cert.public_key();
        let rsa = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => rsa,
            Ok(_) => {
                return Err(Error::Certificate(
                    "Certificate public key is not RSA".to_string(),
                ));
            }
            Err(e) => {
                return Err(Error::Certificate(format!(
                    "Failed to parse certificate public key: {e}"
                )));
            }
        };

        let key_id = key_id_from_spki(spki.raw);
        let encoding_key = EncodingKey::from_rsa_pem(key_pem)
            .map_err(|e| Error::Certificate(format!("Failed to parse RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_raw_components(
            strip_leading_zeros(rsa.modulus),
            strip_leading_zeros(rsa.exponent),
        );
        check_key_pair(&encoding_key, &decoding_key)?;

        Ok(Self {
            key_id,
            encoding_key,
        })
    }

    /// The `kid` to put in token headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Pair an arbitrary encoding key with a key identifier.
    #[cfg(test)]
    pub(crate) fn from_parts(key_id: &str, encoding_key: EncodingKey) -> Self {
        Self {
            key_id: key_id.to_string(),
            encoding_key,
        }
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

/// Derive the key identifier from a DER-encoded `SubjectPublicKeyInfo`.
#[must_use]
pub fn key_id_from_spki(spki_der: &[u8]) -> String {
    let digest = Sha256::digest(spki_der);
    let encoded = BASE32_NOPAD.encode(&digest[..KEY_ID_DIGEST_BYTES]);

    encoded
        .as_bytes()
        .chunks(4)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(":")
}

/// Sign a throwaway token and verify it against the certificate key.
fn check_key_pair(encoding_key: &EncodingKey, decoding_key: &DecodingKey) -> Result<()> {
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &json!({ "sub": "key-check" }),
        encoding_key,
    )
    .map_err(|e| Error::Certificate(format!("Private key cannot sign RS256: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    jsonwebtoken::decode::<serde_json::Value>(&token, decoding_key, &validation)
        .map(|_| ())
        .map_err(|_| Error::Certificate("Private key does not match certificate".to_string()))
}

/// DER integers carry a sign byte that raw RSA components must not.
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Certificate(format!("Cannot read '{}': {e}", path.display())))
}
