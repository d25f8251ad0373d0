//! Token signing certificate management.
//!
//! On startup the server needs a certificate/key pair to sign tokens with.
//! [`ensure_certificate`] reuses the pair on disk when it is still usable and
//! otherwise generates a fresh self-signed RSA pair in its place. The
//! registry must be configured with the same certificate to verify tokens.
//!
//! All files are PEM.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_RSA_SHA256, RsaKeySize,
};
use tracing::{debug, info, warn};
use x509_parser::pem::parse_x509_pem;

use crate::auth::SigningKey;
use crate::{Error, Result};

/// Organization written into generated certificate subjects.
pub const CERT_ORGANIZATION: &str = "RegistryAuth";

/// Validity of a generated certificate, in hours (10 years).
const VALIDITY_HOURS: i64 = 87_660;

/// Generated certificate and key pair in PEM format.
#[derive(Debug)]
pub struct GeneratedCert {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded private key.
    pub key_pem: String,
}

impl GeneratedCert {
    /// Write the pair to disk, creating parent directories.
    ///
    /// The certificate is world-readable; the key is owner-only.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or a file cannot be
    /// written.
    pub fn write(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        write_pem(cert_path, &self.cert_pem, 0o644)?;
        write_pem(key_path, &self.key_pem, 0o600)
    }
}

/// Certificate generator backed by `rcgen`.
pub struct CertGenerator;

impl CertGenerator {
    /// Generate a self-signed RSA certificate for token signing.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or certificate serialisation fails.
    pub fn self_signed(key_size: RsaKeySize) -> Result<GeneratedCert> {
        let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, key_size)
            .map_err(|e| Error::Certificate(format!("Failed to generate RSA key: {e}")))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, CERT_ORGANIZATION);
        params.distinguished_name = dn;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let not_before = now_utc()?;
        params.not_before = not_before;
        params.not_after = not_before + time::Duration::hours(VALIDITY_HOURS);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Certificate(format!("Certificate generation failed: {e}")))?;

        Ok(GeneratedCert {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

/// Make sure a usable certificate/key pair exists at the given paths.
///
/// Returns `true` when a new pair was generated. An existing pair is
/// replaced when either file is missing, the certificate is outside its
/// validity window, either file cannot be parsed, or the key does not belong
/// to the certificate.
///
/// # Errors
///
/// Returns an error only if generating or writing a replacement fails.
pub fn ensure_certificate(cert_path: &Path, key_path: &Path) -> Result<bool> {
    ensure_certificate_with(cert_path, key_path, RsaKeySize::_4096)
}

pub(crate) fn ensure_certificate_with(
    cert_path: &Path,
    key_path: &Path,
    key_size: RsaKeySize,
) -> Result<bool> {
    if cert_path.exists() && key_path.exists() {
        match check_existing(cert_path, key_path) {
            Ok(()) => {
                debug!(cert = %cert_path.display(), "Reusing existing signing certificate");
                return Ok(false);
            }
            Err(e) => {
                warn!(
                    cert = %cert_path.display(),
                    error = %e,
                    "Existing signing certificate unusable, regenerating"
                );
            }
        }
    }

    info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Generating self-signed signing certificate"
    );
    let generated = CertGenerator::self_signed(key_size)?;
    generated.write(cert_path, key_path)?;
    Ok(true)
}

fn check_existing(cert_path: &Path, key_path: &Path) -> Result<()> {
    let cert_pem = fs::read(cert_path)?;
    let key_pem = fs::read(key_path)?;

    {
        let (_, pem) = parse_x509_pem(&cert_pem)
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate PEM: {e}")))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate: {e}")))?;
        if !cert.validity().is_valid() {
            return Err(Error::Certificate(
                "Certificate expired or not yet valid".to_string(),
            ));
        }
    }

    SigningKey::from_pem(&cert_pem, &key_pem).map(|_| ())
}

fn write_pem(path: &Path, contents: &str, mode: u32) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            Error::Certificate(format!("Cannot create dir '{}': {e}", dir.display()))
        })?;
    }

    fs::write(path, contents)
        .map_err(|e| Error::Certificate(format!("Cannot write '{}': {e}", path.display())))?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        Error::Certificate(format!("Cannot set permissions on '{}': {e}", path.display()))
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn now_utc() -> Result<time::OffsetDateTime> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("System time error: {e}")))?
        .as_secs();

    time::OffsetDateTime::from_unix_timestamp(i64::try_from(secs).unwrap_or(i64::MAX))
        .map_err(|e| Error::Certificate(format!("Date calculation error: {e}")))
}
