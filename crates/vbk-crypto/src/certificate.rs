//! RSA key pair + self-signed certificate generation and loading
//!
//! Private key PEM:
//!   - `PRIVATE KEY` (PKCS#8) when no password is given
//!   - `ENCRYPTED PRIVATE KEY` (PKCS#8, PBES2 PBKDF2-SHA256 + AES-256-CBC) otherwise
//!   - `RSA PRIVATE KEY` (PKCS#1) is accepted on load, never produced
//!
//! Certificate PEM: X.509 v3, subject == issuer, sha256WithRSAEncryption.
//! The certificate is only a public-key container; its validity window spans
//! 1980 to 2100 and it is never chain-validated. Its self-signature is checked
//! on load.

use std::str::FromStr;
use std::time::Duration;

use pkcs8::pkcs5::pbes2;
use pkcs8::{EncryptedPrivateKeyInfo, LineEnding, PrivateKeyInfo};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::Verifier;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::{GeneralizedTime, UtcTime};
use x509_cert::der::{pem, DateTime, Decode, DecodePem, Encode, EncodePem};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// RSA public exponent used for every generated key.
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// Default RSA modulus size in bits.
pub const DEFAULT_RSA_KEY_BITS: usize = 4096;

/// Smallest modulus accepted for generation.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Default PBKDF2-HMAC-SHA256 iteration count for password-protected keys.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Common name of the self-signed certificate (subject and issuer).
pub const CERT_COMMON_NAME: &str = "volume-backup";

/// rsaEncryption (PKCS#1)
const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// sha256WithRSAEncryption
const SHA256_WITH_RSA_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

const PEM_PRIVATE_KEY: &str = "PRIVATE KEY";
const PEM_ENCRYPTED_PRIVATE_KEY: &str = "ENCRYPTED PRIVATE KEY";
const PEM_RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";
// RFC 1421 header written by `openssl genrsa -aes256 -traditional`
const LEGACY_ENCRYPTED_HEADER: &[u8] = b"Proc-Type: 4,ENCRYPTED";

/// Key generation parameters
#[derive(Debug, Clone)]
pub struct KeyParams {
    /// RSA modulus size in bits (default: 4096)
    pub rsa_bits: usize,
    /// PBKDF2 iterations protecting an encrypted private key (default: 600000)
    pub pbkdf2_iterations: u32,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self {
            rsa_bits: DEFAULT_RSA_KEY_BITS,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// Output of `KeyPairProvider::generate`. The caller owns persistence.
pub struct GeneratedKeyPair {
    /// PEM-encoded private key, possibly password-protected
    pub private_key_pem: Zeroizing<String>,
    /// PEM-encoded self-signed X.509 certificate
    pub certificate_pem: String,
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("private_key_pem", &"[REDACTED]")
            .field("certificate_pem", &self.certificate_pem)
            .finish()
    }
}

/// Generates RSA key pairs with self-signed certificates and loads them back.
#[derive(Debug, Clone, Default)]
pub struct KeyPairProvider {
    params: KeyParams,
}

impl KeyPairProvider {
    pub fn new(params: KeyParams) -> CryptoResult<Self> {
        if params.rsa_bits < MIN_RSA_KEY_BITS || params.rsa_bits % 8 != 0 {
            return Err(CryptoError::InvalidConfig(format!(
                "RSA key size must be a multiple of 8 and at least {MIN_RSA_KEY_BITS} bits, got {}",
                params.rsa_bits
            )));
        }
        if params.pbkdf2_iterations == 0 {
            return Err(CryptoError::InvalidConfig(
                "PBKDF2 iteration count must be positive".into(),
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &KeyParams {
        &self.params
    }

    /// Generate an RSA key pair and a self-signed certificate over its public key.
    ///
    /// A non-empty `password` encrypts the private key PEM; an absent or empty
    /// one leaves it unencrypted.
    pub fn generate(&self, password: Option<&SecretString>) -> CryptoResult<GeneratedKeyPair> {
        let mut rng = rand::thread_rng();
        let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);

        tracing::debug!(bits = self.params.rsa_bits, "generating RSA key pair");
        let private_key = RsaPrivateKey::new_with_exp(&mut rng, self.params.rsa_bits, &exponent)
            .map_err(|e| CryptoError::Encrypt(format!("RSA key generation: {e}")))?;

        let certificate_pem = self_signed_certificate(&private_key)?;

        let password = password.filter(|p| !p.expose_secret().is_empty());
        let private_key_pem = match password {
            Some(password) => self.encrypted_private_key_pem(&private_key, password)?,
            None => private_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::Encrypt(format!("encoding private key: {e}")))?,
        };

        Ok(GeneratedKeyPair {
            private_key_pem,
            certificate_pem,
        })
    }

    fn encrypted_private_key_pem(
        &self,
        private_key: &RsaPrivateKey,
        password: &SecretString,
    ) -> CryptoResult<Zeroizing<String>> {
        let mut salt = [0u8; 16];
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(
            self.params.pbkdf2_iterations,
            &salt,
            &iv,
        )
        .map_err(|e| CryptoError::Encrypt(format!("PBES2 parameters: {e}")))?;

        let der = private_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::Encrypt(format!("encoding private key: {e}")))?;
        let info = PrivateKeyInfo::try_from(der.as_bytes())
            .map_err(|e| CryptoError::Encrypt(format!("re-reading private key: {e}")))?;

        info.encrypt_with_params(params, password.expose_secret().as_bytes())
            .and_then(|doc| {
                doc.to_pem(PEM_ENCRYPTED_PRIVATE_KEY, LineEnding::LF)
                    .map_err(pkcs8::Error::from)
            })
            .map_err(|e| CryptoError::Encrypt(format!("encrypting private key: {e}")))
    }

    /// Parse a PEM certificate, verify its self-signature, and return its RSA key.
    pub fn load_public_key(&self, certificate_pem: &[u8]) -> CryptoResult<RsaPublicKey> {
        let certificate = Certificate::from_pem(certificate_pem)
            .map_err(|e| CryptoError::Decode(format!("parsing certificate: {e}")))?;
        let tbs = &certificate.tbs_certificate;

        let spki = &tbs.subject_public_key_info;
        if spki.algorithm.oid != RSA_ENCRYPTION_OID {
            return Err(CryptoError::UnsupportedKeyType(format!(
                "certificate key algorithm {} is not RSA",
                spki.algorithm.oid
            )));
        }

        let spki_der = spki
            .to_der()
            .map_err(|e| CryptoError::Decode(format!("re-encoding public key: {e}")))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| CryptoError::Decode(format!("reading RSA public key: {e}")))?;

        if tbs.issuer != tbs.subject {
            return Err(CryptoError::Decode(
                "certificate is not self-signed (issuer differs from subject)".into(),
            ));
        }
        if certificate.signature_algorithm.oid != SHA256_WITH_RSA_OID {
            return Err(CryptoError::Decode(format!(
                "unsupported certificate signature algorithm {}",
                certificate.signature_algorithm.oid
            )));
        }

        let tbs_der = tbs
            .to_der()
            .map_err(|e| CryptoError::Decode(format!("re-encoding certificate body: {e}")))?;
        let signature_bytes = certificate.signature.as_bytes().ok_or_else(|| {
            CryptoError::Decode("certificate signature has unused bits".into())
        })?;
        let signature = Signature::try_from(signature_bytes)
            .map_err(|e| CryptoError::Decode(format!("reading certificate signature: {e}")))?;

        VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(&tbs_der, &signature)
            .map_err(|_| CryptoError::Decode("certificate self-signature does not verify".into()))?;

        Ok(public_key)
    }

    /// Parse a PEM private key, decrypting it with `password` when it is encrypted.
    pub fn load_private_key(
        &self,
        key_pem: &[u8],
        password: Option<&SecretString>,
    ) -> CryptoResult<RsaPrivateKey> {
        if key_pem
            .windows(LEGACY_ENCRYPTED_HEADER.len())
            .any(|w| w == LEGACY_ENCRYPTED_HEADER)
        {
            return Err(CryptoError::Decode(
                "legacy encrypted PEM (Proc-Type: 4,ENCRYPTED) is not supported; \
                 convert it with `openssl pkcs8 -topk8 -in key.pem -out key-pkcs8.pem`"
                    .into(),
            ));
        }
        let (label, der) = pem::decode_vec(key_pem)
            .map_err(|e| CryptoError::Decode(format!("reading PEM private key: {e}")))?;
        let der = Zeroizing::new(der);
        let password = password.filter(|p| !p.expose_secret().is_empty());

        match label {
            PEM_PRIVATE_KEY => {
                if password.is_some() {
                    return Err(CryptoError::Decode(
                        "password given but private key is not encrypted".into(),
                    ));
                }
                rsa_from_pkcs8(&der)
            }
            PEM_ENCRYPTED_PRIVATE_KEY => {
                let password = password.ok_or_else(|| {
                    CryptoError::Decode("private key is encrypted but no password was given".into())
                })?;
                let encrypted = EncryptedPrivateKeyInfo::try_from(der.as_slice())
                    .map_err(|e| CryptoError::Decode(format!("reading encrypted private key: {e}")))?;
                let decrypted = encrypted
                    .decrypt(password.expose_secret().as_bytes())
                    .map_err(|_| {
                        CryptoError::Decode("decrypting private key failed: wrong password or corrupt key".into())
                    })?;
                rsa_from_pkcs8(decrypted.as_bytes())
            }
            PEM_RSA_PRIVATE_KEY => {
                if password.is_some() {
                    return Err(CryptoError::Decode(
                        "password given but private key is not encrypted".into(),
                    ));
                }
                RsaPrivateKey::from_pkcs1_der(&der)
                    .map_err(|e| CryptoError::Decode(format!("reading PKCS#1 private key: {e}")))
            }
            other => Err(CryptoError::UnsupportedKeyType(format!(
                "PEM label '{other}' is not an RSA private key"
            ))),
        }
    }
}

fn rsa_from_pkcs8(der: &[u8]) -> CryptoResult<RsaPrivateKey> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| CryptoError::Decode(format!("reading PKCS#8 private key: {e}")))?;
    if info.algorithm.oid != RSA_ENCRYPTION_OID {
        return Err(CryptoError::UnsupportedKeyType(format!(
            "private key algorithm {} is not RSA",
            info.algorithm.oid
        )));
    }
    RsaPrivateKey::try_from(info)
        .map_err(|e| CryptoError::Decode(format!("reading RSA private key: {e}")))
}

fn self_signed_certificate(private_key: &RsaPrivateKey) -> CryptoResult<String> {
    let build_err = |e: &dyn std::fmt::Display| CryptoError::Encrypt(format!("building certificate: {e}"));

    let mut serial = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut serial);
    // positive, minimally encoded INTEGER
    serial[0] = (serial[0] & 0x7f).max(1);
    let serial_number = SerialNumber::new(&serial).map_err(|e| build_err(&e))?;

    let not_before = DateTime::new(1980, 1, 1, 0, 0, 0)
        .and_then(UtcTime::from_date_time)
        .map_err(|e| build_err(&e))?;
    let not_after = DateTime::new(2100, 1, 1, 0, 0, 0).map_err(|e| build_err(&e))?;
    let validity = Validity {
        not_before: Time::UtcTime(not_before),
        not_after: Time::GeneralTime(GeneralizedTime::from_date_time(not_after)),
    };

    let subject = Name::from_str(&format!("CN={CERT_COMMON_NAME}")).map_err(|e| build_err(&e))?;

    let public_der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| build_err(&e))?;
    let spki = SubjectPublicKeyInfoOwned::from_der(public_der.as_bytes()).map_err(|e| build_err(&e))?;

    let signer = SigningKey::<Sha256>::new(private_key.clone());
    let builder = CertificateBuilder::new(Profile::Root, serial_number, validity, subject, spki, &signer)
        .map_err(|e| build_err(&e))?;
    let certificate = builder
        .build::<Signature>()
        .map_err(|e| build_err(&e))?;

    certificate
        .to_pem(LineEnding::LF)
        .map_err(|e| build_err(&e))
}

/// Validity window of a certificate, for display.
pub fn certificate_validity(certificate_pem: &[u8]) -> CryptoResult<(Duration, Duration)> {
    let certificate = Certificate::from_pem(certificate_pem)
        .map_err(|e| CryptoError::Decode(format!("parsing certificate: {e}")))?;
    let validity = &certificate.tbs_certificate.validity;
    Ok((
        validity.not_before.to_unix_duration(),
        validity.not_after.to_unix_duration(),
    ))
}
