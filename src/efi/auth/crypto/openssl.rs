//! OpenSSL-backed provider
//!
//! Certificates, PKCS#7 envelopes, digests and RSA verification all go
//! through the system OpenSSL library. SignerInfo fields come from the shared
//! CMS decode since rust-openssl does not expose them.

use super::pkcs7::{self, SignerDetails};
use super::{CryptoProvider, HashAlgorithm};
use crate::error::{Error, Result};
use openssl::error::ErrorStack;
use openssl::hash::{MessageDigest, hash};
use openssl::md::Md;
use openssl::nid::Nid;
use openssl::pkcs7::Pkcs7;
use openssl::pkey::{Id, PKey, Public};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::Padding;
use openssl::x509::X509;

/// Crypto provider built on OpenSSL
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSsl;

/// Parsed certificate
pub struct OpenSslX509 {
    cert: X509,
}

/// Parsed PKCS#7 SignedData
pub struct OpenSslPkcs7 {
    signers: Vec<SignerDetails>,
    certificates: Vec<OpenSslX509>,
    encoded_len: usize,
}

impl OpenSslX509 {
    fn rsa_public_key(&self) -> Option<PKey<Public>> {
        self.cert.public_key().ok().filter(|key| key.id() == Id::RSA)
    }
}

fn ssl_err(context: &str, e: ErrorStack) -> Error {
    Error::CertFail(format!("{}: {}", context, e))
}

fn message_digest(algorithm: HashAlgorithm) -> MessageDigest {
    match algorithm {
        HashAlgorithm::Sha1 => MessageDigest::sha1(),
        HashAlgorithm::Sha224 => MessageDigest::sha224(),
        HashAlgorithm::Sha256 => MessageDigest::sha256(),
        HashAlgorithm::Sha384 => MessageDigest::sha384(),
        HashAlgorithm::Sha512 => MessageDigest::sha512(),
    }
}

/// RSA PKCS#1 v1.5 check of `signature` over a SHA-256 prehash
fn verify_prehash(key: &PKey<Public>, prehash: &[u8], signature: &[u8]) -> core::result::Result<bool, ErrorStack> {
    let mut ctx = PkeyCtx::new(key)?;
    ctx.verify_init()?;
    ctx.set_rsa_padding(Padding::PKCS1)?;
    ctx.set_signature_md(Md::sha256())?;
    ctx.verify(prehash, signature)
}

/// Parse DER, requiring the whole input to be consumed
fn x509_from_exact_der(data: &[u8]) -> core::result::Result<X509, ErrorStack> {
    let cert = X509::from_der(data)?;
    if cert.to_der()?.len() != data.len() {
        return Err(ErrorStack::get());
    }
    Ok(cert)
}

impl CryptoProvider for OpenSsl {
    type X509 = OpenSslX509;
    type Pkcs7 = OpenSslPkcs7;

    fn name(&self) -> &'static str {
        "openssl"
    }

    fn parse_x509(&self, data: &[u8]) -> Result<OpenSslX509> {
        if data.is_empty() {
            return Err(Error::CertFail("certificate has zero length".into()));
        }

        match x509_from_exact_der(data) {
            Ok(cert) => return Ok(OpenSslX509 { cert }),
            Err(e) => log::info!("Failed to parse cert as DER ({}), trying PEM...", e),
        }

        let cert = X509::from_pem(data).map_err(|e| {
            log::error!("Parsing x509 as PEM format failed: {}", e);
            ssl_err("neither DER nor PEM", e)
        })?;
        Ok(OpenSslX509 { cert })
    }

    fn parse_pkcs7(&self, data: &[u8]) -> Result<OpenSslPkcs7> {
        let decoded = pkcs7::decode_signed_data(data)?;

        // The CMS decode fixes the boundary so both providers agree on it
        let encoded_len = decoded.encoded_len;
        let pkcs7 = if decoded.wrapped {
            Pkcs7::from_der(&data[..encoded_len])
        } else {
            Pkcs7::from_der(&pkcs7::encapsulate_in_content_info(&data[..encoded_len])?)
        }
        .map_err(|e| ssl_err("PKCS#7 parse failed", e))?;

        let certificates = pkcs7
            .signed()
            .and_then(|signed| signed.certificates())
            .map(|stack| {
                stack
                    .iter()
                    .map(|cert| OpenSslX509 {
                        cert: cert.to_owned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(OpenSslPkcs7 {
            signers: pkcs7::signer_details(&decoded.signed_data)?,
            certificates,
            encoded_len,
        })
    }

    fn pkcs7_encoded_len(&self, pkcs7: &OpenSslPkcs7) -> usize {
        pkcs7.encoded_len
    }

    fn signing_certificate<'p>(&self, pkcs7: &'p OpenSslPkcs7, index: usize) -> Option<&'p OpenSslX509> {
        pkcs7.certificates.get(index)
    }

    fn pkcs7_digest_algorithm(&self, pkcs7: &OpenSslPkcs7) -> Option<HashAlgorithm> {
        pkcs7.signers.first().and_then(|s| s.digest_algorithm)
    }

    fn verify_signed_hash(&self, pkcs7: &OpenSslPkcs7, x509: &OpenSslX509, expected_hash: &[u8]) -> bool {
        let Some(key) = x509.rsa_public_key() else {
            log::debug!("Cannot verify with certificate: no RSA public key");
            return false;
        };

        pkcs7.signers.iter().any(|signer| {
            if signer.digest_algorithm != Some(HashAlgorithm::Sha256) {
                log::debug!("Signer digest {:?} is not SHA-256", signer.digest_algorithm);
                return false;
            }
            if !signer.message_digest_matches(expected_hash) {
                log::debug!("messageDigest attribute does not match the expected hash");
                return false;
            }

            let prehash = match &signer.signed_attributes {
                Some(attrs) => match hash(MessageDigest::sha256(), &attrs.der) {
                    Ok(digest) => digest.to_vec(),
                    Err(e) => {
                        log::debug!("Hashing signed attributes failed: {}", e);
                        return false;
                    }
                },
                None => expected_hash.to_vec(),
            };

            match verify_prehash(&key, &prehash, &signer.signature) {
                Ok(valid) => valid,
                Err(e) => {
                    log::debug!("RSA signature verification failed: {}", e);
                    false
                }
            }
        })
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        hash(message_digest(algorithm), data)
            .map(|digest| digest.to_vec())
            .map_err(|e| ssl_err("digest failed", e))
    }

    fn x509_version(&self, x509: &OpenSslX509) -> u32 {
        // OpenSSL reports the zero-based field value
        (x509.cert.version() + 1) as u32
    }

    fn x509_is_rsa(&self, x509: &OpenSslX509) -> bool {
        x509.rsa_public_key().is_some()
    }

    fn x509_public_key_bits(&self, x509: &OpenSslX509) -> usize {
        x509.cert
            .public_key()
            .map(|key| key.bits() as usize)
            .unwrap_or(0)
    }

    fn x509_is_sha256_rsa(&self, x509: &OpenSslX509) -> bool {
        x509.cert.signature_algorithm().object().nid() == Nid::SHA256WITHRSAENCRYPTION
    }

    fn x509_summary(&self, x509: &OpenSslX509) -> String {
        let mut subject: Vec<String> = x509
            .cert
            .subject_name()
            .entries()
            .map(|entry| {
                let key = entry.object().nid().short_name().unwrap_or("?");
                let value = entry
                    .data()
                    .as_utf8()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                format!("{}={}", key, value)
            })
            .collect();
        // Most specific RDN first, like RFC 4514
        subject.reverse();
        format!(
            "{} (v{}, {}-bit key)",
            subject.join(","),
            self.x509_version(x509),
            self.x509_public_key_bits(x509)
        )
    }
}
