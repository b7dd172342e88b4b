//! RustCrypto-backed provider
//!
//! - X.509 parsing via `x509-cert`
//! - PKCS#7/CMS parsing via `cms`
//! - RSA PKCS#1 v1.5 verification via `rsa`
//! - Hashing via `sha1`/`sha2`

use super::pkcs7::{self, RSA_ENCRYPTION, SHA256_WITH_RSA_ENCRYPTION, SignerDetails};
use super::{CryptoProvider, HashAlgorithm};
use crate::error::{Error, Result};
use der::Decode;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::hazmat::PrehashVerifier;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

/// Crypto provider built on the RustCrypto crates
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCrypto;

/// Parsed certificate
#[derive(Debug, Clone)]
pub struct RustCryptoX509 {
    cert: Certificate,
}

/// Parsed PKCS#7 SignedData
pub struct RustCryptoPkcs7 {
    signers: Vec<SignerDetails>,
    certificates: Vec<RustCryptoX509>,
    encoded_len: usize,
}

impl RustCryptoX509 {
    fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        let spki = &self.cert.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != RSA_ENCRYPTION {
            return Err(Error::CertFail(format!(
                "public key algorithm {} is not RSA",
                spki.algorithm.oid
            )));
        }
        RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
            .map_err(|e| Error::CertFail(format!("RSA public key: {}", e)))
    }
}

impl CryptoProvider for RustCrypto {
    type X509 = RustCryptoX509;
    type Pkcs7 = RustCryptoPkcs7;

    fn name(&self) -> &'static str {
        "rustcrypto"
    }

    fn parse_x509(&self, data: &[u8]) -> Result<RustCryptoX509> {
        if data.is_empty() {
            return Err(Error::CertFail("certificate has zero length".into()));
        }

        let der_err = match Certificate::from_der(data) {
            Ok(cert) => return Ok(RustCryptoX509 { cert }),
            Err(e) => e,
        };
        log::info!("Failed to parse cert as DER ({}), trying PEM...", der_err);

        let (_label, der) = der::pem::decode_vec(data).map_err(|e| {
            log::error!("Parsing x509 as PEM format failed: {}", e);
            Error::CertFail(format!("neither DER ({}) nor PEM ({})", der_err, e))
        })?;
        let cert = Certificate::from_der(&der).map_err(|e| {
            log::error!("Parsing x509 from PEM failed: {}", e);
            Error::CertFail(format!("PEM body is not a certificate: {}", e))
        })?;
        Ok(RustCryptoX509 { cert })
    }

    fn parse_pkcs7(&self, data: &[u8]) -> Result<RustCryptoPkcs7> {
        let decoded = pkcs7::decode_signed_data(data)?;
        let signers = pkcs7::signer_details(&decoded.signed_data)?;
        let certificates = pkcs7::embedded_certificates(&decoded.signed_data)
            .into_iter()
            .map(|cert| RustCryptoX509 { cert })
            .collect();

        Ok(RustCryptoPkcs7 {
            signers,
            certificates,
            encoded_len: decoded.encoded_len,
        })
    }

    fn pkcs7_encoded_len(&self, pkcs7: &RustCryptoPkcs7) -> usize {
        pkcs7.encoded_len
    }

    fn signing_certificate<'p>(
        &self,
        pkcs7: &'p RustCryptoPkcs7,
        index: usize,
    ) -> Option<&'p RustCryptoX509> {
        pkcs7.certificates.get(index)
    }

    fn pkcs7_digest_algorithm(&self, pkcs7: &RustCryptoPkcs7) -> Option<HashAlgorithm> {
        pkcs7.signers.first().and_then(|s| s.digest_algorithm)
    }

    fn verify_signed_hash(
        &self,
        pkcs7: &RustCryptoPkcs7,
        x509: &RustCryptoX509,
        expected_hash: &[u8],
    ) -> bool {
        let key = match x509.rsa_public_key() {
            Ok(key) => key,
            Err(e) => {
                log::debug!("Cannot verify with certificate: {}", e);
                return false;
            }
        };
        let verifying_key = VerifyingKey::<Sha256>::new(key);

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
                Some(attrs) => Sha256::digest(&attrs.der).to_vec(),
                None => expected_hash.to_vec(),
            };
            let Ok(signature) = Signature::try_from(signer.signature.as_slice()) else {
                return false;
            };

            match verifying_key.verify_prehash(&prehash, &signature) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("RSA signature verification failed: {}", e);
                    false
                }
            }
        })
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        Ok(match algorithm {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha224 => sha2::Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        })
    }

    fn x509_version(&self, x509: &RustCryptoX509) -> u32 {
        x509.cert.tbs_certificate.version as u32 + 1
    }

    fn x509_is_rsa(&self, x509: &RustCryptoX509) -> bool {
        x509.cert.tbs_certificate.subject_public_key_info.algorithm.oid == RSA_ENCRYPTION
    }

    fn x509_public_key_bits(&self, x509: &RustCryptoX509) -> usize {
        x509.rsa_public_key().map(|key| key.size() * 8).unwrap_or(0)
    }

    fn x509_is_sha256_rsa(&self, x509: &RustCryptoX509) -> bool {
        x509.cert.signature_algorithm.oid == SHA256_WITH_RSA_ENCRYPTION
    }

    fn x509_summary(&self, x509: &RustCryptoX509) -> String {
        format!(
            "{} (v{}, {}-bit key)",
            x509.cert.tbs_certificate.subject,
            self.x509_version(x509),
            self.x509_public_key_bits(x509)
        )
    }
}
