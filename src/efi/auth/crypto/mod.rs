//! Cryptographic Provider Interface
//!
//! The validator never touches ASN.1 or RSA directly. Everything it needs
//! from a cryptographic library goes through [`CryptoProvider`], which has
//! two production implementations:
//!
//! - [`RustCrypto`]: `cms`, `x509-cert`, `rsa` and `sha2` (always built)
//! - `OpenSsl`: the system OpenSSL library (feature `openssl`)
//!
//! Both must produce identical verdicts for the same inputs.

mod pkcs7;
mod rustcrypto;

#[cfg(feature = "openssl")]
mod openssl;

#[cfg(test)]
pub(crate) mod fake;

pub use rustcrypto::{RustCrypto, RustCryptoPkcs7, RustCryptoX509};

#[cfg(feature = "openssl")]
pub use self::openssl::{OpenSsl, OpenSslPkcs7, OpenSslX509};

use crate::error::Result;

// ============================================================================
// Hash Algorithms
// ============================================================================

/// Digest algorithms that appear in signature lists and PKCS#7 blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub const fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Dotted OID of the algorithm identifier
    pub const fn oid(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "1.3.14.3.2.26",
            HashAlgorithm::Sha224 => "2.16.840.1.101.3.4.2.4",
            HashAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    /// Look up an algorithm by its dotted OID
    pub fn from_oid(oid: &str) -> Option<Self> {
        [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == oid)
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Operations the secure variable engine needs from a crypto library
///
/// Handles are owned by the caller and released on drop. Certificates
/// returned by [`CryptoProvider::signing_certificate`] borrow from their
/// PKCS#7 handle.
pub trait CryptoProvider {
    /// Parsed X.509 certificate
    type X509;
    /// Parsed PKCS#7 SignedData
    type Pkcs7;

    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Parse a certificate, trying DER first and then PEM
    ///
    /// Fails with `CertFail` if neither encoding parses.
    fn parse_x509(&self, data: &[u8]) -> Result<Self::X509>;

    /// Parse the PKCS#7 object at the start of `data`
    ///
    /// Trailing bytes after the object are allowed; use
    /// [`CryptoProvider::pkcs7_encoded_len`] to find where it ends.
    fn parse_pkcs7(&self, data: &[u8]) -> Result<Self::Pkcs7>;

    /// Number of bytes the parsed PKCS#7 object occupied in its input
    fn pkcs7_encoded_len(&self, pkcs7: &Self::Pkcs7) -> usize;

    /// Certificate `index` embedded in the PKCS#7 certificate set
    fn signing_certificate<'p>(&self, pkcs7: &'p Self::Pkcs7, index: usize) -> Option<&'p Self::X509>;

    /// Digest algorithm of the first signer, if recognized
    fn pkcs7_digest_algorithm(&self, pkcs7: &Self::Pkcs7) -> Option<HashAlgorithm>;

    /// Check that `x509` produced one of the PKCS#7 signatures over `expected_hash`
    ///
    /// When a signer carries authenticated attributes, its messageDigest
    /// attribute must equal `expected_hash` and the signature covers the
    /// attributes instead.
    fn verify_signed_hash(&self, pkcs7: &Self::Pkcs7, x509: &Self::X509, expected_hash: &[u8]) -> bool;

    /// Compute a digest
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// X.509 version number (3 for v3 certificates)
    fn x509_version(&self, x509: &Self::X509) -> u32;

    /// Whether the subject public key is RSA
    fn x509_is_rsa(&self, x509: &Self::X509) -> bool;

    /// Public key size in bits
    fn x509_public_key_bits(&self, x509: &Self::X509) -> usize;

    /// Whether the certificate is signed with sha256WithRSAEncryption
    fn x509_is_sha256_rsa(&self, x509: &Self::X509) -> bool;

    /// One-line description of the certificate for display
    fn x509_summary(&self, x509: &Self::X509) -> String;
}
