//! Deterministic crypto double for validator tests
//!
//! Certificates are `FAKECERT:<tag>`. A PKCS#7 blob is
//! `FAKEP7 <u32 body length> <u8 tag length> <tag> <hash>` and "verifies"
//! against the certificate with the same tag when its hash equals the
//! expected one. The digest algorithm follows from the hash length.

use super::{CryptoProvider, HashAlgorithm, RustCrypto};
use crate::error::{Error, Result};

const CERT_MAGIC: &[u8] = b"FAKECERT:";
const PKCS7_MAGIC: &[u8] = b"FAKEP7";

#[derive(Debug, Default, Clone, Copy)]
pub struct Fake;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeX509 {
    pub tag: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FakePkcs7 {
    signer: FakeX509,
    hash: Vec<u8>,
    encoded_len: usize,
}

/// Encode a fake certificate
pub fn cert(tag: &str) -> Vec<u8> {
    [CERT_MAGIC, tag.as_bytes()].concat()
}

/// Encode a fake signature by `tag` over `hash`
pub fn pkcs7(tag: &str, hash: &[u8]) -> Vec<u8> {
    let mut body = vec![tag.len() as u8];
    body.extend_from_slice(tag.as_bytes());
    body.extend_from_slice(hash);

    let mut out = PKCS7_MAGIC.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

impl CryptoProvider for Fake {
    type X509 = FakeX509;
    type Pkcs7 = FakePkcs7;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn parse_x509(&self, data: &[u8]) -> Result<FakeX509> {
        data.strip_prefix(CERT_MAGIC)
            .filter(|tag| !tag.is_empty())
            .map(|tag| FakeX509 { tag: tag.to_vec() })
            .ok_or_else(|| Error::CertFail("not a fake certificate".into()))
    }

    fn parse_pkcs7(&self, data: &[u8]) -> Result<FakePkcs7> {
        let malformed = || Error::CertFail("not a fake PKCS#7".into());

        let rest = data.strip_prefix(PKCS7_MAGIC).ok_or_else(malformed)?;
        let len_bytes: [u8; 4] = rest
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(malformed)?;
        let body_len = u32::from_le_bytes(len_bytes) as usize;
        let body = rest.get(4..4 + body_len).ok_or_else(malformed)?;

        let (&tag_len, body) = body.split_first().ok_or_else(malformed)?;
        let tag = body.get(..tag_len as usize).ok_or_else(malformed)?;
        let hash = &body[tag_len as usize..];

        Ok(FakePkcs7 {
            signer: FakeX509 { tag: tag.to_vec() },
            hash: hash.to_vec(),
            encoded_len: PKCS7_MAGIC.len() + 4 + body_len,
        })
    }

    fn pkcs7_encoded_len(&self, pkcs7: &FakePkcs7) -> usize {
        pkcs7.encoded_len
    }

    fn signing_certificate<'p>(&self, pkcs7: &'p FakePkcs7, index: usize) -> Option<&'p FakeX509> {
        (index == 0).then_some(&pkcs7.signer)
    }

    fn pkcs7_digest_algorithm(&self, pkcs7: &FakePkcs7) -> Option<HashAlgorithm> {
        match pkcs7.hash.len() {
            20 => Some(HashAlgorithm::Sha1),
            32 => Some(HashAlgorithm::Sha256),
            48 => Some(HashAlgorithm::Sha384),
            64 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    fn verify_signed_hash(&self, pkcs7: &FakePkcs7, x509: &FakeX509, expected_hash: &[u8]) -> bool {
        pkcs7.signer == *x509 && pkcs7.hash == expected_hash
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        RustCrypto.hash(algorithm, data)
    }

    fn x509_version(&self, _x509: &FakeX509) -> u32 {
        3
    }

    fn x509_is_rsa(&self, _x509: &FakeX509) -> bool {
        true
    }

    fn x509_public_key_bits(&self, _x509: &FakeX509) -> usize {
        2048
    }

    fn x509_is_sha256_rsa(&self, _x509: &FakeX509) -> bool {
        true
    }

    fn x509_summary(&self, x509: &FakeX509) -> String {
        String::from_utf8_lossy(&x509.tag).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_pkcs7_boundary() {
        let mut blob = pkcs7("KEK", &[7u8; 32]);
        let len = blob.len();
        blob.extend_from_slice(b"trailing esl");

        let parsed = Fake.parse_pkcs7(&blob).unwrap();
        assert_eq!(Fake.pkcs7_encoded_len(&parsed), len);
        assert_eq!(Fake.signing_certificate(&parsed, 0).unwrap().tag, b"KEK");
    }

    #[test]
    fn test_fake_verify() {
        let blob = pkcs7("KEK", &[7u8; 32]);
        let parsed = Fake.parse_pkcs7(&blob).unwrap();
        let kek = Fake.parse_x509(&cert("KEK")).unwrap();
        let pk = Fake.parse_x509(&cert("PK")).unwrap();

        assert!(Fake.verify_signed_hash(&parsed, &kek, &[7u8; 32]));
        assert!(!Fake.verify_signed_hash(&parsed, &kek, &[8u8; 32]));
        assert!(!Fake.verify_signed_hash(&parsed, &pk, &[7u8; 32]));
    }

    #[test]
    fn test_fake_truncated() {
        let blob = pkcs7("KEK", &[7u8; 32]);
        assert!(Fake.parse_pkcs7(&blob[..blob.len() - 1]).is_err());
        assert!(Fake.parse_x509(b"FAKECERT:").is_err());
    }
}
