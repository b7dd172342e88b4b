//! Structural validation
//!
//! Checks that ESL, certificate, update and TS buffers are well formed
//! without consulting any stored key state. This answers "can this be
//! installed at all", not "is this update authorized".

use super::crypto::{CryptoProvider, HashAlgorithm};
use super::descriptor::parse_authentication_descriptor;
use super::signature_list::{SignatureList, collect_signature_lists};
use super::time::{TimestampVariable, validate_time};
use super::variables::SecureBootVariable;
use crate::error::{Error, Result};

/// RSA modulus sizes accepted in secure boot certificates
pub const ALLOWED_RSA_BITS: [usize; 2] = [2048, 4096];

/// Check a parsed certificate against the secure boot profile
///
/// The certificate must be X.509 v3 with an RSA-2048 or RSA-4096 key and
/// signed with sha256WithRSAEncryption.
pub fn validate_cert<P: CryptoProvider>(provider: &P, x509: &P::X509) -> Result<()> {
    let version = provider.x509_version(x509);
    if version != 3 {
        return Err(Error::CertFail(format!(
            "certificate is version {}, expected 3",
            version
        )));
    }

    if !provider.x509_is_rsa(x509) {
        return Err(Error::CertFail("public key is not RSA".into()));
    }

    let bits = provider.x509_public_key_bits(x509);
    if !ALLOWED_RSA_BITS.contains(&bits) {
        return Err(Error::CertFail(format!(
            "RSA key is {} bits, expected 2048 or 4096",
            bits
        )));
    }

    if !provider.x509_is_sha256_rsa(x509) {
        return Err(Error::CertFail(
            "certificate is not signed with sha256WithRSAEncryption".into(),
        ));
    }

    log::debug!("Certificate OK: {}", provider.x509_summary(x509));
    Ok(())
}

/// Parse a DER or PEM certificate and check it
pub fn validate_cert_bytes<P: CryptoProvider>(provider: &P, data: &[u8]) -> Result<()> {
    let x509 = provider.parse_x509(data)?;
    validate_cert(provider, &x509)
}

/// Check the signature lists of a variable value
///
/// Every certificate entry must pass [`validate_cert`]. A non-empty PK must
/// hold exactly one list containing one certificate. Returns the number of
/// lists.
pub fn validate_esl<P: CryptoProvider>(
    provider: &P,
    data: &[u8],
    variable: Option<SecureBootVariable>,
) -> Result<usize> {
    let lists = collect_signature_lists(data)?;
    check_lists(provider, &lists, variable)?;
    Ok(lists.len())
}

fn check_lists<P: CryptoProvider>(
    provider: &P,
    lists: &[SignatureList<'_>],
    variable: Option<SecureBootVariable>,
) -> Result<()> {
    for (i, list) in lists.iter().enumerate() {
        log::debug!(
            "List {}: {} x {} bytes",
            i,
            list.signature_count(),
            list.signature_size()
        );
        if !list.is_x509() {
            continue;
        }
        for (j, entry) in list.signatures().enumerate() {
            validate_cert_bytes(provider, entry.payload).map_err(|e| {
                log::error!("Certificate {} of list {} is invalid", j, i);
                e
            })?;
        }
    }

    if variable == Some(SecureBootVariable::PK) && !lists.is_empty() {
        let single_cert = lists.len() == 1 && lists[0].is_x509() && lists[0].signature_count() == 1;
        if !single_cert {
            return Err(Error::CertFail(
                "PK must contain exactly one X.509 certificate".into(),
            ));
        }
    }
    Ok(())
}

/// Check an authenticated update file
///
/// Covers the envelope layout, the timestamp, the PKCS#7 digest algorithm,
/// the signing certificates and the appended lists.
pub fn validate_auth<P: CryptoProvider>(
    provider: &P,
    data: &[u8],
    variable: Option<SecureBootVariable>,
) -> Result<()> {
    let desc = parse_authentication_descriptor(provider, data)?;
    validate_time(desc.timestamp())?;

    match provider.pkcs7_digest_algorithm(desc.pkcs7()) {
        Some(HashAlgorithm::Sha256) => {}
        other => {
            return Err(Error::CertFail(format!(
                "PKCS#7 digest algorithm {:?} is not SHA-256",
                other
            )));
        }
    }

    let mut index = 0;
    while let Some(x509) = provider.signing_certificate(desc.pkcs7(), index) {
        validate_cert(provider, x509)?;
        index += 1;
    }
    if index == 0 {
        log::warn!("PKCS#7 carries no certificates");
    }

    check_lists(provider, desc.signature_lists(), variable)?;

    log::info!(
        "Update signed at {} with {} certificate(s) and {} list(s) is valid",
        desc.timestamp(),
        index,
        desc.signature_lists().len()
    );
    Ok(())
}

/// Check a TS blob: four legal timestamps, or zeroes
pub fn validate_ts(data: &[u8]) -> Result<TimestampVariable> {
    if data.len() != TimestampVariable::SIZE {
        return Err(Error::BadTimestamp(format!(
            "TS is {} bytes, expected {}",
            data.len(),
            TimestampVariable::SIZE
        )));
    }
    TimestampVariable::parse_and_validate(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efi::auth::crypto::RustCrypto;
    use crate::efi::auth::crypto::fake::{self, Fake};
    use crate::efi::auth::structures::EfiTime;
    use crate::efi::auth::{
        EFI_CERT_SHA256_GUID, EFI_CERT_X509_GUID, SignatureData, build_authentication_descriptor,
        encode_signature_list,
    };
    use crate::error::ErrorKind;
    use r_efi::efi::Guid;

    const OWNER: Guid = Guid::from_fields(0x5365636b, 0x7661, 0x7263, 0x74, 0x6c, &[0x2d, 0x74, 0x65, 0x73, 0x74, 0x00]);

    const PK_DER: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/PK.der"));
    const KEK_PEM: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/KEK.pem"));
    const PK_ESL: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/PK.esl"));
    const KEK_ESL: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/KEK.esl"));
    const DB_ESL: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/db.esl"));
    const DB_BY_KEK: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/db_by_KEK.auth"));
    const KEK_BY_PK: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/KEK_by_PK.auth"));

    #[test]
    fn test_fixture_certificates() {
        validate_cert_bytes(&RustCrypto, PK_DER).unwrap();
        validate_cert_bytes(&RustCrypto, KEK_PEM).unwrap();
        assert_eq!(
            validate_cert_bytes(&RustCrypto, b"garbage").unwrap_err().kind(),
            ErrorKind::CertFail
        );
    }

    #[test]
    fn test_fixture_esls() {
        assert_eq!(validate_esl(&RustCrypto, PK_ESL, Some(SecureBootVariable::PK)).unwrap(), 1);
        assert_eq!(validate_esl(&RustCrypto, KEK_ESL, Some(SecureBootVariable::KEK)).unwrap(), 1);
        assert_eq!(validate_esl(&RustCrypto, DB_ESL, None).unwrap(), 1);
    }

    #[test]
    fn test_pk_with_two_certificates() {
        let two = [PK_ESL, KEK_ESL].concat();
        validate_esl(&RustCrypto, &two, Some(SecureBootVariable::KEK)).unwrap();
        assert_eq!(
            validate_esl(&RustCrypto, &two, Some(SecureBootVariable::PK)).unwrap_err().kind(),
            ErrorKind::CertFail
        );
    }

    #[test]
    fn test_pk_holding_a_hash() {
        let hash = [0u8; 32];
        let esl = encode_signature_list(&EFI_CERT_SHA256_GUID, &[SignatureData { owner: OWNER, payload: &hash }]).unwrap();
        validate_esl(&RustCrypto, &esl, Some(SecureBootVariable::Db)).unwrap();
        assert!(validate_esl(&RustCrypto, &esl, Some(SecureBootVariable::PK)).is_err());
    }

    #[test]
    fn test_bad_certificate_in_esl() {
        let junk = SignatureData { owner: OWNER, payload: b"not a certificate at all" };
        let esl = encode_signature_list(&EFI_CERT_X509_GUID, &[junk]).unwrap();
        assert_eq!(
            validate_esl(&RustCrypto, &esl, None).unwrap_err().kind(),
            ErrorKind::CertFail
        );
    }

    #[test]
    fn test_truncated_esl() {
        let err = validate_esl(&RustCrypto, &DB_ESL[..DB_ESL.len() - 1], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_fixture_auth_files() {
        validate_auth(&RustCrypto, DB_BY_KEK, Some(SecureBootVariable::Db)).unwrap();
        validate_auth(&RustCrypto, KEK_BY_PK, Some(SecureBootVariable::KEK)).unwrap();
    }

    #[test]
    fn test_auth_bad_timestamp() {
        let data = build_authentication_descriptor(
            &EfiTime::new(2024, 13, 1, 0, 0, 0),
            &fake::pkcs7("KEK", &[0u8; 32]),
            &[],
        );
        assert_eq!(
            validate_auth(&Fake, &data, None).unwrap_err().kind(),
            ErrorKind::BadTimestamp
        );
    }

    #[test]
    fn test_auth_fake_envelope() {
        let cert = fake::cert("db");
        let esl = encode_signature_list(&EFI_CERT_X509_GUID, &[SignatureData { owner: OWNER, payload: &cert }]).unwrap();
        let data = build_authentication_descriptor(
            &EfiTime::new(2024, 1, 1, 0, 0, 0),
            &fake::pkcs7("KEK", &[0u8; 32]),
            &esl,
        );
        validate_auth(&Fake, &data, Some(SecureBootVariable::Db)).unwrap();
    }

    #[test]
    fn test_ts_validation() {
        let mut ts = TimestampVariable::zero();
        ts.set(SecureBootVariable::KEK, EfiTime::new(2024, 3, 4, 5, 6, 7));
        validate_ts(&ts.to_bytes()).unwrap();

        assert_eq!(validate_ts(&[]).unwrap_err().kind(), ErrorKind::BadTimestamp);

        ts.set(SecureBootVariable::Dbx, EfiTime::new(2024, 4, 31, 0, 0, 0));
        assert_eq!(
            validate_ts(&ts.to_bytes()).unwrap_err().kind(),
            ErrorKind::BadTimestamp
        );
    }
}
