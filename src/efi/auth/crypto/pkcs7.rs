//! CMS SignedData decoding shared by the crypto adapters
//!
//! rust-openssl has no accessors for SignerInfo internals, so both adapters
//! take signer details from this decode.

use super::HashAlgorithm;
use crate::error::{Error, Result};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::{ObjectIdentifier, OctetStringRef};
use der::{Any, Decode, Encode, Reader, SliceReader};
use x509_cert::Certificate;

/// id-signedData (RFC 2315 section 14)
pub(crate) const ID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// id-messageDigest (RFC 5652 section 11.2)
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// rsaEncryption
pub(crate) const RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// sha256WithRSAEncryption
pub(crate) const SHA256_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// A SignedData together with where it ended in the input
pub(crate) struct DecodedSignedData {
    pub signed_data: SignedData,
    /// Bytes consumed from the input
    pub encoded_len: usize,
    /// Whether the input carried a ContentInfo wrapper
    pub wrapped: bool,
}

/// What a provider needs to check one signer
pub(crate) struct SignerDetails {
    pub digest_algorithm: Option<HashAlgorithm>,
    pub signed_attributes: Option<SignedAttributes>,
    pub signature: Vec<u8>,
}

/// Authenticated attributes of a signer
pub(crate) struct SignedAttributes {
    /// DER of the attributes as a SET OF, which is what gets signed
    pub der: Vec<u8>,
    pub message_digest: Option<Vec<u8>>,
}

impl SignerDetails {
    /// Whether the messageDigest attribute (if any) matches `expected_hash`
    pub fn message_digest_matches(&self, expected_hash: &[u8]) -> bool {
        match &self.signed_attributes {
            Some(attrs) => attrs.message_digest.as_deref() == Some(expected_hash),
            None => true,
        }
    }
}

/// Decode the PKCS#7 object at the start of `data`
///
/// Accepts either a ContentInfo-wrapped SignedData or a bare SignedData.
pub(crate) fn decode_signed_data(data: &[u8]) -> Result<DecodedSignedData> {
    let cert_fail = |e: der::Error| {
        log::debug!("Failed to parse PKCS#7: {}", e);
        Error::CertFail(format!("PKCS#7 parse failed: {}", e))
    };

    let mut reader = SliceReader::new(data).map_err(cert_fail)?;
    if let Ok(content_info) = ContentInfo::decode(&mut reader) {
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::CertFail(format!(
                "PKCS#7 content type {} is not signedData",
                content_info.content_type
            )));
        }
        let encoded_len = usize::try_from(reader.position()).map_err(cert_fail)?;
        let signed_data = content_info
            .content
            .decode_as::<SignedData>()
            .map_err(cert_fail)?;
        return Ok(DecodedSignedData {
            signed_data,
            encoded_len,
            wrapped: true,
        });
    }

    let mut reader = SliceReader::new(data).map_err(cert_fail)?;
    let signed_data = SignedData::decode(&mut reader).map_err(cert_fail)?;
    let encoded_len = usize::try_from(reader.position()).map_err(cert_fail)?;
    Ok(DecodedSignedData {
        signed_data,
        encoded_len,
        wrapped: false,
    })
}

/// Wrap a bare SignedData in a ContentInfo
pub(crate) fn encapsulate_in_content_info(signed_data: &[u8]) -> Result<Vec<u8>> {
    let content = Any::from_der(signed_data)
        .map_err(|e| Error::CertFail(format!("PKCS#7 content: {}", e)))?;
    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content,
    }
    .to_der()
    .map_err(|e| Error::CertFail(format!("PKCS#7 encode: {}", e)))
}

/// Extract the fields needed for verification from every SignerInfo
pub(crate) fn signer_details(signed_data: &SignedData) -> Result<Vec<SignerDetails>> {
    let mut signers = Vec::new();
    for info in signed_data.signer_infos.0.iter() {
        let digest_algorithm = HashAlgorithm::from_oid(&info.digest_alg.oid.to_string());

        let signed_attributes = match &info.signed_attrs {
            Some(attrs) => {
                let der = attrs
                    .to_der()
                    .map_err(|e| Error::CertFail(format!("signed attributes: {}", e)))?;
                let message_digest = attrs
                    .iter()
                    .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
                    .and_then(|attr| attr.values.iter().next())
                    .and_then(|value| value.decode_as::<OctetStringRef<'_>>().ok())
                    .map(|digest| digest.as_bytes().to_vec());
                Some(SignedAttributes {
                    der,
                    message_digest,
                })
            }
            None => None,
        };

        signers.push(SignerDetails {
            digest_algorithm,
            signed_attributes,
            signature: info.signature.as_bytes().to_vec(),
        });
    }
    Ok(signers)
}

/// Certificates embedded in the SignedData, in encoded order
pub(crate) fn embedded_certificates(signed_data: &SignedData) -> Vec<Certificate> {
    signed_data
        .certificates
        .iter()
        .flat_map(|set| set.0.iter())
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efi::auth::EfiVariableAuthentication2;

    const DB_BY_KEK: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/testdata/db_by_KEK.auth"
    ));

    fn pkcs7_region(auth: &[u8]) -> &[u8] {
        &auth[EfiVariableAuthentication2::HEADER_SIZE..]
    }

    #[test]
    fn test_decode_finds_boundary() {
        let auth = DB_BY_KEK;
        let dw_length = u32::from_le_bytes([auth[16], auth[17], auth[18], auth[19]]) as usize;
        let decoded = decode_signed_data(pkcs7_region(auth)).unwrap();
        assert!(decoded.wrapped);
        assert_eq!(decoded.encoded_len, dw_length - 24);
    }

    #[test]
    fn test_signed_attributes_extracted() {
        let decoded = decode_signed_data(pkcs7_region(DB_BY_KEK)).unwrap();
        let signers = signer_details(&decoded.signed_data).unwrap();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].digest_algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(signers[0].signature.len(), 256);

        let attrs = signers[0].signed_attributes.as_ref().unwrap();
        assert_eq!(attrs.der[0], 0x31);
        assert_eq!(attrs.message_digest.as_ref().map(Vec::len), Some(32));
    }

    #[test]
    fn test_bare_signed_data_accepted() {
        let decoded = decode_signed_data(pkcs7_region(DB_BY_KEK)).unwrap();
        let bare = decoded.signed_data.to_der().unwrap();
        let again = decode_signed_data(&bare).unwrap();
        assert!(!again.wrapped);
        assert_eq!(again.encoded_len, bare.len());

        let wrapped = encapsulate_in_content_info(&bare).unwrap();
        assert_eq!(wrapped.len(), decoded.encoded_len);
    }

    #[test]
    fn test_embedded_certificate_is_signer() {
        let decoded = decode_signed_data(pkcs7_region(DB_BY_KEK)).unwrap();
        let certs = embedded_certificates(&decoded.signed_data);
        let kek = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/KEK.der"));
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].to_der().unwrap(), kek.to_vec());
    }

    #[test]
    fn test_garbage_is_cert_fail() {
        let err = decode_signed_data(&[0x30, 0x03, 0x02, 0x01]).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::CertFail);
    }
}
