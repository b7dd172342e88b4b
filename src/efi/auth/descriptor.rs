//! Authenticated update envelope
//!
//! An update file is an `EFI_VARIABLE_AUTHENTICATION_2` header (timestamp and
//! `WIN_CERTIFICATE_UEFI_GUID`), the PKCS#7 SignedData, and then the new
//! variable value as signature lists.

use super::crypto::CryptoProvider;
use super::signature_list::{SignatureList, collect_signature_lists};
use super::structures::{EfiTime, EfiVariableAuthentication2, WinCertificateUefiGuid};
use super::{EFI_CERT_TYPE_PKCS7_GUID, WIN_CERT_REVISION, WIN_CERT_TYPE_EFI_GUID};
use crate::error::{Error, Result};

// Field offsets within EFI_VARIABLE_AUTHENTICATION_2, for error context
const DW_LENGTH_OFFSET: usize = 16;
const REVISION_OFFSET: usize = 20;
const CERT_TYPE_OFFSET: usize = 22;
const CERT_GUID_OFFSET: usize = 24;

/// A parsed authenticated update
pub struct AuthenticationDescriptor<'a, P: CryptoProvider> {
    timestamp: EfiTime,
    pkcs7_blob: &'a [u8],
    pkcs7: P::Pkcs7,
    payload: &'a [u8],
    lists: Vec<SignatureList<'a>>,
}

impl<'a, P: CryptoProvider> AuthenticationDescriptor<'a, P> {
    /// Timestamp the update was signed with
    pub fn timestamp(&self) -> &EfiTime {
        &self.timestamp
    }

    /// Raw PKCS#7 bytes
    pub fn pkcs7_blob(&self) -> &'a [u8] {
        self.pkcs7_blob
    }

    /// Provider handle for the PKCS#7 signature
    pub fn pkcs7(&self) -> &P::Pkcs7 {
        &self.pkcs7
    }

    /// New variable value (signature lists), possibly empty
    pub fn appended_payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The appended payload, already validated
    pub fn signature_lists(&self) -> &[SignatureList<'a>] {
        &self.lists
    }
}

impl<P: CryptoProvider> core::fmt::Debug for AuthenticationDescriptor<'_, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthenticationDescriptor")
            .field("timestamp", &self.timestamp)
            .field("pkcs7_len", &self.pkcs7_blob.len())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Parse an authenticated update
///
/// The end of the PKCS#7 region is taken from the provider's decoded
/// length and must agree with `dwLength`.
pub fn parse_authentication_descriptor<'a, P: CryptoProvider>(
    provider: &P,
    data: &'a [u8],
) -> Result<AuthenticationDescriptor<'a, P>> {
    let auth = EfiVariableAuthentication2::from_bytes(data)
        .ok_or_else(|| Error::malformed(0, "authentication header"))?;

    let revision = auth.auth_info.hdr.w_revision;
    if revision != WIN_CERT_REVISION {
        log::debug!("WIN_CERTIFICATE revision {:#06x}", revision);
        return Err(Error::malformed(REVISION_OFFSET, "wRevision"));
    }

    let cert_type = auth.auth_info.hdr.w_certificate_type;
    if cert_type != WIN_CERT_TYPE_EFI_GUID {
        log::debug!("WIN_CERTIFICATE type {:#06x}", cert_type);
        return Err(Error::malformed(CERT_TYPE_OFFSET, "wCertificateType"));
    }

    if !auth
        .auth_info
        .cert_type_matches(EFI_CERT_TYPE_PKCS7_GUID.as_bytes())
    {
        return Err(Error::malformed(CERT_GUID_OFFSET, "CertType"));
    }

    let dw_length = auth.auth_info.hdr.dw_length as usize;
    let cert_end = EfiTime::SIZE
        .checked_add(dw_length)
        .filter(|&end| dw_length >= WinCertificateUefiGuid::HEADER_SIZE && end <= data.len())
        .ok_or_else(|| Error::malformed(DW_LENGTH_OFFSET, "dwLength"))?;

    let pkcs7_start = EfiVariableAuthentication2::HEADER_SIZE;
    let pkcs7 = provider.parse_pkcs7(&data[pkcs7_start..])?;
    let pkcs7_len = provider.pkcs7_encoded_len(&pkcs7);
    if pkcs7_start + pkcs7_len != cert_end {
        log::debug!(
            "PKCS#7 decodes to {} bytes but dwLength leaves {}",
            pkcs7_len,
            cert_end - pkcs7_start
        );
        return Err(Error::malformed(DW_LENGTH_OFFSET, "dwLength"));
    }

    let payload = &data[cert_end..];
    let lists = collect_signature_lists(payload).map_err(|e| match e {
        Error::MalformedInput { offset, field } => Error::malformed(cert_end + offset, field),
        other => other,
    })?;

    log::debug!(
        "Parsed update: timestamp {}, {} byte PKCS#7, {} signature list(s)",
        auth.time_stamp,
        pkcs7_len,
        lists.len()
    );

    Ok(AuthenticationDescriptor {
        timestamp: auth.time_stamp,
        pkcs7_blob: &data[pkcs7_start..cert_end],
        pkcs7,
        payload,
        lists,
    })
}

/// Build an update envelope around an already-encoded PKCS#7 blob
pub fn build_authentication_descriptor(timestamp: &EfiTime, pkcs7: &[u8], payload: &[u8]) -> Vec<u8> {
    use zerocopy::IntoBytes;

    let dw_length = (WinCertificateUefiGuid::HEADER_SIZE + pkcs7.len()) as u32;
    let mut out = Vec::with_capacity(EfiTime::SIZE + dw_length as usize + payload.len());
    out.extend_from_slice(timestamp.as_bytes());
    out.extend_from_slice(&dw_length.to_le_bytes());
    out.extend_from_slice(&WIN_CERT_REVISION.to_le_bytes());
    out.extend_from_slice(&WIN_CERT_TYPE_EFI_GUID.to_le_bytes());
    out.extend_from_slice(EFI_CERT_TYPE_PKCS7_GUID.as_bytes());
    out.extend_from_slice(pkcs7);
    out.extend_from_slice(payload);
    out
}
