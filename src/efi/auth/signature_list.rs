//! EFI Signature List codec
//!
//! Parses and serializes the `EFI_SIGNATURE_LIST` sequences that make up the
//! PK, KEK, db and dbx variables. Parsing is lazy: [`parse_signature_list`]
//! returns an iterator that validates one list at a time and stops for good
//! at the first structural violation.

use super::structures::{EfiSignatureData, EfiSignatureList};
use super::{EFI_CERT_RSA2048_GUID, EFI_CERT_X509_GUID, hash_function_for_guid};
use crate::error::{Error, Result};
use r_efi::efi::Guid;
use zerocopy::{FromBytes, IntoBytes};

/// Size of an RSA-2048 public key modulus entry
const RSA2048_KEY_SIZE: usize = 256;

// Field offsets within EFI_SIGNATURE_LIST, for error context
const LIST_SIZE_OFFSET: usize = 16;
const HEADER_SIZE_OFFSET: usize = 20;
const SIGNATURE_SIZE_OFFSET: usize = 24;

// ============================================================================
// Parsed Views
// ============================================================================

/// One validated signature list, borrowing from the source buffer
#[derive(Debug, Clone, Copy)]
pub struct SignatureList<'a> {
    signature_type: Guid,
    header: &'a [u8],
    signature_size: usize,
    signatures: &'a [u8],
}

/// One signature entry: owner GUID plus a hash or DER certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureData<'a> {
    pub owner: Guid,
    pub payload: &'a [u8],
}

impl<'a> SignatureList<'a> {
    /// Signature type GUID
    pub fn signature_type(&self) -> &Guid {
        &self.signature_type
    }

    /// Optional vendor signature header (usually empty)
    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    /// Size of each entry, including its owner GUID
    pub fn signature_size(&self) -> usize {
        self.signature_size
    }

    /// Number of entries in this list
    pub fn signature_count(&self) -> usize {
        self.signatures.len() / self.signature_size
    }

    /// Total encoded size of this list
    pub fn list_size(&self) -> usize {
        EfiSignatureList::HEADER_SIZE + self.header.len() + self.signatures.len()
    }

    /// Whether entries are X.509 certificates
    pub fn is_x509(&self) -> bool {
        self.signature_type == EFI_CERT_X509_GUID
    }

    /// Iterate over the entries in source order
    pub fn signatures(&self) -> impl Iterator<Item = SignatureData<'a>> + 'a {
        self.signatures
            .chunks_exact(self.signature_size)
            .map(|entry| {
                let (owner, payload) = entry.split_at(EfiSignatureData::HEADER_SIZE);
                let mut guid = [0u8; 16];
                guid.copy_from_slice(owner);
                SignatureData {
                    owner: Guid::from_bytes(&guid),
                    payload,
                }
            })
    }

    /// Append the encoded form of this list to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let raw = EfiSignatureList {
            signature_type: *self.signature_type.as_bytes(),
            signature_list_size: self.list_size() as u32,
            signature_header_size: self.header.len() as u32,
            signature_size: self.signature_size as u32,
        };
        out.extend_from_slice(raw.as_bytes());
        out.extend_from_slice(self.header);
        out.extend_from_slice(self.signatures);
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Lazy iterator over the signature lists of a buffer
///
/// Yields `Err` once and then ends if the buffer is malformed.
pub struct SignatureLists<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Parse a buffer holding zero or more concatenated signature lists
pub fn parse_signature_list(data: &[u8]) -> SignatureLists<'_> {
    SignatureLists {
        data,
        offset: 0,
        failed: false,
    }
}

impl<'a> SignatureLists<'a> {
    /// Byte offset of the next list to be parsed
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn parse_next(&mut self) -> Result<SignatureList<'a>> {
        let offset = self.offset;
        let remaining = &self.data[offset..];

        let (raw, _) = EfiSignatureList::read_from_prefix(remaining)
            .map_err(|_| Error::malformed(offset, "signature list header"))?;

        let list_size = raw.signature_list_size as usize;
        let header_size = raw.signature_header_size as usize;
        let signature_size = raw.signature_size as usize;
        let signature_type = Guid::from_bytes(&raw.signature_type);

        if list_size > remaining.len() {
            return Err(Error::malformed(
                offset + LIST_SIZE_OFFSET,
                "signature_list_size",
            ));
        }

        let body_start = EfiSignatureList::HEADER_SIZE
            .checked_add(header_size)
            .filter(|&start| start <= list_size)
            .ok_or_else(|| Error::malformed(offset + HEADER_SIZE_OFFSET, "signature_header_size"))?;

        if signature_size <= EfiSignatureData::HEADER_SIZE {
            return Err(Error::malformed(
                offset + SIGNATURE_SIZE_OFFSET,
                "signature_size",
            ));
        }

        let body_len = list_size - body_start;
        if body_len % signature_size != 0 {
            return Err(Error::malformed(
                offset + LIST_SIZE_OFFSET,
                "signature_list_size",
            ));
        }

        let expected_payload = expected_payload_size(&signature_type).ok_or_else(|| {
            log::debug!(
                "Unsupported signature type {} at offset {}",
                super::format_guid(&signature_type),
                offset
            );
            Error::malformed(offset, "signature_type")
        })?;
        if let Some(payload_size) = expected_payload {
            if signature_size != EfiSignatureData::HEADER_SIZE + payload_size {
                return Err(Error::malformed(
                    offset + SIGNATURE_SIZE_OFFSET,
                    "signature_size",
                ));
            }
        }

        self.offset += list_size;

        Ok(SignatureList {
            signature_type,
            header: &remaining[EfiSignatureList::HEADER_SIZE..body_start],
            signature_size,
            signatures: &remaining[body_start..list_size],
        })
    }
}

impl<'a> Iterator for SignatureLists<'a> {
    type Item = Result<SignatureList<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let result = self.parse_next();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl core::iter::FusedIterator for SignatureLists<'_> {}

/// Fixed payload size implied by a signature type
///
/// `None` if the type is unknown, `Some(None)` if payloads are variable-size
/// (X.509 certificates).
fn expected_payload_size(signature_type: &Guid) -> Option<Option<usize>> {
    if *signature_type == EFI_CERT_X509_GUID {
        Some(None)
    } else if *signature_type == EFI_CERT_RSA2048_GUID {
        Some(Some(RSA2048_KEY_SIZE))
    } else {
        hash_function_for_guid(signature_type).map(|hash| Some(hash.size))
    }
}

/// Parse a whole buffer eagerly, failing on the first malformed list
pub fn collect_signature_lists(data: &[u8]) -> Result<Vec<SignatureList<'_>>> {
    parse_signature_list(data).collect()
}

/// Every X.509 certificate in a signature database, in source order
pub fn x509_certificates(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut certs = Vec::new();
    for list in parse_signature_list(data) {
        let list = list?;
        if list.is_x509() {
            certs.extend(list.signatures().map(|sig| sig.payload));
        }
    }
    Ok(certs)
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize parsed lists back to their wire form
pub fn serialize_signature_lists(lists: &[SignatureList<'_>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lists.iter().map(|l| l.list_size()).sum());
    for list in lists {
        list.write_to(&mut out);
    }
    out
}

/// Build one signature list from entries sharing a signature type
///
/// All payloads must have the same size, since a list carries a single
/// signature size.
pub fn encode_signature_list(signature_type: &Guid, entries: &[SignatureData<'_>]) -> Result<Vec<u8>> {
    let payload_size = entries
        .first()
        .map(|e| e.payload.len())
        .or_else(|| expected_payload_size(signature_type).flatten())
        .unwrap_or(0);
    if let Some(pos) = entries.iter().position(|e| e.payload.len() != payload_size) {
        return Err(Error::malformed(pos, "signature payload size"));
    }

    let signature_size = EfiSignatureData::HEADER_SIZE + payload_size;
    let list_size = EfiSignatureList::HEADER_SIZE + signature_size * entries.len();
    let raw = EfiSignatureList {
        signature_type: *signature_type.as_bytes(),
        signature_list_size: u32::try_from(list_size)
            .map_err(|_| Error::malformed(0, "signature_list_size"))?,
        signature_header_size: 0,
        signature_size: signature_size as u32,
    };

    let mut out = Vec::with_capacity(list_size);
    out.extend_from_slice(raw.as_bytes());
    for entry in entries {
        out.extend_from_slice(entry.owner.as_bytes());
        out.extend_from_slice(entry.payload);
    }
    Ok(out)
}
