//! Secure boot variable authentication
//!
//! Everything needed to decide whether bytes destined for PK, KEK, db, dbx
//! or TS are well formed and, for updates, authorized:
//!
//! - `structures` / `signature_list`: raw layouts and the ESL codec
//! - `descriptor`: the `EFI_VARIABLE_AUTHENTICATION_2` update envelope
//! - `signature`: the trust chain (PK signs PK and KEK, KEK signs db, dbx, TS)
//! - [`validate`]: format-only checks that need no stored keys
//! - [`crypto`]: the provider boundary to X.509, PKCS#7 and hashing
//!
//! GUIDs and attribute bits below are the standard UEFI values.

pub mod crypto;
mod descriptor;
mod signature;
mod signature_list;
mod structures;
pub mod time;
pub mod validate;
mod variables;

pub use descriptor::*;
pub use signature::*;
pub use signature_list::*;
pub use structures::*;
pub use variables::*;

use crypto::HashAlgorithm;
use r_efi::efi::Guid;

/// Lowercase registry form, e.g. `8be4df61-93ca-11d2-aa0d-00e098032b8c`
pub fn format_guid(guid: &Guid) -> String {
    let (d1, d2, d3, d4, d5, node) = guid.as_fields();
    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        d1, d2, d3, d4, d5, node[0], node[1], node[2], node[3], node[4], node[5]
    )
}

/// Variable attribute bits
pub mod attributes {
    pub const NON_VOLATILE: u32 = 0x01;
    pub const BOOTSERVICE_ACCESS: u32 = 0x02;
    pub const RUNTIME_ACCESS: u32 = 0x04;
    pub const TIME_BASED_AUTHENTICATED_WRITE_ACCESS: u32 = 0x20;
    pub const APPEND_WRITE: u32 = 0x40;

    /// Attributes covered by every secure boot update signature (0x27)
    pub const SECURE_BOOT_ATTRS: u32 =
        NON_VOLATILE | BOOTSERVICE_ACCESS | RUNTIME_ACCESS | TIME_BASED_AUTHENTICATED_WRITE_ACCESS;
}

// ============================================================================
// GUIDs
// ============================================================================

/// Vendor GUID of PK and KEK
pub const EFI_GLOBAL_VARIABLE_GUID: Guid =
    Guid::from_fields(0x8be4df61, 0x93ca, 0x11d2, 0xaa, 0x0d, &[0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c]);

/// Vendor GUID of db, dbx and TS
pub const EFI_IMAGE_SECURITY_DATABASE_GUID: Guid =
    Guid::from_fields(0xd719b2cb, 0x3d3a, 0x4596, 0xa3, 0xbc, &[0xda, 0xd0, 0x0e, 0x67, 0x65, 0x6f]);

/// Signature type: DER X.509 certificate, variable size
pub const EFI_CERT_X509_GUID: Guid =
    Guid::from_fields(0xa5c059a1, 0x94e4, 0x4aa7, 0x87, 0xb5, &[0xab, 0x15, 0x5c, 0x2b, 0xf0, 0x72]);

/// Signature type: bare RSA-2048 modulus
pub const EFI_CERT_RSA2048_GUID: Guid =
    Guid::from_fields(0x3c5766e8, 0x269c, 0x4e34, 0xaa, 0x14, &[0xed, 0x77, 0x6e, 0x85, 0xb3, 0xb6]);

pub const EFI_CERT_SHA1_GUID: Guid =
    Guid::from_fields(0x826ca512, 0xcf10, 0x4ac9, 0xb1, 0x87, &[0xbe, 0x01, 0x49, 0x66, 0x31, 0xbd]);

pub const EFI_CERT_SHA224_GUID: Guid =
    Guid::from_fields(0x0b6e5233, 0xa65c, 0x44c9, 0x94, 0x07, &[0xd9, 0xab, 0x83, 0xbf, 0xc8, 0xbd]);

pub const EFI_CERT_SHA256_GUID: Guid =
    Guid::from_fields(0xc1c41626, 0x504c, 0x4092, 0xac, 0xa9, &[0x41, 0xf9, 0x36, 0x93, 0x43, 0x28]);

pub const EFI_CERT_SHA384_GUID: Guid =
    Guid::from_fields(0xff3e5307, 0x9fd0, 0x48c9, 0x85, 0xf1, &[0x8a, 0xd5, 0x6c, 0x70, 0x1e, 0x01]);

pub const EFI_CERT_SHA512_GUID: Guid =
    Guid::from_fields(0x093e0fae, 0xa6c4, 0x4f50, 0x9f, 0x1b, &[0xd4, 0x1e, 0x2b, 0x89, 0xc1, 0x9a]);

/// `CertType` of a WIN_CERTIFICATE_UEFI_GUID holding PKCS#7 SignedData
pub const EFI_CERT_TYPE_PKCS7_GUID: Guid =
    Guid::from_fields(0x4aafd29d, 0x68df, 0x49ee, 0x8a, 0xa9, &[0x34, 0x7d, 0x37, 0x56, 0x65, 0xa7]);

pub const WIN_CERT_REVISION: u16 = 0x0200;
pub const WIN_CERT_TYPE_EFI_GUID: u16 = 0x0EF1;

// ============================================================================
// Hash Function Table
// ============================================================================

/// One row of the hash-type signature list table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashFunction {
    /// Display name
    pub name: &'static str,
    /// Digest size in bytes
    pub size: usize,
    /// Algorithm used to compute the digest
    pub algorithm: HashAlgorithm,
    /// Signature type GUID of lists holding this digest
    pub guid: Guid,
}

/// Hash-type signature lists understood by the codec
pub static HASH_FUNCTIONS: [HashFunction; 5] = [
    HashFunction {
        name: "SHA1",
        size: 20,
        algorithm: HashAlgorithm::Sha1,
        guid: EFI_CERT_SHA1_GUID,
    },
    HashFunction {
        name: "SHA224",
        size: 28,
        algorithm: HashAlgorithm::Sha224,
        guid: EFI_CERT_SHA224_GUID,
    },
    HashFunction {
        name: "SHA256",
        size: 32,
        algorithm: HashAlgorithm::Sha256,
        guid: EFI_CERT_SHA256_GUID,
    },
    HashFunction {
        name: "SHA384",
        size: 48,
        algorithm: HashAlgorithm::Sha384,
        guid: EFI_CERT_SHA384_GUID,
    },
    HashFunction {
        name: "SHA512",
        size: 64,
        algorithm: HashAlgorithm::Sha512,
        guid: EFI_CERT_SHA512_GUID,
    },
];

/// Look up the hash table entry for a signature type GUID
pub fn hash_function_for_guid(guid: &Guid) -> Option<&'static HashFunction> {
    HASH_FUNCTIONS.iter().find(|h| h.guid == *guid)
}

/// Human-readable name of a signature type
pub fn signature_type_name(guid: &Guid) -> &'static str {
    if *guid == EFI_CERT_X509_GUID {
        "X509"
    } else if *guid == EFI_CERT_RSA2048_GUID {
        "RSA2048"
    } else if let Some(hash) = hash_function_for_guid(guid) {
        hash.name
    } else {
        "UNKNOWN"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_guid() {
        assert_eq!(
            format_guid(&EFI_GLOBAL_VARIABLE_GUID),
            "8be4df61-93ca-11d2-aa0d-00e098032b8c"
        );
        assert_eq!(
            format_guid(&EFI_IMAGE_SECURITY_DATABASE_GUID),
            "d719b2cb-3d3a-4596-a3bc-dad00e67656f"
        );
    }

    #[test]
    fn test_guid_wire_layout() {
        // First three fields are little-endian on the wire
        assert_eq!(
            EFI_CERT_TYPE_PKCS7_GUID.as_bytes(),
            &[
                0x9D, 0xD2, 0xAF, 0x4A, 0xDF, 0x68, 0xEE, 0x49, 0x8A, 0xA9, 0x34, 0x7D, 0x37, 0x56,
                0x65, 0xA7
            ]
        );
    }

    #[test]
    fn test_hash_table_sizes() {
        let expect = [
            (EFI_CERT_SHA1_GUID, 20),
            (EFI_CERT_SHA224_GUID, 28),
            (EFI_CERT_SHA256_GUID, 32),
            (EFI_CERT_SHA384_GUID, 48),
            (EFI_CERT_SHA512_GUID, 64),
        ];
        for (guid, size) in expect {
            let entry = hash_function_for_guid(&guid).unwrap();
            assert_eq!(entry.size, size);
            assert_eq!(entry.algorithm.digest_size(), size);
        }
        assert!(hash_function_for_guid(&EFI_CERT_X509_GUID).is_none());
    }

    #[test]
    fn test_signature_type_name() {
        assert_eq!(signature_type_name(&EFI_CERT_X509_GUID), "X509");
        assert_eq!(signature_type_name(&EFI_CERT_SHA384_GUID), "SHA384");
        assert_eq!(signature_type_name(&EFI_GLOBAL_VARIABLE_GUID), "UNKNOWN");
    }
}
