//! Secure Boot Variable Identities
//!
//! Names, vendor GUIDs and the fixed trust authority table for the secure
//! boot variables, plus construction of the data an update signs.

use super::structures::EfiTime;
use super::{EFI_GLOBAL_VARIABLE_GUID, EFI_IMAGE_SECURITY_DATABASE_GUID, attributes};
use crate::error::{Error, Result};
use r_efi::efi::Guid;
use zerocopy::IntoBytes;

/// A secure boot variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecureBootVariable {
    /// Platform Key
    PK,
    /// Key Exchange Key
    KEK,
    /// Signature database
    Db,
    /// Forbidden signature database
    Dbx,
    /// Update timestamps (PowerNV only)
    TS,
}

impl SecureBootVariable {
    /// Every variable, in display order
    pub const ALL: [SecureBootVariable; 5] = [
        SecureBootVariable::PK,
        SecureBootVariable::KEK,
        SecureBootVariable::Db,
        SecureBootVariable::Dbx,
        SecureBootVariable::TS,
    ];

    /// Look up a variable by its exact (case-sensitive) name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|var| var.name() == name)
            .ok_or_else(|| Error::InvalidVariableName(name.to_string()))
    }

    /// Variable name as stored
    pub const fn name(self) -> &'static str {
        match self {
            SecureBootVariable::PK => "PK",
            SecureBootVariable::KEK => "KEK",
            SecureBootVariable::Db => "db",
            SecureBootVariable::Dbx => "dbx",
            SecureBootVariable::TS => "TS",
        }
    }

    /// Vendor GUID the variable lives under
    pub const fn vendor_guid(self) -> Guid {
        match self {
            SecureBootVariable::PK | SecureBootVariable::KEK => EFI_GLOBAL_VARIABLE_GUID,
            SecureBootVariable::Db | SecureBootVariable::Dbx | SecureBootVariable::TS => {
                EFI_IMAGE_SECURITY_DATABASE_GUID
            }
        }
    }

    /// Variable whose certificates may sign updates to this one
    ///
    /// PK signs PK and KEK; KEK signs db, dbx and TS.
    pub const fn authority(self) -> SecureBootVariable {
        match self {
            SecureBootVariable::PK | SecureBootVariable::KEK => SecureBootVariable::PK,
            SecureBootVariable::Db | SecureBootVariable::Dbx | SecureBootVariable::TS => {
                SecureBootVariable::KEK
            }
        }
    }

    /// Whether the value is a signature database (everything but TS)
    pub const fn holds_signature_lists(self) -> bool {
        !matches!(self, SecureBootVariable::TS)
    }

    /// Name encoded as UCS-2, without a terminator
    pub fn ucs2_name(self) -> Vec<u16> {
        self.name().encode_utf16().collect()
    }
}

impl core::fmt::Display for SecureBootVariable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the data that is signed for an authenticated update
///
/// VariableName || VendorGuid || Attributes || TimeStamp || DataNew, with the
/// name in UCS-2 without its terminator.
pub fn build_signed_data(var: SecureBootVariable, timestamp: &EfiTime, data: &[u8]) -> Vec<u8> {
    let name = var.ucs2_name();
    let mut result = Vec::with_capacity(name.len() * 2 + 16 + 4 + EfiTime::SIZE + data.len());

    for ch in name {
        result.extend_from_slice(&ch.to_le_bytes());
    }
    result.extend_from_slice(var.vendor_guid().as_bytes());
    result.extend_from_slice(&attributes::SECURE_BOOT_ATTRS.to_le_bytes());
    result.extend_from_slice(timestamp.as_bytes());
    result.extend_from_slice(data);

    result
}
