//! Raw on-disk layouts
//!
//! Byte-exact views of the structures found in secure variable values and
//! update files. All multi-byte fields are little-endian and every struct is
//! packed, so they can be read straight out of untrusted buffers with
//! `zerocopy` and no alignment requirements.
//!
//! GUIDs are kept as `[u8; 16]` here; `r_efi::efi::Guid` is 4-byte aligned
//! and cannot sit inside a packed struct.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

// ============================================================================
// EFI_TIME
// ============================================================================

/// Timestamp carried by updates and recorded in TS
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EfiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    /// Minutes from UTC, or 2047 when unspecified
    pub timezone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

impl EfiTime {
    /// Encoded size (16 bytes)
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// The all-zero time, meaning "never updated"
    pub const fn zero() -> Self {
        Self {
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            pad1: 0,
            nanosecond: 0,
            timezone: 0,
            daylight: 0,
            pad2: 0,
        }
    }

    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            ..Self::zero()
        }
    }

    /// Decode the first 16 bytes of `data`
    pub fn read_from(data: &[u8]) -> Option<Self> {
        Self::read_from_prefix(data).ok().map(|(time, _)| time)
    }

    /// Order by calendar fields, then nanoseconds
    ///
    /// Timezone and daylight flags are ignored; update timestamps are UTC.
    pub fn compare(&self, other: &EfiTime) -> core::cmp::Ordering {
        // Packed fields wider than a byte must be copied out before borrowing
        let (year, other_year) = (self.year, other.year);
        let (ns, other_ns) = (self.nanosecond, other.nanosecond);

        year.cmp(&other_year)
            .then(self.month.cmp(&other.month))
            .then(self.day.cmp(&other.day))
            .then(self.hour.cmp(&other.hour))
            .then(self.minute.cmp(&other.minute))
            .then(self.second.cmp(&other.second))
            .then(ns.cmp(&other_ns))
    }

    /// Strictly later than `other`
    pub fn is_after(&self, other: &EfiTime) -> bool {
        self.compare(other).is_gt()
    }
}

impl core::fmt::Display for EfiTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let year = self.year;
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

// ============================================================================
// WIN_CERTIFICATE
// ============================================================================

/// Common certificate header
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WinCertificate {
    /// Length of the whole certificate, header included
    pub dw_length: u32,
    /// Must be 0x0200
    pub w_revision: u16,
    /// Must be 0x0EF1 (WIN_CERT_TYPE_EFI_GUID) for time-based updates
    pub w_certificate_type: u16,
}

/// Certificate header followed by a GUID naming the payload format
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WinCertificateUefiGuid {
    pub hdr: WinCertificate,
    /// EFI_CERT_TYPE_PKCS7_GUID for authenticated variables
    pub cert_type: [u8; 16],
}

impl WinCertificateUefiGuid {
    /// Encoded size (24 bytes)
    pub const HEADER_SIZE: usize = core::mem::size_of::<Self>();

    pub fn cert_type_matches(&self, guid_bytes: &[u8; 16]) -> bool {
        self.cert_type == *guid_bytes
    }
}

// ============================================================================
// EFI_VARIABLE_AUTHENTICATION_2
// ============================================================================

/// Fixed prefix of an update file
///
/// `auth_info.hdr.dw_length - 24` bytes of PKCS#7 follow, then the new value.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EfiVariableAuthentication2 {
    pub time_stamp: EfiTime,
    pub auth_info: WinCertificateUefiGuid,
}

impl EfiVariableAuthentication2 {
    /// Encoded size (40 bytes)
    pub const HEADER_SIZE: usize = core::mem::size_of::<Self>();

    pub fn from_bytes(data: &[u8]) -> Option<&Self> {
        Self::ref_from_prefix(data).ok().map(|(auth, _)| auth)
    }
}

// ============================================================================
// EFI_SIGNATURE_LIST / EFI_SIGNATURE_DATA
// ============================================================================

/// Header of one signature list
///
/// Layout: this header, `signature_header_size` opaque bytes, then entries
/// of `signature_size` bytes each until `signature_list_size` is used up.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EfiSignatureList {
    pub signature_type: [u8; 16],
    pub signature_list_size: u32,
    pub signature_header_size: u32,
    pub signature_size: u32,
}

impl EfiSignatureList {
    /// Encoded size (28 bytes)
    pub const HEADER_SIZE: usize = core::mem::size_of::<Self>();
}

/// Prefix of every signature entry; the hash or certificate follows
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EfiSignatureData {
    pub signature_owner: [u8; 16],
}

impl EfiSignatureData {
    /// Encoded size (16 bytes)
    pub const HEADER_SIZE: usize = core::mem::size_of::<Self>();
}
