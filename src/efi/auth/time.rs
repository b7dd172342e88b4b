//! Timestamp rules for authenticated updates
//!
//! Provides calendar validation of EFI_TIME values and the PowerNV `TS`
//! variable, which records the last update time of PK, KEK, db and dbx.

use super::structures::EfiTime;
use super::variables::SecureBootVariable;
use crate::error::{Error, Result};
use zerocopy::IntoBytes;

/// Earliest year `der::DateTime` accepts
const DER_MIN_YEAR: u16 = 1970;

/// Years in one Gregorian leap cycle
const GREGORIAN_CYCLE: u16 = 400;

/// Check that every calendar field of `time` lies in its legal range
pub fn validate_time(time: &EfiTime) -> Result<()> {
    let year = time.year;
    let nanosecond = time.nanosecond;

    let bad = |what: &str| {
        Err(Error::BadTimestamp(format!(
            "{} out of range in {}",
            what, time
        )))
    };

    if !(1900..=9999).contains(&year) {
        return bad("year");
    }
    if !(1..=12).contains(&time.month) {
        return bad("month");
    }
    if time.hour > 23 {
        return bad("hour");
    }
    if time.minute > 59 {
        return bad("minute");
    }
    if time.second > 59 {
        return bad("second");
    }
    if nanosecond > 999_999_999 {
        return bad("nanosecond");
    }

    // Pre-1970 years are checked on the same point of a later leap cycle
    let calendar_year = if year < DER_MIN_YEAR { year + GREGORIAN_CYCLE } else { year };
    if der::DateTime::new(calendar_year, time.month, time.day, time.hour, time.minute, time.second).is_err() {
        return bad("day");
    }
    Ok(())
}

/// Whether every byte of the timestamp is zero (never updated)
pub fn is_zero(time: &EfiTime) -> bool {
    time.as_bytes().iter().all(|&b| b == 0)
}

// ============================================================================
// TS Variable
// ============================================================================

/// Variables tracked by TS, in storage order
pub const TS_ORDER: [SecureBootVariable; 4] = [
    SecureBootVariable::PK,
    SecureBootVariable::KEK,
    SecureBootVariable::Db,
    SecureBootVariable::Dbx,
];

/// Decoded TS variable
#[derive(Debug, Clone, Copy)]
pub struct TimestampVariable {
    entries: [EfiTime; 4],
}

impl TimestampVariable {
    /// Encoded size: four EFI_TIME values
    pub const SIZE: usize = EfiTime::SIZE * 4;

    /// All-zero TS, as on a freshly provisioned system
    pub const fn zero() -> Self {
        Self {
            entries: [EfiTime::zero(); 4],
        }
    }

    /// Decode a TS blob
    ///
    /// An empty blob means nothing has been updated yet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::zero());
        }
        if data.len() != Self::SIZE {
            return Err(Error::BadTimestamp(format!(
                "TS is {} bytes, expected {}",
                data.len(),
                Self::SIZE
            )));
        }

        let mut entries = [EfiTime::zero(); 4];
        for (entry, chunk) in entries.iter_mut().zip(data.chunks_exact(EfiTime::SIZE)) {
            *entry = EfiTime::read_from(chunk)
                .ok_or_else(|| Error::malformed(0, "TS entry"))?;
        }
        Ok(Self { entries })
    }

    /// Decode a TS blob and check that each recorded time is legal
    pub fn parse_and_validate(data: &[u8]) -> Result<Self> {
        let ts = Self::parse(data)?;
        for (var, time) in TS_ORDER.iter().zip(ts.entries.iter()) {
            if is_zero(time) {
                continue;
            }
            validate_time(time).map_err(|e| {
                log::error!("Invalid timestamp for {}: {}", var.name(), e);
                e
            })?;
        }
        Ok(ts)
    }

    /// Last update time of `var`, or `None` if TS does not track it
    pub fn get(&self, var: SecureBootVariable) -> Option<&EfiTime> {
        TS_ORDER
            .iter()
            .position(|&v| v == var)
            .map(|i| &self.entries[i])
    }

    /// Record a new update time for `var`
    pub fn set(&mut self, var: SecureBootVariable, time: EfiTime) {
        if let Some(i) = TS_ORDER.iter().position(|&v| v == var) {
            self.entries[i] = time;
        }
    }

    /// Entries paired with the variable they belong to
    pub fn iter(&self) -> impl Iterator<Item = (SecureBootVariable, &EfiTime)> {
        TS_ORDER.iter().copied().zip(self.entries.iter())
    }

    /// Encode back to the TS layout
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|time| time.as_bytes().iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use core::cmp::Ordering;

    #[test]
    fn test_leap_days() {
        validate_time(&EfiTime::new(2024, 2, 29, 0, 0, 0)).unwrap();
        validate_time(&EfiTime::new(2000, 2, 29, 0, 0, 0)).unwrap();
        validate_time(&EfiTime::new(1904, 2, 29, 0, 0, 0)).unwrap();
        for year in [1900, 1969, 2023, 2100] {
            assert!(validate_time(&EfiTime::new(year, 2, 29, 0, 0, 0)).is_err(), "{}", year);
        }
        validate_time(&EfiTime::new(2023, 2, 28, 0, 0, 0)).unwrap();
        validate_time(&EfiTime::new(9999, 12, 31, 23, 59, 59)).unwrap();
    }

    #[test]
    fn test_validate_time_accepts_legal() {
        validate_time(&EfiTime::new(2024, 2, 29, 23, 59, 59)).unwrap();
        validate_time(&EfiTime::new(1900, 1, 1, 0, 0, 0)).unwrap();
    }

    #[test]
    fn test_validate_time_rejects_each_field() {
        let bad = [
            EfiTime::new(1899, 1, 1, 0, 0, 0),
            EfiTime::new(2024, 0, 1, 0, 0, 0),
            EfiTime::new(2024, 13, 1, 0, 0, 0),
            EfiTime::new(2023, 2, 29, 0, 0, 0),
            EfiTime::new(2024, 4, 31, 0, 0, 0),
            EfiTime::new(2024, 1, 0, 0, 0, 0),
            EfiTime::new(2024, 1, 1, 24, 0, 0),
            EfiTime::new(2024, 1, 1, 0, 60, 0),
            EfiTime::new(2024, 1, 1, 0, 0, 60),
        ];
        for time in bad {
            assert_eq!(
                validate_time(&time).unwrap_err().kind(),
                ErrorKind::BadTimestamp,
                "{}",
                time
            );
        }

        let mut time = EfiTime::new(2024, 1, 1, 0, 0, 0);
        time.nanosecond = 1_000_000_000;
        assert!(validate_time(&time).is_err());
    }

    #[test]
    fn test_ts_parse_and_update() {
        let mut ts = TimestampVariable::zero();
        ts.set(SecureBootVariable::Db, EfiTime::new(2024, 5, 6, 7, 8, 9));

        let parsed = TimestampVariable::parse_and_validate(&ts.to_bytes()).unwrap();
        assert_eq!(
            parsed
                .get(SecureBootVariable::Db)
                .unwrap()
                .compare(&EfiTime::new(2024, 5, 6, 7, 8, 9)),
            Ordering::Equal
        );
        assert!(is_zero(parsed.get(SecureBootVariable::PK).unwrap()));
        assert!(parsed.get(SecureBootVariable::TS).is_none());
    }

    #[test]
    fn test_ts_wrong_size() {
        let err = TimestampVariable::parse(&[0u8; 63]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadTimestamp);
        assert!(TimestampVariable::parse(&[]).is_ok());
    }

    #[test]
    fn test_ts_invalid_entry() {
        let mut ts = TimestampVariable::zero();
        ts.set(SecureBootVariable::KEK, EfiTime::new(2024, 2, 30, 0, 0, 0));
        let err = TimestampVariable::parse_and_validate(&ts.to_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadTimestamp);
    }
}
