//! Trust Chain Validation
//!
//! Decides whether an authenticated update may replace a secure boot
//! variable. An update moves through four states:
//!
//! 1. **ParsingEnvelope**: decode the `EFI_VARIABLE_AUTHENTICATION_2` file
//! 2. **ResolvingAuthority**: load the certificates of the authorizing
//!    variable (PK for PK and KEK, KEK for db, dbx and TS)
//! 3. **VerifyingSignature**: check the PKCS#7 signature over the canonical
//!    hash against each authority certificate
//! 4. **CheckingTimestamp**: require a legal timestamp strictly after the
//!    one recorded for the variable
//!
//! and ends as a [`Verdict`].

use super::crypto::{CryptoProvider, HashAlgorithm};
use super::descriptor::parse_authentication_descriptor;
use super::signature_list::x509_certificates;
use super::structures::{EfiTime, EfiVariableAuthentication2};
use super::time::{TimestampVariable, validate_time};
use super::variables::{SecureBootVariable, build_signed_data};
use crate::efi::varstore::{Overlay, VariableStore};
use crate::error::{Error, ErrorKind, Result};

/// Step of the validator an update was in when it was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    ParsingEnvelope,
    ResolvingAuthority,
    VerifyingSignature,
    CheckingTimestamp,
}

impl core::fmt::Display for ValidationState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ValidationState::ParsingEnvelope => "parsing envelope",
            ValidationState::ResolvingAuthority => "resolving authority",
            ValidationState::VerifyingSignature => "verifying signature",
            ValidationState::CheckingTimestamp => "checking timestamp",
        })
    }
}

/// An update that passed every check
#[derive(Debug, Clone)]
pub struct AcceptedUpdate {
    pub variable: SecureBootVariable,
    pub timestamp: EfiTime,
    /// New variable value (the appended signature lists)
    pub payload: Vec<u8>,
}

impl AcceptedUpdate {
    /// Apply the update to a pending overlay, including its TS entry
    pub fn stage<S: VariableStore + ?Sized>(&self, overlay: &mut Overlay<'_, S>) -> Result<()> {
        if overlay.kind().has_timestamps() && self.variable != SecureBootVariable::TS {
            let current = overlay.read_optional(SecureBootVariable::TS.name())?;
            let mut ts = match current {
                Some(var) => TimestampVariable::parse(&var.data)?,
                None => TimestampVariable::zero(),
            };
            ts.set(self.variable, self.timestamp);
            overlay.stage(SecureBootVariable::TS, ts.to_bytes());
        }
        overlay.stage(self.variable, self.payload.clone());
        Ok(())
    }
}

/// Outcome of [`verify_update`]
#[derive(Debug)]
pub enum Verdict {
    Accepted(AcceptedUpdate),
    Rejected {
        state: ValidationState,
        error: Error,
    },
}

impl Verdict {
    fn rejected(state: ValidationState, error: Error) -> Self {
        log::warn!("Update rejected while {}: {}", state, error);
        Verdict::Rejected { state, error }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    /// Kind of the rejection, if rejected
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Rejected { error, .. } => Some(error.kind()),
        }
    }

    pub fn into_result(self) -> Result<AcceptedUpdate> {
        match self {
            Verdict::Accepted(update) => Ok(update),
            Verdict::Rejected { error, .. } => Err(error),
        }
    }
}

/// Run an authenticated update for `variable` through the trust chain
///
/// `provisioning` allows an update to go through when the authority
/// variable is absent or empty; otherwise an empty authority rejects.
pub fn verify_update<P, S>(
    provider: &P,
    store: &S,
    variable: SecureBootVariable,
    data: &[u8],
    provisioning: bool,
) -> Verdict
where
    P: CryptoProvider,
    S: VariableStore + ?Sized,
{
    use ValidationState::*;

    let desc = match parse_authentication_descriptor(provider, data) {
        Ok(desc) => desc,
        Err(e) if e.kind() == ErrorKind::MalformedInput => return Verdict::rejected(ParsingEnvelope, e),
        Err(e) => {
            log::debug!("PKCS#7 in update is unusable: {}", e);
            return Verdict::rejected(
                ParsingEnvelope,
                Error::malformed(EfiVariableAuthentication2::HEADER_SIZE, "PKCS#7"),
            );
        }
    };
    let timestamp = *desc.timestamp();

    // ResolvingAuthority
    let authority = variable.authority();
    let authority_data = match store.read_optional(authority.name()) {
        Ok(var) => var.map(|v| v.data).unwrap_or_default(),
        Err(e) => return Verdict::rejected(ResolvingAuthority, e),
    };
    let certificates = match x509_certificates(&authority_data) {
        Ok(certs) => certs,
        Err(e) => return Verdict::rejected(ResolvingAuthority, e),
    };

    let signed_data = build_signed_data(variable, &timestamp, desc.appended_payload());
    let expected_hash = match provider.hash(HashAlgorithm::Sha256, &signed_data) {
        Ok(hash) => hash,
        Err(e) => return Verdict::rejected(ResolvingAuthority, e),
    };

    // VerifyingSignature
    if authority_data.is_empty() {
        if provisioning {
            log::info!(
                "{} is empty, accepting {} update for provisioning",
                authority,
                variable
            );
        } else {
            return Verdict::rejected(
                VerifyingSignature,
                Error::SignatureMismatch(format!("{} ({} is empty)", variable, authority)),
            );
        }
    } else {
        match provider.pkcs7_digest_algorithm(desc.pkcs7()) {
            Some(HashAlgorithm::Sha256) => {}
            other => {
                return Verdict::rejected(
                    VerifyingSignature,
                    Error::SignatureMismatch(format!("PKCS#7 digest algorithm {:?} is not SHA-256", other)),
                );
            }
        }

        if certificates.is_empty() {
            log::warn!("{} holds no certificates", authority);
        }
        if !verify_against_authority(provider, desc.pkcs7(), &certificates, &expected_hash) {
            return Verdict::rejected(
                VerifyingSignature,
                Error::SignatureMismatch(variable.name().to_string()),
            );
        }
    }

    // CheckingTimestamp
    if let Err(e) = validate_time(&timestamp) {
        return Verdict::rejected(CheckingTimestamp, e);
    }
    let stored = match stored_timestamp(store, variable) {
        Ok(time) => time,
        Err(e) => return Verdict::rejected(CheckingTimestamp, e),
    };
    if !timestamp.is_after(&stored) {
        return Verdict::rejected(
            CheckingTimestamp,
            Error::BadTimestamp(format!(
                "{} is not after last update of {} at {}",
                timestamp, variable, stored
            )),
        );
    }

    log::info!("Update to {} signed at {} accepted", variable, timestamp);
    Verdict::Accepted(AcceptedUpdate {
        variable,
        timestamp,
        payload: desc.appended_payload().to_vec(),
    })
}

/// Try each authority certificate in turn; any one verifying is enough
fn verify_against_authority<P: CryptoProvider>(
    provider: &P,
    pkcs7: &P::Pkcs7,
    certificates: &[&[u8]],
    expected_hash: &[u8],
) -> bool {
    for (i, der) in certificates.iter().enumerate() {
        let x509 = match provider.parse_x509(der) {
            Ok(x509) => x509,
            Err(e) => {
                log::warn!("Skipping authority certificate {}: {}", i, e);
                continue;
            }
        };

        if provider.verify_signed_hash(pkcs7, &x509, expected_hash) {
            log::debug!(
                "Signature verified by {} ({})",
                provider.x509_summary(&x509),
                provider.name()
            );
            return true;
        }
    }
    false
}

/// Last recorded update time of `variable`
///
/// Only the PowerNV layout records one, in TS. TS itself has none.
pub fn stored_timestamp<S: VariableStore + ?Sized>(
    store: &S,
    variable: SecureBootVariable,
) -> Result<EfiTime> {
    if !store.kind().has_timestamps() || variable == SecureBootVariable::TS {
        return Ok(EfiTime::zero());
    }

    let ts = match store.read_optional(SecureBootVariable::TS.name())? {
        Some(var) => TimestampVariable::parse(&var.data)?,
        None => TimestampVariable::zero(),
    };
    Ok(ts.get(variable).copied().unwrap_or_else(EfiTime::zero))
}
