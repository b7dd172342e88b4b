//! secvarctl - Secure boot variable authentication and validation
//!
//! This library parses the UEFI structures that carry secure boot variables
//! (PK, KEK, db, dbx and the PowerNV-only TS), validates their format, and
//! decides whether an authenticated update is authorized by the current key
//! hierarchy. Variables are read from either the PowerNV secvar sysfs tree or
//! an efivarfs mount.
//!
//! # Example
//!
//! ```no_run
//! use secvarctl::efi::auth::{SecureBootVariable, crypto::RustCrypto, verify_update};
//! use secvarctl::efi::varstore::{Backend, BackendKind};
//!
//! let store = Backend::open(BackendKind::PowerNv, None);
//! let update = std::fs::read("db.auth").unwrap();
//! let verdict = verify_update(&RustCrypto, &store, SecureBootVariable::Db, &update, false);
//! println!("accepted: {}", verdict.is_accepted());
//! ```

pub mod efi;
pub mod error;
pub mod logger;

pub use error::{Error, ErrorKind, Result};
