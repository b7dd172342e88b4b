//! Secure Variable Store
//!
//! Reads and writes raw secure variable bytes through one of two sysfs
//! layouts:
//!
//! - **PowerNV** (`/sys/firmware/secvar/vars/<var>/{data,size,update}`)
//! - **efivarfs** (`/sys/firmware/efi/efivars/<var>-<guid>`, read only)
//!
//! The active layout is picked once at startup and passed to the engine as
//! a [`Backend`] value.

mod efivarfs;
mod powernv;

pub use efivarfs::EfiVarFsStore;
pub use powernv::PowerNvStore;

use crate::efi::auth::SecureBootVariable;
use crate::error::{Error, Result};
use r_efi::efi::Guid;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Firmware file naming the PowerNV secure variable format
pub const SECVAR_FORMAT_PATH: &str = "/sys/firmware/secvar/format";

/// Format string of the only PowerNV backend understood
pub const EDK2_COMPAT_FORMAT: &str = "ibm,edk2-compat-v1";

/// A variable as read from a store
///
/// `data` excludes any attribute header, so `size()` is always `data.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureVariable {
    pub name: String,
    pub guid: Guid,
    pub data: Vec<u8>,
    /// Attribute flags (efivarfs layout only)
    pub attributes: Option<u32>,
}

impl SecureVariable {
    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Secure variable store trait
///
/// Implementations own no state across calls; every read returns freshly
/// allocated bytes.
pub trait VariableStore {
    /// Which layout this store uses
    fn kind(&self) -> BackendKind;

    /// Read a variable by name
    ///
    /// # Errors
    /// - `InvalidVariableName` if the layout has no such variable
    /// - `InvalidFile` if a file is missing, short, or has a bad size
    /// - `AllocFail` if the payload buffer cannot be reserved
    fn read(&self, name: &str) -> Result<SecureVariable>;

    /// Submit an authenticated update file for a variable
    fn write_update(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read a variable, treating a missing file as absent
    fn read_optional(&self, name: &str) -> Result<Option<SecureVariable>> {
        match self.read(name) {
            Ok(var) => Ok(Some(var)),
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Variables this layout exposes
    fn variables(&self) -> &'static [SecureBootVariable] {
        self.kind().variables()
    }
}

// ============================================================================
// Backend Selection
// ============================================================================

/// The two supported sysfs layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    PowerNv,
    EfiVarFs,
}

impl BackendKind {
    /// Default sysfs root of this layout
    pub fn default_root(self) -> &'static Path {
        match self {
            BackendKind::PowerNv => Path::new("/sys/firmware/secvar/vars/"),
            BackendKind::EfiVarFs => Path::new("/sys/firmware/efi/efivars/"),
        }
    }

    /// Variables this layout exposes
    pub fn variables(self) -> &'static [SecureBootVariable] {
        match self {
            BackendKind::PowerNv => &SecureBootVariable::ALL,
            BackendKind::EfiVarFs => &SecureBootVariable::ALL[..4],
        }
    }

    /// Whether the layout keeps a TS variable
    pub fn has_timestamps(self) -> bool {
        matches!(self, BackendKind::PowerNv)
    }
}

/// Identify the platform layout from the secvar format file
///
/// Returns `BackendIdFail` if the file is missing or names an unknown format.
pub fn identify_backend(format_path: &Path) -> Result<BackendKind> {
    let contents = std::fs::read(format_path).map_err(|e| {
        Error::BackendIdFail(format!("cannot read {}: {}", format_path.display(), e))
    })?;

    if contents.starts_with(EDK2_COMPAT_FORMAT.as_bytes()) {
        log::info!("Found backend {}", EDK2_COMPAT_FORMAT);
        Ok(BackendKind::PowerNv)
    } else {
        Err(Error::BackendIdFail(format!(
            "{} does not contain a known backend format",
            format_path.display()
        )))
    }
}

/// Pick the layout to use, falling back to PowerNV with a warning
pub fn detect_backend(force_efivars: bool, format_path: &Path) -> BackendKind {
    if force_efivars {
        return BackendKind::EfiVarFs;
    }
    match identify_backend(format_path) {
        Ok(kind) => kind,
        Err(e) => {
            log::warn!(
                "{}; assuming {} backend, read/write may not work as expected",
                e,
                EDK2_COMPAT_FORMAT
            );
            BackendKind::PowerNv
        }
    }
}

/// A store for one of the supported layouts
#[derive(Debug, Clone)]
pub enum Backend {
    PowerNv(PowerNvStore),
    EfiVarFs(EfiVarFsStore),
}

impl Backend {
    /// Open a store of `kind`, rooted at `root` or the layout default
    pub fn open(kind: BackendKind, root: Option<PathBuf>) -> Self {
        let root = root.unwrap_or_else(|| kind.default_root().to_path_buf());
        match kind {
            BackendKind::PowerNv => Backend::PowerNv(PowerNvStore::new(root)),
            BackendKind::EfiVarFs => Backend::EfiVarFs(EfiVarFsStore::new(root)),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        match self {
            Backend::PowerNv(store) => store.root(),
            Backend::EfiVarFs(store) => store.root(),
        }
    }
}

impl VariableStore for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::PowerNv(_) => BackendKind::PowerNv,
            Backend::EfiVarFs(_) => BackendKind::EfiVarFs,
        }
    }

    fn read(&self, name: &str) -> Result<SecureVariable> {
        match self {
            Backend::PowerNv(store) => store.read(name),
            Backend::EfiVarFs(store) => store.read(name),
        }
    }

    fn write_update(&self, name: &str, data: &[u8]) -> Result<()> {
        match self {
            Backend::PowerNv(store) => store.write_update(name, data),
            Backend::EfiVarFs(store) => store.write_update(name, data),
        }
    }
}

// ============================================================================
// Pending Updates
// ============================================================================

/// A store view with accepted-but-uncommitted values layered on top
///
/// Lets a sequence of updates be checked as if each earlier one had already
/// been applied.
pub struct Overlay<'s, S: VariableStore + ?Sized> {
    base: &'s S,
    pending: HashMap<SecureBootVariable, Vec<u8>>,
}

impl<'s, S: VariableStore + ?Sized> Overlay<'s, S> {
    pub fn new(base: &'s S) -> Self {
        Self {
            base,
            pending: HashMap::new(),
        }
    }

    /// Stage a new value for `var`
    pub fn stage(&mut self, var: SecureBootVariable, data: Vec<u8>) {
        self.pending.insert(var, data);
    }

    /// Staged value for `var`, if any
    pub fn staged(&self, var: SecureBootVariable) -> Option<&[u8]> {
        self.pending.get(&var).map(Vec::as_slice)
    }
}

impl<S: VariableStore + ?Sized> VariableStore for Overlay<'_, S> {
    fn kind(&self) -> BackendKind {
        self.base.kind()
    }

    fn read(&self, name: &str) -> Result<SecureVariable> {
        let var = SecureBootVariable::from_name(name)?;
        match self.pending.get(&var) {
            Some(data) => Ok(SecureVariable {
                name: name.to_string(),
                guid: var.vendor_guid(),
                data: data.clone(),
                attributes: None,
            }),
            None => self.base.read(name),
        }
    }

    fn write_update(&self, name: &str, data: &[u8]) -> Result<()> {
        self.base.write_update(name, data)
    }
}

// ============================================================================
// Memory Store (testing)
// ============================================================================

/// In-memory store for tests
#[cfg(test)]
pub struct MemoryStore {
    kind: BackendKind,
    vars: HashMap<SecureBootVariable, Vec<u8>>,
    updates: std::cell::RefCell<Vec<(String, Vec<u8>)>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            vars: HashMap::new(),
            updates: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn with(mut self, var: SecureBootVariable, data: &[u8]) -> Self {
        self.vars.insert(var, data.to_vec());
        self
    }

    /// Updates submitted through `write_update`
    pub fn updates(&self) -> Vec<(String, Vec<u8>)> {
        self.updates.borrow().clone()
    }
}

#[cfg(test)]
impl VariableStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn read(&self, name: &str) -> Result<SecureVariable> {
        let var = SecureBootVariable::from_name(name)?;
        let data = self.vars.get(&var).ok_or_else(|| {
            Error::io(name, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        Ok(SecureVariable {
            name: name.to_string(),
            guid: var.vendor_guid(),
            data: data.clone(),
            attributes: None,
        })
    }

    fn write_update(&self, name: &str, data: &[u8]) -> Result<()> {
        self.updates
            .borrow_mut()
            .push((name.to_string(), data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_identify_backend() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ibm,edk2-compat-v1\n").unwrap();
        assert_eq!(identify_backend(file.path()).unwrap(), BackendKind::PowerNv);

        let mut other = tempfile::NamedTempFile::new().unwrap();
        other.write_all(b"ibm,plpks\n").unwrap();
        assert_eq!(
            identify_backend(other.path()).unwrap_err().kind(),
            ErrorKind::BackendIdFail
        );
    }

    #[test]
    fn test_detect_backend_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("format");
        assert_eq!(detect_backend(false, &missing), BackendKind::PowerNv);
        assert_eq!(detect_backend(true, &missing), BackendKind::EfiVarFs);
    }

    #[test]
    fn test_layout_variables() {
        assert!(BackendKind::PowerNv.variables().contains(&SecureBootVariable::TS));
        assert!(!BackendKind::EfiVarFs.variables().contains(&SecureBootVariable::TS));
    }

    #[test]
    fn test_read_optional_missing() {
        let store = MemoryStore::new(BackendKind::PowerNv);
        assert!(store.read_optional("KEK").unwrap().is_none());
        assert_eq!(
            store.read_optional("foo").unwrap_err().kind(),
            ErrorKind::InvalidVariableName
        );
    }

    #[test]
    fn test_overlay_prefers_staged() {
        let store = MemoryStore::new(BackendKind::PowerNv).with(SecureBootVariable::Db, b"old");
        let mut overlay = Overlay::new(&store);
        assert_eq!(overlay.read("db").unwrap().data, b"old");

        overlay.stage(SecureBootVariable::Db, b"new".to_vec());
        assert_eq!(overlay.read("db").unwrap().data, b"new");
        assert!(overlay.read_optional("KEK").unwrap().is_none());
    }
}
