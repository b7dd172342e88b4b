//! efivarfs layout
//!
//! Each variable is one file named `<var>-<vendor guid>`. The first four
//! bytes of the file are the variable's attribute flags; the value follows.

use super::{BackendKind, SecureVariable, VariableStore};
use crate::efi::auth::{SecureBootVariable, format_guid};
use crate::error::{Error, Result, try_alloc};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Size of the attribute header in front of every efivarfs value
const ATTRIBUTES_SIZE: usize = 4;

/// Read-only store over an efivarfs mount
#[derive(Debug, Clone)]
pub struct EfiVarFsStore {
    root: PathBuf,
}

impl EfiVarFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for `name`; only PK, KEK, db and dbx exist here
    fn file_name(name: &str) -> Result<String> {
        let var = SecureBootVariable::from_name(name)?;
        if !BackendKind::EfiVarFs.variables().contains(&var) {
            return Err(Error::InvalidVariableName(name.to_string()));
        }
        Ok(format!("{}-{}", var.name(), format_guid(&var.vendor_guid())))
    }
}

impl VariableStore for EfiVarFsStore {
    fn kind(&self) -> BackendKind {
        BackendKind::EfiVarFs
    }

    fn read(&self, name: &str) -> Result<SecureVariable> {
        let var = SecureBootVariable::from_name(name)?;
        let path = self.root.join(Self::file_name(name)?);

        let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let metadata = file.metadata().map_err(|e| Error::io(&path, e))?;
        if !metadata.is_file() {
            return Err(Error::invalid_file(&path, "not a regular file"));
        }

        let file_size = metadata.len() as usize;
        if file_size < ATTRIBUTES_SIZE {
            return Err(Error::invalid_file(
                &path,
                format!("{} bytes is too small for the attribute header", file_size),
            ));
        }

        log::debug!("Reading {} bytes from {}", file_size, path.display());

        let mut attrs = [0u8; ATTRIBUTES_SIZE];
        file.read_exact(&mut attrs)
            .map_err(|_| Error::invalid_file(&path, "short read of attributes"))?;

        let size = file_size - ATTRIBUTES_SIZE;
        if size == 0 {
            log::warn!("Secure variable {} has size of zero", name);
        }

        let mut data = try_alloc(size)?;
        file.read_exact(&mut data)
            .map_err(|_| Error::invalid_file(&path, "did not read all data in one go"))?;

        Ok(SecureVariable {
            name: name.to_string(),
            guid: var.vendor_guid(),
            data,
            attributes: Some(u32::from_le_bytes(attrs)),
        })
    }

    fn write_update(&self, name: &str, _data: &[u8]) -> Result<()> {
        Err(Error::UnknownCommand(format!(
            "writing {} is not supported on efivarfs",
            name
        )))
    }
}
