//! PowerNV secvar layout
//!
//! Each variable is a directory `<root>/<var>/` holding:
//!
//! - `size`: the value length as decimal ASCII
//! - `data`: the value, possibly padded past `size`
//! - `update`: write-only queue for authenticated updates

use super::{BackendKind, SecureVariable, VariableStore};
use crate::efi::auth::SecureBootVariable;
use crate::error::{Error, Result, try_alloc};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Most bytes of the `size` file that are looked at
const SIZE_FILE_MAX: usize = 8;

/// Store over the PowerNV secvar sysfs tree
#[derive(Debug, Clone)]
pub struct PowerNvStore {
    root: PathBuf,
}

impl PowerNvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn var_dir(&self, name: &str) -> Result<(SecureBootVariable, PathBuf)> {
        let var = SecureBootVariable::from_name(name)?;
        Ok((var, self.root.join(var.name())))
    }

    /// Read the declared value length from `<var>/size`
    fn read_size(path: &Path) -> Result<usize> {
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;

        let mut buf = [0u8; SIZE_FILE_MAX];
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            return Err(Error::invalid_file(path, "size file is empty"));
        }

        parse_size(&buf[..n]).ok_or_else(|| Error::invalid_file(path, "size is not a number"))
    }
}

/// Parse leading decimal digits, skipping leading whitespace
///
/// A zero result only counts when the text starts with a literal `0`.
fn parse_size(raw: &[u8]) -> Option<usize> {
    let text = raw.trim_ascii_start();
    let digits = text.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let size: usize = core::str::from_utf8(&text[..digits]).ok()?.parse().ok()?;
    if size == 0 && raw.first() != Some(&b'0') {
        return None;
    }
    Some(size)
}

impl VariableStore for PowerNvStore {
    fn kind(&self) -> BackendKind {
        BackendKind::PowerNv
    }

    fn read(&self, name: &str) -> Result<SecureVariable> {
        let (var, dir) = self.var_dir(name)?;

        let size = Self::read_size(&dir.join("size"))?;
        if size == 0 {
            log::warn!("Secure variable {} has size of zero", name);
        }

        let path = dir.join("data");
        let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let available = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        if available < size as u64 {
            return Err(Error::invalid_file(
                &path,
                format!("holds {} bytes but size says {}", available, size),
            ));
        }

        log::debug!("Reading {} bytes from {}", size, path.display());

        let mut data = try_alloc(size)?;
        file.read_exact(&mut data)
            .map_err(|_| Error::invalid_file(&path, "did not read all data in one go"))?;

        Ok(SecureVariable {
            name: name.to_string(),
            guid: var.vendor_guid(),
            data,
            attributes: None,
        })
    }

    fn write_update(&self, name: &str, data: &[u8]) -> Result<()> {
        let (_, dir) = self.var_dir(name)?;
        let path = dir.join("update");

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.write_all(data).map_err(|e| Error::io(&path, e))?;

        log::info!("Submitted {} byte update to {}", data.len(), path.display());
        Ok(())
    }
}
