pub mod csv;
pub mod json;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Collection;

pub trait Exporter {
    fn export(&self, collection: &Collection, path: &Path) -> Result<()>;
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "export".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write fully-serialized bytes to a temporary sibling, flush, then rename
/// over the destination. The destination never holds a partial file: on any
/// failure the temp file is removed and the prior content (or absence) is
/// preserved.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);

    let written = (|| -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}
