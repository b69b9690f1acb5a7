//! # Stores
//!
//! On-disk interning of templates and specs:
//! - `registry`: the append-only CSV shared by both stores
//! - `template_store`: name-keyed template interning
//! - `spec_store`: content-addressed spec interning
//! - `config`: the set of stores elements intern through

pub mod config;
pub mod registry;
pub mod spec_store;
pub mod template_store;

pub use config::StoresConfig;
pub use registry::{Registry, RegistryRow};
pub use spec_store::{SpecRecord, SpecStore};
pub use template_store::{Provenance, TemplateRecord, TemplateStore, detach_template};

use crate::types::GemdError;
use std::path::{Path, PathBuf};

/// `<name>_pid_<persistent_id>.json`, with path separators in `name`
/// replaced by underscores.
#[must_use]
pub fn file_name_for(name: &str, persistent_id: usize) -> String {
    format!("{}_pid_{}.json", sanitize(name), persistent_id)
}

/// Make `name` safe as a single path component.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect()
}

/// JSON files directly inside `dir`, sorted by file name. A missing
/// directory yields nothing.
pub(crate) fn json_files_in(dir: &Path) -> Result<Vec<PathBuf>, GemdError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| GemdError::IoError(format!("{}: {}", dir.display(), e)))?
    {
        let path = entry
            .map_err(|e| GemdError::IoError(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
