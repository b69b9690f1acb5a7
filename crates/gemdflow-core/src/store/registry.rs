//! Append-only CSV registry shared by the template and spec stores.
//!
//! One row per interned entity: `persistent_id,name,type`. The row index is
//! the persistent id; rows are never rewritten.

use crate::primitives::REGISTRY_HEADER;
use crate::types::{EntityType, GemdError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRow {
    pub persistent_id: usize,
    pub name: String,
    pub entity_type: EntityType,
}

/// The on-disk registry file plus its rows.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    rows: Vec<RegistryRow>,
    /// Physical data lines, including unparseable ones.
    line_count: usize,
}

impl Registry {
    /// Write the header if the file does not exist. Existing files are left
    /// untouched.
    pub fn initialize(path: &Path) -> Result<(), GemdError> {
        if path.exists() {
            return Ok(());
        }
        std::fs::write(path, format!("{}\n", REGISTRY_HEADER))
            .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))
    }

    /// Open (creating if needed) and read every row.
    pub fn open(path: &Path) -> Result<Self, GemdError> {
        Self::initialize(path)?;
        let text = std::fs::read_to_string(path)
            .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut rows = Vec::new();
        let mut line_count = 0;
        for (number, line) in text.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            line_count += 1;
            match parse_row(line) {
                Some(row) => rows.push(row),
                None => warn!(
                    file = %path.display(),
                    line = number + 1,
                    "Skipping malformed registry row"
                ),
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            rows,
            line_count,
        })
    }

    /// The persistent id the next append will use.
    #[must_use]
    pub fn next_id(&self) -> usize {
        self.line_count
    }

    /// Append a row and return its persistent id.
    pub fn append(&mut self, name: &str, entity_type: EntityType) -> Result<usize, GemdError> {
        let persistent_id = self.next_id();
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| GemdError::IoError(format!("{}: {}", self.path.display(), e)))?;
        writeln!(
            file,
            "{},{},{}",
            persistent_id,
            quote(name),
            entity_type.as_str()
        )
        .map_err(|e| GemdError::IoError(format!("{}: {}", self.path.display(), e)))?;

        self.rows.push(RegistryRow {
            persistent_id,
            name: name.to_string(),
            entity_type,
        });
        self.line_count += 1;
        Ok(persistent_id)
    }

    #[must_use]
    pub fn rows(&self) -> &[RegistryRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.line_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line_count == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_row(line: &str) -> Option<RegistryRow> {
    let fields = split_fields(line);
    if fields.len() != 3 {
        return None;
    }
    Some(RegistryRow {
        persistent_id: fields[0].trim().parse().ok()?,
        name: fields[1].clone(),
        entity_type: fields[2].trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_writes_header_once() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("registry.csv");
        Registry::open(&path).expect("open");
        Registry::open(&path).expect("reopen");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text, format!("{}\n", REGISTRY_HEADER));
    }

    #[test]
    fn append_assigns_row_numbers() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("registry.csv");
        let mut registry = Registry::open(&path).expect("open");

        assert_eq!(
            registry.append("Alloy", EntityType::MaterialTemplate).expect("append"),
            0
        );
        assert_eq!(
            registry.append("Melt, fast", EntityType::ProcessTemplate).expect("append"),
            1
        );

        let reopened = Registry::open(&path).expect("reopen");
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.rows()[1].name, "Melt, fast");
        assert_eq!(reopened.next_id(), 2);

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("0,Alloy,material_template\n"));
    }

    #[test]
    fn malformed_rows_still_consume_an_id() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("registry.csv");
        std::fs::write(&path, format!("{}\n0,A,material_template\ngarbage\n", REGISTRY_HEADER))
            .expect("write");

        let registry = Registry::open(&path).expect("open");
        assert_eq!(registry.rows().len(), 1);
        assert_eq!(registry.next_id(), 2);
    }
}
