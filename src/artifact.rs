//! Persisted artifacts.
//!
//! The corpus and the trained model are always rebuilt wholesale and swapped in with a rename,
//! so a reader either sees the previous complete file or the new complete file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Current on-disk schema version for both artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Version tag embedded at the top of every artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTag {
    pub schema_version: u32,
    pub feature_len: usize,
}

impl SchemaTag {
    pub fn current(feature_len: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            feature_len,
        }
    }

    /// Checks that an artifact written with `self` can be read by code expecting `expected`.
    pub fn check(&self, artifact: &'static str, expected: SchemaTag) -> Result<()> {
        if *self != expected {
            return Err(Error::SchemaMismatch {
                artifact,
                found_version: self.schema_version,
                found_features: self.feature_len,
                expected_version: expected.schema_version,
                expected_features: expected.feature_len,
            });
        }
        Ok(())
    }
}

/// Writes `path` atomically: the content goes to a temporary file in the same directory, which
/// is then renamed over the destination.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
