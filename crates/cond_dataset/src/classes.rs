//! Class-folder discovery.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::{DatasetError, DatasetResult};

/// Dense class ids assigned in lexicographic folder-name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    classes: Vec<String>,
    class_to_idx: HashMap<String, usize>,
}

impl ClassMap {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = names.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        let class_to_idx = classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self {
            classes,
            class_to_idx,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class names, sorted; position is the class id.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.class_to_idx.get(name).copied()
    }

    pub fn name_of(&self, idx: usize) -> Option<&str> {
        self.classes.get(idx).map(String::as_str)
    }
}

/// List the immediate subdirectories of `dir` as classes.
///
/// Fails with [`DatasetError::NoClassFolders`] when there are none.
pub fn find_classes(dir: &Path) -> DatasetResult<ClassMap> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let names = class_names(
        dir,
        entries.map(|entry| entry.map(|e| (e.path(), e.file_name()))),
    );
    if names.is_empty() {
        return Err(DatasetError::NoClassFolders {
            path: dir.to_path_buf(),
        });
    }
    let map = ClassMap::from_names(names);
    debug!("found {} class folders in {}", map.len(), dir.display());
    Ok(map)
}

/// Names of the directory entries that are folders. Entries that cannot be
/// read are skipped with a warning.
fn class_names<I>(dir: &Path, entries: I) -> Vec<String>
where
    I: IntoIterator<Item = io::Result<(PathBuf, OsString)>>,
{
    let mut names = Vec::new();
    for entry in entries {
        let (path, file_name) = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        if !path.is_dir() {
            continue;
        }
        match file_name.into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!("skipping non-UTF-8 class folder {:?}", raw),
        }
    }
    names
}
