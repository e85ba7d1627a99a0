//! Input listing and splits

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{JobConf, CONF_INPUT_DIR};
use crate::error::{Error, Result};

/// A byte range of an input file handed to one reader. Workbooks are never
/// split, so a split always covers a whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSplit {
    pub path: PathBuf,
    pub start: u64,
    pub length: u64,
}

impl FileSplit {
    pub fn new(path: impl Into<PathBuf>, start: u64, length: u64) -> Self {
        Self {
            path: path.into(),
            start,
            length,
        }
    }

    /// Split covering a whole file
    pub fn for_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let length = fs::metadata(&path)?.len();
        Ok(Self::new(path, 0, length))
    }

    /// Last path segment, as used in record keys
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Hidden files (`_SUCCESS`, `.crc` files) are not inputs
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('_') || n.starts_with('.'))
}

/// Input files named by the job: listed paths, with directories expanded
/// one level
pub fn list_input_files(conf: &JobConf) -> Result<Vec<PathBuf>> {
    let dirs = conf
        .get_non_empty(CONF_INPUT_DIR)
        .ok_or_else(|| Error::Configuration(format!("{CONF_INPUT_DIR} is not set")))?;

    let mut files = Vec::new();
    for input in dirs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(input);
        let metadata = fs::metadata(&path).map_err(|e| {
            Error::Configuration(format!("input path {} does not exist: {e}", path.display()))
        })?;
        if !metadata.is_dir() {
            files.push(path);
            continue;
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(&path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && !is_hidden(p))
            .collect();
        entries.sort();
        files.extend(entries);
    }
    log::debug!("{} input files", files.len());
    Ok(files)
}

/// One split per input file
pub fn get_splits(conf: &JobConf, num_splits_hint: usize) -> Result<Vec<FileSplit>> {
    let files = list_input_files(conf)?;
    log::debug!(
        "creating {} splits (hint {num_splits_hint}); workbooks are not splittable",
        files.len()
    );
    files.into_iter().map(FileSplit::for_file).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_files() {
        assert!(is_hidden(Path::new("/out/_SUCCESS")));
        assert!(is_hidden(Path::new("/out/.part.crc")));
        assert!(!is_hidden(Path::new("/out/part.xlsx")));
    }

    #[test]
    fn test_splits_expand_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.xlsx"), b"12345").unwrap();
        fs::write(dir.path().join("a.xls"), b"1").unwrap();
        fs::write(dir.path().join("_SUCCESS"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut conf = JobConf::new();
        conf.set(CONF_INPUT_DIR, dir.path().to_string_lossy());
        let splits = get_splits(&conf, 4).unwrap();
        assert_eq!(
            splits,
            vec![
                FileSplit::new(dir.path().join("a.xls"), 0, 1),
                FileSplit::new(dir.path().join("b.xlsx"), 0, 5),
            ]
        );
        assert_eq!(splits[1].file_name(), "b.xlsx");
    }

    #[test]
    fn test_missing_input_dir() {
        assert!(matches!(
            get_splits(&JobConf::new(), 1),
            Err(Error::Configuration(_))
        ));
    }
}
