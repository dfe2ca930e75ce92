//! Receiver files: discovery of pending files and parsing of their entries.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ReceiverError;

/// Suffix of files waiting to be paid out.
pub const PENDING_SUFFIX: &str = ".txt";

/// One `<address> <amount>` line, kept as raw text until the batch is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverEntry {
    pub destination: String,
    pub amount: String,
    pub line: usize,
}

/// Entries of one receiver file in first-seen order.
///
/// A destination listed more than once keeps its first position and the last amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverList {
    entries: Vec<ReceiverEntry>,
    positions: HashMap<String, usize>,
}

impl ReceiverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites an entry. Returns the replaced amount for duplicates.
    pub fn insert(&mut self, entry: ReceiverEntry) -> Option<String> {
        match self.positions.get(&entry.destination) {
            Some(&index) => {
                let previous = std::mem::replace(&mut self.entries[index], entry);
                Some(previous.amount)
            }
            None => {
                self.positions
                    .insert(entry.destination.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn entries(&self) -> &[ReceiverEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse_str(contents: &str) -> Self {
        let mut list = Self::new();
        for (index, line) in contents.lines().enumerate() {
            let line_no = index + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [] => debug!(line = line_no, "Skipping blank receiver line"),
                [destination, amount] => {
                    let entry = ReceiverEntry {
                        destination: destination.to_string(),
                        amount: amount.to_string(),
                        line: line_no,
                    };
                    if let Some(previous) = list.insert(entry) {
                        warn!(
                            line = line_no,
                            destination = %destination,
                            previous_amount = %previous,
                            amount = %amount,
                            "Duplicate destination, keeping the last amount"
                        );
                    }
                }
                other => warn!(
                    line = line_no,
                    tokens = other.len(),
                    "Skipping receiver line without exactly two fields"
                ),
            }
        }
        list
    }
}

/// Lists `*.txt` files directly inside `folder`, sorted by file name.
///
/// Only an unreadable folder is an error. Entries that cannot be inspected are skipped.
pub fn list_pending(folder: &Path) -> Result<Vec<PathBuf>, ReceiverError> {
    let entries = fs::read_dir(folder).map_err(|source| ReceiverError::Io {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for dir_entry in entries {
        let dir_entry = match dir_entry {
            Ok(dir_entry) => dir_entry,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "Skipping unreadable folder entry");
                continue;
            }
        };
        let path = dir_entry.path();
        match dir_entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping folder entry of unknown type");
                continue;
            }
        }
        if is_pending(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub fn is_pending(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(PENDING_SUFFIX))
}

/// Reads a receiver file. Only an unreadable file is an error; bad lines are skipped.
pub fn parse(path: &Path) -> Result<ReceiverList, ReceiverError> {
    let contents = read(path)?;
    Ok(ReceiverList::parse_str(&contents))
}

pub fn read(path: &Path) -> Result<String, ReceiverError> {
    fs::read_to_string(path).map_err(|source| ReceiverError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_keeps_file_order() {
        let list = ReceiverList::parse_str("addr-b 1\naddr-a 2.5\naddr-c 0.1\n");
        let destinations: Vec<_> = list.entries().iter().map(|e| e.destination.as_str()).collect();
        assert_eq!(destinations, ["addr-b", "addr-a", "addr-c"]);
        assert_eq!(list.entries()[1].amount, "2.5");
        assert_eq!(list.entries()[1].line, 2);
    }

    #[test]
    fn test_duplicate_destination_last_amount_wins() {
        let list = ReceiverList::parse_str("addr-a 1\naddr-b 2\naddr-a 3\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries()[0].destination, "addr-a");
        assert_eq!(list.entries()[0].amount, "3");
        assert_eq!(list.entries()[0].line, 3);
        assert_eq!(list.entries()[1].destination, "addr-b");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let list = ReceiverList::parse_str(
            "addr-a 1\naddr-b 2 extra\nlonely\n\n   \n\taddr-c\t\t4  \n",
        );
        let destinations: Vec<_> = list.entries().iter().map(|e| e.destination.as_str()).collect();
        assert_eq!(destinations, ["addr-a", "addr-c"]);
        assert_eq!(list.entries()[1].amount, "4");
    }

    #[test]
    fn test_empty_file_gives_empty_list() {
        assert!(ReceiverList::parse_str("").is_empty());
        assert!(ReceiverList::parse_str("only three tokens\n").is_empty());
    }

    #[test]
    fn test_list_pending_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt_AQEBAQEB.log"), "").unwrap();
        fs::write(dir.path().join("c.failed"), "").unwrap();
        fs::create_dir(dir.path().join("nested.txt")).unwrap();
        fs::write(dir.path().join("nested.txt").join("inner.txt"), "").unwrap();

        let files = list_pending(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_list_pending_skips_odd_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling.txt"))
            .unwrap();

        let files = list_pending(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn test_list_pending_missing_folder() {
        let dir = TempDir::new().unwrap();
        assert!(list_pending(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_parse_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.txt");
        fs::write(&path, "addr-a 1\naddr-b 2\n").unwrap();

        let first = parse(&path).unwrap();
        let second = parse(&path).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);

        assert!(parse(&dir.path().join("missing.txt")).is_err());
    }
}
