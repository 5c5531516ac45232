//! File access around the store. The store itself only deals in text.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::record::{Dataset, DocumentRecord};
use crate::store;

/// Reads a whole store file into a validated dataset.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let dataset = store::deserialize_str(&text)?;
    debug!(
        "Read {} records of dimension {} from {}",
        dataset.len(),
        dataset.dimensions(),
        path.display()
    );
    Ok(dataset)
}

/// Ids already present in a store file; empty when the file does not exist.
pub fn stored_ids<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let text = match fs::read_to_string(path.as_ref()) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(store::deserialize_str(&text)?
        .ids()
        .map(str::to_string)
        .collect())
}

/// Appends records to a store file, creating it (and its parent directory)
/// when missing.
///
/// Every record is serialized before the file is touched, so an invalid record
/// leaves the file unchanged.
pub fn append_records<P: AsRef<Path>>(path: P, records: &[DocumentRecord]) -> Result<()> {
    let path = path.as_ref();
    let lines = records
        .iter()
        .map(store::serialize_record)
        .collect::<Result<Vec<_>>>()?;
    if lines.is_empty() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let mut chunk = String::new();
    if needs_separator(&mut file)? {
        chunk.push('\n');
    }
    chunk.push_str(&lines.join("\n"));
    file.write_all(chunk.as_bytes())?;

    debug!("Appended {} records to {}", lines.len(), path.display());
    Ok(())
}

/// True when the file is non-empty and does not end with a newline.
fn needs_separator(file: &mut fs::File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("embeddings.csv");

        append_records(&path, &[DocumentRecord::new("a.md", vec![0.0, 0.0])]).unwrap();
        append_records(&path, &[DocumentRecord::new("b.md", vec![1.0, 1.0])]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a.md,[0.0, 0.0]\nb.md,[1.0, 1.0]");

        let dataset = read_dataset(&path).unwrap();
        assert_eq!(dataset.ids().collect::<Vec<_>>(), vec!["a.md", "b.md"]);
    }

    #[test]
    fn invalid_record_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.csv");
        fs::write(&path, "a.md,[1.0]\n").unwrap();

        let err = append_records(
            &path,
            &[
                DocumentRecord::new("b.md", vec![2.0]),
                DocumentRecord::new("bad,id.md", vec![3.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a.md,[1.0]\n");
    }

    #[test]
    fn stored_ids_cover_earlier_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.csv");
        assert!(stored_ids(&path).unwrap().is_empty());

        append_records(&path, &[DocumentRecord::new("a.md", vec![0.0])]).unwrap();
        append_records(&path, &[DocumentRecord::new("b.md", vec![1.0])]).unwrap();

        let ids = stored_ids(&path).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a.md") && ids.contains("b.md"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_dataset(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
