use anyhow::{Context, Result};
use memmap2::Mmap;
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl FileContent {
    /// Decode as UTF-8, replacing invalid sequences (Latin-1 sources still load).
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            FileContent::Mapped(mmap) => String::from_utf8_lossy(mmap),
            FileContent::Buffered(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        // Use memory mapping for large files
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: We're only reading the file, not modifying it
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    } else {
        // Read small files into memory
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read file {}", path.display()))?;

        Ok(FileContent::Buffered(content))
    }
}

/// Read a source file as text with lossy UTF-8 decoding.
pub fn read_text_lossy<P: AsRef<Path>>(path: P) -> Result<String> {
    let content = read_file_smart(path)?;
    Ok(content.text().into_owned())
}

/// Serialize `value` as pretty JSON into `path` via a temp file in the same directory.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        writer.flush()?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_text_lossy_replaces_invalid_utf8() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("latin1.tex");
        std::fs::write(&path, b"caf\xe9 au lait").unwrap();

        let text = read_text_lossy(&path).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" au lait"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_write_json_atomic_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/out/value.json");

        write_json_atomic(&path, &serde_json::json!({ "a": 1 })).unwrap();

        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["a"], 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read_text_lossy(dir.path().join("nope.tex")).is_err());
    }
}
