use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Binary content accessor handed to ingest workers
pub enum FileBytes {
    Mapped(Mmap),
    Buffered(Vec<u8>),
    Empty,
}

impl AsRef<[u8]> for FileBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => &mmap[..],
            FileBytes::Buffered(buf) => buf.as_slice(),
            FileBytes::Empty => &[],
        }
    }
}

impl FileBytes {
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn read_bytes_smart<P: AsRef<Path>>(path: P) -> Result<FileBytes> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if !metadata.is_file() {
        anyhow::bail!("not a regular file: {}", path.display());
    }

    // Mapping a zero-length file fails on some platforms
    if metadata.len() == 0 {
        return Ok(FileBytes::Empty);
    }

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: We're only reading the file, not modifying it
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileBytes::Mapped(mmap))
    } else {
        let content =
            std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;

        Ok(FileBytes::Buffered(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_small_and_empty_reads() {
        let tmp = TempDir::new().unwrap();
        let small = tmp.path().join("small.bin");
        let empty = tmp.path().join("empty.bin");
        std::fs::write(&small, [1u8, 2, 3]).unwrap();
        std::fs::write(&empty, b"").unwrap();

        assert_eq!(read_bytes_smart(&small).unwrap().as_ref(), &[1, 2, 3]);
        assert!(read_bytes_smart(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_large_reads_are_mapped() {
        let tmp = TempDir::new().unwrap();
        let big = tmp.path().join("big.bin");
        std::fs::write(&big, vec![7u8; (MMAP_THRESHOLD + 1) as usize]).unwrap();

        let bytes = read_bytes_smart(&big).unwrap();
        assert!(matches!(bytes, FileBytes::Mapped(_)));
        assert_eq!(bytes.len(), (MMAP_THRESHOLD + 1) as usize);
    }

    #[test]
    fn test_missing_and_directory_fail() {
        let tmp = TempDir::new().unwrap();
        assert!(read_bytes_smart(tmp.path().join("missing")).is_err());
        assert!(read_bytes_smart(tmp.path()).is_err());
    }
}
