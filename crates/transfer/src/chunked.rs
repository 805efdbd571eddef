use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A contiguous byte range of the source file, sent as one transport request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: i64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk {
    /// Number of bytes in this chunk.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the chunk carries no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> i64 {
        self.offset + self.data.len() as i64
    }
}

/// Reads a file in fixed-size chunks with SHA-256 checksums.
///
/// The file is opened once and read strictly sequentially; the size is
/// captured at open time.
#[derive(Debug)]
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: i64,
    file_size: i64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (1 MiB) is used.
    /// A missing file maps to [`TransferError::FileNotFound`]; anything
    /// else that prevents reading (permissions, directories) maps to
    /// [`TransferError::FileUnreadable`].
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let display = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransferError::FileNotFound(display.clone()),
            _ => TransferError::FileUnreadable {
                path: display.clone(),
                reason: e.to_string(),
            },
        })?;
        let metadata = file.metadata().map_err(|e| TransferError::FileUnreadable {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(TransferError::FileUnreadable {
                path: display,
                reason: "not a regular file".into(),
            });
        }
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size: metadata.len() as i64,
        })
    }

    /// Seeks to the given byte offset (for resume).
    pub fn seek_to(&mut self, offset: i64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining <= 0 {
            return Ok(None);
        }

        let read_size = std::cmp::min(remaining as usize, self.chunk_size);
        let mut buf = Vec::with_capacity(read_size);
        let n = (&mut self.file)
            .take(read_size as u64)
            .read_to_end(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }

        let chunk = Chunk {
            offset: self.offset,
            checksum: checksum_bytes(&buf),
            data: buf,
        };
        self.offset += n as i64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Total file size in bytes, as seen when the reader was opened.
    pub fn file_size(&self) -> i64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> i64 {
        self.file_size - self.offset
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
        assert_ne!(c1, checksum_bytes(b"hello"));
    }

    #[test]
    fn reads_all_chunks_with_remainder() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.offset, 0);
        assert_eq!(&c1.data, b"AABB");
        assert_eq!(c1.checksum, checksum_bytes(b"AABB"));
        assert_eq!(reader.remaining(), 6);

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.offset, 4);
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c3.offset, 8);
        assert_eq!(c3.len(), 2);
        assert_eq!(c3.end(), 10);

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn seek_and_resume() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        reader.seek_to(6).unwrap();
        assert_eq!(reader.offset(), 6);
        assert_eq!(reader.remaining(), 4);

        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.offset, 6);
        assert_eq!(&c.data, b"6789");
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn zero_chunk_size_selects_default() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"x");
        let reader = ChunkReader::new(&path, 0).unwrap();
        assert_eq!(reader.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(reader.file_size(), 1);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.file_size(), 0);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ChunkReader::new(&dir.path().join("nope.bin"), 4).unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
    }

    #[test]
    fn directory_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = ChunkReader::new(dir.path(), 4).unwrap_err();
        assert!(matches!(err, TransferError::FileUnreadable { .. }));
    }
}
