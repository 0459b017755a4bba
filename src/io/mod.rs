//! Byte sources and the filesystem collaborator.
//!
//! The archive core never touches the host filesystem directly. Parsing reads
//! through [`ReadAt`], and directory import/export goes through [`Filesystem`].

mod local;

pub use local::{LocalFileReader, LocalFs};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, ZipError};

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely, failing if the source ends first.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let position = offset + filled as u64;
            let n = self.read_at(position, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(ZipError::malformed(format!(
                    "unexpected end of data at offset {position}"
                )));
            }
            filled += n;
        }
        Ok(())
    }
}

#[async_trait]
impl ReadAt for Vec<u8> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// What a directory listing entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, sockets, devices and the like.
    Other,
}

/// One item of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub file_name: OsString,
    pub kind: EntryKind,
}

/// One item of a recursive walk.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Path relative to the walk root.
    pub relative: PathBuf,
    pub kind: EntryKind,
}

/// The filesystem primitives the directory bridge depends on.
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write `data` to `path`, replacing any existing file.
    ///
    /// Implementations must not leave a partially written file behind when the
    /// returned future is dropped.
    async fn write_file(&self, path: &Path, data: Arc<[u8]>) -> Result<()>;

    async fn create_dir(&self, path: &Path, recursive: bool) -> Result<()>;

    /// List a directory, in the order entries should be archived.
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Everything below `root`, depth-first, each directory before its
    /// contents. Only [`EntryKind::Dir`] items are descended into.
    async fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        let mut walked = Vec::new();
        let mut pending = vec![(PathBuf::new(), self.read_dir(root).await?.into_iter())];

        while let Some((dir, items)) = pending.last_mut() {
            let Some(item) = items.next() else {
                pending.pop();
                continue;
            };
            let relative = dir.join(&item.file_name);
            if item.kind == EntryKind::Dir {
                let listing = self.read_dir(&root.join(&relative)).await?;
                pending.push((relative.clone(), listing.into_iter()));
            }
            walked.push(WalkEntry {
                relative,
                kind: item.kind,
            });
        }

        Ok(walked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_reader_reads_within_bounds() {
        let data = b"PK\x03\x04rest".to_vec();
        let mut buf = [0u8; 4];
        data.read_exact_at(0, &mut buf).await.unwrap();
        assert_eq!(&buf, b"PK\x03\x04");

        let mut tail = [0u8; 8];
        let n = data.read_at(6, &mut tail).await.unwrap();
        assert_eq!(&tail[..n], b"st");
    }

    #[tokio::test]
    async fn vec_reader_rejects_short_exact_reads() {
        let data = vec![1u8, 2, 3];
        let mut buf = [0u8; 4];
        let err = data.read_exact_at(1, &mut buf).await.unwrap_err();
        assert!(matches!(err, ZipError::MalformedArchive(_)));

        let n = data.read_at(100, &mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
