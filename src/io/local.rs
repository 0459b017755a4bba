use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use walkdir::WalkDir;

use super::{DirEntry, EntryKind, Filesystem, ReadAt, WalkEntry};
use crate::error::{Result, ZipError};

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    path: PathBuf,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| ZipError::filesystem(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| ZipError::filesystem(path, e))?
            .len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        #[cfg(unix)]
        let result = {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        };

        #[cfg(windows)]
        let result = {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        };

        #[cfg(not(any(unix, windows)))]
        let result = {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset)).and_then(|_| file.read(buf))
        };

        result.map_err(|e| ZipError::filesystem(&self.path, e))
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// [`Filesystem`] backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl Filesystem for LocalFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| ZipError::filesystem(path, e))
    }

    async fn write_file(&self, path: &Path, data: Arc<[u8]>) -> Result<()> {
        // A blocking task runs to completion even if this future is dropped,
        // so cancellation never truncates a file mid-write.
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            std::fs::write(&target, &data).map_err(|e| ZipError::filesystem(&target, e))
        })
        .await
        .map_err(|e| ZipError::filesystem(path, std::io::Error::other(e)))?
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> Result<()> {
        let result = if recursive {
            fs::create_dir_all(path).await
        } else {
            fs::create_dir(path).await
        };
        result.map_err(|e| ZipError::filesystem(path, e))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut listing = fs::read_dir(path)
            .await
            .map_err(|e| ZipError::filesystem(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = listing
            .next_entry()
            .await
            .map_err(|e| ZipError::filesystem(path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ZipError::filesystem(entry.path(), e))?;
            entries.push(DirEntry {
                file_name: entry.file_name(),
                kind: kind_of(file_type),
            });
        }

        // Listing order is platform dependent; sort for reproducible archives
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    async fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        let owned = root.to_path_buf();
        tokio::task::spawn_blocking(move || walk_sorted(&owned))
            .await
            .map_err(|e| ZipError::filesystem(root, std::io::Error::other(e)))?
    }
}

fn kind_of(file_type: std::fs::FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Dir
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn walk_sorted(root: &Path) -> Result<Vec<WalkEntry>> {
    let mut walked = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ZipError::filesystem(path, e.into())
        })?;
        let relative = item
            .path()
            .strip_prefix(root)
            .map_err(|_| ZipError::invalid_path(item.path().to_string_lossy(), "outside the walk root"))?
            .to_path_buf();
        walked.push(WalkEntry {
            relative,
            kind: kind_of(item.file_type()),
        });
    }

    Ok(walked)
}
