//! Import a directory tree into an archive and export an archive onto disk.
//!
//! Symbolic links and special files are skipped when importing. Exporting
//! stops at the first failure and does not roll back files already written.
//! If the future is dropped, the entry being written is still completed, so
//! no file is left truncated.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::debug;

use super::archive::ZipArchive;
use super::entry::{EntryOptions, ZipEntry, normalize_path};
use super::parser::LoadOptions;
use super::writer::GenerateOptions;
use crate::error::{Result, ZipError};
use crate::io::{EntryKind, Filesystem, LocalFileReader, LocalFs};

/// Build an archive mirroring the directory at `root`, depth-first in the
/// order [`Filesystem::walk`] yields it.
pub async fn zip_dir<F: Filesystem + ?Sized>(fs: &F, root: &Path) -> Result<ZipArchive> {
    let archive = ZipArchive::new();

    for item in fs.walk(root).await? {
        let path = root.join(&item.relative);
        match item.kind {
            EntryKind::Dir => {
                let name = archive_name(&item.relative)?;
                let folder = ZipEntry::new_folder(&name, &EntryOptions::default())?;
                archive.insert_relative(folder, true)?;
            }
            EntryKind::File => {
                let name = archive_name(&item.relative)?;
                let content = fs.read_file(&path).await?;
                archive.add_file(&name, content, EntryOptions::default())?;
            }
            EntryKind::Other => {
                debug!("skipping {}: not a regular file or directory", path.display());
            }
        }
    }

    Ok(archive)
}

/// `/`-joined archive name for a path relative to the walk root.
fn archive_name(relative: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return Err(ZipError::invalid_path(
                relative.to_string_lossy(),
                "path escapes the source directory",
            ));
        };
        let Some(segment) = segment.to_str() else {
            return Err(ZipError::invalid_path(
                relative.to_string_lossy(),
                "file name is not valid UTF-8",
            ));
        };
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// Write every entry of `archive` (relative to its root) below `destination`.
pub async fn unzip<F: Filesystem + ?Sized>(
    fs: &F,
    archive: &ZipArchive,
    destination: &Path,
) -> Result<()> {
    fs.create_dir(destination, true).await?;

    for entry in archive.snapshot() {
        let target = safe_join(destination, entry.name())?;

        if entry.is_dir() {
            fs.create_dir(&target, true).await?;
        } else {
            if let Some(parent) = target.parent() {
                fs.create_dir(parent, true).await?;
            }
            fs.write_file(&target, entry.shared_content()).await?;
        }
        debug!("extracted {}", target.display());
    }

    Ok(())
}

/// Join an archive path onto `base`, refusing anything that could escape it.
fn safe_join(base: &Path, name: &str) -> Result<PathBuf> {
    let normalized = normalize_path(name)?;
    let relative = Path::new(&normalized);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(ZipError::invalid_path(name, "path escapes the destination"));
    }
    Ok(base.join(relative))
}

impl ZipArchive {
    /// Import the directory at `path` from the local filesystem.
    pub async fn zip_dir(path: impl AsRef<Path>) -> Result<ZipArchive> {
        zip_dir(&LocalFs, path.as_ref()).await
    }

    /// Export this view onto the local filesystem below `path`.
    pub async fn unzip(&self, path: impl AsRef<Path>) -> Result<()> {
        unzip(&LocalFs, self, path.as_ref()).await
    }

    /// Read and parse a ZIP file from the local filesystem.
    pub async fn read_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<ZipArchive> {
        let reader = LocalFileReader::new(path.as_ref())?;
        ZipArchive::load_from(Arc::new(reader), options).await
    }

    /// Generate this view and write it to `path` on the local filesystem.
    pub async fn write_file(&self, path: impl AsRef<Path>, options: &GenerateOptions) -> Result<()> {
        let bytes = self.generate(options).await?;
        LocalFs.write_file(path.as_ref(), Arc::from(bytes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::ffi::OsString;
    use std::sync::Mutex;

    use crate::io::DirEntry;

    /// In-memory filesystem recording every write.
    #[derive(Default)]
    struct MemoryFs {
        files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
        dirs: Mutex<Vec<PathBuf>>,
        listings: BTreeMap<PathBuf, Vec<DirEntry>>,
    }

    #[async_trait]
    impl Filesystem for MemoryFs {
        async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned().ok_or_else(|| {
                ZipError::filesystem(path, std::io::ErrorKind::NotFound.into())
            })
        }

        async fn write_file(&self, path: &Path, data: Arc<[u8]>) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), data.to_vec());
            Ok(())
        }

        async fn create_dir(&self, path: &Path, _recursive: bool) -> Result<()> {
            self.dirs.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
            Ok(self.listings.get(path).cloned().unwrap_or_default())
        }
    }

    fn listing(items: &[(&str, EntryKind)]) -> Vec<DirEntry> {
        items
            .iter()
            .map(|(name, kind)| DirEntry {
                file_name: OsString::from(name),
                kind: *kind,
            })
            .collect()
    }

    #[tokio::test]
    async fn zip_dir_walks_depth_first_in_listing_order() {
        let mut fs = MemoryFs::default();
        fs.listings.insert(
            PathBuf::from("/src"),
            listing(&[
                ("z.txt", EntryKind::File),
                ("sub", EntryKind::Dir),
                ("link", EntryKind::Other),
                ("a.txt", EntryKind::File),
            ]),
        );
        fs.listings.insert(
            PathBuf::from("/src/sub"),
            listing(&[("inner.bin", EntryKind::File)]),
        );
        {
            let mut files = fs.files.lock().unwrap();
            files.insert(PathBuf::from("/src/z.txt"), b"z".to_vec());
            files.insert(PathBuf::from("/src/a.txt"), b"a".to_vec());
            files.insert(PathBuf::from("/src/sub/inner.bin"), vec![0, 1, 2]);
        }

        let archive = zip_dir(&fs, Path::new("/src")).await.unwrap();
        let names: Vec<_> = archive.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, ["z.txt", "sub", "sub/inner.bin", "a.txt"]);
        assert_eq!(archive.file("sub/inner.bin").unwrap().content(), &[0, 1, 2]);
    }

    #[tokio::test]
    async fn unzip_writes_files_and_folders() {
        let archive = ZipArchive::new();
        archive
            .add_file("docs/readme.md", "# hi", EntryOptions::default())
            .unwrap();
        archive.folder("empty").unwrap();

        let fs = MemoryFs::default();
        unzip(&fs, &archive, Path::new("/out")).await.unwrap();

        let files = fs.files.lock().unwrap();
        assert_eq!(files.get(Path::new("/out/docs/readme.md")).unwrap(), b"# hi");
        let dirs = fs.dirs.lock().unwrap();
        assert!(dirs.contains(&PathBuf::from("/out/empty")));
        assert!(dirs.contains(&PathBuf::from("/out/docs")));
    }

    #[tokio::test]
    async fn unzip_of_a_view_is_relative_to_it() {
        let archive = ZipArchive::new();
        let images = archive.folder("images").unwrap();
        images.add_file("smile.gif", [0u8], EntryOptions::default()).unwrap();

        let fs = MemoryFs::default();
        unzip(&fs, &images, Path::new("/out")).await.unwrap();
        assert!(fs.files.lock().unwrap().contains_key(Path::new("/out/smile.gif")));
    }

    #[test]
    fn archive_names_use_forward_slashes() {
        let relative: PathBuf = ["sub", "deeper", "c.md"].iter().collect();
        assert_eq!(archive_name(&relative).unwrap(), "sub/deeper/c.md");
        assert!(archive_name(Path::new("../up")).is_err());
    }

    #[test]
    fn safe_join_refuses_escapes() {
        let base = Path::new("/dest");
        assert_eq!(safe_join(base, "a/b.txt").unwrap(), PathBuf::from("/dest/a/b.txt"));
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b"] {
            assert!(matches!(safe_join(base, bad), Err(ZipError::InvalidPath { .. })));
        }
    }
}
