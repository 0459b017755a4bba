//! A single file or folder of an archive.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::codec::{Compression, decode_base64, encode_base64};
use crate::error::{Result, ZipError};

/// Per-entry settings accepted by [`ZipArchive::add_file`](super::ZipArchive::add_file).
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Modification time, defaults to the time the entry is created.
    pub date: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub unix_permissions: Option<u32>,
    pub dos_permissions: Option<u8>,
    /// Overrides the archive-wide compression chosen at generation time.
    pub compression: Option<Compression>,
    /// Materialize missing ancestor folders as explicit entries.
    pub create_folders: bool,
    /// The content passed in is base64 text to decode.
    pub base64: bool,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            date: None,
            comment: None,
            unix_permissions: None,
            dos_permissions: None,
            compression: None,
            create_folders: true,
            base64: false,
        }
    }
}

/// One record of an archive: a file with its content, or a folder.
///
/// Content is immutable and shared, so cloning an entry is cheap.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    name: String,
    dir: bool,
    content: Arc<[u8]>,
    last_modified: DateTime<Utc>,
    comment: Option<String>,
    unix_permissions: Option<u32>,
    dos_permissions: Option<u8>,
    compression: Option<Compression>,
    corrupt: bool,
}

impl ZipEntry {
    /// Build a file entry. `path` is normalized first.
    pub fn new_file(
        path: &str,
        content: impl Into<Vec<u8>>,
        options: &EntryOptions,
    ) -> Result<Self> {
        let name = normalize_path(path)?;
        let mut content = content.into();
        if options.base64 {
            content = decode_base64(&content).map_err(|e| {
                ZipError::CorruptData(format!("base64 content of {name:?}: {e}"))
            })?;
        }
        Ok(Self::with_options(name, false, Arc::from(content), options))
    }

    /// Build a folder entry. A trailing `/` on `path` is accepted.
    pub fn new_folder(path: &str, options: &EntryOptions) -> Result<Self> {
        let name = normalize_path(path)?;
        Ok(Self::with_options(name, true, Arc::from(Vec::new()), options))
    }

    fn with_options(name: String, dir: bool, content: Arc<[u8]>, options: &EntryOptions) -> Self {
        Self {
            name,
            dir,
            content,
            last_modified: options.date.unwrap_or_else(Utc::now),
            comment: options.comment.clone(),
            unix_permissions: options.unix_permissions,
            dos_permissions: options.dos_permissions,
            compression: if dir { None } else { options.compression },
            corrupt: false,
        }
    }

    /// Path relative to the archive root, without a trailing `/` for folders.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.dir
    }

    /// Decompressed content; always empty for folders.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Content encoded as standard base64.
    pub fn base64(&self) -> String {
        encode_base64(&self.content)
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn unix_permissions(&self) -> Option<u32> {
        self.unix_permissions
    }

    pub fn dos_permissions(&self) -> Option<u8> {
        self.dos_permissions
    }

    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Set when the entry was loaded with [`IntegrityPolicy::Flag`](super::IntegrityPolicy::Flag)
    /// and its data failed to decompress or did not match its CRC32.
    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    pub(crate) fn shared_content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    pub(crate) fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// Entry rebuilt from a parsed archive. The stored codec is not kept, so
    /// regeneration follows [`GenerateOptions::compression`](super::GenerateOptions::compression).
    pub(crate) fn from_parts(
        name: String,
        dir: bool,
        content: Vec<u8>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            dir,
            content: Arc::from(content),
            last_modified,
            comment: None,
            unix_permissions: None,
            dos_permissions: None,
            compression: None,
            corrupt: false,
        }
    }

    pub(crate) fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub(crate) fn set_permissions(&mut self, unix: Option<u32>, dos: Option<u8>) {
        self.unix_permissions = unix;
        self.dos_permissions = dos;
    }

    pub(crate) fn mark_corrupt(&mut self) {
        self.corrupt = true;
    }
}

/// Normalize an archive path: `/`-separated, no empty or `.` segments,
/// no leading `/`, no trailing `/`, no `..`.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(ZipError::invalid_path(path, "absolute paths are not allowed"));
    }
    if path.contains('\0') {
        return Err(ZipError::invalid_path(path, "NUL byte in path"));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ZipError::invalid_path(path, "parent directory segments are not allowed"));
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(ZipError::invalid_path(path, "path is empty"));
    }
    Ok(segments.join("/"))
}

/// Yields `a`, `a/b` for `a/b/c`.
pub(crate) fn ancestors(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('/').map(move |(i, _)| &name[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_redundant_segments() {
        assert_eq!(normalize_path("a//b/./c/").unwrap(), "a/b/c");
        assert_eq!(normalize_path("images/").unwrap(), "images");
        assert_eq!(normalize_path("Hello.txt").unwrap(), "Hello.txt");
    }

    #[test]
    fn rejects_unsafe_paths() {
        for bad in ["", "/", "./", "/etc/passwd", "a/../b", "..", "\\windows"] {
            assert!(
                matches!(normalize_path(bad), Err(ZipError::InvalidPath { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn paths_are_case_sensitive() {
        assert_ne!(normalize_path("A.txt").unwrap(), normalize_path("a.txt").unwrap());
    }

    #[test]
    fn ancestors_are_listed_outermost_first() {
        let found: Vec<_> = ancestors("a/b/c.txt").collect();
        assert_eq!(found, ["a", "a/b"]);
        assert_eq!(ancestors("top").count(), 0);
    }

    #[test]
    fn string_content_is_utf8() {
        let entry = ZipEntry::new_file("greet.txt", "héllo", &EntryOptions::default()).unwrap();
        assert_eq!(entry.content(), "héllo".as_bytes());
        assert_eq!(entry.text(), "héllo");
        assert!(!entry.is_dir());
    }

    #[test]
    fn folders_have_no_content_or_codec() {
        let options = EntryOptions {
            compression: Some(Compression::Deflate),
            ..Default::default()
        };
        let folder = ZipEntry::new_folder("assets/", &options).unwrap();
        assert!(folder.is_dir());
        assert_eq!(folder.name(), "assets");
        assert!(folder.content().is_empty());
        assert_eq!(folder.compression(), None);
    }

    #[test]
    fn base64_content_is_decoded() {
        let options = EntryOptions {
            base64: true,
            ..Default::default()
        };
        let gif = ZipEntry::new_file("smile.gif", "AA==", &options).unwrap();
        assert_eq!(gif.content(), &[0u8]);
        assert_eq!(gif.base64(), "AA==");

        assert!(matches!(
            ZipEntry::new_file("bad.bin", "%%%", &options),
            Err(ZipError::CorruptData(_))
        ));
    }
}
