//! The in-memory archive tree.
//!
//! A [`ZipArchive`] is a handle onto shared entry storage plus a root prefix.
//! [`ZipArchive::folder`] returns another handle with a deeper root, so edits
//! made through a folder view are visible from the parent and vice versa.
//!
//! Concurrent mutation of one tree from several tasks is not coordinated
//! beyond the internal lock; callers must order their own writes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;

use super::entry::{EntryOptions, ZipEntry, ancestors, normalize_path};
use crate::error::{Result, ZipError};

#[derive(Debug, Default)]
pub(crate) struct ArchiveInner {
    /// Full normalized path to entry, in insertion order.
    pub(crate) entries: IndexMap<String, ZipEntry>,
    /// Number of entries strictly below each folder path, explicit or not.
    descendants: HashMap<String, usize>,
    pub(crate) comment: Option<String>,
}

impl ArchiveInner {
    fn put(&mut self, name: String, entry: ZipEntry) {
        if self.entries.insert(name.clone(), entry).is_none() {
            for ancestor in ancestors(&name) {
                *self.descendants.entry(ancestor.to_string()).or_default() += 1;
            }
        }
    }

    fn forget(&mut self, name: &str) {
        for ancestor in ancestors(name) {
            if let Some(count) = self.descendants.get_mut(ancestor) {
                *count -= 1;
                if *count == 0 {
                    self.descendants.remove(ancestor);
                }
            }
        }
    }

    fn has_descendants(&self, name: &str) -> bool {
        self.descendants.contains_key(name)
    }
}

/// An ordered tree of files and folders.
///
/// Cloning a `ZipArchive` produces another handle onto the same entries.
#[derive(Debug, Clone, Default)]
pub struct ZipArchive {
    inner: Arc<RwLock<ArchiveInner>>,
    /// Empty for the archive root, otherwise `folder/` with a trailing slash.
    root: String,
}

impl ZipArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix of this view inside the whole tree, e.g. `images/`.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Archive-level comment, set by loading or by [`set_comment`](Self::set_comment).
    pub fn comment(&self) -> Option<String> {
        self.read().comment.clone()
    }

    pub fn set_comment(&self, comment: Option<String>) {
        self.write().comment = comment;
    }

    /// Add or replace a file. The previous entry at the same path, if any, is
    /// replaced wholesale, including its metadata.
    pub fn add_file(
        &self,
        path: &str,
        content: impl Into<Vec<u8>>,
        options: EntryOptions,
    ) -> Result<ZipEntry> {
        let entry = ZipEntry::new_file(path, content, &options)?;
        let full = format!("{}{}", self.root, entry.name());
        let entry = entry.renamed(full);
        self.insert(entry.clone(), options.create_folders)?;
        Ok(entry)
    }

    /// Return a view rooted at `name`, creating the folder (and its ancestors)
    /// if it does not exist yet.
    pub fn folder(&self, name: &str) -> Result<ZipArchive> {
        let relative = normalize_path(name)?;
        let full = format!("{}{}", self.root, relative);

        let mut inner = self.write();
        match inner.entries.get(&full) {
            Some(existing) if !existing.is_dir() => {
                return Err(ZipError::invalid_path(full, "a file exists at this path"));
            }
            Some(_) => {}
            None => {
                let folder = ZipEntry::new_folder(&full, &EntryOptions::default())?;
                insert_entry(&mut inner, folder, true)?;
            }
        }
        drop(inner);

        Ok(ZipArchive {
            inner: Arc::clone(&self.inner),
            root: format!("{full}/"),
        })
    }

    /// Look up a file or folder by path relative to this view.
    pub fn get(&self, path: &str) -> Option<ZipEntry> {
        let full = self.resolve(path).ok()?;
        self.read().entries.get(&full).cloned()
    }

    /// Look up a file (not a folder) by path relative to this view.
    pub fn file(&self, path: &str) -> Option<ZipEntry> {
        self.get(path).filter(|entry| !entry.is_dir())
    }

    /// Entries under this view, in insertion order, for which `predicate`
    /// returns true. The predicate receives the path relative to this view.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<ZipEntry>
    where
        P: FnMut(&str, &ZipEntry) -> bool,
    {
        self.read()
            .entries
            .iter()
            .filter_map(|(name, entry)| {
                let relative = name.strip_prefix(self.root.as_str())?;
                predicate(relative, entry).then(|| entry.clone())
            })
            .collect()
    }

    /// Remove an entry. Removing a folder also removes everything inside it.
    /// Unknown or invalid paths are ignored.
    pub fn remove(&self, path: &str) {
        let Ok(full) = self.resolve(path) else {
            return;
        };
        let prefix = format!("{full}/");
        let mut inner = self.write();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|name| **name == full || name.starts_with(&prefix))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return;
        }
        for name in &doomed {
            inner.forget(name);
        }
        inner
            .entries
            .retain(|name, _| name != &full && !name.starts_with(&prefix));
    }

    /// Iterate over the entries of this view in insertion order.
    ///
    /// The iterator reads the shared storage lazily; call `iter` again to restart.
    pub fn iter(&self) -> Entries {
        Entries {
            archive: self.clone(),
            position: 0,
        }
    }

    /// Number of entries under this view.
    pub fn len(&self) -> usize {
        let inner = self.read();
        if self.root.is_empty() {
            inner.entries.len()
        } else {
            inner
                .entries
                .keys()
                .filter(|name| name.starts_with(self.root.as_str()))
                .count()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries under this view renamed relative to it, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<ZipEntry> {
        self.read()
            .entries
            .iter()
            .filter_map(|(name, entry)| {
                let relative = name.strip_prefix(self.root.as_str())?;
                Some(entry.clone().renamed(relative.to_string()))
            })
            .collect()
    }

    /// Insert an entry whose name is relative to this view.
    pub(crate) fn insert_relative(&self, entry: ZipEntry, create_folders: bool) -> Result<()> {
        let full = format!("{}{}", self.root, entry.name());
        self.insert(entry.renamed(full), create_folders)
    }

    fn insert(&self, entry: ZipEntry, create_folders: bool) -> Result<()> {
        let mut inner = self.write();
        insert_entry(&mut inner, entry, create_folders)
    }

    fn resolve(&self, path: &str) -> Result<String> {
        Ok(format!("{}{}", self.root, normalize_path(path)?))
    }

    fn read(&self) -> RwLockReadGuard<'_, ArchiveInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ArchiveInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Insert `entry` keyed by its full name, enforcing that files and folders
/// never share a path and that no file acts as a folder.
fn insert_entry(inner: &mut ArchiveInner, entry: ZipEntry, create_folders: bool) -> Result<()> {
    let name = entry.name().to_string();

    for ancestor in ancestors(&name) {
        match inner.entries.get(ancestor) {
            Some(existing) if !existing.is_dir() => {
                return Err(ZipError::invalid_path(name.clone(), "a parent folder is a file"));
            }
            Some(_) => {}
            None if create_folders => {
                let folder = ZipEntry::new_folder(ancestor, &EntryOptions::default())?;
                inner.put(ancestor.to_string(), folder);
            }
            None => {}
        }
    }

    match inner.entries.get(&name) {
        Some(existing) if existing.is_dir() != entry.is_dir() => {
            return Err(ZipError::invalid_path(
                name,
                "a file and a folder cannot share a path",
            ));
        }
        None if !entry.is_dir() => {
            // An implicit folder is any path that prefixes another entry
            if inner.has_descendants(&name) {
                return Err(ZipError::invalid_path(name, "path is used as a folder"));
            }
        }
        _ => {}
    }

    inner.put(name, entry);
    Ok(())
}

/// Lazy iterator over the entries of a [`ZipArchive`] view.
pub struct Entries {
    archive: ZipArchive,
    position: usize,
}

impl Iterator for Entries {
    type Item = ZipEntry;

    fn next(&mut self) -> Option<ZipEntry> {
        let inner = self.archive.read();
        while let Some((name, entry)) = inner.entries.get_index(self.position) {
            self.position += 1;
            if name.starts_with(self.archive.root.as_str()) {
                return Some(entry.clone());
            }
        }
        None
    }
}

impl IntoIterator for &ZipArchive {
    type Item = ZipEntry;
    type IntoIter = Entries;

    fn into_iter(self) -> Entries {
        self.iter()
    }
}
