//! # ziptree
//!
//! Build, inspect and rewrite ZIP archives in memory.
//!
//! A [`ZipArchive`] is an ordered tree of files and folders. Entries can be
//! added, looked up, filtered and removed, folder views share storage with
//! the archive they came from, and the whole tree can be serialized to a ZIP
//! container or rebuilt from one.
//!
//! ## Features
//!
//! - STORED and DEFLATE entries, chosen per archive or per entry
//! - CRC-32 verification with an abort or flag-and-continue policy
//! - Archive and entry comments, modification dates, DOS and UNIX attributes
//! - Progress reporting through a callback or a Tokio channel
//! - Import from and export to a directory through a pluggable [`Filesystem`]
//!
//! ## Example
//!
//! ```no_run
//! use ziptree::{EntryOptions, GenerateOptions, LoadOptions, ZipArchive};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let archive = ZipArchive::new();
//!     archive.add_file("Hello.txt", "Hello World\n", EntryOptions::default())?;
//!     archive
//!         .folder("images")?
//!         .add_file("smile.gif", vec![0x47, 0x49, 0x46], EntryOptions::default())?;
//!
//!     let bytes = archive.generate(&GenerateOptions::default()).await?;
//!
//!     let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await?;
//!     for entry in &loaded {
//!         println!("{}", entry.name());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::{DirEntry, EntryKind, Filesystem, LocalFileReader, LocalFs, ReadAt, WalkEntry};
pub use zip::{
    Compression, EntryOptions, GenerateOptions, IntegrityPolicy, LoadOptions, Platform, Progress,
    ZipArchive, ZipEntry,
};
