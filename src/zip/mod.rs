//! In-memory ZIP archives.
//!
//! ## Architecture
//!
//! - [`structures`]: On-disk records (local headers, central directory, EOCD)
//! - [`ZipArchive`]: The ordered entry tree and its folder views
//! - [`Compression`]: Store and deflate codecs
//! - [`parser`]: Rebuilds a tree from container bytes
//! - [`writer`]: Serializes a tree into container bytes
//! - [`bridge`]: Moves trees to and from a directory on disk
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Parsing reads the EOCD first (from the end of the file), then the
//! Central Directory, and only then each entry's data.
//!
//! ## Supported Features
//!
//! - STORED (no compression) and DEFLATE methods
//! - ZIP64 extensions when reading
//! - UTF-8 names, archive and entry comments, DOS and UNIX attributes
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Writing fails with [`ZipError::Unsupported`](crate::ZipError::Unsupported)
//!   when an archive would need ZIP64 records

mod archive;
pub mod bridge;
mod codec;
mod entry;
pub mod parser;
pub mod structures;
pub mod writer;

pub use archive::{Entries, ZipArchive};
pub use bridge::{unzip, zip_dir};
pub use codec::{Compression, DEFAULT_LEVEL};
pub use entry::{EntryOptions, ZipEntry, normalize_path};
pub use parser::{FileNameDecoder, IntegrityPolicy, LoadOptions, ZipParser};
pub use structures::{CompressionMethod, DosDateTime};
pub use writer::{FileNameEncoder, GenerateOptions, Platform, Progress};
