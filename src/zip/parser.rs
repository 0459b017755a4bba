//! ZIP archive parser.
//!
//! This module decodes ZIP containers from any source that implements the
//! [`ReadAt`] trait and rebuilds a [`ZipArchive`] from them.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For each entry, read its Local File Header, then its data
//!
//! Directory-level damage (missing EOCD, offsets pointing outside the
//! archive) aborts the whole load. Damage confined to one entry's data is
//! handled according to [`IntegrityPolicy`].

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use log::{debug, warn};

use super::archive::ZipArchive;
use super::codec::{Compression, decode_base64};
use super::entry::{ZipEntry, normalize_path};
use super::structures::*;
use crate::error::{Result, ZipError};
use crate::io::ReadAt;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Custom decoder for raw file name bytes.
pub type FileNameDecoder = Arc<dyn Fn(&[u8]) -> String + Send + Sync>;

/// What to do with an entry whose data is corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Fail the whole load.
    #[default]
    Abort,
    /// Keep the entry, mark it with [`ZipEntry::is_corrupt`], and continue.
    Flag,
}

/// Options for [`ZipArchive::load`].
#[derive(Clone)]
pub struct LoadOptions {
    /// Recompute and compare each entry's CRC32.
    pub check_crc32: bool,
    pub on_integrity_error: IntegrityPolicy,
    /// Accepted for API parity; contents are always raw bytes.
    pub optimized_binary_string: bool,
    /// Add explicit folder entries for every intermediate path segment.
    pub create_folders: bool,
    /// Decoder for file names and comments, UTF-8 when `None`.
    pub decode_file_name: Option<FileNameDecoder>,
    /// The input is base64 text wrapping the container bytes.
    pub base64: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            check_crc32: true,
            on_integrity_error: IntegrityPolicy::Abort,
            optimized_binary_string: false,
            create_folders: false,
            decode_file_name: None,
            base64: false,
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("check_crc32", &self.check_crc32)
            .field("on_integrity_error", &self.on_integrity_error)
            .field("optimized_binary_string", &self.optimized_binary_string)
            .field("create_folders", &self.create_folders)
            .field("decode_file_name", &self.decode_file_name.is_some())
            .field("base64", &self.base64)
            .finish()
    }
}

impl LoadOptions {
    /// Raw container bytes, unwrapping base64 input when asked to.
    fn container(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if !self.base64 {
            return Ok(data);
        }
        decode_base64(&data).map_err(|e| ZipError::malformed(format!("base64 input: {e}")))
    }

    fn decode(&self, raw: &[u8]) -> String {
        match &self.decode_file_name {
            Some(decoder) => decoder(raw),
            None => String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

/// Low-level ZIP file parser.
///
/// Generic over the reader type so archives can be parsed from memory or
/// straight from a file. Typically used through [`ZipArchive::load`].
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

/// Location of the central directory and the archive comment.
#[derive(Debug, Clone)]
pub struct DirectoryInfo {
    pub cd_offset: u64,
    pub cd_size: u64,
    pub total_entries: u64,
    /// Upper bound for the end of the central directory records.
    pub cd_end_limit: u64,
    pub comment: Vec<u8>,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    /// Create a parser over any positional data source.
    ///
    /// # Arguments
    ///
    /// * `reader` - A shared reference to a reader implementing [`ReadAt`]
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD sits at the end of the archive unless a comment follows it,
    /// in which case the tail is scanned backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in the source).
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if no record whose comment length
    /// reaches exactly to the end of the data can be found.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Try the common case of an empty comment first
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for PK\x05\x06 whose comment length reaches exactly to the end
        if buf.len() >= EndOfCentralDirectory::SIZE {
            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                    let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                    if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                        let eocd = EndOfCentralDirectory::from_bytes(
                            &buf[i..i + EndOfCentralDirectory::SIZE],
                        )?;
                        return Ok((eocd, search_start + i as u64));
                    }
                }
            }
        }

        Err(ZipError::malformed("end of central directory record not found"))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD holds 0xFFFF or 0xFFFFFFFF sentinels.
    /// The locator sits immediately before the regular EOCD.
    ///
    /// # Arguments
    ///
    /// * `eocd_offset` - Offset of the regular EOCD in the source
    ///
    /// # Returns
    ///
    /// The parsed ZIP64 EOCD with 64-bit field values.
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if the locator or record is missing or
    /// truncated, [`ZipError::Unsupported`] for multi-volume archives.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| ZipError::malformed("missing ZIP64 locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        let eocd64 = Zip64EOCD::from_bytes(&eocd64_buf)?;
        if eocd64.disk_number != 0 || eocd64.disk_with_cd != 0 {
            return Err(ZipError::Unsupported("multi-volume archives".to_string()));
        }
        Ok(eocd64)
    }

    /// Locate the central directory and read the archive comment.
    ///
    /// # Returns
    ///
    /// The directory's offset, size and entry count, using the ZIP64 record
    /// when the regular one is saturated.
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if the directory lies outside the
    /// archive or is too small for its declared entry count.
    pub async fn directory_info(&self) -> Result<DirectoryInfo> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
            return Err(ZipError::Unsupported("multi-volume archives".to_string()));
        }

        let mut comment = vec![0u8; eocd.comment_len as usize];
        self.reader
            .read_exact_at(eocd_offset + EndOfCentralDirectory::SIZE as u64, &mut comment)
            .await?;

        let (cd_offset, cd_size, total_entries, cd_end_limit) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            let limit = eocd_offset - Zip64EOCDLocator::SIZE as u64;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries, limit)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
                eocd_offset,
            )
        };

        match cd_offset.checked_add(cd_size) {
            Some(end) if end <= cd_end_limit => {}
            _ => {
                return Err(ZipError::malformed(format!(
                    "central directory at {cd_offset} (+{cd_size}) lies outside the archive"
                )));
            }
        }
        if total_entries.saturating_mul(CentralDirectoryHeader::MIN_SIZE as u64) > cd_size {
            return Err(ZipError::malformed(format!(
                "{total_entries} entries cannot fit in a {cd_size} byte central directory"
            )));
        }

        Ok(DirectoryInfo {
            cd_offset,
            cd_size,
            total_entries,
            cd_end_limit,
            comment,
        })
    }

    /// Read every Central Directory File Header, in directory order.
    ///
    /// # Arguments
    ///
    /// * `info` - Directory location from [`directory_info`](Self::directory_info)
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if a record is truncated or points at a
    /// local header beyond the entry data.
    pub async fn read_central_directory(&self, info: &DirectoryInfo) -> Result<Vec<CentralDirectoryHeader>> {
        // One read for the whole directory
        let mut cd_data = vec![0u8; info.cd_size as usize];
        self.reader.read_exact_at(info.cd_offset, &mut cd_data).await?;

        let mut headers = Vec::with_capacity(info.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..info.total_entries {
            let header = CentralDirectoryHeader::parse(&mut cursor)?;
            if header.lfh_offset.saturating_add(LocalFileHeader::SIZE as u64) > info.cd_offset {
                return Err(ZipError::malformed(format!(
                    "local header offset {} points past the entry data",
                    header.lfh_offset
                )));
            }
            headers.push(header);
        }

        Ok(headers)
    }

    /// Read the raw (still compressed) data of an entry.
    ///
    /// The Local File Header has variable-length fields that may differ from
    /// the Central Directory entry, so it is read to find where data begins.
    ///
    /// # Arguments
    ///
    /// * `header` - The entry's Central Directory File Header
    /// * `cd_offset` - Start of the central directory, which bounds the data
    ///
    /// # Returns
    ///
    /// Exactly `header.compressed_size` bytes.
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if the local header is invalid or the
    /// data would run into the central directory.
    pub async fn read_raw_data(&self, header: &CentralDirectoryHeader, cd_offset: u64) -> Result<Vec<u8>> {
        let mut lfh_buf = vec![0u8; LocalFileHeader::SIZE];
        self.reader.read_exact_at(header.lfh_offset, &mut lfh_buf).await?;

        let (_, name_len, extra_len) = LocalFileHeader::from_bytes(&lfh_buf)?;

        let data_offset =
            header.lfh_offset + LocalFileHeader::SIZE as u64 + name_len as u64 + extra_len as u64;
        match data_offset.checked_add(header.compressed_size) {
            Some(end) if end <= cd_offset => {}
            _ => {
                return Err(ZipError::malformed(format!(
                    "data of {:?} extends into the central directory",
                    String::from_utf8_lossy(&header.file_name)
                )));
            }
        }

        let mut data = vec![0u8; header.compressed_size as usize];
        self.reader.read_exact_at(data_offset, &mut data).await?;
        Ok(data)
    }

    /// Decode the whole archive into a fresh tree.
    pub async fn parse(&self, options: &LoadOptions) -> Result<ZipArchive> {
        let archive = ZipArchive::new();
        self.parse_into(&archive, options).await?;
        Ok(archive)
    }

    /// Decode the archive, adding its entries to `archive` (relative to its root).
    ///
    /// # Errors
    ///
    /// Structural damage aborts with [`ZipError::MalformedArchive`]. Damage
    /// to one entry's data aborts with [`ZipError::Integrity`] unless
    /// `options` asks for [`IntegrityPolicy::Flag`].
    pub async fn parse_into(&self, archive: &ZipArchive, options: &LoadOptions) -> Result<()> {
        let info = self.directory_info().await?;
        let headers = self.read_central_directory(&info).await?;
        debug!(
            "central directory: {} entries, {} bytes at offset {}",
            headers.len(),
            info.cd_size,
            info.cd_offset
        );

        if !info.comment.is_empty() {
            archive.set_comment(Some(options.decode(&info.comment)));
        }

        for header in &headers {
            let entry = self.read_entry(header, info.cd_offset, options).await?;
            archive.insert_relative(entry, options.create_folders)?;
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    async fn read_entry(
        &self,
        header: &CentralDirectoryHeader,
        cd_offset: u64,
        options: &LoadOptions,
    ) -> Result<ZipEntry> {
        let raw_name = options.decode(&header.file_name);
        let name = normalize_path(&raw_name)?;
        let dir = header.is_directory();
        let modified = header
            .modified
            .to_datetime()
            .or_else(|| DosDateTime::EPOCH.to_datetime())
            .unwrap_or_default();

        let raw = self.read_raw_data(header, cd_offset).await?;
        let compression = Compression::from_method(header.compression_method);

        let mut failure = None;
        let content = if dir {
            Vec::new()
        } else {
            let expected_len = header.uncompressed_size as usize;
            let (content, outcome) = match compression {
                Some(codec) => codec.decompress_partial(&raw, expected_len),
                None => (
                    Vec::new(),
                    Err(ZipError::Unsupported(format!(
                        "compression method {} for {name:?}",
                        header.compression_method.as_u16()
                    ))),
                ),
            };
            let actual = crc32fast::hash(&content);
            failure = match outcome {
                // Damaged payloads count as checksum failures when checking is on
                Err(ZipError::CorruptData(reason)) if options.check_crc32 => {
                    debug!("{name:?} does not decode: {reason}");
                    Some(ZipError::Integrity {
                        name: name.clone(),
                        expected: header.crc32,
                        actual,
                    })
                }
                Err(e) => Some(e),
                Ok(()) if options.check_crc32 && actual != header.crc32 => Some(ZipError::Integrity {
                    name: name.clone(),
                    expected: header.crc32,
                    actual,
                }),
                Ok(()) => None,
            };
            if failure.is_some() && content.len() != expected_len {
                Vec::new()
            } else {
                content
            }
        };

        let mut entry = ZipEntry::from_parts(name, dir, content, modified);

        if let Some(error) = failure {
            match options.on_integrity_error {
                IntegrityPolicy::Abort => return Err(error),
                IntegrityPolicy::Flag => {
                    warn!("keeping corrupt entry {:?}: {error}", entry.name());
                    entry.mark_corrupt();
                }
            }
        }

        if !header.comment.is_empty() {
            entry.set_comment(Some(options.decode(&header.comment)));
        }

        match header.host() {
            HOST_UNIX => {
                let mode = header.external_attrs >> 16;
                entry.set_permissions((mode != 0).then_some(mode), None);
            }
            HOST_DOS => {
                entry.set_permissions(None, Some((header.external_attrs & 0x3F) as u8));
            }
            _ => {}
        }

        debug!(
            "parsed {:?}: {} -> {} bytes",
            entry.name(),
            header.compressed_size,
            entry.content().len()
        );
        Ok(entry)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

impl ZipArchive {
    /// Parse a ZIP container held in memory into a new tree.
    pub async fn load(data: impl Into<Vec<u8>>, options: &LoadOptions) -> Result<ZipArchive> {
        let data = options.container(data.into())?;
        ZipParser::new(Arc::new(data)).parse(options).await
    }

    /// Parse a ZIP container from any random-access source.
    ///
    /// Base64 input cannot be read at random, so it is read whole first.
    pub async fn load_from<R: ReadAt + ?Sized>(
        reader: Arc<R>,
        options: &LoadOptions,
    ) -> Result<ZipArchive> {
        if options.base64 {
            let mut encoded = vec![0u8; reader.size() as usize];
            reader.read_exact_at(0, &mut encoded).await?;
            return ZipArchive::load(encoded, options).await;
        }
        ZipParser::new(reader).parse(options).await
    }

    /// Parse a ZIP container and merge its entries into this view.
    pub async fn load_into(&self, data: impl Into<Vec<u8>>, options: &LoadOptions) -> Result<()> {
        let data = options.container(data.into())?;
        ZipParser::new(Arc::new(data))
            .parse_into(self, options)
            .await
    }
}
