//! ZIP archive generation.
//!
//! Entries are compressed on Tokio's blocking pool as soon as generation
//! starts, then assembled strictly in tree order:
//!
//! 1. Local File Header and compressed data (plus a data descriptor in
//!    streaming mode) for each entry
//! 2. One Central Directory File Header per entry
//! 3. The End of Central Directory record with the archive comment
//!
//! Only the classic 32-bit layout is written; archives needing ZIP64 are
//! rejected with [`ZipError::Unsupported`].

use std::fmt;
use std::io;
use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;

use super::archive::ZipArchive;
use super::codec::{Compression, DEFAULT_LEVEL, encode_base64};
use super::entry::ZipEntry;
use super::structures::*;
use crate::error::{Result, ZipError};

/// Custom encoder turning a file name into its stored bytes.
pub type FileNameEncoder = Arc<dyn Fn(&str) -> Vec<u8> + Send + Sync>;

/// Host system recorded in "version made by", which decides whether unix or
/// DOS permissions end up in the external attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Dos,
    Unix,
}

/// Options for [`ZipArchive::generate`].
#[derive(Clone)]
pub struct GenerateOptions {
    /// Codec for entries that do not choose their own.
    pub compression: Compression,
    /// Deflate level, 0 to 9.
    pub compression_level: u32,
    /// Archive comment; falls back to the comment of a loaded archive.
    pub comment: Option<String>,
    /// Encoder for file names, UTF-8 when `None`.
    pub encode_file_name: Option<FileNameEncoder>,
    /// Write sizes and CRC in data descriptors after each file's data.
    pub stream_files: bool,
    pub platform: Platform,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Store,
            compression_level: DEFAULT_LEVEL,
            comment: None,
            encode_file_name: None,
            stream_files: false,
            platform: Platform::Dos,
        }
    }
}

impl fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("compression", &self.compression)
            .field("compression_level", &self.compression_level)
            .field("comment", &self.comment)
            .field("encode_file_name", &self.encode_file_name.is_some())
            .field("stream_files", &self.stream_files)
            .field("platform", &self.platform)
            .finish()
    }
}

/// Generation progress, reported after each entry and once at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 0 to 100, never decreasing; 100 only once the archive is complete.
    pub percent: f64,
    /// The entry just written, `None` for the final report.
    pub current_file: Option<String>,
}

/// Highest percentage reported before the end record is written.
const MAX_PARTIAL_PERCENT: f64 = 99.9;

struct ProgressReporter<'a> {
    estimated_total: u64,
    last_percent: f64,
    callback: &'a mut (dyn FnMut(Progress) + Send),
}

impl ProgressReporter<'_> {
    fn entry_written(&mut self, written: u64, name: &str) {
        let percent = (written as f64 * 100.0 / self.estimated_total.max(1) as f64)
            .min(MAX_PARTIAL_PERCENT)
            .max(self.last_percent);
        self.last_percent = percent;
        (self.callback)(Progress {
            percent,
            current_file: Some(name.to_string()),
        });
    }

    fn finish(&mut self) {
        self.last_percent = 100.0;
        (self.callback)(Progress {
            percent: 100.0,
            current_file: None,
        });
    }
}

impl ZipArchive {
    /// Serialize the entries of this view into a ZIP container.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn generate(&self, options: &GenerateOptions) -> Result<Vec<u8>> {
        self.generate_with_progress(options, |_| {}).await
    }

    /// Like [`generate`](Self::generate), returning the container as base64 text.
    pub async fn generate_base64(&self, options: &GenerateOptions) -> Result<String> {
        let bytes = self.generate(options).await?;
        Ok(encode_base64(&bytes))
    }

    /// Like [`generate`](Self::generate), invoking `on_progress` after every entry.
    pub async fn generate_with_progress<F>(
        &self,
        options: &GenerateOptions,
        mut on_progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(Progress) + Send,
    {
        let entries = self.snapshot();
        write_archive(entries, self.comment(), options, &mut on_progress).await
    }

    /// Like [`generate`](Self::generate), sending progress events to a channel.
    /// Events are dropped if the receiver has gone away.
    pub async fn generate_to_channel(
        &self,
        options: &GenerateOptions,
        progress: UnboundedSender<Progress>,
    ) -> Result<Vec<u8>> {
        self.generate_with_progress(options, move |event| {
            progress.send(event).ok();
        })
        .await
    }
}

fn compression_error(name: &str, message: impl ToString) -> ZipError {
    ZipError::Compression {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn codec_for(entry: &ZipEntry, options: &GenerateOptions) -> Compression {
    if entry.is_dir() {
        Compression::Store
    } else {
        entry.compression().unwrap_or(options.compression)
    }
}

/// Rough output size, assuming stored data; used only for progress.
fn estimate_size(entries: &[ZipEntry], options: &GenerateOptions, comment_len: usize) -> u64 {
    let per_entry: u64 = entries
        .iter()
        .map(|entry| {
            let name = entry.name().len() as u64 + 1;
            let descriptor = if options.stream_files { DataDescriptor::SIZE as u64 } else { 0 };
            let comment = entry.comment().map_or(0, str::len) as u64;
            LocalFileHeader::SIZE as u64
                + CentralDirectoryHeader::MIN_SIZE as u64
                + 2 * name
                + comment
                + descriptor
                + entry.content().len() as u64
        })
        .sum();
    per_entry + EndOfCentralDirectory::SIZE as u64 + comment_len as u64
}

/// 0xFFFF in the end record's entry counts marks a ZIP64 archive.
const MAX_ENTRIES: usize = u16::MAX as usize - 1;

pub(crate) async fn write_archive(
    entries: Vec<ZipEntry>,
    archive_comment: Option<String>,
    options: &GenerateOptions,
    on_progress: &mut (dyn FnMut(Progress) + Send),
) -> Result<Vec<u8>> {
    if entries.len() > MAX_ENTRIES {
        return Err(ZipError::Unsupported(format!(
            "{} entries require ZIP64",
            entries.len()
        )));
    }
    let comment = options
        .comment
        .clone()
        .or(archive_comment)
        .unwrap_or_default()
        .into_bytes();
    if comment.len() > u16::MAX as usize {
        return Err(ZipError::Unsupported(
            "archive comment longer than 65535 bytes".to_string(),
        ));
    }

    let estimated_total = estimate_size(&entries, options, comment.len());
    let mut reporter = ProgressReporter {
        estimated_total,
        last_percent: 0.0,
        callback: on_progress,
    };

    // Compression of independent entries runs ahead; results are consumed in order
    let jobs: Vec<_> = entries
        .iter()
        .map(|entry| {
            let codec = codec_for(entry, options);
            let level = options.compression_level;
            let content = entry.shared_content();
            tokio::task::spawn_blocking(move || codec.compress(&content, level))
        })
        .collect();

    let mut out = Vec::new();
    let mut central = Vec::with_capacity(entries.len());

    for (entry, job) in entries.iter().zip(jobs) {
        let compressed = job
            .await
            .map_err(|e| compression_error(entry.name(), e))?
            .map_err(|e| compression_error(entry.name(), e))?;

        let header = write_entry(&mut out, entry, &compressed, options)?;
        debug!(
            "wrote {:?}: {} -> {} bytes",
            entry.name(),
            header.uncompressed_size,
            header.compressed_size
        );
        central.push(header);

        reporter.entry_written(out.len() as u64, entry.name());
        tokio::task::yield_now().await;
    }

    let cd_offset = out.len() as u64;
    for header in &central {
        header
            .write_to(&mut out)
            .map_err(|e| compression_error("central directory", e))?;
    }
    let cd_size = out.len() as u64 - cd_offset;
    let cd_offset = fits_u32(cd_offset, "central directory offset")?;
    let cd_size = fits_u32(cd_size, "central directory size")?;

    let eocd = EndOfCentralDirectory {
        disk_number: 0,
        disk_with_cd: 0,
        disk_entries: central.len() as u16,
        total_entries: central.len() as u16,
        cd_size,
        cd_offset,
        comment_len: comment.len() as u16,
    };
    eocd.write_to(&mut out, &comment)
        .map_err(|e| compression_error("end of central directory", e))?;

    reporter.finish();
    Ok(out)
}

/// 0xFFFFFFFF is the ZIP64 sentinel, so it is out of range as well.
fn fits_u32(value: u64, what: &str) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if v != u32::MAX => Ok(v),
        _ => Err(ZipError::Unsupported(format!("{what} of {value} requires ZIP64"))),
    }
}

/// Append one entry's local header, data and optional descriptor to `out`,
/// returning the matching central directory record.
fn write_entry(
    out: &mut Vec<u8>,
    entry: &ZipEntry,
    compressed: &[u8],
    options: &GenerateOptions,
) -> Result<CentralDirectoryHeader> {
    let name = entry.name();
    let stored_name = if entry.is_dir() {
        format!("{name}/")
    } else {
        name.to_string()
    };

    let mut flags = 0;
    let file_name = match &options.encode_file_name {
        Some(encode) => encode(&stored_name),
        None => {
            if !stored_name.is_ascii() {
                flags |= FLAG_UTF8;
            }
            stored_name.into_bytes()
        }
    };
    if file_name.len() > u16::MAX as usize {
        return Err(ZipError::invalid_path(name, "file name longer than 65535 bytes"));
    }

    let comment = entry.comment().unwrap_or_default();
    if !comment.is_ascii() {
        flags |= FLAG_UTF8;
    }
    let comment = comment.as_bytes().to_vec();
    if comment.len() > u16::MAX as usize {
        return Err(ZipError::Unsupported(format!(
            "comment of {name:?} longer than 65535 bytes"
        )));
    }

    let offset = fits_u32(out.len() as u64, "local header offset")?;
    let crc32 = crc32fast::hash(entry.content());
    let uncompressed_size = fits_u32(entry.content().len() as u64, "uncompressed size")?;
    let compressed_size = fits_u32(compressed.len() as u64, "compressed size")?;

    let streamed = options.stream_files && !entry.is_dir();
    if streamed {
        flags |= FLAG_DATA_DESCRIPTOR;
    }

    let method = codec_for(entry, options).method();
    let modified = DosDateTime::from_datetime(&entry.last_modified());

    let local = LocalFileHeader {
        version_needed: VERSION_NEEDED,
        flags,
        compression_method: method,
        modified,
        crc32: if streamed { 0 } else { crc32 },
        compressed_size: if streamed { 0 } else { compressed_size },
        uncompressed_size: if streamed { 0 } else { uncompressed_size },
        file_name,
        extra_field: Vec::new(),
    };

    let write = |out: &mut Vec<u8>| -> io::Result<()> {
        local.write_to(out)?;
        out.extend_from_slice(compressed);
        if streamed {
            DataDescriptor {
                crc32,
                compressed_size,
                uncompressed_size,
            }
            .write_to(out)?;
        }
        Ok(())
    };
    write(out).map_err(|e| compression_error(name, e))?;

    let (version_made_by, external_attrs) = external_attributes(entry, options.platform);

    Ok(CentralDirectoryHeader {
        version_made_by,
        version_needed: VERSION_NEEDED,
        flags,
        compression_method: method,
        modified,
        crc32,
        compressed_size: compressed_size as u64,
        uncompressed_size: uncompressed_size as u64,
        file_name: local.file_name,
        extra_field: Vec::new(),
        comment,
        internal_attrs: 0,
        external_attrs,
        lfh_offset: offset as u64,
    })
}

/// Default unix modes: `drwxrwxr-x` for folders, `-rw-rw-r--` for files.
const UNIX_DIR_MODE: u32 = 0o40775;
const UNIX_FILE_MODE: u32 = 0o100664;

fn external_attributes(entry: &ZipEntry, platform: Platform) -> (u16, u32) {
    let dir_bit = if entry.is_dir() { DOS_DIRECTORY } else { 0 };
    match platform {
        Platform::Unix => {
            let default = if entry.is_dir() { UNIX_DIR_MODE } else { UNIX_FILE_MODE };
            let mode = entry.unix_permissions().unwrap_or(default) & 0xFFFF;
            (VERSION_MADE_BY_UNIX, (mode << 16) | dir_bit)
        }
        Platform::Dos => {
            let attrs = entry.dos_permissions().unwrap_or(0) as u32 & 0x3F;
            (VERSION_MADE_BY_DOS, attrs | dir_bit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::entry::EntryOptions;
    use crate::zip::parser::LoadOptions;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn fixed_options() -> EntryOptions {
        EntryOptions {
            date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    fn sample() -> ZipArchive {
        let zip = ZipArchive::new();
        zip.add_file("Hello.txt", "Hello World\n", fixed_options()).unwrap();
        zip.folder("images")
            .unwrap()
            .add_file("smile.gif", [0u8], fixed_options())
            .unwrap();
        zip.add_file("big.txt", "lorem ipsum ".repeat(500), fixed_options())
            .unwrap();
        zip
    }

    #[tokio::test]
    async fn empty_archive_is_just_an_end_record() {
        let bytes = ZipArchive::new()
            .generate(&GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&bytes[..4], EndOfCentralDirectory::SIGNATURE);
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn output_is_reproducible() {
        let zip = sample();
        let options = GenerateOptions {
            compression: Compression::Deflate,
            compression_level: 9,
            ..Default::default()
        };
        let a = zip.generate(&options).await.unwrap();
        let b = zip.generate(&options).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn entries_are_written_in_tree_order() {
        let bytes = sample().generate(&GenerateOptions::default()).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        let names: Vec<_> = loaded.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, ["Hello.txt", "images", "images/smile.gif", "big.txt"]);
    }

    #[tokio::test]
    async fn deflate_shrinks_repetitive_content() {
        let zip = sample();
        let stored = zip.generate(&GenerateOptions::default()).await.unwrap();
        let deflated = zip
            .generate(&GenerateOptions {
                compression: Compression::Deflate,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(deflated.len() < stored.len());

        let loaded = ZipArchive::load(deflated, &LoadOptions::default()).await.unwrap();
        let big = loaded.file("big.txt").unwrap();
        assert_eq!(big.text(), "lorem ipsum ".repeat(500));
        assert_eq!(big.compression(), None);
    }

    async fn stored_methods(bytes: Vec<u8>) -> Vec<(String, CompressionMethod)> {
        let parser = crate::zip::parser::ZipParser::new(Arc::new(bytes));
        let info = parser.directory_info().await.unwrap();
        parser
            .read_central_directory(&info)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (String::from_utf8(h.file_name).unwrap(), h.compression_method))
            .collect()
    }

    #[tokio::test]
    async fn entry_codec_overrides_archive_codec() {
        let zip = ZipArchive::new();
        let options = EntryOptions {
            compression: Some(Compression::Deflate),
            ..Default::default()
        };
        zip.add_file("packed.txt", "aaaa".repeat(100), options).unwrap();
        zip.add_file("plain.txt", "bbbb".repeat(100), EntryOptions::default())
            .unwrap();

        let bytes = zip.generate(&GenerateOptions::default()).await.unwrap();
        assert_eq!(
            stored_methods(bytes).await,
            [
                ("packed.txt".to_string(), CompressionMethod::Deflate),
                ("plain.txt".to_string(), CompressionMethod::Stored),
            ]
        );
    }

    #[tokio::test]
    async fn loaded_entries_follow_the_archive_codec() {
        let zip = ZipArchive::new();
        zip.add_file("notes.txt", "note ".repeat(100), fixed_options())
            .unwrap();
        let stored = zip.generate(&GenerateOptions::default()).await.unwrap();

        let loaded = ZipArchive::load(stored, &LoadOptions::default()).await.unwrap();
        let options = GenerateOptions {
            compression: Compression::Deflate,
            ..Default::default()
        };
        let regenerated = loaded.generate(&options).await.unwrap();
        assert_eq!(
            stored_methods(regenerated).await,
            [("notes.txt".to_string(), CompressionMethod::Deflate)]
        );
    }

    #[tokio::test]
    async fn streamed_entries_use_data_descriptors() {
        let zip = ZipArchive::new();
        zip.add_file("a.txt", "streamed", fixed_options()).unwrap();
        let options = GenerateOptions {
            stream_files: true,
            compression: Compression::Deflate,
            ..Default::default()
        };
        let bytes = zip.generate(&options).await.unwrap();

        let (local, _, _) = LocalFileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(local.flags & FLAG_DATA_DESCRIPTOR, FLAG_DATA_DESCRIPTOR);
        assert_eq!(local.crc32, 0);
        assert_eq!(local.compressed_size, 0);
        assert!(
            bytes
                .windows(4)
                .any(|window| window == DataDescriptor::SIGNATURE)
        );

        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert_eq!(loaded.file("a.txt").unwrap().text(), "streamed");
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let zip = sample();
        let mut events = Vec::new();
        zip.generate_with_progress(&GenerateOptions::default(), |p| events.push(p))
            .await
            .unwrap();

        assert_eq!(events.len(), zip.len() + 1);
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert!(events[..events.len() - 1].iter().all(|p| p.percent < 100.0));
        assert_eq!(events[0].current_file.as_deref(), Some("Hello.txt"));
        let last = events.last().unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.current_file, None);
    }

    #[tokio::test]
    async fn progress_can_be_consumed_from_a_channel() {
        let zip = sample();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        zip.generate_to_channel(&GenerateOptions::default(), tx)
            .await
            .unwrap();

        let mut files = Vec::new();
        while let Some(event) = rx.recv().await {
            files.push(event.current_file);
        }
        assert_eq!(files.len(), 5);
        assert_eq!(files[4], None);
    }

    #[tokio::test]
    async fn invalid_level_aborts_generation() {
        let zip = sample();
        let options = GenerateOptions {
            compression: Compression::Deflate,
            compression_level: 42,
            ..Default::default()
        };
        let seen = Mutex::new(0);
        let result = zip
            .generate_with_progress(&options, |_| *seen.lock().unwrap() += 1)
            .await;
        assert!(matches!(result, Err(ZipError::Compression { .. })));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unix_platform_records_permissions() {
        let zip = ZipArchive::new();
        let options = EntryOptions {
            unix_permissions: Some(0o100755),
            ..Default::default()
        };
        zip.add_file("run.sh", "#!/bin/sh\n", options).unwrap();
        zip.folder("lib").unwrap();

        let generate = GenerateOptions {
            platform: Platform::Unix,
            ..Default::default()
        };
        let bytes = zip.generate(&generate).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert_eq!(loaded.file("run.sh").unwrap().unix_permissions(), Some(0o100755));
        assert_eq!(loaded.get("lib").unwrap().unix_permissions(), Some(UNIX_DIR_MODE));
    }

    #[tokio::test]
    async fn dos_platform_records_attributes() {
        let zip = ZipArchive::new();
        let options = EntryOptions {
            dos_permissions: Some(0x01),
            unix_permissions: Some(0o100600),
            ..Default::default()
        };
        zip.add_file("readonly.txt", "r", options).unwrap();

        let bytes = zip.generate(&GenerateOptions::default()).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        let entry = loaded.file("readonly.txt").unwrap();
        assert_eq!(entry.dos_permissions(), Some(0x01));
        assert_eq!(entry.unix_permissions(), None);
    }

    #[tokio::test]
    async fn utf8_names_set_the_language_flag() {
        let zip = ZipArchive::new();
        zip.add_file("héllo.txt", "x", EntryOptions::default()).unwrap();
        let bytes = zip.generate(&GenerateOptions::default()).await.unwrap();
        let (local, _, _) = LocalFileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(local.flags & FLAG_UTF8, FLAG_UTF8);

        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert!(loaded.file("héllo.txt").is_some());
    }

    #[tokio::test]
    async fn custom_encoder_controls_stored_names() {
        let zip = ZipArchive::new();
        zip.add_file("name.txt", "x", EntryOptions::default()).unwrap();
        let options = GenerateOptions {
            encode_file_name: Some(Arc::new(|name: &str| name.to_uppercase().into_bytes())),
            ..Default::default()
        };
        let bytes = zip.generate(&options).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert!(loaded.file("NAME.TXT").is_some());
    }

    #[tokio::test]
    async fn comments_and_dates_survive() {
        let zip = ZipArchive::new();
        let options = EntryOptions {
            comment: Some("entry note".to_string()),
            ..fixed_options()
        };
        zip.add_file("c.txt", "c", options).unwrap();
        let generate = GenerateOptions {
            comment: Some("archive note".to_string()),
            ..Default::default()
        };
        let bytes = zip.generate(&generate).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();

        assert_eq!(loaded.comment().as_deref(), Some("archive note"));
        let entry = loaded.file("c.txt").unwrap();
        assert_eq!(entry.comment(), Some("entry note"));
        assert_eq!(
            entry.last_modified(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );

        // The loaded comment is reused when none is given
        let again = loaded.generate(&GenerateOptions::default()).await.unwrap();
        assert!(again.ends_with(b"archive note"));
    }

    #[tokio::test]
    async fn generating_a_view_roots_the_archive_there() {
        let zip = sample();
        let images = zip.folder("images").unwrap();
        let bytes = images.generate(&GenerateOptions::default()).await.unwrap();
        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        let names: Vec<_> = loaded.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, ["smile.gif"]);
    }

    #[tokio::test]
    async fn entry_count_sentinel_is_rejected() {
        let entry = ZipEntry::new_file("a.txt", "a", &EntryOptions::default()).unwrap();
        let entries = vec![entry; u16::MAX as usize];
        let result = write_archive(entries, None, &GenerateOptions::default(), &mut |_: Progress| {}).await;
        assert!(matches!(result, Err(ZipError::Unsupported(_))));
    }

    #[tokio::test]
    async fn largest_classic_archive_loads_back() {
        let flat = EntryOptions {
            create_folders: false,
            ..Default::default()
        };
        let entries: Vec<_> = (0..MAX_ENTRIES)
            .map(|i| ZipEntry::new_file(&format!("f{i}"), Vec::new(), &flat).unwrap())
            .collect();
        let bytes = write_archive(entries, None, &GenerateOptions::default(), &mut |_: Progress| {})
            .await
            .unwrap();

        let loaded = ZipArchive::load(bytes, &LoadOptions::default()).await.unwrap();
        assert_eq!(loaded.len(), MAX_ENTRIES);
    }

    #[test]
    fn u32_sentinel_needs_zip64() {
        assert_eq!(fits_u32(u32::MAX as u64 - 1, "size").unwrap(), u32::MAX - 1);
        assert!(matches!(fits_u32(u32::MAX as u64, "size"), Err(ZipError::Unsupported(_))));
    }

    #[tokio::test]
    async fn base64_output_round_trips() {
        let zip = sample();
        let text = zip.generate_base64(&GenerateOptions::default()).await.unwrap();
        assert!(text.is_ascii());

        let options = LoadOptions {
            base64: true,
            ..Default::default()
        };
        let loaded = ZipArchive::load(text, &options).await.unwrap();
        assert_eq!(loaded.len(), zip.len());
    }
}
