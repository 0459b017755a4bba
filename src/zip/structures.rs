//! On-disk ZIP records.
//!
//! Every record can be decoded from a byte slice and the ones this crate
//! emits can be encoded into any [`Write`] sink. All integers are
//! little-endian.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::error::{Result, ZipError};

/// Version needed to extract: 2.0 (deflate, folders).
pub const VERSION_NEEDED: u16 = 20;
/// "Version made by" for DOS hosts.
pub const VERSION_MADE_BY_DOS: u16 = 0x0014;
/// "Version made by" for UNIX hosts (host byte 3, APPNOTE 3.0).
pub const VERSION_MADE_BY_UNIX: u16 = 0x031E;

pub const HOST_DOS: u8 = 0;
pub const HOST_UNIX: u8 = 3;

/// General purpose flag: sizes and CRC follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: file name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// DOS directory attribute bit in the external attributes.
pub const DOS_DIRECTORY: u32 = 0x10;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// MS-DOS packed modification time and date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    pub fn from_datetime(value: &DateTime<Utc>) -> Self {
        if value.year() < 1980 {
            return Self::EPOCH;
        }
        if value.year() > 2107 {
            return DosDateTime {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }

        let date = (((value.year() - 1980) as u16) << 9)
            | ((value.month() as u16) << 5)
            | value.day() as u16;
        let time = ((value.hour() as u16) << 11)
            | ((value.minute() as u16) << 5)
            | (value.second() as u16 / 2);
        DosDateTime { time, date }
    }

    /// Returns `None` for field combinations that are not a real date.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let (year, month, day) = self.date_parts();
        let (hour, minute, second) = self.time_parts();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?
            .and_hms_opt(hour as u32, minute as u32, second as u32)
            .map(|naive| naive.and_utc())
    }

    /// Parse modification date to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

fn truncated(record: &'static str) -> impl FnOnce(io::Error) -> ZipError {
    move |_| ZipError::malformed(format!("truncated {record}"))
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    /// Decode the fixed part of a header. Name and extra field are left empty;
    /// their lengths are returned alongside.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, u16, u16)> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid local file header"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let read = |cursor: &mut Cursor<&[u8]>| -> io::Result<(Self, u16, u16)> {
            let version_needed = cursor.read_u16::<LittleEndian>()?;
            let flags = cursor.read_u16::<LittleEndian>()?;
            let compression_method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?);
            let time = cursor.read_u16::<LittleEndian>()?;
            let date = cursor.read_u16::<LittleEndian>()?;
            let crc32 = cursor.read_u32::<LittleEndian>()?;
            let compressed_size = cursor.read_u32::<LittleEndian>()?;
            let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
            let name_len = cursor.read_u16::<LittleEndian>()?;
            let extra_len = cursor.read_u16::<LittleEndian>()?;
            let header = LocalFileHeader {
                version_needed,
                flags,
                compression_method,
                modified: DosDateTime { time, date },
                crc32,
                compressed_size,
                uncompressed_size,
                file_name: Vec::new(),
                extra_field: Vec::new(),
            };
            Ok((header, name_len, extra_len))
        };
        read(&mut cursor).map_err(truncated("local file header"))
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        w.write_u16::<LittleEndian>(self.extra_field.len() as u16)?;
        w.write_all(&self.file_name)?;
        w.write_all(&self.extra_field)
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_field.len()
    }
}

/// Trailing sizes and CRC for entries written in streaming mode.
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub const SIGNATURE: &'static [u8] = b"PK\x07\x08";
    pub const SIZE: usize = 16;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub comment: Vec<u8>,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u64,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    /// Parse one header from a cursor positioned at its signature.
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut sig = [0u8; 4];
        cursor
            .read_exact(&mut sig)
            .map_err(truncated("central directory"))?;
        if sig != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid central directory file header"));
        }
        Self::read_fields(cursor).map_err(truncated("central directory file header"))
    }

    fn read_fields(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let time = cursor.read_u16::<LittleEndian>()?;
        let date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name)?;
        let mut extra_field = vec![0u8; extra_field_length as usize];
        cursor.read_exact(&mut extra_field)?;
        let mut comment = vec![0u8; file_comment_length as usize];
        cursor.read_exact(&mut comment)?;

        // ZIP64 extended information (0x0001) only carries the fields whose
        // 32-bit slot is saturated, in this fixed order.
        let mut extra = Cursor::new(extra_field.as_slice());
        while extra.position() + 4 <= extra_field.len() as u64 {
            let header_id = extra.read_u16::<LittleEndian>()?;
            let field_size = extra.read_u16::<LittleEndian>()? as u64;
            let field_end = extra.position() + field_size;

            if header_id == 0x0001 {
                if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    uncompressed_size = extra.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    compressed_size = extra.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                    lfh_offset = extra.read_u64::<LittleEndian>()?;
                }
            }
            extra.set_position(field_end);
        }

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
            comment,
            internal_attrs,
            external_attrs,
            lfh_offset,
        })
    }

    /// Sizes and offset must already fit in 32 bits.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size as u32)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        w.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        w.write_u16::<LittleEndian>(self.extra_field.len() as u16)?;
        w.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(self.internal_attrs)?;
        w.write_u32::<LittleEndian>(self.external_attrs)?;
        w.write_u32::<LittleEndian>(self.lfh_offset as u32)?;
        w.write_all(&self.file_name)?;
        w.write_all(&self.extra_field)?;
        w.write_all(&self.comment)
    }

    pub fn encoded_len(&self) -> usize {
        Self::MIN_SIZE + self.file_name.len() + self.extra_field.len() + self.comment.len()
    }

    /// Host system byte of "version made by".
    pub fn host(&self) -> u8 {
        (self.version_made_by >> 8) as u8
    }

    pub fn is_directory(&self) -> bool {
        self.file_name.last() == Some(&b'/')
            || (self.host() == HOST_DOS && self.external_attrs & DOS_DIRECTORY != 0)
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let read = |cursor: &mut Cursor<&[u8]>| -> io::Result<Self> {
            Ok(Self {
                disk_number: cursor.read_u16::<LittleEndian>()?,
                disk_with_cd: cursor.read_u16::<LittleEndian>()?,
                disk_entries: cursor.read_u16::<LittleEndian>()?,
                total_entries: cursor.read_u16::<LittleEndian>()?,
                cd_size: cursor.read_u32::<LittleEndian>()?,
                cd_offset: cursor.read_u32::<LittleEndian>()?,
                comment_len: cursor.read_u16::<LittleEndian>()?,
            })
        };
        read(&mut cursor).map_err(truncated("end of central directory"))
    }

    /// Writes the record followed by `comment`, whose length must match `comment_len`.
    pub fn write_to<W: Write>(&self, w: &mut W, comment: &[u8]) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.disk_number)?;
        w.write_u16::<LittleEndian>(self.disk_with_cd)?;
        w.write_u16::<LittleEndian>(self.disk_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(self.comment_len)?;
        w.write_all(comment)
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid ZIP64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let read = |cursor: &mut Cursor<&[u8]>| -> io::Result<Self> {
            Ok(Self {
                disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
                eocd64_offset: cursor.read_u64::<LittleEndian>()?,
                total_disks: cursor.read_u32::<LittleEndian>()?,
            })
        };
        read(&mut cursor).map_err(truncated("ZIP64 locator"))
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::malformed("invalid ZIP64 end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let read = |cursor: &mut Cursor<&[u8]>| -> io::Result<Self> {
            Ok(Self {
                eocd64_size: cursor.read_u64::<LittleEndian>()?,
                version_made_by: cursor.read_u16::<LittleEndian>()?,
                version_needed: cursor.read_u16::<LittleEndian>()?,
                disk_number: cursor.read_u32::<LittleEndian>()?,
                disk_with_cd: cursor.read_u32::<LittleEndian>()?,
                disk_entries: cursor.read_u64::<LittleEndian>()?,
                total_entries: cursor.read_u64::<LittleEndian>()?,
                cd_size: cursor.read_u64::<LittleEndian>()?,
                cd_offset: cursor.read_u64::<LittleEndian>()?,
            })
        };
        read(&mut cursor).map_err(truncated("ZIP64 end of central directory"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dos_datetime_packs_fields() {
        let when = Utc.with_ymd_and_hms(2020, 6, 15, 13, 45, 31).unwrap();
        let dos = DosDateTime::from_datetime(&when);
        assert_eq!(dos.date_parts(), (2020, 6, 15));
        // DOS time has two-second resolution
        assert_eq!(dos.time_parts(), (13, 45, 30));
        assert_eq!(
            dos.to_datetime(),
            Some(Utc.with_ymd_and_hms(2020, 6, 15, 13, 45, 30).unwrap())
        );
    }

    #[test]
    fn dos_datetime_clamps_before_1980() {
        let when = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(DosDateTime::from_datetime(&when), DosDateTime::EPOCH);
        assert_eq!(DosDateTime { time: 0, date: 0 }.to_datetime(), None);
    }

    #[test]
    fn central_directory_header_decodes_what_it_encodes() {
        let header = CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY_UNIX,
            version_needed: VERSION_NEEDED,
            flags: FLAG_UTF8,
            compression_method: CompressionMethod::Deflate,
            modified: DosDateTime::EPOCH,
            crc32: 0xDEADBEEF,
            compressed_size: 10,
            uncompressed_size: 20,
            file_name: b"dir/file.txt".to_vec(),
            extra_field: Vec::new(),
            comment: b"note".to_vec(),
            internal_attrs: 0,
            external_attrs: 0o100644 << 16,
            lfh_offset: 1234,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), header.encoded_len());

        let parsed = CentralDirectoryHeader::parse(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(parsed.file_name, b"dir/file.txt");
        assert_eq!(parsed.comment, b"note");
        assert_eq!(parsed.crc32, 0xDEADBEEF);
        assert_eq!(parsed.lfh_offset, 1234);
        assert_eq!(parsed.host(), HOST_UNIX);
        assert!(!parsed.is_directory());
    }

    #[test]
    fn zip64_extra_field_overrides_saturated_sizes() {
        let mut extra = Vec::new();
        extra.write_u16::<LittleEndian>(0x0001).unwrap();
        extra.write_u16::<LittleEndian>(16).unwrap();
        extra.write_u64::<LittleEndian>(5_000_000_000).unwrap();
        extra.write_u64::<LittleEndian>(4_900_000_000).unwrap();

        let header = CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY_DOS,
            version_needed: 45,
            flags: 0,
            compression_method: CompressionMethod::Deflate,
            modified: DosDateTime::EPOCH,
            crc32: 0,
            compressed_size: 0xFFFFFFFF,
            uncompressed_size: 0xFFFFFFFF,
            file_name: b"big.bin".to_vec(),
            extra_field: extra,
            comment: Vec::new(),
            internal_attrs: 0,
            external_attrs: 0,
            lfh_offset: 0,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        let parsed = CentralDirectoryHeader::parse(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(parsed.uncompressed_size, 5_000_000_000);
        assert_eq!(parsed.compressed_size, 4_900_000_000);
    }

    #[test]
    fn eocd_rejects_bad_signature() {
        let mut record = vec![0u8; EndOfCentralDirectory::SIZE];
        record[..4].copy_from_slice(b"PK\x01\x02");
        assert!(matches!(
            EndOfCentralDirectory::from_bytes(&record),
            Err(ZipError::MalformedArchive(_))
        ));
    }
}
