use clap::Parser;

use crate::zip::{Compression, DEFAULT_LEVEL, GenerateOptions, LoadOptions, Platform};

#[derive(Parser, Debug)]
#[command(name = "ziptree")]
#[command(version)]
#[command(about = "List, extract and create ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  ziptree data.zip -d out        extract everything from data.zip into out/\n  \
  ziptree -v data.zip            list data.zip with sizes and dates\n  \
  ziptree -c photos photos.zip   pack the photos directory into photos.zip")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: String,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Create FILE from the contents of DIR
    #[arg(short = 'c', value_name = "DIR", conflicts_with_all = ["list", "verbose", "extract_dir"])]
    pub create_from: Option<String>,

    /// Deflate level used when creating
    #[arg(long, value_name = "0-9", default_value_t = DEFAULT_LEVEL,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: u32,

    /// Store files without compression when creating
    #[arg(long)]
    pub store: bool,

    /// Write data descriptors after each file when creating
    #[arg(long)]
    pub stream: bool,

    /// Record unix permissions instead of DOS attributes when creating
    #[arg(long)]
    pub unix: bool,

    /// Archive comment when creating
    #[arg(short = 'z', value_name = "COMMENT")]
    pub comment: Option<String>,

    /// Skip CRC-32 verification when reading
    #[arg(long)]
    pub no_crc: bool,

    /// Quiet mode
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    pub fn is_listing(&self) -> bool {
        self.list || self.verbose
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            check_crc32: !self.no_crc,
            ..LoadOptions::default()
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            compression: if self.store {
                Compression::Store
            } else {
                Compression::Deflate
            },
            compression_level: self.level,
            comment: self.comment.clone(),
            stream_files: self.stream,
            platform: if self.unix { Platform::Unix } else { Platform::Dos },
            ..GenerateOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_flags_map_to_generate_options() {
        let cli = Cli::parse_from([
            "ziptree", "-c", "dir", "--store", "--stream", "--unix", "-z", "hi", "out.zip",
        ]);
        assert_eq!(cli.create_from.as_deref(), Some("dir"));
        let options = cli.generate_options();
        assert_eq!(options.compression, Compression::Store);
        assert!(options.stream_files);
        assert_eq!(options.platform, Platform::Unix);
        assert_eq!(options.comment.as_deref(), Some("hi"));
    }

    #[test]
    fn defaults_deflate_and_check_crc() {
        let cli = Cli::parse_from(["ziptree", "a.zip"]);
        assert!(!cli.is_listing());
        assert_eq!(cli.generate_options().compression, Compression::Deflate);
        assert_eq!(cli.generate_options().compression_level, DEFAULT_LEVEL);
        assert!(cli.load_options().check_crc32);
        assert!(!Cli::parse_from(["ziptree", "--no-crc", "a.zip"]).load_options().check_crc32);
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["ziptree", "--level", "10", "a.zip"]).is_err());
    }
}
