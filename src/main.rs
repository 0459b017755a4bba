//! Main entry point for the ziptree CLI application.
//!
//! Lists, extracts and creates ZIP archives on the local filesystem.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use ziptree::{Cli, Filesystem, LocalFs, ZipArchive};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Some(ref dir) = cli.create_from {
        return create_archive(Path::new(dir), &cli).await;
    }

    let archive = ZipArchive::read_file(&cli.file, &cli.load_options())
        .await
        .with_context(|| format!("cannot read {}", cli.file))?;

    if cli.is_listing() {
        list_files(&archive, cli.verbose);
        return Ok(());
    }

    extract_all(&archive, &cli).await
}

/// Print the archive contents, one entry per line.
///
/// The verbose format adds size and modification time columns and a
/// summary line.
fn list_files(archive: &ZipArchive, verbose: bool) {
    if let Some(comment) = archive.comment() {
        println!("{comment}");
    }

    if verbose {
        println!("{:>10}  {:>10}  {:>5}  Name", "Length", "Date", "Time");
        println!("{}", "-".repeat(50));
    }

    let mut total = 0u64;
    let mut file_count = 0usize;

    for entry in archive {
        let name = if entry.is_dir() {
            format!("{}/", entry.name())
        } else {
            entry.name().to_string()
        };

        if verbose {
            let modified = entry.last_modified();
            println!(
                "{:>10}  {}  {}  {}",
                entry.content().len(),
                modified.format("%Y-%m-%d"),
                modified.format("%H:%M"),
                name
            );
            if !entry.is_dir() {
                total += entry.content().len() as u64;
                file_count += 1;
            }
        } else {
            println!("{name}");
        }
    }

    if verbose {
        println!("{}", "-".repeat(50));
        println!("{:>10}  {:>17}  {} files", total, "", file_count);
    }
}

/// Write every entry below the `-d` directory, or the current directory.
async fn extract_all(archive: &ZipArchive, cli: &Cli) -> Result<()> {
    let destination = cli.extract_dir.as_deref().unwrap_or(".");

    if !cli.quiet {
        println!("Archive:  {}", cli.file);
        for entry in archive.iter().filter(|e| !e.is_dir()) {
            println!("  extracting: {}", entry.name());
        }
    }

    archive
        .unzip(destination)
        .await
        .with_context(|| format!("cannot extract into {destination}"))?;

    Ok(())
}

/// Pack `dir` into the archive named on the command line.
async fn create_archive(dir: &Path, cli: &Cli) -> Result<()> {
    let archive = ZipArchive::zip_dir(dir)
        .await
        .with_context(|| format!("cannot read directory {}", dir.display()))?;

    let quiet = cli.quiet;
    let bytes = archive
        .generate_with_progress(&cli.generate_options(), |progress| {
            if quiet {
                return;
            }
            let mut stderr = std::io::stderr();
            let _ = match progress.current_file {
                Some(name) => write!(stderr, "\r\x1b[K{:5.1}%  {}", progress.percent, name),
                None => writeln!(stderr, "\r\x1b[K{:5.1}%", progress.percent),
            };
        })
        .await?;

    LocalFs
        .write_file(Path::new(&cli.file), Arc::from(bytes.as_slice()))
        .await
        .with_context(|| format!("cannot write {}", cli.file))?;

    if !cli.quiet {
        eprintln!(
            "{} entries, {} written to {}",
            archive.len(),
            format_size(bytes.len() as u64),
            cli.file
        );
    }

    Ok(())
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
