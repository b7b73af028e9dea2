//! Main entry point for the bufzip CLI application.
//!
//! Loads a ZIP archive from the local filesystem or an HTTP URL into memory,
//! then lists, tests or extracts its entries.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use bufzip::cli::format_size;
use bufzip::{
    Archive, ArchiveSource, Cli, EntryDescriptor, HttpSource, LocalFileSource, ReadOptions,
};

/// Application entry point.
///
/// Parses command-line arguments, loads the archive bytes from the selected
/// source and dispatches to the requested mode.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let bytes = if cli.is_http_url() {
        let source = HttpSource::new(cli.file.clone())?.with_max_attempts(cli.retries);
        let bytes = load(&source).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            eprintln!(
                "Total bytes transferred: {}",
                format_size(source.transferred_bytes())
            );
        }
        bytes
    } else {
        load(&LocalFileSource::new(&cli.file)).await?
    };

    // Unlike the library default, the CLI always checks entry CRCs.
    let options = ReadOptions::new().with_verify_crc(true);
    let mut archive = Archive::open_with(bytes, options)
        .with_context(|| format!("cannot open {} as a zip archive", cli.file))?;

    let result = process_zip(&archive, &cli).await;
    archive.close();
    result
}

async fn load<S: ArchiveSource>(source: &S) -> Result<Vec<u8>> {
    log::info!("loading archive from {}", source.location());
    source.load().await
}

/// Process a ZIP archive based on CLI options.
///
/// - List mode (`-l` or `-v`): Display archive contents
/// - Test mode (`-t`): Decode every selected entry and check its CRC
/// - Extract mode: Extract files matching the specified filters
async fn process_zip(archive: &Archive, cli: &Cli) -> Result<()> {
    if cli.list || cli.verbose {
        return list_files(archive, cli.verbose);
    }

    if !cli.is_quiet() {
        println!("Archive:  {}", cli.file);
    }

    if cli.test {
        return test_files(archive, cli);
    }

    // Directories are skipped; they are created on demand for their files.
    let selected: Vec<(u64, &EntryDescriptor)> = archive
        .entries()?
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_directory && cli.selects(&e.name))
        .map(|(index, e)| (index as u64, e))
        .collect();

    let multiple_files = cli.pipe && selected.len() > 1;
    for (index, entry) in selected {
        extract_file(archive, index, entry, cli, multiple_files).await?;
    }

    Ok(())
}

/// Print the archive index, either one name per line (`-l`) or as an
/// `unzip -v` style table followed by totals and the archive comment.
fn list_files(archive: &Archive, verbose: bool) -> Result<()> {
    let entries = archive.entries()?;

    if !verbose {
        entries.iter().for_each(|entry| println!("{}", entry.name));
        return Ok(());
    }

    let rule = "-".repeat(80);
    println!(
        "{:>10}  {:<6}  {:>10}  {:>4}  {:>10}  {:>5}  {:>8}  Name",
        "Length", "Method", "Size", "Cmpr", "Date", "Time", "CRC-32"
    );
    println!("{rule}");

    for entry in entries {
        println!("{}", listing_row(entry));
    }

    let (length, size, count) = listing_totals(entries);

    println!("{rule}");
    println!(
        "{:>10}  {:<6}  {:>10}  {}  {:>29}  {} files",
        length,
        "",
        size,
        ratio(size, length),
        "",
        count
    );

    let comment = archive.comment()?;
    if !comment.is_empty() {
        println!("{comment}");
    }

    Ok(())
}

/// Uncompressed bytes, compressed bytes and file count. Directories are
/// listed but not counted.
fn listing_totals(entries: &[EntryDescriptor]) -> (u64, u64, usize) {
    entries
        .iter()
        .filter(|entry| !entry.is_directory)
        .fold((0u64, 0u64, 0usize), |(length, size, count), entry| {
            (
                length.saturating_add(entry.uncompressed_size),
                size.saturating_add(entry.compressed_size),
                count + 1,
            )
        })
}

fn listing_row(entry: &EntryDescriptor) -> String {
    let (year, month, day) = entry.mod_date();
    let (hour, minute, _) = entry.mod_time();
    format!(
        "{:>10}  {:<6}  {:>10}  {}  {year:04}-{month:02}-{day:02}  {hour:02}:{minute:02}  {:08x}  {}",
        entry.uncompressed_size,
        entry.compression_method.label(),
        entry.compressed_size,
        ratio(entry.compressed_size, entry.uncompressed_size),
        entry.crc32,
        entry.name
    )
}

/// Space saved by compression, as a right-aligned percentage.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    match (compressed as u128 * 100).checked_div(uncompressed as u128) {
        Some(kept) if kept <= 100 => format!("{:>3}%", 100 - kept),
        _ => "  0%".to_string(),
    }
}

/// Decode every selected entry and report CRC or format errors.
fn test_files(archive: &Archive, cli: &Cli) -> Result<()> {
    let mut failures = 0usize;

    for (index, entry) in archive.entries()?.iter().enumerate() {
        if !cli.selects(&entry.name) {
            continue;
        }
        match archive.extract(index as u64) {
            Ok(_) => {
                if !cli.is_quiet() {
                    println!("    testing: {:<40}  OK", entry.name);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("    testing: {:<40}  {}", entry.name, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} error(s) detected in {}", failures, cli.file);
    }
    if !cli.is_very_quiet() {
        println!("No errors detected in compressed data of {}.", cli.file);
    }
    Ok(())
}

/// Extract a single file from the archive.
///
/// Handles various extraction options:
/// - Pipe mode (`-p`): Write to stdout instead of file
/// - Custom output directory (`-d`): Extract to specified directory
/// - Junk paths (`-j`): Ignore directory structure in archive
/// - Overwrite control (`-n`, `-o`): Handle existing files
async fn extract_file(
    archive: &Archive,
    index: u64,
    entry: &EntryDescriptor,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    // Pipe mode: write file contents directly to stdout
    if cli.pipe {
        let extracted = archive
            .extract(index)
            .with_context(|| format!("cannot extract {}", entry.name))?;
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", entry.name).as_bytes())
                .await?;
        }
        stdout
            .write_all(extracted.content.as_deref().unwrap_or_default())
            .await?;
        stdout.flush().await?;
        return Ok(());
    }

    let Some(output_path) = cli.output_path(&entry.name) else {
        if !cli.is_quiet() {
            eprintln!("Skipping: {} (unsafe path)", entry.name);
        }
        return Ok(());
    };

    // Handle existing files based on overwrite options
    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  inflating: {}", output_path.display());
    }

    let extracted = archive
        .extract(index)
        .with_context(|| format!("cannot extract {}", entry.name))?;
    write_output(&output_path, extracted.content.as_deref().unwrap_or_default()).await
}

async fn write_output(output_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut file = tokio::fs::File::create(output_path)
        .await
        .with_context(|| format!("cannot create {}", output_path.display()))?;
    file.write_all(content).await?;
    file.flush().await?;

    Ok(())
}
