//Enable more cargo lint tests
#![warn(rust_2018_idioms)]
#![warn(clippy::disallowed_types)]

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, LevelFilter};
use simplelog::{Config, TermLogger, TerminalMode};

use mhar::compression::compress::{compress_file, compression_ratio, default_output_path, file_len};
use mhar::compression::decompress::decompress_file;
use mhar::container::archive::{create_archive_file, ArchiveReader, ArchiveSource};
use mhar::container::folder::{create_folder_archive, write_folder_stream_file};
use mhar::tools::cli::{cli_init, CodecOptions, Command, CompressOptions, DecompressOptions};
use mhar::tools::control::{CancelToken, Control, PauseGate};
use mhar::Result;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() {
    // Available log levels are Error, Warn, Info, Debug, Trace
    TermLogger::init(
        LevelFilter::Trace,
        Config::default(),
        TerminalMode::Stdout,
        simplelog::ColorChoice::AlwaysAnsi,
    )
    .unwrap();

    let cli = cli_init();

    // Progress goes to the terminal on one line
    let sink = |percent: u8, status: &str| {
        print!("\r{:>3}% {:<24}", percent, status);
        if percent >= 100 {
            println!();
        }
        let _ = io::stdout().flush();
    };
    let ctl = Control::new(Arc::new(sink), PauseGate::new(), CancelToken::new());

    //----- Figure what we need to do and go do it
    if let Err(e) = run(cli.command, &ctl) {
        // Logging is off unless -v was given, so failures always reach stderr
        eprintln!("mhar: {}", e);
        std::process::exit(1);
    }
    info!("Done.\n");
}

fn run(command: Command, ctl: &Control) -> Result<()> {
    match command {
        Command::Compress {
            input,
            output,
            codec,
            password,
        } => {
            let options = CompressOptions {
                codec: CodecOptions::from(&codec),
                password,
                extension: String::new(),
            };
            let output = output.unwrap_or_else(|| default_output_path(&input, codec.algorithm));
            let totals = compress_file(&input, &output, &options, ctl)?;
            println!(
                "Compressed {} -> {} ({:.1}% saved)",
                input.display(),
                output.display(),
                compression_ratio(totals.input, totals.output)
            );
        }
        Command::Decompress {
            input,
            output,
            algorithm,
            password,
        } => {
            let output = output.unwrap_or_else(|| strip_container_extension(&input));
            let options = DecompressOptions {
                algorithm,
                password,
            };
            let written = decompress_file(&input, &output, &options, ctl)?;
            println!("Restored {}", written.display());
        }
        Command::Archive {
            output,
            files,
            codec,
            password,
        } => {
            let sources = files
                .iter()
                .map(ArchiveSource::from_path)
                .collect::<Result<Vec<_>>>()?;
            let options = CompressOptions {
                codec: CodecOptions::from(&codec),
                password,
                extension: String::new(),
            };
            let summary = create_archive_file(&output, &sources, &options, ctl)?;
            println!(
                "Archive created with {} entries ({:.1}% saved)",
                summary.entries.len(),
                summary.ratio()
            );
        }
        Command::Folder {
            folder,
            output,
            codec,
            password,
            stream,
        } => {
            let options = CompressOptions {
                codec: CodecOptions::from(&codec),
                password,
                extension: String::new(),
            };
            let ratio = if stream {
                write_folder_stream_file(&folder, &output, &options, ctl)?.ratio()
            } else {
                create_folder_archive(&folder, &output, &options, ctl)?.ratio()
            };
            println!("Folder compressed ({:.1}% saved)", ratio);
        }
        Command::List { archive } => {
            let reader = ArchiveReader::open(File::open(&archive)?)?;
            println!(
                "{} ({}, {}):",
                archive.display(),
                reader.algorithm(),
                if reader.is_protected() { "password protected" } else { "open" }
            );
            for entry in reader.entries() {
                println!("{:>12}  {}", entry.length, entry.name);
            }
            info!("Archive size {} bytes.", file_len(&archive)?);
        }
        Command::Extract {
            archive,
            name,
            output,
            password,
        } => {
            let mut reader = ArchiveReader::open(File::open(&archive)?)?;
            // Entry names use '/', so keep only the last part for the default output
            let output = output.unwrap_or_else(|| PathBuf::from(name.rsplit('/').next().unwrap_or(&name)));
            let written = reader.extract_to_file(&name, password.as_deref(), &output, ctl)?;
            println!("Extracted {} bytes to {}", written, output.display());
        }
    }
    Ok(())
}

/// Drop the container extension, so report.txt.huff becomes report.txt.
fn strip_container_extension(input: &Path) -> PathBuf {
    input.with_extension("")
}
