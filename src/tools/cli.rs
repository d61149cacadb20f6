use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use clap::{ArgEnum, Parser, Subcommand};
use log::info;

use crate::error::Result;

/// Default chunk size: 1 MiB of input per coded block.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Define the two entropy coders
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ArgEnum)]
pub enum Algorithm {
    /// Optimal prefix codes from a Huffman tree
    Huffman,
    /// Codes from recursive median splitting; simpler, not always optimal
    ShannonFano,
}

impl Algorithm {
    /// Tag byte that opens every Shannon-Fano block. Huffman blocks carry no tag.
    pub fn tag(self) -> u8 {
        match self {
            Algorithm::Huffman => 0x00,
            Algorithm::ShannonFano => 0x01,
        }
    }

    /// Four byte magic identifying a multi-file archive made with this coder.
    pub fn magic(self) -> &'static [u8; 4] {
        match self {
            Algorithm::Huffman => b"MHAR",
            Algorithm::ShannonFano => b"MSFR",
        }
    }

    pub fn from_magic(magic: &[u8; 4]) -> Option<Self> {
        [Algorithm::Huffman, Algorithm::ShannonFano]
            .into_iter()
            .find(|a| a.magic() == magic)
    }

    /// Default file extension for single-file containers.
    pub fn extension(self) -> &'static str {
        match self {
            Algorithm::Huffman => "huff",
            Algorithm::ShannonFano => "shanf",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Huffman
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How coded streams are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Coder used for every block
    pub algorithm: Algorithm,
    /// Maximum input bytes per block
    pub chunk_size: usize,
}

impl CodecOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Block counts are stored as int32, so a chunk can hold at most i32::MAX bytes.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > i32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk size {} is outside 1..={}", self.chunk_size, i32::MAX),
            )
            .into());
        }
        Ok(())
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::new(Algorithm::default())
    }
}

/// Settings for creating a single-file container or an archive.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    pub codec: CodecOptions,
    /// Optional password; an empty string means no password
    pub password: Option<String>,
    /// Original file extension (with its dot) recorded in single-file containers
    pub extension: String,
}

impl CompressOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            codec: CodecOptions::new(algorithm),
            ..Self::default()
        }
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Settings for opening a single-file container.
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    pub algorithm: Algorithm,
    pub password: Option<String>,
}

impl DecompressOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            password: None,
        }
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Command Line Interpretation - uses external CLAP crate.
#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Huffman and Shannon-Fano file compressor and archiver",
    long_about = "
    Compresses single files into containers that remember the original extension, or
    many files into an archive with an index for extracting one entry at a time.
    Either coder can be chosen. A password only gates extraction; data is not encrypted."
)]
pub struct Cli {
    /// Sets verbosity. Quiet by default, -v shows errors, -vvvvv is chatty
    #[clap(short = 'v', parse(from_occurrences), global = true)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

/// Coder selection shared by the commands that write data.
#[derive(clap::Args, Debug, Clone)]
pub struct CodecArgs {
    /// Entropy coder
    #[clap(short, long, arg_enum, default_value = "huffman")]
    pub algorithm: Algorithm,

    /// Input bytes per coded block
    #[clap(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

impl From<&CodecArgs> for CodecOptions {
    fn from(args: &CodecArgs) -> Self {
        Self {
            algorithm: args.algorithm,
            chunk_size: args.chunk_size,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress one file into a single-file container
    Compress {
        input: PathBuf,
        /// Output path (default: input with the coder's extension added)
        #[clap(short, long)]
        output: Option<PathBuf>,
        #[clap(flatten)]
        codec: CodecArgs,
        #[clap(short, long)]
        password: Option<String>,
    },
    /// Restore a file from a single-file container
    Decompress {
        input: PathBuf,
        /// Output path; the original extension is appended if missing
        #[clap(short, long)]
        output: Option<PathBuf>,
        #[clap(short, long, arg_enum, default_value = "huffman")]
        algorithm: Algorithm,
        #[clap(short, long)]
        password: Option<String>,
    },
    /// Create a multi-file archive
    Archive {
        output: PathBuf,
        #[clap(required = true)]
        files: Vec<PathBuf>,
        #[clap(flatten)]
        codec: CodecArgs,
        #[clap(short, long)]
        password: Option<String>,
    },
    /// Archive every file under a folder
    Folder {
        folder: PathBuf,
        output: PathBuf,
        #[clap(flatten)]
        codec: CodecArgs,
        #[clap(short, long)]
        password: Option<String>,
        /// Write the sequential folder stream instead of an indexed archive (no password)
        #[clap(long, conflicts_with = "password")]
        stream: bool,
    },
    /// List the entries of an archive
    List { archive: PathBuf },
    /// Extract one entry from an archive
    Extract {
        archive: PathBuf,
        name: String,
        #[clap(short, long)]
        output: Option<PathBuf>,
        #[clap(short, long)]
        password: Option<String>,
    },
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse the command line, print the opening line and set the log level.
pub fn cli_init() -> Cli {
    let cli = Cli::parse();
    println!("mhar, a Huffman / Shannon-Fano archiver.  Version {}", VERSION);

    // Set the log level
    log::set_max_level(level_for(cli.verbose));
    info!("Verbosity set to {}", log::max_level());
    info!("Command: {:?}", cli.command);
    cli
}

/// Map the count of -v flags to a log level.
pub fn level_for(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn magic_round_trip_test() {
        for a in [Algorithm::Huffman, Algorithm::ShannonFano] {
            assert_eq!(Algorithm::from_magic(a.magic()), Some(a));
        }
        assert_eq!(Algorithm::from_magic(b"ZZZZ"), None);
    }

    #[test]
    fn chunk_size_bounds_test() {
        let mut opts = CodecOptions::default();
        assert!(opts.validate().is_ok());
        opts.chunk_size = 0;
        assert!(opts.validate().is_err());
        opts.chunk_size = i32::MAX as usize + 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn parse_archive_command_test() {
        let cli = Cli::try_parse_from([
            "mhar", "-vvv", "archive", "out.mhar", "a.txt", "b.txt", "-a", "shannon-fano",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 3);
        match cli.command {
            Command::Archive { files, codec, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(codec.algorithm, Algorithm::ShannonFano);
                assert_eq!(codec.chunk_size, DEFAULT_CHUNK_SIZE);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn stream_conflicts_with_password_test() {
        let res = Cli::try_parse_from(["mhar", "folder", "src", "out.stream", "--stream", "-p", "pw"]);
        assert!(res.is_err());
        let cli = Cli::try_parse_from(["mhar", "folder", "src", "out.stream", "--stream"]).unwrap();
        assert!(matches!(cli.command, Command::Folder { stream: true, .. }));
    }

    #[test]
    fn level_test() {
        assert_eq!(level_for(0), log::LevelFilter::Off);
        assert_eq!(level_for(1), log::LevelFilter::Error);
        assert_eq!(level_for(4), log::LevelFilter::Debug);
        assert_eq!(level_for(9), log::LevelFilter::Trace);
        // Each extra -v shows at least as much
        assert!((0..8).all(|v| level_for(v) <= level_for(v + 1)));
    }
}
