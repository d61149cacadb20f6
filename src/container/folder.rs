use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{info, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::archive::{create_archive_file, name_len, ArchiveSource, ArchiveSummary};
use super::password::PasswordHash;
use crate::compression::chunked::ChunkedCodec;
use crate::compression::compress::{compression_ratio, parent_dir};
use crate::error::{Error, Result};
use crate::tools::cli::CompressOptions;
use crate::tools::control::Control;

/// Every regular file under `folder`, in file name order, named by its path relative to
/// `folder` with `/` separators.
pub fn collect_sources(folder: &Path) -> Result<Vec<ArchiveSource>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(folder).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(folder).unwrap_or_else(|_| entry.path());
        sources.push(ArchiveSource::new(forward_slash(relative), entry.path()));
    }
    if sources.is_empty() {
        warn!("{} holds no files.", folder.display());
    }
    Ok(sources)
}

fn forward_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Archive every file under `folder` into an indexed archive at `output`.
pub fn create_folder_archive(
    folder: &Path,
    output: &Path,
    options: &CompressOptions,
    ctl: &Control,
) -> Result<ArchiveSummary> {
    let sources = collect_sources(folder)?;
    info!("Archiving {} files from {}.", sources.len(), folder.display());
    create_archive_file(output, &sources, options, ctl)
}

/// Sizes from writing a folder stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FolderSummary {
    pub files: usize,
    pub original_len: u64,
    pub stream_len: u64,
}

impl FolderSummary {
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.original_len, self.stream_len)
    }
}

/// Write the sequential folder format:
///
/// `int32 folderNameLen | folderName` then per file `int32 nameLen | relative path`
/// followed directly by the file's coded stream.
///
/// Coded streams carry no length, so this format can only be read front to back.
/// It has no password gate either, so a non-empty password is refused.
/// [`create_folder_archive`] is the randomly addressable, protectable alternative.
pub fn write_folder_stream<W: Write>(
    folder: &Path,
    sink: &mut W,
    options: &CompressOptions,
    ctl: &Control,
) -> Result<FolderSummary> {
    if PasswordHash::from_option(options.password.as_deref()).is_some() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "the folder stream format cannot be password protected",
        )
        .into());
    }
    let codec = ChunkedCodec::new(options.codec)?;
    let sources = collect_sources(folder)?;
    let mut summary = FolderSummary::default();

    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    summary.stream_len += write_name(sink, &folder_name)?;

    let n = sources.len().max(1);
    for (i, source) in sources.iter().enumerate() {
        ctl.checkpoint()?;
        let fin = File::open(&source.path)?;
        let len = fin.metadata()?.len();
        if len == 0 {
            warn!("{} is empty and cannot be archived.", source.path.display());
            return Err(Error::EmptyInput);
        }
        summary.stream_len += write_name(sink, &source.name)?;
        let span = ctl.span((i * 100 / n) as u8, ((i + 1) * 100 / n) as u8);
        let totals = codec.encode(&mut BufReader::new(fin), sink, Some(len), &span)?;
        summary.stream_len += totals.output;
        summary.original_len += len;
        summary.files += 1;
    }
    sink.flush()?;
    Ok(summary)
}

/// Write a folder stream to `output`, replacing it only on success.
pub fn write_folder_stream_file(
    folder: &Path,
    output: &Path,
    options: &CompressOptions,
    ctl: &Control,
) -> Result<FolderSummary> {
    let temp = NamedTempFile::new_in(parent_dir(output))?;
    let mut writer = BufWriter::new(temp);
    let summary = write_folder_stream(folder, &mut writer, options, ctl)?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.persist(output).map_err(|e| e.error)?;
    info!(
        "Wrote {} files from {} ({:.1}% saved).",
        summary.files,
        folder.display(),
        summary.ratio()
    );
    Ok(summary)
}

fn write_name<W: Write>(w: &mut W, name: &str) -> Result<u64> {
    let len = name_len(name)?;
    w.write_i32::<LittleEndian>(len)?;
    w.write_all(name.as_bytes())?;
    Ok(4 + name.len() as u64)
}
