use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};
use tempfile::NamedTempFile;

use super::chunked::{ChunkedCodec, Totals};
use crate::container::password::{write_gate, PasswordHash};
use crate::error::{Error, Result};
use crate::tools::cli::{Algorithm, CompressOptions};
use crate::tools::control::Control;

/*
    A single-file container is a small header followed by a chunked coded stream:

    int32 extLen | extLen bytes of UTF-8 extension | 1 byte hasPassword | [32 byte hash] | blocks

    The extension is the original file's, dot included, so decompression can give the
    restored file its type back.
*/

/// Longest extension a header may carry.
pub(crate) const MAX_EXTENSION_LEN: usize = 1024;

/// Percentage of space saved. 0.0 when there was nothing to compress.
pub fn compression_ratio(original_len: u64, compressed_len: u64) -> f64 {
    if original_len == 0 {
        return 0.0;
    }
    (1.0 - compressed_len as f64 / original_len as f64) * 100.0
}

/// An extension is stored as is and later appended to an output path, so it must be
/// short and hold no path separators.
pub(crate) fn valid_extension(extension: &str) -> bool {
    extension.len() <= MAX_EXTENSION_LEN && !extension.contains(&['/', '\\'][..])
}

/// Write the container header. Returns the number of bytes written.
/// An extension that [`valid_extension`] refuses is an `InvalidInput` error.
pub fn write_header<W: Write>(w: &mut W, extension: &str, hash: Option<&PasswordHash>) -> Result<u64> {
    if !valid_extension(extension) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot store extension '{}'", extension),
        )
        .into());
    }
    let ext = extension.as_bytes();
    w.write_i32::<LittleEndian>(ext.len() as i32)?;
    w.write_all(ext)?;
    let gate = write_gate(w, hash)?;
    Ok(4 + ext.len() as u64 + gate)
}

/// Write a whole container for everything `source` yields.
pub fn compress_stream<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    total_len: Option<u64>,
    options: &CompressOptions,
    ctl: &Control,
) -> Result<Totals> {
    let codec = ChunkedCodec::new(options.codec)?;
    let hash = PasswordHash::from_option(options.password.as_deref());

    ctl.report(0, "Writing header");
    let header = write_header(sink, &options.extension, hash.as_ref())?;
    debug!(
        "Header: {} bytes, extension '{}', password {}.",
        header,
        options.extension,
        if hash.is_some() { "set" } else { "not set" }
    );

    let mut totals = codec.encode(source, sink, total_len, &ctl.span(2, 100))?;
    totals.output += header;
    ctl.report(100, "Done");
    Ok(totals)
}

/// Compress a buffer into a single-file container.
pub fn compress(data: &[u8], options: &CompressOptions, ctl: &Control) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut source = data;
    compress_stream(&mut source, &mut out, Some(data.len() as u64), options, ctl)?;
    Ok(out)
}

/// Compress `input` into a container at `output`. The input's extension is recorded
/// unless `options` already names one. Nothing is left at `output` if this fails.
pub fn compress_file(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
    ctl: &Control,
) -> Result<Totals> {
    let mut options = options.clone();
    if options.extension.is_empty() {
        options.extension = extension_of(input);
    }

    let fin = File::open(input)?;
    let len = fin.metadata()?.len();
    if len == 0 {
        return Err(Error::EmptyInput);
    }
    let mut reader = BufReader::new(fin);

    let temp = NamedTempFile::new_in(parent_dir(output))?;
    let mut writer = BufWriter::new(temp);
    let totals = compress_stream(&mut reader, &mut writer, Some(len), &options, ctl)?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.persist(output).map_err(|e| e.error)?;

    info!(
        "Compressed {} into {} ({:.1}% saved).",
        input.display(),
        output.display(),
        compression_ratio(totals.input, totals.output)
    );
    Ok(totals)
}

/// Default container path: the input path with the coder's extension added.
pub fn default_output_path(input: &Path, algorithm: Algorithm) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(algorithm.extension());
    PathBuf::from(name)
}

/// File extension with its leading dot, or an empty string.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Directory that holds `path`, for creating temp files next to it.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Size of a file, for ratio reports.
pub fn file_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)?.len())
}
