use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{error, info};
use tempfile::NamedTempFile;

use super::chunked::{ChunkedCodec, Totals};
use super::compress::{parent_dir, valid_extension, MAX_EXTENSION_LEN};
use crate::container::password::{read_gate, verify, PasswordHash};
use crate::error::{truncated, Error, Result};
use crate::tools::cli::DecompressOptions;
use crate::tools::control::Control;

/// The metadata in front of a single-file container's coded stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Original extension, dot included. May be empty.
    pub extension: String,
    pub password: Option<PasswordHash>,
}

impl ContainerHeader {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let len = r
            .read_i32::<LittleEndian>()
            .map_err(truncated("container header"))?;
        if !(0..=MAX_EXTENSION_LEN as i32).contains(&len) {
            return Err(Error::corrupt(format!("invalid extension length {}", len)));
        }
        let mut ext = vec![0_u8; len as usize];
        r.read_exact(&mut ext).map_err(truncated("extension"))?;
        let extension = String::from_utf8(ext)
            .map_err(|_| Error::corrupt("extension is not valid UTF-8"))?;
        if !valid_extension(&extension) {
            return Err(Error::corrupt(format!("invalid extension '{}'", extension)));
        }
        let password = read_gate(r)?;
        Ok(Self {
            extension,
            password,
        })
    }

    /// Serialized size in bytes.
    pub fn wire_len(&self) -> u64 {
        4 + self.extension.len() as u64 + if self.password.is_some() { 33 } else { 1 }
    }
}

/// Read and check the header, then decode the rest of `source` into `sink`.
/// Nothing is written to `sink` unless the header and password are valid.
pub fn decompress_stream<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    total_len: Option<u64>,
    options: &DecompressOptions,
    ctl: &Control,
) -> Result<(ContainerHeader, Totals)> {
    ctl.report(0, "Initializing");
    ctl.checkpoint()?;

    ctl.report(5, "Reading header");
    let header = ContainerHeader::read_from(source)?;
    verify(header.password.as_ref(), options.password.as_deref())?;
    ctl.checkpoint()?;

    ctl.report(10, "Decompressing");
    let codec = ChunkedCodec::for_algorithm(options.algorithm);
    let body_len = total_len.map(|len| len.saturating_sub(header.wire_len()));
    let totals = codec.decode(source, sink, body_len, &ctl.span(10, 100))?;
    ctl.report(100, "Done");
    Ok((header, totals))
}

/// Decompress a single-file container held in memory.
pub fn decompress(data: &[u8], options: &DecompressOptions, ctl: &Control) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut source = data;
    decompress_stream(&mut source, &mut out, Some(data.len() as u64), options, ctl)?;
    Ok(out)
}

/// Output path with the stored extension appended, unless it already ends with it
/// (compared case-insensitively).
pub fn restored_path(output: &Path, extension: &str) -> PathBuf {
    let name = output.to_string_lossy();
    if extension.is_empty() || name.to_lowercase().ends_with(&extension.to_lowercase()) {
        return output.to_path_buf();
    }
    let mut path = output.as_os_str().to_owned();
    path.push(extension);
    PathBuf::from(path)
}

/// Decompress the container at `input`. The restored file is written to `output` with the
/// original extension added (see [`restored_path`]); the final path is returned.
/// Nothing is created if this fails.
pub fn decompress_file(
    input: &Path,
    output: &Path,
    options: &DecompressOptions,
    ctl: &Control,
) -> Result<PathBuf> {
    ctl.report(0, "Initializing");
    let fin = File::open(input)?;
    let len = fin.metadata()?.len();
    let mut reader = BufReader::new(fin);
    ctl.checkpoint()?;

    // The header decides the final name, so read it before creating anything.
    ctl.report(5, "Reading header");
    let header = ContainerHeader::read_from(&mut reader).map_err(|e| {
        error!("{} is not a valid container: {}", input.display(), e);
        e
    })?;
    verify(header.password.as_ref(), options.password.as_deref())?;
    ctl.checkpoint()?;
    let final_path = restored_path(output, &header.extension);

    let temp = NamedTempFile::new_in(parent_dir(&final_path))?;
    let mut writer = BufWriter::new(temp);
    let codec = ChunkedCodec::for_algorithm(options.algorithm);
    ctl.report(10, "Decompressing");
    let body_len = len.saturating_sub(header.wire_len());
    let totals = codec.decode(&mut reader, &mut writer, Some(body_len), &ctl.span(10, 100))?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.persist(&final_path).map_err(|e| e.error)?;
    ctl.report(100, "Done");

    info!(
        "Restored {} bytes from {} into {}.",
        totals.output,
        input.display(),
        final_path.display()
    );
    Ok(final_path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::compress::{compress, compress_file};
    use crate::tools::cli::{Algorithm, CompressOptions};
    use std::fs;
    use std::sync::{Arc, Mutex};

    const BOTH: [Algorithm; 2] = [Algorithm::Huffman, Algorithm::ShannonFano];

    fn text() -> Vec<u8> {
        b"Peter Piper picked a peck of pickled peppers. "
            .iter()
            .cycle()
            .take(3000)
            .copied()
            .collect()
    }

    #[test]
    fn round_trip_test() {
        let data = text();
        let ctl = Control::default();
        for algorithm in BOTH {
            let mut opts = CompressOptions::new(algorithm).with_extension(".txt");
            opts.codec.chunk_size = 1000;
            let packed = compress(&data, &opts, &ctl).unwrap();
            assert!(packed.len() < data.len());
            let back = decompress(&packed, &DecompressOptions::new(algorithm), &ctl).unwrap();
            assert_eq!(back, data);
        }
    }

    #[test]
    fn repeated_byte_test() {
        let data = vec![0x41_u8; 10_000];
        let opts = CompressOptions::new(Algorithm::Huffman);
        let packed = compress(&data, &opts, &Control::default()).unwrap();
        // empty extension header (4 + 1), one block (4 + 5 + 4 + 1250)
        assert_eq!(packed.len(), 5 + 13 + 1250);
        let back = decompress(&packed, &DecompressOptions::default(), &Control::default()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn password_test() {
        let opts = CompressOptions::new(Algorithm::ShannonFano).with_password("hunter2");
        let packed = compress(&text(), &opts, &Control::default()).unwrap();
        let ctl = Control::default();

        let none = DecompressOptions::new(Algorithm::ShannonFano);
        assert!(matches!(decompress(&packed, &none, &ctl), Err(Error::MissingPassword)));
        let empty = none.clone().with_password("");
        assert!(matches!(decompress(&packed, &empty, &ctl), Err(Error::MissingPassword)));
        let wrong = none.clone().with_password("hunter3");
        assert!(matches!(decompress(&packed, &wrong, &ctl), Err(Error::IncorrectPassword)));
        let right = none.with_password("hunter2");
        assert_eq!(decompress(&packed, &right, &ctl).unwrap(), text());
    }

    #[test]
    fn wrong_algorithm_is_corrupt_test() {
        let packed = compress(
            b"a shannon-fano stream",
            &CompressOptions::new(Algorithm::ShannonFano),
            &Control::default(),
        )
        .unwrap();
        let res = decompress(&packed, &DecompressOptions::new(Algorithm::Huffman), &Control::default());
        assert!(matches!(res, Err(Error::CorruptFormat(_))));
    }

    #[test]
    fn bad_header_test() {
        let ctl = Control::default();
        let opts = DecompressOptions::default();
        assert!(matches!(decompress(&[1, 0], &opts, &ctl), Err(Error::CorruptFormat(_))));
        let negative = (-1_i32).to_le_bytes();
        assert!(matches!(decompress(&negative, &opts, &ctl), Err(Error::CorruptFormat(_))));
        // header only, no blocks
        assert!(matches!(decompress(&[0, 0, 0, 0, 0], &opts, &ctl), Err(Error::CorruptFormat(_))));
        let escaping = [&4_i32.to_le_bytes()[..], &b"/../"[..], &[0_u8][..]].concat();
        assert!(matches!(
            ContainerHeader::read_from(&mut escaping.as_slice()),
            Err(Error::CorruptFormat(_))
        ));
    }

    #[test]
    fn staged_progress_test() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sink = move |p: u8, _: &str| log.lock().unwrap().push(p);
        let ctl = Control::new(Arc::new(sink), Default::default(), Default::default());
        let packed = compress(&text(), &CompressOptions::default(), &Control::default()).unwrap();
        decompress(&packed, &DecompressOptions::default(), &ctl).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(&seen[..3], &[0, 5, 10]);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn file_staged_progress_test() {
        let dir = tempfile::tempdir().unwrap();
        let packed = dir.path().join("story.huff");
        fs::write(&packed, compress(&text(), &CompressOptions::default(), &Control::default()).unwrap())
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sink = move |p: u8, _: &str| log.lock().unwrap().push(p);
        let ctl = Control::new(Arc::new(sink), Default::default(), Default::default());
        decompress_file(&packed, &dir.path().join("story"), &DecompressOptions::default(), &ctl).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(&seen[..3], &[0, 5, 10]);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn restored_path_test() {
        assert_eq!(restored_path(Path::new("out/doc"), ".txt"), PathBuf::from("out/doc.txt"));
        assert_eq!(restored_path(Path::new("out/doc.TXT"), ".txt"), PathBuf::from("out/doc.TXT"));
        assert_eq!(restored_path(Path::new("out/doc"), ""), PathBuf::from("out/doc"));
    }

    #[test]
    fn file_round_trip_test() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("story.txt");
        fs::write(&input, text()).unwrap();
        let packed = dir.path().join("story.shanf");
        let opts = CompressOptions::new(Algorithm::ShannonFano).with_password("pw");
        compress_file(&input, &packed, &opts, &Control::default()).unwrap();

        let target = dir.path().join("restored");
        let opts = DecompressOptions::new(Algorithm::ShannonFano).with_password("pw");
        let written = decompress_file(&packed, &target, &opts, &Control::default()).unwrap();
        assert_eq!(written, dir.path().join("restored.txt"));
        assert_eq!(fs::read(&written).unwrap(), text());
    }

    #[test]
    fn failed_decompress_leaves_no_file_test() {
        let dir = tempfile::tempdir().unwrap();
        let packed = dir.path().join("locked.huff");
        let opts = CompressOptions::new(Algorithm::Huffman)
            .with_extension(".bin")
            .with_password("pw");
        fs::write(&packed, compress(&text(), &opts, &Control::default()).unwrap()).unwrap();

        let target = dir.path().join("locked");
        let res = decompress_file(&packed, &target, &DecompressOptions::default(), &Control::default());
        assert!(matches!(res, Err(Error::MissingPassword)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
