//! Multi-file archive with a patchable index.
//!
//! ```text
//! 1 byte hasPassword | [32 byte hash] | 4 byte magic | int32 entryCount
//! entryCount x (int32 nameLen, name, int64 offset, int64 length)
//! entry bodies
//! ```
//!
//! Bodies are coded streams without a per-file header. Offsets are only known once the
//! bodies are written, so the index goes out with zeroed offsets first and is rewritten
//! in place afterwards.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use tempfile::NamedTempFile;

use super::password::{read_gate, verify, write_gate, PasswordHash};
use crate::compression::chunked::ChunkedCodec;
use crate::compression::compress::{compression_ratio, parent_dir};
use crate::error::{truncated, Error, Result};
use crate::tools::cli::{Algorithm, CompressOptions};
use crate::tools::control::Control;

/// Longest entry name accepted in an index.
pub(crate) const MAX_NAME_LEN: i32 = 64 * 1024;

/// Buffer size for copying bodies.
const COPY_BUF: usize = 64 * 1024;

/// One index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    /// Absolute position of the body in the archive
    pub offset: u64,
    /// Body length in bytes
    pub length: u64,
}

impl ArchiveEntry {
    fn index_len(&self) -> u64 {
        4 + self.name.len() as u64 + 16
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let len = name_len(&self.name)?;
        w.write_i32::<LittleEndian>(len)?;
        w.write_all(self.name.as_bytes())?;
        w.write_i64::<LittleEndian>(self.offset as i64)?;
        w.write_i64::<LittleEndian>(self.length as i64)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let len = r.read_i32::<LittleEndian>().map_err(truncated("index"))?;
        if !(0..=MAX_NAME_LEN).contains(&len) {
            return Err(Error::corrupt(format!("invalid entry name length {}", len)));
        }
        let mut name = vec![0_u8; len as usize];
        r.read_exact(&mut name).map_err(truncated("index"))?;
        let name =
            String::from_utf8(name).map_err(|_| Error::corrupt("entry name is not valid UTF-8"))?;
        let offset = r.read_i64::<LittleEndian>().map_err(truncated("index"))?;
        let length = r.read_i64::<LittleEndian>().map_err(truncated("index"))?;
        if offset < 0 || length < 0 {
            return Err(Error::corrupt(format!(
                "entry '{}' has offset {} and length {}",
                name, offset, length
            )));
        }
        Ok(Self {
            name,
            offset: offset as u64,
            length: length as u64,
        })
    }
}

/// Length prefix for a stored name. Names the reader would refuse are refused here too.
pub(crate) fn name_len(name: &str) -> Result<i32> {
    match i32::try_from(name.len()) {
        Ok(len) if len <= MAX_NAME_LEN => Ok(len),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("name of {} bytes is longer than {}", name.len(), MAX_NAME_LEN),
        )
        .into()),
    }
}

/// A file to put into an archive, under the name it will be listed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub name: String,
    pub path: PathBuf,
}

impl ArchiveSource {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Use the file's own name as the entry name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", path.display()),
            )
        })?;
        Ok(Self::new(name.to_string_lossy(), path))
    }
}

/// What an archive creation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveSummary {
    pub entries: Vec<ArchiveEntry>,
    /// Sum of the input file sizes
    pub original_len: u64,
    /// Size of the whole archive
    pub archive_len: u64,
}

impl ArchiveSummary {
    /// Space saved across all inputs, in percent.
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.original_len, self.archive_len)
    }
}

/// A coded body waiting in a temp file.
struct PendingBody {
    name: String,
    file: File,
    length: u64,
}

/// Write an archive of `sources` to `sink`.
///
/// Every file is coded into an anonymous temp file first (0-50% progress). Then the
/// header and a placeholder index are written, the bodies are copied in (50-100%), and
/// the index is rewritten with the real offsets. An empty input file fails with
/// [`Error::EmptyInput`].
pub fn create_archive<W: Write + Seek>(
    sink: &mut W,
    sources: &[ArchiveSource],
    options: &CompressOptions,
    ctl: &Control,
) -> Result<ArchiveSummary> {
    let codec = ChunkedCodec::new(options.codec)?;
    let algorithm = codec.algorithm();
    let count = i32::try_from(sources.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many archive entries"))?;

    for source in sources {
        name_len(&source.name)?;
    }

    // Phase 1: code every file on its own.
    let mut bodies = Vec::with_capacity(sources.len());
    let mut original_len = 0;
    let n = sources.len().max(1);
    for (i, source) in sources.iter().enumerate() {
        ctl.checkpoint()?;
        let fin = File::open(&source.path)?;
        let len = fin.metadata()?.len();
        if len == 0 {
            warn!("{} is empty and cannot be archived.", source.path.display());
            return Err(Error::EmptyInput);
        }
        let lo = (i * 50 / n) as u8;
        let hi = ((i + 1) * 50 / n) as u8;
        let mut body = BufWriter::new(tempfile::tempfile()?);
        let totals = codec.encode(&mut BufReader::new(fin), &mut body, Some(len), &ctl.span(lo, hi))?;
        let file = body.into_inner().map_err(|e| e.into_error())?;
        debug!(
            "Coded {} into a {} byte body.",
            source.path.display(),
            totals.output
        );
        original_len += len;
        bodies.push(PendingBody {
            name: source.name.clone(),
            file,
            length: totals.output,
        });
        ctl.report(hi, "Compressing");
    }

    // Phase 2: header and placeholder index.
    let hash = PasswordHash::from_option(options.password.as_deref());
    let start = sink.stream_position()?;
    write_gate(sink, hash.as_ref())?;
    sink.write_all(algorithm.magic())?;
    sink.write_i32::<LittleEndian>(count)?;
    let index_start = sink.stream_position()?;
    let mut entries: Vec<ArchiveEntry> = bodies
        .iter()
        .map(|b| ArchiveEntry {
            name: b.name.clone(),
            offset: 0,
            length: 0,
        })
        .collect();
    for entry in &entries {
        entry.write_to(sink)?;
    }

    // Phase 3: bodies, recording where each one lands.
    let body_total: u64 = bodies.iter().map(|b| b.length).sum();
    let writing = ctl.span(50, 100);
    let mut copied = 0;
    for (entry, body) in entries.iter_mut().zip(bodies.iter_mut()) {
        ctl.checkpoint()?;
        entry.offset = sink.stream_position()?;
        body.file.seek(SeekFrom::Start(0))?;
        entry.length = copy_exact(&mut body.file, sink, body.length, ctl)?;
        copied += entry.length;
        writing.report_fraction(copied, body_total, "Writing");
    }
    let end = sink.stream_position()?;

    // Phase 4: patch the index.
    sink.seek(SeekFrom::Start(index_start))?;
    for entry in &entries {
        entry.write_to(sink)?;
    }
    sink.seek(SeekFrom::Start(end))?;
    sink.flush()?;

    let summary = ArchiveSummary {
        entries,
        original_len,
        archive_len: end - start,
    };
    info!(
        "Archived {} files, {} bytes into {} bytes ({:.1}% saved).",
        summary.entries.len(),
        summary.original_len,
        summary.archive_len,
        summary.ratio()
    );
    Ok(summary)
}

/// Build an archive in memory from files on disk, named by their file names.
pub fn create_archive_bytes<P: AsRef<Path>>(
    paths: &[P],
    options: &CompressOptions,
    ctl: &Control,
) -> Result<Vec<u8>> {
    let sources = paths
        .iter()
        .map(ArchiveSource::from_path)
        .collect::<Result<Vec<_>>>()?;
    let mut sink = Cursor::new(Vec::new());
    create_archive(&mut sink, &sources, options, ctl)?;
    Ok(sink.into_inner())
}

/// Write an archive to `output`. The archive is assembled in a temp file beside `output`
/// and only renamed into place once the index is patched.
pub fn create_archive_file(
    output: &Path,
    sources: &[ArchiveSource],
    options: &CompressOptions,
    ctl: &Control,
) -> Result<ArchiveSummary> {
    let temp = NamedTempFile::new_in(parent_dir(output))?;
    let mut writer = BufWriter::new(temp);
    let summary = create_archive(&mut writer, sources, options, ctl)?;
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.persist(output).map_err(|e| e.error)?;
    Ok(summary)
}

/// Copy exactly `len` bytes, checking for pause and cancel between buffers.
fn copy_exact<R: Read, W: Write>(src: &mut R, sink: &mut W, len: u64, ctl: &Control) -> Result<u64> {
    let mut buf = vec![0_u8; COPY_BUF.min(len as usize)];
    let mut left = len;
    while left > 0 {
        ctl.checkpoint()?;
        let want = (left as usize).min(buf.len());
        src.read_exact(&mut buf[..want]).map_err(truncated("entry body"))?;
        sink.write_all(&buf[..want])?;
        left -= want as u64;
    }
    Ok(len)
}

/// Random access to an archive's entries.
pub struct ArchiveReader<R> {
    inner: R,
    algorithm: Algorithm,
    password: Option<PasswordHash>,
    entries: Vec<ArchiveEntry>,
    /// Lowercased name to the first entry with that name
    lookup: FxHashMap<String, usize>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read the header and index. The password is only checked on extraction, so the
    /// entries of a protected archive can still be listed.
    pub fn open(mut inner: R) -> Result<Self> {
        let archive_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let password = read_gate(&mut inner)?;
        let mut magic = [0_u8; 4];
        inner.read_exact(&mut magic).map_err(truncated("archive header"))?;
        let algorithm = Algorithm::from_magic(&magic)
            .ok_or_else(|| Error::corrupt(format!("unknown archive magic {:02x?}", magic)))?;
        let count = inner
            .read_i32::<LittleEndian>()
            .map_err(truncated("archive header"))?;
        if count < 0 {
            return Err(Error::corrupt(format!("invalid entry count {}", count)));
        }

        let mut entries = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            entries.push(ArchiveEntry::read_from(&mut inner)?);
        }
        let index_end = inner.stream_position()?;
        for entry in &entries {
            let fits = entry
                .offset
                .checked_add(entry.length)
                .map_or(false, |end| end <= archive_len);
            if entry.offset < index_end || !fits {
                return Err(Error::corrupt(format!(
                    "entry '{}' points outside the archive body",
                    entry.name
                )));
            }
        }

        let mut lookup = FxHashMap::default();
        for (i, entry) in entries.iter().enumerate() {
            lookup.entry(entry.name.to_lowercase()).or_insert(i);
        }
        debug!(
            "Opened {} archive with {} entries ({} byte index).",
            algorithm,
            entries.len(),
            entries.iter().map(ArchiveEntry::index_len).sum::<u64>()
        );
        Ok(Self {
            inner,
            algorithm,
            password,
            entries,
            lookup,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Entry names in creation order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Find an entry by name, ignoring case. The first match wins.
    pub fn find(&self, name: &str) -> Option<&ArchiveEntry> {
        self.lookup
            .get(&name.to_lowercase())
            .map(|&i| &self.entries[i])
    }

    /// Read an entry's coded body after checking the password.
    fn read_body(&mut self, name: &str, password: Option<&str>, ctl: &Control) -> Result<Vec<u8>> {
        verify(self.password.as_ref(), password)?;
        let entry = self
            .find(name)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        ctl.checkpoint()?;
        ctl.report(0, "Extracting");
        self.inner.seek(SeekFrom::Start(entry.offset))?;
        let mut body = Vec::with_capacity(entry.length as usize);
        copy_exact(&mut self.inner, &mut body, entry.length, ctl)?;
        Ok(body)
    }

    /// Extract one entry into memory.
    pub fn extract(&mut self, name: &str, password: Option<&str>, ctl: &Control) -> Result<Vec<u8>> {
        let body = self.read_body(name, password, ctl)?;
        let codec = ChunkedCodec::for_algorithm(self.algorithm);
        let data = codec.decode_bytes(&body, &ctl.span(10, 100))?;
        ctl.report(100, "Done");
        Ok(data)
    }

    /// Extract one entry to `output`. Nothing is created if this fails.
    pub fn extract_to_file(
        &mut self,
        name: &str,
        password: Option<&str>,
        output: &Path,
        ctl: &Control,
    ) -> Result<u64> {
        let body = self.read_body(name, password, ctl)?;
        let codec = ChunkedCodec::for_algorithm(self.algorithm);
        let temp = NamedTempFile::new_in(parent_dir(output))?;
        let mut writer = BufWriter::new(temp);
        let totals = codec.decode(
            &mut body.as_slice(),
            &mut writer,
            Some(body.len() as u64),
            &ctl.span(10, 100),
        )?;
        let temp = writer.into_inner().map_err(|e| e.into_error())?;
        temp.persist(output).map_err(|e| e.error)?;
        ctl.report(100, "Done");
        info!("Extracted '{}' to {}.", name, output.display());
        Ok(totals.output)
    }
}

/// Entry names of an archive held in memory.
pub fn list_entries(archive: &[u8]) -> Result<Vec<String>> {
    let reader = ArchiveReader::open(Cursor::new(archive))?;
    Ok(reader.names().into_iter().map(String::from).collect())
}

/// Extract one entry from an archive held in memory.
pub fn extract_entry(
    archive: &[u8],
    name: &str,
    password: Option<&str>,
    ctl: &Control,
) -> Result<Vec<u8>> {
    ArchiveReader::open(Cursor::new(archive))?.extract(name, password, ctl)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tools::control::{CancelToken, PauseGate};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture(len: usize, seed: u8) -> Vec<u8> {
        let words = ["alpha ", "beta ", "gamma ", "delta ", "epsilon "];
        words
            .iter()
            .cycle()
            .skip(seed as usize)
            .flat_map(|w| w.bytes())
            .take(len)
            .collect()
    }

    /// Three files of 10, 500 and 50000 bytes.
    fn three_files() -> (TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, len, seed) in [("small.txt", 10, 0), ("Medium.log", 500, 1), ("large.dat", 50_000, 2)] {
            let path = dir.path().join(name);
            fs::write(&path, fixture(len, seed)).unwrap();
            paths.push(path);
        }
        (dir, paths)
    }

    #[test]
    fn list_and_extract_test() {
        let (_dir, paths) = three_files();
        let ctl = Control::default();
        for algorithm in [Algorithm::Huffman, Algorithm::ShannonFano] {
            let mut opts = CompressOptions::new(algorithm);
            opts.codec.chunk_size = 16 * 1024;
            let archive = create_archive_bytes(&paths, &opts, &ctl).unwrap();
            assert_eq!(&archive[1..5], algorithm.magic());
            assert_eq!(
                list_entries(&archive).unwrap(),
                vec!["small.txt", "Medium.log", "large.dat"]
            );
            for (name, path) in ["small.txt", "Medium.log", "large.dat"].iter().zip(&paths) {
                let data = extract_entry(&archive, name, None, &ctl).unwrap();
                assert_eq!(data, fs::read(path).unwrap());
            }
        }
    }

    #[test]
    fn index_is_patched_test() {
        let (_dir, paths) = three_files();
        let archive = create_archive_bytes(&paths, &CompressOptions::default(), &Control::default()).unwrap();
        let reader = ArchiveReader::open(Cursor::new(&archive)).unwrap();
        let entries = reader.entries();
        // header: flag, magic, count; then the index
        let index_len: u64 = entries.iter().map(ArchiveEntry::index_len).sum();
        assert_eq!(entries[0].offset, 1 + 4 + 4 + index_len);
        assert_eq!(entries[1].offset, entries[0].offset + entries[0].length);
        assert_eq!(entries[2].offset, entries[1].offset + entries[1].length);
        assert_eq!(entries[2].offset + entries[2].length, archive.len() as u64);
    }

    #[test]
    fn missing_entry_test() {
        let (_dir, paths) = three_files();
        let archive = create_archive_bytes(&paths, &CompressOptions::default(), &Control::default()).unwrap();
        let res = extract_entry(&archive, "absent.txt", None, &Control::default());
        assert!(matches!(res, Err(Error::EntryNotFound(ref n)) if n == "absent.txt"));
    }

    #[test]
    fn case_insensitive_lookup_test() {
        let (_dir, paths) = three_files();
        let archive = create_archive_bytes(&paths, &CompressOptions::default(), &Control::default()).unwrap();
        let data = extract_entry(&archive, "MEDIUM.LOG", None, &Control::default()).unwrap();
        assert_eq!(data, fs::read(&paths[1]).unwrap());
    }

    #[test]
    fn password_test() {
        let (_dir, paths) = three_files();
        let opts = CompressOptions::new(Algorithm::ShannonFano).with_password("open sesame");
        let archive = create_archive_bytes(&paths, &opts, &Control::default()).unwrap();
        let ctl = Control::default();

        // Listing does not need the password
        assert_eq!(list_entries(&archive).unwrap().len(), 3);
        assert_eq!(&archive[33..37], b"MSFR");

        let res = extract_entry(&archive, "small.txt", None, &ctl);
        assert!(matches!(res, Err(Error::MissingPassword)));
        let res = extract_entry(&archive, "small.txt", Some("open says me"), &ctl);
        assert!(matches!(res, Err(Error::IncorrectPassword)));
        // The password is checked before the name
        let res = extract_entry(&archive, "absent", Some("wrong"), &ctl);
        assert!(matches!(res, Err(Error::IncorrectPassword)));
        let data = extract_entry(&archive, "small.txt", Some("open sesame"), &ctl).unwrap();
        assert_eq!(data, fs::read(&paths[0]).unwrap());
    }

    #[test]
    fn corrupt_archive_test() {
        let (_dir, paths) = three_files();
        let archive = create_archive_bytes(&paths, &CompressOptions::default(), &Control::default()).unwrap();

        let mut bad_magic = archive.clone();
        bad_magic[1..5].copy_from_slice(b"ZZZZ");
        assert!(matches!(list_entries(&bad_magic), Err(Error::CorruptFormat(_))));

        let cut = &archive[..20];
        assert!(matches!(list_entries(cut), Err(Error::CorruptFormat(_))));

        // Body cut short: the index now points past the end
        let short = &archive[..archive.len() - 1];
        assert!(matches!(list_entries(short), Err(Error::CorruptFormat(_))));
    }

    #[test]
    fn empty_file_rejected_test() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, b"").unwrap();
        let res = create_archive_bytes(&[empty], &CompressOptions::default(), &Control::default());
        assert!(matches!(res, Err(Error::EmptyInput)));
    }

    #[test]
    fn long_entry_name_rejected_test() {
        let (_dir, paths) = three_files();
        let name = "n".repeat(MAX_NAME_LEN as usize + 1);
        let sources = [ArchiveSource::new(name, &paths[0])];
        let mut sink = Cursor::new(Vec::new());
        let res = create_archive(&mut sink, &sources, &CompressOptions::default(), &Control::default());
        match res {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(sink.get_ref().is_empty());

        // The longest allowed name still opens
        let name = "n".repeat(MAX_NAME_LEN as usize);
        let sources = [ArchiveSource::new(name.clone(), &paths[0])];
        let mut sink = Cursor::new(Vec::new());
        create_archive(&mut sink, &sources, &CompressOptions::default(), &Control::default()).unwrap();
        let reader = ArchiveReader::open(Cursor::new(sink.into_inner())).unwrap();
        assert_eq!(reader.names(), vec![name]);
    }

    #[test]
    fn archive_file_and_extract_to_file_test() {
        let (dir, paths) = three_files();
        let output = dir.path().join("bundle.mhar");
        let sources: Vec<_> = paths.iter().map(|p| ArchiveSource::from_path(p).unwrap()).collect();
        let summary =
            create_archive_file(&output, &sources, &CompressOptions::default(), &Control::default())
                .unwrap();
        assert_eq!(summary.original_len, 50_510);
        assert_eq!(summary.archive_len, fs::metadata(&output).unwrap().len());
        assert!(summary.ratio() > 0.0);

        let mut reader = ArchiveReader::open(File::open(&output).unwrap()).unwrap();
        assert_eq!(reader.algorithm(), Algorithm::Huffman);
        assert!(!reader.is_protected());
        let target = dir.path().join("large.copy");
        let written = reader
            .extract_to_file("large.dat", None, &target, &Control::default())
            .unwrap();
        assert_eq!(written, 50_000);
        assert_eq!(fs::read(&target).unwrap(), fs::read(&paths[2]).unwrap());
    }

    #[test]
    fn cancelled_archive_leaves_no_file_test() {
        let (dir, paths) = three_files();
        let output = dir.path().join("cancelled.mhar");
        let sources: Vec<_> = paths.iter().map(|p| ArchiveSource::from_path(p).unwrap()).collect();

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let sink = move |p: u8, _: &str| {
            if p >= 50 {
                trigger.cancel()
            }
        };
        let ctl = Control::new(Arc::new(sink), PauseGate::new(), cancel);
        let res = create_archive_file(&output, &sources, &CompressOptions::default(), &ctl);
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
