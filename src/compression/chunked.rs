use std::io::{self, Read, Write};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::huffman_coding::block::CodedBlock;
use crate::tools::cli::{Algorithm, CodecOptions};
use crate::tools::control::Control;

/// Byte counts for one pass over a stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    /// Bytes read from the source
    pub input: u64,
    /// Bytes written to the sink
    pub output: u64,
    /// Coded blocks written or read
    pub blocks: u32,
}

/// Splits a stream into chunks and codes each one as an independent block.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedCodec {
    options: CodecOptions,
}

impl ChunkedCodec {
    /// Fails if the chunk size is out of range.
    pub fn new(options: CodecOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// A codec for reading streams. The chunk size only matters when encoding.
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        Self {
            options: CodecOptions::new(algorithm),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.options.algorithm
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    /// Encode everything `source` yields. `total_len`, when known, drives the progress
    /// percentage. Fails with [`Error::EmptyInput`] if the source is empty.
    pub fn encode<R: Read, W: Write>(
        &self,
        source: &mut R,
        sink: &mut W,
        total_len: Option<u64>,
        ctl: &Control,
    ) -> Result<Totals> {
        let algorithm = self.algorithm();
        let limit = self.chunk_size() as u64;
        let mut totals = Totals::default();
        let mut chunk = Vec::with_capacity(limit.min(total_len.unwrap_or(limit)) as usize);

        loop {
            ctl.checkpoint()?;
            chunk.clear();
            let n = source.by_ref().take(limit).read_to_end(&mut chunk)?;
            if n == 0 {
                break;
            }
            let block = CodedBlock::encode(&chunk, algorithm, ctl)?;
            totals.output += block.write_to(sink, algorithm)?;
            totals.input += n as u64;
            totals.blocks += 1;
            debug!(
                "Block {}: {} bytes coded into {} ({} symbols, pad {}).",
                totals.blocks,
                n,
                block.wire_len(algorithm),
                block.freqs.len(),
                block.pad
            );
            if let Some(total) = total_len {
                ctl.report_fraction(totals.input, total, "Compressing");
            }
        }

        if totals.input == 0 {
            return Err(Error::EmptyInput);
        }
        info!(
            "{} coded {} bytes into {} bytes in {} blocks.",
            algorithm, totals.input, totals.output, totals.blocks
        );
        Ok(totals)
    }

    /// Decode blocks until `source` is exhausted. `total_len` is the coded length, when
    /// known. A stream without a single block is corrupt.
    pub fn decode<R: Read, W: Write>(
        &self,
        source: &mut R,
        sink: &mut W,
        total_len: Option<u64>,
        ctl: &Control,
    ) -> Result<Totals> {
        let algorithm = self.algorithm();
        let mut source = Counted::new(source);
        let mut totals = Totals::default();

        loop {
            ctl.checkpoint()?;
            let block = match CodedBlock::read_from(&mut source, algorithm)? {
                Some(block) => block,
                None => break,
            };
            let data = block.decode(algorithm, ctl)?;
            sink.write_all(&data)?;
            totals.output += data.len() as u64;
            totals.blocks += 1;
            if let Some(total) = total_len {
                ctl.report_fraction(source.count, total, "Decompressing");
            }
        }
        totals.input = source.count;

        if totals.blocks == 0 {
            return Err(Error::corrupt("coded stream holds no blocks"));
        }
        info!(
            "{} decoded {} blocks into {} bytes.",
            algorithm, totals.blocks, totals.output
        );
        Ok(totals)
    }

    pub fn encode_bytes(&self, data: &[u8], ctl: &Control) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut source = data;
        self.encode(&mut source, &mut out, Some(data.len() as u64), ctl)?;
        Ok(out)
    }

    pub fn decode_bytes(&self, coded: &[u8], ctl: &Control) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut source = coded;
        self.decode(&mut source, &mut out, Some(coded.len() as u64), ctl)?;
        Ok(out)
    }
}

/// Reader that counts the bytes passing through it.
struct Counted<'a, R> {
    inner: &'a mut R,
    count: u64,
}

impl<'a, R: Read> Counted<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for Counted<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
