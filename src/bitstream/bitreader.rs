//! BitReader: reads a packed, MSB-first bitstream from any source that implements `Read`.
//!
//! Coded block payloads are read one bit at a time while walking a decode tree, so this
//! is a buffered single-bit reader rather than a general field reader.

use std::io;

const BUFFER_SIZE: usize = 64 * 1024;
const BIT_MASK: u8 = 0xff;

/// Reads a packed bitstream.
#[derive(Debug)]
pub struct BitReader<R> {
    buffer: Vec<u8>,
    cursor: usize,
    bit_index: usize,
    consumed: u64,
    source: R,
}

impl<R: io::Read> BitReader<R> {
    /// Creates a new BitReader (with a 64k buffer).
    pub fn new(source: R) -> Self {
        Self {
            buffer: vec![0; BUFFER_SIZE],
            cursor: BUFFER_SIZE,
            bit_index: 0,
            consumed: 0,
            source,
        }
    }

    /// Check (and refill) buffer. Returns true if we have data, false if there is no more
    fn have_data(&mut self) -> io::Result<bool> {
        // Only try to read more data when the buffer length is equal to the buffer cursor location
        if self.cursor == self.buffer.len() {
            self.buffer.resize(BUFFER_SIZE, 0);
            let size = loop {
                match self.source.read(&mut self.buffer) {
                    Ok(size) => break size,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            // If nothing came back from our read attempt, then we have no more data.
            if size == 0 {
                self.buffer.truncate(0);
                self.cursor = 0;
                return Ok(false);
            }
            // Adjust the buffer if we read less than the buffer size
            self.buffer.truncate(size);
            // Reset the cursor and bit index
            self.cursor = 0;
            self.bit_index = 0;
        }
        Ok(true)
    }

    /// Returns Some(true) if the next bit is 1, Some(false) if 0, consuming the bit,
    /// or None if there is no more data to read.
    pub fn bool_bit(&mut self) -> io::Result<Option<bool>> {
        // If bit_index is == 0, check if we have a byte to read.
        if self.bit_index == 0 && !self.have_data()? {
            return Ok(None);
        }
        let bit =
            (self.buffer[self.cursor] & BIT_MASK >> self.bit_index) >> (7 - self.bit_index);
        self.bit_index += 1;
        self.bit_index %= 8;
        if self.bit_index == 0 {
            self.cursor += 1;
        }
        self.consumed += 1;
        Ok(Some(bit == 1))
    }

    /// Number of bits consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Debugging function. Report current position as bytes.bits read.
    pub fn loc(&self) -> String {
        format!("[{}.{}]", self.consumed / 8, self.consumed % 8)
    }
}
