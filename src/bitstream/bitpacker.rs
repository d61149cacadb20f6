use crate::huffman_coding::code::Code;

/// Packs code words into bytes, most significant bit first.
pub struct BitPacker {
    pub output: Vec<u8>,
    queue: u64,
    q_bits: u8,
}

impl BitPacker {
    /// Create a new BitPacker with an output buffer of the size specified. Suggest the
    /// size be set to the expected payload size. Call flush() to push the last partial
    /// byte to the buffer.
    pub fn new(size: usize) -> Self {
        Self {
            output: Vec::with_capacity(size),
            queue: 0,
            q_bits: 0,
        }
    }

    /// Internal write function common to all out functions.
    fn write_stream(&mut self) {
        while self.q_bits > 7 {
            let byte = (self.queue >> (self.q_bits - 8)) as u8;
            self.output.push(byte); //push the packed byte out
            self.q_bits -= 8; //adjust the count of bits left in the queue
        }
    }

    /// Writes the low `depth` bits (1-32) of `data`.
    pub fn out_bits(&mut self, data: u32, depth: u8) {
        debug_assert!(depth > 0 && depth <= 32);
        self.queue <<= depth; //shift queue by bit length
        self.queue |= data as u64 & ((1_u64 << depth) - 1); //add data portion to queue
        self.q_bits += depth; //update depth of queue bits
        self.write_stream();
    }

    /// Writes a whole code word.
    pub fn out_code(&mut self, code: &Code) {
        for (piece, depth) in code.pieces() {
            self.out_bits(piece, depth);
        }
    }

    /// Flushes the remaining bits (1-7) from the queue, padding with 0s in the least
    /// significant bits. Returns how many pad bits were added (0-7).
    pub fn flush(&mut self) -> u8 {
        let pad = (8 - self.q_bits % 8) % 8;
        if pad > 0 {
            self.queue <<= pad; //pad the queue with zeros
            self.q_bits += pad;
            self.write_stream(); // write out all that is left
        }
        pad
    }

    /// Debugging function to return the number of bytes.bits output so far
    pub fn loc(&self) -> String {
        let bits = self.output.len() * 8 + self.q_bits as usize;
        format!("[{}.{}]", bits / 8, bits % 8)
    }
}

#[cfg(test)]
mod test {
    use super::BitPacker;
    use crate::huffman_coding::code::Code;

    #[test]
    fn out_bits_test() {
        let mut bw = BitPacker::new(100);
        bw.out_bits(0b0010_0001_0010_0000, 16);
        assert_eq!(bw.flush(), 0);
        assert_eq!(bw.output, "! ".as_bytes());
    }

    #[test]
    fn out_bits_and_loc_test() {
        let mut bw = BitPacker::new(100);
        bw.out_bits(0b101, 3);
        assert_eq!("[0.3]", &bw.loc());
        bw.out_bits(0b00001, 5);
        assert_eq!("[1.0]", &bw.loc());
        bw.out_bits(0b11, 2);
        assert_eq!(bw.flush(), 6);
        assert_eq!(bw.output, vec![0b1010_0001, 0b1100_0000]);
        assert_eq!("[2.0]", &bw.loc());
    }

    #[test]
    fn masks_high_bits_test() {
        let mut bw = BitPacker::new(10);
        bw.out_bits(0xffff_fff0, 4);
        bw.out_bits(0xf, 4);
        assert_eq!(bw.output, vec![0x0f]);
    }

    #[test]
    fn out_code_test() {
        let mut bw = BitPacker::new(100);
        let long: Code = format!("1{}1", "0".repeat(38)).parse().unwrap();
        bw.out_code(&long);
        bw.out_code(&"1".parse().unwrap());
        // 41 bits written, 7 bits of padding
        assert_eq!(bw.flush(), 7);
        assert_eq!(bw.output, vec![0x80, 0, 0, 0, 0b0000_0001, 0b1000_0000]);
    }
}
