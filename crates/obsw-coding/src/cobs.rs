//! COBS (Consistent Overhead Byte Stuffing) encoding and decoding.
//!
//! COBS replaces every zero byte of the input with a block-length pointer,
//! so the encoded stream is free of zeros and `0x00` can delimit frames.
//! The block length is configurable up to 254; shorter blocks trade a
//! little overhead for bounded lookahead when feeding hardware FIFOs.
//!
//! See <http://conferences.sigcomm.org/sigcomm/1997/papers/p062.pdf>.

/// Packet delimiter placed between frames. COBS removes this value from
/// the payload, which makes it unambiguous on the wire.
pub const FRAME_DELIMITER: u8 = 0;

/// COBS codec with a compile-time block length (default and maximum 254).
pub struct Cobs<const BLOCK_LENGTH: u8 = 254>;

impl<const BLOCK_LENGTH: u8> Cobs<BLOCK_LENGTH> {
    /// Maximum length of a COBS block.
    pub const MAXIMUM_BLOCK_LENGTH: u8 = 254;

    const BLOCK: usize = {
        assert!(BLOCK_LENGTH > 0 && BLOCK_LENGTH <= 254);
        BLOCK_LENGTH as usize
    };

    /// The maximum number of bytes `input_len` input bytes can grow to
    /// while encoding.
    pub const fn max_encoded_len(input_len: usize) -> usize {
        if input_len == 0 {
            1
        } else {
            input_len + (input_len - 1) / Self::BLOCK + 1
        }
    }

    /// Encodes `input` into `output` and returns the number of bytes
    /// written.
    ///
    /// Returns 0 when `output` is shorter than
    /// [`max_encoded_len`](Self::max_encoded_len) of the input.
    pub fn encode(input: &[u8], output: &mut [u8]) -> usize {
        if output.len() < Self::max_encoded_len(input.len()) {
            return 0;
        }

        // Position where the pointer byte of the current block is patched
        // in once the block is complete.
        let mut block_length_pos = 0;
        let mut write = 1;
        let mut current_block_length = 0usize;

        for &byte in input {
            if byte == FRAME_DELIMITER {
                output[block_length_pos] = (current_block_length + 1) as u8;
                block_length_pos = write;
                write += 1;
                current_block_length = 0;
            } else {
                output[write] = byte;
                write += 1;
                current_block_length += 1;
                if current_block_length == Self::BLOCK {
                    output[block_length_pos] = (current_block_length + 1) as u8;
                    block_length_pos = write;
                    write += 1;
                    current_block_length = 0;
                }
            }
        }
        output[block_length_pos] = (current_block_length + 1) as u8;

        write
    }

    /// Decodes a COBS stream into `output` and returns the number of bytes
    /// written.
    ///
    /// Returns 0 on violations of the encoding (embedded zero byte, block
    /// pointer past the end of the input) and when `output` is too small to
    /// hold the result.
    pub fn decode(input: &[u8], output: &mut [u8]) -> usize {
        if Self::max_encoded_len(output.len()) < input.len() {
            // most likely not enough space to store the output
            return 0;
        }

        let mut read = 0;
        let mut write = 0;

        while read < input.len() {
            let pointer = input[read];
            read += 1;
            if pointer == FRAME_DELIMITER {
                // delimiters may not appear inside an encoded stream
                return 0;
            }

            let block_length = (pointer - 1) as usize;
            if read + block_length > input.len() {
                return 0;
            }

            output[write..write + block_length]
                .copy_from_slice(&input[read..read + block_length]);
            write += block_length;
            read += block_length;

            if block_length < Self::BLOCK && read < input.len() {
                // the trailing zero of a short block is implicit
                output[write] = FRAME_DELIMITER;
                write += 1;
            }
        }

        write
    }

    /// In-place variant of [`decode`](Self::decode); the decoded payload
    /// ends up at the start of `buffer`.
    pub fn decode_in_place(buffer: &mut [u8]) -> usize {
        let mut read = 0;
        let mut write = 0;
        let len = buffer.len();

        while read < len {
            let pointer = buffer[read];
            read += 1;
            if pointer == FRAME_DELIMITER {
                return 0;
            }

            let block_length = (pointer - 1) as usize;
            if read + block_length > len {
                return 0;
            }

            // decode never grows, so the copy target is behind the cursor
            buffer.copy_within(read..read + block_length, write);
            write += block_length;
            read += block_length;

            if block_length < Self::BLOCK && read < len {
                buffer[write] = FRAME_DELIMITER;
                write += 1;
            }
        }

        write
    }
}

/// Result of consuming one frame from an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDecode {
    /// Bytes stripped from the input stream, including the delimiter.
    /// 0 means "no complete frame yet, wait for more data".
    pub consumed: usize,
    /// Length of the decoded payload; 0 for empty or discarded frames.
    pub payload_len: usize,
}

/// Complete COBS frames: encoded payload plus trailing delimiter.
pub struct CobsFrame;

impl CobsFrame {
    /// Worst-case encoded size of a frame, delimiter included.
    pub const fn max_encoded_len(input_len: usize) -> usize {
        Cobs::<254>::max_encoded_len(input_len) + 1
    }

    /// Encodes `input` and appends the frame delimiter. Returns the total
    /// number of bytes written, or 0 when `output` is too small for the
    /// worst case.
    pub fn encode(input: &[u8], output: &mut [u8]) -> usize {
        if output.len() < Self::max_encoded_len(input.len()) {
            return 0;
        }

        let encoded = Cobs::<254>::encode(input, output);
        output[encoded] = FRAME_DELIMITER;
        encoded + 1
    }

    /// Extracts the first frame from `input` and decodes it into `output`.
    ///
    /// The input slice is advanced past the consumed bytes on both the
    /// success and the discard-garbage path, so the caller can resynchronize
    /// by simply calling again. Without a delimiter in `input` nothing is
    /// consumed.
    pub fn decode(input: &mut &[u8], output: &mut [u8]) -> FrameDecode {
        let Some(terminator_index) = input.iter().position(|&b| b == FRAME_DELIMITER) else {
            // No end marker found. Not a full frame yet.
            return FrameDecode::default();
        };

        if terminator_index == 0 {
            // The first byte already terminates: an empty frame.
            *input = &input[1..];
            return FrameDecode { consumed: 1, payload_len: 0 };
        }

        let consumed = terminator_index + 1;

        // The sums of the block pointers must land exactly on the
        // terminator, otherwise the stream was corrupted and the frame is
        // discarded as garbage.
        let mut test_pos = 0;
        while test_pos < terminator_index {
            test_pos += input[test_pos] as usize;
        }
        if test_pos != terminator_index {
            *input = &input[consumed..];
            return FrameDecode { consumed, payload_len: 0 };
        }

        let payload_len = Cobs::<254>::decode(&input[..terminator_index], output);
        *input = &input[consumed..];

        FrameDecode { consumed, payload_len }
    }
}

/// Byte-at-a-time COBS encoder.
///
/// Produces the same stream as [`Cobs::encode`] without an intermediate
/// buffer, e.g. for loading a transmit FIFO. It keeps the full input slice
/// because block sizes require lookahead.
#[derive(Debug, Clone)]
pub struct CobsEncodingGenerator<'a, const BLOCK_LENGTH: u8 = 254> {
    data: &'a [u8],
    position: usize,
    next_block: u8,
    zero_element_skip: bool,
}

impl<'a, const BLOCK_LENGTH: u8> CobsEncodingGenerator<'a, BLOCK_LENGTH> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            next_block: 0,
            zero_element_skip: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Produces the next encoded byte. Must not be called when
    /// [`is_finished`](Self::is_finished) reports `true`.
    pub fn next_byte(&mut self) -> u8 {
        if self.next_block == 0 {
            if self.zero_element_skip {
                // Zero values are replaced with the length of the following
                // block, so the data byte itself is skipped. This has to
                // happen before the block scan, which starts on the current
                // position.
                self.position += 1;
            } else {
                self.zero_element_skip = true;
            }
            self.next_block = self.find_next_block();

            if self.next_block as usize == BLOCK_LENGTH as usize {
                self.zero_element_skip = false;
            }

            self.next_block + 1
        } else {
            let value = self.data[self.position];
            self.position += 1;
            self.next_block -= 1;
            value
        }
    }

    fn find_next_block(&self) -> u8 {
        let mut block_size = 0u8;
        let mut position = self.position;
        while position < self.data.len()
            && self.data[position] != FRAME_DELIMITER
            && block_size < BLOCK_LENGTH
        {
            position += 1;
            block_size += 1;
        }
        block_size
    }
}

impl<const BLOCK_LENGTH: u8> Iterator for CobsEncodingGenerator<'_, BLOCK_LENGTH> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.is_finished() {
            None
        } else {
            Some(self.next_byte())
        }
    }
}
