//! Wire encoding of commands and decoding of CRC protected replies.

use crate::{CodecError, crc_internal};

/// The maximum number of payload words any command writes
pub const MAX_PAYLOAD_WORDS: usize = 6;

/// The maximum number of words any command returns
pub const MAX_REPLY_WORDS: usize = 16;

/// The maximum number of bytes that the driver has to read for any command
pub const MAX_RX_BYTES: usize = MAX_REPLY_WORDS * 3;

/// The maximum number of bytes that the driver has to write for any command
pub const MAX_TX_BYTES: usize = 2 + MAX_PAYLOAD_WORDS * 3;

/// One command transaction: opcode, optional payload and the expected reply.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    /// 16-bit command id
    pub opcode: u16,
    /// Words written after the opcode
    pub payload: heapless::Vec<u16, MAX_PAYLOAD_WORDS>,
    /// Number of words the module replies with (0 for write-only commands)
    pub reply_words: usize,
    /// Time in ms the module needs before the reply can be read or the next command sent
    pub execution_time_ms: u32,
}

impl CommandFrame {
    /// A command without payload
    pub fn new(opcode: u16, reply_words: usize, execution_time_ms: u32) -> Self {
        Self {
            opcode,
            payload: heapless::Vec::new(),
            reply_words,
            execution_time_ms,
        }
    }

    /// A command carrying payload words
    pub fn with_payload(
        opcode: u16,
        payload: &[u16],
        reply_words: usize,
        execution_time_ms: u32,
    ) -> Result<Self, CodecError> {
        let payload =
            heapless::Vec::from_slice(payload).map_err(|_| CodecError::ShortFrame)?;
        Ok(Self {
            opcode,
            payload,
            reply_words,
            execution_time_ms,
        })
    }

    /// Number of bytes the reply occupies on the wire
    pub fn reply_len(&self) -> usize {
        self.reply_words * 3
    }

    /// Encode the command into its wire representation
    pub fn encode(&self) -> heapless::Vec<u8, MAX_TX_BYTES> {
        let mut raw_data = heapless::Vec::new();

        // Encode command ID
        let _ = raw_data.extend_from_slice(&self.opcode.to_be_bytes());

        // Fill raw data structure with data and CRCs
        for word in self.payload.iter() {
            let data_bytes = word.to_be_bytes();
            let crc = crc_internal::generate_crc(&data_bytes);
            let _ = raw_data.extend_from_slice(&[data_bytes[0], data_bytes[1], crc]);
        }

        raw_data
    }
}

/// A decoded reply, one entry per word.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    words: heapless::Vec<Result<u16, CodecError>, MAX_REPLY_WORDS>,
}

impl Frame {
    /// Decode `words` words from `raw`.
    ///
    /// Checksum failures are reported per word and do not abort the frame,
    /// a frame shorter than expected is rejected as a whole.
    pub fn decode(raw: &[u8], words: usize) -> Result<Self, CodecError> {
        if words > MAX_REPLY_WORDS || raw.len() < words * 3 {
            return Err(CodecError::ShortFrame);
        }

        let mut decoded = heapless::Vec::new();
        for chunk in raw[..words * 3].chunks(3) {
            let word = match crc_internal::is_valid(chunk) {
                true => Ok(u16::from_be_bytes([chunk[0], chunk[1]])),
                false => Err(CodecError::ChecksumMismatch),
            };
            let _ = decoded.push(word);
        }

        Ok(Self { words: decoded })
    }

    /// Number of words in the frame, valid or not
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at `index`, `ShortFrame` if the frame is shorter
    pub fn word(&self, index: usize) -> Result<u16, CodecError> {
        self.words
            .get(index)
            .copied()
            .unwrap_or(Err(CodecError::ShortFrame))
    }

    /// Checked words in wire order
    pub fn iter(&self) -> impl Iterator<Item = Result<u16, CodecError>> + '_ {
        self.words.iter().copied()
    }

    /// All words, or the first checksum error
    pub fn strict(&self) -> Result<heapless::Vec<u16, MAX_REPLY_WORDS>, CodecError> {
        self.words.iter().copied().collect()
    }

    /// Number of words that failed their checksum
    pub fn checksum_failures(&self) -> usize {
        self.words.iter().filter(|w| w.is_err()).count()
    }

    /// Interpret the frame as a NUL terminated string, two characters per word.
    pub fn to_text<const N: usize>(&self) -> Result<heapless::String<N>, crate::Sen6xError> {
        let mut bytes: heapless::Vec<u8, N> = heapless::Vec::new();
        'words: for word in self.strict()? {
            for byte in word.to_be_bytes() {
                if byte == 0 {
                    break 'words;
                }
                bytes
                    .push(byte)
                    .map_err(|_| crate::Sen6xError::InvalidData)?;
            }
        }
        heapless::String::from_utf8(bytes).map_err(|_| crate::Sen6xError::InvalidData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(word: u16) -> [u8; 3] {
        let bytes = word.to_be_bytes();
        [bytes[0], bytes[1], crc_internal::generate_crc(&bytes)]
    }

    #[test]
    fn test_encode_without_payload() {
        let frame = CommandFrame::new(0x0021, 0, 50);
        assert_eq!(frame.encode().as_slice(), &[0x00, 0x21]);
    }

    #[test]
    fn test_encode_with_payload() {
        let frame = CommandFrame::with_payload(0x6720, &[1013], 0, 20).unwrap();
        let mut expected = vec![0x67, 0x20];
        expected.extend_from_slice(&with_crc(1013));
        assert_eq!(frame.encode().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_payload_too_long() {
        assert_eq!(
            CommandFrame::with_payload(0x60D0, &[0; 7], 0, 20),
            Err(CodecError::ShortFrame)
        );
    }

    #[test]
    fn test_decode_recovers_words() {
        let mut raw = vec![];
        for word in [0x000A, 0x13_88, 0x09C4] {
            raw.extend_from_slice(&with_crc(word));
        }
        let frame = Frame::decode(&raw, 3).unwrap();
        assert_eq!(frame.strict().unwrap().as_slice(), &[0x000A, 0x1388, 0x09C4]);
        assert_eq!(frame.checksum_failures(), 0);
    }

    #[test]
    fn test_single_bad_crc_does_not_cascade() {
        let mut raw = vec![];
        for word in [1u16, 2, 3, 4] {
            raw.extend_from_slice(&with_crc(word));
        }
        raw[5] ^= 0xFF; // corrupt the checksum of the second word

        let frame = Frame::decode(&raw, 4).unwrap();
        assert_eq!(frame.word(0), Ok(1));
        assert_eq!(frame.word(1), Err(CodecError::ChecksumMismatch));
        assert_eq!(frame.word(2), Ok(3));
        assert_eq!(frame.word(3), Ok(4));
        assert_eq!(frame.checksum_failures(), 1);
        assert_eq!(frame.strict(), Err(CodecError::ChecksumMismatch));
    }

    #[test]
    fn test_short_frame() {
        let raw = with_crc(1);
        assert_eq!(Frame::decode(&raw[..2], 1), Err(CodecError::ShortFrame));
        assert_eq!(Frame::decode(&raw, 2), Err(CodecError::ShortFrame));
    }

    #[test]
    fn test_to_text() {
        let mut raw = vec![];
        for word in [0x5345u16, 0x4E36, 0x3600, 0x0000] {
            raw.extend_from_slice(&with_crc(word));
        }
        let frame = Frame::decode(&raw, 4).unwrap();
        let text: heapless::String<32> = frame.to_text().unwrap();
        assert_eq!(text.as_str(), "SEN66");
    }
}
