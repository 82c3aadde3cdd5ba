//! STK500v2 message framing
//!
//! A frame is `0x1B <seq> <size_hi> <size_lo> 0x0E <body...> <checksum>`
//! where the checksum is the XOR of every preceding byte.

pub(crate) const MESSAGE_START: u8 = 0x1B;
pub(crate) const TOKEN: u8 = 0x0E;

pub(crate) fn encode(seq: u8, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(body.len() + 6);
    msg.push(MESSAGE_START);
    msg.push(seq);
    msg.extend_from_slice(&(body.len() as u16).to_be_bytes());
    msg.push(TOKEN);
    msg.extend_from_slice(body);
    let checksum = msg.iter().fold(0u8, |acc, b| acc ^ b);
    msg.push(checksum);
    msg
}

enum State {
    Start,
    Seq,
    SizeHigh,
    SizeLow,
    Token,
    Data,
    Checksum,
}

/// Push-based receive parser. Resynchronizes on a bad token or checksum
/// by dropping the partial frame and hunting for the next start byte.
pub(crate) struct FrameParser {
    state: State,
    checksum: u8,
    size: usize,
    body: Vec<u8>,
}

impl FrameParser {
    pub(crate) fn new() -> Self {
        FrameParser {
            state: State::Start,
            checksum: 0,
            size: 0,
            body: Vec::new(),
        }
    }

    /// Feed one received byte; returns the frame body once complete.
    pub(crate) fn push(&mut self, b: u8) -> Option<Vec<u8>> {
        self.checksum ^= b;
        match self.state {
            State::Start => {
                if b == MESSAGE_START {
                    self.checksum = MESSAGE_START;
                    self.state = State::Seq;
                }
            }
            State::Seq => {
                self.state = State::SizeHigh;
            }
            State::SizeHigh => {
                self.size = (b as usize) << 8;
                self.state = State::SizeLow;
            }
            State::SizeLow => {
                self.size |= b as usize;
                self.state = State::Token;
            }
            State::Token => {
                if b != TOKEN {
                    self.state = State::Start;
                } else {
                    self.body = Vec::with_capacity(self.size);
                    if self.size == 0 {
                        self.state = State::Checksum;
                    } else {
                        self.state = State::Data;
                    }
                }
            }
            State::Data => {
                self.body.push(b);
                if self.body.len() == self.size {
                    self.state = State::Checksum;
                }
            }
            State::Checksum => {
                self.state = State::Start;
                if self.checksum == 0 {
                    return Some(std::mem::take(&mut self.body));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &mut FrameParser, data: &[u8]) -> Option<Vec<u8>> {
        data.iter().find_map(|b| parser.push(*b))
    }

    #[test]
    fn test_roundtrip() {
        let msg = encode(1, &[0x10, 0x00, 0xAA]);
        let mut parser = FrameParser::new();
        assert_eq!(parse_all(&mut parser, &msg), Some(vec![0x10, 0x00, 0xAA]));
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut data = vec![0x00, 0xFF, 0x42];
        data.extend(encode(7, &[0x01, 0x00]));
        let mut parser = FrameParser::new();
        assert_eq!(parse_all(&mut parser, &data), Some(vec![0x01, 0x00]));
    }

    #[test]
    fn test_checksum_failure_drops_frame() {
        let mut bad = encode(1, &[0x11, 0x00]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let mut parser = FrameParser::new();
        assert_eq!(parse_all(&mut parser, &bad), None);

        // parser recovers on the next valid frame
        let good = encode(2, &[0x11, 0x00]);
        assert_eq!(parse_all(&mut parser, &good), Some(vec![0x11, 0x00]));
    }

    #[test]
    fn test_empty_body() {
        let msg = encode(0, &[]);
        let mut parser = FrameParser::new();
        assert_eq!(parse_all(&mut parser, &msg), Some(vec![]));
    }
}
