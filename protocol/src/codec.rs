// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The wire framing state machine.
//!
//! A frame is `SOM | size_hi | size_lo | type | type+5 | version | payload… |
//! EOM`, all multi-byte integers big-endian. `size` is the byte count from
//! `SOM` through the last payload byte inclusive (`EOM` is never counted),
//! so a zero-payload frame has `size == 6`. The parser consumes one byte at a
//! time and is restartable: feeding it more bytes later simply resumes
//! wherever it left off, which is what lets it sit directly on top of a
//! partial-read USB/serial transport.
//!
//! On any protocol error the parser resets itself and resumes scanning for
//! the next `SOM` -- a bad frame never wedges the link.

/// Start-of-message byte.
pub const SOM: u8 = 0xFF;
/// End-of-message byte.
pub const EOM: u8 = 0x56;

/// Maximum payload accepted from the host.
pub const MAX_INCOMING_PAYLOAD: usize = 512;

/// Bytes of frame overhead counted in the `size` field: SOM, two size bytes,
/// type, type checksum, version.
const HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingSom,
    SizeHi,
    SizeLo,
    Type,
    TypeChecksum,
    Version,
    Payload,
    Eom,
}

/// A protocol-level parse failure. The parser has already resynced by the
/// time this is returned; these are never fatal to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// `size` outside `[5, 5 + MAX_INCOMING_PAYLOAD]`, or too small to hold
    /// the fixed header once `version` is reached.
    InvalidSize,
    /// `type` was zero.
    InvalidType,
    /// The `type+5` checksum byte didn't match.
    InvalidTypeChecksum,
    /// `version` was zero.
    InvalidVersion,
    /// The byte following the payload wasn't `EOM`.
    MissingEom,
}

/// A fully decoded incoming frame, borrowing its payload from the codec.
#[derive(Debug)]
pub struct DecodedFrame<'a> {
    pub msg_type: u8,
    pub version: u8,
    pub payload: &'a [u8],
}

/// A restartable frame parser over a caller-fed byte stream.
pub struct ByteCodec {
    state: State,
    size: u16,
    msg_type: u8,
    version: u8,
    payload: [u8; MAX_INCOMING_PAYLOAD],
    payload_len: usize,
    payload_target: usize,
    bytes_skipped: u32,
}

impl Default for ByteCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteCodec {
    pub fn new() -> Self {
        ByteCodec {
            state: State::SeekingSom,
            size: 0,
            msg_type: 0,
            version: 0,
            payload: [0u8; MAX_INCOMING_PAYLOAD],
            payload_len: 0,
            payload_target: 0,
            bytes_skipped: 0,
        }
    }

    /// Total bytes discarded so far while resynchronizing on `SOM`. Useful
    /// as a diagnostic counter; never affects parsing.
    pub fn bytes_skipped(&self) -> u32 {
        self.bytes_skipped
    }

    fn resync(&mut self) {
        self.state = State::SeekingSom;
        self.size = 0;
        self.msg_type = 0;
        self.version = 0;
        self.payload_len = 0;
        self.payload_target = 0;
    }

    /// Feeds one byte to the parser.
    ///
    /// Returns `Some(Ok(()))` when a frame has just completed -- call
    /// [`ByteCodec::frame`] to borrow it -- `Some(Err(e))` if this byte broke
    /// protocol (the parser has already resynced and is ready for the next
    /// `SOM`), or `None` if the frame is still incomplete.
    pub fn push(&mut self, byte: u8) -> Option<Result<(), CodecError>> {
        match self.state {
            State::SeekingSom => {
                if byte == SOM {
                    self.state = State::SizeHi;
                } else {
                    self.bytes_skipped += 1;
                }
                None
            }
            State::SizeHi => {
                self.size = (byte as u16) << 8;
                self.state = State::SizeLo;
                None
            }
            State::SizeLo => {
                self.size |= byte as u16;
                if (self.size as usize) < 5 || (self.size as usize) > 5 + MAX_INCOMING_PAYLOAD {
                    self.resync();
                    return Some(Err(CodecError::InvalidSize));
                }
                self.state = State::Type;
                None
            }
            State::Type => {
                if byte == 0 {
                    self.resync();
                    return Some(Err(CodecError::InvalidType));
                }
                self.msg_type = byte;
                self.state = State::TypeChecksum;
                None
            }
            State::TypeChecksum => {
                if byte != self.msg_type.wrapping_add(5) {
                    self.resync();
                    return Some(Err(CodecError::InvalidTypeChecksum));
                }
                self.state = State::Version;
                None
            }
            State::Version => {
                if byte < 1 {
                    self.resync();
                    return Some(Err(CodecError::InvalidVersion));
                }
                self.version = byte;
                if (self.size as usize) < HEADER_LEN {
                    self.resync();
                    return Some(Err(CodecError::InvalidSize));
                }
                self.payload_target = self.size as usize - HEADER_LEN;
                self.payload_len = 0;
                self.state = if self.payload_target == 0 {
                    State::Eom
                } else {
                    State::Payload
                };
                None
            }
            State::Payload => {
                self.payload[self.payload_len] = byte;
                self.payload_len += 1;
                if self.payload_len == self.payload_target {
                    self.state = State::Eom;
                }
                None
            }
            State::Eom => {
                let ok = byte == EOM;
                self.resync();
                if ok {
                    Some(Ok(()))
                } else {
                    Some(Err(CodecError::MissingEom))
                }
            }
        }
    }

    /// Borrows the most recently completed frame. Only meaningful
    /// immediately after [`push`](Self::push) returns `Some(Ok(()))`.
    pub fn frame(&self) -> DecodedFrame<'_> {
        DecodedFrame {
            msg_type: self.msg_type,
            version: self.version,
            payload: &self.payload[..self.payload_len],
        }
    }
}

/// Encodes `(msg_type, version, payload)` into `out`, returning the number of
/// bytes written (header + payload + trailing EOM), or `None` if `out` is too
/// small or the payload exceeds `max_payload`.
pub fn encode(
    msg_type: u8,
    version: u8,
    payload: &[u8],
    max_payload: usize,
    out: &mut [u8],
) -> Option<usize> {
    if payload.len() > max_payload {
        return None;
    }
    let total = HEADER_LEN + payload.len();
    if out.len() < total + 1 {
        return None;
    }
    let size = total as u16;
    out[0] = SOM;
    out[1] = (size >> 8) as u8;
    out[2] = (size & 0xFF) as u8;
    out[3] = msg_type;
    out[4] = msg_type.wrapping_add(5);
    out[5] = version;
    out[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    out[HEADER_LEN + payload.len()] = EOM;
    Some(total + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut ByteCodec, bytes: &[u8]) -> Vec<Result<(u8, u8, Vec<u8>), CodecError>> {
        let mut out = Vec::new();
        for &b in bytes {
            if let Some(result) = codec.push(b) {
                out.push(result.map(|()| {
                    let f = codec.frame();
                    (f.msg_type, f.version, f.payload.to_vec())
                }));
            }
        }
        out
    }

    // Scenario F.
    #[test]
    fn codec_resilience_scenario() {
        let stream = [
            0x00, 0x00, 0xFF, 0x00, 0x07, 0x00, 0x99, 0x99, 0x56, 0xFF, 0x00, 0x07, 0x0A, 0x0F,
            0x01, 0x99, 0x56,
        ];
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &stream);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(CodecError::InvalidType));
        assert_eq!(results[1], Ok((10, 1, vec![0x99])));
    }

    #[test]
    fn sync_response_frame_decodes() {
        let stream = [
            0xFF, 0x00, 0x17, 0x50, 0x55, 0x01, 0x03, 0xE1, 0xA9, 0xF2, 0x2A, 0x02, 0x02, 0x01,
            0x00, 0x00, 0x00, 0x01, 0x86, 0xA0, 0x03, 0xE8, 0x05, 0x56,
        ];
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &stream);
        assert_eq!(results.len(), 1);
        let (msg_type, version, payload) = results[0].clone().unwrap();
        assert_eq!(msg_type, 0x50);
        assert_eq!(version, 1);
        assert_eq!(payload.len(), 17);
    }

    #[test]
    fn partial_feeds_advance_state_without_resetting() {
        let stream = [0xFFu8, 0x00, 0x07, 0x0A, 0x0F, 0x01, 0x99, 0x56];
        let mut codec = ByteCodec::new();
        // Feed one byte at a time, interleaved with checks, to show the
        // parser is restartable across arbitrary I/O boundaries.
        let mut complete = None;
        for (i, &b) in stream.iter().enumerate() {
            let r = codec.push(b);
            if i < stream.len() - 1 {
                assert!(r.is_none(), "frame completed early at byte {i}");
            } else {
                complete = r;
            }
        }
        assert_eq!(complete, Some(Ok(())));
    }

    #[test]
    fn bad_size_resyncs_on_next_som() {
        let mut codec = ByteCodec::new();
        // size = 2 (too small for even the coarse bound), then a clean frame.
        let stream = [
            0xFF, 0x00, 0x02, // bogus size
            0xFF, 0x00, 0x06, 0x01, 0x06, 0x01, 0x56, // valid, zero-payload frame
        ];
        let results = feed(&mut codec, &stream);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(CodecError::InvalidSize));
        assert_eq!(results[1], Ok((1, 1, vec![])));
    }

    #[test]
    fn flipped_checksum_bit_is_an_error() {
        // type=10 (0x0A), correct checksum is 0x0F; flip low bit -> 0x0E.
        let stream = [0xFFu8, 0x00, 0x07, 0x0A, 0x0E, 0x01, 0x99, 0x56];
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &stream);
        assert_eq!(results, vec![Err(CodecError::InvalidTypeChecksum)]);
    }

    #[test]
    fn zero_type_is_rejected() {
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &[0xFF, 0x00, 0x06, 0x00]);
        assert_eq!(results, vec![Err(CodecError::InvalidType)]);
    }

    #[test]
    fn zero_version_is_rejected() {
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &[0xFF, 0x00, 0x06, 0x01, 0x06, 0x00]);
        assert_eq!(results, vec![Err(CodecError::InvalidVersion)]);
    }

    #[test]
    fn missing_eom_is_an_error() {
        let stream = [0xFFu8, 0x00, 0x07, 0x0A, 0x0F, 0x01, 0x99, 0x00];
        let mut codec = ByteCodec::new();
        let results = feed(&mut codec, &stream);
        assert_eq!(results, vec![Err(CodecError::MissingEom)]);
    }

    // Law 6: encode(decode(frame)) == frame.
    #[test]
    fn encode_decode_round_trips() {
        let payload = [1, 2, 3, 4, 5];
        let mut buf = [0u8; 32];
        let n = encode(10, 1, &payload, MAX_INCOMING_PAYLOAD, &mut buf).unwrap();

        let mut codec = ByteCodec::new();
        let mut got = None;
        for &b in &buf[..n] {
            if let Some(r) = codec.push(b) {
                got = Some(r);
            }
        }
        assert_eq!(got, Some(Ok(())));
        let f = codec.frame();
        assert_eq!(f.msg_type, 10);
        assert_eq!(f.version, 1);
        assert_eq!(f.payload, &payload[..]);

        let mut buf2 = [0u8; 32];
        let n2 = encode(f.msg_type, f.version, f.payload, MAX_INCOMING_PAYLOAD, &mut buf2).unwrap();
        assert_eq!(&buf[..n], &buf2[..n2]);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = [0u8; 10];
        let mut buf = [0u8; 4];
        assert_eq!(encode(10, 1, &payload, 4096, &mut buf), None);
    }
}
