// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host protocol's message model: typed payloads layered on top of the
//! raw [`super::codec`] frames.
//!
//! Everything here is pure data-in/data-out -- no I/O, no state -- so it can
//! be exercised with plain byte slices in host-side tests.

use heapless::Vec;

/// Maximum channels a single SAMPLES/SYNC_RESPONSE/CHANNELS_CHANGED payload
/// can describe. Matches the widest configuration: 8 logic-analyzer lines.
pub const MAX_CHANNELS: usize = 8;

/// Message type byte values, as they appear on the wire.
pub mod msg_type {
    pub const SYNC: u8 = 60;
    pub const SAMPLES: u8 = 61;
    pub const SYNC_RESPONSE: u8 = 80;
    pub const HORZ_SCALE_CHANGED: u8 = 81;
    pub const CHANNELS_CHANGED: u8 = 82;
    pub const TRIGGER_CHANGED: u8 = 83;
    pub const SIG_GEN: u8 = 84;
    pub const SELECTED_SAMPLE_RATE: u8 = 85;
    pub const PRE_TRIGGER_SAMPLES: u8 = 87;
}

/// A decode failure: either the type byte wasn't recognized, or a recognized
/// message's payload was too short/long for its fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    UnknownType(u8),
    Truncated,
    TooManyChannels,
}

/// Per-channel voltage range selection, packed as `range<<4 | ch_id` on the
/// wire -- one byte per channel, low nibble identifies the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub ch_id: u8,
    pub range: u8,
}

impl ChannelConfig {
    pub fn from_byte(b: u8) -> Self {
        ChannelConfig {
            ch_id: b & 0x0F,
            range: (b >> 4) & 0x0F,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.ch_id & 0x0F) | ((self.range & 0x0F) << 4)
    }
}

/// `mode u8, channel u8, type u8, level i16`, as carried by SYNC_RESPONSE and
/// TRIGGER_CHANGED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerBlock {
    pub mode: u8,
    pub channel: u8,
    pub kind: u8,
    pub level: i16,
}

const TRIGGER_BLOCK_LEN: usize = 5;

impl TriggerBlock {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(TriggerBlock {
            mode: r.u8()?,
            channel: r.u8()?,
            kind: r.u8()?,
            level: r.i16()?,
        })
    }

    fn write(self, w: &mut ByteWriter<'_>) -> Option<()> {
        w.u8(self.mode)?;
        w.u8(self.channel)?;
        w.u8(self.kind)?;
        w.i16(self.level)
    }
}

/// A decoded SYNC_RESPONSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub flags: u8,
    pub channels: Vec<ChannelConfig, MAX_CHANNELS>,
    pub range_lo_off: i8,
    pub range_hi_off: i8,
    pub timebase_centi_us: u32,
    pub trigger: TriggerBlock,
}

/// A host-originated message, decoded from a frame's `(type, payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    SyncResponse(SyncResponse),
    HorzScaleChanged { timebase_centi_us: u32 },
    ChannelsChanged { channels: Vec<ChannelConfig, MAX_CHANNELS> },
    TriggerChanged(TriggerBlock),
    SigGen { func: u8, gpio: u8, freq_hz: u32, duty: u16 },
    SelectedSampleRate { rate_hz: u32 },
    PreTriggerSamples { percent: u8 },
}

/// Parses `payload` according to `msg_type`.
pub fn decode(msg_type: u8, payload: &[u8]) -> Result<IncomingMessage, ProtocolError> {
    let mut r = ByteReader::new(payload);
    let msg = match msg_type {
        self::msg_type::SYNC_RESPONSE => {
            let flags = r.u8()?;
            r.skip(4)?; // reserved
            let channels = r.channels()?;
            let range_lo_off = r.i8()?;
            let range_hi_off = r.i8()?;
            let timebase_centi_us = r.u32()?;
            let trigger = TriggerBlock::read(&mut r)?;
            IncomingMessage::SyncResponse(SyncResponse {
                flags,
                channels,
                range_lo_off,
                range_hi_off,
                timebase_centi_us,
                trigger,
            })
        }
        self::msg_type::HORZ_SCALE_CHANGED => IncomingMessage::HorzScaleChanged {
            timebase_centi_us: r.u32()?,
        },
        self::msg_type::CHANNELS_CHANGED => IncomingMessage::ChannelsChanged {
            channels: r.channels()?,
        },
        self::msg_type::TRIGGER_CHANGED => {
            IncomingMessage::TriggerChanged(TriggerBlock::read(&mut r)?)
        }
        self::msg_type::SIG_GEN => IncomingMessage::SigGen {
            func: r.u8()?,
            gpio: r.u8()?,
            freq_hz: r.u32()?,
            duty: r.u16()?,
        },
        self::msg_type::SELECTED_SAMPLE_RATE => IncomingMessage::SelectedSampleRate {
            rate_hz: r.u32()?,
        },
        self::msg_type::PRE_TRIGGER_SAMPLES => IncomingMessage::PreTriggerSamples {
            percent: r.u8()?,
        },
        other => return Err(ProtocolError::UnknownType(other)),
    };
    Ok(msg)
}

/// Writes a SYNC payload (`chip_id, unique_id[8], fw_type, fw_ver, build_num`)
/// into `out`, returning the number of bytes written.
pub fn encode_sync(
    chip_id: u32,
    unique_id: &[u8; 8],
    fw_type: u8,
    fw_ver: u8,
    build_num: i32,
    out: &mut [u8],
) -> Option<usize> {
    let mut w = ByteWriter::new(out);
    w.u32(chip_id)?;
    w.bytes(unique_id)?;
    w.u8(fw_type)?;
    w.u8(fw_ver)?;
    w.i32(build_num)?;
    Some(w.pos)
}

/// SAMPLES flag bits (§4.9).
pub mod samples_flags {
    pub const NEW_WAVEPOINT: u8 = 1 << 0;
    pub const LAST_IN_FRAME: u8 = 1 << 1;
    pub const CONTINUOUS: u8 = 1 << 2;
    pub const SINGLE_SHOT: u8 = 1 << 3;
    pub const LOGIC_MODE: u8 = 1 << 4;
}

/// Writes a full SAMPLES payload (`flags, n_channels, [ch_id|range]*n,
/// real_rate_hz, trigger_idx` followed by `sample_bytes` verbatim) into
/// `out`, returning the number of bytes written, or `None` if `out` is too
/// small or there are more than [`MAX_CHANNELS`] channels.
pub fn encode_samples_payload(
    flags: u8,
    channels: &[ChannelConfig],
    real_rate_hz: u32,
    trigger_idx: i32,
    sample_bytes: &[u8],
    out: &mut [u8],
) -> Option<usize> {
    if channels.len() > MAX_CHANNELS {
        return None;
    }
    let mut w = ByteWriter::new(out);
    w.u8(flags)?;
    w.u8(channels.len() as u8)?;
    for c in channels {
        w.u8(c.to_byte())?;
    }
    w.u32(real_rate_hz)?;
    w.i32(trigger_idx)?;
    w.bytes(sample_bytes)?;
    Some(w.pos)
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.buf.len() {
            return Err(ProtocolError::Truncated);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.take(1)?[0] as i8)
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let s = self.take(2)?;
        Ok(u16::from_be_bytes([s[0], s[1]]))
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.u16()? as i16)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let s = self.take(4)?;
        Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn channels(&mut self) -> Result<Vec<ChannelConfig, MAX_CHANNELS>, ProtocolError> {
        let n = self.u8()? as usize;
        if n > MAX_CHANNELS {
            return Err(ProtocolError::TooManyChannels);
        }
        let mut channels = Vec::new();
        for _ in 0..n {
            let b = self.u8()?;
            // Capacity already checked above; this cannot fail.
            let _ = channels.push(ChannelConfig::from_byte(b));
        }
        Ok(channels)
    }
}

struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        ByteWriter { buf, pos: 0 }
    }

    fn push(&mut self, bytes: &[u8]) -> Option<()> {
        if self.pos + bytes.len() > self.buf.len() {
            return None;
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Some(())
    }

    fn u8(&mut self, v: u8) -> Option<()> {
        self.push(&[v])
    }

    fn i16(&mut self, v: i16) -> Option<()> {
        self.push(&v.to_be_bytes())
    }

    fn u32(&mut self, v: u32) -> Option<()> {
        self.push(&v.to_be_bytes())
    }

    fn i32(&mut self, v: i32) -> Option<()> {
        self.push(&v.to_be_bytes())
    }

    fn bytes(&mut self, v: &[u8]) -> Option<()> {
        self.push(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_sync_response_parses_fields() {
        let mut payload = Vec::<u8, 32>::new();
        payload.extend_from_slice(&[0x01]).unwrap(); // flags
        payload.extend_from_slice(&[0, 0, 0, 0]).unwrap(); // reserved
        payload.extend_from_slice(&[0x01]).unwrap(); // n_channels
        payload
            .extend_from_slice(&[ChannelConfig { ch_id: 0, range: 1 }.to_byte()])
            .unwrap();
        payload.extend_from_slice(&[0xFBu8]).unwrap(); // range_lo_off = -5
        payload.extend_from_slice(&[0x05u8]).unwrap(); // range_hi_off = 5
        payload.extend_from_slice(&100_000u32.to_be_bytes()).unwrap();
        payload.extend_from_slice(&[0x01, 0x00, 0x00]).unwrap(); // mode, channel, kind
        payload.extend_from_slice(&128i16.to_be_bytes()).unwrap();

        let msg = decode(msg_type::SYNC_RESPONSE, &payload).unwrap();
        match msg {
            IncomingMessage::SyncResponse(s) => {
                assert_eq!(s.flags, 0x01);
                assert_eq!(s.channels.len(), 1);
                assert_eq!(s.channels[0], ChannelConfig { ch_id: 0, range: 1 });
                assert_eq!(s.range_lo_off, -5);
                assert_eq!(s.range_hi_off, 5);
                assert_eq!(s.timebase_centi_us, 100_000);
                assert_eq!(
                    s.trigger,
                    TriggerBlock {
                        mode: 1,
                        channel: 0,
                        kind: 0,
                        level: 128
                    }
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_horz_scale_changed() {
        let payload = 250_000u32.to_be_bytes();
        let msg = decode(msg_type::HORZ_SCALE_CHANGED, &payload).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::HorzScaleChanged {
                timebase_centi_us: 250_000
            }
        );
    }

    #[test]
    fn decode_channels_changed_round_trips_channel_byte() {
        let payload = [0x02u8, 0x10, 0x21]; // n=2, then packed configs
        let msg = decode(msg_type::CHANNELS_CHANGED, &payload).unwrap();
        match msg {
            IncomingMessage::ChannelsChanged { channels } => {
                assert_eq!(channels.len(), 2);
                assert_eq!(channels[0], ChannelConfig { ch_id: 0, range: 1 });
                assert_eq!(channels[1], ChannelConfig { ch_id: 1, range: 2 });
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_trigger_changed() {
        let payload = [0x02u8, 0x03, 0x01, 0xFF, 0x38]; // level = -200
        let msg = decode(msg_type::TRIGGER_CHANGED, &payload).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::TriggerChanged(TriggerBlock {
                mode: 2,
                channel: 3,
                kind: 1,
                level: -200
            })
        );
    }

    #[test]
    fn decode_sig_gen_and_selected_rate_and_pre_trigger() {
        let sig_gen_payload = [1u8, 5, 0, 0, 0x27, 0x10, 0, 100];
        assert_eq!(
            decode(msg_type::SIG_GEN, &sig_gen_payload).unwrap(),
            IncomingMessage::SigGen {
                func: 1,
                gpio: 5,
                freq_hz: 10_000,
                duty: 100
            }
        );

        let rate_payload = 1_000_000u32.to_be_bytes();
        assert_eq!(
            decode(msg_type::SELECTED_SAMPLE_RATE, &rate_payload).unwrap(),
            IncomingMessage::SelectedSampleRate { rate_hz: 1_000_000 }
        );

        let pre_trigger_payload = [50u8];
        assert_eq!(
            decode(msg_type::PRE_TRIGGER_SAMPLES, &pre_trigger_payload).unwrap(),
            IncomingMessage::PreTriggerSamples { percent: 50 }
        );
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert_eq!(decode(0x42, &[]), Err(ProtocolError::UnknownType(0x42)));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        assert_eq!(
            decode(msg_type::HORZ_SCALE_CHANGED, &[0, 0]),
            Err(ProtocolError::Truncated)
        );
    }

    #[test]
    fn encode_sync_matches_expected_layout() {
        let mut out = [0u8; 18];
        let unique_id = [1, 2, 3, 4, 5, 6, 7, 8];
        let n = encode_sync(0xDEAD_BEEF, &unique_id, 9, 3, -1, &mut out).unwrap();
        assert_eq!(n, 18);
        assert_eq!(&out[0..4], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(&out[4..12], &unique_id);
        assert_eq!(out[12], 9);
        assert_eq!(out[13], 3);
        assert_eq!(&out[14..18], &(-1i32).to_be_bytes());
    }

    #[test]
    fn encode_samples_payload_matches_expected_layout() {
        let channels = [ChannelConfig { ch_id: 0, range: 2 }];
        let sample_bytes = [9u8, 9, 9, 9];
        let mut out = [0u8; 32];
        let n = encode_samples_payload(
            samples_flags::NEW_WAVEPOINT | samples_flags::CONTINUOUS,
            &channels,
            500_000,
            -2,
            &sample_bytes,
            &mut out,
        )
        .unwrap();
        assert_eq!(n, 1 + 1 + 1 + 4 + 4 + 4);
        assert_eq!(out[0], samples_flags::NEW_WAVEPOINT | samples_flags::CONTINUOUS);
        assert_eq!(out[1], 1);
        assert_eq!(out[2], ChannelConfig { ch_id: 0, range: 2 }.to_byte());
        assert_eq!(&out[3..7], &500_000u32.to_be_bytes());
        assert_eq!(&out[7..11], &(-2i32).to_be_bytes());
        assert_eq!(&out[11..15], &sample_bytes);
    }

    #[test]
    fn encode_samples_payload_rejects_too_many_channels() {
        let channels = [ChannelConfig { ch_id: 0, range: 0 }; MAX_CHANNELS + 1];
        let mut out = [0u8; 64];
        assert_eq!(
            encode_samples_payload(0, &channels, 0, 0, &[], &mut out),
            None
        );
    }
}
