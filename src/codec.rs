//! Stateless encoding and decoding of wire frames.
//!
//! Decoding is fully bounds-checked: a frame shorter than the minimum for
//! its opcode yields [`DecodeError::TooShort`] and never reads out of
//! bounds. Variable-length sub-records inside a `WorldUpdate` are decoded
//! up to the first incomplete record, matching the server's framing.

use crate::protocol::{
    CaptchaWireState, ChunkCoord, PixelUpdate, PlayerUpdate, Rgb, ServerMessage, CAPTCHA_PREFIX,
    CHUNK_DATA_LEN, CHUNK_LOAD_MIN_LEN, MAX_WORLD_NAME_LEN, OP_CHUNK_REQUEST, WORLD_VERIFICATION,
};
use thiserror::Error;

/// Reasons a frame failed to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame carried no bytes at all.
    #[error("empty frame")]
    Empty,

    /// The frame is shorter than the minimum for its opcode.
    #[error("frame too short for opcode {opcode}: {len} bytes, need at least {need}")]
    TooShort {
        /// Frame opcode.
        opcode: u8,
        /// Actual frame length.
        len: usize,
        /// Minimum required length.
        need: usize,
    },

    /// The opcode is not part of the protocol.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// A field carried a value outside its valid range.
    #[error("invalid value {value} for {field}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending byte.
        value: u8,
    },
}

/// Bounds-checked little-endian reader over a frame payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.buf.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Option<i32> {
        self.u32().map(|v| v as i32)
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }
}

fn too_short(opcode: u8, len: usize, need: usize) -> DecodeError {
    DecodeError::TooShort { opcode, len, need }
}

/// Decode a server->client frame.
pub fn decode_server_message(frame: &[u8]) -> Result<ServerMessage, DecodeError> {
    let opcode = *frame.first().ok_or(DecodeError::Empty)?;
    let mut r = Reader::new(&frame[1..]);

    match opcode {
        0 => {
            let id = r.u32().ok_or_else(|| too_short(opcode, frame.len(), 5))?;
            Ok(ServerMessage::SetId { id })
        }
        1 => {
            let player_count = r.u8().ok_or_else(|| too_short(opcode, frame.len(), 2))?;
            let mut players = Vec::with_capacity(player_count as usize);
            for _ in 0..player_count {
                // 16-byte record; stop at the first incomplete one.
                if r.remaining() < 16 {
                    break;
                }
                let id = r.u32().unwrap_or_default();
                let x = r.i32().unwrap_or_default();
                let y = r.i32().unwrap_or_default();
                let color = Rgb {
                    r: r.u8().unwrap_or_default(),
                    g: r.u8().unwrap_or_default(),
                    b: r.u8().unwrap_or_default(),
                };
                let tool = r.u8().unwrap_or_default();
                players.push(PlayerUpdate { id, x, y, color, tool });
            }

            let mut pixels = Vec::new();
            if let Some(pixel_count) = r.u16() {
                pixels.reserve(pixel_count.min(64) as usize);
                for _ in 0..pixel_count {
                    // 15-byte record.
                    if r.remaining() < 15 {
                        break;
                    }
                    let id = r.u32().unwrap_or_default();
                    let x = r.i32().unwrap_or_default();
                    let y = r.i32().unwrap_or_default();
                    let color = Rgb {
                        r: r.u8().unwrap_or_default(),
                        g: r.u8().unwrap_or_default(),
                        b: r.u8().unwrap_or_default(),
                    };
                    pixels.push(PixelUpdate { id, x, y, color });
                }
            }

            let mut disconnects = Vec::new();
            if let Some(disconnect_count) = r.u8() {
                for _ in 0..disconnect_count {
                    match r.u32() {
                        Some(id) => disconnects.push(id),
                        None => break,
                    }
                }
            }

            Ok(ServerMessage::WorldUpdate {
                players,
                pixels,
                disconnects,
            })
        }
        2 => {
            let short = || too_short(opcode, frame.len(), CHUNK_LOAD_MIN_LEN);
            let x = r.i32().ok_or_else(short)?;
            let y = r.i32().ok_or_else(short)?;
            let locked = r.u8().ok_or_else(short)? != 0;
            let raw = r.bytes(CHUNK_DATA_LEN).ok_or_else(short)?;
            let pixels = raw
                .chunks_exact(3)
                .map(|p| Rgb {
                    r: p[0],
                    g: p[1],
                    b: p[2],
                })
                .collect();
            Ok(ServerMessage::ChunkLoad {
                coord: ChunkCoord { x, y },
                locked,
                pixels,
            })
        }
        3 => {
            let short = || too_short(opcode, frame.len(), 9);
            let x = r.i32().ok_or_else(short)?;
            let y = r.i32().ok_or_else(short)?;
            Ok(ServerMessage::Teleport { x, y })
        }
        4 => {
            let rank = r.u8().ok_or_else(|| too_short(opcode, frame.len(), 2))?;
            Ok(ServerMessage::SetRank { rank })
        }
        5 => {
            let state = r.u8().ok_or_else(|| too_short(opcode, frame.len(), 2))?;
            let state = CaptchaWireState::from_byte(state).ok_or(DecodeError::InvalidValue {
                field: "captcha state",
                value: state,
            })?;
            Ok(ServerMessage::CaptchaState(state))
        }
        6 => {
            let short = || too_short(opcode, frame.len(), 5);
            let rate = r.u16().ok_or_else(short)?;
            let per = r.u16().ok_or_else(short)?;
            Ok(ServerMessage::SetPixelQuota { rate, per })
        }
        7 => {
            let short = || too_short(opcode, frame.len(), 10);
            let x = r.i32().ok_or_else(short)?;
            let y = r.i32().ok_or_else(short)?;
            let state = r.u8().ok_or_else(short)?;
            Ok(ServerMessage::ChunkProtected {
                coord: ChunkCoord { x, y },
                state,
            })
        }
        other => Err(DecodeError::UnknownOpcode(other)),
    }
}

/// Encode a 9-byte chunk request frame.
pub fn encode_chunk_request(coord: ChunkCoord) -> [u8; 9] {
    let mut frame = [0u8; 9];
    frame[0] = OP_CHUNK_REQUEST;
    frame[1..5].copy_from_slice(&coord.x.to_le_bytes());
    frame[5..9].copy_from_slice(&coord.y.to_le_bytes());
    frame
}

/// Encode a captcha-response frame: the literal `"CaptchA"` prefix followed
/// by the raw token bytes.
pub fn encode_captcha_response(token: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CAPTCHA_PREFIX.len() + token.len());
    frame.extend_from_slice(CAPTCHA_PREFIX);
    frame.extend_from_slice(token.as_bytes());
    frame
}

/// Encode a world-join frame.
///
/// The name is lower-cased, filtered to `[a-z0-9_.]`, truncated to 24
/// bytes, then followed by the little-endian verification constant. The
/// server rejects any other byte sequence, so this must stay bit-exact.
pub fn encode_world_join(world_name: &str) -> Vec<u8> {
    let mut frame: Vec<u8> = world_name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.'))
        .map(|c| c as u8)
        .take(MAX_WORLD_NAME_LEN)
        .collect();
    frame.extend_from_slice(&WORLD_VERIFICATION.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_load_frame(x: i32, y: i32, locked: u8) -> Vec<u8> {
        let mut frame = vec![2u8];
        frame.extend_from_slice(&x.to_le_bytes());
        frame.extend_from_slice(&y.to_le_bytes());
        frame.push(locked);
        for i in 0..CHUNK_DATA_LEN {
            frame.push((i % 251) as u8);
        }
        frame
    }

    #[test]
    fn empty_frame_rejected() {
        assert_eq!(decode_server_message(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(
            decode_server_message(&[99, 0, 0]),
            Err(DecodeError::UnknownOpcode(99))
        );
    }

    #[test]
    fn set_id_roundtrip() {
        let mut frame = vec![0u8];
        frame.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(
            decode_server_message(&frame),
            Ok(ServerMessage::SetId { id: 0xDEAD_BEEF })
        );
    }

    #[test]
    fn set_id_too_short() {
        assert!(matches!(
            decode_server_message(&[0, 1, 2]),
            Err(DecodeError::TooShort { opcode: 0, .. })
        ));
    }

    #[test]
    fn chunk_load_decodes_256_row_major_pixels() {
        let frame = chunk_load_frame(-3, 7, 1);
        match decode_server_message(&frame).unwrap() {
            ServerMessage::ChunkLoad {
                coord,
                locked,
                pixels,
            } => {
                assert_eq!(coord, ChunkCoord { x: -3, y: 7 });
                assert!(locked);
                assert_eq!(pixels.len(), 256);
                // Pixel i maps to raw bytes 3i..3i+3.
                for (i, p) in pixels.iter().enumerate() {
                    assert_eq!(p.r, frame[10 + i * 3]);
                    assert_eq!(p.g, frame[10 + i * 3 + 1]);
                    assert_eq!(p.b, frame[10 + i * 3 + 2]);
                }
            }
            other => panic!("expected ChunkLoad, got {other:?}"),
        }
    }

    #[test]
    fn chunk_load_below_minimum_rejected() {
        let mut frame = chunk_load_frame(0, 0, 0);
        frame.truncate(CHUNK_LOAD_MIN_LEN - 1);
        assert!(matches!(
            decode_server_message(&frame),
            Err(DecodeError::TooShort { opcode: 2, .. })
        ));
    }

    #[test]
    fn world_update_full_frame() {
        let mut frame = vec![1u8, 2]; // two players
        for (id, x, y) in [(7u32, 10i32, -20i32), (8, 0, 5)] {
            frame.extend_from_slice(&id.to_le_bytes());
            frame.extend_from_slice(&x.to_le_bytes());
            frame.extend_from_slice(&y.to_le_bytes());
            frame.extend_from_slice(&[1, 2, 3, 4]); // r g b tool
        }
        frame.extend_from_slice(&1u16.to_le_bytes()); // one pixel
        frame.extend_from_slice(&9u32.to_le_bytes());
        frame.extend_from_slice(&3i32.to_le_bytes());
        frame.extend_from_slice(&4i32.to_le_bytes());
        frame.extend_from_slice(&[255, 0, 128]);
        frame.push(1); // one disconnect
        frame.extend_from_slice(&7u32.to_le_bytes());

        match decode_server_message(&frame).unwrap() {
            ServerMessage::WorldUpdate {
                players,
                pixels,
                disconnects,
            } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[0].id, 7);
                assert_eq!(players[0].y, -20);
                assert_eq!(players[1].tool, 4);
                assert_eq!(pixels.len(), 1);
                assert_eq!(pixels[0].color, Rgb { r: 255, g: 0, b: 128 });
                assert_eq!(disconnects, vec![7]);
            }
            other => panic!("expected WorldUpdate, got {other:?}"),
        }
    }

    #[test]
    fn world_update_truncated_records_kept_partial() {
        // Claims two players but carries only one full record.
        let mut frame = vec![1u8, 2];
        frame.extend_from_slice(&1u32.to_le_bytes());
        frame.extend_from_slice(&0i32.to_le_bytes());
        frame.extend_from_slice(&0i32.to_le_bytes());
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame.extend_from_slice(&[9, 9]); // partial second record

        match decode_server_message(&frame).unwrap() {
            ServerMessage::WorldUpdate { players, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, 1);
            }
            other => panic!("expected WorldUpdate, got {other:?}"),
        }
    }

    #[test]
    fn captcha_state_frames() {
        assert_eq!(
            decode_server_message(&[5, 3]),
            Ok(ServerMessage::CaptchaState(CaptchaWireState::Ok))
        );
        assert_eq!(
            decode_server_message(&[5, 4]),
            Ok(ServerMessage::CaptchaState(CaptchaWireState::Invalid))
        );
        assert!(matches!(
            decode_server_message(&[5, 9]),
            Err(DecodeError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_server_message(&[5]),
            Err(DecodeError::TooShort { opcode: 5, .. })
        ));
    }

    #[test]
    fn chunk_request_layout() {
        let frame = encode_chunk_request(ChunkCoord { x: -1, y: 2 });
        assert_eq!(frame[0], 0x02);
        assert_eq!(&frame[1..5], &(-1i32).to_le_bytes());
        assert_eq!(&frame[5..9], &2i32.to_le_bytes());
    }

    #[test]
    fn captcha_response_layout() {
        assert_eq!(encode_captcha_response("abc"), b"CaptchAabc".to_vec());
        assert_eq!(encode_captcha_response(""), b"CaptchA".to_vec());
    }

    #[test]
    fn world_join_filters_and_appends_verification() {
        let frame = encode_world_join("My World!");
        assert_eq!(frame, [b"myworld".as_slice(), &[0xDD, 0x63]].concat());
    }

    #[test]
    fn world_join_truncates_to_24_bytes() {
        let frame = encode_world_join(&"a".repeat(40));
        assert_eq!(frame.len(), 24 + 2);
        assert_eq!(&frame[24..], &[0xDD, 0x63]);
    }

    #[test]
    fn world_join_keeps_underscore_dot_digits() {
        let frame = encode_world_join("Test_World.2 ");
        assert_eq!(frame, [b"test_world.2".as_slice(), &[0xDD, 0x63]].concat());
    }
}
