//! Protocol message definitions for the pixel-canvas wire format.
//!
//! All multi-byte integers on the wire are little-endian and unaligned.
//! The first byte of every frame is the opcode.

/// Edge length of a chunk in world pixels.
pub const CHUNK_SIZE: i32 = 16;

/// Number of pixels in one chunk (16x16, row-major).
pub const CHUNK_PIXELS: usize = 256;

/// Raw RGB payload size of a chunk (256 pixels * 3 bytes).
pub const CHUNK_DATA_LEN: usize = CHUNK_PIXELS * 3;

/// Minimum total length of a `ChunkLoad` frame:
/// opcode + i32 x + i32 y + locked flag + 768 bytes of pixel data.
pub const CHUNK_LOAD_MIN_LEN: usize = 1 + 4 + 4 + 1 + CHUNK_DATA_LEN;

/// Maximum byte length of a world name inside a `WorldJoin` frame.
pub const MAX_WORLD_NAME_LEN: usize = 24;

/// Verification constant appended to the world-join frame, sent
/// little-endian as `0xDD 0x63`. The server rejects joins without it.
pub const WORLD_VERIFICATION: u16 = 25565;

/// ASCII prefix of a captcha-response frame.
pub const CAPTCHA_PREFIX: &[u8] = b"CaptchA";

/// Client->server opcode for a chunk request.
pub const OP_CHUNK_REQUEST: u8 = 0x02;

/// Remote player identifier.
pub type PlayerId = u32;

/// Integer chunk address (world coordinate floor-divided by [`CHUNK_SIZE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// Chunk column.
    pub x: i32,
    /// Chunk row.
    pub y: i32,
}

impl ChunkCoord {
    /// Chunk containing the given world coordinate.
    pub fn from_world(x: i32, y: i32) -> Self {
        Self {
            x: x.div_euclid(CHUNK_SIZE),
            y: y.div_euclid(CHUNK_SIZE),
        }
    }
}

/// One RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

/// Snapshot of a remote player carried by a `WorldUpdate` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerUpdate {
    /// Player identifier.
    pub id: PlayerId,
    /// World x position.
    pub x: i32,
    /// World y position.
    pub y: i32,
    /// Cursor color.
    pub color: Rgb,
    /// Selected tool id.
    pub tool: u8,
}

/// Single-pixel update carried by a `WorldUpdate` frame.
///
/// Decoded for completeness; the session does not forward these yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelUpdate {
    /// Player that placed the pixel.
    pub id: PlayerId,
    /// World x position.
    pub x: i32,
    /// World y position.
    pub y: i32,
    /// New pixel color.
    pub color: Rgb,
}

/// Captcha gate state as pushed by the server (opcode 5 payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaWireState {
    /// Server is waiting for a token.
    Waiting = 0,
    /// Token received, verification in progress.
    Verifying = 1,
    /// Token verified.
    Verified = 2,
    /// Session cleared; world-join may proceed.
    Ok = 3,
    /// Token rejected; a fresh token is required.
    Invalid = 4,
}

impl CaptchaWireState {
    /// Map a wire byte to a state, if valid.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Waiting),
            1 => Some(Self::Verifying),
            2 => Some(Self::Verified),
            3 => Some(Self::Ok),
            4 => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Decoded server->client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Opcode 0: assigns this client's player id.
    SetId {
        /// Assigned player id.
        id: PlayerId,
    },

    /// Opcode 1: batched world state delta.
    WorldUpdate {
        /// Moved/updated players.
        players: Vec<PlayerUpdate>,
        /// Pixel placements (decoded, currently unforwarded).
        pixels: Vec<PixelUpdate>,
        /// Players that left and must be removed from the table.
        disconnects: Vec<PlayerId>,
    },

    /// Opcode 2: full pixel data for one chunk.
    ChunkLoad {
        /// Chunk address.
        coord: ChunkCoord,
        /// Whether the chunk is write-protected.
        locked: bool,
        /// 256 pixels in row-major order.
        pixels: Vec<Rgb>,
    },

    /// Opcode 3: server-initiated camera move (placeholder handling).
    Teleport {
        /// Target world x.
        x: i32,
        /// Target world y.
        y: i32,
    },

    /// Opcode 4: rank assignment (placeholder handling).
    SetRank {
        /// New rank.
        rank: u8,
    },

    /// Opcode 5: captcha gate state change.
    CaptchaState(CaptchaWireState),

    /// Opcode 6: pixel-placement quota (placeholder handling).
    SetPixelQuota {
        /// Allowed placements per period.
        rate: u16,
        /// Period length.
        per: u16,
    },

    /// Opcode 7: chunk protection change (placeholder handling).
    ChunkProtected {
        /// Chunk address.
        coord: ChunkCoord,
        /// Protection state.
        state: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_coord_floors_negative_world_coords() {
        assert_eq!(ChunkCoord::from_world(0, 0), ChunkCoord { x: 0, y: 0 });
        assert_eq!(ChunkCoord::from_world(15, 15), ChunkCoord { x: 0, y: 0 });
        assert_eq!(ChunkCoord::from_world(16, 31), ChunkCoord { x: 1, y: 1 });
        assert_eq!(ChunkCoord::from_world(-1, -16), ChunkCoord { x: -1, y: -1 });
        assert_eq!(ChunkCoord::from_world(-17, -33), ChunkCoord { x: -2, y: -3 });
    }

    #[test]
    fn captcha_wire_state_mapping() {
        assert_eq!(CaptchaWireState::from_byte(0), Some(CaptchaWireState::Waiting));
        assert_eq!(CaptchaWireState::from_byte(3), Some(CaptchaWireState::Ok));
        assert_eq!(CaptchaWireState::from_byte(4), Some(CaptchaWireState::Invalid));
        assert_eq!(CaptchaWireState::from_byte(5), None);
    }
}
