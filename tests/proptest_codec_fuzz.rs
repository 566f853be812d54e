//! Fuzz-style property tests for the wire codec
//!
//! These tests validate that the frame decoder handles arbitrary
//! network input gracefully without crashing or reading out of bounds.

use pixelcanvas_net::codec::{
    decode_server_message, encode_captcha_response, encode_chunk_request, encode_world_join,
};
use pixelcanvas_net::protocol::{ChunkCoord, ServerMessage, CHUNK_LOAD_MIN_LEN};
use proptest::prelude::*;

proptest! {
    /// Property: arbitrary bytes never crash the decoder
    #[test]
    fn arbitrary_bytes_dont_crash(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = decode_server_message(&random_bytes);
        // No panic = success
    }

    /// Property: arbitrary payloads behind each known opcode never crash
    #[test]
    fn arbitrary_payloads_dont_crash(
        opcode in 0u8..8,
        payload in prop::collection::vec(any::<u8>(), 0..1200),
    ) {
        let mut frame = vec![opcode];
        frame.extend_from_slice(&payload);
        let _result = decode_server_message(&frame);
    }

    /// Property: a valid chunk frame decodes to 256 pixels matching the
    /// raw bytes grouped by three, at every truncation point below the
    /// minimum the decoder reports TooShort instead
    #[test]
    fn chunk_load_decodes_or_rejects(
        x in any::<i32>(),
        y in any::<i32>(),
        locked in any::<bool>(),
        data in prop::collection::vec(any::<u8>(), 768..=768),
        truncate_at in 0usize..CHUNK_LOAD_MIN_LEN,
    ) {
        let mut frame = vec![2u8];
        frame.extend_from_slice(&x.to_le_bytes());
        frame.extend_from_slice(&y.to_le_bytes());
        frame.push(locked as u8);
        frame.extend_from_slice(&data);

        match decode_server_message(&frame).unwrap() {
            ServerMessage::ChunkLoad { coord, locked: l, pixels } => {
                prop_assert_eq!(coord, ChunkCoord { x, y });
                prop_assert_eq!(l, locked);
                prop_assert_eq!(pixels.len(), 256);
                for (i, p) in pixels.iter().enumerate() {
                    prop_assert_eq!(p.r, data[i * 3]);
                    prop_assert_eq!(p.g, data[i * 3 + 1]);
                    prop_assert_eq!(p.b, data[i * 3 + 2]);
                }
            }
            other => prop_assert!(false, "expected ChunkLoad, got {:?}", other),
        }

        frame.truncate(truncate_at);
        prop_assert!(decode_server_message(&frame).is_err());
    }

    /// Property: world-update frames with arbitrary counts and bodies
    /// never read past the end
    #[test]
    fn world_update_partial_bodies_handled(
        player_count in any::<u8>(),
        body in prop::collection::vec(any::<u8>(), 0..600),
    ) {
        let mut frame = vec![1u8, player_count];
        frame.extend_from_slice(&body);
        let result = decode_server_message(&frame);
        // Opcode 1 with a count byte always decodes; records past the end
        // of the body are dropped.
        prop_assert!(result.is_ok());
    }

    /// Property: the chunk request encoder is total and 9 bytes
    #[test]
    fn chunk_request_is_nine_bytes(x in any::<i32>(), y in any::<i32>()) {
        let frame = encode_chunk_request(ChunkCoord { x, y });
        prop_assert_eq!(frame.len(), 9);
        prop_assert_eq!(frame[0], 0x02);
    }

    /// Property: the captcha response is the prefix plus the raw token
    #[test]
    fn captcha_response_preserves_token(token in "[ -~]{0,64}") {
        let frame = encode_captcha_response(&token);
        prop_assert_eq!(&frame[..7], b"CaptchA");
        prop_assert_eq!(&frame[7..], token.as_bytes());
    }

    /// Property: world-join output is always filtered, bounded, and
    /// terminated by the verification bytes
    #[test]
    fn world_join_always_valid(name in "\\PC{0,64}") {
        let frame = encode_world_join(&name);
        prop_assert!(frame.len() >= 2);
        prop_assert!(frame.len() <= 26);
        let (body, tail) = frame.split_at(frame.len() - 2);
        prop_assert_eq!(tail, &[0xDD, 0x63]);
        for b in body {
            prop_assert!(matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.'));
        }
    }
}
