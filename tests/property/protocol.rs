#![allow(clippy::unwrap_used)]

//! Property-based tests for the JSON frame decoder.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never panics `decode_client` (returns `Err` gracefully).
//! 2. Any `type` other than `identify`/`move` decodes to `Unknown`.
//! 3. Usernames survive the wire unchanged, whatever characters they hold.
//! 4. Frames over the size limit are always rejected.

use galaxy_proto::codec::{self, CodecError};
use galaxy_proto::message::ClientMessage;
use proptest::prelude::*;

const MAX: usize = 16 * 1024;

proptest! {
    #[test]
    fn arbitrary_text_never_panics(text in ".{0,256}") {
        let _ = codec::decode_client(&text, MAX);
    }

    #[test]
    fn unrecognized_types_are_unknown(kind in "[a-z_]{1,16}", value in any::<i64>()) {
        prop_assume!(kind != "identify" && kind != "move");
        let frame = serde_json::json!({ "type": kind, "payload": value }).to_string();
        prop_assert_eq!(codec::decode_client(&frame, MAX).unwrap(), ClientMessage::Unknown);
    }

    #[test]
    fn usernames_survive_the_wire(username in "\\PC{0,64}") {
        let msg = ClientMessage::Identify { username };
        let frame = codec::encode_client(&msg).unwrap();
        prop_assert_eq!(codec::decode_client(&frame, MAX).unwrap(), msg);
    }

    #[test]
    fn oversized_frames_are_rejected(extra in 1usize..512) {
        let frame = format!(r#"{{"type":"identify","username":"{}"}}"#, "x".repeat(extra));
        let limit = frame.len() - 1;
        let is_too_large = matches!(
            codec::decode_client(&frame, limit),
            Err(CodecError::TooLarge { .. })
        );
        prop_assert!(is_too_large);
    }
}
