//! Property tests for the WebSocket frame codec.
//!
//! 1. Arbitrary text never panics `decode_server` (it returns `Err` or a frame).
//! 2. Any well-formed `new_message` frame decodes to the message it carries.
//! 3. Unknown frame types always decode to `ServerFrame::Unknown`.
//! 4. Timestamps in fraction or exponent form decode to the same number.

use proptest::prelude::*;
use tardichat_proto::frame::{ServerFrame, decode_server};
use tardichat_proto::message::{ChannelId, Message, MessageContent, MessageId, Timestamp};

/// Strategy for generating arbitrary `MessageId` values of either shape.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    prop_oneof![
        any::<i64>().prop_map(MessageId::Number),
        "[a-z0-9-]{1,24}".prop_map(MessageId::Text),
    ]
}

/// Strategy for generating arbitrary `Message` values.
fn arb_message() -> impl Strategy<Value = Message> {
    (arb_message_id(), any::<u64>(), any::<i64>(), ".{0,256}").prop_map(
        |(id, channel, ts, text)| Message {
            id,
            channel_id: ChannelId::new(channel),
            timestamp: Timestamp::from_millis(ts),
            content: MessageContent::Text(text),
        },
    )
}

proptest! {
    #[test]
    fn arbitrary_text_never_panics(text in ".{0,512}") {
        let _ = decode_server(&text);
    }

    #[test]
    fn new_message_frame_carries_its_message(msg in arb_message()) {
        let text = serde_json::json!({"type": "new_message", "data": &msg}).to_string();
        let frame = decode_server(&text).unwrap();
        prop_assert_eq!(frame, ServerFrame::NewMessage { data: msg });
    }

    #[test]
    fn unknown_types_are_ignored(kind in "[a-z_]{1,16}") {
        prop_assume!(kind != "new_message");
        let text = serde_json::json!({"type": kind, "payload": 1}).to_string();
        prop_assert_eq!(decode_server(&text).unwrap(), ServerFrame::Unknown);
    }

    #[test]
    fn non_integer_timestamps_decode(whole in 0i64..4_000_000_000_000, frac in 1u32..1000, exp in any::<bool>()) {
        let literal = if exp {
            format!("{whole}e-3")
        } else {
            format!("{whole}.{frac:03}")
        };
        let text = format!(
            r#"{{"type":"new_message","data":{{"id":1,"channelId":7,"timestamp":{literal},"content":{{"type":"Text","value":"x"}}}}}}"#
        );
        let expected: f64 = literal.parse().unwrap();
        match decode_server(&text).unwrap() {
            ServerFrame::NewMessage { data } => {
                // Within one ulp: the JSON parser need not round like `str::parse`.
                let got = data.timestamp.as_f64();
                prop_assert!((got - expected).abs() <= expected.abs() * f64::EPSILON);
            }
            ServerFrame::Unknown => prop_assert!(false, "decoded as Unknown"),
        }
    }
}
