#![cfg(not(loom))]
//! Property and boundary tests for WebSocket framing.

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use proptest::prelude::*;
use rstest::rstest;
use tokio_util::codec::{FramedRead, FramedWrite};
use weft::websocket::{
    CloseCode,
    CloseReason,
    DEFAULT_MAX_FRAME_SIZE,
    Frame,
    FrameError,
    FrameType,
    Serializer,
    WebSocketCodec,
    read_frame,
};
use weft_testing::client_frame;

fn serialize(frames: impl IntoIterator<Item = Frame>) -> BytesMut {
    let mut serializer = Serializer::new();
    for frame in frames {
        serializer.enqueue(frame);
    }
    let mut out = BytesMut::new();
    serializer.serialize(&mut out);
    out
}

fn decode_one(bytes: &mut BytesMut) -> Frame {
    read_frame(bytes, usize::MAX)
        .expect("valid frame")
        .expect("complete frame")
}

#[rstest]
#[case::empty(0, 2)]
#[case::largest_short(125, 2)]
#[case::smallest_16_bit(126, 4)]
#[case::largest_16_bit(65_535, 4)]
#[case::smallest_64_bit(65_536, 10)]
fn length_boundaries_round_trip(#[case] len: usize, #[case] header_len: usize) {
    let frame = Frame::binary(true, vec![0xa5; len]);
    let mut bytes = serialize([frame.clone()]);
    assert_eq!(bytes.len(), header_len + len);

    assert_eq!(decode_one(&mut bytes), frame);
    assert!(bytes.is_empty());
}

#[test]
fn hello_then_normal_close_scenario() {
    let mut bytes = serialize([
        Frame::text("Hello"),
        Frame::close_with(&CloseReason::new(CloseCode::Normal, "")),
    ]);
    assert_eq!(
        &bytes[..],
        [0x81, 0x05, b'H', b'e', b'l', b'l', b'o', 0x88, 0x02, 0x03, 0xe8]
    );

    let hello = decode_one(&mut bytes);
    assert_eq!(hello.read_text().expect("utf-8"), "Hello");
    let close = decode_one(&mut bytes);
    assert_eq!(
        close.read_reason().expect("valid close"),
        Some(CloseReason::new(CloseCode::Normal, ""))
    );
}

#[rstest]
#[case::long_ping(Frame::ping(vec![0; 126]))]
#[case::fragmented_pong(Frame::new(FrameType::Pong, false, Bytes::new()))]
#[tokio::test]
async fn codec_refuses_invalid_control_frames(#[case] frame: Frame) {
    let mut sink = FramedWrite::new(Vec::new(), WebSocketCodec::default());
    assert!(matches!(
        sink.send(frame).await,
        Err(FrameError::InvalidControlFrame { .. })
    ));
}

#[tokio::test]
async fn framed_read_decodes_masked_client_frames() {
    let frames = [
        Frame::text("first"),
        Frame::binary(false, vec![1, 2, 3]),
        Frame::new(FrameType::Binary, true, vec![4]),
        Frame::close_with(&CloseReason::new(CloseCode::GoingAway, "bye")),
    ];
    let wire: Vec<u8> = frames.iter().flat_map(client_frame).collect();

    let decoded: Vec<Frame> = FramedRead::new(&wire[..], WebSocketCodec::default())
        .map(|frame| frame.expect("valid frame"))
        .collect()
        .await;
    assert_eq!(decoded, frames);
}

#[test]
fn codec_enforces_its_frame_limit() {
    let mut bytes = serialize([Frame::binary(true, vec![0; 1024])]);
    assert!(matches!(
        read_frame(&mut bytes, 1023),
        Err(FrameError::FrameTooLarge { size: 1024, max: 1023 })
    ));
    assert!(read_frame(&mut bytes, DEFAULT_MAX_FRAME_SIZE).is_ok());
}

fn frame_strategy() -> impl Strategy<Value = Frame> {
    let data = (
        prop_oneof![Just(FrameType::Text), Just(FrameType::Binary)],
        any::<bool>(),
        prop::collection::vec(any::<u8>(), 0..70_000),
    )
        .prop_map(|(frame_type, fin, payload)| Frame::new(frame_type, fin, payload));
    let control = (
        prop_oneof![Just(FrameType::Ping), Just(FrameType::Pong)],
        prop::collection::vec(any::<u8>(), 0..=125),
    )
        .prop_map(|(frame_type, payload)| Frame::new(frame_type, true, payload));
    prop_oneof![4 => data, 1 => control]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn serialized_frames_decode_to_themselves(
        frames in prop::collection::vec(frame_strategy(), 1..4),
        chunk in 1_usize..512,
    ) {
        let mut serializer = Serializer::new();
        for frame in &frames {
            serializer.enqueue(frame.clone());
        }
        let mut wire = BytesMut::new();
        while serializer.has_outstanding() {
            let mut piece = BytesMut::with_capacity(chunk);
            serializer.serialize(&mut (&mut piece).limit(chunk));
            wire.extend_from_slice(&piece);
        }

        let mut decoded = Vec::new();
        while let Some(frame) = read_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE).expect("valid frame") {
            decoded.push(frame);
        }
        prop_assert!(wire.is_empty());
        prop_assert_eq!(decoded, frames);
    }
}
