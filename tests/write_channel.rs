#![cfg(not(loom))]
//! Tests for the readiness-driven write channel.

use std::{io, sync::Arc, time::Duration};

use bytes::{Buf, Bytes};
use rstest::rstest;
use tokio::time::timeout;
use weft::channel::{ChannelError, ReadinessWriteChannel, WriteChannel};
use weft_testing::TestOutputStream;

const BOUND: Duration = Duration::from_secs(1);

/// Yield until spawned tasks have had a chance to run.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn write_to_ready_transport_completes() {
    let output = TestOutputStream::open();
    let channel = ReadinessWriteChannel::new(output.clone());

    channel.write_all(b"hello").await.expect("write succeeds");

    assert_eq!(output.written(), b"hello");
    assert_eq!(output.write_calls(), 1);
    assert!(channel.is_listener_installed());
}

#[tokio::test]
async fn empty_write_returns_without_touching_the_transport() {
    let output = TestOutputStream::blocked();
    let channel = ReadinessWriteChannel::new(output.clone());

    timeout(BOUND, channel.write_all(b""))
        .await
        .expect("empty write must not suspend")
        .expect("empty write succeeds");
    assert_eq!(output.write_calls(), 0);
    assert!(!channel.is_listener_installed());
}

#[tokio::test]
async fn write_does_not_return_before_the_transport_releases_the_buffer() {
    let output = TestOutputStream::gated();
    let channel = Arc::new(ReadinessWriteChannel::new(output.clone()));

    let writer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.write_all(b"payload").await })
    };
    settle().await;

    assert_eq!(output.written(), b"payload", "bytes are submitted at once");
    assert!(!writer.is_finished(), "write must wait for the release");

    output.spurious_wakeup();
    settle().await;
    assert!(!writer.is_finished(), "a wakeup without readiness is ignored");

    output.release();
    timeout(BOUND, writer)
        .await
        .expect("write completes after release")
        .expect("task joins")
        .expect("write succeeds");
}

#[tokio::test]
async fn write_waits_for_initial_readiness() {
    let output = TestOutputStream::blocked();
    let channel = Arc::new(ReadinessWriteChannel::new(output.clone()));

    let writer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.write_all(b"late").await })
    };
    settle().await;
    assert_eq!(output.write_calls(), 0);
    assert!(output.has_listener());

    output.release();
    settle().await;
    assert_eq!(output.written(), b"late");

    output.release();
    timeout(BOUND, writer)
        .await
        .expect("write completes")
        .expect("task joins")
        .expect("write succeeds");
}

#[tokio::test]
async fn non_contiguous_buffers_are_submitted_in_one_write() {
    let output = TestOutputStream::open();
    let channel = ReadinessWriteChannel::new(output.clone());

    let mut src = Bytes::from_static(b"head-").chain(Bytes::from_static(b"tail"));
    channel.write(&mut src).await.expect("write succeeds");

    assert!(!src.has_remaining());
    assert_eq!(output.written(), b"head-tail");
    assert_eq!(output.write_calls(), 1);
}

#[tokio::test]
async fn closing_during_a_suspended_write_fails_it_promptly() {
    let output = TestOutputStream::blocked();
    let channel = Arc::new(ReadinessWriteChannel::new(output.clone()));

    let writer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.write_all(b"never").await })
    };
    settle().await;

    channel.close();
    let result = timeout(BOUND, writer)
        .await
        .expect("suspended write must finish")
        .expect("task joins");
    assert!(matches!(result, Err(ChannelError::Closed)));
    assert!(output.is_closed());
    assert!(channel.is_closed());
}

#[tokio::test]
async fn write_after_close_fails() {
    let output = TestOutputStream::open();
    let channel = ReadinessWriteChannel::new(output.clone());
    channel.close();

    let result = channel.write_all(b"x").await;
    assert!(matches!(result, Err(ChannelError::Closed)));
    assert_eq!(output.write_calls(), 0);
}

#[tokio::test]
async fn transport_error_fails_pending_and_later_writes() {
    let output = TestOutputStream::blocked();
    let channel = Arc::new(ReadinessWriteChannel::new(output.clone()));

    let writer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.write_all(b"doomed").await })
    };
    settle().await;

    output.fail(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
    let result = timeout(BOUND, writer)
        .await
        .expect("write finishes")
        .expect("task joins");
    match result {
        Err(ChannelError::Failed(error)) => assert_eq!(error.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected transport failure, got {other:?}"),
    }
    assert!(matches!(
        channel.write_all(b"again").await,
        Err(ChannelError::Failed(_))
    ));
}

#[rstest]
#[case::open(TestOutputStream::open())]
#[case::blocked(TestOutputStream::blocked())]
#[tokio::test]
async fn flush_before_any_write_is_a_no_op(#[case] output: TestOutputStream) {
    let channel = ReadinessWriteChannel::new(output.clone());

    timeout(BOUND, channel.flush())
        .await
        .expect("flush must not suspend")
        .expect("flush succeeds");
    assert_eq!(output.flush_calls(), 0);
}

#[tokio::test]
async fn flush_waits_for_readiness_then_flushes() {
    let output = TestOutputStream::gated();
    let channel = Arc::new(ReadinessWriteChannel::new(output.clone()));

    let writer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            channel.write_all(b"data").await?;
            channel.flush().await
        })
    };
    settle().await;
    assert_eq!(output.flush_calls(), 0);

    output.release();
    timeout(BOUND, writer)
        .await
        .expect("write and flush complete")
        .expect("task joins")
        .expect("flush succeeds");
    assert_eq!(output.flush_calls(), 1);
}
