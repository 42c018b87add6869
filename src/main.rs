//! `weft` frame debugging binary.
//!
//! Encodes a single WebSocket frame to hex, or decodes a hex dump into frames.

mod cli;

use std::process::ExitCode;

use bytes::BytesMut;
use clap::Parser;
use cli::{Cli, Command, FrameKind};
use weft::websocket::{CloseReason, DEFAULT_MAX_FRAME_SIZE, Frame, FrameType, Serializer, read_frame};

fn encode(kind: FrameKind, partial: bool, code: Option<u16>, payload: String) -> String {
    let frame = match kind {
        FrameKind::Text => Frame::new(FrameType::Text, !partial, payload),
        FrameKind::Binary => Frame::binary(!partial, payload),
        FrameKind::Ping => Frame::ping(payload),
        FrameKind::Pong => Frame::pong(payload),
        FrameKind::Close => match code {
            Some(code) => Frame::close_with(&CloseReason::from_raw(code, payload)),
            None => Frame::close(),
        },
    };
    let mut serializer = Serializer::new();
    serializer.enqueue(frame);
    let mut out = BytesMut::new();
    serializer.serialize(&mut out);
    hex::encode(out)
}

fn describe(frame: &Frame) -> String {
    let body = match frame.frame_type() {
        FrameType::Close => match frame.read_reason() {
            Ok(Some(reason)) => reason.to_string(),
            Ok(None) => "no reason".to_owned(),
            Err(e) => format!("invalid close payload: {e}"),
        },
        FrameType::Text => frame
            .read_text()
            .map_or_else(|_| hex::encode(frame.payload()), |text| format!("{text:?}")),
        _ => hex::encode(frame.payload()),
    };
    format!(
        "{:?} fin={} len={} {body}",
        frame.frame_type(),
        frame.is_fin(),
        frame.payload().len()
    )
}

fn decode(input: &[String], max_frame_size: usize) -> Result<Vec<String>, String> {
    let joined: String = input.concat().split_whitespace().collect();
    let bytes = hex::decode(joined).map_err(|e| format!("invalid hex: {e}"))?;
    let mut buf = BytesMut::from(&bytes[..]);
    let mut lines = Vec::new();
    while let Some(frame) = read_frame(&mut buf, max_frame_size).map_err(|e| e.to_string())? {
        lines.push(describe(&frame));
    }
    if !buf.is_empty() {
        lines.push(format!("{} trailing bytes form an incomplete frame", buf.len()));
    }
    Ok(lines)
}

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Encode {
            kind,
            partial,
            code,
            payload,
        } => {
            println!("{}", encode(kind, partial, code, payload));
            ExitCode::SUCCESS
        }
        Command::Decode {
            hex,
            max_frame_size,
        } => match decode(&hex, max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE)) {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "decode failed");
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
