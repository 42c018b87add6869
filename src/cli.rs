//! Command line interface for the `weft` frame debugging binary.
//!
//! The definition is shared with the build script, which renders it into a
//! man page, so it must not depend on the library crate.

use clap::{Parser, Subcommand, ValueEnum};

/// Command line arguments for the `weft` binary.
#[derive(Debug, Parser)]
#[command(name = "weft", version, about = "Encode and decode WebSocket frames")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the hex encoding of a single unmasked frame.
    Encode {
        /// Frame type to encode.
        #[arg(short = 't', long = "type", value_enum, default_value_t = FrameKind::Text)]
        kind: FrameKind,
        /// Clear the FIN bit (data frames only).
        #[arg(long)]
        partial: bool,
        /// Close code, used with `--type close`.
        #[arg(long)]
        code: Option<u16>,
        /// Frame payload, or the close reason for close frames.
        #[arg(default_value = "")]
        payload: String,
    },
    /// Decode a hex dump into frames.
    Decode {
        /// Hex-encoded bytes; whitespace is ignored.
        hex: Vec<String>,
        /// Largest accepted payload in bytes.
        #[arg(long)]
        max_frame_size: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FrameKind {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}
