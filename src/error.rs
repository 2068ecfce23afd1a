//! Error taxonomy for the relay.
//!
//! Only the configuration-time variants (`InvalidFilterParameters`, `Bind`,
//! `EmptySource`) are meant to reach `main`. Per-packet and per-send failures
//! are logged where they happen and never cross a channel boundary.

use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::channel::ChannelKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "invalid filter parameters (window {window_length}, order {poly_order}, length {len}): {reason}"
    )]
    InvalidFilterParameters {
        window_length: usize,
        poly_order: usize,
        len: usize,
        reason: &'static str,
    },
    #[error("{kind} payload length mismatch: expected {expected} samples, got {actual}")]
    PayloadLengthMismatch {
        kind: ChannelKind,
        expected: usize,
        actual: usize,
    },
    #[error("window length mismatch: expected {expected} samples, got {actual}")]
    WindowLengthMismatch { expected: usize, actual: usize },
    #[error("malformed {kind} packet: expected {expected} bytes, got {actual}")]
    MalformedPacket {
        kind: ChannelKind,
        expected: usize,
        actual: usize,
    },
    #[error("could not bind UDP socket to {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("waveform source produced no data after rewinding")]
    EmptySource,
    #[error("bad sample on line {line}: {value:?}")]
    Parse { line: u64, value: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
