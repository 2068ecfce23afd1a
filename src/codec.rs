//! Fixed-shape frame codec
//!
//! A frame is `[seq lo, seq hi, samples...]`, everything little endian. There
//! is no length field and no checksum; a corrupted frame of the right length
//! decodes without complaint.

use crate::{
    channel::{ChannelKind, Samples, SEQUENCE_SIZE},
    error::{Error, Result},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u16,
    pub samples: Samples,
}

pub fn encode(kind: ChannelKind, sequence: u16, samples: &Samples) -> Result<Vec<u8>> {
    let layout = kind.layout();
    // A payload of the wrong width can't be the right length either
    if samples.len() != layout.samples || samples.width() != layout.width {
        return Err(Error::PayloadLengthMismatch {
            kind,
            expected: layout.samples,
            actual: samples.len(),
        });
    }
    let mut buf = Vec::with_capacity(layout.frame_size());
    buf.extend_from_slice(&sequence.to_le_bytes());
    match samples {
        Samples::U16(v) => v.iter().for_each(|s| buf.extend_from_slice(&s.to_le_bytes())),
        Samples::I8(v) => v.iter().for_each(|s| buf.extend_from_slice(&s.to_le_bytes())),
    }
    Ok(buf)
}

pub fn decode(kind: ChannelKind, bytes: &[u8]) -> Result<Packet> {
    let layout = kind.layout();
    if bytes.len() != layout.frame_size() {
        return Err(Error::MalformedPacket {
            kind,
            expected: layout.frame_size(),
            actual: bytes.len(),
        });
    }
    let (head, body) = bytes.split_at(SEQUENCE_SIZE);
    let sequence = u16::from_le_bytes([head[0], head[1]]);
    let samples = match kind {
        ChannelKind::Adc => Samples::U16(
            body.chunks_exact(2)
                .map(|w| u16::from_le_bytes([w[0], w[1]]))
                .collect(),
        ),
        ChannelKind::Scan => Samples::I8(body.iter().map(|&b| b as i8).collect()),
    };
    Ok(Packet { sequence, samples })
}
