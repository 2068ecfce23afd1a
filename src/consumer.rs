//! The receive side: one poll per tick per channel
//!
//! A tick never blocks and never fails. Nothing pending, a socket error or a
//! frame that won't decode all come back as [`Tick::NoData`], and whoever is
//! drawing keeps showing the previous frame.

use std::{fmt::Write as _, net::SocketAddr, time::Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::{
    channel::ChannelKind,
    codec,
    endpoint::{Received, RxEndpoint},
    error::Result,
    peaks::{PeakAnnotation, PeakDetectionParams, PeakExtractor},
    savgol::SmoothingParams,
};

/// Everything the visualization needs to draw one channel
#[derive(Clone, Debug, PartialEq)]
pub struct RenderFrame {
    pub channel: String,
    pub kind: ChannelKind,
    pub sequence: u16,
    /// The smoothed waveform, header samples removed
    pub waveform: Vec<f64>,
    pub peaks: Vec<PeakAnnotation>,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    Frame(RenderFrame),
    NoData,
}

/// Running counts for one channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub frames: u64,
    pub malformed: u64,
    pub io_errors: u64,
    /// Sequence numbers skipped over, going by the counter
    pub missed: u64,
    pub out_of_order: u64,
}

pub struct Consumer {
    name: String,
    kind: ChannelKind,
    endpoint: RxEndpoint,
    extractor: PeakExtractor,
    last_sequence: Option<u16>,
    stats: ConsumerStats,
}

impl Consumer {
    /// Bind and validate. The receive buffer is twice the frame size so that
    /// oversized datagrams are seen whole and rejected by length.
    pub fn bind(
        name: impl Into<String>,
        kind: ChannelKind,
        addr: SocketAddr,
        smoothing: SmoothingParams,
        detection: PeakDetectionParams,
    ) -> Result<Self> {
        let extractor = PeakExtractor::new(smoothing, detection, kind.layout().units)?;
        let endpoint = RxEndpoint::bind(addr, 2 * kind.frame_size())?;
        Self::new(name, kind, endpoint, extractor)
    }

    pub fn new(
        name: impl Into<String>,
        kind: ChannelKind,
        endpoint: RxEndpoint,
        extractor: PeakExtractor,
    ) -> Result<Self> {
        extractor
            .filter()
            .check_len(kind.layout().signal_samples())?;
        let name = name.into();
        info!(channel = %name, %kind, local = %endpoint.local_addr()?, "Listening");
        Ok(Self {
            name,
            kind,
            endpoint,
            extractor,
            last_sequence: None,
            stats: ConsumerStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn tick(&mut self) -> Tick {
        let decoded = match self.endpoint.try_receive() {
            Ok(Received::Empty) => return Tick::NoData,
            Ok(Received::Datagram(bytes)) => codec::decode(self.kind, bytes),
            Err(e) => {
                self.stats.io_errors += 1;
                warn!(channel = %self.name, error = %e, "Receive failed");
                return Tick::NoData;
            }
        };
        let packet = match decoded {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(channel = %self.name, error = %e, "Dropping packet");
                return Tick::NoData;
            }
        };
        self.track(packet.sequence);
        let signal = packet
            .samples
            .signal(self.kind.layout().header_samples);
        let extraction = match self.extractor.extract(&signal) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "Peak extraction failed");
                return Tick::NoData;
            }
        };
        self.stats.frames += 1;
        debug!(
            channel = %self.name,
            sequence = packet.sequence,
            peaks = extraction.peaks.len(),
            "Frame ready"
        );
        Tick::Frame(RenderFrame {
            channel: self.name.clone(),
            kind: self.kind,
            sequence: packet.sequence,
            waveform: extraction.smoothed,
            peaks: extraction.peaks,
            received_at: Utc::now(),
        })
    }

    fn track(&mut self, sequence: u16) {
        if let Some(last) = self.last_sequence {
            match sequence.wrapping_sub(last) {
                1 => {}
                0 => {
                    self.stats.out_of_order += 1;
                    debug!(channel = %self.name, sequence, "Duplicate sequence");
                }
                d if d < 0x8000 => {
                    self.stats.missed += u64::from(d - 1);
                    debug!(channel = %self.name, sequence, missed = d - 1, "Sequence gap");
                }
                _ => {
                    self.stats.out_of_order += 1;
                    debug!(channel = %self.name, sequence, last, "Sequence went backwards");
                }
            }
        }
        self.last_sequence = Some(sequence);
    }
}

/// Tick every consumer on each `ticker` beat until `shutdown` fires. Frames go
/// out with `try_send`; when the renderer is behind, the frame is dropped.
pub fn drive(
    consumers: &mut [Consumer],
    ticker: &Receiver<Instant>,
    shutdown: &Receiver<()>,
    frames: &Sender<RenderFrame>,
) {
    loop {
        select! {
            recv(ticker) -> _ => {
                for consumer in consumers.iter_mut() {
                    if let Tick::Frame(frame) = consumer.tick() {
                        match frames.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(f)) => {
                                debug!(channel = %f.channel, sequence = f.sequence, "Renderer busy, frame dropped")
                            }
                            Err(TrySendError::Disconnected(_)) => return,
                        }
                    }
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    for consumer in consumers.iter() {
        info!(channel = consumer.name(), stats = ?consumer.stats(), "Consumer stopped");
    }
}

/// Text for one peak label, the way the dashboard prints it
pub fn annotation_text(peak: &PeakAnnotation) -> String {
    let mut s = format!("index = {}", peak.index);
    if let Some(phys) = peak.physical {
        let _ = write!(s, "\ntime = {:.3} mSec", phys.time_ms);
        let _ = write!(s, "\npeakValue = {}", peak.magnitude.round());
        let _ = write!(s, "\npeakValueChange = {:.3} V", phys.volts);
        let _ = write!(s, "\nprominenceChange = {:.3} V", phys.prominence_volts);
    } else {
        let _ = write!(s, "\npeakValue = {}", peak.magnitude.round());
        let _ = write!(s, "\nprominence = {}", peak.prominence.round());
    }
    s
}
