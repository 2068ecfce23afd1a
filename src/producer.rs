//! The paced send loop
//!
//! Every iteration pulls one chunk per channel, conditions it down to a single
//! window, and sends G then H under the same sequence number. The source is
//! replayed from the start whenever it runs out.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelKind, Samples},
    codec,
    conditioner::{ConditioningParams, Conditioner},
    endpoint::TxEndpoint,
    error::{Error, Result},
    source::{ChunkPair, WaveformSource},
};

/// Frames the producer sends are always ADC frames
const KIND: ChannelKind = ChannelKind::Adc;

pub struct Producer {
    conditioner: Conditioner,
    g: TxEndpoint,
    h: TxEndpoint,
    cadence: Duration,
    sequence: u16,
}

impl Producer {
    /// Fails on bad conditioning parameters, which can only be fixed by
    /// reconfiguring
    pub fn new(
        params: ConditioningParams,
        g: TxEndpoint,
        h: TxEndpoint,
        cadence: Duration,
    ) -> Result<Self> {
        let conditioner = Conditioner::new(params, KIND.layout().samples)?;
        Ok(Self {
            conditioner,
            g,
            h,
            cadence,
            sequence: 1,
        })
    }

    /// Sequence number the next iteration will use
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Send until `shutdown` fires (or its sender goes away)
    pub fn run<S: WaveformSource>(&mut self, source: &mut S, shutdown: &Receiver<()>) -> Result<()> {
        info!(g = %self.g.dest(), h = %self.h.dest(), cadence = ?self.cadence, "Starting producer");
        loop {
            self.step(source)?;
            match shutdown.recv_timeout(self.cadence) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(next_sequence = self.sequence, "Producer stopped");
        Ok(())
    }

    /// One iteration without the pacing. Returns the sequence number used.
    pub fn step<S: WaveformSource>(&mut self, source: &mut S) -> Result<u16> {
        let rows = self.conditioner.group_size();
        let chunk = match source.next_chunk(rows) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                info!("Source exhausted, replaying from the start");
                Self::replay(source, rows)?
            }
            Err(e) => {
                warn!(error = %e, "Bad source data, replaying from the start");
                Self::replay(source, rows)?
            }
        };
        let sequence = self.sequence;
        let frame_g = self.frame(&chunk.g, sequence)?;
        let frame_h = self.frame(&chunk.h, sequence)?;
        for (name, endpoint, frame) in [("G", &self.g, &frame_g), ("H", &self.h, &frame_h)] {
            match endpoint.send(frame) {
                Ok(n) => debug!(channel = name, sequence, n, dest = %endpoint.dest(), "Sent frame"),
                Err(e) => warn!(channel = name, sequence, error = %e, "Send failed, skipping"),
            }
        }
        self.sequence = self.sequence.wrapping_add(1);
        Ok(sequence)
    }

    /// Rewind and take the first chunk. Failing here means nothing usable is
    /// left to replay, so the error goes to the caller.
    fn replay<S: WaveformSource>(source: &mut S, rows: usize) -> Result<ChunkPair> {
        source.rewind()?;
        source.next_chunk(rows)?.ok_or(Error::EmptySource)
    }

    fn frame(&self, batch: &[Vec<f64>], sequence: u16) -> Result<Vec<u8>> {
        let window = self
            .conditioner
            .condition(batch)?
            .into_iter()
            .next()
            .ok_or(Error::EmptySource)?;
        codec::encode(KIND, sequence, &Samples::U16(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        endpoint::{Received, RxEndpoint},
        savgol::SmoothingParams,
        source::SyntheticSource,
    };
    use std::{net::SocketAddr, thread};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn recv_all(rx: &mut RxEndpoint) -> Vec<codec::Packet> {
        let mut out = Vec::new();
        for _ in 0..100 {
            match rx.try_receive().unwrap() {
                Received::Datagram(d) => out.push(codec::decode(KIND, d).unwrap()),
                Received::Empty => {
                    if !out.is_empty() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        out
    }

    fn producer(params: ConditioningParams) -> (Producer, RxEndpoint, RxEndpoint) {
        let rx_g = RxEndpoint::bind(loopback(), 4096).unwrap();
        let rx_h = RxEndpoint::bind(loopback(), 4096).unwrap();
        let g = TxEndpoint::bind(loopback(), rx_g.local_addr().unwrap()).unwrap();
        let h = TxEndpoint::bind(loopback(), rx_h.local_addr().unwrap()).unwrap();
        let p = Producer::new(params, g, h, Duration::from_millis(1)).unwrap();
        (p, rx_g, rx_h)
    }

    /// Fixed windows, `passes` of them per replay
    struct Constant {
        left: usize,
        passes: usize,
        rewinds: usize,
    }

    impl WaveformSource for Constant {
        fn next_chunk(&mut self, rows: usize) -> Result<Option<ChunkPair>> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(ChunkPair {
                g: vec![vec![1000.0; 1000]; rows],
                h: vec![vec![2000.0; 1000]; rows],
            }))
        }

        fn rewind(&mut self) -> Result<()> {
            self.rewinds += 1;
            self.left = self.passes;
            Ok(())
        }
    }

    #[test]
    fn sends_both_channels_and_replays() {
        let params = ConditioningParams {
            smoothing: SmoothingParams::new(5, 2),
            group_size: 4,
        };
        let (mut p, mut rx_g, mut rx_h) = producer(params);
        let mut src = Constant {
            left: 2,
            passes: 2,
            rewinds: 0,
        };
        for expected in 1..=3u16 {
            assert_eq!(p.step(&mut src).unwrap(), expected);
        }
        assert_eq!(src.rewinds, 1);
        let g = recv_all(&mut rx_g);
        let h = recv_all(&mut rx_h);
        assert_eq!(g.iter().map(|p| p.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(h.len(), 3);
        assert!(matches!(&g[0].samples, Samples::U16(v) if v.iter().all(|&s| (999..=1000).contains(&s))));
        assert!(matches!(&h[0].samples, Samples::U16(v) if v.iter().all(|&s| (1999..=2000).contains(&s))));
    }

    #[test]
    fn empty_source_is_fatal() {
        let (mut p, _g, _h) = producer(ConditioningParams::default());
        let mut src = Constant {
            left: 0,
            passes: 0,
            rewinds: 0,
        };
        assert!(matches!(p.step(&mut src), Err(Error::EmptySource)));
    }

    #[test]
    fn bad_parameters_are_fatal_at_startup() {
        let g = TxEndpoint::bind(loopback(), loopback()).unwrap();
        let h = TxEndpoint::bind(loopback(), loopback()).unwrap();
        let params = ConditioningParams {
            smoothing: SmoothingParams::new(42, 3),
            group_size: 4,
        };
        assert!(matches!(
            Producer::new(params, g, h, Duration::from_millis(1)),
            Err(Error::InvalidFilterParameters { .. })
        ));
    }

    #[test]
    fn send_failure_does_not_stop_the_loop() {
        // Port 0 is never a valid destination
        let dead: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let g = TxEndpoint::bind(loopback(), dead).unwrap();
        let h = TxEndpoint::bind(loopback(), dead).unwrap();
        assert!(g.send(&[0u8; 4]).is_err());
        assert!(h.send(&[0u8; 4]).is_err());
        let mut p = Producer::new(ConditioningParams::default(), g, h, Duration::from_millis(1)).unwrap();
        let mut src = SyntheticSource::new(1, 64);
        assert_eq!(p.step(&mut src).unwrap(), 1);
        assert_eq!(p.step(&mut src).unwrap(), 2);
    }

    /// Good windows, except that the chunk at `bad_at` fails to parse
    struct Flaky {
        served: usize,
        bad_at: usize,
        rewinds: usize,
    }

    impl WaveformSource for Flaky {
        fn next_chunk(&mut self, rows: usize) -> Result<Option<ChunkPair>> {
            self.served += 1;
            if self.served == self.bad_at {
                return Err(Error::Parse {
                    line: 7,
                    value: "oops".to_owned(),
                });
            }
            Ok(Some(ChunkPair {
                g: vec![vec![1000.0; 1000]; rows],
                h: vec![vec![2000.0; 1000]; rows],
            }))
        }

        fn rewind(&mut self) -> Result<()> {
            self.rewinds += 1;
            Ok(())
        }
    }

    #[test]
    fn bad_data_mid_stream_replays() {
        let (mut p, mut rx_g, _h) = producer(ConditioningParams::default());
        let mut src = Flaky {
            served: 0,
            bad_at: 2,
            rewinds: 0,
        };
        for expected in 1..=3u16 {
            assert_eq!(p.step(&mut src).unwrap(), expected);
        }
        assert_eq!(src.rewinds, 1);
        assert_eq!(recv_all(&mut rx_g).len(), 3);
    }

    #[test]
    fn bad_data_right_after_rewind_is_fatal() {
        let (mut p, _g, _h) = producer(ConditioningParams::default());
        // First chunk fails, and so does the one after the rewind
        struct Broken;
        impl WaveformSource for Broken {
            fn next_chunk(&mut self, _rows: usize) -> Result<Option<ChunkPair>> {
                Err(Error::Parse {
                    line: 2,
                    value: "x".to_owned(),
                })
            }
            fn rewind(&mut self) -> Result<()> {
                Ok(())
            }
        }
        assert!(matches!(p.step(&mut Broken), Err(Error::Parse { line: 2, .. })));
    }

    #[test]
    fn sequence_wraps() {
        let (mut p, _g, _h) = producer(ConditioningParams::default());
        p.sequence = u16::MAX;
        let mut src = SyntheticSource::new(3, 64);
        assert_eq!(p.step(&mut src).unwrap(), u16::MAX);
        assert_eq!(p.sequence(), 0);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (mut p, _g, mut rx_h) = producer(ConditioningParams::default());
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(()).unwrap();
        let mut src = SyntheticSource::new(5, 64);
        p.run(&mut src, &rx).unwrap();
        assert_eq!(p.sequence(), 2);
        assert_eq!(recv_all(&mut rx_h).len(), 1);
    }
}
