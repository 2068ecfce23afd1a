//! Consumer side peak extraction
//!
//! The received window is smoothed again (the producer's smoothing happened
//! before quantization and transport, so it doesn't cover what those add),
//! then local maxima are filtered by height, spacing and prominence. All three
//! constraints have to hold for a peak to be reported.

use crate::{
    channel::{ChannelKind, PhysicalUnits},
    error::Result,
    savgol::{SavitzkyGolay, SmoothingParams},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakDetectionParams {
    /// Minimum smoothed magnitude
    pub height: f64,
    /// Minimum index distance between two reported peaks
    pub distance: usize,
    /// Minimum drop to the higher ground on either side
    pub prominence: f64,
}

impl PeakDetectionParams {
    pub const ADC: PeakDetectionParams = PeakDetectionParams {
        height: 20000.0,
        distance: 50,
        prominence: 3000.0,
    };

    pub const SCAN: PeakDetectionParams = PeakDetectionParams {
        height: 20.0,
        distance: 10,
        prominence: 10.0,
    };

    pub const fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Adc => Self::ADC,
            ChannelKind::Scan => Self::SCAN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalPeak {
    pub time_ms: f64,
    pub volts: f64,
    pub prominence_volts: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakAnnotation {
    pub index: usize,
    pub magnitude: f64,
    pub prominence: f64,
    pub physical: Option<PhysicalPeak>,
}

/// A smoothed window together with the peaks found in it
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub smoothed: Vec<f64>,
    pub peaks: Vec<PeakAnnotation>,
}

#[derive(Clone, Debug)]
pub struct PeakExtractor {
    filter: SavitzkyGolay,
    detection: PeakDetectionParams,
    units: Option<PhysicalUnits>,
}

impl PeakExtractor {
    pub fn new(
        smoothing: SmoothingParams,
        detection: PeakDetectionParams,
        units: Option<PhysicalUnits>,
    ) -> Result<Self> {
        Ok(Self {
            filter: SavitzkyGolay::new(smoothing)?,
            detection,
            units,
        })
    }

    pub fn filter(&self) -> &SavitzkyGolay {
        &self.filter
    }

    pub fn extract(&self, raw: &[f64]) -> Result<Extraction> {
        let smoothed = self.filter.apply(raw)?;
        let peaks = find_peaks(&smoothed, &self.detection)
            .into_iter()
            .map(|(index, prominence)| {
                let magnitude = smoothed[index];
                PeakAnnotation {
                    index,
                    magnitude,
                    prominence,
                    physical: self.units.map(|u| PhysicalPeak {
                        time_ms: index as f64 * u.sample_period_ms,
                        volts: magnitude * u.volts_per_count,
                        prominence_volts: prominence * u.volts_per_count,
                    }),
                }
            })
            .collect();
        Ok(Extraction { smoothed, peaks })
    }
}

/// One-shot form of [`PeakExtractor::extract`], returning only the peaks
pub fn extract(
    raw: &[f64],
    smoothing: SmoothingParams,
    detection: &PeakDetectionParams,
    units: Option<PhysicalUnits>,
) -> Result<Vec<PeakAnnotation>> {
    Ok(PeakExtractor::new(smoothing, *detection, units)?
        .extract(raw)?
        .peaks)
}

/// Indices and prominences of the peaks in `x` meeting every constraint,
/// in ascending index order
pub fn find_peaks(x: &[f64], params: &PeakDetectionParams) -> Vec<(usize, f64)> {
    let mut peaks = local_maxima(x);
    peaks.retain(|&i| x[i] >= params.height);
    let peaks = select_by_distance(x, &peaks, params.distance);
    peaks
        .into_iter()
        .map(|i| (i, prominence(x, i)))
        .filter(|&(_, p)| p >= params.prominence)
        .collect()
}

/// Samples higher than both neighbours. A flat top counts once, at its middle
/// (rounded down). The first and last samples are never peaks.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Walk the peaks from highest to lowest and drop any neighbour closer than
/// `distance` to a peak that's still kept. Equal heights favour the later index.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 {
        return peaks.to_vec();
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));
    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Height of `x[peak]` above the higher of the two minima found by walking
/// outwards until a strictly higher sample (or the edge) is reached
fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];
    let left_min = x[..=peak]
        .iter()
        .rev()
        .take_while(|&&v| v <= height)
        .fold(height, |m, &v| m.min(v));
    let right_min = x[peak..]
        .iter()
        .take_while(|&&v| v <= height)
        .fold(height, |m, &v| m.min(v));
    height - left_min.max(right_min)
}
