//! Channel kinds and their fixed frame layouts.
//!
//! Nothing on the wire says how long a frame is, so both ends must agree on
//! the kind up front. Every size and offset the codec and consumer use comes
//! out of [`ChannelKind::layout`].

use std::fmt;

use num_traits::ToPrimitive;

/// Bytes taken by the little-endian sequence counter at the front of every frame
pub const SEQUENCE_SIZE: usize = 2;

// ADC acquisition constants
pub const ADC_SAMPLES: usize = 1000;
/// 50 kHz sampling, expressed in milliseconds per sample
pub const ADC_SAMPLE_PERIOD_MS: f64 = 1.0 / 50.0;
/// 5 V full scale over a 16 bit converter
pub const ADC_VOLTS_PER_COUNT: f64 = 5.0 / 65536.0;

// Spectrum scan constants
pub const SCAN_SAMPLES: usize = 512;
pub const SCAN_HEADER_SAMPLES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ChannelKind {
    /// Unsigned 16 bit ADC window
    Adc,
    /// Signed 8 bit spectrum-scan magnitudes with a short header
    Scan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleWidth {
    U16,
    I8,
}

impl SampleWidth {
    pub const fn bytes(self) -> usize {
        match self {
            SampleWidth::U16 => 2,
            SampleWidth::I8 => 1,
        }
    }
}

/// Scale factors to turn an index and a magnitude into physical quantities
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalUnits {
    pub sample_period_ms: f64,
    pub volts_per_count: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLayout {
    pub width: SampleWidth,
    /// Samples carried per frame, header samples included
    pub samples: usize,
    /// Leading samples that are protocol header, not signal
    pub header_samples: usize,
    pub units: Option<PhysicalUnits>,
}

const ADC_LAYOUT: FrameLayout = FrameLayout {
    width: SampleWidth::U16,
    samples: ADC_SAMPLES,
    header_samples: 0,
    units: Some(PhysicalUnits {
        sample_period_ms: ADC_SAMPLE_PERIOD_MS,
        volts_per_count: ADC_VOLTS_PER_COUNT,
    }),
};

const SCAN_LAYOUT: FrameLayout = FrameLayout {
    width: SampleWidth::I8,
    samples: SCAN_SAMPLES,
    header_samples: SCAN_HEADER_SAMPLES,
    units: None,
};

impl FrameLayout {
    /// Exact datagram size for this layout
    pub const fn frame_size(&self) -> usize {
        SEQUENCE_SIZE + self.samples * self.width.bytes()
    }

    /// Number of samples left once the header is stripped
    pub const fn signal_samples(&self) -> usize {
        self.samples - self.header_samples
    }
}

impl ChannelKind {
    pub const fn layout(self) -> &'static FrameLayout {
        match self {
            ChannelKind::Adc => &ADC_LAYOUT,
            ChannelKind::Scan => &SCAN_LAYOUT,
        }
    }

    pub const fn frame_size(self) -> usize {
        self.layout().frame_size()
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Adc => write!(f, "adc"),
            ChannelKind::Scan => write!(f, "scan"),
        }
    }
}

/// One acquisition window, in the encoding its channel kind uses
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Samples {
    U16(Vec<u16>),
    I8(Vec<i8>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U16(v) => v.len(),
            Samples::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> SampleWidth {
        match self {
            Samples::U16(_) => SampleWidth::U16,
            Samples::I8(_) => SampleWidth::I8,
        }
    }

    /// Widen to floating point, skipping the first `skip` samples
    pub fn signal(&self, skip: usize) -> Vec<f64> {
        fn widen<T: ToPrimitive + Copy>(v: &[T], skip: usize) -> Vec<f64> {
            v.iter()
                .skip(skip)
                .map(|s| s.to_f64().unwrap_or_default())
                .collect()
        }
        match self {
            Samples::U16(v) => widen(v, skip),
            Samples::I8(v) => widen(v, skip),
        }
    }
}
