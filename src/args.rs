//! Argument parsing for running from the command line

use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::{
    channel::ChannelKind, conditioner::ConditioningParams, peaks::PeakDetectionParams,
    savgol::SmoothingParams, PORT_A, PORT_B,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Condition recorded (or synthetic) windows and stream them out
    Produce(ProduceArgs),
    /// Receive windows, find peaks and report them
    Consume(ConsumeArgs),
}

#[derive(clap::Args, Debug)]
pub struct ProduceArgs {
    /// Address of the consumer
    #[clap(long, default_value = "127.0.0.1")]
    pub dest: IpAddr,
    /// Destination port of channel G
    #[clap(long, default_value_t = PORT_A)]
    #[clap(value_parser = clap::value_parser!(u16).range(1..))]
    pub port_g: u16,
    /// Destination port of channel H
    #[clap(long, default_value_t = PORT_B)]
    #[clap(value_parser = clap::value_parser!(u16).range(1..))]
    pub port_h: u16,
    /// CSV capture for channel G (synthetic data if omitted)
    #[clap(long, requires = "file-h")]
    pub file_g: Option<PathBuf>,
    /// CSV capture for channel H
    #[clap(long, requires = "file-g")]
    pub file_h: Option<PathBuf>,
    /// Smoothing window length (odd)
    #[clap(long, default_value_t = 41)]
    pub window: usize,
    /// Smoothing polynomial order
    #[clap(long, default_value_t = 3)]
    pub order: usize,
    /// Windows averaged into each transmitted window
    #[clap(long, default_value_t = 32)]
    pub group: usize,
    /// Pause between transmissions, in milliseconds
    #[clap(long, default_value_t = 800)]
    pub cadence_ms: u64,
}

impl ProduceArgs {
    pub fn conditioning(&self) -> ConditioningParams {
        ConditioningParams {
            smoothing: SmoothingParams::new(self.window, self.order),
            group_size: self.group,
        }
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

#[derive(clap::Args, Debug)]
pub struct ConsumeArgs {
    /// Local address to listen on
    #[clap(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// Port of channel A
    #[clap(long, default_value_t = PORT_A)]
    pub port_a: u16,
    /// Port of channel B
    #[clap(long, default_value_t = PORT_B)]
    pub port_b: u16,
    /// Frame layout both channels carry
    #[clap(long, value_enum, default_value = "adc")]
    pub kind: ChannelKind,
    /// Smoothing window length (odd, 1 disables smoothing)
    #[clap(long, default_value_t = 41)]
    pub window: usize,
    /// Smoothing polynomial order
    #[clap(long, default_value_t = 3)]
    pub order: usize,
    /// Minimum peak height (default depends on --kind)
    #[clap(long)]
    pub height: Option<f64>,
    /// Minimum index distance between peaks (default depends on --kind)
    #[clap(long)]
    pub distance: Option<usize>,
    /// Minimum peak prominence (default depends on --kind)
    #[clap(long)]
    pub prominence: Option<f64>,
    /// Poll interval, in milliseconds
    #[clap(long, default_value_t = 25)]
    pub tick_ms: u64,
}

impl ConsumeArgs {
    pub fn smoothing(&self) -> SmoothingParams {
        SmoothingParams::new(self.window, self.order)
    }

    pub fn detection(&self) -> PeakDetectionParams {
        let defaults = PeakDetectionParams::for_kind(self.kind);
        PeakDetectionParams {
            height: self.height.unwrap_or(defaults.height),
            distance: self.distance.unwrap_or(defaults.distance),
            prominence: self.prominence.unwrap_or(defaults.prominence),
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
