use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    thread,
};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use tracing::{info, warn};
use waveform_relay::{
    args::{convert_filter, Args, Command, ConsumeArgs, ProduceArgs},
    consumer::{annotation_text, drive, Consumer, RenderFrame},
    endpoint::TxEndpoint,
    producer::Producer,
    source::{CsvPairSource, SyntheticSource},
};

// Windows per pass of the synthetic source
const SYNTHETIC_WINDOWS: usize = 1024;
// Frames waiting for the renderer
const FRAME_QUEUE: usize = 16;

fn produce(args: ProduceArgs, shutdown: Receiver<()>) -> anyhow::Result<()> {
    let any: SocketAddr = (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into();
    let g = TxEndpoint::bind(any, (args.dest, args.port_g).into())?;
    let h = TxEndpoint::bind(any, (args.dest, args.port_h).into())?;
    let mut producer = Producer::new(args.conditioning(), g, h, args.cadence())
        .context("Bad conditioning parameters")?;
    match (&args.file_g, &args.file_h) {
        (Some(file_g), Some(file_h)) => {
            let mut source = CsvPairSource::open(file_g, file_h)
                .with_context(|| format!("Opening {:?} and {:?}", file_g, file_h))?;
            producer.run(&mut source, &shutdown)?;
        }
        _ => {
            info!("No captures given, sending synthetic data");
            let mut source = SyntheticSource::new(0, SYNTHETIC_WINDOWS);
            producer.run(&mut source, &shutdown)?;
        }
    }
    Ok(())
}

/// Stand-in for the dashboard: print every frame's peaks
fn render(frames: Receiver<RenderFrame>) {
    for frame in frames {
        info!(
            channel = %frame.channel,
            sequence = frame.sequence,
            peaks = frame.peaks.len(),
            at = %frame.received_at.format("%H:%M:%S%.3f"),
            "Packet No: {}",
            frame.sequence
        );
        for peak in &frame.peaks {
            info!("{}", annotation_text(peak).replace('\n', ", "));
        }
    }
}

fn consume(args: ConsumeArgs, shutdown: Receiver<()>) -> anyhow::Result<()> {
    let (smoothing, detection) = (args.smoothing(), args.detection());
    let mut consumers = [("A", args.port_a), ("B", args.port_b)]
        .into_iter()
        .map(|(name, port)| {
            Consumer::bind(name, args.kind, (args.bind, port).into(), smoothing, detection)
                .with_context(|| format!("Setting up channel {name}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let (frame_sender, frame_receiver) = bounded(FRAME_QUEUE);
    let renderer = thread::spawn(move || render(frame_receiver));
    let ticker = crossbeam_channel::tick(args.tick());
    drive(&mut consumers, &ticker, &shutdown, &frame_sender);
    // Close the frame channel so the renderer drains and exits
    drop(frame_sender);
    if renderer.join().is_err() {
        warn!("Renderer thread panicked");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let (shutdown_sender, shutdown_receiver) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_sender.try_send(());
    })
    .context("Installing the Ctrl-C handler")?;

    match args.command {
        Command::Produce(p) => produce(p, shutdown_receiver),
        Command::Consume(c) => consume(c, shutdown_receiver),
    }
}
