use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use arq_abstract::{Message, ProtocolConfig, ProtocolEntity, SimConfig};
use arq_core::{SrReceiver, SrSender};
use arq_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-Repeat ARQ channel simulator")]
struct Args {
    /// Run a TOML scenario from disk instead of a generated workload.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Probability that the channel drops a packet.
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,

    /// Probability that the channel corrupts a packet.
    #[arg(long, default_value_t = 0.0)]
    corrupt_rate: f64,

    /// Minimum one-way channel latency in simulated ms.
    #[arg(long, default_value_t = 10)]
    min_latency: u64,

    /// Maximum one-way channel latency in simulated ms.
    #[arg(long, default_value_t = 100)]
    max_latency: u64,

    /// Seed for the channel's random number generator.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Sender/receiver window size.
    #[arg(long, default_value_t = 8)]
    window_size: usize,

    /// Per-packet retransmission timeout in simulated ms.
    #[arg(long, default_value_t = 400)]
    timeout: u64,

    /// Number of generated application messages (ignored with --scenario).
    #[arg(long, default_value_t = 20)]
    messages: usize,

    /// Interval between generated application submissions in ms.
    #[arg(long, default_value_t = 50)]
    interval: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("arq-sim-cli starting…");

    let report = if let Some(path) = &args.scenario {
        // The scenario file may override window size and timeout; the
        // entities are built from the resolved config, not the CLI flags.
        scenario_runner::run_scenario_file(
            path,
            Box::new(|protocol: &ProtocolConfig| {
                (
                    Box::new(SrSender::new(protocol)) as Box<dyn ProtocolEntity>,
                    Box::new(SrReceiver::new(protocol)) as Box<dyn ProtocolEntity>,
                )
            }),
        )?
    } else {
        let protocol = ProtocolConfig {
            window_size: args.window_size,
            timeout: args.timeout,
        };
        protocol.validate()?;
        let sim = SimConfig {
            loss_rate: args.loss_rate,
            corrupt_rate: args.corrupt_rate,
            min_latency: args.min_latency,
            max_latency: args.max_latency,
            seed: args.seed,
        };
        let sender = Box::new(SrSender::new(&protocol));
        let receiver = Box::new(SrReceiver::new(&protocol));
        let mut simulator = Simulator::new(sim, protocol, sender, receiver);
        for i in 0..args.messages {
            let message = Message::from_bytes(format!("payload number {i:03}").as_bytes())?;
            simulator.schedule_app_send(i as u64 * args.interval, message);
        }
        simulator.run_until_complete();
        simulator.export_report()
    };

    print_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(trace_path, json)
            .with_context(|| format!("writing trace to {}", trace_path.display()))?;
        info!("trace written to {}", trace_path.display());
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt::init();
}

fn print_summary(report: &SimulationReport) {
    println!("simulated duration : {} ms", report.duration_ms);
    println!("delivered messages : {}", report.delivered_data.len());
    println!("sender packets     : {}", report.sender_packet_count);
    println!("receiver packets   : {}", report.receiver_packet_count);
    println!(
        "channel            : loss={} corrupt={} latency={}..{}ms seed={}",
        report.config.loss_rate,
        report.config.corrupt_rate,
        report.config.min_latency,
        report.config.max_latency,
        report.config.seed
    );
    println!(
        "protocol           : window={} timeout={}ms",
        report.protocol.window_size, report.protocol.timeout
    );
}
