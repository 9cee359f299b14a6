//! Pixy2 Monitor
//!
//! Connects to a Pixy2 over UART (or the built-in simulator), prints the
//! version and resolution, then streams a few frames of blocks or line
//! features.
//!
//! Usage:
//!   cargo run --example pixy_monitor -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: first port found)
//!   --baud RATE       Baud rate (default: 19200)
//!   --frames N        Frames to query (default: 10)
//!   --program NAME    Switch program first (e.g. "line", "video")
//!   --line            Query line features instead of blocks
//!   --config FILE     Session timing configuration (JSON)
//!   --demo            Use the simulated sensor
//!   --list            List serial ports and exit
//!
//! Set RUST_LOG=pixy2_core=debug to see every packet.

use anyhow::{Context, Result};
use pixy2_core::prelude::*;
use pixy2_core::protocol::list_ports;
use tracing_subscriber::EnvFilter;

struct Options {
    port_name: Option<String>,
    baud_rate: u32,
    frames: u32,
    program: Option<String>,
    line: bool,
    config: Option<String>,
    demo: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        port_name: None,
        baud_rate: 19200,
        frames: 10,
        program: None,
        line: false,
        config: None,
        demo: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                options.port_name = args.get(i).cloned();
            }
            "--baud" | "-b" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    options.baud_rate = v.parse().context("invalid baud rate")?;
                }
            }
            "--frames" | "-n" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    options.frames = v.parse().context("invalid frame count")?;
                }
            }
            "--program" => {
                i += 1;
                options.program = args.get(i).cloned();
            }
            "--config" | "-c" => {
                i += 1;
                options.config = args.get(i).cloned();
            }
            "--line" => options.line = true,
            "--demo" => options.demo = true,
            "--list" => {
                for port in list_ports() {
                    println!("{} {:?}", port.name, port.product);
                }
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => options.port_name = Some(arg.to_string()),
            other => eprintln!("Unknown option: {}", other),
        }
        i += 1;
    }

    let session = match &options.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("loading session config {}", path))?,
        None => SessionConfig::default(),
    };

    if options.demo {
        let link = SimulatedPixy::new(DemoConfig {
            line_noise: true,
            ..DemoConfig::default()
        });
        run(Pixy2::with_config(link, session), &options)
    } else {
        let serial = SerialConfig {
            port_name: options.port_name.clone(),
            baud_rate: options.baud_rate,
            ..SerialConfig::default()
        };
        run(Pixy2::with_config(UartLink::new(serial), session), &options)
    }
}

fn run<L: Link>(mut pixy: Pixy2<L>, options: &Options) -> Result<()> {
    pixy.init().context("sensor did not answer")?;
    println!("{}", pixy.version_info()?);
    if let Some(res) = pixy.resolution() {
        println!("resolution: {}x{}", res.width, res.height);
    }

    if let Some(program) = &options.program {
        pixy.change_program(program)
            .with_context(|| format!("switching to {}", program))?;
        println!("running {}", program);
    }

    for frame in 0..options.frames {
        println!("frame {}:", frame);
        if options.line {
            match pixy.get_all_features() {
                Ok(_) => {
                    let features = pixy.line_features();
                    features.vectors.iter().for_each(|v| println!("  {}", v));
                    features.intersections.iter().for_each(|i| println!("  {}", i));
                    features.barcodes.iter().for_each(|b| println!("  {}", b));
                }
                Err(e) => println!("  no features: {}", e),
            }
        } else {
            match pixy.get_all_blocks() {
                Ok(blocks) => blocks.iter().for_each(|b| println!("  {}", b)),
                Err(e) => println!("  no blocks: {}", e),
            }
        }
    }

    let counters = pixy.counters();
    println!(
        "tx {} packets / {} bytes, rx {} packets / {} bytes",
        counters.tx_packets, counters.tx_bytes, counters.rx_packets, counters.rx_bytes
    );
    Ok(())
}

fn print_help() {
    println!("Pixy2 Monitor");
    println!();
    println!("Usage: pixy_monitor [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  -p, --port PORT     Serial port (default: first port found)");
    println!("  -b, --baud RATE     Baud rate (default: 19200)");
    println!("  -n, --frames N      Frames to query (default: 10)");
    println!("      --program NAME  Switch program first");
    println!("      --line          Query line features instead of blocks");
    println!("  -c, --config FILE   Session timing configuration (JSON)");
    println!("      --demo          Use the simulated sensor");
    println!("      --list          List serial ports and exit");
    println!("  -h, --help          Show this help");
}
