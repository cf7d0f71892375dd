//! Firmware entry point: wires a real serial transport, a logging GPIO
//! pin, and the `wasmi` sandbox engine into an [`Agent`], then blocks
//! forever servicing the gateway link.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use wasm_agent_firmware::agent::{self, Agent};
use wasm_agent_firmware::config::AgentConfig;
use wasm_agent_firmware::gpio::LoggingOutputPin;
use wasm_agent_firmware::sandbox::WasmiEngine;
use wasm_agent_firmware::transport;

#[derive(Parser, Debug)]
#[command(name = "wasm-agent", about = "WebAssembly agent firmware")]
struct Cli {
    /// Path to a TOML config file layered over the built-in defaults.
    #[arg(long)]
    config: Option<String>,

    /// Serial port path, overriding the config value.
    #[arg(long)]
    serial_port: Option<String>,

    /// Baud rate, overriding the config value.
    #[arg(long)]
    baud_rate: Option<u32>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.serial_port {
        config.serial_port = port;
    }
    if let Some(baud) = cli.baud_rate {
        config.baud_rate = baud;
    }

    // RX framer line-accumulator timeout isn't itself configurable. The
    // read timeout just bounds how long the reader thread blocks between
    // polls, standing in for "read whatever's currently in the FIFO".
    let (reader, writer) = match transport::open_serial(
        &config.serial_port,
        config.baud_rate,
        Duration::from_millis(100),
    ) {
        Ok(halves) => halves,
        Err(err) => {
            eprintln!(
                "failed to open serial port {}: {err}",
                config.serial_port
            );
            std::process::exit(1);
        }
    };

    let gpio = Box::new(LoggingOutputPin::new("wasm_pin"));
    let engine = WasmiEngine::new();
    let agent = Arc::new(Agent::new(config, engine, writer, gpio));

    let handles = agent::spawn(agent, reader);
    handles.join_all();
}
