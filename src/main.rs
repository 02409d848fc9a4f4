//! Offline tooling for the B2500 protocol.
//!
//! Commands:
//! - `decode <HEX>...` - decode captured frames and print them
//! - `replay [FILE]` - feed captured frames (one hex frame per line, stdin by default)
//!   through the engine and print every entity update it publishes
//! - `stream [FILE] [--poll-interval <s>] [--max-buffered <n>]` - run a capture of raw link
//!   bytes (hex, split anywhere, stdin by default) through a session, as the device link would
//! - `request <KIND>` - print the frame that requests runtime info or the timer table
//! - `charge-mode <NAME>` - print the frame that selects a charge mode
use std::io::BufRead;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;

use b2500::{
    ChargeMode, Command, Dispatch, Engine, Entities, Message, Publish, Session, SessionConfig, TimerEntities,
};

#[derive(Parser)]
#[command(name = "b2500")]
#[command(about = "Decode and build B2500 battery storage protocol frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode hex encoded frames
    Decode {
        #[arg(required = true)]
        frames: Vec<String>,
    },
    /// Replay captured frames through the engine
    Replay {
        /// File with one hex frame per line; lines starting with '#' are skipped
        file: Option<String>,
    },
    /// Run captured raw link bytes through a session
    Stream {
        /// File with hex encoded bytes; each line is delivered as one chunk
        file: Option<String>,
        /// Seconds between runtime info and timer requests
        #[arg(long, default_value_t = 10)]
        poll_interval: u64,
        /// Upper bound on bytes buffered while waiting for the rest of a frame
        #[arg(long, default_value_t = 1024)]
        max_buffered: usize,
    },
    /// Print a poll request frame
    Request {
        #[arg(value_enum)]
        kind: RequestKind,
    },
    /// Print the frame selecting a charge mode
    ChargeMode {
        /// LoadFirst or SimultaneousChargeAndDischarge
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RequestKind {
    RuntimeInfo,
    Timers,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Decode { frames } => {
            for frame in frames {
                let bytes = hex::decode(frame.trim()).with_context(|| format!("Not a hex frame: {frame}"))?;
                match Message::decode(&bytes) {
                    Ok(message) => println!("{}: {message:#?}", message.kind()),
                    Err(err) => println!("invalid frame: {err}"),
                }
            }
        }
        Commands::Replay { file } => replay(file)?,
        Commands::Stream {
            file,
            poll_interval,
            max_buffered,
        } => {
            let config = SessionConfig {
                poll_interval: Duration::from_secs(poll_interval.max(1)),
                max_buffered,
                ..SessionConfig::default()
            };
            stream(file, config).await?;
        }
        Commands::Request { kind } => {
            let command = match kind {
                RequestKind::RuntimeInfo => Command::RequestRuntimeInfo,
                RequestKind::Timers => Command::RequestTimers,
            };
            println!("{}", hex::encode(command.encode()?));
        }
        Commands::ChargeMode { name } => {
            let mode: ChargeMode = name.parse()?;
            println!("{}", hex::encode(Command::SetChargeMode(mode).encode()?));
        }
    }

    Ok(())
}

fn open_input(file: &Option<String>) -> Result<Box<dyn BufRead>> {
    Ok(match file {
        Some(path) => Box::new(std::io::BufReader::new(
            std::fs::File::open(path).with_context(|| format!("Cannot open {path}"))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    })
}

async fn stream(file: Option<String>, config: SessionConfig) -> Result<()> {
    let mut chunks = Vec::new();
    for (number, line) in open_input(&file)?.lines().enumerate() {
        let line = line?;
        let hex_digits: String = line.split_whitespace().collect();
        if hex_digits.is_empty() || hex_digits.starts_with('#') {
            continue;
        }
        let chunk = hex::decode(&hex_digits).with_context(|| format!("Line {}: not hex", number + 1))?;
        chunks.push(Ok::<_, std::io::Error>(chunk));
    }

    let (session, _handle) = Session::new(Engine::new(printing_entities()), config);
    // Requests the session sends are only logged
    let engine = session
        .run(futures_util::stream::iter(chunks), tokio::io::sink())
        .await?;
    if let Some(info) = engine.runtime_info() {
        println!("{info:#?}");
    }
    Ok(())
}

fn replay(file: Option<String>) -> Result<()> {
    let reader = open_input(&file)?;

    let mut engine = Engine::new(printing_entities());
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bytes = match hex::decode(line) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Line {}: not a hex frame: {err}", number + 1);
                continue;
            }
        };
        match engine.handle_frame(&bytes) {
            Dispatch::PassThrough(frame) => {
                println!("unhandled opcode 0x{:02x}: {}", frame.opcode, hex::encode(&frame.payload))
            }
            Dispatch::Discarded(err) => println!("line {}: discarded: {err}", number + 1),
            Dispatch::RuntimeInfo | Dispatch::TimerInfo => {}
        }
    }
    Ok(())
}

fn printer<T: std::fmt::Display + 'static>(name: String) -> Option<Publish<T>> {
    Some(Box::new(move |value: T| println!("{name} = {value}")))
}

fn printing_entities() -> Entities {
    Entities {
        charge_mode: printer("charge_mode".to_string()),
        timers: std::array::from_fn(|i| TimerEntities {
            enabled: printer(format!("timer{i}.enabled")),
            output_power: printer(format!("timer{i}.output_power")),
            start: printer(format!("timer{i}.start")),
            end: printer(format!("timer{i}.end")),
        }),
        adaptive_mode: printer("adaptive_mode".to_string()),
    }
}

fn init_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // RUST_LOG still wins when set
    builder.parse_default_env();
    builder.init();
}
