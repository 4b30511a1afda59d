//! Ping-pong between a queue and a bus subject.
//!
//! A ping lands on the queue `msmq://localhost/private$/ping`. Its handler
//! answers with a pong published on `rv://service/pong`, whose handler sends
//! the next ping back to the queue. Both sides are driven by a [`Worker`] and
//! both backends sit behind one composite factory, so the handlers only ever
//! see URIs.
//!
//! The queue system and the bus are the in-memory transports, so the demo
//! runs without any middleware installed.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example ping_pong -- --rounds 5 --delay-ms 200 -vv
//! ```

use clap::Parser;
use mqlink::native::{MemoryBus, MemoryQueueSystem};
use mqlink::prelude::*;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

const PING_QUEUE: &str = ".\\private$\\ping";

// ============================================================================
// Tracing Initialization
// ============================================================================

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => return, // No tracing
        1 => "info",
        2 => "debug",
        _ => "trace", // 3 or more
    };

    let filter = format!("mqlink={}", level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about = "Queue/bus ping-pong", long_about = None)]
struct Args {
    /// Number of ping/pong exchanges before stopping
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,

    /// Pause inside each handler before answering, in milliseconds
    #[arg(short, long, default_value_t = 500)]
    delay_ms: u64,

    /// Queue address the pings are sent to
    #[arg(long, default_value = "msmq://localhost/private$/ping")]
    ping: String,

    /// Bus address the pongs are published on
    #[arg(long, default_value = "rv://service/pong")]
    pong: String,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional configuration file (worker poll interval, queue cache TTL)
    #[arg(long)]
    config: Option<String>,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => match config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
        {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config '{}': {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => config::Config::default(),
    };

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let system = MemoryQueueSystem::new();
    system.create_queue(PING_QUEUE, false);
    let bus = MemoryBus::new();

    let factories: Vec<Box<dyn MessagingFactory>> = vec![
        Box::new(QueueMessagingFactory::new(config, system)?),
        Box::new(BusMessagingFactory::new(config, bus)),
    ];
    let factory = CompositeMessagingFactory::new(factories)?;

    let ping_address = Url::parse(&args.ping)?;
    let pong_address = Url::parse(&args.pong)?;
    let pings: Arc<dyn MultiSubjectMessaging> = Arc::from(factory.create_multi_subject(&ping_address)?);
    let pongs: Arc<dyn MultiSubjectMessaging> = Arc::from(factory.create_multi_subject(&pong_address)?);

    let delay = Duration::from_millis(args.delay_ms);
    let rounds = args.rounds;
    let completed = Arc::new(AtomicU32::new(0));
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let reply_to = pongs.clone();
    let on_ping: Callback = Arc::new(move |msg: Box<dyn ReadOnlyMessage>| {
        let text = msg.body().and_then(|b| b.as_text()).unwrap_or_default().to_string();
        println!("queue <- {}", text);
        if let Err(e) = msg.acknowledge() {
            eprintln!("Failed to acknowledge ping: {}", e);
            return;
        }
        thread::sleep(delay);
        if let Err(e) = reply_to.send(Message::new().with_body(text.replace("ping", "pong"))) {
            eprintln!("Failed to send pong: {}", e);
        }
    });

    let next_ping = pings.clone();
    let on_pong: Callback = Arc::new(move |msg: Box<dyn ReadOnlyMessage>| {
        let text = msg.body().and_then(|b| b.as_text()).unwrap_or_default().to_string();
        println!("bus   <- {}", text);
        let _ = msg.acknowledge();
        let round = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if round >= rounds {
            let _ = done_tx.send(());
            return;
        }
        thread::sleep(delay);
        if let Err(e) = next_ping.send(Message::new().with_body(format!("ping {}", round + 1))) {
            eprintln!("Failed to send ping: {}", e);
        }
    });

    pings.subscribe(None, on_ping)?;
    pongs.subscribe(None, on_pong)?;

    let ping_worker = Worker::start(pings.clone(), config)?;
    let pong_worker = Worker::start(pongs.clone(), config)?;

    pings.send(Message::new().with_body("ping 1"))?;

    // Every round waits twice, plus slack for the workers' poll interval.
    let budget = (delay * 2 + Duration::from_secs(1)) * rounds.max(1);
    let finished = done_rx.recv_timeout(budget).is_ok();

    ping_worker.join();
    pong_worker.join();
    pings.close();
    pongs.close();

    if finished {
        println!("Completed {} rounds", rounds);
        Ok(())
    } else {
        Err("ping-pong stalled".into())
    }
}
