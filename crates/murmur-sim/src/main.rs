//! murmur simulation binary.
//!
//! Runs a scripted client session against the in-memory transport on a
//! virtual clock, checking the standard invariants after every step.
//!
//! # Usage
//!
//! ```bash
//! # Default session
//! murmur-sim
//!
//! # Longer exchange with debug logs
//! murmur-sim --rounds 20 --log-level debug
//! ```

mod scenario;

use clap::Parser;
use scenario::Scenario;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Scripted murmur session
#[derive(Parser, Debug)]
#[command(name = "murmur-sim")]
#[command(about = "Drive a murmur client session against a simulated backend")]
#[command(version)]
struct Args {
    /// Local user id
    #[arg(short, long, default_value = "alice")]
    user: String,

    /// Remote user id
    #[arg(short, long, default_value = "bob")]
    peer: String,

    /// Conversation to join
    #[arg(short, long, default_value = "general")]
    conversation: String,

    /// Message exchanges between the two users
    #[arg(short, long, default_value = "5")]
    rounds: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let scenario = Scenario {
        user: args.user.into(),
        peer: args.peer.into(),
        conversation: args.conversation.into(),
        rounds: args.rounds,
    };

    tracing::info!(user = %scenario.user, conversation = %scenario.conversation, "simulation starting");
    let report = scenario.run().await?;

    tracing::info!(
        messages = report.messages,
        failed = report.failed,
        transport_calls = report.transport_calls,
        sync_version = report.sync_version,
        typing_version = report.typing_version,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "simulation finished"
    );

    Ok(())
}
