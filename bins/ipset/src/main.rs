//! ipset command - add, delete and flush set entries.

mod capture;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nfset::netlink::{Family, Ipset, IpsetSocket, RetryPolicy, Transport, parse};
use nfset::util::{EntryValue, classify};

use capture::Capture;

#[derive(Parser)]
#[command(name = "ipset", version, about = "Manage ipset entries over netlink")]
struct Cli {
    /// Load the retry policy from a JSON file.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Give up after this many "would block" errors.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Pause between retries, in microseconds.
    #[arg(long, value_name = "US")]
    backoff_us: Option<u64>,

    /// Fail a request that takes longer than this many milliseconds.
    #[arg(long, value_name = "MS")]
    deadline_ms: Option<u64>,

    /// Print the encoded request instead of sending it.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Output JSON (with --dry-run).
    #[arg(short = 'j', long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Add an address or MAC to a set.
    #[command(visible_alias = "a")]
    Add {
        /// Set name.
        set: String,
        /// IPv4/IPv6 address or MAC (aa:bb:cc:dd:ee:ff).
        value: String,
        /// Entry timeout in seconds (MAC only, 0 = none).
        #[arg(long, default_value_t = 0)]
        timeout: u32,
    },

    /// Delete an address or MAC from a set.
    #[command(visible_alias = "d", visible_alias = "delete")]
    Del {
        /// Set name.
        set: String,
        /// IPv4/IPv6 address or MAC (aa:bb:cc:dd:ee:ff).
        value: String,
    },

    /// Remove every entry from a set.
    #[command(visible_alias = "f")]
    Flush {
        /// Set name.
        set: String,
    },
}

impl Command {
    fn run<T: Transport>(&self, ipset: &Ipset<T>) -> nfset::Result<()> {
        match self {
            Command::Add {
                set,
                value,
                timeout: 0,
            } => ipset.add_entry(set, value, false),
            Command::Add {
                set,
                value,
                timeout,
            } => match classify(value) {
                Some(EntryValue::Mac(mac)) => {
                    ipset.add_hardware_address(set, mac, Family::Inet, *timeout)
                }
                Some(EntryValue::Ip(addr)) => Err(nfset::Error::NotSupported(format!(
                    "entry timeout for address {}",
                    addr
                ))),
                None => Err(nfset::Error::UnclassifiedInput(value.clone())),
            },
            Command::Del { set, value } => ipset.add_entry(set, value, true),
            Command::Flush { set } => ipset.flush(set),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let policy = load_policy(cli.config.as_deref(), cli.max_attempts, cli.backoff_us)?;
    let deadline = cli.deadline_ms.map(Duration::from_millis);
    tracing::debug!(?policy, ?deadline, dry_run = cli.dry_run, "starting");

    if cli.dry_run {
        let capture = Arc::new(Capture::default());
        let ipset = Arc::new(Ipset::with_policy(Arc::clone(&capture), policy));
        execute(&ipset, cli.command, deadline).await?;

        for msg in capture.take() {
            let decoded = parse::decode(&msg)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&decoded)?);
            } else {
                print!("{}", decoded);
            }
        }
    } else {
        let socket = IpsetSocket::new().context("opening netfilter socket")?;
        let ipset = Arc::new(Ipset::with_policy(socket, policy));
        execute(&ipset, cli.command, deadline).await?;
    }

    Ok(())
}

async fn execute<T>(
    ipset: &Arc<Ipset<T>>,
    command: Command,
    deadline: Option<Duration>,
) -> nfset::Result<()>
where
    T: Transport + Send + Sync + 'static,
{
    match deadline {
        Some(deadline) => {
            ipset
                .with_deadline(deadline, move |s| command.run(s))
                .await
        }
        None => command.run(ipset),
    }
}

/// Build the retry policy: defaults, then the config file, then flags.
fn load_policy(
    config: Option<&Path>,
    max_attempts: Option<u32>,
    backoff_us: Option<u64>,
) -> anyhow::Result<RetryPolicy> {
    let mut policy = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => RetryPolicy::default(),
    };

    if let Some(n) = max_attempts {
        policy = policy.max_attempts(n);
    }
    if let Some(us) = backoff_us {
        policy = policy.backoff(Duration::from_micros(us));
    }

    Ok(policy)
}
