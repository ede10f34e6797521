mod config;
mod session;

use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_watch::memo::{decode_memo, encode_memo, generate_correlation_token};
use ledger_watch::poll::Poller;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{NodeArgs, ReferralArgs, WatchArgs};
use crate::session::{random_user_id, run_session, SessionRequest};

#[derive(Parser)]
#[command(name = "pft-verify", version, about = "Verify PFT donations on the XRP Ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a payment carrying the correlation token in its memo.
    Poll {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        watch: WatchArgs,
        #[arg(long, env = "TEMP_ID")]
        token: String,
    },
    /// Correlation token helpers.
    #[command(subcommand)]
    Memo(MemoCommand),
    /// Run a full `!pythia` donation session for one user.
    Session {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        watch: WatchArgs,
        #[command(flatten)]
        referral: ReferralArgs,
        /// Defaults to a random `user_NNNN`.
        #[arg(long)]
        user: Option<String>,
        /// e.g. "!pythia refer-zeno what does tomorrow hold?"
        input: String,
    },
}

#[derive(Subcommand)]
enum MemoCommand {
    /// Issue a fresh token and its hex memo.
    New,
    /// Decode a memo as it appears on the ledger.
    Decode { raw: String },
}

#[derive(Serialize)]
struct MemoToken {
    token: String,
    memo_hex: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("cannot serialize result")?;
    println!("{text}");
    Ok(())
}

fn verdict(verified: bool) -> ExitCode {
    if verified {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn poll_cmd(node: &NodeArgs, watch: &WatchArgs, token: &str) -> Result<ExitCode> {
    let (criteria, config) = watch.validated(token)?;
    let poller = Poller::new(node.client()?);
    let outcome = poller.poll(&watch.wallet, &criteria, &config)?;
    print_json(&outcome)?;
    Ok(verdict(outcome.is_verified()))
}

fn memo_cmd(cmd: &MemoCommand) -> Result<ExitCode> {
    match cmd {
        MemoCommand::New => {
            let token = generate_correlation_token(&mut rand::thread_rng());
            let memo_hex = encode_memo(&token);
            print_json(&MemoToken { token, memo_hex })?;
        }
        MemoCommand::Decode { raw } => println!("{}", decode_memo(raw)),
    }
    Ok(ExitCode::SUCCESS)
}

fn session_cmd(
    node: &NodeArgs,
    watch: &WatchArgs,
    referral: &ReferralArgs,
    user: Option<&str>,
    input: &str,
) -> Result<ExitCode> {
    let mut store = referral.store()?;
    let poller = Poller::new(node.client()?);
    let mut rng = rand::thread_rng();
    let request = SessionRequest {
        user_id: user.map_or_else(|| random_user_id(&mut rng), str::to_string),
        input: input.to_string(),
        now: unix_now(),
    };

    let report = run_session(&poller, &mut store, watch, &request, &mut rng, |text| {
        eprintln!("{text}")
    })?;
    print_json(&report)?;
    Ok(verdict(report.outcome.is_verified()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Poll { node, watch, token } => poll_cmd(node, watch, token),
        Command::Memo(cmd) => memo_cmd(cmd),
        Command::Session {
            node,
            watch,
            referral,
            user,
            input,
        } => session_cmd(node, watch, referral, user.as_deref(), input),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
