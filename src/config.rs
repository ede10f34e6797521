use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use ledger_watch::client::{XrplRpcClient, DEFAULT_REQUEST_TIMEOUT};
use ledger_watch::poll::{
    PollConfig, DEFAULT_BATCH_LIMIT, DEFAULT_LOOKBACK_DEPTH, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
use ledger_watch::types::{NATIVE_CURRENCY, PFT_CURRENCY, PFT_ISSUER};
use ledger_watch::{AcceptanceCriteria, Asset};
use referral_module::{ReferralConfig, ReferralStore, ReferrerDirectory, DEFAULT_COMMISSION_BPS};
use rust_decimal::Decimal;

pub const DEFAULT_RPC_ENDPOINT: &str = "https://xrplcluster.com";

/// Where the ledger node lives.
#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// JSON-RPC endpoint of an XRPL node.
    #[arg(long, env = "XRPL_RPC_ENDPOINT", default_value = DEFAULT_RPC_ENDPOINT)]
    pub rpc_endpoint: String,

    /// Per-request HTTP timeout.
    #[arg(
        long,
        env = "RPC_TIMEOUT",
        value_name = "SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..=3_600)
    )]
    pub rpc_timeout: u64,
}

impl NodeArgs {
    pub fn client(&self) -> Result<XrplRpcClient> {
        XrplRpcClient::with_timeout(&self.rpc_endpoint, Duration::from_secs(self.rpc_timeout))
            .with_context(|| format!("cannot build RPC client for {}", self.rpc_endpoint))
    }
}

/// What to watch for and for how long.
#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Account that receives donations.
    #[arg(long, env = "WALLET_ADDRESS")]
    pub wallet: String,

    #[arg(long, env = "MIN_AMOUNT", default_value = "1.0", value_parser = parse_amount)]
    pub min_amount: Decimal,

    #[arg(long, env = "TIMEOUT", value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    #[arg(long, env = "POLL_INTERVAL", value_name = "SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval: u64,

    /// How many ledgers behind the validated head to scan.
    #[arg(long, env = "LEDGER_OFFSET", default_value_t = DEFAULT_LOOKBACK_DEPTH)]
    pub ledger_offset: u64,

    #[arg(long, env = "BATCH_LIMIT", default_value_t = DEFAULT_BATCH_LIMIT)]
    pub batch_limit: usize,

    /// Expected currency code; XRP selects native drops.
    #[arg(long, env = "PFT_CURRENCY", default_value = PFT_CURRENCY)]
    pub currency: String,

    /// Issuer of the expected token. Ignored for XRP.
    #[arg(long, env = "PFT_ISSUER", default_value = PFT_ISSUER)]
    pub issuer: String,
}

impl WatchArgs {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: Duration::from_secs(self.timeout),
            interval: Duration::from_secs(self.poll_interval),
            lookback_depth: self.ledger_offset,
            batch_limit: self.batch_limit,
        }
    }

    pub fn asset(&self) -> Asset {
        if self.currency.eq_ignore_ascii_case(NATIVE_CURRENCY) {
            Asset::native()
        } else {
            Asset::issued(self.currency.as_str(), self.issuer.as_str())
        }
    }

    pub fn criteria(&self, correlation_token: &str) -> Result<AcceptanceCriteria> {
        AcceptanceCriteria::new(self.min_amount, correlation_token)
            .and_then(|criteria| criteria.with_asset(self.asset()))
            .context("invalid acceptance criteria")
    }

    /// Everything a poll needs, checked before any side effect.
    pub fn validated(&self, correlation_token: &str) -> Result<(AcceptanceCriteria, PollConfig)> {
        let config = self.poll_config();
        config.validate().context("invalid poll configuration")?;
        Ok((self.criteria(correlation_token)?, config))
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReferralArgs {
    /// JSON object mapping referrer names to payout wallets.
    #[arg(long, env = "REFERRERS_FILE")]
    pub referrers_file: Option<PathBuf>,

    /// Referrer share of a donation in basis points.
    #[arg(long, env = "COMMISSION_BPS", default_value_t = DEFAULT_COMMISSION_BPS)]
    pub commission_bps: u32,
}

impl ReferralArgs {
    pub fn store(&self) -> Result<ReferralStore> {
        let config = ReferralConfig::new(self.commission_bps)?;
        let directory = match &self.referrers_file {
            Some(path) => ReferrerDirectory::from_json_file(path)
                .with_context(|| format!("cannot load referrers from {}", path.display()))?,
            None => ReferrerDirectory::new(),
        };
        tracing::debug!(referrers = directory.len(), "referrer directory loaded");
        Ok(ReferralStore::new(config, directory))
    }
}

fn parse_amount(s: &str) -> Result<Decimal, String> {
    Decimal::from_str(s.trim()).map_err(|e| format!("invalid amount {s:?}: {e}"))
}
