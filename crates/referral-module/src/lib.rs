//! Referral bookkeeping for donation-gated queries.
//!
//! A donor may name a referrer when issuing a command (`refer-<name>`). The
//! [`ReferralStore`] remembers who referred whom for the lifetime of the
//! process and plans the referrer's commission once a donation is verified.
//! Nothing here touches the ledger; payouts are plans for the caller to act on.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = String;
pub type ReferrerName = String;
pub type AccountId = String;

pub const COMMAND_PREFIX: &str = "!pythia";
pub const REFERRAL_CODE_PREFIX: &str = "refer-";
pub const DEFAULT_COMMISSION_BPS: u32 = 3_000;

#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("unknown referrer code {0}")]
    UnknownReferrer(String),
    #[error("commission must be at most 10000 bps, got {0}")]
    InvalidCommission(u32),
    #[error("failed to read referrer directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed referrer directory: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferralConfig {
    /// Share of the donation paid to the referrer, in basis points.
    pub commission_bps: u32,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            commission_bps: DEFAULT_COMMISSION_BPS,
        }
    }
}

impl ReferralConfig {
    pub fn new(commission_bps: u32) -> Result<Self, ReferralError> {
        if commission_bps > 10_000 {
            return Err(ReferralError::InvalidCommission(commission_bps));
        }
        Ok(Self { commission_bps })
    }

    /// `None` when the product leaves the decimal range.
    pub fn commission_on(&self, donation: Decimal) -> Option<Decimal> {
        donation
            .checked_mul(Decimal::from(self.commission_bps))?
            .checked_div(Decimal::from(10_000u32))
    }
}

/// Known referrers and their payout wallets.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReferrerDirectory {
    wallets: BTreeMap<ReferrerName, AccountId>,
}

impl ReferrerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `{"name": "rWallet", ...}` JSON object.
    pub fn from_json_file(path: &Path) -> Result<Self, ReferralError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn insert(&mut self, name: impl Into<String>, wallet: impl Into<String>) {
        self.wallets.insert(name.into().to_lowercase(), wallet.into());
    }

    /// Names match case-insensitively, including keys loaded from JSON.
    pub fn wallet(&self, name: &str) -> Option<&AccountId> {
        self.wallets.get(&name.to_lowercase()).or_else(|| {
            self.wallets
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, wallet)| wallet)
        })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferralRecord {
    pub referrer_name: ReferrerName,
    pub referrer_wallet: AccountId,
    /// Unix seconds.
    pub recorded_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionPayout {
    pub user_id: UserId,
    pub referrer_name: ReferrerName,
    pub recipient: AccountId,
    pub amount: Decimal,
    pub memo: String,
}

/// Per-process referral state keyed by user id.
#[derive(Clone, Debug, Default)]
pub struct ReferralStore {
    config: ReferralConfig,
    directory: ReferrerDirectory,
    records: BTreeMap<UserId, ReferralRecord>,
}

impl ReferralStore {
    pub fn new(config: ReferralConfig, directory: ReferrerDirectory) -> Self {
        Self {
            config,
            directory,
            records: BTreeMap::new(),
        }
    }

    /// Remember that `user_id` was referred via `code` (`refer-<name>` or a
    /// bare name). Unknown referrers are rejected and nothing is stored.
    pub fn record(
        &mut self,
        user_id: &str,
        code: &str,
        now: u64,
    ) -> Result<&ReferralRecord, ReferralError> {
        let lowered = code.trim().to_lowercase();
        let name = lowered
            .strip_prefix(REFERRAL_CODE_PREFIX)
            .unwrap_or(&lowered)
            .to_string();
        let wallet = match self.directory.wallet(&name) {
            Some(wallet) => wallet.clone(),
            None => {
                tracing::warn!(user_id, code, "unknown referrer code");
                return Err(ReferralError::UnknownReferrer(code.to_string()));
            }
        };
        tracing::info!(user_id, referrer = %name, "stored referral");
        let record = ReferralRecord {
            referrer_name: name,
            referrer_wallet: wallet,
            recorded_at: now,
        };
        self.records.insert(user_id.to_string(), record);
        Ok(&self.records[user_id])
    }

    pub fn get(&self, user_id: &str) -> Option<&ReferralRecord> {
        self.records.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Plan the referrer's share of a verified donation.
    pub fn commission_for(&self, user_id: &str, donation: Decimal) -> Option<CommissionPayout> {
        let Some(record) = self.records.get(user_id) else {
            tracing::info!(user_id, "no referral data, skipping commission");
            return None;
        };
        let Some(amount) = self.config.commission_on(donation) else {
            tracing::warn!(user_id, %donation, "commission out of range, skipping");
            return None;
        };
        if amount <= Decimal::ZERO {
            return None;
        }
        Some(CommissionPayout {
            user_id: user_id.to_string(),
            referrer_name: record.referrer_name.clone(),
            recipient: record.referrer_wallet.clone(),
            amount,
            memo: format!("Commission for user {user_id}"),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub query: String,
    pub referral_code: Option<String>,
}

/// Parse `!pythia [refer-<name>] <question...>`.
///
/// The prefix is matched case-insensitively. The first word starting with
/// `refer-` (any case) becomes the lower-cased referral code and is removed
/// from the query. Returns `None` when the prefix is missing.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    let head = input.get(..COMMAND_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(COMMAND_PREFIX) {
        return None;
    }
    let mut words: Vec<&str> = input[COMMAND_PREFIX.len()..].split_whitespace().collect();
    let referral_code = words
        .iter()
        .position(|w| w.to_lowercase().starts_with(REFERRAL_CODE_PREFIX))
        .map(|idx| words.remove(idx).to_lowercase());
    Some(ParsedCommand {
        query: words.join(" "),
        referral_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    fn directory() -> ReferrerDirectory {
        let mut dir = ReferrerDirectory::new();
        dir.insert("zeno", "rZenoReferrerWallet");
        dir.insert("athena", "rAthenaReferrerWallet");
        dir
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_prefix_referral_and_query() {
        let parsed =
            parse_command("!Pythia REFER-Zeno Shall I change my career?").unwrap();
        assert_eq!(parsed.referral_code.as_deref(), Some("refer-zeno"));
        assert_eq!(parsed.query, "Shall I change my career?");

        let parsed = parse_command("!pythia what now refer-athena").unwrap();
        assert_eq!(parsed.referral_code.as_deref(), Some("refer-athena"));
        assert_eq!(parsed.query, "what now");

        let parsed = parse_command("!pythia").unwrap();
        assert_eq!(parsed.query, "");
        assert!(parsed.referral_code.is_none());
    }

    #[test]
    fn rejects_input_without_prefix() {
        assert!(parse_command("hello oracle").is_none());
        assert!(parse_command("!py").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn only_the_first_referral_code_is_taken() {
        let parsed = parse_command("!pythia refer-zeno refer-athena q").unwrap();
        assert_eq!(parsed.referral_code.as_deref(), Some("refer-zeno"));
        assert_eq!(parsed.query, "refer-athena q");
    }

    #[test]
    fn records_known_referrers_only() {
        let mut store = ReferralStore::new(ReferralConfig::default(), directory());
        let record = store.record("user_1234", "refer-zeno", 1_700_000_000).unwrap();
        assert_eq!(record.referrer_wallet, "rZenoReferrerWallet");
        assert_eq!(record.referrer_name, "zeno");

        assert!(matches!(
            store.record("user_5678", "refer-hermes", 0),
            Err(ReferralError::UnknownReferrer(_))
        ));
        assert!(store.get("user_5678").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commission_is_thirty_percent_in_exact_decimal() {
        let mut store = ReferralStore::new(ReferralConfig::default(), directory());
        store.record("u", "refer-athena", 0).unwrap();

        let payout = store.commission_for("u", dec("2.5")).unwrap();
        assert_eq!(payout.amount, dec("0.75"));
        assert_eq!(payout.recipient, "rAthenaReferrerWallet");
        assert_eq!(payout.memo, "Commission for user u");

        let payout = store.commission_for("u", dec("0.1")).unwrap();
        assert_eq!(payout.amount, dec("0.03"));
    }

    #[test]
    fn no_commission_without_referral_or_amount() {
        let mut store = ReferralStore::new(ReferralConfig::default(), directory());
        assert!(store.commission_for("nobody", dec("10")).is_none());
        store.record("u", "zeno", 0).unwrap();
        assert!(store.commission_for("u", Decimal::ZERO).is_none());
    }

    #[test]
    fn commission_rate_is_bounded() {
        assert!(ReferralConfig::new(10_001).is_err());
        let cfg = ReferralConfig::new(1_000).unwrap();
        assert_eq!(cfg.commission_on(dec("7")), Some(dec("0.7")));
    }

    #[test]
    fn oversized_donation_plans_no_commission() {
        let mut store = ReferralStore::new(ReferralConfig::default(), directory());
        store.record("u", "refer-zeno", 0).unwrap();

        let huge = Decimal::from_scientific("1e28").unwrap();
        assert!(store.commission_for("u", huge).is_none());
        assert!(store.commission_for("u", Decimal::MAX).is_none());
        assert!(store.commission_for("u", dec("1000000")).is_some());
    }

    #[test]
    fn directory_round_trips_as_plain_json_object() {
        let json = r#"{"zeno": "rZ", "Apollo": "rA"}"#;
        let dir: ReferrerDirectory = serde_json::from_str(json).unwrap();
        assert_eq!(dir.wallet("zeno").map(String::as_str), Some("rZ"));
        assert_eq!(dir.wallet("apollo").map(String::as_str), Some("rA"));
        assert_eq!(dir.len(), 2);
    }
}
