use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{WatchError, WatchResult};

pub type LedgerIndex = u64;
pub type AccountAddress = String;
pub type TxHash = String;

/// XRP amounts travel as integer drops; 1 XRP = 1e6 drops.
pub const DROPS_SCALE: u32 = 6;
pub const NATIVE_CURRENCY: &str = "XRP";
pub const PFT_CURRENCY: &str = "PFT";
/// Mainnet issuer of the PFT token.
pub const PFT_ISSUER: &str = "rnQUEEg8yyjrwk9FhyXpKavHyCRJM9BDMW";

/// Upper end of a scan range.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBound {
    Index(LedgerIndex),
    /// Scan to the current tip.
    Open,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerWindow {
    pub start: LedgerIndex,
    pub end: LedgerBound,
}

impl LedgerWindow {
    pub fn open_from(start: LedgerIndex) -> Self {
        Self {
            start,
            end: LedgerBound::Open,
        }
    }

    pub fn contains(&self, index: LedgerIndex) -> bool {
        match self.end {
            LedgerBound::Index(end) => index >= self.start && index <= end,
            LedgerBound::Open => index >= self.start,
        }
    }
}

/// Token identity: currency code plus issuer for issued currencies.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub currency: String,
    pub issuer: Option<AccountAddress>,
}

impl Asset {
    pub fn native() -> Self {
        Self {
            currency: NATIVE_CURRENCY.to_string(),
            issuer: None,
        }
    }

    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            issuer: Some(issuer.into()),
        }
    }

    pub fn pft() -> Self {
        Self::issued(PFT_CURRENCY, PFT_ISSUER)
    }

    pub fn is_native(&self) -> bool {
        self.currency == NATIVE_CURRENCY
    }
}

/// Amount as delivered on the wire. The text is parsed only when the
/// transaction is evaluated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveredAmount {
    Drops {
        drops: String,
    },
    Issued {
        value: String,
        currency: String,
        issuer: AccountAddress,
    },
}

impl DeliveredAmount {
    pub fn currency(&self) -> &str {
        match self {
            DeliveredAmount::Drops { .. } => NATIVE_CURRENCY,
            DeliveredAmount::Issued { currency, .. } => currency,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            DeliveredAmount::Drops { .. } => None,
            DeliveredAmount::Issued { issuer, .. } => Some(issuer),
        }
    }

    /// Currency code and issuer must both match; anyone can issue a token
    /// under any currency code.
    pub fn is_asset(&self, asset: &Asset) -> bool {
        self.currency() == asset.currency && self.issuer() == asset.issuer.as_deref()
    }

    pub fn value(&self) -> Result<Decimal, String> {
        match self {
            DeliveredAmount::Drops { drops } => drops
                .trim()
                .parse::<u64>()
                .map(|d| Decimal::from_i128_with_scale(d as i128, DROPS_SCALE))
                .map_err(|e| format!("invalid drops amount {drops:?}: {e}")),
            DeliveredAmount::Issued { value, .. } => {
                let text = value.trim();
                Decimal::from_str(text)
                    .or_else(|_| Decimal::from_scientific(text))
                    .map_err(|e| format!("invalid issued amount {value:?}: {e}"))
            }
        }
    }
}

/// One incoming transfer as fetched from the node. Never mutated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: TxHash,
    pub ledger_index: Option<LedgerIndex>,
    pub amount: DeliveredAmount,
    /// Memo data as found on the wire, usually hex.
    pub raw_memo: String,
}

impl Transaction {
    pub fn amount_transferred(&self) -> WatchResult<Decimal> {
        self.amount
            .value()
            .map_err(|reason| WatchError::MalformedTransaction {
                hash: self.hash.clone(),
                reason,
            })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceptanceCriteria {
    pub min_amount: Decimal,
    pub correlation_token: String,
    /// Expected token. Defaults to PFT from its mainnet issuer.
    pub asset: Asset,
}

impl AcceptanceCriteria {
    pub fn new(min_amount: Decimal, correlation_token: impl Into<String>) -> WatchResult<Self> {
        let criteria = Self {
            min_amount,
            correlation_token: correlation_token.into(),
            asset: Asset::pft(),
        };
        criteria.validate()?;
        Ok(criteria)
    }

    pub fn with_asset(mut self, asset: Asset) -> WatchResult<Self> {
        self.asset = asset;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> WatchResult<()> {
        if self.min_amount < Decimal::ZERO {
            return Err(WatchError::Configuration(format!(
                "minimum amount must be >= 0, got {}",
                self.min_amount
            )));
        }
        if self.correlation_token.is_empty() {
            return Err(WatchError::Configuration(
                "correlation token must not be empty".into(),
            ));
        }
        match (&self.asset.issuer, self.asset.is_native()) {
            (None, false) => Err(WatchError::Configuration(format!(
                "token {} needs an issuer",
                self.asset.currency
            ))),
            (Some(_), true) => Err(WatchError::Configuration(format!(
                "{NATIVE_CURRENCY} has no issuer"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum PollOutcome {
    #[serde(rename = "VERIFIED")]
    Verified { transaction: Transaction },
    #[serde(rename = "NO_TRANSACTION")]
    NotFound,
}

impl PollOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, PollOutcome::Verified { .. })
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            PollOutcome::Verified { transaction } => Some(transaction),
            PollOutcome::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued(value: &str) -> DeliveredAmount {
        DeliveredAmount::Issued {
            value: value.into(),
            currency: PFT_CURRENCY.into(),
            issuer: PFT_ISSUER.into(),
        }
    }

    #[test]
    fn drops_convert_to_whole_xrp_exactly() {
        let amount = DeliveredAmount::Drops {
            drops: "1500000".into(),
        };
        assert_eq!(amount.value().unwrap(), Decimal::new(15, 1));
    }

    #[test]
    fn issued_amounts_accept_scientific_notation() {
        assert_eq!(issued("1.25").value().unwrap(), Decimal::new(125, 2));
        assert_eq!(issued("5e-1").value().unwrap(), Decimal::new(5, 1));
        assert!(issued("lots").value().is_err());
    }

    #[test]
    fn malformed_amount_names_the_transaction() {
        let txn = Transaction {
            hash: "ABC".into(),
            ledger_index: Some(7),
            amount: issued(""),
            raw_memo: String::new(),
        };
        match txn.amount_transferred().unwrap_err() {
            WatchError::MalformedTransaction { hash, .. } => assert_eq!(hash, "ABC"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn asset_matching_compares_currency_and_issuer() {
        let amount = issued("1");
        assert!(amount.is_asset(&Asset::pft()));
        assert!(!amount.is_asset(&Asset::issued("PFT", "rSelfIssued")));
        assert!(!amount.is_asset(&Asset {
            currency: "PFT".into(),
            issuer: None,
        }));
        assert!(!amount.is_asset(&Asset::native()));

        let drops = DeliveredAmount::Drops {
            drops: "1".into(),
        };
        assert!(drops.is_asset(&Asset::native()));
        assert!(!drops.is_asset(&Asset::pft()));
    }

    #[test]
    fn criteria_reject_empty_token_and_negative_minimum() {
        assert!(AcceptanceCriteria::new(Decimal::ONE, "").is_err());
        assert!(AcceptanceCriteria::new(Decimal::NEGATIVE_ONE, "tok").is_err());
        assert!(AcceptanceCriteria::new(Decimal::ZERO, "tok").is_ok());
    }

    #[test]
    fn criteria_default_to_pft_and_reject_issuerless_tokens() {
        let c = AcceptanceCriteria::new(Decimal::ONE, "tok").unwrap();
        assert_eq!(c.asset, Asset::pft());
        let issuerless = Asset {
            currency: "PFT".into(),
            issuer: None,
        };
        assert!(c.clone().with_asset(issuerless).is_err());
        assert!(c.clone().with_asset(Asset::issued("XRP", "rX")).is_err());
        assert!(c.with_asset(Asset::native()).is_ok());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(PollOutcome::NotFound).unwrap();
        assert_eq!(json["status"], "NO_TRANSACTION");
    }

    #[test]
    fn open_window_contains_everything_from_start() {
        let window = LedgerWindow::open_from(10);
        assert!(!window.contains(9));
        assert!(window.contains(10));
        assert!(window.contains(u64::MAX));
    }
}
