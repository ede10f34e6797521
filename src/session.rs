//! One donation-gated query: command in, verified donation and planned
//! referrer commission out.

use anyhow::{bail, Result};
use ledger_watch::client::LedgerClient;
use ledger_watch::clock::Clock;
use ledger_watch::memo::generate_correlation_token;
use ledger_watch::poll::Poller;
use ledger_watch::PollOutcome;
use rand::Rng;
use referral_module::{parse_command, CommissionPayout, ReferralStore};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::WatchArgs;

#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub user_id: String,
    pub input: String,
    /// Unix seconds.
    pub now: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub query: String,
    pub referrer: Option<String>,
    pub correlation_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub user_id: String,
    pub query: String,
    pub correlation_token: String,
    #[serde(flatten)]
    pub outcome: PollOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionPayout>,
}

/// `user_NNNN` for callers that did not name themselves.
pub fn random_user_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("user_{}", rng.gen_range(1_000u32..=9_999))
}

/// Validate, open, announce, poll and settle one session.
///
/// Configuration errors surface before the referral is stored or anything
/// is announced.
pub fn run_session<C, K, R>(
    poller: &Poller<C, K>,
    store: &mut ReferralStore,
    watch: &WatchArgs,
    request: &SessionRequest,
    rng: &mut R,
    announce: impl FnOnce(&str),
) -> Result<SessionReport>
where
    C: LedgerClient,
    K: Clock,
    R: Rng + ?Sized,
{
    let token = generate_correlation_token(rng);
    let (criteria, config) = watch.validated(&token)?;
    let session = open_session(store, &request.user_id, &request.input, token, request.now)?;
    announce(&session.instructions(&watch.wallet, watch.min_amount));

    let outcome = poller.poll(&watch.wallet, &criteria, &config)?;
    Ok(session.settle(store, outcome, watch.min_amount))
}

/// Parse the command and remember the referral.
///
/// An unknown referral code is logged and ignored.
pub fn open_session(
    store: &mut ReferralStore,
    user_id: &str,
    input: &str,
    correlation_token: String,
    now: u64,
) -> Result<Session> {
    let Some(command) = parse_command(input) else {
        bail!("not a !pythia command: {input:?}");
    };
    let referrer = match command.referral_code.as_deref() {
        Some(code) => match store.record(user_id, code, now) {
            Ok(record) => Some(record.referrer_name.clone()),
            Err(err) => {
                tracing::warn!(user_id, %err, "continuing without referral");
                None
            }
        },
        None => None,
    };
    Ok(Session {
        user_id: user_id.to_string(),
        query: command.query,
        referrer,
        correlation_token,
    })
}

impl Session {
    pub fn instructions(&self, wallet: &str, min_amount: Decimal) -> String {
        format!(
            "Send at least {min_amount} PFT to {wallet} with memo {} to receive an answer.",
            self.correlation_token
        )
    }

    /// Attach the donation and the referrer's planned cut to the outcome.
    pub fn settle(
        self,
        store: &ReferralStore,
        outcome: PollOutcome,
        min_amount: Decimal,
    ) -> SessionReport {
        let donation = outcome.transaction().map(|txn| {
            txn.amount_transferred().unwrap_or_else(|err| {
                tracing::warn!(%err, "using minimum amount as donation");
                min_amount
            })
        });
        let commission = donation.and_then(|amount| store.commission_for(&self.user_id, amount));
        SessionReport {
            user_id: self.user_id,
            query: self.query,
            correlation_token: self.correlation_token,
            outcome,
            donation,
            commission,
        }
    }
}
