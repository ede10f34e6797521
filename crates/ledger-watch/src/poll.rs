//! Bounded poll loop.
//!
//! A poll invocation is a small state machine:
//!
//! ```text
//! Polling ──match──▶ Verified
//!    │
//!    ├──deadline──▶ TimedOut
//!    └──cancel────▶ Cancelled
//! ```
//!
//! Each cycle resolves the scan window, fetches a bounded batch, decodes and
//! evaluates transactions in fetch order and stops at the first match.
//! Upstream failures only cost the current cycle; the caller sees either a
//! verified transaction or [`PollOutcome::NotFound`].

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::LedgerClient;
use crate::clock::{CancelToken, Clock, SystemClock};
use crate::error::{WatchError, WatchResult};
use crate::fetch::fetch_recent;
use crate::matcher::evaluate;
use crate::memo::decode_memo;
use crate::types::{AcceptanceCriteria, PollOutcome, Transaction};
use crate::window::resolve_window;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_LOOKBACK_DEPTH: u64 = 5_000;
pub const DEFAULT_BATCH_LIMIT: usize = 25;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
    /// How many ledgers behind the validated head to start scanning.
    pub lookback_depth: u64,
    pub batch_limit: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
            lookback_depth: DEFAULT_LOOKBACK_DEPTH,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> WatchResult<()> {
        if self.timeout.is_zero() {
            return Err(WatchError::Configuration("timeout must be > 0".into()));
        }
        if self.interval.is_zero() {
            return Err(WatchError::Configuration("poll interval must be > 0".into()));
        }
        if self.interval >= self.timeout {
            return Err(WatchError::Configuration(format!(
                "poll interval ({:?}) must be shorter than timeout ({:?})",
                self.interval, self.timeout
            )));
        }
        if self.batch_limit == 0 {
            return Err(WatchError::Configuration("batch limit must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Polling,
    Verified,
    TimedOut,
    Cancelled,
}

/// Outcome of one invocation plus how it got there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub state: PollState,
    pub cycles: u32,
    pub elapsed: Duration,
}

/// Drives fetch → decode → evaluate until a match or the deadline.
///
/// Holds no per-invocation state, so one poller can serve concurrent
/// invocations from several threads.
pub struct Poller<C, K = SystemClock> {
    client: C,
    clock: K,
}

impl<C: LedgerClient> Poller<C, SystemClock> {
    pub fn new(client: C) -> Self {
        Self::with_clock(client, SystemClock::new())
    }
}

impl<C: LedgerClient, K: Clock> Poller<C, K> {
    pub fn with_clock(client: C, clock: K) -> Self {
        Self { client, clock }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Block until a matching transfer shows up or `config.timeout` elapses.
    ///
    /// Returns `Err` only for invalid configuration.
    pub fn poll(
        &self,
        account: &str,
        criteria: &AcceptanceCriteria,
        config: &PollConfig,
    ) -> WatchResult<PollOutcome> {
        self.poll_with_cancel(account, criteria, config, &CancelToken::new())
    }

    pub fn poll_with_cancel(
        &self,
        account: &str,
        criteria: &AcceptanceCriteria,
        config: &PollConfig,
        cancel: &CancelToken,
    ) -> WatchResult<PollOutcome> {
        self.run(account, criteria, config, cancel)
            .map(|report| report.outcome)
    }

    pub fn run(
        &self,
        account: &str,
        criteria: &AcceptanceCriteria,
        config: &PollConfig,
        cancel: &CancelToken,
    ) -> WatchResult<PollReport> {
        config.validate()?;
        criteria.validate()?;

        let started = self.clock.now();
        let deadline = started.checked_add(config.timeout).ok_or_else(|| {
            WatchError::Configuration(format!("timeout {:?} is out of range", config.timeout))
        })?;
        let mut cycles = 0u32;
        let mut state = PollState::Polling;
        let mut matched: Option<Transaction> = None;

        info!(
            account,
            min_amount = %criteria.min_amount,
            token = %criteria.correlation_token,
            timeout_secs = config.timeout.as_secs(),
            interval_secs = config.interval.as_secs(),
            "starting poll for incoming transaction"
        );

        while state == PollState::Polling {
            if cancel.is_cancelled() {
                state = PollState::Cancelled;
                break;
            }
            cycles += 1;
            match self.run_cycle(account, criteria, config) {
                Ok(Some(txn)) => {
                    matched = Some(txn);
                    state = PollState::Verified;
                    continue;
                }
                Ok(None) => debug!(account, cycle = cycles, "no matching transaction in batch"),
                Err(err @ WatchError::AccountNotFound(_)) => {
                    warn!(account, cycle = cycles, %err, "account has no ledger history yet")
                }
                Err(err) => error!(account, cycle = cycles, %err, "ledger fetch failed; cycle treated as empty"),
            }

            self.clock.sleep(config.interval, cancel);
            if cancel.is_cancelled() {
                state = PollState::Cancelled;
            } else if self.clock.now() >= deadline {
                state = PollState::TimedOut;
            }
        }

        let elapsed = self.clock.now().saturating_sub(started);
        let outcome = match (state, matched) {
            (PollState::Verified, Some(transaction)) => {
                info!(account, hash = %transaction.hash, cycles, "valid transaction found");
                PollOutcome::Verified { transaction }
            }
            (PollState::Cancelled, _) => {
                info!(account, cycles, "poll cancelled");
                PollOutcome::NotFound
            }
            _ => {
                info!(
                    account,
                    cycles,
                    timeout_secs = config.timeout.as_secs(),
                    "no valid transaction found within timeout"
                );
                PollOutcome::NotFound
            }
        };
        Ok(PollReport {
            outcome,
            state,
            cycles,
            elapsed,
        })
    }

    fn run_cycle(
        &self,
        account: &str,
        criteria: &AcceptanceCriteria,
        config: &PollConfig,
    ) -> WatchResult<Option<Transaction>> {
        let window = resolve_window(&self.client, config.lookback_depth)?;
        debug!(account, start = window.start, "scanning ledger window");

        for item in fetch_recent(&self.client, account, window, config.batch_limit) {
            let txn = item?;
            let memo = decode_memo(&txn.raw_memo);
            match evaluate(&txn, &memo, criteria) {
                Ok(true) => return Ok(Some(txn)),
                Ok(false) => {}
                Err(err) => warn!(hash = %txn.hash, %err, "skipping transaction"),
            }
        }
        Ok(None)
    }
}
