//! Scriptable in-memory ledger and virtual clock for tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::client::{AccountTxPage, AccountTxRequest, LedgerClient};
use crate::clock::{CancelToken, Clock};
use crate::error::{WatchError, WatchResult};
use crate::types::{
    DeliveredAmount, LedgerIndex, LedgerWindow, Transaction, PFT_CURRENCY, PFT_ISSUER,
};

/// A PFT payment into the watched account with the memo stored as given.
pub fn incoming(hash: &str, value: &str, raw_memo: &str) -> Transaction {
    incoming_issued(hash, value, PFT_ISSUER, raw_memo)
}

/// Like [`incoming`], but a "PFT" issued by `issuer`.
pub fn incoming_issued(hash: &str, value: &str, issuer: &str, raw_memo: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        ledger_index: None,
        amount: DeliveredAmount::Issued {
            value: value.to_string(),
            currency: PFT_CURRENCY.to_string(),
            issuer: issuer.to_string(),
        },
        raw_memo: raw_memo.to_string(),
    }
}

/// A native XRP payment of `drops`.
pub fn incoming_drops(hash: &str, drops: &str, raw_memo: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        ledger_index: None,
        amount: DeliveredAmount::Drops {
            drops: drops.to_string(),
        },
        raw_memo: raw_memo.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub account: String,
    pub window: LedgerWindow,
    pub limit: usize,
}

struct Entry {
    txn: Transaction,
    // visible once more than this many account_tx calls were made
    after_calls: usize,
}

struct State {
    head: LedgerIndex,
    head_failures: VecDeque<WatchError>,
    tx_failures: VecDeque<WatchError>,
    entries: Vec<Entry>,
    page_size: usize,
    head_queries: usize,
    account_tx_calls: usize,
    requests: Vec<RecordedRequest>,
}

/// In-memory [`LedgerClient`]. Clones share state.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
}

impl MockLedger {
    pub fn new(head: LedgerIndex) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                head,
                head_failures: VecDeque::new(),
                tx_failures: VecDeque::new(),
                entries: Vec::new(),
                page_size: usize::MAX,
                head_queries: 0,
                account_tx_calls: 0,
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().page_size = page_size.max(1);
        self
    }

    pub fn set_head(&self, head: LedgerIndex) {
        self.state.lock().head = head;
    }

    /// Append transactions, newest first, visible from the next call on.
    pub fn push_transactions(&self, txns: Vec<Transaction>) {
        self.push_transactions_after(0, txns);
    }

    /// Append transactions that only show up after `calls` account_tx calls.
    pub fn push_transactions_after(&self, calls: usize, txns: Vec<Transaction>) {
        let mut state = self.state.lock();
        state.entries.extend(txns.into_iter().map(|txn| Entry {
            txn,
            after_calls: calls,
        }));
    }

    /// The next account_tx call fails with `err`. Failures queue up.
    pub fn push_failure(&self, err: WatchError) {
        self.state.lock().tx_failures.push_back(err);
    }

    pub fn fail_next_head_query(&self, err: WatchError) {
        self.state.lock().head_failures.push_back(err);
    }

    pub fn head_queries(&self) -> usize {
        self.state.lock().head_queries
    }

    pub fn account_tx_calls(&self) -> usize {
        self.state.lock().account_tx_calls
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }
}

impl LedgerClient for MockLedger {
    fn validated_ledger_index(&self) -> WatchResult<LedgerIndex> {
        let mut state = self.state.lock();
        state.head_queries += 1;
        match state.head_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.head),
        }
    }

    fn account_transactions(&self, request: &AccountTxRequest<'_>) -> WatchResult<AccountTxPage> {
        let mut state = self.state.lock();
        state.account_tx_calls += 1;
        state.requests.push(RecordedRequest {
            account: request.account.to_string(),
            window: request.window,
            limit: request.limit,
        });
        if let Some(err) = state.tx_failures.pop_front() {
            return Err(err);
        }

        let calls = state.account_tx_calls;
        let visible: Vec<&Transaction> = state
            .entries
            .iter()
            .filter(|e| calls > e.after_calls)
            .filter(|e| e.txn.ledger_index.map_or(true, |i| request.window.contains(i)))
            .map(|e| &e.txn)
            .collect();
        let offset = request
            .marker
            .and_then(|m| m.as_u64())
            .unwrap_or(0) as usize;
        let take = request.limit.min(state.page_size);
        let transactions: Vec<Transaction> = visible
            .iter()
            .skip(offset)
            .take(take)
            .map(|t| (*t).clone())
            .collect();
        let next = offset + transactions.len();
        let marker = (next < visible.len()).then(|| json!(next));
        Ok(AccountTxPage {
            transactions,
            marker,
        })
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}
