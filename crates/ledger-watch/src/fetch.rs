use std::iter::FusedIterator;

use crate::client::{AccountTxRequest, LedgerClient, PageMarker};
use crate::error::WatchResult;
use crate::types::{LedgerWindow, Transaction};

/// Upper bound on page requests for one batch, so a node that keeps handing
/// back empty pages with a marker cannot stall a cycle.
pub const MAX_PAGES_PER_BATCH: usize = 16;

/// Lazily page through the most recent incoming payments of `account`.
///
/// Yields at most `limit` transactions in the order the node delivers them
/// (newest first). Nothing is requested until the first call to `next`, and
/// every call to `fetch_recent` goes back to the node. After an error the
/// iterator is exhausted.
pub fn fetch_recent<'a, C: LedgerClient + ?Sized>(
    client: &'a C,
    account: &'a str,
    window: LedgerWindow,
    limit: usize,
) -> RecentTransactions<'a, C> {
    RecentTransactions {
        client,
        account,
        window,
        remaining: limit,
        buffered: Vec::new().into_iter(),
        marker: None,
        pages: 0,
        exhausted: false,
    }
}

pub struct RecentTransactions<'a, C: ?Sized> {
    client: &'a C,
    account: &'a str,
    window: LedgerWindow,
    remaining: usize,
    buffered: std::vec::IntoIter<Transaction>,
    marker: Option<PageMarker>,
    pages: usize,
    exhausted: bool,
}

impl<'a, C: LedgerClient + ?Sized> RecentTransactions<'a, C> {
    /// Number of page requests issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> WatchResult<()> {
        let request = AccountTxRequest {
            account: self.account,
            window: self.window,
            limit: self.remaining,
            marker: self.marker.as_ref(),
        };
        let page = self.client.account_transactions(&request)?;
        self.pages += 1;
        tracing::trace!(
            account = self.account,
            page = self.pages,
            received = page.transactions.len(),
            more = page.marker.is_some(),
            "fetched account_tx page"
        );
        self.exhausted = page.marker.is_none() || self.pages >= MAX_PAGES_PER_BATCH;
        self.marker = page.marker;
        self.buffered = page.transactions.into_iter();
        Ok(())
    }
}

impl<'a, C: LedgerClient + ?Sized> Iterator for RecentTransactions<'a, C> {
    type Item = WatchResult<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                return None;
            }
            if let Some(txn) = self.buffered.next() {
                self.remaining -= 1;
                return Some(Ok(txn));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                self.remaining = 0;
                return Some(Err(err));
            }
        }
    }
}

impl<'a, C: LedgerClient + ?Sized> FusedIterator for RecentTransactions<'a, C> {}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::WatchError;
    use crate::mock::{incoming, MockLedger};

    const WALLET: &str = "rWallet";

    fn hashes(items: Vec<WatchResult<Transaction>>) -> Vec<String> {
        items.into_iter().map(|t| t.unwrap().hash).collect()
    }

    #[test]
    fn nothing_is_fetched_until_iterated() {
        let ledger = MockLedger::new(100);
        ledger.push_transactions(vec![incoming("A", "1", "")]);
        let iter = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 10);
        assert_eq!(ledger.account_tx_calls(), 0);
        drop(iter);
        assert_eq!(ledger.account_tx_calls(), 0);
    }

    #[test]
    fn preserves_node_order_and_caps_at_limit() {
        let ledger = MockLedger::new(100);
        ledger.push_transactions(
            ["N5", "N4", "N3", "N2", "N1"]
                .iter()
                .map(|h| incoming(h, "1", ""))
                .collect(),
        );
        let got: Vec<_> = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 3).collect();
        assert_eq!(hashes(got), ["N5", "N4", "N3"]);
    }

    #[test]
    fn follows_markers_across_pages() {
        let ledger = MockLedger::new(100).with_page_size(2);
        ledger.push_transactions(
            ["E", "D", "C", "B", "A"]
                .iter()
                .map(|h| incoming(h, "1", ""))
                .collect(),
        );
        let mut iter = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 25);
        let got: Vec<_> = iter.by_ref().collect();
        assert_eq!(hashes(got), ["E", "D", "C", "B", "A"]);
        assert_eq!(iter.pages_fetched(), 3);
        assert!(iter.next().is_none());
    }

    #[test]
    fn stops_pulling_pages_once_the_limit_is_reached() {
        let ledger = MockLedger::new(100).with_page_size(2);
        ledger.push_transactions((0..10).map(|i| incoming(&format!("T{i}"), "1", "")).collect());
        let got: Vec<_> = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 3).collect();
        assert_eq!(got.len(), 3);
        assert_eq!(ledger.account_tx_calls(), 2);
    }

    #[test]
    fn error_ends_the_sequence() {
        let ledger = MockLedger::new(100);
        ledger.push_failure(WatchError::AccountNotFound(WALLET.into()));
        let mut iter = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 5);
        assert!(matches!(
            iter.next(),
            Some(Err(WatchError::AccountNotFound(_)))
        ));
        assert!(iter.next().is_none());
        assert_eq!(ledger.account_tx_calls(), 1);
    }

    #[test]
    fn every_call_refetches() {
        let ledger = MockLedger::new(100);
        ledger.push_transactions(vec![incoming("A", "1", "")]);
        for _ in 0..3 {
            let got: Vec<_> = fetch_recent(&ledger, WALLET, LedgerWindow::open_from(0), 5).collect();
            assert_eq!(got.len(), 1);
        }
        assert_eq!(ledger.account_tx_calls(), 3);
    }
}
