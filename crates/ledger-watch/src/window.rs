use crate::client::LedgerClient;
use crate::error::WatchResult;
use crate::types::{LedgerIndex, LedgerWindow};

/// Resolve the scan range ending at the current tip.
///
/// Always queries the validated head; recomputed every cycle since the head
/// keeps advancing.
pub fn resolve_window<C: LedgerClient + ?Sized>(
    client: &C,
    lookback_depth: u64,
) -> WatchResult<LedgerWindow> {
    let head = client.validated_ledger_index()?;
    Ok(window_from_head(head, lookback_depth))
}

/// `start = max(head - lookback_depth, 0)`.
pub fn window_from_head(head: LedgerIndex, lookback_depth: u64) -> LedgerWindow {
    LedgerWindow::open_from(head.saturating_sub(lookback_depth))
}
