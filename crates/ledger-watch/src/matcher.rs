use crate::error::WatchResult;
use crate::types::{AcceptanceCriteria, Transaction};

/// Acceptance predicate for a single transaction.
///
/// Matches when the delivered amount is at least `min_amount` (exact decimal
/// comparison, boundary inclusive) and the decoded memo contains the
/// correlation token verbatim. A malformed amount is an error for this
/// transaction only.
pub fn evaluate(
    txn: &Transaction,
    decoded_memo: &str,
    criteria: &AcceptanceCriteria,
) -> WatchResult<bool> {
    if !txn.amount.is_asset(&criteria.asset) {
        return Ok(false);
    }
    let amount = txn.amount_transferred()?;
    Ok(amount >= criteria.min_amount && decoded_memo.contains(criteria.correlation_token.as_str()))
}
