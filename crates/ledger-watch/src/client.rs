// XRPL JSON-RPC client for the two queries the verifier needs:
// `server_info` for the validated head and `account_tx` for recent history.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{WatchError, WatchResult};
use crate::types::{DeliveredAmount, LedgerBound, LedgerIndex, LedgerWindow, Transaction};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opaque pagination cursor returned by the node.
pub type PageMarker = Value;

#[derive(Clone, Debug)]
pub struct AccountTxRequest<'a> {
    pub account: &'a str,
    pub window: LedgerWindow,
    pub limit: usize,
    pub marker: Option<&'a PageMarker>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccountTxPage {
    /// Incoming payments only, in node order.
    pub transactions: Vec<Transaction>,
    pub marker: Option<PageMarker>,
}

/// The ledger node operations the verifier depends on.
///
/// Implementations must be stateless per request so that concurrent polls
/// can share one client.
pub trait LedgerClient: Send + Sync {
    /// Index of the latest *validated* ledger.
    fn validated_ledger_index(&self) -> WatchResult<LedgerIndex>;

    /// One page of account history, newest first.
    fn account_transactions(&self, request: &AccountTxRequest<'_>) -> WatchResult<AccountTxPage>;
}

impl<T: LedgerClient + ?Sized> LedgerClient for &T {
    fn validated_ledger_index(&self) -> WatchResult<LedgerIndex> {
        (**self).validated_ledger_index()
    }

    fn account_transactions(&self, request: &AccountTxRequest<'_>) -> WatchResult<AccountTxPage> {
        (**self).account_transactions(request)
    }
}

impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    fn validated_ledger_index(&self) -> WatchResult<LedgerIndex> {
        (**self).validated_ledger_index()
    }

    fn account_transactions(&self, request: &AccountTxRequest<'_>) -> WatchResult<AccountTxPage> {
        (**self).account_transactions(request)
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    method: &'a str,
    params: [Value; 1],
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Value,
}

#[derive(Clone, Debug)]
pub struct XrplRpcClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl XrplRpcClient {
    pub fn new(endpoint: impl Into<String>) -> WatchResult<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> WatchResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call(&self, method: &str, params: Value) -> WatchResult<Value> {
        let request = JsonRpcRequest {
            method,
            params: [params],
        };
        tracing::trace!(method, endpoint = %self.endpoint, "[RPC] >>>");

        let response = self.http.post(&self.endpoint).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(WatchError::UpstreamUnavailable(format!(
                "{method}: HTTP {status} {body}"
            )));
        }
        let body: JsonRpcResponse = response.json()?;
        Ok(body.result)
    }
}

impl LedgerClient for XrplRpcClient {
    fn validated_ledger_index(&self) -> WatchResult<LedgerIndex> {
        let result = self.call("server_info", json!({}))?;
        parse_validated_index(&result)
    }

    fn account_transactions(&self, request: &AccountTxRequest<'_>) -> WatchResult<AccountTxPage> {
        let result = self.call("account_tx", account_tx_params(request))?;
        parse_account_tx(request.account, &result)
    }
}

pub fn account_tx_params(request: &AccountTxRequest<'_>) -> Value {
    let max = match request.window.end {
        LedgerBound::Index(end) => json!(end),
        LedgerBound::Open => json!(-1),
    };
    let mut params = json!({
        "account": request.account,
        "ledger_index_min": request.window.start,
        "ledger_index_max": max,
        "limit": request.limit,
        "forward": false,
    });
    if let Some(marker) = request.marker {
        params["marker"] = marker.clone();
    }
    params
}

fn check_rpc_error(result: &Value, account: &str) -> WatchResult<()> {
    let code = match result.get("error").and_then(Value::as_str) {
        Some(code) => code,
        None if result.get("status").and_then(Value::as_str) == Some("error") => "unknown",
        None => return Ok(()),
    };
    let message = result
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or(code);
    match code {
        "actNotFound" => Err(WatchError::AccountNotFound(account.to_string())),
        _ => Err(WatchError::UpstreamUnavailable(format!("{code}: {message}"))),
    }
}

/// Extract `info.validated_ledger.seq` from a `server_info` result.
pub fn parse_validated_index(result: &Value) -> WatchResult<LedgerIndex> {
    check_rpc_error(result, "")?;
    result
        .pointer("/info/validated_ledger/seq")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            WatchError::UpstreamUnavailable("server_info reported no validated ledger".into())
        })
}

pub fn parse_account_tx(account: &str, result: &Value) -> WatchResult<AccountTxPage> {
    check_rpc_error(result, account)?;
    let entries = result
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            WatchError::UpstreamUnavailable("account_tx response has no transactions".into())
        })?;
    let transactions = entries
        .iter()
        .filter_map(|entry| incoming_payment(account, entry))
        .collect();
    let marker = result.get("marker").filter(|m| !m.is_null()).cloned();
    Ok(AccountTxPage {
        transactions,
        marker,
    })
}

// Handles both api_version 1 (`tx`) and 2 (`tx_json` + top-level hash).
fn incoming_payment(account: &str, entry: &Value) -> Option<Transaction> {
    let tx = entry.get("tx_json").or_else(|| entry.get("tx"))?;
    if entry.get("validated").and_then(Value::as_bool) == Some(false) {
        return None;
    }
    if tx.get("TransactionType").and_then(Value::as_str) != Some("Payment") {
        return None;
    }
    if tx.get("Destination").and_then(Value::as_str) != Some(account) {
        return None;
    }
    let meta = entry.get("meta").or_else(|| entry.get("metaData"));
    if let Some(code) = meta
        .and_then(|m| m.get("TransactionResult"))
        .and_then(Value::as_str)
    {
        if code != "tesSUCCESS" {
            return None;
        }
    }

    let hash = entry
        .get("hash")
        .or_else(|| tx.get("hash"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let ledger_index = entry
        .get("ledger_index")
        .or_else(|| tx.get("ledger_index"))
        .and_then(Value::as_u64);
    let amount = meta
        .and_then(|m| m.get("delivered_amount"))
        .filter(|v| v.as_str() != Some("unavailable"))
        .or_else(|| tx.get("DeliverMax"))
        .or_else(|| tx.get("Amount"));

    Some(Transaction {
        hash,
        ledger_index,
        amount: delivered_amount(amount),
        raw_memo: first_memo(tx),
    })
}

fn delivered_amount(value: Option<&Value>) -> DeliveredAmount {
    fn field(obj: &Map<String, Value>, key: &str) -> String {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
    match value {
        Some(Value::String(drops)) => DeliveredAmount::Drops {
            drops: drops.clone(),
        },
        Some(Value::Object(obj)) => DeliveredAmount::Issued {
            value: field(obj, "value"),
            currency: field(obj, "currency"),
            issuer: field(obj, "issuer"),
        },
        Some(other) => DeliveredAmount::Drops {
            drops: other.to_string(),
        },
        None => DeliveredAmount::Drops {
            drops: String::new(),
        },
    }
}

fn first_memo(tx: &Value) -> String {
    tx.get("Memos")
        .and_then(Value::as_array)
        .and_then(|memos| {
            memos
                .iter()
                .find_map(|m| m.get("Memo")?.get("MemoData")?.as_str())
        })
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "rWallet";

    fn pft_payment(hash: &str, destination: &str, value: &str, memo_hex: &str) -> Value {
        json!({
            "meta": {
                "TransactionResult": "tesSUCCESS",
                "delivered_amount": {"currency": "PFT", "issuer": "rIssuer", "value": value}
            },
            "tx": {
                "TransactionType": "Payment",
                "Account": "rSender",
                "Destination": destination,
                "Amount": {"currency": "PFT", "issuer": "rIssuer", "value": value},
                "Memos": [{"Memo": {"MemoData": memo_hex}}],
                "hash": hash,
                "ledger_index": 90_001
            },
            "validated": true
        })
    }

    #[test]
    fn validated_index_comes_from_server_info() {
        let result = json!({
            "info": {"validated_ledger": {"seq": 93_000_123u64, "hash": "AB"}},
            "status": "success"
        });
        assert_eq!(parse_validated_index(&result).unwrap(), 93_000_123);
    }

    #[test]
    fn missing_validated_ledger_is_upstream_failure() {
        let result = json!({"info": {"server_state": "connected"}, "status": "success"});
        assert!(matches!(
            parse_validated_index(&result),
            Err(WatchError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn account_tx_keeps_only_incoming_successful_payments() {
        let mut failed = pft_payment("FAILED", WALLET, "3", "");
        failed["meta"]["TransactionResult"] = json!("tecPATH_DRY");
        let mut offer = pft_payment("OFFER", WALLET, "3", "");
        offer["tx"]["TransactionType"] = json!("OfferCreate");
        let result = json!({
            "transactions": [
                pft_payment("IN", WALLET, "1.5", "6F726465722D414243313233"),
                pft_payment("OUT", "rSomeoneElse", "9", ""),
                failed,
                offer,
            ],
            "status": "success"
        });
        let page = parse_account_tx(WALLET, &result).unwrap();
        assert_eq!(page.transactions.len(), 1);
        let txn = &page.transactions[0];
        assert_eq!(txn.hash, "IN");
        assert_eq!(txn.ledger_index, Some(90_001));
        assert_eq!(txn.raw_memo, "6F726465722D414243313233");
        assert_eq!(txn.amount_transferred().unwrap().to_string(), "1.5");
        assert!(page.marker.is_none());
    }

    #[test]
    fn api_v2_entries_and_markers_are_understood() {
        let result = json!({
            "transactions": [{
                "hash": "V2HASH",
                "ledger_index": 55,
                "meta": {"TransactionResult": "tesSUCCESS", "delivered_amount": "2500000"},
                "tx_json": {
                    "TransactionType": "Payment",
                    "Destination": WALLET,
                    "DeliverMax": "2500000"
                },
                "validated": true
            }],
            "marker": {"ledger": 54, "seq": 3}
        });
        let page = parse_account_tx(WALLET, &result).unwrap();
        assert_eq!(page.transactions[0].hash, "V2HASH");
        assert_eq!(
            page.transactions[0].amount,
            DeliveredAmount::Drops {
                drops: "2500000".into()
            }
        );
        assert_eq!(page.transactions[0].raw_memo, "");
        assert_eq!(page.marker, Some(json!({"ledger": 54, "seq": 3})));
    }

    #[test]
    fn unknown_account_maps_to_account_not_found() {
        let result = json!({
            "error": "actNotFound",
            "error_code": 19,
            "error_message": "Account not found.",
            "status": "error"
        });
        match parse_account_tx(WALLET, &result).unwrap_err() {
            WatchError::AccountNotFound(account) => assert_eq!(account, WALLET),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn other_node_errors_are_upstream_failures() {
        let result = json!({"error": "slowDown", "status": "error"});
        assert!(matches!(
            parse_account_tx(WALLET, &result),
            Err(WatchError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn open_window_requests_to_tip_newest_first() {
        let marker = json!({"ledger": 1, "seq": 2});
        let params = account_tx_params(&AccountTxRequest {
            account: WALLET,
            window: LedgerWindow::open_from(88_000),
            limit: 25,
            marker: Some(&marker),
        });
        assert_eq!(params["ledger_index_min"], 88_000);
        assert_eq!(params["ledger_index_max"], -1);
        assert_eq!(params["forward"], false);
        assert_eq!(params["limit"], 25);
        assert_eq!(params["marker"], marker);
    }
}
