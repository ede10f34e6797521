//! Core of the PFT donation verifier.
//!
//! This crate watches one XRP Ledger account for an incoming transfer that
//! satisfies caller-supplied acceptance criteria and reports the outcome
//! within a timeout window. It is built from small pieces that the
//! [`poll::Poller`] drives in sequence:
//!
//! * [`window`]: resolves the ledger range to scan from the validated head.
//! * [`fetch`]: lazily pages through recent incoming payments, newest first.
//! * [`memo`]: normalizes hex-encoded memos into plain text.
//! * [`matcher`]: the amount + correlation token acceptance predicate.
//! * [`poll`]: the bounded poll loop and its timeout state machine.
//!
//! The node is reached through the [`client::LedgerClient`] trait; the
//! production implementation is [`client::XrplRpcClient`]. The crate only
//! observes the ledger and never signs or submits anything.

pub mod client;
pub mod clock;
pub mod fetch;
pub mod matcher;
pub mod memo;
pub mod poll;
pub mod types;
pub mod window;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

mod error;

pub use error::{WatchError, WatchResult};
pub use types::{AcceptanceCriteria, Asset, DeliveredAmount, LedgerBound, LedgerWindow, PollOutcome, Transaction};
