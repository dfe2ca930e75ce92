//! Watches a folder for receiver files and pays each one out as a single
//! multi-destination TON transaction.

pub mod address;
pub mod amount;
pub mod batch;
pub mod commands;
pub mod completion;
pub mod config;
pub mod disburser;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod receivers;

pub use address::Address;
pub use amount::Nanotons;
pub use config::{ConfigStore, Settings};
pub use disburser::{CycleHalt, CycleReport, Disburser, MIN_BALANCE, POLL_INTERVAL};
pub use ledger::{HttpLedgerClient, LedgerClient, MockLedgerClient};
