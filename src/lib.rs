//! CHIPHOUSE, a virtual-currency casino backend.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point. The chat/command transport that parses
//! player messages lives outside this crate; it talks to [`service::Casino`].

pub mod bias;
pub mod config;
pub mod dashboard;
pub mod games;
pub mod ledger;
pub mod notify;
pub mod service;
pub mod session;
pub mod storage;
pub mod types;
