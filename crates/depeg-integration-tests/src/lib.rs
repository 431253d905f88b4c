//! Integration test crate for the depeg oracle and settlement markets.
//!
//! This crate has no library code. It only contains tests that drive the
//! oracle service and the market ledger together across workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p depeg-integration-tests
//! ```
