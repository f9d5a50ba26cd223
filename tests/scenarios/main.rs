//! Scenario tests: negotiation properties and end-to-end link bring-up
//!
//! Run with: cargo test --test scenarios

mod end_to_end;
mod harness;
mod properties;
