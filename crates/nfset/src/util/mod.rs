//! Shared utilities for nfset.

pub mod addr;

pub use addr::{EntryValue, classify, format_mac, parse_addr, parse_mac};
