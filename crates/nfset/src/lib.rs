//! Fire-and-forget ipset control for Linux.
//!
//! This crate encodes ipset add/delete/flush requests and sends them to
//! the kernel over `NETLINK_NETFILTER`, without reading any reply. It
//! covers the three pieces that path needs:
//!
//! - a fixed-capacity message builder with nested attributes
//!   ([`netlink::MessageBuilder`], [`netlink::IpsetRequest`])
//! - a non-blocking netfilter socket ([`netlink::IpsetSocket`]) behind the
//!   [`netlink::Transport`] trait
//! - a bounded retry loop for sends the kernel pushes back on
//!   ([`netlink::RetryPolicy`])
//!
//! # Features
//!
//! - `serde` - Serialize/deserialize [`netlink::RetryPolicy`] and decoded
//!   messages
//! - `integration` - Enable integration tests (need root)
//!
//! # Example
//!
//! ```ignore
//! use nfset::netlink::{Ipset, IpsetSocket};
//!
//! fn main() -> nfset::Result<()> {
//!     let ipset = Ipset::new(IpsetSocket::new()?);
//!
//!     ipset.add_or_remove_address("blocked", "192.168.1.5".parse().unwrap(), false)?;
//!     ipset.flush("blocked")?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Limitations
//!
//! No acknowledgement is requested, so a request the kernel rejects (for
//! example one naming a set that does not exist) still reports success.

pub mod netlink;
pub mod util;

// Re-export common types at crate root for convenience
pub use netlink::{Error, Ipset, IpsetSocket, Result};
