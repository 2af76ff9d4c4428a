//! ipset control over netlink.
//!
//! This module builds ipset requests, sends them over a non-blocking
//! `NETLINK_NETFILTER` socket and retries the send while the kernel
//! pushes back.
//!
//! # Quick Start
//!
//! ```ignore
//! use nfset::netlink::{Ipset, IpsetSocket};
//!
//! let ipset = Ipset::new(IpsetSocket::new()?);
//!
//! ipset.add_entry("blocked", "192.168.1.5", false)?;
//! ipset.add_entry("blocked", "aa:bb:cc:dd:ee:ff", false)?;
//! ipset.flush("blocked")?;
//! ```
//!
//! # Inspecting requests
//!
//! Requests can be encoded without a socket and decoded again:
//!
//! ```
//! use nfset::netlink::{IpsetRequest, parse};
//!
//! let msg = IpsetRequest::flush("blocked").encode()?;
//! let decoded = parse::decode(msg.as_bytes())?;
//! assert_eq!(decoded.attrs.len(), 2);
//! # Ok::<(), nfset::Error>(())
//! ```

pub mod attr;
mod builder;
mod error;
pub mod ipset;
pub mod message;
pub mod parse;
pub mod retry;
mod socket;

pub use attr::NlAttr;
pub use builder::{MSG_CAPACITY, Message, MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use ipset::{Family, Ipset, IpsetCommand, IpsetRequest, Payload};
pub use message::{NLMSG_HDRLEN, NfGenMsg, NlMsgHdr};
pub use parse::{DecodedAttr, DecodedMessage};
pub use retry::{RetryPolicy, SendReport};
pub use socket::{IpsetSocket, SendErrorKind, Transport};
