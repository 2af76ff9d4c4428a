//! ipset requests over `NETLINK_NETFILTER`.
//!
//! Requests are fire-and-forget: no acknowledgement is requested and no
//! reply is read. A kernel-side rejection (for example a set that does not
//! exist) is therefore indistinguishable from success.
//!
//! # Example
//!
//! ```ignore
//! use nfset::netlink::{Ipset, IpsetSocket};
//!
//! let ipset = Ipset::new(IpsetSocket::new()?);
//!
//! ipset.add_or_remove_address("blocked", "192.168.1.5".parse()?, false)?;
//! ipset.add_entry("blocked", "aa:bb:cc:dd:ee:ff", false)?;
//! ipset.flush("blocked")?;
//! ```

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use super::attr::{NLA_F_NET_BYTEORDER, NLA_HDRLEN, nla_align};
use super::builder::{MSG_CAPACITY, Message, MessageBuilder};
use super::error::{Error, Result};
use super::message::{NFGENMSG_LEN, NLM_F_REQUEST, NLMSG_HDRLEN, NfGenMsg};
use super::retry::{RetryPolicy, SendReport};
use super::socket::{IpsetSocket, Transport};
use crate::util::addr::{EntryValue, classify, format_mac};

/// Netfilter subsystem id for ipset.
pub const NFNL_SUBSYS_IPSET: u8 = 6;

/// ipset protocol version sent with every request.
pub const IPSET_PROTOCOL: u8 = 6;

/// Size of the kernel's set name field, terminator included.
pub const IPSET_MAXNAMELEN: usize = 32;

// Commands
pub const IPSET_CMD_FLUSH: u8 = 4;
pub const IPSET_CMD_ADD: u8 = 9;
pub const IPSET_CMD_DEL: u8 = 10;

// Top-level attributes
pub const IPSET_ATTR_PROTOCOL: u16 = 1;
pub const IPSET_ATTR_SETNAME: u16 = 2;
pub const IPSET_ATTR_DATA: u16 = 7;
pub const IPSET_ATTR_ETHER: u16 = 17;

// Attributes inside IPSET_ATTR_DATA
pub const IPSET_ATTR_IP: u16 = 1;

// Attributes inside IPSET_ATTR_IP
pub const IPSET_ATTR_IPADDR_IPV4: u16 = 1;
pub const IPSET_ATTR_IPADDR_IPV6: u16 = 2;

/// Hardware address length.
pub const ETH_ALEN: usize = 6;

/// Largest request this module encodes: an IPv6 add/del with a
/// maximum-length set name.
pub const MAX_REQUEST_LEN: usize = NLMSG_HDRLEN
    + NFGENMSG_LEN
    + nla_align(NLA_HDRLEN + 1)
    + nla_align(NLA_HDRLEN + IPSET_MAXNAMELEN)
    + 2 * NLA_HDRLEN
    + nla_align(NLA_HDRLEN + 16);

const _: () = assert!(MAX_REQUEST_LEN <= MSG_CAPACITY);

/// Address family carried in the nfgenmsg header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Family {
    /// AF_INET
    #[default]
    Inet,
    /// AF_INET6
    Inet6,
}

impl Family {
    /// Family of an address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }

    /// AF_* constant.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Inet => libc::AF_INET as u8,
            Self::Inet6 => libc::AF_INET6 as u8,
        }
    }
}

/// ipset command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpsetCommand {
    /// Add an entry.
    Add,
    /// Delete an entry.
    Del,
    /// Remove every entry of a set.
    Flush,
}

impl IpsetCommand {
    /// Command number.
    pub fn code(self) -> u8 {
        match self {
            Self::Add => IPSET_CMD_ADD,
            Self::Del => IPSET_CMD_DEL,
            Self::Flush => IPSET_CMD_FLUSH,
        }
    }

    /// Netlink message type: subsystem in the high byte, command in the low.
    pub fn msg_type(self) -> u16 {
        ((NFNL_SUBSYS_IPSET as u16) << 8) | self.code() as u16
    }

    fn add_or_del(remove: bool) -> Self {
        if remove { Self::Del } else { Self::Add }
    }
}

/// What a request carries after the set name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Nothing (flush).
    None,
    /// An IP address, nested as DATA > IP > IPADDR.
    Addr(IpAddr),
    /// A hardware address, as a flat attribute.
    Ether([u8; ETH_ALEN]),
}

/// Check a set name against the kernel's limits.
pub fn validate_set_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidSetName(name.to_string()));
    }
    if name.len() >= IPSET_MAXNAMELEN {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}

/// One ipset request, ready to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpsetRequest<'a> {
    /// Command to run.
    pub command: IpsetCommand,
    /// Family for the nfgenmsg header.
    pub family: Family,
    /// Target set.
    pub set_name: &'a str,
    /// Entry, if any.
    pub payload: Payload,
}

impl<'a> IpsetRequest<'a> {
    /// Add (or, with `remove`, delete) an IP address.
    pub fn address(set_name: &'a str, addr: IpAddr, remove: bool) -> Self {
        Self {
            command: IpsetCommand::add_or_del(remove),
            family: Family::of(&addr),
            set_name,
            payload: Payload::Addr(addr),
        }
    }

    /// Add (or, with `remove`, delete) a hardware address.
    pub fn ether(set_name: &'a str, mac: [u8; ETH_ALEN], family: Family, remove: bool) -> Self {
        Self {
            command: IpsetCommand::add_or_del(remove),
            family,
            set_name,
            payload: Payload::Ether(mac),
        }
    }

    /// Flush a set.
    pub fn flush(set_name: &'a str) -> Self {
        Self {
            command: IpsetCommand::Flush,
            family: Family::Inet,
            set_name,
            payload: Payload::None,
        }
    }

    /// Encode the request.
    pub fn encode(&self) -> Result<Message> {
        validate_set_name(self.set_name)?;

        let mut builder = MessageBuilder::new(self.command.msg_type(), NLM_F_REQUEST);
        builder.append_bytes(NfGenMsg::new(self.family.as_u8()).as_bytes())?;
        builder.append_attr_u8(IPSET_ATTR_PROTOCOL, IPSET_PROTOCOL)?;
        builder.append_attr_str(IPSET_ATTR_SETNAME, self.set_name)?;

        match self.payload {
            Payload::None => {}
            Payload::Addr(addr) => {
                let data = builder.nest_start(IPSET_ATTR_DATA)?;
                let ip = builder.nest_start(IPSET_ATTR_IP)?;
                match addr {
                    IpAddr::V4(v4) => builder.append_attr(
                        IPSET_ATTR_IPADDR_IPV4 | NLA_F_NET_BYTEORDER,
                        &v4.octets(),
                    )?,
                    IpAddr::V6(v6) => builder.append_attr(
                        IPSET_ATTR_IPADDR_IPV6 | NLA_F_NET_BYTEORDER,
                        &v6.octets(),
                    )?,
                }
                builder.nest_end(ip);
                builder.nest_end(data);
            }
            Payload::Ether(mac) => {
                builder.append_attr(IPSET_ATTR_ETHER, &mac)?;
            }
        }

        Ok(builder.finish())
    }
}

/// Handle for issuing ipset requests over a transport.
///
/// The transport is created once and injected; every request builds its
/// own message on the stack and runs its own retry loop, so a handle can
/// be shared freely (see [`with_deadline`](Self::with_deadline)).
#[derive(Debug)]
pub struct Ipset<T: Transport = IpsetSocket> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> Ipset<T> {
    /// Create a handle with the default retry policy.
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    /// Create a handle with a custom retry policy.
    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode `request` and deliver it, retrying transient failures.
    pub fn send(&self, request: &IpsetRequest<'_>) -> Result<SendReport> {
        let msg = request.encode()?;
        self.policy.run(|| self.transport.send(msg.as_bytes()))
    }

    /// Add an IP address to a set, or remove it when `remove` is set.
    pub fn add_or_remove_address(&self, set_name: &str, addr: IpAddr, remove: bool) -> Result<()> {
        let result = self.send(&IpsetRequest::address(set_name, addr, remove));
        tracing::debug!(
            set = set_name,
            %addr,
            remove,
            ok = result.is_ok(),
            "ipset address request"
        );
        result.map(drop)
    }

    /// Add a hardware address to a set.
    ///
    /// The base protocol path has no per-entry timeout, so `timeout` must
    /// be 0 (no expiry); any other value is rejected with
    /// [`Error::NotSupported`] instead of being silently ignored.
    pub fn add_hardware_address(
        &self,
        set_name: &str,
        mac: [u8; ETH_ALEN],
        family: Family,
        timeout: u32,
    ) -> Result<()> {
        if timeout != 0 {
            return Err(Error::NotSupported(format!(
                "entry timeout ({}s) for hardware address {}",
                timeout,
                format_mac(&mac)
            )));
        }
        let result = self.send(&IpsetRequest::ether(set_name, mac, family, false));
        tracing::debug!(
            set = set_name,
            mac = %format_mac(&mac),
            ok = result.is_ok(),
            "ipset hardware address add"
        );
        result.map(drop)
    }

    /// Remove a hardware address from a set.
    pub fn remove_hardware_address(
        &self,
        set_name: &str,
        mac: [u8; ETH_ALEN],
        family: Family,
    ) -> Result<()> {
        let result = self.send(&IpsetRequest::ether(set_name, mac, family, true));
        tracing::debug!(
            set = set_name,
            mac = %format_mac(&mac),
            ok = result.is_ok(),
            "ipset hardware address delete"
        );
        result.map(drop)
    }

    /// Remove every entry from a set.
    pub fn flush(&self, set_name: &str) -> Result<()> {
        let result = self.send(&IpsetRequest::flush(set_name));
        tracing::debug!(set = set_name, ok = result.is_ok(), "ipset flush");
        result.map(drop)
    }

    /// Add (or remove) a textual entry.
    ///
    /// `value` is tried as an IP address first, then as a hardware address
    /// (`aa:bb:cc:dd:ee:ff`). Hardware addresses go out with the IPv4
    /// family and no timeout.
    pub fn add_entry(&self, set_name: &str, value: &str, remove: bool) -> Result<()> {
        tracing::debug!(set = set_name, value, remove, "ipset entry");
        match classify(value) {
            Some(EntryValue::Ip(addr)) => self.add_or_remove_address(set_name, addr, remove),
            Some(EntryValue::Mac(mac)) if remove => {
                self.remove_hardware_address(set_name, mac, Family::Inet)
            }
            Some(EntryValue::Mac(mac)) => {
                self.add_hardware_address(set_name, mac, Family::Inet, 0)
            }
            None => Err(Error::UnclassifiedInput(value.to_string())),
        }
    }
}

impl<T: Transport + Send + Sync + 'static> Ipset<T> {
    /// Run a blocking request on tokio's blocking pool with a hard deadline.
    ///
    /// The retry loop sleeps on its thread and cannot be cancelled. When
    /// the deadline passes the caller gets [`Error::DeadlineElapsed`], but
    /// the request keeps running in the background until it finishes.
    ///
    /// ```ignore
    /// let ipset = Arc::new(Ipset::new(IpsetSocket::new()?));
    /// ipset
    ///     .with_deadline(Duration::from_millis(50), |s| s.flush("blocked"))
    ///     .await?;
    /// ```
    pub async fn with_deadline<F, R>(self: &Arc<Self>, deadline: Duration, op: F) -> Result<R>
    where
        F: FnOnce(&Ipset<T>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let this = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || op(&this));

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Ok(Err(e)) => Err(Error::Io(io::Error::other(e))),
            Err(_) => {
                tracing::warn!(?deadline, "ipset request missed its deadline");
                Err(Error::DeadlineElapsed(deadline))
            }
        }
    }
}
