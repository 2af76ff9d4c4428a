//! Netlink and nfnetlink message headers.

use zerocopy::byteorder::{NetworkEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Size of the nfnetlink header that follows the netlink header.
pub const NFGENMSG_LEN: usize = nlmsg_align(std::mem::size_of::<NfGenMsg>());

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;

/// nfnetlink protocol version carried in every request.
pub const NFNETLINK_V0: u8 = 0;

/// Netlink message header (mirrors struct nlmsghdr).
///
/// All fields are host byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Netfilter subsystem id (high byte of the message type).
    pub fn subsys(&self) -> u8 {
        (self.nlmsg_type >> 8) as u8
    }

    /// Subsystem-specific command (low byte of the message type).
    pub fn command(&self) -> u8 {
        (self.nlmsg_type & 0xff) as u8
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// nfnetlink header (mirrors struct nfgenmsg).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct NfGenMsg {
    /// Address family (AF_INET / AF_INET6).
    pub nfgen_family: u8,
    /// nfnetlink version.
    pub version: u8,
    /// Resource id, network byte order.
    pub res_id: U16<NetworkEndian>,
}

impl NfGenMsg {
    /// Create a version 0 header for the given family.
    pub fn new(family: u8) -> Self {
        Self {
            nfgen_family: family,
            version: NFNETLINK_V0,
            res_id: U16::new(0),
        }
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}
