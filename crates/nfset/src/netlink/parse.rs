//! Decoding of encoded requests.
//!
//! The kernel never answers these requests, so nothing on the send path
//! needs a parser. Decoding exists to inspect what would be sent (the
//! `--dry-run` mode of the `ipset` tool) and to check the framing
//! invariants of builder output: every attribute is 4-byte aligned and a
//! nested attribute's length covers exactly its padded children.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::FromBytes;

use super::attr::{NLA_HDRLEN, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NFGENMSG_LEN, NLMSG_HDRLEN, NfGenMsg, NlMsgHdr};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// One decoded attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedAttr {
    /// Semantic tag (flags stripped).
    pub kind: u16,
    /// Nested flag was set.
    pub nested: bool,
    /// Network-byte-order flag was set.
    pub net_byteorder: bool,
    /// Length field as encoded (header included, padding excluded).
    pub len: u16,
    /// Raw payload of a leaf attribute. Empty for nested attributes.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub payload: Vec<u8>,
    /// Children of a nested attribute.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<DecodedAttr>,
}

impl DecodedAttr {
    /// Bytes this attribute occupies in the stream, padding included.
    pub fn padded_len(&self) -> usize {
        nla_align(self.len as usize)
    }

    /// First child with the given tag.
    pub fn child(&self, kind: u16) -> Option<&DecodedAttr> {
        self.children.iter().find(|a| a.kind == kind)
    }

    /// Payload as a single byte.
    pub fn as_u8(&self) -> Option<u8> {
        match self.payload.as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }

    /// Payload as a NUL-terminated string.
    pub fn as_cstr(&self) -> Option<&str> {
        let (last, body) = self.payload.split_last()?;
        if *last != 0 || body.contains(&0) {
            return None;
        }
        std::str::from_utf8(body).ok()
    }

    /// Payload as an IPv4 or IPv6 address, chosen by length.
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self.payload.len() {
            4 => {
                let octets: [u8; 4] = self.payload.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            16 => {
                let octets: [u8; 16] = self.payload.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}attr type={} len={}", "", self.kind, self.len, indent = depth * 2)?;
        if self.nested {
            write!(f, " nested")?;
        }
        if self.net_byteorder {
            write!(f, " net-byteorder")?;
        }
        if !self.nested {
            write!(f, " value=")?;
            match (self.as_cstr(), self.as_ip()) {
                (Some(s), _) if !s.is_empty() => write!(f, "{:?}", s)?,
                (_, Some(ip)) if self.net_byteorder => write!(f, "{}", ip)?,
                _ => {
                    for b in &self.payload {
                        write!(f, "{:02x}", b)?;
                    }
                }
            }
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// A decoded netfilter request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedMessage {
    /// Total length from the netlink header.
    pub len: u32,
    /// Netfilter subsystem id.
    pub subsys: u8,
    /// Subsystem command.
    pub command: u8,
    /// Netlink flags.
    pub flags: u16,
    /// Sequence number.
    pub seq: u32,
    /// Port ID.
    pub pid: u32,
    /// Address family from the nfgenmsg header.
    pub family: u8,
    /// nfnetlink version.
    pub version: u8,
    /// Resource id.
    pub res_id: u16,
    /// Top-level attributes, in wire order.
    pub attrs: Vec<DecodedAttr>,
}

impl DecodedMessage {
    /// First top-level attribute with the given tag.
    pub fn attr(&self, kind: u16) -> Option<&DecodedAttr> {
        self.attrs.iter().find(|a| a.kind == kind)
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "nlmsg len={} subsys={} cmd={} flags={:#x} seq={} pid={}",
            self.len, self.subsys, self.command, self.flags, self.seq, self.pid
        )?;
        writeln!(
            f,
            "nfgenmsg family={} version={} res_id={}",
            self.family, self.version, self.res_id
        )?;
        for attr in &self.attrs {
            attr.fmt_indented(f, 0)?;
        }
        Ok(())
    }
}

/// Decode one complete request.
///
/// Fails if the length field disagrees with the buffer, if the message is
/// not 4-byte aligned, or if any attribute is malformed.
pub fn decode(data: &[u8]) -> Result<DecodedMessage> {
    let header = NlMsgHdr::from_bytes(data)?;

    let len = header.nlmsg_len as usize;
    if len != data.len() {
        return Err(Error::InvalidMessage(format!(
            "length field {} does not match buffer of {} bytes",
            len,
            data.len()
        )));
    }
    if len % 4 != 0 {
        return Err(Error::InvalidMessage(format!(
            "length {} is not 4-byte aligned",
            len
        )));
    }

    let body = &data[NLMSG_HDRLEN..];
    let nfgen = NfGenMsg::from_bytes(body)?;
    let stream = body.get(NFGENMSG_LEN..).ok_or(Error::Truncated {
        expected: NLMSG_HDRLEN + NFGENMSG_LEN,
        actual: data.len(),
    })?;

    let mut input = stream;
    let attrs = parse_attrs(&mut input).map_err(|_| {
        Error::InvalidAttribute(format!(
            "malformed attribute at offset {}",
            NLMSG_HDRLEN + NFGENMSG_LEN + stream.len() - input.len()
        ))
    })?;

    Ok(DecodedMessage {
        len: header.nlmsg_len,
        subsys: header.subsys(),
        command: header.command(),
        flags: header.nlmsg_flags,
        seq: header.nlmsg_seq,
        pid: header.nlmsg_pid,
        family: nfgen.nfgen_family,
        version: nfgen.version,
        res_id: nfgen.res_id.get(),
        attrs,
    })
}

/// Parse one attribute, including its padding, recursing into nests.
pub fn parse_attr(input: &mut &[u8]) -> PResult<DecodedAttr> {
    let header_bytes: &[u8] = take(NLA_HDRLEN).parse_next(input)?;
    let (header, _) = NlAttr::read_from_prefix(header_bytes)
        .map_err(|_| ErrMode::Cut(ContextError::new()))?;

    let len = header.nla_len as usize;
    if len < NLA_HDRLEN {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let mut payload: &[u8] = take(len - NLA_HDRLEN).parse_next(input)?;
    // Padding must be present, even after the last attribute.
    let _: &[u8] = take(nla_align(len) - len).parse_next(input)?;

    let (payload, children) = if header.is_nested() {
        // Children must fill the nest exactly.
        (Vec::new(), parse_attrs(&mut payload)?)
    } else {
        (payload.to_vec(), Vec::new())
    };

    Ok(DecodedAttr {
        kind: header.kind(),
        nested: header.is_nested(),
        net_byteorder: header.is_net_byteorder(),
        len: header.nla_len,
        payload,
        children,
    })
}

/// Parse attributes until the input is exhausted.
pub fn parse_attrs(input: &mut &[u8]) -> PResult<Vec<DecodedAttr>> {
    let mut attrs = Vec::new();
    while !input.is_empty() {
        attrs.push(parse_attr(input)?);
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{NLA_F_NESTED, NLA_F_NET_BYTEORDER};
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::message::NLM_F_REQUEST;

    fn with_nfgen(family: u8) -> MessageBuilder {
        let mut b = MessageBuilder::new((6 << 8) | 9, NLM_F_REQUEST);
        b.append_bytes(NfGenMsg::new(family).as_bytes()).unwrap();
        b
    }

    #[test]
    fn decode_nested() {
        let mut b = with_nfgen(2);
        b.append_attr_u8(1, 6).unwrap();
        let outer = b.nest_start(7).unwrap();
        b.append_attr(NLA_F_NET_BYTEORDER | 1, &[10, 0, 0, 1]).unwrap();
        b.append_attr_u8(3, 1).unwrap();
        b.nest_end(outer);
        let msg = b.finish();

        let decoded = decode(msg.as_bytes()).unwrap();
        assert_eq!(decoded.subsys, 6);
        assert_eq!(decoded.command, 9);
        assert_eq!(decoded.family, 2);
        assert_eq!(decoded.attrs.len(), 2);

        let nest = decoded.attr(7).unwrap();
        assert!(nest.nested);
        assert_eq!(nest.children.len(), 2);
        let sum: usize = nest.children.iter().map(DecodedAttr::padded_len).sum();
        assert_eq!(nest.len as usize, NLA_HDRLEN + sum);
        assert_eq!(
            nest.child(1).unwrap().as_ip(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
    }

    #[test]
    fn flag_bits_are_split_from_kind() {
        let mut b = with_nfgen(10);
        let outer = b.nest_start(NLA_F_NET_BYTEORDER | 7).unwrap();
        b.append_attr(NLA_F_NET_BYTEORDER | 2, &[0; 16]).unwrap();
        b.nest_end(outer);
        let decoded = decode(b.finish().as_bytes()).unwrap();

        let nest = &decoded.attrs[0];
        assert_eq!(nest.kind, 7);
        assert!(nest.nested);
        assert!(nest.net_byteorder);

        let leaf = &nest.children[0];
        assert_eq!(leaf.kind, 2);
        assert!(!leaf.nested);
        assert!(leaf.net_byteorder);
        assert_eq!(leaf.len, 20);
        assert_eq!(leaf.payload.len(), 16);
    }

    #[test]
    fn reject_truncated_attribute_header() {
        let mut input: &[u8] = &[8, 0];
        assert!(parse_attr(&mut input).is_err());

        // Header claims 8 bytes, only 6 follow.
        let mut input: &[u8] = &[8, 0, 1, 0, 0xaa, 0xbb];
        assert!(parse_attr(&mut input).is_err());
    }

    #[test]
    fn nested_flag_without_children() {
        let mut b = with_nfgen(2);
        let empty = b.nest_start(NLA_F_NESTED | 7).unwrap();
        b.nest_end(empty);
        let decoded = decode(b.finish().as_bytes()).unwrap();
        assert!(decoded.attrs[0].nested);
        assert!(decoded.attrs[0].children.is_empty());
        assert_eq!(decoded.attrs[0].len as usize, NLA_HDRLEN);
    }

    #[test]
    fn reject_length_mismatch() {
        let msg = with_nfgen(2).finish();
        let mut bytes = msg.as_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(decode(&bytes), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn reject_nest_shorter_than_children() {
        let mut b = with_nfgen(2);
        let outer = b.nest_start(7).unwrap();
        b.append_attr(1, &[1, 2, 3, 4]).unwrap();
        b.nest_end(outer);
        let msg = b.finish();

        // Shrink the nest length so its child spills out of it.
        let mut bytes = msg.as_bytes().to_vec();
        let off = NLMSG_HDRLEN + NFGENMSG_LEN;
        bytes[off..off + 2].copy_from_slice(&6u16.to_ne_bytes());
        assert!(matches!(decode(&bytes), Err(Error::InvalidAttribute(_))));
    }

    #[test]
    fn reject_short_attribute_length() {
        let mut b = with_nfgen(2);
        b.append_attr_u8(1, 6).unwrap();
        let msg = b.finish();

        let mut bytes = msg.as_bytes().to_vec();
        let off = NLMSG_HDRLEN + NFGENMSG_LEN;
        bytes[off..off + 2].copy_from_slice(&2u16.to_ne_bytes());
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn cstr_payload() {
        let attr = DecodedAttr {
            kind: 2,
            nested: false,
            net_byteorder: false,
            len: 12,
            payload: b"blocked\0".to_vec(),
            children: Vec::new(),
        };
        assert_eq!(attr.as_cstr(), Some("blocked"));
        assert_eq!(attr.as_u8(), None);

        let unterminated = DecodedAttr {
            payload: b"blocked".to_vec(),
            ..attr
        };
        assert_eq!(unterminated.as_cstr(), None);
    }

    #[test]
    fn display_lists_attributes() {
        let mut b = with_nfgen(2);
        b.append_attr_str(2, "blocked").unwrap();
        let decoded = decode(b.finish().as_bytes()).unwrap();
        let text = decoded.to_string();
        assert!(text.contains("subsys=6 cmd=9"));
        assert!(text.contains("attr type=2 len=12 value=\"blocked\""));
    }
}
