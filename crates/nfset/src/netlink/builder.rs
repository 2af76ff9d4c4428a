//! Message builder for constructing netlink messages.
//!
//! Messages are encoded into a fixed-size buffer that lives wherever the
//! builder lives (usually the caller's stack). The buffer is never grown:
//! an append that does not fit fails with [`Error::CapacityExceeded`].

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Capacity of a message buffer in bytes.
///
/// Every request this crate encodes fits with room to spare; see
/// [`MAX_REQUEST_LEN`](super::ipset::MAX_REQUEST_LEN).
pub const MSG_CAPACITY: usize = 256;

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
#[must_use = "a nested attribute must be closed with nest_end"]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// A fully encoded netlink message.
#[derive(Clone)]
pub struct Message {
    buf: [u8; MSG_CAPACITY],
    len: usize,
}

impl Message {
    /// Encoded bytes, ready to send.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Total encoded length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the message is empty (never true for a finished message).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// Builder for constructing netlink messages.
#[derive(Clone)]
pub struct MessageBuilder {
    buf: [u8; MSG_CAPACITY],
    len: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Create a builder from an existing header.
    pub fn with_header(header: NlMsgHdr) -> Self {
        let mut buf = [0u8; MSG_CAPACITY];
        let hdr = header.as_bytes();
        buf[..hdr.len()].copy_from_slice(hdr);
        Self {
            buf,
            len: NLMSG_HDRLEN,
        }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.len == NLMSG_HDRLEN
    }

    /// Bytes still available in the buffer.
    pub fn remaining(&self) -> usize {
        MSG_CAPACITY - self.len
    }

    /// Make sure `extra` more bytes fit, returning the write offset.
    fn reserve(&self, extra: usize) -> Result<usize> {
        let needed = self.len + extra;
        if needed > MSG_CAPACITY {
            return Err(Error::CapacityExceeded {
                needed,
                capacity: MSG_CAPACITY,
            });
        }
        Ok(self.len)
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        let offset = self.reserve(nlmsg_align(data.len()))?;
        self.buf[offset..offset + data.len()].copy_from_slice(data);
        self.len = nlmsg_align(offset + data.len());
        Ok(())
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        if NLA_HDRLEN + data.len() > u16::MAX as usize {
            return Err(Error::InvalidAttribute(format!(
                "payload of {} bytes does not fit a u16 length",
                data.len()
            )));
        }
        let offset = self.reserve(nla_align(NLA_HDRLEN + data.len()))?;
        let attr = NlAttr::new(attr_type, data.len());
        self.buf[offset..offset + NLA_HDRLEN].copy_from_slice(attr.as_bytes());
        let payload = offset + NLA_HDRLEN;
        self.buf[payload..payload + data.len()].copy_from_slice(data);
        // Padding bytes are already zero: the buffer is never reused.
        self.len = nla_align(payload + data.len());
        Ok(())
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.append_attr(attr_type, &[value])
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        let offset = self.reserve(nla_align(NLA_HDRLEN + bytes.len() + 1))?;
        let attr = NlAttr::new(attr_type, bytes.len() + 1);
        self.buf[offset..offset + NLA_HDRLEN].copy_from_slice(attr.as_bytes());
        let payload = offset + NLA_HDRLEN;
        self.buf[payload..payload + bytes.len()].copy_from_slice(bytes);
        // Terminator and padding are the zeroed bytes that follow.
        self.len = nla_align(payload + bytes.len() + 1);
        Ok(())
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> Result<NestToken> {
        let offset = self.reserve(NLA_HDRLEN)?;
        // Placeholder header; the length is patched by nest_end.
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.buf[offset..offset + NLA_HDRLEN].copy_from_slice(attr.as_bytes());
        self.len += NLA_HDRLEN;
        Ok(NestToken { offset })
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = self.len - token.offset;
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset..token.offset + 2].copy_from_slice(&len_bytes);
    }

    /// Finalize and return the message.
    pub fn finish(mut self) -> Message {
        let len_bytes = (self.len as u32).to_ne_bytes();
        self.buf[0..4].copy_from_slice(&len_bytes);
        Message {
            buf: self.buf,
            len: self.len,
        }
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::NLM_F_REQUEST;

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(16, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(msg.as_bytes()).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 16);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_attribute_padding() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr_u8(1, 6).unwrap();
        let msg = builder.finish();

        // Header + 4-byte attr header + 1 byte value padded to 4
        assert_eq!(msg.len(), NLMSG_HDRLEN + 8);
        let attr = &msg.as_bytes()[NLMSG_HDRLEN..];
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 5);
        assert_eq!(&attr[4..], &[6, 0, 0, 0]);
    }

    #[test]
    fn test_string_attribute_is_terminated() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr_str(2, "abcd").unwrap();
        let msg = builder.finish();

        let attr = &msg.as_bytes()[NLMSG_HDRLEN..];
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 9);
        assert_eq!(&attr[4..9], b"abcd\0");
        assert_eq!(msg.len(), NLMSG_HDRLEN + 12);
    }

    #[test]
    fn test_nested_attribute() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let outer = builder.nest_start(7).unwrap();
        let inner = builder.nest_start(1).unwrap();
        builder.append_attr(2, &[1, 2, 3, 4]).unwrap();
        builder.nest_end(inner);
        builder.nest_end(outer);
        let msg = builder.finish();

        let bytes = &msg.as_bytes()[NLMSG_HDRLEN..];
        let outer_len = u16::from_ne_bytes([bytes[0], bytes[1]]);
        let outer_type = u16::from_ne_bytes([bytes[2], bytes[3]]);
        let inner_len = u16::from_ne_bytes([bytes[4], bytes[5]]);
        assert_eq!(outer_len, 16);
        assert_eq!(outer_type, NLA_F_NESTED | 7);
        assert_eq!(inner_len, 12);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let big = [0xffu8; MSG_CAPACITY];
        let err = builder.append_attr(1, &big).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                capacity: MSG_CAPACITY,
                ..
            }
        ));
        // Nothing was written
        assert!(builder.is_empty());
    }

    #[test]
    fn test_fill_exactly_to_capacity() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let payload = vec![0u8; builder.remaining() - NLA_HDRLEN];
        builder.append_attr(1, &payload).unwrap();
        assert_eq!(builder.remaining(), 0);
        assert!(builder.nest_start(2).is_err());
    }
}
