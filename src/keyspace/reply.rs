//! Command replies and the RESP2 wire codec.
//!
//! The embedded engine answers with [`Reply`] values directly; the network
//! transport decodes the same type off the socket with [`RespCodec`], which
//! also encodes outgoing argv as a RESP array of bulk strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    #[inline]
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    #[inline]
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    pub fn wrong_type() -> Self {
        Reply::err("WRONGTYPE Operation against a key holding the wrong kind of value")
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

const INCOMPLETE: &str = "Incomplete";

/// Largest bulk string a server may send (Redis `proto-max-bulk-len`).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// RESP2 framing for a client connection: decodes replies, encodes argv.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl RespCodec {
    fn try_parse(input: &[u8]) -> Result<(Reply, usize), String> {
        if input.is_empty() {
            return Err(INCOMPLETE.to_string());
        }

        match input[0] {
            b'+' => Self::parse_line(input).map(|(line, n)| (Reply::Status(line), n)),
            b'-' => Self::parse_line(input).map(|(line, n)| (Reply::Error(line), n)),
            b':' => {
                let (line, n) = Self::parse_line(input)?;
                let value = line.parse::<i64>().map_err(|e| e.to_string())?;
                Ok((Reply::Integer(value), n))
            }
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(format!("Unknown RESP type: {}", other as char)),
        }
    }

    fn parse_line(input: &[u8]) -> Result<(String, usize), String> {
        match Self::find_crlf(input) {
            Some(pos) => Ok((String::from_utf8_lossy(&input[1..pos]).into_owned(), pos + 2)),
            None => Err(INCOMPLETE.to_string()),
        }
    }

    fn parse_len(input: &[u8]) -> Result<(i64, usize), String> {
        let (line, consumed) = Self::parse_line(input)?;
        let len = line.parse::<i64>().map_err(|e| e.to_string())?;
        Ok((len, consumed))
    }

    fn parse_bulk_string(input: &[u8]) -> Result<(Reply, usize), String> {
        let (len, start) = Self::parse_len(input)?;
        if len < 0 {
            return Ok((Reply::Bulk(None), start));
        }

        let len = usize::try_from(len).map_err(|e| e.to_string())?;
        if len > MAX_BULK_LEN {
            return Err(format!("bulk length {} exceeds limit", len));
        }
        let end = start + len;
        if end + 2 > input.len() {
            return Err(INCOMPLETE.to_string());
        }

        let data = Bytes::copy_from_slice(&input[start..end]);
        Ok((Reply::Bulk(Some(data)), end + 2))
    }

    fn parse_array(input: &[u8]) -> Result<(Reply, usize), String> {
        let (len, mut offset) = Self::parse_len(input)?;
        if len < 0 {
            return Ok((Reply::Array(None), offset));
        }

        // Every element takes at least three bytes, so the buffer bounds the
        // preallocation whatever length the header claims.
        let claimed = usize::try_from(len).map_err(|e| e.to_string())?;
        let mut elements = Vec::with_capacity(claimed.min(input.len().saturating_sub(offset) / 3));
        for _ in 0..len {
            if offset >= input.len() {
                return Err(INCOMPLETE.to_string());
            }
            let (value, consumed) = Self::try_parse(&input[offset..])?;
            elements.push(value);
            offset += consumed;
        }

        Ok((Reply::Array(Some(elements)), offset))
    }

    #[inline]
    fn find_crlf(input: &[u8]) -> Option<usize> {
        memchr::memchr(b'\r', input).and_then(|pos| {
            if pos + 1 < input.len() && input[pos + 1] == b'\n' {
                Some(pos)
            } else {
                None
            }
        })
    }

    /// Encode argv as a RESP array of bulk strings.
    pub fn encode_args(args: &[Bytes], buf: &mut BytesMut) {
        buf.put_u8(b'*');
        buf.extend_from_slice(args.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for arg in args {
            buf.put_u8(b'$');
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
    }
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match Self::try_parse(src) {
            Ok((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            Err(e) if e == INCOMPLETE => Ok(None),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        }
    }
}

impl Encoder<Vec<Bytes>> for RespCodec {
    type Error = std::io::Error;

    fn encode(&mut self, args: Vec<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Self::encode_args(&args, dst);
        Ok(())
    }
}
