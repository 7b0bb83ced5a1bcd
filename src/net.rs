//! The distcc-compatible wire protocol: a self-delimiting, fixed-header
//! token stream used in both directions.
//!
//! A token is 12 bytes on the wire: a 4-byte ASCII tag followed by 8
//! lowercase hex digits of a `u32`. Tags never carry their own length
//! more than once; the payload length, when the tag has one, *is* the
//! token's value.

use std::io::{self, Read, Write};

use errors::*;

/// Length in bytes of a token header: 4 tag bytes + 8 hex digits.
pub const TOKEN_HEADER_LEN: usize = 12;

/// The protocol version this crate speaks. There has only ever been one.
pub const PROTOCOL_VERSION: u32 = 1;

const INGRESS_CHUNK: usize = 64 * 1024;
const EGRESS_CHUNK: usize = 256 * 1024;

/// A decoded 12-byte token header: a 4-byte ASCII tag plus its 32-bit
/// value (version, argument count, exit status, or payload length,
/// depending on the tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub tag: [u8; 4],
    pub value: u32,
}

impl Token {
    pub fn new(tag: &[u8; 4], value: u32) -> Token {
        Token { tag: *tag, value }
    }

    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// Encode `(tag, value)` as the 12 ASCII bytes that go on the wire.
///
/// Encoding is never case-insensitive: hex digits are always lowercase.
pub fn encode(tag: &[u8; 4], value: u32) -> [u8; TOKEN_HEADER_LEN] {
    let mut buf = [0u8; TOKEN_HEADER_LEN];
    buf[..4].copy_from_slice(tag);
    // `{:08x}` on a u32 always produces exactly 8 lowercase hex digits.
    let hex = format!("{:08x}", value);
    buf[4..].copy_from_slice(hex.as_bytes());
    buf
}

/// Decode a 12-byte token header. `bytes` must be exactly
/// [`TOKEN_HEADER_LEN`] long; decoding the hex digits is
/// case-insensitive.
pub fn decode(bytes: &[u8]) -> Result<Token> {
    if bytes.len() != TOKEN_HEADER_LEN {
        bail!(ErrorKind::InvalidToken(
            format!("{} bytes", TOKEN_HEADER_LEN),
            format!("{} bytes", bytes.len())
        ));
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[..4]);
    let hex = ::std::str::from_utf8(&bytes[4..]).map_err(|_| {
        Error::from(ErrorKind::InvalidToken(
            "8 hex digits".to_owned(),
            format!("{:?}", &bytes[4..]),
        ))
    })?;
    let value = u32::from_str_radix(hex, 16).map_err(|_| {
        Error::from(ErrorKind::InvalidToken(
            "8 hex digits".to_owned(),
            hex.to_owned(),
        ))
    })?;
    Ok(Token { tag, value })
}

/// Read exactly `count` bytes from `stream`, looping over short reads.
/// EOF before `count` bytes is a [`ErrorKind::Disconnected`].
fn recv_exactly<R: Read>(stream: &mut R, count: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; count];
    let mut read = 0;
    while read < count {
        let n = stream.read(&mut data[read..])?;
        if n == 0 {
            bail!(ErrorKind::Disconnected);
        }
        read += n;
    }
    Ok(data)
}

/// Read one 12-byte token header off `stream`.
pub fn read_token<R: Read>(stream: &mut R) -> Result<Token> {
    let header = recv_exactly(stream, TOKEN_HEADER_LEN)?;
    decode(&header)
}

/// Read one token header and require its tag equal `expected`.
///
/// A short read (peer closed before 12 bytes arrived) surfaces as
/// [`ErrorKind::Disconnected`]; a tag mismatch surfaces as
/// [`ErrorKind::InvalidToken`].
pub fn expect<R: Read>(stream: &mut R, expected: &[u8; 4]) -> Result<u32> {
    let token = read_token(stream)?;
    if &token.tag != expected {
        bail!(ErrorKind::InvalidToken(
            String::from_utf8_lossy(expected).into_owned(),
            token.tag_str(),
        ));
    }
    Ok(token.value)
}

/// Write a token header to `stream`.
pub fn write_token<W: Write>(stream: &mut W, tag: &[u8; 4], value: u32) -> Result<()> {
    stream.write_all(&encode(tag, value))?;
    Ok(())
}

/// Read exactly `n` bytes from `socket`, copying them into `sink` in
/// chunks. EOF before `n` bytes is a protocol error.
pub fn chunked_copy_in<R: Read, W: Write>(socket: &mut R, sink: &mut W, n: u64) -> Result<()> {
    let mut remaining = n;
    let mut buf = [0u8; INGRESS_CHUNK];
    while remaining > 0 {
        let want = remaining.min(INGRESS_CHUNK as u64) as usize;
        let got = socket.read(&mut buf[..want])?;
        if got == 0 {
            bail!(ErrorKind::ProtocolError("peer disconnected".to_owned()));
        }
        sink.write_all(&buf[..got])?;
        remaining -= got as u64;
    }
    Ok(())
}

/// Write exactly `n` bytes from `source` to `socket`, looping over
/// partial writes. `source` must yield at least `n` bytes.
pub fn chunked_copy_out<R: Read, W: Write>(source: &mut R, socket: &mut W, n: u64) -> Result<()> {
    let mut remaining = n;
    let mut buf = [0u8; EGRESS_CHUNK];
    while remaining > 0 {
        let want = remaining.min(EGRESS_CHUNK as u64) as usize;
        let got = source.read(&mut buf[..want])?;
        if got == 0 {
            bail!(ErrorKind::ProtocolError(
                "source exhausted before declared length".to_owned()
            ));
        }
        write_all_looped(socket, &buf[..got])?;
        remaining -= got as u64;
    }
    Ok(())
}

/// `Write::write_all` already loops internally for `std::io::Write`
/// implementors, but we spell it out here since the protocol's
/// correctness depends on every byte actually landing on the wire.
fn write_all_looped<W: Write>(socket: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = socket.write(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        buf = &buf[n..];
    }
    Ok(())
}
