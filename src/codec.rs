//! Record encoding shared by staging files and the streaming wire format.
//!
//! A record is `[u32 LE key len][u32 LE value len][key][value]`. Keys and
//! values are `bincode` encodings of the job logic's declared types, so two
//! keys are equal exactly when their encoded bytes are.

use std::io::{self, ErrorKind, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::io::RawPair;

const HEADER_LEN: usize = 8;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(Error::Encode)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(Error::Decode)
}

pub(crate) fn write_record<W: Write + ?Sized>(w: &mut W, key: &[u8], value: &[u8]) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&frame_len(key)?.to_le_bytes());
    header[4..].copy_from_slice(&frame_len(value)?.to_le_bytes());
    w.write_all(&header)?;
    w.write_all(key)?;
    w.write_all(value)?;
    Ok(())
}

/// Reads one record. `Ok(None)` only on a clean end of input at a record
/// boundary.
pub(crate) fn read_record<R: Read + ?Sized>(r: &mut R) -> Result<Option<RawPair>> {
    let Some(header) = read_header(r)? else {
        return Ok(None);
    };
    let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let value_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    let mut value = vec![0u8; value_len];
    r.read_exact(&mut value)?;
    Ok(Some(RawPair { key, value }))
}

fn read_header<R: Read + ?Sized>(r: &mut R) -> io::Result<Option<[u8; HEADER_LEN]>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match r.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => Ok(None),
        HEADER_LEN => Ok(Some(header)),
        _ => Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            "truncated record header",
        )),
    }
}

fn frame_len(bytes: &[u8]) -> Result<u32> {
    u32::try_from(bytes.len()).map_err(|_| {
        Error::Io(io::Error::new(
            ErrorKind::InvalidInput,
            format!("record field of {} bytes does not fit a frame", bytes.len()),
        ))
    })
}
