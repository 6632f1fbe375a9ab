//! Shared encoding helpers

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::{GUID_LENGTH, Result};

#[inline]
pub(crate) fn ensure(buf: &Bytes, needed: usize, what: &'static str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes, what: &'static str) -> Result<u8> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes, what: &'static str) -> Result<u16> {
    ensure(buf, 2, what)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut Bytes, what: &'static str) -> Result<u32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

pub(crate) fn put_guid(id: &Uuid, buf: &mut BytesMut) {
    buf.put_slice(id.as_bytes());
}

pub(crate) fn get_guid(buf: &mut Bytes, what: &'static str) -> Result<Uuid> {
    ensure(buf, GUID_LENGTH, what)?;
    let mut bytes = [0u8; GUID_LENGTH];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

pub(crate) fn put_string(s: &str, buf: &mut BytesMut) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn get_string(buf: &mut Bytes, what: &'static str) -> Result<String> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))
}

pub(crate) fn put_guid_list(ids: &[Uuid], buf: &mut BytesMut) {
    buf.put_u32(ids.len() as u32);
    for id in ids {
        put_guid(id, buf);
    }
}

pub(crate) fn get_guid_list(buf: &mut Bytes, what: &'static str) -> Result<Vec<Uuid>> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len.saturating_mul(GUID_LENGTH), what)?;
    let mut ids = Vec::with_capacity(len);
    for _ in 0..len {
        ids.push(get_guid(buf, what)?);
    }
    Ok(ids)
}
