//! Dataset wire format
//!
//! All integers are big-endian. Strings are a 4-byte length followed by UTF-8.
//!
//! ```text
//! ┌────────┬─────────┬─────────────┬──────────────────────────────┐
//! │ "TSDS" │ version │ table count │ tables...                    │
//! │ 4 B    │ 1 B     │ u32         │                              │
//! └────────┴─────────┴─────────────┴──────────────────────────────┘
//!
//! table  := name:string  column_count:u32  column*  row_count:u32  row*
//! column := name:string  type:u8  ordinal:u32
//! row    := cell * column_count
//! cell   := present:u8 [typed payload]
//! ```
//!
//! Date-times are encoded as ticks (100 ns since 0001-01-01 UTC), decimals as
//! their canonical string, GUIDs as their 16 RFC-4122 bytes and binary blobs
//! with a 4-byte length.
//!
//! Compressed form wraps the same bytes in a gzip stream.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use uuid::Uuid;

use crate::error::{DataSetError, Result};
use crate::{
    DataColumn, DataSet, DataTable, DataType, Value, datetime_from_ticks, datetime_to_ticks,
};

/// Magic bytes at the start of every encoded dataset
pub const MAGIC: &[u8; 4] = b"TSDS";

/// Current wire format version
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on decompressed metadata size (64MB)
pub const MAX_DECOMPRESSED_SIZE: u64 = 64 * 1024 * 1024;

impl DataSet {
    /// Encode to the binary wire format
    ///
    /// Deterministic: identical content always yields identical bytes.
    /// Fails only for a date-time outside the tick range.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(4096);

        buf.put_slice(MAGIC);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u32(self.table_count() as u32);

        for table in self.tables() {
            encode_table(table, &mut buf)?;
        }

        Ok(buf.freeze())
    }

    /// Decode from the binary wire format
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.remaining() < MAGIC.len() + 1 {
            return Err(DataSetError::decode("truncated header"));
        }
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(DataSetError::decode("bad magic"));
        }
        buf.advance(MAGIC.len());

        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(DataSetError::decode(format!(
                "unsupported format version {version}"
            )));
        }

        let table_count = get_u32(&mut buf, "table count")? as usize;
        let mut dataset = DataSet::new();

        for _ in 0..table_count {
            let table = decode_table(&dataset, &mut buf)?;
            dataset.add_table(table)?;
        }

        if buf.has_remaining() {
            return Err(DataSetError::decode(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        Ok(dataset)
    }

    /// Encode and gzip-compress
    pub fn encode_compressed(&self) -> Result<Bytes> {
        let raw = self.encode()?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
        encoder.write_all(&raw)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    /// Decompress a gzip stream and decode
    pub fn decode_compressed(compressed: &[u8]) -> Result<Self> {
        let mut raw = Vec::with_capacity(compressed.len() * 4);
        GzDecoder::new(compressed)
            .take(MAX_DECOMPRESSED_SIZE)
            .read_to_end(&mut raw)?;
        Self::decode(Bytes::from(raw))
    }
}

fn encode_table(table: &DataTable, buf: &mut BytesMut) -> Result<()> {
    put_string(table.name(), buf);

    buf.put_u32(table.column_count() as u32);
    for column in table.columns() {
        put_string(column.name(), buf);
        buf.put_u8(column.data_type().to_u8());
        buf.put_u32(column.ordinal() as u32);
    }

    buf.put_u32(table.row_count() as u32);
    for row in table.rows() {
        for value in row.values() {
            encode_value(value, buf)?;
        }
    }
    Ok(())
}

fn decode_table(dataset: &DataSet, buf: &mut Bytes) -> Result<DataTable> {
    let name = get_string(buf)?;
    let mut table = dataset.create_table(name);

    let column_count = get_u32(buf, "column count")? as usize;
    for _ in 0..column_count {
        let column_name = get_string(buf)?;
        let data_type = DataType::try_from(get_u8(buf, "column type")?)?;
        let ordinal = get_u32(buf, "column ordinal")? as usize;
        table.add_column(DataColumn::new(column_name, data_type, ordinal))?;
    }

    let row_count = get_u32(buf, "row count")? as usize;
    for _ in 0..row_count {
        let mut row = table.create_row();
        for ordinal in 0..column_count {
            let data_type = table.column_at(ordinal)?.data_type();
            row.set(ordinal, decode_value(data_type, buf)?)?;
        }
        table.add_row(row)?;
    }

    Ok(table)
}

fn encode_value(value: &Value, buf: &mut BytesMut) -> Result<()> {
    if value.is_null() {
        buf.put_u8(0);
        return Ok(());
    }
    buf.put_u8(1);

    match value {
        Value::Null => {}
        Value::String(s) => put_string(s, buf),
        Value::Boolean(b) => buf.put_u8(u8::from(*b)),
        Value::DateTime(dt) => {
            let ticks = datetime_to_ticks(dt)
                .ok_or_else(|| DataSetError::Encode(format!("{dt} is outside the tick range")))?;
            buf.put_i64(ticks);
        }
        Value::Single(v) => buf.put_u32(v.to_bits()),
        Value::Double(v) => buf.put_u64(v.to_bits()),
        Value::Decimal(d) => put_string(d.as_str(), buf),
        Value::Guid(g) => buf.put_slice(g.as_bytes()),
        Value::Int8(v) => buf.put_i8(*v),
        Value::Int16(v) => buf.put_i16(*v),
        Value::Int32(v) => buf.put_i32(*v),
        Value::Int64(v) => buf.put_i64(*v),
        Value::UInt8(v) => buf.put_u8(*v),
        Value::UInt16(v) => buf.put_u16(*v),
        Value::UInt32(v) => buf.put_u32(*v),
        Value::UInt64(v) => buf.put_u64(*v),
        Value::Binary(bytes) => {
            buf.put_u32(bytes.len() as u32);
            buf.put_slice(bytes);
        }
    }
    Ok(())
}

fn decode_value(data_type: DataType, buf: &mut Bytes) -> Result<Value> {
    if get_u8(buf, "cell presence")? == 0 {
        return Ok(Value::Null);
    }

    Ok(match data_type {
        DataType::String => Value::String(get_string(buf)?),
        DataType::Boolean => Value::Boolean(get_u8(buf, "boolean")? != 0),
        DataType::DateTime => {
            ensure(buf, 8, "date-time")?;
            let ticks = buf.get_i64();
            let dt = datetime_from_ticks(ticks)
                .ok_or_else(|| DataSetError::decode(format!("date-time ticks {ticks} out of range")))?;
            Value::DateTime(dt)
        }
        DataType::Single => Value::Single(f32::from_bits(get_u32(buf, "single")?)),
        DataType::Double => {
            ensure(buf, 8, "double")?;
            Value::Double(f64::from_bits(buf.get_u64()))
        }
        DataType::Decimal => Value::Decimal(get_string(buf)?.parse()?),
        DataType::Guid => {
            ensure(buf, 16, "guid")?;
            let mut bytes = [0u8; 16];
            buf.copy_to_slice(&mut bytes);
            Value::Guid(Uuid::from_bytes(bytes))
        }
        DataType::Int8 => {
            ensure(buf, 1, "int8")?;
            Value::Int8(buf.get_i8())
        }
        DataType::Int16 => {
            ensure(buf, 2, "int16")?;
            Value::Int16(buf.get_i16())
        }
        DataType::Int32 => {
            ensure(buf, 4, "int32")?;
            Value::Int32(buf.get_i32())
        }
        DataType::Int64 => {
            ensure(buf, 8, "int64")?;
            Value::Int64(buf.get_i64())
        }
        DataType::UInt8 => Value::UInt8(get_u8(buf, "uint8")?),
        DataType::UInt16 => {
            ensure(buf, 2, "uint16")?;
            Value::UInt16(buf.get_u16())
        }
        DataType::UInt32 => Value::UInt32(get_u32(buf, "uint32")?),
        DataType::UInt64 => {
            ensure(buf, 8, "uint64")?;
            Value::UInt64(buf.get_u64())
        }
        DataType::Binary => {
            let len = get_u32(buf, "binary length")? as usize;
            ensure(buf, len, "binary")?;
            Value::Binary(buf.split_to(len).to_vec())
        }
    })
}

// ============================================================================
// Encoding helpers
// ============================================================================

fn put_string(s: &str, buf: &mut BytesMut) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

#[inline]
fn ensure(buf: &Bytes, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(DataSetError::decode(format!("truncated {what}")));
    }
    Ok(())
}

fn get_u8(buf: &mut Bytes, what: &str) -> Result<u8> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut Bytes, what: &str) -> Result<u32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

fn get_string(buf: &mut Bytes) -> Result<String> {
    let len = get_u32(buf, "string length")? as usize;
    ensure(buf, len, "string")?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DataSetError::decode(format!("invalid UTF-8: {e}")))
}
