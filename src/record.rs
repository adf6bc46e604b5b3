//! Record and scalar value model, plus the binary payload codec used when a
//! snapshot iterator streams records out for checkpointing.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::types::{MemtreeError, RecordId, Result};

/// Typed scalar stored in a record field.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null literal. Orders before every other value of any type.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point number, totally ordered via `total_cmp`.
    Double(f64),
    /// UTF-8 string.
    Str(String),
    /// Arbitrary binary payload.
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether this value is the null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A stored tuple: an engine-assigned identity plus an ordered field list.
///
/// Records are shared between the heap, every index that references them, and
/// any iterator currently positioned on them; `RecordRef` clones express the
/// acquire/release discipline of the original record handles.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Vec<Value>,
}

/// Reference-counted handle to a stored record.
pub type RecordRef = Arc<Record>;

impl Record {
    /// Creates a record with the given identity and field list.
    pub fn new(id: RecordId, fields: Vec<Value>) -> RecordRef {
        Arc::new(Record { id, fields })
    }

    /// The record's insertion identity.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The record's fields in positional order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Field at `index`, or `None` when the record is shorter.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// Serializes the record into `out`: record id, field count, then each
    /// field as a type tag followed by its payload. Varint framing keeps
    /// short records short.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        write_var_u64(out, self.id.0);
        write_var_u64(out, self.fields.len() as u64);
        for field in &self.fields {
            match field {
                Value::Null => out.push(TAG_NULL),
                Value::Bool(b) => {
                    out.push(TAG_BOOL);
                    out.push(u8::from(*b));
                }
                Value::Int(i) => {
                    out.push(TAG_INT);
                    write_var_u64(out, zigzag(*i));
                }
                Value::Double(d) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&d.to_bits().to_be_bytes());
                }
                Value::Str(s) => {
                    out.push(TAG_STR);
                    write_var_u64(out, s.len() as u64);
                    out.extend_from_slice(s.as_bytes());
                }
                Value::Bytes(b) => {
                    out.push(TAG_BYTES);
                    write_var_u64(out, b.len() as u64);
                    out.extend_from_slice(b);
                }
            }
        }
    }

    /// Serializes the record into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Decodes a record previously produced by [`Record::encode`].
    pub fn decode(bytes: &[u8]) -> Result<RecordRef> {
        let mut cur = PayloadCursor::new(bytes);
        let id = cur.read_var_u64("record id truncated")?;
        let field_count = cur.read_var_u64("record field count truncated")? as usize;
        let mut fields = Vec::with_capacity(field_count.min(64));
        for _ in 0..field_count {
            let tag = cur.take(1, "record field tag truncated")?[0];
            let value = match tag {
                TAG_NULL => Value::Null,
                TAG_BOOL => Value::Bool(cur.take(1, "bool payload truncated")?[0] != 0),
                TAG_INT => Value::Int(unzigzag(cur.read_var_u64("int payload truncated")?)),
                TAG_DOUBLE => {
                    let raw = cur.take(8, "double payload truncated")?;
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(raw);
                    Value::Double(f64::from_bits(u64::from_be_bytes(arr)))
                }
                TAG_STR => {
                    let len = cur.read_var_u64("string length truncated")? as usize;
                    let raw = cur.take(len, "string payload truncated")?;
                    Value::Str(
                        std::str::from_utf8(raw)
                            .map_err(|_| MemtreeError::Corruption("string payload not UTF-8"))?
                            .to_owned(),
                    )
                }
                TAG_BYTES => {
                    let len = cur.read_var_u64("bytes length truncated")? as usize;
                    Value::Bytes(cur.take(len, "bytes payload truncated")?.to_vec())
                }
                _ => return Err(MemtreeError::Corruption("unknown field tag")),
            };
            fields.push(value);
        }
        Ok(Record::new(RecordId(id), fields))
    }
}

/// Total order over two values of the same field type, with `Null` ordering
/// first. Mixed non-null types never meet under a typed key definition.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_var_u64(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Lightweight cursor for walking varint-encoded payloads without allocation.
struct PayloadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_var_u64(&mut self, truncated_msg: &'static str) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for _ in 0..10 {
            if self.pos >= self.buf.len() {
                return Err(MemtreeError::Corruption(truncated_msg));
            }
            let byte = self.buf[self.pos];
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(MemtreeError::Corruption("varint too long"))
    }

    fn take(&mut self, len: usize, truncated_msg: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(MemtreeError::Corruption("payload length overflow"))?;
        if end > self.buf.len() {
            return Err(MemtreeError::Corruption(truncated_msg));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
