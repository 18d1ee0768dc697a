//! Records and their typed attribute accessors.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{EngineError, EngineResult};
use crate::expr::Value;
use crate::storage::schema::{DataType, Schema};

/// Identifier of a record: data-page index and slot index. Assigned by
/// insert; stable under in-place update, changed by a relocating update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page: u32,
    pub slot: u32,
}

impl Rid {
    pub fn new(page: u32, slot: u32) -> Rid {
        Rid { page, slot }
    }
}

/// A materialized record. The `data` buffer is caller-owned; table
/// operations overwrite it in place and only reallocate when it is not
/// sized for the schema.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub id: Option<Rid>,
    pub data: Vec<u8>,
}

impl Record {
    /// An unassigned record sized for `schema`, all bytes zeroed.
    pub fn new(schema: &Schema) -> Record {
        Record {
            id: None,
            data: vec![0; schema.record_size()],
        }
    }

    /// Write attribute `k`. STRING values are truncated or zero-padded to
    /// the attribute's declared width.
    pub fn set_attr(&mut self, schema: &Schema, k: usize, value: &Value) -> EngineResult<()> {
        let attr = schema.attribute(k)?;
        if value.data_type() != attr.data_type {
            return Err(EngineError::AttributeTypeMismatch {
                expected: attr.data_type,
                found: value.data_type(),
            });
        }
        if self.data.len() < schema.record_size() {
            return Err(EngineError::InvalidInput(
                "record buffer is not sized for the schema",
            ));
        }

        let offset = schema.attr_offset(k);
        let field = &mut self.data[offset..offset + attr.byte_len()];
        match value {
            Value::Int(v) => LittleEndian::write_i32(field, *v),
            Value::Float(v) => LittleEndian::write_f32(field, *v),
            Value::Bool(v) => field[0] = *v as u8,
            Value::Str(v) => {
                let bytes = v.as_bytes();
                let n = bytes.len().min(field.len());
                field[..n].copy_from_slice(&bytes[..n]);
                field[n..].fill(0);
            }
        }
        Ok(())
    }

    /// Read attribute `k` as an owned value. STRING attributes decode up to
    /// the first NUL byte.
    pub fn get_attr(&self, schema: &Schema, k: usize) -> EngineResult<Value> {
        let attr = schema.attribute(k)?;
        if self.data.len() < schema.record_size() {
            return Err(EngineError::InvalidInput(
                "record buffer is not sized for the schema",
            ));
        }

        let offset = schema.attr_offset(k);
        let field = &self.data[offset..offset + attr.byte_len()];
        Ok(match attr.data_type {
            DataType::Int => Value::Int(LittleEndian::read_i32(field)),
            DataType::Float => Value::Float(LittleEndian::read_f32(field)),
            DataType::Bool => Value::Bool(field[0] != 0),
            DataType::String => {
                let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                Value::Str(String::from_utf8_lossy(&field[..end]).into_owned())
            }
        })
    }
}
