//! Table schemas and the page-0 schema codec.
//!
//! Page 0 of every table file holds the serialized schema: the attribute
//! count, the NUL-terminated attribute names, the data-type tags, the
//! declared lengths, and the key attribute indexes, in that order. A schema
//! must fit on a single page.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io;

use crate::error::{EngineError, EngineResult};
use crate::storage::PAGE_SIZE;

/// Supported attribute types. The discriminants are the on-disk tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DataType {
    Int = 0,
    String = 1,
    Float = 2,
    Bool = 3,
}

impl DataType {
    fn from_tag(tag: i32) -> EngineResult<DataType> {
        match tag {
            0 => Ok(DataType::Int),
            1 => Ok(DataType::String),
            2 => Ok(DataType::Float),
            3 => Ok(DataType::Bool),
            other => Err(EngineError::DataTypeError(other)),
        }
    }

    fn tag(self) -> i32 {
        self as i32
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    /// Character width; meaningful only for STRING attributes.
    pub length: u32,
}

impl Attribute {
    pub fn new(name: &str, data_type: DataType, length: u32) -> Attribute {
        Attribute {
            name: name.to_string(),
            data_type,
            length,
        }
    }

    /// Bytes this attribute occupies inside a record.
    pub fn byte_len(&self) -> usize {
        match self.data_type {
            DataType::Int => 4,
            DataType::Float => 4,
            DataType::Bool => 1,
            DataType::String => self.length as usize,
        }
    }
}

/// The typed layout of a table's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    attributes: Vec<Attribute>,
    key_attrs: Vec<usize>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>, key_attrs: Vec<usize>) -> Schema {
        Schema {
            attributes,
            key_attrs,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn num_attrs(&self) -> usize {
        self.attributes.len()
    }

    pub fn key_attrs(&self) -> &[usize] {
        &self.key_attrs
    }

    /// The attribute at `idx`, or `InvalidAttribute`.
    pub fn attribute(&self, idx: usize) -> EngineResult<&Attribute> {
        self.attributes
            .get(idx)
            .ok_or(EngineError::InvalidAttribute(idx))
    }

    /// Fixed byte size of every record under this schema.
    pub fn record_size(&self) -> usize {
        self.attributes.iter().map(Attribute::byte_len).sum()
    }

    /// Byte offset of attribute `idx` within a record.
    pub fn attr_offset(&self, idx: usize) -> usize {
        self.attributes
            .iter()
            .take(idx)
            .map(Attribute::byte_len)
            .sum()
    }

    /// Serialize into a page-0 image of exactly `PAGE_SIZE` bytes.
    pub fn to_page(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.write_i32::<LittleEndian>(self.attributes.len() as i32)
            .unwrap();
        for attr in &self.attributes {
            buf.extend_from_slice(attr.name.as_bytes());
            buf.push(0);
        }
        for attr in &self.attributes {
            buf.write_i32::<LittleEndian>(attr.data_type.tag()).unwrap();
        }
        for attr in &self.attributes {
            buf.write_i32::<LittleEndian>(attr.length as i32).unwrap();
        }
        buf.write_i32::<LittleEndian>(self.key_attrs.len() as i32)
            .unwrap();
        for &key in &self.key_attrs {
            buf.write_i32::<LittleEndian>(key as i32).unwrap();
        }

        if buf.len() > PAGE_SIZE {
            return Err(EngineError::PageFull);
        }
        buf.resize(PAGE_SIZE, 0);
        Ok(buf)
    }

    /// Parse a page-0 image written by [`Schema::to_page`].
    pub fn from_page(data: &[u8]) -> EngineResult<Schema> {
        let mut pos = 0usize;

        let num_attrs = read_i32(data, &mut pos)?;
        if num_attrs < 0 || num_attrs as usize > PAGE_SIZE {
            return Err(corrupt("attribute count out of range"));
        }
        let num_attrs = num_attrs as usize;

        let mut names = Vec::with_capacity(num_attrs);
        for _ in 0..num_attrs {
            let end = data[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| corrupt("unterminated attribute name"))?;
            names.push(String::from_utf8_lossy(&data[pos..pos + end]).into_owned());
            pos += end + 1;
        }

        let mut types = Vec::with_capacity(num_attrs);
        for _ in 0..num_attrs {
            types.push(DataType::from_tag(read_i32(data, &mut pos)?)?);
        }

        let mut lengths = Vec::with_capacity(num_attrs);
        for _ in 0..num_attrs {
            let length = read_i32(data, &mut pos)?;
            if length < 0 {
                return Err(corrupt("negative attribute length"));
            }
            lengths.push(length as u32);
        }

        let key_size = read_i32(data, &mut pos)?;
        if key_size < 0 || key_size as usize > num_attrs {
            return Err(corrupt("key count out of range"));
        }
        let mut key_attrs = Vec::with_capacity(key_size as usize);
        for _ in 0..key_size {
            let key = read_i32(data, &mut pos)?;
            if key < 0 || key as usize >= num_attrs {
                return Err(corrupt("key attribute out of range"));
            }
            key_attrs.push(key as usize);
        }

        let attributes = names
            .into_iter()
            .zip(types)
            .zip(lengths)
            .map(|((name, data_type), length)| Attribute {
                name,
                data_type,
                length,
            })
            .collect();

        Ok(Schema {
            attributes,
            key_attrs,
        })
    }
}

fn read_i32(data: &[u8], pos: &mut usize) -> EngineResult<i32> {
    if *pos + 4 > data.len() {
        return Err(corrupt("schema page truncated"));
    }
    let value = LittleEndian::read_i32(&data[*pos..*pos + 4]);
    *pos += 4;
    Ok(value)
}

fn corrupt(detail: &str) -> EngineError {
    io::Error::new(io::ErrorKind::InvalidData, detail.to_string()).into()
}
