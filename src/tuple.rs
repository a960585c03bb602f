//! Schemas and typed rows.
//!
//! A [`TupleDesc`] fixes the on-disk layout of a row: fields are stored in
//! schema order, each at a fixed width, with no padding between them.
//!
//! | type     | width            | encoding                           |
//! |----------|------------------|------------------------------------|
//! | `Int`    | 4                | native-endian `i32`                |
//! | `Double` | 8                | native-endian `f64`                |
//! | `Char`   | [`CHAR_SIZE`]    | raw bytes, zero padded, truncated  |

use std::fmt::{self, Display};

use crate::error::{DbError, Result};

/// Fixed on-disk width of a `Char` field.
pub const CHAR_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Double,
    Char,
}

impl FieldType {
    /// Number of bytes a field of this type occupies in a serialized tuple.
    pub const fn width(self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Double => 8,
            FieldType::Char => CHAR_SIZE,
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Double => write!(f, "DOUBLE"),
            FieldType::Char => write!(f, "CHAR"),
        }
    }
}

/// A single value, always carrying the payload of its own type.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Int(i32),
    Double(f64),
    Char(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Double(_) => FieldType::Double,
            Field::Char(_) => FieldType::Char,
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Field::Int(v) => Ok(*v),
            other => Err(other.mismatch(FieldType::Int)),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Field::Double(v) => Ok(*v),
            other => Err(other.mismatch(FieldType::Double)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Field::Char(v) => Ok(v),
            other => Err(other.mismatch(FieldType::Char)),
        }
    }

    fn mismatch(&self, expected: FieldType) -> DbError {
        DbError::TypeMismatch {
            expected,
            found: self.field_type(),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Double(v) => write!(f, "{v}"),
            Field::Char(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Double(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Char(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Char(value)
    }
}

/// An ordered row of values.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Tuple {
    fields: Vec<Field>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, i: usize) -> Result<FieldType> {
        self.get_field(i).map(Field::field_type)
    }

    pub fn get_field(&self, i: usize) -> Result<&Field> {
        self.fields.get(i).ok_or_else(|| {
            DbError::OutOfRange(format!(
                "field {} of a tuple with {} fields",
                i,
                self.fields.len()
            ))
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, ")")
    }
}

/// The schema of a tuple: ordered, uniquely named, typed fields.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TupleDesc {
    types: Vec<FieldType>,
    names: Vec<String>,
}

impl TupleDesc {
    pub fn new<S: Into<String>>(types: Vec<FieldType>, names: Vec<S>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if types.len() != names.len() {
            return Err(DbError::InvalidArgument(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }
        for i in 0..names.len() {
            for j in i + 1..names.len() {
                if names[i] == names[j] {
                    return Err(DbError::InvalidArgument(format!(
                        "duplicate field name {}",
                        names[i]
                    )));
                }
            }
        }
        Ok(Self { types, names })
    }

    /// Whether `tuple` has exactly this schema's field count and types, in order.
    ///
    /// An empty schema cannot describe any stored tuple and is reported as an error.
    pub fn compatible(&self, tuple: &Tuple) -> Result<bool> {
        if self.types.is_empty() {
            return Err(DbError::InvalidState(
                "compatibility check against an empty schema".to_string(),
            ));
        }
        if tuple.size() != self.types.len() {
            return Ok(false);
        }
        Ok(self
            .types
            .iter()
            .zip(tuple.fields())
            .all(|(ty, field)| field.field_type() == *ty))
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DbError::InvalidArgument(format!("no field named {name}")))
    }

    /// Byte offset of field `index` within a serialized tuple.
    pub fn offset_of(&self, index: usize) -> Result<usize> {
        if index >= self.types.len() {
            return Err(DbError::OutOfRange(format!(
                "field {} of a schema with {} fields",
                index,
                self.types.len()
            )));
        }
        Ok(self.types[..index].iter().map(|t| t.width()).sum())
    }

    /// Serialized size of every tuple with this schema.
    pub fn length(&self) -> usize {
        self.types.iter().map(|t| t.width()).sum()
    }

    pub fn size(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn type_of(&self, index: usize) -> Result<FieldType> {
        self.offset_of(index).map(|_| self.types[index])
    }

    pub fn name_of(&self, index: usize) -> Result<&str> {
        self.offset_of(index).map(|_| self.names[index].as_str())
    }

    /// Write `tuple` into the first [`TupleDesc::length`] bytes of `buf`.
    pub fn serialize(&self, buf: &mut [u8], tuple: &Tuple) -> Result<()> {
        if tuple.size() != self.types.len() {
            return Err(DbError::InvalidArgument(format!(
                "tuple has {} fields, schema has {}",
                tuple.size(),
                self.types.len()
            )));
        }
        self.check_buffer(buf.len())?;
        let mut offset = 0;
        for (ty, field) in self.types.iter().zip(tuple.fields()) {
            let width = ty.width();
            let dst = &mut buf[offset..offset + width];
            match ty {
                FieldType::Int => dst.copy_from_slice(&field.as_int()?.to_ne_bytes()),
                FieldType::Double => dst.copy_from_slice(&field.as_double()?.to_ne_bytes()),
                FieldType::Char => {
                    let bytes = truncate_to_char_size(field.as_str()?).as_bytes();
                    dst[..bytes.len()].copy_from_slice(bytes);
                    dst[bytes.len()..].fill(0);
                }
            }
            offset += width;
        }
        Ok(())
    }

    /// Read a tuple back from the first [`TupleDesc::length`] bytes of `buf`.
    pub fn deserialize(&self, buf: &[u8]) -> Result<Tuple> {
        self.check_buffer(buf.len())?;
        let mut fields = Vec::with_capacity(self.types.len());
        let mut offset = 0;
        for ty in &self.types {
            let width = ty.width();
            let src = &buf[offset..offset + width];
            let field = match ty {
                FieldType::Int => Field::Int(i32::from_ne_bytes(src.try_into().unwrap())),
                FieldType::Double => Field::Double(f64::from_ne_bytes(src.try_into().unwrap())),
                FieldType::Char => {
                    let end = src.iter().position(|b| *b == 0).unwrap_or(width);
                    let s = std::str::from_utf8(&src[..end]).map_err(|e| {
                        DbError::Corrupt(format!("char field at offset {offset}: {e}"))
                    })?;
                    Field::Char(s.to_string())
                }
            };
            fields.push(field);
            offset += width;
        }
        Ok(Tuple::new(fields))
    }

    /// Concatenate two schemas. Fails if a name appears in both.
    pub fn merge(first: &TupleDesc, second: &TupleDesc) -> Result<TupleDesc> {
        let types = first.types.iter().chain(&second.types).copied().collect();
        let names = first.names.iter().chain(&second.names).cloned().collect::<Vec<_>>();
        TupleDesc::new(types, names)
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        if len < self.length() {
            return Err(DbError::OutOfRange(format!(
                "buffer of {} bytes for a tuple of {} bytes",
                len,
                self.length()
            )));
        }
        Ok(())
    }
}

impl Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (name, ty)) in self.names.iter().zip(&self.types).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} {ty}")?;
        }
        write!(f, ")")
    }
}

// Longest prefix of `s` that fits in CHAR_SIZE bytes without splitting a char.
fn truncate_to_char_size(s: &str) -> &str {
    if s.len() <= CHAR_SIZE {
        return s;
    }
    let mut end = CHAR_SIZE;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
