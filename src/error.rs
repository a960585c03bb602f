use std::io;

use thiserror::Error;

use crate::tuple::FieldType;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: FieldType, found: FieldType },

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("unsupported predicate operator: {0}")]
    UnsupportedOperator(String),

    #[error("unknown file: {0}")]
    UnknownFile(String),
}
