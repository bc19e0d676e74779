//! Schema validation gate between decoded API responses and persistence.

pub mod schema;
pub mod validator;

pub use schema::{
    FieldKind, FieldSpec, NumericRange, SchemaError, SchemaErrorKind, SourceSchema,
    TimestampFormat, TimestampSpec, CRYPTO_SCHEMA, FOREX_SCHEMA, RECORD_FIELD, STOCK_SCHEMA,
};
pub use validator::{partition, validate, ValidatedFields};
