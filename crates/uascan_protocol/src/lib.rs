//! UA Scan shared protocol types
//!
//! Domain vocabulary used by the scanner core, the backend gateway, and the
//! launcher: server and node records, pass timestamps, node identifiers,
//! decoded attribute values, and the protocol client error taxonomy.

pub mod defaults;
pub mod error;
pub mod types;

pub use error::UaError;
pub use types::{
    AccessLevel, CheckTimestamp, ExtensionObject, Field, NodeId, NodeUpsert, PrimitiveKind,
    Server, ServerId, StatusCode, Variant, VariantType,
};
