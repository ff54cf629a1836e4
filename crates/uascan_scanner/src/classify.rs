//! Variant classification for composite member fields

use uascan_protocol::{PrimitiveKind, Variant};

/// Map a decoded value to the primitive kind of a virtual record.
///
/// Booleans are matched before any numeric kind. Returns `None` for values
/// that have no primitive kind (arrays, nested structures, byte strings,
/// nulls); callers skip those fields.
pub fn classify(value: &Variant) -> Option<PrimitiveKind> {
    match value {
        Variant::Boolean(_) => Some(PrimitiveKind::Boolean),
        Variant::Float(_) | Variant::Double(_) => Some(PrimitiveKind::Float),
        Variant::SByte(_)
        | Variant::Byte(_)
        | Variant::Int16(_)
        | Variant::UInt16(_)
        | Variant::Int32(_)
        | Variant::UInt32(_)
        | Variant::Int64(_)
        | Variant::UInt64(_) => Some(PrimitiveKind::Integer),
        Variant::String(_) => Some(PrimitiveKind::String),
        Variant::DateTime(_) => Some(PrimitiveKind::Timestamp),
        Variant::Null
        | Variant::ByteString(_)
        | Variant::LocalizedText(_)
        | Variant::ExtensionObject(_)
        | Variant::Array(_) => None,
    }
}
