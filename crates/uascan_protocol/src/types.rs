//! Core types shared across the scanner
//!
//! The backend owns persisted `Server` and node state; these types are the
//! in-flight representation used while one traversal pass runs.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::defaults::ROOT_NODE_ID;

// ============================================================================
// Identifiers
// ============================================================================

/// Backend key of a remote server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct ServerId(i64);

impl ServerId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ServerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Native identifier of a node in a remote address space (e.g. `ns=2;s=Pump1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The distinguished top-of-tree node.
    pub fn root() -> Self {
        Self(ROOT_NODE_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NODE_ID
    }

    /// Identifier of a synthetic node expanded from one member field of this node's value.
    pub fn field_identifier(&self, field: &str) -> String {
        format!("{}.{}", self.0, field)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical timestamp of one traversal pass, in epoch seconds.
///
/// Captured once per cycle and threaded through every gateway call of the
/// pass. Stored nodes older than the pass value are stale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct CheckTimestamp(i64);

impl CheckTimestamp {
    pub const fn from_epoch_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub const fn as_secs(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CheckTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Backend records
// ============================================================================

/// A remote server registered in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub url: String,
    /// Configured root node identifier; empty means the protocol default root.
    #[serde(default, deserialize_with = "string_or_null")]
    pub root_node: String,
    #[serde(default, deserialize_with = "int_flag")]
    pub scan_required: bool,
    #[serde(default)]
    pub checked_at: Option<i64>,
    #[serde(default)]
    pub connection_error: Option<String>,
}

impl Server {
    pub fn new(id: impl Into<ServerId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            root_node: String::new(),
            scan_required: true,
            checked_at: None,
            connection_error: None,
        }
    }

    pub fn with_root_node(mut self, root_node: impl Into<String>) -> Self {
        self.root_node = root_node.into();
        self
    }

    /// The configured root, or `None` when the default root should be used.
    pub fn configured_root(&self) -> Option<NodeId> {
        let trimmed = self.root_node.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(NodeId::new(trimmed))
        }
    }
}

/// One create-or-update of a discovered node, keyed by `(server_id, identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpsert {
    pub server_id: ServerId,
    pub identifier: String,
    pub display_name: String,
    pub path: String,
    pub readable: bool,
    pub writable: bool,
    pub data_type: String,
    pub checked_at: CheckTimestamp,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub parent_identifier: Option<String>,
}

fn int_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    // The backend serializes flags as 0/1 or booleans depending on the column driver.
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        serde_json::Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Attribute types
// ============================================================================

/// Protocol status code (e.g. `BadNodeIdUnknown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0);
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);

    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User access level bit mask of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(u8);

impl AccessLevel {
    pub const NONE: AccessLevel = AccessLevel(0);
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);
    pub const HISTORY_READ: AccessLevel = AccessLevel(0x04);
    pub const HISTORY_WRITE: AccessLevel = AccessLevel(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: AccessLevel) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: AccessLevel) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn readable(self) -> bool {
        self.contains(Self::CURRENT_READ)
    }

    pub const fn writable(self) -> bool {
        self.contains(Self::CURRENT_WRITE)
    }
}

/// Declared data type of a node's value (the protocol's built-in variant types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Null,
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    Guid,
    ByteString,
    XmlElement,
    NodeId,
    ExpandedNodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
    ExtensionObject,
    DataValue,
    Variant,
    DiagnosticInfo,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Null => "Null",
            VariantType::Boolean => "Boolean",
            VariantType::SByte => "SByte",
            VariantType::Byte => "Byte",
            VariantType::Int16 => "Int16",
            VariantType::UInt16 => "UInt16",
            VariantType::Int32 => "Int32",
            VariantType::UInt32 => "UInt32",
            VariantType::Int64 => "Int64",
            VariantType::UInt64 => "UInt64",
            VariantType::Float => "Float",
            VariantType::Double => "Double",
            VariantType::String => "String",
            VariantType::DateTime => "DateTime",
            VariantType::Guid => "Guid",
            VariantType::ByteString => "ByteString",
            VariantType::XmlElement => "XmlElement",
            VariantType::NodeId => "NodeId",
            VariantType::ExpandedNodeId => "ExpandedNodeId",
            VariantType::StatusCode => "StatusCode",
            VariantType::QualifiedName => "QualifiedName",
            VariantType::LocalizedText => "LocalizedText",
            VariantType::ExtensionObject => "ExtensionObject",
            VariantType::DataValue => "DataValue",
            VariantType::Variant => "Variant",
            VariantType::DiagnosticInfo => "DiagnosticInfo",
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, VariantType::ExtensionObject)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Current value of a node, as decoded by the protocol client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    Null,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    ByteString(Vec<u8>),
    LocalizedText(String),
    ExtensionObject(ExtensionObject),
    Array(Vec<Variant>),
}

impl Variant {
    pub fn datetime_from_epoch_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Variant::DateTime)
    }
}

/// A decoded structured value: an ordered set of named member fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtensionObject {
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ExtensionObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Variant) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
        self
    }
}

/// A named member of an [`ExtensionObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Variant,
}

/// Primitive kinds a synthetic field record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Float,
    Integer,
    String,
    Timestamp,
}

impl PrimitiveKind {
    /// Data-type tag sent to the backend for synthetic nodes.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Integer => "Int16",
            PrimitiveKind::String => "String",
            PrimitiveKind::Timestamp => "DateTime",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_deserializes_backend_json() {
        let json =
            r#"{"id": 4, "url": "opc.tcp://plc:4840", "root_node": null, "scan_required": 1}"#;
        let server: Server = serde_json::from_str(json).unwrap();
        assert_eq!(server.id, ServerId::new(4));
        assert!(server.scan_required);
        assert_eq!(server.root_node, "");
        assert!(server.configured_root().is_none());
        assert!(server.connection_error.is_none());
    }

    #[test]
    fn test_server_configured_root_trims() {
        let server = Server::new(1, "opc.tcp://plc:4840").with_root_node("  ns=2;s=Line1 ");
        assert_eq!(server.configured_root(), Some(NodeId::new("ns=2;s=Line1")));
    }

    #[test]
    fn test_access_level_flags() {
        let level = AccessLevel::CURRENT_READ.union(AccessLevel::HISTORY_READ);
        assert!(level.readable());
        assert!(!level.writable());
        assert!(AccessLevel::from_bits(0x03).writable());
        assert!(!AccessLevel::NONE.readable());
    }

    #[test]
    fn test_field_identifier() {
        let node = NodeId::new("ns=2;i=1001");
        assert_eq!(node.field_identifier("speed"), "ns=2;i=1001.speed");
        assert!(NodeId::root().is_root());
    }

    #[test]
    fn test_only_extension_objects_are_structured() {
        assert!(VariantType::ExtensionObject.is_structured());
        assert!(!VariantType::Double.is_structured());
    }

    #[test]
    fn test_status_code_renders_decimal() {
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.to_string(), "2150891520");
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert!(!StatusCode::GOOD.is_bad());
    }

    #[test]
    fn test_primitive_kind_wire_tags() {
        assert_eq!(PrimitiveKind::Integer.wire_tag(), "Int16");
        assert_eq!(PrimitiveKind::Timestamp.wire_tag(), "DateTime");
    }
}
