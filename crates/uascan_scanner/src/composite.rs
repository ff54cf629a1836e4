//! Composite value expansion
//!
//! A node whose declared type is structured carries an extension object. Each
//! member field with a primitive kind becomes a virtual record owned by the
//! real node, keyed `<parent identifier>.<field name>`.

use uascan_protocol::{ExtensionObject, NodeId, NodeUpsert};

use crate::classify::classify;

/// Virtual records for the fields of `value`, in field order.
///
/// `parent` is the real node's record; path, access flags and timestamp are
/// inherited from it. Fields without a primitive kind are skipped.
pub fn expand(parent: &NodeUpsert, value: &ExtensionObject) -> Vec<NodeUpsert> {
    let parent_id = NodeId::new(parent.identifier.as_str());
    value
        .fields
        .iter()
        .filter_map(|field| {
            let Some(kind) = classify(&field.value) else {
                tracing::debug!(
                    node = %parent.identifier,
                    field = %field.name,
                    "Skipping unclassifiable field"
                );
                return None;
            };
            Some(NodeUpsert {
                server_id: parent.server_id,
                identifier: parent_id.field_identifier(&field.name),
                display_name: field.name.clone(),
                path: parent.path.clone(),
                readable: parent.readable,
                writable: parent.writable,
                data_type: kind.wire_tag().to_string(),
                checked_at: parent.checked_at,
                is_virtual: true,
                parent_identifier: Some(parent.identifier.clone()),
            })
        })
        .collect()
}
