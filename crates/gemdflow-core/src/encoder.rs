//! # Encoder
//!
//! JSON serialization of entities in two modes:
//!
//! - **thin**: every nested entity becomes a `{type, id, scope}` link stub;
//!   one document per entity.
//! - **full**: nested entities are inlined.
//!
//! Any entity written through thin mode first receives a uid under the `auto`
//! scope if it has none, so repeated dumps are stable.

use crate::model::{EntityIndex, EntityRef, collect_reachable, rebuild_back_references};
use crate::primitives::AUTO_SCOPE;
use crate::types::{GemdError, LinkByUid};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Return the `auto` uid of `entity`, assigning a fresh UUIDv4 first if
/// it has none.
pub fn ensure_auto_uid(entity: &EntityRef) -> String {
    match entity.uid(AUTO_SCOPE) {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            entity.set_uid(AUTO_SCOPE, id.clone());
            id
        }
    }
}

/// Thin documents for every entity reachable from `roots`, roots first.
///
/// Each entity appears once, after every reachable entity has an `auto` uid.
pub fn thin_documents(
    roots: &[EntityRef],
) -> Result<Vec<(EntityRef, serde_json::Value)>, GemdError> {
    let reachable = collect_reachable(roots);
    for entity in &reachable {
        ensure_auto_uid(entity);
    }
    reachable
        .into_iter()
        .map(|entity| {
            let value = entity.to_value()?;
            Ok((entity, value))
        })
        .collect()
}

/// Thin JSON value of one entity.
pub fn thin_value(entity: &EntityRef) -> Result<serde_json::Value, GemdError> {
    for reached in collect_reachable(std::slice::from_ref(entity)) {
        ensure_auto_uid(&reached);
    }
    entity.to_value()
}

/// Thin JSON text of one entity.
pub fn thin_dumps(entity: &EntityRef) -> Result<String, GemdError> {
    let value = thin_value(entity)?;
    serde_json::to_string_pretty(&value).map_err(|e| GemdError::SerializationError(e.to_string()))
}

/// Full JSON value of one entity: every link stub reachable through owning
/// references is replaced by the inlined document.
pub fn full_value(entity: &EntityRef) -> Result<serde_json::Value, GemdError> {
    let reachable = collect_reachable(std::slice::from_ref(entity));
    for reached in &reachable {
        ensure_auto_uid(reached);
    }
    let mut index = EntityIndex::new();
    index.extend(reachable.iter());

    let mut value = entity.to_value()?;
    let mut path = HashSet::new();
    if let Some(link) = entity.link() {
        path.insert(link);
    }
    inline_links(&mut value, &index, &mut path)?;
    Ok(value)
}

/// Full JSON text of one entity.
pub fn full_dumps(entity: &EntityRef) -> Result<String, GemdError> {
    let value = full_value(entity)?;
    serde_json::to_string_pretty(&value).map_err(|e| GemdError::SerializationError(e.to_string()))
}

fn inline_links(
    value: &mut serde_json::Value,
    index: &EntityIndex,
    path: &mut HashSet<LinkByUid>,
) -> Result<(), GemdError> {
    if LinkByUid::is_link_value(value) {
        let link: LinkByUid = serde_json::from_value(value.clone())
            .map_err(|e| GemdError::DeserializationError(e.to_string()))?;
        if path.contains(&link) {
            return Ok(());
        }
        if let Some(target) = index.lookup(&link) {
            let mut inlined = target.to_value()?;
            path.insert(link.clone());
            inline_links(&mut inlined, index, path)?;
            path.remove(&link);
            *value = inlined;
        }
        return Ok(());
    }
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key != "uids" {
                    inline_links(child, index, path)?;
                }
            }
        }
        serde_json::Value::Array(items) => {
            for child in items {
                inline_links(child, index, path)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Decode one document or an array of documents.
///
/// Links between the decoded entities (including inlined ones) are resolved
/// and back-references rebuilt. Links to entities outside the text stay as
/// stubs. Returns the top-level entities in document order.
pub fn raw_loads(text: &str) -> Result<Vec<EntityRef>, GemdError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| GemdError::DeserializationError(e.to_string()))?;
    let documents = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    let entities = documents
        .into_iter()
        .map(EntityRef::from_value)
        .collect::<Result<Vec<_>, _>>()?;
    link_entities(&entities);
    Ok(entities)
}

/// Read and decode a thin JSON file.
pub fn load_file(path: &Path) -> Result<Vec<EntityRef>, GemdError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;
    raw_loads(&text)
}

/// Write the thin document of `entity` to `path`.
pub fn write_thin(path: &Path, entity: &EntityRef) -> Result<(), GemdError> {
    let text = thin_dumps(entity)?;
    std::fs::write(path, text)
        .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))
}

/// Resolve link stubs among `entities` and everything reachable from them,
/// then rebuild back-references.
pub fn link_entities(entities: &[EntityRef]) {
    let reachable = collect_reachable(entities);
    let mut index = EntityIndex::new();
    index.extend(reachable.iter());
    for entity in &reachable {
        entity.resolve_links(&index);
    }
    let linked = collect_reachable(entities);
    rebuild_back_references(&linked);
}

// =============================================================================
// TESTS
// =============================================================================
