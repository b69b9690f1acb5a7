//! # Spec Store
//!
//! Content-addressed interning of specs. Two specs with the same variant,
//! name and canonical form (the fully inlined document with store-owned uids
//! removed) are the same spec; the first one registered wins.

use crate::encoder;
use crate::model::{
    EntityIndex, EntityRef, IngredientSpec, MaterialSpec, ProcessSpec, Ref, collect_reachable,
    rebuild_back_references,
};
use crate::primitives::{PERSISTENT_ID_SCOPE, SPEC_FOLDERS, SPEC_REGISTRY_FILE};
use crate::store::registry::Registry;
use crate::store::template_store::TemplateStore;
use crate::store::{file_name_for, json_files_in};
use crate::types::{Category, EntityType, GemdError};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One interned spec.
#[derive(Debug, Clone)]
pub struct SpecRecord {
    pub spec: EntityRef,
    /// Canonical document with store-owned uids stripped.
    pub canonical_value: serde_json::Value,
    /// `canonical_value` rendered as text.
    pub canonical_dict_no_uid: String,
    pub from_file: bool,
}

type Bucket = IndexMap<String, SpecRecord>;

/// Content-addressed spec interning with on-disk persistence.
#[derive(Debug)]
pub struct SpecStore {
    root: PathBuf,
    scope: String,
    registry: Registry,
    records: BTreeMap<EntityType, BTreeMap<String, Bucket>>,
}

/// Which field of a parent spec holds a child spec.
#[derive(Debug, Clone, Copy)]
enum ChildField {
    MaterialProcess,
    IngredientMaterial,
    IngredientProcess,
}

impl SpecStore {
    /// Create the spec subfolders and the registry header.
    pub fn initialize_store(root: &Path) -> Result<(), GemdError> {
        for folder in SPEC_FOLDERS {
            let dir = root.join(folder);
            std::fs::create_dir_all(&dir)
                .map_err(|e| GemdError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        Registry::initialize(&root.join(SPEC_REGISTRY_FILE))
    }

    /// Open a store keyed by uids under `scope`.
    pub fn open(root: impl Into<PathBuf>, scope: impl Into<String>) -> Result<Self, GemdError> {
        let root = root.into();
        Self::initialize_store(&root)?;
        let registry = Registry::open(&root.join(SPEC_REGISTRY_FILE))?;
        let scope = scope.into();
        debug!(root = %root.display(), scope = %scope, rows = registry.len(), "Opened spec store");
        Ok(Self {
            root,
            scope,
            registry,
            records: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Canonical form of `spec`: the fully inlined document with every uid
    /// under this store's scope and under `persistent_id` removed.
    pub fn canonical_form(&self, spec: &EntityRef) -> Result<serde_json::Value, GemdError> {
        let mut value = encoder::full_value(spec)?;
        strip_uids(&mut value, &[self.scope.as_str(), PERSISTENT_ID_SCOPE]);
        Ok(value)
    }

    /// The interned spec equal to `spec`, registering `spec` if none exists.
    ///
    /// Lookup tries, within the `(variant, name)` bucket: the store-scope uid
    /// directly, then structural equality of canonical forms, then equality of
    /// their text. With `recursive_check`, child specs (process of a material,
    /// material and process of an ingredient) already interned replace the
    /// caller's children. With `recursive_register`, unseen children are
    /// registered before the parent. The parent's canonical form is computed
    /// before any child substitution.
    pub fn unique_version_of(
        &mut self,
        spec: &EntityRef,
        recursive_check: bool,
        recursive_register: bool,
    ) -> Result<EntityRef, GemdError> {
        let entity_type = spec.entity_type();
        if entity_type.category() != Category::Spec {
            return Err(GemdError::WrongElementType {
                expected: "spec".to_string(),
                found: entity_type.to_string(),
            });
        }

        let canonical_value = self.canonical_form(spec)?;
        let canonical_text = canonical_value.to_string();

        if let Some(found) = self.find(spec, &canonical_value, &canonical_text) {
            debug!(name = %spec.name(), "Spec already interned");
            return Ok(found);
        }

        if recursive_check || recursive_register {
            for (field, child) in child_specs(spec) {
                let interned = if recursive_register {
                    Some(self.unique_version_of(&child, recursive_check, true)?)
                } else {
                    self.lookup_existing(&child)?
                };
                if let Some(interned) = interned {
                    if !interned.ptr_eq(&child) {
                        replace_child(spec, field, &interned);
                    }
                }
            }
        }

        self.register(spec, canonical_value, canonical_text)?;
        Ok(spec.clone())
    }

    /// The interned version of `spec` without registering anything.
    pub fn lookup_existing(&self, spec: &EntityRef) -> Result<Option<EntityRef>, GemdError> {
        let canonical_value = self.canonical_form(spec)?;
        let canonical_text = canonical_value.to_string();
        Ok(self.find(spec, &canonical_value, &canonical_text))
    }

    fn find(
        &self,
        spec: &EntityRef,
        canonical_value: &serde_json::Value,
        canonical_text: &str,
    ) -> Option<EntityRef> {
        let bucket = self.records.get(&spec.entity_type())?.get(&spec.name())?;

        if let Some(record) = spec.uid(&self.scope).and_then(|uid| bucket.get(&uid)) {
            return Some(record.spec.clone());
        }
        if let Some(record) = bucket.values().find(|r| &r.canonical_value == canonical_value) {
            return Some(record.spec.clone());
        }
        bucket
            .values()
            .find(|r| r.canonical_dict_no_uid == canonical_text)
            .map(|r| r.spec.clone())
    }

    fn register(
        &mut self,
        spec: &EntityRef,
        canonical_value: serde_json::Value,
        canonical_dict_no_uid: String,
    ) -> Result<(), GemdError> {
        let entity_type = spec.entity_type();
        let name = spec.name();

        encoder::ensure_auto_uid(spec);
        let uid = match spec.uid(&self.scope) {
            Some(uid) => uid,
            None => {
                let uid = Uuid::new_v4().to_string();
                spec.set_uid(&self.scope, uid.clone());
                uid
            }
        };

        let persistent_id = self.registry.append(&name, entity_type)?;
        spec.set_uid(PERSISTENT_ID_SCOPE, persistent_id.to_string());

        let path = self.spec_path(entity_type, &name, persistent_id)?;
        encoder::write_thin(&path, spec)?;
        info!(store = %self.root.display(), name = %name, persistent_id, "Registered {}", entity_type);

        self.records
            .entry(entity_type)
            .or_default()
            .entry(name)
            .or_default()
            .insert(
                uid,
                SpecRecord {
                    spec: spec.clone(),
                    canonical_value,
                    canonical_dict_no_uid,
                    from_file: false,
                },
            );
        Ok(())
    }

    fn spec_path(
        &self,
        entity_type: EntityType,
        name: &str,
        persistent_id: usize,
    ) -> Result<PathBuf, GemdError> {
        let folder = entity_type
            .store_folder()
            .ok_or_else(|| GemdError::UnknownEntityType(entity_type.to_string()))?;
        Ok(self.root.join(folder).join(file_name_for(name, persistent_id)))
    }

    /// Drop an interned spec and its file. The registry row is kept.
    ///
    /// Returns `false` if the spec was not interned here.
    pub fn remove_unneeded_spec(&mut self, spec: &EntityRef) -> Result<bool, GemdError> {
        let name = spec.name();
        let uid = spec.uid(&self.scope).ok_or_else(|| GemdError::MissingScopeUid {
            name: name.clone(),
            scope: self.scope.clone(),
        })?;
        let entity_type = spec.entity_type();

        let Some(bucket) = self
            .records
            .get_mut(&entity_type)
            .and_then(|by_name| by_name.get_mut(&name))
        else {
            return Ok(false);
        };
        let Some(record) = bucket.shift_remove(&uid) else {
            return Ok(false);
        };
        if bucket.is_empty() {
            if let Some(by_name) = self.records.get_mut(&entity_type) {
                by_name.remove(&name);
            }
        }

        if let Some(pid) = record
            .spec
            .uid(PERSISTENT_ID_SCOPE)
            .and_then(|p| p.parse::<usize>().ok())
        {
            let path = self.spec_path(entity_type, &name, pid)?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;
            }
        }
        info!(store = %self.root.display(), name = %name, "Removed {}", entity_type);
        Ok(true)
    }

    /// Load every spec file under the store root without writing.
    ///
    /// Links between loaded specs, and from loaded specs to the templates of
    /// `templates`, are resolved. Returns the number of newly interned specs.
    pub fn register_all_specs_from_store(
        &mut self,
        templates: Option<&TemplateStore>,
    ) -> Result<usize, GemdError> {
        let mut loaded = Vec::new();
        for folder in SPEC_FOLDERS {
            for path in json_files_in(&self.root.join(folder))? {
                match encoder::load_file(&path) {
                    Ok(entities) => loaded.extend(entities),
                    Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable spec"),
                }
            }
        }

        let mut index = EntityIndex::new();
        if let Some(templates) = templates {
            index.extend(templates.all_templates().iter());
        }
        index.extend(loaded.iter());
        for entity in &loaded {
            entity.resolve_links(&index);
        }
        rebuild_back_references(&collect_reachable(&loaded));

        let mut added = 0;
        for spec in loaded {
            if spec.entity_type().category() != Category::Spec {
                warn!(name = %spec.name(), "Ignoring non-spec document in spec folder");
                continue;
            }
            let Some(uid) = spec.uid(&self.scope) else {
                warn!(name = %spec.name(), scope = %self.scope, "Spec file has no uid in store scope");
                continue;
            };
            let canonical_value = self.canonical_form(&spec)?;
            let canonical_dict_no_uid = canonical_value.to_string();
            let bucket = self
                .records
                .entry(spec.entity_type())
                .or_default()
                .entry(spec.name())
                .or_default();
            if bucket.contains_key(&uid) {
                continue;
            }
            bucket.insert(
                uid,
                SpecRecord {
                    spec,
                    canonical_value,
                    canonical_dict_no_uid,
                    from_file: true,
                },
            );
            added += 1;
        }
        info!(store = %self.root.display(), added, "Loaded specs from store");
        Ok(added)
    }

    #[must_use]
    pub fn get(&self, entity_type: EntityType, name: &str, uid: &str) -> Option<&SpecRecord> {
        self.records.get(&entity_type)?.get(name)?.get(uid)
    }

    /// All records of one `(variant, name)` bucket, in registration order.
    #[must_use]
    pub fn bucket(&self, entity_type: EntityType, name: &str) -> Vec<&SpecRecord> {
        self.records
            .get(&entity_type)
            .and_then(|by_name| by_name.get(name))
            .map(|bucket| bucket.values().collect())
            .unwrap_or_default()
    }

    /// Every interned spec.
    #[must_use]
    pub fn all_specs(&self) -> Vec<EntityRef> {
        self.records
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|bucket| bucket.values().map(|r| r.spec.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .values()
            .flat_map(BTreeMap::values)
            .map(IndexMap::len)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }
}

/// Remove uids under any of `scopes` from every `uids` map in `value`.
pub(crate) fn strip_uids(value: &mut serde_json::Value, scopes: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "uids" {
                    if let Some(uids) = child.as_object_mut() {
                        for scope in scopes {
                            uids.remove(*scope);
                        }
                    }
                } else {
                    strip_uids(child, scopes);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                strip_uids(item, scopes);
            }
        }
        _ => {}
    }
}

fn resolved<T: crate::model::Entity>(reference: Option<&Ref<T>>) -> Option<EntityRef> {
    reference
        .and_then(Ref::object)
        .map(|h| T::wrap(h.clone()))
}

fn child_specs(spec: &EntityRef) -> Vec<(ChildField, EntityRef)> {
    match spec {
        EntityRef::MaterialSpec(h) => resolved(h.read().process.as_ref())
            .map(|p| vec![(ChildField::MaterialProcess, p)])
            .unwrap_or_default(),
        EntityRef::IngredientSpec(h) => {
            let s = h.read();
            resolved(s.material.as_ref())
                .map(|m| (ChildField::IngredientMaterial, m))
                .into_iter()
                .chain(
                    resolved(s.process.as_ref()).map(|p| (ChildField::IngredientProcess, p)),
                )
                .collect()
        }
        _ => Vec::new(),
    }
}

fn replace_child(parent: &EntityRef, field: ChildField, child: &EntityRef) {
    match (parent, field) {
        (EntityRef::MaterialSpec(h), ChildField::MaterialProcess) => {
            if let Some(p) = child.downcast::<ProcessSpec>() {
                h.write().process = Some(Ref::Object(p));
            }
        }
        (EntityRef::IngredientSpec(h), ChildField::IngredientMaterial) => {
            if let Some(m) = child.downcast::<MaterialSpec>() {
                h.write().material = Some(Ref::Object(m));
            }
        }
        (EntityRef::IngredientSpec(h), ChildField::IngredientProcess) => {
            if let Some(p) = child.downcast::<ProcessSpec>() {
                h.write().process = Some(Ref::Object(p));
            }
        }
        _ => {}
    }
}

/// Typed convenience for ingredient specs.
impl SpecStore {
    pub fn unique_ingredient(
        &mut self,
        spec: &crate::model::Handle<IngredientSpec>,
    ) -> Result<Option<crate::model::Handle<IngredientSpec>>, GemdError> {
        let interned = self.unique_version_of(&EntityRef::from(spec.clone()), true, true)?;
        Ok(interned.downcast())
    }
}

// =============================================================================
// TESTS
// =============================================================================
