//! # Template Store
//!
//! Interns templates by `(variant, name)` so that every element built from a
//! logically identical template shares one handle. Registered templates are
//! written to `<root>/<variant folder>/<name>_pid_<id>.json` and listed in
//! `template_registry.csv`.

use crate::encoder;
use crate::model::{
    AttributeTemplate, EntityIndex, EntityRef, Handle, MaterialTemplate, MeasurementTemplate,
    ProcessTemplate, Ref, TemplateSlot,
};
use crate::primitives::{PERSISTENT_ID_SCOPE, TEMPLATE_FOLDERS, TEMPLATE_REGISTRY_FILE};
use crate::store::registry::Registry;
use crate::store::{file_name_for, json_files_in};
use crate::types::{Category, EntityType, GemdError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a template record came from. Flags accumulate across registrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provenance {
    pub from_file: bool,
    pub from_store: bool,
    pub from_memory: bool,
    pub from_subclass: bool,
}

impl Provenance {
    /// Built in memory by caller code.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            from_memory: true,
            ..Self::default()
        }
    }

    /// Declared by an element type itself.
    #[must_use]
    pub fn subclass() -> Self {
        Self {
            from_subclass: true,
            ..Self::default()
        }
    }

    /// Loaded from this store's own folders.
    #[must_use]
    pub fn store_file() -> Self {
        Self {
            from_file: true,
            from_store: true,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: Provenance) {
        self.from_file |= other.from_file;
        self.from_store |= other.from_store;
        self.from_memory |= other.from_memory;
        self.from_subclass |= other.from_subclass;
    }
}

/// One interned template.
#[derive(Debug, Clone)]
pub struct TemplateRecord {
    pub template: EntityRef,
    pub provenance: Provenance,
}

/// Name-keyed template interning with on-disk persistence.
#[derive(Debug)]
pub struct TemplateStore {
    root: PathBuf,
    registry: Registry,
    records: BTreeMap<EntityType, BTreeMap<String, TemplateRecord>>,
    warnings: Vec<String>,
}

impl TemplateStore {
    /// Create the variant subfolders and the registry header. Existing
    /// contents are kept.
    pub fn initialize_store(root: &Path) -> Result<(), GemdError> {
        for folder in TEMPLATE_FOLDERS {
            let dir = root.join(folder);
            std::fs::create_dir_all(&dir)
                .map_err(|e| GemdError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        Registry::initialize(&root.join(TEMPLATE_REGISTRY_FILE))
    }

    /// Initialize `root` and open its registry. Templates already on disk
    /// are not loaded until [`register_all_templates_from_store`] is called.
    ///
    /// [`register_all_templates_from_store`]: TemplateStore::register_all_templates_from_store
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GemdError> {
        let root = root.into();
        Self::initialize_store(&root)?;
        let registry = Registry::open(&root.join(TEMPLATE_REGISTRY_FILE))?;
        debug!(root = %root.display(), rows = registry.len(), "Opened template store");
        Ok(Self {
            root,
            registry,
            records: BTreeMap::new(),
            warnings: Vec::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Intern `template`.
    ///
    /// Object templates first intern every attribute template they reference,
    /// and their slots are rewritten to the interned handles. When a template
    /// of the same variant and name is already interned, a resource warning is
    /// recorded and the existing record is returned; callers must adopt the
    /// returned template.
    pub fn register_new_template(
        &mut self,
        template: &EntityRef,
        provenance: Provenance,
    ) -> Result<TemplateRecord, GemdError> {
        let entity_type = template.entity_type();
        if entity_type.category() != Category::Template {
            return Err(GemdError::WrongElementType {
                expected: "template".to_string(),
                found: entity_type.to_string(),
            });
        }
        let name = template.name();

        if let Some(record) = self
            .records
            .get_mut(&entity_type)
            .and_then(|by_name| by_name.get_mut(&name))
        {
            record.provenance.merge(provenance);
            let message = format!(
                "{} '{}' is already registered; using the existing template",
                entity_type, name
            );
            warn!(store = %self.root.display(), name = %name, "{}", message);
            self.warnings.push(message);
            return Ok(record.clone());
        }

        self.intern_slots(template, provenance)?;

        let persistent_id = self.registry.append(&name, entity_type)?;
        template.set_uid(PERSISTENT_ID_SCOPE, persistent_id.to_string());

        let folder = entity_type
            .store_folder()
            .ok_or_else(|| GemdError::UnknownEntityType(entity_type.to_string()))?;
        let path = self
            .root
            .join(folder)
            .join(file_name_for(&name, persistent_id));
        encoder::write_thin(&path, template)?;

        info!(store = %self.root.display(), name = %name, persistent_id, "Registered {}", entity_type);
        let record = TemplateRecord {
            template: template.clone(),
            provenance,
        };
        self.records
            .entry(entity_type)
            .or_default()
            .insert(name, record.clone());
        Ok(record)
    }

    fn intern_slots(&mut self, template: &EntityRef, provenance: Provenance) -> Result<(), GemdError> {
        match template {
            EntityRef::MaterialTemplate(h) => {
                let mut slots = h.read().properties.clone();
                self.intern_slot_list(&mut slots, provenance)?;
                h.write().properties = slots;
            }
            EntityRef::ProcessTemplate(h) => {
                let (mut conditions, mut parameters) = {
                    let t = h.read();
                    (t.conditions.clone(), t.parameters.clone())
                };
                self.intern_slot_list(&mut conditions, provenance)?;
                self.intern_slot_list(&mut parameters, provenance)?;
                let mut t = h.write();
                t.conditions = conditions;
                t.parameters = parameters;
            }
            EntityRef::MeasurementTemplate(h) => {
                let (mut properties, mut conditions, mut parameters) = {
                    let t = h.read();
                    (t.properties.clone(), t.conditions.clone(), t.parameters.clone())
                };
                self.intern_slot_list(&mut properties, provenance)?;
                self.intern_slot_list(&mut conditions, provenance)?;
                self.intern_slot_list(&mut parameters, provenance)?;
                let mut t = h.write();
                t.properties = properties;
                t.conditions = conditions;
                t.parameters = parameters;
            }
            _ => {}
        }
        Ok(())
    }

    fn intern_slot_list(
        &mut self,
        slots: &mut [TemplateSlot],
        provenance: Provenance,
    ) -> Result<(), GemdError> {
        for slot in slots {
            let Some(attribute) = slot.template.object().cloned() else {
                continue;
            };
            let record = self.register_new_template(&EntityRef::from(attribute), provenance)?;
            if let Some(interned) = record.template.downcast::<AttributeTemplate>() {
                slot.template = Ref::Object(interned);
            }
        }
        Ok(())
    }

    /// Load every template file under the store root without writing.
    ///
    /// Files without a registry row and rows without a file are both
    /// tolerated. Returns the number of newly interned templates.
    pub fn register_all_templates_from_store(&mut self) -> Result<usize, GemdError> {
        let mut loaded = Vec::new();
        for folder in TEMPLATE_FOLDERS {
            for path in json_files_in(&self.root.join(folder))? {
                match encoder::load_file(&path) {
                    Ok(entities) => loaded.extend(entities),
                    Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable template"),
                }
            }
        }

        let mut index = EntityIndex::new();
        index.extend(self.all_templates().iter());
        index.extend(loaded.iter());

        let mut added = 0;
        for entity in loaded {
            if entity.entity_type().category() != Category::Template {
                warn!(name = %entity.name(), "Ignoring non-template document in template folder");
                continue;
            }
            entity.resolve_links(&index);
            let by_name = self.records.entry(entity.entity_type()).or_default();
            match by_name.get_mut(&entity.name()) {
                Some(existing) => existing.provenance.merge(Provenance::store_file()),
                None => {
                    by_name.insert(
                        entity.name(),
                        TemplateRecord {
                            template: entity,
                            provenance: Provenance::store_file(),
                        },
                    );
                    added += 1;
                }
            }
        }
        info!(store = %self.root.display(), added, "Loaded templates from store");
        Ok(added)
    }

    #[must_use]
    pub fn get(&self, entity_type: EntityType, name: &str) -> Option<&TemplateRecord> {
        self.records.get(&entity_type)?.get(name)
    }

    #[must_use]
    pub fn material_template(&self, name: &str) -> Option<Handle<MaterialTemplate>> {
        self.get(EntityType::MaterialTemplate, name)
            .and_then(|r| r.template.downcast())
    }

    #[must_use]
    pub fn process_template(&self, name: &str) -> Option<Handle<ProcessTemplate>> {
        self.get(EntityType::ProcessTemplate, name)
            .and_then(|r| r.template.downcast())
    }

    #[must_use]
    pub fn measurement_template(&self, name: &str) -> Option<Handle<MeasurementTemplate>> {
        self.get(EntityType::MeasurementTemplate, name)
            .and_then(|r| r.template.downcast())
    }

    /// Whether `template` is the very handle this store interned.
    #[must_use]
    pub fn is_interned(&self, template: &EntityRef) -> bool {
        self.get(template.entity_type(), &template.name())
            .is_some_and(|r| r.template.ptr_eq(template))
    }

    /// Every interned template, attribute templates first.
    #[must_use]
    pub fn all_templates(&self) -> Vec<EntityRef> {
        self.records
            .values()
            .flat_map(|by_name| by_name.values().map(|r| r.template.clone()))
            .collect()
    }

    /// Number of interned templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in the on-disk registry.
    #[must_use]
    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    /// Resource warnings emitted so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// A copy of `template` that shares no handle with the original, attribute
/// templates of object-template slots included.
#[must_use]
pub fn detach_template(template: &EntityRef) -> EntityRef {
    fn detach_slots(slots: &mut [TemplateSlot]) {
        for slot in slots {
            if let Some(attribute) = slot.template.object().map(Handle::detached) {
                slot.template = Ref::Object(attribute);
            }
        }
    }

    let copy = template.detached();
    match &copy {
        EntityRef::MaterialTemplate(h) => detach_slots(&mut h.write().properties),
        EntityRef::ProcessTemplate(h) => {
            let mut t = h.write();
            detach_slots(&mut t.conditions);
            detach_slots(&mut t.parameters);
        }
        EntityRef::MeasurementTemplate(h) => {
            let mut t = h.write();
            detach_slots(&mut t.properties);
            detach_slots(&mut t.conditions);
            detach_slots(&mut t.parameters);
        }
        _ => {}
    }
    copy
}

// =============================================================================
// TESTS
// =============================================================================
