//! The set of stores elements intern through.
//!
//! A `StoresConfig` is passed explicitly to every element constructor and
//! rule action. Clones share the underlying stores.

use crate::model::EntityRef;
use crate::primitives::AUTO_SCOPE;
use crate::store::spec_store::SpecStore;
use crate::store::template_store::{Provenance, TemplateStore, detach_template};
use crate::types::GemdError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Registered template and spec stores, the designated store id, and the
/// activation switch.
#[derive(Debug, Clone, Default)]
pub struct StoresConfig {
    template_stores: IndexMap<String, Arc<Mutex<TemplateStore>>>,
    spec_stores: IndexMap<String, Arc<Mutex<SpecStore>>>,
    designated_store_id: Option<String>,
    activated: bool,
    /// Templates elements were already built on, shared by clones.
    adopted: Arc<Mutex<Vec<EntityRef>>>,
}

impl StoresConfig {
    /// An empty, deactivated configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One template store and one spec store sharing `root`, with templates
    /// and specs already on disk loaded, designated under `id` and activated.
    pub fn open_local(root: &Path, id: &str) -> Result<Self, GemdError> {
        let mut templates = TemplateStore::open(root)?;
        templates.register_all_templates_from_store()?;
        let mut specs = SpecStore::open(root, AUTO_SCOPE)?;
        specs.register_all_specs_from_store(Some(&templates))?;

        let mut config = Self::new();
        config.add_template_store(id, templates)?;
        config.add_spec_store(id, specs)?;
        config.activate(id)?;
        Ok(config)
    }

    pub fn add_template_store(&mut self, id: &str, store: TemplateStore) -> Result<(), GemdError> {
        if self.template_stores.contains_key(id) {
            return Err(GemdError::DuplicateStoreId(id.to_string()));
        }
        self.template_stores
            .insert(id.to_string(), Arc::new(Mutex::new(store)));
        Ok(())
    }

    pub fn add_spec_store(&mut self, id: &str, store: SpecStore) -> Result<(), GemdError> {
        if self.spec_stores.contains_key(id) {
            return Err(GemdError::DuplicateStoreId(id.to_string()));
        }
        self.spec_stores
            .insert(id.to_string(), Arc::new(Mutex::new(store)));
        Ok(())
    }

    /// Designate the template store `id` and turn interning on.
    pub fn activate(&mut self, designated_store_id: &str) -> Result<(), GemdError> {
        if !self.template_stores.contains_key(designated_store_id) {
            return Err(GemdError::UnknownStore(designated_store_id.to_string()));
        }
        self.designated_store_id = Some(designated_store_id.to_string());
        self.activated = true;
        debug!(store = designated_store_id, "Stores activated");
        Ok(())
    }

    /// Turn interning off. Elements then use templates and specs as passed.
    pub fn deactivate(&mut self) {
        self.activated = false;
    }

    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    #[must_use]
    pub fn designated_store_id(&self) -> Option<&str> {
        self.designated_store_id.as_deref()
    }

    #[must_use]
    pub fn template_store(&self, id: &str) -> Option<Arc<Mutex<TemplateStore>>> {
        self.template_stores.get(id).cloned()
    }

    #[must_use]
    pub fn spec_store(&self, id: &str) -> Option<Arc<Mutex<SpecStore>>> {
        self.spec_stores.get(id).cloned()
    }

    #[must_use]
    pub fn designated_template_store(&self) -> Option<Arc<Mutex<TemplateStore>>> {
        self.designated_store_id
            .as_deref()
            .and_then(|id| self.template_store(id))
    }

    #[must_use]
    pub fn designated_spec_store(&self) -> Option<Arc<Mutex<SpecStore>>> {
        self.designated_store_id
            .as_deref()
            .and_then(|id| self.spec_store(id))
    }

    /// Pass `template` through every template store and return the
    /// designated store's canonical template.
    ///
    /// The designated store sees the caller's handle; the others receive
    /// detached copies of the canonical template so that each store owns the
    /// persistent ids it assigns. When deactivated, `template` is returned
    /// unchanged.
    pub fn intern_template(
        &self,
        template: &EntityRef,
        provenance: Provenance,
    ) -> Result<EntityRef, GemdError> {
        if !self.activated {
            return Ok(template.clone());
        }
        let designated = self
            .designated_store_id
            .as_deref()
            .ok_or_else(|| GemdError::UnknownStore("<none designated>".to_string()))?;
        let store = self
            .template_stores
            .get(designated)
            .ok_or_else(|| GemdError::UnknownStore(designated.to_string()))?;

        let canonical = store.lock().register_new_template(template, provenance)?.template;

        for (id, other) in &self.template_stores {
            if id != designated {
                other
                    .lock()
                    .register_new_template(&detach_template(&canonical), provenance)?;
            }
        }
        Ok(canonical)
    }

    /// Whether `template` is the handle interned by the designated store.
    #[must_use]
    pub fn is_interned_template(&self, template: &EntityRef) -> bool {
        self.designated_template_store()
            .is_some_and(|store| store.lock().is_interned(template))
    }

    /// Whether an element was already built on this template handle through
    /// this configuration or one of its clones.
    #[must_use]
    pub fn is_adopted_template(&self, template: &EntityRef) -> bool {
        self.adopted.lock().iter().any(|t| t.ptr_eq(template))
    }

    /// Record that an element was built on `template`.
    pub fn adopt_template(&self, template: &EntityRef) {
        let mut adopted = self.adopted.lock();
        if !adopted.iter().any(|t| t.ptr_eq(template)) {
            adopted.push(template.clone());
        }
    }

    /// The designated spec store's unique version of `spec`, registering
    /// children first. Without activation or a designated spec store, `spec`
    /// is returned unchanged.
    pub fn unique_spec(&self, spec: &EntityRef) -> Result<EntityRef, GemdError> {
        if !self.activated {
            return Ok(spec.clone());
        }
        match self.designated_spec_store() {
            Some(store) => store.lock().unique_version_of(spec, true, true),
            None => Ok(spec.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Handle, MaterialTemplate, ProcessTemplate};
    use crate::primitives::PERSISTENT_ID_SCOPE;
    use tempfile::TempDir;

    #[test]
    fn duplicate_store_ids_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = StoresConfig::new();
        config
            .add_template_store("local", TemplateStore::open(dir.path()).expect("open"))
            .expect("first");
        let err = config
            .add_template_store("local", TemplateStore::open(dir.path()).expect("open"))
            .expect_err("duplicate");
        assert!(matches!(err, GemdError::DuplicateStoreId(id) if id == "local"));
    }

    #[test]
    fn activation_requires_known_store() {
        let mut config = StoresConfig::new();
        assert!(matches!(
            config.activate("nowhere"),
            Err(GemdError::UnknownStore(_))
        ));
        assert!(!config.is_activated());
    }

    #[test]
    fn deactivated_config_passes_templates_through() {
        let config = StoresConfig::new();
        let template = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
        let out = config.intern_template(&template, Provenance::memory()).expect("intern");
        assert!(out.ptr_eq(&template));
        assert!(template.uid(AUTO_SCOPE).is_none());
    }

    #[test]
    fn clones_share_adopted_templates() {
        let config = StoresConfig::new();
        let template = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
        let twin = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
        assert!(!config.is_adopted_template(&template));

        config.clone().adopt_template(&template);
        config.adopt_template(&template);
        assert!(config.is_adopted_template(&template));
        assert!(!config.is_adopted_template(&twin));
        assert_eq!(config.adopted.lock().len(), 1);
        assert!(!StoresConfig::new().is_adopted_template(&template));
    }

    #[test]
    fn designated_store_owns_canonical_template() {
        let main_dir = TempDir::new().expect("tempdir");
        let mirror_dir = TempDir::new().expect("tempdir");
        let mut config = StoresConfig::new();
        config
            .add_template_store("mirror", TemplateStore::open(mirror_dir.path()).expect("open"))
            .expect("mirror");
        // Give the mirror a head start so its persistent ids diverge.
        config
            .template_store("mirror")
            .expect("mirror")
            .lock()
            .register_new_template(
                &EntityRef::from(Handle::new(ProcessTemplate::new("Other"))),
                Provenance::memory(),
            )
            .expect("seed");
        config
            .add_template_store("main", TemplateStore::open(main_dir.path()).expect("open"))
            .expect("main");
        config.activate("main").expect("activate");

        let t1 = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
        let t2 = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
        let c1 = config.intern_template(&t1, Provenance::memory()).expect("c1");
        let c2 = config.intern_template(&t2, Provenance::memory()).expect("c2");

        assert!(c1.ptr_eq(&t1));
        assert!(c2.ptr_eq(&t1));
        assert_eq!(c1.uid(PERSISTENT_ID_SCOPE).as_deref(), Some("0"));
        assert!(config.is_interned_template(&c1));
        assert!(!config.is_interned_template(&t2));

        let mirror = config.template_store("mirror").expect("mirror");
        let mirrored = mirror
            .lock()
            .get(crate::types::EntityType::MaterialTemplate, "Alloy")
            .map(|r| r.template.clone())
            .expect("mirrored");
        assert!(!mirrored.ptr_eq(&c1));
        assert_eq!(mirrored.uid(PERSISTENT_ID_SCOPE).as_deref(), Some("1"));
        assert_eq!(mirrored.uid(AUTO_SCOPE), c1.uid(AUTO_SCOPE));
    }

    #[test]
    fn open_local_reloads_previous_state() {
        let dir = TempDir::new().expect("tempdir");
        {
            let config = StoresConfig::open_local(dir.path(), "local").expect("open");
            let template = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
            config.intern_template(&template, Provenance::memory()).expect("intern");
        }
        let config = StoresConfig::open_local(dir.path(), "local").expect("reopen");
        let store = config.designated_template_store().expect("store");
        assert!(store.lock().material_template("Alloy").is_some());
        assert_eq!(config.designated_store_id(), Some("local"));
    }
}
