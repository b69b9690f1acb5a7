//! # Element Wrappers
//!
//! An element bundles the template, spec and run of one node and mediates
//! every attribute, tag and file-link mutation on them.
//!
//! Variants: [`Material`], [`Process`], [`Measurement`] and [`Ingredient`]
//! (ingredients have no template). [`MaterialsSequence`] composes them into
//! the `ingredients -> process -> material -> measurements` fragment.

pub mod attributes;
pub mod builder;
pub mod ingredient;
pub mod material;
pub mod measurement;
pub mod process;
pub mod sequence;
pub mod tags;

pub use attributes::{AttributeSlot, AttributeSlots, merge_attributes};
pub use builder::ElementBuilder;
pub use ingredient::Ingredient;
pub use material::Material;
pub use measurement::Measurement;
pub use process::Process;
pub use sequence::{MaterialsSequence, SequenceBuilder};
pub use tags::{TagTree, join_tag, tag_tree};

use crate::model::{
    Attribute, AttributeHolder, AttributeKind, Described, Entity, EntityRef, Handle,
    ObjectTemplate,
};
use crate::store::StoresConfig;
use crate::types::{FileLink, GemdError, Which};
use std::fmt;
use tracing::debug;

// =============================================================================
// VARIANTS
// =============================================================================

/// The four element variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementVariant {
    Material,
    Process,
    Measurement,
    Ingredient,
}

impl ElementVariant {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ElementVariant::Material => "material",
            ElementVariant::Process => "process",
            ElementVariant::Measurement => "measurement",
            ElementVariant::Ingredient => "ingredient",
        }
    }
}

impl fmt::Display for ElementVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ELEMENT TRAITS
// =============================================================================

/// Behaviour shared by every element variant.
pub trait GemdElement {
    type Spec: Entity + Described + AttributeHolder + Default;
    type Run: Entity + Described + AttributeHolder + Default;

    const VARIANT: ElementVariant;
    /// Attribute kinds the spec carries.
    const SPEC_KINDS: &'static [AttributeKind];
    /// Attribute kinds the run carries.
    const RUN_KINDS: &'static [AttributeKind];

    fn name(&self) -> &str;

    fn spec(&self) -> &Handle<Self::Spec>;

    fn run(&self) -> &Handle<Self::Run>;

    fn slots(&self) -> &AttributeSlots;

    fn slots_mut(&mut self) -> &mut AttributeSlots;

    fn stores(&self) -> &StoresConfig;

    /// Swap the element's spec handle. The run is rewired separately.
    fn set_spec_handle(&mut self, spec: Handle<Self::Spec>);

    /// The resolved spec a run points at.
    fn run_spec(run: &Self::Run) -> Option<Handle<Self::Spec>>;

    fn link_run_to_spec(run: &mut Self::Run, spec: &Handle<Self::Spec>);

    fn spec_entity(&self) -> EntityRef {
        Self::Spec::wrap(self.spec().clone())
    }

    fn run_entity(&self) -> EntityRef {
        Self::Run::wrap(self.run().clone())
    }

    /// Current attributes of one kind. `Both` merges spec then run by name.
    fn attributes(&self, kind: AttributeKind, which: Which) -> Vec<Attribute> {
        let spec = || self.spec().read().attributes(kind).unwrap_or_default();
        let run = || self.run().read().attributes(kind).unwrap_or_default();
        match which {
            Which::Spec => spec(),
            Which::Run => run(),
            Which::Both => merge_attributes(Vec::new(), spec(), run()),
        }
    }

    /// Set attributes of one kind on the spec, the run, or both.
    ///
    /// Each supplied attribute is bound to its slot (unknown names define a
    /// new slot from the attribute's template) and checked against the slot
    /// bounds. The resulting list is `required ∪ existing ∪ supplied` with
    /// later writers winning; `replace_all` drops `existing`. Targets that do
    /// not carry `kind` are skipped; if no selected target carries it the
    /// call fails with `InvalidAttributeForVariant`.
    fn update_attributes(
        &mut self,
        kind: AttributeKind,
        attributes: Vec<Attribute>,
        replace_all: bool,
        which: Which,
    ) -> Result<(), GemdError> {
        let to_spec = which.includes_spec() && Self::SPEC_KINDS.contains(&kind);
        let to_run = which.includes_run() && Self::RUN_KINDS.contains(&kind);
        if !to_spec && !to_run {
            return Err(GemdError::InvalidAttributeForVariant {
                attribute: kind.to_string(),
                variant: Self::VARIANT.to_string(),
            });
        }

        let stores = self.stores().clone();
        let mut supplied = Vec::with_capacity(attributes.len());
        for mut attribute in attributes {
            if attribute.kind != kind {
                return Err(GemdError::InvalidAttributeForVariant {
                    attribute: attribute.kind.to_string(),
                    variant: format!("{} {} list", Self::VARIANT, kind),
                });
            }
            self.slots_mut().adopt(&mut attribute, &stores)?;
            supplied.push(attribute);
        }

        let required = self.slots().required(kind);
        if to_spec {
            let existing = if replace_all {
                Vec::new()
            } else {
                self.spec().read().attributes(kind).unwrap_or_default()
            };
            let merged = merge_attributes(required.clone(), existing, supplied.clone());
            self.spec().write().set_attributes(kind, merged);
        }
        if to_run {
            let existing = if replace_all {
                Vec::new()
            } else {
                self.run().read().attributes(kind).unwrap_or_default()
            };
            let merged = merge_attributes(required, existing, supplied);
            self.run().write().set_attributes(kind, merged);
        }
        debug!(element = %self.name(), kind = %kind, "Updated attributes");
        Ok(())
    }

    /// Remove attributes by name. Required attributes cannot be removed.
    fn remove_attributes(
        &mut self,
        kind: AttributeKind,
        names: &[&str],
        which: Which,
    ) -> Result<(), GemdError> {
        for name in names {
            if self.slots().get(kind, name).is_some_and(AttributeSlot::is_required) {
                return Err(GemdError::RemovingRequired((*name).to_string()));
            }
        }
        let keep = |list: Vec<Attribute>| -> Vec<Attribute> {
            list.into_iter()
                .filter(|a| !names.contains(&a.name.as_str()))
                .collect()
        };
        if which.includes_spec() {
            let current = self.spec().read().attributes(kind);
            if let Some(list) = current {
                self.spec().write().set_attributes(kind, keep(list));
            }
        }
        if which.includes_run() {
            let current = self.run().read().attributes(kind);
            if let Some(list) = current {
                self.run().write().set_attributes(kind, keep(list));
            }
        }
        Ok(())
    }

    /// Apply `f` to the spec and/or run.
    fn with_targets(&self, which: Which, mut f: impl FnMut(&mut dyn Described)) {
        if which.includes_spec() {
            f(&mut *self.spec().write());
        }
        if which.includes_run() {
            f(&mut *self.run().write());
        }
    }

    /// Add the tag `a::b::c` built from `segments`.
    fn add_tag(&self, segments: &[&str], which: Which) -> Result<(), GemdError> {
        let tag = join_tag(segments)?;
        self.with_targets(which, |target| {
            if !target.tags().contains(&tag) {
                target.tags_mut().push(tag.clone());
            }
        });
        Ok(())
    }

    /// Remove a tag. Returns whether any target held it.
    fn remove_tag(&self, segments: &[&str], which: Which) -> Result<bool, GemdError> {
        let tag = join_tag(segments)?;
        let mut removed = false;
        self.with_targets(which, |target| {
            let before = target.tags().len();
            target.tags_mut().retain(|t| t != &tag);
            removed |= target.tags().len() != before;
        });
        Ok(removed)
    }

    /// Stored tags; `Both` is the union, spec first.
    fn tags(&self, which: Which) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        self.with_targets(which, |target| {
            for tag in target.tags() {
                if !out.contains(tag) {
                    out.push(tag.clone());
                }
            }
        });
        out
    }

    fn tag_tree(&self, which: Which) -> TagTree {
        tag_tree(&self.tags(which))
    }

    /// Add file links, skipping ones already present by `filename,url`.
    fn add_file_links(&self, links: &[FileLink], which: Which) {
        self.with_targets(which, |target| {
            for link in links {
                if !target.file_links().iter().any(|l| l.key() == link.key()) {
                    target.file_links_mut().push(link.clone());
                }
            }
        });
    }

    /// Remove file links by `filename,url`. Returns how many were removed.
    fn remove_file_links(&self, links: &[FileLink], which: Which) -> usize {
        let keys: Vec<String> = links.iter().map(FileLink::key).collect();
        let mut removed = 0;
        self.with_targets(which, |target| {
            let before = target.file_links().len();
            target.file_links_mut().retain(|l| !keys.contains(&l.key()));
            removed += before - target.file_links().len();
        });
        removed
    }

    fn set_notes(&self, notes: Option<String>, which: Which) {
        self.with_targets(which, |target| target.set_notes(notes.clone()));
    }

    /// Replace the spec by the designated spec store's unique version and
    /// point the run at it. Returns whether the spec changed.
    fn intern_spec(&mut self) -> Result<bool, GemdError> {
        let current = self.spec_entity();
        let interned = self.stores().unique_spec(&current)?;
        if interned.ptr_eq(&current) {
            return Ok(false);
        }
        let Some(spec) = Self::Spec::unwrap(&interned) else {
            return Ok(false);
        };
        Self::link_run_to_spec(&mut self.run().write(), &spec);
        self.set_spec_handle(spec);
        debug!(element = %self.name(), "Adopted interned spec");
        Ok(true)
    }
}

/// Elements backed by an object template.
pub trait TemplatedElement: GemdElement {
    type Template: ObjectTemplate;

    fn template(&self) -> &Handle<Self::Template>;

    fn spec_template(spec: &Self::Spec) -> Option<Handle<Self::Template>>;

    fn set_spec_template(spec: &mut Self::Spec, template: &Handle<Self::Template>);

    fn template_entity(&self) -> EntityRef {
        Self::Template::wrap(self.template().clone())
    }
}

// =============================================================================
// ELEMENT
// =============================================================================

/// Any element.
#[derive(Debug, Clone)]
pub enum Element {
    Material(Material),
    Process(Process),
    Measurement(Measurement),
    Ingredient(Ingredient),
}

impl Element {
    #[must_use]
    pub fn variant(&self) -> ElementVariant {
        match self {
            Element::Material(_) => ElementVariant::Material,
            Element::Process(_) => ElementVariant::Process,
            Element::Measurement(_) => ElementVariant::Measurement,
            Element::Ingredient(_) => ElementVariant::Ingredient,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Element::Material(e) => e.name(),
            Element::Process(e) => e.name(),
            Element::Measurement(e) => e.name(),
            Element::Ingredient(e) => e.name(),
        }
    }

    #[must_use]
    pub fn spec_entity(&self) -> EntityRef {
        match self {
            Element::Material(e) => e.spec_entity(),
            Element::Process(e) => e.spec_entity(),
            Element::Measurement(e) => e.spec_entity(),
            Element::Ingredient(e) => e.spec_entity(),
        }
    }

    #[must_use]
    pub fn run_entity(&self) -> EntityRef {
        match self {
            Element::Material(e) => e.run_entity(),
            Element::Process(e) => e.run_entity(),
            Element::Measurement(e) => e.run_entity(),
            Element::Ingredient(e) => e.run_entity(),
        }
    }

    #[must_use]
    pub fn template_entity(&self) -> Option<EntityRef> {
        match self {
            Element::Material(e) => Some(e.template_entity()),
            Element::Process(e) => Some(e.template_entity()),
            Element::Measurement(e) => Some(e.template_entity()),
            Element::Ingredient(_) => None,
        }
    }

    /// Run, spec and template, in that order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityRef> {
        let mut out = vec![self.run_entity(), self.spec_entity()];
        out.extend(self.template_entity());
        out
    }

    pub fn intern_spec(&mut self) -> Result<bool, GemdError> {
        match self {
            Element::Material(e) => e.intern_spec(),
            Element::Process(e) => e.intern_spec(),
            Element::Measurement(e) => e.intern_spec(),
            Element::Ingredient(e) => e.intern_spec(),
        }
    }
}

macro_rules! element_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Element {
                fn from(element: $variant) -> Self {
                    Element::$variant(element)
                }
            }
        )*
    };
}

element_from!(Material, Process, Measurement, Ingredient);
