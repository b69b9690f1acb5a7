//! # Data Model
//!
//! Templates, specs and runs of materials, processes, measurements and
//! ingredients, plus their attributes, values and bounds.
//!
//! Entities are plain serde structs. References between them are [`Ref`]s,
//! and the identity of an entity is the [`Handle`] that owns it.

macro_rules! entity_basics {
    ($variant:ident) => {
        fn name(&self) -> &str {
            &self.name
        }

        fn uids(&self) -> &std::collections::BTreeMap<String, String> {
            &self.uids
        }

        fn uids_mut(&mut self) -> &mut std::collections::BTreeMap<String, String> {
            &mut self.uids
        }

        fn wrap(handle: $crate::model::Handle<Self>) -> $crate::model::EntityRef {
            $crate::model::EntityRef::$variant(handle)
        }

        fn unwrap(entity: &$crate::model::EntityRef) -> Option<$crate::model::Handle<Self>> {
            match entity {
                $crate::model::EntityRef::$variant(handle) => Some(handle.clone()),
                _ => None,
            }
        }
    };
}

macro_rules! impl_described {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::model::Described for $ty {
                fn set_name(&mut self, name: &str) {
                    self.name = name.to_string();
                }

                fn notes(&self) -> Option<&str> {
                    self.notes.as_deref()
                }

                fn set_notes(&mut self, notes: Option<String>) {
                    self.notes = notes;
                }

                fn tags(&self) -> &[String] {
                    &self.tags
                }

                fn tags_mut(&mut self) -> &mut Vec<String> {
                    &mut self.tags
                }

                fn file_links(&self) -> &[$crate::types::FileLink] {
                    &self.file_links
                }

                fn file_links_mut(&mut self) -> &mut Vec<$crate::types::FileLink> {
                    &mut self.file_links
                }
            }
        )*
    };
}

pub mod attribute;
pub mod bounds;
pub mod entity;
pub mod handle;
pub mod run;
pub mod spec;
pub mod template;
pub mod value;

pub use attribute::{Attribute, AttributeKind, PropertyAndConditions};
pub use bounds::Bounds;
pub use entity::{
    Entity, EntityIndex, EntityRef, Outgoing, collect_reachable, rebuild_back_references,
};
pub use handle::{Handle, Ref, WeakHandle};
pub use run::{IngredientRun, MaterialRun, MeasurementRun, ProcessRun, SampleType};
pub use spec::{IngredientSpec, MaterialSpec, MeasurementSpec, ProcessSpec};
pub use template::{
    AttributeTemplate, MaterialTemplate, MeasurementTemplate, ObjectTemplate, ProcessTemplate,
    TemplateSlot,
};
pub use value::Value;

use crate::types::FileLink;

/// Name, notes, tags and file links of a spec or run.
pub trait Described {
    fn set_name(&mut self, name: &str);

    fn notes(&self) -> Option<&str>;

    fn set_notes(&mut self, notes: Option<String>);

    fn tags(&self) -> &[String];

    fn tags_mut(&mut self) -> &mut Vec<String>;

    fn file_links(&self) -> &[FileLink];

    fn file_links_mut(&mut self) -> &mut Vec<FileLink>;
}

/// Access to the attribute collections of a spec or run.
///
/// Collections the variant does not carry read as `None` and reject writes.
pub trait AttributeHolder {
    fn attributes(&self, kind: AttributeKind) -> Option<Vec<Attribute>>;

    /// Replace one collection. Returns `false` if the variant has no such
    /// collection.
    fn set_attributes(&mut self, kind: AttributeKind, attributes: Vec<Attribute>) -> bool;
}
