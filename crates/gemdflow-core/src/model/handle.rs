//! Shared handles and references.
//!
//! A [`Handle`] is the identity of an entity: two wrappers that refer to the
//! same template hold clones of one handle, and `Handle::ptr_eq` answers the
//! "is it the same object" question. A [`Ref`] is a reference field inside an
//! entity: either a resolved handle or a link stub that has not been resolved
//! yet.

use crate::model::entity::{Entity, EntityIndex};
use crate::primitives::AUTO_SCOPE;
use crate::types::LinkByUid;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, Weak};

// =============================================================================
// HANDLE
// =============================================================================

/// Shared, lockable ownership of one entity.
pub struct Handle<T>(Arc<RwLock<T>>);

impl<T> Handle<T> {
    /// Wrap a value in a new handle.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Lock for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// A non-owning back-reference to this handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle(Arc::downgrade(&self.0))
    }

    /// Address used as a visited-set key during traversals.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl<T: Clone> Handle<T> {
    /// A new handle holding a copy of the current value.
    ///
    /// Nested references inside the copy still point at the original handles.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::new(self.read().clone())
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Entity> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(guard) => write!(f, "Handle({} '{}')", guard.entity_type(), guard.name()),
            None => f.write_str("Handle(<locked>)"),
        }
    }
}

/// A non-owning back-reference.
///
/// Back-references (process → output material, material → measurements) are
/// derived from the owning references and never serialized.
pub struct WeakHandle<T>(Weak<RwLock<T>>);

impl<T> WeakHandle<T> {
    /// Recover the handle if the entity is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.0.upgrade().map(Handle)
    }

    /// Check whether this back-reference points at `handle`.
    #[must_use]
    pub fn points_to(&self, handle: &Handle<T>) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&handle.0))
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<T> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakHandle(..)")
    }
}

/// Push a back-reference unless one to the same handle is already present.
pub(crate) fn push_back_reference<T>(list: &mut Vec<WeakHandle<T>>, handle: &Handle<T>) {
    list.retain(|weak| weak.upgrade().is_some());
    if !list.iter().any(|weak| weak.points_to(handle)) {
        list.push(handle.downgrade());
    }
}

// =============================================================================
// REF
// =============================================================================

/// A reference field: resolved object or unresolved link stub.
pub enum Ref<T> {
    /// Not yet resolved; kept as the stub read from disk.
    Link(LinkByUid),
    /// Resolved to a live entity.
    Object(Handle<T>),
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        match self {
            Ref::Link(link) => Ref::Link(link.clone()),
            Ref::Object(handle) => Ref::Object(handle.clone()),
        }
    }
}

impl<T> From<Handle<T>> for Ref<T> {
    fn from(handle: Handle<T>) -> Self {
        Ref::Object(handle)
    }
}

impl<T> From<&Handle<T>> for Ref<T> {
    fn from(handle: &Handle<T>) -> Self {
        Ref::Object(handle.clone())
    }
}

impl<T: Entity> Ref<T> {
    /// The resolved handle, if any.
    #[must_use]
    pub fn object(&self) -> Option<&Handle<T>> {
        match self {
            Ref::Object(handle) => Some(handle),
            Ref::Link(_) => None,
        }
    }

    /// Identity check against a handle.
    #[must_use]
    pub fn points_to(&self, handle: &Handle<T>) -> bool {
        self.object().is_some_and(|own| Handle::ptr_eq(own, handle))
    }

    /// The link stub this reference serializes to.
    ///
    /// Resolved references link through the `auto` scope when present,
    /// otherwise through the first uid in scope order.
    #[must_use]
    pub fn link(&self) -> Option<LinkByUid> {
        match self {
            Ref::Link(link) => Some(link.clone()),
            Ref::Object(handle) => link_of(&*handle.read()),
        }
    }

    /// Replace a link stub by the indexed entity it names, if present.
    pub(crate) fn resolve(&mut self, index: &EntityIndex) {
        let resolved = match self {
            Ref::Link(link) => index.get::<T>(link),
            Ref::Object(_) => None,
        };
        if let Some(handle) = resolved {
            *self = Ref::Object(handle);
        }
    }
}

/// The preferred link stub of an entity value.
pub(crate) fn link_of<T: Entity>(entity: &T) -> Option<LinkByUid> {
    let uids = entity.uids();
    uids.get(AUTO_SCOPE)
        .map(|id| (AUTO_SCOPE, id))
        .or_else(|| uids.iter().next().map(|(scope, id)| (scope.as_str(), id)))
        .map(|(scope, id)| LinkByUid::new(entity.entity_type(), scope, id.clone()))
}

impl<T: Entity> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Link(link) => write!(f, "Link({} {}:{})", link.entity_type, link.scope, link.id),
            Ref::Object(handle) => handle.fmt(f),
        }
    }
}

impl<T: Entity> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let link = self
            .link()
            .ok_or_else(|| S::Error::custom("referenced entity has no uid to link by"))?;
        link.serialize(serializer)
    }
}

impl<'de, T: Entity> Deserialize<'de> for Ref<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if LinkByUid::is_link_value(&value) {
            serde_json::from_value(value)
                .map(Ref::Link)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value::<T>(value)
                .map(|entity| Ref::Object(Handle::new(entity)))
                .map_err(D::Error::custom)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MaterialSpec;
    use crate::types::EntityType;

    #[test]
    fn ptr_eq_distinguishes_equal_values() {
        let a = Handle::new(MaterialSpec::new("M"));
        let b = Handle::new(MaterialSpec::new("M"));
        let a2 = a.clone();

        assert!(Handle::ptr_eq(&a, &a2));
        assert!(!Handle::ptr_eq(&a, &b));
    }

    #[test]
    fn weak_handle_points_to_origin() {
        let a = Handle::new(MaterialSpec::new("M"));
        let weak = a.downgrade();
        assert!(weak.points_to(&a));
        assert!(weak.upgrade().is_some());
    }

    #[test]
    fn push_back_reference_deduplicates() {
        let a = Handle::new(MaterialSpec::new("M"));
        let mut list = Vec::new();
        push_back_reference(&mut list, &a);
        push_back_reference(&mut list, &a);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn object_ref_serializes_as_auto_link() {
        let mut spec = MaterialSpec::new("M");
        spec.uids.insert("auto".into(), "abc".into());
        let r: Ref<MaterialSpec> = Handle::new(spec).into();

        let json = serde_json::to_value(&r).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"type": "material_spec", "id": "abc", "scope": "auto"})
        );
    }

    #[test]
    fn object_ref_without_uid_fails_to_serialize() {
        let r: Ref<MaterialSpec> = Handle::new(MaterialSpec::new("M")).into();
        assert!(serde_json::to_value(&r).is_err());
    }

    #[test]
    fn deserialize_link_or_inline() {
        let link: Ref<MaterialSpec> = serde_json::from_value(
            serde_json::json!({"type": "material_spec", "id": "abc", "scope": "auto"}),
        )
        .expect("link");
        assert!(matches!(link, Ref::Link(ref l) if l.entity_type == EntityType::MaterialSpec));

        let inline: Ref<MaterialSpec> =
            serde_json::from_value(serde_json::json!({"name": "Inline", "uids": {"auto": "x"}}))
                .expect("inline");
        let handle = inline.object().expect("object");
        assert_eq!(handle.read().name, "Inline");
    }
}
