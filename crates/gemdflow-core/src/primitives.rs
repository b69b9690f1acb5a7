//! # Innate Primitives
//!
//! Fixed constants shared by the stores, the encoder and the rule engine.
//!
//! These values are part of the on-disk contract: changing a folder name or a
//! registry header orphans every store written by an earlier build.

/// The canonical in-memory uid scope.
///
/// Every entity written through thin mode carries a uid under this scope.
pub const AUTO_SCOPE: &str = "auto";

/// The on-disk row-number scope.
///
/// Assigned by the stores when a template or spec is registered.
pub const PERSISTENT_ID_SCOPE: &str = "persistent_id";

/// Scopes that callers may never pre-populate on a template.
pub const RESERVED_SCOPES: [&str; 2] = [AUTO_SCOPE, PERSISTENT_ID_SCOPE];

/// Separator between the segments of a hierarchical tag.
pub const TAG_SEPARATOR: &str = "::";

/// Registry file for interned templates.
pub const TEMPLATE_REGISTRY_FILE: &str = "template_registry.csv";

/// Registry file for interned specs.
pub const SPEC_REGISTRY_FILE: &str = "spec_registry.csv";

/// Header row shared by both registries.
pub const REGISTRY_HEADER: &str = "persistent_id,name,type";

/// Per-variant template subfolders under a store root.
pub const TEMPLATE_FOLDERS: [&str; 6] = [
    "property_templates",
    "condition_templates",
    "parameter_templates",
    "material_templates",
    "measurement_templates",
    "process_templates",
];

/// Per-variant spec subfolders under a store root.
pub const SPEC_FOLDERS: [&str; 4] = [
    "material_specs",
    "process_specs",
    "ingredient_specs",
    "measurement_specs",
];

/// Maximum number of simple cycles the graph builder reports.
///
/// Cycle enumeration is exponential in the worst case; the report is a
/// diagnostic, so it is truncated rather than unbounded.
pub const MAX_REPORTED_CYCLES: usize = 100;

/// Maximum traversal depth when tracking the neighbourhood of one uid.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// How long the watcher thread blocks on its event channel before
/// re-checking the stop flag, in milliseconds.
pub const WATCH_POLL_INTERVAL_MS: u64 = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_scopes_cover_auto_and_persistent_id() {
        assert!(RESERVED_SCOPES.contains(&AUTO_SCOPE));
        assert!(RESERVED_SCOPES.contains(&PERSISTENT_ID_SCOPE));
    }

    #[test]
    fn registry_header_has_three_columns() {
        assert_eq!(REGISTRY_HEADER.split(',').count(), 3);
    }
}
