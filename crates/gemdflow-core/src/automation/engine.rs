//! The rule engine: match incoming files against registered components and
//! write what their actions produce to the gemd folder.

use crate::automation::rule::{ActionContext, AutomatableComponent, AutomatableComponentTree};
use crate::element::Element;
use crate::encoder::thin_documents;
use crate::store::{Provenance, StoresConfig, sanitize};
use crate::types::GemdError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Ordered components plus the per-file-id record of what fired.
#[derive(Debug)]
pub struct RuleEngine {
    files_folder: PathBuf,
    gemd_folder: PathBuf,
    stores: StoresConfig,
    components: Vec<AutomatableComponent>,
    trees: BTreeMap<String, AutomatableComponentTree>,
    /// Handled paths with the modification time they had when handled.
    processed: HashMap<PathBuf, Option<SystemTime>>,
    intern_specs: bool,
}

impl RuleEngine {
    /// Create both folders if needed. Paths are canonicalized so replayed
    /// and live paths compare equal.
    pub fn new(
        files_folder: impl AsRef<Path>,
        gemd_folder: impl AsRef<Path>,
        stores: StoresConfig,
    ) -> Result<Self, GemdError> {
        Ok(Self {
            files_folder: prepare_folder(files_folder.as_ref())?,
            gemd_folder: prepare_folder(gemd_folder.as_ref())?,
            stores,
            components: Vec::new(),
            trees: BTreeMap::new(),
            processed: HashMap::new(),
            intern_specs: false,
        })
    }

    /// Replace each element's spec by the designated spec store's unique
    /// version before writing.
    #[must_use]
    pub fn with_spec_interning(mut self, enabled: bool) -> Self {
        self.intern_specs = enabled;
        self
    }

    /// Append a component. Its schema templates are interned first so that
    /// actions build on the canonical templates.
    pub fn register(&mut self, mut component: AutomatableComponent) -> Result<(), GemdError> {
        if self.components.iter().any(|c| c.name() == component.name()) {
            return Err(GemdError::DuplicateName {
                collection: "rules".to_string(),
                name: component.name().to_string(),
            });
        }
        for template in component.schema_mut() {
            *template = self.stores.intern_template(template, Provenance::subclass())?;
        }
        info!(component = %component.name(), "Registered rule");
        self.components.push(component);
        Ok(())
    }

    #[must_use]
    pub fn components(&self) -> &[AutomatableComponent] {
        &self.components
    }

    #[must_use]
    pub fn trees(&self) -> &BTreeMap<String, AutomatableComponentTree> {
        &self.trees
    }

    #[must_use]
    pub fn files_folder(&self) -> &Path {
        &self.files_folder
    }

    #[must_use]
    pub fn gemd_folder(&self) -> &Path {
        &self.gemd_folder
    }

    #[must_use]
    pub fn stores(&self) -> &StoresConfig {
        &self.stores
    }

    #[must_use]
    pub fn is_processed(&self, path: &Path) -> bool {
        self.processed.contains_key(path)
    }

    /// Drop the record of a handled path, so that a file created again under
    /// the same name fires its rule again. Returns whether it was recorded.
    pub fn forget(&mut self, path: &Path) -> bool {
        self.processed.remove(path).is_some()
    }

    /// Handle a new file or folder under the files folder.
    ///
    /// The first component whose rule accepts the name fires. Returns the
    /// files written, in the order the action yielded its elements. A path
    /// already handled with the same modification time is skipped.
    pub fn handle_files_path(&mut self, path: &Path) -> Result<Vec<PathBuf>, GemdError> {
        let modified = modified_time(path);
        if self.processed.get(path) == Some(&modified) {
            debug!(file = %path.display(), "Already handled");
            return Ok(Vec::new());
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };

        let Some(index) = self.components.iter().position(|c| c.applies_to(filename)) else {
            info!(file = %filename, "No rule matched");
            self.processed.insert(path.to_path_buf(), modified);
            return Ok(Vec::new());
        };
        let component = &self.components[index];
        let file_id = component
            .file_id()
            .extract(filename, path)
            .unwrap_or_else(|| filename.to_string());
        self.trees
            .entry(file_id.clone())
            .or_insert_with(|| AutomatableComponentTree::new(file_id.clone()))
            .record(filename, component.name());

        let context = ActionContext {
            filename,
            path,
            file_id: &file_id,
            component,
            stores: &self.stores,
        };
        let mut elements = component.act(&context).map_err(|e| {
            error!(component = %component.name(), file = %filename, error = %e, "Rule action failed");
            GemdError::RuleApplicationFailed {
                component: component.name().to_string(),
                file: filename.to_string(),
                reason: e.to_string(),
            }
        })?;
        info!(
            component = %component.name(),
            file = %filename,
            file_id = %file_id,
            elements = elements.len(),
            "Rule fired"
        );

        let mut written = Vec::new();
        for element in &mut elements {
            if self.intern_specs {
                element.intern_spec()?;
            }
            written.extend(self.write_element(element)?);
        }
        self.processed.insert(path.to_path_buf(), modified);
        Ok(written)
    }

    /// New documents in the gemd folder are left to downstream consumers.
    pub fn handle_gemd_path(&self, path: &Path) {
        debug!(file = %path.display(), "New gemd document");
    }

    /// Feed every existing file and folder under the files folder through
    /// [`RuleEngine::handle_files_path`], in sorted walk order.
    pub fn replay(&mut self) -> Result<Vec<PathBuf>, GemdError> {
        let mut written = Vec::new();
        let entries: Vec<PathBuf> = WalkDir::new(&self.files_folder)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(walkdir::DirEntry::into_path)
            .collect();
        info!(folder = %self.files_folder.display(), entries = entries.len(), "Replaying");
        for path in entries {
            written.extend(self.handle_files_path(&path)?);
        }
        Ok(written)
    }

    /// Thin documents of the element and everything it reaches, one file
    /// per entity named `<name>_<type>.json`.
    fn write_element(&self, element: &Element) -> Result<Vec<PathBuf>, GemdError> {
        let mut written = Vec::new();
        for (entity, value) in thin_documents(&element.entities())? {
            let file = self.gemd_folder.join(format!(
                "{}_{}.json",
                sanitize(&entity.name()),
                entity.entity_type()
            ));
            let text = serde_json::to_string_pretty(&value)
                .map_err(|e| GemdError::SerializationError(e.to_string()))?;
            std::fs::write(&file, text)
                .map_err(|e| GemdError::IoError(format!("{}: {}", file.display(), e)))?;
            debug!(file = %file.display(), "Wrote document");
            written.push(file);
        }
        Ok(written)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn prepare_folder(folder: &Path) -> Result<PathBuf, GemdError> {
    std::fs::create_dir_all(folder)
        .map_err(|e| GemdError::IoError(format!("{}: {}", folder.display(), e)))?;
    std::fs::canonicalize(folder)
        .map_err(|e| GemdError::IoError(format!("{}: {}", folder.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::rule::{FileIdPattern, glob_rule, suffix_rule};
    use crate::element::Material;
    use crate::model::MaterialTemplate;
    use crate::model::Handle;
    use std::time::Duration;
    use tempfile::TempDir;

    fn alloy_rule() -> AutomatableComponent {
        AutomatableComponent::new(
            "alloy",
            glob_rule("*.txt").expect("glob"),
            FileIdPattern::new(r"\d+", false).expect("pattern"),
            |ctx| {
                let template = ctx
                    .component
                    .schema_template::<MaterialTemplate>("Alloy")
                    .ok_or_else(|| GemdError::MissingTemplate("Alloy".into()))?;
                let material = Material::new(format!("{} Alloy", ctx.file_id), &template, ctx.stores)?;
                Ok(vec![material.into()])
            },
        )
        .with_schema(Handle::new(MaterialTemplate::new("Alloy")))
    }

    #[test]
    fn first_matching_rule_writes_thin_documents() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine.register(alloy_rule()).expect("register");

        let input = engine.files_folder().join("sample42.txt");
        std::fs::write(&input, "hv=7.5").expect("write");
        let written = engine.handle_files_path(&input).expect("handle");

        assert_eq!(
            written[0].file_name().and_then(|n| n.to_str()),
            Some("42 Alloy_material_run.json")
        );
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).expect("read")).expect("json");
        assert_eq!(doc["name"], "42 Alloy");
        assert!(engine.trees().contains_key("42"));

        assert!(engine.handle_files_path(&input).expect("again").is_empty());
    }

    #[test]
    fn recreated_file_fires_again() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine.register(alloy_rule()).expect("register");

        let input = engine.files_folder().join("sample42.txt");
        std::fs::write(&input, "hv=7.5").expect("write");
        let first = engine.handle_files_path(&input).expect("first");
        assert_eq!(first.len(), 3);

        std::fs::remove_file(&input).expect("remove input");
        for file in &first {
            std::fs::remove_file(file).expect("remove output");
        }
        std::fs::write(&input, "hv=7.9").expect("rewrite");
        std::fs::File::options()
            .write(true)
            .open(&input)
            .expect("open")
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .expect("touch");

        let second = engine.handle_files_path(&input).expect("second");
        assert_eq!(second.len(), first.len());
        assert!(second.iter().all(|file| file.is_file()));
        assert_eq!(engine.trees().get("42").map(|t| t.edges().len()), Some(1));
    }

    #[test]
    fn forgotten_path_is_handled_again() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine.register(alloy_rule()).expect("register");

        let input = engine.files_folder().join("sample7.txt");
        std::fs::write(&input, "").expect("write");
        assert!(!engine.handle_files_path(&input).expect("first").is_empty());
        assert!(engine.handle_files_path(&input).expect("unchanged").is_empty());

        assert!(engine.forget(&input));
        assert!(!engine.is_processed(&input));
        assert!(!engine.handle_files_path(&input).expect("again").is_empty());
        assert!(!engine.forget(&engine.files_folder().join("never_seen.txt")));
    }

    #[test]
    fn unmatched_files_are_skipped() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine.register(alloy_rule()).expect("register");

        let input = engine.files_folder().join("notes.md");
        std::fs::write(&input, "").expect("write");
        assert!(engine.handle_files_path(&input).expect("handle").is_empty());
        assert!(engine.trees().is_empty());
    }

    #[test]
    fn failing_action_is_reported() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine
            .register(AutomatableComponent::new(
                "broken",
                suffix_rule(".csv"),
                FileIdPattern::new(r"\w+", false).expect("pattern"),
                |_| Err(GemdError::MissingTemplate("Scan".into())),
            ))
            .expect("register");

        let input = engine.files_folder().join("scan.csv");
        std::fs::write(&input, "").expect("write");
        let err = engine.handle_files_path(&input).expect_err("failure");
        assert!(matches!(err, GemdError::RuleApplicationFailed { component, .. } if component == "broken"));
    }

    #[test]
    fn duplicate_rule_names_are_rejected() {
        let files = TempDir::new().expect("files");
        let gemd = TempDir::new().expect("gemd");
        let mut engine =
            RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
        engine.register(alloy_rule()).expect("first");
        assert!(matches!(
            engine.register(alloy_rule()),
            Err(GemdError::DuplicateName { .. })
        ));
    }
}
