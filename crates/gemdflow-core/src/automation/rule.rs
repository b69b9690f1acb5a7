//! Automatable components: a file predicate, a file-id pattern, the schema
//! templates an action expects, and the action itself.

use crate::element::Element;
use crate::model::{Entity, EntityRef, Handle};
use crate::store::StoresConfig;
use crate::types::GemdError;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Decides whether a component applies to a file name.
pub type RuleFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Produces elements for one matched file.
pub type ActionFn =
    Arc<dyn Fn(&ActionContext<'_>) -> Result<Vec<Element>, GemdError> + Send + Sync>;

/// Everything an action sees about the file that triggered it.
pub struct ActionContext<'a> {
    pub filename: &'a str,
    pub path: &'a Path,
    pub file_id: &'a str,
    pub component: &'a AutomatableComponent,
    pub stores: &'a StoresConfig,
}

// =============================================================================
// FILE ID
// =============================================================================

/// Extracts a stable id from a file name or its full path.
///
/// The first capture group is the id if the regex has one, else the whole
/// match.
#[derive(Debug, Clone)]
pub struct FileIdPattern {
    regex: Regex,
    from_path: bool,
}

impl FileIdPattern {
    pub fn new(pattern: &str, from_path: bool) -> Result<Self, GemdError> {
        let regex = Regex::new(pattern)
            .map_err(|e| GemdError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self { regex, from_path })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn from_path(&self) -> bool {
        self.from_path
    }

    #[must_use]
    pub fn extract(&self, filename: &str, path: &Path) -> Option<String> {
        let path_text = path.to_string_lossy();
        let haystack: &str = if self.from_path { &path_text } else { filename };
        let captures = self.regex.captures(haystack)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}

// =============================================================================
// RULE PREDICATES
// =============================================================================

/// Matches file names ending in `suffix`.
#[must_use]
pub fn suffix_rule(suffix: &str) -> RuleFn {
    let suffix = suffix.to_string();
    Arc::new(move |filename: &str| filename.ends_with(&suffix))
}

/// Matches whole file names against a pattern where `*` is any run of
/// characters and `?` any one character.
pub fn glob_rule(pattern: &str) -> Result<RuleFn, GemdError> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    let regex = Regex::new(&source)
        .map_err(|e| GemdError::InvalidPattern(format!("{}: {}", pattern, e)))?;
    Ok(Arc::new(move |filename: &str| regex.is_match(filename)))
}

// =============================================================================
// COMPONENT
// =============================================================================

/// A registered rule.
#[derive(Clone)]
pub struct AutomatableComponent {
    name: String,
    rule: RuleFn,
    file_id: FileIdPattern,
    schema: Vec<EntityRef>,
    action: ActionFn,
}

impl AutomatableComponent {
    pub fn new(
        name: impl Into<String>,
        rule: RuleFn,
        file_id: FileIdPattern,
        action: impl Fn(&ActionContext<'_>) -> Result<Vec<Element>, GemdError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            rule,
            file_id,
            schema: Vec::new(),
            action: Arc::new(action),
        }
    }

    /// Declare a template the action expects.
    #[must_use]
    pub fn with_schema(mut self, template: impl Into<EntityRef>) -> Self {
        self.schema.push(template.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn file_id(&self) -> &FileIdPattern {
        &self.file_id
    }

    #[must_use]
    pub fn schema(&self) -> &[EntityRef] {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut Vec<EntityRef> {
        &mut self.schema
    }

    /// The schema template of type `T` named `name`.
    #[must_use]
    pub fn schema_template<T: Entity>(&self, name: &str) -> Option<Handle<T>> {
        self.schema
            .iter()
            .filter(|t| t.name() == name)
            .find_map(EntityRef::downcast::<T>)
    }

    #[must_use]
    pub fn applies_to(&self, filename: &str) -> bool {
        (self.rule)(filename)
    }

    pub(crate) fn act(&self, context: &ActionContext<'_>) -> Result<Vec<Element>, GemdError> {
        (self.action)(context)
    }
}

impl fmt::Debug for AutomatableComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomatableComponent")
            .field("name", &self.name)
            .field("file_id", &self.file_id.pattern())
            .field("schema", &self.schema.iter().map(EntityRef::name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// COMPONENT TREE
// =============================================================================

/// For one file id, which components fired for which file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomatableComponentTree {
    file_id: String,
    edges: Vec<(String, String)>,
}

impl AutomatableComponentTree {
    #[must_use]
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            edges: Vec::new(),
        }
    }

    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Record that `component` fired for `filename`.
    pub fn record(&mut self, filename: &str, component: &str) {
        let edge = (filename.to_string(), component.to_string());
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// `(filename, component)` pairs in the order they fired.
    #[must_use]
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    #[must_use]
    pub fn components(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|(_, c)| c.as_str()).collect()
    }
}
