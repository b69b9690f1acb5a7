//! Hierarchical tags.
//!
//! Tags are stored flat, segments joined by `::`. `("a", "b", "c")` is
//! stored as `"a::b::c"`; reading a set of tags back yields a nested tree.

use crate::primitives::TAG_SEPARATOR;
use crate::types::GemdError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Nested view of a set of tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagTree(pub BTreeMap<String, TagTree>);

impl TagTree {
    #[must_use]
    pub fn get(&self, segment: &str) -> Option<&TagTree> {
        self.0.get(segment)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert_path<'a>(&mut self, segments: impl IntoIterator<Item = &'a str>) {
        let mut node = self;
        for segment in segments {
            node = node.0.entry(segment.to_string()).or_default();
        }
    }
}

/// Join segments into a stored tag. Empty paths, empty segments and
/// segments containing the separator are rejected.
pub fn join_tag<S: AsRef<str>>(segments: &[S]) -> Result<String, GemdError> {
    if segments.is_empty() {
        return Err(GemdError::InvalidTag("empty tag".to_string()));
    }
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() || segment.contains(TAG_SEPARATOR) {
            return Err(GemdError::InvalidTag(format!(
                "segment '{}' in {:?}",
                segment,
                segments.iter().map(AsRef::as_ref).collect::<Vec<_>>()
            )));
        }
    }
    Ok(segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(TAG_SEPARATOR))
}

/// Check a stored tag for empty segments.
pub fn validate_tag(tag: &str) -> Result<(), GemdError> {
    if tag.is_empty() || tag.split(TAG_SEPARATOR).any(str::is_empty) {
        return Err(GemdError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Build the nested view of `tags`.
#[must_use]
pub fn tag_tree<S: AsRef<str>>(tags: &[S]) -> TagTree {
    let mut tree = TagTree::default();
    for tag in tags {
        tree.insert_path(tag.as_ref().split(TAG_SEPARATOR));
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_uses_separator() {
        assert_eq!(join_tag(&["a", "b", "c"]).expect("join"), "a::b::c");
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(join_tag::<&str>(&[]).is_err());
        assert!(join_tag(&["a", ""]).is_err());
        assert!(join_tag(&["a::b"]).is_err());
        assert!(validate_tag("a::::b").is_err());
        assert!(validate_tag("a::b").is_ok());
    }

    #[test]
    fn tree_nests_shared_prefixes() {
        let tree = tag_tree(&["lab::furnace::A", "lab::furnace::B", "lab::press"]);
        let furnace = tree
            .get("lab")
            .and_then(|lab| lab.get("furnace"))
            .expect("furnace");
        assert_eq!(furnace.0.len(), 2);
        assert!(tree.get("lab").and_then(|lab| lab.get("press")).is_some_and(TagTree::is_empty));
    }
}
