//! # Automation
//!
//! File-driven graph building: user rules match files dropped into a
//! watched folder and emit elements, which are written to the gemd folder.

pub mod engine;
pub mod rule;
pub mod watcher;

pub use engine::RuleEngine;
pub use rule::{
    ActionContext, ActionFn, AutomatableComponent, AutomatableComponentTree, FileIdPattern,
    RuleFn, glob_rule, suffix_rule,
};
pub use watcher::{FolderWatcher, WatchOptions};
