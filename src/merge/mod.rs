//! Rebuilding JSON documents from flattened paths
//!
//! The [`crate::flatten`] module projects a document into dotted-path leaves.
//! This module goes the other way: it writes leaves back into a fresh JSON
//! document at their dotted paths, creating intermediate containers as it
//! goes. The deployment-info merger is built on top of it.
//!
//! ## Modules
//!
//! - [`json`] - navigation and path-set on `serde_json::Value`
//! - [`deployment`] - the deployment-info merger

pub mod deployment;
pub mod json;

/// Represents a segment in a dotted path
///
/// Paths like `deployment_info.0.hostname` are parsed into a sequence of
/// segments. All-digit segments become indices so that flattened arrays
/// rebuild as arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// A named key for accessing object members
    Key(String),
    /// A numeric index for accessing array elements
    Index(usize),
}

impl PathSegment {
    /// The segment as an object key, whatever its kind.
    pub fn as_key(&self) -> String {
        match self {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(idx) => idx.to_string(),
        }
    }
}

/// Parse a dotted path into segments
///
/// Empty segments (from leading, trailing or doubled dots) are dropped.
///
/// # Examples
///
/// ```
/// use conf_center::merge::{parse_path, PathSegment};
///
/// let segments = parse_path("deployment_info.0.hostname");
/// assert_eq!(segments[1], PathSegment::Index(0));
/// ```
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                match segment.parse::<usize>() {
                    Ok(idx) => PathSegment::Index(idx),
                    Err(_) => PathSegment::Key(segment.to_string()),
                }
            } else {
                PathSegment::Key(segment.to_string())
            }
        })
        .collect()
}
