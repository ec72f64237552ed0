//! # Version Record
//!
//! Committed batches are identified by semver-shaped tags. The history of
//! commits lives under one reserved key as a flat, comma-joined list of
//! `tag,user,commitTimeMillis` triples in append order:
//!
//! ```text
//! 0.0.1,alice,1700000000000,0.0.2,bob,1700000005000
//! ```
//!
//! ## Rules
//!
//! - A tag must match `MAJOR.MINOR.PATCH` with no leading zeros.
//! - A tag may appear at most once in the history.
//! - When no tag is requested, the next one is the patch bump of the most
//!   recently appended tag (or `0.0.1` for an empty history), bumped further
//!   while it collides with an existing tag.
//!
//! Tags are unique but not ordered: `2.0.0` may be followed by `1.5.0`.

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::VERSION_RECORD_KEY;
use crate::storage::Storage;

/// Grammar every version tag must match.
pub const TAG_PATTERN: &str = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)$";

/// Tag given to the first commit.
pub const INITIAL_TAG: &str = "0.0.1";

const RECORD_SEPARATOR: char = ',';

/// One committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub tag: String,
    pub user: String,
    pub commit_time_ms: u64,
}

/// The ordered list of committed versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHistory {
    entries: Vec<VersionInfo>,
}

impl VersionHistory {
    /// Decode a stored record.
    pub fn parse(record: &str) -> Result<Self> {
        if record.trim().is_empty() {
            return Ok(Self::default());
        }

        let fields: Vec<&str> = record.split(RECORD_SEPARATOR).collect();
        if fields.len() % 3 != 0 {
            return Err(Error::VersionRecord {
                message: format!("{} fields is not a whole number of entries", fields.len()),
            });
        }

        let entries = fields
            .chunks(3)
            .map(|entry| {
                let commit_time_ms = entry[2].parse().map_err(|_| Error::VersionRecord {
                    message: format!("bad commit time '{}' for {}", entry[2], entry[0]),
                })?;
                Ok(VersionInfo {
                    tag: entry[0].to_string(),
                    user: entry[1].to_string(),
                    commit_time_ms,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Read the history from storage; `None` when no record exists yet.
    pub fn read(store: &dyn Storage) -> Result<Option<Self>> {
        match store.get(VERSION_RECORD_KEY)? {
            None => Ok(None),
            Some(bytes) => {
                let record = String::from_utf8(bytes).map_err(|e| Error::VersionRecord {
                    message: e.to_string(),
                })?;
                Self::parse(&record).map(Some)
            }
        }
    }

    /// Encode for storage.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{},{},{}", e.tag, e.user, e.commit_time_ms))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn entries(&self) -> &[VersionInfo] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    /// The most recently appended entry.
    pub fn latest(&self) -> Option<&VersionInfo> {
        self.entries.last()
    }

    pub fn push(&mut self, info: VersionInfo) {
        self.entries.push(info);
    }

    /// The tag an automatic commit would receive.
    pub fn next_tag(&self) -> Result<String> {
        let Some(latest) = self.latest() else {
            return Ok(INITIAL_TAG.to_string());
        };

        let mut next = Version::parse(&latest.tag)?;
        loop {
            next.patch = next.patch.checked_add(1).ok_or_else(|| Error::VersionRecord {
                message: format!("patch number of {} cannot be incremented", latest.tag),
            })?;
            let tag = next.to_string();
            if !self.contains(&tag) {
                return Ok(tag);
            }
        }
    }
}

/// Compiled tag grammar.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    grammar: Regex,
}

impl TagPolicy {
    pub fn new() -> Result<Self> {
        Ok(Self {
            grammar: Regex::new(TAG_PATTERN)?,
        })
    }

    /// Reject tags that do not match [`TAG_PATTERN`].
    pub fn check(&self, tag: &str) -> Result<()> {
        if self.grammar.is_match(tag) {
            Ok(())
        } else {
            Err(Error::validation(
                "version",
                format!("'{}' does not match MAJOR.MINOR.PATCH", tag),
            ))
        }
    }

    /// Whether `name` has the shape of a version tag.
    pub fn is_tag(&self, name: &str) -> bool {
        self.grammar.is_match(name)
    }

    /// Decide the tag of a new commit.
    ///
    /// A requested tag must be well-formed and unused; without one the next
    /// automatic tag is computed from `history`.
    pub fn resolve(&self, history: &VersionHistory, requested: Option<&str>) -> Result<String> {
        match requested {
            Some(tag) => {
                self.check(tag)?;
                if history.contains(tag) {
                    return Err(Error::RepeatedVersion {
                        tag: tag.to_string(),
                    });
                }
                Ok(tag.to_string())
            }
            None => history.next_tag(),
        }
    }
}
