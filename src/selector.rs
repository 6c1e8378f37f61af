//! Selectors: typed attributes of an event's resource used for subscription
//! matching.
//!
//! A resource snapshot deterministically produces an ordered selector set.
//! Matching itself belongs to the subscription source; this module only
//! defines the vocabulary and the subset test it relies on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::{Build, Version};

/// The fixed selector vocabulary.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorType {
    Id,
    Project,
    Object,
    Requester,
    Owner,
    InVersion,
    DisplayName,
}

impl SelectorType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Project => "project",
            Self::Object => "object",
            Self::Requester => "requester",
            Self::Owner => "owner",
            Self::InVersion => "in-version",
            Self::DisplayName => "display-name",
        }
    }
}

impl fmt::Display for SelectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(type, value)` attribute of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selector {
    /// Attribute name.
    #[serde(rename = "type")]
    pub kind: SelectorType,
    /// Attribute value.
    pub data: String,
}

impl Selector {
    /// Pair a type with a value.
    #[must_use]
    pub fn new(kind: SelectorType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.data)
    }
}

/// Value of the `object` selector for versions.
pub const OBJECT_VERSION: &str = "version";
/// Value of the `object` selector for builds.
pub const OBJECT_BUILD: &str = "build";

/// Selectors for a version: id, project, object, requester, then owner if
/// the version has an author.
#[must_use]
pub fn version_selectors(v: &Version) -> Vec<Selector> {
    let mut selectors = vec![
        Selector::new(SelectorType::Id, v.id.as_str()),
        Selector::new(SelectorType::Project, v.identifier.as_str()),
        Selector::new(SelectorType::Object, OBJECT_VERSION),
        Selector::new(SelectorType::Requester, v.requester.as_str()),
    ];
    if !v.author_id.is_empty() {
        selectors.push(Selector::new(SelectorType::Owner, v.author_id.as_str()));
    }
    selectors
}

/// Selectors for a build: id, project, object, requester, in-version, and
/// display-name if set.
#[must_use]
pub fn build_selectors(b: &Build) -> Vec<Selector> {
    let mut selectors = vec![
        Selector::new(SelectorType::Id, b.id.as_str()),
        Selector::new(SelectorType::Project, b.project.as_str()),
        Selector::new(SelectorType::Object, OBJECT_BUILD),
        Selector::new(SelectorType::Requester, b.requester.as_str()),
        Selector::new(SelectorType::InVersion, b.version.as_str()),
    ];
    if !b.display_name.is_empty() {
        selectors.push(Selector::new(SelectorType::DisplayName, b.display_name.as_str()));
    }
    selectors
}

/// Subset test: every required selector appears in `available`.
///
/// An empty requirement list matches nothing; a subscription must constrain
/// at least one attribute.
#[must_use]
pub fn all_present(required: &[Selector], available: &[Selector]) -> bool {
    !required.is_empty() && required.iter().all(|r| available.contains(r))
}
