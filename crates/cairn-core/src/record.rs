//! The polymorphic agent record model.
//!
//! A [`Record`] is a tagged union over the supported schema variants. Each
//! variant carries its own payload struct; the [`RecordData`] trait exposes
//! the common read-only projection so callers never need to match on the
//! variant to read names, skills or locators.
//!
//! Variant identity participates in the canonical form through the payload's
//! `schema_version` field, so two records with identical projections under
//! different variants hash to different CIDs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Schema tag for the first supported variant.
pub const SCHEMA_VERSION_V1: &str = "v1alpha1";
/// Schema tag for the second supported variant.
pub const SCHEMA_VERSION_V2: &str = "v1alpha2";
/// Schema tag for the third supported variant.
pub const SCHEMA_VERSION_V3: &str = "v1alpha3";

/// A parsed schema version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// `v1alpha1` (also accepted as `v1`).
    V1Alpha1,
    /// `v1alpha2` (also accepted as `v2`).
    V1Alpha2,
    /// `v1alpha3` (also accepted as `v3`).
    V1Alpha3,
}

impl SchemaVersion {
    /// Parses a schema version tag.
    ///
    /// Accepts both the full `v1alphaN` form and the short `vN` alias used
    /// by older producers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedVersion`] for any other tag.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "v1" | SCHEMA_VERSION_V1 => Ok(Self::V1Alpha1),
            "v2" | SCHEMA_VERSION_V2 => Ok(Self::V1Alpha2),
            "v3" | SCHEMA_VERSION_V3 => Ok(Self::V1Alpha3),
            other => Err(Error::UnsupportedVersion {
                version: other.to_string(),
            }),
        }
    }

    /// Returns the canonical tag string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1Alpha1 => SCHEMA_VERSION_V1,
            Self::V1Alpha2 => SCHEMA_VERSION_V2,
            Self::V1Alpha3 => SCHEMA_VERSION_V3,
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// A skill entry describing one capability of the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Skill taxonomy category (e.g. `natural-language`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category_name: String,
    /// Skill taxonomy class within the category.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    /// Numeric taxonomy identifier, when assigned.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,
    /// Free-form skill name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Skill {
    /// Creates a skill from a category/class pair.
    #[must_use]
    pub fn new(category_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            category_name: category_name.into(),
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    /// Returns the display name for discovery: the free-form name when set,
    /// otherwise `category/class`.
    #[must_use]
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match (self.category_name.is_empty(), self.class_name.is_empty()) {
            (false, false) => format!("{}/{}", self.category_name, self.class_name),
            (false, true) => self.category_name.clone(),
            (true, false) => self.class_name.clone(),
            (true, true) => String::new(),
        }
    }
}

/// An extension entry attaching structured data to the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Extension name (e.g. `features/runtime`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Extension version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Opaque extension payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A locator entry pointing at a deployable artifact of the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Locator type (e.g. `docker-image`, `helm-chart`).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub locator_type: String,
    /// Artifact URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl Locator {
    /// Creates a locator from a type/url pair.
    #[must_use]
    pub fn new(locator_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            locator_type: locator_type.into(),
            url: url.into(),
        }
    }
}

macro_rules! agent_builder_methods {
    () => {
        /// Appends a skill.
        #[must_use]
        pub fn with_skill(mut self, skill: Skill) -> Self {
            self.skills.push(skill);
            self
        }

        /// Appends an extension.
        #[must_use]
        pub fn with_extension(mut self, extension: Extension) -> Self {
            self.extensions.push(extension);
            self
        }

        /// Appends a locator.
        #[must_use]
        pub fn with_locator(mut self, locator: Locator) -> Self {
            self.locators.push(locator);
            self
        }

        /// Sets an annotation.
        #[must_use]
        pub fn with_annotation(
            mut self,
            key: impl Into<String>,
            value: impl Into<String>,
        ) -> Self {
            self.annotations.insert(key.into(), value.into());
            self
        }
    };
}

/// Payload of the `v1alpha1` variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentV1 {
    /// Schema tag; always `v1alpha1` for records built via [`AgentV1::new`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Agent name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Record authors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Skills, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
    /// Extensions, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
    /// Locators, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locators: Vec<Locator>,
    /// Free-form annotations; keys are unique and case-sensitive.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optional detached signature over the canonical bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AgentV1 {
    /// Creates a `v1alpha1` payload with the schema tag pre-filled.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    agent_builder_methods!();
}

/// Payload of the `v1alpha2` variant.
///
/// Relative to `v1alpha1` it drops the author list and records the creation
/// timestamp inside the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentV2 {
    /// Schema tag; always `v1alpha2` for records built via [`AgentV2::new`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Agent name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// RFC 3339 creation timestamp.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    /// Skills, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
    /// Extensions, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
    /// Locators, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locators: Vec<Locator>,
    /// Free-form annotations; keys are unique and case-sensitive.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optional detached signature over the canonical bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AgentV2 {
    /// Creates a `v1alpha2` payload with the schema tag pre-filled.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V2.to_string(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    agent_builder_methods!();
}

/// Payload of the `v1alpha3` variant.
///
/// Relative to `v1alpha2` it links back to the previous record revision by
/// CID, enabling lineage walks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentV3 {
    /// Schema tag; always `v1alpha3` for records built via [`AgentV3::new`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Agent name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// RFC 3339 creation timestamp.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    /// CID of the previous revision, when this record supersedes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_record_cid: Option<String>,
    /// Skills, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
    /// Extensions, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
    /// Locators, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locators: Vec<Locator>,
    /// Free-form annotations; keys are unique and case-sensitive.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optional detached signature over the canonical bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AgentV3 {
    /// Creates a `v1alpha3` payload with the schema tag pre-filled.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V3.to_string(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    agent_builder_methods!();
}

/// Common read-only projection over all record variants.
pub trait RecordData {
    /// The payload's schema tag as written.
    fn schema_version(&self) -> &str;
    /// Agent name.
    fn name(&self) -> &str;
    /// Agent version.
    fn version(&self) -> &str;
    /// Skills in declaration order.
    fn skills(&self) -> &[Skill];
    /// Extensions in declaration order.
    fn extensions(&self) -> &[Extension];
    /// Locators in declaration order.
    fn locators(&self) -> &[Locator];
    /// Annotations map.
    fn annotations(&self) -> &BTreeMap<String, String>;
    /// Detached signature, when present.
    fn signature(&self) -> Option<&str>;
}

macro_rules! impl_record_data {
    ($ty:ty) => {
        impl RecordData for $ty {
            fn schema_version(&self) -> &str {
                &self.schema_version
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn version(&self) -> &str {
                &self.version
            }
            fn skills(&self) -> &[Skill] {
                &self.skills
            }
            fn extensions(&self) -> &[Extension] {
                &self.extensions
            }
            fn locators(&self) -> &[Locator] {
                &self.locators
            }
            fn annotations(&self) -> &BTreeMap<String, String> {
                &self.annotations
            }
            fn signature(&self) -> Option<&str> {
                self.signature.as_deref()
            }
        }
    };
}

impl_record_data!(AgentV1);
impl_record_data!(AgentV2);
impl_record_data!(AgentV3);

/// A versioned agent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `v1alpha1` payload.
    V1(AgentV1),
    /// `v1alpha2` payload.
    V2(AgentV2),
    /// `v1alpha3` payload.
    V3(AgentV3),
}

impl Record {
    /// Returns the variant's schema version.
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            Self::V1(_) => SchemaVersion::V1Alpha1,
            Self::V2(_) => SchemaVersion::V1Alpha2,
            Self::V3(_) => SchemaVersion::V1Alpha3,
        }
    }

    /// Returns the common read-only projection.
    #[must_use]
    pub fn data(&self) -> &dyn RecordData {
        match self {
            Self::V1(a) => a,
            Self::V2(a) => a,
            Self::V3(a) => a,
        }
    }
}

impl From<AgentV1> for Record {
    fn from(agent: AgentV1) -> Self {
        Self::V1(agent)
    }
}

impl From<AgentV2> for Record {
    fn from(agent: AgentV2) -> Self {
        Self::V2(agent)
    }
}

impl From<AgentV3> for Record {
    fn from(agent: AgentV3) -> Self {
        Self::V3(agent)
    }
}

/// A reference to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// The record's content identifier.
    pub cid: String,
}

impl RecordRef {
    /// Creates a reference from any CID-shaped string.
    #[must_use]
    pub fn new(cid: impl Into<String>) -> Self {
        Self { cid: cid.into() }
    }
}

/// Metadata about a stored record, served by lookup without a layer fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// The record's content identifier.
    pub cid: String,
    /// Canonical payload size in bytes.
    pub size_bytes: u64,
    /// When the record was first pushed.
    pub created_at: DateTime<Utc>,
    /// Annotations copied from the record.
    pub annotations: BTreeMap<String, String>,
    /// Labels derived from the record's metadata.
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_parses_short_and_long_forms() {
        assert_eq!(SchemaVersion::parse("v1").unwrap(), SchemaVersion::V1Alpha1);
        assert_eq!(
            SchemaVersion::parse("v1alpha1").unwrap(),
            SchemaVersion::V1Alpha1
        );
        assert_eq!(SchemaVersion::parse("v2").unwrap(), SchemaVersion::V1Alpha2);
        assert_eq!(
            SchemaVersion::parse("v1alpha3").unwrap(),
            SchemaVersion::V1Alpha3
        );
    }

    #[test]
    fn schema_version_rejects_unknown_tags() {
        let err = SchemaVersion::parse("v4").unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version } if version == "v4"));
    }

    #[test]
    fn projection_is_variant_agnostic() {
        let record: Record = AgentV2::new("translator", "2.1.0")
            .with_skill(Skill::new("natural-language", "translation"))
            .with_annotation("team", "lingua")
            .into();

        let data = record.data();
        assert_eq!(data.name(), "translator");
        assert_eq!(data.version(), "2.1.0");
        assert_eq!(data.skills().len(), 1);
        assert_eq!(data.annotations().get("team").unwrap(), "lingua");
        assert!(data.signature().is_none());
    }

    #[test]
    fn skill_display_name_prefers_explicit_name() {
        let named = Skill {
            name: "summarize".into(),
            ..Skill::new("nlp", "summarization")
        };
        assert_eq!(named.display_name(), "summarize");

        let pathed = Skill::new("nlp", "summarization");
        assert_eq!(pathed.display_name(), "nlp/summarization");

        assert_eq!(Skill::default().display_name(), "");
    }
}
