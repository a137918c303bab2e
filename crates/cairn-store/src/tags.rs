//! Discovery tag planning.
//!
//! A pushed record gets a set of registry tags derived from its metadata so
//! that agents are discoverable by name, capability, infrastructure and
//! ownership, not only by CID. Tag generation is driven by a [`TagStrategy`]
//! and works from the flat metadata map that also feeds the manifest
//! annotations, so tags can be reconstructed from a stored manifest without
//! refetching the record.

use std::collections::{BTreeMap, BTreeSet};

use cairn_core::RecordData;

use crate::manifest::{
    ANNOTATION_EXTENSIONS, ANNOTATION_LOCATORS, ANNOTATION_NAME, ANNOTATION_ORGANIZATION,
    ANNOTATION_PROJECT, ANNOTATION_SKILLS, ANNOTATION_TEAM, ANNOTATION_VERSION,
};

/// Maximum byte length of a normalized tag.
const MAX_TAG_LEN: usize = 128;

/// Tagging strategy for enhanced discovery.
#[derive(Debug, Clone)]
pub struct TagStrategy {
    /// Generate name-based tags (`<name>`, `<name>:<version>`, `<name>:latest`).
    pub enable_name_tags: bool,
    /// Generate capability tags (`skill.<name>`, `ext.<name>`).
    pub enable_capability_tags: bool,
    /// Generate infrastructure tags (`deploy.<locator type>`).
    pub enable_infrastructure_tags: bool,
    /// Generate ownership tags (`team.<v>`, `org.<v>`, `project.<v>`).
    pub enable_team_tags: bool,
    /// Include the CID itself as the first tag. Disabling this breaks O(1)
    /// lookup by CID; leave it on outside of tests.
    pub enable_content_addressable: bool,
    /// Cap on the number of tags per record, applied after deduplication.
    /// Zero means unlimited.
    pub max_tags_per_record: usize,
}

impl Default for TagStrategy {
    fn default() -> Self {
        Self {
            enable_name_tags: true,
            enable_capability_tags: true,
            enable_infrastructure_tags: true,
            enable_team_tags: true,
            enable_content_addressable: true,
            max_tags_per_record: 20,
        }
    }
}

/// Normalizes a candidate tag for registry compliance.
///
/// Lowercases, maps path separators to `.`, spaces to `-` and anything else
/// outside `[a-z0-9._-]` to `_`; prefixes `_` when the leading character is
/// not `[a-z0-9_]`; truncates to 128 bytes; trims trailing separators.
/// Returns an empty string when nothing survives.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    if tag.is_empty() {
        return String::new();
    }

    let lowered = tag.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for (i, ch) in lowered.chars().enumerate() {
        match ch {
            'a'..='z' | '0'..='9' => out.push(ch),
            '_' | '.' | '-' => {
                // Valid only past the first position.
                if i == 0 {
                    out.push('_');
                } else {
                    out.push(ch);
                }
            }
            ' ' => out.push('-'),
            '/' | '\\' => out.push('.'),
            _ => out.push('_'),
        }
    }

    if let Some(first) = out.chars().next() {
        if !matches!(first, 'a'..='z' | '0'..='9' | '_') {
            out.insert(0, '_');
        }
    }

    out.truncate(MAX_TAG_LEN);
    out.trim_end_matches(['.', '-', '_']).to_string()
}

/// Generates discovery tags from a record's metadata map.
///
/// Ordering is stable: CID first (when enabled), then name, capability,
/// infrastructure and ownership tags in discovery order. Duplicates keep
/// their first occurrence; the result is truncated to the strategy cap.
#[must_use]
pub fn plan_tags(
    metadata: &BTreeMap<String, String>,
    cid: &str,
    strategy: &TagStrategy,
) -> Vec<String> {
    let mut tags = Vec::new();

    // 1. Content-addressable tag, always first so lookup by CID stays O(1).
    if strategy.enable_content_addressable && !cid.is_empty() {
        tags.push(normalize_tag(cid));
    }

    // 2. Name-based tags for browsability.
    if strategy.enable_name_tags {
        if let Some(name) = non_empty(metadata, ANNOTATION_NAME) {
            push_tag(&mut tags, normalize_tag(name));

            if let Some(version) = non_empty(metadata, ANNOTATION_VERSION) {
                push_tag(&mut tags, normalize_tag(&format!("{name}:{version}")));
            }

            push_tag(&mut tags, normalize_tag(&format!("{name}:latest")));
        }
    }

    // 3. Capability tags for functional discovery.
    if strategy.enable_capability_tags {
        for skill in split_joined(metadata, ANNOTATION_SKILLS) {
            push_tag(&mut tags, normalize_tag(&format!("skill.{skill}")));
        }
        for ext in split_joined(metadata, ANNOTATION_EXTENSIONS) {
            push_tag(&mut tags, normalize_tag(&format!("ext.{ext}")));
        }
    }

    // 4. Infrastructure tags for deployment discovery.
    if strategy.enable_infrastructure_tags {
        for locator in split_joined(metadata, ANNOTATION_LOCATORS) {
            push_tag(&mut tags, normalize_tag(&format!("deploy.{locator}")));
        }
    }

    // 5. Ownership tags from custom annotations.
    if strategy.enable_team_tags {
        if let Some(team) = non_empty(metadata, ANNOTATION_TEAM) {
            push_tag(&mut tags, normalize_tag(&format!("team.{team}")));
        }
        if let Some(org) = non_empty(metadata, ANNOTATION_ORGANIZATION) {
            push_tag(&mut tags, normalize_tag(&format!("org.{org}")));
        }
        if let Some(project) = non_empty(metadata, ANNOTATION_PROJECT) {
            push_tag(&mut tags, normalize_tag(&format!("project.{project}")));
        }
    }

    let mut tags = dedupe_tags(tags);
    if strategy.max_tags_per_record > 0 && tags.len() > strategy.max_tags_per_record {
        tags.truncate(strategy.max_tags_per_record);
    }
    tags
}

/// Extracts the flat metadata map that feeds both tag planning and manifest
/// annotations.
#[must_use]
pub fn record_metadata(data: &dyn RecordData) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if !data.name().is_empty() {
        metadata.insert(ANNOTATION_NAME.to_string(), data.name().to_string());
    }
    if !data.version().is_empty() {
        metadata.insert(ANNOTATION_VERSION.to_string(), data.version().to_string());
    }

    let skills = join_non_empty(data.skills().iter().map(cairn_core::Skill::display_name));
    if !skills.is_empty() {
        metadata.insert(ANNOTATION_SKILLS.to_string(), skills);
    }

    let extensions = join_non_empty(data.extensions().iter().map(|e| e.name.clone()));
    if !extensions.is_empty() {
        metadata.insert(ANNOTATION_EXTENSIONS.to_string(), extensions);
    }

    let locators = join_non_empty(data.locators().iter().map(|l| l.locator_type.clone()));
    if !locators.is_empty() {
        metadata.insert(ANNOTATION_LOCATORS.to_string(), locators);
    }

    for (key, target) in [
        ("team", ANNOTATION_TEAM),
        ("organization", ANNOTATION_ORGANIZATION),
        ("project", ANNOTATION_PROJECT),
    ] {
        if let Some(value) = data.annotations().get(key) {
            if !value.is_empty() {
                metadata.insert(target.to_string(), value.clone());
            }
        }
    }

    metadata
}

/// Derives routing labels from a record's projection.
///
/// Labels are hierarchical discovery keys: skill paths, extension features,
/// locator types and any domains named in annotations.
#[must_use]
pub fn derive_labels(data: &dyn RecordData) -> Vec<String> {
    let mut labels = Vec::new();

    for skill in data.skills() {
        let name = skill.display_name();
        if !name.is_empty() {
            labels.push(format!("/skills/{name}"));
        }
    }
    for ext in data.extensions() {
        if !ext.name.is_empty() {
            labels.push(format!("/features/{}", ext.name));
        }
    }
    for locator in data.locators() {
        if !locator.locator_type.is_empty() {
            labels.push(format!("/locators/{}", locator.locator_type));
        }
    }
    if let Some(domains) = data.annotations().get("domains") {
        for domain in domains.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            labels.push(format!("/domains/{domain}"));
        }
    }

    dedupe_tags(labels)
}

/// Derives routing labels from stored manifest annotations, for lookups that
/// never fetch the record layer.
#[must_use]
pub fn labels_from_annotations(annotations: &BTreeMap<String, String>) -> Vec<String> {
    let mut labels = Vec::new();

    for skill in split_joined(annotations, ANNOTATION_SKILLS) {
        labels.push(format!("/skills/{skill}"));
    }
    for ext in split_joined(annotations, ANNOTATION_EXTENSIONS) {
        labels.push(format!("/features/{ext}"));
    }
    for locator in split_joined(annotations, ANNOTATION_LOCATORS) {
        labels.push(format!("/locators/{locator}"));
    }

    dedupe_tags(labels)
}

fn non_empty<'a>(metadata: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn split_joined<'a>(
    metadata: &'a BTreeMap<String, String>,
    key: &str,
) -> impl Iterator<Item = &'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn join_non_empty(items: impl Iterator<Item = String>) -> String {
    items
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn push_tag(tags: &mut Vec<String>, tag: String) {
    if !tag.is_empty() {
        tags.push(tag);
    }
}

fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{AgentV1, Extension, Locator, Record, Skill};

    fn sample_metadata() -> BTreeMap<String, String> {
        let record: Record = AgentV1::new("Test Agent", "1.2.0")
            .with_skill(Skill::new("natural-language", "translation"))
            .with_extension(Extension {
                name: "runtime/python".into(),
                version: "1".into(),
                data: None,
            })
            .with_locator(Locator::new("docker-image", "ghcr.io/x/y"))
            .with_annotation("team", "Lingua Core")
            .with_annotation("organization", "acme")
            .into();
        record_metadata(record.data())
    }

    #[test]
    fn normalize_lowers_and_replaces_invalid_characters() {
        assert_eq!(normalize_tag("Test Agent"), "test-agent");
        assert_eq!(normalize_tag("skill.nlp/translation"), "skill.nlp.translation");
        assert_eq!(normalize_tag("name:1.0"), "name_1.0");
        assert_eq!(normalize_tag("Ünicode"), "_nicode");
    }

    #[test]
    fn normalize_fixes_leading_separator() {
        assert_eq!(normalize_tag(".hidden"), "_hidden");
        assert_eq!(normalize_tag("-dash"), "_dash");
        assert_eq!(normalize_tag("_ok"), "_ok");
    }

    #[test]
    fn normalize_trims_trailing_separators() {
        assert_eq!(normalize_tag("name..."), "name");
        assert_eq!(normalize_tag("name-_."), "name");
    }

    #[test]
    fn normalize_truncates_long_input() {
        let long = "a".repeat(300);
        let normalized = normalize_tag(&long);
        assert_eq!(normalized.len(), 128);
    }

    #[test]
    fn normalize_empty_stays_empty() {
        assert_eq!(normalize_tag(""), "");
        // Pure separators trim down to nothing.
        assert_eq!(normalize_tag("..."), "");
    }

    #[test]
    fn plan_tags_orders_cid_first() {
        let tags = plan_tags(&sample_metadata(), "bafycid", &TagStrategy::default());
        assert_eq!(tags[0], "bafycid");
        assert!(tags.contains(&"test-agent".to_string()));
        assert!(tags.contains(&"test-agent_1.2.0".to_string()));
        assert!(tags.contains(&"test-agent_latest".to_string()));
        assert!(tags.contains(&"skill.natural-language.translation".to_string()));
        assert!(tags.contains(&"ext.runtime.python".to_string()));
        assert!(tags.contains(&"deploy.docker-image".to_string()));
        assert!(tags.contains(&"team.lingua-core".to_string()));
        assert!(tags.contains(&"org.acme".to_string()));
    }

    #[test]
    fn plan_tags_respects_strategy_switches() {
        let strategy = TagStrategy {
            enable_name_tags: false,
            enable_capability_tags: false,
            enable_infrastructure_tags: false,
            enable_team_tags: false,
            ..TagStrategy::default()
        };
        let tags = plan_tags(&sample_metadata(), "bafycid", &strategy);
        assert_eq!(tags, vec!["bafycid".to_string()]);
    }

    #[test]
    fn plan_tags_truncates_after_dedup() {
        let strategy = TagStrategy {
            max_tags_per_record: 3,
            ..TagStrategy::default()
        };
        let tags = plan_tags(&sample_metadata(), "bafycid", &strategy);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0], "bafycid");
    }

    #[test]
    fn plan_tags_skips_name_tags_without_name() {
        let metadata = BTreeMap::new();
        let tags = plan_tags(&metadata, "bafycid", &TagStrategy::default());
        assert_eq!(tags, vec!["bafycid".to_string()]);
    }

    #[test]
    fn derive_labels_covers_all_sources() {
        let record: Record = AgentV1::new("labelled", "1.0")
            .with_skill(Skill::new("test-category-1", "test-class-1"))
            .with_extension(Extension {
                name: "streaming".into(),
                version: "1".into(),
                data: None,
            })
            .with_locator(Locator::new("docker-image", "ghcr.io/x/y"))
            .with_annotation("domains", "research, healthcare")
            .into();

        let labels = derive_labels(record.data());
        assert!(labels.contains(&"/skills/test-category-1/test-class-1".to_string()));
        assert!(labels.contains(&"/features/streaming".to_string()));
        assert!(labels.contains(&"/locators/docker-image".to_string()));
        assert!(labels.contains(&"/domains/research".to_string()));
        assert!(labels.contains(&"/domains/healthcare".to_string()));
    }

    #[test]
    fn labels_from_annotations_match_record_derivation() {
        let record: Record = AgentV1::new("labelled", "1.0")
            .with_skill(Skill::new("test-category-1", "test-class-1"))
            .with_locator(Locator::new("helm-chart", "oci://charts/x"))
            .into();

        let from_record = derive_labels(record.data());
        let from_annotations = labels_from_annotations(&record_metadata(record.data()));

        for label in &from_annotations {
            assert!(from_record.contains(label), "missing {label}");
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalized_tags_match_grammar(s in ".{0,200}") {
                let normalized = normalize_tag(&s);
                if !normalized.is_empty() {
                    let mut chars = normalized.chars();
                    let first = chars.next().unwrap();
                    prop_assert!(
                        matches!(first, 'a'..='z' | '0'..='9' | '_'),
                        "bad first char {first:?} in {normalized:?}"
                    );
                    prop_assert!(normalized.len() <= 128);
                    for ch in chars {
                        prop_assert!(
                            matches!(ch, 'a'..='z' | '0'..='9' | '.' | '_' | '-'),
                            "bad char {ch:?} in {normalized:?}"
                        );
                    }
                }
            }

            #[test]
            fn normalization_is_idempotent(s in ".{0,200}") {
                let once = normalize_tag(&s);
                let twice = normalize_tag(&once);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
