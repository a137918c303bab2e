//! Conversions between wire messages and the domain model.
//!
//! Wire → domain conversions validate: a `Record` without variant data is
//! rejected with `InvalidRecord`, and extension payloads must be valid JSON
//! documents. Domain → wire conversions are infallible.

use cairn_core::{Error, Result};

use crate as proto;

impl From<cairn_core::Skill> for proto::Skill {
    fn from(skill: cairn_core::Skill) -> Self {
        Self {
            category_name: skill.category_name,
            class_name: skill.class_name,
            id: skill.id,
            name: skill.name,
        }
    }
}

impl From<proto::Skill> for cairn_core::Skill {
    fn from(skill: proto::Skill) -> Self {
        Self {
            category_name: skill.category_name,
            class_name: skill.class_name,
            id: skill.id,
            name: skill.name,
        }
    }
}

impl From<cairn_core::Extension> for proto::Extension {
    fn from(ext: cairn_core::Extension) -> Self {
        Self {
            name: ext.name,
            version: ext.version,
            data_json: ext.data.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

impl TryFrom<proto::Extension> for cairn_core::Extension {
    type Error = Error;

    fn try_from(ext: proto::Extension) -> Result<Self> {
        let data = if ext.data_json.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&ext.data_json).map_err(|e| {
                Error::InvalidEncoding(format!(
                    "extension {:?} carries invalid JSON payload: {e}",
                    ext.name
                ))
            })?)
        };
        Ok(Self {
            name: ext.name,
            version: ext.version,
            data,
        })
    }
}

impl From<cairn_core::Locator> for proto::Locator {
    fn from(locator: cairn_core::Locator) -> Self {
        Self {
            r#type: locator.locator_type,
            url: locator.url,
        }
    }
}

impl From<proto::Locator> for cairn_core::Locator {
    fn from(locator: proto::Locator) -> Self {
        Self {
            locator_type: locator.r#type,
            url: locator.url,
        }
    }
}

fn extensions_from_wire(
    extensions: Vec<proto::Extension>,
) -> Result<Vec<cairn_core::Extension>> {
    extensions.into_iter().map(TryInto::try_into).collect()
}

fn signature_from_wire(signature: String) -> Option<String> {
    if signature.is_empty() {
        None
    } else {
        Some(signature)
    }
}

impl From<cairn_core::AgentV1> for proto::AgentV1 {
    fn from(agent: cairn_core::AgentV1) -> Self {
        Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            authors: agent.authors,
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: agent.extensions.into_iter().map(Into::into).collect(),
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: agent.signature.unwrap_or_default(),
        }
    }
}

impl TryFrom<proto::AgentV1> for cairn_core::AgentV1 {
    type Error = Error;

    fn try_from(agent: proto::AgentV1) -> Result<Self> {
        Ok(Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            authors: agent.authors,
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: extensions_from_wire(agent.extensions)?,
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: signature_from_wire(agent.signature),
        })
    }
}

impl From<cairn_core::AgentV2> for proto::AgentV2 {
    fn from(agent: cairn_core::AgentV2) -> Self {
        Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            created_at: agent.created_at,
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: agent.extensions.into_iter().map(Into::into).collect(),
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: agent.signature.unwrap_or_default(),
        }
    }
}

impl TryFrom<proto::AgentV2> for cairn_core::AgentV2 {
    type Error = Error;

    fn try_from(agent: proto::AgentV2) -> Result<Self> {
        Ok(Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            created_at: agent.created_at,
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: extensions_from_wire(agent.extensions)?,
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: signature_from_wire(agent.signature),
        })
    }
}

impl From<cairn_core::AgentV3> for proto::AgentV3 {
    fn from(agent: cairn_core::AgentV3) -> Self {
        Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            created_at: agent.created_at,
            previous_record_cid: agent.previous_record_cid.unwrap_or_default(),
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: agent.extensions.into_iter().map(Into::into).collect(),
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: agent.signature.unwrap_or_default(),
        }
    }
}

impl TryFrom<proto::AgentV3> for cairn_core::AgentV3 {
    type Error = Error;

    fn try_from(agent: proto::AgentV3) -> Result<Self> {
        Ok(Self {
            schema_version: agent.schema_version,
            name: agent.name,
            version: agent.version,
            description: agent.description,
            created_at: agent.created_at,
            previous_record_cid: if agent.previous_record_cid.is_empty() {
                None
            } else {
                Some(agent.previous_record_cid)
            },
            skills: agent.skills.into_iter().map(Into::into).collect(),
            extensions: extensions_from_wire(agent.extensions)?,
            locators: agent.locators.into_iter().map(Into::into).collect(),
            annotations: agent.annotations,
            signature: signature_from_wire(agent.signature),
        })
    }
}

impl From<cairn_core::Record> for proto::Record {
    fn from(record: cairn_core::Record) -> Self {
        let data = match record {
            cairn_core::Record::V1(a) => proto::record::Data::V1(a.into()),
            cairn_core::Record::V2(a) => proto::record::Data::V2(a.into()),
            cairn_core::Record::V3(a) => proto::record::Data::V3(a.into()),
        };
        Self { data: Some(data) }
    }
}

impl TryFrom<proto::Record> for cairn_core::Record {
    type Error = Error;

    fn try_from(record: proto::Record) -> Result<Self> {
        match record.data {
            Some(proto::record::Data::V1(a)) => Ok(Self::V1(a.try_into()?)),
            Some(proto::record::Data::V2(a)) => Ok(Self::V2(a.try_into()?)),
            Some(proto::record::Data::V3(a)) => Ok(Self::V3(a.try_into()?)),
            None => Err(Error::InvalidRecord(
                "record has no variant data set".to_string(),
            )),
        }
    }
}

impl From<cairn_core::RecordRef> for proto::RecordRef {
    fn from(r: cairn_core::RecordRef) -> Self {
        Self { cid: r.cid }
    }
}

impl From<proto::RecordRef> for cairn_core::RecordRef {
    fn from(r: proto::RecordRef) -> Self {
        Self { cid: r.cid }
    }
}

impl From<cairn_core::RecordMeta> for proto::RecordMeta {
    fn from(meta: cairn_core::RecordMeta) -> Self {
        Self {
            cid: meta.cid,
            size_bytes: meta.size_bytes,
            created_at: meta.created_at.to_rfc3339(),
            annotations: meta.annotations,
            labels: meta.labels,
        }
    }
}

impl TryFrom<proto::RecordMeta> for cairn_core::RecordMeta {
    type Error = Error;

    fn try_from(meta: proto::RecordMeta) -> Result<Self> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&meta.created_at)
            .map_err(|e| {
                Error::InvalidEncoding(format!("record meta has invalid created_at: {e}"))
            })?
            .with_timezone(&chrono::Utc);
        Ok(Self {
            cid: meta.cid,
            size_bytes: meta.size_bytes,
            created_at,
            annotations: meta.annotations,
            labels: meta.labels,
        })
    }
}

impl From<&Error> for proto::ErrorDetail {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<proto::ErrorDetail> for Error {
    fn from(detail: proto::ErrorDetail) -> Self {
        Error::from_code(&detail.code, &detail.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{AgentV1, AgentV3, Extension, Locator, Record, Skill};

    fn sample() -> Record {
        AgentV1::new("test-agent", "v1")
            .with_skill(Skill::new("test-category-1", "test-class-1"))
            .with_extension(Extension {
                name: "runtime".into(),
                version: "0.1.0".into(),
                data: Some(serde_json::json!({"memory_mb": 512})),
            })
            .with_locator(Locator::new("docker-image", "ghcr.io/example/agent"))
            .with_annotation("team", "platform")
            .into()
    }

    #[test]
    fn record_roundtrips_through_wire_form() {
        let record = sample();
        let wire: proto::Record = record.clone().into();
        let back: Record = wire.try_into().expect("convert back");
        assert_eq!(record, back);
    }

    #[test]
    fn empty_record_is_rejected() {
        let wire = proto::Record { data: None };
        let err = Record::try_from(wire).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn invalid_extension_json_is_rejected() {
        let wire = proto::Record {
            data: Some(proto::record::Data::V3(proto::AgentV3 {
                schema_version: "v1alpha3".into(),
                name: "broken".into(),
                extensions: vec![proto::Extension {
                    name: "bad".into(),
                    version: "1".into(),
                    data_json: "{not json".into(),
                }],
                ..Default::default()
            })),
        };
        let err = Record::try_from(wire).unwrap_err();
        assert!(matches!(err, Error::InvalidEncoding(_)));
    }

    #[test]
    fn wire_conversion_preserves_canonical_bytes() {
        let record = sample();
        let before = cairn_core::canonical::canonical(&record).expect("canonical");

        let wire: proto::Record = record.into();
        let back: Record = wire.try_into().expect("convert back");
        let after = cairn_core::canonical::canonical(&back).expect("canonical");

        assert_eq!(before, after);
    }

    #[test]
    fn v3_previous_cid_maps_to_option() {
        let record: Record = AgentV3::new("linked", "2.0").into();
        let wire: proto::Record = record.into();
        let back: Record = wire.try_into().expect("convert back");
        let Record::V3(agent) = back else {
            panic!("variant changed in conversion");
        };
        assert!(agent.previous_record_cid.is_none());
    }

    #[test]
    fn error_detail_roundtrips_kind() {
        let err = Error::not_found("record", "bafyabc");
        let detail: proto::ErrorDetail = (&err).into();
        assert_eq!(detail.code, "NOT_FOUND");
        let back: Error = detail.into();
        assert_eq!(back.code(), "NOT_FOUND");
    }
}
