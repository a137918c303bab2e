//! The search service: metadata queries over published records.
//!
//! Search is intentionally shallow: it matches `key=value` queries against
//! the discovery metadata the routing index and manifest annotations
//! already carry. A full-text index is out of scope.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use cairn_core::{Error, RecordMeta, RecordRef};
use cairn_proto as proto;
use cairn_proto::search_service_server::SearchService;
use cairn_proto::status::to_status;
use cairn_routing::RoutingIndex;
use cairn_store::RecordStore;

use crate::gate::Gate;

const RESPONSE_BUFFER: usize = 10;

/// One parsed `key=value` query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    Name(String),
    Version(String),
    Skill(String),
    Extension(String),
    Locator(String),
    Label(String),
}

impl Query {
    fn parse(raw: &str) -> Result<Self, Error> {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(Error::InvalidRequest(format!(
                "query must be key=value, got {raw:?}"
            )));
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(Error::InvalidRequest(format!("query {raw:?} has no value")));
        }
        match key.trim() {
            "name" => Ok(Self::Name(value)),
            "version" => Ok(Self::Version(value)),
            "skill" => Ok(Self::Skill(value)),
            "extension" => Ok(Self::Extension(value)),
            "locator" => Ok(Self::Locator(value)),
            "label" => Ok(Self::Label(value)),
            other => Err(Error::InvalidRequest(format!(
                "unknown query key {other:?} (expected name, version, skill, extension, locator or label)"
            ))),
        }
    }

    fn matches(&self, meta: &RecordMeta) -> bool {
        match self {
            Self::Name(v) => annotation_eq(meta, "dir.name", v),
            Self::Version(v) => annotation_eq(meta, "dir.version", v),
            Self::Skill(v) => annotation_contains(meta, "dir.skills", v),
            Self::Extension(v) => annotation_contains(meta, "dir.extensions", v),
            Self::Locator(v) => annotation_contains(meta, "dir.locators", v),
            Self::Label(v) => meta.labels.iter().any(|l| l == v),
        }
    }
}

fn annotation_eq(meta: &RecordMeta, key: &str, value: &str) -> bool {
    meta.annotations.get(key).is_some_and(|v| v == value)
}

fn annotation_contains(meta: &RecordMeta, key: &str, value: &str) -> bool {
    meta.annotations
        .get(key)
        .is_some_and(|joined| joined.split(',').any(|item| item.trim() == value))
}

/// Search service implementation.
#[derive(Clone)]
pub struct SearchServiceImpl {
    store: RecordStore,
    index: RoutingIndex,
    gate: Gate,
}

impl SearchServiceImpl {
    /// Creates the service over the store, the index and the shared gate.
    #[must_use]
    pub fn new(store: RecordStore, index: RoutingIndex, gate: Gate) -> Self {
        Self { store, index, gate }
    }
}

#[tonic::async_trait]
impl SearchService for SearchServiceImpl {
    type SearchStream = ReceiverStream<Result<proto::SearchResponse, Status>>;

    async fn search(
        &self,
        request: Request<proto::SearchRequest>,
    ) -> Result<Response<Self::SearchStream>, Status> {
        self.gate.check(&request, "Search")?;
        let request = request.into_inner();

        let queries = request
            .queries
            .iter()
            .map(|raw| Query::parse(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| to_status(&e))?;
        let limit = request.limit as usize;

        // Candidates are every published record; with no queries this is a
        // match-all listing, which is what peers use to mirror content.
        let candidates = self.index.list(&[]).map_err(|e| to_status(&e))?;

        let store = self.store.clone();
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        tokio::spawn(async move {
            let mut sent = 0usize;
            for candidate in candidates {
                if limit > 0 && sent >= limit {
                    return;
                }

                let meta = match store.lookup(&RecordRef::new(&candidate.cid)).await {
                    Ok(meta) => meta,
                    Err(err) => {
                        // Index/store drift; skip the candidate.
                        tracing::warn!(
                            cid = %candidate.cid,
                            error = %err,
                            "published record missing from store"
                        );
                        continue;
                    }
                };

                if queries.iter().all(|q| q.matches(&meta)) {
                    let response = proto::SearchResponse {
                        cid: candidate.cid,
                    };
                    if tx.send(Ok(response)).await.is_err() {
                        return;
                    }
                    sent += 1;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
