//! The label↔record publication index.
//!
//! Forward (label → CIDs) and reverse (CID → labels) maps behind one
//! reader-writer lock: list takes a read snapshot, publish and unpublish
//! take the write lock. Streamed listings work from the snapshot so a slow
//! consumer never holds the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cairn_core::{Error, Record, Result};
use cairn_store::derive_labels;

/// Buffer size for streamed listings.
const LIST_BUFFER: usize = 10;

/// One published record with its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    /// The record's content identifier.
    pub cid: String,
    /// Every label the record is published under, sorted.
    pub labels: Vec<String>,
}

/// One label edge, the legacy listing unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEdge {
    /// The label side of the edge.
    pub label: String,
    /// The record side of the edge.
    pub cid: String,
}

#[derive(Debug, Default)]
struct IndexState {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

/// The routing index.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Default, Clone)]
pub struct RoutingIndex {
    state: Arc<RwLock<IndexState>>,
}

impl RoutingIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a record: derives its labels and inserts every label↔CID
    /// edge. Re-publishing refreshes the edges.
    ///
    /// The caller is responsible for checking that the CID exists in the
    /// store; the index itself only manages edges.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn publish(&self, cid: &str, record: &Record) -> Result<Vec<String>> {
        let labels = derive_labels(record.data());
        self.publish_labels(cid, labels.clone())?;
        Ok(labels)
    }

    /// Publishes a record under an explicit label set.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn publish_labels(&self, cid: &str, labels: Vec<String>) -> Result<()> {
        let mut state = self.write()?;
        for label in &labels {
            state
                .forward
                .entry(label.clone())
                .or_default()
                .insert(cid.to_string());
        }
        state
            .reverse
            .entry(cid.to_string())
            .or_default()
            .extend(labels);
        tracing::debug!(cid = cid, "record published");
        Ok(())
    }

    /// Removes every edge for the given CID.
    ///
    /// # Errors
    ///
    /// `NotFound` when the CID was never published.
    pub fn unpublish(&self, cid: &str) -> Result<()> {
        let mut state = self.write()?;
        let Some(labels) = state.reverse.remove(cid) else {
            return Err(Error::not_found("publication", cid));
        };
        for label in labels {
            if let Some(cids) = state.forward.get_mut(&label) {
                cids.remove(cid);
                if cids.is_empty() {
                    state.forward.remove(&label);
                }
            }
        }
        tracing::debug!(cid = cid, "record unpublished");
        Ok(())
    }

    /// Returns the labels a CID is published under, sorted.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn labels_of(&self, cid: &str) -> Result<Vec<String>> {
        let state = self.read()?;
        let mut labels: Vec<String> = state
            .reverse
            .get(cid)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default();
        labels.sort();
        Ok(labels)
    }

    /// Returns the records published under every one of the given labels.
    ///
    /// An empty query matches every published record. An empty intersection
    /// yields an empty vector.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn list(&self, labels: &[String]) -> Result<Vec<PublishedRecord>> {
        let state = self.read()?;

        let mut cids: Vec<String> = if labels.is_empty() {
            state.reverse.keys().cloned().collect()
        } else {
            let mut sets = labels.iter().map(|label| state.forward.get(label));
            let Some(Some(first)) = sets.next() else {
                return Ok(Vec::new());
            };
            let mut intersection: HashSet<String> = first.clone();
            for set in sets {
                let Some(set) = set else {
                    return Ok(Vec::new());
                };
                intersection.retain(|cid| set.contains(cid));
                if intersection.is_empty() {
                    return Ok(Vec::new());
                }
            }
            intersection.into_iter().collect()
        };
        cids.sort();

        Ok(cids
            .into_iter()
            .map(|cid| {
                let mut labels: Vec<String> = state
                    .reverse
                    .get(&cid)
                    .map(|l| l.iter().cloned().collect())
                    .unwrap_or_default();
                labels.sort();
                PublishedRecord { cid, labels }
            })
            .collect())
    }

    /// Streams a list query; the channel closes when the snapshot is
    /// exhausted or the token is cancelled.
    #[must_use]
    pub fn list_stream(
        &self,
        cancel: CancellationToken,
        labels: Vec<String>,
    ) -> mpsc::Receiver<Result<PublishedRecord>> {
        let (tx, rx) = mpsc::channel(LIST_BUFFER);
        let index = self.clone();

        tokio::spawn(async move {
            let snapshot = match index.list(&labels) {
                Ok(records) => records,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };
            for record in snapshot {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = tx.send(Ok(record)) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        rx
    }

    /// Returns individual label edges matching any of the given labels,
    /// the legacy listing shape.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn edges(&self, labels: &[String]) -> Result<Vec<LabelEdge>> {
        let state = self.read()?;
        let mut edges = Vec::new();
        for label in labels {
            if let Some(cids) = state.forward.get(label) {
                for cid in cids {
                    edges.push(LabelEdge {
                        label: label.clone(),
                        cid: cid.clone(),
                    });
                }
            }
        }
        edges.sort_by(|a, b| (&a.label, &a.cid).cmp(&(&b.label, &b.cid)));
        Ok(edges)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("routing index lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("routing index lock poisoned".into()))
    }
}
