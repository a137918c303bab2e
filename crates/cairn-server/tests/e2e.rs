//! End-to-end scenarios over a real server and client.
//!
//! Each test boots a directory server on an ephemeral port with the
//! in-memory registry and drives it through the public client.

use std::collections::HashSet;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cairn_client::{Client, Identity};
use cairn_core::prelude::*;
use cairn_server::{AppState, AuthzMode, Config};

async fn start_server_with_config(config: Config) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let state = AppState::build(config).expect("build state");
    tokio::spawn(cairn_server::serve_with_listener(state, listener));
    format!("http://{addr}")
}

async fn start_server() -> String {
    start_server_with_config(Config::default()).await
}

fn test_record() -> Record {
    AgentV1::new("test-agent", "v1")
        .with_skill(Skill::new("test-category-1", "test-class-1"))
        .into()
}

fn two_skill_record() -> Record {
    AgentV1::new("test-agent", "v1")
        .with_skill(Skill::new("test-category-1", "test-class-1"))
        .with_skill(Skill::new("test-category-2", "test-class-2"))
        .into()
}

#[tokio::test]
async fn push_pull_delete_roundtrip() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let record = test_record();
    let record_ref = client.push(&record).await.expect("push");
    assert_eq!(record_ref.cid.len(), 59, "CID must be 59 characters");

    let pulled = client.pull(&record_ref).await.expect("pull");
    assert_eq!(
        canonical(&record).expect("canonical"),
        canonical(&pulled).expect("canonical"),
        "pulled record must be byte-identical"
    );

    client.delete(&record_ref).await.expect("delete");

    let err = client.pull(&record_ref).await.expect_err("pull after delete");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn lookup_serves_metadata() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let record = test_record();
    let record_ref = client.push(&record).await.expect("push");

    let meta = client.lookup(&record_ref).await.expect("lookup");
    assert_eq!(meta.cid, record_ref.cid);
    assert_eq!(
        meta.annotations.get("dir.name").map(String::as_str),
        Some("test-agent")
    );
    assert!(meta
        .labels
        .contains(&"/skills/test-category-1/test-class-1".to_string()));
}

#[tokio::test]
async fn publish_list_unpublish_flow() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let record = two_skill_record();
    let record_ref = client.push(&record).await.expect("push");
    client.publish(&record_ref).await.expect("publish");

    let single = client
        .list_collect(vec!["/skills/test-category-1/test-class-1".to_string()])
        .await
        .expect("list single label");
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].cid, record_ref.cid);

    let both = client
        .list_collect(vec![
            "/skills/test-category-1/test-class-1".to_string(),
            "/skills/test-category-2/test-class-2".to_string(),
        ])
        .await
        .expect("list intersection");
    assert_eq!(both.len(), 1);

    let edges = client
        .legacy_list(vec!["/skills/test-category-1/test-class-1".to_string()])
        .await
        .expect("legacy list");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].1, record_ref.cid);

    client.unpublish(&record_ref).await.expect("unpublish");

    let after = client
        .list_collect(vec!["/skills/test-category-1/test-class-1".to_string()])
        .await
        .expect("list after unpublish");
    assert!(after.is_empty());
}

#[tokio::test]
async fn publish_of_absent_cid_fails() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let ghost = RecordRef::new(
        Cid::from_canonical_bytes(b"never pushed anywhere").as_str(),
    );
    let err = client.publish(&ghost).await.expect_err("publish absent");
    assert_eq!(err.code(), "NOT_FOUND");

    let err = client.unpublish(&ghost).await.expect_err("unpublish absent");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn streaming_push_of_five_records() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(5);
    let mut results = client.push_stream(cancel, rx);

    for i in 0..5 {
        let record: Record = AgentV1::new(format!("stream-test-agent-{i}"), "v1").into();
        tx.send(record).await.expect("feed record");
    }
    drop(tx);

    let mut indices = Vec::new();
    let mut cids = HashSet::new();
    while let Some(item) = results.recv().await {
        let record_ref = item.outcome.expect("streamed push should succeed");
        assert!(!record_ref.cid.is_empty());
        cids.insert(record_ref.cid);
        indices.push(item.index);
    }

    assert_eq!(indices.len(), 5);
    assert_eq!(
        indices.iter().copied().collect::<HashSet<_>>(),
        (0..5).collect::<HashSet<_>>()
    );
    // Receiver indices are monotonically non-decreasing.
    assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(cids.len(), 5, "every record gets a distinct CID");
}

#[tokio::test]
async fn cancellation_closes_the_stream_promptly() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);
    let mut results = client.push_stream(cancel.clone(), rx);

    tx.send(test_record()).await.expect("feed first record");
    let first = results.recv().await.expect("first result");
    assert!(first.outcome.is_ok());

    cancel.cancel();

    // The output channel must close within the grace period, with no
    // deadlock regardless of how many results were still in flight.
    let grace = Duration::from_millis(200);
    loop {
        match tokio::time::timeout(grace, results.recv())
            .await
            .expect("stream did not close within the grace period")
        {
            Some(_) => continue,
            None => break,
        }
    }
    drop(tx);
}

#[tokio::test]
async fn empty_input_stream_closes_without_results() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<Record>(1);
    drop(tx);
    let mut results = client.push_stream(cancel, rx);

    let item = tokio::time::timeout(Duration::from_secs(1), results.recv())
        .await
        .expect("stream should close promptly");
    assert!(item.is_none(), "no results expected on empty input");
}

#[tokio::test]
async fn batch_operations_share_one_stream() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let records: Vec<Record> = (0..3)
        .map(|i| AgentV1::new(format!("batch-agent-{i}"), "v1").into())
        .collect();

    let refs = client.push_batch(records.clone()).await.expect("push batch");
    assert_eq!(refs.len(), 3);

    let pulled = client.pull_batch(refs.clone()).await.expect("pull batch");
    assert_eq!(pulled.len(), 3);

    let metas = client.lookup_batch(refs.clone()).await.expect("lookup batch");
    assert_eq!(metas.len(), 3);

    client.delete_batch(refs.clone()).await.expect("delete batch");
    let err = client.pull(&refs[0]).await.expect_err("pull after delete");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn per_item_errors_do_not_abort_the_stream() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let good = client.push(&test_record()).await.expect("push");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(3);
    let mut results = client.pull_stream(cancel, rx);

    let ghost = RecordRef::new(Cid::from_canonical_bytes(b"missing").as_str());
    tx.send(good.clone()).await.expect("feed good");
    tx.send(ghost).await.expect("feed ghost");
    tx.send(good.clone()).await.expect("feed good again");
    drop(tx);

    let mut outcomes = Vec::new();
    while let Some(item) = results.recv().await {
        outcomes.push(item.outcome);
    }
    assert_eq!(outcomes.len(), 3, "the miss must not abort the stream");
    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_err());
    assert!(outcomes[2].is_ok());
}

#[tokio::test]
async fn external_trust_domain_is_gated() {
    let url = start_server().await;

    let local = Client::connect(url.clone()).await.expect("connect local");
    let record_ref = local.push(&test_record()).await.expect("local push");

    let external = Client::connect_with_identity(
        url,
        Identity::new("peer.example.net", "eve"),
    )
    .await
    .expect("connect external");

    // Read-only methods are open to any trust domain.
    let pulled = external.pull(&record_ref).await.expect("external pull");
    assert_eq!(
        canonical(&pulled).expect("canonical"),
        canonical(&test_record()).expect("canonical")
    );
    external.lookup(&record_ref).await.expect("external lookup");

    // Mutations are not.
    let err = external
        .push(&test_record())
        .await
        .expect_err("external push");
    assert_eq!(err.code(), "PERMISSION_DENIED");

    let err = external
        .publish(&record_ref)
        .await
        .expect_err("external publish");
    assert_eq!(err.code(), "PERMISSION_DENIED");

    let err = external
        .delete(&record_ref)
        .await
        .expect_err("external delete");
    assert_eq!(err.code(), "PERMISSION_DENIED");
}

#[tokio::test]
async fn search_filters_published_records() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let translator: Record = AgentV1::new("translator", "1.0")
        .with_skill(Skill::new("nlp", "translation"))
        .into();
    let summarizer: Record = AgentV1::new("summarizer", "2.0")
        .with_skill(Skill::new("nlp", "summarization"))
        .into();

    let t_ref = client.push(&translator).await.expect("push translator");
    let s_ref = client.push(&summarizer).await.expect("push summarizer");
    client.publish(&t_ref).await.expect("publish translator");
    client.publish(&s_ref).await.expect("publish summarizer");

    let all = client.search(Vec::new(), 0).await.expect("match-all search");
    assert_eq!(all.len(), 2);

    let by_name = client
        .search(vec!["name=translator".to_string()], 0)
        .await
        .expect("search by name");
    assert_eq!(by_name, vec![t_ref.cid.clone()]);

    let by_label = client
        .search(vec!["label=/skills/nlp/summarization".to_string()], 0)
        .await
        .expect("search by label");
    assert_eq!(by_label, vec![s_ref.cid.clone()]);

    let none = client
        .search(vec!["name=translator".to_string(), "version=9.9".to_string()], 0)
        .await
        .expect("conjunctive search");
    assert!(none.is_empty());

    let err = client
        .search(vec!["color=red".to_string()], 0)
        .await
        .expect_err("unknown query key");
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn sync_mirrors_records_between_directories() {
    let upstream_url = start_server().await;
    let upstream = Client::connect(upstream_url.clone()).await.expect("connect upstream");

    let record = test_record();
    let record_ref = upstream.push(&record).await.expect("push upstream");
    upstream.publish(&record_ref).await.expect("publish upstream");

    let mirror_url = start_server_with_config(Config {
        sync_interval_secs: 1,
        ..Config::default()
    })
    .await;
    let mirror = Client::connect(mirror_url).await.expect("connect mirror");

    let sync_id = mirror
        .create_sync(upstream_url)
        .await
        .expect("create sync");
    assert_eq!(
        uuid::Uuid::parse_str(&sync_id).expect("uuid").get_version_num(),
        4
    );

    // The worker imports on its next cycle; poll with a deadline.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match mirror.pull(&record_ref).await {
            Ok(mirrored) => {
                assert_eq!(
                    canonical(&record).expect("canonical"),
                    canonical(&mirrored).expect("canonical")
                );
                break;
            }
            Err(_) if std::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(err) => panic!("record never mirrored: {err}"),
        }
    }

    let syncs = mirror.list_syncs().await.expect("list syncs");
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].sync_id, sync_id);

    mirror.delete_sync(&sync_id).await.expect("delete sync");
    let err = mirror.get_sync(&sync_id).await.expect_err("get deleted sync");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn bundle_mode_loads_policy_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("policy.json");
    std::fs::write(
        &path,
        r#"{"allow":[{"trust_domain":"cairn.local","api_method":"*"}]}"#,
    )
    .expect("write bundle");

    let url = start_server_with_config(Config {
        authz_mode: AuthzMode::Bundle,
        authz_bundle_path: Some(path.display().to_string()),
        ..Config::default()
    })
    .await;

    // The own trust domain is allowed by the bundle.
    let local = Client::connect(url.clone()).await.expect("connect local");
    let record_ref = local.push(&test_record()).await.expect("local push");

    // The bundle carries no external rules, so even reads are denied,
    // unlike under the default rule policy.
    let external = Client::connect_with_identity(
        url,
        Identity::new("peer.example.net", "eve"),
    )
    .await
    .expect("connect external");
    let err = external.pull(&record_ref).await.expect_err("external pull");
    assert_eq!(err.code(), "PERMISSION_DENIED");
}

#[tokio::test]
async fn referrers_roundtrip_over_the_wire() {
    let url = start_server().await;
    let client = Client::connect(url).await.expect("connect");

    let record_ref = client.push(&test_record()).await.expect("push");

    let referrer = cairn_proto::Referrer {
        r#type: "signature".to_string(),
        data: b"detached-signature-bytes".to_vec(),
        annotations: Default::default(),
    };
    client
        .push_referrer(&record_ref, referrer)
        .await
        .expect("push referrer");

    let artifacts = client
        .pull_referrers(&record_ref, Some("signature"))
        .await
        .expect("pull referrers");
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].data, b"detached-signature-bytes");

    let none = client
        .pull_referrers(&record_ref, Some("sbom"))
        .await
        .expect("pull filtered referrers");
    assert!(none.is_empty());
}
