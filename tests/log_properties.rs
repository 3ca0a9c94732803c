mod common;

use cdc_core::{ChangeEvent, Lsn, Operation, PrimaryKey, RowImage, SchemaVersion};
use cdc_sim::{inspect, Engine};
use cdc_sink::partition;
use common::{engine_config, raw_events, RecordingSink, MIXED};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TICKS: u64 = 200;

async fn run_mixed() -> (RecordingSink, Vec<ChangeEvent>, Lsn) {
    let dir = TempDir::new().unwrap();
    let config = engine_config(
        dir.path(),
        MIXED,
        &format!("max_ticks: {TICKS}\nbatching:\n  max_events: 20"),
    );
    let sink = RecordingSink::new();
    let summary = Engine::with_sink(config, Arc::new(sink.clone()))
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.transactions, TICKS);

    let mut events = raw_events(&sink).await;
    events.sort_by_key(|e| e.lsn);
    let last_lsn = summary.checkpoint.unwrap().last_committed_lsn;
    (sink, events, last_lsn)
}

fn row_key(table: &str, image: &RowImage) -> (String, PrimaryKey) {
    let key = PrimaryKey::from_value(&image["id"]).unwrap();
    (table.to_string(), key)
}

#[tokio::test]
async fn test_lsns_are_dense_and_unique() {
    let (_, events, last_lsn) = run_mixed().await;

    let lsns: Vec<u64> = events.iter().map(|e| e.lsn.0).collect();
    let expected: Vec<u64> = (1..=last_lsn.0).collect();
    assert_eq!(lsns, expected);
}

#[tokio::test]
async fn test_transactions_are_contiguous() {
    let (_, events, _) = run_mixed().await;

    let mut by_xid: BTreeMap<u64, Vec<&ChangeEvent>> = BTreeMap::new();
    for event in &events {
        by_xid.entry(event.xid.0).or_default().push(event);
    }
    assert_eq!(by_xid.len() as u64, TICKS);
    assert_eq!(by_xid.keys().copied().collect::<Vec<_>>(), (1..=TICKS).collect::<Vec<_>>());

    let mut previous_last = Lsn::ZERO;
    for members in by_xid.values() {
        let first = members[0];
        assert_eq!(first.lsn, previous_last.next());
        for (offset, event) in members.iter().enumerate() {
            assert_eq!(event.lsn.0, first.lsn.0 + offset as u64);
            assert_eq!(event.commit_ts, first.commit_ts);
            assert_eq!(event.schema_version, first.schema_version);
        }
        previous_last = members[members.len() - 1].lsn;
    }
}

#[tokio::test]
async fn test_updates_and_deletes_target_live_rows() {
    let (_, events, _) = run_mixed().await;

    let mut live: HashSet<(String, PrimaryKey)> = HashSet::new();
    let mut ops: HashMap<Operation, usize> = HashMap::new();
    for event in &events {
        *ops.entry(event.op).or_default() += 1;
        match event.op {
            Operation::Insert => {
                let key = row_key(&event.table, event.after.as_ref().unwrap());
                assert!(live.insert(key), "insert of a live row at {}", event.lsn);
            }
            Operation::Update => {
                let before = row_key(&event.table, event.before.as_ref().unwrap());
                let after = row_key(&event.table, event.after.as_ref().unwrap());
                assert_eq!(before, after);
                assert!(live.contains(&before), "update of a dead row at {}", event.lsn);
            }
            Operation::Delete => {
                assert!(event.after.is_none());
                let key = row_key(&event.table, event.before.as_ref().unwrap());
                assert!(live.remove(&key), "delete of a dead row at {}", event.lsn);
            }
        }
    }

    assert!(ops[&Operation::Update] > 0);
    assert!(ops[&Operation::Delete] > 0);
}

#[tokio::test]
async fn test_schema_versions_are_published_and_monotonic() {
    let (sink, events, _) = run_mixed().await;

    let history = inspect::load_schema_history(&sink).await.unwrap();
    assert_eq!(history.len(), 3);

    let mut previous = SchemaVersion(0);
    for event in &events {
        assert!(event.schema_version >= previous);
        assert!(event.schema_version.0 < 3);
        previous = event.schema_version;
    }
    assert_eq!(previous, SchemaVersion(2));

    // the renamed column replaces the old one after tick 120
    let users_after_rename = events
        .iter()
        .filter(|e| e.table == "users" && e.schema_version == SchemaVersion(2))
        .filter_map(|e| e.after.as_ref());
    for image in users_after_rename {
        assert!(image.contains_key("contact"));
        assert!(!image.contains_key("email"));
    }
}

#[tokio::test]
async fn test_schema_objects_precede_referencing_data() {
    let (sink, _, _) = run_mixed().await;
    let puts = sink.puts();
    let history = inspect::load_schema_history(&sink).await.unwrap();

    let position: HashMap<&str, usize> = puts
        .iter()
        .enumerate()
        .map(|(i, key)| (key.as_str(), i))
        .collect();
    // every object is written exactly once in a clean run
    assert_eq!(position.len(), puts.len());

    for (index, key) in puts.iter().enumerate() {
        if !partition::is_data_key(key) {
            continue;
        }
        let bytes = sink.inner().objects()[key].clone();
        let messages = cdc_log::decode_frames(&bytes, &history).unwrap();
        for message in messages {
            let cdc_core::LogMessage::Change(event) = message else {
                continue;
            };
            let schema_key = partition::schema_key(event.schema_version);
            assert!(position[schema_key.as_str()] < index, "{key} before {schema_key}");
        }
    }
}

#[tokio::test]
async fn test_object_keys_increase_per_table() {
    let (sink, _, _) = run_mixed().await;

    let mut last_key: HashMap<String, String> = HashMap::new();
    for key in sink.puts() {
        let Some(table) = partition::table_of(&key) else {
            continue;
        };
        if let Some(previous) = last_key.get(table) {
            assert!(previous < &key, "{key} written after {previous}");
        }
        last_key.insert(table.to_string(), key.clone());
    }
    assert_eq!(last_key.len(), 2);
}
