//! End-to-end import and deletion against real SQLite.

use annals_core::{
    DocumentId, HistoryStore, Importer, IntegrityLevel, IntegrityPolicy, LogEntry, MemorySource,
    NoSiblings, SENTINEL_HASH, VersionId, VersionTree,
    entry::stamp_entry_hash,
};
use annals_store::{DEFAULT_BUSY_TIMEOUT, LATEST_SCHEMA_VERSION, SqliteStore};
use serde_json::json;

fn doc() -> DocumentId {
    DocumentId::new("doc-sql").expect("valid id")
}

fn entry_after(parent: &str, seq: i64, variant: &str) -> LogEntry {
    let mut entry = LogEntry {
        entry_hash: String::new(),
        parent_entry_hash: parent.to_owned(),
        document_id: doc(),
        ts_us: 1_710_000_000_000_000 + seq,
        author: "editor".into(),
        payload: json!({"action": "edit", "seq": seq, "variant": variant}),
        owned_version_id: None,
    };
    stamp_entry_hash(&mut entry);
    entry
}

fn extend(prefix: &[LogEntry], extra: usize, variant: &str) -> Vec<LogEntry> {
    let mut out = prefix.to_vec();
    for i in 0..extra {
        let parent = out
            .last()
            .map_or_else(|| SENTINEL_HASH.to_owned(), |e| e.entry_hash.clone());
        out.push(entry_after(&parent, (prefix.len() + i) as i64, variant));
    }
    out
}

fn import(store: &mut SqliteStore, entries: Vec<LogEntry>, version: i64) -> u64 {
    let mut importer = Importer::new(
        store,
        &NoSiblings,
        IntegrityPolicy::new(IntegrityLevel::Strict),
    );
    importer
        .import_log(
            Some(MemorySource::from_chronological(entries)),
            Some(&doc()),
            VersionId::new(version),
        )
        .expect("import")
}

fn tree_of(store: &mut SqliteStore) -> VersionTree {
    let mut importer = Importer::new(
        store,
        &NoSiblings,
        IntegrityPolicy::new(IntegrityLevel::Strict),
    );
    importer.build_tree(&doc()).expect("reconstruct")
}

fn row_count(store: &SqliteStore) -> i64 {
    store
        .connection()
        .query_row("SELECT COUNT(*) FROM history_entries", [], |row| row.get(0))
        .expect("count")
}

#[test]
fn file_backed_store_sets_pragmas_and_migrates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("history.sqlite3");
    let store = SqliteStore::open(&path).expect("open");

    let journal_mode: String = store
        .connection()
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .expect("journal_mode");
    assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

    let busy_timeout_ms: u64 = store
        .connection()
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .expect("busy_timeout");
    assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());

    let foreign_keys: i64 = store
        .connection()
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .expect("foreign_keys");
    assert_eq!(foreign_keys, 1);

    assert_eq!(store.schema_version().expect("version"), LATEST_SCHEMA_VERSION);
}

#[test]
fn reopening_a_store_preserves_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("history.sqlite3");

    let entries = extend(&[], 3, "durable");
    {
        let mut store = SqliteStore::open(&path).expect("open");
        assert_eq!(import(&mut store, entries.clone(), 1), 3);
    }

    let mut store = SqliteStore::open(&path).expect("reopen");
    let tree = tree_of(&mut store);
    assert_eq!(tree.entry_count(), 3);
    let owned = tree
        .find_version_entry(VersionId::new(1))
        .expect("tag survived reopen");
    assert_eq!(tree.node(owned).entry_hash, entries[2].entry_hash);
}

#[test]
fn concrete_scenario_against_sqlite() {
    let shared = extend(&[], 2, "trunk");
    let version1 = extend(&shared, 1, "v1");
    let version2 = extend(&shared, 1, "v2");
    let e3_hash = version1[2].entry_hash.clone();
    let e4_hash = version2[2].entry_hash.clone();

    let mut store = SqliteStore::open_in_memory().expect("open");
    assert_eq!(import(&mut store, version1, 1), 3);
    assert_eq!(import(&mut store, version2, 2), 1);
    assert_eq!(row_count(&store), 4);

    let mut importer = Importer::new(
        &mut store,
        &NoSiblings,
        IntegrityPolicy::new(IntegrityLevel::Strict),
    );
    importer
        .delete_version_log(VersionId::new(1))
        .expect("delete v1");

    assert_eq!(row_count(&store), 3);
    let tree = tree_of(&mut store);
    let e2 = tree
        .child(VersionTree::ROOT, &shared[0].entry_hash)
        .and_then(|e1| tree.child(e1, &shared[1].entry_hash))
        .expect("shared prefix intact");
    assert!(!tree.has_child(e2, &e3_hash));
    assert!(tree.has_child(e2, &e4_hash));
}

#[test]
fn node_ids_are_never_reused() {
    let mut store = SqliteStore::open_in_memory().expect("open");
    let first_life = extend(&[], 2, "first");
    import(&mut store, first_life, 1);

    let max_id_before: i64 = store
        .connection()
        .query_row("SELECT MAX(id) FROM history_entries", [], |row| row.get(0))
        .expect("max id");

    let mut importer = Importer::new(
        &mut store,
        &NoSiblings,
        IntegrityPolicy::new(IntegrityLevel::Strict),
    );
    importer
        .delete_all_logs_for_document(&doc())
        .expect("delete all");
    assert_eq!(row_count(&store), 0);

    import(&mut store, extend(&[], 1, "second"), 2);
    let new_id: i64 = store
        .connection()
        .query_row("SELECT MIN(id) FROM history_entries", [], |row| row.get(0))
        .expect("min id");
    assert!(new_id > max_id_before, "AUTOINCREMENT must not reuse ids");
}

#[test]
fn rollback_discards_uncommitted_rows() {
    let mut store = SqliteStore::open_in_memory().expect("open");
    let entries = extend(&[], 2, "tx");

    store.begin().expect("begin");
    store.insert_node(&entries[0]).expect("insert");
    store.insert_node(&entries[1]).expect("insert");
    assert_eq!(row_count(&store), 2);
    store.rollback().expect("rollback");
    assert_eq!(row_count(&store), 0);
}

#[test]
fn failed_import_leaves_no_trace_in_sqlite() {
    // A log whose trailing digest is wrong must roll the whole merge back.
    let entries = extend(&[], 3, "tamper");
    let mut store = SqliteStore::open_in_memory().expect("open");
    let mut importer = Importer::new(
        &mut store,
        &NoSiblings,
        IntegrityPolicy::new(IntegrityLevel::HashChecked),
    );
    importer
        .import_log(
            Some(MemorySource::with_trailing_digest(
                entries,
                Some("blake3:0bad0bad".into()),
            )),
            Some(&doc()),
            VersionId::new(1),
        )
        .expect_err("digest mismatch");
    assert_eq!(row_count(&store), 0);
}

#[test]
fn duplicate_entry_rows_are_rejected_by_schema() {
    let mut store = SqliteStore::open_in_memory().expect("open");
    let entries = extend(&[], 1, "uniq");

    store.begin().expect("begin");
    store.insert_node(&entries[0]).expect("insert");
    let err = store.insert_node(&entries[0]).expect_err("unique constraint");
    let message = err.to_string();
    assert!(message.contains("UNIQUE") || message.contains("unique"), "{message}");
}
