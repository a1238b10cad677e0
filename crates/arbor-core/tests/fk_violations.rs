//! Integration tests for merge-time foreign key violation detection.

use std::sync::Arc;
use std::time::Duration;

use arbor_core::store::{
    Context, Hash, MemoryNodeStore, NodeStore, OrderedMap, SledNodeStore, StoreConfig, StoreError,
};
use arbor_core::{
    detect_child_side_violations, detect_parent_side_violations, ArtifactKey, ArtifactKind,
    CheckerConfig, Column, ColumnType, Detection, Error, FkCVMeta, ForeignKey, IndexDef,
    LoadedTable, Root, Table, TableSchema, Value, ViolationChecker,
};

struct TestContext {
    store: Arc<dyn NodeStore>,
    ctx: Context,
    provenance: Hash,
}

impl TestContext {
    fn new() -> Self {
        init_tracing();
        Self::with_store(MemoryNodeStore::shared())
    }

    fn with_store(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            ctx: Context::background(),
            provenance: Hash::of(b"their-root"),
        }
    }

    /// Create a table holding `rows`.
    fn table(&self, schema: TableSchema, rows: &[Vec<Value>]) -> Table {
        let table = Table::new(Arc::clone(&self.store), schema).unwrap();
        self.insert(&table, rows)
    }

    fn insert(&self, table: &Table, rows: &[Vec<Value>]) -> Table {
        let mut editor = table.editor().unwrap();
        for row in rows {
            editor.insert(&self.ctx, row).unwrap();
        }
        editor.flush(&self.ctx).unwrap()
    }

    fn delete(&self, table: &Table, rows: &[Vec<Value>]) -> Table {
        let mut editor = table.editor().unwrap();
        for row in rows {
            assert!(editor.delete(&self.ctx, row).unwrap());
        }
        editor.flush(&self.ctx).unwrap()
    }

    fn info(&self, fk: &ForeignKey, child: &Table, parent: &Table) -> Vec<u8> {
        FkCVMeta::for_foreign_key(fk, child.schema(), parent.schema())
            .unwrap()
            .to_json()
            .unwrap()
    }

    fn parent_side(
        &self,
        fk: &ForeignKey,
        pre_parent: &Table,
        parent: &Table,
        child: &Table,
    ) -> arbor_core::Result<Detection> {
        detect_parent_side_violations(
            &self.ctx,
            fk,
            pre_parent.rows(),
            &LoadedTable::load(parent, &fk.parent_index).unwrap(),
            &LoadedTable::load(child, &fk.child_index).unwrap(),
            self.provenance,
            &self.info(fk, child, parent),
        )
    }

    fn child_side(
        &self,
        fk: &ForeignKey,
        pre_child: &Table,
        parent: &Table,
        child: &Table,
    ) -> arbor_core::Result<Detection> {
        detect_child_side_violations(
            &self.ctx,
            fk,
            pre_child.rows(),
            &LoadedTable::load(parent, &fk.parent_index).unwrap(),
            &LoadedTable::load(child, &fk.child_index).unwrap(),
            self.provenance,
            &self.info(fk, child, parent),
        )
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int(n: i64) -> Value {
    Value::Int64(n)
}

fn parent_schema(name: &str) -> TableSchema {
    TableSchema::new(name)
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_index(IndexDef::new("id_idx", [1]))
}

/// `C(id PK, pid -> P.id, qid -> Q.id)`
fn child_schema() -> TableSchema {
    TableSchema::new("C")
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_column(Column::new("pid", 2, ColumnType::Int64))
        .with_column(Column::new("qid", 3, ColumnType::Int64))
        .with_index(IndexDef::new("pid_idx", [2]))
        .with_index(IndexDef::new("qid_idx", [3]))
}

fn fk_p() -> ForeignKey {
    ForeignKey::new("fk_p", "C", [2], "P", [1])
        .with_child_index("pid_idx")
        .with_parent_index("id_idx")
}

fn fk_q() -> ForeignKey {
    ForeignKey::new("fk_q", "C", [3], "Q", [1])
        .with_child_index("qid_idx")
        .with_parent_index("id_idx")
}

#[test]
fn test_parent_delete_orphans_child() {
    let t = TestContext::new();
    let pre_parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let child = t.table(child_schema(), &[vec![int(10), int(1), Value::Null]]);
    let post_parent = t.delete(&pre_parent, &[vec![int(1)]]);

    let detection = t.parent_side(&fk_p(), &pre_parent, &post_parent, &child).unwrap();
    assert!(detection.found_violation);

    let violations = detection.table.violations(&t.ctx).unwrap();
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.kind, ArtifactKind::ForeignKeyViolation);
    assert_eq!(violation.pk, "(10)");
    assert_eq!(violation.row, vec![int(10), int(1), Value::Null]);
    assert_eq!(violation.provenance, t.provenance);

    let meta = violation.fk_meta().unwrap().unwrap();
    assert_eq!(meta.foreign_key, "fk_p");
    assert_eq!(meta.referenced_table, "P");
    assert_eq!(meta.on_delete, "RESTRICT");
    assert!(violation.info_text().starts_with(r#"{"Columns": ["pid"], "ForeignKey": "fk_p""#));

    // Rows are untouched; only the artifact index changes
    assert_eq!(detection.table.rows(), child.rows());
}

#[test]
fn test_orphan_child_insert() {
    let t = TestContext::new();
    let parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let pre_child = t.table(child_schema(), &[vec![int(10), int(1), Value::Null]]);
    let post_child = t.insert(&pre_child, &[vec![int(11), int(2), Value::Null]]);

    let detection = t.child_side(&fk_p(), &pre_child, &parent, &post_child).unwrap();
    assert!(detection.found_violation);

    let violations = detection.table.violations(&t.ctx).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].pk, "(11)");
    assert_eq!(violations[0].row, vec![int(11), int(2), Value::Null]);
}

#[test]
fn test_null_foreign_key_is_exempt() {
    let t = TestContext::new();
    let parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let pre_child = t.table(child_schema(), &[]);
    let post_child = t.insert(&pre_child, &[vec![int(12), Value::Null, Value::Null]]);

    let detection = t.child_side(&fk_p(), &pre_child, &parent, &post_child).unwrap();
    assert!(!detection.found_violation);
    assert_eq!(detection.table.artifacts(), post_child.artifacts());
}

#[test]
fn test_row_violating_two_foreign_keys_conflicts() {
    let t = TestContext::new();
    let p = t.table(parent_schema("P"), &[vec![int(1)]]);
    let q = t.table(parent_schema("Q"), &[vec![int(1)]]);
    let pre_child = t.table(child_schema(), &[]);
    let post_child = t.insert(&pre_child, &[vec![int(12), int(5), int(6)]]);

    let first = t.child_side(&fk_p(), &pre_child, &p, &post_child).unwrap();
    assert!(first.found_violation);

    let err = t.child_side(&fk_q(), &pre_child, &q, &first.table).unwrap_err();
    assert!(err.is_multiple_violations());
    assert_eq!(
        err.to_string(),
        "multiple violations for row not supported: pk (12) of table 'C' violates foreign keys 'P (id)' and 'Q (id)'"
    );
}

#[test]
fn test_detection_is_idempotent() {
    let t = TestContext::new();
    let parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let pre_child = t.table(child_schema(), &[]);
    let post_child = t.insert(&pre_child, &[vec![int(11), int(2), Value::Null]]);

    let first = t.child_side(&fk_p(), &pre_child, &parent, &post_child).unwrap();
    let second = t.child_side(&fk_p(), &pre_child, &parent, &first.table).unwrap();

    assert!(second.found_violation);
    assert_eq!(second.table.artifacts(), first.table.artifacts());
    assert_eq!(second.table.violations(&t.ctx).unwrap().len(), 1);
}

#[test]
fn test_equivalent_parent_keeps_children_valid() {
    let t = TestContext::new();
    let parent_schema = TableSchema::new("P")
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_column(Column::new("code", 2, ColumnType::Int64))
        .with_index(IndexDef::new("code_idx", [2]));
    let child_schema = TableSchema::new("C")
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_column(Column::new("code", 2, ColumnType::Int64))
        .with_index(IndexDef::new("code_idx", [2]));
    let fk = ForeignKey::new("fk_code", "C", [2], "P", [2])
        .with_child_index("code_idx")
        .with_parent_index("code_idx");

    let pre_parent = t.table(
        parent_schema,
        &[
            vec![int(1), int(7)],
            vec![int(2), int(7)],
            vec![int(3), Value::Null],
        ],
    );
    let child = t.table(
        child_schema,
        &[
            vec![int(10), int(7)],
            vec![int(11), int(7)],
            vec![int(30), Value::Null],
        ],
    );

    // Another parent with code 7 remains, and NULL rows never match
    let post_parent = t.delete(&pre_parent, &[vec![int(1), Value::Null], vec![int(3), Value::Null]]);
    let detection = t.parent_side(&fk, &pre_parent, &post_parent, &child).unwrap();
    assert!(!detection.found_violation);

    // Changing the last parent's code orphans both children with code 7
    let post_parent = t.insert(&post_parent, &[vec![int(2), int(8)]]);
    let detection = t.parent_side(&fk, &pre_parent, &post_parent, &child).unwrap();
    assert!(detection.found_violation);

    let pks: Vec<String> = detection
        .table
        .violations(&t.ctx)
        .unwrap()
        .into_iter()
        .map(|v| v.pk)
        .collect();
    assert_eq!(pks, vec!["(10)", "(11)"]);
}

#[test]
fn test_updated_child_foreign_key() {
    let t = TestContext::new();
    let parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let pre_child = t.table(
        child_schema(),
        &[
            vec![int(10), int(1), Value::Null],
            vec![int(11), int(1), Value::Null],
        ],
    );

    // Row 10 now points at a missing parent, row 11 drops its reference
    let post_child = t.insert(
        &pre_child,
        &[
            vec![int(10), int(5), Value::Null],
            vec![int(11), Value::Null, Value::Null],
        ],
    );

    let detection = t.child_side(&fk_p(), &pre_child, &parent, &post_child).unwrap();
    assert!(detection.found_violation);

    let violations = detection.table.violations(&t.ctx).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].pk, "(10)");
    assert_eq!(violations[0].row, vec![int(10), int(5), Value::Null]);
}

#[test]
fn test_parent_update_outside_foreign_key_columns() {
    let t = TestContext::new();
    let schema = TableSchema::new("P")
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_column(Column::new("name", 2, ColumnType::String))
        .with_index(IndexDef::new("id_idx", [1]));

    let pre_parent = t.table(schema, &[vec![int(1), Value::String("old".into())]]);
    let child = t.table(child_schema(), &[vec![int(10), int(1), Value::Null]]);
    let post_parent = t.insert(&pre_parent, &[vec![int(1), Value::String("new".into())]]);
    assert_ne!(post_parent.rows(), pre_parent.rows());

    // The modified parent still satisfies its own children
    let detection = t.parent_side(&fk_p(), &pre_parent, &post_parent, &child).unwrap();
    assert!(!detection.found_violation);
    assert_eq!(detection.table.artifacts(), child.artifacts());
}

#[test]
fn test_added_parent_and_removed_child_are_ignored() {
    let t = TestContext::new();
    let pre_parent = t.table(parent_schema("P"), &[]);
    let post_parent = t.insert(&pre_parent, &[vec![int(1)]]);
    let pre_child = t.table(child_schema(), &[vec![int(10), int(9), Value::Null]]);
    let post_child = t.delete(&pre_child, &[vec![int(10), Value::Null, Value::Null]]);

    let parent_side = t.parent_side(&fk_p(), &pre_parent, &post_parent, &post_child).unwrap();
    assert!(!parent_side.found_violation);

    let child_side = t.child_side(&fk_p(), &pre_child, &post_parent, &post_child).unwrap();
    assert!(!child_side.found_violation);
}

#[test]
fn test_keyless_child_table() {
    let t = TestContext::new();
    let log_schema = TableSchema::new("L")
        .with_column(Column::new("pid", 1, ColumnType::Int64))
        .with_column(Column::new("note", 2, ColumnType::String))
        .with_index(IndexDef::new("pid_idx", [1]));
    let fk = ForeignKey::new("fk_log", "L", [1], "P", [1])
        .with_child_index("pid_idx")
        .with_parent_index("id_idx");

    let pre_parent = t.table(parent_schema("P"), &[vec![int(1)], vec![int(2)]]);
    let row = vec![int(1), Value::String("dup".into())];
    let pre_log = t.table(log_schema, &[row.clone(), row.clone()]);

    // Parent side: removing P(1) orphans the (duplicated) log row once
    let post_parent = t.delete(&pre_parent, &[vec![int(1)]]);
    let detection = t.parent_side(&fk, &pre_parent, &post_parent, &pre_log).unwrap();
    assert!(detection.found_violation);
    let violations = detection.table.violations(&t.ctx).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].row, row);

    // Child side: a new log row pointing at a missing parent
    let post_log = t.insert(&detection.table, &[vec![int(3), Value::Null]]);
    let detection = t.child_side(&fk, &pre_log, &post_parent, &post_log).unwrap();
    assert!(detection.found_violation);
    assert_eq!(detection.table.violations(&t.ctx).unwrap().len(), 2);
}

#[test]
fn test_composite_foreign_key() {
    let t = TestContext::new();
    let parent_schema = TableSchema::new("PP")
        .with_column(Column::primary_key("a", 1, ColumnType::Int64))
        .with_column(Column::primary_key("b", 2, ColumnType::String))
        .with_index(IndexDef::new("ab", [1, 2]));
    let child_schema = TableSchema::new("CC")
        .with_column(Column::primary_key("id", 1, ColumnType::Int64))
        .with_column(Column::new("a", 2, ColumnType::Int64))
        .with_column(Column::new("b", 3, ColumnType::String))
        .with_index(IndexDef::new("ab_idx", [2, 3]));
    let fk = ForeignKey::new("fk_ab", "CC", [2, 3], "PP", [1, 2])
        .with_child_index("ab_idx")
        .with_parent_index("ab");

    let text = |s: &str| Value::String(s.into());
    let parent = t.table(parent_schema, &[vec![int(1), text("x")]]);
    let pre_child = t.table(child_schema, &[]);
    let post_child = t.insert(
        &pre_child,
        &[
            vec![int(1), int(1), Value::Null],
            vec![int(2), int(1), text("y")],
            vec![int(3), int(1), text("x")],
        ],
    );

    let detection = t.child_side(&fk, &pre_child, &parent, &post_child).unwrap();
    let violations = detection.table.violations(&t.ctx).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].pk, "(2)");
    assert_eq!(
        violations[0].fk_meta().unwrap().unwrap().referenced_table_and_columns(),
        "PP (a, b)"
    );
}

#[test]
fn test_cancelled_detection_fails() {
    let t = TestContext::new();
    let pre_parent = t.table(parent_schema("P"), &[vec![int(1)]]);
    let child = t.table(child_schema(), &[vec![int(10), int(1), Value::Null]]);
    let post_parent = t.delete(&pre_parent, &[vec![int(1)]]);

    t.ctx.cancel();
    let err = t.parent_side(&fk_p(), &pre_parent, &post_parent, &child).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Cancelled)));
}

fn roots(t: &TestContext) -> (Root, Root) {
    let p = t.table(parent_schema("P"), &[vec![int(1)], vec![int(2)]]);
    let q = t.table(parent_schema("Q"), &[vec![int(1)]]);
    let c = t.table(child_schema(), &[vec![int(10), int(1), int(1)]]);

    let base = Root::new()
        .with_table(p.clone())
        .with_table(q)
        .with_table(c.clone())
        .with_foreign_key(fk_p())
        .unwrap()
        .with_foreign_key(fk_q())
        .unwrap();

    let mut merged = base.clone();
    merged.put_table(t.delete(&p, &[vec![int(1)]]));
    merged.put_table(t.insert(&c, &[vec![int(11), Value::Null, int(5)]]));
    (base, merged)
}

#[test]
fn test_checker_over_root() {
    let t = TestContext::new();
    let (base, merged) = roots(&t);

    let checker = ViolationChecker::default();
    let outcome = checker.check(&t.ctx, &base, &merged, t.provenance).unwrap();
    assert!(outcome.has_violations());
    assert_eq!(outcome.violating_tables.iter().collect::<Vec<_>>(), vec!["C"]);

    let child = outcome.root.table("C").unwrap();
    let violations = child.violations(&t.ctx).unwrap();
    let found: Vec<(String, String)> = violations
        .iter()
        .map(|v| (v.pk.clone(), v.fk_meta().unwrap().unwrap().foreign_key))
        .collect();
    assert_eq!(
        found,
        vec![("(10)".to_string(), "fk_p".to_string()), ("(11)".to_string(), "fk_q".to_string())]
    );

    // Checking again records nothing new
    let again = checker.check(&t.ctx, &base, &outcome.root, t.provenance).unwrap();
    assert_eq!(
        again.root.table("C").unwrap().artifacts(),
        child.artifacts()
    );
}

#[test]
fn test_checker_reports_conflicts() {
    let t = TestContext::new();
    let (base, mut merged) = roots(&t);
    let c = merged.table("C").unwrap().clone();
    merged.put_table(t.insert(&c, &[vec![int(12), int(5), int(6)]]));

    let err = ViolationChecker::default()
        .check(&t.ctx, &base, &merged, t.provenance)
        .unwrap_err();
    assert!(err.is_multiple_violations());
    assert!(err.to_string().contains("pk (12) of table 'C'"));
}

#[test]
fn test_checker_timeout() {
    let t = TestContext::new();
    let (base, merged) = roots(&t);

    let checker = ViolationChecker::new(CheckerConfig::default().with_timeout(Duration::ZERO));
    let err = checker.check(&t.ctx, &base, &merged, t.provenance).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::DeadlineExceeded)));
}

#[test]
fn test_sled_backed_artifacts_persist() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("arbor"));

    let artifacts_root = {
        let sled_store = Arc::new(SledNodeStore::open(&config).unwrap());
        let t = TestContext::with_store(sled_store.clone());

        let pre_parent = t.table(parent_schema("P"), &[vec![int(1)]]);
        let child = t.table(child_schema(), &[vec![int(10), int(1), Value::Null]]);
        let post_parent = t.delete(&pre_parent, &[vec![int(1)]]);

        let detection = t.parent_side(&fk_p(), &pre_parent, &post_parent, &child).unwrap();
        let root = detection.table.artifacts().root();
        sled_store.set_root("C/artifacts", root).unwrap();
        sled_store.flush().unwrap();
        root
    };

    let sled_store = Arc::new(SledNodeStore::open(&config).unwrap());
    assert_eq!(sled_store.root("C/artifacts").unwrap(), Some(artifacts_root));

    let ctx = Context::background();
    let artifacts = OrderedMap::load(sled_store, artifacts_root);
    let entries: Vec<_> = artifacts.iter_all(&ctx).unwrap().map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 1);

    let key = ArtifactKey::decode(&entries[0].0).unwrap();
    assert_eq!(key.kind, ArtifactKind::ForeignKeyViolation);
    assert_eq!(key.provenance, Hash::of(b"their-root"));
}
