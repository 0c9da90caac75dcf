//! CRUD façade tests against the recording executor.
//!
//! Each test builds its own `Table`, so caches never leak between tests.

mod common;

use common::{fixed_now, role, Event, Membership, Role};
use quarry::mock::MockExecutor;
use quarry::{Operation, QuarryError, Table, UpsertOptions, Value};
use std::sync::Barrier;

fn roles() -> Table<Role> {
    Table::new().with_clock(fixed_now)
}

fn memberships() -> Table<Membership> {
    Table::new().with_clock(fixed_now)
}

#[test]
fn test_derived_entities_validate() {
    assert!(Table::<Role>::validate().is_ok());
    assert!(Table::<Membership>::validate().is_ok());
}

#[test]
fn test_insert_infers_columns_and_reads_back_defaults() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([vec![vec![Value::Int(Some(42))]]]);
    let mut admin = role("admin");

    table.insert(&db, &mut admin, &[]).unwrap();

    let stmt = db.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO \"roles\" (\"name\",\"created_at\",\"updated_at\") VALUES ($1,$2,$3) RETURNING \"id\""
    );
    assert_eq!(
        stmt.params,
        vec![
            Value::String(Some("admin".to_string())),
            Value::from(fixed_now()),
            Value::from(fixed_now()),
        ]
    );
    assert_eq!(admin.id, 42);
    assert_eq!(admin.created_at, Some(fixed_now()));
}

#[test]
fn test_insert_with_explicit_key_returns_nothing() {
    let table = roles();
    let db = MockExecutor::new().append_exec_results([1]);
    let mut admin = Role {
        id: 7,
        ..role("admin")
    };

    table.insert(&db, &mut admin, &[]).unwrap();

    assert_eq!(
        db.last_statement().unwrap().sql,
        "INSERT INTO \"roles\" (\"id\",\"name\",\"created_at\",\"updated_at\") VALUES ($1,$2,$3,$4)"
    );
}

#[test]
fn test_insert_whitelist_returns_everything_else() {
    let table = roles();
    let created = fixed_now() - chrono::Duration::days(1);
    let db = MockExecutor::new().append_query_results([vec![vec![
        Value::Int(Some(3)),
        Value::from(created),
        Value::from(fixed_now()),
    ]]]);
    let mut admin = role("admin");

    table.insert(&db, &mut admin, &["name"]).unwrap();

    assert_eq!(
        db.last_statement().unwrap().sql,
        "INSERT INTO \"roles\" (\"name\") VALUES ($1) RETURNING \"id\",\"created_at\",\"updated_at\""
    );
    assert_eq!(admin.id, 3);
    assert_eq!(admin.created_at, Some(created));
}

#[test]
fn test_insert_plans_are_cached_per_column_set() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([
        vec![vec![Value::Int(Some(1))]],
        vec![vec![Value::Int(Some(2))]],
    ]);

    table.insert(&db, &mut role("a"), &[]).unwrap();
    table.insert(&db, &mut role("b"), &[]).unwrap();
    assert_eq!(table.insert_cache().len(), 1);

    let db = MockExecutor::new();
    table
        .insert(&db, &mut Role { id: 9, ..role("c") }, &[])
        .unwrap();
    assert_eq!(table.insert_cache().len(), 2);
}

#[test]
fn test_update_key_whitelist_is_empty_column_set() {
    let table = roles();
    let db = MockExecutor::new();
    let mut admin = Role {
        id: 1,
        ..role("admin")
    };

    let err = table.update(&db, &mut admin, &["id"]).unwrap_err();

    assert!(matches!(
        err,
        QuarryError::EmptyColumnSet {
            op: Operation::Update,
            table: "roles"
        }
    ));
    assert!(db.statements().is_empty());
    assert!(table.update_cache().is_empty());
}

#[test]
fn test_update_all_columns_by_default() {
    let table = roles();
    let db = MockExecutor::new().append_exec_results([1]);
    let mut admin = Role {
        id: 5,
        ..role("admin")
    };

    assert_eq!(table.update(&db, &mut admin, &[]).unwrap(), 1);

    let stmt = db.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE \"roles\" SET \"name\"=$1,\"created_at\"=$2,\"updated_at\"=$3 WHERE \"id\"=$4"
    );
    assert_eq!(stmt.params[3], Value::Int(Some(5)));
    assert_eq!(admin.updated_at, Some(fixed_now()));
}

#[test]
fn test_update_composite_key_and_naive_timestamp() {
    let table = memberships();
    let db = MockExecutor::new().append_exec_results([1]);
    let mut membership = Membership {
        user_id: 1,
        group_id: 2,
        level: 3,
        ..Default::default()
    };

    table.update(&db, &mut membership, &["level", "modified"]).unwrap();

    let stmt = db.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE \"public\".\"memberships\" SET \"level\"=$1,\"modified\"=$2 WHERE \"user_id\"=$3 AND \"group_id\"=$4"
    );
    assert_eq!(membership.modified, Some(fixed_now().naive_utc()));
    assert_eq!(stmt.params[2], Value::BigInt(Some(1)));
    assert_eq!(stmt.params[3], Value::BigInt(Some(2)));
}

#[test]
fn test_upsert_do_nothing_conflict_leaves_record_alone() {
    let table = roles();
    let db = MockExecutor::new();
    let mut admin = Role {
        id: 1,
        ..role("admin")
    };
    let before = admin.clone();

    table
        .upsert(&db, &mut admin, &UpsertOptions::do_nothing())
        .unwrap();

    assert_eq!(
        db.last_statement().unwrap().sql,
        "INSERT INTO \"roles\" (\"id\",\"name\",\"created_at\",\"updated_at\") VALUES ($1,$2,$3,$4) \
         ON CONFLICT (\"id\") DO NOTHING"
    );
    assert_eq!(admin.id, before.id);
    assert_eq!(admin.name, before.name);
}

#[test]
fn test_upsert_do_update_reads_back_key() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([vec![vec![Value::Int(Some(8))]]]);
    let mut admin = role("admin");

    table
        .upsert(
            &db,
            &mut admin,
            &UpsertOptions::do_update()
                .conflict(&["name"])
                .update(&["updated_at"]),
        )
        .unwrap();

    assert_eq!(
        db.last_statement().unwrap().sql,
        "INSERT INTO \"roles\" (\"name\",\"created_at\",\"updated_at\") VALUES ($1,$2,$3) \
         ON CONFLICT (\"name\") DO UPDATE SET \"updated_at\"=EXCLUDED.\"updated_at\" RETURNING \"id\""
    );
    assert_eq!(admin.id, 8);
}

#[test]
fn test_upsert_modes_cache_separately() {
    let table = roles();
    let db = MockExecutor::new();
    let mut admin = Role {
        id: 1,
        ..role("admin")
    };

    table
        .upsert(&db, &mut admin, &UpsertOptions::do_nothing())
        .unwrap();
    table
        .upsert(&db, &mut admin, &UpsertOptions::do_update())
        .unwrap();
    table
        .upsert(&db, &mut admin, &UpsertOptions::do_update())
        .unwrap();

    assert_eq!(table.upsert_cache().len(), 2);
    assert_eq!(db.statements().len(), 3);
}

#[test]
fn test_upsert_unknown_conflict_column() {
    let table = roles();
    let db = MockExecutor::new();
    let err = table
        .upsert(
            &db,
            &mut role("admin"),
            &UpsertOptions::do_nothing().conflict(&["email"]),
        )
        .unwrap_err();
    assert!(matches!(err, QuarryError::UnknownColumn { ref column, .. } if column == "email"));
    assert!(db.statements().is_empty());
}

#[test]
fn test_delete_and_exists() {
    let table = memberships();
    let db = MockExecutor::new()
        .append_exec_results([1])
        .append_query_results([vec![vec![Value::Bool(Some(false))]]]);
    let membership = Membership {
        user_id: 4,
        group_id: 5,
        ..Default::default()
    };

    assert_eq!(table.delete(&db, &membership).unwrap(), 1);
    assert_eq!(
        db.last_statement().unwrap().sql,
        "DELETE FROM \"public\".\"memberships\" WHERE \"user_id\"=$1 AND \"group_id\"=$2"
    );

    let found = table
        .exists(&db, &[Value::BigInt(Some(4)), Value::BigInt(Some(5))])
        .unwrap();
    assert!(!found);
    assert_eq!(
        db.last_statement().unwrap().sql,
        "SELECT EXISTS(SELECT 1 FROM \"public\".\"memberships\" WHERE \"user_id\"=$1 AND \"group_id\"=$2 LIMIT 1)"
    );
}

#[test]
fn test_find_and_reload() {
    let table = roles();
    let row = vec![
        Value::Int(Some(2)),
        Value::String(Some("ops".to_string())),
        Value::from(fixed_now()),
        Value::ChronoDateTimeUtc(None),
    ];
    let db = MockExecutor::new().append_query_results([vec![row.clone()], vec![row]]);

    let found = table.find(&db, &[Value::Int(Some(2))], &[]).unwrap();
    assert_eq!(found.name, "ops");
    assert_eq!(found.updated_at, None);
    assert_eq!(
        db.last_statement().unwrap().sql,
        "SELECT \"id\",\"name\",\"created_at\",\"updated_at\" FROM \"roles\" WHERE \"id\"=$1"
    );

    let mut stale = Role {
        id: 2,
        ..role("stale")
    };
    table.reload(&db, &mut stale).unwrap();
    assert_eq!(stale, found);
}

#[test]
fn test_reload_missing_row_is_not_found() {
    let table = roles();
    let db = MockExecutor::new();
    let mut gone = Role {
        id: 99,
        ..role("gone")
    };
    let err = table.reload(&db, &mut gone).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(gone.name, "gone");
}

#[test]
fn test_reload_decode_failure_keeps_record() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([vec![vec![
        Value::Int(Some(2)),
        Value::Int(Some(17)),
        Value::ChronoDateTimeUtc(None),
        Value::ChronoDateTimeUtc(None),
    ]]]);
    let mut record = Role {
        id: 2,
        ..role("kept")
    };
    let err = table.reload(&db, &mut record).unwrap_err();
    assert!(matches!(err, QuarryError::Decode { ref column, .. } if column == "name"));
    assert_eq!(record.name, "kept");
}

#[test]
fn test_batch_operations() {
    let table = memberships();
    let batch = vec![
        Membership {
            user_id: 1,
            group_id: 10,
            ..Default::default()
        },
        Membership {
            user_id: 2,
            group_id: 20,
            ..Default::default()
        },
    ];
    let db = MockExecutor::new().append_exec_results([2, 2]);

    assert_eq!(
        table
            .update_all(&db, &batch, &[("level", Value::Int(Some(9)))])
            .unwrap(),
        2
    );
    let stmt = db.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE \"public\".\"memberships\" SET \"level\"=$1 WHERE (\"user_id\",\"group_id\") IN (($2,$3),($4,$5))"
    );
    assert_eq!(
        stmt.params,
        vec![
            Value::Int(Some(9)),
            Value::BigInt(Some(1)),
            Value::BigInt(Some(10)),
            Value::BigInt(Some(2)),
            Value::BigInt(Some(20)),
        ]
    );

    assert_eq!(table.delete_all(&db, &batch).unwrap(), 2);
    assert_eq!(
        db.last_statement().unwrap().sql,
        "DELETE FROM \"public\".\"memberships\" WHERE (\"user_id\",\"group_id\") IN (($1,$2),($3,$4))"
    );

    assert_eq!(table.delete_all(&db, &[]).unwrap(), 0);
    assert_eq!(db.statements().len(), 2);
}

#[test]
fn test_reload_all_drops_deleted_rows() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([vec![vec![
        Value::Int(Some(1)),
        Value::String(Some("fresh".to_string())),
        Value::ChronoDateTimeUtc(None),
        Value::ChronoDateTimeUtc(None),
    ]]]);
    let mut batch = vec![
        Role {
            id: 1,
            ..role("stale")
        },
        Role {
            id: 2,
            ..role("deleted")
        },
    ];

    table.reload_all(&db, &mut batch).unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].name, "fresh");
    assert_eq!(
        db.last_statement().unwrap().sql,
        "SELECT \"id\",\"name\",\"created_at\",\"updated_at\" FROM \"roles\" WHERE (\"id\") IN ($1,$2)"
    );
}

#[test]
fn test_concurrent_first_use_stores_one_plan() {
    let table = roles();
    let db = MockExecutor::new().append_query_results([
        vec![vec![Value::Int(Some(1))]],
        vec![vec![Value::Int(Some(2))]],
    ]);
    let barrier = Barrier::new(2);

    std::thread::scope(|s| {
        for name in ["left", "right"] {
            let (table, db, barrier) = (&table, &db, &barrier);
            s.spawn(move || {
                let mut record = role(name);
                barrier.wait();
                table.insert(db, &mut record, &[]).unwrap();
                assert_ne!(record.id, 0);
            });
        }
    });

    assert_eq!(table.insert_cache().len(), 1);
    let statements = db.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].sql, statements[1].sql);
}

#[test]
fn test_executor_failure_surfaces_cause() {
    let table = roles();
    let db = MockExecutor::new().append_error("duplicate key value violates unique constraint");
    let err = table.insert(&db, &mut role("admin"), &[]).unwrap_err();

    assert!(matches!(
        err,
        QuarryError::ExecutionFailed {
            op: Operation::Insert,
            ..
        }
    ));
    let source = std::error::Error::source(&err).unwrap();
    assert!(source.to_string().contains("duplicate key"));
}

#[test]
fn test_non_timestamp_updated_at_is_written_as_given() {
    let table = Table::<Event>::new().with_clock(fixed_now);
    let db = MockExecutor::new().append_exec_results([1]);
    let mut event = Event {
        id: 3,
        name: "deploy".to_string(),
        updated_at: 1_714_564_800,
    };

    assert_eq!(table.update(&db, &mut event, &[]).unwrap(), 1);

    let stmt = db.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE \"events\" SET \"name\"=$1,\"updated_at\"=$2 WHERE \"id\"=$3"
    );
    assert_eq!(stmt.params[1], Value::BigInt(Some(1_714_564_800)));
    assert_eq!(event.updated_at, 1_714_564_800);

    table
        .upsert(&db, &mut event, &UpsertOptions::do_nothing())
        .unwrap();
    assert_eq!(db.statements().len(), 2);
}
