//! Query counting assertions for database tests.
//!
//! [`assert_num_queries`] counts the round trips made while a closure runs and
//! asserts that the count matches an expected value, which is how N+1 access
//! patterns are caught in tests. When the assertion fails the captured
//! statements are listed after the count.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ormlabs_test::assert_queries::assert_num_queries;
//! use ormlabs_test::test_database::TestDatabase;
//!
//! let db = TestDatabase::new(|_registry| Ok(()));
//! assert_num_queries(&db, 0, || {});
//! ```

use std::future::Future;

use crate::test_database::TestDatabase;

fn query_listing(db: &TestDatabase) -> String {
    let captured = db.captured_queries();
    if captured.is_empty() {
        return String::new();
    }
    let mut listing = String::from("\nCaptured queries were:");
    for (i, sql) in captured.iter().enumerate() {
        listing.push_str(&format!("\n{}. {sql}", i + 1));
    }
    listing
}

fn check_exact(db: &TestDatabase, expected_count: usize) {
    let actual = db.query_count();
    assert!(
        actual == expected_count,
        "Expected {expected_count} SQL queries, but {actual} were executed{}",
        query_listing(db)
    );
}

fn check_max(db: &TestDatabase, max_count: usize) {
    let actual = db.query_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} SQL queries, but {actual} were executed{}",
        query_listing(db)
    );
}

/// Asserts that exactly `expected_count` SQL queries are executed during the
/// closure.
///
/// Resets the query counter on the [`TestDatabase`] before running the
/// closure, then checks the counter afterwards.
///
/// # Panics
///
/// Panics if the number of queries does not match `expected_count`.
pub fn assert_num_queries<F>(db: &TestDatabase, expected_count: usize, f: F)
where
    F: FnOnce(),
{
    db.reset_query_count();
    f();
    check_exact(db, expected_count);
}

/// Asserts that at most `max_count` SQL queries are executed during the
/// closure.
///
/// # Panics
///
/// Panics if more than `max_count` queries are executed.
pub fn assert_max_queries<F>(db: &TestDatabase, max_count: usize, f: F)
where
    F: FnOnce(),
{
    db.reset_query_count();
    f();
    check_max(db, max_count);
}

/// Async form of [`assert_num_queries`].
///
/// # Panics
///
/// Panics if the number of queries does not match `expected_count`.
pub async fn assert_num_queries_async<F, Fut>(db: &TestDatabase, expected_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    db.reset_query_count();
    f().await;
    check_exact(db, expected_count);
}

/// Async form of [`assert_max_queries`].
///
/// # Panics
///
/// Panics if more than `max_count` queries are executed.
pub async fn assert_max_queries_async<F, Fut>(db: &TestDatabase, max_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    db.reset_query_count();
    f().await;
    check_max(db, max_count);
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use ormlabs_core::LabsResult;
    use ormlabs_db::fields::{FieldDef, FieldType};
    use ormlabs_db::{Accessor, DbExecutor, Model, ModelMeta, Row, Value};

    use super::*;

    struct Note {
        id: i64,
        body: String,
    }

    impl Model for Note {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new("notes", "note")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(FieldDef::new("body", FieldType::TextField))
            });
            &META
        }

        fn accessors() -> &'static [Accessor<Self>] {
            static ACCESSORS: &[Accessor<Note>] = &[
                Accessor::new("id", |n| Value::from(n.id)),
                Accessor::new("body", |n| Value::from(n.body.as_str())),
            ];
            ACCESSORS
        }

        fn from_row(row: &Row) -> LabsResult<Self> {
            Ok(Self {
                id: row.get("id")?,
                body: row.get("body")?,
            })
        }
    }

    fn note_db() -> TestDatabase {
        TestDatabase::new(|registry| registry.register::<Note>())
    }

    fn add_note(db: &TestDatabase, body: &str) {
        db.insert("notes.note", Row::from_pairs([("body", Value::from(body))]))
            .unwrap();
    }

    #[test]
    fn test_assert_num_queries_passes() {
        let db = note_db();
        assert_num_queries(&db, 2, || {
            add_note(&db, "a");
            add_note(&db, "b");
        });
    }

    #[test]
    fn test_assert_num_queries_zero() {
        let db = note_db();
        add_note(&db, "before");
        assert_num_queries(&db, 0, || {
            // No queries
        });
    }

    #[test]
    #[should_panic(expected = "Expected 1 SQL queries, but 2 were executed")]
    fn test_assert_num_queries_fails_too_many() {
        let db = note_db();
        assert_num_queries(&db, 1, || {
            add_note(&db, "a");
            add_note(&db, "b");
        });
    }

    #[test]
    #[should_panic(expected = "Expected 3 SQL queries, but 1 were executed")]
    fn test_assert_num_queries_fails_too_few() {
        let db = note_db();
        assert_num_queries(&db, 3, || {
            db.all("notes.note").unwrap();
        });
    }

    #[test]
    #[should_panic(expected = "Captured queries were:\n1. SELECT")]
    fn test_failure_lists_captured_queries() {
        let db = note_db();
        assert_num_queries(&db, 0, || {
            db.all("notes.note").unwrap();
        });
    }

    #[test]
    fn test_assert_max_queries_passes() {
        let db = note_db();
        assert_max_queries(&db, 5, || {
            add_note(&db, "a");
            db.all("notes.note").unwrap();
        });
    }

    #[test]
    #[should_panic(expected = "Expected at most 1 SQL queries, but 2 were executed")]
    fn test_assert_max_queries_fails() {
        let db = note_db();
        assert_max_queries(&db, 1, || {
            add_note(&db, "a");
            add_note(&db, "b");
        });
    }

    #[tokio::test]
    async fn test_async_assertions() {
        let db = note_db();
        assert_num_queries_async(&db, 1, || async {
            add_note(&db, "a");
        })
        .await;
        assert_max_queries_async(&db, 1, || async {
            db.all("notes.note").unwrap();
        })
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "Expected 0 SQL queries, but 1 were executed")]
    async fn test_async_assertion_fails() {
        let db = note_db();
        assert_num_queries_async(&db, 0, || async {
            add_note(&db, "a");
        })
        .await;
    }
}
