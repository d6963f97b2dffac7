use std::sync::Arc;

use chrono::NaiveDateTime;
use rsync_stats::{
    types::{CompletedEvent, Direction},
    writer::{BulkWriter, DEFAULT_TABLE},
};
use sqlx::PgPool;

fn event(pid: &str, hostname: &str, sentbytes: &str) -> CompletedEvent {
    CompletedEvent {
        timestamp: "2023-01-05 12:00:00".to_string(),
        endtime: "2023-01-05 12:03:10".to_string(),
        pid: pid.to_string(),
        direction: Direction::Download,
        module: "pub".to_string(),
        directory: String::new(),
        user: String::new(),
        hostname: hostname.to_string(),
        clientip: "13.106.122.3".to_string(),
        sentbytes: sentbytes.to_string(),
        receivedbytes: "50".to_string(),
        totalbytes: "1000".to_string(),
        geohash: "r3gx2f77b".to_string(),
        city: "Sydney".to_string(),
        hosthash: "abcdefghij".to_string(),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn bulk_loads_events(db: PgPool) {
    let writer = BulkWriter::new(Arc::new(db.clone()), DEFAULT_TABLE, false).unwrap();

    let rows = writer
        .write(&[event("1", "a.example.org", "100"), event("2", "b\tweird host", "200")])
        .await;
    assert_eq!(rows, 2);

    let stored: Vec<(NaiveDateTime, i64, String, Option<String>, String)> = sqlx::query_as(
        r#"SELECT endtime, sentbytes, "user", hostname, geohash FROM rsync_events ORDER BY sentbytes"#,
    )
    .fetch_all(&db)
    .await
    .unwrap();

    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored[0].0,
        NaiveDateTime::parse_from_str("2023-01-05 12:03:10", "%Y-%m-%d %H:%M:%S").unwrap()
    );
    assert_eq!(stored[0].1, 100);
    assert_eq!(stored[0].2, "");
    assert_eq!(stored[0].3, None);
    assert_eq!(stored[1].4, "r3gx2f77b");
}

#[sqlx::test(migrations = "./migrations")]
async fn persists_hostnames_when_enabled(db: PgPool) {
    let writer = BulkWriter::new(Arc::new(db.clone()), DEFAULT_TABLE, true).unwrap();

    assert_eq!(writer.write(&[event("1", "b\tweird host", "1")]).await, 1);

    let hostname: Option<String> = sqlx::query_scalar("SELECT hostname FROM rsync_events")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(hostname.as_deref(), Some("b\tweird host"));
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_copy_is_reported_as_zero_rows(db: PgPool) {
    let writer = BulkWriter::new(Arc::new(db.clone()), "missing_table", false).unwrap();

    assert_eq!(writer.write(&[event("1", "a.example.org", "1")]).await, 0);
    assert!(writer.try_write(&[event("1", "a.example.org", "1")]).await.is_err());
}
