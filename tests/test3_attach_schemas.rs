mod common;

use std::error::Error;

use common::init_tracing;
use sqlite_lease::prelude::*;
use sqlite_lease::sqlite::default_open_flags;
use tokio_util::sync::CancellationToken;

#[test]
fn bad_schema_name_fails_before_touching_the_engine() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("never.db");
    let conn = Conn::open_in_memory()?;

    let err = conn
        .attach("1bad", &path, true, default_open_flags())
        .unwrap_err();
    assert!(matches!(err, SqliteLeaseError::InvalidSchemaName(ref name) if name == "1bad"));
    assert!(!path.exists(), "no file may be created for a rejected name");
    assert_eq!(conn.schemas()?, vec!["main"]);
    Ok(())
}

#[test]
fn attach_creates_missing_file_when_allowed() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("logs.db");
    let conn = Conn::open_in_memory()?;

    let err = conn
        .attach("logs", &path, false, default_open_flags())
        .unwrap_err();
    assert!(matches!(err, SqliteLeaseError::StoreNotFound(ref missing) if *missing == path));

    conn.attach("logs", &path, true, default_open_flags())?;
    assert!(path.exists());
    assert_eq!(conn.schemas()?, vec!["main", "logs"]);
    let attached = conn.filename("logs")?.expect("file-backed schema");
    assert_eq!(attached.file_name(), path.file_name());
    assert_eq!(conn.filename("main")?, None);

    conn.execute_batch(
        "CREATE TABLE logs.events (msg TEXT);
         CREATE TABLE logs.audit (msg TEXT);
         INSERT INTO logs.events VALUES ('started');",
    )?;
    assert_eq!(conn.tables(Some("logs"))?, vec!["audit", "events"]);
    Ok(())
}

#[tokio::test]
async fn pool_connections_see_every_configured_schema() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let main = dir.path().join("main.db");
    let archive = dir.path().join("archive.db");

    let pool = PoolConfig::builder()
        .schema("main", &main)
        .schema("archive", &archive)
        .memory_schema("scratch")
        .max(2)
        .open(None)?;
    assert!(archive.exists());

    let cancel = CancellationToken::new();
    let lease = pool.get(&cancel).expect("lease");
    let (schemas, tables) = lease
        .with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE archive.old_orders (id INTEGER);
                 INSERT INTO archive.old_orders VALUES (1), (2);",
            )?;
            Ok((conn.schemas()?, conn.tables(Some("archive"))?))
        })
        .await?;
    assert_eq!(schemas, vec!["main", "archive", "scratch"]);
    assert_eq!(tables, vec!["old_orders"]);

    // A second connection attaches the same archive file.
    let other = pool.get(&cancel).expect("second lease");
    let rs = other
        .query("SELECT count(*) AS n FROM archive.old_orders", vec![])
        .await?;
    assert_eq!(rs.results[0].get("n"), Some(&RowValues::Int(2)));

    drop(lease);
    drop(other);
    pool.close().await?;
    Ok(())
}

#[test]
fn open_rejects_bad_schema_names_and_missing_main() {
    let err = PoolConfig::builder()
        .memory_schema("9lives")
        .open(None)
        .unwrap_err();
    assert!(matches!(err, SqliteLeaseError::InvalidSchemaName(_)));

    let config = PoolConfig::from_json(r#"{"databases": {"aux": ""}}"#).unwrap();
    let err = Pool::open(config, None).unwrap_err();
    assert!(matches!(err, SqliteLeaseError::MissingDefaultSchema(ref name) if name == "main"));
}

#[test]
fn every_failed_attach_is_reported() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let main = dir.path().join("main.db");
    Conn::open(&main, default_open_flags())?.close()?;

    let err = PoolConfig::builder()
        .schema("main", &main)
        .schema("first", dir.path().join("first.db"))
        .schema("second", dir.path().join("second.db"))
        .create(false)
        .open(None)
        .unwrap_err();

    let SqliteLeaseError::Aggregate(all) = err else {
        panic!("expected aggregated attach failures");
    };
    assert_eq!(all.len(), 2);
    assert!(
        all.errors()
            .iter()
            .all(|e| matches!(e, SqliteLeaseError::StoreNotFound(_)))
    );
    assert!(all.to_string().starts_with("2 errors occurred:"));
    Ok(())
}
