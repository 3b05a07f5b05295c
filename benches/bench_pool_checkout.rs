#![allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]

//! Criterion benchmark for lease checkout and single-row lookups through a
//! leased connection, fanned out across several workers.

use std::hint::black_box;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sqlite_lease::{Conn, Pool, PoolConfig, RowValues, SqliteLeaseError};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const SQLITE_SELECT: &str = "SELECT id, name, score, active FROM test WHERE id = ?1";

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

// Dataset prepared once and reused across benchmark runs.
static DATASET: LazyLock<(PathBuf, Vec<i64>)> = LazyLock::new(|| {
    let row_count = lookup_row_count_to_run();
    let path = PathBuf::from("benchmark_sqlite_lease_lookup.db");
    prepare_dataset(&path, row_count).expect("prepare sqlite dataset");

    // Deterministic scatter so consecutive lookups do not hit neighbouring pages.
    let ids = (0..row_count as i64)
        .map(|i| (i * 7919) % row_count as i64 + 1)
        .collect();
    (path, ids)
});

static BENCH_CONCURRENCY: LazyLock<usize> = LazyLock::new(|| {
    std::env::var("BENCH_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8usize)
        .max(1)
});

fn lookup_row_count_to_run() -> usize {
    std::env::var("BENCH_LOOKUPS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1024)
}

fn prepare_dataset(path: &Path, row_count: usize) -> Result<(), SqliteLeaseError> {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    let mut conn = Conn::open(path, sqlite_lease::sqlite::default_open_flags())?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE test (
             id      INTEGER PRIMARY KEY,
             name    TEXT NOT NULL,
             score   REAL NOT NULL,
             active  INTEGER NOT NULL
         );",
    )?;
    conn.transaction(sqlite_lease::TransactionMode::Immediate, |tx| {
        let mut insert =
            tx.prepare("INSERT INTO test (id, name, score, active) VALUES (?1, ?2, ?3, ?4)")?;
        let mut outcome = Ok(());
        for id in 1..=row_count as i64 {
            let params = [
                RowValues::Int(id),
                RowValues::Text(format!("name-{id}")),
                RowValues::Float(id as f64 * 0.5),
                RowValues::Bool(id % 2 == 0),
            ];
            if let Err(err) = insert.exec(0, &params) {
                outcome = Err(err);
                break;
            }
        }
        let closed = insert.close();
        outcome.and(closed)
    })?;
    conn.close()
}

fn open_pool() -> Pool {
    PoolConfig::builder()
        .schema("main", &DATASET.0)
        .max(*BENCH_CONCURRENCY * 2)
        .open(None)
        .expect("open pool")
}

async fn parallel_lookups(pool: &Pool, ids: &[i64], concurrency: usize) -> Result<(), SqliteLeaseError> {
    let per_worker = ids.len().div_ceil(concurrency).max(1);
    let mut join_set = JoinSet::new();

    for chunk in ids.chunks(per_worker) {
        let pool = pool.clone();
        let chunk = chunk.to_vec();
        join_set.spawn(async move {
            let lease = pool
                .get(&CancellationToken::new())
                .ok_or(SqliteLeaseError::PoolExhausted { max: pool.max() })?;
            lease
                .with_connection(move |conn| {
                    let mut set = conn.prepare(SQLITE_SELECT)?;
                    let mut outcome = Ok(());
                    for id in chunk {
                        let row = set
                            .exec(0, &[RowValues::Int(id)])
                            .and_then(|cursor| match cursor {
                                Some(mut cursor) => cursor.next_row(),
                                None => Ok(None),
                            });
                        match row {
                            Ok(row) => {
                                black_box(row);
                            }
                            Err(err) => {
                                outcome = Err(err);
                                break;
                            }
                        }
                    }
                    let closed = set.close();
                    outcome.and(closed)
                })
                .await
        });
    }

    while let Some(outcome) = join_set.join_next().await {
        outcome.expect("lookup worker panicked")?;
    }
    Ok(())
}

fn bench_checkout(c: &mut Criterion) {
    let pool = TOKIO_RUNTIME.block_on(async { open_pool() });
    let cancel = CancellationToken::new();
    let (pool, cancel) = (&pool, &cancel);

    let mut group = c.benchmark_group("pool_checkout");
    group.throughput(Throughput::Elements(1));
    group.bench_function("get_and_release", |b| {
        b.to_async(&*TOKIO_RUNTIME).iter(|| async move {
            let lease = pool.get(cancel).expect("lease");
            black_box(lease.id());
            pool.put(lease);
            // Count the round trip through the reclaiming task as well.
            while pool.cur() > 0 {
                tokio::task::yield_now().await;
            }
        });
    });
    group.finish();
}

fn bench_lookups(c: &mut Criterion) {
    let pool = TOKIO_RUNTIME.block_on(async { open_pool() });
    let pool = &pool;
    let ids = &DATASET.1;
    let concurrency = *BENCH_CONCURRENCY;

    let mut group = c.benchmark_group("parallel_lookups");
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_with_input(BenchmarkId::new("leased", concurrency), ids, |b, ids| {
        b.to_async(&*TOKIO_RUNTIME).iter(|| async move {
            parallel_lookups(pool, ids, concurrency)
                .await
                .expect("parallel lookups");
        });
    });
    group.finish();
}

criterion_group!(benches, bench_checkout, bench_lookups);
criterion_main!(benches);
