//! Contract tests shared by both store engines

use super::file::{replay, LogWriter};
use super::*;
use crate::models::IfStatus;
use chrono::{Duration, TimeZone};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::io::AsyncWrite;
use tokio_test::assert_ok;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

fn sample(if_index: IfIndex, secs: i64, in_octets: u64) -> Sample {
    Sample {
        if_index,
        if_name: format!("eth{}", if_index),
        admin_status: IfStatus::Up,
        oper_status: IfStatus::Up,
        in_octets,
        out_octets: in_octets / 2,
        in_errors: 0,
        out_errors: 0,
        if_speed_bps: 1_000_000_000,
        sample_time: t(secs),
    }
}

async fn seed(store: &dyn SampleStore) {
    let rows = [
        (1, 0, 10),
        (2, 0, 20),
        (1, 10, 11),
        (3, 5, 30),
        (1, 20, 12),
        (2, 15, 21),
    ];
    for (idx, secs, octets) in rows {
        assert_ok!(store.append(sample(idx, secs, octets)).await);
    }
}

async fn check_latest_per_key(store: &dyn SampleStore) {
    seed(store).await;

    let latest = store.latest_per_key().await.unwrap();
    let keys: Vec<_> = latest.iter().map(|s| s.if_index).collect();
    assert_eq!(keys, vec![1, 2, 3]);

    for s in &latest {
        let all = store
            .range_for_key(s.if_index, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .await
            .unwrap();
        let max = all.iter().map(|x| x.sample_time).max().unwrap();
        assert_eq!(s.sample_time, max);
    }
    assert_eq!(latest[0].in_octets, 12);
}

async fn check_range_for_key(store: &dyn SampleStore) {
    seed(store).await;

    let range = store.range_for_key(1, t(5), t(20)).await.unwrap();
    let times: Vec<_> = range.iter().map(|s| s.sample_time).collect();
    assert_eq!(times, vec![t(10), t(20)]);

    assert!(store.range_for_key(1, t(21), t(30)).await.unwrap().is_empty());
    assert!(store.range_for_key(9, t(0), t(100)).await.unwrap().is_empty());
    assert!(store.range_for_key(1, t(20), t(0)).await.unwrap().is_empty());
}

async fn check_tail_for_key(store: &dyn SampleStore) {
    seed(store).await;

    let tail = store.tail_for_key(1, 2).await.unwrap();
    let octets: Vec<_> = tail.iter().map(|s| s.in_octets).collect();
    assert_eq!(octets, vec![11, 12]);

    assert_eq!(store.tail_for_key(3, 5).await.unwrap().len(), 1);
    assert!(store.tail_for_key(4, 2).await.unwrap().is_empty());
}

async fn check_backward_stamps_read_in_time_order(store: &dyn SampleStore) {
    // The clock stepped back between the first and second append
    for (secs, octets) in [(20, 2), (10, 1), (30, 3)] {
        assert_ok!(store.append(sample(1, secs, octets)).await);
    }

    let range = store.range_for_key(1, t(0), t(100)).await.unwrap();
    let times: Vec<_> = range.iter().map(|s| s.sample_time).collect();
    assert_eq!(times, vec![t(10), t(20), t(30)]);

    let tail = store.tail_for_key(1, 2).await.unwrap();
    let octets: Vec<_> = tail.iter().map(|s| s.in_octets).collect();
    assert_eq!(octets, vec![2, 3]);

    let latest = store.latest_per_key().await.unwrap();
    assert_eq!(latest[0].sample_time, t(30));
}

#[tokio::test]
async fn test_memory_latest_per_key() {
    check_latest_per_key(&MemorySampleStore::new()).await;
}

#[tokio::test]
async fn test_memory_range_for_key() {
    check_range_for_key(&MemorySampleStore::new()).await;
}

#[tokio::test]
async fn test_memory_tail_for_key() {
    check_tail_for_key(&MemorySampleStore::new()).await;
}

#[tokio::test]
async fn test_memory_backward_stamps_read_in_time_order() {
    check_backward_stamps_read_in_time_order(&MemorySampleStore::new()).await;
}

#[tokio::test]
async fn test_memory_latest_tie_goes_to_later_insert() {
    let store = MemorySampleStore::new();
    store.append(sample(1, 10, 100)).await.unwrap();
    store.append(sample(1, 10, 200)).await.unwrap();

    let latest = store.latest_per_key().await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].in_octets, 200);
}

#[tokio::test]
async fn test_memory_keeps_duplicates_and_order() {
    let store = MemorySampleStore::new();
    store.append(sample(1, 0, 5)).await.unwrap();
    store.append(sample(1, 0, 5)).await.unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.tail_for_key(1, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_memory_concurrent_readers_and_writer() {
    let store = Arc::new(MemorySampleStore::new());

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for i in 0..500 {
                store.append(sample(1, i, i as u64)).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                for s in store.latest_per_key().await.unwrap() {
                    // A fully written sample always carries its derived fields
                    assert_eq!(s.out_octets, s.in_octets / 2);
                    assert_eq!(s.if_name, "eth1");
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for r in readers {
        r.await.unwrap();
    }
    assert_eq!(store.len(), 500);
}

#[tokio::test]
async fn test_file_latest_per_key() {
    let dir = TempDir::new().unwrap();
    let store = FileSampleStore::open(dir.path().join("samples.jsonl")).await.unwrap();
    check_latest_per_key(&store).await;
}

#[tokio::test]
async fn test_file_range_for_key() {
    let dir = TempDir::new().unwrap();
    let store = FileSampleStore::open(dir.path().join("samples.jsonl")).await.unwrap();
    check_range_for_key(&store).await;
}

#[tokio::test]
async fn test_file_tail_for_key() {
    let dir = TempDir::new().unwrap();
    let store = FileSampleStore::open(dir.path().join("samples.jsonl")).await.unwrap();
    check_tail_for_key(&store).await;
}

#[tokio::test]
async fn test_file_store_replays_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("samples.jsonl");

    {
        let store = FileSampleStore::open(&path).await.unwrap();
        seed(&store).await;
    }

    let reopened = FileSampleStore::open(&path).await.unwrap();
    let latest = reopened.latest_per_key().await.unwrap();
    assert_eq!(latest.len(), 3);
    assert_eq!(reopened.range_for_key(1, t(0), t(20)).await.unwrap().len(), 3);

    reopened.append(sample(1, 30, 13)).await.unwrap();
    assert_eq!(reopened.tail_for_key(1, 1).await.unwrap()[0].in_octets, 13);
}

#[tokio::test]
async fn test_file_store_skips_torn_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("samples.jsonl");

    let good = serde_json::to_string(&sample(4, 0, 1)).unwrap();
    let content = format!("{}\n{{\"if_index\": 4, \"if_na\n", good);
    tokio::fs::write(&path, content).await.unwrap();

    let store = FileSampleStore::open(&path).await.unwrap();
    assert_eq!(store.latest_per_key().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_backward_stamps_read_in_time_order() {
    let dir = TempDir::new().unwrap();
    let store = FileSampleStore::open(dir.path().join("samples.jsonl")).await.unwrap();
    check_backward_stamps_read_in_time_order(&store).await;
}

#[tokio::test]
async fn test_file_store_append_after_torn_tail_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("samples.jsonl");

    let good = serde_json::to_string(&sample(4, 0, 1)).unwrap();
    tokio::fs::write(&path, format!("{}\n{{\"if_index\": 4, \"if_na", good))
        .await
        .unwrap();

    {
        let store = FileSampleStore::open(&path).await.unwrap();
        store.append(sample(4, 10, 2)).await.unwrap();
    }

    let reopened = FileSampleStore::open(&path).await.unwrap();
    let octets: Vec<_> = reopened
        .tail_for_key(4, 10)
        .await
        .unwrap()
        .iter()
        .map(|s| s.in_octets)
        .collect();
    assert_eq!(octets, vec![1, 2]);
}

/// Accepts `budget` bytes, then fails every write
struct ShortWriter {
    written: Vec<u8>,
    budget: usize,
}

impl AsyncWrite for ShortWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.budget == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn line(sample: &Sample) -> Vec<u8> {
    let mut line = serde_json::to_vec(sample).unwrap();
    line.push(b'\n');
    line
}

#[tokio::test]
async fn test_failed_write_does_not_swallow_next_line() {
    let mut writer = LogWriter::new(
        ShortWriter {
            written: Vec::new(),
            budget: 20,
        },
        false,
    );

    assert!(writer.write_line(&line(&sample(1, 0, 1))).await.is_err());
    writer.inner.budget = usize::MAX;
    writer.write_line(&line(&sample(1, 10, 2))).await.unwrap();

    let content = String::from_utf8(writer.inner.written.clone()).unwrap();
    let index = MemorySampleStore::new();
    replay(Path::new("samples.jsonl"), &content, &index);

    let replayed = index.tail_for_key(1, 10).await.unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].in_octets, 2);
}
