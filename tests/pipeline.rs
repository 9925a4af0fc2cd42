//! End-to-end exercises against a fake in-memory KV store, covering the
//! concrete scenarios in spec.md §8.

use std::sync::Arc;

use clap::Parser;
use wikisurge::config::Config;
use wikisurge::indexing::IndexingStrategy;
use wikisurge::models::Edit;
use wikisurge::processor::Processor;
use wikisurge::store::{FakeKv, KvStore};

fn config() -> Config {
    Config::parse_from(["wikisurge"])
}

fn edit(id: i64, title: &str, user: &str, ts: i64, byte_change: i64) -> Edit {
    Edit {
        id,
        kind: "edit".into(),
        title: title.into(),
        user: user.into(),
        bot: false,
        wiki: "enwiki".into(),
        server_url: "".into(),
        timestamp: ts,
        length_old: 1000,
        length_new: 1000 + byte_change,
        revision_old: id - 1,
        revision_new: id,
        comment: "".into(),
        byte_change,
        language: "en".into(),
    }
}

// Scenario 1: promotion below threshold, then promotes.
#[tokio::test]
async fn scenario_promotion_below_threshold() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let mut c = config();
    c.hot_threshold = 2;
    let processor = Processor::new(kv, &c);

    let outcome1 = processor.process(&edit(1, "TestPage", "alice", 1000, 10), 1000).await.unwrap();
    assert!(!outcome1.is_hot);

    let outcome2 = processor.process(&edit(2, "TestPage", "bob", 1001, 10), 1001).await.unwrap();
    assert!(outcome2.is_hot);

    let stats = processor.hot_pages.page_stats("enwiki:TestPage", 1001).await.unwrap();
    assert_eq!(stats.total_edits, 2);
}

// Scenario 2: circuit breaker caps live hot pages at 2.
#[tokio::test]
async fn scenario_circuit_breaker() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let mut c = config();
    c.hot_threshold = 2;
    c.max_hot_pages = 2;
    let processor = Processor::new(kv, &c);

    for title in ["A", "B"] {
        processor.process(&edit(1, title, "alice", 1000, 10), 1000).await.unwrap();
        processor.process(&edit(2, title, "bob", 1001, 10), 1001).await.unwrap();
    }
    assert!(processor.hot_pages.is_hot("enwiki:A").await.unwrap());
    assert!(processor.hot_pages.is_hot("enwiki:B").await.unwrap());

    processor.process(&edit(1, "C", "alice", 1000, 10), 1000).await.unwrap();
    processor.process(&edit(2, "C", "bob", 1001, 10), 1001).await.unwrap();
    assert!(!processor.hot_pages.is_hot("enwiki:C").await.unwrap());
    assert_eq!(processor.hot_pages.live_count().await.unwrap(), 2);
}

// Scenario 4: trending lazy decay.
#[tokio::test]
async fn scenario_trending_lazy_decay() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let mut c = config();
    c.half_life_minutes = 30.0;
    let processor = Processor::new(kv, &c);

    processor.process(&edit(1, "P", "alice", 0, 1000), 0).await.unwrap();
    let top = processor.trending.top_trending(10, 30 * 60).await.unwrap();
    let p = top.iter().find(|e| e.page_key == "enwiki:P").unwrap();
    assert!((p.current_score - p.raw_score / 2.0).abs() < 0.5);
}

// Scenario 5: spike detection, 20 edits in 5 minutes after a quiet baseline.
#[tokio::test]
async fn scenario_spike_detection() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let c = config();
    let processor = Processor::new(kv.clone(), &c);

    for i in 0..4 {
        processor.process(&edit(i, "X", "alice", i * 900, 10), i * 900).await.unwrap();
    }

    let mut spiked = false;
    for i in 0..20 {
        let ts = 3600 + i * 15;
        let outcome = processor.process(&edit(100 + i, "X", "alice", ts, 10), ts).await.unwrap();
        spiked |= outcome.spike_alert;
    }
    assert!(spiked, "expected a spike alert within the burst");
    assert!(kv.xlen("alerts:spikes").await.unwrap() >= 1);
}

// Scenario 6: edit war, alternating editors and signs on a hot page.
#[tokio::test]
async fn scenario_edit_war() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let mut c = config();
    c.hot_threshold = 1;
    let processor = Processor::new(kv.clone(), &c);

    let changes = [(1, "u1", 50), (2, "u2", -50), (3, "u1", 50), (4, "u2", -50)];
    let mut alerted = false;
    for (i, (id, user, delta)) in changes.iter().enumerate() {
        let ts = 1000 + i as i64 * 60;
        let outcome = processor.process(&edit(*id, "Y", user, ts, *delta), ts).await.unwrap();
        alerted |= outcome.edit_war_alert;
    }
    assert!(alerted, "expected an edit-war alert once the pattern completes");
    assert!(kv.exists("editwar:enwiki:Y").await.unwrap());
    assert!(kv.xlen("alerts:editwars").await.unwrap() >= 1);
}

// Indexing strategy picks up a watchlisted page regardless of any other signal.
#[tokio::test]
async fn watchlisted_page_is_always_indexed() {
    let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
    let mut c = config();
    c.watchlist = "enwiki:Watched".into();
    let processor = Processor::new(kv, &c);
    let strategy = IndexingStrategy::new(
        &c,
        processor.hot_pages.clone(),
        processor.trending.clone(),
        processor.spike.clone(),
        processor.editwar.clone(),
    );

    let (should_index, reason) = strategy.should_index(&edit(1, "Watched", "alice", 1000, 10)).await.unwrap();
    assert!(should_index);
    assert_eq!(reason, "watchlist");
}
