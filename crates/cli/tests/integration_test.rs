use bar_signal_core::{Bar, EngineConfig, EngineEvent, SignalSink};
use bar_signal_data::{CsvStorage, InMemoryHistoricalStore};
use bar_signal_signals::{BroadcastSink, SignalEngine};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

fn trending_bars(instrument: &str, days_back: i64, n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap() - Duration::days(days_back);
    (0..n)
        .map(|i| {
            let base = 1.0 + i as f64 * 0.004;
            let (open, close) = if i % 4 == 3 {
                (base + 0.003, base + 0.0005)
            } else {
                (base, base + 0.003)
            };
            Bar::new(
                instrument,
                start + Duration::minutes(i as i64),
                open,
                open.max(close) + 0.0004,
                open.min(close) - 0.0004,
                close,
                50.0,
            )
        })
        .collect()
}

#[tokio::test]
async fn test_replay_from_csv_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let history_path = dir.path().join("history.csv");
    let live_path = dir.path().join("live.csv");
    let history_path = history_path.to_str().unwrap();
    let live_path = live_path.to_str().unwrap();

    CsvStorage::write_bars(history_path, &trending_bars("EURUSD-OTC", 7, 120)).unwrap();
    CsvStorage::write_bars(live_path, &trending_bars("EURUSD-OTC", 0, 60)).unwrap();

    let history = CsvStorage::read_bars(history_path).unwrap();
    let live = CsvStorage::read_bars(live_path).unwrap();
    assert_eq!(live.len(), 60);

    let sink = Arc::new(BroadcastSink::new(1024));
    let mut events = sink.subscribe();
    let engine = SignalEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryHistoricalStore::from_bars(history, 60)),
        vec![sink as Arc<dyn SignalSink>],
    )
    .expect("engine");

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(rx).await }
    });
    for bar in live {
        tx.send(bar).await.unwrap();
    }
    drop(tx);
    runner.await.unwrap();
    engine.shutdown().await;

    let stats = engine.stats().await;
    assert!(stats.overall.emitted > 0);
    assert_eq!(
        stats.overall.emitted,
        stats.overall.resolved + stats.overall.expired
    );

    let mut signals = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::Signal(_)) {
            signals += 1;
        }
    }
    assert_eq!(signals, stats.overall.emitted);
}
