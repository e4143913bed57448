//! Persistence tests: room history survives a store restart and replays
//! identically.

use inkroom_collab::engine::{EngineConfig, Inbound, SyncEngine};
use inkroom_collab::hub::Frame;
use inkroom_collab::protocol::ServerMessage;
use inkroom_collab::storage::{EventStore, RocksEventStore, StoreConfig};
use inkroom_core::{replay, Raster, RoomId, StrokeEvent, Tool};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

fn open_engine(path: &Path) -> SyncEngine {
    let store = RocksEventStore::open(StoreConfig::for_testing(path)).unwrap();
    SyncEngine::new(Arc::new(store), EngineConfig::default())
}

fn history(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<StrokeEvent> {
    let frame = rx.try_recv().expect("history frame");
    match ServerMessage::decode(&frame).unwrap() {
        ServerMessage::DrawingHistory(events) => events,
        other => panic!("Expected history, got {other:?}"),
    }
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let strokes = vec![
        Tool::Pen.segment(2.0, 2.0, 60.0, 40.0),
        Tool::eraser(12.0).segment(30.0, 0.0, 30.0, 64.0),
        Tool::Pen.dot(50.0, 10.0),
    ];

    let before = {
        let engine = open_engine(dir.path());
        let (a, mut rx) = engine.connect().await;
        engine.handle(a, Inbound::Join(room("studio"))).await;
        assert!(history(&mut rx).is_empty());
        for segment in &strokes {
            engine.handle(a, Inbound::Stroke(segment.clone())).await;
        }
        engine.handle(a, Inbound::Join(room("studio"))).await;
        let before = history(&mut rx);
        engine.handle(a, Inbound::Disconnect).await;
        before
    };
    assert_eq!(before.len(), 3);

    // Fresh process: nobody is connected, the room exists only on disk.
    let engine = open_engine(dir.path());
    assert_eq!(engine.store().list_rooms().await.unwrap(), vec![room("studio")]);

    let (b, mut rx) = engine.connect().await;
    engine.handle(b, Inbound::Join(room("studio"))).await;
    let after = history(&mut rx);
    assert_eq!(after, before);
    let segments: Vec<_> = after.iter().map(StrokeEvent::segment).collect();
    assert_eq!(segments, strokes);

    let mut first = Raster::new(64, 64);
    let mut second = Raster::new(64, 64);
    replay(&mut first, &before);
    replay(&mut second, &after);
    assert_eq!(first, second);
    assert!(first.painted() > 0);
}

#[tokio::test]
async fn test_timestamps_keep_increasing_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    let last_before = {
        let engine = open_engine(dir.path());
        let (a, mut rx) = engine.connect().await;
        engine.handle(a, Inbound::Join(room("r1"))).await;
        history(&mut rx);
        for i in 0..10 {
            engine.handle(a, Inbound::Stroke(Tool::Pen.dot(i as f64, 0.0))).await;
        }
        engine.handle(a, Inbound::Join(room("r1"))).await;
        let events = history(&mut rx);
        events.last().unwrap().timestamp
    };

    let engine = open_engine(dir.path());
    let (b, mut rx) = engine.connect().await;
    engine.handle(b, Inbound::Join(room("r1"))).await;
    history(&mut rx);
    engine.handle(b, Inbound::Stroke(Tool::Pen.dot(99.0, 0.0))).await;
    engine.handle(b, Inbound::Join(room("r1"))).await;

    let events = history(&mut rx);
    assert_eq!(events.len(), 11);
    assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(events[10].timestamp > last_before);
    assert_eq!(events[10].x0, 99.0);
}

#[tokio::test]
async fn test_clear_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        let (a, mut rx) = engine.connect().await;
        engine.handle(a, Inbound::Join(room("keep"))).await;
        engine.handle(a, Inbound::Stroke(Tool::Pen.dot(1.0, 1.0))).await;
        engine.handle(a, Inbound::Join(room("wipe"))).await;
        engine.handle(a, Inbound::Stroke(Tool::Pen.dot(2.0, 2.0))).await;
        engine.handle(a, Inbound::Clear).await;
        history(&mut rx);
        history(&mut rx);
        let cleared = rx.try_recv().unwrap();
        assert_eq!(ServerMessage::decode(&cleared).unwrap(), ServerMessage::CanvasCleared);
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.store().list_rooms().await.unwrap(), vec![room("keep")]);
    assert!(engine.store().query_history(&room("wipe")).await.unwrap().is_empty());
    assert_eq!(engine.store().query_history(&room("keep")).await.unwrap().len(), 1);
}
