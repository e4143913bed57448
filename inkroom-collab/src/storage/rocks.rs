//! RocksDB-backed stroke event store.
//!
//! Column families:
//! - `events`: one record per stroke (bincode), keyed for ordered room scans
//! - `rooms` : per-room metadata (bincode: event count, last timestamp)
//! - `meta`  : store-wide clock state, recovered on open
//!
//! Event key layout:
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────┐
//! │ room len     │ room id      │ timestamp    │ sequence     │
//! │ 2 bytes BE   │ len bytes    │ 8 bytes BE   │ 8 bytes BE   │
//! └──────────────┴──────────────┴──────────────┴──────────────┘
//! ```
//! The length prefix keeps rooms whose ids share a prefix apart, and the
//! big-endian timestamp makes a forward scan return insertion order.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use inkroom_core::{RoomId, StrokeEvent};

use super::{now_millis, EventStore, MonotonicClock, StoreError, UNSTAMPED};

const CF_EVENTS: &str = "events";
const CF_ROOMS: &str = "rooms";
const CF_META: &str = "meta";

const COLUMN_FAMILIES: &[&str] = &[CF_EVENTS, CF_ROOMS, CF_META];

const CLOCK_KEY: &[u8] = b"clock";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("inkroom_data").join("whiteboard"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Store at `path` with default tuning.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Per-room bookkeeping stored next to the events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMetadata {
    pub room_id: RoomId,
    /// Events currently stored for the room
    pub event_count: u64,
    /// Timestamp of the newest event
    pub last_timestamp: u64,
    /// First write (milliseconds since epoch)
    pub created_at: u64,
    /// Last write (milliseconds since epoch)
    pub updated_at: u64,
}

impl RoomMetadata {
    fn new(room_id: RoomId) -> Self {
        let now = now_millis();
        Self {
            room_id,
            event_count: 0,
            last_timestamp: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ClockState {
    last_timestamp: u64,
    last_sequence: u64,
}

/// RocksDB-backed event store.
pub struct RocksEventStore {
    /// RocksDB instance (single-threaded mode, shared behind Arc)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    clock: MonotonicClock,
    /// Tie-breaker for events sharing a timestamp
    sequence: AtomicU64,
    /// Serializes the metadata read-modify-write in append/clear
    write_lock: Mutex<()>,
}

impl RocksEventStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        let state = Self::recover_clock(&db)?;
        log::debug!(
            "Opened event store at {} (last timestamp {}, sequence {})",
            config.path.display(),
            state.last_timestamp,
            state.last_sequence
        );

        Ok(Self {
            db,
            config,
            clock: MonotonicClock::starting_after(state.last_timestamp),
            sequence: AtomicU64::new(state.last_sequence),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_EVENTS => {
                // Many small appends, range-scanned per room
                opts.set_max_write_buffer_number(4);
            }
            CF_ROOMS => {
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup((config.block_cache_size / (1024 * 1024)).max(1) as u64);
            }
            CF_META => {
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::None);
            }
            _ => {}
        }

        opts
    }

    fn recover_clock(db: &DBWithThreadMode<SingleThreaded>) -> Result<ClockState, StoreError> {
        let Some(cf) = db.cf_handle(CF_META) else {
            return Ok(ClockState::default());
        };
        match db.get_cf(cf, CLOCK_KEY)? {
            Some(bytes) => decode(&bytes),
            None => Ok(ClockState::default()),
        }
    }

    // ─── Events ───────────────────────────────────────────────────────

    /// Append one event (stamping it when unstamped) together with its room
    /// metadata and the clock state, in a single write batch.
    pub fn append_event(&self, mut event: StrokeEvent) -> Result<StrokeEvent, StoreError> {
        let cf_events = self.cf(CF_EVENTS)?;
        let cf_rooms = self.cf(CF_ROOMS)?;
        let cf_meta = self.cf(CF_META)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if event.timestamp == UNSTAMPED {
            event.timestamp = self.clock.next();
        } else {
            self.clock.observe(event.timestamp);
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let mut meta = self
            .load_metadata(&event.room_id)?
            .unwrap_or_else(|| RoomMetadata::new(event.room_id.clone()));
        meta.event_count += 1;
        meta.last_timestamp = meta.last_timestamp.max(event.timestamp);
        meta.updated_at = now_millis();

        let clock = ClockState {
            last_timestamp: self.clock.last(),
            last_sequence: sequence,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            cf_events,
            event_key(&event.room_id, event.timestamp, sequence),
            encode(&event)?,
        );
        batch.put_cf(cf_rooms, event.room_id.as_str().as_bytes(), encode(&meta)?);
        batch.put_cf(cf_meta, CLOCK_KEY, encode(&clock)?);

        self.db.write_opt(batch, &self.write_options())?;
        Ok(event)
    }

    /// All events of `room`, ascending by timestamp.
    pub fn load_history(&self, room: &RoomId) -> Result<Vec<StrokeEvent>, StoreError> {
        let cf = self.cf(CF_EVENTS)?;
        let prefix = room_prefix(room);

        let mut events = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            events.push(decode(&value)?);
        }
        Ok(events)
    }

    /// Delete every event of `room` and its metadata. Returns the number of
    /// events deleted.
    pub fn delete_room(&self, room: &RoomId) -> Result<u64, StoreError> {
        let cf_events = self.cf(CF_EVENTS)?;
        let cf_rooms = self.cf(CF_ROOMS)?;
        let prefix = room_prefix(room);

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut count = 0u64;
        let mut batch = WriteBatch::default();
        let iter = self
            .db
            .iterator_cf(cf_events, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(cf_events, &key);
            count += 1;
        }
        batch.delete_cf(cf_rooms, room.as_str().as_bytes());

        self.db.write_opt(batch, &self.write_options())?;
        Ok(count)
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    pub fn load_metadata(&self, room: &RoomId) -> Result<Option<RoomMetadata>, StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        match self.db.get_cf(cf, room.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Metadata of every room with stored events.
    pub fn rooms(&self) -> Result<Vec<RoomMetadata>, StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        let mut rooms = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let meta: RoomMetadata = decode(&value)?;
            if meta.event_count > 0 {
                rooms.push(meta);
            }
        }
        Ok(rooms)
    }

    /// Highest timestamp handed out so far.
    pub fn last_timestamp(&self) -> u64 {
        self.clock.last()
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

#[async_trait]
impl EventStore for RocksEventStore {
    async fn append(&self, event: StrokeEvent) -> Result<StrokeEvent, StoreError> {
        self.append_event(event)
    }

    async fn query_history(&self, room: &RoomId) -> Result<Vec<StrokeEvent>, StoreError> {
        self.load_history(room)
    }

    async fn clear_room(&self, room: &RoomId) -> Result<u64, StoreError> {
        self.delete_room(room)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomId>, StoreError> {
        Ok(self.rooms()?.into_iter().map(|meta| meta.room_id).collect())
    }
}

fn room_prefix(room: &RoomId) -> Vec<u8> {
    let id = room.as_str().as_bytes();
    let mut prefix = Vec::with_capacity(2 + id.len());
    // RoomId caps its length well below u16::MAX
    prefix.extend_from_slice(&(id.len() as u16).to_be_bytes());
    prefix.extend_from_slice(id);
    prefix
}

fn event_key(room: &RoomId, timestamp: u64, sequence: u64) -> Vec<u8> {
    let mut key = room_prefix(room);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{Color, StrokeSegment, Tool};
    use tempfile::tempdir;

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn unstamped(room_id: &str, x: f64) -> StrokeEvent {
        StrokeEvent::new(room(room_id), Tool::Pen.segment(x, 0.0, x + 1.0, 1.0), UNSTAMPED)
    }

    #[test]
    fn test_store_open_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("whiteboard");
        let store = RocksEventStore::open(StoreConfig::for_testing(&path)).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_append_and_load_history() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        for i in 0..25 {
            let stored = store.append_event(unstamped("r1", i as f64)).unwrap();
            assert_ne!(stored.timestamp, UNSTAMPED);
        }

        let history = store.load_history(&room("r1")).unwrap();
        assert_eq!(history.len(), 25);
        for (i, event) in history.iter().enumerate() {
            assert_eq!(event.x0, i as f64);
            assert_eq!(event.room_id, room("r1"));
        }
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_prefix_sharing_rooms_are_isolated() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        store.append_event(unstamped("ab", 1.0)).unwrap();
        store.append_event(unstamped("abc", 2.0)).unwrap();
        store.append_event(unstamped("a", 3.0)).unwrap();

        assert_eq!(store.load_history(&room("ab")).unwrap().len(), 1);
        assert_eq!(store.load_history(&room("abc")).unwrap().len(), 1);
        assert_eq!(store.load_history(&room("a")).unwrap().len(), 1);

        assert_eq!(store.delete_room(&room("ab")).unwrap(), 1);
        assert_eq!(store.load_history(&room("abc")).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_room() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        for i in 0..10 {
            store.append_event(unstamped("r1", i as f64)).unwrap();
        }
        store.append_event(unstamped("r2", 0.0)).unwrap();

        assert_eq!(store.delete_room(&room("r1")).unwrap(), 10);
        assert!(store.load_history(&room("r1")).unwrap().is_empty());
        assert!(store.load_metadata(&room("r1")).unwrap().is_none());
        assert_eq!(store.load_history(&room("r2")).unwrap().len(), 1);

        assert_eq!(store.delete_room(&room("r1")).unwrap(), 0);
    }

    #[test]
    fn test_metadata_tracks_room() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        let first = store.append_event(unstamped("r1", 0.0)).unwrap();
        let second = store.append_event(unstamped("r1", 1.0)).unwrap();

        let meta = store.load_metadata(&room("r1")).unwrap().unwrap();
        assert_eq!(meta.event_count, 2);
        assert_eq!(meta.last_timestamp, second.timestamp);
        assert!(second.timestamp > first.timestamp);
        assert!(meta.updated_at >= meta.created_at);
    }

    #[test]
    fn test_clock_recovered_after_reopen() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::for_testing(dir.path());

        let future = now_millis() + 3_600_000;
        {
            let store = RocksEventStore::open(config.clone()).unwrap();
            let mut event = unstamped("r1", 0.0);
            event.timestamp = future;
            store.append_event(event).unwrap();
        }

        let store = RocksEventStore::open(config).unwrap();
        assert_eq!(store.last_timestamp(), future);
        let next = store.append_event(unstamped("r1", 1.0)).unwrap();
        assert!(next.timestamp > future);

        let history = store.load_history(&room("r1")).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, future);
    }

    #[test]
    fn test_same_timestamp_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        for x in 0..3 {
            let mut event = unstamped("r1", x as f64);
            event.timestamp = 1_000;
            store.append_event(event).unwrap();
        }
        let history = store.load_history(&room("r1")).unwrap();
        let xs: Vec<f64> = history.iter().map(|e| e.x0).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_event_fields_survive_storage() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();

        let segment = StrokeSegment::new(1.5, -2.25, 300.125, 40.0, Color::new("#ff8800"), 7.5);
        let stored = store
            .append_event(StrokeEvent::new(room("r1"), segment.clone(), UNSTAMPED))
            .unwrap();
        let loaded = store.load_history(&room("r1")).unwrap();
        assert_eq!(loaded, vec![stored.clone()]);
        assert_eq!(loaded[0].segment(), segment);
    }

    #[tokio::test]
    async fn test_event_store_trait() {
        let dir = tempdir().unwrap();
        let store = RocksEventStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        let store: &dyn EventStore = &store;

        store.append(unstamped("a", 0.0)).await.unwrap();
        store.append(unstamped("b", 0.0)).await.unwrap();
        store.append(unstamped("b", 1.0)).await.unwrap();

        let mut rooms = store.list_rooms().await.unwrap();
        rooms.sort();
        assert_eq!(rooms, vec![room("a"), room("b")]);

        assert_eq!(store.clear_room(&room("b")).await.unwrap(), 2);
        assert!(store.query_history(&room("b")).await.unwrap().is_empty());
        assert_eq!(store.list_rooms().await.unwrap(), vec![room("a")]);
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.bloom_filter_bits, 10);
        assert!(!config.sync_writes);
        assert!(config.path.ends_with("whiteboard"));
    }
}
