use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::detection::domain::face_tracker::TrackId;
use crate::detection::domain::raw_detection::{Gender, MalformedSignal};
use crate::shared::constants::{
    DEFAULT_AGE, DEFAULT_AGE_HISTORY, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_HISTORY,
    DEFAULT_GENDER_HISTORY, DEFAULT_MAX_IDLE_FRAMES, DEFAULT_MAX_TRACKS,
};

use super::fusion::FusedSignals;
use super::track_state::{HistoryLimits, Observation, TrackState};

#[derive(Clone, Debug, PartialEq)]
pub struct TrackStoreConfig {
    pub limits: HistoryLimits,
    /// Live frames an entry may go unobserved before the sweep removes it.
    pub max_idle_frames: u64,
    /// Hard entry cap; inserting past it evicts the least recently observed.
    pub max_tracks: usize,
}

impl Default for TrackStoreConfig {
    fn default() -> Self {
        Self {
            limits: HistoryLimits {
                age: DEFAULT_AGE_HISTORY,
                gender: DEFAULT_GENDER_HISTORY,
                embedding: DEFAULT_EMBEDDING_HISTORY,
                embedding_dim: DEFAULT_EMBEDDING_DIM,
                default_age: DEFAULT_AGE,
                default_gender: Gender::Male,
                valid_age_range: RangeInclusive::new(0, 120),
            },
            max_idle_frames: DEFAULT_MAX_IDLE_FRAMES,
            max_tracks: DEFAULT_MAX_TRACKS,
        }
    }
}

struct TrackEntry {
    state: Mutex<TrackState>,
    last_seen: AtomicU64,
}

impl TrackEntry {
    fn lock(&self) -> MutexGuard<'_, TrackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared per-track signal history.
///
/// Updates hold the map's read lock for their whole duration, so eviction
/// (which needs the write lock) never detaches an entry mid-update. Updates
/// to one track serialize on that track's own mutex; distinct tracks proceed
/// in parallel. Recency is measured on a live-frame clock advanced by
/// [`TrackStateStore::begin_frame`].
pub struct TrackStateStore {
    config: TrackStoreConfig,
    entries: RwLock<HashMap<TrackId, Arc<TrackEntry>>>,
    clock: AtomicU64,
}

impl TrackStateStore {
    pub fn new(config: TrackStoreConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TrackStoreConfig {
        &self.config
    }

    /// Advances the clock by one live frame and sweeps idle entries.
    /// Returns how many were evicted.
    pub fn begin_frame(&self) -> usize {
        let now = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.evict_stale(now)
    }

    /// Removes entries last observed more than `max_idle_frames` before `now`.
    pub fn evict_stale(&self, now: u64) -> usize {
        let max_idle = self.config.max_idle_frames;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| now.saturating_sub(e.last_seen.load(Ordering::SeqCst)) <= max_idle);
        let evicted = before - entries.len();
        if evicted > 0 {
            log::debug!("Evicted {evicted} idle track histories");
        }
        evicted
    }

    /// Records one frame of signals. Returns the fields dropped as malformed.
    pub fn observe(&self, track_id: TrackId, observation: Observation<'_>) -> Vec<MalformedSignal> {
        self.with_entry(track_id, |state| state.record(observation, &self.config.limits))
    }

    /// Fused signals for `track_id`. Unknown ids fuse to the defaults.
    pub fn fuse(&self, track_id: TrackId) -> FusedSignals {
        match self.lookup(track_id) {
            Some(entry) => entry.lock().fuse(&self.config.limits),
            None => TrackState::new(track_id, &self.config.limits).fuse(&self.config.limits),
        }
    }

    /// `observe` then `fuse` under a single hold of the track's lock.
    pub fn observe_and_fuse(
        &self,
        track_id: TrackId,
        observation: Observation<'_>,
    ) -> (FusedSignals, Vec<MalformedSignal>) {
        self.with_entry(track_id, |state| {
            let dropped = state.record(observation, &self.config.limits);
            (state.fuse(&self.config.limits), dropped)
        })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.read().contains_key(&track_id)
    }

    /// `(ages, genders, embeddings)` held for `track_id`.
    pub fn history_lengths(&self, track_id: TrackId) -> Option<(usize, usize, usize)> {
        self.lookup(track_id).map(|e| e.lock().history_lengths())
    }

    pub fn remove(&self, track_id: TrackId) -> bool {
        self.write().remove(&track_id).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TrackId, Arc<TrackEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TrackId, Arc<TrackEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, track_id: TrackId) -> Option<Arc<TrackEntry>> {
        self.read().get(&track_id).cloned()
    }

    /// Runs `f` on the existing or newly inserted entry, stamped with the
    /// current clock. The entry stays in the map until `f` returns.
    fn with_entry<R>(&self, track_id: TrackId, f: impl FnOnce(&mut TrackState) -> R) -> R {
        {
            let entries = self.read();
            if let Some(entry) = entries.get(&track_id) {
                entry
                    .last_seen
                    .fetch_max(self.clock.load(Ordering::SeqCst), Ordering::SeqCst);
                return f(&mut entry.lock());
            }
        }

        let mut entries = self.write();
        if !entries.contains_key(&track_id) && entries.len() >= self.config.max_tracks {
            evict_least_recent(&mut entries);
        }
        let now = self.clock.load(Ordering::SeqCst);
        let entry = entries.entry(track_id).or_insert_with(|| {
            Arc::new(TrackEntry {
                state: Mutex::new(TrackState::new(track_id, &self.config.limits)),
                last_seen: AtomicU64::new(now),
            })
        });
        entry.last_seen.fetch_max(now, Ordering::SeqCst);
        let mut state = entry.lock();
        f(&mut state)
    }
}

impl Default for TrackStateStore {
    fn default() -> Self {
        Self::new(TrackStoreConfig::default())
    }
}

fn evict_least_recent(entries: &mut HashMap<TrackId, Arc<TrackEntry>>) {
    let oldest = entries
        .iter()
        .min_by_key(|(id, e)| (e.last_seen.load(Ordering::SeqCst), **id))
        .map(|(id, _)| *id);
    if let Some(id) = oldest {
        entries.remove(&id);
        log::debug!("Track store at capacity; evicted track {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::raw_detection::RawSignal;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn store_with(max_idle_frames: u64, max_tracks: usize) -> TrackStateStore {
        TrackStateStore::new(TrackStoreConfig {
            max_idle_frames,
            max_tracks,
            ..Default::default()
        })
    }

    fn observe_age(store: &TrackStateStore, track_id: TrackId, age: f64) {
        let raw = RawSignal::Number(age);
        store.observe(
            track_id,
            Observation {
                age: Some(&raw),
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_observe_creates_entry_lazily() {
        let store = TrackStateStore::default();
        assert!(!store.contains(7));
        observe_age(&store, 7, 30.0);
        assert!(store.contains(7));
        assert_eq!(store.len(), 1);
        assert_eq!(store.fuse(7).age, 30);
    }

    #[test]
    fn test_fuse_unknown_track_is_defaults() {
        let store = TrackStateStore::default();
        let fused = store.fuse(99);
        assert_eq!(fused.age, 25);
        assert_eq!(fused.gender, Gender::Male);
        assert_eq!(fused.embedding.len(), 512);
        assert!(store.is_empty());
    }

    #[test]
    fn test_five_frame_age_fusion() {
        let store = TrackStateStore::default();
        let mut fused = None;
        for age in [20.0, 22.0, 21.0, 23.0, 24.0] {
            store.begin_frame();
            let raw = RawSignal::Number(age);
            fused = Some(
                store
                    .observe_and_fuse(
                        1,
                        Observation {
                            age: Some(&raw),
                            ..Default::default()
                        },
                    )
                    .0,
            );
        }
        assert_eq!(fused.unwrap().age, 22);
    }

    #[test]
    fn test_history_bounds_hold() {
        let store = TrackStateStore::default();
        let age = RawSignal::Number(30.0);
        let gender = RawSignal::Text("female".into());
        let embedding = vec![0.5f32; 512];
        for _ in 0..100 {
            store.observe(
                1,
                Observation {
                    age: Some(&age),
                    gender: Some(&gender),
                    embedding: Some(&embedding),
                },
            );
        }
        assert_eq!(store.history_lengths(1), Some((7, 7, 5)));
    }

    #[test]
    fn test_malformed_signal_is_reported_and_skipped() {
        let store = TrackStateStore::default();
        let gender = RawSignal::Number(5.0);
        let dropped = store.observe(
            1,
            Observation {
                gender: Some(&gender),
                ..Default::default()
            },
        );
        assert_eq!(dropped.len(), 1);
        assert_eq!(store.history_lengths(1), Some((0, 0, 0)));
    }

    #[test]
    fn test_idle_tracks_are_swept() {
        let store = store_with(2, 1024);
        observe_age(&store, 1, 30.0);
        observe_age(&store, 2, 40.0);

        for _ in 0..2 {
            store.begin_frame();
            observe_age(&store, 2, 40.0);
        }
        assert!(store.contains(1));

        assert_eq!(store.begin_frame(), 1);
        assert!(!store.contains(1));
        assert!(store.contains(2));
    }

    #[test]
    fn test_capacity_evicts_least_recently_observed() {
        let store = store_with(1000, 2);
        observe_age(&store, 1, 30.0);
        store.begin_frame();
        observe_age(&store, 2, 30.0);
        store.begin_frame();
        observe_age(&store, 1, 31.0);

        observe_age(&store, 3, 30.0);

        assert_eq!(store.len(), 2);
        assert!(store.contains(1));
        assert!(!store.contains(2));
        assert!(store.contains(3));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = TrackStateStore::default();
        observe_age(&store, 1, 30.0);
        observe_age(&store, 2, 30.0);
        assert!(store.remove(1));
        assert!(!store.remove(1));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_observes_on_distinct_and_shared_tracks() {
        let store = Arc::new(TrackStateStore::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        observe_age(&store, t % 4, 30.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 4);
        for id in 0..4 {
            assert_eq!(store.history_lengths(id), Some((7, 0, 0)));
            assert_eq!(store.fuse(id).age, 30);
        }
    }

    #[test]
    fn test_evicted_entries_receive_no_further_updates() {
        let mut config = TrackStoreConfig {
            max_idle_frames: 1,
            max_tracks: 3,
            ..Default::default()
        };
        config.limits.age = 1_000_000;
        let store = Arc::new(TrackStateStore::new(config));
        let stop = Arc::new(AtomicBool::new(false));

        let observer = {
            let (store, stop) = (Arc::clone(&store), Arc::clone(&stop));
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    observe_age(&store, 1, 30.0);
                }
            })
        };
        let inserter = {
            let (store, stop) = (Arc::clone(&store), Arc::clone(&stop));
            thread::spawn(move || {
                let mut id = 100;
                while !stop.load(Ordering::SeqCst) {
                    observe_age(&store, id, 40.0);
                    id += 1;
                }
            })
        };

        // Snapshot each entry's history length the moment it leaves the map.
        let mut evicted: Vec<(Arc<TrackEntry>, usize)> = Vec::new();
        let mut frames = 0;
        while frames < 2_000 || evicted.len() < 50 {
            frames += 1;
            let before: Vec<Arc<TrackEntry>> = store.read().values().cloned().collect();
            store.begin_frame();
            let after = store.read();
            for entry in before {
                if !after.values().any(|e| Arc::ptr_eq(e, &entry)) {
                    let ages = entry.lock().history_lengths().0;
                    evicted.push((entry, ages));
                }
            }
        }
        stop.store(true, Ordering::SeqCst);
        observer.join().unwrap();
        inserter.join().unwrap();

        for (entry, ages) in evicted {
            assert_eq!(entry.lock().history_lengths().0, ages);
        }
    }
}
