use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::debug;

use crate::error::FeedResult;
use crate::gateway::{FeedSource, format_ymd};

/// One request for a key. Unset while in flight; every caller holding the
/// slot blocks on the same initialization.
type Slot = Arc<OnceCell<FeedResult<Arc<Value>>>>;

/// Scoreboard responses memoized per `"<league>-<ymd>"`.
///
/// Entries never expire; a failed request is evicted so the next caller
/// retries.
pub struct ScoreboardCache<S> {
    source: S,
    entries: Mutex<HashMap<String, Slot>>,
}

pub fn cache_key(league: &str, date: NaiveDate) -> String {
    format!("{}-{}", league.trim().to_lowercase(), format_ymd(date))
}

impl<S: FeedSource> ScoreboardCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Memoized scoreboard; concurrent callers share one request.
    pub fn get(&self, league: &str, date: NaiveDate) -> FeedResult<Arc<Value>> {
        let key = cache_key(league, date);
        let slot = self.slot(&key, false);
        self.resolve(&key, league, date, slot)
    }

    /// Starts a new request for the key, or joins one already in flight,
    /// and replaces the resolved entry.
    pub fn refresh(&self, league: &str, date: NaiveDate) -> FeedResult<Arc<Value>> {
        let key = cache_key(league, date);
        let slot = self.slot(&key, true);
        self.resolve(&key, league, date, slot)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn slot(&self, key: &str, fresh: bool) -> Slot {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(slot) if !fresh || slot.get().is_none() => {
                debug!(key, in_flight = slot.get().is_none(), "scoreboard cache join");
                slot.clone()
            }
            _ => {
                let slot: Slot = Arc::new(OnceCell::new());
                entries.insert(key.to_string(), slot.clone());
                slot
            }
        }
    }

    fn resolve(
        &self,
        key: &str,
        league: &str,
        date: NaiveDate,
        slot: Slot,
    ) -> FeedResult<Arc<Value>> {
        let out = slot
            .get_or_init(|| self.source.fetch_scoreboard(date, league).map(Arc::new))
            .clone();
        if out.is_err() {
            let mut entries = self.lock();
            if entries.get(key).is_some_and(|cur| Arc::ptr_eq(cur, &slot)) {
                debug!(key, "scoreboard cache evict after failure");
                entries.remove(key);
            }
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: FeedSource> FeedSource for ScoreboardCache<S> {
    fn fetch_scoreboard(&self, date: NaiveDate, league: &str) -> FeedResult<Value> {
        self.get(league, date).map(|v| v.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use crate::error::FeedError;

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: usize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(fail_first: usize, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                delay,
            }
        }
    }

    impl FeedSource for CountingSource {
        fn fetch_scoreboard(&self, date: NaiveDate, league: &str) -> FeedResult<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if n < self.fail_first {
                return Err(FeedError::Network {
                    status: 503,
                    endpoint: league.to_string(),
                });
            }
            Ok(json!({"league": league, "date": format_ymd(date), "call": n}))
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 17).unwrap()
    }

    #[test]
    fn key_is_league_and_ymd() {
        assert_eq!(cache_key("ENG1", day()), "eng1-20240817");
    }

    #[test]
    fn concurrent_calls_share_one_request() {
        let cache = ScoreboardCache::new(CountingSource::new(0, Duration::from_millis(50)));
        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| cache.get("eng1", day()));
            let b = s.spawn(|| cache.get("eng1", day()));
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn distinct_keys_do_not_share() {
        let cache = ScoreboardCache::new(CountingSource::new(0, Duration::ZERO));
        cache.get("eng1", day()).unwrap();
        cache.get("esp1", day()).unwrap();
        cache.get("eng1", day().succ_opt().unwrap()).unwrap();
        cache.get("eng1", day()).unwrap();
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn rejection_is_evicted_and_retried() {
        let cache = ScoreboardCache::new(CountingSource::new(1, Duration::ZERO));
        let err = cache.get("eng1", day()).unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(cache.is_empty());
        let ok = cache.get("eng1", day()).unwrap();
        assert_eq!(ok["call"], 1);
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn refresh_replaces_resolved_entry() {
        let cache = ScoreboardCache::new(CountingSource::new(0, Duration::ZERO));
        let first = cache.get("eng1", day()).unwrap();
        let again = cache.get("eng1", day()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        let fresh = cache.refresh("eng1", day()).unwrap();
        assert_eq!(fresh["call"], 1);
        let cached = cache.get("eng1", day()).unwrap();
        assert!(Arc::ptr_eq(&fresh, &cached));
    }

    #[test]
    fn concurrent_refreshes_share_in_flight_request() {
        let cache = ScoreboardCache::new(CountingSource::new(0, Duration::from_millis(80)));
        cache.get("eng1", day()).unwrap();
        thread::scope(|s| {
            let a = s.spawn(|| cache.refresh("eng1", day()));
            thread::sleep(Duration::from_millis(20));
            let b = s.spawn(|| cache.refresh("eng1", day()));
            a.join().unwrap().unwrap();
            b.join().unwrap().unwrap();
        });
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 2);
    }
}
