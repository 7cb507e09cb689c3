//! Adaptive live polling.
//!
//! `LivePoller` is a plain state machine: it decides when a tick is due,
//! refuses to overlap requests, and picks the next delay from the last
//! result. `spawn_live_poller` drives it on its own thread and pushes
//! `PollUpdate`s to the consumer over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cache::ScoreboardCache;
use crate::config::Cadence;
use crate::error::FeedResult;
use crate::gateway::{FeedSource, Gateway};
use crate::model::{MatchSummary, Scoreboard};
use crate::normalize::{parse_scoreboard, parse_summary};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual time for tests; only moves when advanced.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether a snapshot warrants the live cadence.
pub trait LiveSnapshot {
    fn is_live(&self) -> bool;
}

impl LiveSnapshot for Scoreboard {
    fn is_live(&self) -> bool {
        self.has_live()
    }
}

impl LiveSnapshot for MatchSummary {
    fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

pub type FetchFn<T> = Arc<dyn Fn() -> FeedResult<T> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PollState {
    pub phase: PollPhase,
    pub interval: Duration,
    pub visible: bool,
    pub in_flight: bool,
    pub cancelled: bool,
    pub next_due: Option<Instant>,
    pub live: bool,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate<T> {
    Snapshot(T),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Fetch,
    SkippedInFlight,
    NotDue,
}

pub struct LivePoller<T> {
    name: String,
    fetch: FetchFn<T>,
    clock: Arc<dyn Clock>,
    cadence: Cadence,
    state: PollState,
}

impl<T: LiveSnapshot + Send + 'static> LivePoller<T> {
    pub fn new(
        name: impl Into<String>,
        fetch: FetchFn<T>,
        clock: Arc<dyn Clock>,
        cadence: Cadence,
    ) -> Self {
        Self {
            name: name.into(),
            fetch,
            clock,
            cadence,
            state: PollState {
                phase: PollPhase::Idle,
                interval: cadence.idle,
                visible: true,
                in_flight: false,
                cancelled: false,
                next_due: None,
                live: false,
                last_error: None,
                ticks: 0,
                skipped: 0,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn fetcher(&self) -> FetchFn<T> {
        self.fetch.clone()
    }

    /// Idle -> Polling with an immediate tick, or Paused when hidden.
    pub fn start(&mut self) {
        if self.state.phase != PollPhase::Idle {
            return;
        }
        if self.state.visible {
            self.state.phase = PollPhase::Polling;
            self.state.next_due = Some(self.clock.now());
        } else {
            self.state.phase = PollPhase::Paused;
        }
        info!(poller = %self.name, "poller started");
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.state
            .next_due
            .map(|due| due.saturating_duration_since(self.clock.now()))
    }

    /// Claims a due tick. A tick that fires while a request is still out is
    /// dropped, not queued; the completion schedules the next one.
    pub fn poll_due(&mut self) -> TickDecision {
        if self.state.phase != PollPhase::Polling {
            return TickDecision::NotDue;
        }
        let Some(due) = self.state.next_due else {
            return TickDecision::NotDue;
        };
        if self.clock.now() < due {
            return TickDecision::NotDue;
        }
        self.state.next_due = None;
        if self.state.in_flight {
            self.state.skipped += 1;
            debug!(poller = %self.name, "tick skipped, request in flight");
            return TickDecision::SkippedInFlight;
        }
        self.state.in_flight = true;
        self.state.ticks += 1;
        debug!(poller = %self.name, tick = self.state.ticks, "tick");
        TickDecision::Fetch
    }

    /// Applies a finished request. Returns `None` once cancelled.
    pub fn complete(&mut self, result: FeedResult<T>) -> Option<PollUpdate<T>> {
        self.state.in_flight = false;
        if self.state.cancelled {
            debug!(poller = %self.name, "result dropped after cancel");
            return None;
        }
        let previous = self.state.interval;
        let update = match result {
            Ok(data) => {
                self.state.live = data.is_live();
                self.state.last_error = None;
                self.state.interval = if self.state.live {
                    self.cadence.live
                } else {
                    self.cadence.idle
                };
                PollUpdate::Snapshot(data)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(poller = %self.name, error = %message, "poll failed");
                self.state.last_error = Some(message.clone());
                self.state.interval = self.cadence.error;
                PollUpdate::Failed(message)
            }
        };
        if previous != self.state.interval {
            debug!(
                poller = %self.name,
                interval_ms = self.state.interval.as_millis() as u64,
                "cadence changed"
            );
        }
        if self.state.phase == PollPhase::Polling {
            self.state.next_due = Some(self.clock.now() + self.state.interval);
        }
        Some(update)
    }

    /// Hidden cancels the pending timer; in-flight requests still land.
    /// Visible again ticks immediately.
    pub fn set_visible(&mut self, visible: bool) {
        if self.state.cancelled || self.state.visible == visible {
            return;
        }
        self.state.visible = visible;
        match (self.state.phase, visible) {
            (PollPhase::Polling, false) => {
                self.state.phase = PollPhase::Paused;
                self.state.next_due = None;
                debug!(poller = %self.name, "paused");
            }
            (PollPhase::Paused, true) => {
                self.state.phase = PollPhase::Polling;
                self.state.next_due = Some(self.clock.now());
                debug!(poller = %self.name, "resumed");
            }
            _ => {}
        }
    }

    pub fn stop(&mut self) {
        if self.state.cancelled {
            return;
        }
        self.state.cancelled = true;
        self.state.next_due = None;
        self.state.phase = PollPhase::Cancelled;
        info!(poller = %self.name, "poller stopped");
    }

    /// Runs a due tick inline, for callers without a driver thread.
    pub fn tick_blocking(&mut self) -> Option<PollUpdate<T>> {
        if self.poll_due() != TickDecision::Fetch {
            return None;
        }
        let result = (self.fetch)();
        self.complete(result)
    }
}

enum Signal<T> {
    Visible(bool),
    Stop,
    Done(FeedResult<T>),
}

/// Control side of a spawned poller. Dropping it stops the poller.
pub struct PollerHandle<T> {
    tx: Sender<Signal<T>>,
    join: Option<JoinHandle<()>>,
}

impl<T> PollerHandle<T> {
    pub fn set_visible(&self, visible: bool) {
        let _ = self.tx.send(Signal::Visible(visible));
    }

    pub fn stop(mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl<T> Drop for PollerHandle<T> {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}

pub fn spawn_live_poller<T>(
    mut poller: LivePoller<T>,
    updates: Sender<PollUpdate<T>>,
) -> PollerHandle<T>
where
    T: LiveSnapshot + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker_tx = tx.clone();
    let join = thread::spawn(move || {
        poller.start();
        run_poller(&mut poller, &rx, &worker_tx, &updates);
    });
    PollerHandle {
        tx,
        join: Some(join),
    }
}

fn run_poller<T>(
    poller: &mut LivePoller<T>,
    rx: &Receiver<Signal<T>>,
    worker_tx: &Sender<Signal<T>>,
    updates: &Sender<PollUpdate<T>>,
) where
    T: LiveSnapshot + Send + 'static,
{
    loop {
        if poller.poll_due() == TickDecision::Fetch {
            let fetch = poller.fetcher();
            let tx = worker_tx.clone();
            thread::spawn(move || {
                let _ = tx.send(Signal::Done(fetch()));
            });
        }

        let signal = match poller.next_delay() {
            Some(delay) => match rx.recv_timeout(delay) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(signal) => signal,
                Err(_) => break,
            },
        };

        match signal {
            Signal::Visible(visible) => poller.set_visible(visible),
            Signal::Stop => {
                poller.stop();
                break;
            }
            Signal::Done(result) => {
                if let Some(update) = poller.complete(result) {
                    if updates.send(update).is_err() {
                        poller.stop();
                        break;
                    }
                }
            }
        }
    }
}

/// Scoreboard consumer: first tick may reuse a cached response, later ticks
/// refresh it.
pub fn scoreboard_poller<S>(
    cache: Arc<ScoreboardCache<S>>,
    league: impl Into<String>,
    date: NaiveDate,
    clock: Arc<dyn Clock>,
    cadence: Cadence,
) -> LivePoller<Scoreboard>
where
    S: FeedSource + 'static,
{
    let league = league.into();
    let name = format!("scoreboard:{league}");
    let primed = AtomicBool::new(false);
    let fetch: FetchFn<Scoreboard> = Arc::new(move || {
        let raw = if primed.swap(true, Ordering::SeqCst) {
            cache.refresh(&league, date)?
        } else {
            cache.get(&league, date)?
        };
        Ok(parse_scoreboard(&raw, &league))
    });
    LivePoller::new(name, fetch, clock, cadence)
}

pub fn summary_poller(
    gateway: Arc<Gateway>,
    league: impl Into<String>,
    event_id: impl Into<String>,
    clock: Arc<dyn Clock>,
    cadence: Cadence,
) -> LivePoller<MatchSummary> {
    let league = league.into();
    let event_id = event_id.into();
    let name = format!("summary:{event_id}");
    let fetch: FetchFn<MatchSummary> = Arc::new(move || {
        let raw = gateway.fetch_summary(&league, &event_id)?;
        Ok(parse_summary(&raw, &event_id))
    });
    LivePoller::new(name, fetch, clock, cadence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::error::FeedError;
    use crate::model::{EventStats, MatchEvent, MatchState, TeamRef};

    fn board(state: MatchState) -> Scoreboard {
        Scoreboard {
            events: vec![MatchEvent {
                id: "1".to_string(),
                league: "eng1".to_string(),
                kickoff: None,
                home: TeamRef::placeholder(),
                away: TeamRef::placeholder(),
                state,
                status_detail: String::new(),
                home_score: None,
                away_score: None,
                stats: EventStats::default(),
            }],
        }
    }

    fn failure() -> FeedError {
        FeedError::Network {
            status: 500,
            endpoint: "scoreboard".to_string(),
        }
    }

    fn scripted(
        results: Vec<FeedResult<Scoreboard>>,
        clock: &ManualClock,
    ) -> LivePoller<Scoreboard> {
        let queue = Mutex::new(results.into_iter().collect::<VecDeque<_>>());
        let fetch: FetchFn<Scoreboard> = Arc::new(move || {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Scoreboard::default()))
        });
        LivePoller::new("test", fetch, Arc::new(clock.clone()), Cadence::default())
    }

    #[test]
    fn cadence_follows_live_state_and_errors() {
        let clock = ManualClock::new();
        let mut poller = scripted(
            vec![
                Ok(board(MatchState::Live)),
                Ok(board(MatchState::Scheduled)),
                Err(failure()),
                Ok(board(MatchState::Live)),
            ],
            &clock,
        );
        poller.start();

        assert!(matches!(poller.tick_blocking(), Some(PollUpdate::Snapshot(_))));
        assert_eq!(poller.next_delay(), Some(Duration::from_millis(10_000)));

        clock.advance(Duration::from_millis(10_000));
        poller.tick_blocking();
        assert_eq!(poller.next_delay(), Some(Duration::from_millis(60_000)));

        clock.advance(Duration::from_millis(60_000));
        let failed = poller.tick_blocking();
        assert!(matches!(failed, Some(PollUpdate::Failed(ref msg)) if msg.contains("500")));
        assert_eq!(poller.next_delay(), Some(Duration::from_millis(5_000)));
        assert!(poller.state().last_error.is_some());

        clock.advance(Duration::from_millis(5_000));
        poller.tick_blocking();
        assert_eq!(poller.next_delay(), Some(Duration::from_millis(10_000)));
        assert!(poller.state().last_error.is_none());
        assert_eq!(poller.state().ticks, 4);
    }

    #[test]
    fn not_due_before_interval() {
        let clock = ManualClock::new();
        let mut poller = scripted(vec![Ok(board(MatchState::Completed))], &clock);
        assert_eq!(poller.poll_due(), TickDecision::NotDue);
        poller.start();
        poller.tick_blocking();
        clock.advance(Duration::from_millis(59_999));
        assert_eq!(poller.poll_due(), TickDecision::NotDue);
        clock.advance(Duration::from_millis(1));
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
    }

    #[test]
    fn overlapping_tick_is_skipped_not_queued() {
        let clock = ManualClock::new();
        let mut poller = scripted(Vec::new(), &clock);
        poller.start();
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
        assert!(poller.state().in_flight);

        // Hide and show while the request is out: the immediate tick is dropped.
        poller.set_visible(false);
        poller.set_visible(true);
        assert_eq!(poller.poll_due(), TickDecision::SkippedInFlight);
        assert_eq!(poller.poll_due(), TickDecision::NotDue);
        assert_eq!(poller.state().skipped, 1);

        poller.complete(Ok(board(MatchState::Live)));
        assert!(!poller.state().in_flight);
        assert_eq!(poller.next_delay(), Some(Duration::from_millis(10_000)));
        assert_eq!(poller.state().ticks, 1);
    }

    #[test]
    fn hidden_pauses_and_visible_ticks_immediately() {
        let clock = ManualClock::new();
        let mut poller = scripted(Vec::new(), &clock);
        poller.start();
        poller.tick_blocking();

        poller.set_visible(false);
        assert_eq!(poller.state().phase, PollPhase::Paused);
        assert!(poller.next_delay().is_none());
        clock.advance(Duration::from_secs(600));
        assert_eq!(poller.poll_due(), TickDecision::NotDue);

        poller.set_visible(true);
        assert_eq!(poller.state().phase, PollPhase::Polling);
        assert_eq!(poller.next_delay(), Some(Duration::ZERO));
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
    }

    #[test]
    fn result_landing_while_paused_is_applied_without_rescheduling() {
        let clock = ManualClock::new();
        let mut poller = scripted(Vec::new(), &clock);
        poller.start();
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
        poller.set_visible(false);
        let update = poller.complete(Ok(board(MatchState::Live)));
        assert!(matches!(update, Some(PollUpdate::Snapshot(_))));
        assert!(poller.state().live);
        assert!(poller.next_delay().is_none());
    }

    #[test]
    fn stop_drops_in_flight_result() {
        let clock = ManualClock::new();
        let mut poller = scripted(Vec::new(), &clock);
        poller.start();
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
        poller.stop();
        assert!(poller.state().cancelled);
        assert_eq!(poller.state().phase, PollPhase::Cancelled);
        assert!(poller.complete(Ok(board(MatchState::Live))).is_none());
        assert!(!poller.state().live);
        poller.set_visible(false);
        poller.set_visible(true);
        assert_eq!(poller.poll_due(), TickDecision::NotDue);
    }

    #[test]
    fn start_while_hidden_waits_for_visibility() {
        let clock = ManualClock::new();
        let mut poller = scripted(Vec::new(), &clock);
        poller.set_visible(false);
        poller.start();
        assert_eq!(poller.state().phase, PollPhase::Paused);
        assert_eq!(poller.poll_due(), TickDecision::NotDue);
        poller.set_visible(true);
        assert_eq!(poller.poll_due(), TickDecision::Fetch);
    }

    #[test]
    fn spawned_poller_delivers_updates_until_stopped() {
        let fetch: FetchFn<Scoreboard> = Arc::new(|| Ok(board(MatchState::Live)));
        let cadence = Cadence {
            live: Duration::from_millis(20),
            idle: Duration::from_millis(20),
            error: Duration::from_millis(20),
        };
        let poller = LivePoller::new("spawned", fetch, Arc::new(SystemClock), cadence);
        let (tx, rx) = mpsc::channel();
        let handle = spawn_live_poller(poller, tx);
        for _ in 0..2 {
            let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(update, PollUpdate::Snapshot(ref b) if b.has_live()));
        }
        handle.stop();
        while rx.recv_timeout(Duration::from_millis(100)).is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
