use std::collections::{HashSet, VecDeque};

use crate::model::{MatchEvent, MatchState, Scoreboard};
use crate::normalize::normalize_team_name;
use crate::poller::PollUpdate;

const MAX_LOGS: usize = 200;

/// What a consumer keeps on screen between poll ticks.
#[derive(Debug, Clone)]
pub struct Board<T> {
    pub label: String,
    pub snapshot: Option<T>,
    pub error: Option<String>,
    pub logs: VecDeque<String>,
    pub updates: u64,
}

impl<T> Board<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            snapshot: None,
            error: None,
            logs: VecDeque::with_capacity(MAX_LOGS),
            updates: 0,
        }
    }

    /// A failure keeps the last good snapshot; the next success clears the
    /// error.
    pub fn apply(&mut self, update: PollUpdate<T>) {
        match update {
            PollUpdate::Snapshot(data) => {
                self.snapshot = Some(data);
                self.updates += 1;
                if self.error.take().is_some() {
                    self.push_log(format!("[INFO] {} recovered", self.label));
                }
            }
            PollUpdate::Failed(message) => {
                self.push_log(format!("[WARN] {} fetch error: {message}", self.label));
                self.error = Some(message);
            }
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }
}

impl Board<Scoreboard> {
    fn events(&self) -> impl Iterator<Item = &MatchEvent> {
        self.snapshot.iter().flat_map(|board| board.events.iter())
    }

    pub fn live_or_upcoming(&self) -> Vec<&MatchEvent> {
        self.events()
            .filter(|event| event.state != MatchState::Completed)
            .collect()
    }

    pub fn finished(&self) -> Vec<&MatchEvent> {
        self.events()
            .filter(|event| event.state == MatchState::Completed)
            .collect()
    }

    /// Events involving any of the given teams. Names are compared after
    /// `normalize_team_name` on both sides.
    pub fn favourites(&self, teams: &HashSet<String>) -> Vec<&MatchEvent> {
        let wanted = teams
            .iter()
            .map(|name| normalize_team_name(name))
            .filter(|name| !name.is_empty())
            .collect::<HashSet<_>>();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.events()
            .filter(|event| {
                [&event.home, &event.away].iter().any(|team| {
                    [&team.display_name, &team.short_display_name]
                        .iter()
                        .any(|name| wanted.contains(&normalize_team_name(name)))
                })
            })
            .collect()
    }
}
