use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_TEAM: &str = "TBD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    Scheduled,
    Live,
    Completed,
}

impl MatchState {
    /// Maps upstream `status.type.state` (`pre` / `in` / `post`). The state
    /// string wins; `completed` only decides when the state is missing or
    /// unrecognised, so an `in` event always polls at the live cadence.
    pub fn from_upstream(state: Option<&str>, completed: bool) -> Self {
        match state.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("in") => MatchState::Live,
            Some("post") => MatchState::Completed,
            Some("pre") => MatchState::Scheduled,
            _ if completed => MatchState::Completed,
            _ => MatchState::Scheduled,
        }
    }

    pub fn is_live(self) -> bool {
        self == MatchState::Live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" => Some(Side::Home),
            "away" => Some(Side::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub display_name: String,
    pub short_display_name: String,
    pub abbreviation: String,
    pub logo_url: Option<String>,
}

impl TeamRef {
    pub fn placeholder() -> Self {
        Self {
            id: String::new(),
            display_name: PLACEHOLDER_TEAM.to_string(),
            short_display_name: PLACEHOLDER_TEAM.to_string(),
            abbreviation: PLACEHOLDER_TEAM.to_string(),
            logo_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatMetric {
    pub key: String,
    pub label: String,
    pub home_val: Option<f64>,
    pub away_val: Option<f64>,
    pub home_pct: Option<u8>,
}

impl StatMetric {
    pub fn away_pct(&self) -> Option<u8> {
        self.home_pct.map(|pct| 100u8.saturating_sub(pct))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saves {
    pub home: Option<f64>,
    pub away: Option<f64>,
    pub home_abbr: String,
    pub away_abbr: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventStats {
    pub metrics: Vec<StatMetric>,
    pub saves: Option<Saves>,
    pub scorers: Vec<Scorer>,
}

/// Raw text a scorer was derived from, kept so tags can be re-derived.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScorerSource {
    pub type_text: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorer {
    pub player: String,
    pub minute: String,
    pub side: Option<Side>,
    #[serde(default)]
    pub source: Option<ScorerSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentaryKind {
    Goal,
    PenGoal,
    OwnGoal,
    Card,
    Subst,
    Corner,
    Offside,
    Foul,
    Handball,
    Var,
    Save,
    Blocked,
    Chance,
    Kickoff,
    Ht,
    Ft,
    Period,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentarySide {
    Home,
    Away,
    Neutral,
}

impl From<Option<Side>> for CommentarySide {
    fn from(side: Option<Side>) -> Self {
        match side {
            Some(Side::Home) => CommentarySide::Home,
            Some(Side::Away) => CommentarySide::Away,
            None => CommentarySide::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryEvent {
    pub sequence: i64,
    pub minute: Option<u16>,
    pub minute_text: Option<String>,
    pub kind: CommentaryKind,
    pub side: CommentarySide,
    pub text: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: String,
    pub league: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub home: TeamRef,
    pub away: TeamRef,
    pub state: MatchState,
    pub status_detail: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub stats: EventStats,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scoreboard {
    pub events: Vec<MatchEvent>,
}

impl Scoreboard {
    /// True when any event's upstream state is `in`.
    pub fn has_live(&self) -> bool {
        self.events.iter().any(|e| e.state.is_live())
    }
}

/// Single-event view built from the summary endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub event_id: String,
    pub home: TeamRef,
    pub away: TeamRef,
    pub state: MatchState,
    pub status_detail: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub metrics: Vec<StatMetric>,
    pub scorers: Vec<Scorer>,
    pub commentary: Vec<CommentaryEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub pos: u32,
    pub team: String,
    pub p: u32,
    pub w: u32,
    pub d: u32,
    pub l: u32,
    pub gd: i32,
    pub pts: u32,
}
