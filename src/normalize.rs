use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::commentary::parse_commentary;
use crate::model::{
    EventStats, MatchEvent, MatchState, MatchSummary, PLACEHOLDER_TEAM, Saves, Scoreboard, Scorer,
    Side, StatMetric, TeamRef,
};
use crate::scorers::{id_string, scorer_from_play, side_lookup};

/// Canonical key, label, upstream name variants.
const METRICS: &[(&str, &str, &[&str])] = &[
    (
        "poss",
        "Possession",
        &["possessionPct", "possession", "possessionPercentage", "ballPossession"],
    ),
    ("shots", "Shots", &["totalShots", "shots", "shotsTotal"]),
    (
        "shotsOnTarget",
        "Shots on target",
        &["shotsOnTarget", "shotsOnGoal", "onTargetShots"],
    ),
    ("corners", "Corners", &["wonCorners", "cornerKicks", "corners"]),
    ("fouls", "Fouls", &["foulsCommitted", "fouls"]),
    ("offsides", "Offsides", &["offsides", "offside"]),
    ("yellowCards", "Yellow cards", &["yellowCards"]),
    ("redCards", "Red cards", &["redCards"]),
    ("saves", "Saves", &["saves", "goalkeeperSaves"]),
    ("passes", "Passes", &["totalPasses", "passes"]),
    ("passPct", "Pass accuracy", &["passPct", "passAccuracy"]),
];

// Upstream already reports these as per-side percentages.
const EXPLICIT_PCT_KEYS: &[&str] = &["poss"];

pub fn parse_scoreboard_json(raw: &str, league: &str) -> Result<Scoreboard> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Scoreboard::default());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid scoreboard json")?;
    Ok(parse_scoreboard(&root, league))
}

/// Events in upstream order; a repeated id keeps its first occurrence.
pub fn parse_scoreboard(root: &Value, league: &str) -> Scoreboard {
    let mut seen = HashSet::new();
    let mut events = Vec::new();
    let Some(list) = root.get("events").and_then(|v| v.as_array()) else {
        return Scoreboard { events };
    };
    for raw in list {
        let Some(event) = parse_event(raw, league) else {
            continue;
        };
        if seen.insert(event.id.clone()) {
            events.push(event);
        }
    }
    Scoreboard { events }
}

pub fn parse_event(event: &Value, league: &str) -> Option<MatchEvent> {
    let id = event.get("id").and_then(id_string)?;
    let competition = competition(event);
    let (home_raw, away_raw) = split_competitors(competition.get("competitors"));
    let status = event
        .get("status")
        .or_else(|| competition.get("status"))
        .unwrap_or(&Value::Null);
    let state = match_state(status);

    let kickoff = event
        .get("date")
        .or_else(|| competition.get("date"))
        .and_then(|v| v.as_str())
        .and_then(parse_kickoff);

    Some(MatchEvent {
        id,
        league: league.to_string(),
        kickoff,
        home: home_raw.map(team_ref).unwrap_or_else(TeamRef::placeholder),
        away: away_raw.map(team_ref).unwrap_or_else(TeamRef::placeholder),
        state,
        status_detail: status_detail(status),
        home_score: score_for(home_raw, state),
        away_score: score_for(away_raw, state),
        stats: extract_stats_from_scoreboard_event(event),
    })
}

pub fn extract_stats_from_scoreboard_event(event: &Value) -> EventStats {
    let competition = competition(event);
    let (home, away) = split_competitors(competition.get("competitors"));
    let home_stats = home.and_then(|c| c.get("statistics"));
    let away_stats = away.and_then(|c| c.get("statistics"));
    let metrics = metrics_from_stat_lists(home_stats, away_stats);

    let saves = metrics.iter().find(|m| m.key == "saves").map(|m| Saves {
        home: m.home_val,
        away: m.away_val,
        home_abbr: home.map(team_ref).map(|t| t.abbreviation).unwrap_or_default(),
        away_abbr: away.map(team_ref).map(|t| t.abbreviation).unwrap_or_default(),
    });

    EventStats {
        metrics,
        saves,
        scorers: extract_scorers_from_scoreboard_event(event),
    }
}

/// Accepts flat `details` (filtered on `scoringPlay`) or nested
/// `details.scoringPlays`.
pub fn extract_scorers_from_scoreboard_event(event: &Value) -> Vec<Scorer> {
    let competition = competition(event);
    let sides = side_lookup(competition.get("competitors"));
    let Some(details) = competition.get("details").or_else(|| event.get("details")) else {
        return Vec::new();
    };

    let plays: Vec<&Value> = match details {
        Value::Array(list) => list
            .iter()
            .filter(|d| d.get("scoringPlay").and_then(|v| v.as_bool()) == Some(true))
            .collect(),
        Value::Object(map) => map
            .get("scoringPlays")
            .and_then(|v| v.as_array())
            .map(|list| list.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    plays
        .into_iter()
        .map(|play| scorer_from_play(play, &sides))
        .collect()
}

/// One metric per recognized key present on at least one side.
pub fn metrics_from_stat_lists(home: Option<&Value>, away: Option<&Value>) -> Vec<StatMetric> {
    let home = stat_map(home);
    let away = stat_map(away);
    let mut out = Vec::new();
    for (key, label, names) in METRICS {
        let home_val = lookup_stat(&home, names);
        let away_val = lookup_stat(&away, names);
        if home_val.is_none() && away_val.is_none() {
            continue;
        }
        let home_pct = if EXPLICIT_PCT_KEYS.contains(key) {
            home_val
                .map(|v| v.round().clamp(0.0, 100.0) as u8)
                .or_else(|| share_pct(home_val, away_val))
        } else {
            share_pct(home_val, away_val)
        };
        out.push(StatMetric {
            key: (*key).to_string(),
            label: (*label).to_string(),
            home_val,
            away_val,
            home_pct,
        });
    }
    out
}

pub fn share_pct(home: Option<f64>, away: Option<f64>) -> Option<u8> {
    let (h, a) = (home?, away?);
    let total = h + a;
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some((100.0 * h / total).round().clamp(0.0, 100.0) as u8)
}

fn stat_map(list: Option<&Value>) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    let Some(list) = list.and_then(|v| v.as_array()) else {
        return out;
    };
    for stat in list {
        let Some(name) = stat.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let value = stat
            .get("value")
            .and_then(number_value)
            .or_else(|| stat.get("displayValue").and_then(number_value));
        if let Some(value) = value {
            out.entry(name.to_ascii_lowercase()).or_insert(value);
        }
    }
    out
}

fn lookup_stat(map: &HashMap<String, f64>, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| map.get(&name.to_ascii_lowercase()).copied())
}

fn number_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn team_ref(competitor: &Value) -> TeamRef {
    let team = competitor.get("team").unwrap_or(competitor);
    let pick = |key: &str| {
        team.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let short = pick("shortDisplayName");
    let display = pick("displayName");
    let name = pick("name");

    let short_display_name = short
        .clone()
        .or_else(|| display.clone())
        .or_else(|| name.clone())
        .unwrap_or_else(|| PLACEHOLDER_TEAM.to_string());
    let display_name = display
        .or(short)
        .or(name)
        .unwrap_or_else(|| PLACEHOLDER_TEAM.to_string());
    let abbreviation = pick("abbreviation").unwrap_or_else(|| abbreviate_team(&display_name));
    let logo_url = pick("logo").or_else(|| {
        team.get("logos")
            .and_then(|v| v.as_array())
            .and_then(|list| list.first())
            .and_then(|logo| logo.get("href"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });

    TeamRef {
        id: team.get("id").and_then(id_string).unwrap_or_default(),
        display_name,
        short_display_name,
        abbreviation,
        logo_url,
    }
}

pub fn abbreviate_team(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.chars().count() <= 3 {
        return trimmed.to_uppercase();
    }
    let mut abbr = String::new();
    for part in trimmed.split_whitespace() {
        if let Some(ch) = part.chars().next() {
            abbr.push(ch);
        }
        if abbr.chars().count() >= 3 {
            break;
        }
    }
    if abbr.chars().count() >= 2 {
        return abbr.to_uppercase();
    }
    trimmed.chars().take(3).collect::<String>().to_uppercase()
}

/// Key used to match team names against a favourites set.
pub fn normalize_team_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn competition(event: &Value) -> &Value {
    event
        .get("competitions")
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())
        .unwrap_or(event)
}

/// Home / away competitor; upstream order is the fallback when `homeAway`
/// is missing.
fn split_competitors(competitors: Option<&Value>) -> (Option<&Value>, Option<&Value>) {
    let Some(list) = competitors.and_then(|v| v.as_array()) else {
        return (None, None);
    };
    let by_side = |side: Side| {
        list.iter().find(|c| {
            c.get("homeAway")
                .and_then(|v| v.as_str())
                .and_then(Side::parse)
                == Some(side)
        })
    };
    let home = by_side(Side::Home).or_else(|| list.first());
    let away = by_side(Side::Away).or_else(|| list.get(1));
    (home, away)
}

fn match_state(status: &Value) -> MatchState {
    let kind = status.get("type").unwrap_or(&Value::Null);
    MatchState::from_upstream(
        kind.get("state").and_then(|v| v.as_str()),
        kind.get("completed").and_then(|v| v.as_bool()).unwrap_or(false),
    )
}

fn status_detail(status: &Value) -> String {
    let kind = status.get("type").unwrap_or(&Value::Null);
    ["shortDetail", "detail", "description"]
        .iter()
        .find_map(|key| kind.get(*key).and_then(|v| v.as_str()))
        .or_else(|| status.get("displayClock").and_then(|v| v.as_str()))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Scheduled matches carry no score even when upstream sends `"0"`.
fn score_for(competitor: Option<&Value>, state: MatchState) -> Option<u32> {
    if state == MatchState::Scheduled {
        return None;
    }
    let score = competitor?.get("score")?;
    let score = match score {
        Value::Object(map) => map.get("value").or_else(|| map.get("displayValue"))?,
        other => other,
    };
    let value = number_value(score)?;
    if value < 0.0 {
        return None;
    }
    Some(value.round() as u32)
}

fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    // Upstream commonly omits seconds: 2024-08-17T14:00Z
    ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn parse_summary_json(raw: &str, event_id: &str) -> Result<MatchSummary> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(parse_summary(&Value::Null, event_id));
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid summary json")?;
    Ok(parse_summary(&root, event_id))
}

pub fn parse_summary(root: &Value, event_id: &str) -> MatchSummary {
    let header = root.get("header").unwrap_or(&Value::Null);
    let competition = competition(header);
    let competitors = competition.get("competitors");
    let sides = side_lookup(competitors);
    let (home_raw, away_raw) = split_competitors(competitors);
    let status = competition
        .get("status")
        .or_else(|| header.get("status"))
        .unwrap_or(&Value::Null);
    let state = match_state(status);

    let (home_stats, away_stats) = boxscore_stat_lists(root, &sides);
    let metrics = metrics_from_stat_lists(home_stats, away_stats);

    let scorers = root
        .get("keyEvents")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter(|e| e.get("scoringPlay").and_then(|v| v.as_bool()) == Some(true))
                .map(|play| scorer_from_play(play, &sides))
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .or_else(|| {
            root.get("scoringPlays").and_then(|v| v.as_array()).map(|list| {
                list.iter()
                    .map(|play| scorer_from_play(play, &sides))
                    .collect()
            })
        })
        .unwrap_or_default();

    MatchSummary {
        event_id: header
            .get("id")
            .and_then(id_string)
            .unwrap_or_else(|| event_id.trim().to_string()),
        home: home_raw.map(team_ref).unwrap_or_else(TeamRef::placeholder),
        away: away_raw.map(team_ref).unwrap_or_else(TeamRef::placeholder),
        state,
        status_detail: status_detail(status),
        home_score: score_for(home_raw, state),
        away_score: score_for(away_raw, state),
        metrics,
        scorers,
        commentary: parse_commentary(root, &sides),
    }
}

fn boxscore_stat_lists<'a>(
    root: &'a Value,
    sides: &HashMap<String, Side>,
) -> (Option<&'a Value>, Option<&'a Value>) {
    let Some(teams) = root
        .get("boxscore")
        .and_then(|b| b.get("teams"))
        .and_then(|v| v.as_array())
    else {
        return (None, None);
    };
    let mut home = None;
    let mut away = None;
    for (idx, entry) in teams.iter().enumerate() {
        let side = entry
            .get("homeAway")
            .and_then(|v| v.as_str())
            .and_then(Side::parse)
            .or_else(|| {
                entry
                    .get("team")
                    .and_then(|t| t.get("id"))
                    .and_then(id_string)
                    .and_then(|id| sides.get(&id).copied())
            })
            .unwrap_or(if idx == 0 { Side::Home } else { Side::Away });
        let stats = entry.get("statistics");
        match side {
            Side::Home if home.is_none() => home = stats,
            Side::Away if away.is_none() => away = stats,
            _ => {}
        }
    }
    (home, away)
}
