use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{CommentaryEvent, CommentaryKind, CommentarySide, Side};
use crate::normalize::normalize_team_name;
use crate::scorers::{id_string, normalize_minute};

static RE_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bvar\b|video assistant").unwrap_or_else(|err| panic!("invalid var pattern: {err}"))
});

// Checked in order after goals; first keyword hit wins.
const KIND_KEYWORDS: &[(CommentaryKind, &[&str])] = &[
    (CommentaryKind::Card, &["yellow card", "red card", "second yellow", "card"]),
    (CommentaryKind::Subst, &["substitution", "replaces"]),
    (CommentaryKind::Corner, &["corner"]),
    (CommentaryKind::Offside, &["offside"]),
    (CommentaryKind::Handball, &["handball", "hand ball"]),
    (CommentaryKind::Foul, &["foul", "free kick"]),
    (CommentaryKind::Save, &["saved", "save"]),
    (CommentaryKind::Blocked, &["blocked"]),
    (
        CommentaryKind::Chance,
        &["attempt", "shot", "missed", "chance", "hits the", "header"],
    ),
    (
        CommentaryKind::Kickoff,
        &["kickoff", "kick off", "kick-off", "first half begins", "match starts"],
    ),
    (
        CommentaryKind::Ht,
        &["halftime", "half time", "half-time", "first half ends"],
    ),
    (
        CommentaryKind::Ft,
        &["full time", "full-time", "fulltime", "match ends", "second half ends"],
    ),
    (
        CommentaryKind::Period,
        &["half begins", "half ends", "extra time", "extra-time", "shootout"],
    ),
];

pub fn classify(type_text: &str, text: &str) -> CommentaryKind {
    let kind = type_text.trim().to_lowercase();
    let body = text.trim().to_lowercase();
    let is_goal =
        body.starts_with("goal") || body.starts_with("own goal") || kind.contains("goal");
    if is_goal && !RE_VAR.is_match(&body) {
        let all = format!("{kind} {body}");
        if all.contains("own goal") || all.contains("own-goal") {
            return CommentaryKind::OwnGoal;
        }
        if all.contains("penalty") && !all.contains("missed") && !all.contains("saved") {
            return CommentaryKind::PenGoal;
        }
        return CommentaryKind::Goal;
    }
    let all = format!("{kind} {body}");
    if RE_VAR.is_match(&all) {
        return CommentaryKind::Var;
    }
    KIND_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| all.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(CommentaryKind::Other)
}

/// Commentary items from a summary payload, ordered by sequence.
pub fn parse_commentary(root: &Value, sides: &HashMap<String, Side>) -> Vec<CommentaryEvent> {
    let Some(list) = root.get("commentary").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    let names = team_name_sides(root);

    let mut out = Vec::new();
    for (idx, item) in list.iter().enumerate() {
        let play = item.get("play").unwrap_or(&Value::Null);
        let Some(text) = ["text", "shortText"]
            .iter()
            .find_map(|key| item.get(*key).or_else(|| play.get(*key)))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            continue;
        };
        let type_text = play
            .get("type")
            .and_then(|t| t.get("text"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();

        let sequence = item
            .get("sequence")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(idx as i64);

        let time = item.get("time").or_else(|| play.get("clock"));
        let display = time
            .and_then(|t| t.get("displayValue"))
            .and_then(|v| v.as_str())
            .and_then(normalize_minute);
        let minute = display
            .as_deref()
            .and_then(leading_minute)
            .or_else(|| {
                time.and_then(|t| t.get("value"))
                    .and_then(|v| v.as_f64())
                    .filter(|secs| *secs >= 0.0)
                    .map(|secs| (secs / 60.0).floor() as u16)
            });
        let minute_text = display.filter(|m| m.contains('+'));

        let team = play.get("team").or_else(|| item.get("team"));
        let side = team
            .and_then(|t| t.get("id"))
            .and_then(id_string)
            .and_then(|id| sides.get(&id).copied())
            .or_else(|| {
                team.and_then(|t| t.get("displayName").or_else(|| t.get("name")))
                    .and_then(|v| v.as_str())
                    .and_then(|name| names.get(&normalize_team_name(name)).copied())
            });

        let detail = Some(type_text)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(text))
            .map(str::to_string);

        out.push(CommentaryEvent {
            sequence,
            minute,
            minute_text,
            kind: classify(type_text, text),
            side: CommentarySide::from(side),
            text: text.to_string(),
            detail,
        });
    }
    out.sort_by_key(|e| e.sequence);
    out
}

fn leading_minute(minute: &str) -> Option<u16> {
    minute
        .split(['+', '\''])
        .next()
        .and_then(|n| n.trim().parse().ok())
}

fn team_name_sides(root: &Value) -> HashMap<String, Side> {
    let mut out = HashMap::new();
    let competitors = root
        .get("header")
        .and_then(|h| h.get("competitions"))
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())
        .and_then(|c| c.get("competitors"))
        .and_then(|v| v.as_array());
    for competitor in competitors.into_iter().flatten() {
        let Some(side) = competitor
            .get("homeAway")
            .and_then(|v| v.as_str())
            .and_then(Side::parse)
        else {
            continue;
        };
        let Some(team) = competitor.get("team") else {
            continue;
        };
        for key in ["displayName", "shortDisplayName", "name", "abbreviation"] {
            if let Some(name) = team.get(key).and_then(|v| v.as_str()) {
                out.insert(normalize_team_name(name), side);
            }
        }
    }
    out
}
