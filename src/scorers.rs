//! Scorer attribution for raw scoring-play records.
//!
//! Upstream records range from fully structured (athlete, explicit
//! penalty/own-goal booleans, `homeAway`) to a bare sentence of commentary.
//! Each field is resolved from the most structured source available and
//! falls back to ordered text heuristics.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{Scorer, ScorerSource, Side};

pub const DEFAULT_SCORER: &str = "Goal";

// A word may end in `.` only as an initial ("A. Smith"); any other full stop
// ends the name.
const NAME: &str = r"(?:\p{Lu}\.|\p{Lu}[\p{L}'’\-]*)(?:\s+(?:\p{Lu}\.|\p{Lu}[\p{L}'’\-]*|(?:van|von|de|der|den|da|dos|di|du|le|la|el)\b))*";

static RE_BY: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\b[Bb]y\s+({NAME})")));
static RE_VERB: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"({NAME})\s+(?:converts|scores|nets|finishes|heads|strikes|fires)\b"
    ))
});
static RE_SENTENCE: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\.\s+({NAME})\s+\p{{Ll}}+")));
static RE_DASH: Lazy<Regex> = Lazy::new(|| compile(&format!(r"[-–—]\s+({NAME})")));
static RE_PAREN: Lazy<Regex> = Lazy::new(|| compile(&format!(r"({NAME})\s*\(")));

static RE_PENALTY: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\bpen(?:alty|alties)?\b|\(pen\)|\(p\)"));
static RE_OWN_GOAL: Lazy<Regex> = Lazy::new(|| compile(r"(?i)own[- ]goal|\(og\)"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\s*\((p|pen|og|o\.g\.)\)"));

static RE_CLOCK: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(\d{1,3})\s*'?\s*(?:\+\s*(\d{1,2}))?"));
static RE_TEXT_MINUTE: Lazy<Regex> =
    Lazy::new(|| compile(r"(\d{1,3})(?:\s*'?\s*\+\s*(\d{1,2}))?\s*'"));

// Words the name patterns can swallow that are never part of a player name.
const LEAD_NOISE: &[&str] = &[
    "goal", "goal!", "penalty", "own", "header", "scored", "scores", "converted", "by",
    "assisted",
];
// "Assisted by X" names the assister, not the scorer.
const BY_NOT_SCORER: &[&str] = &["assisted", "saved", "fouled", "blocked", "conceded"];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid scorer pattern {pattern}: {err}"))
}

/// Structured result for one scoring play, before tags are baked in.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub name: String,
    pub is_penalty: bool,
    pub is_own_goal: bool,
    pub minute: Option<String>,
    pub side: Option<Side>,
    pub source: Option<ScorerSource>,
}

/// Free-text name heuristics, tried in order; first hit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePattern {
    By,
    Verb,
    Sentence,
    Dash,
    Paren,
}

impl NamePattern {
    pub const ORDER: [NamePattern; 5] = [
        NamePattern::By,
        NamePattern::Verb,
        NamePattern::Sentence,
        NamePattern::Dash,
        NamePattern::Paren,
    ];

    pub fn capture(self, text: &str) -> Option<String> {
        match self {
            NamePattern::By => capture_by(text),
            NamePattern::Verb => first_capture(&RE_VERB, text),
            NamePattern::Sentence => first_capture(&RE_SENTENCE, text),
            NamePattern::Dash => first_capture(&RE_DASH, text),
            NamePattern::Paren => first_capture(&RE_PAREN, text),
        }
    }
}

fn capture_by(text: &str) -> Option<String> {
    for caps in RE_BY.captures_iter(text) {
        let whole = caps.get(0)?;
        let before = text[..whole.start()].trim_end().to_lowercase();
        if BY_NOT_SCORER.iter().any(|word| before.ends_with(word)) {
            continue;
        }
        if let Some(name) = caps.get(1).and_then(|m| clean_name(m.as_str())) {
            return Some(name);
        }
    }
    None
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| clean_name(m.as_str())))
        .next()
}

fn clean_name(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while let Some(first) = words.first() {
        if LEAD_NOISE.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }
    let joined = words.join(" ");
    let name = joined.trim_end_matches(['.', ',', ';', ':', '!']).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Player name from free text, or `None` when no pattern matches.
pub fn name_from_text(text: &str) -> Option<String> {
    NamePattern::ORDER
        .iter()
        .find_map(|pattern| pattern.capture(text))
}

pub fn detect_penalty(text: &str) -> bool {
    RE_PENALTY.is_match(text)
}

pub fn detect_own_goal(text: &str) -> bool {
    RE_OWN_GOAL.is_match(text)
}

/// Canonical minute: `"<N>'"` or `"<N>+<M>'"` from a clock display.
pub fn normalize_minute(raw: &str) -> Option<String> {
    let caps = RE_CLOCK.captures(raw)?;
    let base = caps.get(1)?.as_str().trim_start_matches('0');
    let base = if base.is_empty() { "0" } else { base };
    Some(match caps.get(2) {
        Some(extra) => format!("{base}+{}'", extra.as_str()),
        None => format!("{base}'"),
    })
}

/// Minute mentioned inside prose; requires a tick so scores are not mistaken
/// for minutes.
pub fn minute_from_text(text: &str) -> Option<String> {
    let caps = RE_TEXT_MINUTE.captures(text)?;
    let base = caps.get(1)?.as_str();
    Some(match caps.get(2) {
        Some(extra) => format!("{base}+{}'", extra.as_str()),
        None => format!("{base}'"),
    })
}

/// Removes `(p)` / `(OG)` markers, reporting which were present.
pub fn strip_tags(name: &str) -> (String, bool, bool) {
    let mut penalty = false;
    let mut own_goal = false;
    for caps in RE_TAG.captures_iter(name) {
        match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("p") | Some("pen") => penalty = true,
            Some(_) => own_goal = true,
            None => {}
        }
    }
    let base = RE_TAG.replace_all(name, "").trim().to_string();
    (base, penalty, own_goal)
}

/// Bakes tags into the display name. Own goal wins over penalty.
pub fn apply_tags(name: &str, is_penalty: bool, is_own_goal: bool) -> String {
    let (base, _, _) = strip_tags(name);
    let base = if base.is_empty() {
        DEFAULT_SCORER.to_string()
    } else {
        base
    };
    if is_own_goal {
        format!("{base} (OG)")
    } else if is_penalty {
        format!("{base} (p)")
    } else {
        base
    }
}

/// Competitor team id to side, built from a competition's competitors.
pub fn side_lookup(competitors: Option<&Value>) -> HashMap<String, Side> {
    let mut out = HashMap::new();
    let Some(list) = competitors.and_then(|v| v.as_array()) else {
        return out;
    };
    for competitor in list {
        let Some(side) = competitor
            .get("homeAway")
            .and_then(|v| v.as_str())
            .and_then(Side::parse)
        else {
            continue;
        };
        if let Some(id) = competitor.get("team").and_then(|t| t.get("id")).and_then(id_string) {
            out.insert(id, side);
        }
        if let Some(id) = competitor.get("id").and_then(id_string) {
            out.entry(id).or_insert(side);
        }
    }
    out
}

pub fn attribute(play: &Value, sides: &HashMap<String, Side>) -> Attribution {
    let type_text = play_type_text(play);
    let text = play_text(play);
    let haystack = [type_text.as_deref(), text.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let explicit_pen = play
        .get("penaltyKick")
        .or_else(|| play.get("isPenalty"))
        .and_then(|v| v.as_bool());
    let explicit_og = play
        .get("ownGoal")
        .or_else(|| play.get("isOwnGoal"))
        .and_then(|v| v.as_bool());
    let is_penalty = explicit_pen.unwrap_or_else(|| detect_penalty(&haystack));
    let is_own_goal = explicit_og.unwrap_or_else(|| detect_own_goal(&haystack));

    let name = athlete_name(play)
        .or_else(|| text.as_deref().and_then(name_from_text))
        .unwrap_or_else(|| DEFAULT_SCORER.to_string());

    let minute = play
        .get("clock")
        .and_then(|c| c.get("displayValue"))
        .and_then(|v| v.as_str())
        .and_then(normalize_minute)
        .or_else(|| {
            play.get("time")
                .and_then(|t| t.get("displayValue"))
                .and_then(|v| v.as_str())
                .and_then(normalize_minute)
        })
        .or_else(|| text.as_deref().and_then(minute_from_text));

    let side = play
        .get("homeAway")
        .and_then(|v| v.as_str())
        .and_then(Side::parse)
        .or_else(|| {
            play.get("team")
                .and_then(|t| t.get("id"))
                .and_then(id_string)
                .and_then(|id| sides.get(&id).copied())
        });

    // Only text-derived flags need provenance for re-derivation.
    let source = if explicit_pen.is_none() && explicit_og.is_none() {
        Some(ScorerSource { type_text, text }).filter(|s| s.type_text.is_some() || s.text.is_some())
    } else {
        None
    };

    Attribution {
        name,
        is_penalty,
        is_own_goal,
        minute,
        side,
        source,
    }
}

pub fn scorer_from_play(play: &Value, sides: &HashMap<String, Side>) -> Scorer {
    let attribution = attribute(play, sides);
    Scorer {
        player: apply_tags(
            &attribution.name,
            attribution.is_penalty,
            attribution.is_own_goal,
        ),
        minute: attribution.minute.unwrap_or_default(),
        side: attribution.side,
        source: attribution.source,
    }
}

/// Re-derives tags and minute. `format_scorer(&format_scorer(x)) == format_scorer(x)`.
pub fn format_scorer(scorer: &Scorer) -> Scorer {
    let (base, tag_pen, tag_og) = strip_tags(&scorer.player);
    let (src_pen, src_og) = scorer
        .source
        .as_ref()
        .map(|src| {
            let haystack = [src.type_text.as_deref(), src.text.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (detect_penalty(&haystack), detect_own_goal(&haystack))
        })
        .unwrap_or((false, false));
    let minute = normalize_minute(&scorer.minute).unwrap_or_else(|| scorer.minute.trim().to_string());
    Scorer {
        player: apply_tags(&base, tag_pen || src_pen, tag_og || src_og),
        minute,
        side: scorer.side,
        source: scorer.source.clone(),
    }
}

fn athlete_name(play: &Value) -> Option<String> {
    let first = play
        .get("athletesInvolved")
        .or_else(|| play.get("participants"))
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())?;
    [first, first.get("athlete").unwrap_or(&Value::Null)]
        .into_iter()
        .find_map(|v| {
            ["displayName", "fullName", "shortName"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|n| n.as_str()))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
        })
}

fn play_type_text(play: &Value) -> Option<String> {
    let kind = play.get("type")?;
    let parts = ["id", "text", "type"]
        .iter()
        .filter_map(|key| kind.get(*key).and_then(id_string))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn play_text(play: &Value) -> Option<String> {
    ["text", "description", "shortText"]
        .iter()
        .find_map(|key| play.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
