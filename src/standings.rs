use std::collections::HashMap;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::model::{PLACEHOLDER_TEAM, StandingRow};

/// First non-empty entries list, in any of the shapes upstream uses.
pub fn standings_entries(root: &Value) -> Option<&Vec<Value>> {
    match root.get("standings") {
        Some(Value::Array(groups)) => {
            if let Some(found) = groups.iter().find_map(|g| non_empty(g.get("entries"))) {
                return Some(found);
            }
        }
        Some(Value::Object(group)) => {
            if let Some(found) = non_empty(group.get("entries")) {
                return Some(found);
            }
        }
        _ => {}
    }

    root.get("children")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .find_map(|child| non_empty(child.get("standings").and_then(|s| s.get("entries"))))
}

fn non_empty(value: Option<&Value>) -> Option<&Vec<Value>> {
    value.and_then(|v| v.as_array()).filter(|list| !list.is_empty())
}

pub fn parse_standings_json(raw: &str) -> Result<Vec<StandingRow>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid standings json")?;
    Ok(parse_standings(&root))
}

pub fn parse_standings(root: &Value) -> Vec<StandingRow> {
    let Some(entries) = standings_entries(root) else {
        return Vec::new();
    };
    let mut rows = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| standing_row(idx, entry))
        .collect::<Vec<_>>();
    rows.sort_by_key(|row| row.pos);
    rows
}

fn standing_row(idx: usize, entry: &Value) -> StandingRow {
    let stats = stat_values(entry.get("stats"));
    let get = |names: &[&str]| lookup(&stats, names);
    let count = |names: &[&str]| lookup(&stats, names).map(|v| v.max(0.0).round() as u32).unwrap_or(0);

    let team = entry.get("team").unwrap_or(&Value::Null);
    let team = ["displayName", "shortDisplayName", "name"]
        .iter()
        .find_map(|key| team.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(PLACEHOLDER_TEAM)
        .to_string();

    StandingRow {
        pos: get(&["rank", "position"])
            .filter(|v| *v >= 1.0)
            .map(|v| v.round() as u32)
            .unwrap_or(idx as u32 + 1),
        team,
        p: count(&["gamesPlayed", "played"]),
        w: count(&["wins"]),
        d: count(&["ties", "draws"]),
        l: count(&["losses"]),
        gd: get(&["pointDifferential", "goalDifference", "goalDiff"])
            .map(|v| v.round() as i32)
            .unwrap_or(0),
        pts: count(&["points"]),
    }
}

fn lookup(stats: &HashMap<String, f64>, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| stats.get(&name.to_ascii_lowercase()).copied())
}

fn stat_values(list: Option<&Value>) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for stat in list.and_then(|v| v.as_array()).into_iter().flatten() {
        let Some(name) = stat
            .get("name")
            .or_else(|| stat.get("type"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };
        let value = stat.get("value").and_then(|v| v.as_f64()).or_else(|| {
            stat.get("displayValue")
                .and_then(|v| v.as_str())
                .and_then(|s| s.trim().parse::<f64>().ok())
        });
        if let Some(value) = value.filter(|v| v.is_finite()) {
            out.entry(name.to_ascii_lowercase()).or_insert(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(team: &str, rank: f64, pts: f64, gd: &str) -> Value {
        json!({
            "team": {"displayName": team},
            "stats": [
                {"name": "rank", "value": rank},
                {"name": "gamesPlayed", "value": 10.0},
                {"name": "wins", "value": 7.0},
                {"name": "ties", "value": 2.0},
                {"name": "losses", "value": 1.0},
                {"name": "pointDifferential", "displayValue": gd},
                {"name": "points", "value": pts}
            ]
        })
    }

    #[test]
    fn maps_rows_and_sorts_by_rank() {
        let root = json!({"standings": [{"entries": [
            entry("Chelsea", 2.0, 20.0, "+5"),
            entry("Arsenal", 1.0, 23.0, "+12")
        ]}]});
        let rows = parse_standings(&root);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].team, "Arsenal");
        assert_eq!(rows[0].pos, 1);
        assert_eq!(rows[0].gd, 12);
        assert_eq!(rows[0].pts, 23);
        assert_eq!((rows[1].p, rows[1].w, rows[1].d, rows[1].l), (10, 7, 2, 1));
    }

    #[test]
    fn entries_found_under_children() {
        let root = json!({"children": [
            {"standings": {"entries": []}},
            {"standings": {"entries": [{"team": {"name": "Celtic"}, "stats": []}]}}
        ]});
        let rows = parse_standings(&root);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].team, "Celtic");
        assert_eq!(rows[0].pos, 1);
        assert_eq!(rows[0].pts, 0);
    }

    #[test]
    fn empty_shapes_have_no_entries() {
        assert!(standings_entries(&json!({"standings": []})).is_none());
        assert!(standings_entries(&json!({"standings": [{"entries": []}]})).is_none());
        assert!(standings_entries(&json!({})).is_none());
        assert!(parse_standings_json("null").unwrap().is_empty());
    }
}
