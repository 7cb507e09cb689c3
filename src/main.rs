use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use matchfeed::board::Board;
use matchfeed::cache::ScoreboardCache;
use matchfeed::config::FeedConfig;
use matchfeed::gateway::Gateway;
use matchfeed::model::{MatchEvent, MatchState, MatchSummary, Scoreboard};
use matchfeed::normalize::parse_summary;
use matchfeed::poller::{SystemClock, scoreboard_poller, spawn_live_poller, summary_poller};
use matchfeed::standings::parse_standings;

enum Mode {
    Watch,
    Standings { season: Option<i32>, level: u8 },
    Summary { event_id: String, watch: bool },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchfeed=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = FeedConfig::from_env();
    let gateway = Gateway::new(&config).context("unable to build feed gateway")?;

    match parse_mode()? {
        Mode::Watch => watch_scoreboard(&config, gateway),
        Mode::Standings { season, level } => {
            let season = season.unwrap_or_else(default_season);
            let raw = gateway
                .fetch_standings(season, level, &config.league)
                .with_context(|| format!("standings for {} {season}", config.league))?;
            print_standings(&parse_standings(&raw));
            Ok(())
        }
        Mode::Summary { event_id, watch } => {
            if watch {
                return watch_summary(&config, gateway, &event_id);
            }
            let raw = gateway
                .fetch_summary(&config.league, &event_id)
                .with_context(|| format!("summary for event {event_id}"))?;
            print_summary(&parse_summary(&raw, &event_id));
            Ok(())
        }
    }
}

fn parse_mode() -> Result<Mode> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let positional = args
        .iter()
        .filter(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .collect::<Vec<_>>();
    match positional.first().copied() {
        None | Some("watch") => Ok(Mode::Watch),
        Some("standings") => {
            let season = positional
                .get(1)
                .map(|raw| raw.parse::<i32>().with_context(|| format!("bad season {raw}")))
                .transpose()?;
            let level = positional
                .get(2)
                .and_then(|raw| raw.parse::<u8>().ok())
                .unwrap_or(1)
                .max(1);
            Ok(Mode::Standings { season, level })
        }
        Some("summary") => {
            let event_id = positional
                .get(1)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| anyhow!("usage: matchfeed summary <event-id> [--watch]"))?;
            Ok(Mode::Summary {
                event_id,
                watch: args.iter().any(|arg| arg == "--watch"),
            })
        }
        Some(other) => Err(anyhow!(
            "unknown mode {other}; expected watch, standings or summary"
        )),
    }
}

fn favourites_arg() -> HashSet<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut out = HashSet::new();
    for (idx, arg) in args.iter().enumerate() {
        let raw = if let Some(raw) = arg.strip_prefix("--fav=") {
            Some(raw)
        } else if arg == "--fav" {
            args.get(idx + 1).map(String::as_str)
        } else {
            None
        };
        for name in raw.into_iter().flat_map(|raw| raw.split(',')) {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                out.insert(trimmed.to_string());
            }
        }
    }
    out
}

/// Season years roll over in July.
fn default_season() -> i32 {
    let today = Utc::now().date_naive();
    if today.month() >= 7 {
        today.year()
    } else {
        today.year() - 1
    }
}

fn watch_scoreboard(config: &FeedConfig, gateway: Gateway) -> Result<()> {
    let favourites = favourites_arg();
    let cache = Arc::new(ScoreboardCache::new(gateway));
    let poller = scoreboard_poller(
        cache,
        config.league.clone(),
        config.date,
        Arc::new(SystemClock),
        config.cadence,
    );
    info!(league = %config.league, date = %config.date, "watching scoreboard");

    let (tx, rx) = mpsc::channel();
    let _handle = spawn_live_poller(poller, tx);
    let mut board: Board<Scoreboard> = Board::new("Scoreboard");
    for update in rx {
        board.apply(update);
        if let Some(err) = &board.error {
            println!("! {err}");
            continue;
        }
        println!("-- {} {} --", config.league, config.date);
        let events = if favourites.is_empty() {
            board.live_or_upcoming()
        } else {
            board.favourites(&favourites)
        };
        for event in events {
            println!("{}", event_line(event));
        }
        let finished = board.finished();
        if !finished.is_empty() && favourites.is_empty() {
            println!("   finished:");
            for event in finished {
                println!("{}", event_line(event));
            }
        }
    }
    Ok(())
}

fn watch_summary(config: &FeedConfig, gateway: Gateway, event_id: &str) -> Result<()> {
    let poller = summary_poller(
        Arc::new(gateway),
        config.league.clone(),
        event_id,
        Arc::new(SystemClock),
        config.cadence,
    );
    let (tx, rx) = mpsc::channel();
    let _handle = spawn_live_poller(poller, tx);
    let mut board: Board<MatchSummary> = Board::new("Summary");
    for update in rx {
        board.apply(update);
        match (&board.error, &board.snapshot) {
            (Some(err), _) => println!("! {err}"),
            (None, Some(summary)) => print_summary(summary),
            (None, None) => {}
        }
    }
    Ok(())
}

fn score_text(state: MatchState, home: Option<u32>, away: Option<u32>) -> String {
    match (state, home, away) {
        (MatchState::Scheduled, _, _) => "vs".to_string(),
        (_, Some(h), Some(a)) => format!("{h}-{a}"),
        _ => "-".to_string(),
    }
}

fn event_line(event: &MatchEvent) -> String {
    let kickoff = event
        .kickoff
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let mut line = format!(
        "{kickoff} {:>24} {:^5} {:<24} {}",
        event.home.display_name,
        score_text(event.state, event.home_score, event.away_score),
        event.away.display_name,
        event.status_detail
    );
    if !event.stats.scorers.is_empty() {
        let scorers = event
            .stats
            .scorers
            .iter()
            .map(|s| format!("{} {}", s.player, s.minute).trim().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        line.push_str(&format!("\n      {scorers}"));
    }
    line
}

fn print_summary(summary: &MatchSummary) {
    println!(
        "{} {} {} ({})",
        summary.home.display_name,
        score_text(summary.state, summary.home_score, summary.away_score),
        summary.away.display_name,
        summary.status_detail
    );
    for scorer in &summary.scorers {
        println!("  goal  {} {}", scorer.player, scorer.minute);
    }
    for metric in &summary.metrics {
        let fmt = |v: Option<f64>| v.map(|v| format!("{v}")).unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:>6} {:>6}",
            metric.label,
            fmt(metric.home_val),
            fmt(metric.away_val)
        );
    }
    for item in summary.commentary.iter().rev().take(10) {
        let minute = item
            .minute_text
            .clone()
            .or_else(|| item.minute.map(|m| format!("{m}'")))
            .unwrap_or_default();
        println!("  {minute:>7} {:?} {}", item.kind, item.text);
    }
}

fn print_standings(rows: &[matchfeed::model::StandingRow]) {
    println!("{:>3} {:<28} {:>3} {:>3} {:>3} {:>3} {:>4} {:>4}", "#", "Team", "P", "W", "D", "L", "GD", "Pts");
    for row in rows {
        println!(
            "{:>3} {:<28} {:>3} {:>3} {:>3} {:>3} {:>+4} {:>4}",
            row.pos, row.team, row.p, row.w, row.d, row.l, row.gd, row.pts
        );
    }
}
