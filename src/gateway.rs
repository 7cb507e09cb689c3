use std::borrow::Cow;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::http_client::http_client;
use crate::standings::standings_entries;

/// `seasontype` values tried in order; `None` leaves the parameter off.
pub const SEASONTYPE_CANDIDATES: [Option<u8>; 4] = [None, Some(2), Some(1), Some(3)];

const SPORT_CODES: &[(&str, &str)] = &[
    ("eng1", "eng.1"),
    ("eng2", "eng.2"),
    ("eng3", "eng.3"),
    ("engfa", "eng.fa"),
    ("engcup", "eng.league_cup"),
    ("esp1", "esp.1"),
    ("ger1", "ger.1"),
    ("ita1", "ita.1"),
    ("fra1", "fra.1"),
    ("ned1", "ned.1"),
    ("por1", "por.1"),
    ("sco1", "sco.1"),
    ("usa1", "usa.1"),
    ("ucl", "uefa.champions"),
    ("uel", "uefa.europa"),
    ("uecl", "uefa.europa.conf"),
    ("wc", "fifa.world"),
    ("euro", "uefa.euro"),
];

/// Seam between the network and everything that memoizes or polls it.
pub trait FeedSource: Send + Sync {
    fn fetch_scoreboard(&self, date: NaiveDate, league: &str) -> FeedResult<Value>;
}

pub fn sport_code(league: &str) -> Cow<'_, str> {
    let key = league.trim();
    for (id, code) in SPORT_CODES {
        if key.eq_ignore_ascii_case(id) {
            return Cow::Borrowed(*code);
        }
    }
    if key.contains('.') {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(key.to_ascii_lowercase())
    }
}

pub fn format_ymd(date: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", date.year(), date.month(), date.day())
}

pub fn parse_ymd(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .ok()
}

#[derive(Debug, Clone)]
pub struct Gateway {
    client: Client,
    scoreboard_host: String,
    standings_host: String,
}

impl Gateway {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = http_client(config.http_timeout)?.clone();
        Ok(Self {
            client,
            scoreboard_host: config.scoreboard_host.clone(),
            standings_host: config.standings_host.clone(),
        })
    }

    pub fn scoreboard_url(&self, date: NaiveDate, league: &str) -> String {
        format!(
            "{}/soccer/{}/scoreboard?dates={}",
            self.scoreboard_host,
            sport_code(league),
            format_ymd(date)
        )
    }

    pub fn standings_url(
        &self,
        season: i32,
        level: u8,
        league: &str,
        seasontype: Option<u8>,
    ) -> String {
        let mut url = format!(
            "{}/soccer/{}/standings?season={season}&level={level}",
            self.standings_host,
            sport_code(league)
        );
        if let Some(kind) = seasontype {
            url.push_str(&format!("&seasontype={kind}"));
        }
        url
    }

    pub fn summary_url(&self, league: &str, event_id: &str) -> String {
        format!(
            "{}/soccer/{}/summary?event={}",
            self.scoreboard_host,
            sport_code(league),
            event_id.trim()
        )
    }

    pub fn fetch_standings(&self, season: i32, level: u8, league: &str) -> FeedResult<Value> {
        let endpoint = self.standings_url(season, level, league, None);
        probe_standings(&endpoint, &SEASONTYPE_CANDIDATES, |seasontype| {
            self.get_json(&self.standings_url(season, level, league, seasontype))
        })
    }

    /// Commentary lives on the summary endpoint.
    pub fn fetch_commentary(&self, league: &str, event_id: &str) -> FeedResult<Value> {
        self.get_json(&self.summary_url(league, event_id))
    }

    pub fn fetch_summary(&self, league: &str, event_id: &str) -> FeedResult<Value> {
        self.get_json(&self.summary_url(league, event_id))
    }

    fn get_json(&self, url: &str) -> FeedResult<Value> {
        debug!(url, "feed request");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|err| FeedError::Transport {
                endpoint: url.to_string(),
                message: err.to_string(),
            })?;
        let status = resp.status();
        let body = if status.is_success() {
            resp.text().map_err(|err| FeedError::Transport {
                endpoint: url.to_string(),
                message: err.to_string(),
            })?
        } else {
            String::new()
        };
        decode_response(url, status, &body)
    }
}

/// Maps a finished response to the feed result. Any non-2xx status is a
/// `Network` error regardless of body.
fn decode_response(endpoint: &str, status: StatusCode, body: &str) -> FeedResult<Value> {
    if !status.is_success() {
        warn!(endpoint, status = status.as_u16(), "feed request rejected");
        return Err(FeedError::Network {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        });
    }
    serde_json::from_str(body).map_err(|err| FeedError::Decode {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}

impl FeedSource for Gateway {
    fn fetch_scoreboard(&self, date: NaiveDate, league: &str) -> FeedResult<Value> {
        self.get_json(&self.scoreboard_url(date, league))
    }
}

/// Tries each candidate until one yields a non-empty standings table.
///
/// Failed candidates are skipped. When every candidate failed the last error
/// is returned, otherwise exhaustion is an `EmptyResult`.
pub fn probe_standings<F>(
    endpoint: &str,
    candidates: &[Option<u8>],
    mut fetch: F,
) -> FeedResult<Value>
where
    F: FnMut(Option<u8>) -> FeedResult<Value>,
{
    let mut last_err = None;
    let mut any_ok = false;
    for seasontype in candidates {
        match fetch(*seasontype) {
            Ok(body) => {
                if standings_entries(&body).is_some() {
                    debug!(endpoint, ?seasontype, "standings probe hit");
                    return Ok(body);
                }
                any_ok = true;
            }
            Err(err) => {
                debug!(endpoint, ?seasontype, %err, "standings probe miss");
                last_err = Some(err);
            }
        }
    }
    match last_err {
        Some(err) if !any_ok => Err(err),
        _ => Err(FeedError::EmptyResult {
            endpoint: endpoint.to_string(),
            tried: candidates.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use serde_json::json;

    #[test]
    fn format_ymd_is_eight_zero_padded_digits() {
        for year in [1, 7, 99, 999, 1999, 2024, 9999] {
            for (month, day) in [(1, 1), (2, 9), (10, 31), (12, 5)] {
                let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
                let out = format_ymd(date);
                assert_eq!(out.len(), 8, "{out}");
                assert!(out.chars().all(|c| c.is_ascii_digit()), "{out}");
            }
        }
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_ymd(date), "20240307");
        assert_eq!(parse_ymd("20240307"), Some(date));
    }

    #[test]
    fn parse_ymd_accepts_dashed_form() {
        assert_eq!(
            parse_ymd(" 2024-08-17 "),
            NaiveDate::from_ymd_opt(2024, 8, 17)
        );
        assert!(parse_ymd("17/08/2024").is_none());
    }

    #[test]
    fn sport_code_table_and_passthrough() {
        assert_eq!(sport_code("eng1"), "eng.1");
        assert_eq!(sport_code("UCL"), "uefa.champions");
        assert_eq!(sport_code("esp.1"), "esp.1");
        assert_eq!(sport_code("MLS"), "mls");
    }

    #[test]
    fn urls_follow_endpoint_shapes() {
        let gateway = Gateway {
            client: Client::new(),
            scoreboard_host: "http://host/sports".to_string(),
            standings_host: "http://host/v2".to_string(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
        assert_eq!(
            gateway.scoreboard_url(date, "eng1"),
            "http://host/sports/soccer/eng.1/scoreboard?dates=20240817"
        );
        assert_eq!(
            gateway.standings_url(2024, 1, "ucl", Some(2)),
            "http://host/v2/soccer/uefa.champions/standings?season=2024&level=1&seasontype=2"
        );
        assert_eq!(
            gateway.standings_url(2024, 1, "ucl", None),
            "http://host/v2/soccer/uefa.champions/standings?season=2024&level=1"
        );
        assert_eq!(
            gateway.summary_url("ger1", "700123"),
            "http://host/sports/soccer/ger.1/summary?event=700123"
        );
    }

    #[test]
    fn non_ok_status_is_network_error() {
        for code in [404, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = decode_response("http://host/x", status, "").unwrap_err();
            assert_eq!(
                err,
                FeedError::Network {
                    status: code,
                    endpoint: "http://host/x".to_string()
                }
            );
        }
    }

    #[test]
    fn ok_status_decodes_or_reports_bad_json() {
        let body = decode_response("e", StatusCode::OK, r#"{"events": []}"#).unwrap();
        assert_eq!(body, json!({"events": []}));
        let err = decode_response("e", StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, FeedError::Decode { ref endpoint, .. } if endpoint == "e"));
    }

    /// Serves one canned response on a loopback port.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway_at(host: &str) -> Gateway {
        Gateway {
            client: Client::builder().no_proxy().build().unwrap(),
            scoreboard_host: host.to_string(),
            standings_host: host.to_string(),
        }
    }

    #[test]
    fn scoreboard_fetch_maps_503_to_network_error() {
        let host = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let gateway = gateway_at(&host);
        let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
        let err = gateway.fetch_scoreboard(date, "eng1").unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.endpoint(), gateway.scoreboard_url(date, "eng1"));
    }

    #[test]
    fn scoreboard_fetch_returns_body_on_success() {
        let host = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\nConnection: close\r\n\r\n{\"events\":[]}",
        );
        let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
        let body = gateway_at(&host).fetch_scoreboard(date, "eng1").unwrap();
        assert_eq!(body, json!({"events": []}));
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
        let err = gateway_at(&format!("http://{addr}"))
            .fetch_scoreboard(date, "eng1")
            .unwrap_err();
        assert!(matches!(err, FeedError::Transport { .. }), "{err:?}");
        assert_eq!(err.status(), None);
    }

    fn table() -> Value {
        json!({"standings": [{"entries": [{"team": {"displayName": "Arsenal"}, "stats": []}]}]})
    }

    #[test]
    fn probe_tries_candidates_in_order_until_non_empty() {
        let mut seen = Vec::new();
        let out = probe_standings("x", &SEASONTYPE_CANDIDATES, |kind| {
            seen.push(kind);
            if kind == Some(1) {
                Ok(table())
            } else {
                Ok(json!({"standings": []}))
            }
        })
        .unwrap();
        assert_eq!(seen, vec![None, Some(2), Some(1)]);
        assert!(standings_entries(&out).is_some());
    }

    #[test]
    fn probe_exhaustion_is_empty_result() {
        let err = probe_standings("x", &SEASONTYPE_CANDIDATES, |_| Ok(json!({}))).unwrap_err();
        assert_eq!(
            err,
            FeedError::EmptyResult {
                endpoint: "x".to_string(),
                tried: 4
            }
        );
    }

    #[test]
    fn probe_skips_failures_and_reports_last_when_all_fail() {
        let out = probe_standings("x", &SEASONTYPE_CANDIDATES, |kind| match kind {
            None => Err(FeedError::Network {
                status: 500,
                endpoint: "x".to_string(),
            }),
            _ => Ok(table()),
        });
        assert!(out.is_ok());

        let err = probe_standings("x", &SEASONTYPE_CANDIDATES, |_| {
            Err(FeedError::Network {
                status: 404,
                endpoint: "x".to_string(),
            })
        })
        .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
