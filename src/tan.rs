//! Client for the TAN (Nantes) open-data API, the source of the arrivals feed.

use anyhow::{Result, ensure};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::fetch::{HttpClient, fetch_json};
use crate::model::{ArrivalEntry, ArrivalMessage, LineRef};

pub const BASE_URL: &str = "https://open.tan.fr/ewp";

/// A stop place as listed by `arrets.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TanStop {
    #[serde(rename = "codeLieu")]
    pub code: String,
    pub libelle: String,
    /// Distance from the queried point, e.g. `"150 m"`. Only filled by the
    /// nearby-stops lookup.
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default, rename = "ligne")]
    pub lines: Vec<LineRef>,
}

impl TanStop {
    /// Distance in meters. Accepts `m` and `km` units and a decimal comma.
    pub fn distance_meters(&self) -> Option<f64> {
        let text = self.distance.as_deref()?.trim().to_lowercase();
        let (number, scale) = match text.strip_suffix("km") {
            Some(number) => (number, 1000.0),
            None => (text.strip_suffix('m').unwrap_or(&text), 1.0),
        };
        let value: f64 = number.trim().replace(',', ".").parse().ok()?;
        (value.is_finite() && value >= 0.0).then_some(value * scale)
    }
}

/// Scheduled departures of one line at one stop, from `horairesarret.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timetable {
    #[serde(default, rename = "plageDeService")]
    pub service_period: Option<String>,
    #[serde(default)]
    pub notes: Vec<TimetableNote>,
    #[serde(default, rename = "horaires")]
    pub hours: Vec<HourSlot>,
    #[serde(default, rename = "prochainsHoraires")]
    pub next: Vec<HourSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimetableNote {
    pub code: String,
    pub libelle: String,
}

/// Departures within one hour: `heure` is like `"6h"`, passages are minutes
/// with an optional note letter (`"40a"`).
#[derive(Debug, Clone, Deserialize)]
pub struct HourSlot {
    pub heure: String,
    #[serde(default)]
    pub passages: Vec<String>,
}

impl Timetable {
    /// Every departure as `"6h40a"`, in timetable order.
    pub fn departures(&self) -> Vec<String> {
        self.hours
            .iter()
            .flat_map(|slot| slot.passages.iter().map(move |p| format!("{}{}", slot.heure, p)))
            .collect()
    }
}

pub struct TanClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> TanClient<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// All stop places of the network.
    pub async fn stops(&self) -> Result<Vec<TanStop>> {
        let url = format!("{}/arrets.json", self.base_url);
        fetch_json(&self.client, &url).await
    }

    /// Upcoming arrivals at `stop_code`. Entries share the arrivals-topic
    /// field names, so they decode straight into [`ArrivalEntry`].
    pub async fn wait_times(&self, stop_code: &str) -> Result<Vec<ArrivalEntry>> {
        let url = format!("{}/tempsattente.json/{}", self.base_url, stop_code);
        let entries: Vec<ArrivalEntry> = fetch_json(&self.client, &url).await?;
        debug!(stop_code, entries = entries.len(), "Wait times fetched");
        Ok(entries)
    }

    /// Stop places around a point, nearest first, each with its distance.
    pub async fn nearby_stops(&self, latitude: f64, longitude: f64) -> Result<Vec<TanStop>> {
        let url = format!("{}/arrets.json/{}/{}", self.base_url, latitude, longitude);
        let stops: Vec<TanStop> = fetch_json(&self.client, &url).await?;
        debug!(latitude, longitude, stops = stops.len(), "Nearby stops fetched");
        Ok(stops)
    }

    /// The next `passages` arrivals at a stop place, optionally for one line.
    pub async fn wait_times_limited(
        &self,
        place_code: &str,
        passages: usize,
        line: Option<&str>,
    ) -> Result<Vec<ArrivalEntry>> {
        ensure!(passages > 0, "passages must be greater than zero");

        let mut url = format!("{}/tempsattentelieu.json/{}/{}", self.base_url, place_code, passages);
        if let Some(line) = line {
            url.push('/');
            url.push_str(line);
        }

        let entries: Vec<ArrivalEntry> = fetch_json(&self.client, &url).await?;
        debug!(place_code, passages, line, entries = entries.len(), "Limited wait times fetched");
        Ok(entries)
    }

    /// Timetable of `line` in direction `sens` at `stop_code`, for `date` or
    /// today when `None`.
    pub async fn timetable(
        &self,
        stop_code: &str,
        line: &str,
        sens: u8,
        date: Option<NaiveDate>,
    ) -> Result<Timetable> {
        let mut url = format!(
            "{}/horairesarret.json/{}/{}/{}",
            self.base_url, stop_code, line, sens
        );
        if let Some(date) = date {
            url.push_str(&format!("/{}", date.format("%Y-%m-%d")));
        }
        fetch_json(&self.client, &url).await
    }

    /// Fetches wait times and wraps them as a topic message stamped now.
    pub async fn arrival_message(
        &self,
        stop_code: &str,
        stop_name: Option<String>,
    ) -> Result<ArrivalMessage> {
        let arrivals = self.wait_times(stop_code).await?;
        Ok(stamp(stop_code, stop_name, arrivals))
    }

    /// Like [`arrival_message`](Self::arrival_message), limited to the next
    /// `passages` arrivals.
    pub async fn limited_arrival_message(
        &self,
        stop_code: &str,
        stop_name: Option<String>,
        passages: usize,
        line: Option<&str>,
    ) -> Result<ArrivalMessage> {
        let arrivals = self.wait_times_limited(stop_code, passages, line).await?;
        Ok(stamp(stop_code, stop_name, arrivals))
    }
}

fn stamp(stop_code: &str, stop_name: Option<String>, arrivals: Vec<ArrivalEntry>) -> ArrivalMessage {
    ArrivalMessage {
        timestamp: Some(Utc::now().to_rfc3339()),
        stop_code: stop_code.to_string(),
        stop_name,
        arrivals,
    }
}

/// Display name for `stop_code`.
///
/// Platform codes extend their place code with a digit (`HBLI2` for `HBLI`),
/// so the longest place code that prefixes `stop_code` wins.
pub fn resolve_stop_name<'a>(stops: &'a [TanStop], stop_code: &str) -> Option<&'a str> {
    stops
        .iter()
        .filter(|s| !s.code.is_empty() && stop_code.starts_with(&s.code))
        .max_by_key(|s| s.code.len())
        .map(|s| s.libelle.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubClient {
        responses: HashMap<String, &'static str>,
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.responses
                .get(url)
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| anyhow::anyhow!("{url} returned status 404 Not Found: "))
        }
    }

    const WAIT_TIMES: &str = r#"[
        {"sens": 1, "terminus": "Beaujoire", "infotrafic": false, "temps": "2mn",
         "dernierDepart": "false", "tempsReel": "true",
         "ligne": {"numLigne": "C5", "typeLigne": 1}, "arret": {"codeArret": "HBLI2"}},
        {"sens": 2, "terminus": "Gare Sud", "infotrafic": false, "temps": "proche",
         "dernierDepart": "false", "tempsReel": "false",
         "ligne": {"numLigne": "C5", "typeLigne": 1}, "arret": {"codeArret": "HBLI2"}}
    ]"#;

    const STOPS: &str = r#"[
        {"codeLieu": "HBLI", "libelle": "Hotel de Ville", "distance": null, "ligne": [{"numLigne": "C5"}]},
        {"codeLieu": "COMM", "libelle": "Commerce", "distance": null, "ligne": [{"numLigne": "1"}]}
    ]"#;

    const NEARBY: &str = r#"[
        {"codeLieu": "HBLI", "libelle": "Hotel de Ville", "distance": "150 m", "ligne": [{"numLigne": "C5"}, {"numLigne": "11"}]},
        {"codeLieu": "COMM", "libelle": "Commerce", "distance": "1,2 km", "ligne": [{"numLigne": "1"}]},
        {"codeLieu": "BOFA", "libelle": "Bouffay", "distance": null, "ligne": []}
    ]"#;

    const TIMETABLE: &str = r#"{
        "ligne": {"numLigne": "C5", "directionSens1": "Quai des Antilles"},
        "arret": {"codeArret": "HBLI2"},
        "plageDeService": "Du lundi au vendredi",
        "notes": [{"code": "a", "libelle": "Terminus Gare Sud"}],
        "horaires": [{"heure": "5h", "passages": ["40a", "55"]}, {"heure": "6h", "passages": ["10"]}],
        "prochainsHoraires": [{"heure": "6h", "passages": ["10"]}]
    }"#;

    fn client() -> TanClient<StubClient> {
        let mut responses = HashMap::new();
        responses.insert("http://tan.test/ewp/tempsattente.json/HBLI2".to_string(), WAIT_TIMES);
        responses.insert("http://tan.test/ewp/arrets.json".to_string(), STOPS);
        responses.insert("http://tan.test/ewp/arrets.json/47.264/-1.585".to_string(), NEARBY);
        responses.insert("http://tan.test/ewp/tempsattentelieu.json/HBLI/2".to_string(), WAIT_TIMES);
        responses.insert("http://tan.test/ewp/tempsattentelieu.json/HBLI/2/C5".to_string(), WAIT_TIMES);
        responses.insert("http://tan.test/ewp/horairesarret.json/HBLI2/C5/1".to_string(), TIMETABLE);
        responses.insert(
            "http://tan.test/ewp/horairesarret.json/HBLI2/C5/1/2025-03-23".to_string(),
            TIMETABLE,
        );
        TanClient::with_base_url(StubClient { responses }, "http://tan.test/ewp/")
    }

    #[tokio::test]
    async fn test_wait_times_decode() {
        let entries = client().wait_times("HBLI2").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].temps.as_deref(), Some("2mn"));
        assert!(entries[0].temps_reel);
        assert!(!entries[1].temps_reel);
        assert_eq!(entries[1].line(), Some("C5"));
    }

    #[tokio::test]
    async fn test_arrival_message_wraps_entries() {
        let message = client()
            .arrival_message("HBLI2", Some("Hotel de Ville".to_string()))
            .await
            .unwrap();

        assert_eq!(message.stop_code, "HBLI2");
        assert_eq!(message.arrivals.len(), 2);
        assert!(message.timestamp.is_some());

        // Round-trips through the topic format
        let payload = serde_json::to_vec(&message).unwrap();
        let decoded = crate::parser::parse_message(&payload).unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_unknown_stop_errors() {
        assert!(client().wait_times("NOPE1").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_stop_name() {
        let stops = client().stops().await.unwrap();

        assert_eq!(resolve_stop_name(&stops, "HBLI2"), Some("Hotel de Ville"));
        assert_eq!(resolve_stop_name(&stops, "COMM"), Some("Commerce"));
        assert_eq!(resolve_stop_name(&stops, "GSNO1"), None);
    }

    #[tokio::test]
    async fn test_nearby_stops_carry_distance() {
        let stops = client().nearby_stops(47.264, -1.585).await.unwrap();

        assert_eq!(stops.len(), 3);
        assert_eq!(stops[0].distance_meters(), Some(150.0));
        assert_eq!(stops[1].distance_meters(), Some(1200.0));
        assert_eq!(stops[2].distance_meters(), None);
        assert_eq!(stops[0].lines.len(), 2);
    }

    #[test]
    fn test_distance_meters_formats() {
        let stop = |distance: &str| TanStop {
            code: "X".to_string(),
            libelle: "X".to_string(),
            distance: Some(distance.to_string()),
            lines: Vec::new(),
        };

        assert_eq!(stop("80m").distance_meters(), Some(80.0));
        assert_eq!(stop(" 2 KM ").distance_meters(), Some(2000.0));
        assert_eq!(stop("loin").distance_meters(), None);
        assert_eq!(stop("-5 m").distance_meters(), None);
    }

    #[tokio::test]
    async fn test_wait_times_limited_urls() {
        let tan = client();

        assert_eq!(tan.wait_times_limited("HBLI", 2, None).await.unwrap().len(), 2);
        assert_eq!(tan.wait_times_limited("HBLI", 2, Some("C5")).await.unwrap().len(), 2);
        assert!(tan.wait_times_limited("HBLI", 0, None).await.is_err());

        let message = tan
            .limited_arrival_message("HBLI", None, 2, Some("C5"))
            .await
            .unwrap();
        assert_eq!(message.stop_code, "HBLI");
        assert_eq!(message.arrivals.len(), 2);
    }

    #[tokio::test]
    async fn test_timetable_with_and_without_date() {
        let tan = client();
        let today = tan.timetable("HBLI2", "C5", 1, None).await.unwrap();
        let dated = tan
            .timetable("HBLI2", "C5", 1, NaiveDate::from_ymd_opt(2025, 3, 23))
            .await
            .unwrap();

        assert_eq!(today.departures(), vec!["5h40a", "5h55", "6h10"]);
        assert_eq!(dated.notes[0].code, "a");
        assert_eq!(dated.service_period.as_deref(), Some("Du lundi au vendredi"));
        assert_eq!(dated.next.len(), 1);
    }
}
