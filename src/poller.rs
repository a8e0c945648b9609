use crate::chart::ChartRenderer;
use crate::measurements::{location_key, Location, MeasurementRecord};
use chrono::{DateTime, Local};
use futures::future::try_join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

pub const DEFAULT_REFRESH_SECS: u64 = 30;

/// Response envelope shared by the data endpoints
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self, what: &str) -> anyhow::Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(anyhow::anyhow!(
                "{} request failed: {}",
                what,
                self.error.unwrap_or_else(|| "no data".to_string())
            )),
        }
    }
}

/// Client for the read API of a running server
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            base_url: reqwest::Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("base URL {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Latest readings, or `None` when the server answered with a failure
    /// envelope. Transport and decoding errors are returned as errors.
    pub async fn latest(&self) -> anyhow::Result<Option<Vec<MeasurementRecord>>> {
        let url = self.endpoint(&["api", "latest"])?;
        let envelope: Envelope<Vec<MeasurementRecord>> =
            self.http.get(url).send().await?.json().await?;
        if !envelope.success {
            warn!(
                "Latest readings unavailable: {}",
                envelope.error.as_deref().unwrap_or("no error message")
            );
            return Ok(None);
        }
        Ok(envelope.data)
    }

    /// History for one location; the name is percent-encoded into the path.
    pub async fn history(&self, location: Location) -> anyhow::Result<Vec<MeasurementRecord>> {
        let url = self.endpoint(&["api", "history", location.name()])?;
        let envelope: Envelope<Vec<MeasurementRecord>> =
            self.http.get(url).send().await?.json().await?;
        envelope.into_data("history")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub ice: String,
    pub temperature: String,
    pub snow: String,
    pub status: &'static str,
}

fn one_decimal(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "--".to_string())
}

/// Everything the dashboard shows. Each apply overwrites what is there, so
/// whichever response is applied last wins.
#[derive(Debug)]
pub struct Dashboard {
    pub phase: Phase,
    /// Keyed by location display key
    pub cards: BTreeMap<String, Card>,
    pub last_updated: Option<DateTime<Local>>,
    pub charts: ChartRenderer,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            cards: BTreeMap::new(),
            last_updated: None,
            charts: ChartRenderer::default(),
        }
    }
}

impl Dashboard {
    pub fn apply_latest(&mut self, records: &[MeasurementRecord], now: DateTime<Local>) {
        for record in records {
            let key = location_key(record.location.as_deref().unwrap_or_default());
            self.cards.insert(
                key,
                Card {
                    ice: one_decimal(record.avg_ice_thickness),
                    temperature: one_decimal(record.avg_surface_temperature),
                    snow: one_decimal(record.max_snow_accumulation),
                    status: "Active",
                },
            );
        }
        self.last_updated = Some(now);
    }

    pub fn apply_history(&mut self, history: &[(Location, Vec<MeasurementRecord>)]) {
        self.charts.render(history);
    }

    pub fn draw(&self) -> String {
        let mut out = String::new();
        for location in Location::ALL {
            match self.cards.get(location.key()) {
                Some(card) => out.push_str(&format!(
                    "{:<14} [{}]  ice {:>6} cm  surface {:>6} °C  snow {:>6} cm\n",
                    location.name(),
                    card.status,
                    card.ice,
                    card.temperature,
                    card.snow
                )),
                None => out.push_str(&format!("{:<14} [--]\n", location.name())),
            }
        }
        out.push_str(&self.charts.draw());
        if let Some(at) = self.last_updated {
            out.push_str(&format!("\nLast updated: {}", at.format("%H:%M:%S")));
        }
        out
    }
}

/// Periodically refreshes a [`Dashboard`] from the API.
pub struct DashboardPoller {
    client: ApiClient,
    interval_secs: u64,
    dashboard: Arc<Mutex<Dashboard>>,
}

impl DashboardPoller {
    pub fn new(client: ApiClient, interval_secs: u64) -> Self {
        Self {
            client,
            interval_secs,
            dashboard: Arc::new(Mutex::new(Dashboard::default())),
        }
    }

    pub fn dashboard(&self) -> Arc<Mutex<Dashboard>> {
        self.dashboard.clone()
    }

    /// One fetch-and-render cycle, then the Idle -> Polling transition.
    pub async fn run_once(&self) {
        refresh_cycle(&self.client, &self.dashboard).await;
        if let Ok(mut dashboard) = self.dashboard.lock() {
            dashboard.phase = Phase::Polling;
        }
    }

    /// Runs forever. Each tick spawns its own cycle; a slow cycle does not
    /// hold back the next one, and overlapping cycles are not reconciled.
    pub async fn start(self) {
        info!("Starting dashboard polling with {}s interval", self.interval_secs);
        self.run_once().await;
        print_dashboard(&self.dashboard);

        let mut interval = time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately and the first cycle already ran.
        interval.tick().await;

        loop {
            interval.tick().await;

            let client = self.client.clone();
            let dashboard = self.dashboard.clone();
            tokio::spawn(async move {
                refresh_cycle(&client, &dashboard).await;
                print_dashboard(&dashboard);
            });
        }
    }
}

pub fn print_dashboard(dashboard: &Mutex<Dashboard>) {
    if let Ok(dashboard) = dashboard.lock() {
        println!("{}\n", dashboard.draw());
    }
}

async fn refresh_cycle(client: &ApiClient, dashboard: &Mutex<Dashboard>) {
    if let Err(e) = try_refresh(client, dashboard).await {
        error!("Dashboard update failed: {:#}", e);
    }
}

async fn try_refresh(client: &ApiClient, dashboard: &Mutex<Dashboard>) -> anyhow::Result<()> {
    // A failure envelope leaves the cards alone; the charts still refresh.
    if let Some(latest) = client.latest().await? {
        debug!("Fetched latest readings for {} locations", latest.len());
        lock(dashboard)?.apply_latest(&latest, Local::now());
    }

    let history = try_join_all(Location::ALL.into_iter().map(|location| async move {
        client
            .history(location)
            .await
            .map(|records| (location, records))
    }))
    .await?;
    lock(dashboard)?.apply_history(&history);
    Ok(())
}

fn lock(dashboard: &Mutex<Dashboard>) -> anyhow::Result<std::sync::MutexGuard<'_, Dashboard>> {
    dashboard
        .lock()
        .map_err(|_| anyhow::anyhow!("dashboard state poisoned"))
}
