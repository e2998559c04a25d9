//! Met Office Weather Observations Website uploader
//!
//! WOW takes one form-encoded request per observation with four mandatory
//! keys (`siteid`, `siteAuthenticationKey`, `dateutc`, `softwaretype`) and at
//! least one observation key, in imperial units.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::WowConfig;
use crate::error::{Result, StationError};
use crate::io::HttpClient;
use crate::physics::mm_to_inches;
use crate::report::{ReportSink, Snapshot};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct WowSink {
    url: String,
    site_id: String,
    auth_key: String,
    software_type: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WowSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WowSink")
            .field("url", &self.url)
            .field("site_id", &self.site_id)
            .finish_non_exhaustive()
    }
}

impl WowSink {
    pub fn new(config: &WowConfig, software_type: &str, http: Arc<dyn HttpClient>) -> Result<Self> {
        if config.site_id.is_empty() || config.auth_key.is_empty() {
            return Err(StationError::Config(
                "WOW upload needs site_id and auth_key (or WOW_SITE_ID / WOW_AUTH_KEY)".to_string(),
            ));
        }

        Ok(Self {
            url: config.url.clone(),
            site_id: config.site_id.clone(),
            auth_key: config.auth_key.clone(),
            software_type: software_type.to_string(),
            http,
        })
    }

    /// Form parameters for `snapshot`; absent readings are left out
    pub fn params(&self, snapshot: &Snapshot) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("siteid", self.site_id.clone()),
            ("siteAuthenticationKey", self.auth_key.clone()),
            ("dateutc", snapshot.timestamp.format(DATE_FORMAT).to_string()),
            ("softwaretype", self.software_type.clone()),
        ];

        let observations = [
            ("baromin", snapshot.sea_level_pressure_inhg, 3_usize),
            ("tempf", snapshot.temperature_f, 1),
            ("dewptf", snapshot.dew_point_f, 1),
            ("humidity", snapshot.humidity_percent, 0),
            ("rainin", snapshot.rain_since_report_mm.map(mm_to_inches), 2),
            ("dailyrainin", snapshot.rain_day_mm.map(mm_to_inches), 2),
            ("winddir", snapshot.wind_direction_deg, 0),
            ("windspeedmph", snapshot.wind_speed_mph, 2),
            ("windgustmph", snapshot.wind_gust_mph, 2),
        ];
        for (key, value, precision) in observations {
            if let Some(value) = value {
                params.push((key, format!("{:.*}", precision, value)));
            }
        }

        params
    }
}

#[async_trait]
impl ReportSink for WowSink {
    fn name(&self) -> &str {
        "wow"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        let params = self.params(snapshot);
        if params.len() <= 4 {
            return Err(StationError::Sink(
                "no observations available for WOW upload".to_string(),
            ));
        }

        let form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let response = self.http.post_form(&self.url, &form).await?;

        if response.status != 200 {
            return Err(StationError::Sink(format!(
                "WOW returned HTTP {}: {}",
                response.status, response.body
            )));
        }

        debug!("WOW accepted observation for {}", snapshot.timestamp);
        Ok(())
    }
}
