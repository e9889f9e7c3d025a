use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::models::WeatherReport;

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReading,
    #[serde(default)]
    weather: Vec<Condition>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MainReading {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
    icon: String,
}

/// Current-conditions lookup against the OpenWeatherMap API.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>, base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build weather HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Weather for the dashboard. `None` when no key is configured or the user
    /// has no location; upstream failures become an `Unavailable` report.
    pub async fn report_for(&self, location: Option<&str>) -> Option<WeatherReport> {
        let location = location.map(str::trim).filter(|l| !l.is_empty())?;
        let api_key = self.api_key.as_deref()?;

        match self.fetch(location, api_key).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(location = %location, "Could not fetch weather data: {err:#}");
                Some(WeatherReport::Unavailable {
                    error: "Could not fetch weather data.".to_string(),
                })
            }
        }
    }

    async fn fetch(&self, location: &str, api_key: &str) -> Result<WeatherReport> {
        let current: CurrentWeather = self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[("q", location), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()
            .context("weather service returned an error")?
            .json()
            .await
            .context("weather response was not valid JSON")?;

        let condition = current
            .weather
            .into_iter()
            .next()
            .context("weather response had no conditions")?;

        Ok(WeatherReport::Current {
            temp: current.main.temp,
            description: condition.description,
            icon: condition.icon,
            city: current.name,
        })
    }
}
