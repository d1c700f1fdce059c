// owm_exporter - Prometheus metrics exporter for the OpenWeatherMap API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{ClientError, OwmClient};
use crate::config::LocationConfig;
use crate::metrics::WeatherMetrics;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Level};

/// Periodically fetches the current weather for a location and updates its metrics.
#[derive(Debug)]
pub struct Poller {
    location: LocationConfig,
    client: OwmClient,
    metrics: WeatherMetrics,
}

impl Poller {
    pub fn new(location: LocationConfig, client: OwmClient, metrics: WeatherMetrics) -> Self {
        Self {
            location,
            client,
            metrics,
        }
    }

    pub fn metrics(&self) -> &WeatherMetrics {
        &self.metrics
    }

    /// Poll forever: once immediately and then once per configured interval.
    ///
    /// Each fetch completes before the next one starts. When a fetch takes longer than the
    /// interval, one late fetch runs as soon as it finishes and any other missed ticks are
    /// dropped, so polling returns to the original schedule instead of catching up in a burst.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.location.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            message = "weather polling started",
            city_id = self.location.id,
            city_name = %self.location.name,
            interval_secs = self.location.interval.as_secs(),
        );

        loop {
            let _ = interval.tick().await;
            // Failures are logged by poll() and the next tick is the only retry.
            let _ = self.poll().await;
        }
    }

    /// Fetch the current weather once and update metrics if the fetch succeeded.
    ///
    /// On failure the error is logged and metrics keep their previous values.
    pub async fn poll(&mut self) -> Result<(), ClientError> {
        let span = tracing::span!(Level::DEBUG, "owm_weather", city_id = self.location.id);
        match self
            .client
            .current_weather(self.location.id, &self.location.api_key)
            .instrument(span)
            .await
        {
            Ok(snapshot) => {
                self.metrics.update(&snapshot);
                tracing::info!(
                    message = "received weather data, updated metrics",
                    city_id = self.location.id,
                    city_name = %self.location.name,
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    message = "failed to fetch weather data",
                    city_id = self.location.id,
                    city_name = %self.location.name,
                    error = %e,
                );
                Err(e)
            }
        }
    }
}
