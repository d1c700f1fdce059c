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

use crate::client::WeatherSnapshot;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, PoisonError, RwLock};

const LABEL_CITY_ID: &str = "city_id";
const LABEL_CITY_NAME: &str = "city_name";

const METERS_PER_KILOMETER: f64 = 1000.0;
const KNOTS_PER_METER_PER_SECOND: f64 = 1.943844;
const BEAUFORT_MAX: u8 = 12;
const BEAUFORT_STEPS: [f64; 12] = [1.0, 4.0, 7.0, 11.0, 17.0, 22.0, 28.0, 34.0, 41.0, 48.0, 56.0, 64.0];

type FloatGauge = Gauge<f64, AtomicU64>;

/// Shared handle to the registry that metrics are registered with and scraped from.
///
/// Cloning the handle is cheap and all clones refer to the same registry. Registration
/// takes a write lock while scrapes take a read lock, so a scrape never sees a partially
/// registered set of metrics.
#[derive(Debug, Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Registry>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        RegistryHandle {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// Run `f` with exclusive access to the underlying registry.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce(&mut Registry),
    {
        let mut reg = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut reg);
    }

    /// Encode all registered metrics in the Prometheus/OpenMetrics text format.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let reg = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut buf = String::new();
        encode(&mut buf, &reg)?;
        Ok(buf)
    }
}

/// Whether the metrics of a `WeatherMetrics` are visible in its registry yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Pending,
    Registered,
}

/// Holder for metrics that can be set from a `WeatherSnapshot` for a single location.
///
/// Metrics are created when calling `WeatherMetrics::new()` but are only registered after the
/// first call to `WeatherMetrics::update()`. This keeps a scrape from ever reporting zero for
/// every metric before the first forecast has been fetched. All metrics share the prefix
/// "meteo_" and have `city_id` and `city_name` labels for the location.
#[derive(Debug)]
pub struct WeatherMetrics {
    registry: RegistryHandle,
    registration: Registration,
    city_id: u64,
    city_name: String,
    temperature: FloatGauge,
    feels_like: FloatGauge,
    temperature_min: FloatGauge,
    temperature_max: FloatGauge,
    pressure: FloatGauge,
    humidity: FloatGauge,
    visibility: FloatGauge,
    cloudiness: FloatGauge,
    wind_speed: FloatGauge,
    wind_gusts: FloatGauge,
    wind_direction: FloatGauge,
    wind_speed_bft: FloatGauge,
    wind_gusts_bft: FloatGauge,
    rain_1h: FloatGauge,
    rain_3h: FloatGauge,
    snow_1h: FloatGauge,
    snow_3h: FloatGauge,
}

impl WeatherMetrics {
    pub fn new<S: Into<String>>(registry: RegistryHandle, city_id: u64, city_name: S) -> Self {
        Self {
            registry,
            registration: Registration::Pending,
            city_id,
            city_name: city_name.into(),
            temperature: FloatGauge::default(),
            feels_like: FloatGauge::default(),
            temperature_min: FloatGauge::default(),
            temperature_max: FloatGauge::default(),
            pressure: FloatGauge::default(),
            humidity: FloatGauge::default(),
            visibility: FloatGauge::default(),
            cloudiness: FloatGauge::default(),
            wind_speed: FloatGauge::default(),
            wind_gusts: FloatGauge::default(),
            wind_direction: FloatGauge::default(),
            wind_speed_bft: FloatGauge::default(),
            wind_gusts_bft: FloatGauge::default(),
            rain_1h: FloatGauge::default(),
            rain_3h: FloatGauge::default(),
            snow_1h: FloatGauge::default(),
            snow_3h: FloatGauge::default(),
        }
    }

    pub fn registration(&self) -> Registration {
        self.registration
    }

    /// Set every metric from the provided snapshot, registering the metrics if this is
    /// the first update.
    pub fn update(&mut self, snapshot: &WeatherSnapshot) {
        self.temperature.set(snapshot.main.temp);
        self.feels_like.set(snapshot.main.feels_like);
        self.temperature_min.set(snapshot.main.temp_min);
        self.temperature_max.set(snapshot.main.temp_max);
        self.pressure.set(snapshot.main.pressure);
        self.humidity.set(snapshot.main.humidity);
        self.visibility.set(meters_to_kilometers(snapshot.visibility));
        self.cloudiness.set(snapshot.clouds.percentage);

        let wind_knots = mps_to_knots(snapshot.wind.speed);
        let gusts_knots = mps_to_knots(snapshot.wind.gust);
        self.wind_speed.set(wind_knots);
        self.wind_gusts.set(gusts_knots);
        self.wind_direction.set(snapshot.wind.direction);
        self.wind_speed_bft.set(f64::from(knots_to_beaufort(wind_knots)));
        self.wind_gusts_bft.set(f64::from(knots_to_beaufort(gusts_knots)));

        self.rain_1h.set(snapshot.rain.last_1h);
        self.rain_3h.set(snapshot.rain.last_3h);
        self.snow_1h.set(snapshot.snow.last_1h);
        self.snow_3h.set(snapshot.snow.last_3h);

        self.register();
    }

    fn register(&mut self) {
        if self.registration == Registration::Registered {
            return;
        }

        self.registry.register(|reg| {
            let sub = reg
                .sub_registry_with_label((Cow::Borrowed(LABEL_CITY_ID), Cow::Owned(self.city_id.to_string())))
                .sub_registry_with_label((Cow::Borrowed(LABEL_CITY_NAME), Cow::Owned(self.city_name.clone())));

            for (name, help, gauge) in self.gauges() {
                sub.register(name, help, gauge.clone());
            }
        });

        self.registration = Registration::Registered;
        tracing::debug!(
            message = "registered weather metrics",
            city_id = self.city_id,
            city_name = %self.city_name,
        );
    }

    fn gauges(&self) -> [(&'static str, &'static str, &FloatGauge); 17] {
        [
            ("meteo_temp_c", "Temperature in degrees Celsius", &self.temperature),
            ("meteo_feelslike_c", "Feels-like temperature in degrees Celsius", &self.feels_like),
            ("meteo_tempmin_c", "Minimum temperature in degrees Celsius", &self.temperature_min),
            ("meteo_tempmax_c", "Maximum temperature in degrees Celsius", &self.temperature_max),
            ("meteo_pressure_hpa", "Pressure in hectopascal", &self.pressure),
            ("meteo_humidity_percent", "Humidity in percent", &self.humidity),
            ("meteo_visibility_km", "Visibility in kilometers", &self.visibility),
            ("meteo_cloudiness_percent", "Cloudiness in percent", &self.cloudiness),
            ("meteo_wind_speed_kn", "Wind speed in knots", &self.wind_speed),
            ("meteo_wind_gusts_kn", "Wind gusts in knots", &self.wind_gusts),
            ("meteo_wind_direction_deg", "Wind direction in degrees", &self.wind_direction),
            ("meteo_wind_speed_bft", "Wind force in Beaufort", &self.wind_speed_bft),
            ("meteo_wind_gusts_bft", "Wind gust force in Beaufort", &self.wind_gusts_bft),
            ("meteo_rain_1h_mm", "Rain volume for the last hour in mm", &self.rain_1h),
            ("meteo_rain_3h_mm", "Rain volume for the last 3 hours in mm", &self.rain_3h),
            ("meteo_snow_1h_mm", "Snow volume for the last hour in mm", &self.snow_1h),
            ("meteo_snow_3h_mm", "Snow volume for the last 3 hours in mm", &self.snow_3h),
        ]
    }
}

pub fn meters_to_kilometers(meters: f64) -> f64 {
    meters / METERS_PER_KILOMETER
}

pub fn mps_to_knots(mps: f64) -> f64 {
    mps * KNOTS_PER_METER_PER_SECOND
}

/// Force on the Beaufort scale for a wind speed in knots, saturating at 12.
pub fn knots_to_beaufort(knots: f64) -> u8 {
    BEAUFORT_STEPS
        .iter()
        .position(|&step| knots < step)
        .map(|i| i as u8)
        .unwrap_or(BEAUFORT_MAX)
}
