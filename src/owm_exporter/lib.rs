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

//! Prometheus metrics exporter for the OpenWeatherMap API
//!
//! ## Features
//!
//! `owm_exporter` fetches the current weather for a single location using the [OpenWeatherMap]
//! current weather API and emits it as Prometheus metrics. Metrics are only exposed once the first
//! successful fetch has completed, so a scrape never reports placeholder zero values. Every metric
//! has a `city_id` and `city_name` label for the configured location.
//!
//! * `meteo_temp_c` - Temperature, in degrees celsius.
//! * `meteo_feelslike_c` - Feels-like temperature, in degrees celsius.
//! * `meteo_tempmin_c` / `meteo_tempmax_c` - Minimum and maximum temperature, in degrees celsius.
//! * `meteo_pressure_hpa` - Atmospheric pressure, in hectopascal.
//! * `meteo_humidity_percent` - Relative humidity (0-100).
//! * `meteo_visibility_km` - Visibility, in kilometers.
//! * `meteo_cloudiness_percent` - Cloud cover (0-100).
//! * `meteo_wind_speed_kn` / `meteo_wind_gusts_kn` - Wind speed and gusts, in knots.
//! * `meteo_wind_speed_bft` / `meteo_wind_gusts_bft` - Wind speed and gusts on the Beaufort scale (0-12).
//! * `meteo_wind_direction_deg` - Wind direction, in degrees.
//! * `meteo_rain_1h_mm` / `meteo_rain_3h_mm` - Rain volume for the last 1 and 3 hours, in mm.
//! * `meteo_snow_1h_mm` / `meteo_snow_3h_mm` - Snow volume for the last 1 and 3 hours, in mm.
//!
//! [OpenWeatherMap]: https://openweathermap.org/current
//!
//! ## Build
//!
//! `owm_exporter` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Configuring a location
//!
//! The location is configured with environment variables. You'll need an OpenWeatherMap API key and
//! the numeric ID of the city you want weather for.
//!
//! * `METEO_CITY_ID` - Numeric OpenWeatherMap city ID. Required.
//! * `METEO_CITY_NAME` - Name of the city, used as the `city_name` label. Required.
//! * `METEO_API_TOKEN` - OpenWeatherMap API key. Required.
//! * `METEO_INTERVAL_MINUTES` - How often to fetch the current weather, in minutes. Defaults to `5`.
//!
//! All problems with these variables are reported at once and `owm_exporter` exits before making
//! any requests.
//!
//! ```text
//! METEO_CITY_ID=2950159 METEO_CITY_NAME=Berlin METEO_API_TOKEN=... ./owm_exporter
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `2112` at `/metrics`. Once `owm_exporter`
//! is running, configure scrapes of it by your Prometheus server. Add the host running
//! `owm_exporter` as a target under the Prometheus `scrape_configs` section as described by
//! the example below.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     15s
//!   evaluation_interval: 15s
//!   external_labels:
//!     monitor: 'my_prom'
//!
//! scrape_configs:
//! - job_name: owm_exporter
//!   static_configs:
//!   - targets: ['example:2112']
//! ```
//!

pub mod client;
pub mod config;
pub mod http;
pub mod metrics;
pub mod poller;
