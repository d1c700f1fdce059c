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

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use std::error;
use std::fmt;

/// Language of the free-text fields in weather responses.
pub const LANGUAGE: &str = "de";

const UNITS: &str = "metric";

#[derive(Debug)]
pub enum ClientError {
    Transport(reqwest::Error),
    Decode(reqwest::Error),
    Unexpected(StatusCode),
    InvalidBaseUrl(Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "request failed: {}", e),
            Self::Decode(e) => write!(f, "unable to decode weather data: {}", e),
            Self::Unexpected(status) => write!(f, "unexpected status {}", status),
            Self::InvalidBaseUrl(url) => write!(f, "invalid base URL {}", url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key so it never ends up in logs.
        let e = e.without_url();
        if e.is_decode() {
            Self::Decode(e)
        } else {
            Self::Transport(e)
        }
    }
}

/// Client for the OpenWeatherMap "current weather" endpoint.
///
/// Each call makes exactly one request. No timeout beyond what the underlying `Client`
/// was built with is applied, and failed requests are not retried.
#[derive(Debug, Clone)]
pub struct OwmClient {
    client: Client,
    base_url: Url,
}

impl OwmClient {
    const USER_AGENT: &'static str = concat!("owm_exporter/", env!("CARGO_PKG_VERSION"));
    const JSON_RESPONSE: &'static str = "application/json";

    /// Create a new client that makes requests against `base_url`, typically
    /// `http://api.openweathermap.org/`.
    pub fn new(client: Client, base_url: Url) -> Result<Self, ClientError> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url));
        }

        Ok(OwmClient { client, base_url })
    }

    /// Fetch the current weather for `location_id` and decode it into a snapshot.
    pub async fn current_weather(&self, location_id: u64, api_key: &str) -> Result<WeatherSnapshot, ClientError> {
        let request_url = weather_url(&self.base_url, location_id, api_key, LANGUAGE);
        tracing::debug!(message = "making current weather request", location_id = location_id);

        let res = self
            .client
            .get(request_url)
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(ClientError::Unexpected(status));
        }

        Ok(res.json::<WeatherSnapshot>().await?)
    }
}

/// Build the URL of the current weather endpoint for a location.
///
/// Units are always metric. Any path or query on `base` is replaced.
///
/// # Panics
///
/// If `base` cannot be a base URL. `OwmClient::new()` rejects such URLs.
pub(crate) fn weather_url(base: &Url, location_id: u64, api_key: &str, language: &str) -> Url {
    let mut url = base.clone();
    {
        url.path_segments_mut()
            .map(|mut p| {
                p.clear().push("data").push("2.5").push("weather");
            })
            .expect("unable to modify weather URL path segments");
    }

    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("id", &location_id.to_string())
        .append_pair("appid", api_key)
        .append_pair("lang", language)
        .append_pair("units", UNITS);

    url
}

/// One set of measurements for a location as returned by the API.
///
/// Every group and field is optional in the response and defaults to zero, whether it is
/// missing or `null`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct WeatherSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub main: MainData,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub wind: WindData,
    #[serde(deserialize_with = "null_as_default")]
    pub clouds: CloudsData,
    #[serde(deserialize_with = "null_as_default")]
    pub rain: PrecipitationData,
    #[serde(deserialize_with = "null_as_default")]
    pub snow: PrecipitationData,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct MainData {
    #[serde(deserialize_with = "null_as_default")]
    pub temp: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub feels_like: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub temp_min: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub temp_max: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pressure: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct WindData {
    #[serde(deserialize_with = "null_as_default")]
    pub speed: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub gust: f64,
    #[serde(rename = "deg", deserialize_with = "null_as_default")]
    pub direction: f64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct CloudsData {
    #[serde(rename = "all", deserialize_with = "null_as_default")]
    pub percentage: f64,
}

/// Rain or snow volume in millimeters.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct PrecipitationData {
    #[serde(rename = "1h", deserialize_with = "null_as_default")]
    pub last_1h: f64,
    #[serde(rename = "3h", deserialize_with = "null_as_default")]
    pub last_3h: f64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
