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

use clap::Parser;
use owm_exporter::client::OwmClient;
use owm_exporter::config::LocationConfig;
use owm_exporter::http::RequestContext;
use owm_exporter::metrics::{RegistryHandle, WeatherMetrics};
use owm_exporter::poller::Poller;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 2112);
const DEFAULT_API_URL: &str = "http://api.openweathermap.org/";

/// Export the current weather from OpenWeatherMap as Prometheus metrics.
///
/// The location to fetch weather for is read from the METEO_CITY_ID, METEO_CITY_NAME,
/// METEO_API_TOKEN, and METEO_INTERVAL_MINUTES environment variables.
#[derive(Debug, Parser)]
#[clap(name = "owm_exporter", version = clap::crate_version!())]
struct OwmExporterApplication {
    /// Base URL for the OpenWeatherMap API
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. By default, owm_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = OwmExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    // Validate the entire location configuration before doing anything that touches the
    // network so that mistakes are reported at once.
    let location = LocationConfig::from_env().unwrap_or_else(|e| {
        for violation in e.violations() {
            tracing::error!(message = "invalid configuration", violation = %violation);
        }
        process::exit(1)
    });

    let http_client = Client::builder().build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = OwmClient::new(http_client, opts.api_url.clone()).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize weather client", error = %e);
        process::exit(1)
    });

    let builder = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    let registry = RegistryHandle::default();
    let metrics = WeatherMetrics::new(registry.clone(), location.id, location.name.clone());
    let poller = Poller::new(location, client, metrics);
    tracing::debug!(message = "starting poller", api_url = %opts.api_url, poller = ?poller);
    tokio::spawn(poller.run());

    let context = Arc::new(RequestContext::new(registry));
    let server = builder.serve(owm_exporter::http::app(context).into_make_service());
    tracing::info!(message = "server started", address = %server.local_addr());

    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
