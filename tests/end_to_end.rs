use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use owm_exporter::client::{ClientError, OwmClient};
use owm_exporter::config::LocationConfig;
use owm_exporter::http::{app, RequestContext};
use owm_exporter::metrics::{Registration, RegistryHandle, WeatherMetrics};
use owm_exporter::poller::Poller;
use reqwest::{Client, Url};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const CITY_ID: u64 = 123;
const CITY_NAME: &str = "Testville";
const API_KEY: &str = "foobar";

const WEATHER_BODY: &str = r#"{
    "coord": {"lon": 7.1, "lat": 50.7},
    "weather": [{"id": 802, "main": "Clouds", "description": "Mäßig bewölkt", "icon": "03d"}],
    "main": {"temp": 20.0, "feels_like": 19.4, "temp_min": 18.2, "temp_max": 21.7, "pressure": 1016, "humidity": 55},
    "visibility": 10000,
    "wind": {"speed": 5.0, "deg": 180},
    "clouds": {"all": 40},
    "name": "Testville",
    "cod": 200
}"#;

/// Stand-in for the weather API that answers like the real one while `healthy` is set.
async fn current_weather(
    State(healthy): State<Arc<AtomicBool>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !healthy.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let param = |k: &str| params.get(k).map(String::as_str);
    if param("appid") != Some(API_KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"cod": 401, "message": "Invalid API key."}"#,
        )
            .into_response();
    }

    if param("id") != Some("123") || param("lang") != Some("de") || param("units") != Some("metric") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    ([(CONTENT_TYPE, "application/json")], WEATHER_BODY).into_response()
}

async fn malformed_weather() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/json")], r#"{"main": {"temp": "#)
}

fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap().serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

fn weather_api(healthy: Arc<AtomicBool>) -> SocketAddr {
    serve(
        Router::new()
            .route("/data/2.5/weather", get(current_weather))
            .with_state(healthy),
    )
}

/// Requests seen by a weather API stand-in, by the (possibly paused) tokio clock.
#[derive(Debug, Default)]
struct RequestLog {
    first_delay: Duration,
    times: Mutex<Vec<Instant>>,
}

impl RequestLog {
    fn times(&self) -> Vec<Instant> {
        self.times.lock().unwrap().clone()
    }
}

async fn logged_weather(State(log): State<Arc<RequestLog>>) -> impl IntoResponse {
    let first = {
        let mut times = log.times.lock().unwrap();
        times.push(Instant::now());
        times.len() == 1
    };

    if first {
        tokio::time::sleep(log.first_delay).await;
    }

    ([(CONTENT_TYPE, "application/json")], WEATHER_BODY)
}

fn logged_weather_api(log: Arc<RequestLog>) -> SocketAddr {
    serve(
        Router::new()
            .route("/data/2.5/weather", get(logged_weather))
            .with_state(log),
    )
}

/// Let the paused clock move forward in small steps until `log` has seen `count` requests.
async fn wait_for_requests(log: &RequestLog, count: usize, limit: Duration) {
    let start = Instant::now();
    while log.times().len() < count && start.elapsed() < limit {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn poller(api: SocketAddr, api_key: &str, registry: RegistryHandle) -> Poller {
    poller_every(api, api_key, Duration::from_secs(300), registry)
}

fn poller_every(api: SocketAddr, api_key: &str, interval: Duration, registry: RegistryHandle) -> Poller {
    let location = LocationConfig {
        id: CITY_ID,
        name: CITY_NAME.to_owned(),
        api_key: api_key.to_owned(),
        interval,
    };

    let base = Url::parse(&format!("http://{}/", api)).unwrap();
    let client = OwmClient::new(Client::new(), base).unwrap();
    let metrics = WeatherMetrics::new(registry, location.id, location.name.clone());
    Poller::new(location, client, metrics)
}

async fn scrape(exporter: SocketAddr) -> String {
    let res = reqwest::get(format!("http://{}/metrics", exporter)).await.unwrap();
    assert_eq!(reqwest::StatusCode::OK, res.status());
    res.text().await.unwrap()
}

fn value(text: &str, name: &str) -> f64 {
    let prefix = format!("{}{{", name);
    let line = text
        .lines()
        .find(|l| l.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no sample for {} in:\n{}", name, text));

    assert!(line.contains(r#"city_id="123""#), "missing city_id label: {}", line);
    assert!(line.contains(r#"city_name="Testville""#), "missing city_name label: {}", line);
    line.split_whitespace().last().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_poll_then_scrape() {
    let api = weather_api(Arc::new(AtomicBool::new(true)));
    let registry = RegistryHandle::default();
    let exporter = serve(app(Arc::new(RequestContext::new(registry.clone()))));
    let mut poller = poller(api, API_KEY, registry);

    assert!(!scrape(exporter).await.contains("meteo_"));

    poller.poll().await.unwrap();
    let text = scrape(exporter).await;

    assert_eq!(Registration::Registered, poller.metrics().registration());
    assert_eq!(20.0, value(&text, "meteo_temp_c"));
    assert_eq!(1016.0, value(&text, "meteo_pressure_hpa"));
    assert!((value(&text, "meteo_wind_speed_kn") - 9.719).abs() < 0.001);
    assert_eq!(3.0, value(&text, "meteo_wind_speed_bft"));
    assert_eq!(0.0, value(&text, "meteo_wind_gusts_kn"));
    assert_eq!(0.0, value(&text, "meteo_wind_gusts_bft"));
    assert_eq!(180.0, value(&text, "meteo_wind_direction_deg"));
    assert_eq!(40.0, value(&text, "meteo_cloudiness_percent"));
    assert_eq!(10.0, value(&text, "meteo_visibility_km"));
    assert_eq!(0.0, value(&text, "meteo_rain_1h_mm"));
    assert_eq!(0.0, value(&text, "meteo_rain_3h_mm"));
    assert_eq!(0.0, value(&text, "meteo_snow_1h_mm"));
    assert_eq!(0.0, value(&text, "meteo_snow_3h_mm"));

    poller.poll().await.unwrap();
    let text = scrape(exporter).await;

    assert_eq!(1, text.matches("# TYPE meteo_temp_c gauge").count());
    assert_eq!(1, text.lines().filter(|l| l.starts_with("meteo_temp_c{")).count());
}

#[tokio::test]
async fn test_failed_poll_keeps_last_values() {
    let healthy = Arc::new(AtomicBool::new(true));
    let api = weather_api(healthy.clone());
    let registry = RegistryHandle::default();
    let mut poller = poller(api, API_KEY, registry.clone());

    poller.poll().await.unwrap();
    healthy.store(false, Ordering::SeqCst);
    let res = poller.poll().await;

    assert!(matches!(res, Err(ClientError::Unexpected(reqwest::StatusCode::SERVICE_UNAVAILABLE))));
    assert_eq!(20.0, value(&registry.encode().unwrap(), "meteo_temp_c"));
}

#[tokio::test]
async fn test_invalid_api_key_never_registers() {
    let api = weather_api(Arc::new(AtomicBool::new(true)));
    let registry = RegistryHandle::default();
    let mut poller = poller(api, "wrong", registry.clone());

    let res = poller.poll().await;

    assert!(matches!(res, Err(ClientError::Unexpected(reqwest::StatusCode::UNAUTHORIZED))));
    assert_eq!(Registration::Pending, poller.metrics().registration());
    assert!(!registry.encode().unwrap().contains("meteo_"));
}

#[tokio::test]
async fn test_malformed_body() {
    let api = serve(Router::new().route("/data/2.5/weather", get(malformed_weather)));
    let registry = RegistryHandle::default();
    let mut poller = poller(api, API_KEY, registry.clone());

    let res = poller.poll().await;

    assert!(matches!(res, Err(ClientError::Decode(_))));
    assert_eq!(Registration::Pending, poller.metrics().registration());
}

#[tokio::test]
async fn test_unreachable_api() {
    let api = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut poller = poller(api, API_KEY, RegistryHandle::default());

    let res = poller.poll().await;

    match res {
        Err(ClientError::Transport(e)) => assert!(!e.to_string().contains(API_KEY)),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_polls_immediately() {
    let api = weather_api(Arc::new(AtomicBool::new(true)));
    let registry = RegistryHandle::default();
    let poller = poller(api, API_KEY, registry.clone());

    let handle = tokio::spawn(poller.run());
    let mut text = String::new();
    for _ in 0..100 {
        text = registry.encode().unwrap();
        if text.contains("meteo_temp_c{") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();

    assert_eq!(20.0, value(&text, "meteo_temp_c"));
}

#[tokio::test]
async fn test_exporter_routes() {
    let exporter = serve(app(Arc::new(RequestContext::new(RegistryHandle::default()))));
    let client = Client::new();

    let res = client.post(format!("http://{}/metrics", exporter)).send().await.unwrap();
    assert_eq!(reqwest::StatusCode::METHOD_NOT_ALLOWED, res.status());

    let res = client.get(format!("http://{}/", exporter)).send().await.unwrap();
    assert_eq!(reqwest::StatusCode::NOT_FOUND, res.status());
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_on_every_tick() {
    let interval = Duration::from_secs(60);
    let log = Arc::new(RequestLog::default());
    let api = logged_weather_api(log.clone());
    let registry = RegistryHandle::default();
    let start = Instant::now();

    let handle = tokio::spawn(poller_every(api, API_KEY, interval, registry.clone()).run());
    wait_for_requests(&log, 3, interval * 10).await;
    handle.abort();

    let times = log.times();
    assert!(times.len() >= 3, "expected at least 3 requests, got {}", times.len());
    assert!(times[0].duration_since(start) < Duration::from_secs(30));
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_secs(59), "requests only {:?} apart", gap);
        assert!(gap < Duration::from_secs(90), "requests {:?} apart", gap);
    }
    assert_eq!(20.0, value(&registry.encode().unwrap(), "meteo_temp_c"));
}

#[tokio::test(start_paused = true)]
async fn test_run_skips_ticks_missed_by_slow_fetch() {
    let interval = Duration::from_secs(60);
    let log = Arc::new(RequestLog {
        first_delay: Duration::from_secs(150),
        ..Default::default()
    });
    let api = logged_weather_api(log.clone());
    let start = Instant::now();

    let handle = tokio::spawn(poller_every(api, API_KEY, interval, RegistryHandle::default()).run());
    wait_for_requests(&log, 3, interval * 10).await;
    handle.abort();

    // The first fetch finishes at 150s, after the ticks at 60s and 120s. One late tick runs
    // right away, the other is dropped, and polling resumes on the original schedule at 180s.
    let times = log.times();
    assert_eq!(3, times.len());
    let second = times[1].duration_since(start);
    let third = times[2].duration_since(start);
    assert!(second >= Duration::from_secs(150), "second request at {:?}", second);
    assert!(second < Duration::from_secs(175), "second request at {:?}", second);
    assert!(third >= Duration::from_secs(179), "third request at {:?}", third);
    assert!(third < Duration::from_secs(200), "third request at {:?}", third);
}
