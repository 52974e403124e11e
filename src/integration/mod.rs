use std::env;
use std::fs::File;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use url::Url;

pub mod http;

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub enum Env {
    Local,
    Dev,
    Stage,
    Production,
}

impl Env {
    pub fn default_api_url(&self) -> Url {
        match self {
            Env::Local => Url::parse("http://localhost:3000/api").expect("valid local api url"),
            Env::Dev | Env::Stage | Env::Production => panic!("API_URL must be set"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub env: Env,

    api_url: Url,
    ws_url: Url,
    auth_token: Option<String>,
    refresh_interval: Option<Duration>,
}

impl Config {
    pub const fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub const fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub const fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }
}

impl Default for Config {
    fn default() -> Self {
        dotenv().ok();

        let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
        let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);
        let log_file = env::var("SERVICE_NAME")
            .map(|pkg| format!("{pkg}.log"))
            .unwrap_or("client.log".into());

        CombinedLogger::init(vec![
            TermLogger::new(
                level,
                simplelog::Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            ),
            WriteLogger::new(
                level,
                simplelog::Config::default(),
                File::create(log_file).expect("Failed to create log file"),
            ),
        ])
        .expect("Failed to initialize logger");

        let env = env::var("ENV")
            .map(|env| match env.as_str() {
                "local" => Env::Local,
                "dev" => Env::Dev,
                "stg" => Env::Stage,
                "prod" => Env::Production,
                _ => panic!("Invalid environment: {env}"),
            })
            .unwrap_or(Env::Local);

        let api_url = env::var("API_URL")
            .map(|raw| Url::parse(&raw).expect("invalid API_URL"))
            .unwrap_or_else(|_| env.default_api_url());

        let ws_url = env::var("WS_URL")
            .map(|raw| Url::parse(&raw).expect("invalid WS_URL"))
            .unwrap_or_else(|_| derive_ws_url(&api_url));

        let refresh_interval = env::var("REFRESH_INTERVAL_SECS")
            .ok()
            .map(|raw| raw.parse().expect("Failed to parse REFRESH_INTERVAL_SECS"))
            .map(Duration::from_secs);

        Self {
            env,
            api_url,
            ws_url,
            auth_token: env::var("AUTH_TOKEN").ok(),
            refresh_interval,
        }
    }
}

// The event channel lives on the same host as the REST api, without the
// trailing /api segment.
fn derive_ws_url(api_url: &Url) -> Url {
    let raw = api_url.as_str().trim_end_matches('/');
    let raw = raw.strip_suffix("/api").unwrap_or(raw);
    let raw = raw
        .replace("https://", "wss://")
        .replace("http://", "ws://");

    Url::parse(&format!("{raw}/ws")).expect("invalid derived ws url")
}

pub fn init_http_client() -> reqwest::Client {
    match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            panic!("Failed to initialize HTTP client: {e}")
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error(transparent)]
    _Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
