use std::{env, net::IpAddr, time::Duration};

use donation_engine::{helpers::ConfigurationError, matching_objects::DonorOrdering, PayloadDecryptor};
use dpg_common::{
    helpers::{parse_boolean_flag, parse_seconds},
    Secret,
};
use log::*;

const DEFAULT_DPG_HOST: &str = "127.0.0.1";
const DEFAULT_DPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/donations.db";
const DEFAULT_EVENT_MAX_AGE: Duration = Duration::from_secs(3600);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// When set, every `/api` request must carry this value in the `X-Api-Key` header.
    pub admin_api_key: Option<Secret<String>>,
    pub webhook: WebhookConfig,
    pub matching: MatchingConfig,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// Hex encoded AES-256 key shared with the payment provider
    pub aes_key: Secret<String>,
    /// Hex encoded AES-CBC initialisation vector shared with the payment provider
    pub aes_iv: Secret<String>,
    /// Events older than this are rejected
    pub max_event_age: Duration,
    /// If supplied, requests against /webhook endpoints will be checked against a whitelist of provider IP addresses.
    /// To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
}

#[derive(Clone, Copy, Debug)]
pub struct MatchingConfig {
    pub ordering: DonorOrdering,
    /// How often the matching worker runs without being asked to
    pub sweep_interval: Duration,
    /// How many times a queued matching request is retried before it is given up
    pub max_retries: u32,
    /// Delay before the first retry. Doubled on every further attempt.
    pub retry_backoff: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ordering: DonorOrdering::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DPG_HOST.to_string(),
            port: DEFAULT_DPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            admin_api_key: None,
            webhook: WebhookConfig { max_event_age: DEFAULT_EVENT_MAX_AGE, ..Default::default() },
            matching: MatchingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DPG_HOST").ok().unwrap_or_else(|| DEFAULT_DPG_HOST.into());
        let port = env::var("DPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for DPG_PORT. {e} Using the default, {DEFAULT_DPG_PORT}, instead."
                    );
                    DEFAULT_DPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_DPG_PORT);
        let database_url = env::var("DPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ DPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("DPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("DPG_USE_FORWARDED").ok(), false);
        let admin_api_key = env::var("DPG_ADMIN_API_KEY").ok().map(Secret::new).filter(|k| !k.is_empty());
        if admin_api_key.is_none() {
            warn!("🚨️ DPG_ADMIN_API_KEY is not set. The /api routes are open to anyone who can reach the server.");
        }
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            admin_api_key,
            webhook: WebhookConfig::from_env_or_defaults(),
            matching: MatchingConfig::from_env_or_defaults(),
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_defaults() -> Self {
        let aes_key = env::var("DPG_TGB_AES_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ DPG_TGB_AES_KEY is not set. Webhook payloads cannot be decrypted without it.");
            String::default()
        });
        let aes_iv = env::var("DPG_TGB_AES_IV").ok().unwrap_or_else(|| {
            error!("🪛️ DPG_TGB_AES_IV is not set. Webhook payloads cannot be decrypted without it.");
            String::default()
        });
        let max_event_age = seconds_or_default("DPG_EVENT_MAX_AGE", DEFAULT_EVENT_MAX_AGE);
        let whitelist = parse_whitelist(env::var("DPG_WEBHOOK_IP_WHITELIST").ok());
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't \
                     accept any incoming webhooks."
                );
            },
            None => {
                info!("🪛️ No webhook IP whitelist is set. Only payload decryption will be used to authenticate webhooks.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Webhook IP whitelist: {addrs}");
            },
        }
        Self { aes_key: Secret::new(aes_key), aes_iv: Secret::new(aes_iv), max_event_age, whitelist }
    }

    /// Builds the decryptor for provider payloads, validating the key material.
    pub fn decryptor(&self) -> Result<PayloadDecryptor, ConfigurationError> {
        PayloadDecryptor::from_hex(self.aes_key.reveal(), self.aes_iv.reveal())
    }
}

impl MatchingConfig {
    pub fn from_env_or_defaults() -> Self {
        let ordering = match env::var("DPG_DONOR_ORDERING") {
            Ok(s) => s.parse::<DonorOrdering>().unwrap_or_else(|e| {
                warn!("🪛️ Invalid configuration value for DPG_DONOR_ORDERING. {e}");
                DonorOrdering::default()
            }),
            Err(_) => DonorOrdering::default(),
        };
        info!("🪛️ Matching donors are ordered by {ordering}");
        let sweep_interval = seconds_or_default("DPG_MATCHING_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL);
        let max_retries = env::var("DPG_MATCHING_MAX_RETRIES")
            .ok()
            .and_then(|s| {
                s.trim()
                    .parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for DPG_MATCHING_MAX_RETRIES. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let retry_backoff = env::var("DPG_MATCHING_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| {
                s.trim()
                    .parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for DPG_MATCHING_RETRY_BACKOFF_MS. {e}"))
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_BACKOFF);
        Self { ordering, sweep_interval, max_retries, retry_backoff }
    }
}

fn seconds_or_default(var: &str, default: Duration) -> Duration {
    match env::var(var).ok() {
        None => {
            info!("🪛️ {var} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
        Some(s) => parse_seconds(Some(s.clone())).unwrap_or_else(|| {
            warn!("🪛️ Invalid configuration value for {var} ({s}). Using the default value of {}s.", default.as_secs());
            default
        }),
    }
}

fn parse_whitelist(value: Option<String>) -> Option<Vec<IpAddr>> {
    let s = value?;
    if ["none", "false", "0", ""].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Webhook IP whitelist is disabled. If this is not what you want, set DPG_WEBHOOK_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .filter_map(|s| {
            s.trim()
                .parse()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in DPG_WEBHOOK_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// The part of the configuration that request handlers need. Secrets stay out of it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whitelist_parsing() {
        assert_eq!(parse_whitelist(None), None);
        assert_eq!(parse_whitelist(Some("None".into())), None);
        assert_eq!(parse_whitelist(Some("0".into())), None);
        let list = parse_whitelist(Some("10.0.0.1, not-an-ip,::1".into())).unwrap();
        assert_eq!(list, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse::<IpAddr>().unwrap()]);
        assert_eq!(parse_whitelist(Some("garbage".into())), Some(vec![]));
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8370);
        assert_eq!(config.database_url, "sqlite://data/donations.db");
        assert_eq!(config.webhook.max_event_age, Duration::from_secs(3600));
        assert_eq!(config.matching.max_retries, 5);
        assert_eq!(config.matching.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.matching.ordering, DonorOrdering::Listing);
        assert!(config.admin_api_key.is_none());
    }

    #[test]
    fn missing_key_material_is_a_configuration_error() {
        assert!(WebhookConfig::default().decryptor().is_err());
    }
}
