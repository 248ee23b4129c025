/// file: src/config.rs
/// description: configuration built from command-line arguments for the feed client
use crate::{
    cli::Args,
    formatter::OutputFormat,
    types::{Channel, Credential},
};
use anyhow::{Result, bail};
use std::time::Duration;
use url::Url;

/// Records retained by the feed unless configured otherwise.
pub const DEFAULT_FEED_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub websocket: WebSocketConfig,
    pub credential: Option<Credential>,
    pub feed: FeedConfig,
    pub metrics: MetricsConfig,
    pub health: HealthConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: Url,
    pub timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub max_reconnects: u32,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub capacity: usize,
    /// Channels to subscribe to. Empty means the whole table.
    pub channels: Vec<Channel>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FEED_CAPACITY,
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
    pub max_events: Option<u64>,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let url = Url::parse(&args.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            bail!("unsupported URL scheme '{}', expected ws or wss", url.scheme());
        }
        if args.capacity == 0 {
            bail!("feed capacity must be at least 1");
        }

        let channels = args
            .channels
            .iter()
            .map(|name| name.parse::<Channel>())
            .collect::<Result<Vec<_>, _>>()?;

        let reconnect_delay = Duration::from_millis(args.reconnect_delay_ms);
        let max_reconnect_delay =
            Duration::from_millis(args.max_reconnect_delay_ms).max(reconnect_delay);

        Ok(Config {
            websocket: WebSocketConfig {
                url,
                timeout: Duration::from_secs(args.timeout),
                reconnect_delay,
                max_reconnect_delay,
                max_reconnects: args.max_reconnects,
            },
            credential: Credential::from_optional(args.token.clone()),
            feed: FeedConfig {
                capacity: args.capacity,
                channels,
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            health: HealthConfig {
                check_interval: Duration::from_secs(args.health_check_interval.max(1)),
            },
            display: DisplayConfig {
                format: OutputFormat::from(args.format.as_str()),
                colored: !args.no_color,
                quiet: args.quiet,
                max_events: (args.max_events > 0).then_some(args.max_events),
            },
        })
    }
}
