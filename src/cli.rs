use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "disaster-feed",
    about = "live update feed for the disaster-response dashboard backend",
    version
)]
pub struct Args {
    /// WebSocket endpoint URL
    #[arg(short, long, default_value = "ws://localhost:5000/ws")]
    pub url: String,

    /// Bearer token presented when connecting
    #[arg(short, long, env = "DISASTER_FEED_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Number of recent events to retain
    #[arg(long, default_value = "50")]
    pub capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Connection timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Initial reconnection delay in milliseconds
    #[arg(long, default_value = "1000")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for the reconnection backoff in milliseconds
    #[arg(long, default_value = "30000")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_reconnects: u32,

    /// Health log interval in seconds
    #[arg(long, default_value = "30")]
    pub health_check_interval: u64,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - events only, no banner or status lines
    #[arg(long)]
    pub quiet: bool,

    /// Only subscribe to these channels (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub channels: Vec<String>,

    /// Stop after displaying this many events (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_events: u64,
}
