use crate::{
    connection::ConnectionState, error::FeedError, feed::EventFeed, manager::ConnectionManager,
    transport::Transport,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    net::SocketAddr,
    sync::{LazyLock, atomic::Ordering},
};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_messages_total"));
pub static EVENTS_RECORDED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_events_total"));
pub static EVICTIONS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_evictions_total"));
pub static DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_dropped_total"));
pub static UPDATES_DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_updates_dropped_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("disaster_feed_reconnects_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("disaster_feed_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "disaster-feed")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(()) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            MESSAGES_RECEIVED_COUNTER.absolute(0);
            EVENTS_RECORDED_COUNTER.absolute(0);
            EVICTIONS_COUNTER.absolute(0);
            DROPPED_COUNTER.absolute(0);
            UPDATES_DROPPED_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(FeedError::MetricsError(e.to_string()).into())
        }
    }
}

/// Point-in-time view of connection and feed health.
#[derive(Debug)]
pub struct HealthStatus {
    pub state: ConnectionState,
    pub retained: usize,
    pub capacity: usize,
    pub total_events: u64,
    pub reconnect_count: u64,
    pub last_event_time: Option<DateTime<Utc>>,
    pub uptime: chrono::Duration,
}

impl HealthStatus {
    pub fn collect<T: Transport>(
        manager: &ConnectionManager<T>,
        feed: &EventFeed,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            state: manager.state(),
            retained: feed.len(),
            capacity: feed.capacity(),
            total_events: feed.total_recorded(),
            reconnect_count: manager
                .connection()
                .map(|c| c.stats().reconnect_count.load(Ordering::Relaxed))
                .unwrap_or(0),
            last_event_time: feed.last_event_time(),
            uptime: Utc::now() - started_at,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy() { "healthy" } else { "unhealthy" },
            "connection": self.state,
            "retained": self.retained,
            "capacity": self.capacity,
            "total_events": self.total_events,
            "reconnect_count": self.reconnect_count,
            "last_event_time": self.last_event_time,
            "uptime_seconds": self.uptime.num_seconds(),
            "timestamp": Utc::now()
        })
    }
}
