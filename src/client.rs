// file: src/client.rs
// description: WebSocket transport driving a connection, with reconnect backoff

use crate::{
    config::WebSocketConfig,
    connection::{Connection, ConnectionState},
    error::FeedError,
    monitoring::RECONNECT_COUNTER,
    transport::{Transport, TransportTask},
    types::Credential,
};
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, error, info, trace, warn};

/// Opens an authenticated WebSocket per connection and keeps it alive.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

impl Transport for WebSocketTransport {
    fn establish(
        &self,
        connection: Arc<Connection>,
        credential: &Credential,
    ) -> Result<TransportTask, FeedError> {
        let bearer = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| FeedError::InvalidCredential(e.to_string()))?;
        let session = WebSocketSession {
            config: self.config.clone(),
            bearer,
            connection,
        };
        // Surface a bad URL now rather than inside the retry loop.
        session.handshake_request()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;
        Ok(TransportTask::spawned(runtime.spawn(session.run())))
    }
}

struct WebSocketSession {
    config: WebSocketConfig,
    bearer: HeaderValue,
    connection: Arc<Connection>,
}

impl WebSocketSession {
    fn handshake_request(&self) -> Result<Request, FeedError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.bearer.clone());
        Ok(request)
    }

    async fn run(self) {
        let connection_id = self.connection.id();
        let mut attempt: u32 = 0;

        loop {
            match self.connect_and_pump(&mut attempt).await {
                Ok(()) => info!(%connection_id, "WebSocket stream ended"),
                Err(e) => warn!(%connection_id, "Connection error: {}", e),
            }

            self.connection.set_state(ConnectionState::Disconnected);
            if self.connection.is_released() {
                break;
            }

            attempt = attempt.saturating_add(1);
            let delay = match backoff_delay(&self.config, attempt) {
                Ok(delay) => delay,
                Err(e) => {
                    error!(
                        %connection_id,
                        "{} ({} attempts), giving up",
                        e,
                        self.config.max_reconnects
                    );
                    break;
                }
            };

            self.connection.stats().record_reconnect();
            RECONNECT_COUNTER.increment(1);
            warn!(
                %connection_id,
                "Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                attempt
            );
            sleep(delay).await;
        }
    }

    async fn connect_and_pump(&self, attempt: &mut u32) -> Result<(), FeedError> {
        let request = self.handshake_request()?;

        debug!("Connecting to {}", self.config.url);
        let (mut ws_stream, _) = timeout(self.config.timeout, connect_async(request))
            .await
            .map_err(|_| FeedError::Timeout)??;

        info!("WebSocket connection established to {}", self.config.url);
        *attempt = 0;
        self.connection.set_state(ConnectionState::Connected);

        while let Some(message) = ws_stream.next().await {
            self.handle_message(message?)?;
        }
        Ok(())
    }

    fn handle_message(&self, message: Message) -> Result<(), FeedError> {
        match message {
            Message::Text(text) => {
                trace!("Received text message: {}", text.as_str());
                self.connection.dispatch(text.as_str());
            }
            Message::Binary(data) => {
                debug!("Received binary message of {} bytes", data.len());
                warn!("Binary messages not supported, dropping");
            }
            Message::Ping(_) => {
                // tungstenite queues the pong itself
                debug!("Received ping");
            }
            Message::Pong(_) => {
                debug!("Received pong");
            }
            Message::Close(frame) => {
                warn!("Received close frame: {:?}", frame);
                return Err(FeedError::ConnectionClosed);
            }
            Message::Frame(_) => {
                debug!("Received raw frame");
            }
        }
        Ok(())
    }
}

/// Delay before reconnect attempt `attempt` (1-based): exponential from
/// `reconnect_delay`, capped at `max_reconnect_delay`, plus up to 25% jitter.
pub fn backoff_delay(config: &WebSocketConfig, attempt: u32) -> Result<Duration, FeedError> {
    if config.max_reconnects > 0 && attempt > config.max_reconnects {
        return Err(FeedError::MaxReconnectsExceeded);
    }

    let exponent = attempt.saturating_sub(1).min(16);
    let base = config
        .reconnect_delay
        .saturating_mul(1u32 << exponent)
        .min(config.max_reconnect_delay);
    let spread = u64::try_from(base.as_millis()).unwrap_or(u64::MAX) / 4;

    Ok(base + Duration::from_millis(fastrand::u64(0..=spread)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::state_signal;
    use url::Url;

    fn config(max_reconnects: u32) -> WebSocketConfig {
        WebSocketConfig {
            url: Url::parse("ws://127.0.0.1:9/ws").unwrap(),
            timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_millis(1_000),
            max_reconnects,
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let config = config(0);
        let first = backoff_delay(&config, 1).unwrap();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let third = backoff_delay(&config, 3).unwrap();
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));

        let capped = backoff_delay(&config, 30).unwrap();
        assert!(capped >= Duration::from_millis(1_000) && capped <= Duration::from_millis(1_250));
    }

    #[test]
    fn backoff_stops_after_max_reconnects() {
        let config = config(2);
        assert!(backoff_delay(&config, 2).is_ok());
        assert!(matches!(
            backoff_delay(&config, 3),
            Err(FeedError::MaxReconnectsExceeded)
        ));
    }

    #[test]
    fn handshake_carries_bearer_token() {
        let session = WebSocketSession {
            config: config(0),
            bearer: HeaderValue::from_str(&Credential::new("tok").bearer()).unwrap(),
            connection: Connection::new(state_signal()),
        };
        let request = session.handshake_request().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok");
        assert_eq!(request.uri(), "ws://127.0.0.1:9/ws");
    }

    #[test]
    fn rejects_credentials_that_cannot_be_headers() {
        let transport = WebSocketTransport::new(config(0));
        let result = transport.establish(
            Connection::new(state_signal()),
            &Credential::new("bad\ntoken"),
        );
        assert!(matches!(result, Err(FeedError::InvalidCredential(_))));
    }

    #[test]
    fn establish_needs_a_runtime() {
        let transport = WebSocketTransport::new(config(0));
        let result = transport.establish(Connection::new(state_signal()), &Credential::new("t"));
        assert!(matches!(result, Err(FeedError::NoRuntime)));
    }
}
