//! Test helpers for integration tests
//!
//! Spawns the full gateway (socket route and HTTP surface) on an ephemeral
//! port with in-memory backends, and drives it over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use pulse_cache::MemoryStore;
use pulse_common::AppConfig;
use pulse_core::InMemoryDirectory;
use pulse_gateway::connection::ConnectionManager;
use pulse_gateway::{create_app, GatewayState};
use pulse_service::ServiceContextBuilder;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long a client waits for an expected event
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: GatewayState,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<MemoryStore>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server
    pub async fn start() -> Result<Self> {
        Self::start_with_directory(Arc::new(InMemoryDirectory::new())).await
    }

    /// Start a test server whose collaborators are `directory`
    pub async fn start_with_directory(directory: Arc<InMemoryDirectory>) -> Result<Self> {
        let config = test_config()?;
        let connection_manager = ConnectionManager::new_shared();
        let store = Arc::new(MemoryStore::new());

        let service_context = ServiceContextBuilder::new()
            .store(store.clone())
            .transport(connection_manager.clone())
            .collaborators(directory.clone())
            .presence_config(config.presence.clone())
            .mailbox_config(config.mailbox.clone())
            .call_config(config.calls.clone())
            .build()?;
        service_context.batcher().clone().spawn_flush(
            service_context.transport().clone(),
            config.presence.status_batch_interval(),
        );

        let state = GatewayState::new(service_context, connection_manager, config);
        let app = create_app(state.clone());

        // Bind to an ephemeral port
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            addr,
            client,
            state,
            directory,
            store,
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Socket URL for `user_id`; `None` leaves the identity off
    pub fn socket_url(&self, user_id: Option<&str>) -> String {
        match user_id {
            Some(user_id) => format!("ws://{}/socket?userId={user_id}", self.addr),
            None => format!("ws://{}/socket", self.addr),
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Open a socket as `user_id`
    pub async fn connect(&self, user_id: &str) -> Result<TestClient> {
        let (ws, _) = connect_async(self.socket_url(Some(user_id)))
            .await
            .with_context(|| format!("connect as {user_id}"))?;
        Ok(TestClient { ws })
    }

    /// Wait until `user_id` is listed online
    pub async fn wait_online(&self, user_id: &str, online: bool) -> Result<()> {
        let user = pulse_core::UserId::from(user_id);
        let presence = self.state.service_context().presence();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while presence.is_online(&user).await.unwrap_or(!online) != online {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .with_context(|| format!("{user_id} never became online={online}"))
    }

    /// Wait until the gateway holds `count` bindings
    pub async fn wait_connections(&self, count: usize) -> Result<()> {
        let manager = self.state.connection_manager();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while manager.connection_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .with_context(|| format!("gateway never held {count} connections"))
    }

    /// Wait until `user_id` has `count` queued entries
    pub async fn wait_mailbox(&self, user_id: &str, count: usize) -> Result<()> {
        let user = pulse_core::UserId::from(user_id);
        let mailbox = self.state.service_context().mailbox();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while mailbox.count(&user).await.unwrap_or_default() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .with_context(|| format!("mailbox of {user_id} never held {count} entries"))
    }
}

/// A connected socket client
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Send one `{event, data}` frame
    pub async fn emit(&mut self, event: &str, data: Value) -> Result<()> {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.ws.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Next event frame as `(event, data)`
    pub async fn next_event(&mut self) -> Result<(String, Value)> {
        loop {
            let message = tokio::time::timeout(EVENT_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for an event")?
                .context("socket closed")??;

            if let Message::Text(text) = message {
                let mut frame: Value = serde_json::from_str(&text)?;
                let event = frame["event"].as_str().unwrap_or_default().to_string();
                return Ok((event, frame["data"].take()));
            }
        }
    }

    /// Skip frames until `event` arrives and return its data
    pub async fn expect_event(&mut self, event: &str) -> Result<Value> {
        loop {
            let (name, data) = self.next_event().await?;
            if name == event {
                return Ok(data);
            }
        }
    }

    /// Close code sent by the server, skipping any event frames before it
    pub async fn expect_close(&mut self) -> Result<u16> {
        loop {
            let message = tokio::time::timeout(EVENT_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for close")?
                .context("socket closed without a close frame")??;
            if let Message::Close(frame) = message {
                return Ok(frame.map(|f| u16::from(f.code)).unwrap_or_default());
            }
        }
    }

    /// Send a raw frame
    pub async fn send_raw(&mut self, message: Message) -> Result<()> {
        self.ws.send(message).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Create a test configuration: defaults, no Redis and no database
pub fn test_config() -> Result<AppConfig> {
    AppConfig::from_lookup(|_| None).map_err(|e| anyhow::anyhow!("Config error: {e}"))
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(
    response: Response,
    expected_status: StatusCode,
) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(response.json().await?)
}
