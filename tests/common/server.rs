//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases.

use super::constants::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use vitrina_seller_server::notifications::{
    DefaultFormatter, DeliveryOrchestrator, FullNotificationStore, SqliteNotificationStore,
};
use vitrina_seller_server::push::PushService;
use vitrina_seller_server::retry_queue::{RetryPolicy, RetryQueue};
use vitrina_seller_server::server::server::make_app;
use vitrina_seller_server::server::state::ServerState;
use vitrina_seller_server::server::websocket::ConnectionManager;
use vitrina_seller_server::server::{RequestsLoggingLevel, ServerConfig};

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up. The retry worker is not running, so a dispatch that misses
/// the realtime channel stays queued until the test inspects it.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Notification store for direct database access in tests
    pub notification_store: Arc<dyn FullNotificationStore>,

    /// Retry queue handle for inspecting scheduled jobs
    pub retry_queue: RetryQueue,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Creates temporary notification and retry queue databases
    /// 2. Binds to a random port (127.0.0.1:0)
    /// 3. Spawns the server in a background task
    /// 4. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Database creation fails
    /// - Port binding fails
    /// - Server doesn't become ready within timeout
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");

        let notification_store: Arc<dyn FullNotificationStore> = Arc::new(
            SqliteNotificationStore::new(temp_db_dir.path().join("notifications.db"))
                .expect("Failed to open notification store"),
        );
        let notification_store_for_test = notification_store.clone();

        let retry_queue = RetryQueue::open(
            temp_db_dir.path().join("retry_queue.db"),
            RetryPolicy::default(),
        );

        let connection_manager = Arc::new(ConnectionManager::new());
        let push_service = Arc::new(PushService::disabled(notification_store.clone()));

        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            notification_store.clone(),
            connection_manager.clone(),
            push_service,
            retry_queue.clone(),
            Arc::new(DefaultFormatter),
            Duration::from_secs(2),
            3,
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
            },
            start_time: Instant::now(),
            notification_store,
            ws_connection_manager: connection_manager,
            orchestrator,
            retry_queue: retry_queue.clone(),
            hash: "123456".to_string(),
        };

        let app = make_app(state);

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        // Wait for server to be ready
        let server = Self {
            base_url,
            port,
            notification_store: notification_store_for_test,
            retry_queue,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}
