//! ServerBuilder for fluent API to build the HTTP server

use super::host::ServerHost;
use super::router::build_router;
use crate::config::MartConfig;
use crate::core::auth::{AuthProvider, HeaderAuthProvider};
use crate::core::events::EventBus;
use crate::core::service::{
    CartService, OrderStore, PaymentRecordStore, ProductCatalog, ProofUploader, UserDirectory,
};
use crate::orders::query::OrderQueryService;
use crate::orders::service::OrderLifecycleService;
use crate::storage::{LocalDiskUploader, StorageBackends};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for the order service
///
/// Anything not supplied falls back to the configuration: in-memory stores,
/// header-based identity, local-disk uploads and an event bus when
/// `events.enabled` is set.
///
/// # Example
///
/// ```ignore
/// let config = MartConfig::load()?;
/// let backends = StorageBackends::from_config(&config).await?;
///
/// ServerBuilder::new()
///     .with_config(config)
///     .with_backends(backends)
///     .serve("0.0.0.0:5000")
///     .await?;
/// ```
pub struct ServerBuilder {
    config: MartConfig,
    orders: Option<Arc<dyn OrderStore>>,
    payments: Option<Arc<dyn PaymentRecordStore>>,
    carts: Option<Arc<dyn CartService>>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    users: Option<Arc<dyn UserDirectory>>,
    auth: Option<Arc<dyn AuthProvider>>,
    uploader: Option<Arc<dyn ProofUploader>>,
    event_bus: Option<EventBus>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: MartConfig::default(),
            orders: None,
            payments: None,
            carts: None,
            catalog: None,
            users: None,
            auth: None,
            uploader: None,
            event_bus: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: MartConfig) -> Self {
        self.config = config;
        self
    }

    /// Use every service of a backend set
    pub fn with_backends(mut self, backends: StorageBackends) -> Self {
        self.orders = Some(backends.orders);
        self.payments = Some(backends.payments);
        self.carts = Some(backends.carts);
        self.catalog = backends.catalog;
        self.users = backends.users;
        self
    }

    pub fn with_order_store(mut self, store: impl OrderStore + 'static) -> Self {
        self.orders = Some(Arc::new(store));
        self
    }

    pub fn with_payment_store(mut self, store: impl PaymentRecordStore + 'static) -> Self {
        self.payments = Some(Arc::new(store));
        self
    }

    pub fn with_cart_service(mut self, carts: impl CartService + 'static) -> Self {
        self.carts = Some(Arc::new(carts));
        self
    }

    /// Check line-item sellers and decorate views with this catalog
    pub fn with_catalog(mut self, catalog: impl ProductCatalog + 'static) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    pub fn with_user_directory(mut self, users: impl UserDirectory + 'static) -> Self {
        self.users = Some(Arc::new(users));
        self
    }

    /// Replace the default `X-User-Id` / `X-User-Role` identity provider
    pub fn with_auth_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(provider));
        self
    }

    pub fn with_uploader(mut self, uploader: impl ProofUploader + 'static) -> Self {
        self.uploader = Some(Arc::new(uploader));
        self
    }

    /// Use this event bus instead of one built from `events.capacity`
    ///
    /// Handy for subscribing to order events from outside the HTTP layer.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for routes outside the order API, such as cart or product
    /// endpoints served by the same process.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(mut self) -> Result<ServerHost> {
        let config = self.config.clone().validated()?;
        let defaults = StorageBackends::in_memory(&config.orders.id_prefix);

        let orders = self.orders.take().unwrap_or(defaults.orders);
        let payments = self.payments.take().unwrap_or(defaults.payments);
        let carts = self.carts.take().unwrap_or(defaults.carts);

        let event_bus = match self.event_bus.take() {
            Some(bus) => Some(bus),
            None if config.events.enabled => Some(EventBus::new(config.events.capacity)),
            None => None,
        };

        let mut lifecycle = OrderLifecycleService::new(
            orders.clone(),
            payments.clone(),
            carts,
            config.orders.clone(),
        );
        let mut queries = OrderQueryService::new(
            orders,
            payments,
            config.orders.default_recent_limit,
            config.orders.max_list_limit,
        );
        if let Some(catalog) = self.catalog.take() {
            lifecycle = lifecycle.with_catalog(catalog.clone());
            queries = queries.with_catalog(catalog);
        }
        if let Some(users) = self.users.take() {
            queries = queries.with_users(users);
        }
        if let Some(bus) = &event_bus {
            lifecycle = lifecycle.with_events(bus.clone());
        }

        let uploader = self
            .uploader
            .take()
            .unwrap_or_else(|| Arc::new(LocalDiskUploader::from_config(&config.uploads)));
        let auth = self
            .auth
            .take()
            .unwrap_or_else(|| Arc::new(HeaderAuthProvider));

        Ok(ServerHost {
            config: Arc::new(config),
            lifecycle: Arc::new(lifecycle),
            queries: Arc::new(queries),
            auth,
            uploader,
            event_bus,
        })
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = self.build_host()?;
        Ok(build_router(&host, custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
