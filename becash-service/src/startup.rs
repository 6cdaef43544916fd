//! Application startup and lifecycle management.

use crate::config::{BecashConfig, SecurityConfig};
use crate::handlers::{
    cards, charges, goals, health, jobs, loyalty, me, statements, subscription, verification,
};
use crate::services::{
    init_metrics, CodeDelivery, Database, InMemoryVerificationStore, LogDelivery,
    RedisVerificationStore, VerificationService, VerificationStore,
};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware};
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BecashConfig,
    pub db: Arc<Database>,
    pub verification: VerificationService,
}

impl FromRef<AppState> for SecurityConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.security.clone()
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BecashConfig) -> Result<Self, AppError> {
        Self::build_internal(config, None).await
    }

    /// Build with a specific code delivery channel, so tests can read the codes sent.
    pub async fn build_with_delivery(
        config: BecashConfig,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, Some(delivery)).await
    }

    async fn build_internal(
        config: BecashConfig,
        delivery: Option<Arc<dyn CodeDelivery>>,
    ) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        // Verification store: Redis when configured, in-memory otherwise
        let store: Arc<dyn VerificationStore> = match &config.redis.url {
            Some(url) => {
                let store = RedisVerificationStore::new(url).await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to Redis");
                    AppError::InternalError(e)
                })?;
                tracing::info!("Redis verification store initialized");
                Arc::new(store)
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory verification store");
                Arc::new(InMemoryVerificationStore::new())
            }
        };
        let delivery = delivery.unwrap_or_else(|| Arc::new(LogDelivery));

        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
            verification: VerificationService::new(store, delivery),
        };

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "BeCash service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "becash-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(
            self.http_listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// All routes with the shared middleware stack.
pub fn build_router(state: AppState) -> Router {
    let security = &state.config.security;
    let verification_limiter = create_ip_rate_limiter(
        security.verification_rate_limit,
        security.verification_rate_window_seconds,
    );

    let verification_routes = Router::new()
        .route("/verification/phone/send", post(verification::send_code))
        .route("/verification/phone/verify", post(verification::verify_code))
        .layer(middleware::from_fn_with_state(
            verification_limiter,
            ip_rate_limit_middleware,
        ));

    let api_routes = Router::new()
        .route("/me", get(me::get_me).put(me::put_me))
        // Cards and statements
        .route("/cards", post(cards::create_card).get(cards::list_cards))
        .route(
            "/cards/:id",
            get(cards::get_card)
                .patch(cards::update_card)
                .delete(cards::delete_card),
        )
        .route("/cards/:id/statements", get(cards::list_card_statements))
        .route(
            "/cards/:id/statements/:month",
            get(cards::get_card_statement),
        )
        .route("/statements/:id", get(statements::get_statement))
        .route(
            "/statements/:id/payments",
            post(statements::pay_statement),
        )
        // Entries
        .route(
            "/charges",
            post(charges::create_charge).get(charges::list_charges),
        )
        .route("/charges/summary", get(charges::monthly_summary))
        .route(
            "/charges/:id",
            get(charges::get_charge)
                .patch(charges::update_charge)
                .delete(charges::delete_charge),
        )
        // Goals
        .route("/goals", post(goals::create_goal).get(goals::list_goals))
        .route(
            "/goals/:id",
            get(goals::get_goal)
                .patch(goals::update_goal)
                .delete(goals::delete_goal),
        )
        .route(
            "/goals/:id/contributions",
            post(goals::contribute).get(goals::list_contributions),
        )
        .route("/goals/:id/invites", post(goals::create_invite))
        .route("/invites/:token/accept", post(goals::accept_invite))
        .route(
            "/goals/:id/collaborators/:user_id",
            patch(goals::update_collaborator).delete(goals::remove_collaborator),
        )
        // Loyalty points
        .route("/cards/:id/points", get(loyalty::get_points))
        .route("/cards/:id/points/redeem", post(loyalty::redeem_points))
        .route("/cards/:id/points/adjust", post(loyalty::adjust_points))
        // Subscription
        .route("/subscription", get(subscription::get_subscription))
        .route(
            "/internal/subscriptions/:user_id",
            put(subscription::sync_subscription).delete(subscription::cancel_subscription),
        )
        // Scheduled jobs
        .route("/jobs/recurrences", post(jobs::replicate_recurrences))
        .route("/jobs/close-statements", post(jobs::close_statements));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .merge(api_routes)
        .merge(verification_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
