/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use towclub_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = towclub_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, routes};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use towclub_shared::{auth::middleware::create_jwt_middleware, billing::PriceList};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Club prices used for bills
    pub fn prices(&self) -> &PriceList {
        &self.config.prices
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                                  # public
/// └── /v1/
///     ├── /auth/{register,login,refresh}       # public
///     ├── /pilots/me
///     ├── /pilots/:id/roles                    # PUT
///     ├── /trainings                           # GET list, POST create
///     │   └── /:id                             # GET, PUT, DELETE
///     │       ├── POST /select
///     │       ├── POST /signups
///     │       └── POST /report
///     ├── /signups/:id                         # PUT, POST /cancel
///     ├── /reports/:id                         # GET, PUT
///     │   ├── POST /runs
///     │   ├── GET  /signups/:signup_id/bill
///     │   ├── POST /bills
///     │   ├── POST /purchases
///     │   ├── POST /expenses
///     │   └── POST /absorptions
///     └── DELETE /{bills,purchases,expenses,absorptions}/:id
/// ```
///
/// Everything except `/health` and `/v1/auth` requires a bearer access
/// token. Organizer checks happen in the handlers.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let protected_routes = Router::new()
        .route("/pilots/me", get(routes::pilots::me))
        .route("/pilots/:id/roles", put(routes::pilots::update_roles))
        .route(
            "/trainings",
            get(routes::trainings::list_trainings).post(routes::trainings::create_training),
        )
        .route(
            "/trainings/:id",
            get(routes::trainings::get_training)
                .put(routes::trainings::update_training)
                .delete(routes::trainings::delete_training),
        )
        .route("/trainings/:id/select", post(routes::trainings::run_selection))
        .route("/trainings/:id/signups", post(routes::signups::create_signup))
        .route("/trainings/:id/report", post(routes::reports::create_report))
        .route("/signups/:id", put(routes::signups::update_signup))
        .route("/signups/:id/cancel", post(routes::signups::cancel_signup))
        .route(
            "/reports/:id",
            get(routes::reports::get_report).put(routes::reports::update_report),
        )
        .route("/reports/:id/runs", post(routes::reports::record_runs))
        .route(
            "/reports/:id/signups/:signup_id/bill",
            get(routes::bills::preview_bill),
        )
        .route("/reports/:id/bills", post(routes::bills::create_bill))
        .route("/bills/:id", delete(routes::bills::delete_bill))
        .route("/reports/:id/purchases", post(routes::purchases::create_purchase))
        .route("/purchases/:id", delete(routes::purchases::delete_purchase))
        .route("/reports/:id/expenses", post(routes::expenses::create_expense))
        .route("/expenses/:id", delete(routes::expenses::delete_expense))
        .route(
            "/reports/:id/absorptions",
            post(routes::expenses::create_absorption),
        )
        .route(
            "/absorptions/:id",
            delete(routes::expenses::delete_absorption),
        )
        .layer(middleware::from_fn(create_jwt_middleware(
            state.jwt_secret(),
        )));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
