use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::database::UserRepository;
use crate::handlers;
use crate::middleware::jwt_auth_middleware;
use crate::services::UserService;

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(config: &AppConfig, repo: Arc<dyn UserRepository>) -> Self {
        Self {
            users: Arc::new(UserService::new(repo, config.security.bcrypt_cost)),
            tokens: Arc::new(TokenService::new(&config.security)),
        }
    }
}

pub fn app(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health::health))
        .merge(public_routes())
        .merge(protected_routes(&state))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    use handlers::{auth, users};

    Router::new()
        .route("/users", post(users::create).get(users::list))
        .route("/login", post(auth::login))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    use handlers::users;

    Router::new()
        .route(
            "/users/:id",
            get(users::get).patch(users::patch).delete(users::delete),
        )
        .route_layer(from_fn_with_state(state.tokens.clone(), jwt_auth_middleware))
}
