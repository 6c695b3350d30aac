// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, interaction, posts, tags},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public reads (posts, comments, tags) and auth endpoints.
/// * Author routes behind `auth_middleware`.
/// * Admin routes behind `auth_middleware` then `admin_middleware`.
/// * Global middleware (Trace, CORS) and shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/posts", get(posts::list_posts))
        .route("/api/posts/{id}", get(posts::get_post))
        .route("/api/posts/slug/{slug}", get(posts::get_post_by_slug))
        .route("/api/posts/{id}/comments", get(interaction::list_comments))
        .route("/api/tags", get(tags::list_tags));

    let author_routes = Router::new()
        .route("/api/posts", post(posts::create_post))
        .route(
            "/api/posts/{id}",
            put(posts::update_post).delete(posts::delete_post),
        )
        .route("/api/posts/{id}/comments", post(interaction::create_comment))
        .route("/api/posts/{id}/reaction", post(interaction::toggle_reaction))
        .route("/api/comments/{id}", delete(interaction::delete_comment))
        .route("/api/me/posts", get(posts::my_posts))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}",
            put(admin::update_user_role).delete(admin::delete_user),
        )
        .route("/api/admin/posts", get(admin::list_all_posts))
        .route("/api/admin/posts/{id}", delete(posts::delete_post))
        .route("/api/admin/tags", post(admin::create_tag))
        .route("/api/admin/tags/{id}", delete(admin::delete_tag))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(author_routes)
        .merge(admin_routes)
        // Global Middleware (outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
