mod database;
mod fulfillment;
mod handlers;
mod middleware;
mod models;
mod response;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::env;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use dotenvy::dotenv;

use database::{create_database_pool, Database};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let app = create_router(db);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    log::info!("relieftrack server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn create_router(db: Database) -> Router {
    Router::new()
        // Auth
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/me", get(handlers::auth::me))
        // Reference data
        .route("/api/warehouses", get(handlers::catalog::list_warehouses))
        .route("/api/warehouses", post(handlers::catalog::create_warehouse))
        .route("/api/shelters", get(handlers::catalog::list_shelters))
        .route("/api/shelters", post(handlers::catalog::create_shelter))
        .route("/api/categories", get(handlers::catalog::list_categories))
        .route("/api/categories", post(handlers::catalog::create_category))
        // Items
        .route("/api/items", get(handlers::items::list_items))
        .route("/api/items", post(handlers::items::create_item))
        .route("/api/items/:id", get(handlers::items::get_item))
        .route("/api/items/:id", put(handlers::items::update_item))
        .route("/api/items/:id", delete(handlers::items::delete_item))
        // Stocks
        .route("/api/stocks", get(handlers::stocks::list_stocks))
        .route("/api/stocks", post(handlers::stocks::upsert_stock))
        .route("/api/inventory/bulk", post(handlers::inventory::bulk_import))
        // Supply requests
        .route("/api/requests", get(handlers::requests::list_requests))
        .route("/api/requests", post(handlers::requests::create_request))
        .route("/api/requests/:id", get(handlers::requests::get_request))
        .route("/api/requests/:id/approve", post(handlers::requests::approve_request))
        .route("/api/requests/:id/reject", post(handlers::requests::reject_request))
        // Notifications
        .route("/api/notifications", get(handlers::notifications::list_notifications))
        .route(
            "/api/notifications/:id/read",
            post(handlers::notifications::mark_notification_read),
        )
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024)), // 2MB
        )
        .with_state(db)
}
