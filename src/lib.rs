pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;
pub mod state;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::openapi::ApiDoc;
use handlers::{messages, orders, services, store, webhook};

pub use db::{create_pool, DbPool};
pub use state::AppState;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

/// Registers every route. Shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/store")
            .route("/cart", web::get().to(store::get_cart))
            .route("/cart/items/{product_id}", web::put().to(store::set_cart_item))
            .route("/cart/items/{product_id}", web::delete().to(store::remove_cart_item))
            .route("/checkout", web::post().to(store::checkout))
            .route("/complete.php", web::get().to(store::complete))
            .route("/webhook.php", web::post().to(webhook::receive))
            .route("/bookshelf", web::get().to(store::bookshelf))
            .route("/orders", web::get().to(orders::list_orders))
            .route("/orders/{id}", web::get().to(orders::get_order)),
    )
    .service(
        web::scope("/admin/orders")
            .route("/{id}/status", web::post().to(orders::advance_order))
            .route("/{id}/refund", web::post().to(orders::refund_order)),
    )
    .service(
        web::scope("/services")
            .route("/inquiries", web::post().to(services::submit_inquiry))
            .route("/guest/{token}", web::get().to(services::get_by_guest_token))
            .route("/payment/complete", web::get().to(services::payment_complete))
            .route("/transactions", web::get().to(services::list_transactions))
            .service(
                web::scope("/transactions/{id}")
                    .route("", web::get().to(services::get_transaction))
                    .route("/quotes", web::get().to(services::list_quotes))
                    .route("/quotes", web::post().to(services::send_quote))
                    .route("/quotes/current", web::get().to(services::current_quote))
                    .route("/quotes/drafts", web::post().to(services::save_quote_draft))
                    .route("/quotes/accept", web::post().to(services::accept_quote))
                    .route("/quotes/revision", web::post().to(services::request_quote_revision))
                    .route("/payment", web::post().to(services::begin_payment))
                    .route("/start", web::post().to(services::start_production))
                    .route("/deliver", web::post().to(services::deliver))
                    .route("/revision", web::post().to(services::request_revision))
                    .route("/complete", web::post().to(services::complete))
                    .route(
                        "/cancellation-policy",
                        web::get().to(services::cancellation_policy),
                    )
                    .route("/cancel", web::post().to(services::cancel))
                    .route("/refund", web::post().to(services::refund))
                    .route("/messages", web::get().to(messages::list_messages))
                    .route("/messages", web::post().to(messages::post_message))
                    .route("/messages/read", web::post().to(messages::mark_read))
                    .route("/messages/unread", web::get().to(messages::unread_count)),
            ),
    );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: AppState,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = ApiDoc::openapi();
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .configure(configure)
    })
    .bind((host.to_string(), port))?
    .run())
}
