use std::sync::Arc;

use dotenvy::dotenv;
use storefront_engine::config::Settings;
use storefront_engine::infrastructure::notifier::LogNotifier;
use storefront_engine::infrastructure::stripe::StripeGateway;
use storefront_engine::{build_server, create_pool, run_migrations, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env().expect("Invalid configuration");

    let pool = create_pool(&settings.database_url);
    run_migrations(&pool);

    let gateway = StripeGateway::new(&settings.stripe).expect("Failed to build the Stripe client");
    let notifier = LogNotifier::new(settings.admin_email.clone());

    let host = settings.host.clone();
    let port = settings.port;
    let state = AppState {
        pool,
        settings: Arc::new(settings),
        gateway: Arc::new(gateway),
        notifier: Arc::new(notifier),
    };

    log::info!("Starting server at http://{}:{}", host, port);

    build_server(state, &host, port)?.await
}
