#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use sea_orm::{EntityTrait, PaginatorTrait};
use stockpulse::{
    config::{self, investments::load_catalog},
    core::seed::seed_investments,
    entities::{Investment, Portfolio, User},
    errors::Result,
    store::Store,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;

    // 4. Open the store (capability check, connect, ensure schema)
    let store = Store::open(&app_config)
        .await
        .inspect(|_| info!("Store opened successfully."))
        .inspect_err(|e| error!("Failed to open store: {}", e))?;

    // 5. Seed the investment catalog when one is configured
    if let Some(seed_file) = &app_config.seed_file {
        let catalog = load_catalog(seed_file)?;
        seed_investments(store.connection(), &catalog)
            .await
            .inspect_err(|e| error!("Failed to seed investments: {}", e))?;
    }

    // 6. Report what the store holds
    let db = store.connection();
    let users = User::find().count(db).await?;
    let investments = Investment::find().count(db).await?;
    let portfolios = Portfolio::find().count(db).await?;
    info!(users, investments, portfolios, "Store ready.");

    store.close().await
}
