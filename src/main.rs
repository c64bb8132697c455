use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vista_server::{
    config::Config,
    create_app, db,
    services::{auth, session},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)?;

    // Without a database there is nothing to serve; fail fast.
    if let Err(e) = db::migrate(&state.db).await {
        tracing::error!("❌ Could not initialize the database: {}", e);
        return Err(e.into());
    }

    tokio::fs::create_dir_all(&config.data_dir).await?;

    // Hash the decoy now so the first unknown-user login costs one bcrypt run.
    if !tokio::task::spawn_blocking(auth::prepare_decoy).await? {
        tracing::warn!("Decoy hash unavailable; unknown users are hashed per request");
    }

    match config.session_sweep_interval_secs {
        Some(secs) => {
            session::spawn_sweeper(state.db.clone(), secs);
            tracing::info!("✅ Expired-session sweep runs every {}s", secs);
        }
        None => tracing::info!("Expired-session sweep disabled"),
    }

    let app = create_app(state);

    tracing::info!("🚀 Server listening on http://{}", config.bind_addr);
    if config.require_tls {
        tracing::info!("🔒 Plaintext requests are rejected with 426");
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
