use habitrack_server::{map_routes, persist::SaveFile, settings::Settings, AppState};
use std::error::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // ── Settings & logging ─────────────────────────────────────
    let settings = Settings::load()?;

    // RUST_LOG wins over the settings file.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let default_tz = settings.timezone()?;

    // ── Boot the World ─────────────────────────────────────────
    let save_file = SaveFile::open(&settings.save_file)?;
    let mut world = save_file.load_world()?;

    if let Some(user_id) = settings.seed_user_id {
        let seeded = save_file.ensure_demo_tasks(&mut world, user_id)?;
        if seeded > 0 {
            tracing::info!(seeded, user_id, "seeded demo habits");
        }
    }

    tracing::info!(
        tasks = world.tasks.len(),
        logs = world.logs.len(),
        save_file = %settings.save_file.display(),
        timezone = %default_tz,
        "world loaded"
    );

    // ── Router ─────────────────────────────────────────────────
    let state = AppState::new(world, save_file, default_tz);
    let app = map_routes(state);

    // ── Start ──────────────────────────────────────────────────
    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
