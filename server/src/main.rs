use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use parley_server::config::{generate_config_template, Config};
use parley_server::delivery::push::{DisabledGateway, ExpoGateway, PushGateway};
use parley_server::{auth, db, routes, signaling, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Parley server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let push_config = config.push_config();
    let push: Arc<dyn PushGateway> = if push_config.enabled {
        tracing::info!(endpoint = %push_config.endpoint, "Push notifications enabled");
        Arc::new(ExpoGateway::new(&push_config)?)
    } else {
        tracing::info!("Push notifications disabled");
        Arc::new(DisabledGateway)
    };

    let app_state = state::AppState::new(db, jwt_secret, push, &config);

    signaling::expiry::spawn_expiry_sweeper(app_state.clone());

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
