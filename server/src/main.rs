use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use chat_server::auth;
use chat_server::config::{generate_config_template, Config};
use chat_server::db::{self, ChatStore, SqliteStore};
use chat_server::routes;
use chat_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("chat_server=info"))?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Chat server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;
    let store = SqliteStore::new(db);

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Handle --issue-token: print a token for an existing user and exit
    if let Some(user_id) = config.issue_token {
        let profile = store
            .fetch_profile(user_id)?
            .ok_or_else(|| format!("user {} not found", user_id))?;
        let token =
            auth::jwt::issue_access_token(&jwt_secret, user_id, Some(&profile), config.token_ttl_secs)?;
        println!("{}", token);
        return Ok(());
    }

    // Build application state
    let mut app_state = AppState::new(Arc::new(store), jwt_secret);
    app_state.allow_query_token = config.allow_query_token;
    if !config.allow_query_token {
        tracing::info!("Query-string tokens disabled; clients must send an Authorization header");
    }

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
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
