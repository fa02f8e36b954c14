use deployserver::config::{DEFAULT_CONFIG_PATH, Settings, load_config};
use deployserver::logging::{FileLogger, setup_logging};
use deployserver::runner::ShellRunner;
use deployserver::{AppState, build_router};
use std::sync::Arc;
use tracing::{error, info};

/// Log the webhook set-up guide for the configured provider account
fn show_welcome_message(settings: &Settings) {
    info!("deployserver is ready to get requests from GitHub or Bitbucket.");
    info!("Set up a new webhook in the repository settings with:");
    info!("- Payload URL: {}", settings.webhook_url());
    info!("- Content type: application/json");
    info!("- Events: push (GitHub), repo:push and pullrequest:fulfilled (Bitbucket)");
    if settings.secret().is_some() {
        info!("- Secret: the configured secret_token");
    }
    if let Some(legacy) = &settings.legacy_rule {
        info!("Deploying {} with: {}", legacy.branch_ref, legacy.deploy_command);
    }
    for rule in &settings.rules {
        info!("Deploying {} with: {}", rule.matcher, rule.deploy_command);
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("DEPLOYSERVER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let settings = match load_config(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load '{}': {}", config_path, e);
            std::process::exit(1);
        }
    };

    let file_logger = settings.log_directory.as_ref().map(FileLogger::new);
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    show_welcome_message(&settings);

    let bind_address = settings.bind_address();
    let state = Arc::new(AppState::new(
        Arc::new(settings),
        Arc::new(ShellRunner::new()),
    ));
    let app = build_router(state);

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
