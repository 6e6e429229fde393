use anyhow::{Context, Result};
use clap::Parser;
use pantry_server::{
    auth::{session::log_auth_events, Authenticator},
    cache::new_cache,
    config::Config,
    database::Database,
    routes::{router, AppState},
    storage::StorageClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the YAML configuration file
    #[clap(long, default_value = "config.yml")]
    config: String,

    /// Override the address and port to bind to
    #[clap(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Parse command line arguments
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Loading configuration from {}", args.config))?;

    // initialize tracing
    let log_dir = match &config.server.log_dir {
        Some(dir) => std::path::PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let file_appender = tracing_appender::rolling::daily(log_dir, "access.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // connect to the database
    let db = Database::connect_with_config(&config.database).context("Connecting to database")?;
    let storage = StorageClient::new(&config.storage)
        .await
        .context("Connecting to image storage")?;
    let auth = Authenticator::new_from_config(&config.auth)
        .with_secure_cookies(config.server.tls.is_some());
    // log sign-ins and sign-outs in the background
    tokio::spawn(log_auth_events(auth.sessions.subscribe()));

    let app = router(AppState {
        db,
        storage,
        auth,
        cache: new_cache(),
    });

    let address = args.address.unwrap_or(config.server.address);
    // In development, use HTTP. In production, use HTTPS.
    if let Some(tls) = &config.server.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = address.parse()?;
        tracing::info!("Listening on {}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("Listening on {}", address);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
