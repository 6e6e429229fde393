use anyhow::Result;
use clap::Parser;
use pantry_client::CatalogClient;

/// Check that the server is up
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// URL of the server to check
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    println!("Checking {}...", args.server);
    match CatalogClient::new(&args.server).health().await {
        Ok(health) => {
            println!("Status: {}", health.status);
            println!("Version: {}", health.version);
            println!("Profiles: {}", health.profiles);
        }
        Err(e) => {
            eprintln!("\nServer is not healthy: {e}");
            if args.server.starts_with("https://localhost")
                || args.server.starts_with("https://127.0.0.1")
            {
                eprintln!("\nHint: Local dev servers typically use HTTP, not HTTPS.");
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
