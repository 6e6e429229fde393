use anyhow::Result;
use clap::Parser;
use pantry::basic_models::CategoryFilter;
use pantry_client::CatalogClient;

/// List recipes from the catalog, newest first
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Only show recipes that mention this text
    query: Option<String>,
    /// Category to browse, or All
    #[arg(short, long, default_value = "All")]
    category: CategoryFilter,
    /// URL of the server
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let client = CatalogClient::new(&args.server);
    let recipes = client
        .search(args.category, args.query.as_deref().unwrap_or_default())
        .await?;

    if recipes.is_empty() {
        println!("No recipes found.");
        return Ok(());
    }
    for recipe in &recipes {
        let time = recipe
            .cooking_time
            .map(|minutes| format!(", {minutes} min"))
            .unwrap_or_default();
        println!(
            "#{:<5} {} [{}{}]",
            recipe.recipe_id, recipe.title, recipe.category, time
        );
        if let Some(description) = &recipe.description {
            println!("       {}", description);
        }
    }
    tracing::info!("Listed {} recipes", recipes.len());
    Ok(())
}
