use anyhow::{Context, Result};
use clap::Parser;
use pantry::editor::RecipeDraft;
use pantry_client::{CatalogClient, ImageUpload};

/// Add a recipe to the catalog from a YAML draft
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// YAML file with title, description, ingredients, instructions and category
    draft: String,
    /// A picture of the dish
    #[arg(short, long)]
    image: Option<String>,
    /// URL of the server to upload to
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,
    /// Dry run mode: check the draft but don't upload it
    #[arg(long)]
    dry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let yml = std::fs::read_to_string(&args.draft)
        .with_context(|| format!("Reading draft {}", args.draft))?;
    let draft: RecipeDraft = serde_yaml::from_str(&yml).context("Parsing draft")?;
    let upload = draft.validate()?;
    println!("Recipe upload: {:#?}", upload);

    if args.dry {
        println!("Dry run mode enabled, skipping upload");
        return Ok(());
    }

    let image = match &args.image {
        Some(path) => Some(ImageUpload {
            file_name: std::path::Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone()),
            bytes: std::fs::read(path).with_context(|| format!("Reading image {path}"))?,
        }),
        None => None,
    };

    let mut client = CatalogClient::new(&args.server);
    match dotenvy::var("PANTRY_TOKEN") {
        Ok(token) => client = client.with_token(token),
        Err(_) => {
            let email = dotenvy::var("PANTRY_EMAIL").context("PANTRY_EMAIL or PANTRY_TOKEN")?;
            let password = dotenvy::var("PANTRY_PASSWORD").context("PANTRY_PASSWORD")?;
            client.login(&email, &password).await?;
        }
    }
    let recipe = client.create_recipe(&upload, image).await?;
    tracing::info!("Recipe uploaded successfully");
    println!("Added recipe #{}: {}", recipe.recipe_id, recipe.title);
    Ok(())
}
