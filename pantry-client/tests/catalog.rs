use pantry::basic_models::{Category, CategoryFilter, RecipeForUpload, SignupRequest};
use pantry::editor::ValidationError;
use pantry_client::{CatalogClient, ClientError};
use pantry_server::{
    auth::Authenticator,
    cache::new_cache,
    config::AuthConfig,
    database::Database,
    routes::{router, AppState},
    storage::StorageClient,
};
use reqwest::StatusCode;

/// Run a real server on a free port, backed by a temporary directory.
async fn spawn_server() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let state = AppState {
        db: Database::connect(dir.path().join("pantry.db")).unwrap(),
        storage: StorageClient::local(dir.path().join("images"), &format!("{base_url}/storage"))
            .await
            .unwrap(),
        auth: Authenticator::new_from_config(&AuthConfig {
            min_password_length: 6,
            insecure_password_hashing: true,
        }),
        cache: new_cache(),
    };
    tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
    (dir, base_url)
}

fn upload(title: &str, category: Category, ingredients: &[&str]) -> RecipeForUpload {
    RecipeForUpload {
        title: title.into(),
        description: Some(format!("All about {title}")),
        ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
        instructions: vec!["Mix".into(), "Bake".into()],
        category: Some(category),
        cooking_time: Some(20),
        difficulty: None,
        image_url: None,
        revision: None,
    }
}

async fn signed_in(base_url: &str) -> CatalogClient {
    let mut client = CatalogClient::new(base_url);
    client
        .signup(&SignupRequest {
            email: "ada@example.com".into(),
            password: "hunter22".into(),
            username: "ada".into(),
            full_name: None,
        })
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn status_reports_health() {
    let (_dir, base_url) = spawn_server().await;
    let health = CatalogClient::new(&base_url).health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
    assert_eq!(health.profiles, 0);
}

#[tokio::test]
async fn browse_by_category_and_search() {
    let (_dir, base_url) = spawn_server().await;
    let client = signed_in(&base_url).await;
    client
        .create_recipe(&upload("Omelette", Category::Breakfast, &["3 eggs"]), None)
        .await
        .unwrap();
    client
        .create_recipe(&upload("Brownies", Category::Dessert, &["cocoa", "2 eggs"]), None)
        .await
        .unwrap();
    client
        .create_recipe(&upload("Sorbet", Category::Dessert, &["lemons"]), None)
        .await
        .unwrap();

    let titles = |recipes: Vec<pantry::basic_models::Recipe>| {
        recipes.into_iter().map(|r| r.title).collect::<Vec<_>>()
    };
    let all = client.list_recipes(CategoryFilter::All).await.unwrap();
    assert_eq!(titles(all), ["Sorbet", "Brownies", "Omelette"]);

    let desserts = client
        .list_recipes(CategoryFilter::Only(Category::Dessert))
        .await
        .unwrap();
    assert_eq!(titles(desserts), ["Sorbet", "Brownies"]);

    let eggy_desserts = client
        .search(CategoryFilter::Only(Category::Dessert), "Egg")
        .await
        .unwrap();
    assert_eq!(titles(eggy_desserts), ["Brownies"]);
}

#[tokio::test]
async fn invalid_recipes_never_reach_the_server() {
    let (_dir, base_url) = spawn_server().await;
    // not signed in either, but validation comes first
    let client = CatalogClient::new(&base_url);
    let err = client
        .create_recipe(&upload("", Category::Lunch, &[]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(ValidationError::MissingTitle)));

    let err = client
        .create_recipe(&upload("Soup", Category::Lunch, &["leeks"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotSignedIn));
}

#[tokio::test]
async fn stale_update_is_refused() {
    let (_dir, base_url) = spawn_server().await;
    let client = signed_in(&base_url).await;
    let recipe = client
        .create_recipe(&upload("Soup", Category::Lunch, &["leeks"]), None)
        .await
        .unwrap();

    let mut edit = upload("Leek soup", Category::Lunch, &["leeks", "potatoes"]);
    edit.revision = Some(recipe.revision);
    let updated = client
        .update_recipe(recipe.recipe_id, &edit, None)
        .await
        .unwrap();
    assert_eq!(updated.revision, recipe.revision + 1);

    let err = client
        .update_recipe(recipe.recipe_id, &edit, None)
        .await
        .unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(message, "Recipe was changed by someone else.");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let detail = client.get_recipe(recipe.recipe_id).await.unwrap();
    assert!(detail.can_edit);
    assert_eq!(detail.recipe.title, "Leek soup");
}
