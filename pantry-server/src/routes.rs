use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pantry::{
    basic_models::{
        CategoryFilter, Comment, CommentForUpload, Health, LikeSummary, ProfilePage, Recipe,
        RecipeDetail, RecipeForUpload,
    },
    filter,
};
use serde::Deserialize;

use crate::{
    auth::{
        self,
        session::{MaybeUser, UserSession},
        Authenticator,
    },
    cache::{CacheQuery, CacheValue, PantryCache},
    database::Database,
    errors::{WebError, WebResult},
    models::{self, UpdateOutcome},
    storage::{StorageClient, MAX_IMAGE_BYTES},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub storage: StorageClient,
    pub auth: Authenticator,
    pub cache: PantryCache,
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // `GET /health` goes to `health`
        .route("/health", get(health))
        .route("/api/auth/signup", post(auth::route::signup))
        .route("/api/auth/login", post(auth::route::login))
        .route("/api/auth/logout", post(auth::route::logout))
        .route("/api/auth/me", get(auth::route::me))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/:recipe_id", get(get_recipe).put(update_recipe))
        .route("/api/recipes/:recipe_id/likes", get(get_likes))
        .route("/api/recipes/:recipe_id/like", post(toggle_like))
        .route(
            "/api/recipes/:recipe_id/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/profiles/:profile_id", get(get_profile))
        // locally stored recipe images
        .route("/storage/*path", get(serve_storage))
        // room for one image plus the recipe document
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + (1 << 20)))
        .layer(
            tower_http::compression::CompressionLayer::new()
                .quality(tower_http::CompressionLevel::Fastest),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(db): State<Database>) -> WebResult<Json<Health>> {
    let profiles = models::count_profiles(&db)?;
    Ok(Json(Health {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        profiles,
    }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    category: CategoryFilter,
    #[serde(default)]
    search: String,
}

/// Fetch by category, then narrow with the free-text search.
async fn list_recipes(
    State(db): State<Database>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<Recipe>>> {
    let recipes = models::list_recipes(&db, query.category)
        .map_err(WebError::backend("Failed to load recipes."))?;
    Ok(Json(filter::retain_matching(recipes, &query.search)))
}

/// A recipe document and maybe an image, as sent on create and edit
struct Submission {
    upload: RecipeForUpload,
    image: Option<(String, Vec<u8>)>,
}

async fn read_submission(mut multipart: Multipart) -> WebResult<Submission> {
    let bad = |e: axum::extract::multipart::MultipartError| WebError::BadRequest(e.body_text());
    let mut upload = None;
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("recipe") => {
                let text = field.text().await.map_err(bad)?;
                let parsed: RecipeForUpload = serde_json::from_str(&text)
                    .map_err(|e| WebError::BadRequest(format!("Invalid recipe: {e}")))?;
                upload = Some(parsed);
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let bytes = field.bytes().await.map_err(bad)?;
                // browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    image = Some((file_name, bytes.to_vec()));
                }
            }
            _ => tracing::debug!("Ignoring multipart field {:?}", name),
        }
    }
    let upload = upload.ok_or_else(|| WebError::BadRequest("Missing recipe".into()))?;
    Ok(Submission { upload, image })
}

async fn upload_image(
    storage: &StorageClient,
    image: Option<(String, Vec<u8>)>,
) -> WebResult<Option<String>> {
    match image {
        Some((file_name, bytes)) => storage
            .upload_image(&file_name, bytes)
            .await
            .map(Some)
            .map_err(WebError::backend("Image upload failed.")),
        None => Ok(None),
    }
}

async fn create_recipe(
    State(state): State<AppState>,
    session: UserSession,
    multipart: Multipart,
) -> WebResult<(StatusCode, Json<Recipe>)> {
    let Submission { upload, image } = read_submission(multipart).await?;
    upload.validate()?;
    let image_url = upload_image(&state.storage, image)
        .await?
        .or_else(|| upload.image_url.clone());
    let recipe = models::insert_recipe(
        &state.db,
        session.profile.profile_id,
        &upload,
        image_url.as_deref(),
    )
    .map_err(WebError::backend("Failed to add recipe."))?;
    tracing::info!(
        recipe_id = recipe.recipe_id,
        owner_id = recipe.owner_id,
        "Added recipe"
    );
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<i64>,
    session: UserSession,
    multipart: Multipart,
) -> WebResult<Json<Recipe>> {
    let existing = models::get_recipe(&state.db, recipe_id)
        .map_err(WebError::backend("Failed to update recipe."))?
        .ok_or(WebError::NotFound)?;
    if existing.owner_id != session.profile.profile_id {
        return Err(WebError::Forbidden);
    }
    let Submission { upload, image } = read_submission(multipart).await?;
    upload.validate()?;
    let image_url = upload_image(&state.storage, image)
        .await?
        .or_else(|| upload.image_url.clone())
        .or(existing.image_url);
    match models::update_recipe(&state.db, recipe_id, &upload, image_url.as_deref())
        .map_err(WebError::backend("Failed to update recipe."))?
    {
        UpdateOutcome::Updated(recipe) => {
            tracing::info!(recipe_id, revision = recipe.revision, "Updated recipe");
            Ok(Json(recipe))
        }
        UpdateOutcome::Stale => Err(WebError::Conflict(
            "Recipe was changed by someone else.".into(),
        )),
    }
}

fn require_recipe(db: &Database, recipe_id: i64) -> WebResult<Recipe> {
    models::get_recipe(db, recipe_id)?.ok_or(WebError::NotFound)
}

async fn get_recipe(
    State(db): State<Database>,
    Path(recipe_id): Path<i64>,
    user: MaybeUser,
) -> WebResult<Json<RecipeDetail>> {
    let recipe = require_recipe(&db, recipe_id)?;
    let uploader = models::get_profile(&db, recipe.owner_id)?;
    let likes = models::like_summary(&db, recipe_id, user.profile_id())?;
    let can_edit = user.profile_id() == Some(recipe.owner_id);
    Ok(Json(RecipeDetail {
        recipe,
        uploader,
        likes,
        can_edit,
    }))
}

async fn get_likes(
    State(db): State<Database>,
    Path(recipe_id): Path<i64>,
    user: MaybeUser,
) -> WebResult<Json<LikeSummary>> {
    require_recipe(&db, recipe_id)?;
    Ok(Json(models::like_summary(
        &db,
        recipe_id,
        user.profile_id(),
    )?))
}

async fn toggle_like(
    State(db): State<Database>,
    Path(recipe_id): Path<i64>,
    session: UserSession,
) -> WebResult<Json<LikeSummary>> {
    require_recipe(&db, recipe_id)?;
    let profile_id = session.profile.profile_id;
    models::toggle_like(&db, recipe_id, profile_id)?;
    Ok(Json(models::like_summary(&db, recipe_id, Some(profile_id))?))
}

async fn list_comments(
    State(db): State<Database>,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<Vec<Comment>>> {
    require_recipe(&db, recipe_id)?;
    Ok(Json(models::list_comments(&db, recipe_id)?))
}

async fn add_comment(
    State(db): State<Database>,
    Path(recipe_id): Path<i64>,
    session: UserSession,
    Json(comment): Json<CommentForUpload>,
) -> WebResult<(StatusCode, Json<Comment>)> {
    let content = comment.content.trim();
    if content.is_empty() {
        return Err(WebError::BadRequest("Comment cannot be empty.".into()));
    }
    require_recipe(&db, recipe_id)?;
    let comment = models::add_comment(&db, recipe_id, session.profile.profile_id, content)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_profile(
    State(db): State<Database>,
    Path(profile_id): Path<i64>,
) -> WebResult<Json<ProfilePage>> {
    let profile = models::get_profile(&db, profile_id)?.ok_or(WebError::NotFound)?;
    let recipes = models::list_recipes_by_owner(&db, profile_id)?;
    Ok(Json(ProfilePage { profile, recipes }))
}

/// Serve images from the local storage backend, keeping recent ones in memory.
async fn serve_storage(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> WebResult<impl IntoResponse> {
    let key = CacheQuery::StoredImage {
        file_name: path.clone(),
    };
    let image = match state.cache.get_value_or_guard_async(&key).await {
        Ok(CacheValue::StoredImage { image }) => image,
        Err(guard) => {
            let bytes = state
                .storage
                .read_local(&path)
                .await?
                .ok_or(WebError::NotFound)?;
            let image = std::sync::Arc::new(bytes);
            guard
                .insert(CacheValue::StoredImage {
                    image: image.clone(),
                })
                .unwrap_or_default();
            image
        }
    };
    let content_type = match path.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    };
    Ok((
        [(header::CONTENT_TYPE, content_type)],
        image.as_ref().clone(),
    ))
}
