use pantry::{
    basic_models::{
        CategoryFilter, ErrorResponse, Health, LoginRequest, Recipe, RecipeDetail,
        RecipeForUpload, SessionInfo, SignupRequest,
    },
    editor::ValidationError,
    filter,
};
use reqwest::{multipart, Response, StatusCode};
use serde::de::DeserializeOwned;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with an error. `message` is what it said.
    #[error("{message} ({status})")]
    Server { status: StatusCode, message: String },
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid recipe document: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Not signed in")]
    NotSignedIn,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// An image to attach to a recipe: the original file name and its bytes.
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Talks to a pantry server over HTTP.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Reuse a session token from an earlier login
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> ClientResult<String> {
        let token = self.token.as_ref().ok_or(ClientError::NotSignedIn)?;
        Ok(format!("Bearer {token}"))
    }

    pub async fn health(&self) -> ClientResult<Health> {
        read_json(self.http.get(self.url("/health")).send().await?).await
    }

    pub async fn signup(&mut self, request: &SignupRequest) -> ClientResult<SessionInfo> {
        let response = self
            .http
            .post(self.url("/api/auth/signup"))
            .json(request)
            .send()
            .await?;
        let session: SessionInfo = read_json(response).await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Log in and keep the session token for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<SessionInfo> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest {
                email: email.into(),
                password: password.into(),
            })
            .send()
            .await?;
        let session: SessionInfo = read_json(response).await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Every recipe in the category, newest first.
    pub async fn list_recipes(&self, category: CategoryFilter) -> ClientResult<Vec<Recipe>> {
        let response = self
            .http
            .get(self.url("/api/recipes"))
            .query(&[("category", String::from(category))])
            .send()
            .await?;
        read_json(response).await
    }

    /// List by category, then narrow the result here with the free-text search.
    pub async fn search(&self, category: CategoryFilter, query: &str) -> ClientResult<Vec<Recipe>> {
        let recipes = self.list_recipes(category).await?;
        Ok(filter::retain_matching(recipes, query))
    }

    pub async fn get_recipe(&self, recipe_id: i64) -> ClientResult<RecipeDetail> {
        let mut request = self.http.get(self.url(&format!("/api/recipes/{recipe_id}")));
        if let Ok(bearer) = self.bearer() {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }
        read_json(request.send().await?).await
    }

    /// Validate locally, then submit the recipe with an optional image.
    pub async fn create_recipe(
        &self,
        upload: &RecipeForUpload,
        image: Option<ImageUpload>,
    ) -> ClientResult<Recipe> {
        upload.validate()?;
        let response = self
            .http
            .post(self.url("/api/recipes"))
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .multipart(submission_form(upload, image)?)
            .send()
            .await?;
        read_json(response).await
    }

    /// Replace a recipe you own. Set `upload.revision` to refuse overwriting someone else's edit.
    pub async fn update_recipe(
        &self,
        recipe_id: i64,
        upload: &RecipeForUpload,
        image: Option<ImageUpload>,
    ) -> ClientResult<Recipe> {
        upload.validate()?;
        let response = self
            .http
            .put(self.url(&format!("/api/recipes/{recipe_id}")))
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .multipart(submission_form(upload, image)?)
            .send()
            .await?;
        read_json(response).await
    }
}

fn submission_form(
    upload: &RecipeForUpload,
    image: Option<ImageUpload>,
) -> ClientResult<multipart::Form> {
    let mut form = multipart::Form::new().text("recipe", serde_json::to_string(upload)?);
    if let Some(image) = image {
        form = form.part(
            "image",
            multipart::Part::bytes(image.bytes).file_name(image.file_name),
        );
    }
    Ok(form)
}

/// Decode a success body, or turn the server's `{"error": ...}` into a `ClientError`.
async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    };
    tracing::debug!("Server returned {}: {}", status, message);
    Err(ClientError::Server { status, message })
}
