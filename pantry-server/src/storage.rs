use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsError;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;

/// Uploads larger than this are refused outright.
pub const MAX_IMAGE_BYTES: usize = 20_000_000;

const MAX_NAME_ATTEMPTS: i64 = 100;

/// Where recipe images end up. Either way, the result of an upload is a public URL.
#[derive(Clone)]
pub enum StorageClient {
    Local {
        root: PathBuf,
        public_base_url: String,
    },
    Gcs {
        gcs_client: Client,
        bucket: String,
        prefix: String,
    },
}

impl StorageClient {
    pub async fn new(conf: &StorageConfig) -> Result<Self> {
        match conf {
            StorageConfig::Local {
                root,
                public_base_url,
            } => Self::local(root, public_base_url).await,
            StorageConfig::Gcs { bucket, prefix } => {
                let config = ClientConfig::default().with_auth().await?;
                Ok(Self::Gcs {
                    gcs_client: Client::new(config),
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                })
            }
        }
    }

    pub async fn local(root: impl AsRef<Path>, public_base_url: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Creating image directory {}", root.display()))?;
        Ok(Self::Local {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload a file under a fresh name and return its public URL.
    /// `None` means the name is already taken and nothing was written.
    async fn upload_file(&self, rel_path: &str, content: &[u8]) -> Result<Option<String>> {
        match self {
            StorageClient::Local {
                root,
                public_base_url,
            } => {
                let opened = tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(root.join(rel_path))
                    .await;
                let mut file = match opened {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                file.write_all(content).await?;
                file.flush().await?;
                Ok(Some(format!("{}/{}", public_base_url, rel_path)))
            }
            StorageClient::Gcs {
                gcs_client,
                bucket,
                prefix,
            } => {
                let gcs_path = format!("{}/{}", prefix, rel_path);
                let media = Media::new(gcs_path.clone());
                // Only create, never replace an existing object
                let request = UploadObjectRequest {
                    bucket: bucket.clone(),
                    if_generation_match: Some(0),
                    ..Default::default()
                };
                let uploaded = gcs_client
                    .upload_object(&request, content.to_vec(), &UploadType::Simple(media))
                    .await;
                match uploaded {
                    Ok(_) => Ok(Some(format!(
                        "https://storage.googleapis.com/{}/{}",
                        bucket, gcs_path
                    ))),
                    // 412: the generation precondition failed, so the name is taken
                    Err(GcsError::Response(e)) if e.code == 412 => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Upload an image for a recipe, named after the current time, and return its public URL.
    pub async fn upload_image(&self, original_name: &str, image: Vec<u8>) -> Result<String> {
        self.upload_image_at(chrono::Utc::now().timestamp_millis(), original_name, image)
            .await
    }

    /// Two uploads in the same millisecond would share a name, so step forward to a free one.
    async fn upload_image_at(
        &self,
        millis: i64,
        original_name: &str,
        image: Vec<u8>,
    ) -> Result<String> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = image_file_name(millis + attempt, original_name, &image)?;
            tracing::info!("Uploading image {} ({} bytes)", file_name, image.len());
            if let Some(url) = self.upload_file(&file_name, &image).await? {
                return Ok(url);
            }
            tracing::debug!("Image name {} is taken", file_name);
        }
        anyhow::bail!("No free image name near {}", millis)
    }

    /// Read back a locally stored image. Only the local backend serves its own files.
    pub async fn read_local(&self, rel_path: &str) -> Result<Option<Vec<u8>>> {
        let StorageClient::Local { root, .. } = self else {
            return Ok(None);
        };
        if !is_plain_file_name(rel_path) {
            return Ok(None);
        }
        match tokio::fs::read(root.join(rel_path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A name with no directory parts, so it cannot escape the storage root.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && !name.starts_with('.')
}

/// Check the upload and pick its stored name: `<millis>.<extension of the original name>`.
///
/// The bytes must decode as a known image format. If the original extension is unusable,
/// the extension of the detected format is used instead.
pub fn image_file_name(millis: i64, original_name: &str, bytes: &[u8]) -> Result<String> {
    anyhow::ensure!(!bytes.is_empty(), "Image is empty");
    anyhow::ensure!(bytes.len() < MAX_IMAGE_BYTES, "Image is too large");
    let format = image::guess_format(bytes).context("Upload is not a recognized image")?;
    let original_ext = original_name.rsplit('.').next().unwrap_or_default();
    let ext = if !original_ext.is_empty()
        && original_ext.len() <= 8
        && original_ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        original_ext
    } else {
        format.extensions_str().first().copied().unwrap_or("img")
    };
    Ok(format!("{}.{}", millis, ext))
}
