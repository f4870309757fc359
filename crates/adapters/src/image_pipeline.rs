//! HTTP image pipeline - download to the work directory, shrink if too large

use archive_poster_domain::{ImageError, ImagePipeline, PreparedImage};
use async_trait::async_trait;
use image::{ImageFormat, ImageReader, imageops::FilterType};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Settings for [`HttpImagePipeline`]
#[derive(Debug, Clone)]
pub struct ImagePipelineConfig {
    /// Directory receiving downloaded and resized files
    pub work_dir: PathBuf,
    /// Files above this size are resized
    pub max_file_size_bytes: u64,
    pub target_width: u32,
    pub target_height: u32,
    pub timeout_secs: u64,
}

impl Default for ImagePipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("archive-poster"),
            max_file_size_bytes: 500 * 1024,
            target_width: 600,
            target_height: 600,
            timeout_secs: 60,
        }
    }
}

/// Image pipeline fetching over HTTP and resizing with the `image` crate
pub struct HttpImagePipeline {
    client: Client,
    config: ImagePipelineConfig,
}

impl HttpImagePipeline {
    pub fn new(config: ImagePipelineConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    /// Use an existing client (e.g. one carrying browser headers)
    pub fn with_client(client: Client, config: ImagePipelineConfig) -> Self {
        Self { client, config }
    }

    fn unique_path(&self, extension: &str) -> PathBuf {
        self.config
            .work_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension))
    }

    /// Stream `url` into `path`; the file is flushed and synced on success
    async fn download(&self, url: &str, path: &Path) -> Result<u64, ImageError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Download(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0_u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}

/// Fit `source` inside `width` x `height` (aspect preserved) and save it as JPEG at `target`
pub fn shrink_to_jpeg(
    source: &Path,
    target: &Path,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    // Downloads from extensionless URLs are named `.jpg`; trust the bytes over the name
    let image = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ImageError::Processing(e.to_string()))?;

    // `resize` keeps the aspect ratio; JPEG has no alpha channel
    let resized = image.resize(width, height, FilterType::Lanczos3).to_rgb8();
    resized
        .save_with_format(target, ImageFormat::Jpeg)
        .map_err(|e| ImageError::Processing(e.to_string()))
}

/// Extension of the image named by `url`, `jpg` when it does not look like an image
fn image_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let is_image = mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE);

    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|_| is_image)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "jpg".to_string())
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed image file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove image file")
            }
        }
    }
}

#[async_trait]
impl ImagePipeline for HttpImagePipeline {
    async fn prepare(&self, url: &str) -> Result<PreparedImage, ImageError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ImageError::MissingUrl);
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let original = self.unique_path(&image_extension(url));
        let mut created_files = vec![original.clone()];

        let size = match self.download(url, &original).await {
            Ok(size) => size,
            Err(e) => {
                remove_files(&created_files).await;
                return Err(e);
            }
        };
        tracing::info!(url = %url, bytes = size, path = %original.display(), "Downloaded image");

        if size <= self.config.max_file_size_bytes {
            return Ok(PreparedImage {
                path: original,
                created_files,
            });
        }

        let resized = self.unique_path("jpg");
        created_files.push(resized.clone());

        let (source, target) = (original.clone(), resized.clone());
        let (width, height) = (self.config.target_width, self.config.target_height);
        let result = tokio::task::spawn_blocking(move || {
            shrink_to_jpeg(&source, &target, width, height)
        })
        .await
        .map_err(|e| ImageError::Processing(e.to_string()))
        .and_then(|inner| inner);

        if let Err(e) = result {
            remove_files(&created_files).await;
            return Err(e);
        }

        tracing::info!(
            path = %resized.display(),
            width,
            height,
            "Image resized to fit within bounds"
        );

        Ok(PreparedImage {
            path: resized,
            created_files,
        })
    }

    async fn discard(&self, image: &PreparedImage) {
        remove_files(&image.created_files).await;
    }
}
