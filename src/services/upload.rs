// Listing image uploads stored on local disk

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{app_config::UploadConfig, utils::service_error::ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    /// Identify the format from the file signature
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageKind::Png)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageKind::Webp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Clone)]
pub struct UploadService {
    dir: PathBuf,
    max_bytes: usize,
    public_base_url: String,
}

impl UploadService {
    pub fn new(config: &UploadConfig, public_base_url: &str) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            max_bytes: config.max_bytes,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Declared type and file signature must agree on an accepted image format
    pub fn check_image(
        &self,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<ImageKind, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::ValidationError("File is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ServiceError::ValidationError(format!(
                "File exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let declared = content_type.and_then(ImageKind::from_content_type);
        match (declared, ImageKind::sniff(bytes)) {
            (Some(declared), Some(actual)) if declared == actual => Ok(actual),
            _ => Err(ServiceError::ValidationError(
                "Only JPEG, PNG and WebP images are accepted".to_string(),
            )),
        }
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store_image(
        &self,
        user_id: Uuid,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadResponse, ServiceError> {
        let kind = self.check_image(content_type, bytes)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            tracing::error!("Cannot create upload dir {:?}: {}", self.dir, e);
            ServiceError::InternalError
        })?;

        let file_name = format!("{}.{}", Uuid::new_v4().simple(), kind.extension());
        tokio::fs::write(self.dir.join(&file_name), bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to write upload {}: {}", file_name, e);
                ServiceError::InternalError
            })?;

        info!(%user_id, file = %file_name, "Image uploaded");

        Ok(UploadResponse {
            url: format!("{}/uploads/{}", self.public_base_url, file_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn service(dir: &str) -> UploadService {
        UploadService::new(
            &UploadConfig {
                dir: dir.to_string(),
                max_bytes: 16,
            },
            "http://localhost:8080/",
        )
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"GIF89a"), None);
    }

    #[test]
    fn test_declared_type_must_match_content() {
        let svc = service("uploads");
        assert_eq!(svc.check_image(Some("image/png"), PNG).unwrap(), ImageKind::Png);
        assert!(svc.check_image(Some("image/jpeg"), PNG).is_err());
        assert!(svc.check_image(Some("image/gif"), PNG).is_err());
        assert!(svc.check_image(None, PNG).is_err());
    }

    #[test]
    fn test_size_limit() {
        let svc = service("uploads");
        let mut big = PNG.to_vec();
        big.resize(17, 0);
        assert!(svc.check_image(Some("image/png"), &big).is_err());
        assert!(svc.check_image(Some("image/png"), &[]).is_err());
    }

    #[tokio::test]
    async fn test_store_writes_file_and_returns_url() {
        let dir = std::env::temp_dir().join(format!("uploads-{}", Uuid::new_v4()));
        let svc = service(dir.to_str().unwrap());

        let response = svc
            .store_image(Uuid::new_v4(), Some("image/png"), PNG)
            .await
            .unwrap();

        assert!(response.url.starts_with("http://localhost:8080/uploads/"));
        assert!(response.url.ends_with(".png"));

        let name = response.url.rsplit('/').next().unwrap();
        assert_eq!(std::fs::read(dir.join(name)).unwrap(), PNG);
        let _ = std::fs::remove_dir_all(dir);
    }
}
