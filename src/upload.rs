//! Publishing primary images to an external host.
//!
//! Galleries whose front matter selects the `cloudinary` loader have every
//! primary output pushed to Cloudinary after it is written locally, and their
//! manifest URLs point at Cloudinary's resizing CDN instead of the local
//! derivatives.
//!
//! Uploads are signed: the request parameters are sorted, joined as
//! `key=value&...`, suffixed with the API secret and hashed with SHA-256.
//! The secret comes from `CLOUDINARY_API_SECRET` only, never from config.
//!
//! Publishing is all-or-nothing for a run: any upload failure stops it.

use crate::config::CloudinaryConfig;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Environment variable holding the Cloudinary API secret.
pub const SECRET_ENV: &str = "CLOUDINARY_API_SECRET";

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("cloudinary.{0} is not set in slideprep.toml")]
    MissingSetting(&'static str),
    #[error("{SECRET_ENV} is not set")]
    MissingSecret,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload of {file} rejected ({status}): {body}")]
    Rejected {
        file: String,
        status: u16,
        body: String,
    },
}

/// Destination for finished primary images.
pub trait UploadSink: Sync {
    /// Push one primary file for the gallery `slug`.
    fn upload(&self, file: &Path, slug: &str) -> Result<(), UploadError>;

    /// Public URL of `stem` resized to `width`, when the sink serves images.
    fn delivery_url(&self, slug: &str, stem: &str, width: u32) -> Option<String>;
}

/// Signed uploads to one Cloudinary account.
#[derive(Debug)]
pub struct CloudinaryUploader {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    api_base: String,
    client: reqwest::blocking::Client,
}

impl CloudinaryUploader {
    /// Build from config plus the secret in [`SECRET_ENV`].
    pub fn from_config(config: &CloudinaryConfig) -> Result<Self, UploadError> {
        let secret = std::env::var(SECRET_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(UploadError::MissingSecret)?;
        Self::new(config, secret)
    }

    pub fn new(config: &CloudinaryConfig, api_secret: String) -> Result<Self, UploadError> {
        let cloud_name = config
            .cloud_name
            .clone()
            .ok_or(UploadError::MissingSetting("cloud_name"))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(UploadError::MissingSetting("api_key"))?;
        Ok(Self {
            cloud_name,
            api_key,
            api_secret,
            folder: config.folder.clone().unwrap_or_default(),
            api_base: API_BASE.to_string(),
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    /// Point uploads at another API root.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Cloudinary folder of a gallery: `<folder>/<slug>`.
    pub fn gallery_folder(&self, slug: &str) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            slug.to_string()
        } else {
            format!("{folder}/{slug}")
        }
    }

    /// Parameters of an upload, sorted by name.
    fn signed_params(&self, slug: &str, public_id: &str, timestamp: u64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("folder", self.gallery_folder(slug)),
            ("overwrite", "true".to_string()),
            ("public_id", public_id.to_string()),
            ("tags", slug.to_string()),
            ("timestamp", timestamp.to_string()),
        ];
        params.sort_by_key(|(k, _)| *k);
        params
    }
}

/// `k1=v1&k2=v2...` over already-sorted parameters.
pub fn string_to_sign(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex SHA-256 of the string to sign followed by the secret.
pub fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl UploadSink for CloudinaryUploader {
    fn upload(&self, file: &Path, slug: &str) -> Result<(), UploadError> {
        let public_id = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let params = self.signed_params(slug, &public_id, timestamp);
        let signature = sign(&params, &self.api_secret);

        let mut form = reqwest::blocking::multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }
        let form = form.file("file", file)?;

        let url = format!("{}/{}/image/upload", self.api_base, self.cloud_name);
        tracing::debug!(file = %file.display(), url, "uploading");
        let response = self.client.post(&url).multipart(form).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                file: file.display().to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        let body: serde_json::Value = response.json()?;
        tracing::info!(
            file = %file.display(),
            url = body.get("secure_url").and_then(|u| u.as_str()).unwrap_or(""),
            "uploaded"
        );
        Ok(())
    }

    fn delivery_url(&self, slug: &str, stem: &str, width: u32) -> Option<String> {
        Some(format!(
            "{DELIVERY_BASE}/{}/image/upload/c_limit,w_{width}/{}/{stem}",
            self.cloud_name,
            self.gallery_folder(slug)
        ))
    }
}
