//! Mistral document OCR client: file upload, signed URLs and page extraction.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::OcrError;
use crate::models::{OcrConfig, OcrResponse};

/// Metadata of a file stored by the OCR service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    url: String,
}

pub struct OcrClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OcrClient {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(OcrError::MissingCredentials)?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, OcrError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ServerError { status, body });
        }
        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, OcrError> {
        response
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))
    }

    /// Upload a local document for OCR.
    pub async fn upload(&self, path: &Path) -> Result<UploadedFile, OcrError> {
        if !path.is_file() {
            return Err(OcrError::FileNotFound(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let content = tokio::fs::read(path).await?;
        let size = content.len();

        let form = Form::new()
            .text("purpose", "ocr")
            .part("file", Part::bytes(content).file_name(file_name.clone()));

        let response = self
            .send(self.client.post(self.url("files")).multipart(form))
            .await?;
        let uploaded: UploadedFile = Self::decode(response).await?;

        tracing::info!(file_id = %uploaded.id, file = %file_name, bytes = size, "uploaded document");
        Ok(uploaded)
    }

    pub async fn retrieve(&self, file_id: &str) -> Result<UploadedFile, OcrError> {
        let response = self
            .send(self.client.get(self.url(&format!("files/{}", file_id))))
            .await?;
        Self::decode(response).await
    }

    /// Temporary URL the OCR endpoint can read the uploaded file from.
    pub async fn signed_url(&self, file_id: &str) -> Result<String, OcrError> {
        let response = self
            .send(self.client.get(self.url(&format!("files/{}/url", file_id))))
            .await?;
        let signed: SignedUrl = Self::decode(response).await?;
        Ok(signed.url)
    }

    /// Run OCR on a document URL, with page images inlined as base64.
    pub async fn process(&self, document_url: &str) -> Result<OcrResponse, OcrError> {
        let body = json!({
            "model": self.model,
            "document": {
                "type": "document_url",
                "document_url": document_url,
            },
            "include_image_base64": true,
        });

        let response = self
            .send(self.client.post(self.url("ocr")).json(&body))
            .await?;
        let result: OcrResponse = Self::decode(response).await?;

        tracing::info!(
            pages = result.pages.len(),
            model = %result.model,
            "OCR completed"
        );
        Ok(result)
    }

    /// OCR an already uploaded file.
    pub async fn process_file(&self, file_id: &str) -> Result<OcrResponse, OcrError> {
        let url = self.signed_url(file_id).await?;
        self.process(&url).await
    }
}
