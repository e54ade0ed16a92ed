use super::{ContentStream, DriveProvider, ProviderError};
use crate::models::FileMetadata;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, header};
use url::Url;

pub struct GoogleDriveProvider {
    http: Client,
    api_base: Url,
}

impl GoogleDriveProvider {
    pub fn new(http: Client, api_base: Url) -> Self {
        Self { http, api_base }
    }

    /// `<api_base>/files/<file_id>`, with the id encoded as a single path segment.
    fn file_url(&self, file_id: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files").push(file_id);
        }
        url
    }

    async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .ok()
            .filter(|body| !body.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
        Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn into_stream(response: Response) -> ContentStream {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        ContentStream {
            content_type,
            body: response.bytes_stream().map_err(ProviderError::from).boxed(),
        }
    }
}

#[async_trait]
impl DriveProvider for GoogleDriveProvider {
    fn provider_id(&self) -> &'static str {
        "google"
    }

    async fn get_metadata(
        &self, access_token: &str, file_id: &str,
    ) -> Result<FileMetadata, ProviderError> {
        let request = self.http.get(self.file_url(file_id)).bearer_auth(access_token);
        let response = Self::send(request).await?;
        Ok(response.json::<FileMetadata>().await?)
    }

    async fn get_content(
        &self, access_token: &str, file_id: &str,
    ) -> Result<ContentStream, ProviderError> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .query(&[("alt", "media")])
            .bearer_auth(access_token);
        Ok(Self::into_stream(Self::send(request).await?))
    }

    async fn get_export(
        &self, access_token: &str, file_id: &str, mime_type: &str,
    ) -> Result<ContentStream, ProviderError> {
        let mut url = self.file_url(file_id);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("export");
        }
        let request = self
            .http
            .get(url)
            .query(&[("mimeType", mime_type)])
            .bearer_auth(access_token);
        Ok(Self::into_stream(Self::send(request).await?))
    }
}
