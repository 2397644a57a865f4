use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::Result,
    models::GenerationRequest,
    pollinations::{ImageClient, PollinationsClient},
};

/// Source of encoded image bytes for one attempt. Implementations return
/// only bodies already known to be images; classification of transport and
/// content-type failures happens here.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn fetch(&self, request: &GenerationRequest, model: &str) -> Result<Bytes>;
}

#[async_trait]
impl ImageBackend for ImageClient {
    async fn fetch(&self, request: &GenerationRequest, model: &str) -> Result<Bytes> {
        let image = self
            .generate(&request.prompt, model, request.width, request.height)
            .await?;
        Ok(image.bytes)
    }
}

#[async_trait]
impl ImageBackend for PollinationsClient {
    async fn fetch(&self, request: &GenerationRequest, model: &str) -> Result<Bytes> {
        self.image().fetch(request, model).await
    }
}
