use async_trait::async_trait;
use reqwest::{Method, Request, RequestBuilder, Response};

/// Seam between the feed retrieval helpers and the HTTP stack.
#[async_trait]
pub trait HttpClient: Send + Sync {
    fn request(&self, method: Method, url: &str) -> RequestBuilder;

    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
