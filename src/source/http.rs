//! HTTP screening sources.
//!
//! `ScreeningClient` wraps one reqwest client plus the demo API base URL.
//! The detail and list sources clone it, so every engine and the mutation
//! path share a connection pool.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::entities::{
    Screening, ScreeningListItem, ScreeningListQuery, ScreeningPatch, ScreeningQuery,
};
use crate::domain::error::FetchError;
use crate::infra::error::InfraError;
use crate::source::QuerySource;

/// Error body shape shared by every demo API failure response.
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    message: Option<String>,
}

#[derive(Clone)]
pub struct ScreeningClient {
    client: Client,
    base: Url,
}

impl ScreeningClient {
    pub fn new(site: &str) -> Result<Self, InfraError> {
        let base = Url::parse(site)
            .and_then(|url| url.join("/"))
            .map_err(|err| InfraError::configuration(format!("invalid site URL {site}: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build http client: {err}"))
            })?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("ricordo/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|err| FetchError::server(format!("invalid request path {path}: {err}")))
    }

    pub async fn get_screening(&self, id: u32) -> Result<Screening, FetchError> {
        let url = self.url(&format!("api/screenings/{id}"))?;
        let resp = send(self.client.get(url)).await?;
        decode(resp).await
    }

    pub async fn list_screenings(&self) -> Result<Vec<ScreeningListItem>, FetchError> {
        let url = self.url("api/screenings")?;
        let resp = send(self.client.get(url)).await?;
        decode(resp).await
    }

    /// Applies a partial update and returns the stored row as the server
    /// now holds it.
    pub async fn update(&self, id: u32, patch: &ScreeningPatch) -> Result<Screening, FetchError> {
        let url = self.url(&format!("api/screenings/{id}"))?;
        let resp = send(self.client.patch(url).json(patch)).await?;
        decode(resp).await
    }

    /// Asks the server to re-run its risk model for one screening.
    pub async fn rescreen(&self, id: u32) -> Result<Screening, FetchError> {
        let url = self.url(&format!("api/screenings/{id}/rescreen"))?;
        let resp = send(self.client.post(url)).await?;
        decode(resp).await
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Response, FetchError> {
    request
        .send()
        .await
        .map_err(|err| FetchError::server(format!("request failed: {err}")))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|err| FetchError::server(format!("invalid response body: {err}")));
    }

    let detail = match resp.json::<WireError>().await {
        Ok(body) => body.message.unwrap_or(body.error),
        Err(_) => format!("status {status}"),
    };
    if status == StatusCode::NOT_FOUND {
        Err(FetchError::not_found(detail))
    } else {
        Err(FetchError::server(detail))
    }
}

/// Detail source: one screening per cache key.
pub struct HttpScreeningSource {
    client: ScreeningClient,
}

impl HttpScreeningSource {
    pub fn new(client: ScreeningClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuerySource<ScreeningQuery, Screening> for HttpScreeningSource {
    async fn fetch(&self, args: &ScreeningQuery) -> Result<Screening, FetchError> {
        self.client.get_screening(args.id).await
    }
}

/// List source: the whole screening collection behind one cache key.
pub struct HttpScreeningListSource {
    client: ScreeningClient,
}

impl HttpScreeningListSource {
    pub fn new(client: ScreeningClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuerySource<ScreeningListQuery, Vec<ScreeningListItem>> for HttpScreeningListSource {
    async fn fetch(&self, _args: &ScreeningListQuery) -> Result<Vec<ScreeningListItem>, FetchError> {
        self.client.list_screenings().await
    }
}
