use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use qdesk_core::assistant::{AssistantBackend, IndexRecommendation, QuerySuggestion};
use qdesk_core::auth::{AuthBackend, AuthToken, Credentials, LoginResponse, NewAccount};
use qdesk_core::connection_manager::{
    ConnectAck, ConnectionBackend, ConnectionDescriptor, SampleDatabase,
};
use qdesk_core::error::BackendError;
use qdesk_core::query_library::{HistoryEntry, NewSavedQuery, QueryLibraryBackend, SavedQuery};
use qdesk_core::query_runner::{QueryBackend, QueryRequest, RunResponse};
use qdesk_core::schema_cache::{ErDiagram, SchemaBackend, SchemaSnapshot};
use qdesk_core::settings::Settings;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::wire::{
    ConnectResponseBody, ConnectionPayload, CreateDatabaseBody, DatabasesResponseBody,
    ErDiagramResponseBody, ErrorBody, ExplainResponseBody, HistoryEntryBody, LoginBody,
    LoginResponseBody, MessageBody, QueryBody, RecommendationsResponseBody, RegisterBody,
    RunRequestBody, RunResponseBody, SampleResponseBody, SaveQueryBody, SaveResponseBody,
    SavedQueryBody, SchemaResponseBody, SuggestBody, SuggestResponseBody,
};

pub const USER_AGENT: &str = concat!("qdesk/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("invalid API base URL `{url}`: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// JSON-over-HTTP implementation of every backend seam. Clones share the
/// connection pool and the bearer token slot.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: AuthToken,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        token: AuthToken,
        timeout: Option<Duration>,
    ) -> Result<Self, HttpBackendError> {
        let base_url = parse_base_url(base_url)?;

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(HttpBackendError::Client)?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_settings(settings: &Settings, token: AuthToken) -> Result<Self, HttpBackendError> {
        Self::new(&settings.api_url, token, settings.request_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|error| BackendError::transport(format!("invalid endpoint `{path}`: {error}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        let (_, body) = self.execute(self.client.get(url), path).await?;
        decode(path, &body)
    }

    async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let (_, body) = self.post_raw(path, payload).await?;
        decode(path, &body)
    }

    async fn post_raw<B>(&self, path: &str, payload: &B) -> Result<(u16, Vec<u8>), BackendError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        self.execute(self.client.post(url).json(payload), path).await
    }

    /// Sends the request and maps every non-2xx answer to a `BackendError`.
    /// Returns the status and raw body of successful responses.
    async fn execute(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<(u16, Vec<u8>), BackendError> {
        let request = match self.token.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!("sending request to `{path}`");
        let response = request
            .send()
            .await
            .map_err(|error| BackendError::transport(format!("request to `{path}` failed: {error}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| {
                BackendError::transport(format!("failed to read response from `{path}`: {error}"))
            })?
            .to_vec();
        debug!("`{path}` answered {status}");

        if status == StatusCode::UNAUTHORIZED && self.token.is_set() {
            warn!("bearer token rejected by `{path}`, clearing it");
            self.token.clear();
        }

        if status.is_success() {
            return Ok((status.as_u16(), body));
        }
        Err(error_from_response(status, &body))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, HttpBackendError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&normalized).map_err(|error| HttpBackendError::InvalidBaseUrl {
        url: raw.to_string(),
        message: error.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(HttpBackendError::InvalidBaseUrl {
            url: raw.to_string(),
            message: "URL cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

fn error_from_response(status: StatusCode, body: &[u8]) -> BackendError {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .map_or_else(
            || BackendError::transport(format!("API Error: {}", status.as_u16())),
            |message| BackendError::server(status.as_u16(), message),
        )
}

fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|error| {
        BackendError::transport(format!("unexpected response from `{path}`: {error}"))
    })
}

#[async_trait]
impl ConnectionBackend for HttpBackend {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<ConnectAck, BackendError> {
        let (status, body) = self
            .post_raw("connect/", &ConnectionPayload::from(descriptor))
            .await?;
        decode::<ConnectResponseBody>("connect/", &body)?.into_ack(status)
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        self.post_raw("disconnect/", &json!({})).await.map(|_| ())
    }

    async fn load_sample_database(&self) -> Result<SampleDatabase, BackendError> {
        let body: SampleResponseBody = self.post_json("load-sample-db/", &json!({})).await?;
        Ok(body.into())
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn run_query(&self, request: &QueryRequest) -> Result<RunResponse, BackendError> {
        let body: RunResponseBody = self
            .post_json("queries/run/", &RunRequestBody::from(request))
            .await?;
        Ok(body.into())
    }
}

#[async_trait]
impl SchemaBackend for HttpBackend {
    async fn fetch_schema(&self) -> Result<SchemaSnapshot, BackendError> {
        let body: SchemaResponseBody = self.get_json("schema/").await?;
        Ok(body.into())
    }

    async fn fetch_er_diagram(&self) -> Result<ErDiagram, BackendError> {
        let body: ErDiagramResponseBody = self.get_json("er-diagram/").await?;
        Ok(body.into())
    }
}

#[async_trait]
impl AssistantBackend for HttpBackend {
    async fn explain(&self, query: &str) -> Result<serde_json::Value, BackendError> {
        let body: ExplainResponseBody = self
            .post_json("queries/explain/", &QueryBody { query })
            .await?;
        Ok(body.plan)
    }

    async fn recommend_indexes(
        &self,
        query: &str,
    ) -> Result<Vec<IndexRecommendation>, BackendError> {
        let body: RecommendationsResponseBody = self
            .post_json("queries/recommend-indexes/", &QueryBody { query })
            .await?;
        Ok(body.recommendations.into_iter().map(Into::into).collect())
    }

    async fn suggest(&self, prompt: &str) -> Result<QuerySuggestion, BackendError> {
        let body: SuggestResponseBody = self
            .post_json(
                "ai/query_suggest/",
                &SuggestBody {
                    prompt,
                    query: prompt,
                },
            )
            .await?;
        Ok(body.into())
    }
}

#[async_trait]
impl QueryLibraryBackend for HttpBackend {
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, BackendError> {
        let body: Vec<HistoryEntryBody> = self.get_json("queries/history/").await?;
        Ok(body.into_iter().map(Into::into).collect())
    }

    async fn save_query(&self, query: &NewSavedQuery) -> Result<Option<i64>, BackendError> {
        let body: SaveResponseBody = self
            .post_json("queries/save/", &SaveQueryBody::from(query))
            .await?;
        Ok(body.id)
    }

    async fn fetch_saved_queries(&self) -> Result<Vec<SavedQuery>, BackendError> {
        let body: Vec<SavedQueryBody> = self.get_json("queries/saved/").await?;
        Ok(body.into_iter().map(Into::into).collect())
    }

    async fn list_databases(&self) -> Result<Vec<String>, BackendError> {
        let body: DatabasesResponseBody = self.get_json("databases/list/").await?;
        Ok(body.databases)
    }

    async fn create_database(&self, name: &str) -> Result<Option<String>, BackendError> {
        let body: MessageBody = self
            .post_json("databases/create/", &CreateDatabaseBody { name })
            .await?;
        Ok(body.into_message())
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError> {
        let (status, body) = self
            .post_raw(
                "auth/login/",
                &LoginBody {
                    username: &credentials.username,
                    password: &credentials.password,
                },
            )
            .await?;
        decode::<LoginResponseBody>("auth/login/", &body)?.into_login(status)
    }

    async fn register(&self, account: &NewAccount) -> Result<Option<String>, BackendError> {
        let body: MessageBody = self
            .post_json("auth/register/", &RegisterBody::from(account))
            .await?;
        Ok(body.into_message())
    }
}
