use qdesk_core::assistant::{IndexRecommendation, QuerySuggestion};
use std::collections::BTreeMap;

use qdesk_core::auth::{LoginResponse, NewAccount, UserProfile};
use qdesk_core::connection_manager::{ConnectAck, ConnectionDescriptor, SampleDatabase};
use qdesk_core::error::BackendError;
use qdesk_core::query_library::{HistoryEntry, NewSavedQuery, SavedQuery};
use qdesk_core::query_runner::{QueryRequest, RawStatement, RunResponse};
use qdesk_core::role_guard::UserRole;
use qdesk_core::schema_cache::{ErDiagram, ErTable, SchemaSnapshot, TableSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortValue<'a> {
    Number(u16),
    Text(&'a str),
}

/// Connection object as the backend reads it. `db_type` is what `connect/`
/// expects, `type` is what the per-query override on `queries/run/` reads.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ConnectionPayload<'a> {
    pub db_type: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub database: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
}

impl<'a> From<&'a ConnectionDescriptor> for ConnectionPayload<'a> {
    fn from(descriptor: &'a ConnectionDescriptor) -> Self {
        let kind = descriptor.kind.as_str();
        Self {
            db_type: kind,
            kind,
            database: &descriptor.database,
            host: descriptor.host.as_deref(),
            port: descriptor.port.as_deref().map(|port| {
                port.trim()
                    .parse::<u16>()
                    .map_or(PortValue::Text(port), PortValue::Number)
            }),
            user: descriptor.user.as_deref(),
            password: descriptor.password.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunRequestBody<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionPayload<'a>>,
    pub explain: bool,
}

impl<'a> From<&'a QueryRequest> for RunRequestBody<'a> {
    fn from(request: &'a QueryRequest) -> Self {
        Self {
            query: &request.text,
            connection: request.connection.as_ref().map(ConnectionPayload::from),
            explain: request.explain,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryBody<'a> {
    pub query: &'a str,
}

/// The suggestion endpoint has read both `prompt` and `query` over time.
#[derive(Debug, Serialize)]
pub struct SuggestBody<'a> {
    pub prompt: &'a str,
    pub query: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LoginBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SaveQueryBody<'a> {
    pub title: &'a str,
    pub query: &'a str,
    pub is_public: bool,
}

/// The backend stores an empty string when no email is given.
#[derive(Debug, Serialize)]
pub struct RegisterBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
}

impl<'a> From<&'a NewAccount> for RegisterBody<'a> {
    fn from(account: &'a NewAccount) -> Self {
        Self {
            username: &account.username,
            password: &account.password,
            email: account.email.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateDatabaseBody<'a> {
    pub name: &'a str,
}

impl<'a> From<&'a NewSavedQuery> for SaveQueryBody<'a> {
    fn from(query: &'a NewSavedQuery) -> Self {
        Self {
            title: &query.title,
            query: &query.query,
            is_public: query.is_public,
        }
    }
}

/// Any of the keys the backend uses to carry a failure description.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        [self.error, self.message, self.detail]
            .into_iter()
            .flatten()
            .find_map(value_to_message)
    }
}

fn value_to_message(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => (!text.trim().is_empty()).then_some(text),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectResponseBody {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ConnectResponseBody {
    /// A 2xx answer still fails when it carries an `error` field.
    pub fn into_ack(self, status: u16) -> Result<ConnectAck, BackendError> {
        if let Some(error) = self.error.and_then(value_to_message) {
            return Err(BackendError::server(status, error));
        }
        Ok(ConnectAck {
            message: self.message.filter(|message| !message.trim().is_empty()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SampleResponseBody {
    #[serde(default)]
    pub path: Option<String>,
}

impl From<SampleResponseBody> for SampleDatabase {
    fn from(body: SampleResponseBody) -> Self {
        Self { path: body.path }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatementBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunResponseBody {
    #[serde(default)]
    pub results: Vec<StatementBody>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub explanation: Option<Value>,
}

impl From<RunResponseBody> for RunResponse {
    fn from(body: RunResponseBody) -> Self {
        Self {
            statements: body
                .results
                .into_iter()
                .map(|statement| RawStatement {
                    query: statement.query,
                    columns: statement.columns,
                    rows: statement.rows,
                    message: statement.message,
                })
                .collect(),
            explanation: body.explanation.filter(|plan| !plan.is_null()),
            execution_time_ms: body.execution_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ColumnBody {
    Name(String),
    Described { name: String },
}

impl ColumnBody {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Described { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TableBody {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnBody>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaResponseBody {
    #[serde(default)]
    pub tables: Vec<TableBody>,
}

impl From<SchemaResponseBody> for SchemaSnapshot {
    fn from(body: SchemaResponseBody) -> Self {
        Self {
            tables: body
                .tables
                .into_iter()
                .map(|table| TableSchema {
                    name: table.name,
                    columns: table.columns.into_iter().map(ColumnBody::into_name).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntryBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub execution_time: Option<f64>,
}

impl From<HistoryEntryBody> for HistoryEntry {
    fn from(body: HistoryEntryBody) -> Self {
        Self {
            query: body.query,
            timestamp: body.created_at.or(body.timestamp),
            execution_time_ms: body.execution_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SavedQueryBody {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<SavedQueryBody> for SavedQuery {
    fn from(body: SavedQueryBody) -> Self {
        Self {
            id: body.id,
            title: body.title,
            query: body.query,
            is_public: body.is_public,
            created_at: body.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveResponseBody {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabasesResponseBody {
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExplainResponseBody {
    #[serde(default)]
    pub plan: Value,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationBody {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
}

impl From<RecommendationBody> for IndexRecommendation {
    fn from(body: RecommendationBody) -> Self {
        Self {
            table: body.table,
            column: body.column,
            reason: body.reason,
            sql: body.sql,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsResponseBody {
    #[serde(default)]
    pub recommendations: Vec<RecommendationBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestResponseBody {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl From<SuggestResponseBody> for QuerySuggestion {
    fn from(body: SuggestResponseBody) -> Self {
        Self {
            sql: body.sql.or(body.sql_query).unwrap_or_default(),
            explanation: body.explanation,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponseBody {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: UserBody,
}

impl LoginResponseBody {
    /// Fails when neither `token` nor `access` carries a usable value.
    pub fn into_login(self, status: u16) -> Result<LoginResponse, BackendError> {
        let token = self
            .token
            .or(self.access)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| BackendError::server(status, "login response carried no token"))?;

        let role = self
            .user
            .role
            .as_deref()
            .map_or(UserRole::User, |role| role.parse().unwrap_or_default());
        Ok(LoginResponse {
            token,
            refresh: self.refresh,
            user: UserProfile {
                username: self.user.username,
                email: self.user.email.filter(|email| !email.is_empty()),
                role,
                id: self.user.id,
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub message: Option<Value>,
}

impl MessageBody {
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message.and_then(value_to_message)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ErTableBody {
    #[serde(default)]
    pub columns: Vec<ColumnBody>,
    #[serde(default)]
    pub relations: Vec<Value>,
}

/// Tables arrive keyed by name; they come out sorted by name.
#[derive(Debug, Default, Deserialize)]
pub struct ErDiagramResponseBody {
    #[serde(default)]
    pub tables: BTreeMap<String, ErTableBody>,
}

impl From<ErDiagramResponseBody> for ErDiagram {
    fn from(body: ErDiagramResponseBody) -> Self {
        Self {
            tables: body
                .tables
                .into_iter()
                .map(|(name, table)| ErTable {
                    name,
                    columns: table.columns.into_iter().map(ColumnBody::into_name).collect(),
                    relations: table.relations,
                })
                .collect(),
        }
    }
}
