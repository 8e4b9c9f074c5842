use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::error::{BackendError, ValidationError};

const LOOPBACK_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "[::1]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    Sqlite,
    Mysql,
    Postgresql,
}

impl DatabaseKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
        }
    }

    #[must_use]
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    #[must_use]
    pub fn default_port(self) -> Option<&'static str> {
        match self {
            Self::Sqlite => None,
            Self::Mysql => Some("3306"),
            Self::Postgresql => Some("5432"),
        }
    }

    #[must_use]
    pub fn default_user(self) -> Option<&'static str> {
        match self {
            Self::Sqlite => None,
            Self::Mysql => Some("root"),
            Self::Postgresql => Some("postgres"),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported database type `{0}`")]
pub struct UnknownDatabaseKind(String);

impl FromStr for DatabaseKind {
    type Err = UnknownDatabaseKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            "postgresql" | "postgres" | "pg" => Ok(Self::Postgresql),
            other => Err(UnknownDatabaseKind(other.to_string())),
        }
    }
}

/// Parameters of one logical database connection.
///
/// Lives in memory for the duration of a session only. The password is
/// never written anywhere by this crate and is redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub kind: DatabaseKind,
    pub database: String,
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            kind: DatabaseKind::Sqlite,
            database: database.into(),
            host: None,
            port: None,
            user: None,
            password: None,
        }
    }

    #[must_use]
    pub fn remote(
        kind: DatabaseKind,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            database: database.into(),
            host: Some(host.into()),
            port: None,
            user: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Checks the descriptor and returns the normalized copy that is sent to
    /// the backend: trimmed host and database, kind-specific port and user
    /// defaults filled in, and no host for sqlite.
    pub fn validate(&self) -> Result<Self, ValidationError> {
        let database = self.database.trim();
        if database.is_empty() {
            return Err(ValidationError::MissingField { field: "database" });
        }

        if !self.kind.is_remote() {
            return Ok(Self::sqlite(database));
        }

        let host = non_empty(self.host.as_deref())
            .ok_or(ValidationError::MissingField { field: "host" })?;
        if is_loopback_host(host) {
            return Err(ValidationError::LoopbackHost {
                host: host.to_string(),
            });
        }

        Ok(Self {
            kind: self.kind,
            database: database.to_string(),
            host: Some(host.to_string()),
            port: non_empty(self.port.as_deref())
                .or(self.kind.default_port())
                .map(str::to_string),
            user: non_empty(self.user.as_deref())
                .or(self.kind.default_user())
                .map(str::to_string),
            password: self.password.clone(),
        })
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("kind", &self.kind)
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    LOOPBACK_HOSTS
        .iter()
        .any(|alias| host.eq_ignore_ascii_case(alias))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

/// What the backend said when it accepted a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectAck {
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleDatabase {
    pub path: Option<String>,
}

#[async_trait]
pub trait ConnectionBackend {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<ConnectAck, BackendError>;
    async fn disconnect(&self) -> Result<(), BackendError>;
    async fn load_sample_database(&self) -> Result<SampleDatabase, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub kind: Option<DatabaseKind>,
    pub database: Option<String>,
    pub host: Option<String>,
    pub is_connected: bool,
    pub last_latency: Option<Duration>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            kind: None,
            database: None,
            host: None,
            is_connected: false,
            last_latency: None,
            connected_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub latency: Duration,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConnectionManagerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("already connected to `{database}`; disconnect first")]
    AlreadyConnected { database: String },
    #[error("{0}")]
    Backend(#[source] BackendError),
}

#[derive(Debug)]
pub struct ConnectionManager<B: ConnectionBackend> {
    backend: B,
    active: Option<ConnectionDescriptor>,
    last_latency: Option<Duration>,
    connected_at: Option<DateTime<Utc>>,
}

impl<B: ConnectionBackend> ConnectionManager<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
            last_latency: None,
            connected_at: None,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let Some(active) = &self.active else {
            return ConnectionStatus::disconnected();
        };

        ConnectionStatus {
            kind: Some(active.kind),
            database: Some(active.database.clone()),
            host: active.host.clone(),
            is_connected: true,
            last_latency: self.last_latency,
            connected_at: self.connected_at,
        }
    }

    pub async fn connect(
        &mut self,
        descriptor: ConnectionDescriptor,
    ) -> Result<ConnectOutcome, ConnectionManagerError> {
        if let Some(active) = &self.active {
            return Err(ConnectionManagerError::AlreadyConnected {
                database: active.database.clone(),
            });
        }

        let descriptor = descriptor.validate()?;

        let started_at = Instant::now();
        let ack = self
            .backend
            .connect(&descriptor)
            .await
            .map_err(ConnectionManagerError::Backend)?;
        let latency = started_at.elapsed();

        let message = ack
            .message
            .unwrap_or_else(|| format!("Connected to {} database", descriptor.kind));
        info!(
            "connected to {} database `{}` in {latency:?}",
            descriptor.kind, descriptor.database
        );

        self.activate(descriptor, latency);
        Ok(ConnectOutcome { latency, message })
    }

    pub async fn load_sample_database(
        &mut self,
    ) -> Result<ConnectOutcome, ConnectionManagerError> {
        if let Some(active) = &self.active {
            return Err(ConnectionManagerError::AlreadyConnected {
                database: active.database.clone(),
            });
        }

        let started_at = Instant::now();
        let sample = self
            .backend
            .load_sample_database()
            .await
            .map_err(ConnectionManagerError::Backend)?;
        let latency = started_at.elapsed();

        let path = sample
            .path
            .unwrap_or_else(|| "sample_db.sqlite3".to_string());
        info!("sample database loaded from `{path}`");
        let message = format!("Sample database connected ({path})");

        self.activate(ConnectionDescriptor::sqlite(path), latency);
        Ok(ConnectOutcome { latency, message })
    }

    /// Tells the backend to drop its connection, then forgets the local one
    /// whatever the backend answered.
    pub async fn disconnect(&mut self) {
        if let Err(error) = self.backend.disconnect().await {
            warn!("backend disconnect failed, clearing local session anyway: {error}");
        }

        if let Some(previous) = self.active.take() {
            info!("disconnected from `{}`", previous.database);
        }
        self.last_latency = None;
        self.connected_at = None;
    }

    fn activate(&mut self, descriptor: ConnectionDescriptor, latency: Duration) {
        self.active = Some(descriptor);
        self.last_latency = Some(latency);
        self.connected_at = Some(Utc::now());
    }
}
