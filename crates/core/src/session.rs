use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::assistant::{
    Assistant, AssistantBackend, AssistantError, IndexRecommendation, QuerySuggestion,
};
use crate::auth::{
    AuthBackend, AuthError, AuthManager, AuthToken, Credentials, MemoryTokenStore, NewAccount,
    TokenStore, UserProfile,
};
use crate::connection_manager::{
    ConnectOutcome, ConnectionBackend, ConnectionDescriptor, ConnectionManager,
    ConnectionManagerError, ConnectionStatus, DatabaseKind,
};
use crate::error::ValidationError;
use crate::performance_log::PerformanceLog;
use crate::query_library::{
    HistoryEntry, NewSavedQuery, QueryLibrary, QueryLibraryBackend, QueryLibraryError, SavedQuery,
};
use crate::query_runner::{
    ExecutionOutcome, QueryBackend, QueryDispatcher, QueryRequest, QueryRunnerError,
};
use crate::result_cache::ResultCache;
use crate::role_guard::{RoleGuard, UserRole};
use crate::schema_cache::{
    ErDiagram, SchemaBackend, SchemaCacheError, SchemaCacheService, SchemaSnapshot,
};
use crate::sql_text::looks_like_ddl;

/// Everything a session needs from the remote service.
pub trait SessionBackend:
    ConnectionBackend
    + QueryBackend
    + SchemaBackend
    + AssistantBackend
    + QueryLibraryBackend
    + AuthBackend
    + Clone
{
}

impl<T> SessionBackend for T where
    T: ConnectionBackend
        + QueryBackend
        + SchemaBackend
        + AssistantBackend
        + QueryLibraryBackend
        + AuthBackend
        + Clone
{
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Connection(#[from] ConnectionManagerError),
    #[error(transparent)]
    Query(#[from] QueryRunnerError),
    #[error(transparent)]
    Schema(#[from] SchemaCacheError),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    Library(#[from] QueryLibraryError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SessionError {
    /// True when the error was raised locally without contacting the backend.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Connection(ConnectionManagerError::Validation(_))
                | Self::Query(QueryRunnerError::Validation(_))
                | Self::Assistant(AssistantError::Validation(_))
                | Self::Library(QueryLibraryError::Validation(_))
                | Self::Auth(AuthError::Validation(_))
        )
    }
}

pub struct SessionOptions {
    pub performance_log: PerformanceLog,
    pub token: AuthToken,
    pub token_store: Box<dyn TokenStore>,
    pub role_guard: RoleGuard,
    pub auto_explain: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            performance_log: PerformanceLog::in_memory(),
            token: AuthToken::new(),
            token_store: Box::new(MemoryTokenStore::default()),
            role_guard: RoleGuard::default(),
            auto_explain: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectReport {
    pub outcome: ConnectOutcome,
    pub schema: Option<Arc<SchemaSnapshot>>,
    pub schema_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Arc<ExecutionOutcome>,
    pub schema_refreshed: bool,
}

impl RunReport {
    #[must_use]
    pub fn is_slow(&self) -> bool {
        self.outcome.is_slow
    }
}

/// One client session against the remote service: at most one active
/// connection, one bearer token, and the caches built on top of them.
pub struct Session<B: SessionBackend> {
    connection: ConnectionManager<B>,
    dispatcher: QueryDispatcher<B>,
    schema: SchemaCacheService<B>,
    assistant: Assistant<B>,
    library: QueryLibrary<B>,
    auth: AuthManager<B>,
    results: ResultCache,
    performance: PerformanceLog,
    role_guard: RoleGuard,
    auto_explain: bool,
}

impl<B: SessionBackend> Session<B> {
    #[must_use]
    pub fn new(backend: B, options: SessionOptions) -> Self {
        Self {
            connection: ConnectionManager::new(backend.clone()),
            dispatcher: QueryDispatcher::new(backend.clone()),
            schema: SchemaCacheService::new(backend.clone()),
            assistant: Assistant::new(backend.clone()),
            library: QueryLibrary::new(backend.clone()),
            auth: AuthManager::new(backend, options.token, options.token_store),
            results: ResultCache::default(),
            performance: options.performance_log,
            role_guard: options.role_guard,
            auto_explain: options.auto_explain,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    #[must_use]
    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    #[must_use]
    pub fn performance(&self) -> &PerformanceLog {
        &self.performance
    }

    #[must_use]
    pub fn cached_schema(&self) -> Option<Arc<SchemaSnapshot>> {
        self.schema.cached()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.auth.user()
    }

    #[must_use]
    pub fn role(&self) -> UserRole {
        self.auth.role()
    }

    #[must_use]
    pub fn auto_explain(&self) -> bool {
        self.auto_explain
    }

    pub fn set_auto_explain(&mut self, enabled: bool) {
        self.auto_explain = enabled;
    }

    pub async fn connect(
        &mut self,
        descriptor: ConnectionDescriptor,
    ) -> Result<ConnectReport, SessionError> {
        let outcome = self.connection.connect(descriptor).await?;
        Ok(self.after_connect(outcome).await)
    }

    pub async fn load_sample_database(&mut self) -> Result<ConnectReport, SessionError> {
        let outcome = self.connection.load_sample_database().await?;
        Ok(self.after_connect(outcome).await)
    }

    /// Never fails: backend errors are logged and local state is cleared.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.schema.invalidate();
    }

    pub async fn run(&mut self, text: &str) -> Result<RunReport, SessionError> {
        let explain = self.auto_explain;
        self.run_with_explain(text, explain).await
    }

    pub async fn run_with_explain(
        &mut self,
        text: &str,
        explain: bool,
    ) -> Result<RunReport, SessionError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let Some(descriptor) = self.connection.active_descriptor() else {
            return Err(ValidationError::NotConnected.into());
        };
        self.role_guard.check(self.auth.role(), text)?;

        let request = QueryRequest::new(text)
            .with_connection(Some(descriptor.clone()))
            .with_explain(explain);
        let outcome = self
            .dispatcher
            .dispatch(&request, &mut self.results, &mut self.performance)
            .await?;

        let schema_refreshed = if looks_like_ddl(text) {
            match self.schema.refresh().await {
                Ok(_) => true,
                Err(error) => {
                    warn!("schema refresh after DDL failed: {error}");
                    false
                }
            }
        } else {
            false
        };

        Ok(RunReport {
            outcome,
            schema_refreshed,
        })
    }

    pub async fn schema(&mut self) -> Result<Arc<SchemaSnapshot>, SessionError> {
        self.require_connection()?;
        Ok(self.schema.snapshot().await?)
    }

    pub async fn refresh_schema(&mut self) -> Result<Arc<SchemaSnapshot>, SessionError> {
        self.require_connection()?;
        Ok(self.schema.refresh().await?)
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>, SessionError> {
        self.require_connection()?;
        Ok(self.schema.list_tables().await?)
    }

    pub async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, SessionError> {
        self.require_connection()?;
        Ok(self.schema.list_columns(table).await?)
    }

    pub async fn er_diagram(&self) -> Result<ErDiagram, SessionError> {
        self.require_connection()?;
        Ok(self.schema.er_diagram().await?)
    }

    pub async fn explain(&self, query: &str) -> Result<Value, SessionError> {
        self.require_connection()?;
        Ok(self.assistant.explain(query).await?)
    }

    pub async fn recommend_indexes(
        &self,
        query: &str,
    ) -> Result<Vec<IndexRecommendation>, SessionError> {
        self.require_connection()?;
        Ok(self.assistant.recommend_indexes(query).await?)
    }

    pub async fn suggest(&self, prompt: &str) -> Result<QuerySuggestion, SessionError> {
        Ok(self.assistant.suggest(prompt).await?)
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, SessionError> {
        Ok(self.library.history().await?)
    }

    pub async fn save_query(&self, query: NewSavedQuery) -> Result<Option<i64>, SessionError> {
        Ok(self.library.save(query).await?)
    }

    pub async fn saved_queries(&self) -> Result<Vec<SavedQuery>, SessionError> {
        Ok(self.library.saved_queries().await?)
    }

    pub async fn databases(&self) -> Result<Vec<String>, SessionError> {
        self.require_connection()?;
        Ok(self.library.databases().await?)
    }

    /// Only server databases (MySQL, PostgreSQL) can host new databases.
    pub async fn create_database(&self, name: &str) -> Result<String, SessionError> {
        let Some(active) = self.connection.active_descriptor() else {
            return Err(ValidationError::NotConnected.into());
        };
        if active.kind == DatabaseKind::Sqlite {
            return Err(ValidationError::UnsupportedForKind {
                kind: DatabaseKind::Sqlite.as_str(),
            }
            .into());
        }
        Ok(self.library.create_database(name).await?)
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<&UserProfile, SessionError> {
        Ok(self.auth.login(credentials).await?)
    }

    pub async fn register(&self, account: &NewAccount) -> Result<String, SessionError> {
        Ok(self.auth.register(account).await?)
    }

    pub fn logout(&mut self) {
        self.auth.logout();
        info!("logged out");
    }

    fn require_connection(&self) -> Result<(), ValidationError> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            Err(ValidationError::NotConnected)
        }
    }

    async fn after_connect(&mut self, outcome: ConnectOutcome) -> ConnectReport {
        self.schema.invalidate();
        match self.schema.refresh().await {
            Ok(schema) => ConnectReport {
                outcome,
                schema: Some(schema),
                schema_error: None,
            },
            Err(error) => {
                warn!("connected but schema could not be loaded: {error}");
                ConnectReport {
                    outcome,
                    schema: None,
                    schema_error: Some(error.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use super::{Session, SessionError, SessionOptions};
    use crate::assistant::{AssistantBackend, IndexRecommendation, QuerySuggestion};
    use crate::auth::{AuthBackend, AuthToken, Credentials, LoginResponse, NewAccount, UserProfile};
    use crate::connection_manager::{
        ConnectAck, ConnectionBackend, ConnectionDescriptor, DatabaseKind, SampleDatabase,
    };
    use crate::error::{BackendError, ValidationError};
    use crate::performance_log::PERFORMANCE_LOG_CAPACITY;
    use crate::query_library::{HistoryEntry, NewSavedQuery, QueryLibraryBackend, SavedQuery};
    use crate::query_runner::{QueryBackend, QueryRequest, RawStatement, RunResponse};
    use crate::role_guard::UserRole;
    use crate::schema_cache::{ErDiagram, SchemaBackend, SchemaSnapshot, TableSchema};

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_next_run: bool,
        fail_disconnect: bool,
        role: Option<UserRole>,
        last_request: Option<QueryRequest>,
        schema_tables: Vec<String>,
    }

    #[derive(Debug, Clone, Default)]
    struct FakeBackend {
        state: Arc<Mutex<Recorder>>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<String> {
            self.state.lock().expect("state lock poisoned").calls.clone()
        }

        fn record(&self, call: &str) {
            self.state
                .lock()
                .expect("state lock poisoned")
                .calls
                .push(call.to_string());
        }

        fn count(&self, call: &str) -> usize {
            self.calls().iter().filter(|seen| *seen == call).count()
        }
    }

    #[async_trait::async_trait]
    impl ConnectionBackend for FakeBackend {
        async fn connect(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> Result<ConnectAck, BackendError> {
            self.record("connect");
            Ok(ConnectAck::default())
        }

        async fn disconnect(&self) -> Result<(), BackendError> {
            self.record("disconnect");
            if self.state.lock().expect("state lock poisoned").fail_disconnect {
                return Err(BackendError::transport("network unreachable"));
            }
            Ok(())
        }

        async fn load_sample_database(&self) -> Result<SampleDatabase, BackendError> {
            self.record("sample");
            Ok(SampleDatabase::default())
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for FakeBackend {
        async fn run_query(&self, request: &QueryRequest) -> Result<RunResponse, BackendError> {
            self.record("run");
            let mut state = self.state.lock().expect("state lock poisoned");
            state.last_request = Some(request.clone());
            if state.fail_next_run {
                state.fail_next_run = false;
                return Err(BackendError::server(400, "syntax error near FORM"));
            }
            if request.text.to_ascii_uppercase().starts_with("CREATE TABLE") {
                state.schema_tables.push("created".to_string());
                return Ok(RunResponse::default());
            }
            Ok(RunResponse {
                statements: vec![RawStatement {
                    query: request.text.clone(),
                    columns: vec!["1".to_string()],
                    rows: vec![vec![json!(1)]],
                    message: None,
                }],
                explanation: request.explain.then(|| json!({ "plan": "SCAN" })),
                execution_time_ms: None,
            })
        }
    }

    #[async_trait::async_trait]
    impl SchemaBackend for FakeBackend {
        async fn fetch_schema(&self) -> Result<SchemaSnapshot, BackendError> {
            self.record("schema");
            let state = self.state.lock().expect("state lock poisoned");
            let mut tables = vec![TableSchema {
                name: "users".to_string(),
                columns: vec!["id".to_string(), "email".to_string()],
            }];
            tables.extend(state.schema_tables.iter().map(|name| TableSchema {
                name: name.clone(),
                columns: vec!["id".to_string()],
            }));
            Ok(SchemaSnapshot { tables })
        }

        async fn fetch_er_diagram(&self) -> Result<ErDiagram, BackendError> {
            self.record("er");
            Ok(ErDiagram::default())
        }
    }

    #[async_trait::async_trait]
    impl AssistantBackend for FakeBackend {
        async fn explain(&self, _query: &str) -> Result<Value, BackendError> {
            self.record("explain");
            Ok(json!(["Seq Scan on users"]))
        }

        async fn recommend_indexes(
            &self,
            _query: &str,
        ) -> Result<Vec<IndexRecommendation>, BackendError> {
            self.record("recommend");
            Ok(Vec::new())
        }

        async fn suggest(&self, _prompt: &str) -> Result<QuerySuggestion, BackendError> {
            self.record("suggest");
            Ok(QuerySuggestion {
                sql: "SELECT * FROM users".to_string(),
                explanation: None,
            })
        }
    }

    #[async_trait::async_trait]
    impl QueryLibraryBackend for FakeBackend {
        async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, BackendError> {
            self.record("history");
            Ok(Vec::new())
        }

        async fn save_query(&self, _query: &NewSavedQuery) -> Result<Option<i64>, BackendError> {
            self.record("save");
            Ok(None)
        }

        async fn fetch_saved_queries(&self) -> Result<Vec<SavedQuery>, BackendError> {
            self.record("saved");
            Ok(Vec::new())
        }

        async fn list_databases(&self) -> Result<Vec<String>, BackendError> {
            self.record("databases");
            Ok(Vec::new())
        }

        async fn create_database(&self, _name: &str) -> Result<Option<String>, BackendError> {
            self.record("create_database");
            Ok(None)
        }
    }

    #[async_trait::async_trait]
    impl AuthBackend for FakeBackend {
        async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError> {
            self.record("login");
            let role = self
                .state
                .lock()
                .expect("state lock poisoned")
                .role
                .unwrap_or_default();
            Ok(LoginResponse {
                token: "token".to_string(),
                refresh: None,
                user: UserProfile {
                    username: credentials.username.clone(),
                    role,
                    ..UserProfile::default()
                },
            })
        }

        async fn register(&self, _account: &NewAccount) -> Result<Option<String>, BackendError> {
            self.record("register");
            Ok(Some("User created successfully".to_string()))
        }
    }

    fn remote() -> ConnectionDescriptor {
        ConnectionDescriptor::remote(DatabaseKind::Postgresql, "db.example.com", "shop")
            .with_user("app")
            .with_password("pw")
    }

    fn session(backend: &FakeBackend) -> Session<FakeBackend> {
        Session::new(backend.clone(), SessionOptions::default())
    }

    #[tokio::test]
    async fn connect_refreshes_schema() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let report = session.connect(remote()).await.expect("connect should work");

        assert_eq!(backend.calls(), vec!["connect", "schema"]);
        assert_eq!(report.outcome.message, "Connected to postgresql database");
        let schema = report.schema.expect("schema should be loaded");
        assert_eq!(schema.tables[0].name, "users");
        assert!(session.cached_schema().is_some());
    }

    #[tokio::test]
    async fn loopback_connect_is_rejected_before_any_call() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let err = session
            .connect(ConnectionDescriptor::remote(
                DatabaseKind::Mysql,
                "localhost",
                "x",
            ))
            .await
            .expect_err("localhost should be rejected");

        assert!(err.is_validation());
        assert!(err.to_string().contains("localhost"));
        assert!(backend.calls().is_empty());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn run_requires_text_and_connection_before_network() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let empty = session.run("   ").await.expect_err("empty should fail");
        assert!(matches!(
            empty,
            SessionError::Validation(ValidationError::EmptyQuery)
        ));

        let disconnected = session.run("SELECT 1").await.expect_err("no session");
        assert!(matches!(
            disconnected,
            SessionError::Validation(ValidationError::NotConnected)
        ));
        assert!(backend.calls().is_empty());
        assert!(session.performance().is_empty());
    }

    #[tokio::test]
    async fn run_attaches_connection_and_explain_flag() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");
        session.set_auto_explain(true);

        let report = session.run("SELECT 1;").await.expect("run should work");

        let request = backend
            .state
            .lock()
            .expect("state lock poisoned")
            .last_request
            .clone()
            .expect("request should be recorded");
        assert!(request.explain);
        assert_eq!(
            request.connection.map(|connection| connection.kind),
            Some(DatabaseKind::Postgresql)
        );
        assert_eq!(report.outcome.statements.len(), 1);
        assert_eq!(report.outcome.explanation, Some(json!({ "plan": "SCAN" })));
        assert!(!report.schema_refreshed);
    }

    #[tokio::test]
    async fn ddl_run_refreshes_schema_and_select_does_not() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");

        session.run("SELECT 1").await.expect("select should work");
        assert_eq!(backend.count("schema"), 1);

        let report = session
            .run("CREATE TABLE created (id INT)")
            .await
            .expect("ddl should work");
        assert!(report.outcome.is_empty());
        assert!(report.schema_refreshed);
        assert_eq!(backend.count("schema"), 2);
        let schema = session.cached_schema().expect("schema should be cached");
        assert!(schema.table("created").is_some());
    }

    #[tokio::test]
    async fn failed_run_preserves_cache_history_and_session() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");
        let first = session.run("SELECT 1").await.expect("run should work");

        backend.state.lock().expect("state lock poisoned").fail_next_run = true;
        let err = session
            .run("SELECT * FORM users")
            .await
            .expect_err("run should fail");

        assert_eq!(err.to_string(), "syntax error near FORM");
        assert!(!err.is_validation());
        assert_eq!(
            session.results().latest().as_deref(),
            Some(&*first.outcome)
        );
        assert_eq!(session.performance().len(), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn performance_ring_grows_to_capacity_then_evicts() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");

        for index in 0..PERFORMANCE_LOG_CAPACITY + 3 {
            let before = session.performance().len();
            session
                .run(&format!("SELECT {index}"))
                .await
                .expect("run should work");
            assert_eq!(
                session.performance().len(),
                (before + 1).min(PERFORMANCE_LOG_CAPACITY)
            );
        }

        let oldest = session
            .performance()
            .records()
            .next()
            .expect("log should not be empty");
        assert_eq!(oldest.query_prefix, "SELECT 3");
    }

    #[tokio::test]
    async fn role_guard_blocks_destructive_sql_for_plain_users() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");

        let err = session
            .run("DROP TABLE users")
            .await
            .expect_err("plain user cannot drop");
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::PrivilegeRequired { .. })
        ));
        assert_eq!(backend.count("run"), 0);

        backend.state.lock().expect("state lock poisoned").role = Some(UserRole::Admin);
        session
            .login(&Credentials::new("root", "pw"))
            .await
            .expect("login should work");
        assert_eq!(session.role(), UserRole::Admin);
        session
            .run("DROP TABLE users")
            .await
            .expect("admin may drop");
        assert_eq!(backend.count("run"), 1);
    }

    #[tokio::test]
    async fn disconnect_always_clears_local_state() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);
        session.connect(remote()).await.expect("connect should work");
        backend.state.lock().expect("state lock poisoned").fail_disconnect = true;

        session.disconnect().await;

        assert!(!session.is_connected());
        assert!(session.cached_schema().is_none());
        assert_eq!(backend.count("disconnect"), 1);
        let err = session.explain("SELECT 1").await.expect_err("disconnected");
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn sample_database_connects_and_loads_schema() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let report = session
            .load_sample_database()
            .await
            .expect("sample should load");

        assert_eq!(backend.calls(), vec!["sample", "schema"]);
        assert!(report.schema.is_some());
        assert_eq!(session.status().kind, Some(DatabaseKind::Sqlite));
    }

    #[tokio::test]
    async fn expired_token_falls_back_to_plain_user_guard() {
        let backend = FakeBackend::default();
        backend.state.lock().expect("state lock poisoned").role = Some(UserRole::Admin);
        let token = AuthToken::new();
        let mut session = Session::new(
            backend.clone(),
            SessionOptions {
                token: token.clone(),
                ..SessionOptions::default()
            },
        );
        session.connect(remote()).await.expect("connect should work");
        session
            .login(&Credentials::new("root", "pw"))
            .await
            .expect("login should work");

        token.clear();

        assert_eq!(session.role(), UserRole::User);
        assert!(session.user().is_none());
        let err = session
            .run("EXPLAIN ANALYZE DELETE FROM users")
            .await
            .expect_err("guard should apply again");
        assert!(err.is_validation());
        assert_eq!(backend.count("run"), 0);
    }

    #[tokio::test]
    async fn create_database_needs_a_server_connection() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let err = session
            .create_database("reporting")
            .await
            .expect_err("not connected");
        assert!(err.is_validation());

        session
            .load_sample_database()
            .await
            .expect("sample should load");
        let err = session
            .create_database("reporting")
            .await
            .expect_err("sqlite cannot create databases");
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::UnsupportedForKind { kind: "sqlite" })
        ));
        assert_eq!(backend.count("create_database"), 0);

        session.disconnect().await;
        session.connect(remote()).await.expect("connect should work");
        let message = session
            .create_database("reporting")
            .await
            .expect("create should work");
        assert_eq!(message, "Database 'reporting' created successfully.");
        assert_eq!(backend.count("create_database"), 1);
    }

    #[tokio::test]
    async fn register_works_offline_and_er_diagram_needs_connection() {
        let backend = FakeBackend::default();
        let mut session = session(&backend);

        let message = session
            .register(&NewAccount {
                username: "grace".to_string(),
                password: "pw".to_string(),
                email: Some("grace@example.com".to_string()),
            })
            .await
            .expect("register should work");
        assert_eq!(message, "User created successfully");
        assert!(session.er_diagram().await.is_err());

        session.connect(remote()).await.expect("connect should work");
        session.er_diagram().await.expect("diagram should load");
        assert_eq!(
            session.list_tables().await.expect("tables should list"),
            vec!["users".to_string()]
        );
        assert_eq!(backend.calls(), vec!["register", "connect", "schema", "er"]);
    }
}
