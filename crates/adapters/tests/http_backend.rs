use httpmock::prelude::*;
use qdesk_adapters::http::HttpBackend;
use qdesk_core::assistant::AssistantBackend;
use qdesk_core::auth::{AuthBackend, AuthToken, Credentials, MemoryTokenStore, NewAccount};
use qdesk_core::connection_manager::{ConnectionBackend, ConnectionDescriptor, DatabaseKind};
use qdesk_core::error::BackendError;
use qdesk_core::query_library::QueryLibraryBackend;
use qdesk_core::query_runner::{QueryBackend, QueryRequest};
use qdesk_core::schema_cache::SchemaBackend;
use qdesk_core::role_guard::UserRole;
use qdesk_core::session::{Session, SessionError, SessionOptions};
use serde_json::json;

fn backend(server: &MockServer, token: AuthToken) -> HttpBackend {
    HttpBackend::new(&server.url("/api"), token, None).expect("backend should build")
}

fn remote_mysql() -> ConnectionDescriptor {
    ConnectionDescriptor::remote(DatabaseKind::Mysql, "db.example.com", "shop")
        .with_user("app")
        .with_password("pw")
}

fn session(server: &MockServer) -> Session<HttpBackend> {
    let token = AuthToken::new();
    let options = SessionOptions {
        token: token.clone(),
        token_store: Box::new(MemoryTokenStore::default()),
        ..SessionOptions::default()
    };
    Session::new(backend(server, token), options)
}

#[tokio::test]
async fn connect_then_run_round_trip_through_session() {
    let server = MockServer::start_async().await;
    let connect = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/connect/").json_body(json!({
                "db_type": "mysql",
                "type": "mysql",
                "database": "shop",
                "host": "db.example.com",
                "port": 3306,
                "user": "app",
                "password": "pw",
            }));
            then.status(200)
                .json_body(json!({ "success": true, "message": "Connected to MySQL: shop" }));
        })
        .await;
    let schema = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/schema/");
            then.status(200).json_body(json!({
                "tables": [{ "name": "users", "columns": ["id", "email"] }],
            }));
        })
        .await;
    let run = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/queries/run/")
                .body_contains("\"query\":\"SELECT id, email FROM users\"")
                .body_contains("\"type\":\"mysql\"");
            then.status(200).json_body(json!({
                "results": [{
                    "query": "SELECT id, email FROM users",
                    "columns": ["id", "email"],
                    "rows": [[1, "a@example.com"], [2]],
                    "message": "Returned 2 rows",
                }],
                "execution_time": 4.2,
            }));
        })
        .await;

    let mut session = session(&server);
    let report = session
        .connect(remote_mysql())
        .await
        .expect("connect should succeed");
    assert_eq!(report.outcome.message, "Connected to MySQL: shop");
    assert_eq!(
        report.schema.expect("schema should load").tables[0].name,
        "users"
    );

    let run_report = session
        .run("SELECT id, email FROM users")
        .await
        .expect("run should succeed");
    let statement = &run_report.outcome.statements[0];
    assert_eq!(statement.rows[1], vec![json!(2), json!(null)]);
    assert_eq!(run_report.outcome.server_elapsed_ms, Some(4.2));
    assert_eq!(session.performance().len(), 1);

    connect.assert_async().await;
    schema.assert_async().await;
    run.assert_async().await;
}

#[tokio::test]
async fn connect_with_error_field_on_success_status_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/connect/");
            then.status(200)
                .json_body(json!({ "error": "MySQL connection failed: access denied" }));
        })
        .await;

    let mut session = session(&server);
    let err = session
        .connect(remote_mysql())
        .await
        .expect_err("connect should fail");

    assert_eq!(err.to_string(), "MySQL connection failed: access denied");
    assert!(!session.is_connected());
}

#[tokio::test]
async fn loopback_host_never_reaches_the_server() {
    let server = MockServer::start_async().await;
    let connect = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/connect/");
            then.status(200).json_body(json!({ "success": true }));
        })
        .await;

    let mut session = session(&server);
    let err = session
        .connect(ConnectionDescriptor::remote(DatabaseKind::Mysql, "127.0.0.1", "x"))
        .await
        .expect_err("loopback should be rejected");

    assert!(err.is_validation());
    assert!(err.to_string().contains("localhost"));
    assert_eq!(connect.hits_async().await, 0);
}

#[tokio::test]
async fn server_error_message_is_surfaced_verbatim_and_cache_survives() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/connect/");
            then.status(200).json_body(json!({ "ok": true }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/schema/");
            then.status(200).json_body(json!({ "tables": [] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/queries/run/")
                .body_contains("SELECT 1");
            then.status(200).json_body(json!({
                "results": [{ "query": "SELECT 1", "columns": ["1"], "rows": [[1]] }],
                "execution_time": 1.0,
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/queries/run/")
                .body_contains("FORM");
            then.status(400)
                .json_body(json!({ "error": "near \"FORM\": syntax error" }));
        })
        .await;

    let mut session = session(&server);
    session
        .connect(remote_mysql())
        .await
        .expect("connect should succeed");
    let first = session.run("SELECT 1").await.expect("run should succeed");

    let err = session
        .run("SELECT * FORM users")
        .await
        .expect_err("run should fail");
    assert_eq!(err.to_string(), "near \"FORM\": syntax error");
    assert!(matches!(err, SessionError::Query(_)));
    assert_eq!(session.results().latest().as_deref(), Some(&*first.outcome));
    assert_eq!(session.performance().len(), 1);
}

#[tokio::test]
async fn unparseable_error_body_becomes_generic_transport_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/schema/");
            then.status(502).body("<html>Bad Gateway</html>");
        })
        .await;

    let backend = backend(&server, AuthToken::new());
    let err = backend
        .fetch_schema()
        .await
        .expect_err("schema should fail");

    assert_eq!(err, BackendError::transport("API Error: 502"));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let backend = HttpBackend::new("http://127.0.0.1:9/api/", AuthToken::new(), None)
        .expect("backend should build");

    let err = backend
        .run_query(&QueryRequest::new("SELECT 1"))
        .await
        .expect_err("request should fail");

    assert!(matches!(err, BackendError::Transport { .. }));
}

#[tokio::test]
async fn login_token_is_sent_as_bearer_and_cleared_on_401() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/login/")
                .json_body(json!({ "username": "ada", "password": "secret" }));
            then.status(200).json_body(json!({
                "token": "jwt-1",
                "refresh": "refresh-1",
                "user": { "username": "ada", "email": "ada@example.com", "role": "admin", "id": 7 },
            }));
        })
        .await;
    let history = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/queries/history/")
                .header("authorization", "Bearer jwt-1");
            then.status(200).json_body(json!([
                { "query": "SELECT 1", "created_at": "2026-01-02T03:04:05", "execution_time": 2.5 },
            ]));
        })
        .await;
    let saved = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/queries/saved/");
            then.status(401)
                .json_body(json!({ "detail": "Given token not valid for any token type" }));
        })
        .await;

    let token = AuthToken::new();
    let options = SessionOptions {
        token: token.clone(),
        ..SessionOptions::default()
    };
    let mut session = Session::new(backend(&server, token.clone()), options);

    let user = session
        .login(&Credentials::new("ada", "secret"))
        .await
        .expect("login should succeed");
    assert_eq!(user.role, UserRole::Admin);
    assert_eq!(token.get().as_deref(), Some("jwt-1"));

    let entries = session.history().await.expect("history should load");
    assert_eq!(entries[0].execution_time_ms, Some(2.5));

    let err = session
        .saved_queries()
        .await
        .expect_err("expired token should fail");
    assert_eq!(err.to_string(), "Given token not valid for any token type");
    assert!(!token.is_set());
    assert_eq!(session.role(), UserRole::User);

    login.assert_async().await;
    history.assert_async().await;
    saved.assert_async().await;
}

#[tokio::test]
async fn assistant_and_library_endpoints_decode_payloads() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/queries/explain/")
                .json_body(json!({ "query": "SELECT * FROM users" }));
            then.status(200)
                .json_body(json!({ "plan": [[2, 0, 0, "SCAN users"]] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/queries/recommend-indexes/");
            then.status(200).json_body(json!({
                "recommendations": [{
                    "table": "USERS",
                    "column": "EMAIL",
                    "reason": "Column 'EMAIL' used in WHERE clause",
                    "sql": "CREATE INDEX idx_USERS_EMAIL ON USERS(EMAIL);",
                }],
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/ai/query_suggest/")
                .json_body(json!({ "prompt": "all users", "query": "all users" }));
            then.status(200).json_body(json!({ "sql": "SELECT * FROM users;" }));
        })
        .await;
    let save = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/queries/save/").json_body(json!({
                "title": "Everyone",
                "query": "SELECT * FROM users",
                "is_public": true,
            }));
            then.status(201)
                .json_body(json!({ "message": "Query saved successfully", "id": 11 }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/databases/list/");
            then.status(200)
                .json_body(json!({ "databases": ["shop", "analytics"] }));
        })
        .await;

    let backend = backend(&server, AuthToken::new());

    let plan = backend
        .explain("SELECT * FROM users")
        .await
        .expect("explain should succeed");
    assert_eq!(plan, json!([[2, 0, 0, "SCAN users"]]));

    let recommendations = backend
        .recommend_indexes("SELECT * FROM users WHERE email = 'x'")
        .await
        .expect("recommendations should load");
    assert_eq!(recommendations[0].column, "EMAIL");

    let suggestion = backend
        .suggest("all users")
        .await
        .expect("suggestion should load");
    assert_eq!(suggestion.sql, "SELECT * FROM users;");

    let id = backend
        .save_query(&qdesk_core::query_library::NewSavedQuery {
            title: "Everyone".to_string(),
            query: "SELECT * FROM users".to_string(),
            is_public: true,
        })
        .await
        .expect("save should succeed");
    assert_eq!(id, Some(11));
    save.assert_async().await;

    assert_eq!(
        backend.list_databases().await.expect("databases should load"),
        vec!["shop".to_string(), "analytics".to_string()]
    );
}

#[tokio::test]
async fn sample_database_and_disconnect_use_post() {
    let server = MockServer::start_async().await;
    let sample = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/load-sample-db/");
            then.status(200)
                .json_body(json!({ "ok": true, "path": "/srv/sample_db.sqlite3" }));
        })
        .await;
    let disconnect = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/disconnect/");
            then.status(200).json_body(json!({ "ok": true }));
        })
        .await;

    let backend = backend(&server, AuthToken::new());
    let database = backend
        .load_sample_database()
        .await
        .expect("sample should load");
    assert_eq!(database.path.as_deref(), Some("/srv/sample_db.sqlite3"));
    backend.disconnect().await.expect("disconnect should succeed");

    sample.assert_async().await;
    disconnect.assert_async().await;
}

#[tokio::test]
async fn register_create_database_and_er_diagram_endpoints() {
    let server = MockServer::start_async().await;
    let register = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/register/").json_body(json!({
                "username": "grace",
                "password": "pw",
                "email": "",
            }));
            then.status(201)
                .json_body(json!({ "message": "User created successfully" }));
        })
        .await;
    let duplicate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/register/")
                .body_contains("\"username\":\"ada\"");
            then.status(400)
                .json_body(json!({ "error": "Username already exists" }));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/databases/create/")
                .json_body(json!({ "name": "reporting" }));
            then.status(200)
                .json_body(json!({ "message": "Database 'reporting' created successfully." }));
        })
        .await;
    let diagram = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/er-diagram/");
            then.status(200).json_body(json!({
                "tables": {
                    "users": { "columns": ["id", "email"], "relations": [] },
                    "orders": { "columns": ["id", "user_id"], "relations": [] },
                },
            }));
        })
        .await;

    let backend = backend(&server, AuthToken::new());
    let account = |username: &str| NewAccount {
        username: username.to_string(),
        password: "pw".to_string(),
        email: None,
    };

    let message = backend
        .register(&account("grace"))
        .await
        .expect("register should succeed");
    assert_eq!(message.as_deref(), Some("User created successfully"));
    let err = backend
        .register(&account("ada"))
        .await
        .expect_err("duplicate should fail");
    assert_eq!(err, BackendError::server(400, "Username already exists"));

    let message = backend
        .create_database("reporting")
        .await
        .expect("create should succeed");
    assert_eq!(
        message.as_deref(),
        Some("Database 'reporting' created successfully.")
    );

    let er = backend
        .fetch_er_diagram()
        .await
        .expect("diagram should load");
    let names = er
        .tables
        .iter()
        .map(|table| table.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["orders", "users"]);

    register.assert_async().await;
    duplicate.assert_async().await;
    create.assert_async().await;
    diagram.assert_async().await;
}
