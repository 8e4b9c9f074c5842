mod shell;

use std::env;
use std::io;

use qdesk_adapters::http::HttpBackend;
use qdesk_adapters::token_store::KeyringTokenStore;
use qdesk_core::auth::{AuthToken, TokenStore};
use qdesk_core::performance_log::PerformanceLog;
use qdesk_core::role_guard::RoleGuard;
use qdesk_core::session::{Session, SessionOptions};
use qdesk_core::settings::{Settings, SettingsFile, API_TOKEN_ENV};

use crate::shell::Shell;

fn build_session(
    settings: &Settings,
    token_store: Box<dyn TokenStore>,
) -> Result<Session<HttpBackend>, Box<dyn std::error::Error>> {
    let token = env::var(API_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .map_or_else(AuthToken::new, AuthToken::with_token);
    let backend = HttpBackend::from_settings(settings, token.clone())?;
    let performance_log = PerformanceLog::load_from_path(settings.performance_log_path()?);

    log::info!("using API at {}", backend.base_url());
    let options = SessionOptions {
        performance_log,
        token,
        token_store,
        role_guard: RoleGuard::new(settings.role_guard),
        auto_explain: settings.auto_explain,
    };
    Ok(Session::new(backend, options))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = SettingsFile::load_default()?
        .into_settings()
        .with_env_overrides();
    let token_store = Box::new(KeyringTokenStore::new(settings.keyring_service.as_deref()));
    let session = build_session(&settings, token_store)?;

    let mut shell = Shell::new(session, io::stdout());
    shell.run(io::stdin().lock()).await?;
    Ok(())
}
