use qdesk_core::auth::{StoredLogin, TokenStore, TokenStoreError};

pub const DEFAULT_KEYRING_SERVICE: &str = "qdesk";
const KEYRING_ACCOUNT: &str = "api-token";

/// Keeps the login (bearer token plus profile, as JSON) in the OS keyring.
/// On platforms without a keyring backend nothing is stored and nothing is
/// restored.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl KeyringTokenStore {
    #[must_use]
    pub fn new(service: Option<&str>) -> Self {
        let service = service
            .map(str::trim)
            .filter(|service| !service.is_empty())
            .unwrap_or(DEFAULT_KEYRING_SERVICE);
        Self {
            service: service.to_string(),
        }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

/// Secrets written before profiles were stored hold a bare token.
fn decode_secret(secret: &str) -> Option<StoredLogin> {
    if secret.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<StoredLogin>(secret)
        .ok()
        .or_else(|| Some(StoredLogin::token_only(secret)))
}

fn encode_secret(login: &StoredLogin) -> Result<String, TokenStoreError> {
    serde_json::to_string(login).map_err(|error| TokenStoreError::new(error.to_string()))
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<StoredLogin> {
        let entry = keyring::Entry::new(&self.service, KEYRING_ACCOUNT).ok()?;
        entry
            .get_password()
            .ok()
            .and_then(|secret| decode_secret(&secret))
    }

    fn save(&self, login: &StoredLogin) -> Result<(), TokenStoreError> {
        if login.token.is_empty() {
            return Ok(());
        }
        let secret = encode_secret(login)?;
        keyring::Entry::new(&self.service, KEYRING_ACCOUNT)
            .and_then(|entry| entry.set_password(&secret))
            .map_err(|error| TokenStoreError::new(error.to_string()))
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let entry = keyring::Entry::new(&self.service, KEYRING_ACCOUNT)
            .map_err(|error| TokenStoreError::new(error.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(TokenStoreError::new(error.to_string())),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<StoredLogin> {
        None
    }

    fn save(&self, login: &StoredLogin) -> Result<(), TokenStoreError> {
        encode_secret(login).map(|_| ())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        Ok(())
    }
}
