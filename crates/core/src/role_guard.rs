use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::sql_text::find_keyword;

const PRIVILEGED_KEYWORDS: [&str; 4] = ["DROP", "DELETE", "TRUNCATE", "ALTER"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = std::convert::Infallible;

    /// Anything other than `admin` is an ordinary user.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Ok(Self::Admin)
        } else {
            Ok(Self::User)
        }
    }
}

/// Blocks destructive statements for non-admin users before they are sent.
/// A privileged keyword anywhere outside quotes and comments counts, so
/// `EXPLAIN ANALYZE DELETE` and data-modifying CTEs are caught too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGuard {
    enabled: bool,
}

impl Default for RoleGuard {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RoleGuard {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn check(&self, role: UserRole, sql: &str) -> Result<(), ValidationError> {
        if !self.enabled || role == UserRole::Admin {
            return Ok(());
        }

        match find_keyword(sql, &PRIVILEGED_KEYWORDS) {
            Some(keyword) => Err(ValidationError::PrivilegeRequired {
                keyword: keyword.to_string(),
            }),
            None => Ok(()),
        }
    }
}
