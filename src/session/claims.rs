use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decoder::ClaimsMap;

/// Role claim as issued by the ASP.NET identity stack.
pub const ROLE_CLAIM_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
pub const ROLE_CLAIM_SHORT: &str = "role";
pub const NAME_IDENTIFIER_CLAIM_URI: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
pub const USER_ID_CLAIM: &str = "UserId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Patient,
    Doctor,
    Admin,
}

impl UserRole {
    /// Landing page after login.
    pub fn home(self) -> &'static str {
        match self {
            UserRole::Patient => "/patient/dashboard",
            UserRole::Doctor => "/doctor/dashboard",
            UserRole::Admin => "/admin",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Patient => "Patient",
            UserRole::Doctor => "Doctor",
            UserRole::Admin => "Admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    /// Exact match only: the server issues `Patient`, `Doctor` and `Admin`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(UserRole::Patient),
            "Doctor" => Ok(UserRole::Doctor),
            "Admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Typed view over the decoded payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Claims {
    pub user_id: Option<String>,
    /// Raw role claim; the long URI wins over the short key.
    pub role: Option<String>,
    /// Expiry in Unix seconds.
    pub exp: Option<i64>,
    pub name_identifier: Option<String>,
    pub sub: Option<String>,
}

impl Claims {
    pub fn from_map(map: &ClaimsMap) -> Self {
        Claims {
            user_id: string_claim(map, USER_ID_CLAIM),
            role: string_claim(map, ROLE_CLAIM_URI).or_else(|| string_claim(map, ROLE_CLAIM_SHORT)),
            exp: map.get("exp").and_then(numeric_seconds),
            name_identifier: string_claim(map, NAME_IDENTIFIER_CLAIM_URI),
            sub: string_claim(map, "sub"),
        }
    }

    pub fn user_role(&self) -> Option<UserRole> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }

    /// Missing `exp` counts as expired.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        match self.exp {
            Some(exp) => exp < now_secs,
            None => true,
        }
    }

    /// Principal id with the fallbacks some endpoints need:
    /// name identifier URI, then `UserId`, then `sub`.
    pub fn principal_id(&self) -> Option<&str> {
        self.name_identifier
            .as_deref()
            .or(self.user_id.as_deref())
            .or(self.sub.as_deref())
    }
}

// Empty strings are treated like absent claims.
fn string_claim(map: &ClaimsMap, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
