//! Authenticated caller attached to a request by the auth stage.

use serde::Serialize;

/// Identity extracted from a verified access token.
///
/// `abilities` is the token's audience list; each entry is a permission tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalContext {
    pub issuer: String,
    pub subject: String,
    pub abilities: Vec<String>,
}

impl PrincipalContext {
    /// Returns true when `permission` is empty or listed in the abilities.
    pub fn can(&self, permission: &str) -> bool {
        permission.is_empty() || self.abilities.iter().any(|a| a == permission)
    }
}
