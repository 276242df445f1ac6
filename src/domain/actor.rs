//! Actor identity and inbound request description.
//!
//! An actor is never stored as a first-class entity. It is derived from the
//! request (network address, authenticated user, role and user-supplied
//! fields) and reduced to a canonical string key by a key strategy.

use std::collections::BTreeMap;
use std::fmt;

/// The subject being rate limited or blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    address: String,
    user_id: Option<String>,
    role: Option<String>,
    fields: BTreeMap<String, String>,
}

impl Actor {
    /// Create an anonymous actor identified only by its network address.
    pub fn from_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_id: None,
            role: None,
            fields: BTreeMap::new(),
        }
    }

    /// Attach an authenticated user identifier.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        if !user_id.is_empty() {
            self.user_id = Some(user_id);
        }
        self
    }

    /// Attach a privilege tier (e.g. `"admin"`, `"organizer"`).
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !role.is_empty() {
            self.role = Some(role);
        }
        self
    }

    /// Attach a user-supplied field such as `email`.
    ///
    /// Values are trimmed and lowercased so `Alice@Example.com ` and
    /// `alice@example.com` land in the same bucket.
    pub fn with_field(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim().to_lowercase();
        if !value.is_empty() {
            self.fields.insert(name.into(), value);
        }
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Whether an authenticated user is attached.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Canonical identity used for security events and suspicion scoring:
    /// the user id when authenticated, the network address otherwise.
    pub fn canonical_key(&self) -> String {
        match &self.user_id {
            Some(user) => format!("user:{}", user),
            None => format!("ip:{}", self.address),
        }
    }

    /// Key under which blocks are recorded. Blocks always target the
    /// network address.
    pub fn block_key(&self) -> String {
        format!("ip:{}", self.address)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_id {
            Some(user) => write!(f, "{}@{}", user, self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// One inbound operation as seen by the gatekeeper.
#[derive(Debug, Clone)]
pub struct Request {
    /// Name of the protected operation (e.g. `"auth.login"`).
    pub operation: String,
    pub actor: Actor,
    pub path: String,
    pub user_agent: Option<String>,
}

impl Request {
    pub fn new(operation: impl Into<String>, actor: Actor, path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            actor,
            path: path.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
