//! Role-based grants: actions, scopes, and the grant table
//!
//! A grant binds a role, a normalized resource pattern, and a permission
//! (an action plus an `any`/`own` scope). The table is built once at
//! initialization by deep-merging operator overrides over the scheme's
//! schema-embedded defaults, and is immutable afterwards; concurrent
//! requests read it without synchronization.
//!
//! Grant documents use the role → resource → permission-key shape, where a
//! permission key is `"readAny"`, `"read:any"`, or either spelling of any
//! other action/scope pair, mapped to an attribute list:
//!
//! ```json
//! {
//!     "user": {
//!         "/resource/{param}": { "updateOwn": ["*"] }
//!     }
//! }
//! ```
//!
//! Attribute lists are accepted for wire compatibility but only presence
//! is interpreted.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::schema::{normalize_template, ApiDocument};

/// A CRUD action derived from the request's HTTP method
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Action {
    /// `POST`
    Create,
    /// `GET`, `HEAD`
    Read,
    /// `PUT`, `PATCH`
    Update,
    /// `DELETE`
    Delete,
}

impl Action {
    /// Maps an HTTP method onto its CRUD action
    ///
    /// # Errors
    ///
    /// Methods without a mapping are a [`ConfigError`]: a secured
    /// operation reached through one is rejected, never silently allowed.
    pub fn from_method(method: &http::Method) -> Result<Self, ConfigError> {
        match *method {
            http::Method::GET | http::Method::HEAD => Ok(Self::Read),
            http::Method::POST => Ok(Self::Create),
            http::Method::PUT | http::Method::PATCH => Ok(Self::Update),
            http::Method::DELETE => Ok(Self::Delete),
            _ => Err(ConfigError::UnmappedMethod {
                method: method.clone(),
            }),
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Whether a permission covers all instances of a resource or only those
/// the caller owns
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AccessScope {
    /// The action is permitted on any instance
    Any,
    /// The action is permitted only on instances the caller owns
    Own,
}

impl AccessScope {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "any" | "Any" => Some(Self::Any),
            "own" | "Own" => Some(Self::Own),
            _ => None,
        }
    }
}

/// An action/scope pair, the unit of a grant
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Permission {
    /// The permitted action
    pub action: Action,
    /// The breadth of the permission
    pub scope: AccessScope,
}

impl Permission {
    /// Constructs a permission from its parts
    pub const fn new(action: Action, scope: AccessScope) -> Self {
        Self { action, scope }
    }

    /// Parses a grant-document permission key
    ///
    /// Both the `read:any` and `readAny` spellings are accepted.
    fn parse(key: &str) -> Option<Self> {
        if let Some((action, scope)) = key.split_once(':') {
            return Some(Self::new(Action::parse(action)?, AccessScope::parse(scope)?));
        }
        let scope_at = key.len().checked_sub(3)?;
        if !key.is_char_boundary(scope_at) {
            return None;
        }
        let (action, scope) = key.split_at(scope_at);
        Some(Self::new(Action::parse(action)?, AccessScope::parse(scope)?))
    }
}

/// Where a scheme's operator grant overrides come from
///
/// A JSON string is a path to a grant document on disk; a JSON object is
/// the grant document itself.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum GrantSource {
    /// Path to a JSON grant document
    File(PathBuf),
    /// Inline grant document
    Inline(Value),
}

/// The immutable role → resource → permissions table for one security
/// scheme
///
/// Built once by [`GrantTable::build`]; reads take no locks. A role or
/// resource without an entry denies by design rather than erroring, since
/// schemas may intentionally omit rarely-used roles; the miss is logged
/// at debug level so configuration drift stays observable.
#[derive(Clone, Debug, Default)]
pub struct GrantTable {
    roles: HashMap<String, HashMap<String, HashSet<Permission>>>,
}

impl GrantTable {
    /// Whether `role` may perform `action` at `scope` on `resource`
    ///
    /// `resource` must be in the normalized `:param` pattern syntax; a
    /// pattern that was not normalized the same way at build time will
    /// never match.
    pub fn permission(
        &self,
        role: &str,
        resource: &str,
        action: Action,
        scope: AccessScope,
    ) -> bool {
        match self.roles.get(role).and_then(|r| r.get(resource)) {
            Some(perms) => perms.contains(&Permission::new(action, scope)),
            None => {
                tracing::debug!(role, resource, "no grant entry; denying");
                false
            }
        }
    }

    /// Builds the table for one scheme
    ///
    /// Operator overrides (inline or file-backed) are deep-merged over the
    /// scheme's schema-embedded defaults, override winning key by key. An
    /// implicit `anonymous` role granting `read:any` on every
    /// parameterless read operation is synthesized when the merged
    /// configuration does not define one. Resource keys are normalized to
    /// the router's `:param` syntax and made absolute.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a file-backed override cannot be
    /// loaded, when the merged result is not a non-empty mapping, or when
    /// a permission key is unrecognized.
    pub fn build(
        defaults: Option<&Value>,
        overrides: Option<&GrantSource>,
        document: &ApiDocument,
    ) -> Result<Self, ConfigError> {
        let mut merged = defaults.cloned().unwrap_or(Value::Null);

        if let Some(source) = overrides {
            let overlay = match source {
                GrantSource::File(path) => load_grant_file(path)?,
                GrantSource::Inline(value) => value.clone(),
            };
            deep_merge(&mut merged, overlay);
        }

        let Value::Object(mut by_role) = merged else {
            return Err(ConfigError::InvalidAcl);
        };
        if by_role.is_empty() {
            return Err(ConfigError::InvalidAcl);
        }

        if !by_role.contains_key("anonymous") {
            let mut anonymous = serde_json::Map::new();
            for resource in document.parameterless_read_paths() {
                anonymous.insert(resource, serde_json::json!({ "read:any": ["*"] }));
            }
            by_role.insert("anonymous".to_string(), Value::Object(anonymous));
        }

        let mut roles = HashMap::new();
        for (role, resources) in by_role {
            let Value::Object(resources) = resources else {
                return Err(ConfigError::InvalidAcl);
            };

            let mut by_resource = HashMap::new();
            for (resource, perms) in resources {
                let Value::Object(perms) = perms else {
                    return Err(ConfigError::InvalidAcl);
                };

                let mut set = HashSet::new();
                for key in perms.keys() {
                    let permission =
                        Permission::parse(key).ok_or_else(|| ConfigError::UnknownPermission {
                            key: key.clone(),
                        })?;
                    set.insert(permission);
                }
                by_resource.insert(normalize_template(&resource), set);
            }
            roles.insert(role, by_resource);
        }

        tracing::info!(roles = roles.len(), "grant table built");
        Ok(Self { roles })
    }
}

fn load_grant_file(path: &PathBuf) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::GrantFileRead {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::GrantFileParse {
        path: path.clone(),
        source,
    })
}

/// Recursive override-wins merge
///
/// Objects merge key by key; arrays and leaf values are replaced, not
/// concatenated.
fn deep_merge(base: &mut Value, overlay: Value) {
    if let Value::Object(overlay) = overlay {
        if let Value::Object(base) = base {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            return;
        }
        *base = Value::Object(overlay);
    } else {
        *base = overlay;
    }
}
