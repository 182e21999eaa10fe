//! Bearer-token authentication and role-based authorization.
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims).base64url(signature)`.
//! The claims carry the caller's role, the tenant ids that role is bound to, and the permission
//! strings checked by each route.
//!
//! A permission is `"{resource}:{action}"`; the single permission `"*"` grants everything.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use clinic_core::crud::Scope;
use clinic_uuid::RecordId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub use clinic_core::models::Role;

type HmacSha256 = Hmac<Sha256>;

/// Grants every permission.
pub const ALL_PERMISSIONS: &str = "*";

pub const DEFAULT_TOKEN_TTL_HOURS: u32 = 24;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed bearer token")]
    MalformedToken,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("missing permission {0}")]
    MissingPermission(String),
    #[error("token secret must not be empty")]
    EmptySecret,
    #[error("token ttl must be greater than zero")]
    InvalidTtl,
    #[error("failed to encode token: {0}")]
    Encoding(serde_json::Error),
}

impl AuthError {
    /// True for failures of the token itself, as opposed to a valid caller lacking a permission.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken
                | AuthError::MalformedToken
                | AuthError::BadSignature
                | AuthError::Expired
        )
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

pub fn permission(resource: &str, action: Action) -> String {
    format!("{resource}:{}", action.as_str())
}

const CRUD: &[Action] = &[Action::Create, Action::Read, Action::Update, Action::Delete];
const READ: &[Action] = &[Action::Read];
const READ_UPDATE: &[Action] = &[Action::Read, Action::Update];
const CREATE_READ: &[Action] = &[Action::Create, Action::Read];
const CREATE_READ_UPDATE: &[Action] = &[Action::Create, Action::Read, Action::Update];

fn expand(grants: &[(&str, &[Action])]) -> Vec<String> {
    grants
        .iter()
        .flat_map(|(resource, actions)| actions.iter().map(|a| permission(resource, *a)))
        .collect()
}

/// Permissions granted to a role when a token is minted without an explicit list.
pub trait RolePermissions {
    fn default_permissions(&self) -> Vec<String>;
}

impl RolePermissions for Role {
    fn default_permissions(&self) -> Vec<String> {
        match self {
            Role::SuperAdmin => vec![ALL_PERMISSIONS.to_string()],
            Role::Clinic => expand(&[
                ("clinics", READ_UPDATE),
                ("branches", CRUD),
                ("hospitals", CRUD),
                ("doctors", CRUD),
                ("patients", CRUD),
                ("availability", CRUD),
                ("bookings", CRUD),
                ("prescriptions", CRUD),
                ("reports", CRUD),
                ("referrals", CRUD),
                ("users", CRUD),
                ("specializations", READ),
                ("plans", READ),
                ("subscriptions", CREATE_READ),
            ]),
            Role::Branch => expand(&[
                ("clinics", READ),
                ("branches", READ_UPDATE),
                ("hospitals", READ_UPDATE),
                ("doctors", CRUD),
                ("patients", CRUD),
                ("availability", CRUD),
                ("bookings", CRUD),
                ("prescriptions", CRUD),
                ("reports", CRUD),
                ("referrals", CRUD),
                ("specializations", READ),
                ("plans", READ),
                ("subscriptions", READ),
            ]),
            Role::Doctor => expand(&[
                ("clinics", READ),
                ("branches", READ),
                ("doctors", READ),
                ("availability", READ),
                ("specializations", READ),
                ("patients", CREATE_READ_UPDATE),
                ("bookings", CREATE_READ_UPDATE),
                ("prescriptions", CRUD),
                ("reports", CRUD),
                ("referrals", CRUD),
            ]),
        }
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<RecordId>,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Claims for `role` with its default permissions, valid for `ttl_hours` from `now`.
    pub fn new(
        sub: impl Into<String>,
        role: Role,
        scope: Scope,
        now: DateTime<Utc>,
        ttl_hours: u32,
    ) -> Self {
        Self {
            sub: sub.into(),
            role,
            clinic_id: scope.clinic_id,
            branch_id: scope.branch_id,
            doctor_id: scope.doctor_id,
            permissions: role.default_permissions(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(i64::from(ttl_hours))).timestamp(),
        }
    }

    pub fn has_permission(&self, resource: &str, action: Action) -> bool {
        let wanted = permission(resource, action);
        self.permissions
            .iter()
            .any(|p| p == ALL_PERMISSIONS || *p == wanted)
    }

    pub fn require(&self, resource: &str, action: Action) -> Result<(), AuthError> {
        if self.has_permission(resource, action) {
            Ok(())
        } else {
            Err(AuthError::MissingPermission(permission(resource, action)))
        }
    }

    /// Whether a record in `scope` belongs to the caller's tenancy.
    pub fn can_access(&self, scope: &Scope) -> bool {
        let same = |mine: Option<RecordId>, theirs: Option<RecordId>| match theirs {
            None => true,
            Some(id) => mine == Some(id),
        };

        match self.role {
            Role::SuperAdmin => true,
            Role::Clinic => scope.clinic_id.is_some() && same(self.clinic_id, scope.clinic_id),
            Role::Branch => {
                scope.clinic_id.is_some()
                    && same(self.clinic_id, scope.clinic_id)
                    && same(self.branch_id, scope.branch_id)
            }
            Role::Doctor => {
                scope.clinic_id.is_some()
                    && same(self.clinic_id, scope.clinic_id)
                    && same(self.doctor_id, scope.doctor_id)
            }
        }
    }

    /// Like [`Claims::can_access`], but records without a tenant (plans, specializations) are
    /// visible to everyone.
    pub fn can_read(&self, scope: &Scope) -> bool {
        scope.clinic_id.is_none() || self.can_access(scope)
    }
}

// ============================================================================
// TOKEN CODEC
// ============================================================================

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::EmptySecret)
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = Header {
            alg: "HS256".into(),
            typ: "JWT".into(),
        };
        let header = serde_json::to_vec(&header).map_err(AuthError::Encoding)?;
        let claims = serde_json::to_vec(claims).map_err(AuthError::Encoding)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks format, signature (in constant time) and expiry, returning the claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let token = token.trim();
        let (signing_input, signature) = token.rsplit_once('.').ok_or(AuthError::MalformedToken)?;
        let (header, claims) = signing_input
            .split_once('.')
            .filter(|(_, claims)| !claims.contains('.'))
            .ok_or(AuthError::MalformedToken)?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(AuthError::MalformedToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::MalformedToken)?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = decode_json(claims)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::MalformedToken)?;
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

// ============================================================================
// CONFIG
// ============================================================================

/// Token settings resolved at startup.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    codec: TokenCodec,
    ttl_hours: u32,
}

impl TokenConfig {
    pub fn new(secret: &str, ttl_hours: u32) -> Result<Self, AuthError> {
        if ttl_hours == 0 {
            return Err(AuthError::InvalidTtl);
        }
        Ok(Self {
            codec: TokenCodec::new(secret.trim())?,
            ttl_hours,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }
}
