//! HTTP basic authentication backed by a hashed user table.
//!
//! [`Authentication`] adds an `Authenticate` phase after
//! [`INFRASTRUCTURE`]. Calls carrying valid `Authorization: Basic`
//! credentials continue with a [`UserIdPrincipal`] stored under
//! [`PRINCIPAL`]; every other call is answered with `401 Unauthorized` and a
//! `WWW-Authenticate` challenge, and the pipeline stops there.

use std::{collections::HashMap, fmt, sync::Arc};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{
    StatusCode,
    header::{AUTHORIZATION, WWW_AUTHENTICATE},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::Feature;
use crate::{
    attributes::AttributeKey,
    call::{ApplicationCall, ApplicationRequest, INFRASTRUCTURE},
    pipeline::{Phase, Pipeline, PipelineError},
};

/// Phase inserted after [`INFRASTRUCTURE`].
pub const AUTHENTICATE: Phase = Phase::new("Authenticate");

/// Call attribute holding the authenticated principal.
pub const PRINCIPAL: AttributeKey<UserIdPrincipal> = AttributeKey::new("Principal");

/// Identity of an authenticated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdPrincipal {
    pub name: String,
}

/// User name and password presented by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPasswordCredential {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for UserPasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPasswordCredential")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Checks credentials and yields a principal for valid ones.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, credential: &UserPasswordCredential) -> Option<UserIdPrincipal>;
}

impl<F> Authenticator for F
where
    F: Fn(&UserPasswordCredential) -> Option<UserIdPrincipal> + Send + Sync + 'static,
{
    fn authenticate(&self, credential: &UserPasswordCredential) -> Option<UserIdPrincipal> {
        self(credential)
    }
}

/// Password hashing function used by [`UserHashedTableAuth`].
pub type Digester = Arc<dyn Fn(&str) -> Vec<u8> + Send + Sync>;

/// Salt used by [`sha256_digester`] when none is configured.
pub const DEFAULT_SALT: &str = "weft";

/// SHA-256 over `salt` followed by the password.
#[must_use]
pub fn sha256_digester(salt: impl Into<String>) -> Digester {
    let salt = salt.into();
    Arc::new(move |password: &str| {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    })
}

/// In-memory table of user names and password digests.
///
/// ```
/// use std::collections::HashMap;
///
/// use weft::feature::{Authenticator, UserHashedTableAuth, UserPasswordCredential};
///
/// let mut auth = UserHashedTableAuth::new(HashMap::new());
/// auth.insert("alice", "s3cret");
///
/// let good = UserPasswordCredential { name: "alice".into(), password: "s3cret".into() };
/// let bad = UserPasswordCredential { name: "alice".into(), password: "guess".into() };
/// assert_eq!(auth.authenticate(&good).map(|p| p.name), Some("alice".to_string()));
/// assert!(auth.authenticate(&bad).is_none());
/// ```
pub struct UserHashedTableAuth {
    digester: Digester,
    table: HashMap<String, Vec<u8>>,
}

impl UserHashedTableAuth {
    /// Table hashed with [`sha256_digester`] and [`DEFAULT_SALT`].
    #[must_use]
    pub fn new(table: HashMap<String, Vec<u8>>) -> Self {
        Self::with_digester(sha256_digester(DEFAULT_SALT), table)
    }

    #[must_use]
    pub fn with_digester(digester: Digester, table: HashMap<String, Vec<u8>>) -> Self {
        if table.is_empty() {
            debug!("hashed user table is empty; every credential will be rejected");
        }
        Self { digester, table }
    }

    /// Hash `password` with this table's digester.
    #[must_use]
    pub fn digest(&self, password: &str) -> Vec<u8> { (self.digester)(password) }

    /// Add or replace a user, hashing `password`.
    pub fn insert(&mut self, name: impl Into<String>, password: &str) {
        let hash = self.digest(password);
        self.table.insert(name.into(), hash);
    }

    #[must_use]
    pub fn len(&self) -> usize { self.table.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.table.is_empty() }
}

impl Default for UserHashedTableAuth {
    fn default() -> Self { Self::new(HashMap::new()) }
}

impl fmt::Debug for UserHashedTableAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserHashedTableAuth")
            .field("users", &self.table.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Compare digests without short-circuiting on the first differing byte.
fn digests_match(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len() && left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

impl Authenticator for UserHashedTableAuth {
    fn authenticate(&self, credential: &UserPasswordCredential) -> Option<UserIdPrincipal> {
        let expected = self.table.get(&credential.name)?;
        digests_match(&self.digest(&credential.password), expected).then(|| UserIdPrincipal {
            name: credential.name.clone(),
        })
    }
}

/// Errors raised while loading a [`HashedUsersConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthConfigError {
    #[error("unsupported hash algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("hash for user `{0}` is not valid base64")]
    InvalidHash(String),
}

/// Serialisable description of a hashed user table.
///
/// Missing fields take their defaults: SHA-256 with [`DEFAULT_SALT`] and no
/// users.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HashedUsersConfig {
    pub hash_algorithm: String,
    pub salt: String,
    pub users: Vec<HashedUser>,
}

impl Default for HashedUsersConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: "SHA-256".to_owned(),
            salt: DEFAULT_SALT.to_owned(),
            users: Vec::new(),
        }
    }
}

/// One user entry: a name and the base64 of its password digest.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HashedUser {
    pub name: String,
    pub hash: String,
}

impl TryFrom<HashedUsersConfig> for UserHashedTableAuth {
    type Error = AuthConfigError;

    fn try_from(config: HashedUsersConfig) -> Result<Self, Self::Error> {
        if !config.hash_algorithm.eq_ignore_ascii_case("SHA-256") {
            return Err(AuthConfigError::UnsupportedAlgorithm(config.hash_algorithm));
        }
        let table = config
            .users
            .into_iter()
            .map(|user| match STANDARD.decode(&user.hash) {
                Ok(hash) => Ok((user.name, hash)),
                Err(_) => Err(AuthConfigError::InvalidHash(user.name)),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::with_digester(sha256_digester(config.salt), table))
    }
}

/// Extract `Authorization: Basic` credentials from a request.
#[must_use]
pub fn basic_credentials(request: &ApplicationRequest) -> Option<UserPasswordCredential> {
    let value = request.header(AUTHORIZATION.as_str())?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some(UserPasswordCredential {
        name: name.to_owned(),
        password: password.to_owned(),
    })
}

/// Configuration for [`Authentication`].
pub struct AuthenticationConfig {
    /// Realm announced in the `WWW-Authenticate` challenge.
    pub realm: String,
    authenticator: Arc<dyn Authenticator>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            realm: "weft".to_owned(),
            authenticator: Arc::new(UserHashedTableAuth::default()),
        }
    }
}

impl AuthenticationConfig {
    pub fn realm(&mut self, realm: impl Into<String>) -> &mut Self {
        self.realm = realm.into();
        self
    }

    /// Validate credentials with `authenticator`.
    pub fn authenticator(&mut self, authenticator: impl Authenticator) -> &mut Self {
        self.authenticator = Arc::new(authenticator);
        self
    }
}

impl fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationConfig")
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

/// Basic authentication feature.
#[derive(Debug)]
pub struct Authentication {
    realm: String,
}

impl Authentication {
    #[must_use]
    pub fn realm(&self) -> &str { &self.realm }
}

impl Feature<ApplicationCall> for Authentication {
    type Config = AuthenticationConfig;
    const KEY: AttributeKey<Self> = AttributeKey::new("Authentication");

    fn install(
        pipeline: &mut Pipeline<ApplicationCall>,
        config: AuthenticationConfig,
    ) -> Result<Arc<Self>, PipelineError> {
        pipeline.insert_phase_after(&INFRASTRUCTURE, AUTHENTICATE)?;
        let challenge: Arc<str> = format!("Basic realm=\"{}\"", config.realm).into();
        let authenticator = config.authenticator;

        pipeline.intercept(&AUTHENTICATE, move |mut ctx| {
            let authenticator = Arc::clone(&authenticator);
            let challenge = Arc::clone(&challenge);
            async move {
                let call = Arc::clone(ctx.call());
                let principal = basic_credentials(call.request())
                    .and_then(|credential| authenticator.authenticate(&credential));
                if let Some(principal) = principal {
                    debug!(call_id = %call.id(), user = %principal.name, "authenticated");
                    call.attributes().put(&PRINCIPAL, principal);
                    return ctx.proceed().await;
                }

                debug!(call_id = %call.id(), "rejecting unauthenticated call");
                let response = call.response();
                response.status(StatusCode::UNAUTHORIZED)?;
                response.header(WWW_AUTHENTICATE.as_str(), &challenge)?;
                response.text("Unauthorized")?;
                response.send().await
            }
        })?;

        Ok(Arc::new(Self {
            realm: config.realm,
        }))
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, Method};
    use rstest::rstest;

    use super::*;

    fn request_with(authorization: Option<&'static str>) -> ApplicationRequest {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        }
        ApplicationRequest::new(Method::GET, "/".parse().expect("uri"), headers)
    }

    #[test]
    fn parses_basic_credentials() {
        // "Aladdin:open sesame"
        let credential = basic_credentials(&request_with(Some(
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==",
        )))
        .expect("credentials");
        assert_eq!(credential.name, "Aladdin");
        assert_eq!(credential.password, "open sesame");
    }

    #[rstest]
    #[case::missing(None)]
    #[case::other_scheme(Some("Bearer abc"))]
    #[case::bad_base64(Some("Basic !!!"))]
    #[case::no_colon(Some("Basic YWxhZGRpbg=="))]
    fn rejects_malformed_headers(#[case] header: Option<&'static str>) {
        assert!(basic_credentials(&request_with(header)).is_none());
    }

    #[test]
    fn table_loaded_from_config_matches_digester() {
        let digest = sha256_digester("pepper")("hunter2");
        let config = HashedUsersConfig {
            salt: "pepper".into(),
            users: vec![HashedUser {
                name: "bob".into(),
                hash: STANDARD.encode(digest),
            }],
            ..HashedUsersConfig::default()
        };
        let auth = UserHashedTableAuth::try_from(config).expect("valid config");
        let credential = UserPasswordCredential {
            name: "bob".into(),
            password: "hunter2".into(),
        };
        assert_eq!(
            auth.authenticate(&credential),
            Some(UserIdPrincipal { name: "bob".into() })
        );
    }

    #[test]
    fn rejects_unknown_algorithms_and_bad_hashes() {
        let config = HashedUsersConfig {
            hash_algorithm: "MD5".into(),
            ..HashedUsersConfig::default()
        };
        assert_eq!(
            UserHashedTableAuth::try_from(config).err(),
            Some(AuthConfigError::UnsupportedAlgorithm("MD5".into()))
        );

        let config = HashedUsersConfig {
            users: vec![HashedUser {
                name: "eve".into(),
                hash: "***".into(),
            }],
            ..HashedUsersConfig::default()
        };
        assert_eq!(
            UserHashedTableAuth::try_from(config).err(),
            Some(AuthConfigError::InvalidHash("eve".into()))
        );
    }

    #[test]
    fn digest_comparison_requires_equal_length() {
        assert!(digests_match(b"abc", b"abc"));
        assert!(!digests_match(b"abc", b"abd"));
        assert!(!digests_match(b"abc", b"abcd"));
    }
}
