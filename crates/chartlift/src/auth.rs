use chartlift_types::RegistryEndpoint;

/// Establishes credentials against a registry so later pushes and pulls are
/// authorized.
pub trait Authenticator {
    fn login(&self, endpoint: &RegistryEndpoint) -> anyhow::Result<()>;
}

/// Proof that an endpoint was authenticated. Read-only once created and
/// shared by every transfer of a run.
#[derive(Debug, Clone)]
pub struct RegistrySession {
    endpoint: RegistryEndpoint,
}

impl RegistrySession {
    pub(crate) fn new(endpoint: RegistryEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to authenticate against {endpoint}: {cause}")]
pub struct AuthError {
    pub endpoint: String,
    pub cause: String,
}

/// Log in once and wrap the endpoint in a session. Never retried.
pub fn authenticate(
    authenticator: &dyn Authenticator,
    endpoint: &RegistryEndpoint,
) -> Result<RegistrySession, AuthError> {
    if endpoint.base_url.trim().is_empty() {
        return Err(AuthError {
            endpoint: String::new(),
            cause: "registry base URL is empty".to_string(),
        });
    }

    authenticator.login(endpoint).map_err(|err| AuthError {
        endpoint: endpoint.base_url.clone(),
        cause: format!("{err:#}"),
    })?;

    Ok(RegistrySession::new(endpoint.clone()))
}
