//! The access-guard state machine.

use crate::api::{AccessLevel, ApiError, ResourceRequest, ShareApi};
use crate::DeviceId;
use thiserror::Error;

/// Why a visit was denied. The generic variant deliberately does not say
/// whether the token was invalid, out of scope, or the backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedReason {
    /// The resource is protected and the request carried no token.
    TokenRequired,
    /// Everything else: invalid token, scope mismatch, backend failure.
    AccessDenied,
}

impl std::fmt::Display for DeniedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeniedReason::TokenRequired => f.write_str("token required"),
            DeniedReason::AccessDenied => f.write_str("access denied"),
        }
    }
}

/// Guard states for one page load. `Allowed` and `Denied` are terminal;
/// `VerificationNeeded` moves to `Allowed` after a successful code check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Allowed,
    Denied(DeniedReason),
    VerificationNeeded,
}

#[derive(Debug, Error)]
pub enum GuardError {
    /// The requested action does not apply in the current state.
    #[error("no verification is pending")]
    NotVerifying,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Client-resident decision procedure: given a token and a device
/// identifier, decides whether this visitor may view a protected resource
/// and drives the code-entry challenge when a new device shows up.
pub struct AccessGuard<A: ShareApi> {
    api: A,
    device_id: DeviceId,
    token: Option<String>,
    state: GuardState,
}

impl<A: ShareApi> AccessGuard<A> {
    /// `token` is whatever the opened share link carried, if anything; the
    /// device identifier is the client's persisted one.
    pub fn new(api: A, device_id: DeviceId, token: Option<String>) -> Self {
        Self {
            api,
            device_id,
            token,
            state: GuardState::Checking,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// The credential currently in use. After a successful verification this
    /// is the verified invitation's token; persist it with the device id.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Evaluate the transition rules once for a page load.
    pub async fn evaluate(&mut self, resource: &ResourceRequest) -> GuardState {
        self.state = self.evaluate_rules(resource).await;
        self.state
    }

    async fn evaluate_rules(&self, resource: &ResourceRequest) -> GuardState {
        let resolved = match self
            .api
            .resolve(resource, self.token.as_deref(), self.device_id.as_str())
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                // Fail closed: a resolution failure is indistinguishable
                // from an invalid token on purpose.
                tracing::warn!(error = %e, "Token resolution failed; denying access");
                return GuardState::Denied(DeniedReason::AccessDenied);
            }
        };

        if resolved.access_level != AccessLevel::TokenRequired {
            return GuardState::Allowed;
        }
        if self.token.is_none() {
            return GuardState::Denied(DeniedReason::TokenRequired);
        }
        if !resolved.token_valid {
            return GuardState::Denied(DeniedReason::AccessDenied);
        }
        if resolved.device_bound {
            return GuardState::Allowed;
        }
        GuardState::VerificationNeeded
    }

    /// Ask the service to email a fresh access code for the pending
    /// verification. Re-issuing overwrites any prior unexpired code.
    pub async fn request_code(&self) -> Result<(), GuardError> {
        if self.state != GuardState::VerificationNeeded {
            return Err(GuardError::NotVerifying);
        }
        let token = self.token.as_deref().ok_or(GuardError::NotVerifying)?;
        self.api.send_code(token).await?;
        Ok(())
    }

    /// Submit an entered code. On success the guard becomes `Allowed` for
    /// the rest of the session and carries the verified token; on failure
    /// the state stays `VerificationNeeded` so the reviewer can retry.
    pub async fn submit_code(
        &mut self,
        project_id: &str,
        email: &str,
        code: &str,
    ) -> Result<GuardState, GuardError> {
        if self.state != GuardState::VerificationNeeded {
            return Err(GuardError::NotVerifying);
        }

        let token = self
            .api
            .verify_code(project_id, email, code, self.device_id.as_str())
            .await?;

        self.token = Some(token);
        self.state = GuardState::Allowed;
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResolvedAccess;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted backend: each call pops the next queued response.
    #[derive(Default)]
    struct MockApi {
        resolve_responses: Mutex<Vec<Result<ResolvedAccess, ApiError>>>,
        verify_responses: Mutex<Vec<Result<String, ApiError>>>,
        send_code_calls: Mutex<u32>,
    }

    impl MockApi {
        fn with_resolve(response: Result<ResolvedAccess, ApiError>) -> Self {
            let mock = Self::default();
            mock.resolve_responses.lock().unwrap().push(response);
            mock
        }
    }

    fn api_error() -> ApiError {
        ApiError::Api {
            status: 500,
            message: "Internal server error".to_string(),
        }
    }

    #[async_trait]
    impl ShareApi for MockApi {
        async fn resolve(
            &self,
            _resource: &ResourceRequest,
            _token: Option<&str>,
            _device_id: &str,
        ) -> Result<ResolvedAccess, ApiError> {
            self.resolve_responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(api_error()))
        }

        async fn send_code(&self, _token: &str) -> Result<(), ApiError> {
            *self.send_code_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn verify_code(
            &self,
            _project_id: &str,
            _email: &str,
            _code: &str,
            _device_id: &str,
        ) -> Result<String, ApiError> {
            self.verify_responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(api_error()))
        }
    }

    fn device() -> DeviceId {
        DeviceId::from("dev1".to_string())
    }

    fn token() -> Option<String> {
        Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string())
    }

    #[tokio::test]
    async fn open_resources_are_allowed_without_a_token() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::Open,
            token_valid: false,
            device_bound: false,
        }));
        let mut guard = AccessGuard::new(api, device(), None);
        assert_eq!(guard.state(), GuardState::Checking);
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::Allowed);
    }

    #[tokio::test]
    async fn protected_resource_without_a_token_is_denied() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::TokenRequired,
            token_valid: false,
            device_bound: false,
        }));
        let mut guard = AccessGuard::new(api, device(), None);
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::Denied(DeniedReason::TokenRequired));
    }

    #[tokio::test]
    async fn invalid_token_is_denied_generically() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::TokenRequired,
            token_valid: false,
            device_bound: false,
        }));
        let mut guard = AccessGuard::new(api, device(), token());
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::Denied(DeniedReason::AccessDenied));
    }

    #[tokio::test]
    async fn resolver_failure_fails_closed() {
        let api = MockApi::with_resolve(Err(api_error()));
        let mut guard = AccessGuard::new(api, device(), token());
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::Denied(DeniedReason::AccessDenied));
    }

    #[tokio::test]
    async fn bound_devices_are_allowed_without_a_challenge() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::TokenRequired,
            token_valid: true,
            device_bound: true,
        }));
        let mut guard = AccessGuard::new(api, device(), token());
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::Allowed);
    }

    #[tokio::test]
    async fn unbound_devices_go_through_verification() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::TokenRequired,
            token_valid: true,
            device_bound: false,
        }));
        api.verify_responses
            .lock()
            .unwrap()
            .push(Ok("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string()));

        let mut guard = AccessGuard::new(api, device(), token());
        let state = guard.evaluate(&ResourceRequest::project("P1")).await;
        assert_eq!(state, GuardState::VerificationNeeded);

        guard.request_code().await.expect("code request");

        let state = guard
            .submit_code("P1", "a@x.com", "123456")
            .await
            .expect("verification");
        assert_eq!(state, GuardState::Allowed);
        // The verified invitation's token is now the durable credential.
        assert_eq!(guard.token(), Some("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
    }

    #[tokio::test]
    async fn failed_verification_keeps_the_challenge_open() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::TokenRequired,
            token_valid: true,
            device_bound: false,
        }));
        api.verify_responses.lock().unwrap().push(Err(ApiError::Api {
            status: 400,
            message: "Invalid access code".to_string(),
        }));

        let mut guard = AccessGuard::new(api, device(), token());
        guard.evaluate(&ResourceRequest::project("P1")).await;

        let result = guard.submit_code("P1", "a@x.com", "000000").await;
        assert!(result.is_err());
        assert_eq!(guard.state(), GuardState::VerificationNeeded);
    }

    #[tokio::test]
    async fn code_actions_require_a_pending_verification() {
        let api = MockApi::with_resolve(Ok(ResolvedAccess {
            access_level: AccessLevel::Open,
            token_valid: false,
            device_bound: false,
        }));
        let mut guard = AccessGuard::new(api, device(), None);
        guard.evaluate(&ResourceRequest::project("P1")).await;

        assert!(matches!(
            guard.request_code().await,
            Err(GuardError::NotVerifying)
        ));
        assert!(matches!(
            guard.submit_code("P1", "a@x.com", "123456").await,
            Err(GuardError::NotVerifying)
        ));
    }
}
