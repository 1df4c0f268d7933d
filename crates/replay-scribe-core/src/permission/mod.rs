//! Microphone permission gating.
//!
//! The OS-level permission broker is an external collaborator reached through
//! [`PermissionBackend`]. [`PermissionGateway`] wraps a backend and soft-fails:
//! a backend error is logged and reported as [`PermissionState::Undetermined`],
//! never propagated to the caller.

use crate::CoreResult;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

/// Tri-state microphone permission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// The user has not been asked yet.
    Undetermined,
    /// The user granted microphone access.
    Granted,
    /// The user refused microphone access.
    Denied,
}

impl PermissionState {
    /// Whether recording may proceed.
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

/// OS permission broker boundary.
///
/// `request_permissions` may prompt the user; `get_permissions` is a
/// non-prompting read. Both are fallible at this boundary; the gateway
/// absorbs the failures.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Prompt the user for microphone access if not yet decided.
    async fn request_permissions(&self) -> CoreResult<PermissionState>;

    /// Read the current grant without prompting.
    async fn get_permissions(&self) -> CoreResult<PermissionState>;
}

/// Soft-failing front for a [`PermissionBackend`].
///
/// Both operations are idempotent and touch nothing but the permission state.
pub struct PermissionGateway {
    backend: Arc<dyn PermissionBackend>,
}

impl PermissionGateway {
    /// Wrap a permission backend.
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self { backend }
    }

    /// Prompt the OS if the permission is not yet decided.
    ///
    /// Never fails: any backend error is logged and reported as
    /// [`PermissionState::Undetermined`].
    #[instrument(skip(self))]
    pub async fn request_permission(&self) -> PermissionState {
        match self.backend.request_permissions().await {
            Ok(state) => {
                debug!(?state, "Permission requested");
                state
            }
            Err(e) => {
                warn!(error = ?e, "Permission request failed, reporting undetermined");
                PermissionState::Undetermined
            }
        }
    }

    /// Non-prompting read of the current grant. Same soft-fail behaviour as
    /// [`Self::request_permission`].
    #[instrument(skip(self))]
    pub async fn check_status(&self) -> PermissionState {
        match self.backend.get_permissions().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = ?e, "Permission check failed, reporting undetermined");
                PermissionState::Undetermined
            }
        }
    }
}

/// Fixed-answer backend for hosts without a permission broker.
///
/// Desktop Linux has no microphone permission prompt; the binary wires the
/// session with `StaticPermissions::granted()`.
pub struct StaticPermissions {
    state: PermissionState,
}

impl StaticPermissions {
    /// Backend that always reports access granted.
    pub fn granted() -> Self {
        Self {
            state: PermissionState::Granted,
        }
    }

    /// Backend that always reports access denied.
    pub fn denied() -> Self {
        Self {
            state: PermissionState::Denied,
        }
    }
}

#[async_trait]
impl PermissionBackend for StaticPermissions {
    async fn request_permissions(&self) -> CoreResult<PermissionState> {
        Ok(self.state)
    }

    async fn get_permissions(&self) -> CoreResult<PermissionState> {
        Ok(self.state)
    }
}
