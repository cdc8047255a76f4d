// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service error taxonomy for the fleet manager.
//!
//! Every service call returns a [`ServiceError`] carrying an [`ErrorCode`]. The code
//! determines the HTTP status the error maps to, and the HTTP status decides how
//! reconcilers treat the failure:
//!
//! - **Client-class** errors (HTTP 4xx) are terminal. A request that hits one while being
//!   prepared is marked `failed` immediately.
//! - **Server-class** errors (HTTP 5xx) are retried until a time budget expires.
//!
//! Steps of a reconcile action chain additionally tag errors as recoverable or terminal
//! with [`ServiceError::recoverable`].

use thiserror::Error;

/// Numeric error codes with their HTTP mapping.
///
/// | Code | Variant | HTTP |
/// |------|---------|------|
/// | 4 | `Forbidden` | 403 |
/// | 5 | `MaxAllowedInstanceReached` | 403 |
/// | 6 | `Conflict` | 409 |
/// | 7 | `NotFound` | 404 |
/// | 8 | `Validation` | 400 |
/// | 9 | `General` | 500 |
/// | 15 | `Unauthenticated` | 401 |
/// | 21 | `BadRequest` | 400 |
/// | 24 | `TooManyInstancesReached` | 403 |
/// | 120 | `InsufficientQuota` | 403 |
/// | 121 | `FailedToCheckQuota` | 500 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Forbidden,
    MaxAllowedInstanceReached,
    Conflict,
    NotFound,
    Validation,
    General,
    Unauthenticated,
    BadRequest,
    TooManyInstancesReached,
    InsufficientQuota,
    FailedToCheckQuota,
}

impl ErrorCode {
    /// Numeric identifier of the code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Forbidden => 4,
            Self::MaxAllowedInstanceReached => 5,
            Self::Conflict => 6,
            Self::NotFound => 7,
            Self::Validation => 8,
            Self::General => 9,
            Self::Unauthenticated => 15,
            Self::BadRequest => 21,
            Self::TooManyInstancesReached => 24,
            Self::InsufficientQuota => 120,
            Self::FailedToCheckQuota => 121,
        }
    }

    /// HTTP status code the error maps to.
    #[must_use]
    pub fn http_code(self) -> u16 {
        match self {
            Self::Forbidden
            | Self::MaxAllowedInstanceReached
            | Self::TooManyInstancesReached
            | Self::InsufficientQuota => 403,
            Self::Conflict => 409,
            Self::NotFound => 404,
            Self::Validation | Self::BadRequest => 400,
            Self::Unauthenticated => 401,
            Self::General | Self::FailedToCheckQuota => 500,
        }
    }

    /// Short label used for the code in logs and metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Forbidden => "Forbidden",
            Self::MaxAllowedInstanceReached => "MaxAllowedInstanceReached",
            Self::Conflict => "Conflict",
            Self::NotFound => "NotFound",
            Self::Validation => "Validation",
            Self::General => "General",
            Self::Unauthenticated => "Unauthenticated",
            Self::BadRequest => "BadRequest",
            Self::TooManyInstancesReached => "TooManyInstancesReached",
            Self::InsufficientQuota => "InsufficientQuota",
            Self::FailedToCheckQuota => "FailedToCheckQuota",
        }
    }
}

/// Error returned by every service of the fleet manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("FLEETMGR-{}: {reason}", .code.code())]
pub struct ServiceError {
    /// Classification of the error
    pub code: ErrorCode,
    /// Human-readable reason, stored as `failed_reason` when a request fails
    pub reason: String,
    /// Underlying cause, if the error wraps another failure
    pub cause: Option<String>,
    recoverable: bool,
}

/// Result alias for service operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

impl ServiceError {
    #[must_use]
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            cause: None,
            recoverable: false,
        }
    }

    /// Wrap another failure, keeping its message as the cause.
    #[must_use]
    pub fn with_cause(
        code: ErrorCode,
        cause: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            cause: Some(cause.to_string()),
            ..Self::new(code, reason)
        }
    }

    #[must_use]
    pub fn general(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::General, reason)
    }

    #[must_use]
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, reason)
    }

    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, reason)
    }

    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, reason)
    }

    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, reason)
    }

    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, reason)
    }

    #[must_use]
    pub fn too_many_instances_reached(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::TooManyInstancesReached, reason)
    }

    #[must_use]
    pub fn max_allowed_instance_reached(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::MaxAllowedInstanceReached, reason)
    }

    #[must_use]
    pub fn insufficient_quota(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientQuota, reason)
    }

    #[must_use]
    pub fn failed_to_check_quota(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedToCheckQuota, reason)
    }

    /// Tag the error as recoverable: the operation that produced it may be retried.
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    #[must_use]
    pub fn http_code(&self) -> u16 {
        self.code.http_code()
    }

    /// True for HTTP 4xx errors. These are never retried.
    #[must_use]
    pub fn is_client_error_class(&self) -> bool {
        (400..500).contains(&self.http_code())
    }

    /// True for HTTP 5xx errors. These are retried within a time budget.
    #[must_use]
    pub fn is_server_error_class(&self) -> bool {
        self.http_code() >= 500
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::with_cause(ErrorCode::General, &err, err.to_string())
    }
}
