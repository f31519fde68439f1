// Copyright 2025 Azure Identity for Rust Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors returned while acquiring tokens.
//!
//! Every credential in this crate reports failures using a small, closed set
//! of error categories. Applications (and the [chained credential]) inspect
//! the category using the `is_*()` predicates on [CredentialsError]:
//!
//! * [is_unavailable][CredentialsError::is_unavailable]: the credential
//!   cannot be used in this environment. A chain moves on to the next
//!   credential.
//! * [is_authentication_required][CredentialsError::is_authentication_required]:
//!   silent authentication failed, and interactive authentication is needed.
//! * [is_authentication_error][CredentialsError::is_authentication_error]:
//!   the identity provider rejected the request.
//! * [is_aggregate][CredentialsError::is_aggregate]: every credential in a
//!   chain failed.
//!
//! [chained credential]: crate::credentials::chained

use crate::credentials::GetTokenOptions;
use http::StatusCode;
use std::sync::Arc;

type ArcError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [TokenCredential][crate::credentials::TokenCredential]
/// operations.
///
/// Applications rarely need to create instances of this error type. The
/// exception might be when writing their own credentials, or when testing
/// application code.
#[derive(thiserror::Error, Clone, Debug)]
#[error(transparent)]
pub struct CredentialsError(ErrorKind);

impl CredentialsError {
    /// The credential cannot be used in the current environment.
    ///
    /// Missing environment variables, tools that are not installed, or a
    /// managed identity endpoint that cannot be reached are examples of this
    /// condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.0, ErrorKind::Unavailable { .. })
    }

    /// Silent authentication failed, the application needs to authenticate
    /// interactively.
    pub fn is_authentication_required(&self) -> bool {
        matches!(self.0, ErrorKind::AuthenticationRequired(_))
    }

    /// The identity provider returned an error response.
    pub fn is_authentication_error(&self) -> bool {
        matches!(self.0, ErrorKind::Authentication(_))
    }

    /// All the credentials in a chain failed.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.0, ErrorKind::Aggregate { .. })
    }

    /// The credential configuration is invalid.
    ///
    /// These errors are never retried, the application needs to change its
    /// configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self.0, ErrorKind::Configuration { .. })
    }

    /// The caller cancelled the request.
    pub fn is_aborted(&self) -> bool {
        matches!(self.0, ErrorKind::Aborted(_))
    }

    /// A transport or I/O problem prevented the credential from completing
    /// the request.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ErrorKind::Transport { .. })
    }

    /// The HTTP status code returned by the identity provider, if any.
    pub fn status_code(&self) -> Option<u16> {
        match &self.0 {
            ErrorKind::Authentication(e) => Some(e.status),
            ErrorKind::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// The OAuth error response returned by the identity provider, if any.
    pub fn error_response(&self) -> Option<&AuthenticationErrorResponse> {
        match &self.0 {
            ErrorKind::Authentication(e) => Some(&e.response),
            _ => None,
        }
    }

    /// The scopes of a request that requires interactive authentication.
    pub fn scopes(&self) -> Option<&[String]> {
        match &self.0 {
            ErrorKind::AuthenticationRequired(e) => Some(&e.scopes),
            _ => None,
        }
    }

    /// The options of a request that requires interactive authentication.
    pub fn get_token_options(&self) -> Option<&GetTokenOptions> {
        match &self.0 {
            ErrorKind::AuthenticationRequired(e) => Some(&e.options),
            _ => None,
        }
    }

    /// The individual errors of a failed chain.
    pub fn errors(&self) -> &[CredentialsError] {
        match &self.0 {
            ErrorKind::Aggregate { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Creates an error indicating the credential is not available.
    pub fn unavailable<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Unavailable {
            message: message.into(),
            source: None,
        })
    }

    /// Creates an error indicating the request requires interactive
    /// authentication.
    pub fn authentication_required<T: Into<String>>(
        message: T,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Self {
        Self(ErrorKind::AuthenticationRequired(Box::new(
            AuthenticationRequired {
                message: message.into(),
                scopes: scopes.to_vec(),
                options: options.clone(),
            },
        )))
    }

    /// Creates an error from a failed HTTP response of the identity provider.
    ///
    /// The `body` is parsed as an OAuth 2.0 error response. Unparseable bodies
    /// produce a generic error description.
    pub fn authentication(status: u16, body: &str) -> Self {
        Self::authentication_from_response(status, AuthenticationErrorResponse::parse(status, body))
    }

    /// Creates an error from an already-parsed OAuth 2.0 error response.
    pub fn authentication_from_response(status: u16, response: AuthenticationErrorResponse) -> Self {
        Self(ErrorKind::Authentication(Box::new(AuthenticationError {
            status,
            response,
        })))
    }

    /// Creates an error bundling the failures of several credentials.
    pub fn aggregate<T: Into<String>>(message: T, errors: Vec<CredentialsError>) -> Self {
        Self(ErrorKind::Aggregate {
            message: message.into(),
            errors,
        })
    }

    pub(crate) fn unavailable_from_source<M, S>(message: M, source: S) -> Self
    where
        M: Into<String>,
        S: std::error::Error + Send + Sync + 'static,
    {
        Self(ErrorKind::Unavailable {
            message: message.into(),
            source: Some(Arc::new(source)),
        })
    }

    pub(crate) fn configuration<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Configuration {
            message: message.into(),
            source: None,
        })
    }

    pub(crate) fn configuration_from_source<M, S>(message: M, source: S) -> Self
    where
        M: Into<String>,
        S: std::error::Error + Send + Sync + 'static,
    {
        Self(ErrorKind::Configuration {
            message: message.into(),
            source: Some(Arc::new(source)),
        })
    }

    pub(crate) fn aborted<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Aborted(message.into()))
    }

    pub(crate) fn transport<M, S>(message: M, source: S) -> Self
    where
        M: Into<String>,
        S: std::error::Error + Send + Sync + 'static,
    {
        Self(ErrorKind::Transport {
            message: message.into(),
            status: None,
            source: Some(Arc::new(source)),
        })
    }

    pub(crate) fn transport_from_msg<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::Transport {
            message: message.into(),
            status: None,
            source: None,
        })
    }

    /// Returns the message without any category prefix.
    pub(crate) fn message(&self) -> String {
        self.0.to_string()
    }

    /// True for `reqwest` connect errors.
    pub(crate) fn is_connect(&self) -> bool {
        match &self.0 {
            ErrorKind::Transport {
                source: Some(source),
                ..
            } => source
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| e.is_connect()),
            _ => false,
        }
    }
}

#[derive(thiserror::Error, Clone, Debug)]
enum ErrorKind {
    #[error("{message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<ArcError>,
    },
    #[error("{}", .0.message)]
    AuthenticationRequired(Box<AuthenticationRequired>),
    #[error("{0}")]
    Authentication(Box<AuthenticationError>),
    #[error("{message}\n{}", join_messages(.errors))]
    Aggregate {
        message: String,
        errors: Vec<CredentialsError>,
    },
    #[error("{message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<ArcError>,
    },
    #[error("{0}")]
    Aborted(String),
    #[error("{message}")]
    Transport {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<ArcError>,
    },
}

fn join_messages(errors: &[CredentialsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Debug)]
struct AuthenticationRequired {
    message: String,
    scopes: Vec<String>,
    options: GetTokenOptions,
}

#[derive(Clone, Debug)]
struct AuthenticationError {
    status: u16,
    response: AuthenticationErrorResponse,
}

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Status code: {}\nMore details:\n{}",
            self.response.error, self.status, self.response.error_description
        )
    }
}

/// The OAuth 2.0 error response returned by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthenticationErrorResponse {
    /// The error code, for example `invalid_client`.
    pub error: String,
    /// A human readable description of the error.
    #[serde(default)]
    pub error_description: String,
    /// Numeric error codes specific to the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_codes: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuthenticationErrorResponse {
    /// Creates a response with just the error code and description.
    pub fn new<E: Into<String>, D: Into<String>>(error: E, error_description: D) -> Self {
        Self {
            error: error.into(),
            error_description: error_description.into(),
            ..Default::default()
        }
    }

    fn parse(status: u16, body: &str) -> Self {
        match serde_json::from_str::<AuthenticationErrorResponse>(body) {
            Ok(response) => response,
            Err(_) if status == 400 => Self::new(
                "authority_not_found",
                "The specified authority URL was not found.",
            ),
            Err(_) => Self::new(
                "unknown_error",
                format!("An unknown error has occurred. Response body:\n\n{body}"),
            ),
        }
    }
}

/// Returns true if the HTTP status indicates a transient problem.
pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
