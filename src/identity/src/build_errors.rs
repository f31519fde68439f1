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

//! Errors created during credentials construction.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credential builders.
///
/// Builders report problems that the application must fix in its
/// configuration: missing parameters, conflicting options, unreadable or
/// malformed certificates and the like. These errors are never retried.
///
/// Applications rarely need to create instances of this error type. The
/// exception might be when testing application code, where the application is
/// mocking a client library behavior.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A problem finding or opening a file, such as a certificate.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// A problem parsing a certificate, a private key, or a serialized record.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_))
    }

    /// A required field was missing from the builder.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// A field has an invalid value, for example a malformed tenant id.
    pub fn is_invalid(&self) -> bool {
        matches!(self.0, ErrorKind::Invalid(_))
    }

    /// Two mutually exclusive fields were set.
    pub fn is_conflict(&self) -> bool {
        matches!(self.0, ErrorKind::Conflict(_))
    }

    /// Create an error representing problems loading or reading a file.
    pub(crate) fn loading<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Loading(source.into()))
    }

    /// A problem parsing a credential specification.
    pub(crate) fn parsing<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Parsing(source.into()))
    }

    /// A required field was missing from the builder.
    pub(crate) fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }

    /// A field has an invalid value.
    pub(crate) fn invalid<T>(message: T) -> Error
    where
        T: Into<String>,
    {
        Error(ErrorKind::Invalid(message.into()))
    }

    /// Mutually exclusive fields were set.
    pub(crate) fn conflict<T>(message: T) -> Error
    where
        T: Into<String>,
    {
        Error(ErrorKind::Conflict(message.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("could not find or open the file {0}")]
    Loading(#[source] BoxError),
    #[error("cannot parse the credential {0}")]
    Parsing(#[source] BoxError),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
}

impl From<Error> for crate::errors::CredentialsError {
    fn from(value: Error) -> Self {
        crate::errors::CredentialsError::configuration_from_source(value.to_string(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn constructors() {
        let error = Error::loading("test message");
        assert!(error.is_loading(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::parsing("test message");
        assert!(error.is_parsing(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::missing_field("test field");
        assert!(error.is_missing_field(), "{error:?}");
        assert!(error.source().is_none(), "{error:?}");
        assert!(error.to_string().contains("test field"), "{error}");

        let error = Error::invalid("test message");
        assert!(error.is_invalid(), "{error:?}");
        assert_eq!(error.to_string(), "test message");

        let error = Error::conflict("test message");
        assert!(error.is_conflict(), "{error:?}");
        assert_eq!(error.to_string(), "test message");
    }

    #[test]
    fn into_credentials_error() {
        let error: crate::errors::CredentialsError = Error::missing_field("client_id").into();
        assert!(error.is_configuration(), "{error:?}");
        assert!(error.to_string().contains("client_id"), "{error}");
    }
}
