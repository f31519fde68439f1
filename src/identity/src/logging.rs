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

//! Log line formatting shared by all credentials.

use crate::env::Environment;
use std::fmt::Display;

/// Formats a successful token request.
pub(crate) fn format_success(scopes: &[String]) -> String {
    format!("SUCCESS. Scopes: {}.", scopes.join(", "))
}

/// Formats a failed token request.
pub(crate) fn format_error<E: Display + ?Sized>(scopes: Option<&[String]>, error: &E) -> String {
    match scopes {
        Some(scopes) => format!(
            "ERROR. Scopes: {}. Error message: {error}.",
            scopes.join(", ")
        ),
        None => format!("ERROR. Error message: {error}."),
    }
}

/// A `tracing` front-end that prefixes every line with the credential name.
///
/// Credentials create one logger for the type, and use
/// [get_token][CredentialLogger::get_token] to scope the lines of a token
/// request: `ManagedIdentityCredential => getToken() => SUCCESS. ...`.
#[derive(Clone, Debug)]
pub(crate) struct CredentialLogger {
    title: String,
}

impl CredentialLogger {
    pub(crate) fn new<T: Into<String>>(title: T) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub(crate) fn get_token(&self) -> Self {
        Self::new(format!("{} => getToken()", self.title))
    }

    pub(crate) fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn info<M: Display>(&self, message: M) {
        tracing::info!("{} => {message}", self.title);
    }

    pub(crate) fn warning<M: Display>(&self, message: M) {
        tracing::warn!("{} => {message}", self.title);
    }

    pub(crate) fn verbose<M: Display>(&self, message: M) {
        tracing::debug!("{} => {message}", self.title);
    }

    /// Logs which of `names` are set in `env`.
    pub(crate) fn env_vars(&self, names: &[&str], env: &Environment) {
        let found = names
            .iter()
            .filter(|n| env.is_set(n))
            .copied()
            .collect::<Vec<_>>();
        self.info(format!(
            "Found the following environment variables: {}",
            found.join(", ")
        ));
    }
}
