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

//! A snapshot of the environment variables used to configure credentials.
//!
//! Credentials never read the process environment directly. Instead, their
//! builders capture an [Environment] once, when the credential is built. By
//! default the snapshot is taken from the process environment, applications
//! and tests can supply their own:
//!
//! ```
//! # use azure_identity::env::Environment;
//! let env = Environment::from_pairs([
//!     ("AZURE_TENANT_ID", "my-tenant"),
//!     ("AZURE_CLIENT_ID", "my-client"),
//! ]);
//! assert_eq!(env.get("AZURE_TENANT_ID"), Some("my-tenant"));
//! assert_eq!(env.get("AZURE_CLIENT_SECRET"), None);
//! ```

use std::collections::BTreeMap;

pub(crate) const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub(crate) const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub(crate) const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub(crate) const AZURE_CLIENT_CERTIFICATE_PATH: &str = "AZURE_CLIENT_CERTIFICATE_PATH";
pub(crate) const AZURE_CLIENT_CERTIFICATE_PASSWORD: &str = "AZURE_CLIENT_CERTIFICATE_PASSWORD";
pub(crate) const AZURE_CLIENT_SEND_CERTIFICATE_CHAIN: &str = "AZURE_CLIENT_SEND_CERTIFICATE_CHAIN";
pub(crate) const AZURE_USERNAME: &str = "AZURE_USERNAME";
pub(crate) const AZURE_PASSWORD: &str = "AZURE_PASSWORD";
pub(crate) const AZURE_ADDITIONALLY_ALLOWED_TENANTS: &str = "AZURE_ADDITIONALLY_ALLOWED_TENANTS";
pub(crate) const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub(crate) const AZURE_IDENTITY_DISABLE_MULTITENANTAUTH: &str =
    "AZURE_IDENTITY_DISABLE_MULTITENANTAUTH";
pub(crate) const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
pub(crate) const AZURE_REGIONAL_AUTHORITY_NAME: &str = "AZURE_REGIONAL_AUTHORITY_NAME";
pub(crate) const AZURE_POD_IDENTITY_AUTHORITY_HOST: &str = "AZURE_POD_IDENTITY_AUTHORITY_HOST";
pub(crate) const REGION_NAME: &str = "REGION_NAME";
pub(crate) const IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub(crate) const IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub(crate) const IDENTITY_SERVER_THUMBPRINT: &str = "IDENTITY_SERVER_THUMBPRINT";
pub(crate) const IMDS_ENDPOINT: &str = "IMDS_ENDPOINT";
pub(crate) const MSI_ENDPOINT: &str = "MSI_ENDPOINT";
pub(crate) const MSI_SECRET: &str = "MSI_SECRET";
pub(crate) const SYSTEM_ROOT: &str = "SystemRoot";

/// An immutable set of environment variables.
///
/// Empty values are treated as unset, matching how the Azure tooling
/// interprets these variables.
#[derive(Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Creates a snapshot from explicit name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Self { vars }
    }

    /// Returns a copy of this snapshot with `name` set to `value`.
    pub fn with<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        let value = value.into();
        let name = name.into();
        if value.is_empty() {
            self.vars.remove(&name);
        } else {
            self.vars.insert(name, value);
        }
        self
    }

    /// Returns the value of `name`, if set and not empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub(crate) fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    pub(crate) fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The list of additional tenants from `AZURE_ADDITIONALLY_ALLOWED_TENANTS`.
    pub(crate) fn additionally_allowed_tenants(&self) -> Vec<String> {
        self.get(AZURE_ADDITIONALLY_ALLOWED_TENANTS)
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if multi-tenant authentication is disabled.
    pub(crate) fn multi_tenant_disabled(&self) -> bool {
        self.is_set(AZURE_IDENTITY_DISABLE_MULTITENANTAUTH)
    }
}

// Values may contain secrets, only print the names.
impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}
