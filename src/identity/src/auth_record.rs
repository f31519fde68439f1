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

//! Records of previously authenticated accounts.
//!
//! Interactive credentials return an [AuthenticationRecord] from
//! `authenticate()`. Applications can store the serialized record and use it
//! to seed a new credential, which then acquires tokens silently for the same
//! account without prompting the user.
//!
//! ```
//! # use azure_identity::auth_record::{AuthenticationRecord, serialize, deserialize};
//! let record = AuthenticationRecord {
//!     authority: "https://login.microsoftonline.com/my-tenant".into(),
//!     home_account_id: "uid.utid".into(),
//!     tenant_id: "my-tenant".into(),
//!     username: "user@contoso.com".into(),
//!     client_id: "my-client".into(),
//!     version: "1.0".into(),
//! };
//! let serialized = serialize(&record)?;
//! assert_eq!(deserialize(&serialized)?, record);
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! ```

use crate::authority::get_authority;
use crate::build_errors::Error as BuildError;
use crate::constants::{DEFAULT_TENANT_ID, LATEST_AUTHENTICATION_RECORD_VERSION};
use crate::engine::EngineAccount;
use regex::Regex;
use std::sync::LazyLock;

/// The non-secret details of a previously authenticated account.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    /// The authority host used to authenticate the account.
    pub authority: String,
    /// A unique identifier of the account.
    pub home_account_id: String,
    /// The tenant the account authenticated with.
    pub tenant_id: String,
    /// The user principal or service principal name of the account.
    pub username: String,
    /// The client id of the application which performed the authentication.
    pub client_id: String,
    /// The version of the record format.
    pub version: String,
}

/// Serializes a record to a compact JSON string.
pub fn serialize(record: &AuthenticationRecord) -> Result<String, BuildError> {
    serde_json::to_string(record).map_err(BuildError::parsing)
}

/// Deserializes a record produced by [serialize].
///
/// Fails if the record was produced by an unsupported version of the format.
pub fn deserialize(serialized: &str) -> Result<AuthenticationRecord, BuildError> {
    let value = serde_json::from_str::<serde_json::Value>(serialized).map_err(BuildError::parsing)?;
    if let Some(version) = value.get("version") {
        if version.as_str() != Some(LATEST_AUTHENTICATION_RECORD_VERSION) {
            return Err(BuildError::parsing("Unsupported AuthenticationRecord version"));
        }
    }
    let mut value = value;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("version")
            .or_insert_with(|| LATEST_AUTHENTICATION_RECORD_VERSION.into());
    }
    serde_json::from_value(value).map_err(BuildError::parsing)
}

static ENVIRONMENT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([a-z]*\.[a-z]*\.[a-z]*)").ok());

impl AuthenticationRecord {
    /// Converts an account returned by the token engine.
    pub(crate) fn from_engine_account(client_id: &str, account: &EngineAccount) -> Self {
        let tenant_id = if account.tenant_id.is_empty() {
            DEFAULT_TENANT_ID.to_string()
        } else {
            account.tenant_id.clone()
        };
        Self {
            authority: get_authority(&tenant_id, Some(&account.environment)),
            home_account_id: account.home_account_id.clone(),
            tenant_id,
            username: account.username.clone(),
            client_id: client_id.to_string(),
            version: LATEST_AUTHENTICATION_RECORD_VERSION.to_string(),
        }
    }

    /// Converts the record to the account representation of the token engine.
    pub(crate) fn to_engine_account(&self) -> EngineAccount {
        let environment = ENVIRONMENT_PATTERN
            .as_ref()
            .and_then(|re| re.find(&self.authority))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        EngineAccount {
            home_account_id: self.home_account_id.clone(),
            local_account_id: self.home_account_id.clone(),
            environment,
            tenant_id: self.tenant_id.clone(),
            username: self.username.clone(),
        }
    }
}
