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

use std::time::Duration;

/// The client id of the Azure development tools, used by interactive
/// credentials when the application does not provide its own.
pub(crate) const DEVELOPER_SIGN_ON_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
pub(crate) const DEFAULT_TENANT_ID: &str = "common";
pub(crate) const ORGANIZATIONS_TENANT_ID: &str = "organizations";
pub(crate) const ADFS_TENANT_ID: &str = "adfs";
pub(crate) const ALL_TENANTS: &str = "*";

pub(crate) const CACHE_CAE_SUFFIX: &str = ".cae";
pub(crate) const CACHE_NON_CAE_SUFFIX: &str = ".nocae";
pub(crate) const DEFAULT_CACHE_NAME: &str = "msal.cache";

/// Continuous access evaluation client capability.
pub(crate) const CAE_CLIENT_CAPABILITY: &str = "cp1";

pub(crate) const LATEST_AUTHENTICATION_RECORD_VERSION: &str = "1.0";
pub(crate) const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bounds the external processes used by developer credentials.
pub(crate) const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) const NO_CORRELATION_ID: &str = "noCorrelationId";

/// OAuth grant types.
pub(crate) const CLIENT_CREDENTIALS_GRANT_TYPE: &str = "client_credentials";
pub(crate) const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
pub(crate) const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";
pub(crate) const PASSWORD_GRANT_TYPE: &str = "password";
pub(crate) const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub(crate) const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
