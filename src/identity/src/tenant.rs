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

//! Tenant validation and per-request tenant resolution.
//!
//! A credential is configured with a tenant. Individual token requests may
//! ask for a different tenant, which is only allowed if the tenant appears in
//! the credential's list of additionally allowed tenants, or if that list
//! contains the `"*"` wildcard.

use crate::constants::{
    ADFS_TENANT_ID, ALL_TENANTS, DEFAULT_TENANT_ID, DEVELOPER_SIGN_ON_CLIENT_ID,
    ORGANIZATIONS_TENANT_ID,
};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error};
use regex::Regex;
use std::sync::LazyLock;

static TENANT_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[0-9a-zA-Z-.:/]+$").ok());

const INVALID_TENANT_MESSAGE: &str = "Invalid tenant id provided. You can locate your tenant id by following the instructions listed here: https://docs.microsoft.com/partner-center/find-ids-and-domain-names.";

/// Returns true if `tenant_id` only uses the characters allowed in a tenant.
pub(crate) fn is_valid_tenant_id(tenant_id: &str) -> bool {
    TENANT_ID_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(tenant_id))
}

/// Validates the format of a tenant id.
///
/// An invalid tenant is a configuration problem, it is reported as such and
/// never as an unavailable credential.
pub(crate) fn check_tenant_id(logger: &CredentialLogger, tenant_id: &str) -> crate::Result<()> {
    if is_valid_tenant_id(tenant_id) {
        return Ok(());
    }
    logger.info(format_error(None, INVALID_TENANT_MESSAGE));
    Err(CredentialsError::configuration(INVALID_TENANT_MESSAGE))
}

/// Same as [check_tenant_id], for use in builders.
pub(crate) fn validate_tenant_id(tenant_id: &str) -> Result<(), crate::build_errors::Error> {
    if is_valid_tenant_id(tenant_id) {
        return Ok(());
    }
    Err(crate::build_errors::Error::invalid(INVALID_TENANT_MESSAGE))
}

/// Returns the configured tenant, or a default based on the client id.
///
/// Applications using the development tools client id (or no client id) can
/// only sign in with work or school accounts.
pub(crate) fn resolve_tenant_id(
    tenant_id: Option<&str>,
    client_id: Option<&str>,
) -> Result<String, crate::build_errors::Error> {
    if let Some(tenant_id) = tenant_id {
        validate_tenant_id(tenant_id)?;
        return Ok(tenant_id.to_string());
    }
    match client_id {
        None => Ok(ORGANIZATIONS_TENANT_ID.to_string()),
        Some(id) if id == DEVELOPER_SIGN_ON_CLIENT_ID => Ok(ORGANIZATIONS_TENANT_ID.to_string()),
        Some(_) => Ok(DEFAULT_TENANT_ID.to_string()),
    }
}

/// Normalizes a list of additionally allowed tenants.
pub(crate) fn resolve_additionally_allowed_tenant_ids<I, S>(tenants: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tenants = tenants.into_iter().map(Into::into).collect::<Vec<String>>();
    if tenants.iter().any(|t| t == ALL_TENANTS) {
        return vec![ALL_TENANTS.to_string()];
    }
    tenants
}

/// The inputs to [resolve].
#[derive(Clone, Debug, Default)]
pub(crate) struct TenantRequest<'a> {
    pub(crate) configured: Option<&'a str>,
    pub(crate) requested: Option<&'a str>,
    pub(crate) additionally_allowed: &'a [String],
    pub(crate) multi_tenant_disabled: bool,
}

/// Resolves the tenant for a single token request.
///
/// Returns `None` if neither the credential nor the request name a tenant.
pub(crate) fn resolve(
    request: TenantRequest<'_>,
    logger: &CredentialLogger,
) -> crate::Result<Option<String>> {
    let resolved = if request.multi_tenant_disabled || request.configured == Some(ADFS_TENANT_ID)
    {
        request.configured
    } else {
        request.requested.or(request.configured)
    };

    let Some(configured) = request.configured else {
        return Ok(resolved.map(str::to_string));
    };
    let Some(resolved) = resolved else {
        return Ok(None);
    };
    if resolved != configured
        && !request
            .additionally_allowed
            .iter()
            .any(|t| t == ALL_TENANTS || t == resolved)
    {
        let message = format!(
            "The current credential is not configured to acquire tokens for tenant {resolved}. To enable acquiring tokens for this tenant add it to the AdditionallyAllowedTenants on the credential options, or add \"*\" to AdditionallyAllowedTenants to allow acquiring tokens for any tenant."
        );
        logger.info(&message);
        return Err(CredentialsError::unavailable(message));
    }
    Ok(Some(resolved.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn logger() -> CredentialLogger {
        CredentialLogger::new("test")
    }

    #[test_case("72f988bf-86f1-41af-91ab-2d7cd011db47")]
    #[test_case("contoso.onmicrosoft.com")]
    #[test_case("adfs")]
    fn valid_tenants(tenant: &str) {
        assert!(check_tenant_id(&logger(), tenant).is_ok());
    }

    #[test_case("bad tenant")]
    #[test_case("tenant?id=1")]
    #[test_case("")]
    fn invalid_tenants(tenant: &str) {
        let err = check_tenant_id(&logger(), tenant).unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
        assert!(!err.is_unavailable(), "{err:?}");
        assert!(err.to_string().starts_with("Invalid tenant id provided."), "{err}");
    }

    #[test]
    fn default_tenant() {
        assert_eq!(resolve_tenant_id(None, None).unwrap(), "organizations");
        assert_eq!(
            resolve_tenant_id(None, Some(DEVELOPER_SIGN_ON_CLIENT_ID)).unwrap(),
            "organizations"
        );
        assert_eq!(resolve_tenant_id(None, Some("my-app")).unwrap(), "common");
        assert_eq!(
            resolve_tenant_id(Some("my-tenant"), Some("my-app")).unwrap(),
            "my-tenant"
        );
        assert!(resolve_tenant_id(Some("bad tenant"), None).is_err());
    }

    #[test]
    fn additionally_allowed() {
        assert_eq!(
            resolve_additionally_allowed_tenant_ids(["a", "*", "b"]),
            vec!["*"]
        );
        assert_eq!(resolve_additionally_allowed_tenant_ids(["a", "b"]), vec!["a", "b"]);
        assert!(resolve_additionally_allowed_tenant_ids(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn request_tenant_allowed() {
        let allowed = vec!["other".to_string()];
        let got = resolve(
            TenantRequest {
                configured: Some("home"),
                requested: Some("other"),
                additionally_allowed: &allowed,
                ..Default::default()
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("other"));
    }

    #[test]
    fn request_tenant_wildcard() {
        let allowed = vec!["*".to_string()];
        let got = resolve(
            TenantRequest {
                configured: Some("home"),
                requested: Some("anything"),
                additionally_allowed: &allowed,
                ..Default::default()
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("anything"));
    }

    #[test_case(&[]; "empty")]
    #[test_case(&["a", "b"]; "others")]
    fn request_tenant_rejected(allowed: &[&str]) {
        let allowed = allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let err = resolve(
            TenantRequest {
                configured: Some("home"),
                requested: Some("other"),
                additionally_allowed: &allowed,
                ..Default::default()
            },
            &logger(),
        )
        .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains("tenant other"), "{msg}");
        assert!(msg.contains("AdditionallyAllowedTenants"), "{msg}");
    }

    #[test_case(Some("other"); "override")]
    #[test_case(None; "no override")]
    fn adfs_ignores_request(requested: Option<&str>) {
        let got = resolve(
            TenantRequest {
                configured: Some("adfs"),
                requested,
                additionally_allowed: &[],
                ..Default::default()
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("adfs"));
    }

    #[test]
    fn multi_tenant_disabled() {
        let got = resolve(
            TenantRequest {
                configured: Some("home"),
                requested: Some("other"),
                additionally_allowed: &[],
                multi_tenant_disabled: true,
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("home"));
    }

    #[test]
    fn same_tenant_needs_no_allow_list() {
        let got = resolve(
            TenantRequest {
                configured: Some("home"),
                requested: Some("home"),
                additionally_allowed: &[],
                ..Default::default()
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("home"));
    }

    #[test]
    fn no_configured_tenant() {
        let got = resolve(
            TenantRequest {
                requested: Some("other"),
                ..Default::default()
            },
            &logger(),
        )
        .unwrap();
        assert_eq!(got.as_deref(), Some("other"));
    }
}
