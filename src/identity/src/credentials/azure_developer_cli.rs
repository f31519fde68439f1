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

//! Azure Developer CLI credentials.
//!
//! Uses the account signed in to the Azure Developer CLI
//! (`azd auth login`), by running `azd auth token` for every request.

use crate::BuildResult;
use crate::cli::{ProcessError, ProcessRunner, ToolConfig, ensure_valid_scope};
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::token::{AccessToken, parse_date_millis};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const CREDENTIAL_NAME: &str = "AzureDeveloperCliCredential";
const NOT_INSTALLED_MESSAGE: &str = "Azure Developer CLI couldn't be found. To mitigate this issue, see the troubleshooting guidelines at https://aka.ms/azsdk/js/identity/azdevclicredential/troubleshoot.";
const LOGIN_MESSAGE: &str = "Please run 'azd auth login' from a command prompt to authenticate before using this credential. For more information, see the troubleshooting guidelines at https://aka.ms/azsdk/js/identity/azdevclicredential/troubleshoot.";

static NOT_FOUND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("azd:(.*)not found").ok());

/// A builder for [AzureDeveloperCliCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    process_timeout: Option<Duration>,
    options: TokenCredentialOptions,
    runner: Option<Arc<dyn ProcessRunner>>,
}

impl Builder {
    /// Request tokens for this tenant.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the time allowed for `azd` to answer.
    ///
    /// The default is 10 seconds.
    pub fn with_process_timeout(mut self, v: Duration) -> Self {
        self.process_timeout = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    #[cfg(test)]
    fn with_runner<T: ProcessRunner + 'static>(mut self, v: T) -> Self {
        self.runner = Some(Arc::new(v));
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<AzureDeveloperCliCredential> {
        Ok(AzureDeveloperCliCredential {
            config: ToolConfig::new(
                self.tenant_id,
                self.process_timeout,
                &self.options,
                self.runner,
            )?,
            logger: CredentialLogger::new(CREDENTIAL_NAME),
        })
    }
}

/// Obtains tokens from the Azure Developer CLI.
#[derive(Debug)]
pub struct AzureDeveloperCliCredential {
    config: ToolConfig,
    logger: CredentialLogger,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    expires_on: String,
}

fn is_not_installed(stderr: &str) -> bool {
    NOT_FOUND.as_ref().is_some_and(|re| re.is_match(stderr))
        || stderr.starts_with("'azd' is not recognized")
}

fn is_login_error(stderr: &str) -> bool {
    stderr.contains("not logged in, run `azd login` to login")
        || stderr.contains("not logged in, run `azd auth login` to login")
}

impl AzureDeveloperCliCredential {
    async fn token(&self, scopes: &[String], tenant: Option<&str>) -> Result<AccessToken> {
        let mut args = ["auth", "token", "--output", "json"]
            .map(String::from)
            .to_vec();
        for scope in scopes {
            args.extend(["--scope".to_string(), scope.clone()]);
        }
        if let Some(t) = tenant {
            args.extend(["--tenant-id".to_string(), t.to_string()]);
        }
        let output = match self.config.run("azd", args, CREDENTIAL_NAME).await? {
            Ok(o) => o,
            Err(ProcessError::NotFound(_)) => {
                return Err(CredentialsError::unavailable(NOT_INSTALLED_MESSAGE));
            }
            Err(e) => return Err(CredentialsError::unavailable(e.to_string())),
        };
        if is_not_installed(&output.stderr) {
            return Err(CredentialsError::unavailable(NOT_INSTALLED_MESSAGE));
        }
        if is_login_error(&output.stderr) {
            return Err(CredentialsError::unavailable(LOGIN_MESSAGE));
        }
        let parsed = serde_json::from_str::<AzdToken>(&output.stdout)
            .ok()
            .and_then(|t| Some(AccessToken::new(t.token, parse_date_millis(&t.expires_on)?)));
        parsed.ok_or_else(|| match output.stderr.trim() {
            "" => CredentialsError::unavailable(format!(
                "{CREDENTIAL_NAME}: unexpected output from azd: {}",
                output.stdout
            )),
            stderr => CredentialsError::unavailable(stderr),
        })
    }
}

#[async_trait::async_trait]
impl TokenCredential for AzureDeveloperCliCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let tenant = self.config.tenant(options, &self.logger)?;
        for scope in scopes {
            ensure_valid_scope(scope, &self.logger)?;
        }
        self.logger
            .get_token()
            .info(format!("Using the scopes {}", scopes.join(", ")));
        let result = self.token(scopes, tenant.as_deref()).await;
        match &result {
            Ok(_) => self.logger.get_token().info(format_success(scopes)),
            Err(e) => self.logger.get_token().info(format_error(Some(scopes), e)),
        }
        result
    }
}
