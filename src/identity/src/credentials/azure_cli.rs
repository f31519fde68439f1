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

//! Azure CLI credentials.
//!
//! Uses the account signed in to the [Azure CLI] (`az login`). The credential
//! runs `az account get-access-token` for every token request.
//!
//! [Azure CLI]: https://learn.microsoft.com/cli/azure/

use crate::BuildResult;
use crate::cli::{
    ProcessError, ProcessOutput, ProcessRunner, ToolConfig, ensure_valid_scope, scope_resource,
    single_scope,
};
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::token::{AccessToken, parse_date_millis};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const CREDENTIAL_NAME: &str = "AzureCliCredential";
const NOT_INSTALLED_MESSAGE: &str = "Azure CLI could not be found. Please visit https://aka.ms/azure-cli for installation instructions and then, once installed, authenticate to your Azure account using 'az login'.";
const LOGIN_MESSAGE: &str =
    "Please run 'az login' from a command prompt to authenticate before using this credential.";

static NOT_FOUND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("az:(.*)not found").ok());

/// A builder for [AzureCliCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    process_timeout: Option<Duration>,
    options: TokenCredentialOptions,
    runner: Option<Arc<dyn ProcessRunner>>,
}

impl Builder {
    /// Request tokens for this tenant instead of the CLI's default tenant.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the time allowed for the CLI to answer.
    ///
    /// The default is 10 seconds.
    pub fn with_process_timeout(mut self, v: Duration) -> Self {
        self.process_timeout = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    ///
    /// Only the additionally allowed tenants and the environment apply to
    /// this credential.
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
    ///
    /// Fails if the tenant id is malformed.
    pub fn build(self) -> BuildResult<AzureCliCredential> {
        Ok(AzureCliCredential {
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

/// Obtains tokens from the Azure CLI.
#[derive(Debug)]
pub struct AzureCliCredential {
    config: ToolConfig,
    logger: CredentialLogger,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_seconds: Option<i64>,
}

impl AzureCliCredential {
    async fn run(
        &self,
        resource: &str,
        tenant: Option<&str>,
    ) -> Result<std::result::Result<ProcessOutput, ProcessError>> {
        let mut args = [
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            resource,
        ]
        .map(String::from)
        .to_vec();
        if let Some(t) = tenant {
            args.extend(["--tenant".to_string(), t.to_string()]);
        }
        self.config.run("az", args, CREDENTIAL_NAME).await
    }

    fn classify(output: ProcessOutput) -> Result<AccessToken> {
        let stderr = output.stderr.as_str();
        if NOT_FOUND.as_ref().is_some_and(|re| re.is_match(stderr))
            || stderr.starts_with("'az' is not recognized")
        {
            return Err(CredentialsError::unavailable(NOT_INSTALLED_MESSAGE));
        }
        if stderr.contains("az login") && !stderr.contains("az login --scope") {
            return Err(CredentialsError::unavailable(LOGIN_MESSAGE));
        }
        parse_token(&output.stdout).ok_or_else(|| {
            if stderr.is_empty() {
                CredentialsError::unavailable(format!(
                    "{CREDENTIAL_NAME}: unexpected output from the Azure CLI: {}",
                    output.stdout
                ))
            } else {
                CredentialsError::unavailable(stderr.trim())
            }
        })
    }
}

fn parse_token(stdout: &str) -> Option<AccessToken> {
    let token = serde_json::from_str::<CliToken>(stdout).ok()?;
    let expires_on = match token.expires_on_seconds {
        Some(seconds) => seconds.checked_mul(1000)?,
        None => parse_date_millis(token.expires_on.as_deref()?)?,
    };
    Some(AccessToken::new(token.access_token, expires_on))
}

#[async_trait::async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let tenant = self.config.tenant(options, &self.logger)?;
        let scope = single_scope(scopes, CREDENTIAL_NAME)?;
        let result = async {
            ensure_valid_scope(scope, &self.logger)?;
            let output = match self.run(scope_resource(scope), tenant.as_deref()).await? {
                Ok(o) => o,
                Err(ProcessError::NotFound(_)) => {
                    return Err(CredentialsError::unavailable(NOT_INSTALLED_MESSAGE));
                }
                Err(e) => return Err(CredentialsError::unavailable(e.to_string())),
            };
            Self::classify(output)
        }
        .await;
        match &result {
            Ok(_) => self.logger.get_token().info(format_success(scopes)),
            Err(e) => self.logger.get_token().info(format_error(Some(scopes), e)),
        }
        result
    }
}
