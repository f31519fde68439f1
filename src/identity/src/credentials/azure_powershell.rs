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

//! Azure PowerShell credentials.
//!
//! Uses the account signed in to the Azure Az PowerShell module
//! (`Connect-AzAccount`), by running `Get-AzAccessToken` for every request.
//!
//! The credential tries `pwsh`, and on Windows also `powershell`. A shell
//! that cannot start is not tried again by the same credential.

use crate::BuildResult;
use crate::cli::{
    ProcessError, ProcessOutput, ProcessRunner, ToolConfig, ensure_valid_scope, scope_resource,
    single_scope,
};
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::token::{AccessToken, parse_date_millis};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CREDENTIAL_NAME: &str = "AzurePowerShellCredential";

const LOGIN_ERROR: &str = "Run Connect-AzAccount to login";
const NOT_INSTALLED_ERROR: &str = "The specified module 'Az.Accounts' with version '2.2.0' was not loaded because no valid module file was found in any module directory";

const LOGIN_MESSAGE: &str =
    "Please run 'Connect-AzAccount' from PowerShell to authenticate before using this credential.";
const NOT_INSTALLED_MESSAGE: &str = "The 'Az.Account' module >= 2.2.0 is not installed. Install the Azure Az PowerShell module with: \"Install-Module -Name Az -Scope CurrentUser -Repository PSGallery -Force\".";
const TROUBLESHOOT_MESSAGE: &str =
    "To troubleshoot, visit https://aka.ms/azsdk/js/identity/powershellcredential/troubleshoot.";

/// The executable name of `shell` on this platform.
fn format_command(shell: &str) -> String {
    if cfg!(windows) {
        return format!("{shell}.exe");
    }
    shell.to_string()
}

/// The shells to try, in order.
fn candidate_shells() -> Vec<String> {
    let mut shells = vec![format_command("pwsh")];
    if cfg!(windows) {
        shells.push(format_command("powershell"));
    }
    shells
}

/// A builder for [AzurePowerShellCredential].
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

    /// Sets the time allowed for each PowerShell command.
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
    pub fn build(self) -> BuildResult<AzurePowerShellCredential> {
        Ok(AzurePowerShellCredential {
            config: ToolConfig::new(
                self.tenant_id,
                self.process_timeout,
                &self.options,
                self.runner,
            )?,
            unusable: Mutex::new(HashSet::new()),
            logger: CredentialLogger::new(CREDENTIAL_NAME),
        })
    }
}

/// Obtains tokens from Azure PowerShell.
#[derive(Debug)]
pub struct AzurePowerShellCredential {
    config: ToolConfig,
    // Shells that failed to start.
    unusable: Mutex<HashSet<String>>,
    logger: CredentialLogger,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PowerShellToken {
    token: String,
    expires_on: String,
}

/// A failure from a PowerShell command, its message is the stderr output
/// when there is some.
#[derive(Debug)]
struct CommandError(String);

impl AzurePowerShellCredential {
    fn shells(&self) -> Vec<String> {
        let unusable = self.unusable.lock().map(|u| u.clone()).unwrap_or_default();
        candidate_shells()
            .into_iter()
            .filter(|s| !unusable.contains(s))
            .collect()
    }

    async fn command(
        &self,
        shell: &str,
        args: &[&str],
    ) -> std::result::Result<ProcessOutput, CommandError> {
        let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        let output = self
            .config
            .runner
            .run(shell, &args, None, self.config.timeout)
            .await
            .map_err(|e: ProcessError| CommandError(e.to_string()))?;
        if !output.stderr.trim().is_empty() {
            return Err(CommandError(output.stderr.trim().to_string()));
        }
        if !output.success {
            return Err(CommandError(format!("{shell} exited with an error")));
        }
        Ok(output)
    }

    async fn access_token(
        &self,
        resource: &str,
        tenant: Option<&str>,
    ) -> std::result::Result<PowerShellToken, CommandError> {
        for shell in self.shells() {
            if self.command(&shell, &["/?"]).await.is_err() {
                if let Ok(mut unusable) = self.unusable.lock() {
                    unusable.insert(shell);
                }
                continue;
            }
            let tenant_section = tenant
                .map(|t| format!("-TenantId \"{t}\""))
                .unwrap_or_default();
            self.command(
                &shell,
                &[
                    "-Command",
                    "Import-Module Az.Accounts -MinimumVersion 2.2.0 -PassThru",
                ],
            )
            .await?;
            let script = format!(
                "Get-AzAccessToken {tenant_section} -ResourceUrl \"{resource}\" | ConvertTo-Json"
            );
            let output = self.command(&shell, &["-Command", &script]).await?;
            return serde_json::from_str::<PowerShellToken>(&output.stdout).map_err(|_| {
                CommandError(format!(
                    "Unable to parse the output of PowerShell. Received output: {}",
                    output.stdout
                ))
            });
        }
        Err(CommandError(
            "Unable to execute PowerShell. Ensure that it is installed in your system".to_string(),
        ))
    }
}

/// Parses `ExpiresOn`, either an ISO 8601 date or the `/Date(ms)/` format of
/// Windows PowerShell.
fn parse_expires_on(value: &str) -> Option<i64> {
    if let Some(ms) = value
        .strip_prefix("/Date(")
        .and_then(|v| v.strip_suffix(")/"))
    {
        return ms.parse().ok();
    }
    parse_date_millis(value)
}

fn classify(error: CommandError) -> CredentialsError {
    let message = error.0;
    if message.contains(NOT_INSTALLED_ERROR) {
        return CredentialsError::unavailable(NOT_INSTALLED_MESSAGE);
    }
    if message.contains(LOGIN_ERROR) {
        return CredentialsError::unavailable(LOGIN_MESSAGE);
    }
    CredentialsError::unavailable(format!("{message}. {TROUBLESHOOT_MESSAGE}"))
}

#[async_trait::async_trait]
impl TokenCredential for AzurePowerShellCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let tenant = self.config.tenant(options, &self.logger)?;
        let scope = single_scope(scopes, CREDENTIAL_NAME)?;
        ensure_valid_scope(scope, &self.logger)?;
        self.logger
            .get_token()
            .info(format!("Using the scope {scope}"));
        let result = self
            .access_token(scope_resource(scope), tenant.as_deref())
            .await
            .and_then(|t| match parse_expires_on(&t.expires_on) {
                Some(expires_on) => Ok(AccessToken::new(t.token, expires_on)),
                None => Err(CommandError(format!(
                    "Unable to parse the output of PowerShell. Received output: ExpiresOn={}",
                    t.expires_on
                ))),
            })
            .map_err(classify);
        match &result {
            Ok(_) => self.logger.get_token().info(format_success(scopes)),
            Err(e) => self.logger.get_token().info(format_error(Some(&[scope.to_string()]), e)),
        }
        result
    }
}
