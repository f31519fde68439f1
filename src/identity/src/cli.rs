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

//! Runs the command-line tools used by the developer credentials.

use crate::constants::DEFAULT_PROCESS_TIMEOUT;
use crate::credentials::{GetTokenOptions, TokenCredentialOptions};
use crate::env::{Environment, SYSTEM_ROOT};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error};
use crate::tenant::{
    self, TenantRequest, check_tenant_id, resolve_additionally_allowed_tenant_ids,
    validate_tenant_id,
};
use crate::{BuildResult, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

static VALID_SCOPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z-.:/]+$").ok());

/// The captured output of a finished process.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ProcessOutput {
    pub(crate) success: bool,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Failures to run a process to completion.
#[derive(thiserror::Error, Clone, Debug)]
pub(crate) enum ProcessError {
    #[error("cannot find the program {0}")]
    NotFound(String),
    #[error("the process did not finish within {0:?}")]
    Timeout(Duration),
    #[error("cannot run the process: {0}")]
    Io(Arc<std::io::Error>),
}

/// Runs external programs.
///
/// Credentials hold an `Arc<dyn ProcessRunner>` so tests can replace the
/// real processes.
#[async_trait::async_trait]
pub(crate) trait ProcessRunner: std::fmt::Debug + Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<PathBuf>,
        timeout: Duration,
    ) -> std::result::Result<ProcessOutput, ProcessError>;
}

/// Runs programs with [tokio::process::Command].
#[derive(Clone, Debug, Default)]
pub(crate) struct TokioProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<PathBuf>,
        timeout: Duration,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let output = tokio_timeout(timeout, command.output())
            .await
            .map_err(|_| ProcessError::Timeout(timeout))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProcessError::NotFound(program.to_string()),
                _ => ProcessError::Io(Arc::new(e)),
            })?;
        Ok(ProcessOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Returns the program and arguments to run `program` through the shell.
///
/// The CLI tools are scripts on Windows, so they run through `cmd /c`.
pub(crate) fn shell_command(program: &str, args: Vec<String>) -> (String, Vec<String>) {
    if cfg!(windows) {
        let mut wrapped = vec!["/c".to_string(), program.to_string()];
        wrapped.extend(args);
        return ("cmd".to_string(), wrapped);
    }
    (program.to_string(), args)
}

/// The working directory for the CLI tools, outside of any project
/// directory.
pub(crate) fn safe_working_dir(env: &Environment, credential: &str) -> Result<PathBuf> {
    if cfg!(windows) {
        return env.get(SYSTEM_ROOT).map(PathBuf::from).ok_or_else(|| {
            CredentialsError::unavailable(format!(
                "{credential} expects a 'SystemRoot' environment variable"
            ))
        });
    }
    Ok(PathBuf::from("/bin"))
}

/// Rejects scopes the developer tools cannot receive on a command line.
pub(crate) fn ensure_valid_scope(scope: &str, logger: &CredentialLogger) -> Result<()> {
    if VALID_SCOPE.as_ref().is_some_and(|re| re.is_match(scope)) {
        return Ok(());
    }
    let error =
        CredentialsError::unavailable("Invalid scope was specified by the user or calling client");
    logger
        .get_token()
        .info(format_error(Some(&[scope.to_string()]), &error));
    Err(error)
}

/// The resource of a scope, without the `/.default` suffix.
pub(crate) fn scope_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// The configuration shared by the credentials wrapping a developer tool.
#[derive(Clone, Debug)]
pub(crate) struct ToolConfig {
    pub(crate) tenant_id: Option<String>,
    pub(crate) additionally_allowed: Vec<String>,
    pub(crate) timeout: Duration,
    pub(crate) env: Environment,
    pub(crate) runner: Arc<dyn ProcessRunner>,
}

impl ToolConfig {
    pub(crate) fn new(
        tenant_id: Option<String>,
        timeout: Option<Duration>,
        options: &TokenCredentialOptions,
        runner: Option<Arc<dyn ProcessRunner>>,
    ) -> BuildResult<Self> {
        if let Some(t) = &tenant_id {
            validate_tenant_id(t)?;
        }
        Ok(Self {
            tenant_id,
            additionally_allowed: resolve_additionally_allowed_tenant_ids(
                options.additionally_allowed_tenants.iter().cloned(),
            ),
            timeout: timeout.unwrap_or(DEFAULT_PROCESS_TIMEOUT),
            env: options.environment(),
            runner: runner.unwrap_or_else(|| Arc::new(TokioProcessRunner)),
        })
    }

    /// The tenant for a token request, validated.
    pub(crate) fn tenant(
        &self,
        options: &GetTokenOptions,
        logger: &CredentialLogger,
    ) -> Result<Option<String>> {
        let tenant = tenant::resolve(
            TenantRequest {
                configured: self.tenant_id.as_deref(),
                requested: options.tenant_id.as_deref(),
                additionally_allowed: &self.additionally_allowed,
                multi_tenant_disabled: self.env.multi_tenant_disabled(),
            },
            logger,
        )?;
        if let Some(t) = &tenant {
            check_tenant_id(logger, t)?;
        }
        Ok(tenant)
    }

    /// Runs `program` through the shell, from a safe working directory.
    pub(crate) async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        credential: &str,
    ) -> Result<std::result::Result<ProcessOutput, ProcessError>> {
        let cwd = safe_working_dir(&self.env, credential)?;
        let (program, args) = shell_command(program, args);
        Ok(self
            .runner
            .run(&program, &args, Some(cwd), self.timeout)
            .await)
    }
}

/// Returns the first scope, the developer tools accept a single resource.
pub(crate) fn single_scope<'a>(scopes: &'a [String], credential: &str) -> Result<&'a str> {
    scopes.first().map(String::as_str).ok_or_else(|| {
        CredentialsError::unavailable(format!("{credential}: at least one scope is required"))
    })
}
