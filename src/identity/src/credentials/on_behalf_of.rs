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

//! On-behalf-of credentials.
//!
//! A middle-tier service receives a token from its caller, the user
//! assertion, and exchanges it for a token to call a downstream API on behalf
//! of the same user. The service authenticates itself with a client secret or
//! a certificate.
//!
//! ```
//! # use azure_identity::credentials::on_behalf_of::Builder;
//! let credential = Builder::new("my-tenant-id", "my-client-id", "the-incoming-token")
//!     .with_client_secret("my-client-secret")
//!     .build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, EngineAdapter, FlowResult, TokenFlow};
use crate::build_errors::Error as BuildError;
use crate::credentials::client_certificate::CertificateSource;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{ClientCredential, TokenEngine, TokenRequest};
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;
use std::path::PathBuf;

const CREDENTIAL_NAME: &str = "OnBehalfOfCredential";

/// A builder for [OnBehalfOfCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    user_assertion: String,
    client_secret: Option<String>,
    certificate: CertificateSource,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder exchanging `user_assertion` for tokens.
    ///
    /// Use [with_client_secret][Builder::with_client_secret] or
    /// [with_certificate_path][Builder::with_certificate_path] to
    /// authenticate the service.
    pub fn new<T, C, A>(tenant_id: T, client_id: C, user_assertion: A) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        A: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            user_assertion: user_assertion.into(),
            client_secret: None,
            certificate: CertificateSource::default(),
            options: TokenCredentialOptions::default(),
        }
    }

    /// Authenticate the service with a client secret.
    pub fn with_client_secret<V: Into<String>>(mut self, v: V) -> Self {
        self.client_secret = Some(v.into());
        self
    }

    /// Authenticate the service with the certificate in a PEM file.
    pub fn with_certificate_path<V: Into<PathBuf>>(mut self, v: V) -> Self {
        self.certificate.certificate_path = Some(v.into());
        self
    }

    /// Sets the password of an encrypted certificate key.
    pub fn with_certificate_password<V: Into<String>>(mut self, v: V) -> Self {
        self.certificate.password = Some(v.into());
        self
    }

    /// Send the certificate chain in the `x5c` header.
    pub fn with_send_certificate_chain(mut self, v: bool) -> Self {
        self.certificate.send_certificate_chain = v;
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<OnBehalfOfCredential> {
        if self.tenant_id.is_empty()
            || self.client_id.is_empty()
            || self.user_assertion.is_empty()
            || (self.client_secret.is_none() && self.certificate.certificate_path.is_none())
        {
            return Err(BuildError::invalid(format!(
                "{CREDENTIAL_NAME}: tenantId, clientId, clientSecret (or certificatePath) and userAssertionToken are required parameters."
            )));
        }
        let credential = match self.client_secret {
            Some(_) if self.certificate.certificate_path.is_some() => {
                return Err(BuildError::conflict(format!(
                    "{CREDENTIAL_NAME}: provide either a client secret or a certificate path, not both."
                )));
            }
            Some(secret) => ClientCredential::Secret(secret),
            None => ClientCredential::Certificate(self.certificate.load(CREDENTIAL_NAME)?),
        };
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        logger.info("Initialized the On-Behalf-Of flow");
        let config = AdapterConfig::new(logger, self.client_id, tenant_id)
            .with_client_credential(credential)
            .with_options(self.options);
        let flow = OnBehalfOfFlow {
            user_assertion: self.user_assertion,
        };
        Ok(OnBehalfOfCredential {
            adapter: EngineAdapter::new(config, flow)?,
        })
    }
}

struct OnBehalfOfFlow {
    user_assertion: String,
}

impl std::fmt::Debug for OnBehalfOfFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnBehalfOfFlow")
            .field("user_assertion", &"[censored]")
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenFlow for OnBehalfOfFlow {
    fn requires_confidential_client(&self) -> bool {
        true
    }

    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        Ok(engine
            .acquire_token_on_behalf_of(request, &self.user_assertion)
            .await?)
    }
}

/// Obtains tokens on behalf of the user identified by an incoming token.
#[derive(Debug)]
pub struct OnBehalfOfCredential {
    adapter: EngineAdapter<OnBehalfOfFlow>,
}

#[async_trait::async_trait]
impl TokenCredential for OnBehalfOfCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::scopes;
    use crate::engine::tests::{MockEngine, factory, result};
    use crate::env::Environment;
    use std::io::Write;

    const CERTIFICATE: &str = include_str!("../../testdata/certificate.pem");

    fn options() -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(Environment::default())
    }

    #[test]
    fn required_parameters() {
        let err = Builder::new("tenant", "client", "assertion")
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
        assert!(err.to_string().contains("are required parameters"), "{err}");

        let err = Builder::new("tenant", "client", "")
            .with_client_secret("secret")
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[test]
    fn secret_and_certificate_conflict() {
        let err = Builder::new("tenant", "client", "assertion")
            .with_client_secret("secret")
            .with_certificate_path("/some/file.pem")
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_conflict(), "{err:?}");
    }

    #[test]
    fn certificate() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(CERTIFICATE.as_bytes())?;
        let credential = Builder::new("tenant", "client", "assertion")
            .with_certificate_path(file.path())
            .with_options(options())
            .build()?;
        let fmt = format!("{credential:?}");
        assert!(!fmt.contains("\"assertion\""), "{fmt}");
        Ok(())
    }

    #[tokio::test]
    async fn get_token() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_on_behalf_of()
            .times(2)
            .withf(|_, assertion| assertion == "incoming-token")
            .returning(|_, _| Ok(Some(result("downstream-token"))));
        let credential = Builder::new("tenant", "client", "incoming-token")
            .with_client_secret("secret")
            .with_options(options().with_engine_factory(factory(engine)))
            .build()?;
        for _ in 0..2 {
            let token = credential
                .get_token(&scopes(&["api://downstream/.default"]), &GetTokenOptions::default())
                .await?;
            assert_eq!(token.token, "downstream-token");
        }
        Ok(())
    }
}
