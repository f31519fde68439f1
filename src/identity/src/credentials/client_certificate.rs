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

//! Client certificate credentials.
//!
//! The application authenticates with a client assertion signed by the
//! private key of a certificate registered with the app registration. The
//! certificate and its key are provided as a PEM bundle, either in memory or
//! as a file.
//!
//! ```no_run
//! # use azure_identity::credentials::client_certificate::Builder;
//! let credential = Builder::new("my-tenant-id", "my-client-id")
//!     .with_certificate_path("/path/to/certificate.pem")
//!     .with_send_certificate_chain(true)
//!     .build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, ClientCredentialFlow, EngineAdapter};
use crate::authority::RegionalAuthority;
use crate::build_errors::Error as BuildError;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{CertificateKey, ClientCredential, parse_certificate};
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;
use std::path::PathBuf;

const CREDENTIAL_NAME: &str = "ClientCertificateCredential";

/// Where to find the PEM bundle of a certificate.
#[derive(Clone, Debug, Default)]
pub(crate) struct CertificateSource {
    pub(crate) certificate: Option<String>,
    pub(crate) certificate_path: Option<PathBuf>,
    pub(crate) password: Option<String>,
    pub(crate) send_certificate_chain: bool,
}

impl CertificateSource {
    /// Reads and parses the certificate.
    pub(crate) fn load(&self, credential: &str) -> BuildResult<CertificateKey> {
        let pem = match (&self.certificate, &self.certificate_path) {
            (Some(_), Some(_)) => {
                return Err(BuildError::conflict(format!(
                    "{credential}: To avoid unexpected behaviors, providing both the contents of a PEM certificate and the path to a PEM certificate is forbidden. To troubleshoot, visit https://aka.ms/azsdk/js/identity/serviceprincipalauthentication/troubleshoot."
                )));
            }
            (None, None) => {
                return Err(BuildError::invalid(format!(
                    "{credential}: Provide either a PEM certificate in string form, or the path to that certificate in the filesystem. To troubleshoot, visit https://aka.ms/azsdk/js/identity/serviceprincipalauthentication/troubleshoot."
                )));
            }
            (Some(pem), None) => pem.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(BuildError::loading)?,
        };
        parse_certificate(
            &pem,
            self.password.as_deref(),
            self.send_certificate_chain,
        )
    }
}

/// A builder for [ClientCertificateCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    source: CertificateSource,
    regional_authority: Option<RegionalAuthority>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder for the app registration `client_id` in `tenant_id`.
    ///
    /// Use [with_certificate][Builder::with_certificate] or
    /// [with_certificate_path][Builder::with_certificate_path] to provide the
    /// certificate.
    pub fn new<T, C>(tenant_id: T, client_id: C) -> Self
    where
        T: Into<String>,
        C: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            source: CertificateSource::default(),
            regional_authority: None,
            options: TokenCredentialOptions::default(),
        }
    }

    /// Sets the PEM bundle with the certificate and its private key.
    pub fn with_certificate<V: Into<String>>(mut self, v: V) -> Self {
        self.source.certificate = Some(v.into());
        self
    }

    /// Sets the path of a file containing the PEM bundle.
    pub fn with_certificate_path<V: Into<PathBuf>>(mut self, v: V) -> Self {
        self.source.certificate_path = Some(v.into());
        self
    }

    /// Sets the password of an encrypted private key.
    pub fn with_certificate_password<V: Into<String>>(mut self, v: V) -> Self {
        self.source.password = Some(v.into());
        self
    }

    /// Send the certificate chain in the `x5c` header, to support subject
    /// name and issuer based authentication.
    pub fn with_send_certificate_chain(mut self, v: bool) -> Self {
        self.source.send_certificate_chain = v;
        self
    }

    /// Request tokens from a regional endpoint.
    pub fn with_regional_authority(mut self, v: RegionalAuthority) -> Self {
        self.regional_authority = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// The certificate is read and parsed at this point, problems with the
    /// file, its contents, or the password are reported here.
    pub fn build(self) -> BuildResult<ClientCertificateCredential> {
        if self.tenant_id.is_empty() {
            return Err(BuildError::missing_field("tenant_id"));
        }
        if self.client_id.is_empty() {
            return Err(BuildError::missing_field("client_id"));
        }
        let key = self.source.load(CREDENTIAL_NAME)?;
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        logger.info(format!(
            "Loaded the certificate with thumbprint {}",
            key.thumbprint()
        ));
        let config = AdapterConfig::new(logger, self.client_id, tenant_id)
            .with_client_credential(ClientCredential::Certificate(key))
            .with_regional_authority(self.regional_authority)
            .with_options(self.options);
        Ok(ClientCertificateCredential {
            adapter: EngineAdapter::new(config, ClientCredentialFlow)?,
        })
    }
}

/// Authenticates an application with a certificate.
#[derive(Debug)]
pub struct ClientCertificateCredential {
    adapter: EngineAdapter<ClientCredentialFlow>,
}

#[async_trait::async_trait]
impl TokenCredential for ClientCertificateCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}
