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

//! Try several credentials in order.
//!
//! [ChainedTokenCredential] returns the token of the first credential that
//! succeeds. Credentials that are unavailable, or that require interactive
//! authentication, are skipped. Any other error stops the chain and is
//! returned unchanged.
//!
//! ```
//! # use azure_identity::credentials::chained::ChainedTokenCredential;
//! # use azure_identity::credentials::{azure_cli, environment, TokenCredential};
//! # use std::sync::Arc;
//! # fn sample() -> azure_identity::BuildResult<()> {
//! let chain = ChainedTokenCredential::new(vec![
//!     Arc::new(environment::Builder::default().build()?),
//!     Arc::new(azure_cli::Builder::default().build()?),
//! ]);
//! # let _ = chain;
//! # Ok(()) }
//! ```

use crate::credentials::{GetTokenOptions, Result, TokenCredential};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::token::AccessToken;
use std::sync::Arc;

const CREDENTIAL_NAME: &str = "ChainedTokenCredential";
const AGGREGATE_MESSAGE: &str = "ChainedTokenCredential authentication failed.";

/// Tries a sequence of credentials until one returns a token.
#[derive(Clone, Debug)]
pub struct ChainedTokenCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
    logger: CredentialLogger,
}

impl ChainedTokenCredential {
    /// Creates a chain trying `sources` in order.
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self::with_logger(sources, CredentialLogger::new(CREDENTIAL_NAME))
    }

    pub(crate) fn with_logger(
        sources: Vec<Arc<dyn TokenCredential>>,
        logger: CredentialLogger,
    ) -> Self {
        Self { sources, logger }
    }
}

#[async_trait::async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let logger = self.logger.get_token();
        let mut errors = Vec::new();
        for source in &self.sources {
            match source.get_token(scopes, options).await {
                Ok(token) => {
                    logger.info(format_success(scopes));
                    return Ok(token);
                }
                Err(e) if e.is_unavailable() || e.is_authentication_required() => {
                    logger.verbose(format!("Skipping credential: {}", e.message()));
                    errors.push(e);
                }
                Err(e) => {
                    logger.info(format_error(Some(scopes), &e));
                    return Err(e);
                }
            }
        }
        let error = CredentialsError::aggregate(AGGREGATE_MESSAGE, errors);
        logger.info(format_error(Some(scopes), &error));
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{MockCredential, scopes};

    type TestResult = anyhow::Result<()>;

    fn token(value: &str) -> AccessToken {
        AccessToken::new(value, crate::token::now_millis() + 3_600_000)
    }

    fn returning(result: Result<AccessToken>) -> Arc<dyn TokenCredential> {
        let mut mock = MockCredential::new();
        mock.expect_get_token()
            .times(1)
            .returning(move |_, _| result.clone());
        Arc::new(mock)
    }

    fn never() -> Arc<dyn TokenCredential> {
        let mut mock = MockCredential::new();
        mock.expect_get_token().never();
        Arc::new(mock)
    }

    #[tokio::test]
    async fn first_success_wins() -> TestResult {
        let chain = ChainedTokenCredential::new(vec![
            returning(Err(CredentialsError::unavailable("not here"))),
            returning(Err(CredentialsError::unavailable("nor here"))),
            returning(Ok(token("third"))),
            never(),
        ]);
        let got = chain
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(got.token, "third");
        Ok(())
    }

    #[tokio::test]
    async fn authentication_required_is_skipped() -> TestResult {
        let options = GetTokenOptions::default();
        let chain = ChainedTokenCredential::new(vec![
            returning(Err(CredentialsError::authentication_required(
                "interaction required",
                &scopes(&["a"]),
                &options,
            ))),
            returning(Ok(token("second"))),
        ]);
        let got = chain.get_token(&scopes(&["a"]), &options).await?;
        assert_eq!(got.token, "second");
        Ok(())
    }

    #[tokio::test]
    async fn other_errors_stop_the_chain() {
        let chain = ChainedTokenCredential::new(vec![
            returning(Err(CredentialsError::unavailable("not here"))),
            returning(Err(CredentialsError::authentication(
                401,
                r#"{"error": "invalid_client", "error_description": "bad secret"}"#,
            ))),
            never(),
        ]);
        let err = chain
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_authentication_error(), "{err:?}");
        assert_eq!(err.status_code(), Some(401));
    }

    #[tokio::test]
    async fn aggregate() {
        let chain = ChainedTokenCredential::new(vec![
            returning(Err(CredentialsError::unavailable("first is unavailable"))),
            returning(Err(CredentialsError::unavailable("second is unavailable"))),
        ]);
        let err = chain
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_aggregate(), "{err:?}");
        assert_eq!(err.errors().len(), 2);
        assert_eq!(
            err.to_string(),
            "ChainedTokenCredential authentication failed.\nfirst is unavailable\nsecond is unavailable"
        );
    }

    #[tokio::test]
    async fn empty_chain() {
        let chain = ChainedTokenCredential::new(Vec::new());
        let err = chain
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_aggregate(), "{err:?}");
        assert!(err.errors().is_empty());
    }
}
