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

//! Interactive browser credentials.
//!
//! The credential opens the system browser on the sign-in page of the
//! identity provider. Once the user signs in, the browser is redirected to a
//! loopback address where the credential listens for the authorization code.
//! The code is then redeemed, using [PKCE] to bind it to this credential.
//!
//! The redirect URI must be registered as a "Mobile and desktop
//! applications" platform of the app registration. The default is
//! `http://localhost`, port 80.
//!
//! ```no_run
//! # use azure_identity::credentials::interactive_browser::Builder;
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # tokio_test::block_on(async {
//! let credential = Builder::default()
//!     .with_redirect_uri("http://localhost:8400")
//!     .build()?;
//! let scopes = vec!["https://graph.microsoft.com/.default".to_string()];
//! let token = credential.get_token(&scopes, &GetTokenOptions::default()).await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [PKCE]: https://datatracker.ietf.org/doc/html/rfc7636

use crate::BuildResult;
use crate::adapter::{AdapterConfig, EngineAdapter, FlowResult, TokenFlow};
use crate::auth_record::AuthenticationRecord;
use crate::build_errors::Error as BuildError;
use crate::constants::DEVELOPER_SIGN_ON_CLIENT_ID;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{
    AuthorizationCodeRequest, AuthorizationUrlRequest, EngineError, EngineErrorKind, TokenEngine,
    TokenRequest,
};
use crate::errors::CredentialsError;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CREDENTIAL_NAME: &str = "InteractiveBrowserCredential";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";
const SUCCESS_MESSAGE: &str =
    "Authentication Complete. You can close the browser and return to the application.";
const INVALID_REDIRECT_MESSAGE: &str =
    "Interactive Browser Authentication Error \"Did not receive token with a valid expiration\"";

/// Opens URLs in a web browser.
///
/// The default implementation, [SystemBrowser], uses the platform's URL
/// handler. Applications may provide their own, for example to print the
/// URL instead.
#[async_trait::async_trait]
pub trait BrowserLauncher: std::fmt::Debug + Send + Sync {
    /// Opens `url`.
    async fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform's default browser.
#[derive(Clone, Debug, Default)]
pub struct SystemBrowser;

#[async_trait::async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &str) -> std::io::Result<()> {
        let (program, args): (&str, Vec<&str>) = if cfg!(windows) {
            ("rundll32", vec!["url.dll,FileProtocolHandler", url])
        } else if cfg!(target_os = "macos") {
            ("open", vec![url])
        } else {
            ("xdg-open", vec![url])
        };
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await?;
        if status.success() {
            return Ok(());
        }
        Err(std::io::Error::other(format!("{program} exited with {status}")))
    }
}

/// A builder for [InteractiveBrowserCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    login_hint: Option<String>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    disable_automatic_authentication: bool,
    authentication_record: Option<AuthenticationRecord>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Sets the tenant.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the client id of the app registration.
    ///
    /// The default is the client id of the Azure development tools.
    pub fn with_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.client_id = Some(v.into());
        self
    }

    /// Sets the loopback redirect URI.
    ///
    /// The credential listens on the host and port of this URI.
    pub fn with_redirect_uri<V: Into<String>>(mut self, v: V) -> Self {
        self.redirect_uri = Some(v.into());
        self
    }

    /// Prefills the user name in the sign-in page.
    pub fn with_login_hint<V: Into<String>>(mut self, v: V) -> Self {
        self.login_hint = Some(v.into());
        self
    }

    /// Replaces the component that opens the sign-in page.
    pub fn with_browser_launcher<T: BrowserLauncher + 'static>(mut self, v: T) -> Self {
        self.browser = Some(Arc::new(v));
        self
    }

    /// Fail instead of opening the browser when no cached token is usable.
    pub fn with_disable_automatic_authentication(mut self, v: bool) -> Self {
        self.disable_automatic_authentication = v;
        self
    }

    /// Start with the account of a previous authentication.
    pub fn with_authentication_record(mut self, v: AuthenticationRecord) -> Self {
        self.authentication_record = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// Fails if the redirect URI is not a valid `http` URL.
    pub fn build(self) -> BuildResult<InteractiveBrowserCredential> {
        let tenant_id = resolve_tenant_id(self.tenant_id.as_deref(), self.client_id.as_deref())?;
        let client_id = self
            .client_id
            .unwrap_or_else(|| DEVELOPER_SIGN_ON_CLIENT_ID.to_string());
        let redirect_uri = self
            .redirect_uri
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let loopback = Loopback::parse(&redirect_uri)?;
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        let flow = BrowserFlow {
            logger: logger.clone(),
            redirect_uri,
            loopback,
            login_hint: self.login_hint,
            browser: self.browser.unwrap_or_else(|| Arc::new(SystemBrowser)),
        };
        let config = AdapterConfig::new(logger, client_id, tenant_id)
            .with_disable_automatic_authentication(self.disable_automatic_authentication)
            .with_authentication_record(self.authentication_record)
            .with_options(self.options);
        Ok(InteractiveBrowserCredential {
            adapter: EngineAdapter::new(config, flow)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Loopback {
    host: String,
    port: u16,
    path: String,
}

impl Loopback {
    fn parse(redirect_uri: &str) -> BuildResult<Self> {
        let url = url::Url::parse(redirect_uri).map_err(BuildError::parsing)?;
        if url.scheme() != "http" {
            return Err(BuildError::invalid(format!(
                "{CREDENTIAL_NAME}: the redirect URI must use the http scheme, got {redirect_uri}"
            )));
        }
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| {
                BuildError::invalid(format!(
                    "{CREDENTIAL_NAME}: the redirect URI has no host, got {redirect_uri}"
                ))
            })?;
        Ok(Self {
            host,
            port: url.port().unwrap_or(80),
            path: url.path().to_string(),
        })
    }
}

/// Generates a PKCE verifier and its `S256` challenge.
fn pkce() -> (String, String) {
    let verifier = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

type Redirect = (HashMap<String, String>, oneshot::Sender<(StatusCode, String)>);

async fn on_redirect(
    State(sender): State<mpsc::Sender<Redirect>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let (tx, rx) = oneshot::channel();
    if sender.send((params, tx)).await.is_err() {
        return (StatusCode::GONE, INVALID_REDIRECT_MESSAGE.to_string());
    }
    rx.await
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, INVALID_REDIRECT_MESSAGE.to_string()))
}

/// The loopback server, shut down when dropped.
struct LoopbackServer {
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl LoopbackServer {
    fn start(listener: TcpListener, router: Router) -> Self {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
        });
        Self { shutdown, handle }
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

struct BrowserFlow {
    logger: CredentialLogger,
    redirect_uri: String,
    loopback: Loopback,
    login_hint: Option<String>,
    browser: Arc<dyn BrowserLauncher>,
}

impl std::fmt::Debug for BrowserFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserFlow")
            .field("redirect_uri", &self.redirect_uri)
            .field("login_hint", &self.login_hint)
            .field("browser", &self.browser)
            .finish()
    }
}

impl BrowserFlow {
    async fn listen(&self) -> Result<TcpListener> {
        let port = self.loopback.port;
        TcpListener::bind((self.loopback.host.as_str(), port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AddrInUse | std::io::ErrorKind::PermissionDenied => {
                    CredentialsError::unavailable(format!(
                        "{CREDENTIAL_NAME}: Access denied to port {port}. Try sending a redirect URI with a different port, as follows: `Builder::default().with_redirect_uri(\"http://localhost:1337\")`"
                    ))
                }
                _ => CredentialsError::unavailable(format!(
                    "{CREDENTIAL_NAME}: Failed to start the necessary web server. Error: {e}"
                )),
            })
    }

    async fn redeem(
        &self,
        engine: &dyn TokenEngine,
        request: &TokenRequest,
        params: &HashMap<String, String>,
        verifier: &str,
    ) -> std::result::Result<Option<crate::engine::AuthenticationResult>, EngineError> {
        let Some(code) = params.get("code") else {
            let error = params.get("error").map(String::as_str).unwrap_or_default();
            let description = params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or_default();
            return Err(EngineError::new(
                EngineErrorKind::InteractionRequired,
                format!("{error}. {description}"),
            ));
        };
        let code = AuthorizationCodeRequest {
            code: code.clone(),
            redirect_uri: self.redirect_uri.clone(),
            code_verifier: Some(verifier.to_string()),
        };
        engine.acquire_token_by_code(request, &code).await
    }
}

#[async_trait::async_trait]
impl TokenFlow for BrowserFlow {
    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        let listener = self.listen().await?;
        let (sender, mut redirects) = mpsc::channel::<Redirect>(1);
        let router = Router::new()
            .route(&self.loopback.path, get(on_redirect))
            .with_state(sender);
        let _server = LoopbackServer::start(listener, router);
        self.logger.info(format!(
            "{CREDENTIAL_NAME} listening on port {}!",
            self.loopback.port
        ));

        let (verifier, challenge) = pkce();
        let state = uuid::Uuid::new_v4().to_string();
        let url = engine.authorization_url(
            request,
            &AuthorizationUrlRequest {
                redirect_uri: self.redirect_uri.clone(),
                code_challenge: Some(challenge),
                state: Some(state.clone()),
                login_hint: self.login_hint.clone(),
                prompt: None,
            },
        )?;
        self.browser.open(&url).await.map_err(|e| {
            CredentialsError::unavailable(format!(
                "{CREDENTIAL_NAME}: Could not open a browser window. Error: {e}"
            ))
        })?;

        let abort = request.abort_signal.clone().unwrap_or_default();
        loop {
            let (params, reply) = tokio::select! {
                _ = abort.cancelled() => {
                    return Err(CredentialsError::aborted("Aborted").into());
                }
                redirect = redirects.recv() => match redirect {
                    Some(r) => r,
                    None => return Err(CredentialsError::unavailable(INVALID_REDIRECT_MESSAGE).into()),
                },
            };
            if params.get("state").is_some_and(|s| *s != state) {
                let _ = reply.send((StatusCode::BAD_REQUEST, "Unexpected state".to_string()));
                continue;
            }
            return match self.redeem(engine, request, &params, &verifier).await {
                Ok(Some(result)) if result.expires_on.is_some() => {
                    let _ = reply.send((StatusCode::OK, SUCCESS_MESSAGE.to_string()));
                    self.logger.get_token().info(format_success(&request.scopes));
                    Ok(Some(result))
                }
                Ok(_) => {
                    let message = format_error(Some(&request.scopes), INVALID_REDIRECT_MESSAGE);
                    let _ = reply.send((StatusCode::INTERNAL_SERVER_ERROR, message));
                    Err(EngineError::new(EngineErrorKind::Server, INVALID_REDIRECT_MESSAGE).into())
                }
                Err(e) => {
                    let message = format_error(Some(&request.scopes), &e);
                    self.logger.get_token().info(&message);
                    let _ = reply.send((StatusCode::INTERNAL_SERVER_ERROR, message));
                    Err(e.into())
                }
            };
        }
    }
}

/// Authenticates a user in the system browser.
#[derive(Debug)]
pub struct InteractiveBrowserCredential {
    adapter: EngineAdapter<BrowserFlow>,
}

impl InteractiveBrowserCredential {
    /// Signs in the user, even if automatic authentication is disabled, and
    /// returns the record of the signed in account.
    pub async fn authenticate(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<Option<AuthenticationRecord>> {
        self.adapter.authenticate(scopes, options).await
    }
}

#[async_trait::async_trait]
impl TokenCredential for InteractiveBrowserCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}
