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

//! Azure Identity client library for Rust.
//!
//! This crate obtains OAuth 2.0 access tokens from Microsoft Entra ID using
//! one of many [credentials]: client secrets and certificates, device code
//! and browser based user sign-in, managed identities, and the Azure
//! developer tools.
//!
//! Most applications should start with
//! [DefaultAzureCredential][credentials::default::DefaultAzureCredential],
//! which tries the common credentials for the current environment in order:
//!
//! ```no_run
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # use azure_identity::credentials::default::Builder;
//! # tokio_test::block_on(async {
//! let credential = Builder::default().build()?;
//! let scopes = vec!["https://vault.azure.net/.default".to_string()];
//! let token = credential.get_token(&scopes, &GetTokenOptions::default()).await?;
//! println!("token expires on {:?}", token.expires_on());
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! Every credential reports failures using [CredentialsError][errors::CredentialsError].
//! Problems with the credential configuration detected at construction time
//! are reported with [build_errors::Error].

pub mod auth_record;
pub mod authority;
pub mod build_errors;
pub mod credentials;
pub mod engine;
pub mod env;
pub mod errors;
pub mod token;

pub(crate) mod adapter;
pub(crate) mod cli;
pub(crate) mod constants;
pub(crate) mod identity_client;
pub(crate) mod logging;
pub(crate) mod retry;
pub(crate) mod tenant;

/// A `Result` alias where the `Err` case is [CredentialsError][errors::CredentialsError].
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// The result of building a credential.
pub type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
