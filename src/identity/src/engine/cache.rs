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

use super::{EngineAccount, TokenCachePersistence};
use crate::token::now_millis;
use std::sync::Arc;
use tokio::sync::Mutex;

// Tokens expiring within this window are treated as expired.
const EXPIRATION_BUFFER_MILLIS: i64 = 5 * 60 * 1000;

/// The token cache of one engine application.
///
/// Application tokens are stored without an account, user tokens are keyed
/// by the account's home account id. If a persistence plugin is configured
/// the cache is loaded on first use and stored after every change.
#[derive(Debug)]
pub(crate) struct TokenCache {
    name: String,
    persistence: Option<Arc<dyn TokenCachePersistence>>,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheState {
    #[serde(skip)]
    loaded: bool,
    #[serde(default)]
    accounts: Vec<EngineAccount>,
    #[serde(default)]
    access_tokens: Vec<CachedAccessToken>,
    #[serde(default)]
    refresh_tokens: Vec<CachedRefreshToken>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CachedAccessToken {
    home_account_id: Option<String>,
    tenant: String,
    scopes: Vec<String>,
    secret: String,
    expires_on: i64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CachedRefreshToken {
    home_account_id: String,
    secret: String,
}

/// A token response to store in the cache.
#[derive(Clone, Debug, Default)]
pub(crate) struct CacheEntry<'a> {
    pub(crate) account: Option<&'a EngineAccount>,
    pub(crate) tenant: &'a str,
    pub(crate) scopes: &'a [String],
    pub(crate) access_token: &'a str,
    pub(crate) expires_on: i64,
    pub(crate) refresh_token: Option<&'a str>,
}

// Scope sets are compared ignoring order and case.
fn normalize(scopes: &[String]) -> Vec<String> {
    let mut v = scopes
        .iter()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>();
    v.sort();
    v.dedup();
    v
}

impl TokenCache {
    pub(crate) fn new(name: String, persistence: Option<Arc<dyn TokenCachePersistence>>) -> Self {
        Self {
            name,
            persistence,
            state: Mutex::new(CacheState::default()),
        }
    }

    async fn load(&self, state: &mut CacheState) {
        if state.loaded {
            return;
        }
        state.loaded = true;
        let Some(persistence) = &self.persistence else {
            return;
        };
        match persistence.load(&self.name).await {
            Ok(Some(contents)) => match serde_json::from_str::<CacheState>(&contents) {
                Ok(loaded) => {
                    state.accounts = loaded.accounts;
                    state.access_tokens = loaded.access_tokens;
                    state.refresh_tokens = loaded.refresh_tokens;
                }
                Err(e) => tracing::warn!("ignoring unparseable token cache {}: {e}", self.name),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("cannot load token cache {}: {e}", self.name),
        }
    }

    async fn store(&self, state: &CacheState) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let contents = match serde_json::to_string(state) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("cannot serialize token cache {}: {e}", self.name);
                return;
            }
        };
        if let Err(e) = persistence.store(&self.name, &contents).await {
            tracing::warn!("cannot store token cache {}: {e}", self.name);
        }
    }

    /// Returns the accounts in the cache.
    pub(crate) async fn accounts(&self) -> Vec<EngineAccount> {
        let mut state = self.state.lock().await;
        self.load(&mut state).await;
        state.accounts.clone()
    }

    /// Returns an unexpired access token and its expiration.
    pub(crate) async fn access_token(
        &self,
        home_account_id: Option<&str>,
        tenant: &str,
        scopes: &[String],
    ) -> Option<(String, i64)> {
        let scopes = normalize(scopes);
        let now = now_millis();
        let mut state = self.state.lock().await;
        self.load(&mut state).await;
        state
            .access_tokens
            .iter()
            .find(|t| {
                t.home_account_id.as_deref() == home_account_id
                    && t.tenant.eq_ignore_ascii_case(tenant)
                    && t.scopes == scopes
                    && t.expires_on - EXPIRATION_BUFFER_MILLIS > now
            })
            .map(|t| (t.secret.clone(), t.expires_on))
    }

    /// Returns the refresh token of an account.
    pub(crate) async fn refresh_token(&self, home_account_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        self.load(&mut state).await;
        state
            .refresh_tokens
            .iter()
            .find(|t| t.home_account_id == home_account_id)
            .map(|t| t.secret.clone())
    }

    /// Stores a token response, replacing any previous entry for the same
    /// account, tenant, and scopes.
    pub(crate) async fn save(&self, entry: CacheEntry<'_>) {
        let scopes = normalize(entry.scopes);
        let home_account_id = entry.account.map(|a| a.home_account_id.clone());
        let now = now_millis();
        let mut state = self.state.lock().await;
        self.load(&mut state).await;

        state.access_tokens.retain(|t| {
            t.expires_on > now
                && !(t.home_account_id == home_account_id
                    && t.tenant.eq_ignore_ascii_case(entry.tenant)
                    && t.scopes == scopes)
        });
        state.access_tokens.push(CachedAccessToken {
            home_account_id: home_account_id.clone(),
            tenant: entry.tenant.to_string(),
            scopes,
            secret: entry.access_token.to_string(),
            expires_on: entry.expires_on,
        });
        if let Some(account) = entry.account {
            state
                .accounts
                .retain(|a| a.home_account_id != account.home_account_id);
            state.accounts.push(account.clone());
            if let Some(secret) = entry.refresh_token {
                state
                    .refresh_tokens
                    .retain(|t| t.home_account_id != account.home_account_id);
                state.refresh_tokens.push(CachedRefreshToken {
                    home_account_id: account.home_account_id.clone(),
                    secret: secret.to_string(),
                });
            }
        }
        self.store(&state).await;
    }
}
