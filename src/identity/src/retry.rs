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

use crate::Result;
use crate::errors::CredentialsError;
use std::future::Future;
use std::time::Duration;

/// An exponential backoff schedule with a bounded number of retries.
///
/// The IMDS endpoint returns 404 while the identity is being assigned to a
/// new VM, the managed identity credential retries those with this schedule.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ExponentialBackoff {
    max_retries: u32,
    start_delay: Duration,
    multiplier: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            start_delay: Duration::from_millis(800),
            multiplier: 2,
        }
    }
}

impl ExponentialBackoff {
    pub(crate) fn new(max_retries: u32, start_delay: Duration) -> Self {
        Self {
            max_retries,
            start_delay,
            ..Default::default()
        }
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The delay before each retry.
    pub(crate) fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let start = self.start_delay;
        let multiplier = self.multiplier;
        (0..self.max_retries).map(move |n| start.saturating_mul(multiplier.saturating_pow(n)))
    }

    /// Calls `attempt` up to `max_retries` times.
    ///
    /// Every error accepted by `should_retry` is followed by the next delay of
    /// the schedule. Other errors are returned immediately. If every attempt
    /// fails with a retryable error, returns the error created by
    /// `exhausted`.
    pub(crate) async fn retry<T, A, F, P, E>(
        &self,
        mut attempt: A,
        should_retry: P,
        exhausted: E,
    ) -> Result<T>
    where
        A: FnMut() -> F,
        F: Future<Output = Result<T>>,
        P: Fn(&CredentialsError) -> bool,
        E: FnOnce() -> CredentialsError,
    {
        for delay in self.delays() {
            match attempt().await {
                Ok(v) => return Ok(v),
                Err(e) if should_retry(&e) => {
                    tracing::debug!("retrying in {delay:?} after error: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(exhausted())
    }
}
