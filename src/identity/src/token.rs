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

//! Types and functions to work with access tokens.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Represents an access token.
///
/// A fresh `AccessToken` is returned by each successful token request.
/// The value is never modified once returned.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` headers, after the
    /// `Bearer` prefix.
    pub token: String,

    /// The time at which the token expires, in milliseconds since the Unix
    /// epoch.
    pub expires_on_timestamp: i64,
}

impl AccessToken {
    /// Creates a new token.
    pub fn new<T: Into<String>>(token: T, expires_on_timestamp: i64) -> Self {
        Self {
            token: token.into(),
            expires_on_timestamp,
        }
    }

    /// The expiration time as a [DateTime].
    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_on_timestamp).single()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[censored]")
            .field("expires_on_timestamp", &self.expires_on_timestamp)
            .finish()
    }
}

/// The current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses the date formats produced by the identity endpoints and the
/// developer tools.
///
/// Values without an explicit offset are interpreted in the local time zone,
/// the Azure CLI reports `expiresOn` in local time.
pub(crate) fn parse_date_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(value) {
        return Some(d.timestamp_millis());
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(value) {
        return Some(d.timestamp_millis());
    }
    // App Service (2017) returns `09/14/2017 00:00:00 PM +00:00`.
    for format in ["%m/%d/%Y %I:%M:%S %p %:z", "%m/%d/%Y %H:%M:%S %:z"] {
        if let Ok(d) = DateTime::parse_from_str(value, format) {
            return Some(d.timestamp_millis());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return chrono::Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|d| d.timestamp_millis());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn debug() {
        let token = AccessToken::new("token-test-only", 1_700_000_000_000);
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("token: \"[censored]\""), "{got}");
        assert!(got.contains("expires_on_timestamp: 1700000000000"), "{got}");
    }

    #[test]
    fn expires_on() {
        let token = AccessToken::new("t", 1_700_000_000_000);
        let got = token.expires_on().unwrap();
        assert_eq!(got.timestamp(), 1_700_000_000);
    }

    #[test_case("2023-11-14T22:13:20Z", 1_700_000_000_000; "rfc3339")]
    #[test_case("2023-11-14T22:13:20.000+00:00", 1_700_000_000_000; "rfc3339 with offset")]
    #[test_case("Tue, 14 Nov 2023 22:13:20 +0000", 1_700_000_000_000; "rfc2822")]
    #[test_case("11/14/2023 10:13:20 PM +00:00", 1_700_000_000_000; "app service")]
    fn parse_date_with_offset(input: &str, want: i64) {
        assert_eq!(parse_date_millis(input), Some(want), "{input}");
    }

    #[test]
    fn parse_date_local() {
        let got = parse_date_millis("2023-11-14 22:13:20.000000");
        let want = chrono::Local
            .with_ymd_and_hms(2023, 11, 14, 22, 13, 20)
            .earliest()
            .map(|d| d.timestamp_millis());
        assert_eq!(got, want);
    }

    #[test]
    fn parse_date_invalid() {
        assert_eq!(parse_date_millis("not a date"), None);
    }
}
