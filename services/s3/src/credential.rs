// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use ibmcos_core::time::{now, DateTime};
use ibmcos_core::utils::Redact;
use ibmcos_core::SigningCredential;
use std::fmt::{Debug, Formatter};

/// Refresh this long before a credential's own expiry.
pub(crate) const EXPIRY_BUFFER_SECS: i64 = 120;

/// Credential that holds the HMAC access key and secret key.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Credential {
    /// HMAC access key id.
    pub access_key_id: String,
    /// HMAC secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
    /// Expiration time for this credential.
    pub expires_in: Option<DateTime>,
}

impl Credential {
    /// Create a long-lived credential from an access key and secret key.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_in: None,
        }
    }

    /// The instant after which the cache must stop serving this credential.
    ///
    /// Leaves a buffer before the real expiry so requests signed right
    /// before it are not rejected in flight.
    pub fn cache_until(&self) -> Option<DateTime> {
        self.expires_in
            .map(|v| v - chrono::TimeDelta::try_seconds(EXPIRY_BUFFER_SECS).expect("in bounds"))
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl SigningCredential for Credential {
    fn is_valid(&self) -> bool {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return false;
        }

        match self.cache_until() {
            Some(until) => now() < until,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_is_valid() {
        let cred = Credential::new("access_key_id", "secret_access_key");
        assert!(cred.is_valid());

        assert!(!Credential::new("", "secret_access_key").is_valid());
        assert!(!Credential::new("access_key_id", "").is_valid());

        let mut cred = Credential::new("access_key_id", "secret_access_key");
        cred.expires_in = Some(now() + TimeDelta::try_minutes(1).expect("in bounds"));
        assert!(!cred.is_valid(), "credential inside buffer must be invalid");

        cred.expires_in = Some(now() + TimeDelta::try_hours(1).expect("in bounds"));
        assert!(cred.is_valid());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut cred = Credential::new("0123456789abcdef", "super-secret-access-key");
        cred.session_token = Some("token".to_string());

        let output = format!("{cred:?}");
        assert!(output.contains("012***def"));
        assert!(!output.contains("super-secret-access-key"));
        assert!(!output.contains("\"token\""));
    }
}
