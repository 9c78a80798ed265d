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

use crate::{constants::*, Credential};
use async_trait::async_trait;
use ibmcos_core::{Context, Error, ErrorKind, ProvideCredential, Result};
use log::debug;
use serde::Deserialize;

/// ProfileCredentialProvider loads HMAC keys from the credential file
/// written by `ibmcloud cos config`.
///
/// The file is read from:
/// 1. The path set via `with_credentials_file()`
/// 2. The `IBM_COS_CREDENTIALS_FILE` environment variable
/// 3. `~/.bluemix/cos_credentials`
///
/// ```json
/// {
///   "cos_hmac_keys": {
///     "access_key_id": "...",
///     "secret_access_key": "..."
///   }
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct ProfileCredentialProvider {
    credentials_file: Option<String>,
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    cos_hmac_keys: Option<HmacKeys>,
}

#[derive(Deserialize)]
struct HmacKeys {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let path = if let Some(path) = &self.credentials_file {
            path.clone()
        } else if let Some(path) = ctx.env_var(IBM_COS_CREDENTIALS_FILE) {
            path
        } else {
            DEFAULT_CREDENTIALS_FILE.to_string()
        };

        let Some(expanded_path) = ctx.expand_home_dir(&path) else {
            debug!("failed to expand homedir for path: {path}");
            return Ok(None);
        };

        let content = match ctx.file_read(&expanded_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("credentials file {expanded_path} not found");
                return Ok(None);
            }
            Err(err) => {
                debug!("failed to read credentials file {expanded_path}: {err:?}");
                return Ok(None);
            }
        };

        let file: CredentialsFile = serde_json::from_slice(&content).map_err(|e| {
            Error::config_invalid(format!("failed to parse credentials file {expanded_path}"))
                .with_source(e)
        })?;

        let Some(keys) = file.cos_hmac_keys else {
            debug!("credentials file {expanded_path} has no cos_hmac_keys");
            return Ok(None);
        };

        match (keys.access_key_id, keys.secret_access_key) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => Ok(Some(Credential {
                access_key_id: ak,
                secret_access_key: sk,
                session_token: None,
                expires_in: None,
            })),
            _ => Ok(None),
        }
    }
}
