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

use crate::constants::*;
use http::Uri;
use ibmcos_core::utils::Redact;
use ibmcos_core::{Context, Error, Result};
use log::warn;
use std::fmt::{Debug, Formatter};

/// Config carries caller supplied overrides.
///
/// Every field is optional; anything left as `None` falls back to the
/// defaults applied by [`StorageConfig::from_config`].
#[derive(Clone, Default)]
pub struct Config {
    /// Bucket name, defaults to `""`.
    pub bucket: Option<String>,
    /// Key prefix inside the bucket, defaults to `""`.
    pub prefix: Option<String>,
    /// Signing region, defaults to `us-standard`.
    pub region: Option<String>,
    /// API endpoint including scheme, used for requests.
    pub endpoint: Option<String>,
    /// Host used to build public urls.
    pub host: Option<String>,
    /// Use path-style addressing, defaults to `true`.
    pub use_path_style: Option<bool>,
    /// Build public urls from `host`, defaults to `true`.
    ///
    /// When `false`, `base_url` is used instead.
    pub use_host: Option<bool>,
    /// Caller supplied base for public urls, used when `use_host` is `false`.
    pub base_url: Option<String>,
    /// Namespace for credential cache keys, defaults to `ibmcos:`.
    pub cache_namespace: Option<String>,
    /// HMAC access key id.
    pub access_key_id: Option<String>,
    /// HMAC secret access key.
    pub secret_access_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("use_path_style", &self.use_path_style)
            .field("use_host", &self.use_host)
            .field("base_url", &self.base_url)
            .field("cache_namespace", &self.cache_namespace)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .finish()
    }
}

impl Config {
    /// Load config from environment variables.
    ///
    /// Keys come as a unit from either the `IBM_COS_*` or the `AWS_*` family.
    pub fn from_env(ctx: &Context) -> Self {
        let (access_key_id, secret_access_key, session_token) = env_keys(ctx);

        Self {
            bucket: ctx.env_var(IBM_COS_BUCKET),
            prefix: ctx.env_var(IBM_COS_PREFIX),
            region: ctx.env_var(IBM_COS_REGION),
            endpoint: ctx.env_var(IBM_COS_ENDPOINT),
            host: ctx.env_var(IBM_COS_HOST),
            use_path_style: env_bool(ctx, IBM_COS_USE_PATH_STYLE),
            use_host: env_bool(ctx, IBM_COS_USE_HOST),
            base_url: ctx.env_var(IBM_COS_BASE_URL),
            cache_namespace: None,
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// Fill the fields left empty in `self` from `other`.
    ///
    /// Values already set in `self` always win. The key fields are taken
    /// together from whichever side sets any of them.
    pub fn merge(self, other: Config) -> Config {
        let (access_key_id, secret_access_key, session_token) =
            if self.access_key_id.is_some()
                || self.secret_access_key.is_some()
                || self.session_token.is_some()
            {
                (
                    self.access_key_id,
                    self.secret_access_key,
                    self.session_token,
                )
            } else {
                (
                    other.access_key_id,
                    other.secret_access_key,
                    other.session_token,
                )
            };

        Config {
            bucket: self.bucket.or(other.bucket),
            prefix: self.prefix.or(other.prefix),
            region: self.region.or(other.region),
            endpoint: self.endpoint.or(other.endpoint),
            host: self.host.or(other.host),
            use_path_style: self.use_path_style.or(other.use_path_style),
            use_host: self.use_host.or(other.use_host),
            base_url: self.base_url.or(other.base_url),
            cache_namespace: self.cache_namespace.or(other.cache_namespace),
            access_key_id,
            secret_access_key,
            session_token,
        }
    }
}

type EnvKeys = (Option<String>, Option<String>, Option<String>);

/// Pick the first family with a complete key pair, never mixing halves.
fn env_keys(ctx: &Context) -> EnvKeys {
    for (ak, sk, token) in [
        (
            IBM_COS_ACCESS_KEY_ID,
            IBM_COS_SECRET_ACCESS_KEY,
            IBM_COS_SESSION_TOKEN,
        ),
        (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN),
    ] {
        if let (Some(ak), Some(sk)) = (ctx.env_var(ak), ctx.env_var(sk)) {
            return (Some(ak), Some(sk), ctx.env_var(token));
        }
    }

    (None, None, None)
}

fn env_bool(ctx: &Context, key: &str) -> Option<bool> {
    let v = ctx.env_var(key)?;
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => {
            warn!("ignoring env {key} with invalid boolean value: {v}");
            None
        }
    }
}

/// StorageConfig is the resolved, immutable configuration of a storage client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Bucket name, may be empty.
    pub bucket: String,
    /// Key prefix without leading or trailing `/`, may be empty.
    pub prefix: String,
    /// Signing region.
    pub region: String,
    /// API endpoint without trailing `/`, e.g. `https://s3.example.com`.
    pub endpoint: String,
    /// Public url host without scheme.
    pub host: String,
    /// Use path-style addressing.
    pub use_path_style: bool,
    /// Build public urls from `host`.
    pub use_host: bool,
    /// Base for public urls when `use_host` is false.
    pub base_url: Option<String>,
    /// Namespace for credential cache keys.
    pub cache_namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            host: DEFAULT_HOST.to_string(),
            use_path_style: true,
            use_host: true,
            base_url: None,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Merge defaults with `cfg`, caller values win.
    ///
    /// This is a pure function of its input.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let default = StorageConfig::default();

        let bucket = cfg.bucket.clone().unwrap_or(default.bucket);
        if bucket.contains('/') {
            return Err(Error::config_invalid(format!(
                "bucket name {bucket} must not contain '/'"
            )));
        }

        let prefix = cfg
            .prefix
            .as_deref()
            .map(|v| v.trim_matches('/').to_string())
            .unwrap_or(default.prefix);

        let region = match cfg.region.as_deref() {
            Some("") => {
                return Err(Error::config_invalid("region must not be empty"));
            }
            Some(v) => v.to_string(),
            None => default.region,
        };

        let endpoint = cfg
            .endpoint
            .as_deref()
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(default.endpoint);
        validate_endpoint(&endpoint)?;

        let host = cfg
            .host
            .as_deref()
            .map(|v| {
                v.trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string()
            })
            .unwrap_or(default.host);
        if host.is_empty() {
            return Err(Error::config_invalid("host must not be empty"));
        }

        let use_host = cfg.use_host.unwrap_or(default.use_host);
        let base_url = cfg
            .base_url
            .as_deref()
            .map(|v| v.trim_end_matches('/').to_string());
        if !use_host && base_url.is_none() {
            return Err(Error::config_invalid(
                "base_url is required when use_host is false",
            ));
        }

        Ok(StorageConfig {
            bucket,
            prefix,
            region,
            endpoint,
            host,
            use_path_style: cfg.use_path_style.unwrap_or(default.use_path_style),
            use_host,
            base_url,
            cache_namespace: cfg
                .cache_namespace
                .clone()
                .unwrap_or(default.cache_namespace),
        })
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let uri: Uri = endpoint.parse().map_err(|e| {
        Error::config_invalid(format!("endpoint {endpoint} is not a valid uri")).with_source(e)
    })?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(Error::config_invalid(format!(
                "endpoint {endpoint} must start with http:// or https://"
            )))
        }
    }
    if uri.authority().is_none() {
        return Err(Error::config_invalid(format!(
            "endpoint {endpoint} must contain a host"
        )));
    }
    if !matches!(uri.path(), "" | "/") {
        return Err(Error::config_invalid(format!(
            "endpoint {endpoint} must not contain a path"
        )));
    }

    Ok(())
}
