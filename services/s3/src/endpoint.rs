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

use crate::constants::AWS_URI_ENCODE_SET;
use crate::StorageConfig;
use ibmcos_core::{Error, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::sync::Arc;

/// Resolve the public url of `key` under `config`.
///
/// - path-style: `https://host/bucket/prefix/key`
/// - virtual-host-style: `https://bucket.host/prefix/key`
///
/// When `use_host` is false the caller supplied `base_url` replaces
/// `https://host`. In virtual-host-style the base url is expected to
/// address the bucket already, so the bucket is not added again.
pub fn resolve_url(key: &str, config: &StorageConfig) -> Result<String> {
    validate_key(key)?;

    let base = if config.use_host {
        Base::new("https", &config.host)
    } else {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            Error::config_invalid("base_url is required when use_host is false")
        })?;
        Base::Fixed(base_url)
    };

    Ok(build_url(base, config, Some(key)))
}

/// Validate an object key.
///
/// Rejects empty keys, `.` and `..` segments (http stacks collapse them)
/// and keys that don't survive a percent-encoding round trip.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key("object key must not be empty"));
    }

    if key.split('/').any(|seg| seg == "." || seg == "..") {
        return Err(Error::invalid_key(format!(
            "object key {key} must not contain '.' or '..' segments"
        )));
    }

    let encoded = encode_path(key);
    let decoded = percent_decode_str(&encoded)
        .decode_utf8()
        .map_err(|e| Error::invalid_key(format!("object key {key} can't be decoded")).with_source(e))?;
    if decoded != key {
        return Err(Error::invalid_key(format!(
            "object key {key} doesn't round trip through url encoding"
        )));
    }

    Ok(())
}

/// Percent-encode a path, keeping `/` as separator.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, &AWS_URI_ENCODE_SET).to_string()
}

enum Base<'a> {
    /// Scheme and authority, the bucket may be added as a subdomain.
    Host { scheme: &'a str, authority: &'a str },
    /// Caller supplied base, used verbatim.
    Fixed(&'a str),
}

impl<'a> Base<'a> {
    fn new(scheme: &'a str, authority: &'a str) -> Self {
        Base::Host { scheme, authority }
    }
}

fn build_url(base: Base<'_>, config: &StorageConfig, key: Option<&str>) -> String {
    let mut url = String::with_capacity(128);

    match base {
        Base::Host { scheme, authority } => {
            url.push_str(scheme);
            url.push_str("://");
            if !config.use_path_style && !config.bucket.is_empty() {
                url.push_str(&config.bucket);
                url.push('.');
            }
            url.push_str(authority);
        }
        Base::Fixed(base) => url.push_str(base),
    }

    if config.use_path_style && !config.bucket.is_empty() {
        url.push('/');
        url.push_str(&encode_path(&config.bucket));
    }
    if let Some(key) = key {
        if !config.prefix.is_empty() {
            url.push('/');
            url.push_str(&encode_path(&config.prefix));
        }
        url.push('/');
        url.push_str(&encode_path(key));
    } else {
        // Bucket level urls always end with `/` so the request path is never empty.
        url.push('/');
    }

    url
}

/// EndpointResolver maps object keys to request urls and backend keys.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    config: Arc<StorageConfig>,
}

impl EndpointResolver {
    /// Create a resolver for the given config.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The config this resolver was built with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Public url of `key`, see [`resolve_url`].
    pub fn public_url(&self, key: &str) -> Result<String> {
        resolve_url(key, &self.config)
    }

    /// Request url of `key` against the configured API endpoint.
    pub fn object_url(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        let (scheme, authority) = self.endpoint_parts();
        Ok(build_url(Base::new(scheme, authority), &self.config, Some(key)))
    }

    /// Request url of the bucket itself, used by listing.
    pub fn bucket_url(&self) -> String {
        let (scheme, authority) = self.endpoint_parts();
        build_url(Base::new(scheme, authority), &self.config, None)
    }

    /// Backend key of `key`: the configured prefix joined with `key`.
    pub fn object_key(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(self.join_prefix(key))
    }

    /// Backend prefix used to list `prefix`.
    pub fn list_prefix(&self, prefix: &str) -> String {
        self.join_prefix(prefix)
    }

    /// Strip the configured prefix from a backend key.
    pub fn relative_key<'a>(&self, full_key: &'a str) -> &'a str {
        if self.config.prefix.is_empty() {
            return full_key;
        }

        full_key
            .strip_prefix(self.config.prefix.as_str())
            .and_then(|v| v.strip_prefix('/'))
            .unwrap_or(full_key)
    }

    fn join_prefix(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.prefix, key)
        }
    }

    fn endpoint_parts(&self) -> (&str, &str) {
        // Endpoint is validated as `scheme://authority` when config is built.
        self.config
            .endpoint
            .split_once("://")
            .unwrap_or(("https", self.config.endpoint.as_str()))
    }
}
