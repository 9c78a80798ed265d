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

use crate::constants::{AWS_QUERY_ENCODE_SET, S3_SERVICE, X_AMZ_CONTENT_SHA_256};
use crate::list::{parse_list_page, trim_etag, ListCursor, ListPage, Lister, ObjectMeta};
use crate::provide_credential::{ConfigCredentialProvider, DefaultCredentialProvider};
use crate::{Config, Credential, EndpointResolver, RequestSigner, StorageConfig};
use backon::{BackoffBuilder, ExponentialBuilder};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use http::{Method, Request, Response, StatusCode};
use ibmcos_core::hash::{hex_sha256, EMPTY_STRING_SHA256};
use ibmcos_core::time::{now, parse_http_date};
use ibmcos_core::utils::redact_url_query;
use ibmcos_core::{
    Context, CredentialCache, Error, ProvideCredential, ProvideCredentialChain, Result,
};
use log::{debug, warn};
use percent_encoding::utf8_percent_encode;
use serde::Deserialize;
use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cache key of the HMAC credential inside the client's namespace.
const CREDENTIAL_CACHE_KEY: &str = "hmac";

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Key the object was stored under, relative to the configured prefix.
    pub key: String,
    /// Entity tag returned by the backend.
    pub etag: Option<String>,
}

/// StorageClient runs object operations against an S3 compatible backend.
///
/// Every request goes through the same pipeline: resolve the url, load the
/// credential through the cache, sign, send and map the status. Transient
/// failures are retried with exponential backoff and re-signed on every
/// attempt.
#[derive(Debug, Clone)]
pub struct StorageClient {
    ctx: Context,
    provider: Arc<dyn ProvideCredential<Credential = Credential>>,
    cache: CredentialCache<Credential>,
    signer: RequestSigner,
    resolver: EndpointResolver,

    max_retries: usize,
    min_backoff: Duration,
    max_backoff: Duration,
    timeout: Option<Duration>,
}

impl StorageClient {
    /// Create a client from a resolved config and a credential provider.
    pub fn new(
        ctx: Context,
        config: StorageConfig,
        provider: impl ProvideCredential<Credential = Credential>,
    ) -> Self {
        let signer = RequestSigner::new(S3_SERVICE, &config.region);
        let cache = CredentialCache::new(config.cache_namespace.clone());

        Self {
            ctx,
            provider: Arc::new(provider),
            cache,
            signer,
            resolver: EndpointResolver::new(config),

            max_retries: 3,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            timeout: None,
        }
    }

    /// Create a client from caller config, completed by the environment.
    ///
    /// Keys set in `config` are used first, then the default provider chain.
    pub fn from_config(ctx: Context, config: Config) -> Result<Self> {
        let config = config.merge(Config::from_env(&ctx));
        let storage_config = StorageConfig::from_config(&config)?;
        debug!("building storage client with {config:?}");

        let provider = ProvideCredentialChain::new()
            .push(ConfigCredentialProvider::new(Arc::new(config)))
            .push(DefaultCredentialProvider::new());

        Ok(Self::new(ctx, storage_config, provider))
    }

    /// Set retry budget and the first backoff delay.
    ///
    /// `max_retries` counts retries, so a request is sent at most
    /// `max_retries + 1` times.
    pub fn with_retry(mut self, max_retries: usize, min_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.min_backoff = min_backoff;
        self
    }

    /// Cap a single backoff delay.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Bound every operation, retries included, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the accepted clock skew while signing, `None` disables the check.
    pub fn with_clock_skew_tolerance(mut self, tolerance: Option<Duration>) -> Self {
        self.signer = self.signer.with_clock_skew_tolerance(tolerance);
        self
    }

    /// Share a credential cache with other clients.
    pub fn with_credential_cache(mut self, cache: CredentialCache<Credential>) -> Self {
        self.cache = cache;
        self
    }

    /// Resolved config of this client.
    pub fn config(&self) -> &StorageConfig {
        self.resolver.config()
    }

    /// Credential cache of this client.
    pub fn credential_cache(&self) -> &CredentialCache<Credential> {
        &self.cache
    }

    /// Store `body` under `key`, replacing any existing object.
    pub async fn put(&self, key: &str, body: impl Into<Bytes>) -> Result<Receipt> {
        let url = self.resolver.object_url(key)?;
        let body = body.into();
        let digest = hex_sha256(&body);

        let resp = self
            .send("put", || {
                Ok(Request::builder()
                    .method(Method::PUT)
                    .uri(&url)
                    .header(CONTENT_LENGTH, body.len().to_string())
                    .header(X_AMZ_CONTENT_SHA_256, &digest)
                    .body(body.clone())?)
            })
            .await?;

        Ok(Receipt {
            key: key.to_string(),
            etag: header_str(&resp, ETAG).map(trim_etag),
        })
    }

    /// Fetch the content of `key`.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let url = self.resolver.object_url(key)?;
        let resp = self
            .send("get", || empty_request(Method::GET, &url))
            .await?;

        Ok(resp.into_body())
    }

    /// Fetch the metadata of `key` without its content.
    pub async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let url = self.resolver.object_url(key)?;
        let resp = self
            .send("head", || empty_request(Method::HEAD, &url))
            .await?;

        let size = match header_str(&resp, CONTENT_LENGTH).map(|v| (v, v.parse::<u64>())) {
            Some((_, Ok(size))) => size,
            Some((v, Err(_))) => {
                warn!("head {key}: invalid content-length {v:?}, reporting size 0");
                0
            }
            None => {
                warn!("head {key}: response has no content-length, reporting size 0");
                0
            }
        };

        Ok(ObjectMeta {
            key: key.to_string(),
            size,
            etag: header_str(&resp, ETAG).map(trim_etag),
            last_modified: header_str(&resp, LAST_MODIFIED).and_then(|v| parse_http_date(v).ok()),
        })
    }

    /// Remove `key`.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let url = self.resolver.object_url(key)?;
        self.send("delete", || empty_request(Method::DELETE, &url))
            .await?;

        Ok(())
    }

    /// List objects under `prefix` lazily.
    pub fn list(&self, prefix: &str) -> Lister {
        Lister::new(self.clone(), prefix, ListCursor::default())
    }

    /// Resume a listing from a position returned by [`Lister::cursor`].
    ///
    /// A bare backend token is accepted through [`ListCursor::from_token`].
    pub fn list_from(&self, prefix: &str, cursor: ListCursor) -> Lister {
        Lister::new(self.clone(), prefix, cursor)
    }

    /// Public url of `key`, see [`crate::resolve_url`].
    pub fn public_url(&self, key: &str) -> Result<String> {
        self.resolver.public_url(key)
    }

    /// Build a url that grants GET access to `key` for `expires_in`.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let url = self.resolver.object_url(key)?;
        let cred = self.credential().await?;

        let (mut parts, _) = empty_request(Method::GET, &url)?.into_parts();
        // Presigned urls can't carry the payload header.
        parts.headers.remove(X_AMZ_CONTENT_SHA_256);
        self.signer
            .sign(&mut parts, &cred, now(), Some(expires_in))?;

        Ok(parts.uri.to_string())
    }

    pub(crate) async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<ListPage> {
        let mut url = self.resolver.bucket_url();
        url.push_str("?list-type=2");
        let prefix = self.resolver.list_prefix(prefix);
        if !prefix.is_empty() {
            write!(
                url,
                "&prefix={}",
                utf8_percent_encode(&prefix, &AWS_QUERY_ENCODE_SET)
            )?;
        }
        if let Some(token) = continuation_token {
            write!(
                url,
                "&continuation-token={}",
                utf8_percent_encode(token, &AWS_QUERY_ENCODE_SET)
            )?;
        }
        if let Some(max_keys) = max_keys {
            write!(url, "&max-keys={max_keys}")?;
        }

        let resp = self
            .send("list", || empty_request(Method::GET, &url))
            .await?;

        parse_list_page(resp.body(), |key| {
            self.resolver.relative_key(key).to_string()
        })
    }

    async fn credential(&self) -> Result<Credential> {
        self.cache
            .get_or_refresh(CREDENTIAL_CACHE_KEY, || async {
                let cred = self
                    .provider
                    .provide_credential(&self.ctx)
                    .await?
                    .ok_or_else(|| Error::invalid_credentials("no credential found by provider"))?;
                let until = cred.cache_until();
                Ok((cred, until))
            })
            .await
    }

    async fn send<F>(&self, op: &'static str, build: F) -> Result<Response<Bytes>>
    where
        F: Fn() -> Result<Request<Bytes>>,
    {
        let fut = self.send_with_retry(op, build);
        match self.timeout {
            None => fut.await,
            Some(timeout) => with_timeout(op, timeout, fut).await,
        }
    }

    async fn send_with_retry<F>(&self, op: &'static str, build: F) -> Result<Response<Bytes>>
    where
        F: Fn() -> Result<Request<Bytes>>,
    {
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_retries)
            .with_jitter()
            .build();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.send_once(build()?).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            match backoff.next() {
                Some(dur) => {
                    warn!("{op} attempt {attempt} failed, retry after {dur:?}: {err}");
                    tokio::time::sleep(dur).await;
                }
                None => {
                    warn!("{op} still failed after {attempt} attempts: {err}");
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let cred = self.credential().await?;

        let (mut parts, body) = req.into_parts();
        self.signer.sign(&mut parts, &cred, now(), None)?;
        debug!(
            "sending {} {}",
            parts.method,
            redact_url_query(&parts.uri.to_string())
        );

        let resp = self
            .ctx
            .http_send(Request::from_parts(parts, body))
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            // Rotated keys must not stay cached until expiry.
            self.cache.invalidate(CREDENTIAL_CACHE_KEY);
        }
        Err(parse_error(status, resp.body()))
    }
}

async fn with_timeout<T>(
    op: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::timeout(format!(
            "{op} didn't finish within {timeout:?}"
        ))),
    }
}

fn empty_request(method: Method, url: &str) -> Result<Request<Bytes>> {
    Ok(Request::builder()
        .method(method)
        .uri(url)
        .header(X_AMZ_CONTENT_SHA_256, EMPTY_STRING_SHA256)
        .body(Bytes::new())?)
}

fn header_str(resp: &Response<Bytes>, name: http::HeaderName) -> Option<&str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ErrorResponse {
    code: String,
    message: String,
    request_id: String,
}

/// Map a failed response to an error, keeping the backend code and message.
fn parse_error(status: StatusCode, body: &[u8]) -> Error {
    let detail = quick_xml::de::from_str::<ErrorResponse>(&String::from_utf8_lossy(body))
        .ok()
        .filter(|v| !v.code.is_empty());

    let message = match detail {
        Some(v) if v.request_id.is_empty() => format!("{}: {}", v.code, v.message),
        Some(v) => format!("{}: {} (request id: {})", v.code, v.message, v.request_id),
        None => format!("backend responded with {status}"),
    };

    if status == StatusCode::NOT_FOUND {
        Error::not_found(message).with_status(status.as_u16())
    } else {
        Error::backend(status.as_u16(), message)
    }
}
