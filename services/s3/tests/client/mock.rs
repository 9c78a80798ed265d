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

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use ibmcos_core::{Context, Error, HttpSend, ProvideCredential, Result};
use ibmcos_s3::{Config, Credential, StorageClient, StorageConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub enum MockReply {
    Status(StatusCode, &'static str),
    WithHeaders(StatusCode, Vec<(&'static str, &'static str)>, &'static str),
    NetworkError,
    Delayed(Duration, StatusCode),
}

#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

/// HttpSend that answers from a scripted queue and records every request.
#[derive(Clone, Default)]
pub struct MockHttpSend {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    sent: Arc<Mutex<Vec<SentRequest>>>,
}

impl std::fmt::Debug for MockHttpSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpSend").finish_non_exhaustive()
    }
}

impl MockHttpSend {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            sent: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpSend for MockHttpSend {
    async fn http_send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = req.into_parts();
        self.sent.lock().unwrap().push(SentRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            at: Instant::now(),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::unexpected("no scripted reply left"))?;

        let (status, headers, body) = match reply {
            MockReply::Status(status, body) => (status, vec![], body),
            MockReply::WithHeaders(status, headers, body) => (status, headers, body),
            MockReply::NetworkError => {
                return Err(Error::transient_network("connection reset by peer"))
            }
            MockReply::Delayed(delay, status) => {
                tokio::time::sleep(delay).await;
                (status, vec![], "")
            }
        };

        let mut builder = Response::builder().status(status);
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        Ok(builder.body(Bytes::from_static(body.as_bytes()))?)
    }
}

/// Provider that counts how often it was asked, optionally slowly.
#[derive(Debug, Clone, Default)]
pub struct CountingProvider {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
    pub empty: bool,
}

impl CountingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvideCredential for CountingProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.empty {
            return Ok(None);
        }
        Ok(Some(Credential::new("test_access_key", "test_secret_key")))
    }
}

pub fn storage_config() -> StorageConfig {
    StorageConfig::from_config(&Config {
        bucket: Some("media".to_string()),
        prefix: Some("assets".to_string()),
        region: Some("us-south".to_string()),
        endpoint: Some("http://127.0.0.1:9000".to_string()),
        host: Some("store.example.com".to_string()),
        use_path_style: Some(true),
        ..Default::default()
    })
    .expect("config must be valid")
}

pub fn client(http: &MockHttpSend, provider: &CountingProvider) -> StorageClient {
    let _ = env_logger::builder().is_test(true).try_init();

    let ctx = Context::new().with_http_send(http.clone());
    StorageClient::new(ctx, storage_config(), provider.clone())
        .with_retry(3, Duration::from_millis(10))
}
