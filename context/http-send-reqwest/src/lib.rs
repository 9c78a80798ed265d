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

//! Reqwest-based HTTP transport for ibmcos.
//!
//! This crate provides `ReqwestHttpSend`, the [`HttpSend`] implementation the
//! storage client uses to execute signed requests.
//!
//! ## Example
//!
//! ```no_run
//! use ibmcos_core::{Context, OsEnv};
//! use ibmcos_http_send_reqwest::ReqwestHttpSend;
//! use reqwest::Client;
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .connect_timeout(Duration::from_secs(5))
//!     .build()
//!     .expect("client must build");
//!
//! let ctx = Context::new()
//!     .with_http_send(ReqwestHttpSend::new(client))
//!     .with_env(OsEnv);
//! ```
//!
//! ## Error mapping
//!
//! Failures raised by reqwest before a response arrives (connect, DNS, TLS,
//! reset, body read) are reported as
//! [`ErrorKind::TransientNetwork`](ibmcos_core::ErrorKind::TransientNetwork)
//! so the storage client can retry them. Every response that arrives is
//! returned as-is, whatever its status.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use ibmcos_core::{Error, HttpSend, Result};
use reqwest::{Client, Request};

/// Reqwest-based implementation of the `HttpSend` trait.
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = Request::try_from(req)
            .map_err(|e| Error::unexpected("failed to convert request").with_source(e))?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::transient_network("failed to send request").with_source(e))?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::transient_network("failed to read response body").with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmcos_core::ErrorKind;

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let send = ReqwestHttpSend::default();

        // Port 9 (discard) on localhost is expected to refuse connections.
        let req = http::Request::builder()
            .uri("http://127.0.0.1:9/bucket/key")
            .body(Bytes::new())
            .expect("request must build");

        let err = send.http_send(req).await.expect_err("send must fail");
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.is_retryable());
    }
}
