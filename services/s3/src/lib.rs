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

//! IBM Cloud Object Storage support over the S3 REST API.
//!
//! This crate provides the request signer, credential providers, endpoint
//! resolution and the storage client built on top of them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ibmcos_core::Context;
//! use ibmcos_s3::{Config, StorageClient};
//!
//! # async fn example(ctx: Context) -> ibmcos_core::Result<()> {
//! let client = StorageClient::from_config(
//!     ctx,
//!     Config {
//!         bucket: Some("media".to_string()),
//!         ..Default::default()
//!     },
//! )?;
//!
//! client.put("images/a.png", vec![0u8; 16]).await?;
//! let content = client.get("images/a.png").await?;
//! assert_eq!(content.len(), 16);
//!
//! let mut lister = client.list("images/");
//! while let Some(object) = lister.next().await? {
//!     println!("{} {}", object.key, object.size);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod constants;

mod credential;
pub use credential::Credential;

mod config;
pub use config::{Config, StorageConfig};

mod endpoint;
pub use endpoint::{encode_path, resolve_url, validate_key, EndpointResolver};

mod sign_request;
pub use sign_request::{RequestSigner, DEFAULT_CLOCK_SKEW_TOLERANCE};

mod provide_credential;
pub use provide_credential::*;

mod list;
pub use list::{ListCursor, Lister, ObjectMeta};

mod client;
pub use client::{Receipt, StorageClient};
