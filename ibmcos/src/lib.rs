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

//! Object storage client for IBM Cloud Object Storage.
//!
//! `ibmcos` bundles the core building blocks with the S3 service support and,
//! behind the `default-context` feature, a ready to use [`Context`].
//!
//! ```no_run
//! # async fn example() -> ibmcos::Result<()> {
//! use ibmcos::s3::Config;
//!
//! let client = ibmcos::default_client(Config {
//!     bucket: Some("media".to_string()),
//!     prefix: Some("assets".to_string()),
//!     ..Default::default()
//! })?;
//!
//! client.put("images/a b.png", "content").await?;
//! println!("{}", client.public_url("images/a b.png")?);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use ibmcos_core::*;

/// S3 compatible storage support.
pub mod s3 {
    pub use ibmcos_s3::*;
}

#[cfg(feature = "default-context")]
mod context;
#[cfg(feature = "default-context")]
pub use context::{default_client, default_context};
