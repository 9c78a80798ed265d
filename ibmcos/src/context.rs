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

use crate::s3::{Config, StorageClient};
use crate::{Context, OsEnv, Result};
use ibmcos_file_read_tokio::TokioFileRead;
use ibmcos_http_send_reqwest::ReqwestHttpSend;

/// Create a [`Context`] backed by tokio file reading, reqwest and the OS environment.
pub fn default_context() -> Context {
    Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv)
}

/// Create a [`StorageClient`] on [`default_context`].
///
/// Fields left empty in `config` are read from `IBM_COS_*` environment
/// variables, then fall back to the built-in defaults.
pub fn default_client(config: Config) -> Result<StorageClient> {
    StorageClient::from_config(default_context(), config)
}
