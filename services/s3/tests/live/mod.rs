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

use ibmcos_core::{Context, ErrorKind, OsEnv};
use ibmcos_file_read_tokio::TokioFileRead;
use ibmcos_http_send_reqwest::ReqwestHttpSend;
use ibmcos_s3::{Config, StorageClient};
use log::warn;
use std::env;
use std::time::Duration;

fn init_live_client() -> Option<StorageClient> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = dotenv::dotenv();

    if env::var("IBM_COS_TEST").ok().as_deref() != Some("on") {
        return None;
    }

    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);

    let client = StorageClient::from_config(ctx, Config::default())
        .expect("IBM_COS_* env must describe a valid config")
        .with_timeout(Duration::from_secs(60));
    Some(client)
}

#[tokio::test]
async fn test_live_object_lifecycle() -> anyhow::Result<()> {
    let Some(client) = init_live_client() else {
        warn!("IBM_COS_TEST is not set, skipped");
        return Ok(());
    };

    let key = format!("ibmcos-live-test/{}/hello world.txt", uuid_like());
    let receipt = client.put(&key, "Hello,World!").await?;
    assert!(receipt.etag.is_some());

    assert_eq!(client.get(&key).await?, "Hello,World!");
    assert_eq!(client.head(&key).await?.size, 12);

    let mut lister = client.list("ibmcos-live-test/");
    let mut found = false;
    while let Some(object) = lister.next().await? {
        found |= object.key == key;
    }
    assert!(found, "listing must contain {key}");

    let url = client.presign_get(&key, Duration::from_secs(300)).await?;
    let content = reqwest::get(&url).await?.text().await?;
    assert_eq!(content, "Hello,World!");

    client.delete(&key).await?;
    let err = client.get(&key).await.expect_err("object must be deleted");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

/// Unique enough for parallel runs against a shared bucket.
fn uuid_like() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}-{}", std::process::id())
}
