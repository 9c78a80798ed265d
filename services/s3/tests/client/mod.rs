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

mod mock;

use futures::TryStreamExt;
use http::{Method, StatusCode};
use ibmcos_core::hash::{hex_sha256, EMPTY_STRING_SHA256};
use ibmcos_core::ErrorKind;
use ibmcos_s3::ListCursor;
use mock::{client, CountingProvider, MockHttpSend, MockReply};
use pretty_assertions::assert_eq;
use std::time::Duration;

const PAGE_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>media</Name>
  <Prefix>assets/photos/</Prefix>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token/one=</NextContinuationToken>
  <Contents><Key>assets/photos/a.png</Key><Size>1</Size><ETag>"etag-a"</ETag></Contents>
  <Contents><Key>assets/photos/b.png</Key><Size>2</Size></Contents>
</ListBucketResult>"#;

const PAGE_TWO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>media</Name>
  <Prefix>assets/photos/</Prefix>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>assets/photos/c.png</Key><Size>3</Size></Contents>
</ListBucketResult>"#;

#[tokio::test]
async fn test_put_retries_on_unavailable() -> anyhow::Result<()> {
    let http = MockHttpSend::new([
        MockReply::Status(StatusCode::SERVICE_UNAVAILABLE, ""),
        MockReply::Status(StatusCode::SERVICE_UNAVAILABLE, ""),
        MockReply::Status(StatusCode::SERVICE_UNAVAILABLE, ""),
        MockReply::WithHeaders(StatusCode::OK, vec![("etag", "\"abc\"")], ""),
    ]);
    let provider = CountingProvider::default();
    let client = client(&http, &provider);

    let receipt = client.put("images/a b.png", "Hello,World!").await?;
    assert_eq!(receipt.key, "images/a b.png");
    assert_eq!(receipt.etag.as_deref(), Some("abc"));

    let sent = http.sent();
    assert_eq!(sent.len(), 4, "one request plus exactly 3 retries");
    for req in &sent {
        assert_eq!(req.method, Method::PUT);
        assert_eq!(
            req.uri.to_string(),
            "http://127.0.0.1:9000/media/assets/images/a%20b.png"
        );
        assert_eq!(
            req.headers["x-amz-content-sha256"],
            hex_sha256(b"Hello,World!").as_str()
        );
        assert_eq!(req.headers["content-length"], "12");
        assert!(req.headers.contains_key("authorization"));
        assert_eq!(req.body, "Hello,World!");
    }

    // Backoff starts at 10ms and doubles, jitter only adds.
    let gaps = sent
        .windows(2)
        .map(|w| w[1].at - w[0].at)
        .collect::<Vec<_>>();
    assert!(gaps[0] >= Duration::from_millis(10), "gaps: {gaps:?}");
    assert!(gaps[1] >= Duration::from_millis(20), "gaps: {gaps:?}");
    assert!(gaps[2] >= Duration::from_millis(40), "gaps: {gaps:?}");

    // Credential is loaded once and reused by every attempt.
    assert_eq!(provider.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_put_gives_up_after_budget() {
    let http = MockHttpSend::new((0..4).map(|_| {
        MockReply::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "<Error><Code>InternalError</Code><Message>try again</Message></Error>",
        )
    }));
    let client = client(&http, &CountingProvider::default());

    let err = client.put("a.png", "x").await.expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.message(), "InternalError: try again");
    assert_eq!(http.sent().len(), 4);
}

#[tokio::test]
async fn test_transient_network_is_retried() -> anyhow::Result<()> {
    let http = MockHttpSend::new([
        MockReply::NetworkError,
        MockReply::Status(StatusCode::OK, "content"),
    ]);
    let client = client(&http, &CountingProvider::default());

    let content = client.get("a.png").await?;
    assert_eq!(content, "content");
    assert_eq!(http.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_get_not_found() {
    let http = MockHttpSend::new([MockReply::Status(
        StatusCode::NOT_FOUND,
        "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
    )]);
    let client = client(&http, &CountingProvider::default());

    let err = client.get("missing.png").await.expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(http.sent().len(), 1, "not found must not be retried");
    assert_eq!(
        http.sent()[0].headers["x-amz-content-sha256"],
        EMPTY_STRING_SHA256
    );
}

#[tokio::test]
async fn test_forbidden_is_not_retried() {
    let http = MockHttpSend::new([
        MockReply::Status(
            StatusCode::FORBIDDEN,
            "<Error><Code>SignatureDoesNotMatch</Code><Message>bad signature</Message></Error>",
        ),
        MockReply::Status(StatusCode::NO_CONTENT, ""),
    ]);
    let provider = CountingProvider::default();
    let client = client(&http, &provider);

    let err = client.delete("a.png").await.expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(err.status(), Some(403));
    assert_eq!(http.sent().len(), 1);

    // The rejected credential is dropped from the cache.
    client.delete("a.png").await.expect("delete must succeed");
    assert_eq!(provider.calls(), 2);
    assert_eq!(http.sent()[1].method, Method::DELETE);
}

#[tokio::test]
async fn test_invalid_key_sends_nothing() {
    let http = MockHttpSend::new([]);
    let provider = CountingProvider::default();
    let client = client(&http, &provider);

    let err = client.get("a/../b").await.expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidKey);
    assert!(http.sent().is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_missing_credential() {
    let http = MockHttpSend::new([]);
    let provider = CountingProvider {
        empty: true,
        ..Default::default()
    };
    let client = client(&http, &provider);

    let err = client.get("a.png").await.expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    assert!(http.sent().is_empty());

    // Failures are not cached.
    let _ = client.get("a.png").await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_timeout() {
    let http = MockHttpSend::new([MockReply::Delayed(Duration::from_secs(5), StatusCode::OK)]);
    let client = client(&http, &CountingProvider::default())
        .with_timeout(Duration::from_millis(50));

    let err = client.get("slow.png").await.expect_err("must time out");
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_head() -> anyhow::Result<()> {
    let http = MockHttpSend::new([MockReply::WithHeaders(
        StatusCode::OK,
        vec![
            ("content-length", "434234"),
            ("etag", "\"fba9dede5f27731c9771645a39863328\""),
            ("last-modified", "Sun, 1 Jan 2006 12:00:00 GMT"),
        ],
        "",
    )]);
    let client = client(&http, &CountingProvider::default());

    let meta = client.head("a.png").await?;
    assert_eq!(meta.key, "a.png");
    assert_eq!(meta.size, 434234);
    assert_eq!(meta.etag.as_deref(), Some("fba9dede5f27731c9771645a39863328"));
    assert!(meta.last_modified.is_some());
    assert_eq!(http.sent()[0].method, Method::HEAD);
    Ok(())
}

#[tokio::test]
async fn test_head_without_content_length() -> anyhow::Result<()> {
    let http = MockHttpSend::new([
        MockReply::Status(StatusCode::OK, ""),
        MockReply::WithHeaders(StatusCode::OK, vec![("content-length", "lots")], ""),
    ]);
    let client = client(&http, &CountingProvider::default());

    assert_eq!(client.head("a.png").await?.size, 0);
    assert_eq!(client.head("a.png").await?.size, 0);
    Ok(())
}

#[tokio::test]
async fn test_list_two_pages() -> anyhow::Result<()> {
    let http = MockHttpSend::new([
        MockReply::Status(StatusCode::OK, PAGE_ONE),
        MockReply::Status(StatusCode::OK, PAGE_TWO),
    ]);
    let client = client(&http, &CountingProvider::default());

    let mut lister = client.list("photos/");
    assert!(http.sent().is_empty(), "listing must be lazy");

    let mut keys = vec![];
    while let Some(object) = lister.next().await? {
        keys.push(object.key);
        if keys.len() == 2 {
            assert_eq!(http.sent().len(), 1, "second page fetched only when needed");
            assert_eq!(lister.cursor(), Some(ListCursor::from_token("token/one=")));
        }
    }
    assert_eq!(keys, vec!["photos/a.png", "photos/b.png", "photos/c.png"]);
    assert!(lister.cursor().is_none());

    let sent = http.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0].uri.to_string(),
        "http://127.0.0.1:9000/media/?list-type=2&prefix=assets%2Fphotos%2F"
    );
    assert_eq!(
        sent[1].uri.to_string(),
        "http://127.0.0.1:9000/media/?continuation-token=token%2Fone%3D&list-type=2&prefix=assets%2Fphotos%2F"
    );
    Ok(())
}

#[tokio::test]
async fn test_list_resume_mid_page() -> anyhow::Result<()> {
    let http = MockHttpSend::new([
        MockReply::Status(StatusCode::OK, PAGE_ONE),
        MockReply::Status(StatusCode::OK, PAGE_ONE),
        MockReply::Status(StatusCode::OK, PAGE_TWO),
    ]);
    let client = client(&http, &CountingProvider::default());

    let mut lister = client.list("photos/");
    let first = lister.next().await?.expect("first object must exist");
    let cursor = lister.cursor().expect("listing is not exhausted");
    assert_eq!(
        cursor,
        ListCursor {
            continuation_token: None,
            skip: 1,
        }
    );
    drop(lister);

    let mut keys = vec![first.key];
    let mut lister = client.list_from("photos/", cursor);
    while let Some(object) = lister.next().await? {
        keys.push(object.key);
    }
    assert_eq!(keys, vec!["photos/a.png", "photos/b.png", "photos/c.png"]);

    let sent = http.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].uri, sent[1].uri, "resume refetches the unfinished page");
    Ok(())
}

#[tokio::test]
async fn test_list_from_token_as_stream() -> anyhow::Result<()> {
    let http = MockHttpSend::new([MockReply::Status(StatusCode::OK, PAGE_TWO)]);
    let client = client(&http, &CountingProvider::default());

    let objects = client
        .list_from("photos/", ListCursor::from_token("token/one="))
        .with_max_keys(2)
        .into_stream()
        .try_collect::<Vec<_>>()
        .await?;
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, "photos/c.png");
    assert_eq!(objects[0].size, 3);

    let sent = http.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].uri.query(),
        Some("continuation-token=token%2Fone%3D&list-type=2&max-keys=2&prefix=assets%2Fphotos%2F")
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_refresh() -> anyhow::Result<()> {
    let http = MockHttpSend::new((0..16).map(|_| MockReply::Status(StatusCode::OK, "ok")));
    let provider = CountingProvider {
        delay: Duration::from_millis(50),
        ..Default::default()
    };
    let client = client(&http, &provider);

    let tasks = (0..16)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.get(&format!("{i}.png")).await })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await??;
    }

    assert_eq!(provider.calls(), 1);
    assert_eq!(http.sent().len(), 16);
    Ok(())
}

#[tokio::test]
async fn test_presign_get() -> anyhow::Result<()> {
    let http = MockHttpSend::new([]);
    let client = client(&http, &CountingProvider::default());

    let url = client
        .presign_get("images/a b.png", Duration::from_secs(3600))
        .await?;
    assert!(url.starts_with("http://127.0.0.1:9000/media/assets/images/a%20b.png?"));
    assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
    assert!(url.contains("X-Amz-Expires=3600"));
    assert!(url.contains("X-Amz-SignedHeaders=host"));
    assert!(url.contains("X-Amz-Signature="));
    assert!(http.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_public_url() -> anyhow::Result<()> {
    let client = client(&MockHttpSend::new([]), &CountingProvider::default());
    assert_eq!(
        client.public_url("images/a b.png")?,
        "https://store.example.com/media/assets/images/a%20b.png"
    );
    Ok(())
}
