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

use crate::StorageClient;
use futures::Stream;
use ibmcos_core::time::{parse_rfc3339, DateTime};
use ibmcos_core::{Error, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::VecDeque;

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key, relative to the configured prefix.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag without surrounding quotes.
    pub etag: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime>,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default)]
pub(crate) struct ListPage {
    pub(crate) objects: Vec<ObjectMeta>,
    pub(crate) next_token: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ListBucketResult {
    is_truncated: bool,
    next_continuation_token: Option<String>,
    contents: Vec<ListObjectsContent>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ListObjectsContent {
    key: String,
    size: u64,
    #[serde(rename = "ETag")]
    etag: Option<String>,
    last_modified: Option<String>,
}

/// Strip the quotes S3 puts around entity tags.
pub(crate) fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Parse a ListObjectsV2 body. `relative_key` maps backend keys to caller keys.
pub(crate) fn parse_list_page(body: &[u8], relative_key: impl Fn(&str) -> String) -> Result<ListPage> {
    let output: ListBucketResult = quick_xml::de::from_str(&String::from_utf8_lossy(body))
        .map_err(|e| Error::unexpected("failed to parse list objects response").with_source(e))?;

    let next_token = match (output.is_truncated, output.next_continuation_token) {
        (true, Some(token)) if !token.is_empty() => Some(token),
        (true, _) => {
            warn!("list objects response is truncated without continuation token, stop listing");
            None
        }
        (false, _) => None,
    };

    let objects = output
        .contents
        .into_iter()
        .map(|c| ObjectMeta {
            key: relative_key(&c.key),
            size: c.size,
            etag: c.etag.as_deref().map(trim_etag),
            last_modified: c.last_modified.as_deref().and_then(|v| parse_rfc3339(v).ok()),
        })
        .collect();

    Ok(ListPage {
        objects,
        next_token,
    })
}

/// Position to resume a listing from, see [`Lister::cursor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListCursor {
    /// Backend token of the page to request, `None` for the first page.
    pub continuation_token: Option<String>,
    /// Number of objects of that page already yielded.
    pub skip: usize,
}

impl ListCursor {
    /// Cursor at the start of the page identified by `token`.
    pub fn from_token(token: &str) -> Self {
        Self {
            continuation_token: Some(token.to_string()),
            skip: 0,
        }
    }
}

/// Lister walks a prefix page by page.
///
/// No request is sent until the first [`Lister::next`]. The next page is only
/// requested once the current one is drained.
#[derive(Debug)]
pub struct Lister {
    client: StorageClient,
    prefix: String,
    max_keys: Option<usize>,

    /// Token the current page was requested with.
    page_token: Option<String>,
    /// Objects of the current page handed out so far.
    yielded: usize,
    next_token: Option<String>,
    fetched: bool,
    buffer: VecDeque<ObjectMeta>,
}

impl Lister {
    pub(crate) fn new(client: StorageClient, prefix: &str, cursor: ListCursor) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
            max_keys: None,

            page_token: cursor.continuation_token,
            yielded: cursor.skip,
            next_token: None,
            fetched: false,
            buffer: VecDeque::new(),
        }
    }

    /// Limit the number of keys requested per page.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    /// Position right after the last yielded object.
    ///
    /// Pass it to [`StorageClient::list_from`] to resume. Returns `None` once
    /// the listing is exhausted. Resuming mid-page relies on the backend
    /// returning the same page for the same token.
    pub fn cursor(&self) -> Option<ListCursor> {
        if self.fetched && self.buffer.is_empty() {
            return self.next_token.as_deref().map(ListCursor::from_token);
        }

        Some(ListCursor {
            continuation_token: self.page_token.clone(),
            skip: self.yielded,
        })
    }

    /// Yield the next object, `None` once the listing is exhausted.
    pub async fn next(&mut self) -> Result<Option<ObjectMeta>> {
        loop {
            if let Some(object) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(object));
            }
            if self.fetched {
                match self.next_token.take() {
                    Some(token) => {
                        self.page_token = Some(token);
                        self.yielded = 0;
                        self.fetched = false;
                    }
                    None => return Ok(None),
                }
            }

            let page = self
                .client
                .list_page(&self.prefix, self.page_token.as_deref(), self.max_keys)
                .await?;
            debug!(
                "listed {} objects under {:?}, has next page: {}",
                page.objects.len(),
                self.prefix,
                page.next_token.is_some()
            );

            if self.yielded > page.objects.len() {
                warn!(
                    "resume position {} is beyond page of {} objects under {:?}",
                    self.yielded,
                    page.objects.len(),
                    self.prefix
                );
            }
            self.fetched = true;
            self.next_token = page.next_token;
            self.buffer
                .extend(page.objects.into_iter().skip(self.yielded));
        }
    }

    /// Convert into a [`Stream`] of objects.
    pub fn into_stream(self) -> impl Stream<Item = Result<ObjectMeta>> + Send {
        futures::stream::try_unfold(self, |mut lister| async move {
            Ok(lister.next().await?.map(|object| (object, lister)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_list_page() -> anyhow::Result<()> {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>media</Name>
  <Prefix>assets/</Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wmY=</NextContinuationToken>
  <Contents>
    <Key>assets/a.png</Key>
    <LastModified>2024-01-02T03:04:05.000Z</LastModified>
    <ETag>"9b2cf535f27731c974343645a3985328"</ETag>
    <Size>434234</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>assets/images/b c.png</Key>
    <Size>0</Size>
  </Contents>
</ListBucketResult>"#;

        let page = parse_list_page(body.as_bytes(), |k| {
            k.strip_prefix("assets/").unwrap_or(k).to_string()
        })?;
        assert_eq!(
            page.next_token.as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wmY=")
        );
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].key, "a.png");
        assert_eq!(page.objects[0].size, 434234);
        assert_eq!(
            page.objects[0].etag.as_deref(),
            Some("9b2cf535f27731c974343645a3985328")
        );
        assert_eq!(
            page.objects[0].last_modified,
            Some(parse_rfc3339("2024-01-02T03:04:05Z")?)
        );
        assert_eq!(page.objects[1].key, "images/b c.png");
        assert_eq!(page.objects[1].etag, None);
        Ok(())
    }

    #[test]
    fn test_parse_last_page() -> anyhow::Result<()> {
        let body = r#"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let page = parse_list_page(body.as_bytes(), |k| k.to_string())?;
        assert!(page.objects.is_empty());
        assert!(page.next_token.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_truncated_without_token_stops() -> anyhow::Result<()> {
        let body = r#"<ListBucketResult><IsTruncated>true</IsTruncated><Contents><Key>a</Key><Size>1</Size></Contents></ListBucketResult>"#;
        let page = parse_list_page(body.as_bytes(), |k| k.to_string())?;
        assert_eq!(page.objects.len(), 1);
        assert!(page.next_token.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_list_page(
            b"<ListBucketResult><IsTruncated>maybe</IsTruncated></ListBucketResult>",
            |k| k.to_string(),
        )
        .expect_err("must fail");
        assert_eq!(err.kind(), ibmcos_core::ErrorKind::Unexpected);
    }
}
