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

use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

// Headers used in s3 compatible services.
pub const X_AMZ_CONTENT_SHA_256: &str = "x-amz-content-sha256";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

// Signing algorithm and service name.
pub const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
pub const S3_SERVICE: &str = "s3";

// Defaults matching IBM Cloud Object Storage public endpoints.
pub const DEFAULT_REGION: &str = "us-standard";
pub const DEFAULT_ENDPOINT: &str = "https://s3-api.us-geo.objectstorage.service.networklayer.com";
pub const DEFAULT_HOST: &str = "s3-api.us-geo.objectstorage.softlayer.net";
pub const DEFAULT_CACHE_NAMESPACE: &str = "ibmcos:";

// Env values used by ibmcos.
pub const IBM_COS_BUCKET: &str = "IBM_COS_BUCKET";
pub const IBM_COS_PREFIX: &str = "IBM_COS_PREFIX";
pub const IBM_COS_REGION: &str = "IBM_COS_REGION";
pub const IBM_COS_ENDPOINT: &str = "IBM_COS_ENDPOINT";
pub const IBM_COS_HOST: &str = "IBM_COS_HOST";
pub const IBM_COS_USE_PATH_STYLE: &str = "IBM_COS_USE_PATH_STYLE";
pub const IBM_COS_USE_HOST: &str = "IBM_COS_USE_HOST";
pub const IBM_COS_BASE_URL: &str = "IBM_COS_BASE_URL";
pub const IBM_COS_ACCESS_KEY_ID: &str = "IBM_COS_ACCESS_KEY_ID";
pub const IBM_COS_SECRET_ACCESS_KEY: &str = "IBM_COS_SECRET_ACCESS_KEY";
pub const IBM_COS_SESSION_TOKEN: &str = "IBM_COS_SESSION_TOKEN";
pub const IBM_COS_CREDENTIALS_FILE: &str = "IBM_COS_CREDENTIALS_FILE";
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Location of the credential file written by `ibmcloud cos config`.
pub const DEFAULT_CREDENTIALS_FILE: &str = "~/.bluemix/cos_credentials";

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// - URI encode every byte except the unreserved characters: 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
/// - `/` is kept so it stays a path separator.
pub static AWS_URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// But used in query.
pub static AWS_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
