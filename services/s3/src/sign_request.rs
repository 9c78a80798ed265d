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

use crate::constants::{
    AWS4_HMAC_SHA256, AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, UNSIGNED_PAYLOAD,
    X_AMZ_CONTENT_SHA_256, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use async_trait::async_trait;
use http::request::Parts;
use http::{header, HeaderValue};
use ibmcos_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use ibmcos_core::time::{format_date, format_iso8601, now, DateTime};
use ibmcos_core::{Context, Error, Result, SignRequest, SigningRequest};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::fmt::Write;
use std::time::Duration;

/// Default tolerance between the signing time and the local clock.
pub const DEFAULT_CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(15 * 60);

/// Headers that proxies are known to rewrite, never signed.
const UNSIGNED_HEADERS: &[&str] = &["authorization", "user-agent", "x-amzn-trace-id"];

/// RequestSigner that implements AWS SigV4, as accepted by IBM COS HMAC credentials.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,

    clock_skew_tolerance: Option<Duration>,
}

impl RequestSigner {
    /// Create a new signer for the given service and region.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            clock_skew_tolerance: Some(DEFAULT_CLOCK_SKEW_TOLERANCE),
        }
    }

    /// Set the accepted distance between signing time and local clock.
    ///
    /// `None` disables the check.
    pub fn with_clock_skew_tolerance(mut self, tolerance: Option<Duration>) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Signing region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signing service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sign `req` in place at `time`.
    ///
    /// With `expires_in` the signature goes into the query string (presign),
    /// otherwise into the `Authorization` header.
    ///
    /// Credential and clock skew errors leave the request untouched.
    pub fn sign(
        &self,
        req: &mut Parts,
        cred: &Credential,
        time: DateTime,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        if cred.access_key_id.is_empty() || cred.secret_access_key.is_empty() {
            return Err(Error::invalid_credentials(
                "access key id and secret access key must not be empty",
            ));
        }
        self.check_clock_skew(time)?;

        let mut signed_req = SigningRequest::build(req)?;
        let signature = match self.sign_inner(&mut signed_req, cred, time, expires_in) {
            Ok(v) => v,
            Err(err) => {
                // Give the taken uri and headers back before bailing out.
                signed_req.apply(req)?;
                return Err(err);
            }
        };

        match signature {
            Signature::Query(signature) => {
                signed_req.query_push("X-Amz-Signature", signature);
            }
            Signature::Header(mut authorization) => {
                authorization.set_sensitive(true);
                signed_req
                    .headers
                    .insert(header::AUTHORIZATION, authorization);
            }
        }

        // Apply to the request.
        signed_req.apply(req)
    }

    fn check_clock_skew(&self, time: DateTime) -> Result<()> {
        let Some(tolerance) = self.clock_skew_tolerance else {
            return Ok(());
        };

        let tolerance = chrono::TimeDelta::from_std(tolerance)
            .map_err(|e| Error::config_invalid("clock skew tolerance out of range").with_source(e))?;
        let skew = (now() - time).abs();
        if skew > tolerance {
            return Err(Error::clock_skew(format!(
                "signing time {} is {}s away from local clock, tolerance is {}s",
                format_iso8601(time),
                skew.num_seconds(),
                tolerance.num_seconds()
            )));
        }

        Ok(())
    }

    fn sign_inner(
        &self,
        signed_req: &mut SigningRequest,
        cred: &Credential,
        now: DateTime,
        expires_in: Option<Duration>,
    ) -> Result<Signature> {
        // canonicalize context
        canonicalize_header(signed_req, cred, expires_in, now)?;
        canonicalize_query(
            signed_req,
            cred,
            expires_in,
            now,
            &self.service,
            &self.region,
        )?;

        // build canonical request and string to sign.
        let creq = canonical_request_string(signed_req)?;
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/aws4_request",
            format_date(now),
            self.region,
            self.service
        );
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{AWS4_HMAC_SHA256}")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", &encoded_req)?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        if expires_in.is_some() {
            Ok(Signature::Query(signature))
        } else {
            let authorization = HeaderValue::from_str(&format!(
                "{AWS4_HMAC_SHA256} Credential={}/{}, SignedHeaders={}, Signature={}",
                cred.access_key_id,
                scope,
                signed_header_names(signed_req).join(";"),
                signature
            ))?;
            Ok(Signature::Header(authorization))
        }
    }
}

enum Signature {
    Header(HeaderValue),
    Query(String),
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let Some(cred) = credential else {
            return Ok(());
        };

        self.sign(req, cred, now(), expires_in)
    }
}

fn signed_header_names(ctx: &SigningRequest) -> Vec<&str> {
    ctx.header_name_to_vec_sorted()
        .into_iter()
        .filter(|name| !UNSIGNED_HEADERS.contains(name))
        .collect()
}

fn canonical_request_string(ctx: &SigningRequest) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", ctx.method)?;
    // Insert encoded path
    let path = percent_decode_str(&ctx.path)
        .decode_utf8()
        .map_err(|e| Error::invalid_key("request path is not valid utf-8").with_source(e))?;
    if path.is_empty() {
        writeln!(f, "/")?;
    } else {
        writeln!(f, "{}", utf8_percent_encode(&path, &AWS_URI_ENCODE_SET))?;
    }
    // Insert query, already encoded and sorted.
    writeln!(
        f,
        "{}",
        ctx.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;
    // Insert signed headers
    let signed_headers = signed_header_names(ctx);
    for name in signed_headers.iter() {
        let values = ctx
            .headers
            .get_all(*name)
            .iter()
            .map(|v| v.to_str())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        writeln!(f, "{}:{}", name, values.join(","))?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;

    match ctx.headers.get(X_AMZ_CONTENT_SHA_256) {
        Some(v) => write!(f, "{}", v.to_str()?)?,
        None => write!(f, "{UNSIGNED_PAYLOAD}")?,
    }

    Ok(f)
}

fn canonicalize_header(
    ctx: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
) -> Result<()> {
    // Header names and values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    for (_, value) in ctx.headers.iter_mut() {
        SigningRequest::header_value_normalize(value)?;
    }

    // Insert HOST header if not present.
    if ctx.headers.get(header::HOST).is_none() {
        ctx.headers
            .insert(header::HOST, ctx.authority.as_str().parse()?);
    }

    if expires_in.is_none() {
        // Insert DATE header if not present.
        if ctx.headers.get(X_AMZ_DATE).is_none() {
            let date_header = HeaderValue::try_from(format_iso8601(now))?;
            ctx.headers.insert(X_AMZ_DATE, date_header);
        }

        // Insert X_AMZ_CONTENT_SHA_256 header if not present.
        if ctx.headers.get(X_AMZ_CONTENT_SHA_256).is_none() {
            ctx.headers.insert(
                X_AMZ_CONTENT_SHA_256,
                HeaderValue::from_static(UNSIGNED_PAYLOAD),
            );
        }

        // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
        if let Some(token) = &cred.session_token {
            let mut value = HeaderValue::from_str(token)?;
            // Set token value sensitive to valid leaking.
            value.set_sensitive(true);

            ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
    }

    Ok(())
}

fn canonicalize_query(
    ctx: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
    service: &str,
    region: &str,
) -> Result<()> {
    if let Some(expire) = expires_in {
        let signed_headers = signed_header_names(ctx).join(";");

        ctx.query_push("X-Amz-Algorithm", AWS4_HMAC_SHA256);
        ctx.query_push(
            "X-Amz-Credential",
            format!(
                "{}/{}/{}/{}/aws4_request",
                cred.access_key_id,
                format_date(now),
                region,
                service
            ),
        );
        ctx.query_push("X-Amz-Date", format_iso8601(now));
        ctx.query_push("X-Amz-Expires", expire.as_secs().to_string());
        ctx.query_push("X-Amz-SignedHeaders", signed_headers);

        if let Some(token) = &cred.session_token {
            ctx.query_push("X-Amz-Security-Token", token.as_str());
        }
    }

    // Return if query is empty.
    if ctx.query.is_empty() {
        return Ok(());
    }

    ctx.query = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();

    // Sort by encoded param name, then value.
    ctx.query.sort();

    Ok(())
}

fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
