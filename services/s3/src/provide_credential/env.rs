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

use crate::{constants::*, Credential};
use async_trait::async_trait;
use ibmcos_core::{Context, ProvideCredential, Result};

/// EnvCredentialProvider loads HMAC credentials from environment variables.
///
/// `IBM_COS_ACCESS_KEY_ID` / `IBM_COS_SECRET_ACCESS_KEY` / `IBM_COS_SESSION_TOKEN`
/// are read first. The `AWS_*` names are used when the pair is missing.
/// The two key halves are never mixed between the families.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    /// Create a new EnvCredentialProvider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for EnvCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let envs = ctx.env_vars();

        for (ak, sk, token) in [
            (
                IBM_COS_ACCESS_KEY_ID,
                IBM_COS_SECRET_ACCESS_KEY,
                IBM_COS_SESSION_TOKEN,
            ),
            (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN),
        ] {
            if let (Some(ak), Some(sk)) = (envs.get(ak), envs.get(sk)) {
                return Ok(Some(Credential {
                    access_key_id: ak.clone(),
                    secret_access_key: sk.clone(),
                    session_token: envs.get(token).cloned(),
                    expires_in: None,
                }));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmcos_core::StaticEnv;
    use std::collections::HashMap;

    fn ctx(envs: &[(&str, &str)]) -> Context {
        Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    #[tokio::test]
    async fn test_env_credential_provider() -> anyhow::Result<()> {
        let ctx = ctx(&[
            (IBM_COS_ACCESS_KEY_ID, "test_access_key"),
            (IBM_COS_SECRET_ACCESS_KEY, "test_secret_key"),
        ]);

        let cred = EnvCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .expect("credential must exist");
        assert_eq!(cred.access_key_id, "test_access_key");
        assert_eq!(cred.secret_access_key, "test_secret_key");
        assert!(cred.session_token.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_env_credential_provider_prefers_ibm_names() -> anyhow::Result<()> {
        let ctx = ctx(&[
            (IBM_COS_ACCESS_KEY_ID, "ibm_ak"),
            (IBM_COS_SECRET_ACCESS_KEY, "ibm_sk"),
            (IBM_COS_SESSION_TOKEN, "ibm_token"),
            (AWS_ACCESS_KEY_ID, "aws_ak"),
            (AWS_SECRET_ACCESS_KEY, "aws_sk"),
        ]);

        let cred = EnvCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .expect("credential must exist");
        assert_eq!(cred.access_key_id, "ibm_ak");
        assert_eq!(cred.session_token.as_deref(), Some("ibm_token"));

        Ok(())
    }

    #[tokio::test]
    async fn test_env_credential_provider_falls_back_to_aws_names() -> anyhow::Result<()> {
        let ctx = ctx(&[
            (IBM_COS_ACCESS_KEY_ID, "half_pair"),
            (AWS_ACCESS_KEY_ID, "aws_ak"),
            (AWS_SECRET_ACCESS_KEY, "aws_sk"),
            (AWS_SESSION_TOKEN, "aws_token"),
        ]);

        let cred = EnvCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .expect("credential must exist");
        assert_eq!(cred.access_key_id, "aws_ak");
        assert_eq!(cred.secret_access_key, "aws_sk");
        assert_eq!(cred.session_token.as_deref(), Some("aws_token"));

        Ok(())
    }

    #[tokio::test]
    async fn test_env_credential_provider_without_env() -> anyhow::Result<()> {
        let cred = EnvCredentialProvider::new()
            .provide_credential(&ctx(&[]))
            .await?;
        assert!(cred.is_none());

        Ok(())
    }
}
