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

use crate::time::{now, DateTime};
use crate::Result;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

type Store<C> = Arc<RwLock<HashMap<String, CacheEntry<C>>>>;

/// A cached credential together with the instant it stops being served.
#[derive(Clone)]
struct CacheEntry<C> {
    credential: C,
    expires_at: Option<DateTime>,
}

impl<C> CacheEntry<C> {
    fn is_fresh(&self, now: DateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// CredentialCache stores credentials under namespaced keys.
///
/// - An entry is never returned at or after its expiry.
/// - Entries are replaced on refresh, never mutated in place.
/// - [`CredentialCache::get_or_refresh`] allows at most one refresh in flight
///   per key; concurrent callers wait for it and reuse its result.
///
/// Cloning a cache, or deriving one with [`CredentialCache::with_namespace`],
/// shares the backing store.
pub struct CredentialCache<C> {
    namespace: String,
    store: Store<C>,
    refreshing: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<C> Clone for CredentialCache<C> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            store: self.store.clone(),
            refreshing: self.refreshing.clone(),
        }
    }
}

impl<C> Debug for CredentialCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.store.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("CredentialCache")
            .field("namespace", &self.namespace)
            .field("entries", &entries)
            .finish()
    }
}

impl<C: Clone + Send + Sync + 'static> CredentialCache<C> {
    /// Create a new cache with its own backing store.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store: Arc::default(),
            refreshing: Arc::default(),
        }
    }

    /// Create a cache that shares this cache's backing store under another namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store: self.store.clone(),
            refreshing: self.refreshing.clone(),
        }
    }

    /// Namespace prepended to every key.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Get a fresh credential, `None` on miss or expiry.
    pub fn get(&self, key: &str) -> Option<C> {
        self.get_at(key, now())
    }

    /// Get a credential that is still fresh at `now`.
    pub fn get_at(&self, key: &str, now: DateTime) -> Option<C> {
        let store = self.store.read().expect("lock poisoned");
        store
            .get(&self.full_key(key))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.credential.clone())
    }

    /// Store a credential, replacing any previous entry.
    ///
    /// `expires_at` of `None` keeps the entry until it's invalidated.
    pub fn put(&self, key: &str, credential: C, expires_at: Option<DateTime>) {
        let entry = CacheEntry {
            credential,
            expires_at,
        };
        self.store
            .write()
            .expect("lock poisoned")
            .insert(self.full_key(key), entry);
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.store
            .write()
            .expect("lock poisoned")
            .remove(&self.full_key(key));
    }

    /// Get a fresh credential, or refresh it with `fetch` on miss.
    ///
    /// `fetch` returns the credential with its expiry. Errors are returned
    /// to the caller and never cached.
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, fetch: F) -> Result<C>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(C, Option<DateTime>)>>,
    {
        if let Some(cred) = self.get(key) {
            return Ok(cred);
        }

        let full_key = self.full_key(key);
        let lock = self
            .refreshing
            .lock()
            .expect("lock poisoned")
            .entry(full_key.clone())
            .or_default()
            .clone();
        let guard = lock.lock().await;

        // Another caller may have refreshed while we were waiting.
        let result = match self.get(key) {
            Some(cred) => {
                log::debug!("credential {full_key} refreshed by concurrent caller");
                Ok(cred)
            }
            None => {
                log::debug!("credential {full_key} missing or expired, refreshing");
                fetch().await.map(|(cred, expires_at)| {
                    self.put(key, cred.clone(), expires_at);
                    cred
                })
            }
        };

        drop(guard);
        self.release_refresh_lock(&full_key, lock);
        result
    }

    /// Forget the refresh lock of `full_key` once nobody else holds it.
    fn release_refresh_lock(&self, full_key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut refreshing = self.refreshing.lock().expect("lock poisoned");
        drop(lock);
        // The map holds the last reference when no caller is waiting.
        if refreshing
            .get(full_key)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            refreshing.remove(full_key);
        }
    }

    #[cfg(test)]
    fn refresh_locks(&self) -> usize {
        self.refreshing.lock().expect("lock poisoned").len()
    }
}
