/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Capability: persistent local key/value storage. The host application
//! supplies the real implementation; this crate only ever reads/writes
//! whole JSON values under string keys.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value);
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Option<Value> {
        self.as_ref().get(key).await
    }

    async fn set(&self, key: &str, value: Value) {
        self.as_ref().set(key, value).await;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod mem {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// An in-memory [`KeyValueStore`], for tests and examples.
    #[derive(Default)]
    pub struct MemoryKv {
        inner: Mutex<HashMap<String, Value>>,
    }

    impl MemoryKv {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KeyValueStore for MemoryKv {
        async fn get(&self, key: &str) -> Option<Value> {
            self.inner.lock().await.get(key).cloned()
        }

        async fn set(&self, key: &str, value: Value) {
            self.inner.lock().await.insert(key.to_string(), value);
        }
    }
}
