// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use cadence_config::{ConfigError, ConfigStore};

/// In-memory implementation of [`ConfigStore`] for testing.
///
/// Clones share state, so a test can hand one clone to a `ConfigService` and
/// inspect the other.
///
/// # Example
///
/// ```
/// use cadence_config::ConfigService;
/// use cadence_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// service.save("driver", &vec!["early", "late"]).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("driver"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create a new empty in-memory config store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `value` under `key`.
    pub fn with_entry(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.inner.borrow_mut().data.insert(key.into(), value.into());
        store
    }

    /// Make every subsequent `load_raw` fail (or succeed again).
    pub fn set_fail_on_load(&self, fail: bool) {
        self.inner.borrow_mut().fail_on_load = fail;
    }

    /// Make every subsequent `save_raw` fail (or succeed again).
    pub fn set_fail_on_save(&self, fail: bool) {
        self.inner.borrow_mut().fail_on_save = fail;
    }

    /// `load_raw` attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.inner.borrow().load_count
    }

    /// `save_raw` attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.inner.borrow().save_count
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().data.keys().cloned().collect()
    }

    /// Whether `key` is stored.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().data.contains_key(key)
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.inner.borrow_mut();
        inner.load_count += 1;
        if inner.fail_on_load {
            return Err(ConfigError::Other("simulated load failure".into()));
        }
        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.inner.borrow_mut();
        inner.save_count += 1;
        if inner.fail_on_save {
            return Err(ConfigError::Other("simulated save failure".into()));
        }
        inner.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
