//! Key/value cache with a time-to-live.

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::types::{Clock, SystemClock, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

use super::storage::Storage;

/// Time unit for a TTL amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TtlUnit {
    fn millis(self) -> u64 {
        match self {
            TtlUnit::Milliseconds => 1,
            TtlUnit::Seconds => 1_000,
            TtlUnit::Minutes => 60_000,
            TtlUnit::Hours => 3_600_000,
            TtlUnit::Days => 86_400_000,
            TtlUnit::Weeks => 604_800_000,
        }
    }

    /// `amount` of this unit.
    pub fn duration(self, amount: u64) -> Duration {
        Duration::from_millis(amount.saturating_mul(self.millis()))
    }
}

impl FromStr for TtlUnit {
    type Err = CacheError;

    /// Accepts short (`"s"`), singular (`"second"`) and plural (`"seconds"`) names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ms" | "millisecond" | "milliseconds" => Ok(TtlUnit::Milliseconds),
            "s" | "second" | "seconds" => Ok(TtlUnit::Seconds),
            "m" | "minute" | "minutes" => Ok(TtlUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TtlUnit::Hours),
            "d" | "day" | "days" => Ok(TtlUnit::Days),
            "w" | "week" | "weeks" => Ok(TtlUnit::Weeks),
            other => Err(CacheError::UnknownUnit(other.to_string())),
        }
    }
}

/// Stored form of an entry.
#[derive(Serialize)]
struct EntryRef<'a, V> {
    value: &'a V,
    #[serde(rename = "expireAt")]
    expire_at: Timestamp,
}

#[derive(Deserialize)]
struct Entry<V> {
    value: V,
    #[serde(rename = "expireAt")]
    expire_at: Timestamp,
}

/// Values with an expiry, persisted through a [`Storage`].
///
/// Entries are JSON `{ "value": ..., "expireAt": <epoch ms> }` stored under
/// `"{namespace}{key}"`. Expired or unreadable entries read as absent.
pub struct ExpiringCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl ExpiringCache {
    pub fn new(storage: Arc<dyn Storage>, config: &CacheConfig) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            namespace: config.namespace.clone(),
        }
    }

    /// Use `clock` for "now" instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Store `value` for `amount` `unit`s and hand it back.
    pub fn set<V: Serialize>(
        &self,
        key: &str,
        value: V,
        amount: u64,
        unit: TtlUnit,
    ) -> Result<V, CacheError> {
        let expire_at = self.clock.now().saturating_add(unit.duration(amount));
        let json = serde_json::to_string(&EntryRef {
            value: &value,
            expire_at,
        })?;
        self.storage.set_item(&self.storage_key(key), &json)?;
        trace!(key, ?expire_at, "cache entry stored");
        Ok(value)
    }

    /// The stored value, if present, readable, and not yet expired.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let storage_key = self.storage_key(key);
        let raw = match self.storage.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(key, %error, "unreadable cache entry");
                return None;
            }
        };

        let entry: Entry<V> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key, %error, "corrupt cache entry");
                return None;
            }
        };

        if entry.expire_at > self.clock.now() {
            Some(entry.value)
        } else {
            trace!(key, "cache entry expired");
            None
        }
    }

    /// Like [`ExpiringCache::get`], falling back to `fallback`.
    pub fn get_or<V: DeserializeOwned>(&self, key: &str, fallback: V) -> V {
        self.get(key).unwrap_or(fallback)
    }

    pub fn unset(&self, key: &str) -> Result<(), CacheError> {
        self.storage.remove_item(&self.storage_key(key))?;
        Ok(())
    }
}

impl fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("namespace", &self.namespace)
            .finish()
    }
}
