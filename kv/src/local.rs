//! In-process KV store. Used in tests and as the default backend for a
//! single-binary deployment of the control plane.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{KvError, SharedKv};

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// An in-memory stand-in for Redis. TTLs are enforced lazily on read — there
/// is no background sweeper, matching that the real store enforces
/// expiration server-side and callers never see a window where a fresh read
/// returns stale data.
#[derive(Default)]
pub struct LocalKv {
    strings: DashMap<String, StringEntry>,
    sets: DashMap<String, HashSet<String>>,
}

impl LocalKv {
    pub fn new() -> Self {
        LocalKv {
            strings: DashMap::new(),
            sets: DashMap::new(),
        }
    }
}

#[async_trait]
impl SharedKv for LocalKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        match self.strings.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.strings.remove(key).is_some())
    }

    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let now = Instant::now();
        match self.strings.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    Ok(false)
                } else {
                    entry.insert(StringEntry {
                        value: value.to_string(),
                        expires_at: Some(now + ttl),
                    });
                    Ok(true)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(StringEntry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                });
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        match self.strings.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if entry.get().value == expected {
                    entry.remove();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(_) => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        Ok(self
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        Ok(self
            .sets
            .get_mut(key)
            .is_some_and(|mut members| members.remove(member)))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let now = Instant::now();
        Ok(self
            .strings
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
