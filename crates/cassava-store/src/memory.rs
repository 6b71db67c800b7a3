//! In-memory store implementation
//!
//! Implements the full `StoreOps` surface over a concurrent map with
//! millisecond TTL expiry. Script calls are dispatched on the request's
//! `ScriptKind` tag and emulate the same read-compare-write semantics a
//! networked store would run server-side. Expired entries are dropped
//! lazily on access.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use cassava_common::{NIL_SENTINEL, TXN_CURRENT_FIELD, now_millis};

use crate::ops::{StoreError, StoreOps};
use crate::script::{ScriptKind, ScriptRequest, ScriptValue};

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Zset(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<i64>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| now_millis() >= at)
    }
}

/// In-memory store with TTL support
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) keys
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a key in milliseconds, if any
    pub fn pttl(&self, key: &str) -> Option<i64> {
        let entry = self.data.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry.expires_at.map(|at| at - now_millis())
    }

    /// Drop the entry if expired; returns whether a live entry remains
    fn purge_if_expired(&self, key: &str) -> bool {
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired() {
                return true;
            }
        } else {
            return false;
        }
        self.data.remove_if(key, |_, e| e.is_expired());
        false
    }

    fn read_scalar(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.purge_if_expired(key) {
            return Ok(None);
        }
        match self.data.get(key).map(|e| e.value.clone()) {
            Some(Value::Scalar(s)) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn with_hash<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        self.purge_if_expired(key);
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => Ok(f(map)),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn with_list<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Vec<String>>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.purge_if_expired(key);
        match self.data.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::List(list) => f(Some(list)),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            None => f(None),
        }
    }

    fn with_zset<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, f64>) -> T,
    ) -> Result<T, StoreError> {
        self.purge_if_expired(key);
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Zset(HashMap::new())));
        match &mut entry.value {
            Value::Zset(map) => Ok(f(map)),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set_expiry(&self, key: &str, ttl_ms: u64) -> bool {
        match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(now_millis() + ttl_ms as i64);
                true
            }
            _ => false,
        }
    }
}

fn list_index(list: &[String], index: i64) -> Option<usize> {
    let len = list.len() as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

fn parse_int(value: &str, what: &str) -> Result<i64, StoreError> {
    value
        .parse::<i64>()
        .map_err(|_| StoreError::Script(format!("{} is not an integer: '{}'", what, value)))
}

fn arg<'a>(argv: &[&'a str], index: usize) -> Result<&'a str, StoreError> {
    argv.get(index)
        .copied()
        .ok_or_else(|| StoreError::Script(format!("missing script argument {}", index)))
}

fn trace_step(argv: &[&str], verbose_at: usize, step: &str) {
    if argv.get(verbose_at) == Some(&"1") {
        let trace = argv.get(verbose_at + 1).copied().unwrap_or("-");
        debug!("script[{}] {}", trace, step);
    }
}

#[async_trait]
impl StoreOps for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read_scalar(key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .insert(key.to_string(), Entry::new(Value::Scalar(value.to_string())));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let live = self.purge_if_expired(key);
        if live && self.data.remove(key).is_some() {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        if self.purge_if_expired(key) {
            return Ok(false);
        }
        let entry = Entry {
            value: Value::Scalar(value.to_string()),
            expires_at: Some(now_millis() + ttl_ms as i64),
        };
        self.data.insert(key.to_string(), entry);
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        if !self.purge_if_expired(key) {
            return Ok(None);
        }
        match self.data.get(key).map(|e| e.value.clone()) {
            Some(Value::Hash(map)) => Ok(map.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with_hash(key, |map| {
            map.insert(field.to_string(), value.to_string());
        })
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError> {
        if !self.purge_if_expired(key) {
            return Ok(0);
        }
        self.with_hash(key, |map| {
            fields.iter().filter(|f| map.remove(*f).is_some()).count() as u64
        })
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_hash(key, |map| {
            let current = map
                .get(field)
                .map(|v| parse_int(v, "hash field"))
                .transpose()?
                .unwrap_or(0);
            let next = current + delta;
            map.insert(field.to_string(), next.to_string());
            Ok(next)
        })?
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        self.with_list(key, |list| {
            Ok(list.and_then(|l| list_index(l, index).map(|i| l[i].clone())))
        })
    }

    async fn lset(&self, key: &str, index: i64, value: &str) -> Result<(), StoreError> {
        self.with_list(key, |list| {
            let list = list.ok_or_else(|| StoreError::Script("no such key".to_string()))?;
            let idx = list_index(list, index)
                .ok_or_else(|| StoreError::Script("index out of range".to_string()))?;
            list[idx] = value.to_string();
            Ok(())
        })
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        self.with_list(key, |list| {
            let Some(list) = list else { return Ok(0) };
            let mut removed = 0u64;
            let limit = if count == 0 { u64::MAX } else { count.unsigned_abs() };
            // count < 0 removes from the tail
            if count < 0 {
                let mut i = list.len();
                while i > 0 && removed < limit {
                    i -= 1;
                    if list[i] == value {
                        list.remove(i);
                        removed += 1;
                    }
                }
            } else {
                let mut i = 0;
                while i < list.len() && removed < limit {
                    if list[i] == value {
                        list.remove(i);
                        removed += 1;
                    } else {
                        i += 1;
                    }
                }
            }
            Ok(removed)
        })
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        if !self.purge_if_expired(key) {
            return Ok(None);
        }
        match self.data.get(key).map(|e| e.value.clone()) {
            Some(Value::Zset(map)) => Ok(map.get(member).copied()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.with_zset(key, |map| {
            map.insert(member.to_string(), score);
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        if !self.purge_if_expired(key) {
            return Ok(0);
        }
        self.with_zset(key, |map| map.remove(member).is_some() as u64)
    }

    async fn eval(&self, request: &ScriptRequest) -> Result<ScriptValue, StoreError> {
        let argv = request.argv();
        let key = request.key.as_str();
        match request.kind {
            ScriptKind::CasValue => {
                let expected = arg(&argv, 0)?;
                let new = arg(&argv, 1)?;
                let current = self.read_scalar(key)?;
                trace_step(&argv, 2, "cas value read");
                let matched = (current.is_none() && expected == NIL_SENTINEL)
                    || current.as_deref() == Some(expected);
                if !matched {
                    trace_step(&argv, 2, "cas value mismatch");
                    return Ok(ScriptValue::Int(0));
                }
                if new == NIL_SENTINEL {
                    self.data.remove(key);
                } else {
                    self.data
                        .insert(key.to_string(), Entry::new(Value::Scalar(new.to_string())));
                }
                trace_step(&argv, 2, "cas value applied");
                Ok(ScriptValue::Int(1))
            }
            ScriptKind::CasListElement => {
                let expected = arg(&argv, 0)?;
                let new = arg(&argv, 1)?;
                let index = parse_int(arg(&argv, 4)?, "list index")?;
                self.with_list(key, |list| {
                    let current = list
                        .as_deref()
                        .and_then(|l| list_index(l, index).map(|i| l[i].clone()));
                    let matched = (current.is_none() && expected == NIL_SENTINEL)
                        || current.as_deref() == Some(expected);
                    if !matched {
                        return Ok(ScriptValue::Int(0));
                    }
                    match (list, current) {
                        (Some(list), Some(_)) => {
                            let idx = list_index(list, index).expect("list index out of range");
                            if new == NIL_SENTINEL {
                                // no delete-at-index primitive: overwrite with the
                                // sentinel, then remove one matching element
                                list[idx] = NIL_SENTINEL.to_string();
                                list.retain({
                                    let mut dropped = false;
                                    move |v| {
                                        if !dropped && v == NIL_SENTINEL {
                                            dropped = true;
                                            false
                                        } else {
                                            true
                                        }
                                    }
                                });
                            } else {
                                list[idx] = new.to_string();
                            }
                            Ok(ScriptValue::Int(1))
                        }
                        // an absent element cannot be written in place
                        _ => Ok(ScriptValue::Int(if new == NIL_SENTINEL { 1 } else { 0 })),
                    }
                })
            }
            ScriptKind::CasHashField => {
                let expected = arg(&argv, 0)?.to_string();
                let new = arg(&argv, 1)?.to_string();
                let field = arg(&argv, 4)?.to_string();
                if !self.purge_if_expired(key) && expected != NIL_SENTINEL {
                    return Ok(ScriptValue::Int(0));
                }
                self.with_hash(key, move |map| {
                    let current = map.get(&field).cloned();
                    let matched = (current.is_none() && expected == NIL_SENTINEL)
                        || current.as_deref() == Some(expected.as_str());
                    if !matched {
                        return ScriptValue::Int(0);
                    }
                    if new == NIL_SENTINEL {
                        map.remove(&field);
                    } else {
                        map.insert(field, new);
                    }
                    ScriptValue::Int(1)
                })
            }
            ScriptKind::CasScoredMember => {
                let expected = arg(&argv, 0)?.to_string();
                let new = arg(&argv, 1)?.to_string();
                let member = arg(&argv, 4)?.to_string();
                if !self.purge_if_expired(key) && expected != NIL_SENTINEL {
                    return Ok(ScriptValue::Int(0));
                }
                self.with_zset(key, move |map| {
                    let current = map.get(&member).copied();
                    let matched = match (current, expected.as_str()) {
                        (None, e) if e == NIL_SENTINEL => true,
                        (Some(score), e) => e.parse::<f64>().is_ok_and(|v| v == score),
                        _ => false,
                    };
                    if !matched {
                        return Ok(ScriptValue::Int(0));
                    }
                    if new == NIL_SENTINEL {
                        map.remove(&member);
                    } else {
                        let score = new
                            .parse::<f64>()
                            .map_err(|_| StoreError::Script("score is not a number".into()))?;
                        map.insert(member, score);
                    }
                    Ok(ScriptValue::Int(1))
                })?
            }
            ScriptKind::AcquireMemberDeadline => {
                let field = arg(&argv, 0)?.to_string();
                let deadline = parse_int(arg(&argv, 1)?, "deadline")?;
                let now = parse_int(arg(&argv, 2)?, "now")?;
                self.with_hash(key, move |map| {
                    let held = map
                        .get(&field)
                        .map(|v| parse_int(v, "stored deadline"))
                        .transpose()?
                        .is_some_and(|stored| stored > now);
                    if held {
                        return Ok(ScriptValue::Int(0));
                    }
                    map.insert(field, deadline.to_string());
                    Ok(ScriptValue::Int(1))
                })?
            }
            ScriptKind::RenewValueLease => {
                let token = arg(&argv, 0)?;
                let lease_ms = parse_int(arg(&argv, 1)?, "lease duration")? as u64;
                let current = self.read_scalar(key)?;
                if current.as_deref() == Some(token) {
                    self.set_expiry(key, lease_ms);
                    trace_step(&argv, 2, "value lease extended");
                    Ok(ScriptValue::Int(1))
                } else {
                    trace_step(&argv, 2, "value lease lost");
                    Ok(ScriptValue::Int(0))
                }
            }
            ScriptKind::RenewFieldDeadline => {
                let field = arg(&argv, 0)?.to_string();
                let expected = parse_int(arg(&argv, 1)?, "expected deadline")?;
                let new = parse_int(arg(&argv, 2)?, "new deadline")?;
                if !self.purge_if_expired(key) {
                    return Ok(ScriptValue::Int(0));
                }
                self.with_hash(key, move |map| {
                    let stored = map
                        .get(&field)
                        .map(|v| parse_int(v, "stored deadline"))
                        .transpose()?;
                    if stored != Some(expected) {
                        return Ok(ScriptValue::Int(0));
                    }
                    map.insert(field, new.to_string());
                    Ok(ScriptValue::Int(1))
                })?
            }
            ScriptKind::TxnCommit | ScriptKind::TxnCommitWithTtl => {
                let version = parse_int(arg(&argv, 0)?, "version")?;
                if !self.purge_if_expired(key) {
                    return Ok(ScriptValue::Int(-1));
                }
                let result = self.with_hash(key, move |map| {
                    let snapshot_field = format!("{}{}", cassava_common::TXN_VERSION_PREFIX, version);
                    if !map.contains_key(&snapshot_field) {
                        return Ok(ScriptValue::Int(-1));
                    }
                    let current = map
                        .get(TXN_CURRENT_FIELD)
                        .map(|v| parse_int(v, "current version"))
                        .transpose()?
                        .unwrap_or(0);
                    if version <= current {
                        return Ok(ScriptValue::Int(-2));
                    }
                    map.insert(TXN_CURRENT_FIELD.to_string(), version.to_string());
                    Ok(ScriptValue::Int(1))
                })??;
                if request.kind == ScriptKind::TxnCommitWithTtl
                    && result == ScriptValue::Int(1)
                {
                    let ttl_ms = parse_int(arg(&argv, 1)?, "ttl")? as u64;
                    self.set_expiry(key, ttl_ms);
                }
                Ok(result)
            }
            ScriptKind::TxnRead => {
                let requested = arg(&argv, 0)?.to_string();
                if !self.purge_if_expired(key) {
                    return Ok(ScriptValue::Nil);
                }
                self.with_hash(key, move |map| {
                    let version = if requested == NIL_SENTINEL {
                        match map.get(TXN_CURRENT_FIELD) {
                            Some(v) => v.clone(),
                            None => return ScriptValue::Nil,
                        }
                    } else {
                        requested
                    };
                    let field = format!("{}{}", cassava_common::TXN_VERSION_PREFIX, version);
                    match map.get(&field) {
                        Some(payload) => ScriptValue::Text(payload.clone()),
                        None => ScriptValue::Nil,
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ScriptArg, ScriptResultType};

    fn request(kind: ScriptKind, key: &str, args: Vec<ScriptArg>, extra: Vec<String>) -> ScriptRequest {
        ScriptRequest {
            kind,
            source: String::new(),
            key: key.to_string(),
            args,
            extra_args: extra,
            result_type: ScriptResultType::Boolean,
        }
    }

    fn cas_args(expected: &str, new: &str) -> Vec<ScriptArg> {
        vec![
            ScriptArg::text(expected),
            ScriptArg::text(new),
            ScriptArg::boolean(false),
            ScriptArg::text("t-0"),
        ]
    }

    #[tokio::test]
    async fn test_scalar_ops_and_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.del("k").await.unwrap(), 1);
        assert_eq!(store.del("k").await.unwrap(), 0);

        assert!(store.set_nx_px("lock", "owner-1", 10_000).await.unwrap());
        assert!(!store.set_nx_px("lock", "owner-2", 10_000).await.unwrap());

        assert!(store.set_nx_px("short", "x", 1).await.unwrap());
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(store.get("short").await.unwrap(), None);
        // expired key is acquirable again
        assert!(store.set_nx_px("short", "y", 10_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_ops() {
        let store = MemoryStore::new();
        store.hset("h", "a", "1").await.unwrap();
        assert_eq!(store.hget("h", "a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.hincrby("h", "seq", 1).await.unwrap(), 1);
        assert_eq!(store.hincrby("h", "seq", 2).await.unwrap(), 3);
        let removed = store
            .hdel("h", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(matches!(
            store.hget("k", "f").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_value_semantics() {
        let store = MemoryStore::new();

        // expected-absent succeeds only when absent
        let r = request(ScriptKind::CasValue, "k", cas_args(NIL_SENTINEL, "v1"), vec![]);
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(0));

        // plain swap
        let r = request(ScriptKind::CasValue, "k", cas_args("v1", "v2"), vec![]);
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        // mismatch leaves state untouched
        let r = request(ScriptKind::CasValue, "k", cas_args("stale", "v3"), vec![]);
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(0));
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        // sentinel new-value deletes
        let r = request(ScriptKind::CasValue, "k", cas_args("v2", NIL_SENTINEL), vec![]);
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cas_list_element() {
        let store = MemoryStore::new();
        store
            .data
            .insert("l".to_string(), Entry::new(Value::List(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
            ])));

        let r = request(
            ScriptKind::CasListElement,
            "l",
            cas_args("b", "B"),
            vec!["1".to_string()],
        );
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.lindex("l", 1).await.unwrap(), Some("B".to_string()));

        // sentinel delete removes the element entirely
        let r = request(
            ScriptKind::CasListElement,
            "l",
            cas_args("B", NIL_SENTINEL),
            vec!["1".to_string()],
        );
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.lindex("l", 1).await.unwrap(), Some("c".to_string()));
        assert_eq!(store.lrem("l", 0, "B").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cas_hash_field_and_scored_member() {
        let store = MemoryStore::new();

        let r = request(
            ScriptKind::CasHashField,
            "h",
            cas_args(NIL_SENTINEL, "10"),
            vec!["member-a".to_string()],
        );
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.hget("h", "member-a").await.unwrap(), Some("10".to_string()));

        store.zadd("z", "m", 1.5).await.unwrap();
        let r = request(
            ScriptKind::CasScoredMember,
            "z",
            cas_args("1.5", NIL_SENTINEL),
            vec!["m".to_string()],
        );
        assert_eq!(store.eval(&r).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.zscore("z", "m").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_acquire_member_deadline() {
        let store = MemoryStore::new();
        let now = now_millis();

        let acquire = |deadline: i64, now: i64| {
            request(
                ScriptKind::AcquireMemberDeadline,
                "locks",
                vec![
                    ScriptArg::text("member-a"),
                    ScriptArg::integer(deadline),
                    ScriptArg::integer(now),
                    ScriptArg::boolean(false),
                    ScriptArg::text("t-0"),
                ],
                vec![],
            )
        };

        // absent field acquires
        assert_eq!(
            store.eval(&acquire(now + 5000, now)).await.unwrap(),
            ScriptValue::Int(1)
        );
        // live deadline blocks a second acquirer
        assert_eq!(
            store.eval(&acquire(now + 9000, now)).await.unwrap(),
            ScriptValue::Int(0)
        );
        // elapsed deadline is reacquirable
        assert_eq!(
            store.eval(&acquire(now + 9000, now + 6000)).await.unwrap(),
            ScriptValue::Int(1)
        );
    }

    #[tokio::test]
    async fn test_renew_scripts() {
        let store = MemoryStore::new();
        store.set_nx_px("lease", "holder-1", 5000).await.unwrap();

        let renew = request(
            ScriptKind::RenewValueLease,
            "lease",
            vec![
                ScriptArg::text("holder-1"),
                ScriptArg::integer(60_000),
                ScriptArg::boolean(false),
                ScriptArg::text("t-0"),
            ],
            vec![],
        );
        assert_eq!(store.eval(&renew).await.unwrap(), ScriptValue::Int(1));
        assert!(store.pttl("lease").unwrap() > 10_000);

        store.hset("multi", "m", "1000").await.unwrap();
        let renew_field = request(
            ScriptKind::RenewFieldDeadline,
            "multi",
            vec![
                ScriptArg::text("m"),
                ScriptArg::integer(1000),
                ScriptArg::integer(2000),
                ScriptArg::boolean(false),
                ScriptArg::text("t-0"),
            ],
            vec![],
        );
        assert_eq!(store.eval(&renew_field).await.unwrap(), ScriptValue::Int(1));
        assert_eq!(store.hget("multi", "m").await.unwrap(), Some("2000".to_string()));
        // stale renewal (deadline moved on) is rejected
        let stale = request(
            ScriptKind::RenewFieldDeadline,
            "multi",
            vec![
                ScriptArg::text("m"),
                ScriptArg::integer(1000),
                ScriptArg::integer(3000),
                ScriptArg::boolean(false),
                ScriptArg::text("t-0"),
            ],
            vec![],
        );
        assert_eq!(store.eval(&stale).await.unwrap(), ScriptValue::Int(0));
    }

    #[tokio::test]
    async fn test_txn_commit_and_read() {
        let store = MemoryStore::new();
        store.hset("txn", "v5", "payload-5").await.unwrap();

        let commit = |version: i64| {
            request(
                ScriptKind::TxnCommit,
                "txn",
                vec![
                    ScriptArg::integer(version),
                    ScriptArg::boolean(false),
                    ScriptArg::text("t-0"),
                ],
                vec![],
            )
        };

        assert_eq!(store.eval(&commit(5)).await.unwrap(), ScriptValue::Int(1));
        // duplicate commit is stale
        assert_eq!(store.eval(&commit(5)).await.unwrap(), ScriptValue::Int(-2));
        // missing snapshot
        assert_eq!(store.eval(&commit(7)).await.unwrap(), ScriptValue::Int(-1));

        let read = |version: &str| {
            request(
                ScriptKind::TxnRead,
                "txn",
                vec![
                    ScriptArg::text(version),
                    ScriptArg::boolean(false),
                    ScriptArg::text("t-0"),
                ],
                vec![],
            )
        };
        assert_eq!(
            store.eval(&read(NIL_SENTINEL)).await.unwrap(),
            ScriptValue::Text("payload-5".to_string())
        );
        assert_eq!(store.eval(&read("9")).await.unwrap(), ScriptValue::Nil);
    }
}
