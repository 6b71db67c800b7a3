//! CAS script engine
//!
//! One atomic script per data shape, executed through the store's
//! server-side scripting facility. All scripts share two conventions:
//! a reserved sentinel token stands for expected/resulting absence (the
//! argument channel cannot carry a native nil), and every script is a
//! single parameterized text whose verbose argument gates step-by-step
//! trace lines keyed by a caller-supplied trace id. The verbose flag
//! never alters control flow.
//!
//! Protocol, generalized: read current state at the address; if
//! (current is absent AND expected is the sentinel) OR (current equals
//! expected), then delete when the new value is the sentinel, otherwise
//! write it, and return success; otherwise return failure with no
//! mutation.

use std::sync::Arc;

use cassava_common::NIL_SENTINEL;
use cassava_store::{
    ScriptArg, ScriptKind, ScriptRequest, ScriptResultType, ScriptValue, StoreError, StoreOps,
};

/// Scalar compare-and-swap: GET / SET / DEL
pub const CAS_VALUE: &str = r#"
local nil_token = '__cassava_nil__'
local expected = ARGV[1]
local new = ARGV[2]
local verbose = ARGV[3] == '1'
local current = redis.call('GET', KEYS[1])
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-value[' .. ARGV[4] .. '] current=' .. tostring(current))
end
if (current == false and expected == nil_token) or current == expected then
  if new == nil_token then
    redis.call('DEL', KEYS[1])
  else
    redis.call('SET', KEYS[1], new)
  end
  if verbose then
    redis.log(redis.LOG_NOTICE, 'cas-value[' .. ARGV[4] .. '] applied')
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-value[' .. ARGV[4] .. '] mismatch')
end
return 0
"#;

/// List element compare-and-swap by index. There is no delete-at-index
/// primitive, so deletion overwrites the slot with the sentinel and
/// removes one matching element. An absent element cannot be written in
/// place; only a sentinel "delete" matches it.
pub const CAS_LIST_ELEMENT: &str = r#"
local nil_token = '__cassava_nil__'
local expected = ARGV[1]
local new = ARGV[2]
local verbose = ARGV[3] == '1'
local idx = tonumber(ARGV[5])
local current = redis.call('LINDEX', KEYS[1], idx)
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-list[' .. ARGV[4] .. '] idx=' .. idx .. ' current=' .. tostring(current))
end
if (current == false and expected == nil_token) or current == expected then
  if new == nil_token then
    if current ~= false then
      redis.call('LSET', KEYS[1], idx, nil_token)
      redis.call('LREM', KEYS[1], 1, nil_token)
    end
    if verbose then
      redis.log(redis.LOG_NOTICE, 'cas-list[' .. ARGV[4] .. '] removed')
    end
    return 1
  end
  if current ~= false then
    redis.call('LSET', KEYS[1], idx, new)
    if verbose then
      redis.log(redis.LOG_NOTICE, 'cas-list[' .. ARGV[4] .. '] applied')
    end
    return 1
  end
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-list[' .. ARGV[4] .. '] mismatch')
end
return 0
"#;

/// Hash field compare-and-swap: HGET / HSET / HDEL
pub const CAS_HASH_FIELD: &str = r#"
local nil_token = '__cassava_nil__'
local expected = ARGV[1]
local new = ARGV[2]
local verbose = ARGV[3] == '1'
local field = ARGV[5]
local current = redis.call('HGET', KEYS[1], field)
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-hash[' .. ARGV[4] .. '] field=' .. field .. ' current=' .. tostring(current))
end
if (current == false and expected == nil_token) or current == expected then
  if new == nil_token then
    redis.call('HDEL', KEYS[1], field)
  else
    redis.call('HSET', KEYS[1], field, new)
  end
  if verbose then
    redis.log(redis.LOG_NOTICE, 'cas-hash[' .. ARGV[4] .. '] applied')
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-hash[' .. ARGV[4] .. '] mismatch')
end
return 0
"#;

/// Sorted-set member score compare-and-swap: ZSCORE / ZADD / ZREM.
/// Scores compare numerically, not textually.
pub const CAS_SCORED_MEMBER: &str = r#"
local nil_token = '__cassava_nil__'
local expected = ARGV[1]
local new = ARGV[2]
local verbose = ARGV[3] == '1'
local member = ARGV[5]
local current = redis.call('ZSCORE', KEYS[1], member)
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-zset[' .. ARGV[4] .. '] member=' .. member .. ' current=' .. tostring(current))
end
local matched = false
if current == false then
  matched = expected == nil_token
else
  matched = expected ~= nil_token and tonumber(current) == tonumber(expected)
end
if matched then
  if new == nil_token then
    redis.call('ZREM', KEYS[1], member)
  else
    redis.call('ZADD', KEYS[1], tonumber(new), member)
  end
  if verbose then
    redis.log(redis.LOG_NOTICE, 'cas-zset[' .. ARGV[4] .. '] applied')
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'cas-zset[' .. ARGV[4] .. '] mismatch')
end
return 0
"#;

/// Multi-member lock acquisition: succeed when the member's field is
/// absent or its deadline has already elapsed
pub const ACQUIRE_MEMBER_DEADLINE: &str = r#"
local field = ARGV[1]
local deadline = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local verbose = ARGV[4] == '1'
local current = redis.call('HGET', KEYS[1], field)
if current == false or tonumber(current) <= now then
  redis.call('HSET', KEYS[1], field, deadline)
  if verbose then
    redis.log(redis.LOG_NOTICE, 'acquire[' .. ARGV[5] .. '] ' .. field .. ' until ' .. deadline)
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'acquire[' .. ARGV[5] .. '] ' .. field .. ' held')
end
return 0
"#;

/// Value-lock renewal: the stored holder token must still match before
/// the key's TTL is extended
pub const RENEW_VALUE_LEASE: &str = r#"
local token = ARGV[1]
local lease = tonumber(ARGV[2])
local verbose = ARGV[3] == '1'
local current = redis.call('GET', KEYS[1])
if current == token then
  redis.call('PEXPIRE', KEYS[1], lease)
  if verbose then
    redis.log(redis.LOG_NOTICE, 'renew[' .. ARGV[4] .. '] extended ' .. lease)
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'renew[' .. ARGV[4] .. '] lost')
end
return 0
"#;

/// Deadline renewal: the stored numeric deadline must equal the task's
/// last-known deadline before the new one is written. This is the sole
/// defense against a stale holder's renewal corrupting a new holder's
/// lease.
pub const RENEW_FIELD_DEADLINE: &str = r#"
local field = ARGV[1]
local expected = tonumber(ARGV[2])
local new = ARGV[3]
local verbose = ARGV[4] == '1'
local current = redis.call('HGET', KEYS[1], field)
if current ~= false and tonumber(current) == expected then
  redis.call('HSET', KEYS[1], field, new)
  if verbose then
    redis.log(redis.LOG_NOTICE, 'renew[' .. ARGV[5] .. '] ' .. field .. ' -> ' .. new)
  end
  return 1
end
if verbose then
  redis.log(redis.LOG_NOTICE, 'renew[' .. ARGV[5] .. '] ' .. field .. ' stale')
end
return 0
"#;

/// Transaction commit: the target version's snapshot must exist and the
/// version must exceed the committed pointer. Returns 1 on success, -1
/// when the snapshot is missing, -2 when the version is stale.
pub const TXN_COMMIT: &str = r#"
local version = tonumber(ARGV[1])
local verbose = ARGV[2] == '1'
if redis.call('HEXISTS', KEYS[1], 'v' .. ARGV[1]) == 0 then
  if verbose then
    redis.log(redis.LOG_NOTICE, 'commit[' .. ARGV[3] .. '] v' .. ARGV[1] .. ' missing snapshot')
  end
  return -1
end
local current = tonumber(redis.call('HGET', KEYS[1], '__txn_cur__') or '0')
if version <= current then
  if verbose then
    redis.log(redis.LOG_NOTICE, 'commit[' .. ARGV[3] .. '] v' .. ARGV[1] .. ' stale, current ' .. current)
  end
  return -2
end
redis.call('HSET', KEYS[1], '__txn_cur__', ARGV[1])
if verbose then
  redis.log(redis.LOG_NOTICE, 'commit[' .. ARGV[3] .. '] advanced to v' .. ARGV[1])
end
return 1
"#;

/// Transaction commit that also sets the key's TTL after success
pub const TXN_COMMIT_WITH_TTL: &str = r#"
local version = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
local verbose = ARGV[3] == '1'
if redis.call('HEXISTS', KEYS[1], 'v' .. ARGV[1]) == 0 then
  return -1
end
local current = tonumber(redis.call('HGET', KEYS[1], '__txn_cur__') or '0')
if version <= current then
  return -2
end
redis.call('HSET', KEYS[1], '__txn_cur__', ARGV[1])
redis.call('PEXPIRE', KEYS[1], ttl)
if verbose then
  redis.log(redis.LOG_NOTICE, 'commit[' .. ARGV[4] .. '] advanced to v' .. ARGV[1] .. ' ttl ' .. ttl)
end
return 1
"#;

/// Transaction read: an explicit version bypasses the committed
/// pointer; the sentinel resolves through it
pub const TXN_READ: &str = r#"
local nil_token = '__cassava_nil__'
local version = ARGV[1]
local verbose = ARGV[2] == '1'
if version == nil_token then
  version = redis.call('HGET', KEYS[1], '__txn_cur__')
  if version == false then
    return false
  end
end
local payload = redis.call('HGET', KEYS[1], 'v' .. version)
if verbose then
  redis.log(redis.LOG_NOTICE, 'read[' .. ARGV[3] .. '] v' .. version .. ' hit=' .. tostring(payload ~= false))
end
return payload
"#;

/// Outcome of a transaction commit script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCode {
    Committed,
    MissingSnapshot,
    StaleVersion,
}

/// Executes the atomic protocols against one store
pub struct ScriptEngine {
    store: Arc<dyn StoreOps>,
    verbose: bool,
}

fn encode(value: Option<&str>) -> ScriptArg {
    ScriptArg::text(value.unwrap_or(NIL_SENTINEL))
}

fn encode_score(value: Option<f64>) -> ScriptArg {
    match value {
        Some(score) => ScriptArg::double(score),
        None => ScriptArg::text(NIL_SENTINEL),
    }
}

impl ScriptEngine {
    pub fn new(store: Arc<dyn StoreOps>, verbose: bool) -> Self {
        Self { store, verbose }
    }

    pub fn store(&self) -> &Arc<dyn StoreOps> {
        &self.store
    }

    fn request(
        &self,
        kind: ScriptKind,
        source: &str,
        key: &str,
        args: Vec<ScriptArg>,
        extra_args: Vec<String>,
        result_type: ScriptResultType,
    ) -> ScriptRequest {
        ScriptRequest {
            kind,
            source: source.to_string(),
            key: key.to_string(),
            args,
            extra_args,
            result_type,
        }
    }

    fn flag_args(&self, trace: &str) -> [ScriptArg; 2] {
        [ScriptArg::boolean(self.verbose), ScriptArg::text(trace)]
    }

    async fn eval_flag(&self, request: &ScriptRequest) -> Result<bool, StoreError> {
        Ok(self.store.eval(request).await?.as_bool())
    }

    /// Scalar CAS. `None` encodes absence on either side.
    pub async fn cas_value(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::CasValue,
            CAS_VALUE,
            key,
            vec![encode(expected), encode(new), verbose, trace],
            vec![],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// List element CAS by index
    pub async fn cas_list_element(
        &self,
        key: &str,
        index: i64,
        expected: Option<&str>,
        new: Option<&str>,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::CasListElement,
            CAS_LIST_ELEMENT,
            key,
            vec![encode(expected), encode(new), verbose, trace],
            vec![index.to_string()],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Hash field CAS
    pub async fn cas_hash_field(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: Option<&str>,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::CasHashField,
            CAS_HASH_FIELD,
            key,
            vec![encode(expected), encode(new), verbose, trace],
            vec![field.to_string()],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Sorted-set member score CAS
    pub async fn cas_scored_member(
        &self,
        key: &str,
        member: &str,
        expected: Option<f64>,
        new: Option<f64>,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::CasScoredMember,
            CAS_SCORED_MEMBER,
            key,
            vec![encode_score(expected), encode_score(new), verbose, trace],
            vec![member.to_string()],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Acquire one member of a multi-member lock
    pub async fn acquire_member_deadline(
        &self,
        key: &str,
        member: &str,
        deadline_ms: i64,
        now_ms: i64,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::AcquireMemberDeadline,
            ACQUIRE_MEMBER_DEADLINE,
            key,
            vec![
                ScriptArg::text(member),
                ScriptArg::integer(deadline_ms),
                ScriptArg::integer(now_ms),
                verbose,
                trace,
            ],
            vec![],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Renew a value lease held under `token`
    pub async fn renew_value_lease(
        &self,
        key: &str,
        token: &str,
        lease_ms: u64,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::RenewValueLease,
            RENEW_VALUE_LEASE,
            key,
            vec![
                ScriptArg::text(token),
                ScriptArg::integer(lease_ms as i64),
                verbose,
                trace,
            ],
            vec![],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Renew a member's deadline field
    pub async fn renew_field_deadline(
        &self,
        key: &str,
        field: &str,
        expected_deadline_ms: i64,
        new_deadline_ms: i64,
        trace: &str,
    ) -> Result<bool, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = self.request(
            ScriptKind::RenewFieldDeadline,
            RENEW_FIELD_DEADLINE,
            key,
            vec![
                ScriptArg::text(field),
                ScriptArg::integer(expected_deadline_ms),
                ScriptArg::integer(new_deadline_ms),
                verbose,
                trace,
            ],
            vec![],
            ScriptResultType::Boolean,
        );
        self.eval_flag(&request).await
    }

    /// Commit a transaction version, optionally setting key TTL
    pub async fn txn_commit(
        &self,
        key: &str,
        version: i64,
        ttl_ms: Option<u64>,
        trace: &str,
    ) -> Result<CommitCode, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let request = match ttl_ms {
            None => self.request(
                ScriptKind::TxnCommit,
                TXN_COMMIT,
                key,
                vec![ScriptArg::integer(version), verbose, trace],
                vec![],
                ScriptResultType::Integer,
            ),
            Some(ttl) => self.request(
                ScriptKind::TxnCommitWithTtl,
                TXN_COMMIT_WITH_TTL,
                key,
                vec![
                    ScriptArg::integer(version),
                    ScriptArg::integer(ttl as i64),
                    verbose,
                    trace,
                ],
                vec![],
                ScriptResultType::Integer,
            ),
        };
        match self.store.eval(&request).await?.as_int() {
            Some(1) => Ok(CommitCode::Committed),
            Some(-1) => Ok(CommitCode::MissingSnapshot),
            Some(-2) => Ok(CommitCode::StaleVersion),
            other => Err(StoreError::Script(format!(
                "unexpected commit result: {:?}",
                other
            ))),
        }
    }

    /// Read a transaction payload. `version = None` resolves through
    /// the committed pointer.
    pub async fn txn_read(
        &self,
        key: &str,
        version: Option<i64>,
        trace: &str,
    ) -> Result<Option<String>, StoreError> {
        let [verbose, trace] = self.flag_args(trace);
        let version_arg = match version {
            Some(v) => ScriptArg::integer(v),
            None => ScriptArg::text(NIL_SENTINEL),
        };
        let request = self.request(
            ScriptKind::TxnRead,
            TXN_READ,
            key,
            vec![version_arg, verbose, trace],
            vec![],
            ScriptResultType::OptionalText,
        );
        match self.store.eval(&request).await? {
            ScriptValue::Nil => Ok(None),
            value => Ok(value.into_text()),
        }
    }
}
