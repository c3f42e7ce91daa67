//! Redis-backed job records.
//!
//! Each job is one JSON string under `docpoll:job:<id>`. The pending-only transition runs as
//! a Lua script so the check and the write happen atomically on the server.

use super::{JobId, JobRecord, JobStore, StoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use std::time::Duration;

const KEY_PREFIX: &str = "docpoll:job:";

const TRANSITION_FROM_PENDING: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return 0
end
local ok, record = pcall(cjson.decode, current)
if not ok or record['state'] ~= 'pending' then
  return 0
end
local ttl = tonumber(ARGV[2])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[1], 'EX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[1])
end
return 1
"#;

/// Job store persisting records in Redis.
pub struct RedisJobStore {
    connection: ConnectionManager,
    transition: Script,
    finished_ttl: Option<Duration>,
}

impl RedisJobStore {
    /// Connect to Redis at `url`. Finished records expire after `finished_ttl` when set.
    pub async fn connect(url: &str, finished_ttl: Option<Duration>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::debug!(ttl = ?finished_ttl, "Connected job store to Redis");
        Ok(Self::new(connection, finished_ttl))
    }

    /// Build a store over an existing connection manager.
    pub fn new(connection: ConnectionManager, finished_ttl: Option<Duration>) -> Self {
        Self {
            connection,
            transition: Script::new(TRANSITION_FROM_PENDING),
            finished_ttl,
        }
    }

    fn key(id: &JobId) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut con = self.connection.clone();
        let created: bool = con.set_nx(Self::key(&record.id), payload).await?;
        if created {
            Ok(())
        } else {
            Err(StoreError::Duplicate(record.id.clone()))
        }
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let mut con = self.connection.clone();
        let raw: Option<String> = con.get(Self::key(id)).await?;
        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn transition_from_pending(&self, next: &JobRecord) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(next)?;
        let ttl_secs = self.finished_ttl.map(|ttl| ttl.as_secs()).unwrap_or(0);
        let mut con = self.connection.clone();
        let applied: i64 = self
            .transition
            .key(Self::key(&next.id))
            .arg(payload)
            .arg(ttl_secs)
            .invoke_async(&mut con)
            .await?;
        Ok(applied == 1)
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        let _: () = con.del(Self::key(id)).await?;
        Ok(())
    }
}
