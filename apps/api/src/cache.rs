use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, RedisError, RedisResult};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Replaces a JSON value only while its `version` field still matches.
/// Replies 1 when stored, 0 on a version mismatch, -1 when the key is gone.
const VERSIONED_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local stored = cjson.decode(current)['version'] or 0
if tonumber(stored) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionedWrite {
    Stored,
    Conflict,
    Missing,
}

impl VersionedWrite {
    fn from_reply(code: i64) -> Self {
        match code {
            1 => VersionedWrite::Stored,
            0 => VersionedWrite::Conflict,
            _ => VersionedWrite::Missing,
        }
    }
}

/// Thin JSON layer over a multiplexed Redis connection.
///
/// Methods return `RedisResult`; callers decide whether a failure is fatal
/// (session state) or a cache miss (embeddings, search results).
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis connection established");
        Ok(Self { conn })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> RedisResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Discarding undecodable cache entry {key}: {e}");
                None
            }
        }))
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> RedisResult<()> {
        let payload = encode(value)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<_, ()>(&mut conn)
            .await
    }

    /// Compare-and-set on the value's `version` field, atomically in Redis.
    pub async fn set_json_if_version<T: Serialize>(
        &self,
        key: &str,
        expected_version: u64,
        value: &T,
        ttl_secs: u64,
    ) -> RedisResult<VersionedWrite> {
        let payload = encode(value)?;
        let mut conn = self.conn.clone();
        let script = redis::Script::new(VERSIONED_SET);
        let code: i64 = script
            .key(key)
            .arg(expected_version)
            .arg(payload)
            .arg(ttl_secs.max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(VersionedWrite::from_reply(code))
    }

    pub async fn delete(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Prepends a value to a list, keeping at most `cap` newest entries.
    pub async fn push_capped<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        cap: usize,
        ttl_secs: u64,
    ) -> RedisResult<()> {
        let payload = encode(value)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(payload)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(cap.saturating_sub(1))
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs.max(1))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
    }

    /// Reads list entries `0..limit`, skipping any that fail to decode.
    pub async fn list_json<T: DeserializeOwned>(&self, key: &str, limit: usize) -> RedisResult<Vec<T>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(limit - 1)
            .query_async(&mut conn)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect())
    }
}

fn encode<T: Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        RedisError::from((ErrorKind::TypeError, "failed to encode cache value", e.to_string()))
    })
}

/// MD5 hex digest used to keep cache keys short and uniform.
pub fn digest(input: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let d = digest("model:hello");
        assert_eq!(d.len(), 32);
        assert_eq!(d, digest("model:hello"));
        assert_ne!(d, digest("model:hello!"));
    }

    #[test]
    fn test_versioned_write_replies() {
        assert_eq!(VersionedWrite::from_reply(1), VersionedWrite::Stored);
        assert_eq!(VersionedWrite::from_reply(0), VersionedWrite::Conflict);
        assert_eq!(VersionedWrite::from_reply(-1), VersionedWrite::Missing);
    }
}
