use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use relgate_core::{MappingRecord, RelationTuple};

use crate::keys::KeySpace;
use crate::traits::{
    InvalidationMarker, RevocationStore, SnapshotSource, StorageError, StoreContents,
};

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(Duration::ZERO)
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Internal(err.to_string())
        }
    }
}

/// Shared store backed by Redis.
///
/// Layout:
/// - mappings: a hash keyed by mapping id, each value a JSON mapping record
/// - tuples: a set whose members are JSON `{tenant, subject, tag}` objects
/// - invalidation marker: an integer counter bumped with `INCR`
/// - revocation markers: plain keys with an expiry
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    keys: KeySpace,
}

impl RedisStore {
    pub async fn connect(url: &str, keys: KeySpace) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis");
        Ok(Self { conn, keys })
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl SnapshotSource for RedisStore {
    async fn load(&self) -> Result<StoreContents, StorageError> {
        let mut conn = self.conn.clone();
        let mappings_key = self.keys.mappings();
        let tuples_key = self.keys.acl_tuples();

        let (raw_mappings, raw_tuples): (HashMap<String, String>, Vec<String>) =
            snapshot_read(&mappings_key, &tuples_key)
                .query_async(&mut conn)
                .await?;

        Ok(StoreContents {
            mappings: decode_mappings(&mappings_key, raw_mappings),
            tuples: decode_tuples(&tuples_key, raw_tuples),
        })
    }
}

impl InvalidationMarker for RedisStore {
    async fn read_marker(&self) -> Result<Option<u64>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = redis::Cmd::get(self.keys.invalidation_marker())
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn bump_marker(&self) -> Result<u64, StorageError> {
        let mut conn = self.conn.clone();
        let value: u64 = redis::Cmd::incr(self.keys.invalidation_marker(), 1)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

impl RevocationStore for RedisStore {
    async fn put_marker(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = redis::Cmd::set_ex(key, value, ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_marker(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::Cmd::get(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete_marker(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::Cmd::del(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

/// Mappings and tuples are read inside one MULTI/EXEC so a snapshot never
/// mixes two store states.
fn snapshot_read(mappings_key: &str, tuples_key: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic().hgetall(mappings_key).smembers(tuples_key);
    pipe
}

/// `SET EX` rejects zero; sub-second TTLs round up.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

fn decode_mappings(key: &str, raw: HashMap<String, String>) -> Vec<MappingRecord> {
    let mut records = Vec::with_capacity(raw.len());
    for (field, value) in raw {
        match serde_json::from_str::<MappingRecord>(&value) {
            Ok(mut record) => {
                if record.id.is_empty() {
                    record.id = field;
                } else if record.id != field {
                    tracing::warn!(
                        key,
                        field = %field,
                        id = %record.id,
                        "mapping id differs from hash field; using hash field"
                    );
                    record.id = field;
                }
                records.push(record);
            }
            Err(e) => {
                tracing::warn!(key, field = %field, error = %e, "skipping malformed mapping");
            }
        }
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}

fn decode_tuples(key: &str, raw: Vec<String>) -> Vec<RelationTuple> {
    raw.into_iter()
        .filter_map(|member| match serde_json::from_str::<RelationTuple>(&member) {
            Ok(tuple) => Some(tuple),
            Err(e) => {
                tracing::warn!(key, member = %member, error = %e, "skipping malformed tuple");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_read_is_a_single_transaction() {
        let packed = snapshot_read("rg:mappings", "rg:acl").get_packed_pipeline();
        let text = String::from_utf8_lossy(&packed);

        let multi = text.find("MULTI").unwrap();
        let hgetall = text.find("HGETALL").unwrap();
        let smembers = text.find("SMEMBERS").unwrap();
        let exec = text.find("EXEC").unwrap();
        assert!(multi < hgetall && hgetall < smembers && smembers < exec);
        assert!(text.contains("rg:mappings"));
        assert!(text.contains("rg:acl"));
    }

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::from_secs(30)), 30);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn decode_mappings_skips_malformed_entries() {
        let raw = HashMap::from([
            (
                "m1".to_string(),
                r#"{"id":"m1","method":"GET","path":"/a","tags":["read"]}"#.to_string(),
            ),
            ("m2".to_string(), "not json".to_string()),
            (
                "m3".to_string(),
                r#"{"id":"","method":"*","path":"/b/*"}"#.to_string(),
            ),
        ]);

        let records = decode_mappings("acl:mappings", raw);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert_eq!(records[0].tags, vec!["read".to_string()]);
        assert!(records[1].tags.is_empty());
    }

    #[test]
    fn decode_mappings_prefers_hash_field_as_id() {
        let raw = HashMap::from([(
            "real".to_string(),
            r#"{"id":"stale","method":"GET","path":"/a"}"#.to_string(),
        )]);

        let records = decode_mappings("acl:mappings", raw);
        assert_eq!(records[0].id, "real");
    }

    #[test]
    fn decode_tuples_skips_malformed_members() {
        let raw = vec![
            r#"{"tenant":"acme","subject":"alice","tag":"read"}"#.to_string(),
            r#"{"tenant":"acme","subject":"bob"}"#.to_string(),
            "garbage".to_string(),
        ];

        let tuples = decode_tuples("acl:tuples", raw);
        assert_eq!(tuples, vec![RelationTuple::new("acme", "alice", "read")]);
    }
}
