//! Redis-backed `StateStore` — the distributed shared-state collaborator
//! every market instance talks to. Connection handling follows the usual
//! `redis::Client::open` + `get_async_connection` shape; the compound
//! wager and RTP read-modify-write operations are pushed down into
//! `redis::Script` Lua bodies so they stay atomic across every process
//! sharing the store, which a client-side lock cannot provide.

use super::{RtpRaw, StateStore};
use crate::model::Wager;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

/// `SET key value NX PX ttl` when unheld, or a holder-matching refresh when
/// the caller already owns the lease. Mirrors the classic Redis lock recipe.
const LEASE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false or current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 1
end
return 0
"#;

const APPEND_WAGER_SCRIPT: &str = r#"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
local list
if raw then
    list = cjson.decode(raw)
else
    list = {}
end
table.insert(list, cjson.decode(ARGV[2]))
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(list))
return 1
"#;

const REMOVE_WAGER_SCRIPT: &str = r#"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then
    return false
end
local list = cjson.decode(raw)
local removed = nil
local kept = {}
for i, wager in ipairs(list) do
    if wager.transaction_id == ARGV[2] and removed == nil then
        removed = wager
    else
        table.insert(kept, wager)
    end
end
if removed == nil then
    return false
end
if #kept == 0 then
    redis.call('HDEL', KEYS[1], ARGV[1])
else
    redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(kept))
end
return cjson.encode(removed)
"#;

const RTP_RECORD_BET_SCRIPT: &str = r#"
local play_count = tonumber(redis.call('HGET', KEYS[1], 'play_count') or '0')
local limit = tonumber(ARGV[2])
if play_count >= limit then
    redis.call('HSET', KEYS[1], 'total_bet', 0, 'total_won', 0, 'play_count', 0)
end
redis.call('HINCRBYFLOAT', KEYS[1], 'total_bet', ARGV[1])
redis.call('HINCRBY', KEYS[1], 'play_count', 1)
return 1
"#;

pub struct RedisStateStore {
    client: redis::Client,
}

impl RedisStateStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::Connection> {
        self.client
            .get_async_connection()
            .await
            .context("redis connection failed")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_blob(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.conn().await?;
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set_blob(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut con = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let _: () = con.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = con.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.conn().await?;
        let _: () = con.del(key).await?;
        Ok(())
    }

    async fn try_acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut con = self.conn().await?;
        let acquired: i32 = redis::Script::new(LEASE_SCRIPT)
            .key(key)
            .arg(holder)
            .arg(ttl.as_millis() as usize)
            .invoke_async(&mut con)
            .await?;
        Ok(acquired == 1)
    }

    async fn append_wager(&self, bets_key: &str, player_id: &str, wager: &Wager) -> Result<()> {
        let mut con = self.conn().await?;
        let payload = serde_json::to_string(wager)?;
        let _: i32 = redis::Script::new(APPEND_WAGER_SCRIPT)
            .key(bets_key)
            .arg(player_id)
            .arg(payload)
            .invoke_async(&mut con)
            .await?;
        Ok(())
    }

    async fn remove_wager(
        &self,
        bets_key: &str,
        player_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Wager>> {
        let mut con = self.conn().await?;
        let raw: redis::Value = redis::Script::new(REMOVE_WAGER_SCRIPT)
            .key(bets_key)
            .arg(player_id)
            .arg(transaction_id)
            .invoke_async(&mut con)
            .await?;
        match raw {
            redis::Value::Data(bytes) => {
                let wager: Wager = serde_json::from_slice(&bytes)?;
                Ok(Some(wager))
            }
            _ => Ok(None),
        }
    }

    async fn get_all_wagers(&self, bets_key: &str) -> Result<HashMap<String, Vec<Wager>>> {
        let mut con = self.conn().await?;
        let raw: HashMap<String, String> = con.hgetall(bets_key).await?;
        let mut out = HashMap::with_capacity(raw.len());
        for (player_id, payload) in raw {
            let list: Vec<Wager> = serde_json::from_str(&payload)?;
            out.insert(player_id, list);
        }
        Ok(out)
    }

    async fn rtp_record_bet(&self, rtp_key: &str, amount: f64, limit_playcount: u64) -> Result<()> {
        let mut con = self.conn().await?;
        let _: i32 = redis::Script::new(RTP_RECORD_BET_SCRIPT)
            .key(rtp_key)
            .arg(amount)
            .arg(limit_playcount)
            .invoke_async(&mut con)
            .await?;
        Ok(())
    }

    async fn rtp_record_win(&self, rtp_key: &str, amount: f64) -> Result<()> {
        let mut con = self.conn().await?;
        let _: f64 = con.hincr(rtp_key, "total_won", amount).await?;
        Ok(())
    }

    async fn rtp_get(&self, rtp_key: &str) -> Result<RtpRaw> {
        let mut con = self.conn().await?;
        let fields: HashMap<String, String> = con.hgetall(rtp_key).await?;
        Ok(RtpRaw {
            total_bet: fields
                .get("total_bet")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            total_won: fields
                .get("total_won")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            play_count: fields
                .get("play_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    async fn rtp_reset(&self, rtp_key: &str) -> Result<()> {
        let mut con = self.conn().await?;
        let _: () = con.del(rtp_key).await?;
        Ok(())
    }
}
