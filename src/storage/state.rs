use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::rules::rule::{RuleId, RuleRuntimeState};
use crate::types::RedisConfig;

/// Mirrors per-rule runtime state (enable flag, cooldown stamp) to Redis.
///
/// State is keyed by `autobid:rule:{rule_id}`. Rules with pinned ids in
/// config pick their state back up after a restart; everything else starts
/// clean.
pub struct RedisStateManager {
    conn: ConnectionManager,
}

impl RedisStateManager {
    pub async fn new(cfg: &RedisConfig) -> anyhow::Result<Self> {
        let client = crate::storage::create_redis_client(cfg)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(rule_id: RuleId) -> String {
        format!("autobid:rule:{rule_id}")
    }

    pub async fn save_rule_state(
        &mut self,
        rule_id: RuleId,
        state: &RuleRuntimeState,
    ) -> anyhow::Result<()> {
        let key = Self::key(rule_id);
        let val = serde_json::to_string(state)?;
        let _: () = self.conn.set(key, val).await?;
        Ok(())
    }

    pub async fn load_rule_state(
        &mut self,
        rule_id: RuleId,
    ) -> anyhow::Result<Option<RuleRuntimeState>> {
        let key = Self::key(rule_id);
        let v: Option<String> = self.conn.get(key).await?;
        match v {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_rule_state(&mut self, rule_id: RuleId) -> anyhow::Result<()> {
        let key = Self::key(rule_id);
        let _: () = self.conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn keys_are_namespaced_by_rule_id() {
        let id = RuleId::new_v4();
        let key = RedisStateManager::key(id);
        assert_eq!(key, format!("autobid:rule:{id}"));
    }

    #[test]
    fn runtime_state_survives_json_round_trip() {
        let state = RuleRuntimeState {
            enabled: true,
            last_fired_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: RuleRuntimeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
