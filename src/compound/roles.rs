//! Role assignments guarded by the last-holder rule.
//!
//! A role table is a hash `member -> role`. One role is guarded: no grant or
//! revoke may leave it without a holder once it has one.

use super::expect_ok;
use crate::error::Result;
use crate::store::{Script, Store};
use bytes::Bytes;
use std::sync::LazyLock;
use tracing::debug;

// KEYS[1] role hash
// ARGV[1] member, ARGV[2] new role ("" revokes), ARGV[3] guarded role
static ASSIGN_ROLE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current == ARGV[3] and ARGV[2] ~= ARGV[3] then
    local holders = 0
    for _, role in ipairs(redis.call('HVALS', KEYS[1])) do
        if role == ARGV[3] then holders = holders + 1 end
    end
    if holders <= 1 then return 'last-holder' end
end
if ARGV[2] == '' then
    if not current then return 'member-missing' end
    redis.call('HDEL', KEYS[1], ARGV[1])
else
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
end
return 'ok'
"#,
    )
});

#[derive(Debug, Clone)]
pub struct RoleTable {
    store: Store,
    key: String,
    guarded: String,
}

impl RoleTable {
    pub fn new(store: Store, key: impl Into<String>, guarded: impl Into<String>) -> Self {
        RoleTable {
            store,
            key: key.into(),
            guarded: guarded.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn assign(&self, member: &str, role: &str) -> Result<()> {
        let reply = self
            .store
            .run_script(
                &ASSIGN_ROLE,
                vec![self.key.clone()],
                vec![
                    Bytes::from(member.to_string()),
                    Bytes::from(role.to_string()),
                    Bytes::from(self.guarded.clone()),
                ],
            )
            .await?;
        expect_ok("assign role", reply)
    }

    /// Set `member`'s role, replacing any previous one.
    pub async fn grant(&self, member: &str, role: &str) -> Result<()> {
        self.assign(member, role).await?;
        debug!(table = %self.key, member = %member, role = %role, "Role granted");
        Ok(())
    }

    pub async fn revoke(&self, member: &str) -> Result<()> {
        self.assign(member, "").await?;
        debug!(table = %self.key, member = %member, "Role revoked");
        Ok(())
    }

    pub async fn role_of(&self, member: &str) -> Result<Option<String>> {
        let role = self.store.hget(&self.key, member.to_string()).await?;
        Ok(role.map(|r| String::from_utf8_lossy(&r).into_owned()))
    }

    /// Members holding `role`, sorted.
    pub async fn holders(&self, role: &str) -> Result<Vec<String>> {
        let mut holders: Vec<String> = self
            .store
            .hgetall(&self.key)
            .await?
            .into_iter()
            .filter(|(_, r)| &r[..] == role.as_bytes())
            .map(|(m, _)| String::from_utf8_lossy(&m).into_owned())
            .collect();
        holders.sort();
        Ok(holders)
    }
}
