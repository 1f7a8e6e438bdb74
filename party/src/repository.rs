//! KV persistence for parties, following the byte-exact key layout in §6.
//! Invites are keyed per (player, party), so a player can hold multiple
//! simultaneous invites, matching the coordinator's per-party locking.

use std::sync::Arc;

use kv::{DistributedLock, LockGuard, SharedKv};

use crate::constants::{INVITE_TTL, LOCK_TTL};
use crate::error::{PartyError, PartyResult};
use crate::model::{Party, PartyInvite};

const ACTIVE_PARTY_SET: &str = "fulcrum:party:active";

fn data_key(party_id: &str) -> String {
    format!("fulcrum:party:data:{party_id}")
}

fn lookup_key(player_id: &str) -> String {
    format!("fulcrum:party:lookup:{player_id}")
}

fn invite_key(player_id: &str, party_id: &str) -> String {
    format!("fulcrum:party:invite:{player_id}:{party_id}")
}

fn lock_key(party_id: &str) -> String {
    format!("fulcrum:party:lock:{party_id}")
}

pub struct PartyRepository {
    kv: Arc<dyn SharedKv>,
    lock: DistributedLock,
}

impl PartyRepository {
    pub fn new(kv: Arc<dyn SharedKv>) -> Self {
        let lock = DistributedLock::new(kv.clone(), LOCK_TTL);
        PartyRepository { kv, lock }
    }

    /// Acquires the per-party lock (§4.E). Maps a failed acquisition to
    /// `REDIS_UNAVAILABLE`, per spec.
    pub async fn acquire_lock(&self, party_id: &str) -> PartyResult<LockGuard> {
        self.lock
            .acquire(&lock_key(party_id))
            .await?
            .ok_or(PartyError::RedisUnavailable)
    }

    pub async fn release_lock(&self, guard: LockGuard) {
        if let Err(error) = self.lock.release(guard).await {
            tracing::warn!(error = %error, "failed to release party lock");
        }
    }

    pub async fn load(&self, party_id: &str) -> PartyResult<Option<Party>> {
        match self.kv.get(&data_key(party_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json).map_err(|error| {
                PartyError::Unknown(format!("corrupt party record: {error}"))
            })?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, party: &Party) -> PartyResult<()> {
        let json = serde_json::to_string(party)
            .map_err(|error| PartyError::Unknown(format!("failed to serialize party: {error}")))?;
        self.kv.set(&data_key(&party.party_id), &json).await?;
        self.kv
            .sadd(ACTIVE_PARTY_SET, &party.party_id)
            .await?;
        for member_id in &party.member_order {
            self.kv.set(&lookup_key(member_id), &party.party_id).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, party: &Party) -> PartyResult<()> {
        self.kv.del(&data_key(&party.party_id)).await?;
        self.kv.srem(ACTIVE_PARTY_SET, &party.party_id).await?;
        for member_id in &party.member_order {
            self.kv.del(&lookup_key(member_id)).await?;
        }
        Ok(())
    }

    pub async fn clear_member_lookup(&self, player_id: &str) -> PartyResult<()> {
        self.kv.del(&lookup_key(player_id)).await?;
        Ok(())
    }

    pub async fn lookup_party_id(&self, player_id: &str) -> PartyResult<Option<String>> {
        Ok(self.kv.get(&lookup_key(player_id)).await?)
    }

    pub async fn store_invite(&self, invite: &PartyInvite) -> PartyResult<()> {
        let json = serde_json::to_string(invite)
            .map_err(|error| PartyError::Unknown(format!("failed to serialize invite: {error}")))?;
        self.kv
            .setex(&invite_key(&invite.target_id, &invite.party_id), &json, INVITE_TTL)
            .await?;
        Ok(())
    }

    pub async fn delete_invite(&self, player_id: &str, party_id: &str) -> PartyResult<()> {
        self.kv.del(&invite_key(player_id, party_id)).await?;
        Ok(())
    }

    pub async fn active_party_ids(&self) -> PartyResult<Vec<String>> {
        Ok(self.kv.smembers(ACTIVE_PARTY_SET).await?)
    }
}
