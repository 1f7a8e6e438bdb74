//! The party data model (§3). The coordinator owns no in-memory party
//! state of its own — every `Party` here is loaded from and saved back to
//! the shared KV store around a per-party lock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyRole {
    Leader,
    Moderator,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyMember {
    pub player_id: String,
    pub username: String,
    pub role: PartyRole,
    pub online: bool,
    pub joined_at: i64,
    pub last_seen_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyInvite {
    pub party_id: String,
    pub target_id: String,
    pub target_username: String,
    pub inviter_id: String,
    pub inviter_username: String,
    pub expires_at: i64,
}

impl PartyInvite {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartySettings {
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub party_id: String,
    pub leader_id: String,
    /// Ordered by join order; a `BTreeMap` keyed by `joinedAt` would lose
    /// players who join in the same millisecond, so insertion order is
    /// tracked separately via `member_order`.
    pub members: BTreeMap<String, PartyMember>,
    pub member_order: Vec<String>,
    pub invites: BTreeMap<String, PartyInvite>,
    pub settings: PartySettings,
    pub last_activity_at: i64,
    pub pending_idle_disband_at: i64,
    pub active_reservation_id: Option<String>,
    pub active_server_id: Option<String>,
}

impl Party {
    pub fn new(party_id: Uuid, leader_id: String, leader_username: String, now_millis: i64) -> Self {
        let mut members = BTreeMap::new();
        members.insert(
            leader_id.clone(),
            PartyMember {
                player_id: leader_id.clone(),
                username: leader_username,
                role: PartyRole::Leader,
                online: true,
                joined_at: now_millis,
                last_seen_at: now_millis,
            },
        );
        Party {
            party_id: party_id.to_string(),
            leader_id: leader_id.clone(),
            members,
            member_order: vec![leader_id],
            invites: BTreeMap::new(),
            settings: PartySettings::default(),
            last_activity_at: now_millis,
            pending_idle_disband_at: now_millis + crate::constants::IDLE_GRACE.as_millis() as i64,
            active_reservation_id: None,
            active_server_id: None,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.members.contains_key(player_id)
    }

    /// Re-evaluates the solo-idle grace window (§4.E): size transitions
    /// through <=1 arm the disband timer, size >=2 disarms it.
    pub fn refresh_idle_disband(&mut self, now_millis: i64) {
        if self.size() <= 1 {
            if self.pending_idle_disband_at == 0 {
                self.pending_idle_disband_at =
                    now_millis + crate::constants::IDLE_GRACE.as_millis() as i64;
            }
        } else {
            self.pending_idle_disband_at = 0;
        }
    }

    pub fn should_idle_disband(&self, now_millis: i64) -> bool {
        self.pending_idle_disband_at > 0
            && self.pending_idle_disband_at <= now_millis
            && self.size() <= 1
    }

    pub fn touch(&mut self, now_millis: i64) {
        self.last_activity_at = now_millis;
    }

    pub fn remove_member(&mut self, player_id: &str) -> Option<PartyMember> {
        self.member_order.retain(|id| id != player_id);
        self.members.remove(player_id)
    }

    pub fn insert_member(&mut self, member: PartyMember) {
        self.member_order.push(member.player_id.clone());
        self.members.insert(member.player_id.clone(), member);
    }

    /// Order for leader succession: moderators first by `joinedAt`, then
    /// members by `joinedAt` (§4.E `leaveParty`).
    pub fn next_leader_candidate(&self, excluding: &str) -> Option<String> {
        let mut moderators: Vec<&PartyMember> = self
            .members
            .values()
            .filter(|member| member.player_id != excluding && member.role == PartyRole::Moderator)
            .collect();
        moderators.sort_by_key(|member| member.joined_at);
        if let Some(member) = moderators.first() {
            return Some(member.player_id.clone());
        }
        let mut members: Vec<&PartyMember> = self
            .members
            .values()
            .filter(|member| member.player_id != excluding && member.role == PartyRole::Member)
            .collect();
        members.sort_by_key(|member| member.joined_at);
        members.first().map(|member| member.player_id.clone())
    }
}

/// The read-only view published in [`protocol::messages::PartyUpdateMessage`]
/// and returned from every coordinator operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub party_id: String,
    pub leader_id: String,
    pub members: Vec<PartyMember>,
    pub invites: Vec<PartyInvite>,
    pub settings: PartySettings,
    pub active_reservation_id: Option<String>,
    pub active_server_id: Option<String>,
}

impl From<&Party> for PartySnapshot {
    fn from(party: &Party) -> Self {
        PartySnapshot {
            party_id: party.party_id.clone(),
            leader_id: party.leader_id.clone(),
            members: party
                .member_order
                .iter()
                .filter_map(|id| party.members.get(id).cloned())
                .collect(),
            invites: party.invites.values().cloned().collect(),
            settings: party.settings.clone(),
            active_reservation_id: party.active_reservation_id.clone(),
            active_server_id: party.active_server_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_party_has_one_leader_member() {
        let party = Party::new(Uuid::new_v4(), "p1".to_string(), "Alice".to_string(), 0);
        assert_eq!(party.size(), 1);
        assert_eq!(party.members["p1"].role, PartyRole::Leader);
        assert!(party.pending_idle_disband_at > 0);
    }

    #[test]
    fn next_leader_candidate_prefers_moderators_by_join_order() {
        let mut party = Party::new(Uuid::new_v4(), "leader".to_string(), "L".to_string(), 0);
        party.insert_member(PartyMember {
            player_id: "mod-late".to_string(),
            username: "ModLate".to_string(),
            role: PartyRole::Moderator,
            online: true,
            joined_at: 20,
            last_seen_at: 20,
        });
        party.insert_member(PartyMember {
            player_id: "mod-early".to_string(),
            username: "ModEarly".to_string(),
            role: PartyRole::Moderator,
            online: true,
            joined_at: 10,
            last_seen_at: 10,
        });
        party.insert_member(PartyMember {
            player_id: "member".to_string(),
            username: "Member".to_string(),
            role: PartyRole::Member,
            online: true,
            joined_at: 5,
            last_seen_at: 5,
        });
        assert_eq!(
            party.next_leader_candidate("leader"),
            Some("mod-early".to_string())
        );
    }

    #[test]
    fn refresh_idle_disband_arms_and_disarms() {
        let mut party = Party::new(Uuid::new_v4(), "p1".to_string(), "Alice".to_string(), 0);
        party.insert_member(PartyMember {
            player_id: "p2".to_string(),
            username: "Bob".to_string(),
            role: PartyRole::Member,
            online: true,
            joined_at: 1,
            last_seen_at: 1,
        });
        party.refresh_idle_disband(0);
        assert_eq!(party.pending_idle_disband_at, 0);

        party.remove_member("p2");
        party.refresh_idle_disband(100);
        assert!(party.pending_idle_disband_at > 100);
    }
}
