//! The party coordinator (§4.E): all mutations take the per-party lock,
//! read-modify-write the KV-backed snapshot, and publish a
//! `PartyUpdateMessage`. The coordinator itself holds no party state.

use std::sync::Arc;

use protocol::messages::{PartyAction, PartyUpdateMessage};
use protocol::{channels, Clock, Envelope};
use uuid::Uuid;

use bus::Bus;

use crate::constants::HARD_SIZE_CAP;
use crate::error::{PartyError, PartyResult};
use crate::model::{Party, PartyInvite, PartyMember, PartyRole, PartySnapshot};
use crate::repository::PartyRepository;

pub struct PartyMutationResult {
    pub snapshot: PartySnapshot,
    pub invite: Option<PartyInvite>,
}

pub struct PartyCoordinator {
    repository: PartyRepository,
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
}

impl PartyCoordinator {
    pub fn new(repository: PartyRepository, bus: Arc<dyn Bus>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(PartyCoordinator {
            repository,
            bus,
            clock,
        })
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    async fn publish(
        &self,
        party_id: &str,
        snapshot: Option<&PartySnapshot>,
        action: PartyAction,
        actor_id: &str,
        target_id: Option<&str>,
        reason: Option<&str>,
    ) {
        let message = PartyUpdateMessage {
            party_id: party_id.to_string(),
            snapshot: snapshot
                .map(|snapshot| serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)),
            action,
            actor_id: actor_id.to_string(),
            target_id: target_id.map(|id| id.to_string()),
            reason: reason.map(|reason| reason.to_string()),
            timestamp: self.now(),
        };
        let envelope = Envelope::new("PartyUpdateMessage", actor_id, self.now(), &message)
            .expect("PartyUpdateMessage always serializes");
        if let Err(error) = self.bus.broadcast(channels::PARTY_UPDATE, envelope).await {
            tracing::warn!(error = %error, party_id, "party update publish failed");
        }
    }

    /// Looks up the party a player currently belongs to, if any.
    pub async fn party_for(&self, player_id: &str) -> PartyResult<Option<Party>> {
        match self.repository.lookup_party_id(player_id).await? {
            Some(party_id) => self.repository.load(&party_id).await,
            None => Ok(None),
        }
    }

    /// Size of the active-party set (§6 `fulcrum:party:active`). Used by
    /// admin/status surfaces, not by any coordination path.
    pub async fn active_party_count(&self) -> PartyResult<usize> {
        Ok(self.repository.active_party_ids().await?.len())
    }

    /// `invitePlayer(actor, target)` (§4.E). Auto-creates a party for the
    /// inviter if they have none, matching the §8 end-to-end scenario
    /// ("Leader L creates party P (auto via invite)").
    pub async fn invite_player(
        &self,
        actor_id: &str,
        actor_username: &str,
        target_id: &str,
        target_username: &str,
    ) -> PartyResult<PartyMutationResult> {
        if actor_id == target_id {
            return Err(PartyError::CannotTargetSelf);
        }
        if self.repository.lookup_party_id(target_id).await?.is_some() {
            return Err(PartyError::TargetAlreadyInParty);
        }

        let existing_party_id = self.repository.lookup_party_id(actor_id).await?;
        let party_id = match existing_party_id {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self
            .invite_player_locked(&party_id, actor_id, actor_username, target_id, target_username)
            .await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn invite_player_locked(
        &self,
        party_id: &str,
        actor_id: &str,
        actor_username: &str,
        target_id: &str,
        target_username: &str,
    ) -> PartyResult<PartyMutationResult> {
        let now = self.now();
        let mut party = match self.repository.load(party_id).await? {
            Some(party) => party,
            None => Party::new(
                Uuid::parse_str(party_id).unwrap_or_else(|_| Uuid::new_v4()),
                actor_id.to_string(),
                actor_username.to_string(),
                now,
            ),
        };

        let actor = party.members.get(actor_id).ok_or(PartyError::NotInParty)?;
        if actor.role != PartyRole::Leader && actor.role != PartyRole::Moderator {
            return Err(PartyError::NotModerator);
        }
        if party.size() >= HARD_SIZE_CAP {
            return Err(PartyError::PartyFull);
        }
        if party.invites.contains_key(target_id) {
            return Err(PartyError::InviteAlreadyPending);
        }

        let invite = PartyInvite {
            party_id: party.party_id.clone(),
            target_id: target_id.to_string(),
            target_username: target_username.to_string(),
            inviter_id: actor_id.to_string(),
            inviter_username: actor_username.to_string(),
            expires_at: now + crate::constants::INVITE_TTL.as_millis() as i64,
        };
        party.invites.insert(target_id.to_string(), invite.clone());
        party.touch(now);

        self.repository.save(&party).await?;
        self.repository.store_invite(&invite).await?;

        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party.party_id,
            Some(&snapshot),
            PartyAction::InviteSent,
            actor_id,
            Some(target_id),
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: Some(invite),
        })
    }

    /// `acceptInvite(player, partyId)` (§4.E).
    pub async fn accept_invite(
        &self,
        player_id: &str,
        player_username: &str,
        party_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        if self.repository.lookup_party_id(player_id).await?.is_some() {
            return Err(PartyError::AlreadyInParty);
        }
        let guard = self.repository.acquire_lock(party_id).await?;
        let result = self
            .accept_invite_locked(party_id, player_id, player_username)
            .await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn accept_invite_locked(
        &self,
        party_id: &str,
        player_id: &str,
        player_username: &str,
    ) -> PartyResult<PartyMutationResult> {
        let now = self.now();
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::InviteNotFound)?;
        let invite = party
            .invites
            .get(player_id)
            .cloned()
            .ok_or(PartyError::InviteNotFound)?;
        if invite.is_expired(now) {
            party.invites.remove(player_id);
            self.repository.save(&party).await?;
            self.repository.delete_invite(player_id, party_id).await?;
            return Err(PartyError::InviteExpired);
        }
        if party.size() >= HARD_SIZE_CAP {
            return Err(PartyError::PartyFull);
        }

        party.invites.remove(player_id);
        party.insert_member(PartyMember {
            player_id: player_id.to_string(),
            username: player_username.to_string(),
            role: PartyRole::Member,
            online: true,
            joined_at: now,
            last_seen_at: now,
        });
        party.refresh_idle_disband(now);
        party.touch(now);

        self.repository.save(&party).await?;
        self.repository.delete_invite(player_id, party_id).await?;

        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party.party_id,
            Some(&snapshot),
            PartyAction::InviteAccepted,
            player_id,
            None,
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `declineInvite(player, partyId|None)`. `None` clears every invite
    /// outstanding for the player.
    pub async fn decline_invite(
        &self,
        player_id: &str,
        party_id: Option<&str>,
    ) -> PartyResult<()> {
        match party_id {
            Some(party_id) => {
                let guard = self.repository.acquire_lock(party_id).await?;
                let result = self.decline_invite_locked(party_id, player_id).await;
                self.repository.release_lock(guard).await;
                result
            }
            None => {
                for party_id in self.repository.active_party_ids().await? {
                    let guard = self.repository.acquire_lock(&party_id).await?;
                    let _ = self.decline_invite_locked(&party_id, player_id).await;
                    self.repository.release_lock(guard).await;
                }
                Ok(())
            }
        }
    }

    async fn decline_invite_locked(&self, party_id: &str, player_id: &str) -> PartyResult<()> {
        let Some(mut party) = self.repository.load(party_id).await? else {
            return Ok(());
        };
        if party.invites.remove(player_id).is_none() {
            return Ok(());
        }
        self.repository.save(&party).await?;
        self.repository.delete_invite(player_id, party_id).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party.party_id,
            Some(&snapshot),
            PartyAction::InviteRevoked,
            player_id,
            None,
            None,
        )
        .await;
        Ok(())
    }

    /// `leaveParty(player)` (§4.E): promotes a successor or disbands.
    pub async fn leave_party(&self, player_id: &str) -> PartyResult<Option<PartySnapshot>> {
        let party_id = self
            .repository
            .lookup_party_id(player_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.leave_party_locked(&party_id, player_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn leave_party_locked(
        &self,
        party_id: &str,
        player_id: &str,
    ) -> PartyResult<Option<PartySnapshot>> {
        let now = self.now();
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        if !party.is_member(player_id) {
            return Err(PartyError::NotInParty);
        }
        let was_leader = party.leader_id == player_id;
        party.remove_member(player_id);
        self.repository.clear_member_lookup(player_id).await?;

        if party.members.is_empty() {
            self.repository.delete(&party).await?;
            self.publish(
                party_id,
                None,
                PartyAction::Disbanded,
                player_id,
                None,
                None,
            )
            .await;
            return Ok(None);
        }

        if was_leader {
            let successor = party
                .next_leader_candidate(player_id)
                .expect("non-empty party with no leader has a successor candidate");
            party.leader_id = successor.clone();
            if let Some(member) = party.members.get_mut(&successor) {
                member.role = PartyRole::Leader;
            }
        }
        party.refresh_idle_disband(now);
        party.touch(now);
        self.repository.save(&party).await?;

        let snapshot = PartySnapshot::from(&party);
        let action = if was_leader {
            PartyAction::Transferred
        } else {
            PartyAction::MemberLeft
        };
        self.publish(party_id, Some(&snapshot), action, player_id, None, None)
            .await;
        Ok(Some(snapshot))
    }

    /// `disbandParty(actor)`: leader only.
    pub async fn disband_party(&self, actor_id: &str) -> PartyResult<()> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.disband_party_locked(&party_id, actor_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn disband_party_locked(&self, party_id: &str, actor_id: &str) -> PartyResult<()> {
        let party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        if party.leader_id != actor_id {
            return Err(PartyError::LeaderOnlyAction);
        }
        self.repository.delete(&party).await?;
        self.publish(
            party_id,
            None,
            PartyAction::Disbanded,
            actor_id,
            None,
            None,
        )
        .await;
        Ok(())
    }

    async fn load_for_role_change(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<(Party, String)> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let party = self
            .repository
            .load(&party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        if party.leader_id != actor_id {
            return Err(PartyError::LeaderOnlyAction);
        }
        if !party.is_member(target_id) {
            return Err(PartyError::TargetNotInParty);
        }
        Ok((party, party_id))
    }

    /// `promote(actor, target)`: MEMBER -> MODERATOR, or MODERATOR ->
    /// LEADER (swapping the old leader down to MODERATOR).
    pub async fn promote(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.promote_locked(actor_id, target_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn promote_locked(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let (mut party, party_id) = self.load_for_role_change(actor_id, target_id).await?;
        let now = self.now();
        let current_role = party.members[target_id].role;
        let action = match current_role {
            PartyRole::Member => {
                party.members.get_mut(target_id).unwrap().role = PartyRole::Moderator;
                PartyAction::RoleChanged
            }
            PartyRole::Moderator => {
                party.members.get_mut(target_id).unwrap().role = PartyRole::Leader;
                party.members.get_mut(actor_id).unwrap().role = PartyRole::Moderator;
                party.leader_id = target_id.to_string();
                PartyAction::Transferred
            }
            PartyRole::Leader => return Err(PartyError::TargetAlreadyInParty),
        };
        party.touch(now);
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party_id,
            Some(&snapshot),
            action,
            actor_id,
            Some(target_id),
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `demote(actor, target)`: MODERATOR -> MEMBER only.
    pub async fn demote(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.demote_locked(actor_id, target_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn demote_locked(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let (mut party, party_id) = self.load_for_role_change(actor_id, target_id).await?;
        if party.members[target_id].role != PartyRole::Moderator {
            return Err(PartyError::TargetNotInParty);
        }
        party.members.get_mut(target_id).unwrap().role = PartyRole::Member;
        party.touch(self.now());
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party_id,
            Some(&snapshot),
            PartyAction::RoleChanged,
            actor_id,
            Some(target_id),
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `transferLeadership(actor, target)`: unconditional leader swap.
    pub async fn transfer_leadership(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.transfer_leadership_locked(actor_id, target_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn transfer_leadership_locked(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let (mut party, party_id) = self.load_for_role_change(actor_id, target_id).await?;
        let target_role = party.members[target_id].role;
        party.members.get_mut(target_id).unwrap().role = PartyRole::Leader;
        party.members.get_mut(actor_id).unwrap().role = if target_role == PartyRole::Leader {
            PartyRole::Leader
        } else {
            PartyRole::Moderator
        };
        party.leader_id = target_id.to_string();
        party.touch(self.now());
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            &party_id,
            Some(&snapshot),
            PartyAction::Transferred,
            actor_id,
            Some(target_id),
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `kick(actor, target)`: leader or moderator; moderators cannot kick
    /// moderators or the leader.
    pub async fn kick(&self, actor_id: &str, target_id: &str) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.kick_locked(&party_id, actor_id, target_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn kick_locked(
        &self,
        party_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> PartyResult<PartyMutationResult> {
        let now = self.now();
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let actor_role = party.members.get(actor_id).ok_or(PartyError::NotInParty)?.role;
        if actor_role != PartyRole::Leader && actor_role != PartyRole::Moderator {
            return Err(PartyError::NotModerator);
        }
        let target_role = party
            .members
            .get(target_id)
            .ok_or(PartyError::TargetNotInParty)?
            .role;
        if actor_role == PartyRole::Moderator
            && (target_role == PartyRole::Moderator || target_role == PartyRole::Leader)
        {
            return Err(PartyError::NotLeader);
        }
        if target_id == actor_id {
            return Err(PartyError::CannotTargetSelf);
        }

        party.remove_member(target_id);
        self.repository.clear_member_lookup(target_id).await?;
        party.refresh_idle_disband(now);
        party.touch(now);
        self.repository.save(&party).await?;

        let snapshot = PartySnapshot::from(&party);
        self.publish(
            party_id,
            Some(&snapshot),
            PartyAction::MemberKicked,
            actor_id,
            Some(target_id),
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `kickOffline(actor, offlineThresholdMs)`: removes non-leader
    /// members offline for longer than the threshold.
    pub async fn kick_offline(
        &self,
        actor_id: &str,
        offline_threshold_millis: i64,
    ) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self
            .kick_offline_locked(&party_id, offline_threshold_millis)
            .await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn kick_offline_locked(
        &self,
        party_id: &str,
        offline_threshold_millis: i64,
    ) -> PartyResult<PartyMutationResult> {
        let now = self.now();
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let leader_id = party.leader_id.clone();
        let stale: Vec<String> = party
            .members
            .values()
            .filter(|member| {
                member.player_id != leader_id
                    && !member.online
                    && now - member.last_seen_at >= offline_threshold_millis
            })
            .map(|member| member.player_id.clone())
            .collect();
        for player_id in &stale {
            party.remove_member(player_id);
            self.repository.clear_member_lookup(player_id).await?;
        }
        party.refresh_idle_disband(now);
        party.touch(now);
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            party_id,
            Some(&snapshot),
            PartyAction::MemberKicked,
            &leader_id,
            None,
            Some("offline"),
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `toggleMute` / `updateSettings`: leader or moderator.
    pub async fn update_settings(
        &self,
        actor_id: &str,
        muted: bool,
    ) -> PartyResult<PartyMutationResult> {
        let party_id = self
            .repository
            .lookup_party_id(actor_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self.update_settings_locked(&party_id, actor_id, muted).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn update_settings_locked(
        &self,
        party_id: &str,
        actor_id: &str,
        muted: bool,
    ) -> PartyResult<PartyMutationResult> {
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        let actor_role = party.members.get(actor_id).ok_or(PartyError::NotInParty)?.role;
        if actor_role != PartyRole::Leader && actor_role != PartyRole::Moderator {
            return Err(PartyError::NotModerator);
        }
        party.settings.muted = muted;
        party.touch(self.now());
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            party_id,
            Some(&snapshot),
            PartyAction::SettingsUpdated,
            actor_id,
            None,
            None,
        )
        .await;
        Ok(PartyMutationResult {
            snapshot,
            invite: None,
        })
    }

    /// `refreshPresence(player, username, online)`: called on connect and
    /// disconnect.
    pub async fn refresh_presence(
        &self,
        player_id: &str,
        username: &str,
        online: bool,
    ) -> PartyResult<()> {
        let Some(party_id) = self.repository.lookup_party_id(player_id).await? else {
            return Ok(());
        };
        let guard = self.repository.acquire_lock(&party_id).await?;
        let result = self
            .refresh_presence_locked(&party_id, player_id, username, online)
            .await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn refresh_presence_locked(
        &self,
        party_id: &str,
        player_id: &str,
        username: &str,
        online: bool,
    ) -> PartyResult<()> {
        let now = self.now();
        let Some(mut party) = self.repository.load(party_id).await? else {
            return Ok(());
        };
        let Some(member) = party.members.get_mut(player_id) else {
            return Ok(());
        };
        member.online = online;
        member.last_seen_at = now;
        member.username = username.to_string();
        self.repository.save(&party).await?;
        Ok(())
    }

    /// `setActiveReservation` (§4.E, called by the reservation service).
    pub async fn set_active_reservation(
        &self,
        party_id: &str,
        reservation_id: &str,
        target_server_id: &str,
    ) -> PartyResult<PartySnapshot> {
        let guard = self.repository.acquire_lock(party_id).await?;
        let result = self
            .set_active_reservation_locked(party_id, reservation_id, target_server_id)
            .await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn set_active_reservation_locked(
        &self,
        party_id: &str,
        reservation_id: &str,
        target_server_id: &str,
    ) -> PartyResult<PartySnapshot> {
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        party.active_reservation_id = Some(reservation_id.to_string());
        party.active_server_id = Some(target_server_id.to_string());
        party.touch(self.now());
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            party_id,
            Some(&snapshot),
            PartyAction::ReservationCreated,
            &party.leader_id.clone(),
            None,
            None,
        )
        .await;
        Ok(snapshot)
    }

    /// `clearActiveReservation` (§4.E).
    pub async fn clear_active_reservation(&self, party_id: &str) -> PartyResult<PartySnapshot> {
        let guard = self.repository.acquire_lock(party_id).await?;
        let result = self.clear_active_reservation_locked(party_id).await;
        self.repository.release_lock(guard).await;
        result
    }

    async fn clear_active_reservation_locked(&self, party_id: &str) -> PartyResult<PartySnapshot> {
        let mut party = self
            .repository
            .load(party_id)
            .await?
            .ok_or(PartyError::NotInParty)?;
        party.active_reservation_id = None;
        party.active_server_id = None;
        party.touch(self.now());
        self.repository.save(&party).await?;
        let snapshot = PartySnapshot::from(&party);
        self.publish(
            party_id,
            Some(&snapshot),
            PartyAction::ReservationClaimed,
            &party.leader_id.clone(),
            None,
            None,
        )
        .await;
        Ok(snapshot)
    }

    /// Maintenance sweep (§4.E): purges expired invites, removes members
    /// offline beyond `DISCONNECT_GRACE`, deletes empty parties, enforces
    /// solo-idle disband.
    pub async fn run_maintenance_sweep(&self) -> PartyResult<()> {
        let now = self.now();
        for party_id in self.repository.active_party_ids().await? {
            let Some(guard) = self.repository.acquire_lock(&party_id).await.ok() else {
                continue;
            };
            if let Err(error) = self.sweep_one(&party_id, now).await {
                tracing::warn!(error = %error, party_id, "maintenance sweep failed for party");
            }
            self.repository.release_lock(guard).await;
        }
        Ok(())
    }

    async fn sweep_one(&self, party_id: &str, now: i64) -> PartyResult<()> {
        let Some(mut party) = self.repository.load(party_id).await? else {
            return Ok(());
        };

        let expired_invites: Vec<String> = party
            .invites
            .values()
            .filter(|invite| invite.is_expired(now))
            .map(|invite| invite.target_id.clone())
            .collect();
        for target_id in &expired_invites {
            party.invites.remove(target_id);
            self.repository.delete_invite(target_id, party_id).await?;
        }
        if !expired_invites.is_empty() {
            let snapshot = PartySnapshot::from(&party);
            self.publish(
                party_id,
                Some(&snapshot),
                PartyAction::InviteExpired,
                &party.leader_id.clone(),
                None,
                None,
            )
            .await;
        }

        let stale_grace = crate::constants::DISCONNECT_GRACE.as_millis() as i64;
        let leader_id = party.leader_id.clone();
        let stale: Vec<String> = party
            .members
            .values()
            .filter(|member| {
                member.player_id != leader_id
                    && !member.online
                    && now - member.last_seen_at >= stale_grace
            })
            .map(|member| member.player_id.clone())
            .collect();
        for player_id in &stale {
            party.remove_member(player_id);
            self.repository.clear_member_lookup(player_id).await?;
        }

        party.refresh_idle_disband(now);

        if party.members.is_empty() || party.should_idle_disband(now) {
            self.repository.delete(&party).await?;
            self.publish(
                party_id,
                None,
                PartyAction::Disbanded,
                &leader_id,
                None,
                Some("maintenance sweep"),
            )
            .await;
            return Ok(());
        }

        self.repository.save(&party).await?;
        if !stale.is_empty() {
            let snapshot = PartySnapshot::from(&party);
            self.publish(
                party_id,
                Some(&snapshot),
                PartyAction::MemberKicked,
                &leader_id,
                None,
                Some("offline"),
            )
            .await;
        }
        Ok(())
    }
}
