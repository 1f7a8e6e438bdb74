//! The §8 end-to-end party scenario and the round-trip/idempotence laws
//! that span more than one coordinator call: invite -> accept raises
//! membership by exactly one and clears the invite; promote/transfer swap
//! roles and `leaderId`; the last member leaving disbands the party; and
//! the solo-idle grace window auto-disbands a lone leader who gets no new
//! member before it elapses.

use std::sync::Arc;

use bus::{Bus, LocalBus};
use kv::{LocalKv, SharedKv};
use party::{PartyCoordinator, PartyError, PartyRepository, PartyRole};
use protocol::FixedClock;

fn coordinator(clock: Arc<FixedClock>) -> Arc<PartyCoordinator> {
    let kv: Arc<dyn SharedKv> = Arc::new(LocalKv::new());
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let repository = PartyRepository::new(kv);
    PartyCoordinator::new(repository, bus, clock)
}

/// §8 scenario 3, literally: leader L creates party P via invite, T
/// accepts, L promotes T, L transfers leadership to T, L leaves, T leaves
/// and the party is disbanded.
#[tokio::test]
async fn party_flow_scenario() {
    let clock = Arc::new(FixedClock::new(0));
    let coordinator = coordinator(clock.clone());

    let invited = coordinator
        .invite_player("leader", "Leo", "target", "Tara")
        .await
        .expect("leader auto-creates a party on invite");
    assert_eq!(invited.snapshot.members.len(), 1);
    assert_eq!(invited.snapshot.invites.len(), 1);
    let party_id = invited.snapshot.party_id.clone();

    let accepted = coordinator
        .accept_invite("target", "Tara", &party_id)
        .await
        .expect("non-expired invite accepts");
    assert_eq!(accepted.snapshot.members.len(), 2);
    assert!(accepted.snapshot.invites.is_empty());
    assert_eq!(accepted.snapshot.leader_id, "leader");

    let promoted = coordinator
        .promote("leader", "target")
        .await
        .expect("leader may promote a member");
    let target_member = promoted
        .snapshot
        .members
        .iter()
        .find(|member| member.player_id == "target")
        .unwrap();
    assert_eq!(target_member.role, PartyRole::Moderator);

    let transferred = coordinator
        .transfer_leadership("leader", "target")
        .await
        .expect("leader may transfer to a moderator");
    assert_eq!(transferred.snapshot.leader_id, "target");
    let old_leader = transferred
        .snapshot
        .members
        .iter()
        .find(|member| member.player_id == "leader")
        .unwrap();
    assert_eq!(old_leader.role, PartyRole::Moderator);

    let after_leave = coordinator
        .leave_party("leader")
        .await
        .expect("a non-last member may leave")
        .expect("party still has the new leader");
    assert_eq!(after_leave.members.len(), 1);
    assert_eq!(after_leave.leader_id, "target");

    let disbanded = coordinator
        .leave_party("target")
        .await
        .expect("the last member may leave");
    assert!(disbanded.is_none(), "party is deleted once empty");

    assert!(coordinator
        .party_for("target")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn invite_then_decline_leaves_membership_unchanged() {
    let clock = Arc::new(FixedClock::new(0));
    let coordinator = coordinator(clock);

    let invited = coordinator
        .invite_player("leader", "Leo", "target", "Tara")
        .await
        .unwrap();
    let party_id = invited.snapshot.party_id.clone();

    coordinator
        .decline_invite("target", Some(&party_id))
        .await
        .unwrap();

    let party = coordinator.party_for("leader").await.unwrap().unwrap();
    assert_eq!(party.size(), 1);
    assert!(party.invites.is_empty());
    assert!(coordinator.party_for("target").await.unwrap().is_none());
}

#[tokio::test]
async fn moderator_cannot_kick_another_moderator_or_the_leader() {
    let clock = Arc::new(FixedClock::new(0));
    let coordinator = coordinator(clock);

    let invited = coordinator
        .invite_player("leader", "Leo", "mod-a", "ModA")
        .await
        .unwrap();
    let party_id = invited.snapshot.party_id.clone();
    coordinator
        .accept_invite("mod-a", "ModA", &party_id)
        .await
        .unwrap();
    coordinator.promote("leader", "mod-a").await.unwrap();

    coordinator
        .invite_player("leader", "Leo", "mod-b", "ModB")
        .await
        .unwrap();
    coordinator
        .accept_invite("mod-b", "ModB", &party_id)
        .await
        .unwrap();
    coordinator.promote("leader", "mod-b").await.unwrap();

    let err = coordinator
        .kick("mod-a", "mod-b")
        .await
        .expect_err("a moderator may not kick another moderator");
    assert_eq!(err, PartyError::NotLeader);

    let err = coordinator
        .kick("mod-a", "leader")
        .await
        .expect_err("a moderator may not kick the leader");
    assert_eq!(err, PartyError::NotLeader);
}

/// §8 boundary behavior: "a party of size 1 created at T disbands at
/// T + IDLE_GRACE iff no new member joins."
#[tokio::test]
async fn solo_party_disbands_after_idle_grace_with_no_new_member() {
    let clock = Arc::new(FixedClock::new(0));
    let coordinator = coordinator(clock.clone());

    let invited = coordinator
        .invite_player("leader", "Leo", "target", "Tara")
        .await
        .unwrap();
    let party_id = invited.snapshot.party_id.clone();
    coordinator
        .accept_invite("target", "Tara", &party_id)
        .await
        .unwrap();

    // Back down to a solo party: the grace timer arms.
    coordinator.leave_party("target").await.unwrap();
    assert!(coordinator.party_for("leader").await.unwrap().is_some());

    clock.advance(party::constants::IDLE_GRACE.as_millis() as i64 + 1);
    coordinator.run_maintenance_sweep().await.unwrap();

    assert!(
        coordinator.party_for("leader").await.unwrap().is_none(),
        "solo party past its idle grace is disbanded by maintenance"
    );
}

#[tokio::test]
async fn new_member_disarms_the_solo_idle_timer() {
    let clock = Arc::new(FixedClock::new(0));
    let coordinator = coordinator(clock.clone());

    let invited = coordinator
        .invite_player("leader", "Leo", "target", "Tara")
        .await
        .unwrap();
    let party_id = invited.snapshot.party_id.clone();

    // Solo leader sits for longer than the grace window, but a member
    // joins before any maintenance sweep observes the idle state.
    clock.advance(party::constants::IDLE_GRACE.as_millis() as i64 + 1);
    coordinator
        .accept_invite("target", "Tara", &party_id)
        .await
        .unwrap();

    coordinator.run_maintenance_sweep().await.unwrap();

    let party = coordinator.party_for("leader").await.unwrap().unwrap();
    assert_eq!(party.size(), 2);
}
