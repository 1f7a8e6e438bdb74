//! The reservation service itself (§4.F).

use std::sync::Arc;

use protocol::messages::PartyReservationCreatedMessage;
use protocol::{channels, Clock, Envelope};
use uuid::Uuid;

use bus::Bus;
use kv::SharedKv;

use crate::catalog::FamilyVariantCatalog;
use crate::constants::RESERVATION_TOKEN_TTL;
use crate::error::{ReservationError, ReservationResult};
use crate::model::{ReservationParticipant, ReservationSnapshot, ReservationToken};
use crate::sink::PartyReservationSink;

const HARD_SIZE_CAP: u32 = 8;

fn reservation_key(reservation_id: &str) -> String {
    format!("fulcrum:party:reservation:{reservation_id}")
}

pub struct ReservationService {
    kv: Arc<dyn SharedKv>,
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn PartyReservationSink>,
    catalog: FamilyVariantCatalog,
}

impl ReservationService {
    pub fn new(
        kv: Arc<dyn SharedKv>,
        bus: Arc<dyn Bus>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn PartyReservationSink>,
        catalog: FamilyVariantCatalog,
    ) -> Self {
        ReservationService {
            kv,
            bus,
            clock,
            sink,
            catalog,
        }
    }

    /// `reserveForPlay` (§4.F): issues tokens for every online participant,
    /// enforces the family/variant team-size cap, persists the reservation,
    /// binds it onto the party, and announces it.
    pub async fn reserve_for_play(
        &self,
        party_id: &str,
        family_id: &str,
        variant_id: &str,
        target_server_id: &str,
        participants: &[ReservationParticipant],
    ) -> ReservationResult<ReservationSnapshot> {
        let online: Vec<&ReservationParticipant> =
            participants.iter().filter(|member| member.online).collect();
        if online.is_empty() {
            return Err(ReservationError::NoOnlineMembers);
        }

        let info = self.catalog.lookup(family_id, variant_id, HARD_SIZE_CAP);
        if participants.len() as u32 > info.max_team_size {
            return Err(ReservationError::TeamSizeExceeded {
                label: format!("{family_id}:{variant_id}"),
                party_size: participants.len(),
                max_team_size: info.max_team_size,
            });
        }

        let now = self.clock.now_millis();
        let expires_at = now + RESERVATION_TOKEN_TTL.as_millis() as i64;
        let reservation_id = Uuid::new_v4().to_string();

        let tokens = online
            .iter()
            .map(|member| {
                (
                    member.player_id.clone(),
                    ReservationToken {
                        id: Uuid::new_v4().to_string(),
                        party_id: party_id.to_string(),
                        member_id: member.player_id.clone(),
                        username: member.username.clone(),
                        expires_at,
                    },
                )
            })
            .collect();

        let snapshot = ReservationSnapshot {
            reservation_id: reservation_id.clone(),
            party_id: party_id.to_string(),
            family_id: family_id.to_string(),
            variant_id: variant_id.to_string(),
            target_server_id: target_server_id.to_string(),
            created_at: now,
            expires_at,
            tokens,
        };

        let json = serde_json::to_string(&snapshot)
            .map_err(|error| ReservationError::Unknown(format!("failed to serialize reservation: {error}")))?;
        self.kv
            .setex(&reservation_key(&reservation_id), &json, RESERVATION_TOKEN_TTL)
            .await?;

        self.sink
            .set_active_reservation(party_id, &reservation_id, target_server_id)
            .await
            .map_err(ReservationError::PartyBindingFailed)?;

        self.announce(&snapshot).await;
        Ok(snapshot)
    }

    async fn announce(&self, snapshot: &ReservationSnapshot) {
        let message = PartyReservationCreatedMessage {
            reservation_id: snapshot.reservation_id.clone(),
            party_id: snapshot.party_id.clone(),
            family_id: snapshot.family_id.clone(),
            variant_id: snapshot.variant_id.clone(),
            target_server_id: snapshot.target_server_id.clone(),
            reservation: serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
        };
        let envelope = Envelope::new(
            "PartyReservationCreatedMessage",
            &snapshot.party_id,
            self.clock.now_millis(),
            &message,
        )
        .expect("PartyReservationCreatedMessage always serializes");
        if let Err(error) = self
            .bus
            .broadcast(channels::PARTY_RESERVATION_CREATED, envelope)
            .await
        {
            tracing::warn!(error = %error, reservation_id = %snapshot.reservation_id, "reservation announce failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bus::LocalBus;
    use kv::LocalKv;
    use protocol::FixedClock;

    use crate::catalog::FamilyVariantInfo;

    use super::*;

    struct RecordingSink {
        bound: AtomicBool,
    }

    #[async_trait]
    impl PartyReservationSink for RecordingSink {
        async fn set_active_reservation(
            &self,
            _party_id: &str,
            _reservation_id: &str,
            _target_server_id: &str,
        ) -> Result<(), String> {
            self.bound.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn clear_active_reservation(&self, _party_id: &str) -> Result<(), String> {
            Ok(())
        }
    }

    fn participants() -> Vec<ReservationParticipant> {
        vec![
            ReservationParticipant {
                player_id: "p1".to_string(),
                username: "Alice".to_string(),
                online: true,
            },
            ReservationParticipant {
                player_id: "p2".to_string(),
                username: "Bob".to_string(),
                online: false,
            },
        ]
    }

    #[tokio::test]
    async fn issues_tokens_only_for_online_members() {
        let kv: Arc<dyn SharedKv> = Arc::new(LocalKv::new());
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let sink = Arc::new(RecordingSink {
            bound: AtomicBool::new(false),
        });
        let mut catalog = FamilyVariantCatalog::new();
        catalog.register(
            "duels",
            "1v1",
            FamilyVariantInfo {
                min_team_size: 2,
                max_team_size: 2,
                team_count: 2,
            },
        );
        let service = ReservationService::new(kv, bus, clock, sink.clone(), catalog);

        let snapshot = service
            .reserve_for_play("party-1", "duels", "1v1", "game-7", &participants())
            .await
            .unwrap();

        assert_eq!(snapshot.tokens.len(), 1);
        assert!(snapshot.tokens.contains_key("p1"));
        assert!(sink.bound.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fails_when_party_exceeds_max_team_size() {
        let kv: Arc<dyn SharedKv> = Arc::new(LocalKv::new());
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let sink = Arc::new(RecordingSink {
            bound: AtomicBool::new(false),
        });
        let mut catalog = FamilyVariantCatalog::new();
        catalog.register(
            "duels",
            "1v1",
            FamilyVariantInfo {
                min_team_size: 2,
                max_team_size: 2,
                team_count: 2,
            },
        );
        let service = ReservationService::new(kv, bus, clock, sink, catalog);

        let five = (0..5)
            .map(|index| ReservationParticipant {
                player_id: format!("p{index}"),
                username: format!("Player{index}"),
                online: true,
            })
            .collect::<Vec<_>>();

        let error = service
            .reserve_for_play("party-1", "duels", "1v1", "game-7", &five)
            .await
            .unwrap_err();

        match error {
            ReservationError::TeamSizeExceeded { label, .. } => assert_eq!(label, "duels:1v1"),
            other => panic!("expected TeamSizeExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fails_with_no_online_members() {
        let kv: Arc<dyn SharedKv> = Arc::new(LocalKv::new());
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let sink = Arc::new(RecordingSink {
            bound: AtomicBool::new(false),
        });
        let service = ReservationService::new(kv, bus, clock, sink, FamilyVariantCatalog::new());

        let offline = vec![ReservationParticipant {
            player_id: "p1".to_string(),
            username: "Alice".to_string(),
            online: false,
        }];

        let error = service
            .reserve_for_play("party-1", "duels", "1v1", "game-7", &offline)
            .await
            .unwrap_err();
        assert_eq!(error, ReservationError::NoOnlineMembers);
    }
}
