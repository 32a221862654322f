//! The gamble engine: lobby lifecycle, atomic bet consumption, execution.
//!
//! Correctness under concurrent clients rests entirely on the store: the
//! partial-unique active-gamble constraint, the `(gamble_id, user_id)`
//! participant constraint, and the compare-and-swap state transition. No
//! in-process locks are taken.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::events::{Event, ParticipationSource};
use crate::gamble::{
    Gamble, GambleOpenedItem, GambleResult, GambleState, LootboxBet, Participant,
    ParticipantOutcome,
};
use crate::item::{Item, SlotShortage, User};
use crate::ports::{
    rollback_quietly, GambleStore, GambleTx, LootboxOpener, NameResolver, ProgressionService,
};
use crate::progression::FEATURE_GAMBLE_WIN_BONUS;
use crate::publisher::ResilientPublisher;
use crate::quality::QualityLevel;
use crate::rng::RandomSource;
use crate::xp::XpAwarder;
use crate::{CoreError, Result};

/// A caller-supplied wager line before resolution.
#[derive(Debug, Clone)]
pub struct BetRequest {
    pub item_name: String,
    pub quantity: i64,
}

/// The multi-party wager service.
pub struct GambleService {
    store: Arc<dyn GambleStore>,
    loot: Arc<dyn LootboxOpener>,
    resolver: Arc<dyn NameResolver>,
    progression: Arc<dyn ProgressionService>,
    bus: Arc<EventBus>,
    publisher: Arc<ResilientPublisher>,
    xp: Arc<XpAwarder>,
    rng: Arc<dyn RandomSource>,
    config: EngineConfig,
}

impl GambleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn GambleStore>,
        loot: Arc<dyn LootboxOpener>,
        resolver: Arc<dyn NameResolver>,
        progression: Arc<dyn ProgressionService>,
        bus: Arc<EventBus>,
        publisher: Arc<ResilientPublisher>,
        xp: Arc<XpAwarder>,
        rng: Arc<dyn RandomSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            loot,
            resolver,
            progression,
            bus,
            publisher,
            xp,
            rng,
            config,
        }
    }

    /// Open a lobby, consuming the initiator's bets atomically.
    pub async fn start(
        &self,
        platform: &str,
        platform_id: &str,
        username: &str,
        bets: Vec<BetRequest>,
    ) -> Result<Gamble> {
        self.validate_bets(&bets)?;
        let user = self.resolve_user(platform, platform_id).await?;

        if self.store.get_active_gamble().await?.is_some() {
            return Err(CoreError::GambleAlreadyActive);
        }

        let mut resolved: Vec<(Item, i64)> = Vec::with_capacity(bets.len());
        for bet in &bets {
            let internal = self
                .resolver
                .resolve_public_name(&bet.item_name)
                .unwrap_or_else(|| bet.item_name.clone());
            let item = self
                .store
                .get_item_by_name(&internal)
                .await?
                .ok_or_else(|| CoreError::ItemNotFound(internal.clone()))?;
            if !item.internal_name.starts_with(&self.config.lootbox_prefix) {
                return Err(CoreError::NotALootbox(item.internal_name));
            }
            resolved.push((item, bet.quantity));
        }

        let now = Utc::now();
        let mut gamble = Gamble {
            id: Uuid::new_v4(),
            initiator_id: user.id,
            state: GambleState::Joining,
            created_at: now,
            join_deadline: now + ChronoDuration::seconds(self.config.join_window_secs as i64),
            participants: Vec::new(),
        };

        let mut tx = self.store.begin().await?;
        let staged = async {
            let consumed = consume_bets(tx.as_mut(), user.id, &resolved).await?;
            tx.create_gamble(&gamble).await?;
            let participant = Participant {
                gamble_id: gamble.id,
                user_id: user.id,
                username: username.to_string(),
                bets: consumed,
            };
            tx.join_gamble(&participant).await?;
            Ok::<Participant, CoreError>(participant)
        }
        .await;

        let participant = match staged {
            Ok(participant) => participant,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        gamble.participants.push(participant);
        let lootbox_count = gamble.participants[0].lootbox_count();

        tracing::info!(
            gamble_id = %gamble.id,
            initiator = %user.id,
            lootbox_count,
            "gamble started"
        );

        // Start announcement is best-effort; participation is resilient.
        if let Err(e) = self.bus.publish(Event::gamble_started(&gamble)) {
            tracing::warn!(gamble_id = %gamble.id, error = %e, "gamble started event dropped");
        }
        self.publisher.publish_with_retry(Event::gamble_participated(
            gamble.id,
            user.id,
            lootbox_count,
            ParticipationSource::Start,
        ));

        Ok(gamble)
    }

    /// Join an open lobby, wagering the same stake as the initiator.
    pub async fn join(
        &self,
        gamble_id: Uuid,
        platform: &str,
        platform_id: &str,
        username: &str,
    ) -> Result<()> {
        let user = self.resolve_user(platform, platform_id).await?;

        let gamble = self
            .store
            .get_gamble(gamble_id)
            .await?
            .ok_or(CoreError::GambleNotFound(gamble_id))?;
        if gamble.state != GambleState::Joining {
            return Err(CoreError::NotInJoiningState);
        }
        if Utc::now() >= gamble.join_deadline {
            return Err(CoreError::JoinDeadlinePassed);
        }

        // Every joiner wagers the initiator's bet shape.
        let initiator = gamble
            .participants
            .iter()
            .find(|p| p.user_id == gamble.initiator_id)
            .ok_or_else(|| CoreError::Storage("gamble has no initiator participant".to_string()))?;

        let names: Vec<String> = initiator.bets.iter().map(|b| b.item_name.clone()).collect();
        let items = self.store.get_items_by_names(&names).await?;
        let mut stake: Vec<(Item, i64)> = Vec::with_capacity(initiator.bets.len());
        for bet in &initiator.bets {
            let item = items
                .iter()
                .find(|i| i.internal_name == bet.item_name)
                .cloned()
                .ok_or_else(|| CoreError::ItemNotFound(bet.item_name.clone()))?;
            stake.push((item, bet.quantity));
        }

        let mut tx = self.store.begin().await?;
        let staged = async {
            let consumed = consume_bets(tx.as_mut(), user.id, &stake).await?;
            let participant = Participant {
                gamble_id,
                user_id: user.id,
                username: username.to_string(),
                bets: consumed,
            };
            tx.join_gamble(&participant).await?;
            Ok::<i64, CoreError>(participant.lootbox_count())
        }
        .await;

        let lootbox_count = match staged {
            Ok(count) => count,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(gamble_id = %gamble_id, user_id = %user.id, "gamble joined");

        self.publisher.publish_with_retry(Event::gamble_participated(
            gamble_id,
            user.id,
            lootbox_count,
            ParticipationSource::Join,
        ));
        Ok(())
    }

    /// Run the drops and settle the pool. Idempotent: a completed gamble
    /// yields `Ok(None)`; a concurrent executor loses the state CAS and
    /// sees [`CoreError::GambleAlreadyExecuted`].
    pub async fn execute(&self, gamble_id: Uuid) -> Result<Option<GambleResult>> {
        let gamble = self
            .store
            .get_gamble(gamble_id)
            .await?
            .ok_or(CoreError::GambleNotFound(gamble_id))?;

        match gamble.state {
            GambleState::Completed => return Ok(None),
            GambleState::Joining => {}
            _ => return Err(CoreError::NotInJoiningState),
        }

        let grace = ChronoDuration::seconds(self.config.execution_grace_secs as i64);
        if Utc::now() + grace < gamble.join_deadline {
            return Err(CoreError::JoinWindowOpen);
        }

        let mut tx = self.store.begin().await?;
        let staged = self.execute_in_tx(tx.as_mut(), &gamble).await;
        let (result, outcomes) = match staged {
            Ok(settled) => settled,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            gamble_id = %gamble.id,
            winner = ?result.winner_id,
            total_value = result.total_value,
            participants = outcomes.len(),
            "gamble completed"
        );

        for outcome in &outcomes {
            self.xp.award(
                outcome.user_id,
                "gamble",
                outcome.lootbox_count * self.config.xp_per_lootbox,
            );
        }
        self.publisher
            .publish_with_retry(Event::gamble_completed(&result, outcomes));

        Ok(Some(result))
    }

    async fn execute_in_tx(
        &self,
        tx: &mut dyn GambleTx,
        gamble: &Gamble,
    ) -> Result<(GambleResult, Vec<ParticipantOutcome>)> {
        let moved = tx
            .update_gamble_state_if_matches(gamble.id, GambleState::Joining, GambleState::Opening)
            .await?;
        if moved == 0 {
            return Err(CoreError::GambleAlreadyExecuted);
        }

        let mut opened: Vec<GambleOpenedItem> = Vec::new();
        let mut scores: Vec<(Uuid, i64)> = Vec::with_capacity(gamble.participants.len());
        let mut total_value: i64 = 0;

        for participant in &gamble.participants {
            let mut score: i64 = 0;
            for bet in &participant.bets {
                let drops = match self.loot.open(&bet.item_name, bet.quantity, bet.quality) {
                    Ok(drops) => drops,
                    Err(e) => {
                        // A broken lootbox must not kill the whole pool.
                        tracing::warn!(
                            gamble_id = %gamble.id,
                            user_id = %participant.user_id,
                            lootbox = %bet.item_name,
                            error = %e,
                            "skipping failed lootbox open"
                        );
                        continue;
                    }
                };
                for drop in drops {
                    let value = self
                        .progression
                        .modified_value(FEATURE_GAMBLE_WIN_BONUS, drop.value as f64)
                        .floor() as i64;
                    score += value;
                    total_value += value;
                    opened.push(GambleOpenedItem {
                        gamble_id: gamble.id,
                        user_id: participant.user_id,
                        item_id: drop.item_id,
                        quantity: drop.quantity,
                        value,
                        quality: drop.quality,
                    });
                }
            }
            scores.push((participant.user_id, score));
        }

        let crit_failed = mark_crit_failures(&scores, total_value, self.config.crit_fail_ratio);

        tx.save_opened_items(&opened).await?;

        let (winner_id, tie_break_lost) = pick_winner(&scores, self.rng.as_ref());

        if let Some(winner) = winner_id {
            if !opened.is_empty() {
                let mut inventory = tx.get_inventory(winner).await?;
                for ((item_id, quality), quantity) in aggregate_pool(&opened) {
                    inventory.deposit(item_id, quantity, quality);
                }
                tx.update_inventory(winner, &inventory).await?;
            }
        }

        let result = GambleResult {
            gamble_id: gamble.id,
            winner_id,
            total_value,
            items: opened,
        };
        tx.complete_gamble(&result).await?;

        let winner_score = winner_id
            .and_then(|w| scores.iter().find(|(u, _)| *u == w))
            .map(|(_, s)| *s)
            .unwrap_or(0);

        let outcomes = gamble
            .participants
            .iter()
            .zip(&scores)
            .map(|(participant, (user_id, score))| ParticipantOutcome {
                user_id: *user_id,
                score: *score,
                lootbox_count: participant.lootbox_count(),
                is_winner: winner_id == Some(*user_id),
                is_near_miss: winner_id != Some(*user_id)
                    && is_near_miss(*score, winner_score, self.config.near_miss_ratio),
                is_crit_fail: crit_failed.contains(user_id),
                is_tie_break_lost: tie_break_lost.contains(user_id),
            })
            .collect();

        Ok((result, outcomes))
    }

    async fn resolve_user(&self, platform: &str, platform_id: &str) -> Result<User> {
        self.store
            .get_user_by_platform(platform, platform_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound {
                platform: platform.to_string(),
                platform_id: platform_id.to_string(),
            })
    }

    fn validate_bets(&self, bets: &[BetRequest]) -> Result<()> {
        if bets.is_empty() {
            return Err(CoreError::AtLeastOneLootboxRequired);
        }
        for bet in bets {
            if bet.quantity <= 0 {
                return Err(CoreError::BetQuantityMustBePositive);
            }
            if bet.quantity > self.config.max_transaction_quantity {
                return Err(CoreError::QuantityTooHigh(
                    self.config.max_transaction_quantity,
                ));
            }
        }
        Ok(())
    }
}

/// Consume every bet from the user's inventory inside `tx`, capturing
/// slot qualities into the persisted bets.
async fn consume_bets(
    tx: &mut dyn GambleTx,
    user_id: Uuid,
    stake: &[(Item, i64)],
) -> Result<Vec<LootboxBet>> {
    let mut inventory = tx.get_inventory(user_id).await?;
    let mut consumed = Vec::with_capacity(stake.len());

    for (item, quantity) in stake {
        let quality = inventory
            .consume(item.id, *quantity)
            .map_err(|shortage| match shortage {
                SlotShortage::Missing => CoreError::ItemNotFound(item.internal_name.clone()),
                SlotShortage::Short { available } => CoreError::InsufficientQuantity {
                    item: item.internal_name.clone(),
                    have: available,
                    need: *quantity,
                },
            })?;
        consumed.push(LootboxBet {
            item_name: item.internal_name.clone(),
            quantity: *quantity,
            quality,
        });
    }

    tx.update_inventory(user_id, &inventory).await?;
    Ok(consumed)
}

/// Users scoring at or below `ratio` of the mean, when there is more
/// than one participant and any value at all.
fn mark_crit_failures(scores: &[(Uuid, i64)], total_value: i64, ratio: f64) -> HashSet<Uuid> {
    if scores.len() < 2 || total_value <= 0 {
        return HashSet::new();
    }
    let threshold = ratio * (total_value as f64 / scores.len() as f64);
    scores
        .iter()
        .filter(|(_, score)| (*score as f64) <= threshold)
        .map(|(user_id, _)| *user_id)
        .collect()
}

fn is_near_miss(score: i64, winner_score: i64, ratio: f64) -> bool {
    (score as f64) >= ratio * (winner_score as f64) && score < winner_score
}

/// Highest score wins; ties resolve by injected randomness over the
/// sorted contenders, marking the rest as tie-break losers.
fn pick_winner(
    scores: &[(Uuid, i64)],
    rng: &dyn RandomSource,
) -> (Option<Uuid>, HashSet<Uuid>) {
    let Some(top) = scores.iter().map(|(_, s)| *s).max() else {
        return (None, HashSet::new());
    };

    let mut tied: Vec<Uuid> = scores
        .iter()
        .filter(|(_, s)| *s == top)
        .map(|(u, _)| *u)
        .collect();
    tied.sort();

    let winner = if tied.len() == 1 {
        tied[0]
    } else {
        tied[rng.pick_index(tied.len())]
    };

    let lost: HashSet<Uuid> = tied.into_iter().filter(|u| *u != winner).collect();
    (Some(winner), lost)
}

/// Aggregate drops for the winner award. Keyed by item and quality so a
/// slot never mixes tiers; BTreeMap iteration gives the deterministic
/// ascending append order.
fn aggregate_pool(opened: &[GambleOpenedItem]) -> BTreeMap<(i64, QualityLevel), i64> {
    let mut pool: BTreeMap<(i64, QualityLevel), i64> = BTreeMap::new();
    for item in opened {
        *pool.entry((item.item_id, item.quality)).or_insert(0) += item.quantity;
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SequenceSource;

    fn uuid_with(byte: u8) -> Uuid {
        Uuid::from_bytes([byte; 16])
    }

    #[test]
    fn pick_winner_highest_score() {
        let a = uuid_with(1);
        let b = uuid_with(2);
        let rng = SequenceSource::new([]);
        let (winner, lost) = pick_winner(&[(a, 100), (b, 50)], &rng);
        assert_eq!(winner, Some(a));
        assert!(lost.is_empty());
    }

    #[test]
    fn pick_winner_tie_break_uses_injected_rng() {
        let a = uuid_with(1);
        let b = uuid_with(2);
        // 0.75 * 2 -> index 1 of the sorted contenders.
        let rng = SequenceSource::new([0.75]);
        let (winner, lost) = pick_winner(&[(a, 100), (b, 100)], &rng);
        assert_eq!(winner, Some(b));
        assert_eq!(lost, HashSet::from([a]));
    }

    #[test]
    fn pick_winner_empty_scores() {
        let rng = SequenceSource::new([]);
        let (winner, lost) = pick_winner(&[], &rng);
        assert_eq!(winner, None);
        assert!(lost.is_empty());
    }

    #[test]
    fn crit_failures_need_multiple_users_and_value() {
        let a = uuid_with(1);
        assert!(mark_crit_failures(&[(a, 0)], 0, 0.2).is_empty());
        assert!(mark_crit_failures(&[(a, 100)], 100, 0.2).is_empty());
    }

    #[test]
    fn crit_failure_threshold_is_share_of_mean() {
        let a = uuid_with(1);
        let b = uuid_with(2);
        let c = uuid_with(3);
        // total 210, mean 70, threshold 14.
        let marked = mark_crit_failures(&[(a, 100), (b, 100), (c, 10)], 210, 0.2);
        assert_eq!(marked, HashSet::from([c]));
    }

    #[test]
    fn near_miss_window() {
        assert!(is_near_miss(96, 100, 0.95));
        assert!(!is_near_miss(100, 100, 0.95));
        assert!(!is_near_miss(50, 100, 0.95));
        assert!(is_near_miss(95, 100, 0.95));
    }

    #[test]
    fn aggregate_pool_merges_by_item_and_quality() {
        let gamble_id = Uuid::new_v4();
        let user = uuid_with(1);
        let drop = |item_id, quantity, quality| GambleOpenedItem {
            gamble_id,
            user_id: user,
            item_id,
            quantity,
            value: 0,
            quality,
        };

        let pool = aggregate_pool(&[
            drop(2, 1, QualityLevel::Common),
            drop(1, 2, QualityLevel::Common),
            drop(2, 3, QualityLevel::Common),
            drop(1, 1, QualityLevel::Epic),
        ]);

        let entries: Vec<_> = pool.into_iter().collect();
        assert_eq!(
            entries,
            vec![
                ((1, QualityLevel::Common), 2),
                ((1, QualityLevel::Epic), 1),
                ((2, QualityLevel::Common), 4),
            ]
        );
    }
}
