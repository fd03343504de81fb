//! Builders shared by the service tests.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        league_store::{LeagueStore, memory::MemoryLeagueStore},
        models::{
            BidEntity, BidStatus, CurrencySystem, FinalizationMode, PlayerContractEntity,
            PlayerEntity, PlayerType, RoundEntity, RoundStatus, TeamSeasonEntity,
        },
    },
    state::{AppState, SharedState},
};

pub const SEASON: &str = "S1";

pub async fn memory_state() -> (SharedState, MemoryLeagueStore) {
    let memory = MemoryLeagueStore::new();
    let store: Arc<dyn LeagueStore> = Arc::new(memory.clone());
    let state = AppState::with_store(AppConfig::default(), store).await;
    (state, memory)
}

pub fn round(status: RoundStatus, mode: Option<FinalizationMode>, expired: bool) -> RoundEntity {
    let now = SystemTime::now();
    let end_time = if expired {
        now - Duration::from_secs(60)
    } else {
        now + Duration::from_secs(3600)
    };
    RoundEntity {
        id: Uuid::new_v4(),
        season_id: SEASON.into(),
        position: "GK".into(),
        max_bids_per_team: 1,
        status,
        finalization_mode: mode,
        start_time: now - Duration::from_secs(7200),
        end_time,
        created_at: now,
        updated_at: now,
    }
}

pub fn team_season(team: &str, budget: f64) -> TeamSeasonEntity {
    TeamSeasonEntity {
        team_id: team.into(),
        season_id: SEASON.into(),
        team_name: format!("Team {team}"),
        currency_system: CurrencySystem::Single,
        budget,
        football_budget: None,
        real_player_budget: None,
        football_spent: 0.0,
        real_player_spent: 0.0,
        total_spent: 0.0,
        players_count: 0,
        position_counts: IndexMap::new(),
    }
}

pub fn market_season(team: &str, real: f64, football: f64) -> TeamSeasonEntity {
    TeamSeasonEntity {
        currency_system: CurrencySystem::Dual,
        football_budget: Some(football),
        real_player_budget: Some(real),
        ..team_season(team, 0.0)
    }
}

pub fn player(id: &str, name: &str) -> PlayerEntity {
    PlayerEntity {
        id: id.into(),
        name: name.into(),
        position: "GK".into(),
        is_sold: false,
        team_id: None,
        acquisition_value: None,
        season_id: None,
        round_id: None,
    }
}

/// Bid whose creation time grows with `order`, so input order is deterministic.
pub fn bid(round: &RoundEntity, team: &str, player: &str, amount: i64, order: u64) -> BidEntity {
    let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_000 + order);
    BidEntity {
        id: Uuid::new_v4(),
        round_id: round.id,
        team_id: team.into(),
        player_id: player.into(),
        amount,
        status: BidStatus::Active,
        phase: None,
        actual_bid_amount: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn contract(
    player: &str,
    team: &str,
    player_type: PlayerType,
    value: f64,
    stars: u8,
    points: i64,
) -> PlayerContractEntity {
    PlayerContractEntity {
        player_id: player.into(),
        season_id: SEASON.into(),
        player_name: format!("Player {player}"),
        team_id: team.into(),
        player_type,
        auction_value: value,
        star_rating: stars,
        points,
        salary_per_match: 0.0,
    }
}

/// Seed a round with two pool players and two funded teams.
pub async fn seed_round(memory: &MemoryLeagueStore, round: &RoundEntity) {
    memory
        .insert_round(round.clone())
        .await
        .expect("memory insert cannot fail");
    memory.put_player(player("p1", "Keeper One")).await;
    memory.put_player(player("p2", "Keeper Two")).await;
    memory.put_team_season(team_season("A", 1000.0)).await;
    memory.put_team_season(team_season("B", 1000.0)).await;
}
