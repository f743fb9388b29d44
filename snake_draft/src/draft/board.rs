//! Board generation.
//!
//! The board is a grid of price tiers (rows, $5 down to $1) by roster
//! columns (QB, RB, WR, TE, FLEX). Player data comes from an injected pool.

use super::errors::{DraftError, DraftResult};
use super::models::{Board, Player, Position, RosterSlot};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Highest price tier on the board
pub const MAX_PRICE: i64 = 5;

/// Lowest price tier on the board
pub const MIN_PRICE: i64 = 1;

/// A player as supplied by the player-pool collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlayer {
    pub id: String,
    pub name: String,
    pub team: String,
    pub position: Position,
    pub price: i64,
}

/// Produces the board for a newly launched draft
pub trait BoardGenerator: Send + Sync {
    fn generate(&self, contest_id: i64) -> DraftResult<Board>;
}

/// Builds a price-tiered board by sampling a fixed player pool
#[derive(Debug, Clone)]
pub struct PricedBoardGenerator {
    pool: Vec<PoolPlayer>,
}

impl PricedBoardGenerator {
    pub fn new(pool: Vec<PoolPlayer>) -> Self {
        Self { pool }
    }

    /// Generator backed by a synthetic pool with `depth` players per
    /// position and price tier. Used by `--memory` mode and tests.
    pub fn synthetic(depth: usize) -> Self {
        const TEAMS: [&str; 8] = ["KC", "BUF", "PHI", "SF", "DAL", "MIA", "DET", "BAL"];

        let mut pool = Vec::new();
        for position in Position::ALL {
            for price in MIN_PRICE..=MAX_PRICE {
                for n in 0..depth {
                    pool.push(PoolPlayer {
                        id: format!("{}-{}-{}", position.as_str().to_lowercase(), price, n),
                        name: format!("{position} {price}.{n}"),
                        team: TEAMS[(n + price as usize) % TEAMS.len()].to_string(),
                        position,
                        price,
                    });
                }
            }
        }
        Self { pool }
    }

    pub fn pool(&self) -> &[PoolPlayer] {
        &self.pool
    }

    fn cell(player: &PoolPlayer, column: RosterSlot) -> Player {
        Player {
            id: player.id.clone(),
            name: player.name.clone(),
            team: player.team.clone(),
            position: column.to_string(),
            original_position: player.position,
            price: player.price,
            drafted: false,
            drafted_by: None,
        }
    }
}

impl BoardGenerator for PricedBoardGenerator {
    fn generate(&self, contest_id: i64) -> DraftResult<Board> {
        let mut rng = rand::rng();
        let mut rows = Vec::with_capacity((MAX_PRICE - MIN_PRICE + 1) as usize);

        for price in (MIN_PRICE..=MAX_PRICE).rev() {
            let mut tier: Vec<&PoolPlayer> = self.pool.iter().filter(|p| p.price == price).collect();
            tier.shuffle(&mut rng);

            let mut row = Vec::with_capacity(RosterSlot::PRIORITY.len());
            let mut used: Vec<&str> = Vec::new();

            for column in RosterSlot::PRIORITY {
                let chosen = tier
                    .iter()
                    .find(|p| column.accepts(p.position) && !used.contains(&p.id.as_str()))
                    .ok_or_else(|| {
                        DraftError::Board(format!(
                            "no {column} player priced {price} for contest {contest_id}"
                        ))
                    })?;
                used.push(chosen.id.as_str());
                row.push(Self::cell(chosen, column));
            }
            rows.push(row);
        }

        Ok(Board::new(rows))
    }
}
