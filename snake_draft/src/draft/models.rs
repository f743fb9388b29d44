//! Draft data models: board, teams, picks and the persisted draft instance.

use super::errors::{DraftError, DraftResult};
use super::rules;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Room ID type
pub type RoomId = i64;

/// Default per-team budget
pub const STARTING_BUDGET: i64 = 15;

/// True (real-world) player position.
///
/// Set once when the player pool is loaded and never overwritten by board
/// placement. Slot legality is decided by this tag alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "QB")]
    Qb,
    #[serde(rename = "RB")]
    Rb,
    #[serde(rename = "WR")]
    Wr,
    #[serde(rename = "TE")]
    Te,
}

impl Position {
    pub const ALL: [Position; 4] = [Position::Qb, Position::Rb, Position::Wr, Position::Te];

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Qb => "QB",
            Position::Rb => "RB",
            Position::Wr => "WR",
            Position::Te => "TE",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QB" => Ok(Position::Qb),
            "RB" => Ok(Position::Rb),
            "WR" => Ok(Position::Wr),
            "TE" => Ok(Position::Te),
            other => Err(format!("unknown position: {other}")),
        }
    }
}

/// Roster slot a pick is placed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RosterSlot {
    #[serde(rename = "QB")]
    Qb,
    #[serde(rename = "RB")]
    Rb,
    #[serde(rename = "WR")]
    Wr,
    #[serde(rename = "TE")]
    Te,
    #[serde(rename = "FLEX")]
    Flex,
}

impl RosterSlot {
    /// Fill order used by auto-pick: primary positions before FLEX
    pub const PRIORITY: [RosterSlot; 5] = [
        RosterSlot::Qb,
        RosterSlot::Rb,
        RosterSlot::Wr,
        RosterSlot::Te,
        RosterSlot::Flex,
    ];

    /// Whether a player whose true position is `position` may occupy this slot.
    ///
    /// QB only ever fills QB. RB/WR/TE fill their own slot or FLEX.
    pub fn accepts(self, position: Position) -> bool {
        match (position, self) {
            (Position::Qb, RosterSlot::Qb) => true,
            (Position::Qb, _) => false,
            (_, RosterSlot::Flex) => true,
            (position, slot) => slot == RosterSlot::from(position),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RosterSlot::Qb => "QB",
            RosterSlot::Rb => "RB",
            RosterSlot::Wr => "WR",
            RosterSlot::Te => "TE",
            RosterSlot::Flex => "FLEX",
        }
    }
}

impl From<Position> for RosterSlot {
    fn from(position: Position) -> Self {
        match position {
            Position::Qb => RosterSlot::Qb,
            Position::Rb => RosterSlot::Rb,
            Position::Wr => RosterSlot::Wr,
            Position::Te => RosterSlot::Te,
        }
    }
}

impl std::fmt::Display for RosterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RosterSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QB" => Ok(RosterSlot::Qb),
            "RB" => Ok(RosterSlot::Rb),
            "WR" => Ok(RosterSlot::Wr),
            "TE" => Ok(RosterSlot::Te),
            "FLEX" | "WILDCARD" => Ok(RosterSlot::Flex),
            other => Err(format!("unknown roster slot: {other}")),
        }
    }
}

/// Number of draft rounds: one per roster slot
pub const ROUNDS: usize = RosterSlot::PRIORITY.len();

/// A priced player cell on the draft board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable identifier from the player pool
    pub id: String,
    pub name: String,
    /// Real-world team abbreviation
    pub team: String,
    /// Board column label (e.g. "FLEX"); display only
    pub position: String,
    /// True position; authoritative for slot legality
    pub original_position: Position,
    /// Price in budget units (1-5)
    pub price: i64,
    #[serde(default)]
    pub drafted: bool,
    /// Team index that drafted this player
    #[serde(default)]
    pub drafted_by: Option<usize>,
}

/// Draft board: rows of priced player cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub rows: Vec<Vec<Player>>,
}

impl Board {
    pub fn new(rows: Vec<Vec<Player>>) -> Self {
        Self { rows }
    }

    /// All cells in row-major order
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.rows.iter().flatten()
    }

    /// Cells not yet drafted, in row-major order
    pub fn available(&self) -> impl Iterator<Item = &Player> {
        self.players().filter(|p| !p.drafted)
    }

    pub fn find(&self, player_id: &str) -> Option<&Player> {
        self.players().find(|p| p.id == player_id)
    }

    pub fn find_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.rows.iter_mut().flatten().find(|p| p.id == player_id)
    }
}

/// A team's roster, one optional player per slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(rename = "QB")]
    pub qb: Option<Player>,
    #[serde(rename = "RB")]
    pub rb: Option<Player>,
    #[serde(rename = "WR")]
    pub wr: Option<Player>,
    #[serde(rename = "TE")]
    pub te: Option<Player>,
    #[serde(rename = "FLEX")]
    pub flex: Option<Player>,
}

impl Roster {
    pub fn get(&self, slot: RosterSlot) -> Option<&Player> {
        match slot {
            RosterSlot::Qb => self.qb.as_ref(),
            RosterSlot::Rb => self.rb.as_ref(),
            RosterSlot::Wr => self.wr.as_ref(),
            RosterSlot::Te => self.te.as_ref(),
            RosterSlot::Flex => self.flex.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: RosterSlot) -> &mut Option<Player> {
        match slot {
            RosterSlot::Qb => &mut self.qb,
            RosterSlot::Rb => &mut self.rb,
            RosterSlot::Wr => &mut self.wr,
            RosterSlot::Te => &mut self.te,
            RosterSlot::Flex => &mut self.flex,
        }
    }

    pub fn is_empty_slot(&self, slot: RosterSlot) -> bool {
        self.get(slot).is_none()
    }

    /// Empty slots in auto-pick priority order
    pub fn empty_slots(&self) -> Vec<RosterSlot> {
        RosterSlot::PRIORITY
            .into_iter()
            .filter(|slot| self.is_empty_slot(*slot))
            .collect()
    }

    /// Filled slots in priority order
    pub fn filled(&self) -> impl Iterator<Item = (RosterSlot, &Player)> {
        RosterSlot::PRIORITY
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|p| (slot, p)))
    }

    /// Sum of prices of rostered players
    pub fn total_spent(&self) -> i64 {
        self.filled().map(|(_, p)| p.price).sum()
    }
}

/// A participant as retained in the draft blob for repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub entry_id: i64,
    pub user_id: i64,
    pub username: String,
    pub draft_position: u32,
}

/// One drafting team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub entry_id: i64,
    pub user_id: i64,
    pub username: String,
    pub roster: Roster,
    /// Remaining budget
    pub budget: i64,
    /// Bonus accumulated over the draft (completion bonus)
    #[serde(default)]
    pub bonus: i64,
}

impl Team {
    pub fn new(participant: &Participant, budget: i64) -> Self {
        Self {
            entry_id: participant.entry_id,
            user_id: participant.user_id,
            username: participant.username.clone(),
            roster: Roster::default(),
            budget,
            bonus: 0,
        }
    }
}

/// A pick (or skipped turn) in the draft log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub team_index: usize,
    pub player: Option<Player>,
    pub roster_slot: Option<RosterSlot>,
    /// 1-based overall pick number
    pub pick_number: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_auto_pick: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A user's queued choice, consulted when they are auto-picked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preselection {
    pub player_id: String,
    pub slot: Option<RosterSlot>,
}

/// Draft lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Active,
    Completed,
}

/// Persisted state of one room's draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftInstance {
    pub room_id: RoomId,
    pub contest_id: i64,
    pub board: Board,
    pub teams: Vec<Team>,
    /// Entry list retained for rebuilding `teams`
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub draft_order: Vec<usize>,
    pub current_turn: usize,
    pub picks: Vec<Pick>,
    #[serde(default)]
    pub preselections: BTreeMap<i64, Preselection>,
    pub status: DraftStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Snake order for `team_count` teams over `rounds` rounds.
///
/// Even rounds ascend, odd rounds descend.
pub fn snake_order(team_count: usize, rounds: usize) -> Vec<usize> {
    (0..rounds)
        .flat_map(|round| {
            let ascending = round % 2 == 0;
            (0..team_count).map(move |i| if ascending { i } else { team_count - 1 - i })
        })
        .collect()
}

impl DraftInstance {
    /// Build a fresh draft. Teams are ordered by draft position.
    pub fn new(
        room_id: RoomId,
        contest_id: i64,
        board: Board,
        mut participants: Vec<Participant>,
        starting_budget: i64,
    ) -> Self {
        participants.sort_by_key(|p| p.draft_position);
        let teams = participants
            .iter()
            .map(|p| Team::new(p, starting_budget))
            .collect::<Vec<_>>();
        let draft_order = snake_order(teams.len(), ROUNDS);

        Self {
            room_id,
            contest_id,
            board,
            teams,
            participants,
            draft_order,
            current_turn: 0,
            picks: Vec::new(),
            preselections: BTreeMap::new(),
            status: DraftStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn total_turns(&self) -> usize {
        self.draft_order.len()
    }

    /// Whether every turn in the order has been taken
    pub fn order_exhausted(&self) -> bool {
        self.current_turn >= self.draft_order.len()
    }

    /// Team index acting on the current turn
    pub fn acting_team_index(&self) -> Option<usize> {
        self.draft_order
            .get(self.current_turn)
            .copied()
            .filter(|idx| *idx < self.teams.len())
    }

    pub fn acting_team(&self) -> Option<&Team> {
        self.acting_team_index().map(|idx| &self.teams[idx])
    }

    pub fn team_index_for_user(&self, user_id: i64) -> Option<usize> {
        self.teams.iter().position(|t| t.user_id == user_id)
    }

    /// 0-based round of the current turn
    pub fn round(&self) -> usize {
        if self.teams.is_empty() {
            0
        } else {
            self.current_turn / self.teams.len()
        }
    }

    /// Validate and apply a pick for `team_index`, advancing the turn.
    pub fn apply_pick(
        &mut self,
        team_index: usize,
        player_id: &str,
        slot: RosterSlot,
        is_auto_pick: bool,
        now: DateTime<Utc>,
    ) -> DraftResult<Pick> {
        rules::validate_pick(self, team_index, player_id, slot)?;

        let cell = self
            .board
            .find_mut(player_id)
            .ok_or_else(|| DraftError::PlayerUnavailable(player_id.to_string()))?;
        cell.drafted = true;
        cell.drafted_by = Some(team_index);
        let player = cell.clone();

        let team = &mut self.teams[team_index];
        team.budget -= player.price;
        *team.roster.slot_mut(slot) = Some(player.clone());

        let pick = Pick {
            team_index,
            player: Some(player),
            roster_slot: Some(slot),
            pick_number: self.picks.len() + 1,
            timestamp: now,
            is_auto_pick,
            skipped: false,
            reason: None,
        };
        self.picks.push(pick.clone());
        self.current_turn += 1;

        Ok(pick)
    }

    /// Record a skipped turn for `team_index`, advancing the turn.
    pub fn record_skip(&mut self, team_index: usize, reason: &str, now: DateTime<Utc>) -> Pick {
        let pick = Pick {
            team_index,
            player: None,
            roster_slot: None,
            pick_number: self.picks.len() + 1,
            timestamp: now,
            is_auto_pick: true,
            skipped: true,
            reason: Some(reason.to_string()),
        };
        self.picks.push(pick.clone());
        self.current_turn += 1;
        pick
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = DraftStatus::Completed;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Rebuild teams from the participant list by replaying the pick log.
    ///
    /// Used when the stored `teams` field is unusable.
    pub fn rebuild_teams(participants: &[Participant], picks: &[Pick], starting_budget: i64) -> Vec<Team> {
        let mut ordered = participants.to_vec();
        ordered.sort_by_key(|p| p.draft_position);
        let mut teams = ordered
            .iter()
            .map(|p| Team::new(p, starting_budget))
            .collect::<Vec<_>>();

        for pick in picks.iter().filter(|p| !p.skipped) {
            let (Some(player), Some(slot)) = (&pick.player, pick.roster_slot) else {
                continue;
            };
            if let Some(team) = teams.get_mut(pick.team_index) {
                team.budget -= player.price;
                *team.roster.slot_mut(slot) = Some(player.clone());
            }
        }

        teams
    }
}

/// Turn timing persisted apart from the draft blob, so recovery can
/// reconstruct a timer without decoding the whole draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMeta {
    pub room_id: RoomId,
    pub turn: usize,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    pub limit_secs: u64,
}

impl TurnMeta {
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(self.limit_secs as i64)
    }

    /// Time elapsed since the turn started, clamped at zero
    pub fn elapsed(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn player(id: &str, position: Position, price: i64) -> Player {
        Player {
            id: id.to_string(),
            name: format!("Player {id}"),
            team: "KC".to_string(),
            position: position.to_string(),
            original_position: position,
            price,
            drafted: false,
            drafted_by: None,
        }
    }

    fn participants(n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant {
                entry_id: 100 + i as i64,
                user_id: i as i64 + 1,
                username: format!("user{i}"),
                draft_position: i as u32,
            })
            .collect()
    }

    #[test]
    fn test_snake_order_five_by_five() {
        let order = snake_order(5, 5);
        assert_eq!(
            order,
            vec![
                0, 1, 2, 3, 4, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4
            ]
        );
    }

    #[test]
    fn test_snake_order_length() {
        assert_eq!(snake_order(3, 4).len(), 12);
        assert!(snake_order(0, 5).is_empty());
    }

    #[test]
    fn test_slot_acceptance_rules() {
        assert!(RosterSlot::Qb.accepts(Position::Qb));
        assert!(!RosterSlot::Flex.accepts(Position::Qb));
        assert!(!RosterSlot::Rb.accepts(Position::Qb));
        for pos in [Position::Rb, Position::Wr, Position::Te] {
            assert!(RosterSlot::Flex.accepts(pos));
            assert!(RosterSlot::from(pos).accepts(pos));
            assert!(!RosterSlot::Qb.accepts(pos));
        }
        assert!(!RosterSlot::Wr.accepts(Position::Rb));
    }

    #[test]
    fn test_teams_follow_draft_position() {
        let mut people = participants(3);
        people.reverse();
        let draft = DraftInstance::new(1, 1, Board::default(), people, STARTING_BUDGET);

        let positions: Vec<i64> = draft.teams.iter().map(|t| t.user_id).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(draft.total_turns(), 15);
    }

    #[test]
    fn test_apply_pick_updates_board_roster_budget() {
        let board = Board::new(vec![vec![player("qb1", Position::Qb, 5)]]);
        let mut draft = DraftInstance::new(1, 1, board, participants(2), STARTING_BUDGET);

        let pick = draft
            .apply_pick(0, "qb1", RosterSlot::Qb, false, Utc::now())
            .unwrap();

        assert_eq!(pick.pick_number, 1);
        assert_eq!(draft.current_turn, 1);
        assert_eq!(draft.teams[0].budget, 10);
        assert!(draft.board.find("qb1").unwrap().drafted);
        assert_eq!(draft.board.find("qb1").unwrap().drafted_by, Some(0));
        assert_eq!(draft.teams[0].roster.qb.as_ref().unwrap().id, "qb1");
    }

    #[test]
    fn test_record_skip_advances_without_player() {
        let mut draft = DraftInstance::new(1, 1, Board::default(), participants(2), 0);
        let pick = draft.record_skip(0, "budget exhausted", Utc::now());

        assert!(pick.skipped);
        assert!(pick.player.is_none());
        assert_eq!(pick.reason.as_deref(), Some("budget exhausted"));
        assert_eq!(draft.current_turn, 1);
    }

    #[test]
    fn test_rebuild_teams_replays_picks() {
        let board = Board::new(vec![vec![
            player("wr1", Position::Wr, 4),
            player("te1", Position::Te, 2),
        ]]);
        let mut draft = DraftInstance::new(1, 1, board, participants(2), STARTING_BUDGET);
        draft
            .apply_pick(0, "wr1", RosterSlot::Flex, false, Utc::now())
            .unwrap();
        draft.record_skip(1, "timeout", Utc::now());
        draft
            .apply_pick(1, "te1", RosterSlot::Te, true, Utc::now())
            .unwrap();

        let rebuilt = DraftInstance::rebuild_teams(&draft.participants, &draft.picks, STARTING_BUDGET);
        assert_eq!(rebuilt, draft.teams);
    }

    #[test]
    fn test_turn_meta_elapsed_never_negative() {
        let meta = TurnMeta {
            room_id: 1,
            turn: 0,
            user_id: 1,
            started_at: Utc::now() + chrono::Duration::seconds(60),
            limit_secs: 30,
        };
        assert_eq!(meta.elapsed(Utc::now()), std::time::Duration::ZERO);
        assert!(meta.deadline() > meta.started_at);
    }

    #[test]
    fn test_slot_parse_accepts_wildcard_alias() {
        assert_eq!("wildcard".parse::<RosterSlot>().unwrap(), RosterSlot::Flex);
        assert_eq!("te".parse::<RosterSlot>().unwrap(), RosterSlot::Te);
        assert!("K".parse::<RosterSlot>().is_err());
    }
}
