//! Reconciliation engine
//!
//! Applies game events, in arrival order, to the local view of a game: the
//! solution matrix, the player and cursor maps and the derived completion
//! state. Every event source goes through here: live batches, the bulk
//! replay after (re)connecting and the player's own optimistic edits.
//!
//! ## Own-echo dedup
//!
//! The server echoes our own events back, possibly late, reordered or
//! duplicated. For dedupable types the engine remembers the id of the last
//! event we sent per dedup key. An incoming self-authored event with that
//! key is applied only if it is that last event (or we never sent one);
//! anything else is a stale echo of an edit we have since superseded.
//! Events from other players are always applied in arrival order.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{
    AddPing, Chat, CreatePuzzle, EventKind, GameEvent, Scope, UpdateCell, UpdateColor,
    UpdateCursor, UpdateDisplayName,
};
use crate::grid::{
    resolve_solution_state, CellEntry, Clues, Correctness, Grid, GridCell, Solution,
    SolutionState,
};
use crate::models::{Coordinates, Cursor, Player};
use crate::observer::{GameUpdate, Observers};
use crate::storage::{SaveState, SnapshotStore};

/// Local actions the engine refuses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("no puzzle loaded yet")]
    NoPuzzle,

    #[error("square {0} is outside the grid")]
    OutOfBounds(Coordinates),

    #[error("square {0} is a block")]
    Block(Coordinates),

    #[error("square {0} is locked")]
    Locked(Coordinates),

    #[error("the puzzle is already solved")]
    PuzzleSolved,

    #[error("message is empty")]
    EmptyMessage,
}

/// Where snapshots of this game are written
#[derive(Debug, Clone)]
pub struct SnapshotTarget {
    store: SnapshotStore,
    key: String,
    include_read_state: bool,
}

impl SnapshotTarget {
    /// Snapshots keyed by game id
    pub fn game(store: SnapshotStore, game_id: impl Into<String>) -> Self {
        Self {
            store,
            key: game_id.into(),
            include_read_state: false,
        }
    }

    /// Snapshots keyed by puzzle id, also carrying the chat read marker
    pub fn offline(store: SnapshotStore, puzzle_id: impl Into<String>) -> Self {
        Self {
            store,
            key: puzzle_id.into(),
            include_read_state: true,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// How local entries are made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputMode {
    /// Mark correctness as soon as a square is filled
    pub autocheck: bool,
    /// Enter tentative values
    pub pencil: bool,
}

/// What a batch touched, published once the batch is done
#[derive(Debug, Default)]
struct BatchEffects {
    solution: bool,
    cursors: bool,
}

/// Owns the local game state and applies events to it
#[derive(Debug)]
pub struct GameEngine {
    self_id: String,
    grid: Grid,
    clues: Clues,
    solution: Solution,
    solution_state: SolutionState,
    /// Set when the solution changed since `solution_state` was computed
    state_stale: bool,
    players: BTreeMap<String, Player>,
    cursors: BTreeMap<String, Cursor>,
    /// dedup key -> id of the last event we sent with that key
    sent_events: HashMap<String, String>,
    input_mode: InputMode,
    last_read_chat: Option<i64>,
    /// Inside a bulk replay
    bulk: bool,
    /// Applying one of our own local actions
    authoring: bool,
    /// Notifications held back until the replay completes
    deferred: Vec<GameUpdate>,
    snapshots: Option<SnapshotTarget>,
    observers: Observers,
}

impl GameEngine {
    /// Engine for `self_id` playing `grid`; an empty grid waits for a `create`
    pub fn new(self_id: impl Into<String>, grid: Grid, clues: Clues) -> Self {
        let solution = Solution::empty_for(&grid);
        Self {
            self_id: self_id.into(),
            grid,
            clues,
            solution,
            solution_state: SolutionState::Incomplete,
            state_stale: false,
            players: BTreeMap::new(),
            cursors: BTreeMap::new(),
            sent_events: HashMap::new(),
            input_mode: InputMode::default(),
            last_read_chat: None,
            bulk: false,
            authoring: false,
            deferred: Vec::new(),
            snapshots: None,
            observers: Observers::new(),
        }
    }

    /// Persist to `target`, seeding state from the snapshot already there
    pub fn with_snapshots(mut self, target: SnapshotTarget) -> Self {
        match target.store.load(&target.key) {
            Ok(Some(state)) => {
                if state.solution.fits(&self.grid) {
                    info!("Restored snapshot for {}", target.key);
                    self.solution = state.solution;
                    self.last_read_chat = state.last_read_chat;
                    self.solution_state = resolve_solution_state(&self.grid, &self.solution);
                } else {
                    warn!(
                        "Snapshot for {} does not match the puzzle dimensions, ignoring",
                        target.key
                    );
                }
            }
            Ok(None) => debug!("No snapshot for {}", target.key),
            Err(e) => warn!("Failed to read snapshot for {}: {}", target.key, e),
        }
        self.snapshots = Some(target);
        self
    }

    // ==================== Accessors ====================

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn clues(&self) -> &Clues {
        &self.clues
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn solution_state(&mut self) -> SolutionState {
        self.refresh_state()
    }

    pub fn players(&self) -> &BTreeMap<String, Player> {
        &self.players
    }

    pub fn cursors(&self) -> &BTreeMap<String, Cursor> {
        &self.cursors
    }

    /// Id of the last event we sent under `dedup_key`
    pub fn last_sent(&self, dedup_key: &str) -> Option<&str> {
        self.sent_events.get(dedup_key).map(String::as_str)
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.input_mode = mode;
    }

    pub fn last_read_chat(&self) -> Option<i64> {
        self.last_read_chat
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    // ==================== Observers ====================

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GameUpdate> {
        self.observers.subscribe()
    }

    /// Push a notification that does not come from an event
    pub fn notify(&mut self, update: GameUpdate) {
        self.observers.notify(update);
    }

    // ==================== Applying events ====================

    /// Decode and apply one batch of wire events in order
    ///
    /// A malformed event is logged and skipped; the rest of the batch still
    /// applies.
    pub fn apply(&mut self, batch: &Value) {
        let events = decode_logged(batch);
        self.apply_events(events);
    }

    /// Apply already-decoded events in order
    pub fn apply_events(&mut self, events: impl IntoIterator<Item = GameEvent>) {
        let mut effects = BatchEffects::default();
        for event in events {
            self.apply_one(&event, &mut effects);
        }
        if !self.bulk {
            self.publish(effects, false);
        }
    }

    /// Rebuild the solution from the full ordered event log
    ///
    /// The solution is wiped first, so replaying the same log always gives
    /// the same result. Persistence and notifications are held until the
    /// whole log has been applied.
    pub fn replay(&mut self, log: &Value) {
        let events = decode_logged(log);
        info!("Replaying {} events", events.len());

        self.solution = Solution::empty_for(&self.grid);
        self.state_stale = true;
        self.bulk = true;

        let mut effects = BatchEffects::default();
        for event in events {
            self.apply_one(&event, &mut effects);
        }

        self.bulk = false;
        for update in std::mem::take(&mut self.deferred) {
            self.observers.notify(update);
        }
        effects.solution = true;
        self.publish(effects, true);
    }

    fn publish(&mut self, effects: BatchEffects, is_bulk: bool) {
        if effects.cursors {
            self.observers
                .notify(GameUpdate::CursorsChanged(self.cursors.clone()));
        }
        if effects.solution {
            let state = self.refresh_state();
            self.persist();
            self.observers.notify(GameUpdate::SolutionChanged {
                solution: self.solution.clone(),
                is_bulk,
                state,
            });
        }
    }

    /// Notify now, or after the replay when one is running
    fn emit(&mut self, update: GameUpdate) {
        if self.bulk {
            self.deferred.push(update);
        } else {
            self.observers.notify(update);
        }
    }

    /// Own-echo dedup check
    fn should_apply(&self, event: &GameEvent) -> bool {
        let Some(key) = event.dedup_key() else {
            return true;
        };
        if event.user_id() != Some(self.self_id.as_str()) {
            return true;
        }
        match self.sent_events.get(&key) {
            None => true,
            Some(last) => *last == event.id,
        }
    }

    fn apply_one(&mut self, event: &GameEvent, effects: &mut BatchEffects) {
        if !self.should_apply(event) {
            debug!("Dropping stale echo {} ({})", event.id, event.type_name());
            return;
        }

        if let Some(user_id) = event.user_id() {
            if self.observe_player(user_id) {
                effects.cursors = true;
            }
        }

        match &event.kind {
            EventKind::UpdateCursor(p) => {
                self.apply_cursor(p, event.timestamp);
                effects.cursors = true;
            }
            EventKind::UpdateCell(p) => {
                if self.apply_cell(p) {
                    effects.solution = true;
                }
            }
            EventKind::UpdateColor(p) => {
                self.update_player(&p.user_id, |player| player.color = Some(p.color.clone()));
                effects.cursors = true;
            }
            EventKind::UpdateDisplayName(p) => {
                self.update_player(&p.user_id, |player| {
                    player.display_name = Some(p.display_name.clone())
                });
                effects.cursors = true;
            }
            EventKind::AddPing(p) => self.apply_ping(p),
            EventKind::Check(scope) => {
                if self.apply_check(scope) {
                    effects.solution = true;
                }
            }
            EventKind::Reveal(scope) => {
                if self.apply_reveal(scope) {
                    effects.solution = true;
                }
            }
            EventKind::Reset(scope) => {
                if self.apply_reset(scope) {
                    effects.solution = true;
                }
            }
            EventKind::Chat(_) => {
                if let Some(message) = event.chat_message() {
                    let from = self.players.get(&message.sender_id).cloned();
                    self.emit(GameUpdate::ChatReceived { message, from });
                }
            }
            EventKind::Create(create) => {
                if self.apply_create(create) {
                    effects.solution = true;
                }
            }
            EventKind::Unrecognized(name) => {
                debug!("Ignoring unrecognized event type '{}'", name);
            }
        }
    }

    /// Create player and cursor on first sight; true if anything was added
    fn observe_player(&mut self, user_id: &str) -> bool {
        if self.players.contains_key(user_id) {
            return false;
        }
        let player = Player::new(user_id);
        self.cursors
            .insert(user_id.to_string(), Cursor::new(player.clone()));
        self.players.insert(user_id.to_string(), player);
        true
    }

    fn update_player(&mut self, user_id: &str, change: impl FnOnce(&mut Player)) {
        self.observe_player(user_id);
        let Some(player) = self.players.get_mut(user_id) else {
            return;
        };
        let was_complete = player.is_complete();
        change(player);
        let player = player.clone();

        if let Some(cursor) = self.cursors.get_mut(user_id) {
            cursor.player = player.clone();
        }
        if !was_complete && player.is_complete() {
            info!("Player joined: {}", player.label());
            self.emit(GameUpdate::PlayerJoined(player));
        }
    }

    fn apply_cursor(&mut self, p: &UpdateCursor, event_timestamp: Option<i64>) {
        if let Some(cursor) = self.cursors.get_mut(&p.user_id) {
            cursor.coordinates = Some(p.cell);
            cursor.timestamp = p.timestamp.or(event_timestamp);
        }
    }

    fn apply_cell(&mut self, p: &UpdateCell) -> bool {
        if self.grid.is_empty() {
            debug!("Ignoring updateCell before the puzzle is known");
            return false;
        }
        if self.refresh_state().is_solved() {
            debug!("Ignoring updateCell on a solved puzzle");
            return false;
        }

        let answer = match self.grid.cell(p.cell) {
            Some(GridCell::Answer(answer)) => answer.clone(),
            Some(GridCell::Block) | None => {
                debug!("Ignoring updateCell for {} (block or out of bounds)", p.cell);
                return false;
            }
        };
        if self
            .solution
            .get(p.cell)
            .is_some_and(|entry| !entry.is_writable())
        {
            debug!("Ignoring updateCell for locked square {}", p.cell);
            return false;
        }

        match p.entered_value() {
            Some(value) => {
                let correctness = if p.autocheck.unwrap_or(false) {
                    Some(Correctness::check(value, &answer))
                } else if p.pencil.unwrap_or(false) {
                    Some(Correctness::Penciled {
                        color: p.color.clone(),
                    })
                } else {
                    None
                };
                let entry = CellEntry::new(p.user_id.clone(), value).with_correctness(correctness);
                self.solution.set(p.cell, entry);
            }
            None => self.solution.clear(p.cell),
        }
        self.state_stale = true;
        true
    }

    fn apply_ping(&mut self, p: &AddPing) {
        // Pings are ephemeral; old ones in the replayed log are meaningless
        if self.bulk {
            return;
        }
        // Our own pings were shown when made
        if p.user_id == self.self_id && !self.authoring {
            return;
        }
        self.observers.notify(GameUpdate::PingReceived {
            user_id: p.user_id.clone(),
            cell: p.cell,
        });
    }

    fn apply_check(&mut self, scope: &Scope) -> bool {
        let mut changed = false;
        for &at in &scope.scope {
            let Some(answer) = self.grid.cell(at).and_then(GridCell::answer) else {
                continue;
            };
            let Some(entry) = self.solution.get_mut(at) else {
                continue;
            };
            if matches!(entry.correctness, Some(Correctness::Revealed)) {
                continue;
            }
            entry.correctness = Some(Correctness::check(&entry.value, answer));
            changed = true;
        }
        changed
    }

    fn apply_reveal(&mut self, scope: &Scope) -> bool {
        let mut changed = false;
        for &at in &scope.scope {
            let Some(answer) = self.grid.cell(at).and_then(GridCell::answer) else {
                continue;
            };
            if self.solution.get(at).is_some_and(CellEntry::is_correct) {
                continue;
            }
            self.solution.set(at, CellEntry::revealed(answer));
            changed = true;
        }
        if changed {
            self.state_stale = true;
        }
        changed
    }

    fn apply_reset(&mut self, scope: &Scope) -> bool {
        let mut changed = false;
        for &at in &scope.scope {
            if self.solution.get(at).is_some() {
                self.solution.clear(at);
                changed = true;
            }
        }
        if changed {
            self.state_stale = true;
        }
        changed
    }

    fn apply_create(&mut self, create: &CreatePuzzle) -> bool {
        if !self.grid.is_empty() {
            debug!("Ignoring create for {}: puzzle already loaded", create.pid);
            return false;
        }
        let grid = create.grid();
        if grid.is_empty() {
            warn!("Ignoring create for {}: empty puzzle", create.pid);
            return false;
        }
        if !grid.is_rectangular() {
            warn!("Ignoring create for {}: rows differ in length", create.pid);
            return false;
        }

        info!(
            "Loaded puzzle {} ({}x{})",
            create.pid,
            grid.rows(),
            grid.cols()
        );
        self.solution = Solution::empty_for(&grid);
        self.grid = grid.clone();
        self.clues = create.clues();
        self.state_stale = true;
        self.emit(GameUpdate::PuzzleLoaded(grid));
        true
    }

    fn refresh_state(&mut self) -> SolutionState {
        if self.state_stale {
            self.solution_state = resolve_solution_state(&self.grid, &self.solution);
            self.state_stale = false;
        }
        self.solution_state
    }

    fn persist(&self) {
        let Some(target) = &self.snapshots else {
            return;
        };
        let state = SaveState {
            solution: self.solution.clone(),
            last_read_chat: if target.include_read_state {
                self.last_read_chat
            } else {
                None
            },
        };
        if let Err(e) = target.store.save(&target.key, &state) {
            match e.recovery_suggestion() {
                Some(hint) => warn!("Failed to save snapshot for {}: {} ({})", target.key, e, hint),
                None => warn!("Failed to save snapshot for {}: {}", target.key, e),
            }
        }
    }

    // ==================== Local actions ====================

    /// Record `kind` as our own latest intent and apply it locally
    ///
    /// Returns the event so the caller can send it.
    pub fn author(&mut self, kind: EventKind) -> GameEvent {
        let event = GameEvent::new(kind);
        if let Some(key) = event.dedup_key() {
            self.sent_events.insert(key, event.id.clone());
        }
        self.authoring = true;
        self.apply_events([event.clone()]);
        self.authoring = false;
        event
    }

    /// Fill (or, with an empty value, clear) a square
    pub fn enter(&mut self, at: Coordinates, value: &str) -> Result<GameEvent, GameError> {
        self.check_writable(at)?;
        let mode = self.input_mode;
        let value = value.trim().to_uppercase();
        let color = self
            .players
            .get(&self.self_id)
            .and_then(|player| player.color.clone());

        Ok(self.author(EventKind::UpdateCell(UpdateCell {
            user_id: self.self_id.clone(),
            cell: at,
            value: Some(value),
            color,
            pencil: mode.pencil.then_some(true),
            autocheck: mode.autocheck.then_some(true),
        })))
    }

    /// Empty a square
    pub fn clear(&mut self, at: Coordinates) -> Result<GameEvent, GameError> {
        self.enter(at, "")
    }

    pub fn move_cursor(&mut self, at: Coordinates) -> Result<GameEvent, GameError> {
        if !self.grid.is_empty() && !self.grid.contains(at) {
            return Err(GameError::OutOfBounds(at));
        }
        Ok(self.author(EventKind::UpdateCursor(UpdateCursor {
            user_id: self.self_id.clone(),
            cell: at,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        })))
    }

    pub fn ping(&mut self, at: Coordinates) -> Result<GameEvent, GameError> {
        if !self.grid.is_empty() && !self.grid.contains(at) {
            return Err(GameError::OutOfBounds(at));
        }
        Ok(self.author(EventKind::AddPing(AddPing {
            user_id: self.self_id.clone(),
            cell: at,
        })))
    }

    pub fn set_color(&mut self, color: impl Into<String>) -> GameEvent {
        self.author(EventKind::UpdateColor(UpdateColor {
            user_id: self.self_id.clone(),
            color: color.into(),
        }))
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) -> GameEvent {
        self.author(EventKind::UpdateDisplayName(UpdateDisplayName {
            user_id: self.self_id.clone(),
            display_name: name.into(),
        }))
    }

    /// Send a chat line; observers see it at once, tagged with a client id
    pub fn send_message(&mut self, text: &str) -> Result<GameEvent, GameError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::EmptyMessage);
        }
        let sender = self
            .players
            .get(&self.self_id)
            .map(|player| player.label().to_string())
            .unwrap_or_else(|| self.self_id.clone());

        Ok(self.author(EventKind::Chat(Chat {
            sender_id: self.self_id.clone(),
            sender,
            text: text.to_string(),
            client_message_id: Some(uuid::Uuid::new_v4().to_string()),
        })))
    }

    pub fn check(&mut self, cells: Vec<Coordinates>) -> Result<GameEvent, GameError> {
        self.check_scope(&cells)?;
        Ok(self.author(EventKind::Check(Scope { scope: cells })))
    }

    pub fn reveal(&mut self, cells: Vec<Coordinates>) -> Result<GameEvent, GameError> {
        self.check_scope(&cells)?;
        Ok(self.author(EventKind::Reveal(Scope { scope: cells })))
    }

    pub fn reset(&mut self, cells: Vec<Coordinates>) -> Result<GameEvent, GameError> {
        self.check_scope(&cells)?;
        Ok(self.author(EventKind::Reset(Scope { scope: cells })))
    }

    /// Remember that chat up to `timestamp` has been read
    pub fn mark_chat_read(&mut self, timestamp: i64) {
        if self.last_read_chat.is_some_and(|t| t >= timestamp) {
            return;
        }
        self.last_read_chat = Some(timestamp);
        self.persist();
    }

    fn check_scope(&self, cells: &[Coordinates]) -> Result<(), GameError> {
        if self.grid.is_empty() {
            return Err(GameError::NoPuzzle);
        }
        match cells.iter().find(|at| !self.grid.contains(**at)) {
            Some(at) => Err(GameError::OutOfBounds(*at)),
            None => Ok(()),
        }
    }

    fn check_writable(&mut self, at: Coordinates) -> Result<(), GameError> {
        if self.grid.is_empty() {
            return Err(GameError::NoPuzzle);
        }
        match self.grid.cell(at) {
            None => return Err(GameError::OutOfBounds(at)),
            Some(GridCell::Block) => return Err(GameError::Block(at)),
            Some(GridCell::Answer(_)) => {}
        }
        if self.refresh_state().is_solved() {
            return Err(GameError::PuzzleSolved);
        }
        if self
            .solution
            .get(at)
            .is_some_and(|entry| !entry.is_writable())
        {
            return Err(GameError::Locked(at));
        }
        Ok(())
    }
}

/// Decode a batch, logging and skipping events that fail
fn decode_logged(batch: &Value) -> Vec<GameEvent> {
    GameEvent::decode_batch(batch)
        .into_iter()
        .filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping undecodable event: {}", e);
                None
            }
        })
        .collect()
}
