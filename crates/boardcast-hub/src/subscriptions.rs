//! Per-connection board subscription sets.

use std::collections::HashSet;

use crate::ids::BoardId;

/// Boards one connection listens to.
///
/// An empty set is an implicit wildcard: a connection that never
/// subscribed receives every board-scoped event. [`BoardId::ALL`] in the
/// set is the explicit wildcard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardSubscriptions {
    boards: HashSet<BoardId>,
}

impl BoardSubscriptions {
    /// Empty set (implicit wildcard).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a board. Returns `true` if it was not already present.
    pub fn subscribe(&mut self, board: BoardId) -> bool {
        self.boards.insert(board)
    }

    /// Remove a board. Returns `true` if it was present.
    ///
    /// Removing the last board leaves an empty set, which is the implicit
    /// wildcard again.
    pub fn unsubscribe(&mut self, board: BoardId) -> bool {
        self.boards.remove(&board)
    }

    /// Add the explicit wildcard.
    pub fn subscribe_all(&mut self) -> bool {
        self.subscribe(BoardId::ALL)
    }

    /// Whether events for `board` reach this connection.
    pub fn matches(&self, board: BoardId) -> bool {
        self.boards.is_empty() || self.boards.contains(&BoardId::ALL) || self.boards.contains(&board)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Boards in ascending order.
    pub fn sorted(&self) -> Vec<BoardId> {
        let mut boards: Vec<BoardId> = self.boards.iter().copied().collect();
        boards.sort_unstable();
        boards
    }
}
