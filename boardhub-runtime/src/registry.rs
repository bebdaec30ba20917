//! Board registry: id → controller, iterated in insertion order.

use std::collections::HashMap;

use boardhub_core::BoardId;

use crate::board::BoardRef;

/// Insertion-ordered map of live controllers.
///
/// Replacing an existing id keeps its original position. Nothing is ever
/// removed; stopping a board does not deregister it.
#[derive(Default)]
pub struct BoardRegistry {
    order: Vec<BoardId>,
    boards: HashMap<BoardId, BoardRef>,
}

impl BoardRegistry {
    /// Inserts `board` under `id`, returning the controller it replaced.
    pub fn insert(&mut self, id: BoardId, board: BoardRef) -> Option<BoardRef> {
        let previous = self.boards.insert(id.clone(), board);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn get(&self, id: &str) -> Option<BoardRef> {
        self.boards.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.boards.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> Vec<BoardId> {
        self.order.clone()
    }

    /// Owned copy of every entry in registry order.
    pub fn snapshot(&self) -> Vec<(BoardId, BoardRef)> {
        self.order
            .iter()
            .filter_map(|id| self.boards.get(id).map(|board| (id.clone(), board.clone())))
            .collect()
    }
}
