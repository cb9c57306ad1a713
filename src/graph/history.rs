use std::collections::VecDeque;

use log::debug;

use super::store::{GraphSnapshot, GraphStore};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bounded undo/redo stacks of full document snapshots.
///
/// Callers take one snapshot before each user-level operation, however many
/// nodes it touches. Restored state reaches the remote store through the
/// store's outbox; nothing here talks to the network.
#[derive(Clone, Debug)]
pub struct History {
	undo: VecDeque<GraphSnapshot>,
	redo: Vec<GraphSnapshot>,
	limit: usize,
}

impl Default for History {
	fn default() -> Self {
		Self::new(DEFAULT_HISTORY_LIMIT)
	}
}

impl History {
	pub fn new(limit: usize) -> Self {
		Self {
			undo: VecDeque::new(),
			redo: Vec::new(),
			limit: limit.max(1),
		}
	}

	pub fn can_undo(&self) -> bool {
		!self.undo.is_empty()
	}

	pub fn can_redo(&self) -> bool {
		!self.redo.is_empty()
	}

	pub fn undo_len(&self) -> usize {
		self.undo.len()
	}

	pub fn redo_len(&self) -> usize {
		self.redo.len()
	}

	/// Records the current state before a mutation. Clears redo.
	pub fn snapshot(&mut self, store: &GraphStore) {
		self.undo.push_back(store.snapshot());
		if self.undo.len() > self.limit {
			self.undo.pop_front();
		}
		self.redo.clear();
	}

	/// Steps back one snapshot on behalf of `identity`.
	pub fn undo(&mut self, store: &mut GraphStore, identity: &str) -> bool {
		let Some(previous) = self.undo.pop_back() else {
			return false;
		};
		self.redo.push(store.snapshot());
		store.restore(&previous, identity);
		debug!("undo ({} left)", self.undo.len());
		true
	}

	pub fn redo(&mut self, store: &mut GraphStore, identity: &str) -> bool {
		let Some(next) = self.redo.pop() else {
			return false;
		};
		self.undo.push_back(store.snapshot());
		if self.undo.len() > self.limit {
			self.undo.pop_front();
		}
		store.restore(&next, identity);
		debug!("redo ({} left)", self.redo.len());
		true
	}

	pub fn clear(&mut self) {
		self.undo.clear();
		self.redo.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::NodeDraft;

	fn store_with_node() -> (GraphStore, String) {
		let mut store = GraphStore::new();
		let id = store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();
		(store, id)
	}

	#[test]
	fn undo_then_redo_round_trips_state() {
		let (mut store, id) = store_with_node();
		let mut history = History::default();

		history.snapshot(&store);
		store.move_node(&id, 10.0, 20.0).unwrap();

		assert!(history.undo(&mut store, "alice"));
		assert_eq!(store.node(&id).unwrap().x, 0.0);
		assert!(history.can_redo());

		assert!(history.redo(&mut store, "alice"));
		assert_eq!(store.node(&id).unwrap().x, 10.0);
		assert!(history.can_undo());
	}

	#[test]
	fn new_snapshot_clears_redo() {
		let (mut store, id) = store_with_node();
		let mut history = History::default();
		history.snapshot(&store);
		store.move_node(&id, 1.0, 1.0).unwrap();
		history.undo(&mut store, "alice");
		assert_eq!(history.redo_len(), 1);

		history.snapshot(&store);
		assert_eq!(history.redo_len(), 0);
	}

	#[test]
	fn empty_stacks_are_noops() {
		let (mut store, _) = store_with_node();
		let mut history = History::default();
		assert!(!history.undo(&mut store, "alice"));
		assert!(!history.redo(&mut store, "alice"));
	}

	#[test]
	fn history_is_bounded() {
		let (mut store, id) = store_with_node();
		let mut history = History::new(3);
		for i in 0..10 {
			history.snapshot(&store);
			store.move_node(&id, i as f64, 0.0).unwrap();
		}
		assert_eq!(history.undo_len(), 3);
		while history.undo(&mut store, "alice") {}
		// oldest reachable state is the one before the 8th move
		assert_eq!(store.node(&id).unwrap().x, 6.0);
	}
}
