use log::{debug, info, warn};

use crate::config::EditorConfig;
use crate::graph::document::{self, ImportReport};
use crate::graph::{
	GraphData, GraphStore, History, ImportError, LayoutKind, NodeId, Point, StyleCoercion, StylePatch, layout,
};
use crate::sync::SessionToken;

/// One open document: the store, its undo history and who is editing it.
///
/// Higher-level operations here bundle several store calls behind a single
/// undo snapshot.
#[derive(Debug)]
pub struct Workspace {
	pub document_id: String,
	pub identity: String,
	pub store: GraphStore,
	pub history: History,
	pub config: EditorConfig,
	generation: u64,
}

impl Workspace {
	pub fn new(document_id: impl Into<String>, identity: impl Into<String>, config: EditorConfig) -> Self {
		let config = config.sanitized();
		Self {
			document_id: document_id.into(),
			identity: identity.into(),
			store: GraphStore::new(),
			history: History::new(config.history_limit),
			config,
			generation: 0,
		}
	}

	pub fn open(
		document_id: impl Into<String>,
		identity: impl Into<String>,
		config: EditorConfig,
		data: GraphData,
	) -> Self {
		let mut ws = Self::new(document_id, identity, config);
		ws.store = GraphStore::from_data(data);
		ws
	}

	pub fn token(&self) -> SessionToken {
		SessionToken {
			document_id: self.document_id.clone(),
			generation: self.generation,
		}
	}

	/// Whether results started under `token` may still be applied.
	pub fn is_current(&self, token: &SessionToken) -> bool {
		token.document_id == self.document_id && token.generation == self.generation
	}

	/// Switches to another document. Anything still in flight for the old
	/// one is discarded when it lands.
	pub fn switch_document(&mut self, document_id: impl Into<String>, data: GraphData) {
		self.document_id = document_id.into();
		self.generation += 1;
		self.store = GraphStore::from_data(data);
		self.history.clear();
		info!("opened document {}", self.document_id);
	}

	/// Closes the editor; in-flight results become stale.
	pub fn close(&mut self) {
		self.generation += 1;
		self.history.clear();
		debug!("closed document {}", self.document_id);
	}

	pub fn undo(&mut self) -> bool {
		self.history.undo(&mut self.store, &self.identity)
	}

	pub fn redo(&mut self) -> bool {
		self.history.redo(&mut self.store, &self.identity)
	}

	/// Deletes nodes that are not locked by someone else, under one
	/// snapshot. Returns how many were removed.
	pub fn delete_nodes<'a>(&mut self, ids: impl IntoIterator<Item = &'a NodeId>) -> usize {
		let deletable: Vec<NodeId> = ids
			.into_iter()
			.filter(|id| match self.store.node(id) {
				Some(node) if node.locked_by_other(&self.identity) => {
					warn!("node {id} is locked by another editor, not deleting");
					false
				}
				Some(_) => true,
				None => false,
			})
			.cloned()
			.collect();
		if deletable.is_empty() {
			return 0;
		}
		self.history.snapshot(&self.store);
		deletable
			.iter()
			.filter(|id| self.store.delete_node(id).is_ok())
			.count()
	}

	/// Applies one style patch to several nodes under one snapshot.
	pub fn style_nodes<'a>(
		&mut self,
		ids: impl IntoIterator<Item = &'a NodeId>,
		patch: &StylePatch,
	) -> Vec<StyleCoercion> {
		let targets: Vec<&NodeId> = ids.into_iter().filter(|id| self.store.contains_node(id)).collect();
		if targets.is_empty() || patch.is_empty() {
			return Vec::new();
		}
		self.history.snapshot(&self.store);
		targets
			.into_iter()
			.filter_map(|id| self.store.update_node_style(id, patch).ok())
			.flatten()
			.collect()
	}

	/// Repositions every node with `kind`, as one undoable step.
	pub fn apply_layout(&mut self, kind: LayoutKind) -> usize {
		let data = self.store.to_data();
		if data.nodes.is_empty() {
			return 0;
		}
		let positions = layout::compute(kind, &data.nodes, &data.links, &self.config.layout);
		let movable: Vec<(&NodeId, &Point)> = positions
			.iter()
			.filter(|(id, _)| match self.store.node(id) {
				Some(node) if node.locked_by_other(&self.identity) => {
					warn!("node {id} is locked by another editor, layout leaves it in place");
					false
				}
				Some(_) => true,
				None => false,
			})
			.collect();
		if movable.is_empty() {
			return 0;
		}
		self.history.snapshot(&self.store);
		let moved = movable
			.into_iter()
			.filter(|(id, p)| self.store.move_node(id, p.x, p.y).is_ok())
			.count();
		info!("applied {kind:?} layout to {moved} nodes");
		moved
	}

	/// Adds the content of an export file under fresh ids.
	pub fn import(&mut self, json: &str) -> Result<ImportReport, ImportError> {
		let data = document::parse(json)?;
		self.history.snapshot(&self.store);
		let report = document::import_into(&mut self.store, data);
		info!(
			"imported {} nodes and {} links ({} links dropped)",
			report.nodes_added, report.links_added, report.links_dropped
		);
		Ok(report)
	}

	pub fn export(&self) -> String {
		document::export(&self.store)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::graph::{LinkDraft, Node, NodeDraft};

	fn workspace() -> Workspace {
		Workspace::new("doc", "alice", EditorConfig::default())
	}

	#[test]
	fn delete_nodes_is_one_undo_step() {
		let mut ws = workspace();
		let a = ws.store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();
		let b = ws.store.add_node(NodeDraft::text(0.0, 0.0, "b")).unwrap();
		ws.store.add_link(LinkDraft::new(a.clone(), b.clone())).unwrap();

		assert_eq!(ws.delete_nodes([&a, &b]), 2);
		assert_eq!(ws.history.undo_len(), 1);
		assert!(ws.undo());
		assert_eq!(ws.store.node_count(), 2);
		assert_eq!(ws.store.link_count(), 1);
	}

	#[test]
	fn delete_skips_nodes_locked_by_others() {
		let mut ws = workspace();
		let a = ws.store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();
		ws.store.lock(&a, "bob").unwrap();
		assert_eq!(ws.delete_nodes([&a]), 0);
		assert!(ws.store.contains_node(&a));
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn layout_is_one_undo_step() {
		let mut ws = workspace();
		for i in 0..4 {
			ws.store.add_node(NodeDraft::text(i as f64, 0.0, "n")).unwrap();
		}
		assert_eq!(ws.apply_layout(LayoutKind::Pyramid), 4);
		assert_eq!(ws.history.undo_len(), 1);
	}

	#[test]
	fn layout_leaves_nodes_locked_by_others_in_place() {
		let mut ws = workspace();
		let a = ws.store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();
		let b = ws.store.add_node(NodeDraft::text(7.0, 7.0, "b")).unwrap();
		ws.store.lock(&b, "bob").unwrap();

		assert_eq!(ws.apply_layout(LayoutKind::Pyramid), 1);
		assert_eq!(ws.store.node(&b).unwrap().position(), Point::new(7.0, 7.0));
		assert!(ws.store.contains_node(&a));
	}

	#[test]
	fn undo_leaves_nodes_locked_by_others_alone() {
		let mut ws = Workspace::open(
			"doc",
			"alice",
			EditorConfig::default(),
			GraphData {
				nodes: vec![Node::text("a", 0.0, 0.0, "a"), Node::text("b", 150.0, 0.0, "old")],
				links: vec![],
			},
		);
		ws.history.snapshot(&ws.store);
		ws.store.move_node("a", 50.0, 50.0).unwrap();

		let mut b = Node::text("b", 150.0, 0.0, "bob typing");
		b.locked_by = Some("bob".into());
		let mut c = Node::text("c", 300.0, 0.0, "new");
		c.locked_by = Some("bob".into());
		ws.store.apply_remote_snapshot(GraphData {
			nodes: vec![Node::text("a", 0.0, 0.0, "a"), b, c],
			links: vec![],
		});

		assert!(ws.undo());
		assert_eq!(ws.store.node("a").unwrap().x, 0.0);
		let b = ws.store.node("b").unwrap();
		assert_eq!(b.content.as_text(), Some("bob typing"));
		assert_eq!(b.locked_by.as_deref(), Some("bob"));
		assert!(ws.store.contains_node("c"));
	}

	#[test]
	fn new_workspace_sanitizes_config() {
		let config = EditorConfig {
			pan_limit: -1.0,
			..EditorConfig::default()
		};
		let ws = Workspace::new("doc", "alice", config);
		assert!(ws.config.pan_limit >= 0.0);
	}

	#[test]
	fn stale_tokens_after_close_or_switch() {
		let mut ws = workspace();
		let token = ws.token();
		assert!(ws.is_current(&token));
		ws.close();
		assert!(!ws.is_current(&token));

		let token = ws.token();
		ws.switch_document("other", GraphData::default());
		assert!(!ws.is_current(&token));
	}

	#[test]
	fn failed_import_leaves_document_and_history_alone() {
		let mut ws = workspace();
		assert!(ws.import(r#"{ "nodes": [] }"#).is_err());
		assert_eq!(ws.history.undo_len(), 0);
	}
}
