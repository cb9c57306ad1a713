//! The authoritative in-memory copy of one open document.
//!
//! Every change to nodes and links goes through the methods here. Each one
//! applies optimistically, records a pending write for reconciliation and
//! queues a [`Mutation`] for the persistence layer.

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::error::GraphError;
use super::reconcile::{self, EntityKey, Field, PendingOps};
use super::types::{
	DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, GraphData, Link, LinkDraft, LinkId, Node, NodeContent,
	NodeDraft, NodeId, NodeStyle, StyleCoercion, StylePatch,
};

pub const MIN_NODE_WIDTH: f64 = 20.0;
pub const MIN_NODE_HEIGHT: f64 = 20.0;

/// Field-level changes to an existing node, as sent to the remote store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub x: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub y: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<NodeContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub style: Option<NodeStyle>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locked_by: Option<Option<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parent: Option<Option<NodeId>>,
}

impl NodePatch {
	/// Applies this patch to `node` in place.
	pub fn apply_to(&self, node: &mut Node) {
		if let Some(x) = self.x {
			node.x = x;
		}
		if let Some(y) = self.y {
			node.y = y;
		}
		if let Some(w) = self.width {
			node.width = w;
		}
		if let Some(h) = self.height {
			node.height = h;
		}
		if let Some(content) = &self.content {
			node.content = content.clone();
		}
		if let Some(style) = &self.style {
			node.style = style.clone();
		}
		if let Some(locked_by) = &self.locked_by {
			node.locked_by = locked_by.clone();
		}
		if let Some(parent) = &self.parent {
			node.parent = parent.clone();
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
	AddNode(Node),
	UpdateNode { id: NodeId, patch: NodePatch },
	DeleteNode(NodeId),
	AddLink(Link),
	DeleteLink(LinkId),
}

impl Mutation {
	pub fn key(&self) -> EntityKey {
		match self {
			Mutation::AddNode(node) => EntityKey::Node(node.id.clone()),
			Mutation::UpdateNode { id, .. } | Mutation::DeleteNode(id) => EntityKey::Node(id.clone()),
			Mutation::AddLink(link) => EntityKey::Link(link.id.clone()),
			Mutation::DeleteLink(id) => EntityKey::Link(id.clone()),
		}
	}
}

/// A mutation waiting to be persisted, with the version it was written at.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
	pub version: u64,
	pub mutation: Mutation,
}

/// Full copy of the document, used for undo/redo.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphSnapshot {
	pub nodes: IndexMap<NodeId, Node>,
	pub links: IndexMap<LinkId, Link>,
}

pub fn new_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, Default)]
pub struct GraphStore {
	nodes: IndexMap<NodeId, Node>,
	links: IndexMap<LinkId, Link>,
	pending: PendingOps,
	outbox: Vec<Outgoing>,
	version: u64,
}

impl GraphStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds a store with already-persisted content; nothing is queued.
	pub fn from_data(data: GraphData) -> Self {
		let mut store = Self::new();
		store.apply_remote_snapshot(data);
		store
	}

	pub fn nodes(&self) -> impl Iterator<Item = &Node> {
		self.nodes.values()
	}

	pub fn links(&self) -> impl Iterator<Item = &Link> {
		self.links.values()
	}

	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.get(id)
	}

	pub fn link(&self, id: &str) -> Option<&Link> {
		self.links.get(id)
	}

	pub fn contains_node(&self, id: &str) -> bool {
		self.nodes.contains_key(id)
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn link_count(&self) -> usize {
		self.links.len()
	}

	pub fn pending(&self) -> &PendingOps {
		&self.pending
	}

	pub fn to_data(&self) -> GraphData {
		GraphData {
			nodes: self.nodes.values().cloned().collect(),
			links: self.links.values().cloned().collect(),
		}
	}

	pub fn snapshot(&self) -> GraphSnapshot {
		GraphSnapshot {
			nodes: self.nodes.clone(),
			links: self.links.clone(),
		}
	}

	/// Mutations applied locally since the last drain, in write order.
	pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
		std::mem::take(&mut self.outbox)
	}

	pub fn has_outgoing(&self) -> bool {
		!self.outbox.is_empty()
	}

	/// The remote store accepted the write tagged `version` for `key`.
	pub fn acknowledge(&mut self, key: &EntityKey, version: u64) {
		if self.pending.acknowledge(key, version) {
			debug!("acknowledged {key:?} at v{version}");
		}
	}

	fn next_version(&mut self) -> u64 {
		self.version += 1;
		self.version
	}

	fn push(&mut self, version: u64, mutation: Mutation) {
		self.outbox.push(Outgoing { version, mutation });
	}

	fn node_mut(&mut self, id: &str) -> Result<&mut Node, GraphError> {
		match self.nodes.get_mut(id) {
			Some(node) => Ok(node),
			None => {
				warn!("ignoring update of unknown node {id}");
				Err(GraphError::UnknownNode(id.to_owned()))
			}
		}
	}

	fn update(&mut self, id: &str, field: Field, patch: NodePatch) -> Result<(), GraphError> {
		let node = self.node_mut(id)?;
		patch.apply_to(node);
		let version = self.next_version();
		self.pending.node_updated(id, field, version);
		self.push(
			version,
			Mutation::UpdateNode {
				id: id.to_owned(),
				patch,
			},
		);
		Ok(())
	}

	/// Replaces local state with the remote feed's view, keeping optimistic
	/// writes that have not been acknowledged yet.
	pub fn apply_remote_snapshot(&mut self, remote: GraphData) {
		let merged = reconcile::reconcile(&self.nodes, &self.links, &self.pending, remote);
		if !merged.dropped_links.is_empty() {
			warn!(
				"dropped {} remote link(s) with unresolved endpoints",
				merged.dropped_links.len()
			);
		}
		debug!(
			"remote snapshot merged: {} nodes, {} links",
			merged.nodes.len(),
			merged.links.len()
		);
		self.nodes = merged.nodes;
		self.links = merged.links;
		self.pending = merged.pending;
	}

	/// Inserts a node and returns the id it was stored under.
	pub fn add_node(&mut self, draft: NodeDraft) -> Result<NodeId, GraphError> {
		let id = match draft.id {
			Some(id) if self.nodes.contains_key(&id) => {
				warn!("refusing to add duplicate node {id}");
				return Err(GraphError::DuplicateNode(id));
			}
			Some(id) => id,
			None => new_id(),
		};
		if !(draft.x.is_finite() && draft.y.is_finite()) {
			warn!("refusing to add node {id} at a non-finite position");
			return Err(GraphError::InvalidGeometry(id));
		}
		let mut style = NodeStyle::default();
		style.apply(&draft.style);
		let parent = draft.parent.filter(|p| self.nodes.contains_key(p));
		let node = Node {
			id: id.clone(),
			x: draft.x,
			y: draft.y,
			width: draft.width.unwrap_or(DEFAULT_NODE_WIDTH).max(MIN_NODE_WIDTH),
			height: draft.height.unwrap_or(DEFAULT_NODE_HEIGHT).max(MIN_NODE_HEIGHT),
			content: draft.content,
			style,
			locked_by: None,
			typing: false,
			parent,
		};
		self.nodes.insert(id.clone(), node.clone());
		let version = self.next_version();
		self.pending.node_created(&id, version);
		self.push(version, Mutation::AddNode(node));
		Ok(id)
	}

	/// Inserts a link; both endpoints must already exist.
	pub fn add_link(&mut self, draft: LinkDraft) -> Result<LinkId, GraphError> {
		for endpoint in [&draft.source, &draft.target] {
			if !self.nodes.contains_key(endpoint) {
				warn!("refusing link to unresolved node {endpoint}");
				return Err(GraphError::UnresolvedEndpoint(endpoint.clone()));
			}
		}
		let id = match draft.id {
			Some(id) if self.links.contains_key(&id) => {
				return Err(GraphError::DuplicateLink(id));
			}
			Some(id) => id,
			None => new_id(),
		};
		let link = Link {
			id: id.clone(),
			source: draft.source,
			target: draft.target,
		};
		self.links.insert(id.clone(), link.clone());
		let version = self.next_version();
		self.pending.link_created(&id, version);
		self.push(version, Mutation::AddLink(link));
		Ok(id)
	}

	pub fn update_node_text(&mut self, id: &str, text: &str) -> Result<(), GraphError> {
		let node = self.node_mut(id)?;
		if node.content.as_text().is_none() {
			warn!("node {id} is an image, ignoring text update");
			return Err(GraphError::NotTextNode(id.to_owned()));
		}
		self.update(
			id,
			Field::Text,
			NodePatch {
				content: Some(NodeContent::text(text)),
				..NodePatch::default()
			},
		)
	}

	/// Merges a partial style. Unsupported font families are replaced by the
	/// default and reported in the returned list.
	pub fn update_node_style(
		&mut self,
		id: &str,
		patch: &StylePatch,
	) -> Result<Vec<StyleCoercion>, GraphError> {
		let node = self.node_mut(id)?;
		let mut style = node.style.clone();
		let coercions = style.apply(patch).into_iter().collect();
		self.update(
			id,
			Field::Style,
			NodePatch {
				style: Some(style),
				..NodePatch::default()
			},
		)?;
		Ok(coercions)
	}

	pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> Result<(), GraphError> {
		if !(x.is_finite() && y.is_finite()) {
			warn!("ignoring non-finite move of node {id}");
			return Err(GraphError::InvalidGeometry(id.to_owned()));
		}
		self.update(
			id,
			Field::Position,
			NodePatch {
				x: Some(x),
				y: Some(y),
				..NodePatch::default()
			},
		)
	}

	/// Resizes a node; dimensions below the minimum are raised to it.
	pub fn resize_node(&mut self, id: &str, width: f64, height: f64) -> Result<(), GraphError> {
		if !(width.is_finite() && height.is_finite()) {
			warn!("ignoring non-finite resize of node {id}");
			return Err(GraphError::InvalidGeometry(id.to_owned()));
		}
		self.update(
			id,
			Field::Size,
			NodePatch {
				width: Some(width.max(MIN_NODE_WIDTH)),
				height: Some(height.max(MIN_NODE_HEIGHT)),
				..NodePatch::default()
			},
		)
	}

	/// Removes a node and every link touching it. Returns the removed links.
	pub fn delete_node(&mut self, id: &str) -> Result<Vec<LinkId>, GraphError> {
		if self.nodes.shift_remove(id).is_none() {
			warn!("ignoring delete of unknown node {id}");
			return Err(GraphError::UnknownNode(id.to_owned()));
		}
		let incident: Vec<LinkId> = self
			.links
			.values()
			.filter(|l| l.source == id || l.target == id)
			.map(|l| l.id.clone())
			.collect();
		for link_id in &incident {
			self.remove_link(link_id);
		}
		let version = self.next_version();
		self.pending.node_deleted(id, version);
		self.push(version, Mutation::DeleteNode(id.to_owned()));
		Ok(incident)
	}

	pub fn delete_link(&mut self, id: &str) -> Result<(), GraphError> {
		if !self.links.contains_key(id) {
			warn!("ignoring delete of unknown link {id}");
			return Err(GraphError::UnknownLink(id.to_owned()));
		}
		self.remove_link(id);
		Ok(())
	}

	fn remove_link(&mut self, id: &str) {
		self.links.shift_remove(id);
		let version = self.next_version();
		self.pending.link_deleted(id, version);
		self.push(version, Mutation::DeleteLink(id.to_owned()));
	}

	/// Claims the advisory lock on a node. Re-locking by the holder is a no-op.
	pub fn lock(&mut self, id: &str, identity: &str) -> Result<(), GraphError> {
		let node = self.node_mut(id)?;
		match node.locked_by.as_deref() {
			Some(holder) if holder == identity => Ok(()),
			Some(holder) => {
				let holder = holder.to_owned();
				warn!("node {id} is locked by {holder}, denying {identity}");
				Err(GraphError::Locked {
					id: id.to_owned(),
					holder,
				})
			}
			None => self.update(
				id,
				Field::Lock,
				NodePatch {
					locked_by: Some(Some(identity.to_owned())),
					..NodePatch::default()
				},
			),
		}
	}

	/// Releases the lock if `identity` holds it. Returns whether it did.
	pub fn unlock(&mut self, id: &str, identity: &str) -> Result<bool, GraphError> {
		let node = self.node_mut(id)?;
		if node.locked_by.as_deref() != Some(identity) {
			return Ok(false);
		}
		self.update(
			id,
			Field::Lock,
			NodePatch {
				locked_by: Some(None),
				..NodePatch::default()
			},
		)?;
		Ok(true)
	}

	/// Points a node at its hierarchical parent. Only layout reads this.
	pub fn set_parent(&mut self, id: &str, parent: Option<NodeId>) -> Result<(), GraphError> {
		if let Some(p) = parent.as_deref() {
			if p == id || !self.nodes.contains_key(p) {
				warn!("ignoring parent {p} for node {id}");
				return Err(GraphError::UnknownNode(p.to_owned()));
			}
		}
		self.update(
			id,
			Field::Parent,
			NodePatch {
				parent: Some(parent),
				..NodePatch::default()
			},
		)
	}

	/// Sets the ephemeral typing flag. Not persisted and not undoable.
	pub fn set_typing(&mut self, id: &str, typing: bool) -> Result<(), GraphError> {
		self.node_mut(id)?.typing = typing;
		Ok(())
	}

	/// Brings the document back to `snapshot` through the regular mutation
	/// path, so the outbox carries exactly the difference to persist. Lock
	/// and typing state are collaborative and are left as they are now.
	/// Nodes currently locked by anyone but `identity` are not touched.
	pub fn restore(&mut self, snapshot: &GraphSnapshot, identity: &str) {
		let stale_links: Vec<LinkId> = self
			.links
			.keys()
			.filter(|id| !snapshot.links.contains_key(*id))
			.cloned()
			.collect();
		for id in stale_links {
			self.remove_link(&id);
		}
		let stale_nodes: Vec<NodeId> = self
			.nodes
			.values()
			.filter(|n| !snapshot.nodes.contains_key(&n.id) && !n.locked_by_other(identity))
			.map(|n| n.id.clone())
			.collect();
		for id in stale_nodes {
			let _ = self.delete_node(&id);
		}

		for (id, saved) in &snapshot.nodes {
			let Some(current) = self.nodes.get(id) else {
				let mut node = saved.clone();
				node.locked_by = None;
				node.typing = false;
				self.nodes.insert(id.clone(), node.clone());
				let version = self.next_version();
				self.pending.node_created(id, version);
				self.push(version, Mutation::AddNode(node));
				continue;
			};
			if current.locked_by_other(identity) {
				debug!("undo leaves {id} alone: locked by another editor");
				continue;
			}
			let mut changes = Vec::new();
			if (current.x, current.y) != (saved.x, saved.y) {
				changes.push((
					Field::Position,
					NodePatch {
						x: Some(saved.x),
						y: Some(saved.y),
						..NodePatch::default()
					},
				));
			}
			if (current.width, current.height) != (saved.width, saved.height) {
				changes.push((
					Field::Size,
					NodePatch {
						width: Some(saved.width),
						height: Some(saved.height),
						..NodePatch::default()
					},
				));
			}
			if current.content != saved.content {
				changes.push((
					Field::Text,
					NodePatch {
						content: Some(saved.content.clone()),
						..NodePatch::default()
					},
				));
			}
			if current.style != saved.style {
				changes.push((
					Field::Style,
					NodePatch {
						style: Some(saved.style.clone()),
						..NodePatch::default()
					},
				));
			}
			if current.parent != saved.parent {
				changes.push((
					Field::Parent,
					NodePatch {
						parent: Some(saved.parent.clone()),
						..NodePatch::default()
					},
				));
			}
			for (field, patch) in changes {
				let _ = self.update(id, field, patch);
			}
		}

		for (id, saved) in &snapshot.links {
			if self.links.contains_key(id) {
				continue;
			}
			if self.nodes.contains_key(&saved.source) && self.nodes.contains_key(&saved.target) {
				self.links.insert(id.clone(), saved.clone());
				let version = self.next_version();
				self.pending.link_created(id, version);
				self.push(version, Mutation::AddLink(saved.clone()));
			}
		}

		// Keep the snapshot's ordering so redraw order is stable across undo.
		let order: Vec<NodeId> = snapshot.nodes.keys().cloned().collect();
		self.nodes.sort_by_cached_key(|id, _| order.iter().position(|o| o == id));
	}
}
