//! Merging remote snapshots with optimistic local writes.
//!
//! Policy, applied per entity:
//!
//! * Without a pending local write the remote copy wins outright; entities
//!   the feed no longer reports are dropped.
//! * A node with pending field writes takes the remote copy and then
//!   re-applies the locally written fields (position, size, text, style,
//!   lock) on top. Local values win field by field until the write that
//!   produced them is acknowledged.
//! * Locally created entities the feed does not report yet are kept. Once
//!   the feed reports them the creation counts as acknowledged.
//! * Locally deleted entities stay deleted even if the feed still reports
//!   them, until the delete itself is acknowledged.
//! * Links are only kept when both endpoints survive the merge.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use super::types::{GraphData, Link, LinkId, Node, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
	Position,
	Size,
	Text,
	Style,
	Lock,
	Parent,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKey {
	Node(NodeId),
	Link(LinkId),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingNode {
	pub created: bool,
	pub deleted: bool,
	pub fields: BTreeSet<Field>,
	pub version: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingLink {
	Created(u64),
	Deleted(u64),
}

impl PendingLink {
	fn version(self) -> u64 {
		match self {
			PendingLink::Created(v) | PendingLink::Deleted(v) => v,
		}
	}
}

/// Local writes not yet acknowledged by the remote store, tagged with the
/// version of the most recent write to each entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingOps {
	nodes: HashMap<NodeId, PendingNode>,
	links: HashMap<LinkId, PendingLink>,
}

impl PendingOps {
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty() && self.links.is_empty()
	}

	pub fn node(&self, id: &str) -> Option<&PendingNode> {
		self.nodes.get(id)
	}

	pub fn link(&self, id: &str) -> Option<PendingLink> {
		self.links.get(id).copied()
	}

	pub fn node_created(&mut self, id: &str, version: u64) {
		let entry = self.nodes.entry(id.to_owned()).or_default();
		entry.created = true;
		entry.deleted = false;
		entry.version = version;
	}

	pub fn node_updated(&mut self, id: &str, field: Field, version: u64) {
		let entry = self.nodes.entry(id.to_owned()).or_default();
		entry.fields.insert(field);
		entry.version = version;
	}

	pub fn node_deleted(&mut self, id: &str, version: u64) {
		let entry = self.nodes.entry(id.to_owned()).or_default();
		entry.deleted = true;
		entry.fields.clear();
		entry.version = version;
	}

	pub fn link_created(&mut self, id: &str, version: u64) {
		self.links.insert(id.to_owned(), PendingLink::Created(version));
	}

	pub fn link_deleted(&mut self, id: &str, version: u64) {
		self.links.insert(id.to_owned(), PendingLink::Deleted(version));
	}

	/// Clears the entry for `key` unless a newer write superseded `version`.
	pub fn acknowledge(&mut self, key: &EntityKey, version: u64) -> bool {
		match key {
			EntityKey::Node(id) => {
				if self.nodes.get(id).is_some_and(|p| p.version <= version) {
					self.nodes.remove(id);
					return true;
				}
			}
			EntityKey::Link(id) => {
				if self.links.get(id).is_some_and(|p| p.version() <= version) {
					self.links.remove(id);
					return true;
				}
			}
		}
		false
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
	pub nodes: IndexMap<NodeId, Node>,
	pub links: IndexMap<LinkId, Link>,
	pub pending: PendingOps,
	/// Remote links dropped because an endpoint did not survive the merge.
	pub dropped_links: Vec<LinkId>,
}

fn overlay(remote: &mut Node, local: &Node, fields: &BTreeSet<Field>) {
	for field in fields {
		match field {
			Field::Position => {
				remote.x = local.x;
				remote.y = local.y;
			}
			Field::Size => {
				remote.width = local.width;
				remote.height = local.height;
			}
			Field::Text => remote.content = local.content.clone(),
			Field::Style => remote.style = local.style.clone(),
			Field::Lock => remote.locked_by = local.locked_by.clone(),
			Field::Parent => remote.parent = local.parent.clone(),
		}
	}
}

/// Pure merge of the local state and its pending writes with a remote
/// snapshot. Remote order is kept; surviving local-only creations follow.
pub fn reconcile(
	local_nodes: &IndexMap<NodeId, Node>,
	local_links: &IndexMap<LinkId, Link>,
	pending: &PendingOps,
	remote: GraphData,
) -> Reconciled {
	let mut next_pending = pending.clone();
	let mut nodes = IndexMap::with_capacity(remote.nodes.len());

	for mut node in remote.nodes {
		match pending.node(&node.id) {
			None => {}
			Some(p) if p.deleted => continue,
			Some(p) => {
				if let Some(local) = local_nodes.get(&node.id) {
					overlay(&mut node, local, &p.fields);
				}
				if p.created {
					if let Some(entry) = next_pending.nodes.get_mut(&node.id) {
						entry.created = false;
						if entry.fields.is_empty() {
							next_pending.nodes.remove(&node.id);
						}
					}
				}
			}
		}
		nodes.insert(node.id.clone(), node);
	}

	for (id, node) in local_nodes {
		if nodes.contains_key(id) {
			continue;
		}
		match pending.node(id) {
			Some(p) if p.created && !p.deleted => {
				nodes.insert(id.clone(), node.clone());
			}
			Some(p) if !p.deleted => {
				// Deleted remotely while we had edits in flight.
				next_pending.nodes.remove(id);
			}
			_ => {}
		}
	}

	let mut links = IndexMap::with_capacity(remote.links.len());
	let mut dropped_links = Vec::new();
	for link in remote.links {
		match pending.link(&link.id) {
			Some(PendingLink::Deleted(_)) => continue,
			Some(PendingLink::Created(_)) => {
				next_pending.links.remove(&link.id);
			}
			None => {}
		}
		if nodes.contains_key(&link.source) && nodes.contains_key(&link.target) {
			links.insert(link.id.clone(), link);
		} else {
			dropped_links.push(link.id);
		}
	}
	for (id, link) in local_links {
		if links.contains_key(id) {
			continue;
		}
		if matches!(pending.link(id), Some(PendingLink::Created(_)))
			&& nodes.contains_key(&link.source)
			&& nodes.contains_key(&link.target)
		{
			links.insert(id.clone(), link.clone());
		}
	}

	Reconciled {
		nodes,
		links,
		pending: next_pending,
		dropped_links,
	}
}
