//! Remote persistence: the subscription feed, pushing queued mutations and
//! the dashboard's document index.
//!
//! Snapshots arrive as [`FeedEvent`]s over a channel and are handed to
//! [`GraphStore::apply_remote_snapshot`]; the transport never touches the
//! store directly. Writes are drained from the store's outbox, pushed, and
//! acknowledged back by version. A failed write keeps the local state and
//! is reported; it is not retried.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::mpsc;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::editor::Workspace;
use crate::graph::{EntityKey, GraphData, Link, LinkId, Mutation, Node, NodeId, NodePatch, Outgoing};

/// Identifies the editor session an async operation was started from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionToken {
	pub document_id: String,
	pub generation: u64,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RemoteError {
	#[error("network error: {0}")]
	Network(String),

	#[error("permission denied: {0}")]
	Permission(String),

	#[error("{0} not found")]
	NotFound(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
	Snapshot { document_id: String, data: GraphData },
	Error { document_id: String, error: RemoteError },
}

/// The persistence backend. Calls may fail and may complete out of order.
#[async_trait(?Send)]
pub trait RemoteStore {
	async fn add_node(&self, document_id: &str, node: &Node) -> Result<(), RemoteError>;
	async fn update_node(&self, document_id: &str, id: &str, patch: &NodePatch) -> Result<(), RemoteError>;
	async fn delete_node(&self, document_id: &str, id: &str) -> Result<(), RemoteError>;
	async fn add_link(&self, document_id: &str, link: &Link) -> Result<(), RemoteError>;
	async fn delete_link(&self, document_id: &str, id: &str) -> Result<(), RemoteError>;

	/// Stream of snapshots for `document_id`, starting with the current one.
	fn subscribe(&self, document_id: &str) -> mpsc::UnboundedReceiver<FeedEvent>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PushReport {
	pub acked: Vec<(EntityKey, u64)>,
	pub failed: Vec<(EntityKey, RemoteError)>,
}

/// Sends queued mutations in order. Each one is attempted even if an
/// earlier one failed.
pub async fn push(remote: &dyn RemoteStore, document_id: &str, batch: Vec<Outgoing>) -> PushReport {
	let mut report = PushReport::default();
	for Outgoing { version, mutation } in batch {
		let key = mutation.key();
		let result = match &mutation {
			Mutation::AddNode(node) => remote.add_node(document_id, node).await,
			Mutation::UpdateNode { id, patch } => remote.update_node(document_id, id, patch).await,
			Mutation::DeleteNode(id) => remote.delete_node(document_id, id).await,
			Mutation::AddLink(link) => remote.add_link(document_id, link).await,
			Mutation::DeleteLink(id) => remote.delete_link(document_id, id).await,
		};
		match result {
			Ok(()) => report.acked.push((key, version)),
			Err(err) => {
				warn!("persisting {key:?} failed: {err}");
				report.failed.push((key, err));
			}
		}
	}
	report
}

/// Applies a push report if the session is still the one that pushed.
/// Returns a user-facing message when anything failed.
pub fn apply_push_report(ws: &mut Workspace, token: &SessionToken, report: PushReport) -> Option<String> {
	if !ws.is_current(token) {
		debug!("discarding push report for stale session");
		return None;
	}
	for (key, version) in &report.acked {
		ws.store.acknowledge(key, *version);
	}
	match report.failed.first() {
		None => None,
		Some((_, err)) => Some(format!(
			"{} change(s) could not be saved: {err}",
			report.failed.len()
		)),
	}
}

/// Drains the outbox, pushes it and folds the result back in. The
/// workspace is not borrowed across the await.
pub async fn flush(ws: &RefCell<Workspace>, remote: &dyn RemoteStore) -> Option<String> {
	let (token, batch) = {
		let mut ws = ws.borrow_mut();
		(ws.token(), ws.store.drain_outbox())
	};
	if batch.is_empty() {
		return None;
	}
	let report = push(remote, &token.document_id, batch).await;
	apply_push_report(&mut ws.borrow_mut(), &token, report)
}

/// Routes one feed event into the workspace. Events for another document
/// or session are dropped.
pub fn apply_feed_event(ws: &mut Workspace, token: &SessionToken, event: FeedEvent) -> Option<String> {
	if !ws.is_current(token) {
		return None;
	}
	match event {
		FeedEvent::Snapshot { document_id, data } if document_id == ws.document_id => {
			ws.store.apply_remote_snapshot(data);
			None
		}
		FeedEvent::Error { document_id, error } if document_id == ws.document_id => {
			warn!("document feed error: {error}");
			Some(format!("Sync problem: {error}"))
		}
		_ => None,
	}
}

#[derive(Debug, Default)]
struct MemoryDocument {
	nodes: IndexMap<NodeId, Node>,
	links: IndexMap<LinkId, Link>,
}

#[derive(Debug, Default)]
struct MemoryState {
	documents: HashMap<String, MemoryDocument>,
	subscribers: HashMap<String, Vec<mpsc::UnboundedSender<FeedEvent>>>,
	read_only: bool,
}

/// In-process backend: keeps documents in memory and broadcasts a snapshot
/// to every subscriber after each accepted write.
#[derive(Clone, Debug, Default)]
pub struct MemoryRemote {
	state: Rc<RefCell<MemoryState>>,
}

impl MemoryRemote {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_document(document_id: &str, data: GraphData) -> Self {
		let remote = Self::new();
		{
			let mut state = remote.state.borrow_mut();
			let doc = state.documents.entry(document_id.to_owned()).or_default();
			doc.nodes = data.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
			doc.links = data.links.into_iter().map(|l| (l.id.clone(), l)).collect();
		}
		remote
	}

	/// Makes every write fail with a permission error.
	pub fn set_read_only(&self, read_only: bool) {
		self.state.borrow_mut().read_only = read_only;
	}

	pub fn data(&self, document_id: &str) -> GraphData {
		let state = self.state.borrow();
		state
			.documents
			.get(document_id)
			.map(|doc| GraphData {
				nodes: doc.nodes.values().cloned().collect(),
				links: doc.links.values().cloned().collect(),
			})
			.unwrap_or_default()
	}

	fn broadcast(&self, document_id: &str) {
		let data = self.data(document_id);
		let mut state = self.state.borrow_mut();
		if let Some(subs) = state.subscribers.get_mut(document_id) {
			subs.retain(|tx| {
				tx.unbounded_send(FeedEvent::Snapshot {
					document_id: document_id.to_owned(),
					data: data.clone(),
				})
				.is_ok()
			});
		}
	}

	fn write<T>(
		&self,
		document_id: &str,
		f: impl FnOnce(&mut MemoryDocument) -> Result<T, RemoteError>,
	) -> Result<T, RemoteError> {
		let result = {
			let mut state = self.state.borrow_mut();
			if state.read_only {
				return Err(RemoteError::Permission(format!("document {document_id} is read-only")));
			}
			f(state.documents.entry(document_id.to_owned()).or_default())
		};
		if result.is_ok() {
			self.broadcast(document_id);
		}
		result
	}
}

#[async_trait(?Send)]
impl RemoteStore for MemoryRemote {
	async fn add_node(&self, document_id: &str, node: &Node) -> Result<(), RemoteError> {
		self.write(document_id, |doc| {
			doc.nodes.insert(node.id.clone(), node.clone());
			Ok(())
		})
	}

	async fn update_node(&self, document_id: &str, id: &str, patch: &NodePatch) -> Result<(), RemoteError> {
		self.write(document_id, |doc| {
			let node = doc
				.nodes
				.get_mut(id)
				.ok_or_else(|| RemoteError::NotFound(format!("node {id}")))?;
			patch.apply_to(node);
			Ok(())
		})
	}

	async fn delete_node(&self, document_id: &str, id: &str) -> Result<(), RemoteError> {
		self.write(document_id, |doc| {
			doc.nodes.shift_remove(id);
			doc.links.retain(|_, l| l.source != id && l.target != id);
			Ok(())
		})
	}

	async fn add_link(&self, document_id: &str, link: &Link) -> Result<(), RemoteError> {
		self.write(document_id, |doc| {
			doc.links.insert(link.id.clone(), link.clone());
			Ok(())
		})
	}

	async fn delete_link(&self, document_id: &str, id: &str) -> Result<(), RemoteError> {
		self.write(document_id, |doc| {
			doc.links.shift_remove(id);
			Ok(())
		})
	}

	fn subscribe(&self, document_id: &str) -> mpsc::UnboundedReceiver<FeedEvent> {
		let (tx, rx) = mpsc::unbounded();
		let initial = FeedEvent::Snapshot {
			document_id: document_id.to_owned(),
			data: self.data(document_id),
		};
		if tx.unbounded_send(initial).is_ok() {
			self.state
				.borrow_mut()
				.subscribers
				.entry(document_id.to_owned())
				.or_default()
				.push(tx);
		}
		rx
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListSource {
	Owned,
	Shared,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
	pub id: String,
	pub title: String,
	pub owner: String,
	pub updated_at: i64,
}

/// Dashboard list fed by two independent subscriptions (documents the user
/// owns and documents shared with them). A document in both lists shows
/// the copy from whichever feed delivered it last.
#[derive(Clone, Debug, Default)]
pub struct DocumentIndex {
	owned: IndexMap<String, DocumentSummary>,
	shared: IndexMap<String, DocumentSummary>,
	last_seen_in: HashMap<String, ListSource>,
}

impl DocumentIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces one feed's list wholesale.
	pub fn apply(&mut self, source: ListSource, documents: Vec<DocumentSummary>) {
		let list: IndexMap<String, DocumentSummary> = documents.into_iter().map(|d| (d.id.clone(), d)).collect();
		for id in list.keys() {
			self.last_seen_in.insert(id.clone(), source);
		}
		match source {
			ListSource::Owned => self.owned = list,
			ListSource::Shared => self.shared = list,
		}
		let (owned, shared) = (&self.owned, &self.shared);
		self.last_seen_in
			.retain(|id, _| owned.contains_key(id) || shared.contains_key(id));
	}

	/// Owned documents first, then shared ones not already listed.
	pub fn documents(&self) -> Vec<&DocumentSummary> {
		let mut out: Vec<&DocumentSummary> = self
			.owned
			.iter()
			.map(|(id, owned)| match self.last_seen_in.get(id) {
				Some(ListSource::Shared) => self.shared.get(id).unwrap_or(owned),
				_ => owned,
			})
			.collect();
		out.extend(
			self.shared
				.iter()
				.filter(|(id, _)| !self.owned.contains_key(*id))
				.map(|(_, d)| d),
		);
		out
	}

	pub fn len(&self) -> usize {
		self.owned.len() + self.shared.keys().filter(|id| !self.owned.contains_key(*id)).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use futures::StreamExt;
	use futures::executor::block_on;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::config::EditorConfig;
	use crate::graph::NodeDraft;

	fn summary(id: &str, title: &str) -> DocumentSummary {
		DocumentSummary {
			id: id.into(),
			title: title.into(),
			owner: "alice".into(),
			updated_at: 0,
		}
	}

	#[test]
	fn flush_pushes_and_acknowledges() {
		let remote = MemoryRemote::new();
		let ws = RefCell::new(Workspace::new("doc", "alice", EditorConfig::default()));
		let id = ws.borrow_mut().store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();

		let message = block_on(flush(&ws, &remote));
		assert_eq!(message, None);
		assert!(ws.borrow().store.pending().is_empty());
		assert_eq!(remote.data("doc").nodes.len(), 1);
		assert_eq!(remote.data("doc").nodes[0].id, id);
	}

	#[test]
	fn failed_writes_keep_local_state_and_report() {
		let remote = MemoryRemote::new();
		remote.set_read_only(true);
		let ws = RefCell::new(Workspace::new("doc", "alice", EditorConfig::default()));
		let id = ws.borrow_mut().store.add_node(NodeDraft::text(0.0, 0.0, "a")).unwrap();

		let message = block_on(flush(&ws, &remote));
		assert!(message.unwrap().contains("could not be saved"));
		assert!(ws.borrow().store.contains_node(&id));
		assert!(ws.borrow().store.pending().node(&id).is_some());

		// A snapshot without the node must not wipe the optimistic copy.
		let token = ws.borrow().token();
		apply_feed_event(
			&mut ws.borrow_mut(),
			&token,
			FeedEvent::Snapshot {
				document_id: "doc".into(),
				data: GraphData::default(),
			},
		);
		assert!(ws.borrow().store.contains_node(&id));
	}

	#[test]
	fn subscribers_see_other_clients_writes() {
		let remote = MemoryRemote::new();
		let mut feed = remote.subscribe("doc");
		let mut alice = Workspace::new("doc", "alice", EditorConfig::default());
		let token = alice.token();
		// initial empty snapshot
		let first = block_on(feed.next()).unwrap();
		apply_feed_event(&mut alice, &token, first);

		let bob = RefCell::new(Workspace::new("doc", "bob", EditorConfig::default()));
		let id = bob.borrow_mut().store.add_node(NodeDraft::text(5.0, 5.0, "from bob")).unwrap();
		block_on(flush(&bob, &remote));

		let event = block_on(feed.next()).unwrap();
		apply_feed_event(&mut alice, &token, event);
		assert_eq!(alice.store.node(&id).unwrap().content.as_text(), Some("from bob"));
	}

	#[test]
	fn stale_results_are_ignored() {
		let ws = RefCell::new(Workspace::new("doc", "alice", EditorConfig::default()));
		let token = ws.borrow().token();
		ws.borrow_mut().close();

		let applied = apply_feed_event(
			&mut ws.borrow_mut(),
			&token,
			FeedEvent::Snapshot {
				document_id: "doc".into(),
				data: GraphData {
					nodes: vec![Node::text("x", 0.0, 0.0, "")],
					links: vec![],
				},
			},
		);
		assert_eq!(applied, None);
		assert_eq!(ws.borrow().store.node_count(), 0);

		let report = PushReport {
			acked: vec![],
			failed: vec![(EntityKey::Node("x".into()), RemoteError::Network("offline".into()))],
		};
		assert_eq!(apply_push_report(&mut ws.borrow_mut(), &token, report), None);
	}

	#[test]
	fn document_index_merges_feeds() {
		let mut index = DocumentIndex::new();
		index.apply(ListSource::Owned, vec![summary("a", "Mine"), summary("b", "Both (owned)")]);
		index.apply(ListSource::Shared, vec![summary("b", "Both (shared)"), summary("c", "Theirs")]);

		let titles: Vec<&str> = index.documents().iter().map(|d| d.title.as_str()).collect();
		// b was last delivered by the shared feed
		assert_eq!(titles, vec!["Mine", "Both (shared)", "Theirs"]);
		assert_eq!(index.len(), 3);

		index.apply(ListSource::Owned, vec![summary("a", "Mine"), summary("b", "Both (renamed)")]);
		let titles: Vec<&str> = index.documents().iter().map(|d| d.title.as_str()).collect();
		assert_eq!(titles, vec!["Mine", "Both (renamed)", "Theirs"]);

		index.apply(ListSource::Owned, vec![]);
		let titles: Vec<&str> = index.documents().iter().map(|d| d.title.as_str()).collect();
		assert_eq!(titles, vec!["Both (shared)", "Theirs"]);
	}
}
