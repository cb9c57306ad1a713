//! Advisory edit locks and typing indicators.
//!
//! Locks live on the node (`lockedBy`) and travel with the document feed, so
//! they are only as fresh as the last snapshot. Two clients that both miss
//! each other's lock write can both enter edit mode; the later text write
//! wins. That weak guarantee is accepted: there is no server-side
//! arbitration to fall back on.
//!
//! Typing indicators are ephemeral. They go over their own channel, are
//! throttled, may be dropped, and never enter undo history or the outbox.

use std::collections::HashMap;

use futures::channel::mpsc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::graph::{GraphError, GraphStore, NodeId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome {
	Acquired,
	Denied { holder: String },
}

/// Tries to claim `id` for `identity`. A lock held by someone else is a
/// denial, not an error.
pub fn acquire(store: &mut GraphStore, id: &str, identity: &str) -> Result<LockOutcome, GraphError> {
	match store.lock(id, identity) {
		Ok(()) => Ok(LockOutcome::Acquired),
		Err(GraphError::Locked { holder, .. }) => Ok(LockOutcome::Denied { holder }),
		Err(err) => Err(err),
	}
}

pub fn release(store: &mut GraphStore, id: &str, identity: &str) {
	if let Err(err) = store.unlock(id, identity) {
		debug!("release of {id} skipped: {err}");
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
	pub node_id: NodeId,
	pub identity: String,
	pub typing: bool,
}

/// Applies a typing signal from the presence channel. Our own echoes are
/// ignored.
pub fn apply_typing(store: &mut GraphStore, signal: &TypingSignal, self_identity: &str) {
	if signal.identity == self_identity {
		return;
	}
	if store.set_typing(&signal.node_id, signal.typing).is_err() {
		debug!("typing signal for unknown node {}", signal.node_id);
	}
}

/// Rate limit per node: at most one "typing" signal per interval.
#[derive(Clone, Debug, Default)]
pub struct TypingThrottle {
	interval_ms: f64,
	last_sent: HashMap<NodeId, f64>,
}

impl TypingThrottle {
	pub fn new(interval_ms: f64) -> Self {
		Self {
			interval_ms,
			last_sent: HashMap::new(),
		}
	}

	pub fn should_send(&mut self, id: &str, now_ms: f64) -> bool {
		match self.last_sent.get(id) {
			Some(&last) if now_ms - last < self.interval_ms => false,
			_ => {
				self.last_sent.insert(id.to_owned(), now_ms);
				true
			}
		}
	}

	pub fn reset(&mut self, id: &str) {
		self.last_sent.remove(id);
	}
}

/// Sending half of the presence channel.
#[derive(Clone, Debug)]
pub struct Presence {
	identity: String,
	tx: mpsc::UnboundedSender<TypingSignal>,
	throttle: TypingThrottle,
}

impl Presence {
	pub fn channel(identity: impl Into<String>, throttle_ms: f64) -> (Self, mpsc::UnboundedReceiver<TypingSignal>) {
		let (tx, rx) = mpsc::unbounded();
		(
			Self {
				identity: identity.into(),
				tx,
				throttle: TypingThrottle::new(throttle_ms),
			},
			rx,
		)
	}

	pub fn identity(&self) -> &str {
		&self.identity
	}

	fn send(&self, node_id: &str, typing: bool) {
		let signal = TypingSignal {
			node_id: node_id.to_owned(),
			identity: self.identity.clone(),
			typing,
		};
		// Best effort: a closed channel just means nobody is listening.
		if self.tx.unbounded_send(signal).is_err() {
			warn!("presence channel closed, dropping typing signal");
		}
	}

	/// Throttled "still typing" ping.
	pub fn typing(&mut self, node_id: &str, now_ms: f64) {
		if self.throttle.should_send(node_id, now_ms) {
			self.send(node_id, true);
		}
	}

	/// Always sent so indicators do not linger.
	pub fn stopped(&mut self, node_id: &str) {
		self.throttle.reset(node_id);
		self.send(node_id, false);
	}
}
