//! Pointer and keyboard input turned into store mutations.
//!
//! A gesture runs `Idle -> DraggingNodes | Resizing | Panning -> Idle`.
//! Drags and resizes are visual until release; the release commits final
//! geometry behind a single undo snapshot. Linking is a mode rather than a
//! gesture: the first clicked node becomes the source and the second click
//! creates the link.

use log::{debug, warn};

use super::session::{Gesture, Mode, SessionState, TextEdit};
use super::workspace::Workspace;
use crate::collab::{self, LockOutcome, Presence};
use crate::graph::{GraphError, LinkDraft, LinkId, Node, NodeDraft, NodeId, Point};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerInput {
	/// Screen coordinates relative to the canvas element.
	pub position: Point,
	pub shift: bool,
}

impl PointerInput {
	pub fn at(x: f64, y: f64) -> Self {
		Self {
			position: Point::new(x, y),
			shift: false,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyInput {
	pub key: String,
	pub ctrl: bool,
	pub shift: bool,
}

impl KeyInput {
	pub fn plain(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			..Self::default()
		}
	}

	pub fn ctrl(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			ctrl: true,
			shift: false,
		}
	}
}

enum Hit<'a> {
	ResizeHandle(&'a Node),
	Body(&'a Node),
}

/// Topmost node under `p` (canvas space). Later nodes draw on top.
fn hit_test<'a>(ws: &'a Workspace, p: Point) -> Option<Hit<'a>> {
	let handle = ws.config.resize_handle;
	let nodes: Vec<&Node> = ws.store.nodes().collect();
	nodes.into_iter().rev().find_map(|node| {
		if !node.contains(p) {
			return None;
		}
		let in_handle = p.x >= node.x + node.width - handle && p.y >= node.y + node.height - handle;
		Some(if in_handle {
			Hit::ResizeHandle(node)
		} else {
			Hit::Body(node)
		})
	})
}

pub fn node_at(ws: &Workspace, session: &SessionState, screen: Point) -> Option<NodeId> {
	let p = session.transform.screen_to_canvas(screen);
	hit_test(ws, p).map(|hit| match hit {
		Hit::ResizeHandle(node) | Hit::Body(node) => node.id.clone(),
	})
}

pub fn pointer_down(ws: &mut Workspace, session: &mut SessionState, presence: Option<&mut Presence>, input: PointerInput) {
	let p = session.transform.screen_to_canvas(input.position);
	let hit = hit_test(ws, p).map(|hit| match hit {
		Hit::ResizeHandle(node) => (node.id.clone(), true),
		Hit::Body(node) => (node.id.clone(), false),
	});

	// Clicking anywhere but the node being edited counts as blur.
	if let Some(edit) = &session.editing {
		if hit.as_ref().map(|(id, _)| id) != Some(&edit.node_id) {
			commit_edit(ws, session, presence);
		}
	}

	if let Mode::Linking { source } = &session.mode {
		if let Some((target, _)) = hit {
			match source.clone() {
				None => {
					session.mode = Mode::Linking {
						source: Some(target),
					};
				}
				Some(source) if source != target => {
					let _ = link_nodes(ws, session, &source, &target);
				}
				Some(_) => {}
			}
			return;
		}
	}

	match hit {
		Some((id, true)) => {
			let Some(node) = ws.store.node(&id) else { return };
			if node.locked_by_other(&ws.identity) {
				session.notice = Some(locked_message(node));
				return;
			}
			session.gesture = Gesture::Resizing {
				origin: input.position,
				start: (node.width, node.height),
				size: (node.width, node.height),
				id,
			};
		}
		Some((id, false)) => {
			if input.shift {
				if !session.selection.remove(&id) {
					session.selection.insert(id);
				}
				return;
			}
			if !session.selection.contains(&id) {
				session.selection.clear();
				session.selection.insert(id.clone());
			}
			let ids: Vec<NodeId> = ws
				.store
				.nodes()
				.filter(|n| session.selection.contains(&n.id) && !n.locked_by_other(&ws.identity))
				.map(|n| n.id.clone())
				.collect();
			if ids.is_empty() {
				if let Some(node) = ws.store.node(&id) {
					session.notice = Some(locked_message(node));
				}
				return;
			}
			session.gesture = Gesture::DraggingNodes {
				origin: input.position,
				ids,
				delta: Point::default(),
			};
		}
		None => {
			if !input.shift {
				session.selection.clear();
			}
			session.gesture = Gesture::Panning {
				origin: input.position,
				pan_start: session.transform.pan,
			};
		}
	}
}

pub fn pointer_move(ws: &Workspace, session: &mut SessionState, input: PointerInput) {
	if session.gesture == Gesture::Idle {
		session.hover = node_at(ws, session, input.position);
		return;
	}
	let zoom = session.transform.zoom;
	match &mut session.gesture {
		Gesture::Idle => {}
		Gesture::DraggingNodes { origin, delta, .. } => {
			*delta = Point::new(
				(input.position.x - origin.x) / zoom,
				(input.position.y - origin.y) / zoom,
			);
		}
		Gesture::Resizing {
			origin, start, size, ..
		} => {
			*size = (
				start.0 + (input.position.x - origin.x) / zoom,
				start.1 + (input.position.y - origin.y) / zoom,
			);
		}
		Gesture::Panning { origin, pan_start } => {
			let pan = Point::new(
				pan_start.x + input.position.x - origin.x,
				pan_start.y + input.position.y - origin.y,
			);
			session.transform.set_pan(pan, &ws.config);
		}
	}
}

/// Ends the current gesture, committing any geometry change.
pub fn pointer_up(ws: &mut Workspace, session: &mut SessionState) {
	match std::mem::take(&mut session.gesture) {
		Gesture::DraggingNodes { ids, delta, .. } if delta != Point::default() => {
			let targets: Vec<(NodeId, Point)> = ids
				.into_iter()
				.filter_map(|id| {
					let node = ws.store.node(&id)?;
					if node.locked_by_other(&ws.identity) {
						warn!("node {id} was locked by another editor during the drag");
						return None;
					}
					let p = node.position();
					Some((id, p))
				})
				.collect();
			if targets.is_empty() {
				return;
			}
			ws.history.snapshot(&ws.store);
			for (id, p) in targets {
				if let Err(err) = ws.store.move_node(&id, p.x + delta.x, p.y + delta.y) {
					warn!("drag commit for {id} failed: {err}");
				}
			}
			debug!("drag committed ({}, {})", delta.x, delta.y);
		}
		Gesture::Resizing { id, start, size, .. } if start != size => {
			if ws.store.node(&id).is_some_and(|n| n.locked_by_other(&ws.identity)) {
				warn!("node {id} was locked by another editor during the resize");
				return;
			}
			ws.history.snapshot(&ws.store);
			if let Err(err) = ws.store.resize_node(&id, size.0, size.1) {
				warn!("resize commit for {id} failed: {err}");
			}
		}
		_ => {}
	}
}

pub fn wheel(ws: &Workspace, session: &mut SessionState, anchor: Point, delta_y: f64) {
	let factor = if delta_y > 0.0 {
		1.0 / ws.config.wheel_zoom_factor
	} else {
		ws.config.wheel_zoom_factor
	};
	session.transform.zoom_at(anchor, factor, &ws.config);
}

pub fn double_click(
	ws: &mut Workspace,
	session: &mut SessionState,
	presence: Option<&mut Presence>,
	input: PointerInput,
) -> Option<LockOutcome> {
	let id = node_at(ws, session, input.position)?;
	begin_edit(ws, session, presence, &id).ok()
}

fn locked_message(node: &Node) -> String {
	format!("Locked by {}", node.locked_by.as_deref().unwrap_or("another editor"))
}

/// Enters text editing for `id`, claiming its lock first.
pub fn begin_edit(
	ws: &mut Workspace,
	session: &mut SessionState,
	presence: Option<&mut Presence>,
	id: &str,
) -> Result<LockOutcome, GraphError> {
	if session.editing.as_ref().is_some_and(|e| e.node_id == id) {
		return Ok(LockOutcome::Acquired);
	}
	if session.editing.is_some() {
		commit_edit(ws, session, presence);
	}
	let text = match ws.store.node(id) {
		Some(node) => node.content.as_text().map(str::to_owned),
		None => return Err(GraphError::UnknownNode(id.to_owned())),
	};
	let Some(text) = text else {
		return Err(GraphError::NotTextNode(id.to_owned()));
	};
	let outcome = collab::acquire(&mut ws.store, id, &ws.identity)?;
	match &outcome {
		LockOutcome::Acquired => {
			session.editing = Some(TextEdit {
				node_id: id.to_owned(),
				draft: text,
			});
			session.notice = None;
		}
		LockOutcome::Denied { holder } => {
			session.notice = Some(format!("Locked by {holder}"));
		}
	}
	Ok(outcome)
}

/// Replaces the draft and pings the typing indicator.
pub fn set_draft(session: &mut SessionState, presence: Option<&mut Presence>, text: String, now_ms: f64) {
	let Some(edit) = session.editing.as_mut() else { return };
	edit.draft = text;
	if let Some(presence) = presence {
		presence.typing(&edit.node_id, now_ms);
	}
}

/// Writes the draft (if it changed) and releases the lock.
pub fn commit_edit(ws: &mut Workspace, session: &mut SessionState, presence: Option<&mut Presence>) {
	let Some(edit) = session.editing.take() else { return };
	let changed = ws
		.store
		.node(&edit.node_id)
		.and_then(|n| n.content.as_text())
		.is_some_and(|current| current != edit.draft);
	if changed {
		ws.history.snapshot(&ws.store);
		if let Err(err) = ws.store.update_node_text(&edit.node_id, &edit.draft) {
			warn!("text commit failed: {err}");
		}
	}
	collab::release(&mut ws.store, &edit.node_id, &ws.identity);
	if let Some(presence) = presence {
		presence.stopped(&edit.node_id);
	}
}

/// Drops the draft and releases the lock.
pub fn cancel_edit(ws: &mut Workspace, session: &mut SessionState, presence: Option<&mut Presence>) {
	let Some(edit) = session.editing.take() else { return };
	collab::release(&mut ws.store, &edit.node_id, &ws.identity);
	if let Some(presence) = presence {
		presence.stopped(&edit.node_id);
	}
}

pub fn start_linking(session: &mut SessionState) {
	session.mode = Mode::Linking { source: None };
}

pub fn link_nodes(
	ws: &mut Workspace,
	session: &mut SessionState,
	source: &str,
	target: &str,
) -> Result<LinkId, GraphError> {
	session.mode = Mode::Select;
	if !(ws.store.contains_node(source) && ws.store.contains_node(target)) {
		let missing = if ws.store.contains_node(source) { target } else { source };
		session.notice = Some("Could not link: node no longer exists".into());
		return Err(GraphError::UnresolvedEndpoint(missing.to_owned()));
	}
	ws.history.snapshot(&ws.store);
	ws.store.add_link(LinkDraft::new(source, target))
}

/// Creates a text node centred on a screen point.
pub fn add_node_at(
	ws: &mut Workspace,
	session: &mut SessionState,
	screen: Point,
	text: &str,
) -> Result<NodeId, GraphError> {
	let c = session.transform.screen_to_canvas(screen);
	let (w, h) = (ws.config.default_node_width, ws.config.default_node_height);
	ws.history.snapshot(&ws.store);
	let id = ws.store.add_node(NodeDraft {
		width: Some(w),
		height: Some(h),
		..NodeDraft::text(c.x - w / 2.0, c.y - h / 2.0, text)
	})?;
	session.selection.clear();
	session.selection.insert(id.clone());
	Ok(id)
}

pub fn select_all(ws: &Workspace, session: &mut SessionState) {
	session.selection = ws.store.nodes().map(|n| n.id.clone()).collect();
}

pub fn key_down(
	ws: &mut Workspace,
	session: &mut SessionState,
	presence: Option<&mut Presence>,
	input: &KeyInput,
	now_ms: f64,
) {
	if let Some(edit) = &session.editing {
		let mut draft = edit.draft.clone();
		match input.key.as_str() {
			"Enter" if !input.shift => return commit_edit(ws, session, presence),
			"Escape" => return cancel_edit(ws, session, presence),
			"Enter" => draft.push('\n'),
			"Backspace" => {
				draft.pop();
			}
			key if key.chars().count() == 1 && !input.ctrl => draft.push_str(key),
			_ => return,
		}
		return set_draft(session, presence, draft, now_ms);
	}

	match (input.key.as_str(), input.ctrl) {
		("Delete" | "Backspace", false) => {
			let ids: Vec<NodeId> = session.selection.drain().collect();
			ws.delete_nodes(&ids);
		}
		("z" | "Z", true) if input.shift => {
			ws.redo();
		}
		("z" | "Z", true) => {
			ws.undo();
		}
		("y" | "Y", true) => {
			ws.redo();
		}
		("a" | "A", true) => select_all(ws, session),
		("Escape", _) => {
			session.mode = Mode::Select;
			session.selection.clear();
		}
		("l" | "L", false) => start_linking(session),
		("+" | "=", false) => session.transform.zoom_in(&ws.config),
		("-", false) => session.transform.zoom_out(&ws.config),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::config::EditorConfig;

	fn workspace() -> Workspace {
		Workspace::new("doc", "alice", EditorConfig::default())
	}

	fn add(ws: &mut Workspace, x: f64, y: f64) -> NodeId {
		ws.store.add_node(NodeDraft::text(x, y, "n")).unwrap()
	}

	#[test]
	fn drag_skips_node_locked_mid_gesture() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);

		pointer_down(&mut ws, &mut session, None, PointerInput::at(10.0, 10.0));
		pointer_move(&ws, &mut session, PointerInput::at(60.0, 10.0));
		ws.store.lock(&a, "bob").unwrap();
		pointer_up(&mut ws, &mut session);

		assert_eq!(ws.store.node(&a).unwrap().x, 0.0);
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn group_drag_moves_selection_with_one_snapshot() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		let b = add(&mut ws, 300.0, 0.0);
		session.selection.extend([a.clone(), b.clone()]);

		pointer_down(&mut ws, &mut session, None, PointerInput::at(10.0, 10.0));
		pointer_move(&ws, &mut session, PointerInput::at(60.0, 30.0));
		// visual only until release
		assert_eq!(ws.store.node(&a).unwrap().x, 0.0);
		assert_eq!(session.display_position(ws.store.node(&b).unwrap()), Point::new(350.0, 20.0));

		pointer_up(&mut ws, &mut session);
		assert_eq!(ws.store.node(&a).unwrap().position(), Point::new(50.0, 20.0));
		assert_eq!(ws.store.node(&b).unwrap().position(), Point::new(350.0, 20.0));
		assert_eq!(ws.history.undo_len(), 1);
		assert_eq!(session.gesture, Gesture::Idle);

		ws.undo();
		assert_eq!(ws.store.node(&a).unwrap().x, 0.0);
		assert_eq!(ws.store.node(&b).unwrap().x, 300.0);
	}

	#[test]
	fn click_without_movement_takes_no_snapshot() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		pointer_down(&mut ws, &mut session, None, PointerInput::at(10.0, 10.0));
		pointer_up(&mut ws, &mut session);
		assert!(session.is_selected(&a));
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn drag_respects_zoom() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		session.transform.set_zoom(2.0, &ws.config);
		let a = add(&mut ws, 0.0, 0.0);
		pointer_down(&mut ws, &mut session, None, PointerInput::at(10.0, 10.0));
		pointer_move(&ws, &mut session, PointerInput::at(50.0, 10.0));
		pointer_up(&mut ws, &mut session);
		assert_eq!(ws.store.node(&a).unwrap().x, 20.0);
	}

	#[test]
	fn resize_from_corner_handle() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		pointer_down(&mut ws, &mut session, None, PointerInput::at(98.0, 38.0));
		assert!(matches!(session.gesture, Gesture::Resizing { .. }));
		pointer_move(&ws, &mut session, PointerInput::at(148.0, 58.0));
		pointer_up(&mut ws, &mut session);
		let node = ws.store.node(&a).unwrap();
		assert_eq!((node.width, node.height), (150.0, 60.0));
	}

	#[test]
	fn background_drag_pans_within_bounds() {
		let mut ws = workspace();
		ws.config.pan_limit = 100.0;
		let mut session = SessionState::new();
		pointer_down(&mut ws, &mut session, None, PointerInput::at(500.0, 500.0));
		pointer_move(&ws, &mut session, PointerInput::at(900.0, 530.0));
		assert_eq!(session.transform.pan, Point::new(100.0, 30.0));
		pointer_up(&mut ws, &mut session);
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn linking_takes_two_clicks() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		let b = add(&mut ws, 300.0, 0.0);
		start_linking(&mut session);

		pointer_down(&mut ws, &mut session, None, PointerInput::at(10.0, 10.0));
		pointer_up(&mut ws, &mut session);
		assert_eq!(session.pending_link_source(), Some(a.as_str()));
		assert_eq!(ws.store.link_count(), 0);

		pointer_down(&mut ws, &mut session, None, PointerInput::at(310.0, 10.0));
		pointer_up(&mut ws, &mut session);
		let link = ws.store.links().next().unwrap();
		assert_eq!((&link.source, &link.target), (&a, &b));
		assert_eq!(session.mode, Mode::Select);
	}

	#[test]
	fn edit_locks_commits_and_unlocks() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		let (mut presence, _rx) = Presence::channel("alice", 0.0);

		let outcome = double_click(&mut ws, &mut session, Some(&mut presence), PointerInput::at(10.0, 10.0));
		assert_eq!(outcome, Some(LockOutcome::Acquired));
		assert_eq!(ws.store.node(&a).unwrap().locked_by.as_deref(), Some("alice"));

		for key in ["Backspace", "!", "?"] {
			key_down(&mut ws, &mut session, Some(&mut presence), &KeyInput::plain(key), 0.0);
		}
		assert_eq!(session.display_text(ws.store.node(&a).unwrap()), Some("!?"));
		key_down(&mut ws, &mut session, Some(&mut presence), &KeyInput::plain("Enter"), 0.0);

		let node = ws.store.node(&a).unwrap();
		assert_eq!(node.content.as_text(), Some("!?"));
		assert_eq!(node.locked_by, None);
		assert!(session.editing.is_none());
		assert_eq!(ws.history.undo_len(), 1);
	}

	#[test]
	fn edit_denied_when_locked_by_someone_else() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		ws.store.lock(&a, "bob").unwrap();

		let outcome = begin_edit(&mut ws, &mut session, None, &a).unwrap();
		assert_eq!(
			outcome,
			LockOutcome::Denied {
				holder: "bob".into()
			}
		);
		assert!(session.editing.is_none());
		assert_eq!(session.notice.as_deref(), Some("Locked by bob"));
		assert_eq!(ws.store.node(&a).unwrap().locked_by.as_deref(), Some("bob"));
	}

	#[test]
	fn clicking_elsewhere_commits_the_edit() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		begin_edit(&mut ws, &mut session, None, &a).unwrap();
		set_draft(&mut session, None, "typed".into(), 0.0);
		pointer_down(&mut ws, &mut session, None, PointerInput::at(900.0, 900.0));
		assert_eq!(ws.store.node(&a).unwrap().content.as_text(), Some("typed"));
		assert_eq!(ws.store.node(&a).unwrap().locked_by, None);
	}

	#[test]
	fn keyboard_delete_and_undo() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let a = add(&mut ws, 0.0, 0.0);
		session.selection.insert(a.clone());
		key_down(&mut ws, &mut session, None, &KeyInput::plain("Delete"), 0.0);
		assert!(!ws.store.contains_node(&a));
		key_down(&mut ws, &mut session, None, &KeyInput::ctrl("z"), 0.0);
		assert!(ws.store.contains_node(&a));
		key_down(&mut ws, &mut session, None, &KeyInput::ctrl("y"), 0.0);
		assert!(!ws.store.contains_node(&a));
	}

	#[test]
	fn add_node_at_centres_on_pointer() {
		let mut ws = workspace();
		let mut session = SessionState::new();
		let id = add_node_at(&mut ws, &mut session, Point::new(200.0, 100.0), "new").unwrap();
		let node = ws.store.node(&id).unwrap();
		assert_eq!(node.center(), Point::new(200.0, 100.0));
		assert!(session.is_selected(&id));
	}
}
