use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::debug;

use crate::collab::Presence;
use crate::editor::{SessionState, Workspace};
use crate::sync::{self, MemoryRemote};

/// Canvas-local state living next to the shared workspace.
pub struct CanvasState {
	pub session: SessionState,
	pub presence: Presence,
	pub width: f64,
	pub height: f64,
}

impl CanvasState {
	pub fn new(presence: Presence, width: f64, height: f64) -> Self {
		Self {
			session: SessionState::new(),
			presence,
			width,
			height,
		}
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
	}
}

/// Everything an event handler needs, cheap to clone into closures.
#[derive(Clone)]
pub struct EditorHandle {
	pub workspace: Rc<RefCell<Workspace>>,
	pub canvas: Rc<RefCell<Option<CanvasState>>>,
	pub remote: MemoryRemote,
	pub status: RwSignal<Option<String>>,
	/// Async operations in flight (AI merges, pushes).
	pub busy: RwSignal<usize>,
}

/// Holds one unit of the busy count until dropped.
pub struct BusyGuard(RwSignal<usize>);

impl BusyGuard {
	pub fn new(busy: RwSignal<usize>) -> Self {
		busy.try_update(|n| *n += 1);
		Self(busy)
	}
}

impl Drop for BusyGuard {
	fn drop(&mut self) {
		// The signal may already be disposed if the page unmounted mid-flight.
		self.0.try_update(|n| *n = n.saturating_sub(1));
	}
}

impl EditorHandle {
	/// Runs `f` against the workspace and canvas state, surfaces any notice
	/// and pushes whatever the call queued.
	pub fn update(&self, f: impl FnOnce(&mut Workspace, &mut CanvasState)) {
		{
			let mut canvas = self.canvas.borrow_mut();
			let Some(canvas) = canvas.as_mut() else {
				return;
			};
			f(&mut self.workspace.borrow_mut(), canvas);
			if let Some(notice) = canvas.session.notice.take() {
				self.status.set(Some(notice));
			}
		}
		self.flush();
	}

	pub fn flush(&self) {
		if !self.workspace.borrow().store.has_outgoing() {
			return;
		}
		let (workspace, remote, status) = (self.workspace.clone(), self.remote.clone(), self.status);
		let busy = BusyGuard::new(self.busy);
		spawn_local(async move {
			let _busy = busy;
			if let Some(message) = sync::flush(&workspace, &remote).await {
				status.set(Some(message));
			} else {
				debug!("outbox flushed");
			}
		});
	}
}
