use std::collections::HashSet;

use crate::config::EditorConfig;
use crate::graph::{Node, NodeId, Point};

/// Screen <-> canvas mapping for one editing session. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasTransform {
	pub zoom: f64,
	pub pan: Point,
}

impl Default for CanvasTransform {
	fn default() -> Self {
		Self {
			zoom: 1.0,
			pan: Point::default(),
		}
	}
}

impl CanvasTransform {
	pub fn screen_to_canvas(&self, p: Point) -> Point {
		Point::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
	}

	pub fn canvas_to_screen(&self, p: Point) -> Point {
		Point::new(p.x * self.zoom + self.pan.x, p.y * self.zoom + self.pan.y)
	}

	pub fn set_zoom(&mut self, zoom: f64, config: &EditorConfig) {
		if zoom.is_finite() {
			// Snap away float drift from repeated 0.1 steps.
			let snapped = (zoom * 1e6).round() / 1e6;
			self.zoom = snapped.max(config.min_zoom).min(config.max_zoom);
		}
	}

	pub fn zoom_in(&mut self, config: &EditorConfig) {
		self.set_zoom(self.zoom + config.zoom_step, config);
	}

	pub fn zoom_out(&mut self, config: &EditorConfig) {
		self.set_zoom(self.zoom - config.zoom_step, config);
	}

	/// Multiplies the zoom by `factor`, keeping the canvas point under
	/// `anchor` (screen coordinates) in place.
	pub fn zoom_at(&mut self, anchor: Point, factor: f64, config: &EditorConfig) {
		let before = self.zoom;
		self.set_zoom(before * factor, config);
		let ratio = self.zoom / before;
		self.set_pan(
			Point::new(
				anchor.x - (anchor.x - self.pan.x) * ratio,
				anchor.y - (anchor.y - self.pan.y) * ratio,
			),
			config,
		);
	}

	pub fn set_pan(&mut self, pan: Point, config: &EditorConfig) {
		let limit = config.pan_limit.max(0.0);
		if pan.x.is_finite() && pan.y.is_finite() {
			self.pan = Point::new(pan.x.clamp(-limit, limit), pan.y.clamp(-limit, limit));
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Mode {
	#[default]
	Select,
	/// Waiting for the first (`source == None`) or second click of a link.
	Linking { source: Option<NodeId> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextEdit {
	pub node_id: NodeId,
	pub draft: String,
}

/// What the pointer is doing between press and release.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Gesture {
	#[default]
	Idle,
	DraggingNodes {
		origin: Point,
		ids: Vec<NodeId>,
		/// Canvas-space offset; only visual until release.
		delta: Point,
	},
	Resizing {
		id: NodeId,
		origin: Point,
		start: (f64, f64),
		size: (f64, f64),
	},
	Panning {
		origin: Point,
		pan_start: Point,
	},
}

/// Per-session UI state, passed explicitly to every controller call.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
	pub transform: CanvasTransform,
	pub selection: HashSet<NodeId>,
	pub mode: Mode,
	pub gesture: Gesture,
	pub editing: Option<TextEdit>,
	/// Last user-facing message (lock denials, failed writes).
	pub notice: Option<String>,
	pub hover: Option<NodeId>,
}

impl SessionState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_selected(&self, id: &str) -> bool {
		self.selection.contains(id)
	}

	pub fn pending_link_source(&self) -> Option<&str> {
		match &self.mode {
			Mode::Linking { source } => source.as_deref(),
			Mode::Select => None,
		}
	}

	/// Where `node` should be drawn, including an in-progress drag.
	pub fn display_position(&self, node: &Node) -> Point {
		match &self.gesture {
			Gesture::DraggingNodes { ids, delta, .. } if ids.iter().any(|i| *i == node.id) => {
				Point::new(node.x + delta.x, node.y + delta.y)
			}
			_ => node.position(),
		}
	}

	pub fn display_size(&self, node: &Node) -> (f64, f64) {
		match &self.gesture {
			Gesture::Resizing { id, size, .. } if *id == node.id => *size,
			_ => (node.width, node.height),
		}
	}

	/// Text to draw for `node`: the local draft while we are editing it.
	pub fn display_text<'a>(&'a self, node: &'a Node) -> Option<&'a str> {
		match &self.editing {
			Some(edit) if edit.node_id == node.id => Some(&edit.draft),
			_ => node.content.as_text(),
		}
	}
}
