//! Editor tuning knobs. Everything has a default; a JSON object with any
//! subset of the camelCase keys overrides them.

use serde::{Deserialize, Serialize};

use crate::graph::{DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, LayoutParams};
use crate::graph::history::DEFAULT_HISTORY_LIMIT;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;
pub const ZOOM_STEP: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
	pub min_zoom: f64,
	pub max_zoom: f64,
	/// Additive step used by the zoom buttons and `+`/`-` keys.
	pub zoom_step: f64,
	/// Multiplicative factor per wheel notch.
	pub wheel_zoom_factor: f64,
	/// Pan offset is clamped to `[-pan_limit, pan_limit]` on each axis.
	pub pan_limit: f64,
	pub history_limit: usize,
	pub typing_throttle_ms: f64,
	pub default_node_width: f64,
	pub default_node_height: f64,
	/// Size of the square resize grip at a node's bottom-right corner, in
	/// canvas units.
	pub resize_handle: f64,
	/// Offset between consecutive nodes placed without coordinates.
	pub placement_step: f64,
	pub layout: LayoutParams,
}

impl Default for EditorConfig {
	fn default() -> Self {
		Self {
			min_zoom: MIN_ZOOM,
			max_zoom: MAX_ZOOM,
			zoom_step: ZOOM_STEP,
			wheel_zoom_factor: 1.1,
			pan_limit: 5000.0,
			history_limit: DEFAULT_HISTORY_LIMIT,
			typing_throttle_ms: 300.0,
			default_node_width: DEFAULT_NODE_WIDTH,
			default_node_height: DEFAULT_NODE_HEIGHT,
			resize_handle: 10.0,
			placement_step: 60.0,
			layout: LayoutParams::default(),
		}
	}
}

impl EditorConfig {
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		let config: EditorConfig = serde_json::from_str(json)?;
		Ok(config.sanitized())
	}

	/// Repairs values that would break the editor's invariants.
	pub fn sanitized(mut self) -> Self {
		let defaults = EditorConfig::default();
		if !(self.min_zoom.is_finite() && self.min_zoom > 0.0) {
			self.min_zoom = defaults.min_zoom;
		}
		if !(self.max_zoom.is_finite() && self.max_zoom >= self.min_zoom) {
			self.max_zoom = self.min_zoom.max(defaults.max_zoom);
		}
		if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
			self.zoom_step = defaults.zoom_step;
		}
		if !(self.wheel_zoom_factor.is_finite() && self.wheel_zoom_factor > 1.0) {
			self.wheel_zoom_factor = defaults.wheel_zoom_factor;
		}
		if !(self.pan_limit.is_finite() && self.pan_limit >= 0.0) {
			self.pan_limit = defaults.pan_limit;
		}
		self.history_limit = self.history_limit.max(1);
		if !(self.typing_throttle_ms.is_finite() && self.typing_throttle_ms >= 0.0) {
			self.typing_throttle_ms = defaults.typing_throttle_ms;
		}
		self
	}
}
