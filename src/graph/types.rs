//! Document model: nodes, links and their style attributes.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type NodeId = String;
pub type LinkId = String;

pub const DEFAULT_NODE_WIDTH: f64 = 100.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 40.0;

fn default_width() -> f64 {
	DEFAULT_NODE_WIDTH
}

fn default_height() -> f64 {
	DEFAULT_NODE_HEIGHT
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl Point {
	pub fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// Font families a node may be rendered with. Anything else is coerced to
/// [`FontFamily::default`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FontFamily {
	#[default]
	Arial,
	Helvetica,
	TimesNewRoman,
	CourierNew,
	Georgia,
	Verdana,
	ComicSansMs,
}

impl FontFamily {
	pub const ALL: [FontFamily; 7] = [
		FontFamily::Arial,
		FontFamily::Helvetica,
		FontFamily::TimesNewRoman,
		FontFamily::CourierNew,
		FontFamily::Georgia,
		FontFamily::Verdana,
		FontFamily::ComicSansMs,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			FontFamily::Arial => "Arial",
			FontFamily::Helvetica => "Helvetica",
			FontFamily::TimesNewRoman => "Times New Roman",
			FontFamily::CourierNew => "Courier New",
			FontFamily::Georgia => "Georgia",
			FontFamily::Verdana => "Verdana",
			FontFamily::ComicSansMs => "Comic Sans MS",
		}
	}

	/// Exact, case-insensitive match against the enumerated set.
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();
		Self::ALL
			.into_iter()
			.find(|f| f.as_str().eq_ignore_ascii_case(value))
	}
}

impl fmt::Display for FontFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for FontFamily {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

// Remote documents may carry fonts written by older clients; they are read
// leniently and coerced, the same way style patches are.
impl<'de> Deserialize<'de> for FontFamily {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(FontFamily::parse(&raw).unwrap_or_else(|| {
			log::warn!("unknown font family {raw:?} in document, using {}", FontFamily::default());
			FontFamily::default()
		}))
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
	Left,
	#[default]
	Center,
	Right,
}

impl TextAlign {
	pub fn as_str(self) -> &'static str {
		match self {
			TextAlign::Left => "left",
			TextAlign::Center => "center",
			TextAlign::Right => "right",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStyle {
	pub background_color: String,
	pub text_color: String,
	pub font_family: FontFamily,
	pub font_size: f64,
	pub text_align: TextAlign,
	pub bold: bool,
	pub italic: bool,
	pub underline: bool,
	pub strikethrough: bool,
}

impl Default for NodeStyle {
	fn default() -> Self {
		Self {
			background_color: "#ffffff".into(),
			text_color: "#1a1a2e".into(),
			font_family: FontFamily::default(),
			font_size: 14.0,
			text_align: TextAlign::default(),
			bold: false,
			italic: false,
			underline: false,
			strikethrough: false,
		}
	}
}

/// A partial style update. `font_family` stays a raw string until it is
/// applied so that out-of-set values can be reported.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StylePatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub background_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub font_family: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub font_size: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text_align: Option<TextAlign>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bold: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub italic: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub underline: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strikethrough: Option<bool>,
}

impl StylePatch {
	pub fn is_empty(&self) -> bool {
		*self == StylePatch::default()
	}
}

/// A font family value that was not in the enumerated set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleCoercion {
	pub requested: String,
	pub applied: FontFamily,
}

impl NodeStyle {
	/// Merges `patch` into this style, coercing invalid font families.
	pub fn apply(&mut self, patch: &StylePatch) -> Option<StyleCoercion> {
		let mut coercion = None;
		if let Some(color) = &patch.background_color {
			self.background_color = color.clone();
		}
		if let Some(color) = &patch.text_color {
			self.text_color = color.clone();
		}
		if let Some(raw) = &patch.font_family {
			self.font_family = match FontFamily::parse(raw) {
				Some(family) => family,
				None => {
					let applied = FontFamily::default();
					log::warn!("font family {raw:?} is not supported, using {applied}");
					coercion = Some(StyleCoercion {
						requested: raw.clone(),
						applied,
					});
					applied
				}
			};
		}
		if let Some(size) = patch.font_size.filter(|s| s.is_finite() && *s > 0.0) {
			self.font_size = size;
		}
		if let Some(align) = patch.text_align {
			self.text_align = align;
		}
		if let Some(bold) = patch.bold {
			self.bold = bold;
		}
		if let Some(italic) = patch.italic {
			self.italic = italic;
		}
		if let Some(underline) = patch.underline {
			self.underline = underline;
		}
		if let Some(strikethrough) = patch.strikethrough {
			self.strikethrough = strikethrough;
		}
		coercion
	}
}

/// What a node displays, discriminated by `type` on the wire. Documents
/// written before image nodes existed carry no `type`; those read as text.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeContent {
	Text {
		#[serde(default)]
		text: String,
	},
	#[serde(rename_all = "camelCase")]
	Image {
		image_url: String,
		#[serde(default)]
		storage_path: Option<String>,
	},
}

impl NodeContent {
	pub fn text(text: impl Into<String>) -> Self {
		NodeContent::Text { text: text.into() }
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			NodeContent::Text { text } => Some(text),
			NodeContent::Image { .. } => None,
		}
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
	#[serde(rename = "type", default)]
	kind: Option<String>,
	#[serde(default)]
	text: Option<String>,
	#[serde(default)]
	image_url: Option<String>,
	#[serde(default)]
	storage_path: Option<String>,
}

impl<'de> Deserialize<'de> for NodeContent {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		use serde::de::Error;

		let wire = WireContent::deserialize(deserializer)?;
		match wire.kind.as_deref() {
			None | Some("text") => Ok(NodeContent::Text {
				text: wire.text.unwrap_or_default(),
			}),
			Some("image") => Ok(NodeContent::Image {
				image_url: wire.image_url.ok_or_else(|| D::Error::missing_field("imageUrl"))?,
				storage_path: wire.storage_path,
			}),
			Some(other) => Err(D::Error::unknown_variant(other, &["text", "image"])),
		}
	}
}

impl Default for NodeContent {
	fn default() -> Self {
		NodeContent::text("")
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub id: NodeId,
	pub x: f64,
	pub y: f64,
	#[serde(default = "default_width")]
	pub width: f64,
	#[serde(default = "default_height")]
	pub height: f64,
	#[serde(flatten)]
	pub content: NodeContent,
	#[serde(default)]
	pub style: NodeStyle,
	#[serde(default)]
	pub locked_by: Option<String>,
	#[serde(default)]
	pub typing: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent: Option<NodeId>,
}

impl Node {
	pub fn text(id: impl Into<NodeId>, x: f64, y: f64, text: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			x,
			y,
			width: DEFAULT_NODE_WIDTH,
			height: DEFAULT_NODE_HEIGHT,
			content: NodeContent::text(text),
			style: NodeStyle::default(),
			locked_by: None,
			typing: false,
			parent: None,
		}
	}

	pub fn position(&self) -> Point {
		Point::new(self.x, self.y)
	}

	pub fn contains(&self, p: Point) -> bool {
		p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
	}

	pub fn center(&self) -> Point {
		Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
	}

	/// True when someone other than `identity` holds the lock.
	pub fn locked_by_other(&self, identity: &str) -> bool {
		self.locked_by.as_deref().is_some_and(|holder| holder != identity)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
	pub id: LinkId,
	pub source: NodeId,
	pub target: NodeId,
}

/// Input to [`GraphStore::add_node`](super::GraphStore::add_node).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeDraft {
	pub id: Option<NodeId>,
	pub x: f64,
	pub y: f64,
	pub width: Option<f64>,
	pub height: Option<f64>,
	pub content: NodeContent,
	pub style: StylePatch,
	pub parent: Option<NodeId>,
}

impl NodeDraft {
	pub fn text(x: f64, y: f64, text: impl Into<String>) -> Self {
		Self {
			x,
			y,
			content: NodeContent::text(text),
			..Self::default()
		}
	}
}

/// Input to [`GraphStore::add_link`](super::GraphStore::add_link).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkDraft {
	pub id: Option<LinkId>,
	pub source: NodeId,
	pub target: NodeId,
}

impl LinkDraft {
	pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
		Self {
			id: None,
			source: source.into(),
			target: target.into(),
		}
	}
}

/// The serialised form of a document: `{ nodes: [...], links: [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
	pub nodes: Vec<Node>,
	pub links: Vec<Link>,
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn font_family_parse_is_case_insensitive() {
		assert_eq!(FontFamily::parse("times new roman"), Some(FontFamily::TimesNewRoman));
		assert_eq!(FontFamily::parse("Papyrus"), None);
	}

	#[test]
	fn style_patch_coerces_unknown_font() {
		let mut style = NodeStyle::default();
		let coercion = style.apply(&StylePatch {
			font_family: Some("Wingdings".into()),
			bold: Some(true),
			..StylePatch::default()
		});
		assert_eq!(
			coercion,
			Some(StyleCoercion {
				requested: "Wingdings".into(),
				applied: FontFamily::Arial,
			})
		);
		assert_eq!(style.font_family, FontFamily::Arial);
		assert!(style.bold);
	}

	#[test]
	fn style_patch_passes_valid_font_through() {
		let mut style = NodeStyle::default();
		let coercion = style.apply(&StylePatch {
			font_family: Some("Georgia".into()),
			..StylePatch::default()
		});
		assert_eq!(coercion, None);
		assert_eq!(style.font_family, FontFamily::Georgia);
	}

	#[test]
	fn node_wire_format() {
		let json = r##"{
			"id": "n1", "x": 10, "y": 20, "type": "text", "text": "hello",
			"style": { "fontFamily": "Verdana", "backgroundColor": "#fff" },
			"lockedBy": "alice"
		}"##;
		let node: Node = serde_json::from_str(json).unwrap();
		assert_eq!(node.width, DEFAULT_NODE_WIDTH);
		assert_eq!(node.height, DEFAULT_NODE_HEIGHT);
		assert_eq!(node.content.as_text(), Some("hello"));
		assert_eq!(node.style.font_family, FontFamily::Verdana);
		assert_eq!(node.locked_by.as_deref(), Some("alice"));
	}

	#[test]
	fn image_node_requires_url() {
		let missing = r#"{ "id": "i", "x": 0, "y": 0, "type": "image" }"#;
		assert!(serde_json::from_str::<Node>(missing).is_err());

		let ok = r#"{ "id": "i", "x": 0, "y": 0, "type": "image",
			"imageUrl": "https://img/1.png", "storagePath": "images/1.png" }"#;
		let node: Node = serde_json::from_str(ok).unwrap();
		assert_eq!(
			node.content,
			NodeContent::Image {
				image_url: "https://img/1.png".into(),
				storage_path: Some("images/1.png".into()),
			}
		);
	}

	#[test]
	fn untyped_node_reads_as_text() {
		let json = r#"{ "id": "n1", "x": 0, "y": 0, "text": "legacy" }"#;
		let node: Node = serde_json::from_str(json).unwrap();
		assert_eq!(node.content, NodeContent::text("legacy"));

		let bare: Node = serde_json::from_str(r#"{ "id": "n2", "x": 0, "y": 0 }"#).unwrap();
		assert_eq!(bare.content, NodeContent::text(""));
	}

	#[test]
	fn unknown_node_type_is_rejected() {
		let json = r#"{ "id": "n1", "x": 0, "y": 0, "type": "video" }"#;
		assert!(serde_json::from_str::<Node>(json).is_err());
	}
}
