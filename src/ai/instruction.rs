use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, StylePatch};

/// One structured edit produced by the assistant. Exactly one kind per
/// invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AiInstruction {
	EditNodes {
		edits: Vec<TextChange>,
	},
	StyleNodes {
		styles: Vec<StyleChange>,
	},
	MoveNodes {
		moves: Vec<MoveChange>,
	},
	#[serde(rename_all = "camelCase")]
	AddNodes {
		nodes: Vec<ProposedNode>,
		#[serde(default)]
		add_links: Vec<ProposedLink>,
	},
	/// Replaces the whole document with `nodes` and `links`.
	ReplaceGraph {
		nodes: Vec<ProposedNode>,
		#[serde(default)]
		links: Vec<ProposedLink>,
	},
}

impl AiInstruction {
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	/// Nodes the instruction wants created, if any.
	pub fn proposed_nodes(&self) -> &[ProposedNode] {
		match self {
			AiInstruction::AddNodes { nodes, .. } | AiInstruction::ReplaceGraph { nodes, .. } => nodes,
			_ => &[],
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
	pub id: NodeId,
	pub new_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleChange {
	pub id: NodeId,
	pub style: StylePatch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveChange {
	pub id: NodeId,
	pub x: f64,
	pub y: f64,
}

/// A node the assistant wants created. `id` is provisional: links in the
/// same instruction may refer to it, and it is replaced on insertion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposedNode {
	pub id: String,
	pub text: String,
	pub x: Option<f64>,
	pub y: Option<f64>,
	pub width: Option<f64>,
	pub height: Option<f64>,
	pub style: StylePatch,
	pub parent: Option<String>,
	/// Generate an image from this prompt and insert an image node instead
	/// of a text node.
	pub image_prompt: Option<String>,
	/// Optional source image for the generator.
	pub source_image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedLink {
	pub source: String,
	pub target: String,
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn parses_each_kind() {
		let edit = AiInstruction::from_json(r#"{ "kind": "editNodes", "edits": [{ "id": "a", "newText": "hi" }] }"#)
			.unwrap();
		assert_eq!(
			edit,
			AiInstruction::EditNodes {
				edits: vec![TextChange {
					id: "a".into(),
					new_text: "hi".into()
				}]
			}
		);

		let add = AiInstruction::from_json(
			r#"{
				"kind": "addNodes",
				"nodes": [{ "id": "p1", "text": "Idea" }, { "id": "p2", "imagePrompt": "a cat" }],
				"addLinks": [{ "source": "p1", "target": "p2" }]
			}"#,
		)
		.unwrap();
		let AiInstruction::AddNodes { nodes, add_links } = add else {
			panic!("expected addNodes");
		};
		assert_eq!(nodes.len(), 2);
		assert_eq!(nodes[1].image_prompt.as_deref(), Some("a cat"));
		assert_eq!(nodes[0].x, None);
		assert_eq!(add_links.len(), 1);

		let style = AiInstruction::from_json(
			r#"{ "kind": "styleNodes", "styles": [{ "id": "a", "style": { "bold": true, "fontFamily": "Papyrus" } }] }"#,
		)
		.unwrap();
		assert!(matches!(style, AiInstruction::StyleNodes { .. }));

		let replace = AiInstruction::from_json(r#"{ "kind": "replaceGraph", "nodes": [] }"#).unwrap();
		assert!(matches!(replace, AiInstruction::ReplaceGraph { .. }));
	}

	#[test]
	fn unknown_kind_is_an_error() {
		assert!(AiInstruction::from_json(r#"{ "kind": "deleteEverything" }"#).is_err());
	}
}
