//! Import and export of the `{ nodes: [...], links: [...] }` file format.

use std::collections::HashMap;

use log::warn;

use super::error::ImportError;
use super::store::GraphStore;
use super::types::{GraphData, Link, LinkDraft, Node, NodeDraft, NodeId, StylePatch};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
	/// File id to freshly assigned id.
	pub id_map: HashMap<NodeId, NodeId>,
	pub nodes_added: usize,
	pub links_added: usize,
	pub links_dropped: usize,
}

pub fn export(store: &GraphStore) -> String {
	// GraphData holds only plain data; serialising it cannot fail.
	serde_json::to_string_pretty(&store.to_data()).unwrap_or_default()
}

/// Parses and validates an export file. Both keys must be present and be
/// arrays; anything else rejects the whole file.
pub fn parse(json: &str) -> Result<GraphData, ImportError> {
	let value: serde_json::Value = serde_json::from_str(json)?;
	let object = value.as_object().ok_or(ImportError::NotAnObject)?;
	for key in ["nodes", "links"] {
		match object.get(key) {
			None => return Err(ImportError::MissingKey(key)),
			Some(v) if !v.is_array() => return Err(ImportError::NotAnArray(key)),
			Some(_) => {}
		}
	}
	Ok(serde_json::from_value(value)?)
}

fn style_patch(node: &Node) -> StylePatch {
	let style = &node.style;
	StylePatch {
		background_color: Some(style.background_color.clone()),
		text_color: Some(style.text_color.clone()),
		font_family: Some(style.font_family.to_string()),
		font_size: Some(style.font_size),
		text_align: Some(style.text_align),
		bold: Some(style.bold),
		italic: Some(style.italic),
		underline: Some(style.underline),
		strikethrough: Some(style.strikethrough),
	}
}

/// Adds the file's content to `store` under new ids. Links whose endpoints
/// do not map onto an imported node are dropped and counted.
pub fn import_into(store: &mut GraphStore, data: GraphData) -> ImportReport {
	let mut report = ImportReport::default();

	for node in &data.nodes {
		let draft = NodeDraft {
			id: None,
			x: node.x,
			y: node.y,
			width: Some(node.width),
			height: Some(node.height),
			content: node.content.clone(),
			style: style_patch(node),
			parent: None,
		};
		match store.add_node(draft) {
			Ok(id) => {
				report.id_map.insert(node.id.clone(), id);
				report.nodes_added += 1;
			}
			Err(err) => warn!("skipping imported node {}: {err}", node.id),
		}
	}

	// Parents are rewired once every node has its new id.
	for node in &data.nodes {
		let (Some(new_id), Some(parent)) = (report.id_map.get(&node.id), node.parent.as_ref()) else {
			continue;
		};
		if let Some(new_parent) = report.id_map.get(parent) {
			let _ = store.set_parent(new_id, Some(new_parent.clone()));
		}
	}

	for Link { source, target, .. } in &data.links {
		match (report.id_map.get(source), report.id_map.get(target)) {
			(Some(s), Some(t)) if store.add_link(LinkDraft::new(s.clone(), t.clone())).is_ok() => {
				report.links_added += 1;
			}
			_ => {
				warn!("dropping imported link {source} -> {target}");
				report.links_dropped += 1;
			}
		}
	}
	report
}
