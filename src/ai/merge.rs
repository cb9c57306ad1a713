//! Applies assistant instructions to the open document.
//!
//! Every change goes through the same [`GraphStore`](crate::graph::GraphStore)
//! methods the canvas uses. A batch takes one undo snapshot, and only when
//! at least one of its targets is valid.

use std::cell::RefCell;

use indexmap::IndexMap;
use log::{debug, info, warn};

use super::image::{ImageService, ResolvedImages, resolve_images};
use super::instruction::{AiInstruction, ProposedLink, ProposedNode};
use crate::editor::Workspace;
use crate::graph::{LinkDraft, NodeContent, NodeDraft, NodeId, Point, StyleCoercion};
use crate::sync::SessionToken;

/// Nodes per row when the assistant gives no coordinates.
const PLACEMENT_COLUMNS: usize = 4;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeReport {
	pub applied: usize,
	pub skipped: usize,
	/// Provisional id -> assigned id, for created nodes.
	pub id_map: IndexMap<String, NodeId>,
	pub links_added: usize,
	pub links_dropped: usize,
	pub coercions: Vec<StyleCoercion>,
	pub failures: Vec<String>,
}

impl MergeReport {
	/// One-line summary for the status bar.
	pub fn summary(&self) -> String {
		let mut text = format!("AI: {} applied, {} skipped", self.applied, self.skipped);
		if self.links_dropped > 0 {
			text.push_str(&format!(", {} link(s) dropped", self.links_dropped));
		}
		if let Some(first) = self.failures.first() {
			text.push_str(&format!(" ({first})"));
		}
		text
	}
}

/// Applies one instruction synchronously. Image prompts must already be
/// resolved into `images`; a proposed node whose image failed is skipped.
pub fn apply_instruction(
	ws: &mut Workspace,
	instruction: &AiInstruction,
	images: &ResolvedImages,
	drop_point: Point,
) -> MergeReport {
	let report = match instruction {
		AiInstruction::EditNodes { edits } => {
			let valid: Vec<_> = edits.iter().filter(|e| is_editable(&*ws, &e.id)).collect();
			let mut report = begin(ws, !valid.is_empty(), edits.len() - valid.len());
			for edit in valid {
				record(&mut report, &edit.id, ws.store.update_node_text(&edit.id, &edit.new_text));
			}
			report
		}
		AiInstruction::StyleNodes { styles } => {
			let valid: Vec<_> = styles.iter().filter(|s| is_editable(&*ws, &s.id)).collect();
			let mut report = begin(ws, !valid.is_empty(), styles.len() - valid.len());
			for change in valid {
				match ws.store.update_node_style(&change.id, &change.style) {
					Ok(coercions) => {
						report.applied += 1;
						report.coercions.extend(coercions);
					}
					Err(err) => {
						report.skipped += 1;
						report.failures.push(err.to_string());
					}
				}
			}
			report
		}
		AiInstruction::MoveNodes { moves } => {
			let valid: Vec<_> = moves.iter().filter(|m| is_editable(&*ws, &m.id)).collect();
			let mut report = begin(ws, !valid.is_empty(), moves.len() - valid.len());
			for change in valid {
				record(&mut report, &change.id, ws.store.move_node(&change.id, change.x, change.y));
			}
			report
		}
		AiInstruction::AddNodes { nodes, add_links } => {
			let valid: Vec<&ProposedNode> = nodes.iter().filter(|n| is_insertable(n, images)).collect();
			let any = !valid.is_empty() || has_resolvable_link(ws, &valid, add_links);
			let mut report = begin(ws, any, nodes.len() - valid.len());
			add_proposed(ws, &valid, add_links, images, drop_point, &mut report);
			report
		}
		AiInstruction::ReplaceGraph { nodes, links } => {
			let valid: Vec<&ProposedNode> = nodes.iter().filter(|n| is_insertable(n, images)).collect();
			let removable: Vec<NodeId> = ws
				.store
				.nodes()
				.filter(|n| !n.locked_by_other(&ws.identity))
				.map(|n| n.id.clone())
				.collect();
			let any = !valid.is_empty() || !removable.is_empty() || has_resolvable_link(ws, &valid, links);
			let mut report = begin(ws, any, nodes.len() - valid.len());
			for id in &removable {
				record(&mut report, id, ws.store.delete_node(id).map(drop));
			}
			add_proposed(ws, &valid, links, images, drop_point, &mut report);
			report
		}
	};

	info!("{}", report.summary());
	report
}

/// Records skipped targets and takes the batch snapshot if anything is left.
fn begin(ws: &mut Workspace, any_valid: bool, skipped: usize) -> MergeReport {
	let report = MergeReport {
		skipped,
		..MergeReport::default()
	};
	if any_valid {
		ws.history.snapshot(&ws.store);
	} else {
		debug!("no valid targets in instruction, nothing to apply");
	}
	report
}

fn record<E: std::fmt::Display>(report: &mut MergeReport, id: &str, result: Result<(), E>) {
	match result {
		Ok(()) => report.applied += 1,
		Err(err) => {
			warn!("AI change to {id} failed: {err}");
			report.skipped += 1;
			report.failures.push(err.to_string());
		}
	}
}

fn is_editable(ws: &Workspace, id: &str) -> bool {
	match ws.store.node(id) {
		Some(node) if node.locked_by_other(&ws.identity) => {
			debug!("skipping {id}: locked by another editor");
			false
		}
		Some(_) => true,
		None => {
			debug!("skipping unknown node {id}");
			false
		}
	}
}

/// Whether some link's endpoints are all either proposed nodes about to be
/// inserted or nodes already in the document.
fn has_resolvable_link(ws: &Workspace, nodes: &[&ProposedNode], links: &[ProposedLink]) -> bool {
	let known = |id: &str| nodes.iter().any(|n| n.id == id) || ws.store.contains_node(id);
	links.iter().any(|l| known(&l.source) && known(&l.target))
}

fn is_insertable(node: &ProposedNode, images: &ResolvedImages) -> bool {
	let geometry_ok = node.x.is_none_or(f64::is_finite) && node.y.is_none_or(f64::is_finite);
	let image_ok = node.image_prompt.is_none() || images.images.contains_key(&node.id);
	geometry_ok && image_ok
}

fn add_proposed(
	ws: &mut Workspace,
	nodes: &[&ProposedNode],
	links: &[ProposedLink],
	images: &ResolvedImages,
	drop_point: Point,
	report: &mut MergeReport,
) {
	let step = ws.config.placement_step;
	let mut unplaced = 0usize;
	for proposed in nodes {
		let (x, y) = match (proposed.x, proposed.y) {
			(Some(x), Some(y)) => (x, y),
			_ => {
				let col = unplaced % PLACEMENT_COLUMNS;
				let row = unplaced / PLACEMENT_COLUMNS;
				unplaced += 1;
				(
					drop_point.x + col as f64 * (ws.config.default_node_width + step),
					drop_point.y + row as f64 * (ws.config.default_node_height + step),
				)
			}
		};
		let content = match images.images.get(&proposed.id) {
			Some(image) => NodeContent::Image {
				image_url: image.url.clone(),
				storage_path: Some(image.storage_path.clone()),
			},
			None => NodeContent::text(proposed.text.clone()),
		};
		let draft = NodeDraft {
			id: None,
			x,
			y,
			width: proposed.width,
			height: proposed.height,
			content,
			style: proposed.style.clone(),
			parent: None,
		};
		match ws.store.add_node(draft) {
			Ok(id) => {
				report.applied += 1;
				report.id_map.insert(proposed.id.clone(), id);
			}
			Err(err) => {
				warn!("AI node {} not added: {err}", proposed.id);
				report.skipped += 1;
				report.failures.push(err.to_string());
			}
		}
	}

	for proposed in nodes {
		let (Some(id), Some(parent)) = (report.id_map.get(&proposed.id), proposed.parent.as_deref()) else {
			continue;
		};
		if let Some(parent) = resolve(ws, &report.id_map, parent) {
			let _ = ws.store.set_parent(id, Some(parent));
		}
	}

	for link in links {
		let endpoints = (
			resolve(ws, &report.id_map, &link.source),
			resolve(ws, &report.id_map, &link.target),
		);
		let added = match endpoints {
			(Some(source), Some(target)) => ws.store.add_link(LinkDraft::new(source, target)).is_ok(),
			_ => false,
		};
		if added {
			report.links_added += 1;
		} else {
			warn!("dropping AI link {} -> {}", link.source, link.target);
			report.links_dropped += 1;
		}
	}
}

/// Maps a provisional id to its assigned id, falling back to an existing
/// node with that id.
fn resolve(ws: &Workspace, id_map: &IndexMap<String, NodeId>, id: &str) -> Option<NodeId> {
	id_map
		.get(id)
		.cloned()
		.or_else(|| ws.store.contains_node(id).then(|| id.to_owned()))
}

/// Resolves images, then applies `instruction` if the session that asked
/// for it is still open. The workspace is not borrowed across awaits.
pub async fn run(
	ws: &RefCell<Workspace>,
	token: &SessionToken,
	instruction: &AiInstruction,
	images: Option<&dyn ImageService>,
	drop_point: Point,
) -> Option<MergeReport> {
	let proposed = instruction.proposed_nodes();
	let resolved = match images {
		Some(service) if proposed.iter().any(|n| n.image_prompt.is_some()) => {
			resolve_images(service, proposed).await
		}
		_ => ResolvedImages::default(),
	};
	let mut ws = ws.borrow_mut();
	if !ws.is_current(token) {
		debug!("discarding AI result for a closed session");
		return None;
	}
	let mut report = apply_instruction(&mut ws, instruction, &resolved, drop_point);
	report.failures.extend(resolved.failures.values().map(ToString::to_string));
	Some(report)
}

#[cfg(test)]
mod tests {
	use futures::executor::block_on;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::ai::image::tests::FakeImages;
	use crate::ai::instruction::{MoveChange, StyleChange, TextChange};
	use crate::config::EditorConfig;
	use crate::graph::{FontFamily, StylePatch};

	fn workspace_with(n: usize) -> (Workspace, Vec<NodeId>) {
		let mut ws = Workspace::new("doc", "alice", EditorConfig::default());
		let ids = (0..n)
			.map(|i| ws.store.add_node(NodeDraft::text(i as f64 * 10.0, 0.0, format!("n{i}"))).unwrap())
			.collect();
		(ws, ids)
	}

	fn proposed(id: &str, text: &str) -> ProposedNode {
		ProposedNode {
			id: id.into(),
			text: text.into(),
			..ProposedNode::default()
		}
	}

	#[test]
	fn move_batch_with_invalid_ids_is_one_undo_step() {
		let (mut ws, ids) = workspace_with(3);
		let mut moves: Vec<MoveChange> = ids
			.iter()
			.map(|id| MoveChange {
				id: id.clone(),
				x: 500.0,
				y: 500.0,
			})
			.collect();
		moves.push(MoveChange {
			id: "ghost-1".into(),
			x: 0.0,
			y: 0.0,
		});
		moves.push(MoveChange {
			id: "ghost-2".into(),
			x: 0.0,
			y: 0.0,
		});

		let report = apply_instruction(
			&mut ws,
			&AiInstruction::MoveNodes { moves },
			&ResolvedImages::default(),
			Point::default(),
		);
		assert_eq!((report.applied, report.skipped), (3, 2));
		assert_eq!(ws.history.undo_len(), 1);
		assert!(ids.iter().all(|id| ws.store.node(id).unwrap().x == 500.0));

		assert!(ws.undo());
		for (i, id) in ids.iter().enumerate() {
			assert_eq!(ws.store.node(id).unwrap().x, i as f64 * 10.0);
		}
	}

	#[test]
	fn all_invalid_takes_no_snapshot() {
		let (mut ws, _) = workspace_with(1);
		let report = apply_instruction(
			&mut ws,
			&AiInstruction::EditNodes {
				edits: vec![TextChange {
					id: "missing".into(),
					new_text: "x".into(),
				}],
			},
			&ResolvedImages::default(),
			Point::default(),
		);
		assert_eq!((report.applied, report.skipped), (0, 1));
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn edits_skip_nodes_locked_by_others() {
		let (mut ws, ids) = workspace_with(2);
		ws.store.lock(&ids[0], "bob").unwrap();
		let edits = ids
			.iter()
			.map(|id| TextChange {
				id: id.clone(),
				new_text: "rewritten".into(),
			})
			.collect();
		let report = apply_instruction(
			&mut ws,
			&AiInstruction::EditNodes { edits },
			&ResolvedImages::default(),
			Point::default(),
		);
		assert_eq!((report.applied, report.skipped), (1, 1));
		assert_eq!(ws.store.node(&ids[0]).unwrap().content.as_text(), Some("n0"));
		assert_eq!(ws.store.node(&ids[1]).unwrap().content.as_text(), Some("rewritten"));
	}

	#[test]
	fn style_coerces_unknown_fonts() {
		let (mut ws, ids) = workspace_with(1);
		let report = apply_instruction(
			&mut ws,
			&AiInstruction::StyleNodes {
				styles: vec![StyleChange {
					id: ids[0].clone(),
					style: StylePatch {
						font_family: Some("Papyrus".into()),
						bold: Some(true),
						..StylePatch::default()
					},
				}],
			},
			&ResolvedImages::default(),
			Point::default(),
		);
		assert_eq!(report.applied, 1);
		assert_eq!(report.coercions.len(), 1);
		let style = &ws.store.node(&ids[0]).unwrap().style;
		assert!(style.bold);
		assert_eq!(style.font_family, FontFamily::Arial);
	}

	#[test]
	fn added_links_resolve_provisional_and_existing_ids() {
		let (mut ws, ids) = workspace_with(1);
		let instruction = AiInstruction::AddNodes {
			nodes: vec![proposed("p1", "first"), proposed("p2", "second")],
			add_links: vec![
				ProposedLink {
					source: "p1".into(),
					target: "p2".into(),
				},
				ProposedLink {
					source: ids[0].clone(),
					target: "p1".into(),
				},
				ProposedLink {
					source: "p2".into(),
					target: "nowhere".into(),
				},
			],
		};
		let report = apply_instruction(&mut ws, &instruction, &ResolvedImages::default(), Point::new(300.0, 300.0));

		assert_eq!(report.applied, 2);
		assert_eq!((report.links_added, report.links_dropped), (2, 1));
		let p1 = &report.id_map["p1"];
		let p2 = &report.id_map["p2"];
		assert_ne!(p1, "p1");
		assert!(ws.store.links().any(|l| l.source == *p1 && l.target == *p2));
		assert!(ws.store.links().any(|l| l.source == ids[0] && l.target == *p1));
		assert_eq!(ws.store.node(p1).unwrap().position(), Point::new(300.0, 300.0));
		assert_eq!(ws.history.undo_len(), 1);

		assert!(ws.undo());
		assert_eq!(ws.store.node_count(), 1);
		assert_eq!(ws.store.link_count(), 0);
	}

	#[test]
	fn links_only_batch_is_undoable() {
		let (mut ws, ids) = workspace_with(2);
		let instruction = AiInstruction::AddNodes {
			nodes: vec![],
			add_links: vec![ProposedLink {
				source: ids[0].clone(),
				target: ids[1].clone(),
			}],
		};
		let report = apply_instruction(&mut ws, &instruction, &ResolvedImages::default(), Point::default());
		assert_eq!(report.links_added, 1);
		assert_eq!(ws.history.undo_len(), 1);

		assert!(ws.undo());
		assert_eq!(ws.store.link_count(), 0);
	}

	#[test]
	fn unresolvable_links_take_no_snapshot() {
		let (mut ws, ids) = workspace_with(1);
		let instruction = AiInstruction::AddNodes {
			nodes: vec![],
			add_links: vec![ProposedLink {
				source: ids[0].clone(),
				target: "nowhere".into(),
			}],
		};
		let report = apply_instruction(&mut ws, &instruction, &ResolvedImages::default(), Point::default());
		assert_eq!(report.links_dropped, 1);
		assert_eq!(ws.history.undo_len(), 0);
	}

	#[test]
	fn failed_image_skips_only_that_node() {
		let (ws, _) = workspace_with(0);
		let ws = RefCell::new(ws);
		let token = ws.borrow().token();
		let instruction = AiInstruction::AddNodes {
			nodes: vec![
				ProposedNode {
					image_prompt: Some("sunset".into()),
					..proposed("img", "")
				},
				ProposedNode {
					image_prompt: Some("please fail".into()),
					..proposed("bad", "")
				},
				proposed("txt", "caption"),
			],
			add_links: vec![ProposedLink {
				source: "img".into(),
				target: "txt".into(),
			}],
		};

		let report = block_on(run(&ws, &token, &instruction, Some(&FakeImages), Point::default())).unwrap();
		assert_eq!((report.applied, report.skipped), (2, 1));
		assert_eq!(report.links_added, 1);
		assert_eq!(report.failures.len(), 1);

		let ws = ws.borrow();
		let image = ws.store.node(&report.id_map["img"]).unwrap();
		assert_eq!(
			image.content,
			NodeContent::Image {
				image_url: "https://img.test/sunset.png".into(),
				storage_path: Some("images/sunset.png".into()),
			}
		);
		assert!(!report.id_map.contains_key("bad"));
	}

	#[test]
	fn replace_graph_swaps_content_in_one_step() {
		let (mut ws, ids) = workspace_with(2);
		let instruction = AiInstruction::ReplaceGraph {
			nodes: vec![proposed("r", "root"), proposed("c", "child")],
			links: vec![ProposedLink {
				source: "r".into(),
				target: "c".into(),
			}],
		};
		let report = apply_instruction(&mut ws, &instruction, &ResolvedImages::default(), Point::default());
		assert_eq!(report.applied, 4);
		assert_eq!(ws.store.node_count(), 2);
		assert!(ids.iter().all(|id| !ws.store.contains_node(id)));
		assert_eq!(ws.history.undo_len(), 1);

		assert!(ws.undo());
		assert!(ids.iter().all(|id| ws.store.contains_node(id)));
	}

	#[test]
	fn stale_session_discards_result() {
		let (ws, ids) = workspace_with(1);
		let ws = RefCell::new(ws);
		let token = ws.borrow().token();
		ws.borrow_mut().close();

		let instruction = AiInstruction::MoveNodes {
			moves: vec![MoveChange {
				id: ids[0].clone(),
				x: 99.0,
				y: 99.0,
			}],
		};
		assert_eq!(block_on(run(&ws, &token, &instruction, None, Point::default())), None);
		assert_eq!(ws.borrow().store.node(&ids[0]).unwrap().x, 0.0);
	}
}
