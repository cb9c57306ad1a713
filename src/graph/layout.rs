//! Automatic node placement. Every function here is pure and deterministic:
//! the same nodes and links in the same order always give the same result.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::types::{Link, Node, NodeId, Point};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutKind {
	Pyramid,
	HorizontalTree,
	Radial,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutParams {
	pub origin: Point,
	/// Pyramid: width of level 0.
	pub base_width: f64,
	/// Pyramid: each level is this much wider than the one above.
	pub width_scale_factor: f64,
	/// Vertical gap between pyramid levels, horizontal gap between tree depths.
	pub level_spacing: f64,
	/// Tree: vertical gap between leaf rows.
	pub sibling_spacing: f64,
	/// Radial: distance between rings.
	pub ring_spacing: f64,
}

impl Default for LayoutParams {
	fn default() -> Self {
		Self {
			origin: Point::new(0.0, 0.0),
			base_width: 400.0,
			width_scale_factor: 1.5,
			level_spacing: 150.0,
			sibling_spacing: 70.0,
			ring_spacing: 180.0,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PyramidLayout {
	pub positions: IndexMap<NodeId, Point>,
	pub levels: IndexMap<NodeId, usize>,
}

/// Level of every node from its `parent` chain. Unknown parents count as
/// roots; nodes on a parent cycle are placed at level 0.
pub fn pyramid_levels(nodes: &[Node]) -> IndexMap<NodeId, usize> {
	let parents: HashMap<&str, &str> = nodes
		.iter()
		.filter_map(|n| n.parent.as_deref().map(|p| (n.id.as_str(), p)))
		.collect();
	let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
	let mut memo: HashMap<&str, usize> = HashMap::new();

	for node in nodes {
		// Ascend until a memoised node, a root, or a repeat.
		let mut path: Vec<&str> = Vec::new();
		let mut on_path: HashSet<&str> = HashSet::new();
		let mut cursor = node.id.as_str();
		let base = loop {
			if let Some(&level) = memo.get(cursor) {
				break Some(level);
			}
			if !on_path.insert(cursor) {
				let start = path.iter().position(|p| *p == cursor).unwrap_or(0);
				for &id in &path[start..] {
					memo.insert(id, 0);
				}
				path.truncate(start);
				break Some(0);
			}
			path.push(cursor);
			match parents.get(cursor).copied() {
				Some(parent) if known.contains(parent) => cursor = parent,
				_ => break None,
			}
		};
		// `None`: the last element of the path is a root.
		let mut level = match base {
			Some(level) => level + 1,
			None => 0,
		};
		let mut iter = path.iter().rev();
		if base.is_none() {
			if let Some(&root) = iter.next() {
				memo.insert(root, 0);
				level = 1;
			}
		}
		for &id in iter {
			memo.insert(id, level);
			level += 1;
		}
	}

	nodes
		.iter()
		.map(|n| (n.id.clone(), memo.get(n.id.as_str()).copied().unwrap_or(0)))
		.collect()
}

/// Levels stacked top to bottom, each spread evenly over a width that grows
/// geometrically with depth and centred on the origin.
pub fn pyramid(nodes: &[Node], params: &LayoutParams) -> PyramidLayout {
	let levels = pyramid_levels(nodes);
	let mut by_level: Vec<Vec<&NodeId>> = Vec::new();
	for (id, &level) in &levels {
		if by_level.len() <= level {
			by_level.resize_with(level + 1, Vec::new);
		}
		by_level[level].push(id);
	}

	let mut positions = IndexMap::with_capacity(nodes.len());
	for (level, ids) in by_level.iter().enumerate() {
		let width = params.base_width * params.width_scale_factor.powi(level as i32);
		let count = ids.len() as f64;
		for (i, id) in ids.iter().enumerate() {
			let x = params.origin.x - width / 2.0 + width * (i as f64 + 0.5) / count;
			let y = params.origin.y + level as f64 * params.level_spacing;
			positions.insert((*id).clone(), Point::new(x, y));
		}
	}
	// Report positions in input order.
	positions.sort_by_cached_key(|id, _| levels.get_index_of(id));
	PyramidLayout { positions, levels }
}

/// Spanning forest used by the tree and radial layouts. A node's parent is
/// its `parent` field when that resolves, otherwise the source of its first
/// incoming link. Anything unreachable (cycles) becomes an extra root.
struct Forest<'a> {
	roots: Vec<&'a str>,
	children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Forest<'a> {
	fn build(nodes: &'a [Node], links: &'a [Link]) -> Self {
		let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
		let mut parent: HashMap<&str, &str> = HashMap::new();
		for node in nodes {
			if let Some(p) = node.parent.as_deref() {
				if known.contains(p) && p != node.id {
					parent.insert(node.id.as_str(), p);
				}
			}
		}
		for link in links {
			let (s, t) = (link.source.as_str(), link.target.as_str());
			if s != t && known.contains(s) && known.contains(t) {
				parent.entry(t).or_insert(s);
			}
		}

		let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
		for node in nodes {
			if let Some(&p) = parent.get(node.id.as_str()) {
				children.entry(p).or_default().push(node.id.as_str());
			}
		}

		let mut roots: Vec<&str> = nodes
			.iter()
			.map(|n| n.id.as_str())
			.filter(|id| !parent.contains_key(id))
			.collect();

		let mut seen: HashSet<&str> = HashSet::new();
		let mut stack: Vec<&str> = roots.clone();
		let mark = |stack: &mut Vec<&'a str>, seen: &mut HashSet<&'a str>| {
			while let Some(id) = stack.pop() {
				if seen.insert(id) {
					if let Some(kids) = children.get(id) {
						stack.extend(kids.iter().copied());
					}
				}
			}
		};
		mark(&mut stack, &mut seen);
		for node in nodes {
			let id = node.id.as_str();
			if !seen.contains(id) {
				roots.push(id);
				stack.push(id);
				mark(&mut stack, &mut seen);
			}
		}

		// Cycle members promoted to roots must not also appear as children.
		let root_set: HashSet<&str> = roots.iter().copied().collect();
		for kids in children.values_mut() {
			kids.retain(|k| !root_set.contains(k));
		}
		Self { roots, children }
	}

	fn kids(&self, id: &str) -> &[&'a str] {
		self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
	}

	fn leaf_counts(&self) -> HashMap<&'a str, usize> {
		let mut counts = HashMap::new();
		for &root in &self.roots {
			self.count_leaves(root, &mut counts, &mut HashSet::new());
		}
		counts
	}

	fn count_leaves(
		&self,
		id: &'a str,
		counts: &mut HashMap<&'a str, usize>,
		visiting: &mut HashSet<&'a str>,
	) -> usize {
		if let Some(&n) = counts.get(id) {
			return n;
		}
		if !visiting.insert(id) {
			return 1;
		}
		let kids = self.kids(id);
		let n = if kids.is_empty() {
			1
		} else {
			kids.iter()
				.map(|&k| self.count_leaves(k, counts, visiting))
				.sum()
		};
		counts.insert(id, n);
		n
	}
}

/// Left-to-right tree: depth along x, leaves on consecutive rows, parents
/// centred on their children.
pub fn horizontal_tree(nodes: &[Node], links: &[Link], params: &LayoutParams) -> IndexMap<NodeId, Point> {
	let forest = Forest::build(nodes, links);
	let mut rows: HashMap<&str, (usize, f64)> = HashMap::new();
	let mut next_row = 0usize;
	let mut placed: HashSet<&str> = HashSet::new();

	fn place<'a>(
		forest: &Forest<'a>,
		id: &'a str,
		depth: usize,
		next_row: &mut usize,
		rows: &mut HashMap<&'a str, (usize, f64)>,
		placed: &mut HashSet<&'a str>,
	) -> f64 {
		if !placed.insert(id) {
			return rows.get(id).map(|r| r.1).unwrap_or(0.0);
		}
		let kids = forest.kids(id);
		let row = if kids.is_empty() {
			let row = *next_row as f64;
			*next_row += 1;
			row
		} else {
			let spots: Vec<f64> = kids
				.iter()
				.map(|&k| place(forest, k, depth + 1, next_row, rows, placed))
				.collect();
			(spots[0] + spots[spots.len() - 1]) / 2.0
		};
		rows.insert(id, (depth, row));
		row
	}

	for &root in &forest.roots {
		place(&forest, root, 0, &mut next_row, &mut rows, &mut placed);
	}

	nodes
		.iter()
		.map(|n| {
			let (depth, row) = rows.get(n.id.as_str()).copied().unwrap_or((0, 0.0));
			(
				n.id.clone(),
				Point::new(
					params.origin.x + depth as f64 * params.level_spacing,
					params.origin.y + row * params.sibling_spacing,
				),
			)
		})
		.collect()
}

/// Concentric rings by depth. Each subtree owns an angular wedge sized by
/// its leaf count; a single root sits at the centre, several roots share
/// the first ring.
pub fn radial(nodes: &[Node], links: &[Link], params: &LayoutParams) -> IndexMap<NodeId, Point> {
	let forest = Forest::build(nodes, links);
	let leaves = forest.leaf_counts();
	let mut out: HashMap<&str, Point> = HashMap::new();
	let ring_offset = if forest.roots.len() == 1 { 0 } else { 1 };

	let total: usize = forest.roots.iter().map(|r| leaves.get(r).copied().unwrap_or(1)).sum();
	let mut stack: Vec<(&str, usize, f64, f64)> = Vec::new();
	let mut start = 0.0;
	for &root in &forest.roots {
		let span = 2.0 * PI * leaves.get(root).copied().unwrap_or(1) as f64 / total.max(1) as f64;
		stack.push((root, ring_offset, start, span));
		start += span;
	}

	let mut seen: HashSet<&str> = HashSet::new();
	while let Some((id, ring, start, span)) = stack.pop() {
		if !seen.insert(id) {
			continue;
		}
		let radius = ring as f64 * params.ring_spacing;
		let angle = start + span / 2.0;
		out.insert(
			id,
			Point::new(
				params.origin.x + radius * angle.cos(),
				params.origin.y + radius * angle.sin(),
			),
		);
		let kids = forest.kids(id);
		let weight: usize = kids.iter().map(|k| leaves.get(k).copied().unwrap_or(1)).sum();
		let mut child_start = start;
		for &kid in kids {
			let child_span = span * leaves.get(kid).copied().unwrap_or(1) as f64 / weight.max(1) as f64;
			stack.push((kid, ring + 1, child_start, child_span));
			child_start += child_span;
		}
	}

	nodes
		.iter()
		.map(|n| (n.id.clone(), out.get(n.id.as_str()).copied().unwrap_or(params.origin)))
		.collect()
}

/// Positions for `kind`, keyed by node id in input order.
pub fn compute(kind: LayoutKind, nodes: &[Node], links: &[Link], params: &LayoutParams) -> IndexMap<NodeId, Point> {
	match kind {
		LayoutKind::Pyramid => pyramid(nodes, params).positions,
		LayoutKind::HorizontalTree => horizontal_tree(nodes, links, params),
		LayoutKind::Radial => radial(nodes, links, params),
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	fn child(id: &str, parent: Option<&str>) -> Node {
		let mut node = Node::text(id, 0.0, 0.0, id);
		node.parent = parent.map(str::to_owned);
		node
	}

	fn link(s: &str, t: &str) -> Link {
		Link {
			id: format!("{s}-{t}"),
			source: s.into(),
			target: t.into(),
		}
	}

	#[test]
	fn pyramid_chain_descends() {
		let nodes = vec![child("C", Some("B")), child("A", None), child("B", Some("A"))];
		let params = LayoutParams::default();
		let layout = pyramid(&nodes, &params);

		assert_eq!(layout.levels["A"], 0);
		assert_eq!(layout.levels["B"], 1);
		assert_eq!(layout.levels["C"], 2);
		let y = |id: &str| layout.positions[id].y;
		assert!(y("C") > y("B"));
		assert!(y("B") > y("A"));

		assert_eq!(pyramid(&nodes, &params), layout);
	}

	#[test]
	fn pyramid_missing_parent_is_root() {
		let nodes = vec![child("x", Some("gone"))];
		assert_eq!(pyramid_levels(&nodes)["x"], 0);
	}

	#[test]
	fn pyramid_cycle_falls_back_to_level_zero() {
		let nodes = vec![
			child("a", Some("b")),
			child("b", Some("a")),
			child("c", Some("a")),
		];
		let levels = pyramid_levels(&nodes);
		assert_eq!(levels["a"], 0);
		assert_eq!(levels["b"], 0);
		assert_eq!(levels["c"], 1);
	}

	#[test]
	fn pyramid_levels_are_centred_and_widen() {
		let nodes = vec![
			child("r", None),
			child("a", Some("r")),
			child("b", Some("r")),
		];
		let params = LayoutParams::default();
		let layout = pyramid(&nodes, &params);
		assert_eq!(layout.positions["r"].x, 0.0);
		let (a, b) = (layout.positions["a"].x, layout.positions["b"].x);
		assert_eq!(a, -b);
		assert_eq!(b - a, params.base_width * params.width_scale_factor / 2.0);
	}

	#[test]
	fn tree_siblings_get_distinct_rows() {
		let nodes = vec![child("r", None), child("a", None), child("b", None), child("c", None)];
		let links = vec![link("r", "a"), link("r", "b"), link("a", "c")];
		let pos = horizontal_tree(&nodes, &links, &LayoutParams::default());
		assert!(pos["a"].x > pos["r"].x);
		assert!(pos["c"].x > pos["a"].x);
		assert_ne!(pos["a"], pos["b"]);
	}

	#[test]
	fn radial_rings_follow_depth() {
		let nodes = vec![child("r", None), child("a", None), child("b", None), child("c", None)];
		let links = vec![link("r", "a"), link("r", "b"), link("a", "c")];
		let params = LayoutParams::default();
		let pos = radial(&nodes, &links, &params);
		let dist = |id: &str| (pos[id].x.powi(2) + pos[id].y.powi(2)).sqrt();
		assert_eq!(dist("r"), 0.0);
		assert!((dist("a") - params.ring_spacing).abs() < 1e-9);
		assert!((dist("c") - 2.0 * params.ring_spacing).abs() < 1e-9);
		assert_ne!(pos["a"], pos["b"]);
	}

	#[test]
	fn cyclic_links_terminate() {
		let nodes = vec![child("a", None), child("b", None)];
		let links = vec![link("a", "b"), link("b", "a")];
		for kind in [LayoutKind::Pyramid, LayoutKind::HorizontalTree, LayoutKind::Radial] {
			let pos = compute(kind, &nodes, &links, &LayoutParams::default());
			assert_eq!(pos.len(), 2);
		}
	}

	proptest! {
		#[test]
		fn layouts_are_deterministic(parents in proptest::collection::vec(proptest::option::of(0usize..8), 1..8)) {
			let nodes: Vec<Node> = parents
				.iter()
				.enumerate()
				.map(|(i, p)| {
					let mut n = Node::text(format!("n{i}"), 0.0, 0.0, "");
					n.parent = p.map(|p| format!("n{p}"));
					n
				})
				.collect();
			let links: Vec<Link> = nodes
				.iter()
				.filter_map(|n| n.parent.as_ref().map(|p| link(p, &n.id)))
				.collect();
			let params = LayoutParams::default();
			for kind in [LayoutKind::Pyramid, LayoutKind::HorizontalTree, LayoutKind::Radial] {
				let first = compute(kind, &nodes, &links, &params);
				prop_assert_eq!(first.len(), nodes.len());
				prop_assert_eq!(compute(kind, &nodes, &links, &params), first);
			}
		}
	}
}
