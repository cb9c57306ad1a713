use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;

use crate::components::mind_map::MindMapCanvas;
use crate::config::EditorConfig;
use crate::editor::Workspace;
use crate::graph::{GraphData, Link, Node, TextAlign};
use crate::sync::MemoryRemote;

const DEMO_DOCUMENT: &str = "demo";

/// A small starter map so the canvas is not empty.
fn sample_document() -> GraphData {
	let mut root = Node::text("root", 380.0, 60.0, "Project");
	root.style.bold = true;
	root.style.font_size = 16.0;
	let topics = ["Goals", "Risks", "Timeline"];
	let mut nodes = vec![root];
	let mut links = Vec::new();
	for (i, topic) in topics.iter().enumerate() {
		let id = format!("topic-{i}");
		let mut node = Node::text(id.clone(), 180.0 + i as f64 * 200.0, 220.0, *topic);
		node.parent = Some("root".into());
		node.style.text_align = TextAlign::Center;
		nodes.push(node);
		links.push(Link {
			id: format!("link-{i}"),
			source: "root".into(),
			target: id,
		});
	}
	GraphData { nodes, links }
}

/// One document backed by the in-memory store. Its state is created here so
/// nothing thread-bound crosses the error boundary.
#[component]
fn EditorSession() -> impl IntoView {
	let identity = format!("guest-{}", &crate::graph::new_id()[..8]);
	let remote = MemoryRemote::with_document(DEMO_DOCUMENT, sample_document());
	let workspace = Rc::new(RefCell::new(Workspace::new(
		DEMO_DOCUMENT,
		identity,
		EditorConfig::default(),
	)));
	let status = RwSignal::new(None::<String>);
	let busy = RwSignal::new(0usize);

	view! { <MindMapCanvas workspace=workspace remote=remote status=status busy=busy /> }
}

/// Editor page
#[component]
pub fn Editor() -> impl IntoView {
	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>
			<div class="fullscreen-editor">
				<EditorSession />
				<div class="editor-overlay">
					<h1>"Mind Map"</h1>
					<p class="subtitle">
						"Double-click a node to edit. Drag to move, drag the corner to resize. Scroll to zoom."
					</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}
