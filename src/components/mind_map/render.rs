use std::f64::consts::PI;

use web_sys::CanvasRenderingContext2d;

use super::state::CanvasState;
use crate::editor::{SessionState, Workspace};
use crate::graph::{Node, NodeContent, Point, TextAlign};

const BACKGROUND: &str = "#f7f7fb";
const LINK_COLOR: &str = "#7a869a";
const SELECTION_COLOR: &str = "#2f80ed";
const LOCK_COLOR: &str = "#eb5757";
const LINK_SOURCE_COLOR: &str = "#27ae60";
const LINE_HEIGHT: f64 = 1.25;
const PADDING: f64 = 6.0;

pub fn render(ws: &Workspace, canvas: &CanvasState, ctx: &CanvasRenderingContext2d) {
	let session = &canvas.session;
	let transform = &session.transform;

	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, canvas.width, canvas.height);
	ctx.save();
	let _ = ctx.translate(transform.pan.x, transform.pan.y);
	let _ = ctx.scale(transform.zoom, transform.zoom);
	draw_links(ws, session, ctx);
	for node in ws.store.nodes() {
		draw_node(ws, session, node, ctx);
	}
	ctx.restore();
}

fn center_of(session: &SessionState, node: &Node) -> Point {
	let p = session.display_position(node);
	let (w, h) = session.display_size(node);
	Point::new(p.x + w / 2.0, p.y + h / 2.0)
}

/// Distance from a box's center to its border along (`ux`, `uy`).
fn border_offset(w: f64, h: f64, ux: f64, uy: f64) -> f64 {
	let tx = if ux.abs() > 1e-9 { (w / 2.0) / ux.abs() } else { f64::INFINITY };
	let ty = if uy.abs() > 1e-9 { (h / 2.0) / uy.abs() } else { f64::INFINITY };
	tx.min(ty)
}

fn draw_links(ws: &Workspace, session: &SessionState, ctx: &CanvasRenderingContext2d) {
	let k = session.transform.zoom;
	let arrow_size = 8.0 / k.max(0.5);
	ctx.set_stroke_style_str(LINK_COLOR);
	ctx.set_fill_style_str(LINK_COLOR);
	ctx.set_line_width(1.5 / k.max(0.5));

	for link in ws.store.links() {
		let (Some(source), Some(target)) = (ws.store.node(&link.source), ws.store.node(&link.target)) else {
			continue;
		};
		let (a, b) = (center_of(session, source), center_of(session, target));
		let (dx, dy) = (b.x - a.x, b.y - a.y);
		let dist = (dx * dx + dy * dy).sqrt();
		if dist < 0.001 {
			continue;
		}
		let (ux, uy) = (dx / dist, dy / dist);
		let (sw, sh) = session.display_size(source);
		let (tw, th) = session.display_size(target);
		let start = border_offset(sw, sh, ux, uy);
		let end = border_offset(tw, th, ux, uy);
		if start + end >= dist {
			continue;
		}

		ctx.begin_path();
		ctx.move_to(a.x + ux * start, a.y + uy * start);
		ctx.line_to(b.x - ux * (end + arrow_size), b.y - uy * (end + arrow_size));
		ctx.stroke();

		let (tip_x, tip_y) = (b.x - ux * end, b.y - uy * end);
		let (back_x, back_y) = (tip_x - ux * arrow_size, tip_y - uy * arrow_size);
		let (px, py) = (-uy * arrow_size * 0.5, ux * arrow_size * 0.5);
		ctx.begin_path();
		ctx.move_to(tip_x, tip_y);
		ctx.line_to(back_x + px, back_y + py);
		ctx.line_to(back_x - px, back_y - py);
		ctx.close_path();
		ctx.fill();
	}
}

fn draw_node(ws: &Workspace, session: &SessionState, node: &Node, ctx: &CanvasRenderingContext2d) {
	let k = session.transform.zoom;
	let p = session.display_position(node);
	let (w, h) = session.display_size(node);
	let style = &node.style;

	ctx.set_fill_style_str(&style.background_color);
	ctx.fill_rect(p.x, p.y, w, h);

	let (border, border_width) = if session.pending_link_source() == Some(node.id.as_str()) {
		(LINK_SOURCE_COLOR, 2.5)
	} else if session.is_selected(&node.id) {
		(SELECTION_COLOR, 2.0)
	} else if node.locked_by_other(&ws.identity) {
		(LOCK_COLOR, 1.5)
	} else {
		("#c4c9d4", 1.0)
	};
	ctx.set_stroke_style_str(border);
	ctx.set_line_width(border_width / k.max(0.5));
	ctx.stroke_rect(p.x, p.y, w, h);

	match &node.content {
		NodeContent::Text { .. } => draw_text(session, node, p, w, h, ctx),
		NodeContent::Image { .. } => {
			// Images are drawn as a labelled placeholder.
			ctx.set_fill_style_str("#9aa3b2");
			ctx.set_font("12px sans-serif");
			ctx.set_text_align("center");
			let _ = ctx.fill_text("image", p.x + w / 2.0, p.y + h / 2.0 + 4.0);
		}
	}

	if let Some(holder) = node.locked_by.as_deref().filter(|_| node.locked_by_other(&ws.identity)) {
		ctx.set_fill_style_str(LOCK_COLOR);
		ctx.set_font(&format!("{}px sans-serif", 10.0 / k.max(0.5)));
		ctx.set_text_align("left");
		let _ = ctx.fill_text(&format!("editing: {holder}"), p.x, p.y - 4.0 / k.max(0.5));
	}

	if node.typing {
		ctx.set_fill_style_str(LOCK_COLOR);
		for i in 0..3 {
			ctx.begin_path();
			let _ = ctx.arc(p.x + w - 18.0 + i as f64 * 6.0, p.y + h + 6.0, 2.0, 0.0, 2.0 * PI);
			ctx.fill();
		}
	}

	if session.is_selected(&node.id) {
		let grip = ws.config.resize_handle;
		ctx.set_fill_style_str(SELECTION_COLOR);
		ctx.fill_rect(p.x + w - grip, p.y + h - grip, grip, grip);
	}
}

fn draw_text(session: &SessionState, node: &Node, p: Point, w: f64, h: f64, ctx: &CanvasRenderingContext2d) {
	let Some(text) = session.display_text(node) else {
		return;
	};
	let style = &node.style;
	let weight = if style.bold { "bold " } else { "" };
	let slant = if style.italic { "italic " } else { "" };
	ctx.set_font(&format!(
		"{slant}{weight}{}px {}",
		style.font_size,
		style.font_family.as_str()
	));
	ctx.set_fill_style_str(&style.text_color);
	ctx.set_text_align(style.text_align.as_str());

	let x = match style.text_align {
		TextAlign::Left => p.x + PADDING,
		TextAlign::Center => p.x + w / 2.0,
		TextAlign::Right => p.x + w - PADDING,
	};
	let line_height = style.font_size * LINE_HEIGHT;
	let lines: Vec<&str> = text.split('\n').collect();
	let block = line_height * lines.len() as f64;
	let mut y = p.y + (h - block) / 2.0 + style.font_size;

	for line in lines {
		let _ = ctx.fill_text(line, x, y);
		if style.underline || style.strikethrough {
			let width = ctx.measure_text(line).map(|m| m.width()).unwrap_or(0.0);
			let left = match style.text_align {
				TextAlign::Left => x,
				TextAlign::Center => x - width / 2.0,
				TextAlign::Right => x - width,
			};
			ctx.set_stroke_style_str(&style.text_color);
			ctx.set_line_width(1.0);
			if style.underline {
				ctx.begin_path();
				ctx.move_to(left, y + 2.0);
				ctx.line_to(left + width, y + 2.0);
				ctx.stroke();
			}
			if style.strikethrough {
				let mid = y - style.font_size * 0.3;
				ctx.begin_path();
				ctx.move_to(left, mid);
				ctx.line_to(left + width, mid);
				ctx.stroke();
			}
		}
		y += line_height;
	}

	if session.editing.as_ref().is_some_and(|e| e.node_id == node.id) {
		// caret
		let last = text.rsplit('\n').next().unwrap_or_default();
		let width = ctx.measure_text(last).map(|m| m.width()).unwrap_or(0.0);
		let caret_x = match style.text_align {
			TextAlign::Left => x + width,
			TextAlign::Center => x + width / 2.0,
			TextAlign::Right => x,
		};
		let caret_y = y - line_height;
		ctx.set_stroke_style_str(SELECTION_COLOR);
		ctx.begin_path();
		ctx.move_to(caret_x + 1.0, caret_y - style.font_size);
		ctx.line_to(caret_x + 1.0, caret_y + 3.0);
		ctx.stroke();
	}
}
