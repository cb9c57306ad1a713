use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use leptos::prelude::*;
use leptos::task::spawn_local;
use log::{info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent, Window};

use super::render;
use super::state::{BusyGuard, CanvasState, EditorHandle};
use crate::ai::{self, AiInstruction};
use crate::collab::{self, Presence};
use crate::editor::Workspace;
use crate::editor::controller::{self, KeyInput, PointerInput};
use crate::graph::{LayoutKind, Point};
use crate::sync::{self, MemoryRemote, RemoteStore};

fn canvas_point(canvas: &HtmlCanvasElement, ev: &MouseEvent) -> Point {
	let rect = canvas.get_bounding_client_rect();
	Point::new(
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	)
}

fn pointer(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<PointerInput> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	Some(PointerInput {
		position: canvas_point(&canvas, ev),
		shift: ev.shift_key(),
	})
}

fn window_size(window: &Window) -> Option<(f64, f64)> {
	Some((
		window.inner_width().ok()?.as_f64()?,
		window.inner_height().ok()?.as_f64()?,
	))
}

fn now_ms() -> f64 {
	js_sys::Date::now()
}

/// Pan/zoom canvas editor bound to one open document.
#[component]
pub fn MindMapCanvas(
	workspace: Rc<RefCell<Workspace>>,
	remote: MemoryRemote,
	/// Status line shared with the surrounding page.
	status: RwSignal<Option<String>>,
	/// In-flight async work, shown as a saving indicator.
	busy: RwSignal<usize>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let canvas_state: Rc<RefCell<Option<CanvasState>>> = Rc::new(RefCell::new(None));
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let handle = EditorHandle {
		workspace,
		canvas: canvas_state,
		remote,
		status,
		busy,
	};

	let (handle_init, animate_init, resize_cb_init) = (handle.clone(), animate.clone(), resize_cb.clone());
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};
		let Some((w, h)) = window_size(&window) else {
			return;
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx: CanvasRenderingContext2d = match canvas.get_context("2d") {
			Ok(Some(ctx)) => match ctx.dyn_into() {
				Ok(ctx) => ctx,
				Err(_) => return,
			},
			_ => {
				warn!("2d canvas context unavailable");
				return;
			}
		};

		let (identity, throttle_ms, token) = {
			let ws = handle_init.workspace.borrow();
			(ws.identity.clone(), ws.config.typing_throttle_ms, ws.token())
		};
		let (presence, mut typing_rx) = Presence::channel(identity.clone(), throttle_ms);
		*handle_init.canvas.borrow_mut() = Some(CanvasState::new(presence, w, h));

		// Remote feed into the store.
		let mut feed = handle_init.remote.subscribe(&token.document_id);
		let (ws_feed, status) = (handle_init.workspace.clone(), handle_init.status);
		let feed_token = token.clone();
		spawn_local(async move {
			while let Some(event) = feed.next().await {
				if let Some(message) = sync::apply_feed_event(&mut ws_feed.borrow_mut(), &feed_token, event) {
					status.set(Some(message));
				}
			}
			info!("document feed closed");
		});

		// Presence signals; the in-memory backend only echoes our own.
		let ws_typing = handle_init.workspace.clone();
		spawn_local(async move {
			while let Some(signal) = typing_rx.next().await {
				collab::apply_typing(&mut ws_typing.borrow_mut().store, &signal, &identity);
			}
		});

		let (state_resize, canvas_resize) = (handle_init.canvas.clone(), canvas.clone());
		*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
			let Some((nw, nh)) = web_sys::window().as_ref().and_then(window_size) else {
				return;
			};
			canvas_resize.set_width(nw as u32);
			canvas_resize.set_height(nh as u32);
			if let Some(ref mut s) = *state_resize.borrow_mut() {
				s.resize(nw, nh);
			}
		}));
		if let Some(ref cb) = *resize_cb_init.borrow() {
			let _ = window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
		}

		let (handle_anim, animate_inner) = (handle_init.clone(), animate_init.clone());
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			if let Some(ref s) = *handle_anim.canvas.borrow() {
				render::render(&handle_anim.workspace.borrow(), s, &ctx);
			}
			if let (Some(cb), Some(win)) = (animate_inner.borrow().as_ref(), web_sys::window()) {
				let _ = win.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let h = handle.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(input) = pointer(canvas_ref, &ev) else {
			return;
		};
		h.update(|ws, c| controller::pointer_down(ws, &mut c.session, Some(&mut c.presence), input));
	};

	let h = handle.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some(input) = pointer(canvas_ref, &ev) else {
			return;
		};
		h.update(|ws, c| controller::pointer_move(ws, &mut c.session, input));
	};

	let h = handle.clone();
	let on_mouseup = move |_: MouseEvent| {
		h.update(|ws, c| controller::pointer_up(ws, &mut c.session));
	};

	let h = handle.clone();
	let on_mouseleave = move |_: MouseEvent| {
		h.update(|ws, c| {
			controller::pointer_up(ws, &mut c.session);
			c.session.hover = None;
		});
	};

	let h = handle.clone();
	let on_dblclick = move |ev: MouseEvent| {
		let Some(input) = pointer(canvas_ref, &ev) else {
			return;
		};
		h.update(|ws, c| {
			controller::double_click(ws, &mut c.session, Some(&mut c.presence), input);
		});
	};

	let h = handle.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some(input) = pointer(canvas_ref, &ev) else {
			return;
		};
		h.update(|ws, c| controller::wheel(ws, &mut c.session, input.position, ev.delta_y()));
	};

	let h = handle.clone();
	let on_keydown = move |ev: KeyboardEvent| {
		let input = KeyInput {
			key: ev.key(),
			ctrl: ev.ctrl_key() || ev.meta_key(),
			shift: ev.shift_key(),
		};
		if input.ctrl || input.key == "Backspace" || input.key == " " {
			ev.prevent_default();
		}
		h.update(|ws, c| controller::key_down(ws, &mut c.session, Some(&mut c.presence), &input, now_ms()));
	};

	// Toolbar actions.
	let toolbar = |label: &'static str, h: EditorHandle, action: fn(&mut Workspace, &mut CanvasState)| {
		view! { <button on:click=move |_| h.update(action)>{label}</button> }
	};

	let (instruction_text, set_instruction_text) = signal(String::new());
	let h = handle.clone();
	let on_apply_ai = move |_: MouseEvent| {
		let text = instruction_text.get();
		let instruction = match AiInstruction::from_json(&text) {
			Ok(instruction) => instruction,
			Err(err) => {
				h.status.set(Some(format!("Invalid instruction: {err}")));
				return;
			}
		};
		let drop_point = match h.canvas.borrow().as_ref() {
			Some(c) => c
				.session
				.transform
				.screen_to_canvas(Point::new(c.width / 2.0, c.height / 2.0)),
			None => Point::default(),
		};
		let token = h.workspace.borrow().token();
		let h = h.clone();
		let guard = BusyGuard::new(h.busy);
		spawn_local(async move {
			let _busy = guard;
			if let Some(report) = ai::run(&h.workspace, &token, &instruction, None, drop_point).await {
				h.status.set(Some(report.summary()));
				h.flush();
			}
		});
	};

	let h = handle.clone();
	let on_import = move |_: MouseEvent| {
		let text = instruction_text.get();
		let result = h.workspace.borrow_mut().import(&text);
		match result {
			Ok(report) => h.status.set(Some(format!(
				"Imported {} nodes, {} links ({} dropped)",
				report.nodes_added, report.links_added, report.links_dropped
			))),
			Err(err) => h.status.set(Some(format!("Import failed: {err}"))),
		}
		h.flush();
	};

	let h = handle.clone();
	let on_export = move |_: MouseEvent| {
		set_instruction_text.set(h.workspace.borrow().export());
	};

	view! {
		<div class="mind-map-editor">
			<div class="toolbar">
				{toolbar("Add node", handle.clone(), |ws, c| {
					let center = Point::new(c.width / 2.0, c.height / 2.0);
					let _ = controller::add_node_at(ws, &mut c.session, center, "New idea");
				})}
				{toolbar("Link", handle.clone(), |_, c| controller::start_linking(&mut c.session))}
				{toolbar("Delete", handle.clone(), |ws, c| {
					let ids: Vec<_> = c.session.selection.drain().collect();
					ws.delete_nodes(&ids);
				})}
				{toolbar("Undo", handle.clone(), |ws, _| {
					ws.undo();
				})}
				{toolbar("Redo", handle.clone(), |ws, _| {
					ws.redo();
				})}
				{toolbar("Zoom +", handle.clone(), |ws, c| c.session.transform.zoom_in(&ws.config))}
				{toolbar("Zoom -", handle.clone(), |ws, c| c.session.transform.zoom_out(&ws.config))}
				{toolbar("Pyramid", handle.clone(), |ws, _| {
					ws.apply_layout(LayoutKind::Pyramid);
				})}
				{toolbar("Tree", handle.clone(), |ws, _| {
					ws.apply_layout(LayoutKind::HorizontalTree);
				})}
				{toolbar("Radial", handle.clone(), |ws, _| {
					ws.apply_layout(LayoutKind::Radial);
				})}
			</div>
			<canvas
				node_ref=canvas_ref
				class="mind-map-canvas"
				tabindex="0"
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:dblclick=on_dblclick
				on:wheel=on_wheel
				on:keydown=on_keydown
				style="display: block; outline: none;"
			/>
			<div class="side-panel">
				<textarea
					placeholder="AI instruction or exported document JSON"
					prop:value=move || instruction_text.get()
					on:input=move |ev| set_instruction_text.set(event_target_value(&ev))
				/>
				<button on:click=on_apply_ai>"Apply AI instruction"</button>
				<button on:click=on_import>"Import"</button>
				<button on:click=on_export>"Export"</button>
			</div>
			<p class="status">
				{move || (busy.get() > 0).then(|| view! { <span class="busy">"Working..."</span> })}
				{move || status.get().unwrap_or_default()}
			</p>
		</div>
	}
}
