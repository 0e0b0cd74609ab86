//! Wayland transport over `wayland-client` and xdg-shell
//!
//! Wire events are translated into [`ProtocolEvent`]s in arrival order.
//! Duties that never involve the window state machine stay here: answering
//! pings, destroying released buffers, binding keyboard/pointer when the seat
//! announces them, and compiling received keymaps.

use super::globals::Capabilities;
use super::{Backend, BufferId, ProtocolEvent};
use crate::buffer::PixelBuffer;
use crate::config::{EngineConfig, KeyboardConfig};
use crate::error::{EngineError, Result};
use crate::input::{
    KeyAction, KeyDecoder, KeyboardEvent, ModifierMasks, PointerEvent, ScrollAxis, XkbKeyboard,
};
use log::{debug, info, trace, warn};
use memmap2::MmapOptions;
use std::fs::File;
use std::os::fd::{AsFd, OwnedFd};
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_callback::{self, WlCallback},
    wl_compositor::WlCompositor,
    wl_keyboard::{self, WlKeyboard},
    wl_pointer::{self, WlPointer},
    wl_registry::{self, WlRegistry},
    wl_seat::{self, WlSeat},
    wl_shm::{self, WlShm},
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};
use xkbcommon::xkb;

/// First `wl_pointer` version that sends `frame`
const POINTER_FRAME_SINCE: u32 = 5;

/// Event-queue state: translated events waiting for the next `dispatch`
pub struct WaylandInbox {
    events: Vec<ProtocolEvent>,
    xkb_context: xkb::Context,
    keyboard_config: KeyboardConfig,
    keyboard: Option<WlKeyboard>,
    pointer: Option<WlPointer>,
}

impl WaylandInbox {
    fn new(keyboard_config: KeyboardConfig) -> Self {
        Self {
            events: Vec::new(),
            xkb_context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keyboard_config,
            keyboard: None,
            pointer: None,
        }
    }

    fn push_keymap(&mut self, keyboard: XkbKeyboard) {
        let decoder: Box<dyn KeyDecoder> = Box::new(keyboard);
        self.events
            .push(ProtocolEvent::Keyboard(KeyboardEvent::Keymap(decoder)));
    }
}

/// A live connection with one toplevel surface
pub struct WaylandBackend {
    connection: Connection,
    queue: EventQueue<WaylandInbox>,
    qh: QueueHandle<WaylandInbox>,
    inbox: WaylandInbox,
    caps: Capabilities,
    surface: Option<WlSurface>,
    xdg_surface: Option<XdgSurface>,
    toplevel: Option<XdgToplevel>,
    app_id: Option<String>,
    next_buffer: u64,
}

impl WaylandBackend {
    /// Connect through `WAYLAND_DISPLAY` and bind the required globals.
    ///
    /// Returns only after a full registry roundtrip.
    pub fn connect(config: &EngineConfig) -> Result<Self> {
        let connection =
            Connection::connect_to_env().map_err(|e| EngineError::NoDisplay(e.to_string()))?;
        let (globals, queue) = registry_queue_init::<WaylandInbox>(&connection)
            .map_err(|e| EngineError::NoDisplay(e.to_string()))?;
        let qh = queue.handle();

        let caps = Capabilities::bind(&globals, &qh)?;
        info!("🔌 Connected to Wayland display");

        Ok(Self {
            connection,
            queue,
            qh,
            inbox: WaylandInbox::new(config.keyboard.clone()),
            caps,
            surface: None,
            xdg_surface: None,
            toplevel: None,
            app_id: config.window.app_id.clone(),
            next_buffer: 0,
        })
    }

    pub fn has_seat(&self) -> bool {
        self.caps.seat.is_some()
    }
}

impl Backend for WaylandBackend {
    fn dispatch(&mut self, events: &mut Vec<ProtocolEvent>) -> Result<()> {
        self.queue
            .blocking_dispatch(&mut self.inbox)
            .map_err(|e| EngineError::ConnectionLost(e.to_string()))?;
        events.append(&mut self.inbox.events);
        Ok(())
    }

    fn create_surface(&mut self, title: &str) -> Result<()> {
        let surface = self.caps.compositor.create_surface(&self.qh, ());
        let xdg_surface = self.caps.wm_base.get_xdg_surface(&surface, &self.qh, ());
        let toplevel = xdg_surface.get_toplevel(&self.qh, ());
        toplevel.set_title(title.to_owned());
        if let Some(app_id) = &self.app_id {
            toplevel.set_app_id(app_id.clone());
        }
        surface.commit();

        self.surface = Some(surface);
        self.xdg_surface = Some(xdg_surface);
        self.toplevel = Some(toplevel);
        Ok(())
    }

    fn ack_configure(&mut self, serial: u32) {
        if let Some(xdg_surface) = &self.xdg_surface {
            xdg_surface.ack_configure(serial);
        }
    }

    fn attach(&mut self, buffer: PixelBuffer) -> BufferId {
        self.next_buffer += 1;
        let id = BufferId(self.next_buffer);

        // frame_len() keeps every size below i32::MAX
        let pool = self
            .caps
            .shm
            .create_pool(buffer.as_fd(), buffer.byte_len() as i32, &self.qh, ());
        let wl_buffer = pool.create_buffer(
            0,
            buffer.width() as i32,
            buffer.height() as i32,
            buffer.stride() as i32,
            wl_shm::Format::Xrgb8888,
            &self.qh,
            id,
        );
        pool.destroy();

        match &self.surface {
            Some(surface) => surface.attach(Some(&wl_buffer), 0, 0),
            None => wl_buffer.destroy(),
        }

        // Unmap and close our side; the compositor keeps its own reference
        drop(buffer);
        trace!("Attached {:?}", id);
        id
    }

    fn damage_all(&mut self) {
        if let Some(surface) = &self.surface {
            surface.damage_buffer(0, 0, i32::MAX, i32::MAX);
        }
    }

    fn commit(&mut self) {
        if let Some(surface) = &self.surface {
            surface.commit();
        }
    }

    fn request_frame(&mut self) {
        if let Some(surface) = &self.surface {
            surface.frame(&self.qh, ());
        }
    }

    fn set_title(&mut self, title: &str) {
        if let Some(toplevel) = &self.toplevel {
            toplevel.set_title(title.to_owned());
        }
    }

    fn destroy_toplevel(&mut self) {
        if let Some(toplevel) = self.toplevel.take() {
            toplevel.destroy();
        }
        if let Some(xdg_surface) = self.xdg_surface.take() {
            xdg_surface.destroy();
        }
    }

    fn destroy_surface(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.connection
            .flush()
            .map_err(|e| EngineError::ConnectionLost(e.to_string()))
    }
}

impl Drop for WaylandBackend {
    fn drop(&mut self) {
        self.destroy_toplevel();
        self.destroy_surface();
        let _ = self.connection.flush();
    }
}

fn compile_keymap(context: &xkb::Context, fd: OwnedFd, size: u32) -> Result<XkbKeyboard> {
    let file = File::from(fd);
    // Since wl_keyboard v7 the fd must be mapped private
    let map = unsafe { MmapOptions::new().len(size as usize).map_copy_read_only(&file)? };
    let end = map.iter().position(|&b| b == 0).unwrap_or(map.len());
    let text = std::str::from_utf8(&map[..end])
        .map_err(|e| EngineError::Keymap(e.to_string()))?
        .to_owned();
    XkbKeyboard::from_string(context, text)
}

fn scroll_axis(axis: WEnum<wl_pointer::Axis>) -> Option<ScrollAxis> {
    match axis {
        WEnum::Value(wl_pointer::Axis::VerticalScroll) => Some(ScrollAxis::Vertical),
        WEnum::Value(wl_pointer::Axis::HorizontalScroll) => Some(ScrollAxis::Horizontal),
        _ => None,
    }
}

/* ---------- Dispatch ---------- */

impl Dispatch<WlRegistry, GlobalListContents> for WaylandInbox {
    fn event(
        _state: &mut Self,
        _proxy: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Globals appearing later are not used
        if let wl_registry::Event::Global { interface, .. } = event {
            trace!("Late global {}", interface);
        }
    }
}

impl Dispatch<XdgWmBase, ()> for WaylandInbox {
    fn event(
        _state: &mut Self,
        proxy: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            proxy.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        _proxy: &XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.events.push(ProtocolEvent::SurfaceConfigure { serial });
        }
    }
}

impl Dispatch<XdgToplevel, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        _proxy: &XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state
                    .events
                    .push(ProtocolEvent::ToplevelConfigure { width, height });
            }
            xdg_toplevel::Event::Close => state.events.push(ProtocolEvent::CloseRequested),
            _ => {}
        }
    }
}

impl Dispatch<WlCallback, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        _proxy: &WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.events.push(ProtocolEvent::FrameDone);
        }
    }
}

impl Dispatch<WlBuffer, BufferId> for WaylandInbox {
    fn event(
        state: &mut Self,
        proxy: &WlBuffer,
        event: wl_buffer::Event,
        data: &BufferId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            proxy.destroy();
            state.events.push(ProtocolEvent::BufferReleased(*data));
        }
    }
}

impl Dispatch<WlSeat, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(caps),
        } = event
        else {
            return;
        };

        let has_keyboard = caps.contains(wl_seat::Capability::Keyboard);
        let has_pointer = caps.contains(wl_seat::Capability::Pointer);
        debug!("Seat capabilities: keyboard={} pointer={}", has_keyboard, has_pointer);

        if has_keyboard && state.keyboard.is_none() {
            state.keyboard = Some(seat.get_keyboard(qh, ()));
            if state.keyboard_config.fallback_keymap {
                match XkbKeyboard::from_names(&state.xkb_context, &state.keyboard_config) {
                    Ok(keyboard) => state.push_keymap(keyboard),
                    Err(e) => warn!("Fallback keymap unavailable: {}", e),
                }
            }
        } else if !has_keyboard {
            if let Some(keyboard) = state.keyboard.take() {
                if keyboard.version() >= 3 {
                    keyboard.release();
                }
            }
        }

        if has_pointer && state.pointer.is_none() {
            state.pointer = Some(seat.get_pointer(qh, ()));
        } else if !has_pointer {
            if let Some(pointer) = state.pointer.take() {
                if pointer.version() >= 3 {
                    pointer.release();
                }
            }
        }
    }
}

impl Dispatch<WlKeyboard, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        _proxy: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let translated = match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if !matches!(format, WEnum::Value(wl_keyboard::KeymapFormat::XkbV1)) {
                    warn!("Ignoring keymap in unsupported format {:?}", format);
                    return;
                }
                match compile_keymap(&state.xkb_context, fd, size) {
                    Ok(keyboard) => state.push_keymap(keyboard),
                    Err(e) => warn!("Compositor keymap rejected: {}", e),
                }
                return;
            }
            wl_keyboard::Event::Enter { keys, .. } => {
                let keys = keys
                    .chunks_exact(4)
                    .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                KeyboardEvent::Enter { keys }
            }
            wl_keyboard::Event::Leave { .. } => KeyboardEvent::Leave,
            wl_keyboard::Event::Key {
                key,
                state: key_state,
                ..
            } => {
                let action = match key_state {
                    WEnum::Value(wl_keyboard::KeyState::Pressed) => KeyAction::Pressed,
                    WEnum::Value(wl_keyboard::KeyState::Released) => KeyAction::Released,
                    _ => return,
                };
                KeyboardEvent::Key { key, action }
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => KeyboardEvent::Modifiers(ModifierMasks {
                depressed: mods_depressed,
                latched: mods_latched,
                locked: mods_locked,
                group,
            }),
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                KeyboardEvent::RepeatInfo { rate, delay }
            }
            _ => return,
        };
        state.events.push(ProtocolEvent::Keyboard(translated));
    }
}

impl Dispatch<WlPointer, ()> for WaylandInbox {
    fn event(
        state: &mut Self,
        proxy: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let translated = match event {
            wl_pointer::Event::Enter {
                surface_x,
                surface_y,
                ..
            } => PointerEvent::Enter {
                x: surface_x,
                y: surface_y,
            },
            wl_pointer::Event::Leave { .. } => PointerEvent::Leave,
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => PointerEvent::Motion {
                x: surface_x,
                y: surface_y,
            },
            wl_pointer::Event::Button {
                button,
                state: button_state,
                ..
            } => {
                let action = match button_state {
                    WEnum::Value(wl_pointer::ButtonState::Pressed) => KeyAction::Pressed,
                    _ => KeyAction::Released,
                };
                PointerEvent::Button { button, action }
            }
            wl_pointer::Event::Axis { axis, value, .. } => match scroll_axis(axis) {
                Some(axis) => PointerEvent::Axis { axis, value },
                None => return,
            },
            wl_pointer::Event::AxisSource { .. } => PointerEvent::AxisSource,
            wl_pointer::Event::AxisStop { axis, .. } => match scroll_axis(axis) {
                Some(axis) => PointerEvent::AxisStop { axis },
                None => return,
            },
            wl_pointer::Event::AxisDiscrete { axis, discrete } => match scroll_axis(axis) {
                Some(axis) => PointerEvent::AxisDiscrete { axis, discrete },
                None => return,
            },
            wl_pointer::Event::Frame => PointerEvent::Frame,
            _ => return,
        };

        let needs_terminator =
            proxy.version() < POINTER_FRAME_SINCE && translated != PointerEvent::Frame;
        state.events.push(ProtocolEvent::Pointer(translated));
        // Old seats never send frame: every event is its own batch
        if needs_terminator {
            state.events.push(ProtocolEvent::Pointer(PointerEvent::Frame));
        }
    }
}

wayland_client::delegate_noop!(WaylandInbox: ignore WlCompositor);
wayland_client::delegate_noop!(WaylandInbox: ignore WlShm);
wayland_client::delegate_noop!(WaylandInbox: ignore WlShmPool);
wayland_client::delegate_noop!(WaylandInbox: ignore WlSurface);
