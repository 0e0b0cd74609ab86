//! Input event aggregation
//!
//! Keyboard notifications are decoded immediately; pointer notifications are
//! batched until the compositor closes the batch. Callbacks live in a table
//! owned by each window.

pub mod keyboard;
pub mod pointer;

pub use keyboard::{KeyDecoder, KeyboardEvent, KeyboardState, ModifierMasks, Modifiers, XkbKeyboard};
pub use pointer::{CommittedFrame, PointerEvent, PointerFrame, ScrollAxis};

use log::trace;

/// Press/release for keys and pointer buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Pressed,
    Released,
}

pub type KeyCallback = Box<dyn FnMut(&str, KeyAction)>;
pub type CursorCallback = Box<dyn FnMut(f64, f64)>;
pub type ButtonCallback = Box<dyn FnMut(u32, KeyAction)>;
pub type ScrollCallback = Box<dyn FnMut(f64, f64)>;

/// Registered callbacks, at most one per kind
#[derive(Default)]
pub struct Callbacks {
    pub key: Option<KeyCallback>,
    pub cursor: Option<CursorCallback>,
    pub button: Option<ButtonCallback>,
    pub scroll: Option<ScrollCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("key", &self.key.is_some())
            .field("cursor", &self.cursor.is_some())
            .field("button", &self.button.is_some())
            .field("scroll", &self.scroll.is_some())
            .finish()
    }
}

/// Turns raw keyboard/pointer notifications into callback invocations
#[derive(Debug, Default)]
pub struct InputAggregator {
    pub callbacks: Callbacks,
    keyboard: KeyboardState,
    pointer: PointerFrame,
    cursor: (f64, f64),
    pointer_inside: bool,
}

impl InputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known cursor position in surface coordinates
    pub fn cursor_position(&self) -> (f64, f64) {
        self.cursor
    }

    pub fn pointer_inside(&self) -> bool {
        self.pointer_inside
    }

    pub fn modifiers(&self) -> Modifiers {
        self.keyboard.modifiers()
    }

    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    pub fn handle_keyboard(&mut self, event: KeyboardEvent) {
        self.keyboard.handle(event, self.callbacks.key.as_mut());
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        if let Some(frame) = self.pointer.accumulate(event) {
            self.dispatch_pointer(frame);
        }
    }

    fn dispatch_pointer(&mut self, frame: CommittedFrame) {
        trace!("Pointer frame: {:?}", frame);

        if let Some(inside) = frame.inside {
            self.pointer_inside = inside;
        }

        if let Some((x, y)) = frame.position {
            self.cursor = (x, y);
            if let Some(cb) = self.callbacks.cursor.as_mut() {
                cb(x, y);
            }
        }

        if let Some(cb) = self.callbacks.button.as_mut() {
            for (button, action) in &frame.buttons {
                cb(*button, *action);
            }
        }

        if let Some((dx, dy)) = frame.scroll {
            if let Some(cb) = self.callbacks.scroll.as_mut() {
                cb(dx, dy);
            }
        }
    }
}
