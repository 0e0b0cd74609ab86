//! # Wayframe
//!
//! A small Wayland windowing engine. Open a toplevel window, hand it frames of
//! XRGB8888 pixels and receive keyboard, pointer and scroll callbacks.
//!
//! ## Architecture
//!
//! - `window`: lifecycle state machine and the public API
//! - `pacing`: frame-callback driven presentation with coalescing
//! - `buffer` / `shm`: anonymous shared-memory pixel buffers
//! - `input`: keymap decoding and pointer batch aggregation
//! - `backend`: Wayland transport and a headless transport for tests
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wayframe::Window;
//!
//! fn main() -> wayframe::Result<()> {
//!     let mut window = Window::create(800, 600, "Demo")?;
//!     let (w, h) = window.dimensions()?;
//!     window.submit_pixels(&vec![0xFFFF_FFFF; (w * h) as usize])?;
//!     while !window.should_close()? {}
//!     window.close()
//! }
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod pacing;
pub mod shm;
pub mod window;

pub use backend::{Backend, HeadlessBackend, WaylandBackend};
pub use buffer::PixelBuffer;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use input::{KeyAction, Modifiers};
pub use window::{CloseReason, Window, WindowState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
