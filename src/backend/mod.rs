//! Transport seam between the window state machine and the compositor
//!
//! A [`Backend`] turns the compositor's asynchronous notifications into
//! ordered [`ProtocolEvent`] batches and carries out surface requests. The
//! state machine decides *when* to ack, attach, damage and commit; backends
//! only know *how*.
//!
//! Two transports ship with the crate:
//! - [`wayland::WaylandBackend`]: `wayland-client` + xdg-shell
//! - [`headless::HeadlessBackend`]: in-process, records requests and replays
//!   scripted events

pub mod globals;
pub mod headless;
pub mod wayland;

use crate::buffer::PixelBuffer;
use crate::error::Result;
use crate::input::{KeyboardEvent, PointerEvent};

pub use globals::Capability;
pub use headless::{HeadlessBackend, HeadlessHandle, Request};
pub use wayland::WaylandBackend;

/// Identifies a buffer handed to the compositor until it is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// One compositor notification, in arrival order
#[derive(Debug)]
pub enum ProtocolEvent {
    /// xdg_surface.configure; must be acked before any attach
    SurfaceConfigure { serial: u32 },
    /// xdg_toplevel.configure; zero means "client chooses"
    ToplevelConfigure { width: i32, height: i32 },
    /// xdg_toplevel.close
    CloseRequested,
    /// wl_callback.done for the frame subscription
    FrameDone,
    /// wl_buffer.release; the compositor is done reading this buffer
    BufferReleased(BufferId),
    Keyboard(KeyboardEvent),
    Pointer(PointerEvent),
}

/// Requests the window state machine issues against its surface
pub trait Backend {
    /// Block until at least one notification arrives and append the batch
    /// to `events`. Fails with `ConnectionLost` on a fatal transport error.
    fn dispatch(&mut self, events: &mut Vec<ProtocolEvent>) -> Result<()>;

    /// Create the surface and its toplevel role, set the title and make the
    /// initial (bufferless) commit
    fn create_surface(&mut self, title: &str) -> Result<()>;

    fn ack_configure(&mut self, serial: u32);

    /// Hand `buffer` to the compositor and attach it to the surface.
    ///
    /// The engine's mapping of the region is dropped here; the compositor
    /// owns display access until it reports [`ProtocolEvent::BufferReleased`].
    fn attach(&mut self, buffer: PixelBuffer) -> BufferId;

    /// Mark the whole surface as needing redisplay
    fn damage_all(&mut self);

    fn commit(&mut self);

    /// Ask for a [`ProtocolEvent::FrameDone`] after the next commit is shown
    fn request_frame(&mut self);

    fn set_title(&mut self, title: &str);

    /// Destroy the toplevel role objects. Must precede [`Backend::destroy_surface`].
    fn destroy_toplevel(&mut self);

    fn destroy_surface(&mut self);

    /// Push queued requests to the compositor
    fn flush(&mut self) -> Result<()>;
}
