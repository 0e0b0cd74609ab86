//! Window lifecycle
//!
//! A [`Window`] owns one connection, one toplevel surface, its frame pacer and
//! its input callbacks. Nothing is shared between windows.
//!
//! ```text
//! Connecting ─► Bound ─► Configuring ─(first configure)─► Open ─► Closing ─► Closed
//! ```
//!
//! Content is never attached before the first configure has been
//! acknowledged. After that, every frame signal re-arms the subscription, so
//! an open window always has exactly one outstanding frame request.

use crate::backend::{Backend, BufferId, ProtocolEvent, WaylandBackend};
use crate::buffer::{frame_len, PixelBuffer};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::input::{InputAggregator, KeyAction, Modifiers};
use crate::pacing::{FramePacer, FrameStats};
use log::{debug, error, info, trace, warn};
use std::collections::BTreeSet;


/// Lifecycle state of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Connecting,
    Bound,
    Configuring,
    Open,
    Closing,
    Closed,
}

/// Why a window stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The compositor asked the toplevel to close
    Requested,
    /// The transport failed
    ConnectionLost,
    /// The caller closed the window
    Closed,
}

/// A top-level window presenting caller-supplied XRGB8888 frames
pub struct Window<B: Backend = WaylandBackend> {
    backend: B,
    config: EngineConfig,
    state: WindowState,
    width: u32,
    height: u32,
    title: String,
    running: bool,
    configures: u64,
    pacer: FramePacer,
    input: InputAggregator,
    in_flight: BTreeSet<BufferId>,
    deferred_error: Option<EngineError>,
    close_reason: Option<CloseReason>,
    events: Vec<ProtocolEvent>,
}

impl Window<WaylandBackend> {
    /// Connect to the compositor and create a toplevel window.
    ///
    /// Nothing is visible until the compositor configures the surface during
    /// a later [`Window::should_close`].
    pub fn create(width: u32, height: u32, title: &str) -> Result<Self> {
        Self::create_with_config(width, height, title, EngineConfig::default())
    }

    pub fn create_with_config(
        width: u32,
        height: u32,
        title: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        frame_len(width, height)?;
        debug!("Window state: {:?}", WindowState::Connecting);
        let backend = WaylandBackend::connect(&config)?;
        Self::with_backend(backend, width, height, title, config)
    }
}

impl<B: Backend> Window<B> {
    /// Create a window over an already-connected transport
    pub fn with_backend(
        backend: B,
        width: u32,
        height: u32,
        title: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        frame_len(width, height)?;

        let mut window = Self {
            backend,
            config,
            state: WindowState::Bound,
            width,
            height,
            title: title.to_string(),
            running: true,
            configures: 0,
            pacer: FramePacer::new(),
            input: InputAggregator::new(),
            in_flight: BTreeSet::new(),
            deferred_error: None,
            close_reason: None,
            events: Vec::new(),
        };
        debug!("Window state: {:?}", window.state);

        window.backend.create_surface(title)?;
        window.transition(WindowState::Configuring);
        window.backend.flush()?;

        info!("🪟 Created window \"{}\" ({}x{})", title, width, height);
        Ok(window)
    }

    /// Process pending compositor events and report whether the window should
    /// close.
    ///
    /// Blocks until at least one event arrives. A lost connection is reported
    /// as `Ok(true)`; see [`Window::close_reason`].
    pub fn should_close(&mut self) -> Result<bool> {
        self.ensure_usable()?;
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        if !self.running {
            return Ok(true);
        }

        let mut events = std::mem::take(&mut self.events);
        let dispatched = self.backend.dispatch(&mut events);
        for event in events.drain(..) {
            self.handle_event(event);
        }
        self.events = events;

        if let Err(err) = dispatched {
            self.connection_lost(err);
            return Ok(true);
        }

        if self.state == WindowState::Open && self.running {
            self.pacer.ensure_armed(&mut self.backend);
        }

        if let Err(err) = self.backend.flush() {
            self.connection_lost(err);
            return Ok(true);
        }

        match self.deferred_error.take() {
            Some(err) => Err(err),
            None => Ok(!self.running),
        }
    }

    /// Current size in pixels
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        self.ensure_usable()?;
        Ok((self.width, self.height))
    }

    /// Queue a frame of exactly `width * height * 4` bytes of XRGB8888.
    ///
    /// Returns once the content is copied; it becomes visible at the next
    /// frame signal. A newer submission replaces one that has not been shown.
    pub fn submit_frame(&mut self, pixels: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        let expected = frame_len(self.width, self.height)?;
        if pixels.len() != expected {
            warn!(
                "Rejected frame of {} bytes for {}x{} window",
                pixels.len(),
                self.width,
                self.height
            );
            return Err(EngineError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let buffer = PixelBuffer::new(self.width, self.height, Some(pixels), &self.config.shm)?;
        self.pacer.request_redraw(buffer);
        Ok(())
    }

    /// Like [`Window::submit_frame`] with one `0xXXRRGGBB` word per pixel
    pub fn submit_pixels(&mut self, pixels: &[u32]) -> Result<()> {
        self.submit_frame(bytemuck::cast_slice(pixels))
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.ensure_usable()?;
        self.title = title.to_string();
        self.backend.set_title(title);
        self.backend.flush()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Called with the key name and action for each key event
    pub fn set_key_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&str, KeyAction) + 'static,
    {
        self.ensure_usable()?;
        self.input.callbacks.key = Some(Box::new(callback));
        Ok(())
    }

    /// Called once per pointer batch with the final position
    pub fn set_cursor_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(f64, f64) + 'static,
    {
        self.ensure_usable()?;
        self.input.callbacks.cursor = Some(Box::new(callback));
        Ok(())
    }

    /// Called for each button event in a pointer batch, in order
    pub fn set_button_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(u32, KeyAction) + 'static,
    {
        self.ensure_usable()?;
        self.input.callbacks.button = Some(Box::new(callback));
        Ok(())
    }

    /// Called with summed deltas for pointer batches that scrolled.
    ///
    /// The arguments are `(dx, dy)`: horizontal first, then vertical. Batches
    /// without axis events do not call it.
    pub fn set_scroll_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(f64, f64) + 'static,
    {
        self.ensure_usable()?;
        self.input.callbacks.scroll = Some(Box::new(callback));
        Ok(())
    }

    /// Last pointer position in surface coordinates
    pub fn cursor_position(&self) -> Result<(f64, f64)> {
        self.ensure_usable()?;
        Ok(self.input.cursor_position())
    }

    pub fn modifiers(&self) -> Result<Modifiers> {
        self.ensure_usable()?;
        Ok(self.input.modifiers())
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Buffers the compositor has not released yet
    pub fn buffers_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn frame_stats(&self) -> FrameStats {
        *self.pacer.stats()
    }

    /// Number of configure events acknowledged so far
    pub fn configure_count(&self) -> u64 {
        self.configures
    }

    /// Tear the window down: role objects first, then the surface
    pub fn close(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.running = false;
        if self.close_reason.is_none() {
            self.close_reason = Some(CloseReason::Closed);
        }
        if self.state != WindowState::Closing {
            self.transition(WindowState::Closing);
        }

        self.pacer.cancel();
        self.backend.destroy_toplevel();
        self.backend.destroy_surface();
        if let Err(err) = self.backend.flush() {
            debug!("Flush during close failed: {}", err);
        }

        self.transition(WindowState::Closed);
        info!("👋 Closed window \"{}\"", self.title);
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            WindowState::Closed => Err(EngineError::UseAfterClose),
            _ => Ok(()),
        }
    }

    fn transition(&mut self, next: WindowState) {
        debug!("Window state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn connection_lost(&mut self, err: EngineError) {
        error!("❌ {}", err);
        self.running = false;
        self.close_reason = Some(CloseReason::ConnectionLost);
        self.pacer.cancel();
        if self.state != WindowState::Closing {
            self.transition(WindowState::Closing);
        }
    }

    fn handle_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::SurfaceConfigure { serial } => self.on_configure(serial),
            ProtocolEvent::ToplevelConfigure { width, height } => self.on_resize(width, height),
            ProtocolEvent::CloseRequested => {
                info!("Compositor requested close of \"{}\"", self.title);
                self.running = false;
                self.close_reason.get_or_insert(CloseReason::Requested);
                if self.state != WindowState::Closing {
                    self.transition(WindowState::Closing);
                }
            }
            ProtocolEvent::FrameDone => self.on_frame_done(),
            ProtocolEvent::BufferReleased(id) => {
                if self.in_flight.remove(&id) {
                    trace!("{:?} released", id);
                } else {
                    warn!("Release for unknown {:?}", id);
                }
            }
            ProtocolEvent::Keyboard(event) => self.input.handle_keyboard(event),
            ProtocolEvent::Pointer(event) => self.input.handle_pointer(event),
        }
    }

    fn on_resize(&mut self, width: i32, height: i32) {
        // Zero means the compositor leaves the size to us
        if width <= 0 || height <= 0 {
            trace!("Ignoring suggested size {}x{}", width, height);
            return;
        }
        let (width, height) = (width as u32, height as u32);
        if (width, height) == (self.width, self.height) {
            return;
        }
        if let Err(err) = frame_len(width, height) {
            warn!("Ignoring suggested size: {}", err);
            return;
        }
        debug!(
            "Resized {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
    }

    fn on_configure(&mut self, serial: u32) {
        self.backend.ack_configure(serial);
        self.configures += 1;

        if self.state != WindowState::Configuring {
            self.backend.commit();
            return;
        }

        // Stale content of the wrong size is replaced with black
        let pending = self
            .pacer
            .take_pending()
            .filter(|b| (b.width(), b.height()) == (self.width, self.height));
        let first = match pending {
            Some(buffer) => Ok(buffer),
            None => PixelBuffer::new(self.width, self.height, None, &self.config.shm),
        };

        match first {
            Ok(buffer) => {
                let id = self.pacer.present(&mut self.backend, buffer);
                self.in_flight.insert(id);
            }
            Err(err) => {
                error!("First frame allocation failed: {}", err);
                self.pacer.rearm(&mut self.backend);
                self.deferred_error = Some(err);
            }
        }

        self.transition(WindowState::Open);
        info!("✅ Window \"{}\" is open", self.title);
    }

    fn on_frame_done(&mut self) {
        if self.state != WindowState::Open || !self.running {
            self.pacer.disarm();
            return;
        }
        if let Some(id) = self.pacer.on_frame_done(&mut self.backend) {
            self.in_flight.insert(id);
        }
    }
}

impl<B: Backend> Drop for Window<B> {
    fn drop(&mut self) {
        if self.state != WindowState::Closed {
            let _ = self.close();
        }
    }
}

impl<B: Backend> std::fmt::Debug for Window<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("title", &self.title)
            .field("state", &self.state)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("running", &self.running)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
