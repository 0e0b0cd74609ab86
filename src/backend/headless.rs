//! In-process transport without a compositor
//!
//! Records every request the window makes and replays events queued through a
//! [`HeadlessHandle`]. `dispatch` never blocks: an empty queue yields an empty
//! batch.

use super::{Backend, BufferId, ProtocolEvent};
use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};
use log::debug;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A buffer as it looked when attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedBuffer {
    pub id: BufferId,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixels: Vec<u8>,
}

/// A request issued against the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSurface { title: String },
    AckConfigure(u32),
    Attach(AttachedBuffer),
    DamageAll,
    Commit,
    RequestFrame,
    SetTitle(String),
    DestroyToplevel,
    DestroySurface,
    Flush,
}

#[derive(Debug, Default)]
struct Inner {
    requests: Vec<Request>,
    batches: VecDeque<Vec<ProtocolEvent>>,
    disconnected: Option<String>,
    next_buffer: u64,
}

/// Transport that talks to nobody
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    inner: Rc<RefCell<Inner>>,
}

/// Test-side view of a [`HeadlessBackend`]
#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    inner: Rc<RefCell<Inner>>,
}

impl HeadlessBackend {
    pub fn new() -> (Self, HeadlessHandle) {
        let backend = Self::default();
        let handle = HeadlessHandle {
            inner: backend.inner.clone(),
        };
        (backend, handle)
    }

    fn record(&self, request: Request) {
        self.inner.borrow_mut().requests.push(request);
    }
}

impl HeadlessHandle {
    /// Queue one batch; each `dispatch` call delivers one batch
    pub fn push_batch(&self, events: Vec<ProtocolEvent>) {
        self.inner.borrow_mut().batches.push_back(events);
    }

    pub fn push(&self, event: ProtocolEvent) {
        self.push_batch(vec![event]);
    }

    /// Make every later dispatch fail as if the socket closed
    pub fn disconnect(&self, reason: &str) {
        self.inner.borrow_mut().disconnected = Some(reason.to_string());
    }

    /// All requests so far
    pub fn requests(&self) -> Vec<Request> {
        self.inner.borrow().requests.clone()
    }

    /// Requests so far, clearing the log
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.inner.borrow_mut().requests)
    }

    /// Buffers attached so far
    pub fn attached(&self) -> Vec<AttachedBuffer> {
        self.inner
            .borrow()
            .requests
            .iter()
            .filter_map(|r| match r {
                Request::Attach(buffer) => Some(buffer.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, request: &Request) -> usize {
        self.inner
            .borrow()
            .requests
            .iter()
            .filter(|r| *r == request)
            .count()
    }

    pub fn pending_batches(&self) -> usize {
        self.inner.borrow().batches.len()
    }
}

impl Backend for HeadlessBackend {
    fn dispatch(&mut self, events: &mut Vec<ProtocolEvent>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(reason) = &inner.disconnected {
            return Err(EngineError::ConnectionLost(reason.clone()));
        }
        if let Some(batch) = inner.batches.pop_front() {
            events.extend(batch);
        }
        Ok(())
    }

    fn create_surface(&mut self, title: &str) -> Result<()> {
        self.record(Request::CreateSurface {
            title: title.to_string(),
        });
        Ok(())
    }

    fn ack_configure(&mut self, serial: u32) {
        self.record(Request::AckConfigure(serial));
    }

    fn attach(&mut self, buffer: PixelBuffer) -> BufferId {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_buffer += 1;
            BufferId(inner.next_buffer)
        };
        debug!("Headless attach {:?} {}x{}", id, buffer.width(), buffer.height());
        self.record(Request::Attach(AttachedBuffer {
            id,
            width: buffer.width(),
            height: buffer.height(),
            stride: buffer.stride(),
            pixels: buffer.pixels().to_vec(),
        }));
        id
    }

    fn damage_all(&mut self) {
        self.record(Request::DamageAll);
    }

    fn commit(&mut self) {
        self.record(Request::Commit);
    }

    fn request_frame(&mut self) {
        self.record(Request::RequestFrame);
    }

    fn set_title(&mut self, title: &str) {
        self.record(Request::SetTitle(title.to_string()));
    }

    fn destroy_toplevel(&mut self) {
        self.record(Request::DestroyToplevel);
    }

    fn destroy_surface(&mut self) {
        self.record(Request::DestroySurface);
    }

    fn flush(&mut self) -> Result<()> {
        self.record(Request::Flush);
        Ok(())
    }
}
