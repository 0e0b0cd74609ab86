//! Frame pacing driven by compositor frame callbacks
//!
//! Content is presented only when the compositor signals that it is ready
//! for the next frame. Between signals at most one submitted buffer is kept;
//! a newer submission replaces it.
//!
//! ```text
//!  submit ──► pending ──┐
//!  submit ──► pending ──┤ (older dropped)
//!                       ▼
//!  frame done ──► request_frame, attach, damage, commit
//!  frame done ──► request_frame, commit          (nothing pending)
//! ```

use crate::backend::{Backend, BufferId};
use crate::buffer::PixelBuffer;
use log::{trace, warn};

/// Counters for presented and dropped frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Buffers attached and committed
    pub presented: u64,
    /// Submissions replaced before they could be presented
    pub coalesced: u64,
    /// Frame signals that found nothing to present
    pub idle_frames: u64,
}

/// Tracks the pending buffer and whether a frame subscription is outstanding
#[derive(Debug, Default)]
pub struct FramePacer {
    pending: Option<PixelBuffer>,
    armed: bool,
    stats: FrameStats,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `buffer` for the next frame signal
    pub fn request_redraw(&mut self, buffer: PixelBuffer) {
        if self.pending.replace(buffer).is_some() {
            self.stats.coalesced += 1;
            trace!("Replaced pending frame ({} coalesced)", self.stats.coalesced);
        }
    }

    /// New content is waiting for the next frame signal
    pub fn is_damaged(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn take_pending(&mut self) -> Option<PixelBuffer> {
        self.pending.take()
    }

    /// Subscribe, attach `buffer`, damage and commit
    pub fn present<B: Backend>(&mut self, backend: &mut B, buffer: PixelBuffer) -> BufferId {
        backend.request_frame();
        self.armed = true;
        let id = backend.attach(buffer);
        backend.damage_all();
        backend.commit();
        self.stats.presented += 1;
        id
    }

    /// Subscribe and commit without new content
    pub fn rearm<B: Backend>(&mut self, backend: &mut B) {
        backend.request_frame();
        backend.commit();
        self.armed = true;
    }

    /// Handle a frame signal: always re-subscribe, present pending content if
    /// any. Returns the id of a newly attached buffer.
    pub fn on_frame_done<B: Backend>(&mut self, backend: &mut B) -> Option<BufferId> {
        self.armed = false;
        match self.pending.take() {
            Some(buffer) => Some(self.present(backend, buffer)),
            None => {
                self.stats.idle_frames += 1;
                self.rearm(backend);
                None
            }
        }
    }

    /// Record a frame signal without reacting to it
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Re-subscribe if no subscription is outstanding. Returns true if it had
    /// lapsed.
    pub fn ensure_armed<B: Backend>(&mut self, backend: &mut B) -> bool {
        if self.armed {
            return false;
        }
        warn!("Frame subscription lapsed; re-arming");
        self.rearm(backend);
        true
    }

    /// Forget pending content and the subscription
    pub fn cancel(&mut self) {
        self.pending = None;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, Request};
    use crate::config::ShmConfig;

    fn solid(value: u8) -> PixelBuffer {
        PixelBuffer::new(2, 2, Some(&[value; 16]), &ShmConfig::default()).unwrap()
    }

    #[test]
    fn test_pacer_starts_idle() {
        let pacer = FramePacer::new();
        assert!(!pacer.is_damaged());
        assert!(!pacer.is_armed());
        assert_eq!(*pacer.stats(), FrameStats::default());
    }

    #[test]
    fn test_newer_submission_replaces_pending() {
        let (mut backend, handle) = HeadlessBackend::new();
        let mut pacer = FramePacer::new();

        pacer.request_redraw(solid(0x11));
        pacer.request_redraw(solid(0x22));
        assert!(pacer.is_damaged());
        assert_eq!(pacer.stats().coalesced, 1);

        let id = pacer.on_frame_done(&mut backend);
        assert!(id.is_some());

        let attached = handle.attached();
        assert_eq!(attached.len(), 1);
        assert!(attached[0].pixels.iter().all(|&b| b == 0x22));
        assert!(!pacer.is_damaged());
    }

    #[test]
    fn test_present_orders_requests() {
        let (mut backend, handle) = HeadlessBackend::new();
        let mut pacer = FramePacer::new();

        pacer.present(&mut backend, solid(0));

        let requests = handle.requests();
        assert_eq!(requests[0], Request::RequestFrame);
        assert!(matches!(requests[1], Request::Attach(_)));
        assert_eq!(requests[2], Request::DamageAll);
        assert_eq!(requests[3], Request::Commit);
        assert!(pacer.is_armed());
    }

    #[test]
    fn test_idle_frame_rearms_without_attach() {
        let (mut backend, handle) = HeadlessBackend::new();
        let mut pacer = FramePacer::new();

        assert_eq!(pacer.on_frame_done(&mut backend), None);

        assert_eq!(handle.requests(), vec![Request::RequestFrame, Request::Commit]);
        assert!(pacer.is_armed());
        assert_eq!(pacer.stats().idle_frames, 1);
    }

    #[test]
    fn test_ensure_armed_only_when_lapsed() {
        let (mut backend, handle) = HeadlessBackend::new();
        let mut pacer = FramePacer::new();

        pacer.rearm(&mut backend);
        handle.take_requests();
        assert!(!pacer.ensure_armed(&mut backend));
        assert!(handle.requests().is_empty());

        pacer.disarm();
        assert!(pacer.ensure_armed(&mut backend));
        assert_eq!(handle.count(&Request::RequestFrame), 1);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let (mut backend, handle) = HeadlessBackend::new();
        let mut pacer = FramePacer::new();

        pacer.request_redraw(solid(1));
        pacer.cancel();
        assert!(!pacer.is_damaged());

        pacer.on_frame_done(&mut backend);
        assert!(handle.attached().is_empty());
    }
}
