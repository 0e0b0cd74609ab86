//! Pointer event accumulation
//!
//! `wl_pointer` sends motion, buttons and axis values as separate events and
//! closes each logical batch with `frame`. Events land in a pending
//! [`PointerFrame`]; the terminator turns it into a [`CommittedFrame`] and
//! leaves an empty accumulator behind.

use super::KeyAction;
use std::mem;

/// Scroll axis as numbered by `wl_pointer.axis`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Raw pointer notifications
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Enter { x: f64, y: f64 },
    Leave,
    Motion { x: f64, y: f64 },
    Button { button: u32, action: KeyAction },
    Axis { axis: ScrollAxis, value: f64 },
    AxisSource,
    AxisStop { axis: ScrollAxis },
    AxisDiscrete { axis: ScrollAxis, discrete: i32 },
    /// End of a logical batch
    Frame,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AxisAccum {
    active: bool,
    value: f64,
    discrete: i32,
}

/// Pending pointer state for the batch in progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerFrame {
    entered: bool,
    left: bool,
    inside: Option<bool>,
    position: Option<(f64, f64)>,
    buttons: Vec<(u32, KeyAction)>,
    vertical: AxisAccum,
    horizontal: AxisAccum,
    axis_source: bool,
}

/// A finished batch, ready for callback dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedFrame {
    /// Pointer entered the surface during the batch
    pub entered: bool,
    /// Pointer left the surface during the batch
    pub left: bool,
    /// Whether the last enter/leave of the batch left the pointer on the surface
    pub inside: Option<bool>,
    /// Final position from enter or motion
    pub position: Option<(f64, f64)>,
    /// Button transitions in arrival order
    pub buttons: Vec<(u32, KeyAction)>,
    /// Summed `(horizontal, vertical)` deltas when any axis event arrived
    pub scroll: Option<(f64, f64)>,
    /// Summed `(horizontal, vertical)` wheel clicks
    pub discrete: (i32, i32),
}

impl PointerFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn axis_mut(&mut self, axis: ScrollAxis) -> &mut AxisAccum {
        match axis {
            ScrollAxis::Vertical => &mut self.vertical,
            ScrollAxis::Horizontal => &mut self.horizontal,
        }
    }

    /// Fold one notification into the batch.
    ///
    /// Returns the committed batch when `event` is the frame terminator.
    pub fn accumulate(&mut self, event: PointerEvent) -> Option<CommittedFrame> {
        match event {
            PointerEvent::Enter { x, y } => {
                self.entered = true;
                self.inside = Some(true);
                self.position = Some((x, y));
            }
            PointerEvent::Leave => {
                self.left = true;
                self.inside = Some(false);
            }
            PointerEvent::Motion { x, y } => self.position = Some((x, y)),
            PointerEvent::Button { button, action } => self.buttons.push((button, action)),
            PointerEvent::Axis { axis, value } => {
                let acc = self.axis_mut(axis);
                acc.active = true;
                acc.value += value;
            }
            PointerEvent::AxisSource => self.axis_source = true,
            PointerEvent::AxisStop { axis } => self.axis_mut(axis).active = true,
            PointerEvent::AxisDiscrete { axis, discrete } => {
                let acc = self.axis_mut(axis);
                acc.active = true;
                acc.discrete += discrete;
            }
            PointerEvent::Frame => return Some(self.commit()),
        }
        None
    }

    /// Take the batch and reset the accumulator
    pub fn commit(&mut self) -> CommittedFrame {
        let pending = mem::take(self);
        let any_axis = pending.vertical.active || pending.horizontal.active || pending.axis_source;
        CommittedFrame {
            entered: pending.entered,
            left: pending.left,
            inside: pending.inside,
            position: pending.position,
            buttons: pending.buttons,
            scroll: any_axis.then_some((pending.horizontal.value, pending.vertical.value)),
            discrete: (pending.horizontal.discrete, pending.vertical.discrete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(frame: &mut PointerFrame, events: Vec<PointerEvent>) -> Option<CommittedFrame> {
        let mut last = None;
        for event in events {
            if let Some(done) = frame.accumulate(event) {
                last = Some(done);
            }
        }
        last
    }

    #[test]
    fn test_motion_coalesces_to_last_position() {
        let mut frame = PointerFrame::new();
        let done = feed(
            &mut frame,
            vec![
                PointerEvent::Motion { x: 5.0, y: 5.0 },
                PointerEvent::Motion { x: 7.0, y: 7.0 },
                PointerEvent::Frame,
            ],
        )
        .unwrap();
        assert_eq!(done.position, Some((7.0, 7.0)));
        assert!(done.scroll.is_none());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_nothing_committed_before_terminator() {
        let mut frame = PointerFrame::new();
        assert!(frame.accumulate(PointerEvent::Motion { x: 1.0, y: 2.0 }).is_none());
        assert!(frame
            .accumulate(PointerEvent::Button {
                button: 0x110,
                action: KeyAction::Pressed
            })
            .is_none());
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_axis_values_are_summed_per_axis() {
        let mut frame = PointerFrame::new();
        let done = feed(
            &mut frame,
            vec![
                PointerEvent::AxisSource,
                PointerEvent::Axis {
                    axis: ScrollAxis::Vertical,
                    value: 10.0,
                },
                PointerEvent::Axis {
                    axis: ScrollAxis::Vertical,
                    value: 5.0,
                },
                PointerEvent::Axis {
                    axis: ScrollAxis::Horizontal,
                    value: -3.0,
                },
                PointerEvent::AxisDiscrete {
                    axis: ScrollAxis::Vertical,
                    discrete: 1,
                },
                PointerEvent::Frame,
            ],
        )
        .unwrap();
        assert_eq!(done.scroll, Some((-3.0, 15.0)));
        assert_eq!(done.discrete, (0, 1));
    }

    #[test]
    fn test_axis_stop_counts_as_activity() {
        let mut frame = PointerFrame::new();
        let done = feed(
            &mut frame,
            vec![
                PointerEvent::AxisStop {
                    axis: ScrollAxis::Vertical,
                },
                PointerEvent::Frame,
            ],
        )
        .unwrap();
        assert_eq!(done.scroll, Some((0.0, 0.0)));
    }

    #[test]
    fn test_button_transitions_kept_in_order() {
        let mut frame = PointerFrame::new();
        let done = feed(
            &mut frame,
            vec![
                PointerEvent::Button {
                    button: 0x110,
                    action: KeyAction::Pressed,
                },
                PointerEvent::Button {
                    button: 0x110,
                    action: KeyAction::Released,
                },
                PointerEvent::Frame,
            ],
        )
        .unwrap();
        assert_eq!(
            done.buttons,
            vec![(0x110, KeyAction::Pressed), (0x110, KeyAction::Released)]
        );
    }

    #[test]
    fn test_enter_and_leave_flags() {
        let mut frame = PointerFrame::new();
        let entered = feed(
            &mut frame,
            vec![PointerEvent::Enter { x: 3.5, y: 4.5 }, PointerEvent::Frame],
        )
        .unwrap();
        assert!(entered.entered);
        assert_eq!(entered.position, Some((3.5, 4.5)));

        let left = feed(&mut frame, vec![PointerEvent::Leave, PointerEvent::Frame]).unwrap();
        assert!(left.left);
        assert!(left.position.is_none());
    }

    proptest! {
        #[test]
        fn prop_frame_resets_after_any_batch(
            moves in proptest::collection::vec((0.0f64..4096.0, 0.0f64..4096.0), 0..16),
            scrolls in proptest::collection::vec(-50.0f64..50.0, 0..8),
        ) {
            let mut frame = PointerFrame::new();
            for (x, y) in &moves {
                frame.accumulate(PointerEvent::Motion { x: *x, y: *y });
            }
            for value in &scrolls {
                frame.accumulate(PointerEvent::Axis { axis: ScrollAxis::Vertical, value: *value });
            }
            let done = frame.accumulate(PointerEvent::Frame).unwrap();

            prop_assert!(frame.is_empty());
            prop_assert_eq!(done.position, moves.last().copied());
            prop_assert_eq!(done.scroll.is_some(), !scrolls.is_empty());
        }
    }
}
