use std::time::{Duration, Instant};

use tracing::trace;

pub const DEFAULT_DRAG_THRESHOLD: f32 = 5.0;
pub const DEFAULT_DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Pressed { origin: Point, second: bool },
    /// Released once; a second press inside the window makes a double click.
    Released { at: Instant },
    Dragging { origin: Point },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Clicked,
    DoubleClicked,
    DragStarted,
    DragEnded,
    DragCancelled,
}

/// Tells clicks, double clicks and drags apart from raw pointer input. The
/// caller feeds events and a monotonic clock; no timers run in here.
#[derive(Debug, Clone)]
pub struct PointerGesture {
    state: GestureState,
    drag_threshold: f32,
    double_click_window: Duration,
}

impl Default for PointerGesture {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD, DEFAULT_DOUBLE_CLICK_WINDOW)
    }
}

impl PointerGesture {
    pub fn new(drag_threshold: f32, double_click_window: Duration) -> Self {
        Self {
            state: GestureState::Idle,
            drag_threshold,
            double_click_window,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// A press that arrives after the double-click window first flushes the
    /// pending single click.
    pub fn press(&mut self, at: Point, now: Instant) -> Option<GestureEvent> {
        let (next, emitted) = match self.state {
            GestureState::Released { at: released }
                if now.saturating_duration_since(released) <= self.double_click_window =>
            {
                (GestureState::Pressed { origin: at, second: true }, None)
            }
            GestureState::Released { .. } => (
                GestureState::Pressed { origin: at, second: false },
                Some(GestureEvent::Clicked),
            ),
            GestureState::Idle => (GestureState::Pressed { origin: at, second: false }, None),
            other => (other, None),
        };
        self.transition(next);
        emitted
    }

    /// Dragging out of a second press means the first press was a click
    /// after all, so that click is reported ahead of the drag.
    pub fn move_to(&mut self, at: Point) -> Vec<GestureEvent> {
        match self.state {
            GestureState::Pressed { origin, second }
                if origin.distance(at) > self.drag_threshold =>
            {
                self.transition(GestureState::Dragging { origin });
                if second {
                    vec![GestureEvent::Clicked, GestureEvent::DragStarted]
                } else {
                    vec![GestureEvent::DragStarted]
                }
            }
            _ => Vec::new(),
        }
    }

    pub fn release(&mut self, now: Instant) -> Option<GestureEvent> {
        match self.state {
            GestureState::Pressed { second: true, .. } => {
                self.transition(GestureState::Idle);
                Some(GestureEvent::DoubleClicked)
            }
            GestureState::Pressed { second: false, .. } => {
                self.transition(GestureState::Released { at: now });
                None
            }
            GestureState::Dragging { .. } => {
                self.transition(GestureState::Idle);
                Some(GestureEvent::DragEnded)
            }
            _ => None,
        }
    }

    /// Called from the event loop; resolves a pending click once the
    /// double-click window has passed.
    pub fn tick(&mut self, now: Instant) -> Option<GestureEvent> {
        match self.state {
            GestureState::Released { at }
                if now.saturating_duration_since(at) > self.double_click_window =>
            {
                self.transition(GestureState::Idle);
                Some(GestureEvent::Clicked)
            }
            _ => None,
        }
    }

    /// Escape key or pointer leaving the surface.
    pub fn cancel(&mut self) -> Option<GestureEvent> {
        let emitted = match self.state {
            GestureState::Dragging { .. } => Some(GestureEvent::DragCancelled),
            _ => None,
        };
        self.transition(GestureState::Idle);
        emitted
    }

    fn transition(&mut self, next: GestureState) {
        trace!(from = ?self.state, to = ?next, "gesture transition");
        self.state = next;
    }
}
