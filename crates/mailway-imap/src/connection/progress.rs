//! Nested progress reporting.
//!
//! Progress is a stack of `(min, max)` scaling frames. A logical
//! 0–100 percentage reported by a nested operation is linearly
//! remapped into the current frame's absolute window, so a
//! sub-operation can never overwrite its parent's progress.

use crate::callback::Hooks;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Frame {
    min: f64,
    max: f64,
}

/// Stack of progress scaling frames for one connection.
#[derive(Debug)]
pub struct ProgressStack {
    frames: Vec<Frame>,
    watermark: f64,
    hooks: Hooks,
}

impl ProgressStack {
    pub(crate) fn new(hooks: Hooks) -> Self {
        Self {
            frames: vec![Frame {
                min: 0.0,
                max: 100.0,
            }],
            watermark: 0.0,
            hooks,
        }
    }

    /// Current nesting depth, not counting the root frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// The last emitted absolute percentage.
    #[must_use]
    pub fn percent(&self) -> u32 {
        round_percent(self.watermark)
    }

    /// Pushes a scaling frame; `min` and `max` are percentages within
    /// the current frame's window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `0 <= min <= max <= 100`.
    pub fn push(&mut self, min: u32, max: u32) -> Result<()> {
        if min > max || max > 100 {
            return Err(Error::InvalidArgument(format!(
                "invalid progress window {min}..{max}"
            )));
        }
        let current = self.top();
        let span = current.max - current.min;
        self.frames.push(Frame {
            min: current.min + span * f64::from(min) / 100.0,
            max: current.min + span * f64::from(max) / 100.0,
        });
        Ok(())
    }

    /// Pops the innermost frame, restoring the outer window. Popping
    /// the root frame is a no-op.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Reports a logical percentage within the current frame.
    ///
    /// Emission is monotonic: values that map below the last emitted
    /// absolute percentage are dropped, except that `0` resets the
    /// watermark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for values above 100.
    pub fn update(&mut self, percent: u32) -> Result<()> {
        if percent > 100 {
            return Err(Error::InvalidArgument(format!(
                "progress {percent} out of range"
            )));
        }
        let frame = self.top();
        let absolute = frame.min + (frame.max - frame.min) * f64::from(percent) / 100.0;

        if percent == 0 {
            self.watermark = absolute;
            self.hooks.progress(round_percent(absolute));
        } else if absolute >= self.watermark {
            self.watermark = absolute;
            self.hooks.progress(round_percent(absolute));
        }
        Ok(())
    }

    /// Completes the current frame. Emits `100` only at the root
    /// frame; a nested frame advances to its window maximum.
    pub fn done(&mut self) {
        let frame = self.top();
        let absolute = if self.frames.len() == 1 {
            100.0
        } else {
            frame.max
        };
        if absolute >= self.watermark {
            self.watermark = absolute;
            self.hooks.progress(round_percent(absolute));
        }
    }

    fn top(&self) -> Frame {
        // The root frame is never popped.
        self.frames.last().copied().unwrap_or(Frame {
            min: 0.0,
            max: 100.0,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_percent(value: f64) -> u32 {
    value.round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::callback::{Callback, CallbackEvent, CollectingCallback};
    use std::sync::{Arc, Mutex};

    /// A callback that shares its event list with the test body.
    struct SharedCollector(Arc<Mutex<CollectingCallback>>);

    impl Callback for SharedCollector {
        fn progress(&mut self, percent: u32) -> bool {
            if let Ok(mut inner) = self.0.lock() {
                let _ = inner.progress(percent);
            }
            false
        }
    }

    fn stack_with_events() -> (ProgressStack, Arc<Mutex<CollectingCallback>>) {
        let events = Arc::new(Mutex::new(CollectingCallback::new()));
        let hooks = Hooks::new(Box::new(SharedCollector(Arc::clone(&events))));
        (ProgressStack::new(hooks), events)
    }

    fn emitted(events: &Arc<Mutex<CollectingCallback>>) -> Vec<u32> {
        events
            .lock()
            .unwrap()
            .events
            .iter()
            .filter_map(|event| match event {
                CallbackEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_root_frame_passthrough() {
        let (mut progress, events) = stack_with_events();
        progress.update(25).unwrap();
        progress.update(75).unwrap();
        progress.done();
        assert_eq!(emitted(&events), vec![25, 75, 100]);
    }

    #[test]
    fn test_nested_remapping() {
        let (mut progress, events) = stack_with_events();
        progress.push(40, 60).unwrap();
        progress.update(50).unwrap();
        assert_eq!(progress.percent(), 50);
        progress.pop();
        // Outer frame unchanged: an update in the full window resumes.
        progress.update(80).unwrap();
        assert_eq!(emitted(&events), vec![50, 80]);
    }

    #[test]
    fn test_emitted_percent_formula() {
        let (mut progress, events) = stack_with_events();
        progress.push(20, 70).unwrap();
        progress.update(50).unwrap();
        // 20 + (70 - 20) * 50 / 100 = 45
        assert_eq!(emitted(&events), vec![45]);
    }

    #[test]
    fn test_monotonic_unless_reset() {
        let (mut progress, events) = stack_with_events();
        progress.update(60).unwrap();
        progress.update(30).unwrap(); // dropped
        progress.update(0).unwrap(); // reset
        progress.update(10).unwrap();
        assert_eq!(emitted(&events), vec![60, 0, 10]);
    }

    #[test]
    fn test_done_only_full_at_root() {
        let (mut progress, events) = stack_with_events();
        progress.push(0, 50).unwrap();
        progress.done();
        progress.pop();
        progress.done();
        assert_eq!(emitted(&events), vec![50, 100]);
    }

    #[test]
    fn test_nested_push_compounds() {
        let (mut progress, _) = stack_with_events();
        progress.push(50, 100).unwrap();
        progress.push(0, 50).unwrap();
        progress.update(100).unwrap();
        // Inner window is the 50..75 slice of the whole.
        assert_eq!(progress.percent(), 75);
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let (mut progress, _) = stack_with_events();
        assert!(progress.push(60, 40).is_err());
        assert!(progress.push(0, 101).is_err());
        assert!(progress.update(101).is_err());
        assert_eq!(progress.depth(), 0);
    }

    #[test]
    fn test_pop_root_is_noop() {
        let (mut progress, _) = stack_with_events();
        progress.pop();
        progress.pop();
        assert_eq!(progress.depth(), 0);
        progress.update(10).unwrap();
    }
}
