use crate::types::Signals;

/// Source of manual debug controls, sampled once per tick.
///
/// The host adapter implements this over real keyboard/mouse state; tests and
/// the C ABI feed an [`InputSnapshot`].
pub trait InputSource {
    /// All signals currently held.
    fn signals(&self) -> Signals;

    /// Pointer movement since the last tick, `(dx, dy)`.
    fn pointer_delta(&self) -> (f64, f64);

    /// Whether every bit of `signal` is held.
    fn signal(&self, signal: Signals) -> bool {
        self.signals().contains(signal)
    }

    /// Called at the end of a tick while cursor-lock is on, so the adapter can
    /// warp the pointer back to its reference point.
    fn center_pointer(&mut self) {}
}

/// Fixed input state for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    pub signals: Signals,
    pub pointer: (f64, f64),
}

impl InputSnapshot {
    /// Nothing held, no pointer movement.
    pub fn idle() -> Self {
        Self {
            signals: Signals::empty(),
            pointer: (0.0, 0.0),
        }
    }

    pub fn held(signals: Signals) -> Self {
        Self {
            signals,
            pointer: (0.0, 0.0),
        }
    }

    pub fn with_pointer(mut self, dx: f64, dy: f64) -> Self {
        self.pointer = (dx, dy);
        self
    }
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

impl InputSource for InputSnapshot {
    fn signals(&self) -> Signals {
        self.signals
    }

    fn pointer_delta(&self) -> (f64, f64) {
        self.pointer
    }
}

impl<T: InputSource + ?Sized> InputSource for &mut T {
    fn signals(&self) -> Signals {
        (**self).signals()
    }

    fn pointer_delta(&self) -> (f64, f64) {
        (**self).pointer_delta()
    }

    fn center_pointer(&mut self) {
        (**self).center_pointer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_signals() {
        let input =
            InputSnapshot::held(Signals::MOVE_UP | Signals::BUTTON_A).with_pointer(3.0, -1.0);
        assert!(input.signal(Signals::MOVE_UP));
        assert!(input.signal(Signals::BUTTON_A));
        assert!(!input.signal(Signals::MOVE_DOWN));
        assert!(!input.signal(Signals::MOVE_UP | Signals::MOVE_DOWN));
        assert_eq!(input.pointer_delta(), (3.0, -1.0));
        assert_eq!(InputSnapshot::default(), InputSnapshot::idle());
    }
}
