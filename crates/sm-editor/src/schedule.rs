//! Scheduled-callback primitives for the single-threaded engine.
//!
//! The engine never spawns threads or framework timers; hosts pass a
//! monotonic millisecond clock into every input call and drive `tick` from
//! their frame loop. Two semantics exist and must not be conflated:
//!
//! - `Debounce` restarts its deadline on every poke — the classic
//!   "quiet period after the last edit" used for persistence.
//! - `OneShot` arms once and either fires or is cancelled — used for
//!   hover-delay side effects that must not trigger during fast pointer
//!   travel.

/// Restart-on-activity timer.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay_ms: u64,
    deadline: Option<u64>,
}

impl Debounce {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Record activity: (re)start the quiet period from `now`.
    pub fn poke(&mut self, now: u64) {
        self.deadline = Some(now + self.delay_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// If the quiet period has elapsed, disarm and return true.
    /// At most one fire per poke-train.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Arm-once timer, cancelled on leave.
#[derive(Debug, Clone)]
pub struct OneShot {
    delay_ms: u64,
    deadline: Option<u64>,
}

impl OneShot {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Arm from `now`. Re-arming replaces the pending deadline.
    pub fn arm(&mut self, now: u64) {
        self.deadline = Some(now + self.delay_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire exactly once after the delay, unless cancelled first.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
