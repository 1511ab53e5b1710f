use foundation::Timestamp;

use crate::tool_mode::NotReadyReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Detached,
    Waiting { since: Timestamp, deadline: Timestamp },
    Ready,
    TimedOut { waited_ms: i64 },
}

/// Tracks the engine's ready signal against a deadline.
///
/// The host calls [`ReadinessGate::poll`] on its own timer; the gate reports
/// the timeout exactly once per attach.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    timeout_ms: i64,
    state: GateState,
}

impl ReadinessGate {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            timeout_ms,
            state: GateState::Detached,
        }
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    /// A new engine was attached; start waiting for it.
    pub fn attach(&mut self, now: Timestamp) {
        self.state = GateState::Waiting {
            since: now,
            deadline: now.plus_millis(self.timeout_ms),
        };
    }

    pub fn detach(&mut self) {
        self.state = GateState::Detached;
    }

    /// Records the ready event. Late ready signals still count.
    pub fn mark_ready(&mut self) -> bool {
        match self.state {
            GateState::Detached | GateState::Ready => false,
            GateState::Waiting { .. } | GateState::TimedOut { .. } => {
                self.state = GateState::Ready;
                true
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == GateState::Ready
    }

    /// Why the engine cannot be used yet, `None` when ready.
    pub fn reason(&self) -> Option<NotReadyReason> {
        match self.state {
            GateState::Ready => None,
            GateState::Detached => Some(NotReadyReason::Detached),
            GateState::Waiting { .. } => Some(NotReadyReason::Loading),
            GateState::TimedOut { waited_ms } => Some(NotReadyReason::TimedOut { waited_ms }),
        }
    }

    /// Returns the timeout reason the first time the deadline is observed passed.
    pub fn poll(&mut self, now: Timestamp) -> Option<NotReadyReason> {
        let GateState::Waiting { since, deadline } = self.state else {
            return None;
        };
        if now < deadline {
            return None;
        }
        let waited_ms = now.since(since);
        tracing::warn!(waited_ms, "map engine did not become ready in time");
        self.state = GateState::TimedOut { waited_ms };
        Some(NotReadyReason::TimedOut { waited_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::ReadinessGate;
    use crate::tool_mode::NotReadyReason;
    use foundation::Timestamp;

    #[test]
    fn ready_before_deadline() {
        let mut gate = ReadinessGate::new(10_000);
        assert_eq!(gate.reason(), Some(NotReadyReason::Detached));
        gate.attach(Timestamp(0));
        assert_eq!(gate.reason(), Some(NotReadyReason::Loading));
        assert_eq!(gate.poll(Timestamp(9_999)), None);
        assert!(gate.mark_ready());
        assert!(gate.is_ready());
        assert_eq!(gate.poll(Timestamp(20_000)), None);
    }

    #[test]
    fn timeout_is_reported_once() {
        let mut gate = ReadinessGate::new(10_000);
        gate.attach(Timestamp(500));
        assert_eq!(
            gate.poll(Timestamp(10_500)),
            Some(NotReadyReason::TimedOut { waited_ms: 10_000 })
        );
        assert_eq!(gate.poll(Timestamp(20_000)), None);
        assert!(!gate.is_ready());

        // A late ready event still unlocks the tools.
        assert!(gate.mark_ready());
        assert_eq!(gate.reason(), None);
    }

    #[test]
    fn detached_gate_ignores_ready() {
        let mut gate = ReadinessGate::new(1_000);
        assert!(!gate.mark_ready());
        gate.attach(Timestamp(0));
        gate.detach();
        assert!(!gate.mark_ready());
        assert_eq!(gate.poll(Timestamp(5_000)), None);
    }
}
