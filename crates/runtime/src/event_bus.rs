use foundation::Timestamp;

/// An event stamped with the instant it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    pub at: Timestamp,
    pub payload: E,
}

/// Outbound queue the host drains once per turn.
#[derive(Debug)]
pub struct EventBus<E> {
    events: Vec<Event<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, at: Timestamp, payload: E) {
        self.events.push(Event { at, payload });
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }
}
