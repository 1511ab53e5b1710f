use foundation::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A dismissible inline message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    /// Offer a retry affordance next to the message.
    pub retry: bool,
    pub posted_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct NoticeBoard {
    next_id: u64,
    active: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a notice. An identical active message is refreshed instead of
    /// stacking a duplicate.
    pub fn post(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        retry: bool,
        now: Timestamp,
    ) -> u64 {
        let message = message.into();
        if let Some(existing) = self
            .active
            .iter_mut()
            .find(|n| n.severity == severity && n.message == message)
        {
            existing.posted_at = now;
            existing.retry |= retry;
            return existing.id;
        }

        self.next_id += 1;
        let id = self.next_id;
        match severity {
            Severity::Error => tracing::warn!(id, %message, "error notice"),
            _ => tracing::debug!(id, %message, "notice"),
        }
        self.active.push(Notice {
            id,
            severity,
            message,
            retry,
            posted_at: now,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        self.active.len() != before
    }

    pub fn active(&self) -> &[Notice] {
        &self.active
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{NoticeBoard, Severity};
    use foundation::Timestamp;

    #[test]
    fn post_and_dismiss() {
        let mut board = NoticeBoard::new();
        let a = board.post(Severity::Error, "style failed", true, Timestamp(1));
        let b = board.post(Severity::Info, "imported 3 features", false, Timestamp(2));
        assert_ne!(a, b);
        assert_eq!(board.active().len(), 2);
        assert!(board.dismiss(a));
        assert!(!board.dismiss(a));
        assert_eq!(board.active()[0].id, b);
    }

    #[test]
    fn duplicates_are_refreshed() {
        let mut board = NoticeBoard::new();
        let a = board.post(Severity::Warning, "storage full", false, Timestamp(1));
        let again = board.post(Severity::Warning, "storage full", true, Timestamp(5));
        assert_eq!(a, again);
        assert_eq!(board.active().len(), 1);
        assert_eq!(board.active()[0].posted_at, Timestamp(5));
        assert!(board.active()[0].retry);
    }
}
