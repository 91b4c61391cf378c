//! Clearable, self-expiring messages shown to the operator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

pub struct NoticeBoard {
    ttl: chrono::Duration,
    next_id: u64,
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            next_id: 1,
            notices: Vec::new(),
        }
    }

    pub fn post(&mut self, level: NoticeLevel, message: impl Into<String>) -> u64 {
        self.post_at(level, message, Utc::now())
    }

    fn post_at(&mut self, level: NoticeLevel, message: impl Into<String>, now: DateTime<Utc>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.notices.push(Notice {
            id,
            level,
            message: message.into(),
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        id
    }

    pub fn success(&mut self, message: impl Into<String>) -> u64 {
        self.post(NoticeLevel::Success, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> u64 {
        self.post(NoticeLevel::Error, message)
    }

    /// Returns whether a notice with that id was still present.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        self.notices.len() < before
    }

    pub fn clear(&mut self) {
        self.notices.clear();
    }

    /// Drops expired notices and returns the rest, oldest first.
    pub fn active(&mut self, now: DateTime<Utc>) -> Vec<Notice> {
        self.notices.retain(|notice| notice.expires_at > now);
        self.notices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_expire_after_ttl() {
        let mut board = NoticeBoard::new(Duration::from_secs(5));
        let now = Utc::now();
        board.post_at(NoticeLevel::Success, "uploaded", now);

        assert_eq!(board.active(now + chrono::Duration::seconds(4)).len(), 1);
        assert!(board.active(now + chrono::Duration::seconds(5)).is_empty());
    }

    #[test]
    fn dismiss_removes_only_that_notice() {
        let mut board = NoticeBoard::new(Duration::from_secs(60));
        let first = board.error("bad file");
        let second = board.success("done");

        assert!(board.dismiss(first));
        assert!(!board.dismiss(first));
        let remaining = board.active(Utc::now());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
        assert_eq!(remaining[0].level, NoticeLevel::Success);
    }

    #[test]
    fn clear_empties_the_board() {
        let mut board = NoticeBoard::new(Duration::from_secs(60));
        board.error("one");
        board.error("two");
        board.clear();
        assert!(board.active(Utc::now()).is_empty());
    }
}
