//! The readiness condition mask from `spec.md` §3/§8.
//!
//! A socket's `watched_mask` is always a subset of `{READABLE, WRITABLE}`
//! (the invariant from §8); `HANGUP` and `ERROR` are conditions the
//! reactor can *report* but never something a caller arms a watch for.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Condition: u8 {
        const READABLE = 0b0001;
        const WRITABLE = 0b0010;
        const HANGUP   = 0b0100;
        const ERROR    = 0b1000;
    }
}

impl Condition {
    /// The subset of conditions a socket is ever allowed to *watch* for,
    /// per the invariant in `spec.md` §8: `watched_mask ⊆ {readable, writable}`.
    pub fn is_valid_watch_mask(self) -> bool {
        self.difference(Condition::READABLE | Condition::WRITABLE).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_mask_rejects_hangup_and_error() {
        assert!(Condition::READABLE.is_valid_watch_mask());
        assert!((Condition::READABLE | Condition::WRITABLE).is_valid_watch_mask());
        assert!(!Condition::HANGUP.is_valid_watch_mask());
        assert!(!(Condition::READABLE | Condition::ERROR).is_valid_watch_mask());
    }
}
