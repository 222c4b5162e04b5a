/// Last origin chain block whose logs have been fully handled.
///
/// Owned by the watcher loop and threaded through each tick by value, never shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCursor {
    last_scanned: Option<u64>,
}

impl EventCursor {
    /// No block scanned yet, the first range is bounded by the initial lookback
    pub fn unset() -> Self {
        EventCursor { last_scanned: None }
    }

    pub fn at(height: u64) -> Self {
        EventCursor {
            last_scanned: Some(height),
        }
    }

    pub fn last_scanned(&self) -> Option<u64> {
        self.last_scanned
    }

    /// Inclusive block range to scan for a chain whose head is `head`, `None` when
    /// nothing new has been produced
    pub fn next_range(&self, head: u64, initial_lookback: u64) -> Option<(u64, u64)> {
        match self.last_scanned {
            None => {
                let lookback = initial_lookback.max(1);
                Some((head.checked_sub(lookback).map_or(0, |start| start + 1), head))
            }
            Some(last) if last < head => Some((last + 1, head)),
            Some(_) => None,
        }
    }

    /// Never moves backwards, a head reported lower than before (reorg, lagging node)
    /// keeps the current position
    pub fn advance(self, height: u64) -> Self {
        EventCursor {
            last_scanned: Some(self.last_scanned.map_or(height, |last| last.max(height))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_range_is_bounded_by_lookback() {
        assert_eq!(EventCursor::unset().next_range(1_000, 100), Some((901, 1_000)));
        assert_eq!(EventCursor::unset().next_range(100, 100), Some((1, 100)));
        assert_eq!(EventCursor::unset().next_range(42, 100), Some((0, 42)));
        assert_eq!(EventCursor::unset().next_range(42, 0), Some((42, 42)));
    }

    #[test]
    fn subsequent_range_starts_after_last_scanned() {
        let cursor = EventCursor::at(500);
        assert_eq!(cursor.next_range(510, 100), Some((501, 510)));
        assert_eq!(cursor.next_range(500, 100), None);
        assert_eq!(cursor.next_range(490, 100), None);
    }

    #[test]
    fn advance_is_monotonic() {
        let cursor = EventCursor::unset().advance(10);
        assert_eq!(cursor.last_scanned(), Some(10));
        assert_eq!(cursor.advance(7).last_scanned(), Some(10));
        assert_eq!(cursor.advance(12).last_scanned(), Some(12));
    }
}
