//! Half-open slice bounds with optional and negative ends.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// `[start, stop)` where a missing end means "from the beginning" / "to
/// the end" and a negative end counts back from the length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>) -> Self {
        Slice { start, stop }
    }

    pub fn all() -> Self {
        Slice::default()
    }

    /// Concrete bounds for a sequence of `len`, with `start <= stop <= len`.
    pub fn resolve(&self, len: usize) -> (usize, usize) {
        let len_i = len as isize;
        let clamp = |bound: isize| -> usize {
            let b = if bound < 0 { bound + len_i } else { bound };
            b.clamp(0, len_i) as usize
        };

        let start = self.start.map(clamp).unwrap_or(0);
        let stop = self.stop.map(clamp).unwrap_or(len);
        let stop = stop.max(start);

        // TigerStyle: Postconditions
        debug_assert!(start <= stop, "Postcondition violated: start <= stop");
        debug_assert!(stop <= len, "Postcondition violated: stop <= len");
        (start, stop)
    }
}

impl From<Range<isize>> for Slice {
    fn from(r: Range<isize>) -> Self {
        Slice::new(Some(r.start), Some(r.end))
    }
}

impl From<RangeFrom<isize>> for Slice {
    fn from(r: RangeFrom<isize>) -> Self {
        Slice::new(Some(r.start), None)
    }
}

impl From<RangeTo<isize>> for Slice {
    fn from(r: RangeTo<isize>) -> Self {
        Slice::new(None, Some(r.end))
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_clamps_and_wraps() {
        assert_eq!(Slice::all().resolve(5), (0, 5));
        assert_eq!(Slice::from(1..3).resolve(5), (1, 3));
        assert_eq!(Slice::from(-2..).resolve(5), (3, 5));
        assert_eq!(Slice::from(..-1).resolve(5), (0, 4));
        assert_eq!(Slice::from(2..100).resolve(5), (2, 5));
        assert_eq!(Slice::from(-100..2).resolve(5), (0, 2));
    }

    #[test]
    fn test_resolve_empty_when_reversed() {
        assert_eq!(Slice::from(4..1).resolve(5), (4, 4));
        assert_eq!(Slice::from(..).resolve(0), (0, 0));
        assert_eq!(Slice::from(3..).resolve(2), (2, 2));
    }
}
