/// A half-open byte range `[start, end)` into the source text.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Sub-span starting `skip` bytes in, clamped to `self`.
    pub fn shrink_front(self, skip: usize) -> Span {
        Span {
            start: (self.start + skip).min(self.end),
            end: self.end,
        }
    }
}
