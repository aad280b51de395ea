use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// Element range with optional bounds. Missing bounds default to the full extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl RowRange {
    pub const fn new(start: Option<usize>, stop: Option<usize>) -> Self {
        Self { start, stop }
    }

    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
        }
    }

    /// Resolves the bounds against a length of `len` elements.
    ///
    /// Returns the requested `(start, stop)` pair as the error when the range is
    /// reversed or reaches past `len`.
    pub fn resolve(&self, len: usize) -> Result<Range<usize>, (usize, usize)> {
        let start = self.start.unwrap_or(0);
        let stop = self.stop.unwrap_or(len);
        if start > stop || stop > len {
            return Err((start, stop));
        }
        Ok(start..stop)
    }
}

impl From<Range<usize>> for RowRange {
    fn from(value: Range<usize>) -> Self {
        RowRange::new(Some(value.start), Some(value.end))
    }
}

impl From<RangeFrom<usize>> for RowRange {
    fn from(value: RangeFrom<usize>) -> Self {
        RowRange::new(Some(value.start), None)
    }
}

impl From<RangeTo<usize>> for RowRange {
    fn from(value: RangeTo<usize>) -> Self {
        RowRange::new(None, Some(value.end))
    }
}

impl From<RangeFull> for RowRange {
    fn from(_: RangeFull) -> Self {
        RowRange::full()
    }
}

impl From<(Option<usize>, Option<usize>)> for RowRange {
    fn from((start, stop): (Option<usize>, Option<usize>)) -> Self {
        RowRange::new(start, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::RowRange;

    #[test]
    fn open_bounds_default_to_extent() {
        assert_eq!(RowRange::from(..).resolve(10), Ok(0..10));
        assert_eq!(RowRange::from(4..).resolve(10), Ok(4..10));
        assert_eq!(RowRange::from(..3).resolve(10), Ok(0..3));
        assert_eq!(RowRange::from(10..10).resolve(10), Ok(10..10));
    }

    #[test]
    fn invalid_ranges_report_the_request() {
        assert_eq!(RowRange::from(5..11).resolve(10), Err((5, 11)));
        assert_eq!(RowRange::new(Some(6), Some(2)).resolve(10), Err((6, 2)));
    }
}
