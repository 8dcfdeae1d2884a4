//! Content key period entity

use chrono::{DateTime, Utc};

/// A named span of content time that key-period filters can reference
///
/// A period is located either by a numeric index or by a start/end instant
/// pair; the two forms are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKeyPeriod {
    /// Document-unique period identifier, referenced by key-period filters
    pub id: String,
    /// Position of this period in a numbered sequence of periods
    pub index: Option<u64>,
    /// Start of the period (inclusive)
    pub start: Option<DateTime<Utc>>,
    /// End of the period (exclusive)
    pub end: Option<DateTime<Utc>>,
}

impl ContentKeyPeriod {
    /// Create a period located by index
    pub fn with_index(id: impl Into<String>, index: u64) -> Self {
        Self {
            id: id.into(),
            index: Some(index),
            start: None,
            end: None,
        }
    }

    /// Create a period located by a start/end instant pair
    pub fn with_interval(
        id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            index: None,
            start: Some(start),
            end: Some(end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_constructors_are_mutually_exclusive() {
        let by_index = ContentKeyPeriod::with_index("period_1", 3);
        assert_eq!(by_index.index, Some(3));
        assert!(by_index.start.is_none() && by_index.end.is_none());

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let by_span = ContentKeyPeriod::with_interval("period_2", start, end);
        assert!(by_span.index.is_none());
        assert_eq!(by_span.start, Some(start));
        assert_eq!(by_span.end, Some(end));
    }
}
