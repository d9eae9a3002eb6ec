//! Per-instrument bounded bar history.

use bar_signal_core::{Bar, BarError};
use std::collections::VecDeque;

/// Time-ordered ring of the most recent bars for one instrument.
///
/// Only bars that pass [`Bar::validate`] and are strictly newer than the
/// last buffered bar are admitted; the oldest bar is evicted on overflow.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    instrument: String,
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl CandleBuffer {
    #[must_use]
    pub fn new(instrument: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            instrument: instrument.into(),
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a bar.
    ///
    /// # Errors
    /// Returns a [`BarError`] for OHLC violations, a foreign instrument, or
    /// a timestamp not after the last buffered bar. The buffer is unchanged.
    pub fn append(&mut self, bar: Bar) -> Result<(), BarError> {
        if bar.instrument != self.instrument {
            return Err(BarError::WrongInstrument {
                expected: self.instrument.clone(),
                got: bar.instrument,
            });
        }
        bar.validate()?;
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return Err(BarError::OutOfOrder {
                    instrument: bar.instrument,
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }

        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        Ok(())
    }

    /// The last `n` bars, oldest first (fewer if unavailable).
    #[must_use]
    pub fn recent(&mut self, n: usize) -> &[Bar] {
        let slice = self.bars.make_contiguous();
        &slice[slice.len().saturating_sub(n)..]
    }

    #[must_use]
    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(minute: i64, open: f64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap() + Duration::minutes(minute);
        Bar::new(
            "EURUSD-OTC",
            ts,
            open,
            open.max(close) + 0.001,
            open.min(close) - 0.001,
            close,
            1.0,
        )
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut buffer = CandleBuffer::new("EURUSD-OTC", 10);
        for i in 0..4 {
            buffer.append(bar(i, 1.0, 1.1)).unwrap();
        }
        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp < recent[1].timestamp);
        assert_eq!(buffer.recent(99).len(), 4);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut buffer = CandleBuffer::new("EURUSD-OTC", 3);
        for i in 0..5 {
            buffer.append(bar(i, 1.0, 1.1)).unwrap();
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.recent(3)[0].timestamp, bar(2, 1.0, 1.1).timestamp);
    }

    #[test]
    fn high_below_close_rejected() {
        let mut buffer = CandleBuffer::new("EURUSD-OTC", 10);
        let mut bad = bar(0, 1.0, 1.2);
        bad.high = 1.1;
        let err = buffer.append(bad).unwrap_err();
        assert!(matches!(err, BarError::HighBelowBody { .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn out_of_order_rejected() {
        let mut buffer = CandleBuffer::new("EURUSD-OTC", 10);
        buffer.append(bar(5, 1.0, 1.1)).unwrap();
        assert!(matches!(
            buffer.append(bar(5, 1.0, 1.1)),
            Err(BarError::OutOfOrder { .. })
        ));
        assert!(matches!(
            buffer.append(bar(4, 1.0, 1.1)),
            Err(BarError::OutOfOrder { .. })
        ));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn foreign_instrument_rejected() {
        let mut buffer = CandleBuffer::new("GBPUSD", 10);
        assert!(matches!(
            buffer.append(bar(0, 1.0, 1.1)),
            Err(BarError::WrongInstrument { .. })
        ));
    }
}
