//! Acquisition sample-rate tables.
//!
//! Each acquisition source exposes a fixed menu of gate/sample periods.
//! The front-end selects by label; the servo loop works in seconds.

/// One selectable sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEntry {
    /// UI label, e.g. `"100ms"`.
    pub label: &'static str,
    /// Sample period [s].
    pub seconds: f64,
}

/// Rates supported by the frequency-counter class of sources.
pub const RATES_COUNTER: &[RateEntry] = &[
    RateEntry { label: "1ms", seconds: 1e-3 },
    RateEntry { label: "2ms", seconds: 2e-3 },
    RateEntry { label: "5ms", seconds: 5e-3 },
    RateEntry { label: "10ms", seconds: 1e-2 },
    RateEntry { label: "20ms", seconds: 2e-2 },
    RateEntry { label: "50ms", seconds: 5e-2 },
    RateEntry { label: "100ms", seconds: 1e-1 },
    RateEntry { label: "200ms", seconds: 2e-1 },
    RateEntry { label: "500ms", seconds: 5e-1 },
    RateEntry { label: "1s", seconds: 1.0 },
    RateEntry { label: "2s", seconds: 2.0 },
    RateEntry { label: "5s", seconds: 5.0 },
    RateEntry { label: "10s", seconds: 10.0 },
    RateEntry { label: "20s", seconds: 20.0 },
];

/// Rates supported by the ADC class of sources.
pub const RATES_ADC: &[RateEntry] = &[
    RateEntry { label: "33us", seconds: 33e-6 },
    RateEntry { label: "66us", seconds: 66e-6 },
    RateEntry { label: "133us", seconds: 133e-6 },
    RateEntry { label: "266us", seconds: 266e-6 },
    RateEntry { label: "500us", seconds: 500e-6 },
    RateEntry { label: "1ms", seconds: 1e-3 },
    RateEntry { label: "2ms", seconds: 2e-3 },
    RateEntry { label: "10ms", seconds: 10e-3 },
    RateEntry { label: "16ms", seconds: 16e-3 },
    RateEntry { label: "20ms", seconds: 20e-3 },
    RateEntry { label: "33ms", seconds: 33e-3 },
    RateEntry { label: "40ms", seconds: 40e-3 },
    RateEntry { label: "66ms", seconds: 66e-3 },
    RateEntry { label: "100ms", seconds: 100e-3 },
    RateEntry { label: "200ms", seconds: 200e-3 },
    RateEntry { label: "400ms", seconds: 400e-3 },
];

/// Look up a rate label in a table.
pub fn rate_seconds(table: &[RateEntry], label: &str) -> Option<f64> {
    table
        .iter()
        .find(|entry| entry.label == label)
        .map(|entry| entry.seconds)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_table_lookup() {
        assert_eq!(rate_seconds(RATES_COUNTER, "100ms"), Some(0.1));
        assert_eq!(rate_seconds(RATES_COUNTER, "1s"), Some(1.0));
        assert_eq!(rate_seconds(RATES_COUNTER, "33us"), None);
    }

    #[test]
    fn adc_table_lookup() {
        assert_eq!(rate_seconds(RATES_ADC, "33us"), Some(33e-6));
        assert_eq!(rate_seconds(RATES_ADC, "400ms"), Some(0.4));
    }

    #[test]
    fn tables_are_sorted_ascending() {
        for table in [RATES_COUNTER, RATES_ADC] {
            for pair in table.windows(2) {
                assert!(pair[0].seconds < pair[1].seconds);
            }
        }
    }
}
