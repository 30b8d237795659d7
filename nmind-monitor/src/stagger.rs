use std::time::Duration;

/// Evenly spaced start offsets for `n` probes across one polling
/// window: `offset(k) = k * window / n`. The largest offset is always
/// strictly inside the window, so a full fan-out finishes before the
/// next cycle is due (probe latency aside). Offsets are recomputed
/// from scratch every cycle, so newly discovered devices reflow the
/// spacing automatically.
pub fn offsets(n: usize, window: Duration) -> Vec<Duration> {
    if n == 0 {
        return Vec::new();
    }
    let step = window / n as u32;
    (0..n as u32).map(|k| step * k).collect()
}

#[cfg(test)]
mod tests {
    use super::offsets;
    use std::time::Duration;

    #[test]
    fn check_even_spacing() {
        let window = Duration::from_secs(10);
        let plan = offsets(5, window);
        assert_eq!(plan.len(), 5);
        for (k, offset) in plan.iter().enumerate() {
            assert_eq!(*offset, window / 5 * k as u32);
        }
        assert!(*plan.last().unwrap() < window);
    }

    #[test]
    fn check_single_device_starts_immediately() {
        assert_eq!(offsets(1, Duration::from_secs(3)), vec![Duration::ZERO]);
    }

    #[test]
    fn check_empty_and_zero_window() {
        assert!(offsets(0, Duration::from_secs(3)).is_empty());
        let plan = offsets(4, Duration::ZERO);
        assert!(plan.iter().all(|o| o.is_zero()));
    }

    #[test]
    fn check_max_offset_below_window_for_many() {
        let window = Duration::from_secs(3);
        let plan = offsets(251, window);
        assert_eq!(plan.len(), 251);
        assert!(*plan.last().unwrap() < window);
        // monotonically non-decreasing
        assert!(plan.windows(2).all(|w| w[0] <= w[1]));
    }
}
