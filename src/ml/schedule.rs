/// Concession curve from `p_max` at `t = 0` to `p_min` at `t = 1`.
///
/// `slope < 1` stays near `p_max` and drops late, `slope == 1` is linear,
/// `slope > 1` drops early and flattens near `p_min`. `t` is clamped to [0, 1].
pub fn concession(p_min: f64, p_max: f64, slope: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    p_min + (p_max - p_min) * (1.0 - t.powf(1.0 / slope))
}

/// Normalised progress `done / total`, clamped to 1; an empty schedule is finished.
pub fn progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done as f64 / total as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert!((concession(0.1, 0.9, 2.0, 0.0) - 0.9).abs() < 1e-15);
        assert!((concession(0.1, 0.9, 2.0, 1.0) - 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_linear_midpoint() {
        assert!((concession(0.0, 1.0, 1.0, 0.5) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_slope_shapes() {
        let late = concession(0.0, 1.0, 0.5, 0.5);
        let early = concession(0.0, 1.0, 2.0, 0.5);
        assert!(late > 0.5);
        assert!(early < 0.5);
    }

    #[test]
    fn test_constant_when_bounds_match() {
        for t in [0.0, 0.3, 1.0] {
            assert_eq!(concession(0.05, 0.05, 3.0, t), 0.05);
        }
    }

    #[test]
    fn test_progress_clamps() {
        assert_eq!(progress(5, 10), 0.5);
        assert_eq!(progress(20, 10), 1.0);
        assert_eq!(progress(0, 0), 1.0);
    }
}
