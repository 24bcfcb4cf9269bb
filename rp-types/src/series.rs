/// Whether the last `window` samples of a non-negative series agree to within
/// `tolerance` (relative max/min spread).
pub fn is_series_converge(data: &[f64], window: usize, tolerance: f64) -> bool {
    let sz = data.len();
    if sz < window {
        return false;
    }
    let tail = &data[sz - window..];
    let max_val = tail.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_val = tail.iter().cloned().fold(f64::INFINITY, f64::min);
    debug_assert!(min_val >= 0.0, "negative data series");
    if max_val < 1e-10 {
        return true;
    }
    max_val / min_val - 1.0 < tolerance
}

/// Whether the last `length` samples strictly alternate between increasing
/// and decreasing. Used to abort inner iterations that stopped making
/// progress.
pub fn is_series_oscillate(data: &[f64], length: usize) -> bool {
    if length < 3 {
        return false;
    }
    let sz = data.len();
    if sz < length {
        return false;
    }
    let trend: Vec<bool> = (0..length - 1)
        .map(|i| data[sz - 1 - i] > data[sz - 2 - i])
        .collect();
    trend.windows(2).all(|w| w[0] != w[1])
}
