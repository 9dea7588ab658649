use ndarray::{ArrayD, Zip};

/// Statistical uncertainty from a sum, a sum of squares and a count.
///
/// Computes `sqrt(S2/n - (S/n)^2)`. A channel without hits has no spread and
/// yields exactly `0.0`; the division is never evaluated in that case.
/// Negative intermediates from cancellation are not clipped.
///
/// # Example
///
/// ```
/// use phisym::algorithm::uncertainty::moment_spread;
///
/// assert_eq!(moment_spread(0.0, 0.0, 0), 0.0);
/// assert_eq!(moment_spread(6.0, 20.0, 2), 1.0);
/// ```
pub fn moment_spread(sum: f64, sum2: f64, n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let mean = sum / n;
    (sum2 / n - mean * mean).sqrt()
}

/// Elementwise [`moment_spread`] over equally shaped columns.
pub fn moment_uncertainty(sum: &ArrayD<f64>, sum2: &ArrayD<f64>, nhits: &ArrayD<u64>) -> ArrayD<f64> {
    Zip::from(sum)
        .and(sum2)
        .and(nhits)
        .map_collect(|&s, &s2, &n| moment_spread(s, s2, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_hits_floor() {
        let sum = array![0.0, 5.0, 0.0].into_dyn();
        let sum2 = array![0.0, 25.0, 3.0].into_dyn();
        let nhits = array![0u64, 0u64, 0u64].into_dyn();
        let err = moment_uncertainty(&sum, &sum2, &nhits);
        assert!(err.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_spread_of_known_sample() {
        // values 1, 2, 3, 4
        let err = moment_spread(10.0, 30.0, 4);
        assert!((err - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_sample_has_no_spread() {
        let err = moment_spread(15.0, 45.0, 5);
        assert!(err.abs() < 1e-12);
    }
}
