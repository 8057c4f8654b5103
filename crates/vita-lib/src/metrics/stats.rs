//! Small descriptive statistics shared by the estimators.
//!
//! All helpers return `None` instead of dividing by zero so callers can map
//! a degenerate buffer onto their own "no result" value.

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    Some(var.sqrt())
}

/// Sample (n - 1) standard deviation.
pub fn sample_std_dev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() as f64 - 1.0);
    Some(var.sqrt())
}

pub fn median(data: &[f64]) -> Option<f64> {
    percentile(data, 50.0)
}

/// Linear-interpolated percentile, `p` in [0, 100].
pub fn percentile(data: &[f64], p: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn coefficient_of_variation(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    Some(std_dev(data)? / m.abs())
}

/// Mean of the middle half of the data (25th to 75th percentile ranks).
pub fn interquartile_mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let start = n / 4;
    let end = (n - n / 4).max(start + 1);
    mean(&sorted[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_have_no_statistics() {
        assert!(mean(&[]).is_none());
        assert!(median(&[]).is_none());
        assert!(sample_std_dev(&[1.0]).is_none());
        assert!(coefficient_of_variation(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn percentile_interpolates() {
        let data = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(median(&data), Some(3.0));
        assert_eq!(percentile(&data, 0.0), Some(1.0));
        assert_eq!(percentile(&data, 100.0), Some(5.0));
        assert!((percentile(&data, 95.0).unwrap() - 4.8).abs() < 1e-9);
    }

    #[test]
    fn interquartile_mean_ignores_tails() {
        let data = [0.0, 96.0, 97.0, 96.0, 97.0, 96.0, 97.0, 200.0];
        assert!((interquartile_mean(&data).unwrap() - 96.5).abs() < 1e-9);
    }
}
