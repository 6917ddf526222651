//! Small array statistics shared by the post-processing modules.
//!
//! NaN marks a masked value throughout; the `nan*` helpers skip it.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn nanmean(values: &[f64]) -> f64 {
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    mean(&kept)
}

pub fn nansum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Median of the non-NaN values.
pub fn median(values: &[f64]) -> f64 {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return f64::NAN;
    }
    kept.sort_by(f64::total_cmp);
    let mid = kept.len() / 2;
    if kept.len() % 2 == 0 {
        (kept[mid - 1] + kept[mid]) / 2.0
    } else {
        kept[mid]
    }
}

/// Sample standard deviation (`ddof = 1`).
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let center = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, clamped to the end
/// values outside the sample range. `xp` must be increasing.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let upper = xp[..n].partition_point(|value| *value <= x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[lower];
    }
    fp[lower] + (fp[upper] - fp[lower]) * (x - xp[lower]) / span
}

/// `count` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Resamples `values` onto `count` evenly spaced points spanning the same range.
pub fn resample_linear(values: &[f64], count: usize) -> Vec<f64> {
    if values.is_empty() {
        return vec![f64::NAN; count];
    }
    let xp = linspace(0.0, 1.0, values.len());
    linspace(0.0, 1.0, count)
        .into_iter()
        .map(|x| interp(x, &xp, values))
        .collect()
}
