//! Simple descriptive statistics used by the family reports.

use crate::error::{Result, TrevisError};
use serde::{Deserialize, Serialize};

/// Mean, population variance, sigma and standard deviation of a sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleStatistics {
    pub mean: f64,
    pub variance: f64,
    /// Sum of absolute deviations from the mean
    pub sigma: f64,
    pub standard_deviation: f64,
}

/// Arithmetic mean.
pub fn mean(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(TrevisError::EmptyStatistics("mean"));
    }
    Ok(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population variance (divides by N).
pub fn variance(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(TrevisError::EmptyStatistics("variance"));
    }
    let mean = mean(data)?;
    let n = data.len() as f64;
    Ok(data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n)
}

/// Sum of absolute deviations from the mean; zero for a single value.
pub fn sigma(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(TrevisError::EmptyStatistics("sigma"));
    }
    if data.len() == 1 {
        return Ok(0.0);
    }
    let mean = mean(data)?;
    Ok(data.iter().map(|x| (x - mean).abs()).sum())
}

/// Square root of a variance. A negative variance means the caller passed garbage.
pub fn standard_deviation(variance: f64) -> Result<f64> {
    if variance < 0.0 {
        return Err(TrevisError::NegativeVariance(variance));
    }
    Ok(variance.sqrt())
}

/// All statistics at once. An empty sample yields zeros so report rows stay printable.
pub fn simple_statistics(data: &[f64]) -> Result<SimpleStatistics> {
    if data.is_empty() {
        return Ok(SimpleStatistics::default());
    }
    let variance = variance(data)?;
    Ok(SimpleStatistics {
        mean: mean(data)?,
        variance,
        sigma: sigma(data)?,
        standard_deviation: standard_deviation(variance)?,
    })
}

/// Round to the given number of decimals, exact halves going to the even digit.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
