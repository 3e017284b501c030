//! Recorded compartment counts and time averages of piecewise-constant series.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time series of compartment counts and R0 estimates.
///
/// Each record holds the state in effect from its time until the next record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observables {
    pub time: Vec<f64>,
    pub susceptible: Vec<usize>,
    pub infected: Vec<usize>,
    pub recovered: Vec<usize>,
    /// Reproduction-number estimate at each record.
    pub r0: Vec<f64>,
}

impl Observables {
    /// Append one record. `counts` is ordered S, I, R.
    pub fn push(&mut self, time: f64, counts: [usize; 3], r0: f64) {
        self.time.push(time);
        self.susceptible.push(counts[0]);
        self.infected.push(counts[1]);
        self.recovered.push(counts[2]);
        self.r0.push(r0);
    }

    /// Drop the most recent record.
    pub fn pop(&mut self) {
        self.time.pop();
        self.susceptible.pop();
        self.infected.pop();
        self.recovered.pop();
        self.r0.pop();
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Time of the most recent record.
    pub fn last_time(&self) -> Option<f64> {
        self.time.last().copied()
    }

    /// Infected fraction at every record.
    pub fn prevalence(&self, n: usize) -> Vec<f64> {
        let n = n.max(1) as f64;
        self.infected.iter().map(|&i| i as f64 / n).collect()
    }
}

/// Exact time average of a piecewise-constant series.
///
/// `values[i]` holds on `[t[i], t[i+1])`, the last value until `tmax`:
/// `Σ values[i]·(t[i+1] − t[i]) / (tmax − t[0])`.
pub fn time_average(t: &[f64], values: &[f64], tmax: f64) -> Result<f64> {
    check_series(t, values, tmax)?;

    let mut integral = 0.0;
    for (i, &value) in values.iter().enumerate() {
        let end = t.get(i + 1).copied().unwrap_or(tmax);
        integral += value * (end - t[i]);
    }
    Ok(integral / (tmax - t[0]))
}

/// Root-mean-square deviation of a piecewise-constant series from its time average.
pub fn time_average_std(t: &[f64], values: &[f64], tmax: f64) -> Result<f64> {
    let mean = time_average(t, values, tmax)?;
    let squared: Vec<f64> = values.iter().map(|&v| (v - mean).powi(2)).collect();
    Ok(time_average(t, &squared, tmax)?.sqrt())
}

fn check_series(t: &[f64], values: &[f64], tmax: f64) -> Result<()> {
    if t.is_empty() {
        return Err(Error::InvalidSeries("empty series".to_string()));
    }
    if t.len() != values.len() {
        return Err(Error::InvalidSeries(format!(
            "{} times but {} values",
            t.len(),
            values.len()
        )));
    }
    if t.windows(2).any(|w| w[1] < w[0]) {
        return Err(Error::InvalidSeries("times are not sorted".to_string()));
    }
    let last = t[t.len() - 1];
    if !(tmax > t[0]) || tmax < last {
        return Err(Error::InvalidSeries(format!(
            "tmax={tmax} must exceed t0={} and be at least {last}",
            t[0]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_piecewise_constant_average() {
        let avg = time_average(&[0.0, 1.0, 3.0], &[2.0, 4.0, 1.0], 4.0).unwrap();
        assert_relative_eq!(avg, 2.75, epsilon = 1e-12);
    }

    #[test]
    fn test_average_not_sample_mean() {
        let avg = time_average(&[0.0, 0.1], &[10.0, 0.0], 10.0).unwrap();
        assert_relative_eq!(avg, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_series_has_zero_std() {
        let std = time_average_std(&[0.0, 2.0, 5.0], &[3.0, 3.0, 3.0], 6.0).unwrap();
        assert_relative_eq!(std, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_std_of_two_level_series() {
        // half the time 0, half the time 2: mean 1, std 1
        let std = time_average_std(&[0.0, 1.0], &[0.0, 2.0], 2.0).unwrap();
        assert_relative_eq!(std, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_series() {
        assert!(time_average(&[], &[], 1.0).is_err());
        assert!(time_average(&[0.0], &[1.0, 2.0], 1.0).is_err());
        assert!(time_average(&[0.0, 2.0], &[1.0, 2.0], 1.0).is_err());
        assert!(time_average(&[0.0], &[1.0], 0.0).is_err());
    }

    #[test]
    fn test_push_and_pop() {
        let mut obs = Observables::default();
        obs.push(0.0, [9, 1, 0], 1.5);
        obs.push(0.5, [10, 0, 0], 0.0);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs.prevalence(10), vec![0.1, 0.0]);
        obs.pop();
        assert_eq!(obs.last_time(), Some(0.0));
        assert_eq!(obs.r0, vec![1.5]);
    }
}
