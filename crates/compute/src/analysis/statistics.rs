/// Summaries of an elevation series.
pub struct Statistics;

impl Statistics {
    pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
        let first = *values.first()?;
        let mut min = first;
        let mut max = first;
        for &v in values.iter().skip(1) {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }

    /// Sum of rises and sum of drops between consecutive values.
    pub fn ascent_descent(values: &[f64]) -> (f64, f64) {
        let mut ascent = 0.0;
        let mut descent = 0.0;
        for pair in values.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                ascent += delta;
            } else {
                descent -= delta;
            }
        }
        (ascent, descent)
    }
}
