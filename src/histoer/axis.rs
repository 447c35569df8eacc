/// Bin edges of one grid axis. `edges.len() == bins + 1`, strictly increasing.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Axis {
    pub edges: Vec<f64>,
}

impl Axis {
    // Create an axis with equal width bins
    pub fn uniform(bins: usize, range: (f64, f64)) -> Self {
        let width = (range.1 - range.0) / bins as f64;
        let edges = (0..=bins).map(|i| range.0 + i as f64 * width).collect();
        Self { edges }
    }

    pub fn from_edges(edges: Vec<f64>) -> Self {
        Self { edges }
    }

    pub fn bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn min(&self) -> f64 {
        self.edges.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.edges.last().copied().unwrap_or(0.0)
    }

    pub fn low_edge(&self, bin: usize) -> f64 {
        self.edges[bin]
    }

    pub fn width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    pub fn center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    // get the bin index for a given value, None for underflow/overflow
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        if self.bins() == 0 || value < self.min() || value >= self.max() {
            return None;
        }

        // edges are sorted, so the bin is the last edge <= value
        let index = self.edges.partition_point(|&edge| edge <= value);
        Some(index - 1)
    }

    /// Like `find_bin`, but values outside the axis land in the first/last bin.
    pub fn find_bin_clamped(&self, value: f64) -> usize {
        match self.find_bin(value) {
            Some(bin) => bin,
            None if value < self.min() => 0,
            None => self.bins().saturating_sub(1),
        }
    }

    /// Merge groups of `factor` bins. An incomplete group at the high end is dropped and the
    /// upper edge moves down to the end of the last full group, as ROOT's `Rebin` does.
    pub fn rebinned(&self, factor: usize) -> Self {
        let factor = factor.clamp(1, self.bins().max(1));
        let n_full = self.bins() / factor;
        let edges = self.edges[..=n_full * factor]
            .iter()
            .step_by(factor)
            .copied()
            .collect();
        Self { edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_bin() {
        let axis = Axis::uniform(4, (0.0, 4.0));
        assert_eq!(axis.find_bin(-0.1), None);
        assert_eq!(axis.find_bin(0.0), Some(0));
        assert_eq!(axis.find_bin(2.5), Some(2));
        assert_eq!(axis.find_bin(4.0), None);
        assert_eq!(axis.find_bin_clamped(7.0), 3);
        assert_eq!(axis.find_bin_clamped(-7.0), 0);
    }

    #[test]
    fn test_variable_edges() {
        let axis = Axis::from_edges(vec![0.0, 1.0, 3.0, 10.0]);
        assert_eq!(axis.bins(), 3);
        assert_eq!(axis.find_bin(2.9), Some(1));
        assert!((axis.center(2) - 6.5).abs() < 1e-12);
    }

    #[test]
    fn test_rebinned_drops_incomplete_group() {
        let axis = Axis::uniform(5, (0.0, 5.0));
        let rebinned = axis.rebinned(2);
        assert_eq!(rebinned.edges, vec![0.0, 2.0, 4.0]);
        assert_eq!(axis.rebinned(5).edges, vec![0.0, 5.0]);
        assert_eq!(axis.rebinned(9).edges, vec![0.0, 5.0]);
    }
}
