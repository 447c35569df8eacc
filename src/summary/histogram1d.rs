#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Histogram {
    pub name: String,
    pub bins: Vec<u64>,
    pub range: (f64, f64),
    pub overflow: u64,
    pub underflow: u64,
    pub bin_width: f64,
}

impl Histogram {
    // Create a new Histogram with specified min, max, and number of bins
    pub fn new(name: &str, number_of_bins: usize, range: (f64, f64)) -> Self {
        Histogram {
            name: name.to_string(),
            bins: vec![0; number_of_bins],
            range,
            overflow: 0,
            underflow: 0,
            bin_width: (range.1 - range.0) / number_of_bins as f64,
        }
    }

    // Add a value to the histogram
    pub fn fill(&mut self, value: f64) {
        if value >= self.range.0 && value < self.range.1 {
            let index = ((value - self.range.0) / self.bin_width) as usize;
            if index < self.bins.len() {
                self.bins[index] += 1;
            }
        } else if value >= self.range.1 {
            self.overflow += 1;
        } else {
            self.underflow += 1;
        }
    }

    /// Number of fills, including under- and overflow.
    pub fn entries(&self) -> u64 {
        self.bins.iter().sum::<u64>() + self.underflow + self.overflow
    }

    pub fn maximum(&self) -> u64 {
        self.bins.iter().copied().max().unwrap_or(0)
    }

    pub fn get_bin_edges(&self) -> Vec<f64> {
        (0..=self.bins.len())
            .map(|i| self.range.0 + i as f64 * self.bin_width)
            .collect()
    }

    // Get the bin index for a given x position.
    pub fn get_bin_index(&self, x: f64) -> Option<usize> {
        if x < self.range.0 || x >= self.range.1 {
            return None;
        }
        let last = self.bins.len().checked_sub(1)?;
        Some((((x - self.range.0) / self.bin_width).floor() as usize).min(last))
    }

    /// Fraction of all entries in the bin holding `x` or any bin above it.
    ///
    /// Values below the range count the underflow too, values above it give 0. Overflow entries
    /// only enter the denominator. An empty histogram gives 1.
    pub fn tail_fraction(&self, x: f64) -> f64 {
        let entries = self.entries();
        if entries == 0 {
            return 1.0;
        }
        let tail: u64 = if x < self.range.0 {
            self.underflow + self.bins.iter().sum::<u64>()
        } else {
            match self.get_bin_index(x) {
                Some(bin) => self.bins[bin..].iter().sum(),
                None => 0,
            }
        };
        tail as f64 / entries as f64
    }

    // Calculate the statistics for the in-range bins: (count, mean, stdev)
    pub fn get_statistics(&self) -> (u64, f64, f64) {
        let centers = (0..self.bins.len())
            .map(|bin| self.range.0 + (bin as f64 + 0.5) * self.bin_width);
        let total_count: u64 = self.bins.iter().sum();
        if total_count == 0 {
            return (0, 0.0, 0.0);
        }

        let sum_product: f64 = centers
            .clone()
            .zip(&self.bins)
            .map(|(center, &count)| center * count as f64)
            .sum();
        let mean = sum_product / total_count as f64;
        let sum_squared_diff: f64 = centers
            .zip(&self.bins)
            .map(|(center, &count)| count as f64 * (center - mean).powi(2))
            .sum();

        (total_count, mean, (sum_squared_diff / total_count as f64).sqrt())
    }

    // Convert histogram bins to step-line points
    pub fn line_points(&self) -> Vec<[f64; 2]> {
        self.bins
            .iter()
            .enumerate()
            .flat_map(|(index, &count)| {
                let start = self.range.0 + index as f64 * self.bin_width;
                let end = start + self.bin_width;
                [[start, count as f64], [end, count as f64]]
            })
            .collect()
    }
}
