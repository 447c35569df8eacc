use super::grid::Grid2D;

impl Grid2D {
    /// Merge groups of `x_factor` x `y_factor` bins into one.
    ///
    /// Contents are summed and errors added in quadrature. When a factor does not divide the
    /// bin count the trailing incomplete group is dropped, matching ROOT's `Rebin2D`.
    pub fn rebin2d(&self, x_factor: usize, y_factor: usize) -> Grid2D {
        let x_factor = x_factor.max(1);
        let y_factor = y_factor.max(1);

        let mut rebinned = Grid2D::new(self.x.rebinned(x_factor), self.y.rebinned(y_factor));

        // accumulate squared errors, take the root at the end
        for ix in 0..self.nx() {
            for iy in 0..self.ny() {
                let (new_ix, new_iy) = (ix / x_factor, iy / y_factor);
                if new_ix >= rebinned.nx() || new_iy >= rebinned.ny() {
                    continue;
                }
                rebinned.contents[(new_ix, new_iy)] += self.content(ix, iy);
                rebinned.errors[(new_ix, new_iy)] += self.error(ix, iy).powi(2);
            }
        }
        rebinned.errors.apply(|e| *e = e.sqrt());

        rebinned
    }

    /// Rebin factors used for the diagnostic outputs written next to each template
    pub fn diagnostic_rebin_factors(&self) -> Vec<usize> {
        (2..6)
            .filter(|&factor| factor <= self.nx() && factor <= self.ny())
            .collect()
    }
}
