//! Exponential radial transform.
//!
//! Maps the integer grid index `k = 0..npoint` onto radii
//! `r_k = rmin * exp(k * h)` with `h` chosen so that `r_{npoint-1} = rmax`.
//! The volume element `dr/dk = h * r_k` converts integrals over the index
//! axis into integrals over the radius.

/// Description of a logarithmic radial grid for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialTransform {
    rmin: f64,
    rmax: f64,
    npoint: usize,
}

impl RadialTransform {
    /// Creates a transform spanning `[rmin, rmax]` with `npoint` points.
    ///
    /// The transform is plain data; degenerate parameters (non-positive or
    /// reversed bounds) surface later as non-positive quadrature weights when
    /// the grid is actually integrated over.
    pub fn new(rmin: f64, rmax: f64, npoint: usize) -> Self {
        Self { rmin, rmax, npoint }
    }

    /// Number of radial points.
    pub fn npoint(&self) -> usize {
        self.npoint
    }

    /// Logarithmic step between consecutive radii.
    fn step(&self) -> f64 {
        if self.npoint < 2 {
            return 0.0;
        }
        (self.rmax / self.rmin).ln() / (self.npoint - 1) as f64
    }

    /// The radii of all grid points, in increasing order.
    pub fn radii(&self) -> Vec<f64> {
        let h = self.step();
        (0..self.npoint)
            .map(|k| self.rmin * libm::exp(h * k as f64))
            .collect()
    }

    /// The volume elements `dr/dk` at every grid point.
    pub fn volume_elements(&self) -> Vec<f64> {
        let h = self.step();
        self.radii().into_iter().map(|r| h * r).collect()
    }
}
