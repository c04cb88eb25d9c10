/// Cubic Hermite interpolant over the last accepted step.
///
/// Built from the values and derivatives at both ends of the step, so it is
/// exact at both ends and third-order accurate in between.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Dense {
    t0: f64,
    t1: f64,
    end: f64,
    y0: Vec<f64>,
    f0: Vec<f64>,
    y1: Vec<f64>,
    f1: Vec<f64>,
}

impl Dense {
    pub(super) fn new(
        t0: f64,
        y0: Vec<f64>,
        f0: Vec<f64>,
        t1: f64,
        y1: Vec<f64>,
        f1: Vec<f64>,
    ) -> Self {
        Self {
            t0,
            t1,
            end: t1,
            y0,
            f0,
            y1,
            f1,
        }
    }

    pub(super) fn start(&self) -> f64 {
        self.t0
    }

    /// Last time the interpolant may be evaluated at.
    pub(super) fn end(&self) -> f64 {
        self.end
    }

    pub(super) fn contains(&self, t: f64) -> bool {
        (self.t0..=self.end).contains(&t)
    }

    /// Restricts the valid span to `[start, end]` without changing the curve.
    pub(super) fn truncate(&mut self, end: f64) {
        self.end = end.clamp(self.t0, self.end);
    }

    pub(super) fn eval(&self, t: f64) -> Vec<f64> {
        let h = self.t1 - self.t0;
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        self.y0
            .iter()
            .zip(&self.f0)
            .zip(self.y1.iter().zip(&self.f1))
            .map(|((y0, f0), (y1, f1))| h00 * y0 + h10 * h * f0 + h01 * y1 + h11 * h * f1)
            .collect()
    }
}
