// Discrete multi-axis PID with trapezoidal integration and anti-windup

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PidError {
    #[error("Time step must be positive, got {0}")]
    InvalidDt(f64),

    #[error("{name} has dimension {got}, controller has {expected} axes")]
    Dimension {
        name: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Per-axis (diagonal) gains, as stored in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: Vec<f64>,
    pub ki: Vec<f64>,
    pub kd: Vec<f64>,
    /// Magnitude at which the integral accumulator freezes
    pub integral_limit: Vec<f64>,
}

/// PID state. Gain matrices are general but usually diagonal.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: DMatrix<f64>,
    ki: DMatrix<f64>,
    kd: DMatrix<f64>,
    integral: DVector<f64>,
    integral_limit: DVector<f64>,
    prev_error: DVector<f64>,
}

impl Pid {
    pub fn new(
        kp: DMatrix<f64>,
        ki: DMatrix<f64>,
        kd: DMatrix<f64>,
        integral_limit: DVector<f64>,
    ) -> Result<Self, PidError> {
        let n = integral_limit.len();
        for (name, gain) in [("kp", &kp), ("ki", &ki), ("kd", &kd)] {
            if gain.nrows() != n || gain.ncols() != n {
                return Err(PidError::Dimension {
                    name,
                    expected: n,
                    got: gain.nrows().max(gain.ncols()),
                });
            }
        }

        Ok(Self {
            kp,
            ki,
            kd,
            integral: DVector::zeros(n),
            integral_limit,
            prev_error: DVector::zeros(n),
        })
    }

    /// Build from per-axis gains
    pub fn from_gains(gains: &PidGains) -> Result<Self, PidError> {
        let diag = |v: &[f64]| DMatrix::from_diagonal(&DVector::from_column_slice(v));
        Self::new(
            diag(&gains.kp),
            diag(&gains.ki),
            diag(&gains.kd),
            DVector::from_column_slice(&gains.integral_limit),
        )
    }

    pub fn axes(&self) -> usize {
        self.integral_limit.len()
    }

    /// Compute the control output for one step of length `dt`.
    ///
    /// Integral: each axis accumulates ki * dt * (prev_error + error) / 2 until
    /// its magnitude reaches the limit, after which it is pinned at +-limit and
    /// stops growing. The previous error is updated on every call.
    pub fn execute(
        &mut self,
        reference: &DVector<f64>,
        feedback: &DVector<f64>,
        dt: f64,
    ) -> Result<DVector<f64>, PidError> {
        let n = self.axes();
        for (name, v) in [("reference", reference), ("feedback", feedback)] {
            if v.len() != n {
                return Err(PidError::Dimension {
                    name,
                    expected: n,
                    got: v.len(),
                });
            }
        }
        if !(dt > 0.0) {
            return Err(PidError::InvalidDt(dt));
        }

        let error = reference - feedback;
        let term_p = &self.kp * &error;

        let trapezoid = (&self.prev_error + &error) * (dt / 2.0);
        let increment = &self.ki * trapezoid;
        for i in 0..n {
            let limit = self.integral_limit[i];
            if self.integral[i].abs() >= limit {
                self.integral[i] = self.integral[i].signum() * limit;
            } else {
                self.integral[i] += increment[i];
            }
        }

        let term_d = &self.kd * ((&error - &self.prev_error) / dt);
        let output = term_p + &self.integral + term_d;

        self.prev_error = error;
        Ok(output)
    }

    /// Clear the integral and previous error, keeping the gains
    pub fn reset(&mut self) {
        self.integral.fill(0.0);
        self.prev_error.fill(0.0);
    }

    pub fn integral(&self) -> &DVector<f64> {
        &self.integral
    }

    pub fn prev_error(&self) -> &DVector<f64> {
        &self.prev_error
    }

    pub fn kp(&self) -> &DMatrix<f64> {
        &self.kp
    }
}
