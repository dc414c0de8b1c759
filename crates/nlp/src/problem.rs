//! Problem descriptions consumed by the solver.

use nalgebra::{DMatrix, DVector};

/// A bound-constrained nonlinear program
///
/// ```text
/// minimize f(x)  subject to  c(x) = 0,  g(x) >= 0,  lower <= x <= upper
/// ```
///
/// Derivatives default to central finite differences; problems with known structure
/// should override them.
pub trait Problem {
    fn dimension(&self) -> usize;

    fn lower_bounds(&self) -> DVector<f64>;

    fn upper_bounds(&self) -> DVector<f64>;

    fn objective(&self, x: &DVector<f64>) -> f64;

    fn equalities(&self, _x: &DVector<f64>) -> DVector<f64> {
        DVector::zeros(0)
    }

    /// Inequality constraints in `g(x) >= 0` form.
    fn inequalities(&self, _x: &DVector<f64>) -> DVector<f64> {
        DVector::zeros(0)
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        finite_difference_gradient(x, |z| self.objective(z))
    }

    fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        finite_difference_jacobian(x, |z| self.equalities(z))
    }

    fn inequality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        finite_difference_jacobian(x, |z| self.inequalities(z))
    }

    /// Hessian of `sigma f(x) + w' c(x) + v' g(x)` for the given weights.
    ///
    /// The default differentiates the weighted gradients; it is exact only as far as the
    /// gradient and Jacobians are.
    fn lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_weight: f64,
        equality_weights: &DVector<f64>,
        inequality_weights: &DVector<f64>,
    ) -> DMatrix<f64> {
        let hessian = finite_difference_jacobian(x, |z| {
            let mut grad = self.gradient(z) * objective_weight;
            if !equality_weights.is_empty() {
                grad += self.equality_jacobian(z).tr_mul(equality_weights);
            }
            if !inequality_weights.is_empty() {
                grad += self.inequality_jacobian(z).tr_mul(inequality_weights);
            }
            grad
        });
        symmetrize(hessian)
    }

    /// Characteristic magnitude of each variable; the solver iterates on `x / scale`.
    fn variable_scale(&self) -> DVector<f64> {
        DVector::from_element(self.dimension(), 1.0)
    }

    /// Multiplier applied to the objective before it enters the merit function.
    fn objective_scale(&self) -> f64 {
        1.0
    }
}

/// Average a square matrix with its transpose.
pub fn symmetrize(matrix: DMatrix<f64>) -> DMatrix<f64> {
    (&matrix + matrix.transpose()) * 0.5
}

fn fd_step(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}

/// Central-difference gradient of a scalar function.
pub fn finite_difference_gradient<F>(x: &DVector<f64>, f: F) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let mut shifted = x.clone();
    let mut grad = DVector::zeros(x.len());
    for j in 0..x.len() {
        let step = fd_step(x[j]);
        shifted[j] = x[j] + step;
        let plus = f(&shifted);
        shifted[j] = x[j] - step;
        let minus = f(&shifted);
        shifted[j] = x[j];
        grad[j] = (plus - minus) / (2.0 * step);
    }
    grad
}

/// Central-difference Jacobian of a vector function; rows follow the function's outputs.
pub fn finite_difference_jacobian<F>(x: &DVector<f64>, f: F) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let rows = f(x).len();
    let mut jac = DMatrix::zeros(rows, x.len());
    if rows == 0 {
        return jac;
    }
    let mut shifted = x.clone();
    for j in 0..x.len() {
        let step = fd_step(x[j]);
        shifted[j] = x[j] + step;
        let plus = f(&shifted);
        shifted[j] = x[j] - step;
        let minus = f(&shifted);
        shifted[j] = x[j];
        let column = (plus - minus) / (2.0 * step);
        jac.set_column(j, &column);
    }
    jac
}
