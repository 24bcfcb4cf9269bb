use crate::matrix::CsrMatrix;

/// Result of one conjugate-gradient run.
#[derive(Clone, Copy, Debug)]
pub struct CgOutcome {
    pub iterations: usize,
    pub converged: bool,
    /// Relative residual `||r|| / ||b||` at exit.
    pub residual: f64,
}

/// Jacobi-preconditioned conjugate gradient for symmetric positive-definite
/// systems. `x` carries the warm-start guess in and the solution out.
///
/// Stops when the relative residual drops below `tol` or after `max_iter`
/// steps, whichever comes first.
pub fn pcg_solve(a: &CsrMatrix, b: &[f64], x: &mut [f64], max_iter: usize, tol: f64) -> CgOutcome {
    let n = a.n();
    debug_assert_eq!(b.len(), n);
    debug_assert_eq!(x.len(), n);

    // rows without any entry keep their guess; precondition with 1 there
    let inv_diag: Vec<f64> = a
        .diag()
        .iter()
        .map(|&d| if d.abs() > 1e-300 { 1.0 / d } else { 1.0 })
        .collect();

    // keep the relative test meaningful for an all-zero rhs: CG then walks
    // from the warm start to the nearest null-space solution
    let b_norm = norm(b).max(1e-300);

    let mut r = vec![0.0; n];
    a.mul_vec(x, &mut r);
    for i in 0..n {
        r[i] = b[i] - r[i];
    }

    let mut z: Vec<f64> = (0..n).map(|i| inv_diag[i] * r[i]).collect();
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut ap = vec![0.0; n];

    let mut iterations = 0;
    let mut residual = norm(&r) / b_norm;
    while iterations < max_iter {
        if residual < tol {
            return CgOutcome {
                iterations,
                converged: true,
                residual,
            };
        }
        a.mul_vec(&p, &mut ap);
        let p_ap = dot(&p, &ap);
        if p_ap <= 0.0 || !p_ap.is_finite() {
            // loss of positive definiteness, keep the best iterate
            break;
        }
        let alpha = rz / p_ap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        for i in 0..n {
            z[i] = inv_diag[i] * r[i];
        }
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz = rz_new;
        iterations += 1;
        residual = norm(&r) / b_norm;
    }

    CgOutcome {
        iterations,
        converged: residual < tol,
        residual,
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Triplet;

    fn laplacian_2() -> CsrMatrix {
        // [2 -1; -1 2]
        let mut a = CsrMatrix::new(2);
        a.set_from_triplets(&[
            Triplet::new(0, 0, 2.0),
            Triplet::new(0, 1, -1.0),
            Triplet::new(1, 0, -1.0),
            Triplet::new(1, 1, 2.0),
        ]);
        a
    }

    #[test]
    fn solves_small_spd_system() {
        let a = laplacian_2();
        let b = [1.0, 0.0];
        let mut x = [0.0, 0.0];
        let out = pcg_solve(&a, &b, &mut x, 100, 1e-10);
        assert!(out.converged);
        // exact solution [2/3, 1/3]
        assert!((x[0] - 2.0 / 3.0).abs() < 1e-8);
        assert!((x[1] - 1.0 / 3.0).abs() < 1e-8);
    }

    #[test]
    fn warm_start_converges_immediately() {
        let a = laplacian_2();
        let b = [1.0, 0.0];
        let mut x = [2.0 / 3.0, 1.0 / 3.0];
        let out = pcg_solve(&a, &b, &mut x, 100, 1e-8);
        assert!(out.converged);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn zero_rhs_keeps_nearest_null_space_solution() {
        // [2 -1; -1 2] has no null space, so the solution is 0
        let a = laplacian_2();
        let mut x = [5.0, 4.0];
        let out = pcg_solve(&a, &[0.0, 0.0], &mut x, 100, 1e-8);
        assert!(out.converged);
        assert!(x[0].abs() < 1e-6 && x[1].abs() < 1e-6);

        // a free two-body spring keeps the warm start's mean
        let mut s = CsrMatrix::new(2);
        s.set_from_triplets(&[
            Triplet::new(0, 0, 1.0),
            Triplet::new(0, 1, -1.0),
            Triplet::new(1, 0, -1.0),
            Triplet::new(1, 1, 1.0),
        ]);
        let mut x = [10.0, 60.0];
        let out = pcg_solve(&s, &[0.0, 0.0], &mut x, 100, 1e-8);
        assert!(out.converged);
        assert!((x[0] - 35.0).abs() < 1e-6, "got {x:?}");
        assert!((x[1] - 35.0).abs() < 1e-6);
    }
}
