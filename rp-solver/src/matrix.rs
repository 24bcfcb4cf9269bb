/// One coefficient contribution `A[row, col] += w`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triplet {
    pub row: u32,
    pub col: u32,
    pub w: f64,
}

impl Triplet {
    #[inline]
    pub fn new(row: usize, col: usize, w: f64) -> Self {
        Triplet {
            row: row as u32,
            col: col as u32,
            w,
        }
    }
}

/// Square sparse matrix in compressed-sparse-row form.
///
/// Built from a triplet buffer with duplicates summed; the build is fully
/// deterministic for a given triplet order.
#[derive(Clone, Debug, Default)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<u32>,
    values: Vec<f64>,
    /// Diagonal entries, cached for Jacobi preconditioning.
    diag: Vec<f64>,
}

impl CsrMatrix {
    pub fn new(n: usize) -> Self {
        CsrMatrix {
            n,
            row_ptr: vec![0; n + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
            diag: vec![0.0; n],
        }
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    /// Rebuild the matrix from triplets, summing duplicate coordinates.
    pub fn set_from_triplets(&mut self, triplets: &[Triplet]) {
        let n = self.n;

        // counting pass over unique-per-(row, col) entries is not needed:
        // count all, then compact duplicates after the scatter.
        let mut counts = vec![0usize; n + 1];
        for t in triplets {
            counts[t.row as usize + 1] += 1;
        }
        for i in 0..n {
            counts[i + 1] += counts[i];
        }

        let mut cols = vec![0u32; triplets.len()];
        let mut vals = vec![0.0f64; triplets.len()];
        let mut next = counts.clone();
        for t in triplets {
            let slot = next[t.row as usize];
            cols[slot] = t.col;
            vals[slot] = t.w;
            next[t.row as usize] += 1;
        }

        self.row_ptr.clear();
        self.row_ptr.push(0);
        self.col_idx.clear();
        self.values.clear();
        self.diag.iter_mut().for_each(|d| *d = 0.0);

        let mut scratch: Vec<(u32, f64)> = Vec::new();
        for i in 0..n {
            let lo = counts[i];
            let hi = counts[i + 1];
            scratch.clear();
            scratch.extend(cols[lo..hi].iter().copied().zip(vals[lo..hi].iter().copied()));
            scratch.sort_by_key(|&(c, _)| c);

            let mut k = 0;
            while k < scratch.len() {
                let col = scratch[k].0;
                let mut sum = 0.0;
                while k < scratch.len() && scratch[k].0 == col {
                    sum += scratch[k].1;
                    k += 1;
                }
                self.col_idx.push(col);
                self.values.push(sum);
                if col as usize == i {
                    self.diag[i] = sum;
                }
            }
            self.row_ptr.push(self.col_idx.len());
        }
    }

    /// `out = A * x`
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n);
        for i in 0..self.n {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k] as usize];
            }
            out[i] = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_summed() {
        let mut a = CsrMatrix::new(2);
        a.set_from_triplets(&[
            Triplet::new(0, 0, 1.0),
            Triplet::new(0, 0, 2.0),
            Triplet::new(0, 1, -1.0),
            Triplet::new(1, 0, -1.0),
            Triplet::new(1, 1, 3.0),
        ]);
        assert_eq!(a.diag(), &[3.0, 3.0]);
        let mut out = vec![0.0; 2];
        a.mul_vec(&[1.0, 1.0], &mut out);
        assert_eq!(out, vec![2.0, 2.0]);
    }

    #[test]
    fn empty_rows_allowed() {
        let mut a = CsrMatrix::new(3);
        a.set_from_triplets(&[Triplet::new(2, 2, 5.0)]);
        let mut out = vec![0.0; 3];
        a.mul_vec(&[1.0, 1.0, 1.0], &mut out);
        assert_eq!(out, vec![0.0, 0.0, 5.0]);
    }
}
