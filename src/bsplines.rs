//! B-spline knot vectors and basis function evaluation.
//!
//! The evaluation routines implement the triangular Cox-de Boor scheme for the values and the
//! corresponding recurrence for derivatives (algorithms A2.2 and A2.3 of Piegl and Tiller,
//! *The NURBS Book*). Knot spans are indexed into the full knot vector, so that the non-vanishing
//! basis functions on span `i` are `N_{i-p}, ..., N_i`.

use itertools::Itertools;
use nalgebra::DMatrix;

use crate::{
    constants::LOCATE_TOLERANCE,
    error::{Error, Result},
    locate::locate_cell,
};

/// A validated, non-decreasing knot vector together with its degree.
///
/// Distinct breakpoints of the parametric domain `[t_p, t_n]` and the knot span of every
/// cell between two consecutive breakpoints are computed once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotVector {
    knots: Vec<f64>,
    degree: usize,
    breaks: Vec<f64>,
    spans: Vec<usize>,
}

impl KnotVector {
    /// Create a knot vector of given degree.
    ///
    /// Fails if the knots are not sorted, if a knot is repeated more than `degree + 1` times,
    /// if there are fewer than `degree + 1` basis functions or if the parametric domain is empty.
    pub fn new(knots: Vec<f64>, degree: usize) -> Result<Self> {
        if knots.len() < 2 * (degree + 1) {
            return Err(Error::configuration(
                "knots",
                format!(
                    "{} knots cannot support a basis of degree {}",
                    knots.len(),
                    degree
                ),
            ));
        }

        if knots.iter().any(|t| !t.is_finite()) {
            return Err(Error::configuration("knots", "knots must be finite"));
        }

        if let Some((a, b)) = knots.iter().tuple_windows().find(|(a, b)| a > b) {
            return Err(Error::configuration(
                "knots",
                format!("knots must be non-decreasing, found {a} before {b}"),
            ));
        }

        if let Some((value, count)) = knots
            .iter()
            .dedup_with_count()
            .map(|(count, value)| (value, count))
            .find(|&(_, count)| count > degree + 1)
        {
            return Err(Error::configuration(
                "knots",
                format!(
                    "knot {value} has multiplicity {count}, at most {} is allowed",
                    degree + 1
                ),
            ));
        }

        let nbasis = knots.len() - degree - 1;
        if knots[degree] >= knots[nbasis] {
            return Err(Error::configuration(
                "knots",
                "parametric domain [t_p, t_n] is empty",
            ));
        }

        let (breaks, spans) = breakpoints_and_spans(&knots, degree);

        Ok(Self {
            knots,
            degree,
            breaks,
            spans,
        })
    }

    /// Open knot vector on `ncells` uniform cells of `domain`.
    ///
    /// The boundary knots are repeated `degree + 1` times, so the basis interpolates at the
    /// domain ends.
    pub fn open_uniform(degree: usize, ncells: usize, domain: [f64; 2]) -> Result<Self> {
        check_uniform_parameters(ncells, domain)?;
        let [a, b] = domain;
        let h = (b - a) / ncells as f64;

        let knots = std::iter::repeat(a)
            .take(degree)
            .chain((0..=ncells).map(|i| if i == ncells { b } else { a + i as f64 * h }))
            .chain(std::iter::repeat(b).take(degree))
            .collect_vec();

        Self::new(knots, degree)
    }

    /// Knot vector for a periodic spline space on `ncells` uniform cells of `domain`.
    ///
    /// The knots extend `degree` cells beyond the domain on either side. The first `degree`
    /// basis functions are identified with the last `degree` ones by the periodic space.
    pub fn periodic_uniform(degree: usize, ncells: usize, domain: [f64; 2]) -> Result<Self> {
        check_uniform_parameters(ncells, domain)?;
        if ncells < degree {
            return Err(Error::configuration(
                "ncells",
                format!("a periodic space of degree {degree} needs at least {degree} cells"),
            ));
        }
        let [a, b] = domain;
        let h = (b - a) / ncells as f64;

        let knots = (0..ncells + 2 * degree + 1)
            .map(|i| a + (i as f64 - degree as f64) * h)
            .collect_vec();

        Self::new(knots, degree)
    }

    /// The knots.
    pub fn as_slice(&self) -> &[f64] {
        &self.knots
    }

    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of basis functions `n = len - degree - 1`.
    pub fn nbasis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Parametric domain `[t_p, t_n]`.
    pub fn domain(&self) -> [f64; 2] {
        [self.knots[self.degree], self.knots[self.nbasis()]]
    }

    /// Distinct breakpoints of the parametric domain.
    pub fn breakpoints(&self) -> &[f64] {
        &self.breaks
    }

    /// Knot span of every cell between consecutive breakpoints.
    pub fn spans(&self) -> &[usize] {
        &self.spans
    }

    /// Number of cells between consecutive breakpoints.
    pub fn ncells(&self) -> usize {
        self.spans.len()
    }

    /// Find the knot span containing `x`.
    ///
    /// Points within `tol` of a breakpoint follow the tie-breaking rule of
    /// [locate_cell](crate::locate::locate_cell). Returns `None` for points out of bounds.
    pub fn find_span(&self, x: f64, tol: f64) -> Option<usize> {
        locate_cell(&self.breaks, x, tol).map(|cell| self.spans[cell])
    }

    /// Evaluate the non-vanishing basis functions and their derivatives up to order `nderiv`.
    ///
    /// Returns the knot span containing `x` and a `(nderiv + 1) x (degree + 1)` matrix whose entry
    /// `(k, r)` is the `k`-th derivative of basis function `span - degree + r`.
    pub fn evaluate(&self, x: f64, nderiv: usize) -> Result<(usize, DMatrix<f64>)> {
        let [lower, upper] = self.domain();
        let span = self
            .find_span(x, LOCATE_TOLERANCE)
            .ok_or(Error::Domain {
                point: x,
                lower,
                upper,
            })?;

        Ok((
            span,
            basis_funs_all_ders(&self.knots, self.degree, x, span, nderiv),
        ))
    }

    /// Greville abscissae, the averages of `degree` consecutive interior knots.
    pub fn greville(&self) -> Vec<f64> {
        let p = self.degree;
        if p == 0 {
            return self
                .knots
                .iter()
                .tuple_windows()
                .map(|(a, b)| 0.5 * (a + b))
                .collect();
        }

        (0..self.nbasis())
            .map(|i| self.knots[i + 1..=i + p].iter().sum::<f64>() / p as f64)
            .collect()
    }
}

fn check_uniform_parameters(ncells: usize, domain: [f64; 2]) -> Result<()> {
    if ncells == 0 {
        return Err(Error::configuration("ncells", "at least one cell is required"));
    }
    if !(domain[0] < domain[1]) {
        return Err(Error::configuration(
            "domain",
            format!("[{}, {}] is not a valid interval", domain[0], domain[1]),
        ));
    }
    Ok(())
}

fn breakpoints_and_spans(knots: &[f64], degree: usize) -> (Vec<f64>, Vec<usize>) {
    let nbasis = knots.len() - degree - 1;
    let mut breaks = vec![knots[degree]];
    let mut spans = Vec::new();

    for span in degree..nbasis {
        if knots[span + 1] > knots[span] {
            spans.push(span);
            breaks.push(knots[span + 1]);
        }
    }

    (breaks, spans)
}

// Zero knot differences stem from repeated knots and contribute nothing.
fn safe_inverse(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        1.0 / value
    }
}

/// Values of the `degree + 1` non-vanishing basis functions at `x` in the knot span `span`.
pub fn basis_funs(knots: &[f64], degree: usize, x: f64, span: usize) -> Vec<f64> {
    let p = degree;
    let mut left = vec![0.0; p];
    let mut right = vec![0.0; p];
    let mut values = vec![0.0; p + 1];

    values[0] = 1.0;
    for j in 0..p {
        left[j] = x - knots[span - j];
        right[j] = knots[span + 1 + j] - x;
        let mut saved = 0.0;
        for r in 0..=j {
            let temp = values[r] * safe_inverse(right[r] + left[j - r]);
            values[r] = saved + right[r] * temp;
            saved = left[j - r] * temp;
        }
        values[j + 1] = saved;
    }

    values
}

/// Values and derivatives up to order `n` of the non-vanishing basis functions at `x`.
///
/// Returns a `(n + 1) x (degree + 1)` matrix. Row `k` holds the `k`-th derivatives, rows with
/// `k > degree` are zero.
pub fn basis_funs_all_ders(
    knots: &[f64],
    degree: usize,
    x: f64,
    span: usize,
    n: usize,
) -> DMatrix<f64> {
    let p = degree;
    let ne = n.min(p);

    let mut left = vec![0.0; p];
    let mut right = vec![0.0; p];
    // Upper triangle: basis functions of increasing degree.
    // Lower triangle: inverse knot differences.
    let mut ndu = DMatrix::<f64>::zeros(p + 1, p + 1);
    let mut a = DMatrix::<f64>::zeros(2, p + 1);
    let mut ders = DMatrix::<f64>::zeros(n + 1, p + 1);

    ndu[(0, 0)] = 1.0;
    for j in 0..p {
        left[j] = x - knots[span - j];
        right[j] = knots[span + 1 + j] - x;
        let mut saved = 0.0;
        for r in 0..=j {
            ndu[(j + 1, r)] = safe_inverse(right[r] + left[j - r]);
            let temp = ndu[(r, j)] * ndu[(j + 1, r)];
            ndu[(r, j + 1)] = saved + right[r] * temp;
            saved = left[j - r] * temp;
        }
        ndu[(j + 1, j + 1)] = saved;
    }

    for r in 0..=p {
        ders[(0, r)] = ndu[(r, p)];
    }

    for r in 0..=p {
        let (mut s1, mut s2) = (0, 1);
        a[(0, 0)] = 1.0;

        for k in 1..=ne {
            let mut d = 0.0;
            let rk = r as isize - k as isize;
            let pk = p - k;

            if r >= k {
                a[(s2, 0)] = a[(s1, 0)] * ndu[(pk + 1, r - k)];
                d = a[(s2, 0)] * ndu[(r - k, pk)];
            }

            let j1 = if rk > -1 { 1 } else { (-rk) as usize };
            let j2 = if r <= pk + 1 { k - 1 } else { p - r };

            for j in j1..=j2 {
                let row = (rk + j as isize) as usize;
                a[(s2, j)] = (a[(s1, j)] - a[(s1, j - 1)]) * ndu[(pk + 1, row)];
                d += a[(s2, j)] * ndu[(row, pk)];
            }

            if r <= pk {
                a[(s2, k)] = -a[(s1, k - 1)] * ndu[(pk + 1, r)];
                d += a[(s2, k)] * ndu[(r, pk)];
            }

            ders[(k, r)] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    // Multiply by p! / (p - k)!
    let mut factor = p as f64;
    for k in 1..=ne {
        for r in 0..=p {
            ders[(k, r)] *= factor;
        }
        factor *= (p - k) as f64;
    }

    ders
}
