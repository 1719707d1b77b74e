//! Likelihood-ratio test and model ranking
//!
//! The ofv of a nested model pair differs by a chi-square distributed
//! amount with as many degrees of freedom as the extended model has extra
//! parameters.

use crate::model::CandidateModel;

/// Ranking strategy used by the search
pub trait ModelSelection<M: CandidateModel>: Send + Sync + 'static {
    /// P-value of `child` against `parent`; NaN when the test is undefined
    fn p_value(&self, parent: &M, child: &M) -> f64;

    /// Index of the best child that beats `parent`, if any
    fn best_of_many(&self, parent: &M, children: &[M], alpha: f64) -> Option<usize>;

    /// Follow the best children from `root` down through `models`
    ///
    /// Children of a model are the entries whose parent is that model.
    fn best_of_subtree<'a>(&self, root: &'a M, models: &'a [M], alpha: f64) -> &'a M {
        let mut current = root;
        // At most one generation per model
        for _ in 0..=models.len() {
            let children: Vec<M> = models
                .iter()
                .filter(|m| m.parent_model() == Some(current.name()) && m.name() != current.name())
                .cloned()
                .collect();
            let Some(index) = self.best_of_many(current, &children, alpha) else {
                return current;
            };
            let name = children[index].name();
            match models.iter().find(|m| m.name() == name) {
                Some(next) => current = next,
                None => return current,
            }
        }
        current
    }
}

/// Chi-square likelihood-ratio test
#[derive(Debug, Clone, Copy, Default)]
pub struct Lrt;

impl<M: CandidateModel> ModelSelection<M> for Lrt {
    fn p_value(&self, parent: &M, child: &M) -> f64 {
        p_value(parent, child)
    }

    fn best_of_many(&self, parent: &M, children: &[M], alpha: f64) -> Option<usize> {
        best_of_many(parent, children, alpha)
    }
}

/// Extra parameters of `child` over `parent`
pub fn degrees_of_freedom<M: CandidateModel>(parent: &M, child: &M) -> i64 {
    child.parameter_count() as i64 - parent.parameter_count() as i64
}

/// Ofv drop from `parent` to `child`, NaN when either lacks a usable fit
pub fn ofv_drop<M: CandidateModel>(parent: &M, child: &M) -> f64 {
    match (parent.fit_results(), child.fit_results()) {
        (Some(p), Some(c)) if p.is_rankable() && c.is_rankable() => p.ofv - c.ofv,
        _ => f64::NAN,
    }
}

/// P-value of the likelihood-ratio test of `child` against `parent`
pub fn p_value<M: CandidateModel>(parent: &M, child: &M) -> f64 {
    let df = degrees_of_freedom(parent, child);
    let drop = ofv_drop(parent, child);
    if df <= 0 || drop.is_nan() {
        return f64::NAN;
    }
    chi2_sf(drop, df as f64)
}

/// Whether `child` is a significant improvement over `parent`
pub fn is_significant<M: CandidateModel>(parent: &M, child: &M, alpha: f64) -> bool {
    let p = p_value(parent, child);
    !p.is_nan() && p <= alpha && ofv_drop(parent, child) > 0.0
}

/// Index of the child with the largest significant ofv drop
///
/// The first child wins ties.
pub fn best_of_many<M: CandidateModel>(parent: &M, children: &[M], alpha: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, child) in children.iter().enumerate() {
        if !is_significant(parent, child, alpha) {
            continue;
        }
        let drop = ofv_drop(parent, child);
        if best.map_or(true, |(_, best_drop)| drop > best_drop) {
            best = Some((i, drop));
        }
    }
    best.map(|(i, _)| i)
}

/// Survival function of the chi-square distribution
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(df / 2.0, x / 2.0)
}

const EPS: f64 = 1e-15;
const FPMIN: f64 = 1e-300;
const MAX_ITER: usize = 500;

/// Regularized upper incomplete gamma function Q(a, x)
fn gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

// Modified Lentz evaluation of the continued fraction
fn gamma_q_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function (Lanczos, g = 7), for x >= 0.5
fn ln_gamma(x: f64) -> f64 {
    let x = x - 1.0;
    let t = x + 7.5;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_chi2_sf_known_values() {
        assert!(close(chi2_sf(3.841_458_820_694_124, 1.0), 0.05));
        assert!(close(chi2_sf(5.991_464_547_107_979, 2.0), 0.05));
        assert!(close(chi2_sf(6.634_896_601_021_214, 1.0), 0.01));
        assert!(close(chi2_sf(2.0, 2.0), (-1.0f64).exp()));
        assert!(close(chi2_sf(0.5, 3.0), 0.918_891_412_980_959_6));
        assert_eq!(chi2_sf(0.0, 1.0), 1.0);
        assert!(chi2_sf(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_ln_gamma() {
        assert!(close(ln_gamma(1.0), 0.0));
        assert!(close(ln_gamma(5.0), 24f64.ln()));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln()));
    }

    #[test]
    fn test_p_value() {
        let parent = MockModel::fitted("run1", 3, 100.0);
        let child = MockModel::fitted("run1-1", 4, 90.0).with_parent("run1");
        let p = p_value(&parent, &child);
        assert!(p < 0.01);
        assert_eq!(degrees_of_freedom(&parent, &child), 1);
        assert!(close(ofv_drop(&parent, &child), 10.0));

        // No extra parameters: the test is undefined
        let same = MockModel::fitted("run1-2", 3, 90.0);
        assert!(p_value(&parent, &same).is_nan());

        // Fit failed
        let failed = MockModel::unfitted("run1-3", 4);
        assert!(p_value(&parent, &failed).is_nan());
        assert!(!is_significant(&parent, &failed, 0.05));
    }

    #[test]
    fn test_best_of_many() {
        let parent = MockModel::fitted("run1", 3, 100.0);
        let children = vec![
            MockModel::fitted("run1-1", 4, 99.0),
            MockModel::fitted("run1-2", 4, 90.0),
            MockModel::unfitted("run1-3", 4),
            MockModel::fitted("run1-4", 4, 90.0),
        ];
        assert_eq!(best_of_many(&parent, &children, 0.05), Some(1));

        let weak = vec![MockModel::fitted("run1-1", 4, 99.5)];
        assert_eq!(best_of_many(&parent, &weak, 0.05), None);
        assert_eq!(best_of_many(&parent, &[], 0.05), None);
    }

    #[test]
    fn test_best_of_subtree() {
        let root = MockModel::fitted("run1", 3, 100.0);
        let models = vec![
            MockModel::fitted("run1-1", 4, 95.0).with_parent("run1"),
            MockModel::fitted("run1-2", 4, 90.0).with_parent("run1"),
            MockModel::fitted("run1-2-1", 5, 89.5).with_parent("run1-2"),
            MockModel::fitted("run1-2-2", 5, 80.0).with_parent("run1-2"),
            MockModel::fitted("run1-2-2-1", 6, 79.9).with_parent("run1-2-2"),
        ];
        let best = Lrt.best_of_subtree(&root, &models, 0.05);
        assert_eq!(best.name(), "run1-2-2");

        let best = Lrt.best_of_subtree(&root, &[], 0.05);
        assert_eq!(best.name(), "run1");
    }
}
