use itertools::izip;

/// Scale `values` so that they sum to one and return the original sum.
///
/// Values are left untouched if the sum is not strictly positive.
pub(crate) fn normalize_in_place(values: &mut [f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total > 0. {
        values.iter_mut().for_each(|v| *v /= total);
    }
    total
}

#[inline]
pub(crate) fn add_assign(acc: &mut [f64], x: &[f64]) {
    assert!(acc.len() == x.len());
    izip!(acc, x).for_each(|(a, x)| *a += x);
}

pub(crate) fn add_assign_opt(acc: &mut Option<Box<[f64]>>, x: &Option<Box<[f64]>>) {
    if let (Some(acc), Some(x)) = (acc.as_deref_mut(), x.as_deref()) {
        add_assign(acc, x);
    }
}
