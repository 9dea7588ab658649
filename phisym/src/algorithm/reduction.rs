//! Field-wise reduction policies shared by every record type.
//!
//! A record batch is a set of equally shaped `ArrayD` columns. Reducing along
//! an axis (`sum`) and merging two batches (`add`) are both driven by a
//! per-field policy table declared next to each record type.

use ndarray::{ArrayD, Axis, Zip};

use crate::error::{Error, Result};

/// Policy applied to a field when a batch is collapsed along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisPolicy {
    Sum,
    Mean,
    Min,
    Max,
}

impl AxisPolicy {
    /// The elementwise policy that combines two partial reductions into the
    /// reduction of their concatenation, if there is one.
    pub fn pairwise(&self) -> Option<MergePolicy> {
        match self {
            AxisPolicy::Sum => Some(MergePolicy::Sum),
            AxisPolicy::Min => Some(MergePolicy::Min),
            AxisPolicy::Max => Some(MergePolicy::Max),
            // needs the partition weights
            AxisPolicy::Mean => None,
        }
    }
}

/// Policy applied to a field when two batches of the same shape are merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    Sum,
    Min,
    Max,
    /// Right operand wins.
    TakeOther,
    /// Every entry becomes the smallest value of the right operand.
    MinOfOther,
}

/// Scalar types a column can hold.
pub trait Accumulate: Copy + PartialOrd + Send + Sync {
    fn zero() -> Self;
    fn accumulate(self, other: Self) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Accumulate for f64 {
    fn zero() -> Self {
        0.0
    }
    fn accumulate(self, other: Self) -> Self {
        self + other
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

macro_rules! impl_accumulate_int {
    ($($t:ty),*) => {
        $(
            impl Accumulate for $t {
                fn zero() -> Self {
                    0
                }
                fn accumulate(self, other: Self) -> Self {
                    self + other
                }
                fn to_f64(self) -> f64 {
                    self as f64
                }
                fn from_f64(value: f64) -> Self {
                    value.round() as $t
                }
            }
        )*
    };
}

impl_accumulate_int!(i32, u32, u64);

fn smaller<T: Accumulate>(a: T, b: T) -> T {
    if b < a { b } else { a }
}

fn larger<T: Accumulate>(a: T, b: T) -> T {
    if b > a { b } else { a }
}

/// Checks that `axis` exists in `shape` and is not empty.
pub fn check_axis(shape: &[usize], axis: usize) -> Result<()> {
    match shape.get(axis) {
        None => Err(Error::InvalidAxis { axis, ndim: shape.len() }),
        Some(0) => Err(Error::EmptyAxis { axis }),
        Some(_) => Ok(()),
    }
}

/// Checks that a field has the shape of its batch.
pub fn check_shape(field: &str, expected: &[usize], found: &[usize]) -> Result<()> {
    if expected != found {
        return Err(Error::ShapeMismatch {
            field: field.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

/// Collapses `axis` of `values` with the given policy.
///
/// # Arguments
///
/// * `values` - column to reduce
/// * `policy` - how the entries of each lane are combined
/// * `axis` - the axis that disappears from the result
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use phisym::algorithm::reduction::{reduce_axis, AxisPolicy};
///
/// let fill = array![[103u32, 101u32]].into_dyn();
/// let reduced = reduce_axis(&fill, AxisPolicy::Min, 1).unwrap();
/// assert_eq!(reduced.into_raw_vec(), vec![101]);
/// ```
pub fn reduce_axis<T: Accumulate>(values: &ArrayD<T>, policy: AxisPolicy, axis: usize) -> Result<ArrayD<T>> {
    check_axis(values.shape(), axis)?;

    let reduced = match policy {
        AxisPolicy::Sum => values.map_axis(Axis(axis), |lane| {
            lane.iter().fold(T::zero(), |acc, &x| acc.accumulate(x))
        }),
        AxisPolicy::Mean => values.map_axis(Axis(axis), |lane| {
            T::from_f64(statrs::statistics::Statistics::mean(lane.iter().map(|x| x.to_f64())))
        }),
        AxisPolicy::Min => values.map_axis(Axis(axis), |lane| {
            lane.iter().skip(1).fold(lane[0], |acc, &x| smaller(acc, x))
        }),
        AxisPolicy::Max => values.map_axis(Axis(axis), |lane| {
            lane.iter().skip(1).fold(lane[0], |acc, &x| larger(acc, x))
        }),
    };

    Ok(reduced)
}

/// Merges two equally shaped columns with the given policy.
pub fn merge<T: Accumulate>(field: &str, left: &ArrayD<T>, right: &ArrayD<T>, policy: MergePolicy) -> Result<ArrayD<T>> {
    check_shape(field, left.shape(), right.shape())?;

    let merged = match policy {
        MergePolicy::Sum => Zip::from(left).and(right).map_collect(|&a, &b| a.accumulate(b)),
        MergePolicy::Min => Zip::from(left).and(right).map_collect(|&a, &b| smaller(a, b)),
        MergePolicy::Max => Zip::from(left).and(right).map_collect(|&a, &b| larger(a, b)),
        MergePolicy::TakeOther => right.clone(),
        MergePolicy::MinOfOther => match right.iter().copied().reduce(smaller) {
            Some(min) => ArrayD::from_elem(right.raw_dim(), min),
            None => right.clone(),
        },
    };

    Ok(merged)
}

/// Largest spread (max - min) over the lanes along `axis`.
pub fn lane_spread(values: &ArrayD<f64>, axis: usize) -> Result<f64> {
    check_axis(values.shape(), axis)?;
    let spread = values
        .map_axis(Axis(axis), |lane| {
            let hi = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lo = lane.iter().copied().fold(f64::INFINITY, f64::min);
            hi - lo
        })
        .iter()
        .copied()
        .fold(0.0, f64::max);
    Ok(spread)
}

/// Uniform reduction contract of every record batch.
pub trait Reducible: Sized {
    /// Record name tagging the batch (`RecHit`, `RecHitEB`, `RecHitEE`, `Info`).
    fn record_name(&self) -> &'static str;

    /// Outer shape shared by all scalar fields.
    fn shape(&self) -> &[usize];

    /// Collapses `axis` using the per-field axis policies.
    fn sum(&self, axis: usize) -> Result<Self>;

    /// Merges `other` into a copy of `self` using the per-field merge policies.
    fn add(&self, other: &Self) -> Result<Self>;

    /// Left fold of `add` over an ordered sequence of batches.
    ///
    /// Take-other fields make `add` order dependent, so the batches are merged
    /// strictly in iteration order. Returns `None` for an empty sequence.
    fn merge_all<I>(batches: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut iter = batches.into_iter();
        let first = match iter.next() {
            Some(first) => first,
            None => return Ok(None),
        };
        iter.try_fold(first, |acc, next| acc.add(&next)).map(Some)
    }
}
