use std::fmt;
use std::fmt::{Display, Formatter};

use itertools::izip;
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::algorithm::reduction::{check_axis, check_shape, merge, reduce_axis, AxisPolicy, MergePolicy, Reducible};
use crate::algorithm::uncertainty::moment_uncertainty;
use crate::ecal::geometry::{self, ChannelIndex};
use crate::error::{Error, Result};

/// Specialization of a RecHit batch.
///
/// # Description
///
/// Barrel and endcap channels share every reduction rule and only differ in
/// how their packed `id` is decoded. `Generic` carries no geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecHitKind {
    Generic,
    Barrel,
    Endcap,
}

impl RecHitKind {
    /// Returns the `RecHitKind` matching a record name, if any.
    pub fn from_record_name(name: &str) -> Option<RecHitKind> {
        match name {
            "RecHit" => Some(RecHitKind::Generic),
            "RecHitEB" => Some(RecHitKind::Barrel),
            "RecHitEE" => Some(RecHitKind::Endcap),
            _ => None,
        }
    }

    pub fn record_name(&self) -> &'static str {
        match self {
            RecHitKind::Generic => "RecHit",
            RecHitKind::Barrel => "RecHitEB",
            RecHitKind::Endcap => "RecHitEE",
        }
    }
}

impl Display for RecHitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record_name())
    }
}

/// Fields of a RecHit, grouped by reduction rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecHitField {
    Id,
    Status,
    Nhits,
    Sumet,
    Sumet2,
    Sumlc,
    Sumlc2,
    /// Any `sumet_m{k}` / `sumet_p{k}` column.
    Trial,
}

impl RecHitField {
    pub fn name(&self) -> &'static str {
        match self {
            RecHitField::Id => "id",
            RecHitField::Status => "status",
            RecHitField::Nhits => "nhits",
            RecHitField::Sumet => "sumet",
            RecHitField::Sumet2 => "sumet2",
            RecHitField::Sumlc => "sumlc",
            RecHitField::Sumlc2 => "sumlc2",
            RecHitField::Trial => "sumet_trial",
        }
    }

    /// Rule used by `sum(axis)`.
    pub fn sum_policy(&self) -> AxisPolicy {
        match self {
            RecHitField::Id => AxisPolicy::Min,
            RecHitField::Status => AxisPolicy::Max,
            _ => AxisPolicy::Sum,
        }
    }

    /// Rule used by `add(other)`: more hits accumulate, identity comes from the right.
    pub fn add_policy(&self) -> MergePolicy {
        match self {
            RecHitField::Id | RecHitField::Status => MergePolicy::TakeOther,
            _ => MergePolicy::Sum,
        }
    }

    /// Rule used to combine two partial `sum(axis)` results.
    pub fn combine_policy(&self) -> MergePolicy {
        match self {
            RecHitField::Id => MergePolicy::Min,
            RecHitField::Status => MergePolicy::Max,
            _ => MergePolicy::Sum,
        }
    }
}

/// The `sumet` values measured under a symmetric sweep of calibration offsets.
///
/// `minus[k - 1]` holds `sumet_m{k}` and `plus[k - 1]` holds `sumet_p{k}`.
#[derive(Clone, Debug, PartialEq)]
pub struct MiscalibTrials {
    minus: Vec<ArrayD<f64>>,
    plus: Vec<ArrayD<f64>>,
}

impl MiscalibTrials {
    /// Creates a new `MiscalibTrials`.
    ///
    /// # Arguments
    ///
    /// * `minus` - `sumet_m1, sumet_m2, ...` in increasing offset order
    /// * `plus` - `sumet_p1, sumet_p2, ...` in increasing offset order
    ///
    /// Fails with `MalformedRecord` when the two sides differ in length and with
    /// `ShapeMismatch` when the columns are not equally shaped.
    pub fn new(minus: Vec<ArrayD<f64>>, plus: Vec<ArrayD<f64>>) -> Result<Self> {
        if minus.len() != plus.len() {
            return Err(Error::MalformedRecord(format!(
                "asymmetric miscalibration sweep: {} sumet_m fields, {} sumet_p fields",
                minus.len(),
                plus.len()
            )));
        }
        if let Some(first) = minus.first() {
            for (k, column) in minus.iter().enumerate() {
                check_shape(&format!("sumet_m{}", k + 1), first.shape(), column.shape())?;
            }
            for (k, column) in plus.iter().enumerate() {
                check_shape(&format!("sumet_p{}", k + 1), first.shape(), column.shape())?;
            }
        }
        Ok(MiscalibTrials { minus, plus })
    }

    /// A record without a miscalibration sweep.
    pub fn empty() -> Self {
        MiscalibTrials { minus: Vec::new(), plus: Vec::new() }
    }

    /// Number of trials on each side of nominal.
    pub fn trial_count(&self) -> usize {
        self.minus.len()
    }

    /// `sumet_m{k}`, 1-based.
    pub fn minus(&self, k: usize) -> Option<&ArrayD<f64>> {
        k.checked_sub(1).and_then(|i| self.minus.get(i))
    }

    /// `sumet_p{k}`, 1-based.
    pub fn plus(&self, k: usize) -> Option<&ArrayD<f64>> {
        k.checked_sub(1).and_then(|i| self.plus.get(i))
    }

    /// Canonical field names, `sumet_m1..sumet_mN` then `sumet_p1..sumet_pN`.
    pub fn field_names(&self) -> Vec<String> {
        let n = self.trial_count();
        (1..=n)
            .map(|k| format!("sumet_m{}", k))
            .chain((1..=n).map(|k| format!("sumet_p{}", k)))
            .collect()
    }

    fn shape(&self) -> Option<&[usize]> {
        self.minus.first().map(|column| column.shape())
    }

    /// Columns ordered from the most negative trial to the most positive, nominal in the middle.
    fn ordered<'a>(&'a self, nominal: &'a ArrayD<f64>) -> Vec<&'a ArrayD<f64>> {
        self.minus
            .iter()
            .rev()
            .chain(std::iter::once(nominal))
            .chain(self.plus.iter())
            .collect()
    }

    fn try_map<F>(&self, f: F) -> Result<MiscalibTrials>
    where
        F: Fn(&ArrayD<f64>) -> Result<ArrayD<f64>>,
    {
        Ok(MiscalibTrials {
            minus: self.minus.iter().map(&f).collect::<Result<Vec<_>>>()?,
            plus: self.plus.iter().map(&f).collect::<Result<Vec<_>>>()?,
        })
    }

    fn try_zip<F>(&self, other: &MiscalibTrials, f: F) -> Result<MiscalibTrials>
    where
        F: Fn(&str, &ArrayD<f64>, &ArrayD<f64>) -> Result<ArrayD<f64>>,
    {
        if self.trial_count() != other.trial_count() {
            return Err(Error::MalformedRecord(format!(
                "cannot merge a sweep of {} trials with a sweep of {} trials",
                self.trial_count(),
                other.trial_count()
            )));
        }
        let minus = izip!(1.., &self.minus, &other.minus)
            .map(|(k, a, b)| f(&format!("sumet_m{}", k), a, b))
            .collect::<Result<Vec<_>>>()?;
        let plus = izip!(1.., &self.plus, &other.plus)
            .map(|(k, a, b)| f(&format!("sumet_p{}", k), a, b))
            .collect::<Result<Vec<_>>>()?;
        Ok(MiscalibTrials { minus, plus })
    }
}

/// The scalar columns of a RecHit batch, all sharing one shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RecHitColumns {
    pub id: ArrayD<u32>,
    pub status: ArrayD<i32>,
    pub nhits: ArrayD<u64>,
    pub sumet: ArrayD<f64>,
    pub sumet2: ArrayD<f64>,
    pub sumlc: ArrayD<f64>,
    pub sumlc2: ArrayD<f64>,
}

/// A batch of per-channel PhiSym accumulators.
///
/// Every column has the same outer shape, e.g. `(lumis, channels)`. Batches
/// are never modified: reductions and merges return new batches.
#[derive(Clone, Debug, PartialEq)]
pub struct RecHitBatch {
    kind: RecHitKind,
    id: ArrayD<u32>,
    status: ArrayD<i32>,
    nhits: ArrayD<u64>,
    sumet: ArrayD<f64>,
    sumet2: ArrayD<f64>,
    sumlc: ArrayD<f64>,
    sumlc2: ArrayD<f64>,
    trials: MiscalibTrials,
}

impl RecHitBatch {
    /// Creates a new `RecHitBatch`.
    ///
    /// # Arguments
    ///
    /// * `kind` - barrel, endcap or generic
    /// * `columns` - the scalar columns
    /// * `trials` - the miscalibration sweep, possibly empty
    ///
    /// Fails with `ShapeMismatch` unless every column has the shape of `id`.
    ///
    /// # Example
    ///
    /// ```
    /// use ndarray::{array, ArrayD};
    /// use phisym::ecal::rechit::{MiscalibTrials, RecHitBatch, RecHitColumns, RecHitKind};
    ///
    /// let f = |v: Vec<f64>| ArrayD::from_shape_vec(vec![v.len()], v).unwrap();
    /// let columns = RecHitColumns {
    ///     id: array![0x10000u32 | (5 << 9) | 12].into_dyn(),
    ///     status: array![0].into_dyn(),
    ///     nhits: array![2u64].into_dyn(),
    ///     sumet: f(vec![4.0]),
    ///     sumet2: f(vec![10.0]),
    ///     sumlc: f(vec![2.0]),
    ///     sumlc2: f(vec![2.0]),
    /// };
    /// let trials = MiscalibTrials::new(vec![f(vec![3.0])], vec![f(vec![5.0])]).unwrap();
    /// let batch = RecHitBatch::new(RecHitKind::Barrel, columns, trials).unwrap();
    /// assert_eq!(batch.ieta().unwrap()[[0]], 5);
    /// assert_eq!(batch.sumet_v().unwrap().shape(), &[1, 3]);
    /// ```
    pub fn new(kind: RecHitKind, columns: RecHitColumns, trials: MiscalibTrials) -> Result<Self> {
        let RecHitColumns { id, status, nhits, sumet, sumet2, sumlc, sumlc2 } = columns;
        let shape = id.shape().to_vec();

        check_shape(RecHitField::Status.name(), &shape, status.shape())?;
        check_shape(RecHitField::Nhits.name(), &shape, nhits.shape())?;
        check_shape(RecHitField::Sumet.name(), &shape, sumet.shape())?;
        check_shape(RecHitField::Sumet2.name(), &shape, sumet2.shape())?;
        check_shape(RecHitField::Sumlc.name(), &shape, sumlc.shape())?;
        check_shape(RecHitField::Sumlc2.name(), &shape, sumlc2.shape())?;
        if let Some(trial_shape) = trials.shape() {
            check_shape(RecHitField::Trial.name(), &shape, trial_shape)?;
        }

        Ok(RecHitBatch { kind, id, status, nhits, sumet, sumet2, sumlc, sumlc2, trials })
    }

    pub fn kind(&self) -> RecHitKind {
        self.kind
    }

    pub fn trial_count(&self) -> usize {
        self.trials.trial_count()
    }

    pub fn trials(&self) -> &MiscalibTrials {
        &self.trials
    }

    pub fn id(&self) -> &ArrayD<u32> {
        &self.id
    }

    pub fn status(&self) -> &ArrayD<i32> {
        &self.status
    }

    pub fn nhits(&self) -> &ArrayD<u64> {
        &self.nhits
    }

    pub fn sumet(&self) -> &ArrayD<f64> {
        &self.sumet
    }

    pub fn sumet2(&self) -> &ArrayD<f64> {
        &self.sumet2
    }

    pub fn sumlc(&self) -> &ArrayD<f64> {
        &self.sumlc
    }

    pub fn sumlc2(&self) -> &ArrayD<f64> {
        &self.sumlc2
    }

    fn require(&self, kind: RecHitKind, accessor: &'static str) -> Result<()> {
        if self.kind != kind {
            return Err(Error::Accessor { accessor, record: self.kind.record_name().to_string() });
        }
        Ok(())
    }

    /// Barrel eta side of every channel.
    pub fn zside(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Barrel, "zside")?;
        Ok(geometry::decode(&self.id, geometry::zside))
    }

    /// Signed barrel eta index of every channel.
    pub fn ieta(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Barrel, "ieta")?;
        Ok(geometry::decode(&self.id, geometry::ieta))
    }

    /// Barrel phi index of every channel.
    pub fn iphi(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Barrel, "iphi")?;
        Ok(geometry::decode(&self.id, geometry::iphi))
    }

    /// Endcap side of every channel.
    pub fn iz(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Endcap, "iz")?;
        Ok(geometry::decode(&self.id, geometry::iz))
    }

    pub fn ix(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Endcap, "ix")?;
        Ok(geometry::decode(&self.id, geometry::ix))
    }

    pub fn iy(&self) -> Result<ArrayD<i32>> {
        self.require(RecHitKind::Endcap, "iy")?;
        Ok(geometry::decode(&self.id, geometry::iy))
    }

    /// All crystal coordinates for the batch's specialization.
    pub fn geometry(&self) -> Result<ChannelIndex> {
        match self.kind {
            RecHitKind::Barrel => Ok(ChannelIndex::barrel(&self.id)),
            RecHitKind::Endcap => Ok(ChannelIndex::endcap(&self.id)),
            RecHitKind::Generic => Err(Error::Accessor { accessor: "geometry", record: self.kind.record_name().to_string() }),
        }
    }

    /// Response of `sumet` to the miscalibration sweep.
    ///
    /// Returns an array of shape `shape() + [2n + 1]` holding
    /// `[m_n, ..., m_1, nominal, p_1, ..., p_n] / sumet - 1`, so the nominal
    /// entry at index `n` is zero. Channels whose nominal `sumet` is zero get
    /// an all-zero response.
    pub fn sumet_v(&self) -> Result<ArrayD<f64>> {
        let n = self.trial_count();
        if n == 0 {
            return Err(Error::MalformedRecord(format!(
                "{} has no sumet_m/sumet_p fields to build sumet_v from",
                self.kind
            )));
        }

        let inner = self.sumet.ndim();
        let mut shape = self.shape().to_vec();
        shape.push(2 * n + 1);
        let mut response = ArrayD::<f64>::zeros(IxDyn(&shape));

        for (j, column) in self.trials.ordered(&self.sumet).into_iter().enumerate() {
            Zip::from(response.index_axis_mut(Axis(inner), j))
                .and(column)
                .and(&self.sumet)
                .for_each(|out, &value, &nominal| {
                    *out = if nominal != 0.0 { value / nominal - 1.0 } else { 0.0 };
                });
        }

        Ok(response)
    }

    /// Statistical uncertainty on `sumet`, zero where there are no hits.
    pub fn sumet_err(&self) -> ArrayD<f64> {
        moment_uncertainty(&self.sumet, &self.sumet2, &self.nhits)
    }

    /// Statistical uncertainty on `sumlc`, zero where there are no hits.
    pub fn sumlc_err(&self) -> ArrayD<f64> {
        moment_uncertainty(&self.sumlc, &self.sumlc2, &self.nhits)
    }

    /// Combines two partial reductions with the associative `sum(axis)` rules.
    ///
    /// Unlike `add`, the result does not depend on operand order.
    pub fn combine(&self, other: &RecHitBatch) -> Result<RecHitBatch> {
        self.zip_with(other, RecHitField::combine_policy)
    }

    fn zip_with(&self, other: &RecHitBatch, policy: fn(&RecHitField) -> MergePolicy) -> Result<RecHitBatch> {
        if self.kind != other.kind {
            return Err(Error::RecordMismatch {
                left: self.kind.record_name().to_string(),
                right: other.kind.record_name().to_string(),
            });
        }

        let rule = |f: RecHitField| policy(&f);

        Ok(RecHitBatch {
            kind: other.kind,
            id: merge(RecHitField::Id.name(), &self.id, &other.id, rule(RecHitField::Id))?,
            status: merge(RecHitField::Status.name(), &self.status, &other.status, rule(RecHitField::Status))?,
            nhits: merge(RecHitField::Nhits.name(), &self.nhits, &other.nhits, rule(RecHitField::Nhits))?,
            sumet: merge(RecHitField::Sumet.name(), &self.sumet, &other.sumet, rule(RecHitField::Sumet))?,
            sumet2: merge(RecHitField::Sumet2.name(), &self.sumet2, &other.sumet2, rule(RecHitField::Sumet2))?,
            sumlc: merge(RecHitField::Sumlc.name(), &self.sumlc, &other.sumlc, rule(RecHitField::Sumlc))?,
            sumlc2: merge(RecHitField::Sumlc2.name(), &self.sumlc2, &other.sumlc2, rule(RecHitField::Sumlc2))?,
            trials: self.trials.try_zip(&other.trials, |name, a, b| merge(name, a, b, rule(RecHitField::Trial)))?,
        })
    }

    /// Splits the batch into at most `parts` consecutive chunks along `axis`.
    pub fn partition(&self, axis: usize, parts: usize) -> Result<Vec<RecHitBatch>> {
        check_axis(self.shape(), axis)?;
        let size = self.shape()[axis].div_ceil(parts.max(1));
        let n_chunks = self.shape()[axis].div_ceil(size);

        fn chunks<T: Clone>(values: &ArrayD<T>, axis: usize, size: usize) -> Vec<ArrayD<T>> {
            values.axis_chunks_iter(Axis(axis), size).map(|chunk| chunk.to_owned()).collect()
        }

        let minus: Vec<Vec<ArrayD<f64>>> = self.trials.minus.iter().map(|t| chunks(t, axis, size)).collect();
        let plus: Vec<Vec<ArrayD<f64>>> = self.trials.plus.iter().map(|t| chunks(t, axis, size)).collect();
        let trials = (0..n_chunks).map(|p| MiscalibTrials {
            minus: minus.iter().map(|c| c[p].clone()).collect(),
            plus: plus.iter().map(|c| c[p].clone()).collect(),
        });

        let batches = izip!(
            chunks(&self.id, axis, size),
            chunks(&self.status, axis, size),
            chunks(&self.nhits, axis, size),
            chunks(&self.sumet, axis, size),
            chunks(&self.sumet2, axis, size),
            chunks(&self.sumlc, axis, size),
            chunks(&self.sumlc2, axis, size),
            trials
        )
        .map(|(id, status, nhits, sumet, sumet2, sumlc, sumlc2, trials)| RecHitBatch {
            kind: self.kind,
            id,
            status,
            nhits,
            sumet,
            sumet2,
            sumlc,
            sumlc2,
            trials,
        })
        .collect();

        Ok(batches)
    }

    /// Reduces partitions of a batch along `axis` in parallel and combines the partials.
    ///
    /// # Arguments
    ///
    /// * `parts` - consecutive chunks of one batch along `axis`, see [`RecHitBatch::partition`]
    /// * `axis` - the axis to reduce
    /// * `num_threads` - size of the worker pool
    ///
    /// # Returns
    ///
    /// The same batch as `sum(axis)` of the un-partitioned input.
    pub fn par_sum(parts: &[RecHitBatch], axis: usize, num_threads: usize) -> Result<RecHitBatch> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;

        pool.install(|| {
            parts
                .par_iter()
                .map(|part| part.sum(axis))
                .try_reduce_with(|left, right| left.combine(&right))
        })
        .unwrap_or_else(|| Err(Error::EmptyBatch("no partitions to reduce".to_string())))
    }
}

impl Reducible for RecHitBatch {
    fn record_name(&self) -> &'static str {
        self.kind.record_name()
    }

    fn shape(&self) -> &[usize] {
        self.id.shape()
    }

    fn sum(&self, axis: usize) -> Result<RecHitBatch> {
        check_axis(self.shape(), axis)?;
        let rule = |f: RecHitField| f.sum_policy();

        Ok(RecHitBatch {
            kind: self.kind,
            id: reduce_axis(&self.id, rule(RecHitField::Id), axis)?,
            status: reduce_axis(&self.status, rule(RecHitField::Status), axis)?,
            nhits: reduce_axis(&self.nhits, rule(RecHitField::Nhits), axis)?,
            sumet: reduce_axis(&self.sumet, rule(RecHitField::Sumet), axis)?,
            sumet2: reduce_axis(&self.sumet2, rule(RecHitField::Sumet2), axis)?,
            sumlc: reduce_axis(&self.sumlc, rule(RecHitField::Sumlc), axis)?,
            sumlc2: reduce_axis(&self.sumlc2, rule(RecHitField::Sumlc2), axis)?,
            trials: self.trials.try_map(|t| reduce_axis(t, rule(RecHitField::Trial), axis))?,
        })
    }

    fn add(&self, other: &RecHitBatch) -> Result<RecHitBatch> {
        self.zip_with(other, RecHitField::add_policy)
    }
}

impl Display for RecHitBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RecHitBatch({}, shape: {:?}, trials: {})", self.kind, self.shape(), self.trial_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn column(shape: &[usize], values: Vec<f64>) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    /// Two lumis of three barrel channels with a two-step sweep.
    fn barrel_batch() -> RecHitBatch {
        let shape = [2, 3];
        let ids: Vec<u32> = vec![
            0x10000 | (5 << 9) | 12,
            (7 << 9) | 100,
            0x10000 | (85 << 9) | 360,
        ];
        let columns = RecHitColumns {
            id: ArrayD::from_shape_vec(IxDyn(&shape), [ids.clone(), ids].concat()).unwrap(),
            status: ArrayD::from_shape_vec(IxDyn(&shape), vec![0, 1, 0, 2, 0, 0]).unwrap(),
            nhits: ArrayD::from_shape_vec(IxDyn(&shape), vec![2u64, 0, 1, 2, 0, 3]).unwrap(),
            sumet: column(&shape, vec![4.0, 0.0, 1.0, 6.0, 0.0, 3.0]),
            sumet2: column(&shape, vec![10.0, 0.0, 1.0, 20.0, 0.0, 3.0]),
            sumlc: column(&shape, vec![2.0, 0.0, 1.0, 2.0, 0.0, 3.0]),
            sumlc2: column(&shape, vec![2.0, 0.0, 1.0, 2.0, 0.0, 3.0]),
        };
        let trials = MiscalibTrials::new(
            vec![
                column(&shape, vec![3.6, 0.0, 0.9, 5.4, 0.0, 2.7]),
                column(&shape, vec![3.2, 0.0, 0.8, 4.8, 0.0, 2.4]),
            ],
            vec![
                column(&shape, vec![4.4, 0.0, 1.1, 6.6, 0.0, 3.3]),
                column(&shape, vec![4.8, 0.0, 1.2, 7.2, 0.0, 3.6]),
            ],
        )
        .unwrap();
        RecHitBatch::new(RecHitKind::Barrel, columns, trials).unwrap()
    }

    #[test]
    fn test_asymmetric_trials() {
        let result = MiscalibTrials::new(vec![array![1.0].into_dyn()], vec![]);
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_trial_names() {
        let batch = barrel_batch();
        assert_eq!(batch.trials().field_names(), vec!["sumet_m1", "sumet_m2", "sumet_p1", "sumet_p2"]);
        assert!(batch.trials().minus(0).is_none());
        assert!(batch.trials().plus(2).is_some());
    }

    #[test]
    fn test_column_shape_mismatch() {
        let mut columns = RecHitColumns {
            id: array![1u32, 2u32].into_dyn(),
            status: array![0, 0].into_dyn(),
            nhits: array![1u64, 1u64].into_dyn(),
            sumet: array![1.0, 1.0].into_dyn(),
            sumet2: array![1.0, 1.0].into_dyn(),
            sumlc: array![1.0, 1.0].into_dyn(),
            sumlc2: array![1.0, 1.0].into_dyn(),
        };
        columns.sumlc = array![1.0].into_dyn();
        let result = RecHitBatch::new(RecHitKind::Generic, columns, MiscalibTrials::empty());
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sumet_v_layout() {
        let batch = barrel_batch();
        let response = batch.sumet_v().unwrap();
        assert_eq!(response.shape(), &[2, 3, 5]);

        for lumi in 0..2 {
            for channel in 0..3 {
                assert_abs_diff_eq!(response[[lumi, channel, 2]], 0.0, epsilon = 1e-12);
            }
        }
        // most negative trial first
        assert_abs_diff_eq!(response[[0, 0, 0]], -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(response[[0, 0, 1]], -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(response[[1, 2, 4]], 0.2, epsilon = 1e-12);
        // no nominal energy: no response
        assert_eq!(response[[0, 1, 0]], 0.0);
    }

    #[test]
    fn test_sumet_v_without_trials() {
        let batch = RecHitBatch::new(
            RecHitKind::Endcap,
            RecHitColumns {
                id: array![1u32].into_dyn(),
                status: array![0].into_dyn(),
                nhits: array![1u64].into_dyn(),
                sumet: array![1.0].into_dyn(),
                sumet2: array![1.0].into_dyn(),
                sumlc: array![1.0].into_dyn(),
                sumlc2: array![1.0].into_dyn(),
            },
            MiscalibTrials::empty(),
        )
        .unwrap();
        assert!(matches!(batch.sumet_v(), Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_uncertainty_floor() {
        let batch = barrel_batch();
        let err = batch.sumet_err();
        assert_eq!(err[[0, 1]], 0.0);
        assert_eq!(err[[1, 1]], 0.0);
        assert_abs_diff_eq!(err[[0, 0]], 1.0, epsilon = 1e-12);
        assert!(batch.sumlc_err().iter().all(|e| e.is_finite()));
    }

    #[test]
    fn test_sum_policies() {
        let batch = barrel_batch();
        let total = batch.sum(0).unwrap();

        assert_eq!(total.shape(), &[3]);
        assert_eq!(total.record_name(), "RecHitEB");
        assert_eq!(total.nhits().clone().into_raw_vec(), vec![4, 0, 4]);
        assert_eq!(total.status().clone().into_raw_vec(), vec![2, 1, 0]);
        assert_eq!(total.id(), &batch.id().index_axis(Axis(0), 0).to_owned());
        assert_abs_diff_eq!(total.sumet()[[0]], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(total.trials().minus(2).unwrap()[[0]], 8.0, epsilon = 1e-12);
        assert_eq!(total.trial_count(), 2);
    }

    #[test]
    fn test_sum_of_single_row() {
        let batch = barrel_batch().partition(0, 2).unwrap().remove(0);
        assert_eq!(batch.shape(), &[1, 3]);
        assert_eq!(batch.sum(0).unwrap().shape(), &[3]);
    }

    #[test]
    fn test_add_takes_identity_from_other() {
        let batch = barrel_batch();
        let parts = batch.partition(0, 2).unwrap();
        let merged = parts[0].add(&parts[1]).unwrap();

        assert_eq!(merged.status(), parts[1].status());
        assert_eq!(merged.id(), parts[1].id());
        assert_eq!(merged.sumet(), &(parts[0].sumet() + parts[1].sumet()));
        assert_eq!(merged.nhits().clone().into_raw_vec(), vec![4, 0, 4]);
    }

    #[test]
    fn test_add_zero_hits() {
        let empty = || {
            RecHitBatch::new(
                RecHitKind::Barrel,
                RecHitColumns {
                    id: array![1u32].into_dyn(),
                    status: array![0].into_dyn(),
                    nhits: array![0u64].into_dyn(),
                    sumet: array![0.0].into_dyn(),
                    sumet2: array![0.0].into_dyn(),
                    sumlc: array![0.0].into_dyn(),
                    sumlc2: array![0.0].into_dyn(),
                },
                MiscalibTrials::empty(),
            )
            .unwrap()
        };
        let merged = empty().add(&empty()).unwrap();
        assert_eq!(merged.nhits()[[0]], 0);
        assert_eq!(merged.sumet_err()[[0]], 0.0);
        assert_eq!(merged.sumlc_err()[[0]], 0.0);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let batch = barrel_batch();
        let row = batch.partition(0, 2).unwrap().remove(0);
        assert!(matches!(batch.add(&row), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_add_kind_mismatch() {
        let batch = barrel_batch();
        let mut other = batch.clone();
        other.kind = RecHitKind::Endcap;
        assert!(matches!(batch.add(&other), Err(Error::RecordMismatch { .. })));
    }

    #[test]
    fn test_geometry_accessors() {
        let batch = barrel_batch();
        assert_eq!(batch.ieta().unwrap().into_raw_vec(), vec![5, -7, 85, 5, -7, 85]);
        assert_eq!(batch.iphi().unwrap()[[0, 2]], 360);
        assert_eq!(batch.zside().unwrap()[[0, 1]], -1);
        assert!(matches!(batch.ix(), Err(Error::Accessor { accessor: "ix", .. })));
        assert!(matches!(batch.geometry(), Ok(ChannelIndex::Barrel { .. })));
    }

    #[test]
    fn test_par_sum_matches_sum() {
        let batch = barrel_batch();
        let parts = batch.partition(0, 2).unwrap();
        assert_eq!(parts.len(), 2);
        let parallel = RecHitBatch::par_sum(&parts, 0, 2).unwrap();
        assert_eq!(parallel, batch.sum(0).unwrap());
    }

    #[test]
    fn test_par_sum_empty() {
        assert!(matches!(RecHitBatch::par_sum(&[], 0, 1), Err(Error::EmptyBatch(_))));
    }

    #[test]
    fn test_merge_all_order() {
        let batch = barrel_batch();
        let parts = batch.partition(0, 2).unwrap();
        let merged = RecHitBatch::merge_all(parts.clone()).unwrap().unwrap();
        assert_eq!(merged.status(), parts[1].status());
        assert!(RecHitBatch::merge_all(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_combine_matches_sum_policy() {
        for field in [
            RecHitField::Id,
            RecHitField::Status,
            RecHitField::Nhits,
            RecHitField::Sumet,
            RecHitField::Sumet2,
            RecHitField::Sumlc,
            RecHitField::Sumlc2,
            RecHitField::Trial,
        ] {
            assert_eq!(field.sum_policy().pairwise(), Some(field.combine_policy()));
        }
    }
}
