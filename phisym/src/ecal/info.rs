use std::fmt;
use std::fmt::{Display, Formatter};

use ndarray::ArrayD;

use crate::algorithm::reduction::{check_axis, check_shape, lane_spread, merge, reduce_axis, AxisPolicy, MergePolicy, Reducible};
use crate::algorithm::sweep::{broadcast_inner, sweep};
use crate::config::{NmisPolicy, SweepConfig};
use crate::error::{Error, Result};

/// Bounds that differ by more than this inside a reduced lane are reported.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Fields of an Info record, grouped by reduction rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoField {
    MinMisEb,
    MaxMisEb,
    MinMisEe,
    MaxMisEe,
    Nmis,
    HitsEb,
    HitsEe,
    Nevents,
    Nlumis,
    Fill,
    RecLumi,
    DelivLumi,
}

impl InfoField {
    pub fn name(&self) -> &'static str {
        match self {
            InfoField::MinMisEb => "minmiseb",
            InfoField::MaxMisEb => "maxmiseb",
            InfoField::MinMisEe => "minmisee",
            InfoField::MaxMisEe => "maxmisee",
            InfoField::Nmis => "nmis",
            InfoField::HitsEb => "hitseb",
            InfoField::HitsEe => "hitsee",
            InfoField::Nevents => "nevents",
            InfoField::Nlumis => "nlumis",
            InfoField::Fill => "fill",
            InfoField::RecLumi => "reclumi",
            InfoField::DelivLumi => "delivlumi",
        }
    }

    /// Sweep parameters are constant over a run.
    fn is_sweep_parameter(&self) -> bool {
        matches!(
            self,
            InfoField::MinMisEb | InfoField::MaxMisEb | InfoField::MinMisEe | InfoField::MaxMisEe | InfoField::Nmis
        )
    }

    /// Rule used by `sum(axis)`.
    pub fn sum_policy(&self) -> AxisPolicy {
        match self {
            field if field.is_sweep_parameter() => AxisPolicy::Mean,
            InfoField::Fill => AxisPolicy::Min,
            _ => AxisPolicy::Sum,
        }
    }

    /// Rule used by `add(other)`.
    pub fn add_policy(&self) -> MergePolicy {
        match self {
            field if field.is_sweep_parameter() => MergePolicy::TakeOther,
            InfoField::Fill => MergePolicy::MinOfOther,
            _ => MergePolicy::Sum,
        }
    }
}

/// The columns of an Info batch.
///
/// Scalar fields share one shape `S`; the endcap bounds are stored per crystal
/// and have shape `S + [crystals]`.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoColumns {
    pub minmiseb: ArrayD<f64>,
    pub maxmiseb: ArrayD<f64>,
    pub minmisee: ArrayD<f64>,
    pub maxmisee: ArrayD<f64>,
    pub nmis: ArrayD<u32>,
    pub hitseb: ArrayD<u64>,
    pub hitsee: ArrayD<u64>,
    pub nevents: ArrayD<u64>,
    pub nlumis: ArrayD<u64>,
    pub fill: ArrayD<u32>,
    pub reclumi: ArrayD<f64>,
    pub delivlumi: ArrayD<f64>,
}

/// A batch of per-run / per-lumi-block summaries.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoBatch {
    columns: InfoColumns,
}

impl InfoBatch {
    /// Creates a new `InfoBatch`, checking the column shapes.
    pub fn new(columns: InfoColumns) -> Result<Self> {
        let shape = columns.minmiseb.shape().to_vec();

        check_shape(InfoField::MaxMisEb.name(), &shape, columns.maxmiseb.shape())?;
        check_shape(InfoField::Nmis.name(), &shape, columns.nmis.shape())?;
        check_shape(InfoField::HitsEb.name(), &shape, columns.hitseb.shape())?;
        check_shape(InfoField::HitsEe.name(), &shape, columns.hitsee.shape())?;
        check_shape(InfoField::Nevents.name(), &shape, columns.nevents.shape())?;
        check_shape(InfoField::Nlumis.name(), &shape, columns.nlumis.shape())?;
        check_shape(InfoField::Fill.name(), &shape, columns.fill.shape())?;
        check_shape(InfoField::RecLumi.name(), &shape, columns.reclumi.shape())?;
        check_shape(InfoField::DelivLumi.name(), &shape, columns.delivlumi.shape())?;

        let ee_shape = columns.minmisee.shape();
        let mut expected = shape.clone();
        expected.push(ee_shape.last().copied().unwrap_or(0));
        check_shape(InfoField::MinMisEe.name(), &expected, ee_shape)?;
        check_shape(InfoField::MaxMisEe.name(), &expected, columns.maxmisee.shape())?;

        Ok(InfoBatch { columns })
    }

    pub fn columns(&self) -> &InfoColumns {
        &self.columns
    }

    /// Number of endcap crystals the endcap bounds are given for.
    pub fn ee_crystals(&self) -> usize {
        self.columns.minmisee.shape().last().copied().unwrap_or(0)
    }

    /// Number of sweep values, `round(mean(nmis)) + 1`, over the whole batch.
    ///
    /// Under the strict policy every record must carry the same `nmis`.
    pub fn sweep_steps(&self, policy: NmisPolicy) -> Result<usize> {
        let nmis = &self.columns.nmis;
        let lo = nmis.iter().copied().min();
        let hi = nmis.iter().copied().max();
        let (lo, hi) = match (lo, hi) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Err(Error::EmptyBatch("no nmis value to size the sweep".to_string())),
        };

        if lo != hi {
            match policy {
                NmisPolicy::Strict => return Err(Error::NonUniformSweep { min: lo, max: hi }),
                NmisPolicy::Mean => log::warn!("averaging non-uniform nmis ({}..={}) to size the sweep", lo, hi),
            }
        }

        let mean = statrs::statistics::Statistics::mean(nmis.iter().map(|&n| n as f64));
        Ok(mean.round() as usize + 1)
    }

    /// Mis-calibration values applied to every barrel channel.
    ///
    /// # Returns
    ///
    /// An array of shape `S + [eb_channels, steps]`: the per-run bounds are
    /// broadcast to every barrel crystal, then swept from `minmiseb` to
    /// `maxmiseb`, both shifted by `eb_offset`. The nominal entry sits in the
    /// middle of the innermost axis.
    pub fn miscalibs_eb(&self, config: &SweepConfig) -> Result<ArrayD<f64>> {
        let steps = self.sweep_steps(config.nmis_policy)?;
        let lo = broadcast_inner(&self.columns.minmiseb, config.eb_channels)?;
        let hi = broadcast_inner(&self.columns.maxmiseb, config.eb_channels)?;
        sweep(&lo, &hi, steps, config.eb_offset)
    }

    /// Mis-calibration values applied to every endcap crystal.
    ///
    /// Returns an array of shape `S + [crystals, steps]`, swept from
    /// `minmisee` to `maxmisee` shifted by `ee_offset`.
    pub fn miscalibs_ee(&self, config: &SweepConfig) -> Result<ArrayD<f64>> {
        let steps = self.sweep_steps(config.nmis_policy)?;
        sweep(&self.columns.minmisee, &self.columns.maxmisee, steps, config.ee_offset)
    }

    /// Collapses `axis` with an explicit policy for heterogeneous `nmis`.
    pub fn sum_with(&self, axis: usize, policy: NmisPolicy) -> Result<InfoBatch> {
        check_axis(self.shape(), axis)?;
        let c = &self.columns;
        let rule = |f: InfoField| f.sum_policy();

        for (field, bounds) in [
            (InfoField::MinMisEb, &c.minmiseb),
            (InfoField::MaxMisEb, &c.maxmiseb),
            (InfoField::MinMisEe, &c.minmisee),
            (InfoField::MaxMisEe, &c.maxmisee),
        ] {
            let spread = lane_spread(bounds, axis)?;
            if spread > BOUND_TOLERANCE {
                log::warn!("{} varies by {} along axis {}, averaging", field.name(), spread, axis);
            }
        }

        let lo = reduce_axis(&c.nmis, AxisPolicy::Min, axis)?;
        let hi = reduce_axis(&c.nmis, AxisPolicy::Max, axis)?;
        if let Some((&l, &h)) = lo.iter().zip(hi.iter()).find(|(l, h)| l != h) {
            match policy {
                NmisPolicy::Strict => return Err(Error::NonUniformSweep { min: l, max: h }),
                NmisPolicy::Mean => log::warn!("averaging non-uniform nmis ({}..={}) along axis {}", l, h, axis),
            }
        }

        let columns = InfoColumns {
            minmiseb: reduce_axis(&c.minmiseb, rule(InfoField::MinMisEb), axis)?,
            maxmiseb: reduce_axis(&c.maxmiseb, rule(InfoField::MaxMisEb), axis)?,
            minmisee: reduce_axis(&c.minmisee, rule(InfoField::MinMisEe), axis)?,
            maxmisee: reduce_axis(&c.maxmisee, rule(InfoField::MaxMisEe), axis)?,
            nmis: reduce_axis(&c.nmis, rule(InfoField::Nmis), axis)?,
            hitseb: reduce_axis(&c.hitseb, rule(InfoField::HitsEb), axis)?,
            hitsee: reduce_axis(&c.hitsee, rule(InfoField::HitsEe), axis)?,
            nevents: reduce_axis(&c.nevents, rule(InfoField::Nevents), axis)?,
            nlumis: reduce_axis(&c.nlumis, rule(InfoField::Nlumis), axis)?,
            fill: reduce_axis(&c.fill, rule(InfoField::Fill), axis)?,
            reclumi: reduce_axis(&c.reclumi, rule(InfoField::RecLumi), axis)?,
            delivlumi: reduce_axis(&c.delivlumi, rule(InfoField::DelivLumi), axis)?,
        };

        Ok(InfoBatch { columns })
    }
}

impl Reducible for InfoBatch {
    fn record_name(&self) -> &'static str {
        "Info"
    }

    fn shape(&self) -> &[usize] {
        self.columns.minmiseb.shape()
    }

    fn sum(&self, axis: usize) -> Result<InfoBatch> {
        self.sum_with(axis, NmisPolicy::Strict)
    }

    fn add(&self, other: &InfoBatch) -> Result<InfoBatch> {
        let (a, b) = (&self.columns, &other.columns);
        let rule = |f: InfoField| f.add_policy();
        let name = |f: InfoField| f.name();

        let columns = InfoColumns {
            minmiseb: merge(name(InfoField::MinMisEb), &a.minmiseb, &b.minmiseb, rule(InfoField::MinMisEb))?,
            maxmiseb: merge(name(InfoField::MaxMisEb), &a.maxmiseb, &b.maxmiseb, rule(InfoField::MaxMisEb))?,
            minmisee: merge(name(InfoField::MinMisEe), &a.minmisee, &b.minmisee, rule(InfoField::MinMisEe))?,
            maxmisee: merge(name(InfoField::MaxMisEe), &a.maxmisee, &b.maxmisee, rule(InfoField::MaxMisEe))?,
            nmis: merge(name(InfoField::Nmis), &a.nmis, &b.nmis, rule(InfoField::Nmis))?,
            hitseb: merge(name(InfoField::HitsEb), &a.hitseb, &b.hitseb, rule(InfoField::HitsEb))?,
            hitsee: merge(name(InfoField::HitsEe), &a.hitsee, &b.hitsee, rule(InfoField::HitsEe))?,
            nevents: merge(name(InfoField::Nevents), &a.nevents, &b.nevents, rule(InfoField::Nevents))?,
            nlumis: merge(name(InfoField::Nlumis), &a.nlumis, &b.nlumis, rule(InfoField::Nlumis))?,
            fill: merge(name(InfoField::Fill), &a.fill, &b.fill, rule(InfoField::Fill))?,
            reclumi: merge(name(InfoField::RecLumi), &a.reclumi, &b.reclumi, rule(InfoField::RecLumi))?,
            delivlumi: merge(name(InfoField::DelivLumi), &a.delivlumi, &b.delivlumi, rule(InfoField::DelivLumi))?,
        };

        Ok(InfoBatch { columns })
    }
}

impl Display for InfoBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "InfoBatch(shape: {:?}, ee crystals: {})", self.shape(), self.ee_crystals())
    }
}
