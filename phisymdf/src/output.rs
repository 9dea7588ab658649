use std::collections::BTreeMap;

use ndarray::ArrayD;
use serde::Serialize;

use phisym::config::SweepConfig;
use phisym::ecal::geometry::ChannelIndex;
use phisym::ecal::info::InfoBatch;
use phisym::ecal::rechit::{RecHitBatch, RecHitKind};
use phisym::algorithm::reduction::Reducible;

use crate::error::Result;

/// An n-dimensional array flattened in logical (row-major) order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table<T> {
    pub shape: Vec<usize>,
    pub values: Vec<T>,
}

impl<T: Clone> From<&ArrayD<T>> for Table<T> {
    fn from(array: &ArrayD<T>) -> Self {
        Table {
            shape: array.shape().to_vec(),
            values: array.iter().cloned().collect(),
        }
    }
}

/// Reduced per-channel accumulators of one RecHit collection.
#[derive(Clone, Debug, Serialize)]
pub struct ChannelSummary {
    pub record: RecHitKind,
    pub shape: Vec<usize>,
    pub trials: usize,
    pub geometry: BTreeMap<&'static str, Table<i32>>,
    pub id: Table<u32>,
    pub status: Table<i32>,
    pub nhits: Table<u64>,
    pub sumet: Table<f64>,
    pub sumet_err: Table<f64>,
    pub sumlc: Table<f64>,
    pub sumlc_err: Table<f64>,
    /// Absent when the collection carries no trials.
    pub sumet_v: Option<Table<f64>>,
}

impl ChannelSummary {
    pub fn from_batch(batch: &RecHitBatch) -> Result<Self> {
        let geometry = match batch.kind() {
            RecHitKind::Generic => BTreeMap::new(),
            _ => match batch.geometry()? {
                ChannelIndex::Barrel { ieta, iphi, zside } => BTreeMap::from([
                    ("ieta", Table::from(&ieta)),
                    ("iphi", Table::from(&iphi)),
                    ("zside", Table::from(&zside)),
                ]),
                ChannelIndex::Endcap { ix, iy, iz } => BTreeMap::from([
                    ("ix", Table::from(&ix)),
                    ("iy", Table::from(&iy)),
                    ("iz", Table::from(&iz)),
                ]),
            },
        };

        let sumet_v = match batch.trial_count() {
            0 => None,
            _ => Some(Table::from(&batch.sumet_v()?)),
        };

        Ok(ChannelSummary {
            record: batch.kind(),
            shape: batch.shape().to_vec(),
            trials: batch.trial_count(),
            geometry,
            id: batch.id().into(),
            status: batch.status().into(),
            nhits: batch.nhits().into(),
            sumet: batch.sumet().into(),
            sumet_err: (&batch.sumet_err()).into(),
            sumlc: batch.sumlc().into(),
            sumlc_err: (&batch.sumlc_err()).into(),
            sumet_v,
        })
    }
}

/// Reduced run summaries with the reconstructed miscalibration sweep.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub shape: Vec<usize>,
    pub nmis: Table<u32>,
    pub sweep_steps: usize,
    pub hitseb: Table<u64>,
    pub hitsee: Table<u64>,
    pub nevents: Table<u64>,
    pub nlumis: Table<u64>,
    pub fill: Table<u32>,
    pub reclumi: Table<f64>,
    pub delivlumi: Table<f64>,
    /// Sweep shared by every barrel crystal, shape `S + [1, steps]`.
    pub miscalibs_eb: Table<f64>,
    /// Per-crystal endcap sweep, shape `S + [crystals, steps]`.
    pub miscalibs_ee: Table<f64>,
}

impl RunSummary {
    pub fn from_batch(batch: &InfoBatch, config: &SweepConfig) -> Result<Self> {
        let c = batch.columns();
        // every barrel crystal sees the same sweep
        let single_channel = SweepConfig { eb_channels: 1, ..config.clone() };

        Ok(RunSummary {
            shape: batch.shape().to_vec(),
            nmis: (&c.nmis).into(),
            sweep_steps: batch.sweep_steps(config.nmis_policy)?,
            hitseb: (&c.hitseb).into(),
            hitsee: (&c.hitsee).into(),
            nevents: (&c.nevents).into(),
            nlumis: (&c.nlumis).into(),
            fill: (&c.fill).into(),
            reclumi: (&c.reclumi).into(),
            delivlumi: (&c.delivlumi).into(),
            miscalibs_eb: (&batch.miscalibs_eb(&single_channel)?).into(),
            miscalibs_ee: (&batch.miscalibs_ee(config)?).into(),
        })
    }
}

/// Everything a `reduce` pass produces, one entry per collection found.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReducedOutput {
    pub axis: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eb: Option<ChannelSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ee: Option<ChannelSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<RunSummary>,
}
