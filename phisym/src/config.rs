use serde::{Deserialize, Serialize};

/// Number of crystals in the ECAL barrel.
pub const EB_CHANNELS: usize = 61200;

/// How heterogeneous `nmis` values are handled when records are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NmisPolicy {
    /// Every combined record must carry the same `nmis`.
    Strict,
    /// Average the values, rounding to the nearest step count.
    Mean,
}

impl Default for NmisPolicy {
    fn default() -> Self {
        NmisPolicy::Strict
    }
}

/// Parameters of the mis-calibration sweep reconstruction.
///
/// The barrel bounds are stored offset by one upstream while the endcap bounds
/// are not, so both offsets are kept configurable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Width the per-run barrel bounds are broadcast to.
    pub eb_channels: usize,
    /// Subtracted from every barrel sweep value.
    pub eb_offset: f64,
    /// Subtracted from every endcap sweep value.
    pub ee_offset: f64,
    pub nmis_policy: NmisPolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            eb_channels: EB_CHANNELS,
            eb_offset: 1.0,
            ee_offset: 0.0,
            nmis_policy: NmisPolicy::Strict,
        }
    }
}

impl SweepConfig {
    /// Same offsets as the default, but averages heterogeneous `nmis` instead of failing.
    pub fn lenient() -> Self {
        SweepConfig {
            nmis_policy: NmisPolicy::Mean,
            ..SweepConfig::default()
        }
    }
}

/// Settings for a full reduction pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Threads used for partitioned channel reductions.
    pub num_threads: usize,
    /// Number of partitions a channel batch is split into along the reduced axis.
    pub partitions: usize,
    pub sweep: SweepConfig,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        ReductionConfig {
            num_threads: 4,
            partitions: 1,
            sweep: SweepConfig::default(),
        }
    }
}
