use phisym::algorithm::reduction::Reducible;
use phisym::config::ReductionConfig;
use phisym::ecal::rechit::RecHitBatch;

use crate::dataset::PhiSymDataset;
use crate::error::Result;
use crate::output::{ChannelSummary, ReducedOutput, RunSummary};

/// Collapses `axis` of a channel batch, partitioned over a worker pool when
/// `config.partitions > 1`.
pub fn reduce_channels(batch: &RecHitBatch, axis: usize, config: &ReductionConfig) -> Result<RecHitBatch> {
    if config.partitions <= 1 {
        return Ok(batch.sum(axis)?);
    }

    let parts = batch.partition(axis, config.partitions)?;
    log::debug!(
        "{}: reducing axis {} in {} partitions on {} threads",
        batch.kind(),
        axis,
        parts.len(),
        config.num_threads
    );
    Ok(RecHitBatch::par_sum(&parts, axis, config.num_threads)?)
}

/// Reduces every collection of `dataset` along `axis`.
///
/// # Arguments
///
/// * `dataset` - the grouped input
/// * `axis` - axis removed from every batch
/// * `config` - partitioning and sweep settings
///
/// # Returns
///
/// A `ReducedOutput` with one summary per collection present in the dataset.
pub fn reduce_dataset(dataset: &PhiSymDataset, axis: usize, config: &ReductionConfig) -> Result<ReducedOutput> {
    let eb = match dataset.rechits_eb()? {
        Some(batch) => Some(ChannelSummary::from_batch(&reduce_channels(&batch, axis, config)?)?),
        None => None,
    };
    let ee = match dataset.rechits_ee()? {
        Some(batch) => Some(ChannelSummary::from_batch(&reduce_channels(&batch, axis, config)?)?),
        None => None,
    };
    let info = match dataset.info()? {
        Some(batch) => {
            let reduced = batch.sum_with(axis, config.sweep.nmis_policy)?;
            Some(RunSummary::from_batch(&reduced, &config.sweep)?)
        }
        None => None,
    };

    Ok(ReducedOutput { axis, eb, ee, info })
}
