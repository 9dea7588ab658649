//! Decoding of packed ECAL channel ids into crystal indices.
//!
//! The masks below are the raw-data contract with the detector id encoding
//! and must stay bit-exact.

use ndarray::ArrayD;

/// Barrel side, `-1` or `+1`.
pub fn zside(id: u32) -> i32 {
    2 * ((id & 0x10000) >> 16) as i32 - 1
}

/// Signed barrel eta index in [-85, 85].
pub fn ieta(id: u32) -> i32 {
    ((id >> 9) & 0x7F) as i32 * zside(id)
}

/// Barrel phi index in [1, 360].
pub fn iphi(id: u32) -> i32 {
    (id & 0x1FF) as i32
}

/// Endcap side, `-1` or `+1`.
pub fn iz(id: u32) -> i32 {
    2 * ((id & 0x4000) >> 14) as i32 - 1
}

/// Endcap x index in [1, 100].
pub fn ix(id: u32) -> i32 {
    ((id >> 7) & 0x7F) as i32
}

/// Endcap y index in [1, 100].
pub fn iy(id: u32) -> i32 {
    (id & 0x7F) as i32
}

/// Applies one of the decoders above to every id of a batch.
pub fn decode(ids: &ArrayD<u32>, decoder: fn(u32) -> i32) -> ArrayD<i32> {
    ids.mapv(decoder)
}

/// Crystal coordinates of a batch of channels.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelIndex {
    Barrel {
        ieta: ArrayD<i32>,
        iphi: ArrayD<i32>,
        zside: ArrayD<i32>,
    },
    Endcap {
        ix: ArrayD<i32>,
        iy: ArrayD<i32>,
        iz: ArrayD<i32>,
    },
}

impl ChannelIndex {
    pub fn barrel(ids: &ArrayD<u32>) -> Self {
        ChannelIndex::Barrel {
            ieta: decode(ids, ieta),
            iphi: decode(ids, iphi),
            zside: decode(ids, zside),
        }
    }

    pub fn endcap(ids: &ArrayD<u32>) -> Self {
        ChannelIndex::Endcap {
            ix: decode(ids, ix),
            iy: decode(ids, iy),
            iz: decode(ids, iz),
        }
    }
}
