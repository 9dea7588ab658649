use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use phisym::ecal::info::InfoBatch;
use phisym::ecal::rechit::RecHitBatch;

use crate::schema::{self, Collection, EcalPhiSymSchema, EB_COLLECTION, EE_COLLECTION, INFO_COLLECTION};
use crate::error::{Error, Result};

/// Flat values of a column, tagged with their numeric kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int(values) => values.len(),
            ColumnValues::Float(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One raw branch: row-major values and the shape they fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub shape: Vec<usize>,
    pub data: ColumnValues,
}

impl RawColumn {
    pub fn float(shape: Vec<usize>, values: Vec<f64>) -> Self {
        RawColumn { shape, data: ColumnValues::Float(values) }
    }

    pub fn int(shape: Vec<usize>, values: Vec<i64>) -> Self {
        RawColumn { shape, data: ColumnValues::Int(values) }
    }

    /// Converts to a float array, widening integer columns.
    pub fn to_float(&self, name: &str) -> Result<ArrayD<f64>> {
        let values = match &self.data {
            ColumnValues::Float(values) => values.clone(),
            ColumnValues::Int(values) => values.iter().map(|&v| v as f64).collect(),
        };
        self.shaped(name, values)
    }

    /// Converts to an integer array, rejecting values `T` cannot hold.
    pub fn to_int<T: TryFrom<i64>>(&self, name: &str) -> Result<ArrayD<T>> {
        let values = match &self.data {
            ColumnValues::Int(values) => values
                .iter()
                .map(|&v| {
                    T::try_from(v).map_err(|_| Error::Column {
                        name: name.to_string(),
                        reason: format!("value {} out of range", v),
                    })
                })
                .collect::<Result<Vec<T>>>()?,
            ColumnValues::Float(_) => {
                return Err(Error::Column {
                    name: name.to_string(),
                    reason: "expected an integer column".to_string(),
                })
            }
        };
        self.shaped(name, values)
    }

    fn shaped<T>(&self, name: &str, values: Vec<T>) -> Result<ArrayD<T>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), values).map_err(|e| Error::Column {
            name: name.to_string(),
            reason: format!("{} values do not fill shape {:?}: {}", self.data.len(), self.shape, e),
        })
    }
}

/// A flat set of branches as written by the producer, keyed by branch name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub columns: BTreeMap<String, RawColumn>,
}

impl RawDataset {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// PhiSym dataset with its branches grouped into collections.
pub struct PhiSymDataset {
    pub schema: EcalPhiSymSchema,
}

impl PhiSymDataset {
    /// Reads a JSON columnar file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_raw(RawDataset::from_reader(reader)?)
    }

    pub fn from_raw(raw: RawDataset) -> Result<Self> {
        Ok(PhiSymDataset { schema: EcalPhiSymSchema::build(raw)? })
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.schema.collections.values()
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.schema.collections.get(name)
    }

    /// Barrel RecHits, if the dataset has them.
    pub fn rechits_eb(&self) -> Result<Option<RecHitBatch>> {
        self.collection(EB_COLLECTION).map(schema::rechit_batch).transpose()
    }

    /// Endcap RecHits, if the dataset has them.
    pub fn rechits_ee(&self) -> Result<Option<RecHitBatch>> {
        self.collection(EE_COLLECTION).map(schema::rechit_batch).transpose()
    }

    /// Run summaries, if the dataset has them.
    pub fn info(&self) -> Result<Option<InfoBatch>> {
        self.collection(INFO_COLLECTION).map(schema::info_batch).transpose()
    }
}
