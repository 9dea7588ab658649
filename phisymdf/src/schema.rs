//! Maps flat producer branches onto PhiSym record batches.
//!
//! Branches are named `<Collection>_<field>`. Everything before the first `_`
//! names the collection, the remainder (lower-cased) names the field. Branches
//! without `_` are event-level single items and are kept untouched.

use std::collections::BTreeMap;

use itertools::Itertools;
use ndarray::ArrayD;
use regex::Regex;

use phisym::ecal::info::{InfoBatch, InfoColumns};
use phisym::ecal::rechit::{MiscalibTrials, RecHitBatch, RecHitColumns, RecHitKind};

use crate::dataset::{RawColumn, RawDataset};
use crate::error::{Error, Result};

pub const EB_COLLECTION: &str = "EcalPhiSymEB";
pub const EE_COLLECTION: &str = "EcalPhiSymEE";
pub const INFO_COLLECTION: &str = "EcalPhiSymInfo";

const TRIAL_PATTERN: &str = r"^sumet_([mp])(\d+)$";

/// Record name behind a collection prefix.
pub fn record_name(collection: &str) -> Result<&'static str> {
    match collection {
        EB_COLLECTION => Ok("RecHitEB"),
        EE_COLLECTION => Ok("RecHitEE"),
        INFO_COLLECTION => Ok("Info"),
        _ => Err(Error::UnknownCollection(collection.to_string())),
    }
}

/// The fields of one collection, keyed by lower-cased field name.
#[derive(Clone, Debug)]
pub struct Collection {
    pub name: String,
    pub record_name: &'static str,
    pub fields: BTreeMap<String, RawColumn>,
}

impl Collection {
    pub fn field(&self, field: &str) -> Result<&RawColumn> {
        self.fields.get(field).ok_or_else(|| Error::MissingField {
            collection: self.name.clone(),
            field: field.to_string(),
        })
    }

    /// Shape of the first field, as the outer shape of the batch it builds.
    pub fn shape(&self) -> Option<&[usize]> {
        self.fields.values().next().map(|c| c.shape.as_slice())
    }

    fn float(&self, field: &str) -> Result<ArrayD<f64>> {
        self.field(field)?.to_float(&self.qualified(field))
    }

    fn int<T: TryFrom<i64>>(&self, field: &str) -> Result<ArrayD<T>> {
        self.field(field)?.to_int(&self.qualified(field))
    }

    fn qualified(&self, field: &str) -> String {
        format!("{}_{}", self.name, field)
    }
}

/// Grouped view of a raw dataset.
#[derive(Clone, Debug, Default)]
pub struct EcalPhiSymSchema {
    pub collections: BTreeMap<String, Collection>,
    pub single_items: BTreeMap<String, RawColumn>,
}

impl EcalPhiSymSchema {
    /// Groups the branches of `raw` into collections.
    ///
    /// # Arguments
    ///
    /// * `raw` - flat branches as read from disk
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use phisymdf::dataset::{RawColumn, RawDataset};
    /// use phisymdf::schema::EcalPhiSymSchema;
    ///
    /// let mut columns = BTreeMap::new();
    /// columns.insert("EcalPhiSymEB_sumEt".to_string(), RawColumn::float(vec![1], vec![2.0]));
    /// columns.insert("run".to_string(), RawColumn::int(vec![1], vec![1]));
    ///
    /// let schema = EcalPhiSymSchema::build(RawDataset { columns }).unwrap();
    /// assert!(schema.collections["EcalPhiSymEB"].fields.contains_key("sumet"));
    /// assert!(schema.single_items.contains_key("run"));
    /// ```
    pub fn build(raw: RawDataset) -> Result<Self> {
        let (grouped, single): (Vec<_>, Vec<_>) = raw.columns.into_iter().partition(|(name, _)| name.contains('_'));

        let groups = grouped
            .into_iter()
            .filter_map(|(name, column)| {
                name.split_once('_')
                    .map(|(collection, field)| (collection.to_string(), (field.to_lowercase(), column)))
            })
            .into_group_map();

        let mut collections = BTreeMap::new();
        for (name, fields) in groups {
            let record_name = record_name(&name)?;
            let mut by_field = BTreeMap::new();
            for (field, column) in fields {
                if by_field.insert(field.clone(), column).is_some() {
                    log::warn!("{}: field `{}` appears twice after lower-casing, keeping the last", name, field);
                }
            }
            log::debug!("collection {} -> {} with {} fields", name, record_name, by_field.len());
            collections.insert(name.clone(), Collection { name, record_name, fields: by_field });
        }

        Ok(EcalPhiSymSchema {
            collections,
            single_items: single.into_iter().collect(),
        })
    }
}

/// Number of trials `n` carried by a RecHit collection.
///
/// Trial fields are `sumet_m1..sumet_mn` and `sumet_p1..sumet_pn`; both
/// families must hold every index from 1 to `n`.
pub fn discover_trials<'a, I>(fields: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let pattern = Regex::new(TRIAL_PATTERN).map_err(|e| malformed(e.to_string()))?;

    let mut minus = Vec::new();
    let mut plus = Vec::new();
    for field in fields {
        if let Some(caps) = pattern.captures(field) {
            let k: usize = caps[2].parse().map_err(|_| malformed(format!("bad trial index in `{}`", field)))?;
            match &caps[1] {
                "m" => minus.push(k),
                _ => plus.push(k),
            }
        }
    }
    minus.sort_unstable();
    plus.sort_unstable();

    if minus.len() != plus.len() {
        return Err(malformed(format!(
            "{} negative but {} positive trials",
            minus.len(),
            plus.len()
        )));
    }
    let expected: Vec<usize> = (1..=minus.len()).collect();
    if minus != expected || plus != expected {
        return Err(malformed(format!(
            "trial indices must run from 1 to {}, found m{:?} p{:?}",
            minus.len(),
            minus,
            plus
        )));
    }

    Ok(minus.len())
}

fn malformed(reason: String) -> Error {
    Error::Core(phisym::Error::MalformedRecord(reason))
}

/// Builds a RecHit batch from a `RecHitEB` or `RecHitEE` collection.
pub fn rechit_batch(collection: &Collection) -> Result<RecHitBatch> {
    let kind = RecHitKind::from_record_name(collection.record_name)
        .ok_or_else(|| malformed(format!("{} is not a RecHit collection", collection.name)))?;

    let n = discover_trials(collection.fields.keys().map(String::as_str))?;
    log::debug!("{}: {} trials per side", collection.name, n);

    let minus = (1..=n)
        .map(|k| collection.float(&format!("sumet_m{}", k)))
        .collect::<Result<Vec<_>>>()?;
    let plus = (1..=n)
        .map(|k| collection.float(&format!("sumet_p{}", k)))
        .collect::<Result<Vec<_>>>()?;

    let columns = RecHitColumns {
        id: collection.int("id")?,
        status: collection.int("status")?,
        nhits: collection.int("nhits")?,
        sumet: collection.float("sumet")?,
        sumet2: collection.float("sumet2")?,
        sumlc: collection.float("sumlc")?,
        sumlc2: collection.float("sumlc2")?,
    };

    Ok(RecHitBatch::new(kind, columns, MiscalibTrials::new(minus, plus)?)?)
}

/// Builds an Info batch from the `Info` collection.
pub fn info_batch(collection: &Collection) -> Result<InfoBatch> {
    if collection.record_name != "Info" {
        return Err(malformed(format!("{} is not an Info collection", collection.name)));
    }

    let columns = InfoColumns {
        minmiseb: collection.float("minmiseb")?,
        maxmiseb: collection.float("maxmiseb")?,
        minmisee: collection.float("minmisee")?,
        maxmisee: collection.float("maxmisee")?,
        nmis: collection.int("nmis")?,
        hitseb: collection.int("hitseb")?,
        hitsee: collection.int("hitsee")?,
        nevents: collection.int("nevents")?,
        nlumis: collection.int("nlumis")?,
        fill: collection.int("fill")?,
        reclumi: collection.float("reclumi")?,
        delivlumi: collection.float("delivlumi")?,
    };

    Ok(InfoBatch::new(columns)?)
}
