use approx::assert_abs_diff_eq;
use serde_json::{json, Value};

use phisym::algorithm::reduction::Reducible;
use phisym::config::{NmisPolicy, ReductionConfig, SweepConfig};
use phisym::ecal::rechit::RecHitKind;
use phisymdf::dataset::PhiSymDataset;
use phisymdf::pipeline::{reduce_channels, reduce_dataset};
use phisymdf::Error;

fn int(shape: &[usize], values: &[i64]) -> Value {
    json!({"shape": shape, "data": {"dtype": "int", "values": values}})
}

fn float(shape: &[usize], values: &[f64]) -> Value {
    json!({"shape": shape, "data": {"dtype": "float", "values": values}})
}

/// Two events of three barrel channels, one trial per side, plus two Info rows.
fn dataset_json(nmis: [i64; 2]) -> Value {
    let s = [2, 3];
    let ee = [2, 2];
    json!({
        "columns": {
            "EcalPhiSymEB_id": int(&s, &[66049, 66050, 1543, 66049, 66050, 1543]),
            "EcalPhiSymEB_status": int(&s, &[0, 0, 1, 0, 2, 0]),
            "EcalPhiSymEB_nHits": int(&s, &[1, 2, 0, 1, 0, 0]),
            "EcalPhiSymEB_sumEt": float(&s, &[1.0, 2.0, 0.0, 3.0, 0.0, 0.0]),
            "EcalPhiSymEB_sumEt2": float(&s, &[1.0, 4.0, 0.0, 9.0, 0.0, 0.0]),
            "EcalPhiSymEB_sumLC": float(&s, &[1.0, 2.0, 0.0, 3.0, 0.0, 0.0]),
            "EcalPhiSymEB_sumLC2": float(&s, &[1.0, 4.0, 0.0, 9.0, 0.0, 0.0]),
            "EcalPhiSymEB_sumEt_m1": float(&s, &[0.9, 1.8, 0.0, 2.7, 0.0, 0.0]),
            "EcalPhiSymEB_sumEt_p1": float(&s, &[1.1, 2.2, 0.0, 3.3, 0.0, 0.0]),
            "EcalPhiSymInfo_minMisEB": float(&[2], &[0.9, 0.9]),
            "EcalPhiSymInfo_maxMisEB": float(&[2], &[1.1, 1.1]),
            "EcalPhiSymInfo_minMisEE": float(&ee, &[0.95, 0.9, 0.95, 0.9]),
            "EcalPhiSymInfo_maxMisEE": float(&ee, &[1.05, 1.1, 1.05, 1.1]),
            "EcalPhiSymInfo_nMis": int(&[2], &nmis),
            "EcalPhiSymInfo_hitsEB": int(&[2], &[10, 20]),
            "EcalPhiSymInfo_hitsEE": int(&[2], &[1, 2]),
            "EcalPhiSymInfo_nEvents": int(&[2], &[100, 200]),
            "EcalPhiSymInfo_nLumis": int(&[2], &[1, 1]),
            "EcalPhiSymInfo_fill": int(&[2], &[7001, 7000]),
            "EcalPhiSymInfo_recLumi": float(&[2], &[0.5, 0.25]),
            "EcalPhiSymInfo_delivLumi": float(&[2], &[0.6, 0.3]),
            "run": int(&[2], &[357000, 357000]),
        }
    })
}

fn load(nmis: [i64; 2]) -> PhiSymDataset {
    let bytes = serde_json::to_vec(&dataset_json(nmis)).unwrap();
    PhiSymDataset::from_reader(bytes.as_slice()).unwrap()
}

#[test]
fn test_dataset_collections() {
    let dataset = load([2, 2]);
    let names: Vec<&str> = dataset.collections().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["EcalPhiSymEB", "EcalPhiSymInfo"]);
    assert!(dataset.schema.single_items.contains_key("run"));
    assert!(dataset.rechits_ee().unwrap().is_none());

    let eb = dataset.rechits_eb().unwrap().unwrap();
    assert_eq!(eb.kind(), RecHitKind::Barrel);
    assert_eq!(eb.shape(), &[2, 3]);
    assert_eq!(eb.trial_count(), 1);

    let info = dataset.info().unwrap().unwrap();
    assert_eq!(info.shape(), &[2]);
    assert_eq!(info.ee_crystals(), 2);
}

#[test]
fn test_reduce_barrel() {
    let dataset = load([2, 2]);
    let output = reduce_dataset(&dataset, 0, &ReductionConfig::default()).unwrap();
    let eb = output.eb.unwrap();

    assert_eq!(eb.shape, vec![3]);
    assert_eq!(eb.id.values, vec![66049, 66050, 1543]);
    assert_eq!(eb.status.values, vec![0, 2, 1]);
    assert_eq!(eb.nhits.values, vec![2, 2, 0]);
    assert_eq!(eb.sumet.values, vec![4.0, 2.0, 0.0]);

    assert_eq!(eb.geometry["ieta"].values, vec![1, 1, -3]);
    assert_eq!(eb.geometry["iphi"].values, vec![1, 2, 7]);
    assert_eq!(eb.geometry["zside"].values, vec![1, 1, -1]);

    for (err, expected) in eb.sumet_err.values.iter().zip([1.0, 1.0, 0.0]) {
        assert_abs_diff_eq!(*err, expected, epsilon = 1e-12);
    }

    let sumet_v = eb.sumet_v.unwrap();
    assert_eq!(sumet_v.shape, vec![3, 3]);
    let expected = [-0.1, 0.0, 0.1, -0.1, 0.0, 0.1, 0.0, 0.0, 0.0];
    for (value, expected) in sumet_v.values.iter().zip(expected) {
        assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_reduce_info() {
    let dataset = load([2, 2]);
    let output = reduce_dataset(&dataset, 0, &ReductionConfig::default()).unwrap();
    let info = output.info.unwrap();

    assert!(info.shape.is_empty());
    assert_eq!(info.sweep_steps, 3);
    assert_eq!(info.nmis.values, vec![2]);
    assert_eq!(info.hitseb.values, vec![30]);
    assert_eq!(info.nevents.values, vec![300]);
    assert_eq!(info.fill.values, vec![7000]);
    assert_abs_diff_eq!(info.reclumi.values[0], 0.75, epsilon = 1e-12);

    assert_eq!(info.miscalibs_eb.shape, vec![1, 3]);
    for (value, expected) in info.miscalibs_eb.values.iter().zip([-0.1, 0.0, 0.1]) {
        assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
    }

    assert_eq!(info.miscalibs_ee.shape, vec![2, 3]);
    for (value, expected) in info.miscalibs_ee.values.iter().zip([0.95, 1.0, 1.05, 0.9, 1.0, 1.1]) {
        assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_partitioned_reduction_matches_sequential() {
    let dataset = load([2, 2]);
    let eb = dataset.rechits_eb().unwrap().unwrap();

    let config = ReductionConfig { num_threads: 2, partitions: 2, ..ReductionConfig::default() };
    let parallel = reduce_channels(&eb, 0, &config).unwrap();
    let sequential = eb.sum(0).unwrap();

    assert_eq!(parallel.id(), sequential.id());
    assert_eq!(parallel.status(), sequential.status());
    assert_eq!(parallel.nhits(), sequential.nhits());
    for (a, b) in parallel.sumet().iter().zip(sequential.sumet().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
    for (a, b) in parallel.sumet_v().unwrap().iter().zip(sequential.sumet_v().unwrap().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_non_uniform_nmis() {
    let dataset = load([2, 4]);

    let strict = reduce_dataset(&dataset, 0, &ReductionConfig::default());
    assert!(matches!(
        strict,
        Err(Error::Core(phisym::Error::NonUniformSweep { min: 2, max: 4 }))
    ));

    let config = ReductionConfig { sweep: SweepConfig::lenient(), ..ReductionConfig::default() };
    assert_eq!(config.sweep.nmis_policy, NmisPolicy::Mean);
    let info = reduce_dataset(&dataset, 0, &config).unwrap().info.unwrap();
    assert_eq!(info.nmis.values, vec![3]);
    assert_eq!(info.sweep_steps, 4);
}

#[test]
fn test_invalid_axis() {
    let dataset = load([2, 2]);
    let result = reduce_dataset(&dataset, 2, &ReductionConfig::default());
    assert!(matches!(result, Err(Error::Core(phisym::Error::InvalidAxis { axis: 2, ndim: 2 }))));
}

#[test]
fn test_open_from_file() {
    let path = std::env::temp_dir().join(format!("phisymdf-open-{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string(&dataset_json([2, 2])).unwrap()).unwrap();

    let dataset = PhiSymDataset::open(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(dataset.collections().count(), 2);
    assert!(matches!(
        PhiSymDataset::open(&path),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_output_json_layout() {
    let dataset = load([2, 2]);
    let output = reduce_dataset(&dataset, 0, &ReductionConfig::default()).unwrap();
    let value = serde_json::to_value(&output).unwrap();

    assert_eq!(value["axis"], json!(0));
    assert_eq!(value["eb"]["record"], json!("Barrel"));
    assert_eq!(value["eb"]["nhits"]["values"], json!([2, 2, 0]));
    assert!(value.get("ee").is_none());
    assert_eq!(value["info"]["sweep_steps"], json!(3));
}
