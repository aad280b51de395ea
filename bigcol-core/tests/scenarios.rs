use std::sync::Arc;

use arrow::array::{Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, UInt8Array};
use arrow::datatypes::{Float64Type, Int32Type, Int64Type, UInt8Type};
use bigcol_core::{AttrValue, BigColError, DType, Dataset, File, ScalarKind};

fn setup() -> tempfile::TempDir {
    bigcol_logger::init_for_tests();
    tempfile::tempdir().expect("temp dir")
}

#[test]
fn int64_column_survives_close_and_reopen() {
    let tmp = setup();
    let mut file = File::create(tmp.path().join("data")).expect("create file");

    let mut column = file
        .create_column("x", DType::scalar(ScalarKind::I64), 10, 2)
        .expect("create column");
    column
        .write(0, &Int64Array::from_iter_values(0..10))
        .expect("write");
    column.flush().expect("flush");
    column.close().expect("close");

    let header: serde_json::Value = serde_json::from_slice(
        &std::fs::read(tmp.path().join("data/x/header.json")).expect("header"),
    )
    .expect("header json");
    assert_eq!(header["dtype"], "<i8");
    assert_eq!(header["size"], 10);
    assert_eq!(header["shard_bytes"], serde_json::json!([40, 40]));
    assert!(tmp.path().join("data/x/000000").exists());
    assert!(tmp.path().join("data/x/000001").exists());

    let file = File::open(tmp.path().join("data")).expect("reopen file");
    let column = file.open_column("x").expect("open column");
    let values = column.read(0..10).expect("read");
    assert_eq!(
        values.as_primitive::<Int64Type>().values(),
        &(0..10).collect::<Vec<i64>>()[..]
    );
}

#[test]
fn offset_writes_across_shard_boundaries() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    let mut column = file.create_column("x", DType::scalar(ScalarKind::I32), 20, 3)?;
    assert_eq!(column.shard_ranges(), vec![0..6, 6..13, 13..20]);

    column.write(0, &Int32Array::from_iter_values(0..20))?;
    column.write(4, &Int32Array::from(vec![-1, -2, -3, -4, -5, -6, -7, -8, -9, -10]))?;
    column.close()?;

    let column = file.open_column("x")?;
    let expected: Vec<i32> = (0..20)
        .map(|i| if (4..14).contains(&i) { -(i - 3) } else { i })
        .collect();
    assert_eq!(column.read(..)?.as_primitive::<Int32Type>().values(), &expected[..]);
    assert_eq!(
        column.read(5..15)?.as_primitive::<Int32Type>().values(),
        &expected[5..15]
    );
    Ok(())
}

#[test]
fn every_supported_dtype_round_trips() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;

    let arrays: Vec<(&str, Arc<dyn Array>)> = vec![
        ("u8", Arc::new(UInt8Array::from(vec![0, 127, 255]))),
        ("f32", Arc::new(Float32Array::from(vec![0.5, -1.25, f32::MAX]))),
        ("f64", Arc::new(Float64Array::from(vec![1e300, -0.0, 3.5]))),
        (
            "flags",
            Arc::new(arrow::array::BooleanArray::from(vec![true, false, true])),
        ),
    ];
    for (name, array) in &arrays {
        file.create_from_array(name, array.as_ref(), Some(2), None)?;
    }
    for (name, array) in &arrays {
        let column = file.open_column(name)?;
        assert_eq!(column.read_all()?.as_ref(), array.as_ref());
    }
    assert_eq!(
        file.open_column("u8")?.read(1..)?.as_primitive::<UInt8Type>().values(),
        &[127, 255]
    );
    Ok(())
}

#[test]
fn failed_create_leaves_existing_column_untouched() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    file.create_from_array("x", &Float64Array::from(vec![1.0, 2.0]), None, None)?;
    let before = std::fs::read(tmp.path().join("x/header.json"))?;

    let err = file
        .create_column("x", DType::scalar(ScalarKind::I8), 100, 4)
        .unwrap_err();
    assert!(matches!(err, BigColError::AlreadyExists { .. }));
    assert_eq!(std::fs::read(tmp.path().join("x/header.json"))?, before);
    assert!(!tmp.path().join("x/000001").exists());
    Ok(())
}

#[test]
fn attributes_persist_across_handles() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    let mut column = file.create_column("x", DType::scalar(ScalarKind::F64), 4, 1)?;
    column.attrs()?.set("units", "m/s");
    column.attrs()?.set("valid_range", vec![0.0, 10.0]);
    column.close()?;

    let mut column = file.open_column("x")?;
    assert!(!column.attrs_loaded());
    let attrs = column.attrs()?;
    assert_eq!(attrs.get("units"), Some(&AttrValue::Text("m/s".to_string())));
    assert_eq!(
        attrs.get("valid_range"),
        Some(&AttrValue::Float(vec![0.0, 10.0]))
    );
    assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["units", "valid_range"]);
    Ok(())
}

#[test]
fn dataset_slices_match_column_reads() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    file.create_from_array(
        "x",
        &Float64Array::from_iter_values((0..100).map(|i| i as f64 * 0.5)),
        Some(3),
        None,
    )?;
    file.create_from_array("label", &Int32Array::from_iter_values(100..200), Some(2), None)?;

    let dataset = Dataset::new(&file, Some(vec!["x".into(), "label".into()]))?;
    assert_eq!(dataset.len(), 100);

    let batch = dataset.slice(10..20)?;
    assert_eq!(batch.num_rows(), 10);
    let x = file.open_column("x")?.read(10..20)?;
    assert_eq!(batch.column_by_name("x").expect("x column").as_ref(), x.as_ref());

    let labels = batch
        .column_by_name("label")
        .expect("label column")
        .as_primitive::<Int32Type>()
        .values()
        .to_vec();
    assert_eq!(labels, (110..120).collect::<Vec<i32>>());
    Ok(())
}

#[test]
fn dataset_records_match_member_values() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    file.create_from_array("x", &Float64Array::from_iter_values((0..10).map(f64::from)), None, None)?;
    file.create_from_array("label", &Int32Array::from_iter_values(0..10), None, None)?;

    let dataset = Dataset::new(&file, None)?;
    for i in [0usize, 4, 9] {
        let record = dataset.get(i)?.into_batch().expect("record batch");
        assert_eq!(record.num_rows(), 1);
        let x = record.column_by_name("x").expect("x").as_primitive::<Float64Type>();
        assert_eq!(x.value(0), i as f64);
        let label = record
            .column_by_name("label")
            .expect("label")
            .as_primitive::<Int32Type>();
        assert_eq!(label.value(0), i as i32);
    }
    assert!(matches!(dataset.get(10usize), Err(BigColError::Range { .. })));
    Ok(())
}

#[test]
fn dataset_rejects_columns_of_different_lengths() -> anyhow::Result<()> {
    let tmp = setup();
    let mut file = File::create(tmp.path())?;
    file.create_from_array("a", &Int32Array::from(vec![1, 2, 3]), None, None)?;
    file.create_from_array("b", &Int32Array::from(vec![1, 2]), None, None)?;

    let err = Dataset::new(&file, None).unwrap_err();
    assert!(matches!(err, BigColError::LengthMismatch { .. }));
    Ok(())
}
