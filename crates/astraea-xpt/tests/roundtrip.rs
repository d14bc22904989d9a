use astraea_xpt::{
    XptColumn, XptDataset, XptValue, XptWriterOptions, read_xpt, write_xpt,
};

fn demo_dataset() -> XptDataset {
    let mut ds = XptDataset::new("DM").with_label("Demographics");
    ds.columns = vec![
        XptColumn::character("USUBJID", 12).with_label("Unique Subject Identifier"),
        XptColumn::character("SEX", 1).with_label("Sex"),
        XptColumn::numeric("AGE").with_label("Age"),
    ];
    ds.rows = vec![
        vec![
            XptValue::Char("301-001-01".to_string()),
            XptValue::Char("M".to_string()),
            XptValue::Num(Some(42.0)),
        ],
        vec![
            XptValue::Char("301-001-02".to_string()),
            XptValue::Char("F".to_string()),
            XptValue::Num(None),
        ],
        vec![
            XptValue::Char("301-002-01".to_string()),
            XptValue::Char("F".to_string()),
            XptValue::Num(Some(35.5)),
        ],
    ];
    ds
}

#[test]
fn write_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dm.xpt");

    let dataset = demo_dataset();
    write_xpt(&path, &dataset, &XptWriterOptions::default()).unwrap();

    let loaded = read_xpt(&path).unwrap();
    assert_eq!(loaded.name, "DM");
    assert_eq!(loaded.label.as_deref(), Some("Demographics"));
    assert_eq!(loaded.rows.len(), 3);

    let names: Vec<&str> = loaded.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["USUBJID", "SEX", "AGE"]);
    assert_eq!(
        loaded.columns[0].label.as_deref(),
        Some("Unique Subject Identifier")
    );

    assert_eq!(loaded.rows[0][0], XptValue::Char("301-001-01".to_string()));
    assert_eq!(loaded.rows[1][2], XptValue::Num(None));
    match &loaded.rows[2][2] {
        XptValue::Num(Some(v)) => assert!((v - 35.5).abs() < 1e-12),
        other => panic!("expected numeric, got {other:?}"),
    }
}

#[test]
fn file_size_is_record_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dm.xpt");
    write_xpt(&path, &demo_dataset(), &XptWriterOptions::default()).unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 80, 0, "file must be a whole number of records");
}

#[test]
fn empty_dataset_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ts.xpt");

    let mut ds = XptDataset::new("TS").with_label("Trial Summary");
    ds.columns = vec![XptColumn::character("TSPARMCD", 8)];
    write_xpt(&path, &ds, &XptWriterOptions::default()).unwrap();

    let loaded = read_xpt(&path).unwrap();
    assert_eq!(loaded.name, "TS");
    assert!(loaded.rows.is_empty());
}
