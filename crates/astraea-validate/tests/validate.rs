use std::collections::BTreeMap;

use polars::df;
use polars::prelude::DataFrame;

use astraea_model::{FixDisposition, WhitelistEntry};
use astraea_standards::ReferenceStore;
use astraea_validate::{ValidationInput, classify_finding, run_autofix, validate_study};

fn dm_frame() -> DataFrame {
    df! {
        "STUDYID" => ["301", "301"],
        "DOMAIN" => ["DM", "DM"],
        "USUBJID" => ["301-001-01", "301-001-02"],
        "SUBJID" => ["01", "02"],
        "SITEID" => ["001", "001"],
        "SEX" => ["M", "F"],
        "COUNTRY" => ["NLD", "NLD"],
        "RFSTDTC" => ["2022-03-30", "2022-05-01"],
    }
    .unwrap()
}

fn ts_frame() -> DataFrame {
    df! {
        "STUDYID" => ["301"],
        "DOMAIN" => ["TS"],
        "TSSEQ" => [1i64],
        "TSPARMCD" => ["SSTDTC"],
        "TSPARM" => ["Study Start Date"],
        "TSVAL" => ["2022-03-01"],
    }
    .unwrap()
}

#[test]
fn missing_ts_is_a_trc_rejection() {
    let store = ReferenceStore::load().unwrap();
    let frames = BTreeMap::from([("DM".to_string(), dm_frame())]);

    let report = validate_study(&ValidationInput {
        frames: &frames,
        store: &store,
        output_dir: None,
        whitelist: &[],
    });

    assert!(report
        .study_results
        .iter()
        .any(|r| r.rule_id == "FDA-TRC-1734"));
    assert!(!report.submission_ready);
}

#[test]
fn cross_domain_orphan_is_an_error_and_needs_human() {
    let store = ReferenceStore::load().unwrap();
    let ae = df! {
        "STUDYID" => ["301"],
        "DOMAIN" => ["AE"],
        "USUBJID" => ["TEST-001-001-999"],
        "AESEQ" => [1i64],
        "AETERM" => ["Headache"],
        "AEDECOD" => ["Headache"],
    }
    .unwrap();
    let frames = BTreeMap::from([
        ("DM".to_string(), dm_frame()),
        ("AE".to_string(), ae),
        ("TS".to_string(), ts_frame()),
    ]);

    let report = validate_study(&ValidationInput {
        frames: &frames,
        store: &store,
        output_dir: None,
        whitelist: &[],
    });

    let orphan = report
        .study_results
        .iter()
        .find(|r| r.rule_id == "ASTR-C001")
        .expect("orphan USUBJID must be flagged");
    assert!(orphan.message.contains("TEST-001-001-999"));
    assert_eq!(classify_finding(orphan), FixDisposition::NeedsHuman);
    assert!(!report.submission_ready);
}

#[test]
fn whitelist_suppresses_known_false_positives() {
    let store = ReferenceStore::load().unwrap();
    let mut dm = dm_frame();
    // Invalid SEX value on a non-extensible codelist: an effective error.
    dm.with_column(polars::prelude::Column::new(
        "SEX".into(),
        vec![Some("M".to_string()), Some("ALIEN".to_string())],
    ))
    .unwrap();
    let frames = BTreeMap::from([
        ("DM".to_string(), dm),
        ("TS".to_string(), ts_frame()),
    ]);

    let unsuppressed = validate_study(&ValidationInput {
        frames: &frames,
        store: &store,
        output_dir: None,
        whitelist: &[],
    });
    let baseline_errors = unsuppressed.effective_error_count;
    assert!(baseline_errors > 0);

    let whitelist = vec![WhitelistEntry {
        rule_id: "ASTR-T001".to_string(),
        domain: Some("*".to_string()),
        variable: Some("SEX".to_string()),
        reason: "P21 v2405.2 parity".to_string(),
    }];
    let suppressed = validate_study(&ValidationInput {
        frames: &frames,
        store: &store,
        output_dir: None,
        whitelist: &whitelist,
    });

    let flagged = suppressed
        .domains
        .get("DM")
        .unwrap()
        .results
        .iter()
        .find(|r| r.rule_id == "ASTR-T001")
        .unwrap();
    assert!(flagged.known_false_positive);
    assert_eq!(
        flagged.known_false_positive_reason.as_deref(),
        Some("P21 v2405.2 parity")
    );
    assert_eq!(suppressed.effective_error_count, baseline_errors - 1);
}

#[test]
fn autofix_repairs_domain_column_and_ct_case() {
    let store = ReferenceStore::load().unwrap();
    let mut dm = dm_frame();
    // Lowercase sex values and a wrong DOMAIN column.
    dm.with_column(polars::prelude::Column::new(
        "SEX".into(),
        vec![Some("m".to_string()), Some("f".to_string())],
    ))
    .unwrap();
    dm.with_column(polars::prelude::Column::new(
        "DOMAIN".into(),
        vec![Some("XX".to_string()), Some("XX".to_string())],
    ))
    .unwrap();

    let mut frames = BTreeMap::from([
        ("DM".to_string(), dm),
        ("TS".to_string(), ts_frame()),
    ]);

    let (report, audit) = run_autofix(&mut frames, &store, None, &[]);

    assert!(audit.converged);
    assert!(audit.actions.iter().any(|a| a.rule_id == "ASTR-T002"));
    assert!(audit.actions.iter().any(|a| a.rule_id == "ASTR-T001"));

    // After fixing, the DOMAIN and CT-case findings are gone.
    let dm_results = &report.domains.get("DM").unwrap().results;
    assert!(!dm_results.iter().any(|r| r.rule_id == "ASTR-T002"));
    assert!(!dm_results.iter().any(|r| r.rule_id == "ASTR-T001"));
}

#[test]
fn submission_ready_on_clean_study() {
    let store = ReferenceStore::load().unwrap();
    let frames = BTreeMap::from([
        ("DM".to_string(), dm_frame()),
        ("TS".to_string(), ts_frame()),
    ]);

    let report = validate_study(&ValidationInput {
        frames: &frames,
        store: &store,
        output_dir: None,
        whitelist: &[],
    });
    assert_eq!(report.effective_error_count, 0);
    assert!(report.submission_ready);
}
