use std::collections::{BTreeMap, BTreeSet};

use polars::df;
use polars::prelude::AnyValue;

use astraea_model::{
    ConfidenceLevel, DatasetClass, DomainMappingSpec, MappingPattern, Origin, VariableMapping,
};
use astraea_standards::ReferenceStore;
use astraea_transform::{ExecutionContext, apply_compliance, execute_domain};

fn mapping(
    var: &str,
    pattern: MappingPattern,
    source: Option<&str>,
    rule: Option<&str>,
) -> VariableMapping {
    VariableMapping {
        sdtm_variable: var.to_string(),
        pattern,
        source_dataset: Some("dm".to_string()),
        source_variable: source.map(str::to_string),
        derivation_rule: rule.map(str::to_string),
        confidence_level: ConfidenceLevel::High,
        confidence_score: 0.95,
        confidence_rationale: String::new(),
        order: None,
        length: None,
        label: None,
        data_type: None,
        core: None,
        codelist_code: None,
        codelist_name: None,
        origin: Some(Origin::Crf),
        computational_method: None,
    }
}

fn dm_spec(store: &ReferenceStore) -> DomainMappingSpec {
    let reference = store.get_domain_spec("DM").unwrap();
    let mut spec = DomainMappingSpec {
        domain: "DM".to_string(),
        domain_class: DatasetClass::SpecialPurpose,
        structure: reference.structure.clone(),
        source_datasets: BTreeSet::from(["dm".to_string()]),
        variable_mappings: BTreeMap::new(),
        total_variables: reference.variables.len(),
        required_mapped: 0,
        missing_required_variables: Vec::new(),
        predict_prevent_issues: Vec::new(),
        sort_order: reference.key_variables.clone(),
        suppqual_candidates: Vec::new(),
    };

    let mut studyid = mapping("STUDYID", MappingPattern::Assign, None, Some("301"));
    studyid.origin = Some(Origin::Assigned);
    spec.insert(studyid);
    let mut domain = mapping("DOMAIN", MappingPattern::Assign, None, Some("DM"));
    domain.origin = Some(Origin::Assigned);
    spec.insert(domain);
    spec.insert(mapping(
        "USUBJID",
        MappingPattern::Derivation,
        None,
        Some("GENERATE_USUBJID"),
    ));
    spec.insert(mapping(
        "SUBJID",
        MappingPattern::Rename,
        Some("SSUBJID"),
        None,
    ));
    spec.insert(mapping(
        "SITEID",
        MappingPattern::Rename,
        Some("SSITENUM"),
        None,
    ));
    spec.insert(mapping(
        "BRTHDTC",
        MappingPattern::Derivation,
        None,
        Some("ISO8601_PARTIAL_DATE(BRTHYR_YYYY)"),
    ));
    spec.insert(mapping(
        "RACE",
        MappingPattern::Derivation,
        None,
        Some("RACE_CHECKBOX(RACEAME, RACEASI, RACEBLK, RACEWHI, RACEHAW)"),
    ));
    let mut sex = mapping("SEX", MappingPattern::LookupRecode, Some("SEX"), None);
    sex.codelist_code = Some("C66731".to_string());
    spec.insert(sex);
    spec.insert(mapping(
        "RFSTDTC",
        MappingPattern::Derivation,
        None,
        Some("MIN_DATE_PER_SUBJECT(ex.EXSTDAT)"),
    ));
    spec
}

fn raw_frames() -> BTreeMap<String, polars::prelude::DataFrame> {
    let dm = df! {
        "Subject" => ["01", "02", "03"],
        "SiteNumber" => ["04401", "04401", "04402"],
        "BRTHYR_YYYY" => [Some(1985i64), Some(1990), None],
        "RACEAME" => [0i64, 0, 0],
        "RACEASI" => [1i64, 0, 1],
        "RACEBLK" => [0i64, 0, 1],
        "RACEWHI" => [0i64, 1, 0],
        "RACEHAW" => [0i64, 0, 0],
        "SEX" => ["Male", "F", "M"],
    }
    .unwrap();
    let ex = df! {
        "Subject" => ["01", "01", "02"],
        "SiteNumber" => ["04401", "04401", "04401"],
        "EXSTDAT" => ["2022-04-02", "2022-03-30", "2022-05-01"],
    }
    .unwrap();

    BTreeMap::from([("dm".to_string(), dm), ("ex".to_string(), ex)])
}

fn string_at(df: &polars::prelude::DataFrame, column: &str, idx: usize) -> Option<String> {
    match df.column(column).unwrap().get(idx).unwrap() {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        other => Some(other.to_string()),
    }
}

#[test]
fn dm_happy_path() {
    let store = ReferenceStore::load().unwrap();
    let frames = raw_frames();
    let aliases = BTreeMap::new();
    let ctx = ExecutionContext {
        study_id: "301",
        usubjid_delimiter: "-",
        store: &store,
        frames: &frames,
        custom_aliases: &aliases,
    };

    let spec = dm_spec(&store);
    let frame = execute_domain(&spec, &ctx).unwrap();
    assert_eq!(frame.record_count(), 3);

    assert_eq!(
        string_at(&frame.data, "USUBJID", 0).as_deref(),
        Some("301-04401-01")
    );
    // Partial birth date: year only, never padded to January 1st.
    assert_eq!(string_at(&frame.data, "BRTHDTC", 0).as_deref(), Some("1985"));
    assert_eq!(string_at(&frame.data, "BRTHDTC", 2), None);

    // Race checkbox: single, single, multiple.
    assert_eq!(string_at(&frame.data, "RACE", 0).as_deref(), Some("ASIAN"));
    assert_eq!(string_at(&frame.data, "RACE", 1).as_deref(), Some("WHITE"));
    assert_eq!(string_at(&frame.data, "RACE", 2).as_deref(), Some("MULTIPLE"));

    // LOOKUP_RECODE resolves preferred terms to submission values.
    assert_eq!(string_at(&frame.data, "SEX", 0).as_deref(), Some("M"));

    // Cross-domain min date from EX.
    assert_eq!(
        string_at(&frame.data, "RFSTDTC", 0).as_deref(),
        Some("2022-03-30")
    );
    assert_eq!(
        string_at(&frame.data, "RFSTDTC", 1).as_deref(),
        Some("2022-05-01")
    );
    assert_eq!(string_at(&frame.data, "RFSTDTC", 2), None);
}

#[test]
fn compliance_orders_and_sorts_executed_dm() {
    let store = ReferenceStore::load().unwrap();
    let frames = raw_frames();
    let aliases = BTreeMap::new();
    let ctx = ExecutionContext {
        study_id: "301",
        usubjid_delimiter: "-",
        store: &store,
        frames: &frames,
        custom_aliases: &aliases,
    };

    let spec = dm_spec(&store);
    let mut frame = execute_domain(&spec, &ctx).unwrap();
    let reference = store.get_domain_spec("DM").unwrap();
    apply_compliance(&mut frame, reference).unwrap();

    let names: Vec<String> = frame
        .data
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    // Implementation-guide order: STUDYID, DOMAIN, USUBJID first.
    assert_eq!(&names[..3], &["STUDYID", "DOMAIN", "USUBJID"]);
    assert!(names.iter().all(|n| n.len() <= 8));
}

#[test]
fn missing_source_column_leaves_null_with_warning() {
    let store = ReferenceStore::load().unwrap();
    let frames = raw_frames();
    let aliases = BTreeMap::new();
    let ctx = ExecutionContext {
        study_id: "301",
        usubjid_delimiter: "-",
        store: &store,
        frames: &frames,
        custom_aliases: &aliases,
    };

    let mut spec = dm_spec(&store);
    spec.insert(mapping(
        "COUNTRY",
        MappingPattern::Direct,
        Some("COUNTRY_RAW"),
        None,
    ));
    let frame = execute_domain(&spec, &ctx).unwrap();

    assert_eq!(string_at(&frame.data, "COUNTRY", 0), None);
    assert!(frame.warnings.iter().any(|w| w.contains("COUNTRY")));
}

#[test]
fn unresolved_critical_variable_aborts() {
    let store = ReferenceStore::load().unwrap();
    let dm = df! {
        "NoSubjectHere" => ["x"],
    }
    .unwrap();
    let frames = BTreeMap::from([("dm".to_string(), dm)]);
    let aliases = BTreeMap::new();
    let ctx = ExecutionContext {
        study_id: "301",
        usubjid_delimiter: "-",
        store: &store,
        frames: &frames,
        custom_aliases: &aliases,
    };

    let mut spec = dm_spec(&store);
    spec.variable_mappings
        .retain(|k, _| matches!(k.as_str(), "STUDYID" | "DOMAIN" | "USUBJID"));
    assert!(execute_domain(&spec, &ctx).is_err());
}

#[test]
fn unknown_keyword_on_noncritical_variable_warns() {
    let store = ReferenceStore::load().unwrap();
    let frames = raw_frames();
    let aliases = BTreeMap::new();
    let ctx = ExecutionContext {
        study_id: "301",
        usubjid_delimiter: "-",
        store: &store,
        frames: &frames,
        custom_aliases: &aliases,
    };

    let mut spec = dm_spec(&store);
    spec.insert(mapping(
        "AGE",
        MappingPattern::Derivation,
        None,
        Some("COMPUTE_AGE(BRTHYR_YYYY)"),
    ));
    let frame = execute_domain(&spec, &ctx).unwrap();
    assert!(frame.warnings.iter().any(|w| w.contains("AGE")));
}
