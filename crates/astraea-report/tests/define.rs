use std::collections::{BTreeMap, BTreeSet};

use polars::df;

use astraea_model::{
    ConfidenceLevel, DatasetClass, DomainMappingSpec, MappingPattern, Origin, VariableMapping,
};
use astraea_report::{DefineEntry, DefineXmlOptions, write_define_xml};
use astraea_standards::ReferenceStore;

fn mapping(var: &str, pattern: MappingPattern) -> VariableMapping {
    VariableMapping {
        sdtm_variable: var.to_string(),
        pattern,
        source_dataset: Some("dm".to_string()),
        source_variable: Some(var.to_string()),
        derivation_rule: match pattern {
            MappingPattern::Derivation => Some("GENERATE_USUBJID".to_string()),
            MappingPattern::Assign => Some("301".to_string()),
            _ => None,
        },
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
        computational_method: match pattern {
            MappingPattern::Derivation => {
                Some("STUDYID-SITEID-SUBJID concatenation".to_string())
            }
            _ => None,
        },
    }
}

fn dm_mapping_spec() -> DomainMappingSpec {
    let mut spec = DomainMappingSpec {
        domain: "DM".to_string(),
        domain_class: DatasetClass::SpecialPurpose,
        structure: "One record per subject".to_string(),
        source_datasets: BTreeSet::from(["dm".to_string()]),
        variable_mappings: BTreeMap::new(),
        total_variables: 0,
        required_mapped: 0,
        missing_required_variables: Vec::new(),
        predict_prevent_issues: Vec::new(),
        sort_order: vec!["STUDYID".to_string(), "USUBJID".to_string()],
        suppqual_candidates: vec!["RACEOTH".to_string()],
    };
    spec.insert(mapping("STUDYID", MappingPattern::Assign));
    spec.insert(mapping("USUBJID", MappingPattern::Derivation));
    spec.insert(mapping("SEX", MappingPattern::LookupRecode));
    spec
}

#[test]
fn define_xml_has_resolvable_structure() {
    let store = ReferenceStore::load().unwrap();
    let dm_spec = store.get_domain_spec("DM").unwrap();
    let mapping_spec = dm_mapping_spec();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("define.xml");

    let entries = vec![DefineEntry {
        mapping_spec: &mapping_spec,
        domain_spec: dm_spec,
        frame: None,
    }];
    write_define_xml(&path, "301", &entries, &store, &DefineXmlOptions::default()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(text.contains("ItemGroupDef"));
    assert!(text.contains("OID=\"IG.DM\""));
    assert!(text.contains("IT.DM.USUBJID"));
    assert!(text.contains("MethodDef"));
    assert!(text.contains("MT.DM.USUBJID"));
    assert!(text.contains("GENERATE_USUBJID"));
    // SEX is controlled: the codelist and its reference must both exist.
    assert!(text.contains("CodeListRef"));
    assert!(text.contains("CL.C66731"));
    // SUPPQUAL candidates get comments.
    assert!(text.contains("def:CommentDef"));
    assert!(text.contains("RACEOTH"));
    assert!(text.contains("Purpose=\"Tabulation\""));
    assert!(text.contains("def:ArchiveLocationID=\"LF.dm\""));
}

#[test]
fn findings_domains_emit_value_level_metadata() {
    let store = ReferenceStore::load().unwrap();
    let lb_spec = store.get_domain_spec("LB").unwrap();

    let mut mapping_spec = dm_mapping_spec();
    mapping_spec.domain = "LB".to_string();
    mapping_spec.domain_class = DatasetClass::Findings;
    mapping_spec.suppqual_candidates = Vec::new();

    let frame = df! {
        "LBTESTCD" => ["GLUC", "HGB", "GLUC"],
    }
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("define.xml");
    let entries = vec![DefineEntry {
        mapping_spec: &mapping_spec,
        domain_spec: lb_spec,
        frame: Some(&frame),
    }];
    write_define_xml(&path, "301", &entries, &store, &DefineXmlOptions::default()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("def:ValueListDef"));
    assert!(text.contains("def:WhereClauseDef"));
    assert!(text.contains("WC.LB.GLUC"));
    assert!(text.contains("WC.LB.HGB"));
}
