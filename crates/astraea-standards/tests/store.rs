use astraea_standards::{
    ReferenceStore, SUPPORTED_CT_VERSION, SUPPORTED_IG_VERSION, run_doctor,
};

#[test]
fn loads_and_pins_versions() {
    let store = ReferenceStore::load().expect("load reference store");
    assert_eq!(store.manifest().ig_version, SUPPORTED_IG_VERSION);
    assert_eq!(store.manifest().ct_version, SUPPORTED_CT_VERSION);
    assert!(store.list_domains().contains(&"DM"));
    assert!(store.list_domains().contains(&"SUPPQUAL"));
}

#[test]
fn domain_spec_lookup() {
    let store = ReferenceStore::load().unwrap();
    let dm = store.get_domain_spec("dm").unwrap();
    assert_eq!(dm.domain, "DM");
    assert_eq!(dm.key_variables, vec!["STUDYID", "USUBJID"]);

    let required = store.get_required_variables("DM").unwrap();
    assert!(required.contains(&"USUBJID"));
    assert!(required.contains(&"SEX"));
    assert!(!required.contains(&"AGE"));

    assert!(store.get_domain_spec("ZZ").is_err());
}

#[test]
fn variable_spec_lookup() {
    let store = ReferenceStore::load().unwrap();
    let sex = store.get_variable_spec("DM", "SEX").unwrap();
    assert_eq!(sex.codelist_code.as_deref(), Some("C66731"));
    assert!(store.get_variable_spec("DM", "AEDECOD").is_none());
}

#[test]
fn non_extensible_codelist_requires_exact_term() {
    let store = ReferenceStore::load().unwrap();
    assert!(store.validate_term("C66731", "M"));
    assert!(store.validate_term("C66731", "F"));
    assert!(!store.validate_term("C66731", "X"));
    assert!(!store.is_extensible("C66731"));
}

#[test]
fn extensible_codelist_accepts_any_value() {
    let store = ReferenceStore::load().unwrap();
    assert!(store.validate_term("C66742", "Y"));
    assert!(store.validate_term("C66742", "ANY"));
    assert!(store.is_extensible("C66742"));
}

#[test]
fn unknown_codelist_accepts_nothing() {
    let store = ReferenceStore::load().unwrap();
    assert!(!store.validate_term("C99999", "Y"));
    assert!(!store.is_extensible("C99999"));
}

#[test]
fn doctor_verifies_every_asset() {
    let report = run_doctor().unwrap();
    assert_eq!(report.ig_version, SUPPORTED_IG_VERSION);
    assert_eq!(report.ct_version, SUPPORTED_CT_VERSION);
    assert!(report.all_verified());
    assert_eq!(report.counts.assets, 2);
    assert!(report.counts.domains >= 10);
    assert!(report.counts.variables > 100);
    assert!(report.counts.codelists >= 15);
    assert!(report.counts.ct_terms > 50);
}

#[test]
fn reverse_index_resolves_governing_codelist() {
    let store = ReferenceStore::load().unwrap();
    let codelist = store.get_codelist_for_variable("SEX").unwrap();
    assert_eq!(codelist.code, "C66731");
    let units = store.get_codelist_for_variable("lbstresu").unwrap();
    assert_eq!(units.code, "C71620");
    assert!(store.get_codelist_for_variable("AETERM").is_none());
}
