//! Command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use astraea_agent::{
    HttpLanguageModel, LlmConfig, MappingAgent, ProposalContext, enrich_spec,
    predict_and_prevent,
};
use astraea_classify::{ClassifierAgent, build_domain_plans, merge_groups, score_dataset};
use astraea_ingest::{load_ecrf_cache, profile_dataset, profile_study, save_ecrf_cache};
use astraea_learn::{LearningStore, render_example, retrieve_examples};
use astraea_model::{DomainMappingSpec, LearningExample, ReviewStatus, ValidationReport};
use astraea_report::{
    CsdrgDomainRow, CsdrgInput, DefineEntry, DefineXmlOptions, check_package,
    pattern_breakdown, render_csdrg, write_define_xml, write_validation_report,
};
use astraea_review::SessionStore;
use astraea_standards::ReferenceStore;
use astraea_validate::{ValidationInput, load_whitelist, run_autofix, validate_study};

use crate::config::StudyConfig;
use crate::pipeline::{
    build_trial_summary, execute_and_write_with, load_output_frames, load_raw_frames,
    profiles_for_domain,
};
use crate::summary::{classification_table, profile_table, validation_table};

/// Working-state directory inside the study folder.
const STATE_DIR: &str = ".astraea";

/// `standards verify`: manifest pins and asset checksums, human-readable.
pub fn standards_verify() -> Result<()> {
    let report = astraea_standards::run_doctor()?;
    println!(
        "SDTM-IG {} / CT {}: {} domain(s), {} variable(s), {} codelist(s), {} term(s)",
        report.ig_version,
        report.ct_version,
        report.counts.domains,
        report.counts.variables,
        report.counts.codelists,
        report.counts.ct_terms,
    );
    for asset in &report.assets {
        let status = if asset.verified { "ok" } else { "CHECKSUM MISMATCH" };
        println!("  {:<16} {:<12} {status}", asset.role, asset.path);
    }
    if !report.all_verified() {
        bail!("reference bundle verification failed");
    }
    Ok(())
}

/// `standards doctor`: the same checks as a JSON report.
pub fn standards_doctor(json: &str) -> Result<()> {
    let report = astraea_standards::run_doctor()?;
    let text = serde_json::to_string_pretty(&report)?;
    if json == "-" {
        println!("{text}");
    } else {
        std::fs::write(json, text).with_context(|| format!("write {json}"))?;
        println!("wrote {json}");
    }
    if !report.all_verified() {
        bail!("reference bundle verification failed");
    }
    Ok(())
}

/// `profile`: statistics for every dataset in the data directory.
pub fn profile(data_dir: &Path, out: Option<&Path>) -> Result<()> {
    let (profiles, summary) = profile_study(data_dir)?;

    println!("{}", profile_table(&profiles));
    for (name, reason) in &summary.skipped {
        println!("skipped {name}: {reason}");
    }

    let state_dir = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join(STATE_DIR));
    std::fs::create_dir_all(&state_dir)?;
    std::fs::write(
        state_dir.join("profiles.json"),
        serde_json::to_string_pretty(&profiles)?,
    )?;
    std::fs::write(
        state_dir.join("profile_summary.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;
    info!(profiled = profiles.len(), skipped = summary.skipped.len(), "profiling complete");
    Ok(())
}

/// `parse-ecrf`: validate and cache an extracted eCRF JSON.
pub fn parse_ecrf(input: &Path, out: Option<&Path>) -> Result<()> {
    let forms = load_ecrf_cache(input).context("parse extracted eCRF JSON")?;
    let target = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(STATE_DIR).join("ecrf.json"));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_ecrf_cache(&target, &forms)?;
    println!(
        "cached {} form(s), {} field(s) to {}",
        forms.len(),
        forms.iter().map(|f| f.fields.len()).sum::<usize>(),
        target.display()
    );
    Ok(())
}

/// `classify`: assign datasets to domains and write the plans.
pub fn classify(data_dir: &Path, ecrf: Option<&Path>, store: &ReferenceStore) -> Result<()> {
    let (profiles, _summary) = profile_study(data_dir)?;
    let ecrf_forms = match ecrf {
        Some(path) => load_ecrf_cache(path)?,
        None => Vec::new(),
    };

    let model = HttpLanguageModel::from_env(LlmConfig::default())?;
    let classifier = ClassifierAgent::new(&model);

    let specs: Vec<_> = store
        .list_domains()
        .iter()
        .filter_map(|d| store.get_domain_spec(d).ok())
        .collect();
    let domain_names: Vec<&str> = specs.iter().map(|s| s.domain.as_str()).collect();

    let dataset_names: Vec<String> = profiles.iter().map(|p| p.dataset_name.clone()).collect();
    let groups = merge_groups(&dataset_names);

    let mut classifications = Vec::new();
    for profile in &profiles {
        let scores = score_dataset(profile, &specs);
        let form = ecrf_forms.iter().find(|f| {
            f.form_name
                .to_lowercase()
                .contains(&profile.dataset_name.to_lowercase())
        });
        let classification = classifier.classify(profile, &scores, form, &domain_names)?;
        classifications.push(classification);
    }

    let plans = build_domain_plans(&classifications, &groups, store);

    println!("{}", classification_table(&classifications));
    let state_dir = data_dir.join(STATE_DIR);
    std::fs::create_dir_all(&state_dir)?;
    std::fs::write(
        state_dir.join("classification.json"),
        serde_json::to_string_pretty(&classifications)?,
    )?;
    std::fs::write(
        state_dir.join("domain_plans.json"),
        serde_json::to_string_pretty(&plans)?,
    )?;
    Ok(())
}

/// `map-domain`: propose, enrich, and pre-check a spec for one domain.
pub fn map_domain(
    domain: &str,
    data_dir: &Path,
    learning_db: Option<&Path>,
    out: Option<&Path>,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<()> {
    let (_, tables) = load_raw_frames(data_dir)?;
    let profiles: Vec<_> = tables.iter().map(profile_dataset).collect();
    let domain_profiles = profiles_for_domain(&profiles, domain);
    if domain_profiles.is_empty() {
        bail!("no raw dataset matches domain {domain}; classify first or check names");
    }

    let ecrf_path = data_dir.join(STATE_DIR).join("ecrf.json");
    let ecrf_forms = if ecrf_path.is_file() {
        load_ecrf_cache(&ecrf_path)?
    } else {
        Vec::new()
    };

    let model = HttpLanguageModel::from_env(LlmConfig::default())?;

    let examples: Vec<String> = match learning_db {
        Some(path) => {
            let learn_store = LearningStore::open(path)?;
            let query = format!(
                "map {} variables from {}",
                domain,
                domain_profiles
                    .iter()
                    .map(|p| p.dataset_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            retrieve_examples(&learn_store, &model, &query, 5)?
                .iter()
                .map(render_example)
                .collect()
        }
        None => Vec::new(),
    };

    let domain_spec = store.get_domain_spec(domain)?;
    let agent = MappingAgent::new(&model);
    let ctx = ProposalContext {
        study_id: &config.study_id,
        domain_spec,
        profiles: domain_profiles.clone(),
        ecrf_forms: &ecrf_forms,
        examples: &examples,
    };

    let mut spec = agent.propose(&ctx)?;
    enrich_spec(&mut spec, store, &domain_profiles)?;
    predict_and_prevent(&mut spec, store);

    for issue in &spec.predict_prevent_issues {
        println!("[{}] {} {}", issue.severity, issue.rule_id, issue.message);
    }

    let target = out.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from("output").join(format!("{}_spec.json", domain.to_lowercase()))
    });
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    astraea_report::write_mapping_json(&target, &spec)?;
    println!(
        "proposed {} mapping(s) for {domain}; spec written to {}",
        spec.variable_mappings.len(),
        target.display()
    );
    Ok(())
}

/// `review-domain`: interactive review with durable decisions.
pub fn review_domain(
    domain: &str,
    spec_path: &Path,
    session_id: Option<&str>,
    config: &StudyConfig,
) -> Result<()> {
    let spec = read_spec(spec_path)?;
    if !spec.domain.eq_ignore_ascii_case(domain) {
        bail!("spec at {} is for {}, not {domain}", spec_path.display(), spec.domain);
    }

    let mut store = SessionStore::open(&PathBuf::from(STATE_DIR).join("sessions.db"))?;
    let session_id = match session_id {
        Some(id) => id.to_string(),
        None => {
            let id = format!(
                "{}-{}",
                config.study_id.to_lowercase(),
                chrono::Utc::now().format("%Y%m%d%H%M%S")
            );
            store.create_session(&id, &config.study_id, &[domain.to_uppercase()])?;
            id
        }
    };

    let outcome = astraea_review::review_domain_interactive(&mut store, &session_id, &spec)?;
    astraea_report::write_mapping_json(spec_path, &outcome.approved_spec)?;

    ingest_decisions(&config.study_id, &spec.domain, &outcome.decisions)?;
    println!(
        "review of {domain} complete in session {session_id}; {} decision(s) captured",
        outcome.decisions.len()
    );
    Ok(())
}

/// `resume`: continue an interrupted session.
pub fn resume(session_id: &str, config: &StudyConfig) -> Result<()> {
    let mut store = SessionStore::open(&PathBuf::from(STATE_DIR).join("sessions.db"))?;
    let session = store.load_session(session_id)?;

    let Some(domain) = session.next_open_domain().map(str::to_string) else {
        println!("session {session_id} has no open domains");
        return Ok(());
    };
    let spec_path = PathBuf::from("output").join(format!("{}_spec.json", domain.to_lowercase()));
    if !spec_path.is_file() {
        bail!(
            "spec for open domain {domain} not found at {}",
            spec_path.display()
        );
    }

    let spec = read_spec(&spec_path)?;
    let outcome = astraea_review::review_domain_interactive(&mut store, session_id, &spec)?;
    store.set_domain_status(session_id, &domain, ReviewStatus::Completed)?;
    astraea_report::write_mapping_json(&spec_path, &outcome.approved_spec)?;
    ingest_decisions(&config.study_id, &domain, &outcome.decisions)?;
    println!("resumed session {session_id}: domain {domain} completed");
    Ok(())
}

/// `execute-domain`: run the approved spec and write the outputs.
///
/// Findings domains declare their wide-to-tall restructuring in a
/// `<domain>_transpose.json` next to the spec; when present, the
/// findings executor takes over.
pub fn execute(
    domain: &str,
    spec_path: &Path,
    data_dir: &Path,
    output_dir: &Path,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<()> {
    let spec = read_spec(spec_path)?;
    if !spec.domain.eq_ignore_ascii_case(domain) {
        bail!("spec at {} is for {}, not {domain}", spec_path.display(), spec.domain);
    }

    let transpose_path = spec_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}_transpose.json", domain.to_lowercase()));
    let transpose: Option<astraea_transform::TransposeSpec> = if transpose_path.is_file() {
        Some(serde_json::from_str(
            &std::fs::read_to_string(&transpose_path)?,
        )?)
    } else {
        None
    };

    let written = execute_and_write_with(
        &spec,
        transpose.as_ref(),
        data_dir,
        output_dir,
        config,
        store,
    )?;
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// `generate-trial-design`: build TS from the study config.
pub fn generate_trial_design(
    output_dir: &Path,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let ts = build_trial_summary(config)?;
    let ts_spec = store.get_domain_spec("TS")?;
    let mut frame = astraea_transform::DomainFrame::new("TS", ts);
    astraea_transform::apply_compliance(&mut frame, ts_spec)?;
    let path = astraea_report::write_domain_xpt(output_dir, ts_spec, &frame.data)?;
    println!("wrote {}", path.display());
    Ok(())
}

/// `validate` / `auto-fix`: run the rule engine, optionally repairing.
///
/// Returns the final report so the caller can set the exit status.
pub fn validate(
    output_dir: &Path,
    auto_fix: bool,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<ValidationReport> {
    let mut frames = load_output_frames(output_dir)?;
    let whitelist = match &config.whitelist {
        Some(path) => load_whitelist(Path::new(path))
            .with_context(|| format!("load whitelist {path}"))?,
        None => Vec::new(),
    };

    let report = if auto_fix {
        let (report, audit) = run_autofix(&mut frames, store, Some(output_dir), &whitelist);
        std::fs::write(
            output_dir.join("autofix_audit.json"),
            serde_json::to_string_pretty(&audit)?,
        )?;
        // Rewrite the repaired datasets so the files match the frames.
        for (domain, frame) in &frames {
            let spec_domain = if domain.starts_with("SUPP") && domain.len() > 4 {
                "SUPPQUAL".to_string()
            } else {
                domain.clone()
            };
            if let Ok(spec) = store.get_domain_spec(&spec_domain) {
                let mut named = spec.clone();
                named.domain = domain.clone();
                astraea_report::write_domain_xpt(output_dir, &named, frame)?;
            }
        }
        report
    } else {
        validate_study(&ValidationInput {
            frames: &frames,
            store,
            output_dir: Some(output_dir),
            whitelist: &whitelist,
        })
    };

    write_validation_report(output_dir, &report)?;
    let (_, package_findings) = check_package(output_dir)?;
    for finding in &package_findings {
        println!("[{}] {} {}", finding.severity, finding.rule_id, finding.message);
    }

    println!("{}", validation_table(&report));
    println!(
        "effective errors: {}; submission ready: {}",
        report.effective_error_count,
        if report.submission_ready { "yes" } else { "no" }
    );
    Ok(report)
}

/// `generate-define`: define.xml from executed domains and their specs.
pub fn generate_define(output_dir: &Path, config: &StudyConfig, store: &ReferenceStore) -> Result<()> {
    let frames = load_output_frames(output_dir)?;
    let specs = read_all_specs(output_dir)?;
    if specs.is_empty() {
        bail!("no *_spec.json files in {}; execute domains first", output_dir.display());
    }

    let mut entries = Vec::new();
    for spec in &specs {
        let domain_spec = store.get_domain_spec(&spec.domain)?;
        entries.push(DefineEntry {
            mapping_spec: spec,
            domain_spec,
            frame: frames.get(&spec.domain.to_uppercase()),
        });
    }

    let path = output_dir.join("define.xml");
    write_define_xml(
        &path,
        &config.study_id,
        &entries,
        store,
        &DefineXmlOptions::default(),
    )?;
    println!("wrote {}", path.display());
    Ok(())
}

/// `generate-csdrg`: the reviewer's guide from pipeline state.
pub fn generate_csdrg(output_dir: &Path, config: &StudyConfig, store: &ReferenceStore) -> Result<()> {
    let frames = load_output_frames(output_dir)?;
    let specs = read_all_specs(output_dir)?;

    let report_path = output_dir.join("validation_report.json");
    if !report_path.is_file() {
        bail!("validation_report.json not found; run validate first");
    }
    let report: ValidationReport =
        serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;

    let mut domains = Vec::new();
    let mut data_issues = Vec::new();
    for spec in &specs {
        let domain_spec = store.get_domain_spec(&spec.domain)?;
        let records = frames
            .get(&spec.domain.to_uppercase())
            .map(|f| f.height())
            .unwrap_or(0);
        domains.push(CsdrgDomainRow {
            domain: spec.domain.to_uppercase(),
            label: domain_spec.label.clone(),
            class: domain_spec.class.to_string(),
            records,
            pattern_breakdown: pattern_breakdown(spec),
            suppqual_candidates: spec.suppqual_candidates.clone(),
            missing_required: spec.missing_required_variables.clone(),
        });

        let issues_path =
            output_dir.join(format!("{}_issues.json", spec.domain.to_lowercase()));
        if issues_path.is_file() {
            let issues: Vec<String> =
                serde_json::from_str(&std::fs::read_to_string(&issues_path)?)?;
            data_issues.extend(issues);
        }
    }

    let text = render_csdrg(&CsdrgInput {
        study_id: &config.study_id,
        ig_version: astraea_standards::SUPPORTED_IG_VERSION,
        ct_version: astraea_standards::SUPPORTED_CT_VERSION,
        domains,
        data_issues,
        report: &report,
    })?;

    let path = output_dir.join("csdrg.md");
    std::fs::write(&path, text)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn read_spec(path: &Path) -> Result<DomainMappingSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read spec {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse spec {}", path.display()))
}

fn read_all_specs(output_dir: &Path) -> Result<Vec<DomainMappingSpec>> {
    let mut specs = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.ends_with("_spec.json") {
            specs.push(read_spec(&path)?);
        }
    }
    specs.sort_by(|a, b| a.domain.cmp(&b.domain));
    Ok(specs)
}

/// Feed review decisions into the learning store.
fn ingest_decisions(
    study_id: &str,
    domain: &str,
    decisions: &[astraea_model::ReviewDecision],
) -> Result<()> {
    let db_path = PathBuf::from(STATE_DIR).join("learning").join("examples.db");
    let mut learn_store = LearningStore::open(&db_path)?;
    let model = match HttpLanguageModel::from_env(LlmConfig::default()) {
        Ok(model) => model,
        Err(_) => {
            // Without a credential, decisions still complete; retrieval
            // simply has nothing new next run.
            info!("no API credential; skipping learning ingestion");
            return Ok(());
        }
    };

    for decision in decisions {
        let correction = &decision.correction;
        let mapping = correction
            .corrected_mapping
            .as_ref()
            .unwrap_or(&correction.original_mapping);
        let source = mapping.source_variable.clone().unwrap_or_default();
        let was_corrected = correction.correction_type.is_correction();

        let example = LearningExample {
            example_id: LearningExample::make_id(study_id, domain, &mapping.sdtm_variable),
            study_id: study_id.to_string(),
            domain: domain.to_string(),
            sdtm_variable: mapping.sdtm_variable.clone(),
            source_variable: source.clone(),
            pattern: mapping.pattern,
            derivation_rule: mapping.derivation_rule.clone(),
            was_corrected,
            correction_reason: correction.reason.clone(),
            embedded_text: LearningExample::embedding_text(
                &source,
                &mapping.sdtm_variable,
                mapping.pattern,
                mapping.derivation_rule.as_deref(),
                domain,
            ),
            timestamp: correction.timestamp,
        };

        let collection = if was_corrected {
            astraea_learn::Collection::Corrections
        } else {
            astraea_learn::Collection::Approved
        };
        match correction.correction_type {
            astraea_model::CorrectionType::Reject => continue,
            _ => learn_store.ingest(collection, &example, &model)?,
        }
    }
    Ok(())
}
