//! Pipeline orchestration helpers shared by the commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use polars::prelude::{Column, DataFrame};
use tracing::{info, warn};

use astraea_ingest::{RawTable, discover_datasets, load_raw_table};
use astraea_model::{DatasetProfile, DomainMappingSpec, Origin};
use astraea_standards::ReferenceStore;
use astraea_transform::{
    DomainFrame, ExecutionContext, SuppqualCandidate, TransposeSpec, apply_compliance,
    build_suppqual, compute_study_day, derive_epoch, derive_visitnum, execute_domain,
    execute_findings, reference_starts_from_dm, validate_suppqual_links,
};
use astraea_xpt::{XptValue, read_xpt};

use crate::config::StudyConfig;

/// Load every raw table in a data directory, keyed by lowercase name.
pub fn load_raw_frames(
    data_dir: &Path,
) -> Result<(BTreeMap<String, DataFrame>, Vec<RawTable>)> {
    let mut frames = BTreeMap::new();
    let mut tables = Vec::new();
    for discovered in discover_datasets(data_dir)? {
        match load_raw_table(&discovered.path) {
            Ok(table) => {
                frames.insert(table.name.clone(), table.data.clone());
                tables.push(table);
            }
            Err(err) => {
                warn!(file = %discovered.path.display(), error = %err, "skipping unreadable file");
            }
        }
    }
    if frames.is_empty() {
        bail!("no readable datasets in {}", data_dir.display());
    }
    Ok((frames, tables))
}

/// Convert a read-back transport dataset into a polars frame.
pub fn xpt_to_dataframe(dataset: &astraea_xpt::XptDataset) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(dataset.columns.len());
    for (idx, column) in dataset.columns.iter().enumerate() {
        match column.data_type {
            astraea_xpt::XptType::Char => {
                let values: Vec<Option<String>> = dataset
                    .rows
                    .iter()
                    .map(|row| match &row[idx] {
                        XptValue::Char(s) if s.is_empty() => None,
                        XptValue::Char(s) => Some(s.clone()),
                        XptValue::Num(n) => n.map(|v| v.to_string()),
                    })
                    .collect();
                columns.push(Column::new(column.name.as_str().into(), values));
            }
            astraea_xpt::XptType::Num => {
                let values: Vec<Option<f64>> = dataset
                    .rows
                    .iter()
                    .map(|row| match &row[idx] {
                        XptValue::Num(n) => *n,
                        XptValue::Char(s) => s.trim().parse().ok(),
                    })
                    .collect();
                columns.push(Column::new(column.name.as_str().into(), values));
            }
        }
    }
    DataFrame::new(columns).context("assemble dataframe from transport file")
}

/// Load every executed domain in an output directory, keyed by uppercase
/// dataset name.
pub fn load_output_frames(output_dir: &Path) -> Result<BTreeMap<String, DataFrame>> {
    let mut frames = BTreeMap::new();
    for entry in std::fs::read_dir(output_dir)
        .with_context(|| format!("read {}", output_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_xpt = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xpt"));
        if !is_xpt {
            continue;
        }
        let dataset = read_xpt(&path).with_context(|| format!("read {}", path.display()))?;
        let frame = xpt_to_dataframe(&dataset)?;
        frames.insert(dataset.name.to_uppercase(), frame);
    }
    if frames.is_empty() {
        bail!("no transport files in {}", output_dir.display());
    }
    Ok(frames)
}

/// Execute an approved spec end to end: run the engine (or the findings
/// executor for transposed domains), derive the standard timing
/// variables, split off the supplemental qualifiers, apply compliance,
/// and write the transport files plus the spec artifacts.
pub fn execute_and_write(
    spec: &DomainMappingSpec,
    data_dir: &Path,
    output_dir: &Path,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<Vec<PathBuf>> {
    execute_and_write_with(spec, None, data_dir, output_dir, config, store)
}

/// [`execute_and_write`] with an explicit transpose declaration for
/// findings domains.
pub fn execute_and_write_with(
    spec: &DomainMappingSpec,
    transpose: Option<&TransposeSpec>,
    data_dir: &Path,
    output_dir: &Path,
    config: &StudyConfig,
    store: &ReferenceStore,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create {}", output_dir.display()))?;

    let (frames, _tables) = load_raw_frames(data_dir)?;
    let ctx = ExecutionContext {
        study_id: &config.study_id,
        usubjid_delimiter: &config.usubjid_delimiter,
        store,
        frames: &frames,
        custom_aliases: &config.column_aliases,
    };

    let mut frame = match transpose {
        Some(tspec) => execute_findings_path(spec, tspec, &frames, config)?,
        None => execute_domain(spec, &ctx)?,
    };
    let domain_spec = store.get_domain_spec(&spec.domain)?;

    derive_timing_variables(spec, &mut frame, output_dir, config)?;

    // Non-standard targets leave the parent and become SUPP-- rows.
    let supp_frame = split_suppqual(&mut frame, spec, config)?;

    apply_compliance(&mut frame, domain_spec)?;

    let mut written = Vec::new();
    let path = astraea_report::write_domain_xpt(output_dir, domain_spec, &frame.data)?;
    info!(file = %path.display(), "domain written");
    written.push(path);

    if let Some(mut supp) = supp_frame {
        let supp_spec = store.get_domain_spec("SUPPQUAL")?;
        // The SUPP dataset borrows the SUPPQUAL template but keeps its
        // own name (SUPPDM, SUPPLB, ...).
        let violations = validate_suppqual_links(&supp.data, &frame.data);
        if !violations.is_empty() {
            bail!("SUPPQUAL links do not resolve: {}", violations.join("; "));
        }
        let mut named_spec = supp_spec.clone();
        named_spec.domain = supp.domain.clone();
        named_spec.label = format!("Supplemental Qualifiers for {}", spec.domain);
        apply_compliance(&mut supp, &named_spec)?;
        let supp_path =
            astraea_report::write_domain_xpt(output_dir, &named_spec, &supp.data)?;
        written.push(supp_path);
    }

    // Persist the spec artifacts beside the data.
    let lower = spec.domain.to_lowercase();
    astraea_report::write_mapping_json(
        &output_dir.join(format!("{lower}_spec.json")),
        spec,
    )?;
    astraea_report::write_mapping_workbook(
        &output_dir.join(format!("{lower}_mapping.xlsx")),
        spec,
    )?;
    if !frame.warnings.is_empty() {
        let issues = serde_json::to_string_pretty(&frame.warnings)?;
        std::fs::write(output_dir.join(format!("{lower}_issues.json")), issues)?;
    }

    Ok(written)
}

/// Run the findings executor and overlay the spec's constant mappings.
fn execute_findings_path(
    spec: &DomainMappingSpec,
    tspec: &TransposeSpec,
    frames: &BTreeMap<String, DataFrame>,
    config: &StudyConfig,
) -> Result<DomainFrame> {
    let sources: Vec<(&str, &DataFrame)> = spec
        .source_datasets
        .iter()
        .filter_map(|name| frames.get(name).map(|frame| (name.as_str(), frame)))
        .collect();
    if sources.is_empty() {
        bail!("none of the source datasets for {} are loaded", spec.domain);
    }

    let mut frame = execute_findings(
        tspec,
        &sources,
        &config.study_id,
        &config.usubjid_delimiter,
        &config.column_aliases,
    )?;

    // ASSIGN mappings (STUDYID, DOMAIN, EPOCH, ...) apply to every row.
    let height = frame.data.height();
    for mapping in spec.variable_mappings.values() {
        if mapping.pattern == astraea_model::MappingPattern::Assign
            && let Some(value) = mapping.derivation_rule.as_deref()
        {
            frame.data.with_column(Column::new(
                mapping.sdtm_variable.to_uppercase().into(),
                vec![value.to_string(); height],
            ))?;
        }
    }

    let seq_column = format!("{}SEQ", spec.domain.to_uppercase());
    if spec.mapping(&seq_column).is_some() {
        astraea_transform::assign_sequence_numbers(&mut frame.data, &seq_column, "USUBJID")?;
    }

    Ok(frame)
}

/// Derive --DY, EPOCH, and VISITNUM for spec targets that declare them
/// as derivations without a vocabulary rule.
///
/// Study days need the per-subject reference start dates: for DM they
/// come from the frame itself, for every other domain from the executed
/// dm.xpt in the output directory. EPOCH comes from the study
/// configuration's trial-design element windows.
fn derive_timing_variables(
    spec: &DomainMappingSpec,
    frame: &mut DomainFrame,
    output_dir: &Path,
    config: &StudyConfig,
) -> Result<()> {
    let is_bare_derivation = |m: &&astraea_model::VariableMapping| {
        m.pattern == astraea_model::MappingPattern::Derivation && m.derivation_rule.is_none()
    };

    let dy_targets: Vec<String> = spec
        .variable_mappings
        .values()
        .filter(is_bare_derivation)
        .map(|m| m.sdtm_variable.to_uppercase())
        .filter(|name| name.ends_with("DY"))
        .collect();

    if !dy_targets.is_empty() {
        let references = if spec.domain.eq_ignore_ascii_case("DM") {
            Some(reference_starts_from_dm(&frame.data))
        } else {
            let dm_path = output_dir.join("dm.xpt");
            if dm_path.is_file() {
                let dm = xpt_to_dataframe(&read_xpt(&dm_path)?)?;
                Some(reference_starts_from_dm(&dm))
            } else {
                warn!(
                    domain = %spec.domain,
                    "dm.xpt not executed yet; study days stay NULL"
                );
                None
            }
        };

        if let Some(references) = references {
            for dy in &dy_targets {
                let dtc = format!("{}DTC", dy.trim_end_matches("DY"));
                compute_study_day(&mut frame.data, &dtc, dy, &references)?;
            }
        }
    }

    let wants_epoch = spec
        .variable_mappings
        .values()
        .filter(is_bare_derivation)
        .any(|m| m.sdtm_variable.eq_ignore_ascii_case("EPOCH"));
    if wants_epoch {
        let windows = config.parsed_epoch_windows()?;
        match epoch_date_column(spec, frame) {
            Some(dtc) if !windows.is_empty() => {
                derive_epoch(&mut frame.data, &dtc, "EPOCH", &windows)?;
            }
            _ => {
                warn!(
                    domain = %spec.domain,
                    "no element windows or date column; EPOCH stays NULL"
                );
            }
        }
    }

    let wants_visitnum = spec
        .variable_mappings
        .values()
        .filter(is_bare_derivation)
        .any(|m| m.sdtm_variable.eq_ignore_ascii_case("VISITNUM"));
    let has_visit = frame
        .data
        .get_column_names()
        .iter()
        .any(|c| c.eq_ignore_ascii_case("VISIT"));
    if wants_visitnum && has_visit {
        derive_visitnum(&mut frame.data, "VISIT", "VISITNUM")?;
    }

    Ok(())
}

/// The date column EPOCH assignment reads: the domain's start date when
/// present, otherwise its collection date.
fn epoch_date_column(spec: &DomainMappingSpec, frame: &DomainFrame) -> Option<String> {
    let prefix = spec.domain.to_uppercase();
    [format!("{prefix}STDTC"), format!("{prefix}DTC")]
        .into_iter()
        .find(|candidate| {
            frame
                .data
                .get_column_names()
                .iter()
                .any(|c| c.eq_ignore_ascii_case(candidate))
        })
}

/// Move SUPPQUAL-candidate columns out of the parent frame into a
/// supplemental dataset.
fn split_suppqual(
    frame: &mut DomainFrame,
    spec: &DomainMappingSpec,
    config: &StudyConfig,
) -> Result<Option<DomainFrame>> {
    if spec.suppqual_candidates.is_empty() {
        return Ok(None);
    }

    let present: Vec<String> = spec
        .suppqual_candidates
        .iter()
        .filter(|candidate| {
            frame
                .data
                .get_column_names()
                .iter()
                .any(|c| c.eq_ignore_ascii_case(candidate))
        })
        .cloned()
        .collect();
    if present.is_empty() {
        return Ok(None);
    }

    let candidates: Vec<SuppqualCandidate> = present
        .iter()
        .map(|candidate| {
            let mapping = spec.mapping(candidate);
            SuppqualCandidate {
                source_column: candidate.to_uppercase(),
                qnam: candidate.chars().take(8).collect::<String>().to_uppercase(),
                qlabel: mapping
                    .and_then(|m| m.label.clone())
                    .unwrap_or_else(|| candidate.clone()),
                qorig: mapping
                    .and_then(|m| m.origin)
                    .unwrap_or(Origin::Crf)
                    .to_string(),
            }
        })
        .collect();

    let seq_column = format!("{}SEQ", spec.domain.to_uppercase());
    let idvar = frame
        .data
        .get_column_names()
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&seq_column))
        .then_some(seq_column);

    let supp = build_suppqual(frame, &config.study_id, idvar.as_deref(), &candidates)?;

    // Candidate columns leave the parent regardless of whether any row
    // produced a qualifier value.
    let keep: Vec<String> = frame
        .data
        .get_column_names()
        .iter()
        .filter(|c| !present.iter().any(|p| p.eq_ignore_ascii_case(c)))
        .map(|c| c.to_string())
        .collect();
    let keep_refs: Vec<&str> = keep.iter().map(String::as_str).collect();
    frame.data = frame.data.select(keep_refs)?;

    Ok(supp)
}

/// Build the TS frame from study configuration.
pub fn build_trial_summary(config: &StudyConfig) -> Result<DataFrame> {
    if !config.trial_summary.contains_key("SSTDTC") {
        bail!("trial_summary in the study config must include SSTDTC");
    }

    let mut seq = Vec::new();
    let mut parmcd = Vec::new();
    let mut parm = Vec::new();
    let mut val = Vec::new();
    for (idx, (code, value)) in config.trial_summary.iter().enumerate() {
        seq.push((idx + 1) as f64);
        parmcd.push(code.to_uppercase());
        parm.push(parameter_name(code));
        val.push(value.clone());
    }

    let height = seq.len();
    DataFrame::new(vec![
        Column::new("STUDYID".into(), vec![config.study_id.clone(); height]),
        Column::new("DOMAIN".into(), vec!["TS".to_string(); height]),
        Column::new("TSSEQ".into(), seq),
        Column::new("TSPARMCD".into(), parmcd),
        Column::new("TSPARM".into(), parm),
        Column::new("TSVAL".into(), val),
    ])
    .context("assemble TS frame")
}

fn parameter_name(code: &str) -> String {
    match code.to_uppercase().as_str() {
        "SSTDTC" => "Study Start Date".to_string(),
        "SENDTC" => "Study End Date".to_string(),
        "TITLE" => "Trial Title".to_string(),
        "SPONSOR" => "Clinical Study Sponsor".to_string(),
        "TPHASE" => "Trial Phase Classification".to_string(),
        "STYPE" => "Study Type".to_string(),
        "NARMS" => "Planned Number of Arms".to_string(),
        "PLANSUB" => "Planned Number of Subjects".to_string(),
        "RANDOM" => "Trial is Randomized".to_string(),
        "AGEMIN" => "Planned Minimum Age of Subjects".to_string(),
        "AGEMAX" => "Planned Maximum Age of Subjects".to_string(),
        other => other.to_string(),
    }
}

/// Profiles for the datasets feeding one domain, by filename heuristics.
pub fn profiles_for_domain<'a>(
    profiles: &'a [DatasetProfile],
    domain: &str,
) -> Vec<&'a DatasetProfile> {
    profiles
        .iter()
        .filter(|p| astraea_classify::filename_score(&p.dataset_name, domain) > 0.0)
        .collect()
}
