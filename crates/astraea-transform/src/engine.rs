//! The pattern-dispatched execution engine.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};
use tracing::{info, warn};

use astraea_agent::DerivationRule;
use astraea_model::{DomainMappingSpec, MappingPattern, VariableMapping, VariableType};
use astraea_standards::ReferenceStore;

use crate::datetime::{parse_iso_date, parse_string_date_to_iso, sas_date_to_iso};
use crate::derived::assign_sequence_numbers;
use crate::error::TransformError;
use crate::frame::DomainFrame;
use crate::handlers;
use crate::resolve::ColumnResolver;

/// Everything the engine needs besides the spec itself.
///
/// `frames` holds every loaded raw dataset, not just the spec's sources:
/// cross-domain derivations such as `MIN_DATE_PER_SUBJECT(ex.EXSTDTC)`
/// reach into other datasets while building the current domain.
pub struct ExecutionContext<'a> {
    /// Study identifier.
    pub study_id: &'a str,

    /// Delimiter for constructed USUBJIDs.
    pub usubjid_delimiter: &'a str,

    /// Reference store for codelist lookups.
    pub store: &'a ReferenceStore,

    /// All raw frames keyed by lowercase dataset name.
    pub frames: &'a BTreeMap<String, DataFrame>,

    /// Study-specific column alias overrides.
    pub custom_aliases: &'a BTreeMap<String, String>,
}

/// Execute an approved spec against the raw data.
///
/// Produces one row per primary-source row, in source order; sorting and
/// column reordering happen later in the compliance pass. Failure on
/// STUDYID, DOMAIN, or USUBJID aborts; failure on any other variable
/// logs a warning and leaves the column NULL.
pub fn execute_domain(
    spec: &DomainMappingSpec,
    ctx: &ExecutionContext<'_>,
) -> Result<DomainFrame, TransformError> {
    let primary_name = spec
        .source_datasets
        .iter()
        .find(|name| ctx.frames.contains_key(name.as_str()))
        .ok_or_else(|| {
            TransformError::MissingDataset(
                spec.source_datasets.iter().cloned().collect::<Vec<_>>().join(", "),
            )
        })?;
    let primary = &ctx.frames[primary_name.as_str()];
    let resolver = ColumnResolver::new(primary, ctx.custom_aliases);
    let height = primary.height();

    let mut warnings = Vec::new();
    let mut columns: Vec<Column> = Vec::new();
    let mut deferred: Vec<&VariableMapping> = Vec::new();
    let mut usubjid_values: Option<Vec<Option<String>>> = None;

    for mapping in spec.ordered_mappings() {
        if is_cross_domain(mapping) {
            deferred.push(mapping);
            continue;
        }
        if mapping.pattern == MappingPattern::Transpose {
            // Findings restructuring runs through the dedicated executor.
            continue;
        }

        let values = match produce_column(mapping, primary, &resolver, ctx, &mut warnings) {
            Ok(values) => values,
            Err(err) if is_critical(&mapping.sdtm_variable) => {
                return Err(TransformError::CriticalVariableFailed {
                    variable: mapping.sdtm_variable.clone(),
                    message: err.to_string(),
                });
            }
            Err(err) => {
                let message = format!("{}: {err}; column left NULL", mapping.sdtm_variable);
                warn!("{message}");
                warnings.push(message);
                vec![None; height]
            }
        };

        if mapping.sdtm_variable.eq_ignore_ascii_case("USUBJID") {
            usubjid_values = Some(values.clone());
        }
        columns.push(build_column(mapping, values, height));
    }

    let mut data = DataFrame::new(columns)?;

    // Cross-domain derivations join on the USUBJID built above.
    for mapping in deferred {
        let values = match cross_domain_column(mapping, usubjid_values.as_deref(), ctx) {
            Ok(values) => values,
            Err(err) if is_critical(&mapping.sdtm_variable) => {
                return Err(TransformError::CriticalVariableFailed {
                    variable: mapping.sdtm_variable.clone(),
                    message: err.to_string(),
                });
            }
            Err(err) => {
                let message = format!("{}: {err}; column left NULL", mapping.sdtm_variable);
                warn!("{message}");
                warnings.push(message);
                vec![None; height]
            }
        };
        data.with_column(build_column(mapping, values, height))?;
    }

    // --SEQ is derived after all rows exist: a 1-based counter per subject.
    let seq_target = format!("{}SEQ", spec.domain.to_uppercase());
    if spec.mapping(&seq_target).is_some() {
        assign_sequence_numbers(&mut data, &seq_target, "USUBJID")?;
    }

    info!(
        domain = %spec.domain,
        rows = data.height(),
        columns = data.width(),
        "domain executed"
    );

    let mut frame = DomainFrame::new(spec.domain.clone(), data);
    frame.warnings = warnings;
    Ok(frame)
}

fn is_critical(variable: &str) -> bool {
    matches!(
        variable.to_uppercase().as_str(),
        "STUDYID" | "DOMAIN" | "USUBJID"
    )
}

fn is_cross_domain(mapping: &VariableMapping) -> bool {
    mapping
        .derivation_rule
        .as_deref()
        .map(|rule| {
            let upper = rule.trim().to_uppercase();
            upper.starts_with("MIN_DATE_PER_SUBJECT") || upper.starts_with("MAX_DATE_PER_SUBJECT")
        })
        .unwrap_or(false)
}

/// Produce one column's values by pattern dispatch.
fn produce_column(
    mapping: &VariableMapping,
    primary: &DataFrame,
    resolver: &ColumnResolver,
    ctx: &ExecutionContext<'_>,
    warnings: &mut Vec<String>,
) -> Result<Vec<Option<String>>, TransformError> {
    let height = primary.height();

    match mapping.pattern {
        MappingPattern::Direct | MappingPattern::Rename => {
            let token = mapping
                .source_variable
                .as_deref()
                .unwrap_or(&mapping.sdtm_variable);
            match resolver.resolve(token) {
                Some(column) => Ok(handlers::string_values(primary, column)),
                None => Err(TransformError::CriticalColumnUnresolved {
                    variable: mapping.sdtm_variable.clone(),
                    token: token.to_string(),
                }),
            }
        }

        MappingPattern::Assign => {
            let value = mapping.derivation_rule.clone().ok_or_else(|| {
                TransformError::CriticalVariableFailed {
                    variable: mapping.sdtm_variable.clone(),
                    message: "ASSIGN mapping has no constant value".to_string(),
                }
            })?;
            Ok(vec![Some(value); height])
        }

        MappingPattern::LookupRecode => {
            let token = mapping
                .source_variable
                .as_deref()
                .unwrap_or(&mapping.sdtm_variable);
            let column = resolver.resolve(token).ok_or_else(|| {
                TransformError::CriticalColumnUnresolved {
                    variable: mapping.sdtm_variable.clone(),
                    token: token.to_string(),
                }
            })?;
            let code = mapping.codelist_code.as_deref().unwrap_or_default();
            match ctx.store.lookup_codelist(code) {
                Some(codelist) => {
                    Ok(handlers::lookup_recode_column(primary, column, codelist, warnings))
                }
                None => {
                    warnings.push(format!(
                        "{}: codelist {code} unavailable; values pass through",
                        mapping.sdtm_variable
                    ));
                    Ok(handlers::string_values(primary, column))
                }
            }
        }

        MappingPattern::Split => {
            // Deferred pattern: recorded as a warning, emitted as NULL.
            warnings.push(format!(
                "{}: SPLIT is not supported yet; column left NULL",
                mapping.sdtm_variable
            ));
            Ok(vec![None; height])
        }

        MappingPattern::Reformat | MappingPattern::Derivation | MappingPattern::Combine => {
            dispatch_rule(mapping, primary, resolver, ctx)
        }

        MappingPattern::Transpose => Ok(vec![None; height]),
    }
}

/// Dispatch a vocabulary rule to its handler.
fn dispatch_rule(
    mapping: &VariableMapping,
    primary: &DataFrame,
    resolver: &ColumnResolver,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Option<String>>, TransformError> {
    let target = mapping.sdtm_variable.to_uppercase();
    let Some(rule_text) = mapping.derivation_rule.as_deref() else {
        // Registry-derived variables (--SEQ, --DY, EPOCH, VISITNUM)
        // carry no rule; their columns are filled after row production.
        if target.ends_with("SEQ")
            || target.ends_with("DY")
            || target == "EPOCH"
            || target == "VISITNUM"
        {
            return Ok(vec![None; primary.height()]);
        }
        return Err(TransformError::CriticalVariableFailed {
            variable: mapping.sdtm_variable.clone(),
            message: "derivation mapping has no rule".to_string(),
        });
    };

    let rule = DerivationRule::parse(rule_text, mapping.source_variable.as_deref()).map_err(
        |_| TransformError::UnknownKeyword {
            variable: mapping.sdtm_variable.clone(),
            rule: rule_text.to_string(),
        },
    )?;

    let resolve_or_fail = |token: &str| -> Result<String, TransformError> {
        resolver
            .resolve(token)
            .map(str::to_string)
            .ok_or_else(|| TransformError::CriticalColumnUnresolved {
                variable: mapping.sdtm_variable.clone(),
                token: token.to_string(),
            })
    };

    match &rule {
        DerivationRule::GenerateUsubjid => handlers::generate_usubjid_column(
            primary,
            resolver,
            ctx.study_id,
            ctx.usubjid_delimiter,
        ),
        DerivationRule::Concat(tokens) => {
            Ok(handlers::concat_column(primary, resolver, tokens))
        }
        DerivationRule::Iso8601Date(token) => {
            let column = resolve_or_fail(token)?;
            Ok(handlers::iso_date_column(primary, &column))
        }
        DerivationRule::Iso8601Datetime(token) => {
            let column = resolve_or_fail(token)?;
            Ok(handlers::iso_datetime_column(primary, &column))
        }
        DerivationRule::Iso8601PartialDate { year, month, day } => Ok(
            handlers::partial_date_column(
                primary,
                resolver,
                year.as_deref(),
                month.as_deref(),
                day.as_deref(),
            ),
        ),
        DerivationRule::ParseStringDate(token) => {
            let column = resolve_or_fail(token)?;
            Ok(handlers::parse_string_date_column(primary, &column))
        }
        DerivationRule::RaceCheckbox(tokens) => {
            Ok(handlers::race_checkbox_column(primary, resolver, tokens))
        }
        DerivationRule::NumericToYn(token) => {
            let column = resolve_or_fail(token)?;
            Ok(handlers::numeric_to_yn_column(primary, &column))
        }
        DerivationRule::MinDatePerSubject(_) | DerivationRule::MaxDatePerSubject(_) => {
            // Routed through the deferred cross-domain pass.
            Ok(vec![None; primary.height()])
        }
    }
}

/// Compute a MIN/MAX_DATE_PER_SUBJECT column by grouping another frame
/// on USUBJID and joining back to the rows built for this domain.
fn cross_domain_column(
    mapping: &VariableMapping,
    target_usubjids: Option<&[Option<String>]>,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Option<String>>, TransformError> {
    let rule_text = mapping.derivation_rule.as_deref().unwrap_or_default();
    let rule = DerivationRule::parse(rule_text, mapping.source_variable.as_deref()).map_err(
        |_| TransformError::UnknownKeyword {
            variable: mapping.sdtm_variable.clone(),
            rule: rule_text.to_string(),
        },
    )?;

    let (token, want_min) = match &rule {
        DerivationRule::MinDatePerSubject(token) => (token.as_str(), true),
        DerivationRule::MaxDatePerSubject(token) => (token.as_str(), false),
        _ => {
            return Err(TransformError::UnknownKeyword {
                variable: mapping.sdtm_variable.clone(),
                rule: rule_text.to_string(),
            });
        }
    };

    let Some(usubjids) = target_usubjids else {
        return Err(TransformError::CriticalVariableFailed {
            variable: mapping.sdtm_variable.clone(),
            message: "cross-domain derivation needs USUBJID built first".to_string(),
        });
    };

    // `ex.EXSTDTC` names the frame; a bare token reads the first source
    // frame that resolves it.
    let (frame, column_token) = match token.split_once('.') {
        Some((dataset, column)) => {
            let frame = ctx
                .frames
                .get(&dataset.to_lowercase())
                .ok_or_else(|| TransformError::MissingDataset(dataset.to_string()))?;
            (frame, column)
        }
        None => {
            let found = ctx.frames.iter().find(|(_, frame)| {
                ColumnResolver::new(frame, ctx.custom_aliases)
                    .resolve(token)
                    .is_some()
            });
            match found {
                Some((_, frame)) => (frame, token),
                None => return Err(TransformError::MissingDataset(token.to_string())),
            }
        }
    };

    let resolver = ColumnResolver::new(frame, ctx.custom_aliases);
    let column = resolver.resolve(column_token).ok_or_else(|| {
        TransformError::CriticalColumnUnresolved {
            variable: mapping.sdtm_variable.clone(),
            token: column_token.to_string(),
        }
    })?;

    // The source frame needs a per-row USUBJID to group on: use its own
    // USUBJID column when present, otherwise construct one the same way
    // GENERATE_USUBJID does.
    let subject_ids: Vec<Option<String>> = match resolver.resolve("USUBJID") {
        Some(usubjid_col) => handlers::string_values(frame, usubjid_col),
        None => handlers::generate_usubjid_column(
            frame,
            &resolver,
            ctx.study_id,
            ctx.usubjid_delimiter,
        )?,
    };

    let dates = extract_dates(frame, column);
    let mut per_subject: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for (subject, date) in subject_ids.iter().zip(dates.iter()) {
        let (Some(subject), Some(date)) = (subject, date) else {
            continue;
        };
        per_subject
            .entry(subject.clone())
            .and_modify(|existing| {
                if (want_min && date < existing) || (!want_min && date > existing) {
                    *existing = *date;
                }
            })
            .or_insert(*date);
    }

    Ok(usubjids
        .iter()
        .map(|subject| {
            subject
                .as_deref()
                .and_then(|s| per_subject.get(s))
                .map(|date| date.format("%Y-%m-%d").to_string())
        })
        .collect())
}

/// Read a column as dates: ISO strings, recognized text formats, or SAS
/// numeric dates.
fn extract_dates(df: &DataFrame, column: &str) -> Vec<Option<NaiveDate>> {
    handlers::string_values(df, column)
        .into_iter()
        .map(|opt| {
            opt.and_then(|value| {
                parse_iso_date(&value)
                    .or_else(|| {
                        parse_string_date_to_iso(&value)
                            .as_deref()
                            .and_then(parse_iso_date)
                    })
                    .or_else(|| {
                        value
                            .parse::<f64>()
                            .ok()
                            .and_then(sas_date_to_iso)
                            .as_deref()
                            .and_then(parse_iso_date)
                    })
            })
        })
        .collect()
}

/// Type the produced values per the enriched mapping.
fn build_column(mapping: &VariableMapping, values: Vec<Option<String>>, height: usize) -> Column {
    let name = mapping.sdtm_variable.to_uppercase();
    let mut values = values;
    values.resize(height, None);

    match mapping.data_type {
        Some(VariableType::Num) => {
            let numeric: Vec<Option<f64>> = values
                .into_iter()
                .map(|opt| opt.and_then(|v| v.trim().parse::<f64>().ok()))
                .collect();
            Column::new(name.into(), numeric)
        }
        _ => Column::new(name.into(), values),
    }
}
