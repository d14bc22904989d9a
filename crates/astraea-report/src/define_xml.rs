//! define.xml 2.0 generation.
//!
//! The generator collects every OID-bearing element first, validates OID
//! closure (every reference resolves to a definition), and only then
//! serializes. A dangling OID is a generation bug the validator would
//! reject much later; failing here keeps the feedback loop short.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use polars::prelude::DataFrame;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::info;

use astraea_model::{
    DomainMappingSpec, DomainSpec, MappingPattern, Origin, VariableType,
};
use astraea_standards::ReferenceStore;

const ODM_NS: &str = "http://www.cdisc.org/ns/odm/v1.3";
const DEFINE_NS: &str = "http://www.cdisc.org/ns/def/v2.0";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const DEFINE_VERSION: &str = "2.0.0";

/// Options for define.xml output.
#[derive(Debug, Clone)]
pub struct DefineXmlOptions {
    /// SDTM-IG version recorded in the metadata.
    pub sdtm_ig_version: String,

    /// def:Context attribute value.
    pub context: String,
}

impl Default for DefineXmlOptions {
    fn default() -> Self {
        Self {
            sdtm_ig_version: "3.4".to_string(),
            context: "Submission".to_string(),
        }
    }
}

struct ItemDefSpec {
    oid: String,
    name: String,
    label: String,
    data_type: VariableType,
    length: Option<u32>,
    origin: Option<Origin>,
    codelist_oid: Option<String>,
}

struct ItemRefSpec {
    item_oid: String,
    order: u32,
    mandatory: bool,
    key_sequence: Option<u32>,
    method_oid: Option<String>,
}

struct ItemGroupSpec {
    oid: String,
    domain: String,
    label: String,
    class: String,
    structure: String,
    repeating: bool,
    leaf_oid: String,
    filename: String,
    item_refs: Vec<ItemRefSpec>,
}

struct MethodSpec {
    oid: String,
    description: String,
    expression: String,
}

struct CommentSpec {
    oid: String,
    text: String,
}

struct CodeListSpec {
    oid: String,
    name: String,
    values: Vec<String>,
    extensible: bool,
}

struct ValueListSpec {
    oid: String,
    where_clauses: Vec<WhereClauseSpec>,
}

struct WhereClauseSpec {
    oid: String,
    variable_oid: String,
    value: String,
}

/// One executed domain handed to the generator.
pub struct DefineEntry<'a> {
    /// The approved mapping spec.
    pub mapping_spec: &'a DomainMappingSpec,

    /// The reference domain spec.
    pub domain_spec: &'a DomainSpec,

    /// The executed frame, used for Findings value-level metadata.
    pub frame: Option<&'a DataFrame>,
}

/// Write define.xml 2.0 for the executed domains.
pub fn write_define_xml(
    output_path: &Path,
    study_id: &str,
    entries: &[DefineEntry<'_>],
    store: &ReferenceStore,
    options: &DefineXmlOptions,
) -> Result<()> {
    if entries.is_empty() {
        bail!("no datasets supplied for define.xml");
    }

    let mut item_groups: Vec<ItemGroupSpec> = Vec::new();
    let mut item_defs: BTreeMap<String, ItemDefSpec> = BTreeMap::new();
    let mut methods: BTreeMap<String, MethodSpec> = BTreeMap::new();
    let mut comments: BTreeMap<String, CommentSpec> = BTreeMap::new();
    let mut codelists: BTreeMap<String, CodeListSpec> = BTreeMap::new();
    let mut value_lists: Vec<ValueListSpec> = Vec::new();

    for entry in entries {
        let domain = entry.domain_spec.domain.to_uppercase();
        let mut group = ItemGroupSpec {
            oid: format!("IG.{domain}"),
            domain: domain.clone(),
            label: entry.domain_spec.label.clone(),
            class: entry.domain_spec.class.as_str().to_string(),
            structure: entry.domain_spec.structure.clone(),
            repeating: !entry.domain_spec.structure.to_lowercase().contains("one record per subject"),
            leaf_oid: format!("LF.{}", domain.to_lowercase()),
            filename: format!("{}.xpt", domain.to_lowercase()),
            item_refs: Vec::new(),
        };

        let mut key_sequence = 1u32;
        for (order, variable) in entry.domain_spec.variables.iter().enumerate() {
            let mapping = entry.mapping_spec.mapping(&variable.name);
            // Only emitted variables appear: mapped ones, plus the keys.
            let is_key = entry
                .domain_spec
                .key_variables
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&variable.name));
            if mapping.is_none() && !is_key {
                continue;
            }

            let item_oid = format!("IT.{domain}.{}", variable.name);
            let method_oid = mapping
                .filter(|m| m.pattern == MappingPattern::Derivation)
                .map(|m| {
                    let oid = format!("MT.{domain}.{}", variable.name);
                    let expression = m
                        .derivation_rule
                        .clone()
                        .unwrap_or_else(|| "derived".to_string());
                    let description = m
                        .computational_method
                        .clone()
                        .unwrap_or_else(|| format!("Derivation of {}", variable.name));
                    methods.entry(oid.clone()).or_insert(MethodSpec {
                        oid: oid.clone(),
                        description,
                        expression,
                    });
                    oid
                });

            let codelist_oid = variable.codelist_code.as_deref().and_then(|code| {
                let codelist = store.lookup_codelist(code)?;
                let oid = format!("CL.{code}");
                codelists.entry(oid.clone()).or_insert_with(|| CodeListSpec {
                    oid: oid.clone(),
                    name: codelist.name.clone(),
                    values: codelist
                        .submission_values()
                        .iter()
                        .map(|v| (*v).to_string())
                        .collect(),
                    extensible: codelist.extensible,
                });
                Some(oid)
            });

            group.item_refs.push(ItemRefSpec {
                item_oid: item_oid.clone(),
                order: (order + 1) as u32,
                mandatory: variable.core.is_required(),
                key_sequence: is_key.then(|| {
                    let seq = key_sequence;
                    key_sequence += 1;
                    seq
                }),
                method_oid: method_oid.clone(),
            });

            item_defs.entry(item_oid.clone()).or_insert(ItemDefSpec {
                oid: item_oid,
                name: variable.name.clone(),
                label: variable.label.clone(),
                data_type: variable.data_type,
                length: variable.length,
                origin: mapping.and_then(|m| m.origin),
                codelist_oid,
            });
        }

        // Non-standard variables get a comment pointing at SUPPQUAL.
        for candidate in &entry.mapping_spec.suppqual_candidates {
            let oid = format!("COM.{domain}.{candidate}");
            comments.entry(oid.clone()).or_insert(CommentSpec {
                oid,
                text: format!(
                    "{candidate} is not an SDTM-IG {domain} variable; submitted in SUPP{domain}"
                ),
            });
        }

        // Value-level metadata for executed Findings transposes.
        if entry.domain_spec.class.is_findings()
            && let Some(frame) = entry.frame
        {
            let testcd_column = format!("{domain}TESTCD");
            if let Some(values) = unique_strings(frame, &testcd_column) {
                let where_clauses: Vec<WhereClauseSpec> = values
                    .into_iter()
                    .map(|value| WhereClauseSpec {
                        oid: format!("WC.{domain}.{value}"),
                        variable_oid: format!("IT.{domain}.{testcd_column}"),
                        value,
                    })
                    .collect();
                if !where_clauses.is_empty() {
                    value_lists.push(ValueListSpec {
                        oid: format!("VL.{domain}.{domain}ORRES"),
                        where_clauses,
                    });
                }
            }
        }

        item_groups.push(group);
    }

    verify_oid_closure(&item_groups, &item_defs, &methods, &codelists)?;

    let file = File::create(output_path)
        .with_context(|| format!("create {}", output_path.display()))?;
    let mut xml = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let study_oid = format!("STDY.{study_id}");
    let mut root = BytesStart::new("ODM");
    root.push_attribute(("xmlns", ODM_NS));
    root.push_attribute(("xmlns:def", DEFINE_NS));
    root.push_attribute(("xmlns:xlink", XLINK_NS));
    root.push_attribute(("FileType", "Snapshot"));
    root.push_attribute((
        "FileOID",
        format!("{study_oid}.Define-XML_{DEFINE_VERSION}").as_str(),
    ));
    root.push_attribute(("ODMVersion", "1.3.2"));
    root.push_attribute(("CreationDateTime", timestamp.as_str()));
    root.push_attribute(("Originator", "Astraea"));
    root.push_attribute(("SourceSystem", "Astraea"));
    root.push_attribute(("def:Context", options.context.as_str()));
    xml.write_event(Event::Start(root))?;

    let mut study = BytesStart::new("Study");
    study.push_attribute(("OID", study_oid.as_str()));
    xml.write_event(Event::Start(study))?;

    xml.write_event(Event::Start(BytesStart::new("GlobalVariables")))?;
    write_text_element(&mut xml, "StudyName", study_id)?;
    write_text_element(
        &mut xml,
        "StudyDescription",
        &format!("SDTM submission for {study_id}"),
    )?;
    write_text_element(&mut xml, "ProtocolName", study_id)?;
    xml.write_event(Event::End(BytesEnd::new("GlobalVariables")))?;

    let mdv_oid = format!("MDV.{study_oid}.SDTMIG.{}", options.sdtm_ig_version);
    let mdv_name = format!("Study {study_id}, Data Definitions");
    let mut metadata = BytesStart::new("MetaDataVersion");
    metadata.push_attribute(("OID", mdv_oid.as_str()));
    metadata.push_attribute(("Name", mdv_name.as_str()));
    metadata.push_attribute(("def:DefineVersion", DEFINE_VERSION));
    metadata.push_attribute((
        "def:StandardName",
        format!("SDTM-IG {}", options.sdtm_ig_version).as_str(),
    ));
    metadata.push_attribute(("def:StandardVersion", options.sdtm_ig_version.as_str()));
    xml.write_event(Event::Start(metadata))?;

    // def:leaf archive locations first, so ArchiveLocationIDs resolve.
    for group in &item_groups {
        let mut leaf = BytesStart::new("def:leaf");
        leaf.push_attribute(("ID", group.leaf_oid.as_str()));
        leaf.push_attribute(("xlink:href", group.filename.as_str()));
        xml.write_event(Event::Start(leaf))?;
        write_text_element(&mut xml, "def:title", &group.filename)?;
        xml.write_event(Event::End(BytesEnd::new("def:leaf")))?;
    }

    for list in &value_lists {
        let mut node = BytesStart::new("def:ValueListDef");
        node.push_attribute(("OID", list.oid.as_str()));
        xml.write_event(Event::Start(node))?;
        for (idx, clause) in list.where_clauses.iter().enumerate() {
            let mut item_ref = BytesStart::new("ItemRef");
            item_ref.push_attribute(("ItemOID", clause.variable_oid.as_str()));
            item_ref.push_attribute(("OrderNumber", format!("{}", idx + 1).as_str()));
            item_ref.push_attribute(("Mandatory", "No"));
            xml.write_event(Event::Start(item_ref))?;
            let mut wc_ref = BytesStart::new("def:WhereClauseRef");
            wc_ref.push_attribute(("WhereClauseOID", clause.oid.as_str()));
            xml.write_event(Event::Empty(wc_ref))?;
            xml.write_event(Event::End(BytesEnd::new("ItemRef")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("def:ValueListDef")))?;
    }

    for list in &value_lists {
        for clause in &list.where_clauses {
            let mut node = BytesStart::new("def:WhereClauseDef");
            node.push_attribute(("OID", clause.oid.as_str()));
            xml.write_event(Event::Start(node))?;
            let mut check = BytesStart::new("RangeCheck");
            check.push_attribute(("Comparator", "EQ"));
            check.push_attribute(("SoftHard", "Soft"));
            check.push_attribute(("def:ItemOID", clause.variable_oid.as_str()));
            xml.write_event(Event::Start(check))?;
            write_text_element(&mut xml, "CheckValue", &clause.value)?;
            xml.write_event(Event::End(BytesEnd::new("RangeCheck")))?;
            xml.write_event(Event::End(BytesEnd::new("def:WhereClauseDef")))?;
        }
    }

    for group in &item_groups {
        let mut node = BytesStart::new("ItemGroupDef");
        node.push_attribute(("OID", group.oid.as_str()));
        node.push_attribute(("Name", group.domain.as_str()));
        node.push_attribute(("Domain", group.domain.as_str()));
        node.push_attribute(("SASDatasetName", group.domain.as_str()));
        node.push_attribute(("Repeating", if group.repeating { "Yes" } else { "No" }));
        node.push_attribute(("IsReferenceData", "No"));
        node.push_attribute(("Purpose", "Tabulation"));
        node.push_attribute(("def:Label", group.label.as_str()));
        node.push_attribute(("def:Class", group.class.as_str()));
        node.push_attribute(("def:Structure", group.structure.as_str()));
        node.push_attribute(("def:ArchiveLocationID", group.leaf_oid.as_str()));
        xml.write_event(Event::Start(node))?;

        for item_ref in &group.item_refs {
            let mut node = BytesStart::new("ItemRef");
            node.push_attribute(("ItemOID", item_ref.item_oid.as_str()));
            node.push_attribute(("OrderNumber", format!("{}", item_ref.order).as_str()));
            node.push_attribute(("Mandatory", if item_ref.mandatory { "Yes" } else { "No" }));
            if let Some(seq) = item_ref.key_sequence {
                node.push_attribute(("KeySequence", format!("{seq}").as_str()));
            }
            if let Some(method) = &item_ref.method_oid {
                node.push_attribute(("MethodOID", method.as_str()));
            }
            xml.write_event(Event::Empty(node))?;
        }
        xml.write_event(Event::End(BytesEnd::new("ItemGroupDef")))?;
    }

    for item in item_defs.values() {
        let mut node = BytesStart::new("ItemDef");
        node.push_attribute(("OID", item.oid.as_str()));
        node.push_attribute(("Name", item.name.as_str()));
        node.push_attribute((
            "DataType",
            match item.data_type {
                VariableType::Char => "text",
                VariableType::Num => "float",
            },
        ));
        if let Some(length) = item.length {
            node.push_attribute(("Length", format!("{length}").as_str()));
        }
        xml.write_event(Event::Start(node))?;

        write_translated_text(&mut xml, "Description", &item.label)?;
        if let Some(codelist_oid) = &item.codelist_oid {
            let mut reference = BytesStart::new("CodeListRef");
            reference.push_attribute(("CodeListOID", codelist_oid.as_str()));
            xml.write_event(Event::Empty(reference))?;
        }
        let mut origin = BytesStart::new("def:Origin");
        origin.push_attribute((
            "Type",
            item.origin.map(|o| o.as_str()).unwrap_or("Collected"),
        ));
        xml.write_event(Event::Empty(origin))?;

        xml.write_event(Event::End(BytesEnd::new("ItemDef")))?;
    }

    for codelist in codelists.values() {
        let mut node = BytesStart::new("CodeList");
        node.push_attribute(("OID", codelist.oid.as_str()));
        node.push_attribute(("Name", codelist.name.as_str()));
        node.push_attribute(("DataType", "text"));
        if codelist.extensible {
            node.push_attribute(("def:Extensible", "Yes"));
        }
        xml.write_event(Event::Start(node))?;
        for value in &codelist.values {
            let mut item = BytesStart::new("CodeListItem");
            item.push_attribute(("CodedValue", value.as_str()));
            xml.write_event(Event::Start(item))?;
            write_translated_text(&mut xml, "Decode", value)?;
            xml.write_event(Event::End(BytesEnd::new("CodeListItem")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("CodeList")))?;
    }

    for method in methods.values() {
        let mut node = BytesStart::new("MethodDef");
        node.push_attribute(("OID", method.oid.as_str()));
        node.push_attribute(("Name", method.oid.as_str()));
        node.push_attribute(("Type", "Computation"));
        xml.write_event(Event::Start(node))?;
        write_translated_text(&mut xml, "Description", &method.description)?;
        let mut expression = BytesStart::new("FormalExpression");
        expression.push_attribute(("Context", "Astraea"));
        xml.write_event(Event::Start(expression))?;
        xml.write_event(Event::Text(BytesText::new(&method.expression)))?;
        xml.write_event(Event::End(BytesEnd::new("FormalExpression")))?;
        xml.write_event(Event::End(BytesEnd::new("MethodDef")))?;
    }

    for comment in comments.values() {
        let mut node = BytesStart::new("def:CommentDef");
        node.push_attribute(("OID", comment.oid.as_str()));
        xml.write_event(Event::Start(node))?;
        write_translated_text(&mut xml, "Description", &comment.text)?;
        xml.write_event(Event::End(BytesEnd::new("def:CommentDef")))?;
    }

    xml.write_event(Event::End(BytesEnd::new("MetaDataVersion")))?;
    xml.write_event(Event::End(BytesEnd::new("Study")))?;
    xml.write_event(Event::End(BytesEnd::new("ODM")))?;

    info!(file = %output_path.display(), domains = item_groups.len(), "define.xml written");
    Ok(())
}

/// Every referenced OID must have a definition.
fn verify_oid_closure(
    item_groups: &[ItemGroupSpec],
    item_defs: &BTreeMap<String, ItemDefSpec>,
    methods: &BTreeMap<String, MethodSpec>,
    codelists: &BTreeMap<String, CodeListSpec>,
) -> Result<()> {
    let mut missing: BTreeSet<String> = BTreeSet::new();

    for group in item_groups {
        for item_ref in &group.item_refs {
            if !item_defs.contains_key(&item_ref.item_oid) {
                missing.insert(item_ref.item_oid.clone());
            }
            if let Some(method) = &item_ref.method_oid
                && !methods.contains_key(method)
            {
                missing.insert(method.clone());
            }
        }
    }
    for item in item_defs.values() {
        if let Some(codelist) = &item.codelist_oid
            && !codelists.contains_key(codelist)
        {
            missing.insert(codelist.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        bail!(
            "define.xml OID closure failed; unresolved: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )
    }
}

fn write_text_element<W: std::io::Write>(
    xml: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    xml.write_event(Event::Text(BytesText::new(text)))?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_translated_text<W: std::io::Write>(
    xml: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    let mut translated = BytesStart::new("TranslatedText");
    translated.push_attribute(("xml:lang", "en"));
    xml.write_event(Event::Start(translated))?;
    xml.write_event(Event::Text(BytesText::new(text)))?;
    xml.write_event(Event::End(BytesEnd::new("TranslatedText")))?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn unique_strings(df: &DataFrame, column: &str) -> Option<Vec<String>> {
    let actual = df
        .get_column_names()
        .iter()
        .find(|n| n.eq_ignore_ascii_case(column))?
        .to_string();
    let series = df.column(&actual).ok()?;
    let mut values: Vec<String> = Vec::new();
    for idx in 0..df.height() {
        let value = match series.get(idx).ok()? {
            polars::prelude::AnyValue::String(s) => s.to_string(),
            polars::prelude::AnyValue::StringOwned(s) => s.to_string(),
            _ => continue,
        };
        if !value.trim().is_empty() && !values.contains(&value) {
            values.push(value);
        }
    }
    values.sort();
    Some(values)
}
