//! Submission artifact generation.
//!
//! Transport files with read-back verification, define.xml 2.0, the
//! cSDRG, validation report renderings, the reviewer-facing mapping
//! workbook, and package-level checks.

#![deny(unsafe_code)]

mod csdrg;
mod define_xml;
mod package;
mod validation_report;
mod workbook;
mod xpt;

pub use crate::csdrg::{CsdrgDomainRow, CsdrgInput, pattern_breakdown, render_csdrg};
pub use crate::define_xml::{DefineEntry, DefineXmlOptions, write_define_xml};
pub use crate::package::{PackageManifest, check_package};
pub use crate::validation_report::{render_validation_markdown, write_validation_report};
pub use crate::workbook::{write_mapping_json, write_mapping_workbook};
pub use crate::xpt::write_domain_xpt;
