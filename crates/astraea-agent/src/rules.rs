//! The closed derivation-rule vocabulary.
//!
//! Both the proposing agent and the execution engine speak exactly this
//! vocabulary. The agent's prompt enumerates it; predict-and-prevent
//! rejects anything outside it; the engine dispatches on the parsed rule
//! and refuses unknown keywords.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::AgentError;

/// Every keyword in the vocabulary, for prompt generation and checks.
pub const VOCABULARY_KEYWORDS: &[&str] = &[
    "GENERATE_USUBJID",
    "CONCAT",
    "ISO8601_DATE",
    "ISO8601_DATETIME",
    "ISO8601_PARTIAL_DATE",
    "PARSE_STRING_DATE",
    "MIN_DATE_PER_SUBJECT",
    "MAX_DATE_PER_SUBJECT",
    "RACE_CHECKBOX",
    "NUMERIC_TO_YN",
];

/// A parsed derivation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationRule {
    /// STUDYID + delimiter + SITEID + delimiter + SUBJID.
    GenerateUsubjid,

    /// Concatenate tokens: resolved tokens are columns, others literals.
    Concat(Vec<String>),

    /// SAS numeric date (days since 1960-01-01) to `YYYY-MM-DD`.
    Iso8601Date(String),

    /// SAS numeric datetime (seconds since 1960-01-01) to
    /// `YYYY-MM-DDTHH:MM:SS`.
    Iso8601Datetime(String),

    /// Right-truncating partial date from year/month/day columns.
    Iso8601PartialDate {
        year: Option<String>,
        month: Option<String>,
        day: Option<String>,
    },

    /// Free-text date parsing through the recognized format chain.
    ParseStringDate(String),

    /// Earliest date per USUBJID, joined back to the target frame.
    MinDatePerSubject(String),

    /// Latest date per USUBJID, joined back to the target frame.
    MaxDatePerSubject(String),

    /// Single race term from binary checkbox columns.
    RaceCheckbox(Vec<String>),

    /// 0 to N, 1 to Y, anything else NULL.
    NumericToYn(String),
}

fn call_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(\w+)\s*\((.*)\)$").unwrap_or_else(|_| unreachable!()))
}

impl DerivationRule {
    /// Parse a rule string.
    ///
    /// Accepts `KEYWORD(arg1, arg2, ...)` and bare `KEYWORD`, in which case
    /// the mapping's `source_variable` serves as the implicit argument.
    /// Anything outside the vocabulary is an error.
    pub fn parse(rule: &str, implicit_source: Option<&str>) -> Result<Self, AgentError> {
        let trimmed = rule.trim();

        let (keyword, args) = match call_regex().captures(trimmed) {
            Some(caps) => {
                let keyword = caps[1].to_uppercase();
                let args = split_args(&caps[2]);
                (keyword, args)
            }
            None => (trimmed.to_uppercase(), Vec::new()),
        };

        let single = |args: &[String]| -> Result<String, AgentError> {
            if let Some(first) = args.first() {
                return Ok(first.clone());
            }
            implicit_source
                .map(str::to_string)
                .ok_or_else(|| AgentError::InvalidRuleArguments(format!("{keyword} needs a column")))
        };

        match keyword.as_str() {
            "GENERATE_USUBJID" => Ok(Self::GenerateUsubjid),
            "CONCAT" => {
                if args.len() < 2 {
                    return Err(AgentError::InvalidRuleArguments(
                        "CONCAT needs at least two tokens".to_string(),
                    ));
                }
                Ok(Self::Concat(args))
            }
            "ISO8601_DATE" => Ok(Self::Iso8601Date(single(&args)?)),
            "ISO8601_DATETIME" => Ok(Self::Iso8601Datetime(single(&args)?)),
            "ISO8601_PARTIAL_DATE" => {
                if args.is_empty() || args.len() > 3 {
                    return Err(AgentError::InvalidRuleArguments(
                        "ISO8601_PARTIAL_DATE takes year, month?, day?".to_string(),
                    ));
                }
                let mut parts = args.into_iter().map(|a| {
                    let trimmed = a.trim().to_string();
                    (!trimmed.is_empty() && trimmed != "?").then_some(trimmed)
                });
                Ok(Self::Iso8601PartialDate {
                    year: parts.next().flatten(),
                    month: parts.next().flatten(),
                    day: parts.next().flatten(),
                })
            }
            "PARSE_STRING_DATE" => Ok(Self::ParseStringDate(single(&args)?)),
            "MIN_DATE_PER_SUBJECT" => Ok(Self::MinDatePerSubject(single(&args)?)),
            "MAX_DATE_PER_SUBJECT" => Ok(Self::MaxDatePerSubject(single(&args)?)),
            "RACE_CHECKBOX" => {
                if args.is_empty() {
                    return Err(AgentError::InvalidRuleArguments(
                        "RACE_CHECKBOX needs checkbox columns".to_string(),
                    ));
                }
                Ok(Self::RaceCheckbox(args))
            }
            "NUMERIC_TO_YN" => Ok(Self::NumericToYn(single(&args)?)),
            other => Err(AgentError::UnknownKeyword(other.to_string())),
        }
    }

    /// The keyword this rule dispatches on.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::GenerateUsubjid => "GENERATE_USUBJID",
            Self::Concat(_) => "CONCAT",
            Self::Iso8601Date(_) => "ISO8601_DATE",
            Self::Iso8601Datetime(_) => "ISO8601_DATETIME",
            Self::Iso8601PartialDate { .. } => "ISO8601_PARTIAL_DATE",
            Self::ParseStringDate(_) => "PARSE_STRING_DATE",
            Self::MinDatePerSubject(_) => "MIN_DATE_PER_SUBJECT",
            Self::MaxDatePerSubject(_) => "MAX_DATE_PER_SUBJECT",
            Self::RaceCheckbox(_) => "RACE_CHECKBOX",
            Self::NumericToYn(_) => "NUMERIC_TO_YN",
        }
    }

    /// Whether a rule string uses a vocabulary keyword at all. ASSIGN
    /// constants fail this check and are handled by their pattern instead.
    pub fn looks_like_call(rule: &str) -> bool {
        let trimmed = rule.trim();
        let keyword = match call_regex().captures(trimmed) {
            Some(caps) => caps[1].to_uppercase(),
            None => trimmed.to_uppercase(),
        };
        VOCABULARY_KEYWORDS.contains(&keyword.as_str())
    }
}

impl fmt::Display for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerateUsubjid => write!(f, "GENERATE_USUBJID"),
            Self::Concat(tokens) => write!(f, "CONCAT({})", tokens.join(", ")),
            Self::Iso8601Date(col) => write!(f, "ISO8601_DATE({col})"),
            Self::Iso8601Datetime(col) => write!(f, "ISO8601_DATETIME({col})"),
            Self::Iso8601PartialDate { year, month, day } => {
                let parts: Vec<&str> = [year, month, day]
                    .into_iter()
                    .flat_map(|p| p.as_deref())
                    .collect();
                write!(f, "ISO8601_PARTIAL_DATE({})", parts.join(", "))
            }
            Self::ParseStringDate(col) => write!(f, "PARSE_STRING_DATE({col})"),
            Self::MinDatePerSubject(col) => write!(f, "MIN_DATE_PER_SUBJECT({col})"),
            Self::MaxDatePerSubject(col) => write!(f, "MAX_DATE_PER_SUBJECT({col})"),
            Self::RaceCheckbox(cols) => write!(f, "RACE_CHECKBOX({})", cols.join(", ")),
            Self::NumericToYn(col) => write!(f, "NUMERIC_TO_YN({col})"),
        }
    }
}

/// Split a call's argument list on top-level commas.
fn split_args(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calls_and_bare_keywords() {
        assert_eq!(
            DerivationRule::parse("GENERATE_USUBJID", None).unwrap(),
            DerivationRule::GenerateUsubjid
        );
        assert_eq!(
            DerivationRule::parse("ISO8601_DATE(EXDAT)", None).unwrap(),
            DerivationRule::Iso8601Date("EXDAT".to_string())
        );
        // Bare keyword falls back to the mapping's source variable.
        assert_eq!(
            DerivationRule::parse("PARSE_STRING_DATE", Some("AESTDAT_RAW")).unwrap(),
            DerivationRule::ParseStringDate("AESTDAT_RAW".to_string())
        );
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let err = DerivationRule::parse("MAGIC_FIX(X)", None).unwrap_err();
        assert!(matches!(err, AgentError::UnknownKeyword(k) if k == "MAGIC_FIX"));
    }

    #[test]
    fn partial_date_allows_missing_components() {
        let rule = DerivationRule::parse("ISO8601_PARTIAL_DATE(BRTHYR_YYYY)", None).unwrap();
        assert_eq!(
            rule,
            DerivationRule::Iso8601PartialDate {
                year: Some("BRTHYR_YYYY".to_string()),
                month: None,
                day: None,
            }
        );
    }

    #[test]
    fn concat_requires_two_tokens() {
        assert!(DerivationRule::parse("CONCAT(A)", None).is_err());
        let rule = DerivationRule::parse("CONCAT(STUDYID, -, SUBJID)", None).unwrap();
        assert_eq!(
            rule,
            DerivationRule::Concat(vec![
                "STUDYID".to_string(),
                "-".to_string(),
                "SUBJID".to_string()
            ])
        );
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "GENERATE_USUBJID",
            "CONCAT(A, -, B)",
            "RACE_CHECKBOX(RACEAME, RACEASI)",
            "NUMERIC_TO_YN(AESER_STD)",
        ] {
            let rule = DerivationRule::parse(text, None).unwrap();
            assert_eq!(rule.to_string(), text);
        }
    }

    #[test]
    fn looks_like_call_distinguishes_constants() {
        assert!(DerivationRule::looks_like_call("MIN_DATE_PER_SUBJECT(ex.EXSTDAT)"));
        assert!(!DerivationRule::looks_like_call("SCREENING"));
        assert!(!DerivationRule::looks_like_call("Y"));
    }
}
