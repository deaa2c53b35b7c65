use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

use crate::errors::RecordError;

/// Tags that separate words when rendered; they become a space.
fn block_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(p|br|li|ul|ol|div|h[1-6]|tr|td|th|table|blockquote)\b[^>]*>")
            .expect("block tag pattern is valid")
    })
}

/// Remaining tags and entity references; entities are dropped, not decoded.
fn markup_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<.*?>|&([a-z0-9]+|#[0-9]{1,6}|#x[0-9a-f]{1,6});")
            .expect("markup pattern is valid")
    })
}

/// Remove markup and collapse runs of whitespace into single spaces.
///
/// Inline tags vanish without a trace, so punctuation after a highlighted
/// word stays attached to it.
///
/// ```
/// use vacscoll_collector::record::strip_markup;
///
/// assert_eq!(
///     strip_markup("Опыт <highlighttext>Rust</highlighttext> &gt; 3 лет"),
///     "Опыт Rust 3 лет"
/// );
/// assert_eq!(strip_markup("<p>one</p><p>two</p>"), "one two");
/// ```
pub fn strip_markup(raw: &str) -> String {
    let spaced = block_tag_pattern().replace_all(raw, " ");
    let cleaned = markup_pattern().replace_all(&spaced, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    requirement: Option<String>,
    #[serde(default)]
    responsibility: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSalary {
    #[serde(default)]
    from: Option<f64>,
    #[serde(default)]
    to: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVacancy {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    employer: Option<Named>,
    #[serde(default)]
    employment: Option<Named>,
    #[serde(default)]
    experience: Option<Named>,
    #[serde(default)]
    area: Option<Named>,
    #[serde(default)]
    salary: Option<RawSalary>,
    #[serde(default)]
    snippet: Option<Snippet>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    alternate_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Salary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Option<String>,
}

impl fmt::Display for Salary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => write!(f, "{lo}-{hi}")?,
            (Some(lo), None) => write!(f, "from {lo}")?,
            (None, Some(hi)) => write!(f, "up to {hi}")?,
            (None, None) => {}
        }
        if let Some(cur) = &self.currency {
            write!(f, " {cur}")?;
        }
        Ok(())
    }
}

/// Read-only view over one provider item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VacancyRecord {
    id: String,
    title: Option<String>,
    employer: Option<String>,
    employment_type: Option<String>,
    experience: Option<String>,
    location: Option<String>,
    salary: Option<Salary>,
    requirements_text: Option<String>,
    responsibilities_text: Option<String>,
    description: Option<String>,
    detail_url: Option<String>,
}

fn name_of(field: Option<Named>) -> Option<String> {
    field.and_then(|n| n.name)
}

fn cleaned(text: Option<String>) -> Option<String> {
    text.map(|t| strip_markup(&t)).filter(|t| !t.is_empty())
}

fn render_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl VacancyRecord {
    /// Build a record from one provider item (search hit or detail payload).
    pub fn from_item(item: &Value) -> Result<Self, RecordError> {
        match item {
            Value::Null => return Err(RecordError::EmptySource),
            Value::Object(map) if map.is_empty() => return Err(RecordError::EmptySource),
            Value::Object(_) => {}
            other => {
                return Err(RecordError::Malformed(format!(
                    "expected an object, got {}",
                    json_kind(other)
                )))
            }
        }

        let raw: RawVacancy = serde_json::from_value(item.clone())
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        let id = render_id(&raw.id).ok_or(RecordError::MissingId)?;

        let salary = raw
            .salary
            .filter(|s| s.from.is_some() || s.to.is_some())
            .map(|s| Salary {
                min: s.from,
                max: s.to,
                currency: s.currency,
            });
        let snippet = raw.snippet.unwrap_or_default();

        Ok(Self {
            id,
            title: raw.name,
            employer: name_of(raw.employer),
            employment_type: name_of(raw.employment),
            experience: name_of(raw.experience),
            location: name_of(raw.area),
            salary,
            requirements_text: cleaned(snippet.requirement),
            responsibilities_text: cleaned(snippet.responsibility),
            description: cleaned(raw.description),
            detail_url: raw.alternate_url.filter(|u| !u.is_empty()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn employer(&self) -> Option<&str> {
        self.employer.as_deref()
    }

    pub fn employment_type(&self) -> Option<&str> {
        self.employment_type.as_deref()
    }

    pub fn experience(&self) -> Option<&str> {
        self.experience.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn salary(&self) -> Option<&Salary> {
        self.salary.as_ref()
    }

    pub fn requirements_text(&self) -> Option<&str> {
        self.requirements_text.as_deref()
    }

    pub fn responsibilities_text(&self) -> Option<&str> {
        self.responsibilities_text.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn detail_url(&self) -> Option<&str> {
        self.detail_url.as_deref()
    }

    /// A record is shown to users only when it links somewhere.
    pub fn is_deliverable(&self) -> bool {
        self.detail_url.is_some()
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for VacancyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dash = "-";
        writeln!(f, "{}", self.title().unwrap_or(dash))?;
        writeln!(f, "{}", self.employment_type().unwrap_or(dash))?;
        writeln!(f, "Employer: {}", self.employer().unwrap_or(dash))?;
        if let Some(loc) = self.location() {
            writeln!(f, "Location: {loc}")?;
        }
        if let Some(salary) = self.salary() {
            writeln!(f, "Salary: {salary}")?;
        }
        writeln!(f)?;
        writeln!(f, "Requirements:\n{}", self.requirements_text().unwrap_or(dash))?;
        writeln!(f)?;
        writeln!(f, "Responsibilities:\n{}", self.responsibilities_text().unwrap_or(dash))?;
        writeln!(f)?;
        write!(f, "Link: {}", self.detail_url().unwrap_or(dash))
    }
}
