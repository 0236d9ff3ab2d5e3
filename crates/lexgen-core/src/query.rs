//! Query and answer types exchanged with the query API.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Body of law a question is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    #[default]
    Ipc,
    Cyber,
    Fundamental,
    Motor,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ipc => "IPC",
            Category::Cyber => "CYBER",
            Category::Fundamental => "FUNDAMENTAL",
            Category::Motor => "MOTOR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "IPC" => Some(Category::Ipc),
            "CYBER" => Some(Category::Cyber),
            "FUNDAMENTAL" => Some(Category::Fundamental),
            "MOTOR" => Some(Category::Motor),
            _ => None,
        }
    }

    pub fn all() -> Vec<Category> {
        vec![
            Category::Ipc,
            Category::Cyber,
            Category::Fundamental,
            Category::Motor,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Ipc => "IPC",
            Category::Cyber => "Cyber Laws",
            Category::Fundamental => "Fundamental Rights",
            Category::Motor => "Motor Laws",
        }
    }

    /// Next category in selector order, wrapping around.
    pub fn next(&self) -> Self {
        match self {
            Category::Ipc => Category::Cyber,
            Category::Cyber => Category::Fundamental,
            Category::Fundamental => Category::Motor,
            Category::Motor => Category::Ipc,
        }
    }
}

/// A submitted legal question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    category: Category,
    use_web: bool,
}

impl Query {
    /// Rejects blank text before anything touches the network.
    pub fn new(text: &str, category: Category, use_web: bool) -> Result<Self, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        Ok(Self {
            text: text.to_string(),
            category,
            use_web,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn use_web(&self) -> bool {
        self.use_web
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    CaseLaw,
    Statute,
    Document,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::CaseLaw => "Case law",
            SourceKind::Statute => "Statute",
            SourceKind::Document => "Document",
        }
    }
}

/// A citation backing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        let name = self.name.to_lowercase();
        if name.contains("case") {
            SourceKind::CaseLaw
        } else if name.contains("statute") || name.contains("section") {
            SourceKind::Statute
        } else {
            SourceKind::Document
        }
    }
}

/// Body of a 2xx `/query` response as it arrives on the wire.
///
/// Every field is optional here; [`QueryPayload::validate`] decides whether
/// the answer is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
    #[serde(default)]
    pub legal_analysis: Option<String>,
    #[serde(default)]
    pub additional_context: Option<String>,
    #[serde(default)]
    pub punishments_and_fines: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub pdf_path: Option<String>,
}

fn is_present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|text| !text.is_empty())
}

impl QueryPayload {
    /// A payload is usable when at least one text section is non-empty and a
    /// sources list (possibly empty) is present. Otherwise every absent field
    /// is reported.
    pub fn validate(self) -> Result<QueryResult, QueryError> {
        let has_text = is_present(&self.legal_analysis)
            || is_present(&self.additional_context)
            || is_present(&self.punishments_and_fines);

        match self.sources {
            Some(sources) if has_text => Ok(QueryResult {
                legal_analysis: self.legal_analysis.unwrap_or_default(),
                additional_context: self.additional_context.unwrap_or_default(),
                punishments_and_fines: self.punishments_and_fines.unwrap_or_default(),
                sources,
                pdf_path: self.pdf_path.filter(|path| !path.is_empty()),
            }),
            sources => {
                let mut missing = Vec::new();
                if !is_present(&self.legal_analysis) {
                    missing.push("legal_analysis");
                }
                if !is_present(&self.additional_context) {
                    missing.push("additional_context");
                }
                if !is_present(&self.punishments_and_fines) {
                    missing.push("punishments_and_fines");
                }
                if sources.is_none() {
                    missing.push("sources");
                }
                Err(QueryError::MissingFields(missing))
            }
        }
    }
}

/// A validated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub legal_analysis: String,
    pub additional_context: String,
    pub punishments_and_fines: String,
    pub sources: Vec<Source>,
    pub pdf_path: Option<String>,
}

impl QueryResult {
    /// Non-empty text sections with their headings, in display order.
    pub fn sections(&self) -> Vec<(&'static str, &str)> {
        [
            ("Legal Analysis", self.legal_analysis.as_str()),
            ("Additional Context", self.additional_context.as_str()),
            ("Punishments and Fines", self.punishments_and_fines.as_str()),
        ]
        .into_iter()
        .filter(|(_, text)| !text.is_empty())
        .collect()
    }

    /// Final path component of `pdf_path`, which is what the download
    /// endpoint expects.
    pub fn pdf_filename(&self) -> Option<&str> {
        self.pdf_path
            .as_deref()
            .and_then(|path| path.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
    }
}
