//! UI-agnostic application state types
//!
//! The query controller owns these values and publishes them as a
//! [`Snapshot`]; front ends only ever read them.

use std::collections::VecDeque;
use std::fmt;

use crate::error::QueryError;
use crate::query::{Query, QueryResult};

/// Stable identifier of a chat entry, assigned at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResult {
    Pending,
    Resolved(QueryResult),
}

/// One question and, once it arrives, its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: EntryId,
    pub query: Query,
    pub result: EntryResult,
}

impl ChatEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self.result, EntryResult::Pending)
    }

    pub fn resolved(&self) -> Option<&QueryResult> {
        match &self.result {
            EntryResult::Resolved(result) => Some(result),
            EntryResult::Pending => None,
        }
    }

    /// Condensed text of the answer for the history panel.
    pub fn transcript(&self) -> String {
        let Some(result) = self.resolved() else {
            return "Waiting for response...".to_string();
        };

        let sections: Vec<String> = result
            .sections()
            .into_iter()
            .map(|(heading, text)| format!("{}:\n{}", heading, text))
            .collect();

        if sections.is_empty() {
            "No detailed response available".to_string()
        } else {
            sections.join("\n\n")
        }
    }
}

/// Session chat history, newest entry first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending entry at the front.
    pub fn push_pending(&mut self, id: EntryId, query: Query) {
        self.entries.push_front(ChatEntry {
            id,
            query,
            result: EntryResult::Pending,
        });
    }

    /// Attach a result to a pending entry. Resolved entries are never
    /// touched again; returns false if `id` is unknown or already resolved.
    pub fn resolve(&mut self, id: EntryId, result: QueryResult) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if entry.is_pending() => {
                entry.result = EntryResult::Resolved(result);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: EntryId) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Most recently submitted entry.
    pub fn latest(&self) -> Option<&ChatEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle of the controller's current query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueryState {
    #[default]
    Idle,
    Pending {
        entry: EntryId,
        attempt: u32,
    },
    Succeeded(QueryResult),
    Failed {
        error: QueryError,
        attempts: u32,
    },
}

impl QueryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending { .. })
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            QueryState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            QueryState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Entry currently waiting on the network, if any.
    pub fn in_flight(&self) -> Option<EntryId> {
        match self {
            QueryState::Pending { entry, .. } => Some(*entry),
            _ => None,
        }
    }
}

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: QueryState,
    pub chat_log: ChatLog,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Category, Source};

    fn query(text: &str) -> Query {
        Query::new(text, Category::Ipc, true).unwrap()
    }

    fn result(analysis: &str) -> QueryResult {
        QueryResult {
            legal_analysis: analysis.to_string(),
            additional_context: String::new(),
            punishments_and_fines: String::new(),
            sources: vec![Source {
                name: "IPC Section 378".to_string(),
                url: "https://example.org/378".to_string(),
            }],
            pdf_path: None,
        }
    }

    #[test]
    fn test_newest_first() {
        let mut log = ChatLog::new();
        log.push_pending(EntryId(1), query("first"));
        log.push_pending(EntryId(2), query("second"));

        let ids: Vec<EntryId> = log.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![EntryId(2), EntryId(1)]);
        assert_eq!(log.latest().map(|entry| entry.id), Some(EntryId(2)));
    }

    #[test]
    fn test_resolve_by_id_not_position() {
        let mut log = ChatLog::new();
        log.push_pending(EntryId(1), query("first"));
        log.push_pending(EntryId(2), query("second"));

        assert!(log.resolve(EntryId(1), result("older answer")));
        assert!(log.get(EntryId(2)).unwrap().is_pending());
        assert_eq!(
            log.get(EntryId(1)).unwrap().resolved().map(|r| r.legal_analysis.as_str()),
            Some("older answer")
        );
    }

    #[test]
    fn test_resolved_entry_is_frozen() {
        let mut log = ChatLog::new();
        log.push_pending(EntryId(7), query("question"));
        assert!(log.resolve(EntryId(7), result("answer")));
        assert!(!log.resolve(EntryId(7), result("replacement")));
        assert!(!log.resolve(EntryId(99), result("nobody")));
        assert_eq!(
            log.get(EntryId(7)).unwrap().resolved().unwrap().legal_analysis,
            "answer"
        );
    }

    #[test]
    fn test_transcript() {
        let mut log = ChatLog::new();
        log.push_pending(EntryId(1), query("question"));
        assert_eq!(log.latest().unwrap().transcript(), "Waiting for response...");

        let mut answer = result("Section 378 applies.");
        answer.punishments_and_fines = "Up to 3 years".to_string();
        log.resolve(EntryId(1), answer);
        assert_eq!(
            log.latest().unwrap().transcript(),
            "Legal Analysis:\nSection 378 applies.\n\nPunishments and Fines:\nUp to 3 years"
        );

        log.push_pending(EntryId(2), query("empty"));
        log.resolve(EntryId(2), result(""));
        assert_eq!(
            log.latest().unwrap().transcript(),
            "No detailed response available"
        );
    }

    #[test]
    fn test_query_state_accessors() {
        assert!(!QueryState::Idle.is_pending());
        let pending = QueryState::Pending {
            entry: EntryId(3),
            attempt: 1,
        };
        assert!(pending.is_pending());
        assert_eq!(pending.in_flight(), Some(EntryId(3)));

        let failed = QueryState::Failed {
            error: QueryError::transport("down"),
            attempts: 3,
        };
        assert_eq!(failed.error().map(|e| e.to_string()), Some("down".to_string()));
        assert!(failed.result().is_none());
    }
}
