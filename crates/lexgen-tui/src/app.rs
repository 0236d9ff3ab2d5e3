use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

use lexgen_core::artifact::{self, PdfPreview, PreviewSlot};
use lexgen_core::{
    ApiClient, Category, Config, EntryId, QueryController, QueryError, QueryResult, Snapshot,
    Source,
};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Input,
    History,
    Sources,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Input => FocusPane::History,
            FocusPane::History => FocusPane::Sources,
            FocusPane::Sources => FocusPane::Input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

/// Modal message; blocks other input until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

/// What a finished PDF task produced.
pub enum PdfOutcome {
    Preview(PdfPreview),
    Downloaded(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfAction {
    Preview,
    Download,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Query form
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input (chars)
    pub category: Category,
    pub use_web: bool,

    // Controller and the last snapshot it published
    pub controller: Arc<QueryController>,
    snapshot_rx: watch::Receiver<Snapshot>,
    pub snapshot: Snapshot,
    pub query_task: Option<JoinHandle<Result<QueryResult, QueryError>>>,

    // Chat history panel
    pub history_state: ListState,
    pub expanded: HashSet<EntryId>,

    // Response and sources panels
    pub response_scroll: u16,
    pub sources_state: ListState,

    // PDF artifacts
    pub pdf_task: Option<(PdfAction, JoinHandle<Result<PdfOutcome, QueryError>>)>,
    pub preview: PreviewSlot,
    pub download_dir: PathBuf,

    // Preferences, written back when the form controls change
    pub config: Config,
    pub config_path: Option<PathBuf>,

    pub notification: Option<Notification>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub history_area: Option<Rect>,
    pub response_area: Option<Rect>,
    pub sources_area: Option<Rect>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let controller = Arc::new(QueryController::new(Arc::new(ApiClient::default())));
        let mut app = Self::with_controller(config, controller);
        app.config_path = Config::get_config_path().ok();
        app
    }

    pub fn with_controller(config: &Config, controller: Arc<QueryController>) -> Self {
        let snapshot_rx = controller.subscribe();
        let snapshot = snapshot_rx.borrow().clone();

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            query_input: String::new(),
            query_cursor: 0,
            category: config.default_category,
            use_web: config.use_web,

            controller,
            snapshot_rx,
            snapshot,
            query_task: None,

            history_state: ListState::default(),
            expanded: HashSet::new(),

            response_scroll: 0,
            sources_state: ListState::default(),

            pdf_task: None,
            preview: PreviewSlot::new(),
            download_dir: config.download_dir(),

            config: config.clone(),
            config_path: None,

            notification: None,

            animation_frame: 0,

            history_area: None,
            response_area: None,
            sources_area: None,
        }
    }

    /// True while a query is outstanding; the form is locked meanwhile.
    pub fn is_busy(&self) -> bool {
        self.query_task.is_some() || self.snapshot.state.is_pending()
    }

    pub fn current_result(&self) -> Option<&QueryResult> {
        self.snapshot.state.result()
    }

    pub fn can_submit(&self) -> bool {
        !self.is_busy() && !self.query_input.trim().is_empty()
    }

    /// Hand the form contents to the controller on a background task.
    pub fn submit_query(&mut self) -> bool {
        if !self.can_submit() {
            return false;
        }

        let text = std::mem::take(&mut self.query_input);
        self.query_cursor = 0;
        self.response_scroll = 0;
        self.sources_state.select(None);
        self.preview.close();
        // A fetch still running belongs to the previous answer
        if let Some((action, task)) = self.pdf_task.take() {
            task.abort();
            info!(?action, "dropped pdf request for previous answer");
        }

        let controller = self.controller.clone();
        let category = self.category;
        let use_web = self.use_web;
        self.query_task = Some(tokio::spawn(async move {
            controller.submit(&text, category, use_web).await
        }));
        true
    }

    /// Pull the newest controller snapshot, if it changed.
    pub fn refresh_snapshot(&mut self) {
        if self.snapshot_rx.has_changed().unwrap_or(false) {
            self.snapshot = self.snapshot_rx.borrow_and_update().clone();
            self.clamp_selections();
        }
    }

    fn clamp_selections(&mut self) {
        let history_len = self.snapshot.chat_log.len();
        if history_len == 0 {
            self.history_state.select(None);
        } else if self.history_state.selected().map_or(true, |i| i >= history_len) {
            self.history_state.select(Some(0));
        }

        let sources_len = self.current_result().map_or(0, |r| r.sources.len());
        if sources_len == 0 {
            self.sources_state.select(None);
        } else if self.sources_state.selected().map_or(true, |i| i >= sources_len) {
            self.sources_state.select(Some(0));
        }
    }

    /// Collect finished background tasks.
    pub async fn poll_tasks(&mut self) {
        if self.query_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.query_task.take() {
                match task.await {
                    Ok(Ok(_)) => info!("query finished"),
                    // The controller already published the failure
                    Ok(Err(e)) => warn!(error = %e, "query finished with error"),
                    Err(e) => self.notify_error("Query failed", e.to_string()),
                }
            }
        }

        if self.pdf_task.as_ref().is_some_and(|(_, task)| task.is_finished()) {
            if let Some((action, task)) = self.pdf_task.take() {
                let outcome = task
                    .await
                    .unwrap_or_else(|e| Err(QueryError::artifact(e.to_string())));
                self.finish_pdf(action, outcome);
            }
        }

        self.refresh_snapshot();
    }

    fn finish_pdf(&mut self, action: PdfAction, outcome: Result<PdfOutcome, QueryError>) {
        match outcome {
            Ok(PdfOutcome::Preview(preview)) => {
                let preview = self.preview.open(preview);
                open_in_viewer(preview.path());
            }
            Ok(PdfOutcome::Downloaded(path)) => {
                self.notification = Some(Notification {
                    kind: NotificationKind::Info,
                    title: "PDF downloaded".to_string(),
                    message: format!("Saved to {}", path.display()),
                });
            }
            Err(e) => {
                warn!(error = %e, ?action, "pdf request failed");
                let message = match action {
                    PdfAction::Preview => "Failed to load PDF. Please try again.",
                    PdfAction::Download => "Failed to download PDF. Please try again.",
                };
                self.notify_error("PDF error", format!("{}\n\n{}", message, e));
            }
        }
    }

    /// Start fetching the current answer's PDF for preview or download.
    pub fn request_pdf(&mut self, action: PdfAction) {
        if self.pdf_task.is_some() {
            return;
        }
        let Some(result) = self.current_result().cloned() else {
            return;
        };
        if result.pdf_filename().is_none() {
            return;
        }

        let backend = self.controller.backend();
        let download_dir = self.download_dir.clone();
        let task = tokio::spawn(async move {
            match action {
                PdfAction::Preview => artifact::preview_pdf(backend.as_ref(), &result)
                    .await
                    .map(PdfOutcome::Preview),
                PdfAction::Download => artifact::download_pdf(backend.as_ref(), &result, &download_dir)
                    .await
                    .map(PdfOutcome::Downloaded),
            }
        });
        self.pdf_task = Some((action, task));
    }

    pub fn close_preview(&mut self) {
        self.preview.close();
    }

    pub fn notify_error(&mut self, title: &str, message: String) {
        self.notification = Some(Notification {
            kind: NotificationKind::Error,
            title: title.to_string(),
            message,
        });
    }

    pub fn cycle_category(&mut self) {
        if !self.is_busy() {
            self.category = self.category.next();
            self.save_preferences();
        }
    }

    pub fn toggle_web(&mut self) {
        if !self.is_busy() {
            self.use_web = !self.use_web;
            self.save_preferences();
        }
    }

    /// Remember the form controls as the defaults for the next session.
    fn save_preferences(&mut self) {
        self.config.default_category = self.category;
        self.config.use_web = self.use_web;

        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = self.config.save_to(path) {
            warn!(error = %e, path = %path.display(), "could not save preferences");
        }
    }

    // History navigation

    pub fn history_nav_down(&mut self) {
        let len = self.snapshot.chat_log.len();
        if len == 0 {
            return;
        }
        let i = self.history_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.history_state.select(Some(i));
    }

    pub fn history_nav_up(&mut self) {
        if self.snapshot.chat_log.is_empty() {
            return;
        }
        let i = self.history_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.history_state.select(Some(i));
    }

    pub fn selected_entry_id(&self) -> Option<EntryId> {
        self.history_state
            .selected()
            .and_then(|i| self.snapshot.chat_log.iter().nth(i))
            .map(|entry| entry.id)
    }

    /// Expand or collapse the selected entry. Pending entries have nothing
    /// to expand.
    pub fn toggle_selected_entry(&mut self) {
        let Some(id) = self.selected_entry_id() else {
            return;
        };
        let resolved = self
            .snapshot
            .chat_log
            .get(id)
            .is_some_and(|entry| !entry.is_pending());
        if !resolved {
            return;
        }
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
    }

    // Sources navigation

    pub fn sources_nav_down(&mut self) {
        let len = self.current_result().map_or(0, |r| r.sources.len());
        if len == 0 {
            return;
        }
        let i = self.sources_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.sources_state.select(Some(i));
    }

    pub fn sources_nav_up(&mut self) {
        let len = self.current_result().map_or(0, |r| r.sources.len());
        if len == 0 {
            return;
        }
        let i = self.sources_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.sources_state.select(Some(i));
    }

    pub fn selected_source(&self) -> Option<&Source> {
        let i = self.sources_state.selected()?;
        self.current_result()?.sources.get(i)
    }

    pub fn scroll_response_down(&mut self, lines: u16) {
        self.response_scroll = self.response_scroll.saturating_add(lines);
    }

    pub fn scroll_response_up(&mut self, lines: u16) {
        self.response_scroll = self.response_scroll.saturating_sub(lines);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() || self.pdf_task.is_some() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Hand a file to the platform's default viewer.
fn open_in_viewer(path: &std::path::Path) {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    let mut command = Command::new(opener);
    command.arg(path);
    if let Err(e) = spawn_reaped(command) {
        warn!(error = %e, opener, "could not launch pdf viewer");
    }
}

/// Start a helper process and wait on it from a background thread so it
/// never lingers as a zombie.
fn spawn_reaped(mut command: Command) -> io::Result<thread::JoinHandle<io::Result<ExitStatus>>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(thread::spawn(move || child.wait()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexgen_core::{Query, QueryState, RetryPolicy};
    use std::time::Duration;

    fn offline_app() -> App {
        // Nothing listens on the discard port; requests fail fast.
        let backend = Arc::new(ApiClient::new("http://127.0.0.1:9"));
        let controller = Arc::new(QueryController::with_policy(
            backend,
            RetryPolicy {
                max_retries: 1,
                delay: Duration::from_millis(1),
            },
        ));
        App::with_controller(&Config::default(), controller)
    }

    #[tokio::test]
    async fn test_blank_input_not_submitted() {
        let mut app = offline_app();
        app.query_input = "   ".to_string();
        assert!(!app.submit_query());
        assert!(app.query_task.is_none());
    }

    #[tokio::test]
    async fn test_failed_query_surfaces_error_and_unlocks_form() {
        let mut app = offline_app();
        app.query_input = "What is Section 66A?".to_string();
        app.query_cursor = app.query_input.chars().count();

        assert!(app.submit_query());
        assert!(app.query_input.is_empty());
        assert!(app.is_busy());
        assert!(!app.submit_query());

        if let Some(task) = app.query_task.as_mut() {
            let _ = task.await;
        }
        app.query_task = None;
        app.refresh_snapshot();

        assert!(!app.is_busy());
        assert!(matches!(
            app.snapshot.state,
            QueryState::Failed { attempts: 1, .. }
        ));
        assert_eq!(app.snapshot.chat_log.len(), 1);
        assert_eq!(app.history_state.selected(), Some(0));
    }

    #[tokio::test]
    async fn test_form_toggles() {
        let mut app = offline_app();
        assert_eq!(app.category, Category::Ipc);
        app.cycle_category();
        assert_eq!(app.category, Category::Cyber);
        assert!(app.use_web);
        app.toggle_web();
        assert!(!app.use_web);
        assert_eq!(app.focus.next(), FocusPane::History);
    }

    #[tokio::test]
    async fn test_download_failure_notifies() {
        let config = Config::default();
        let controller = Arc::new(QueryController::new(Arc::new(ApiClient::default())));
        let mut app = App::with_controller(&config, controller);

        app.finish_pdf(
            PdfAction::Download,
            Err(QueryError::artifact("Empty PDF response received")),
        );
        let notification = app.notification.clone().unwrap();
        assert_eq!(notification.kind, NotificationKind::Error);
        assert!(notification.message.starts_with("Failed to download PDF. Please try again."));
        assert!(notification.message.contains("Empty PDF response received"));
        assert!(!app.preview.is_open());
    }

    fn answer() -> QueryResult {
        QueryResult {
            legal_analysis: "Theft is covered by Section 378.".to_string(),
            additional_context: String::new(),
            punishments_and_fines: "Up to three years.".to_string(),
            sources: vec![Source {
                name: "IPC Section 379".to_string(),
                url: "https://example.org/ipc/379".to_string(),
            }],
            pdf_path: Some("pdfs/response_1.pdf".to_string()),
        }
    }

    fn question(text: &str) -> Query {
        Query::new(text, Category::Ipc, true).unwrap()
    }

    #[tokio::test]
    async fn test_expansion_follows_entry_id() {
        let mut app = offline_app();
        app.snapshot.chat_log.push_pending(EntryId(1), question("first"));
        app.history_state.select(Some(0));

        // Nothing to expand until the answer arrives
        app.toggle_selected_entry();
        assert!(app.expanded.is_empty());

        app.snapshot.chat_log.resolve(EntryId(1), answer());
        app.toggle_selected_entry();
        assert!(app.expanded.contains(&EntryId(1)));

        // A newer entry pushes the expanded one down a row
        app.snapshot.chat_log.push_pending(EntryId(2), question("second"));
        assert_eq!(app.selected_entry_id(), Some(EntryId(2)));
        app.toggle_selected_entry();
        assert_eq!(app.expanded.len(), 1);
        assert!(app.expanded.contains(&EntryId(1)));

        app.history_nav_down();
        assert_eq!(app.selected_entry_id(), Some(EntryId(1)));
        app.toggle_selected_entry();
        assert!(app.expanded.is_empty());
    }

    #[tokio::test]
    async fn test_submit_drops_pdf_request_for_previous_answer() {
        let mut app = offline_app();
        let stale = tokio::spawn(async {
            std::future::pending::<Result<PdfOutcome, QueryError>>().await
        });
        let abort = stale.abort_handle();
        app.pdf_task = Some((PdfAction::Preview, stale));

        app.query_input = "What is Section 420?".to_string();
        assert!(app.submit_query());
        assert!(app.pdf_task.is_none());

        for _ in 0..10 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
        assert!(!app.preview.is_open());
    }

    #[tokio::test]
    async fn test_form_changes_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexgen").join("config.json");
        let mut app = offline_app();
        app.config_path = Some(path.clone());

        app.cycle_category();
        app.toggle_web();

        let saved = Config::load_from(&path).unwrap();
        assert_eq!(saved.default_category, Category::Cyber);
        assert!(!saved.use_web);
        assert_eq!(app.config, saved);
    }

    #[tokio::test]
    async fn test_form_changes_without_path_stay_in_memory() {
        let mut app = offline_app();
        assert!(app.config_path.is_none());
        app.cycle_category();
        assert_eq!(app.config.default_category, Category::Cyber);
    }

    #[test]
    fn test_viewer_process_is_reaped() {
        let waiter = spawn_reaped(Command::new("true")).unwrap();
        let status = waiter.join().unwrap().unwrap();
        assert!(status.success());

        assert!(spawn_reaped(Command::new("lexgen-missing-viewer")).is_err());
    }
}
