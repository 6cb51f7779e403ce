use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::export::{EMPTY_SET_MESSAGE, csv_bytes_with_bom, export_filename};
use crate::reader::{ChapterView, ReaderSession, RenderedChapter, SwitchOutcome};
use crate::selection::{EMPTY_SIDEBAR_MESSAGE, SelectionEntry, SelectionStore};
use crate::submission::{SubmissionDraft, SubmissionError, SubmissionQueue, thank_you_message};
use crate::vocab::VocabularyEntry;
use askama::Html as HtmlEscaper;
use askama::{MarkupDisplay, Template};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
type SafeMarkup = MarkupDisplay<HtmlEscaper, String>;

const CONFIRM_CLEAR_MESSAGE: &str = "Willst du wirklich alle Wörter aus deinem Set löschen?";

pub struct AppState {
    pub session: ReaderSession,
    pub queue: Arc<dyn SubmissionQueue>,
    pub max_chapter: u32,
    pub theme: WebTheme,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WebTheme {
    #[default]
    Tailwind,
    Bootstrap,
}

impl fmt::Display for WebTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebTheme::Tailwind => write!(f, "tailwind"),
            WebTheme::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

impl FromStr for WebTheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tailwind" => Ok(WebTheme::Tailwind),
            "bootstrap" => Ok(WebTheme::Bootstrap),
            other => Err(format!("unknown theme {other:?} (expected tailwind or bootstrap)")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    layout_class: &'static str,
    headline_class: &'static str,
    text_class: &'static str,
    panel_class: &'static str,
    button_class: &'static str,
    input_class: &'static str,
    error_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-stone-50 text-stone-900",
                main_class: "min-h-screen py-8 px-4",
                layout_class: "mx-auto max-w-6xl grid gap-6 lg:grid-cols-[1fr_20rem]",
                headline_class: "text-3xl font-bold tracking-tight",
                text_class: "prose prose-stone max-w-none leading-relaxed space-y-4",
                panel_class: "rounded-lg bg-white shadow p-4 space-y-3",
                button_class: "inline-flex items-center rounded-md bg-stone-900 px-3 py-1.5 text-white text-sm font-semibold hover:bg-stone-700",
                input_class: "w-full rounded border border-stone-300 px-2 py-1",
                error_class: "rounded-md bg-red-50 border border-red-200 text-red-800 p-4",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-4",
                layout_class: "row g-4",
                headline_class: "display-6 fw-bold",
                text_class: "col-lg-8 lh-lg",
                panel_class: "card card-body mb-3",
                button_class: "btn btn-dark btn-sm",
                input_class: "form-control form-control-sm mb-2",
                error_class: "alert alert-danger",
            },
        }
    }
}

#[derive(Clone, Default)]
pub struct WebConfig {
    pub reader: ReaderConfig,
    pub theme: WebTheme,
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let reader = &config.reader;
    let selection = reader.selection_store();
    info!(
        words = selection.len(),
        dir = %reader.selection_dir().display(),
        "loaded saved word set"
    );
    let session = ReaderSession::new(Arc::new(reader.chapter_source()), selection);
    let state = Arc::new(AppState {
        session,
        queue: Arc::new(reader.submission_queue()),
        max_chapter: reader.max_chapter,
        theme: config.theme,
        base_url: reader.base_url.clone(),
    });
    let router = build_router(state);
    info!(
        addr = %reader.addr,
        theme = %config.theme,
        data = %reader.data_dir.display(),
        base = %reader.base_url,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(reader.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    draft: Option<SubmissionDraft>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            draft: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Hands the form input back so the client can restore it.
    fn with_draft(mut self, draft: SubmissionDraft) -> Self {
        self.draft = Some(draft);
        self
    }
}

fn reader_error_status(err: &ReaderError) -> StatusCode {
    match err {
        ReaderError::DataUnavailable { .. } => StatusCode::NOT_FOUND,
        ReaderError::PreconditionFailed(_) | ReaderError::SubmissionRejected(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ReaderError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<ReaderError> for ApiError {
    fn from(err: ReaderError) -> Self {
        Self::new(reader_error_status(&err), err.inline_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = match self.draft {
            Some(draft) => json!({ "error": self.message, "draft": draft }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/chapter", get(chapter_html))
        .route("/api/chapter", get(api_chapter))
        .route("/api/selection", get(api_selection))
        .route("/api/selection/toggle", post(api_toggle))
        .route("/api/selection/add", post(api_add))
        .route("/api/selection/clear", post(api_clear))
        .route("/export.csv", get(export_csv))
        .route("/api/submissions", post(api_submit))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn home() -> Redirect {
    Redirect::to("/chapter?n=1")
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "readgloss-web" }))
}

#[derive(Debug, Deserialize)]
struct ChapterParams {
    n: Option<u32>,
}

impl ChapterParams {
    fn chapter(&self) -> u32 {
        self.n.unwrap_or(1)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChapterPayload {
    chapter: u32,
    markers: usize,
    html: String,
    vocabulary: Vec<VocabularyEntry>,
}

impl ChapterPayload {
    fn from_rendered(rendered: &RenderedChapter) -> Self {
        Self {
            chapter: rendered.chapter,
            markers: rendered.marker_count,
            html: rendered.html.clone(),
            vocabulary: rendered.vocabulary.entries().to_vec(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectionPayload {
    count: usize,
    entries: Vec<SelectionEntry>,
}

impl SelectionPayload {
    fn from_store(store: &SelectionStore) -> Self {
        Self {
            count: store.len(),
            entries: store.snapshot().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MutationResponse<T> {
    word: String,
    outcome: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Set when the in-memory change could not be saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    selection: SelectionPayload,
}

#[derive(Debug, Deserialize)]
struct WordBody {
    word: String,
}

impl WordBody {
    fn word(&self) -> Result<&str, ApiError> {
        let word = self.word.trim();
        if word.is_empty() {
            return Err(ApiError::bad_request("word must not be empty"));
        }
        Ok(word)
    }
}

#[derive(Debug, Deserialize)]
struct ClearBody {
    #[serde(default)]
    confirm: bool,
}

async fn chapter_html(
    State(state): State<SharedState>,
    Query(params): Query<ChapterParams>,
) -> impl IntoResponse {
    let chapter = params.chapter();
    let (status, view) = match state.session.switch_chapter(chapter).await {
        SwitchOutcome::Rendered(rendered) => (StatusCode::OK, ChapterView::Ready(rendered)),
        SwitchOutcome::Failed(err) => (
            reader_error_status(&err),
            ChapterView::Failed {
                chapter,
                message: err.inline_message(),
            },
        ),
        // A newer request owns the page now; show whatever it produced.
        SwitchOutcome::Stale { .. } => (StatusCode::OK, state.session.view()),
    };
    let selection = state
        .session
        .with_state(|reader| reader.selection().snapshot().to_vec());
    (status, Html(render_reader_page(&state, &view, selection)))
}

async fn api_chapter(
    State(state): State<SharedState>,
    Query(params): Query<ChapterParams>,
) -> Result<Json<ChapterPayload>, ApiError> {
    match state.session.switch_chapter(params.chapter()).await {
        SwitchOutcome::Rendered(rendered) => Ok(Json(ChapterPayload::from_rendered(&rendered))),
        SwitchOutcome::Failed(err) => Err(err.into()),
        SwitchOutcome::Stale { chapter } => Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("request for chapter {chapter} was superseded by a newer one"),
        )),
    }
}

async fn api_selection(State(state): State<SharedState>) -> Json<SelectionPayload> {
    Json(
        state
            .session
            .with_state(|reader| SelectionPayload::from_store(reader.selection())),
    )
}

async fn api_toggle(
    State(state): State<SharedState>,
    Json(body): Json<WordBody>,
) -> Result<impl IntoResponse, ApiError> {
    let word = body.word()?;
    let (change, selection) = state.session.with_state(|reader| {
        let change = reader.toggle_word(word);
        (change, SelectionPayload::from_store(reader.selection()))
    });
    let change = change.ok_or_else(|| {
        ApiError::not_found(format!(
            "\"{word}\" steht nicht im Vokabular dieses Kapitels."
        ))
    })?;
    Ok(Json(MutationResponse {
        word: word.to_string(),
        outcome: change.outcome,
        message: None,
        warning: change.warning().map(|err| err.inline_message()),
        selection,
    }))
}

async fn api_add(
    State(state): State<SharedState>,
    Json(body): Json<WordBody>,
) -> Result<impl IntoResponse, ApiError> {
    let word = body.word()?;
    let (change, selection) = state.session.with_state(|reader| {
        let change = reader.add_word(word);
        (change, SelectionPayload::from_store(reader.selection()))
    });
    Ok(Json(MutationResponse {
        word: word.to_string(),
        outcome: change.outcome,
        message: change.outcome.message(word),
        warning: change.warning().map(|err| err.inline_message()),
        selection,
    }))
}

async fn api_clear(
    State(state): State<SharedState>,
    Json(body): Json<ClearBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !body.confirm {
        return Err(ApiError::bad_request(
            "clearing the word set requires \"confirm\": true",
        ));
    }
    let (change, selection) = state.session.with_state(|reader| {
        let change = reader.clear_selection();
        (change, SelectionPayload::from_store(reader.selection()))
    });
    info!(removed = change.outcome, "word set cleared");
    Ok(Json(json!({
        "removed": change.outcome,
        "warning": change.warning().map(|err| err.inline_message()),
        "selection": selection,
    })))
}

async fn export_csv(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let entries = state
        .session
        .with_state(|reader| reader.selection().snapshot().to_vec());
    let body = csv_bytes_with_bom(&entries)
        .ok_or_else(|| ApiError::new(StatusCode::CONFLICT, EMPTY_SET_MESSAGE))?;
    let filename = export_filename(chrono::Local::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn api_submit(
    State(state): State<SharedState>,
    Json(draft): Json<SubmissionDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let record = match draft.validate(state.max_chapter, chrono::Utc::now()) {
        Ok(record) => record,
        Err(err) => {
            return Err(
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).with_draft(draft),
            );
        }
    };
    if let Err(err) = state.queue.enqueue(&record).await {
        warn!(error = %err, word = %record.word, "submission could not be queued");
        let status = match err {
            SubmissionError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SubmissionError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        let message = ReaderError::from(err).inline_message();
        return Err(ApiError::new(status, message).with_draft(draft));
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": thank_you_message(&record.word),
            "record": record,
        })),
    ))
}

struct ChapterOption {
    number: u32,
    selected: bool,
}

/// JSON for a `<script type="application/json">` block; `<`, `>` and `&` are escaped so
/// the payload cannot close the element.
fn script_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn page_data(chapter: u32, rendered: Option<&RenderedChapter>) -> String {
    let vocabulary: BTreeMap<String, serde_json::Value> = rendered
        .map(|rendered| {
            rendered
                .vocabulary
                .entries()
                .iter()
                .map(|entry| {
                    (
                        entry.canonical(),
                        json!({
                            "word": entry.word,
                            "native": entry.definition_native,
                            "foreign": entry.definition_foreign,
                            "context": entry.context_snippet,
                        }),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    script_json(&json!({
        "chapter": chapter,
        "vocabulary": vocabulary,
        "messages": {
            "emptySidebar": EMPTY_SIDEBAR_MESSAGE,
            "emptySet": EMPTY_SET_MESSAGE,
            "confirmClear": CONFIRM_CLEAR_MESSAGE,
        },
    }))
}

fn render_reader_page(state: &AppState, view: &ChapterView, selection: Vec<SelectionEntry>) -> String {
    let chapter = view.chapter().unwrap_or(1);
    let (has_text, text_html, status_message) = match view {
        ChapterView::Ready(rendered) => (true, rendered.html.clone(), String::new()),
        ChapterView::Failed { message, .. } => (false, String::new(), message.clone()),
        ChapterView::Loading { chapter } => {
            (false, String::new(), format!("Kapitel {chapter} wird geladen…"))
        }
        ChapterView::Empty => (false, String::new(), String::new()),
    };
    let rendered = match view {
        ChapterView::Ready(rendered) => Some(rendered.as_ref()),
        _ => None,
    };
    let template = ReaderTemplate {
        chrome: Chrome::new(state.theme),
        chapter,
        chapters: (1..=state.max_chapter)
            .map(|number| ChapterOption {
                number,
                selected: number == chapter,
            })
            .collect(),
        has_text,
        text_html: MarkupDisplay::new_safe(text_html, HtmlEscaper),
        status_message,
        selection_count: selection.len(),
        selection,
        empty_message: EMPTY_SIDEBAR_MESSAGE,
        page_data: MarkupDisplay::new_safe(page_data(chapter, rendered), HtmlEscaper),
        canonical_url: format!("{}/chapter?n={chapter}", state.base_url.trim_end_matches('/')),
    };
    template
        .render()
        .unwrap_or_else(|err| render_error_page(state.theme, err.to_string()))
}

fn render_error_page(theme: WebTheme, message: impl Into<String>) -> String {
    let chrome = Chrome::new(theme);
    let message = crate::annotate::escape_html(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="de">
  <head>
    <meta charset="utf-8" />
    <title>Fehler</title>
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{error_class}">{message}</div>
      <a href="/" class="{button_class}">Zurück</a>
    </main>
  </body>
</html>"#,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        error_class = chrome.error_class,
        button_class = chrome.button_class,
    )
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="de">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Kapitel {{ chapter }}</title>
    <link rel="canonical" href="{{ canonical_url }}">
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    {% endif %}
    <style>
      .vocab-word { border-bottom: 1px dotted #a8a29e; cursor: pointer; }
      .vocab-word:hover { background: #fef3c7; }
      .vocab-word.selected { background: #fde68a; }
      #definition-panel[hidden], #flash[hidden] { display: none; }
    </style>
    <script type="application/json" id="page-data">{{ page_data }}</script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.layout_class }}">
        <section>
          <header class="mb-6 flex items-center gap-3">
            <h1 class="{{ chrome.headline_class }}">Kapitel {{ chapter }}</h1>
            <label for="chapter-select" class="sr-only">Kapitel wählen</label>
            <select id="chapter-select" class="{{ chrome.input_class }}" style="max-width: 12rem">
              {% for option in chapters %}
              <option value="{{ option.number }}"{% if option.selected %} selected{% endif %}>Kapitel {{ option.number }}</option>
              {% endfor %}
            </select>
          </header>
          <p id="flash" class="{{ chrome.error_class }}" hidden></p>
          {% if has_text %}
          <article id="chapter-text" class="{{ chrome.text_class }}">{{ text_html }}</article>
          {% else %}
          <div id="chapter-text" class="{{ chrome.error_class }}">{{ status_message }}</div>
          {% endif %}
        </section>
        <aside class="space-y-4">
          <div id="definition-panel" class="{{ chrome.panel_class }}" hidden>
            <h2 id="definition-word" class="font-semibold text-lg"></h2>
            <p><strong>DE:</strong> <span id="definition-native"></span></p>
            <p><strong>EN:</strong> <span id="definition-foreign"></span></p>
            <p id="definition-context" class="italic text-sm"></p>
            <button type="button" id="definition-add" class="{{ chrome.button_class }}">Zum Set hinzufügen</button>
          </div>
          <div class="{{ chrome.panel_class }}">
            <h2 class="font-semibold text-lg">Mein Vokabel-Set <span id="selection-count">{{ selection_count }}</span></h2>
            <p id="selection-empty"{% if selection_count > 0 %} hidden{% endif %}>{{ empty_message }}</p>
            <ul id="selection-list" class="space-y-2">
              {% for entry in selection %}
              <li data-word="{{ entry.word }}"><strong>{{ entry.word }}</strong><br>{{ entry.definition_native }}<br><em>{{ entry.definition_foreign }}</em></li>
              {% endfor %}
            </ul>
            <div class="flex gap-2">
              <a id="export-link" href="/export.csv" class="{{ chrome.button_class }}">CSV exportieren</a>
              <button type="button" id="clear-selection" class="{{ chrome.button_class }}">Set leeren</button>
            </div>
          </div>
          <form id="submission-form" class="{{ chrome.panel_class }}">
            <h2 class="font-semibold text-lg">Neues Wort vorschlagen</h2>
            <input name="word" placeholder="Wort" class="{{ chrome.input_class }}">
            <input name="definition_native" placeholder="DE Definition" class="{{ chrome.input_class }}">
            <input name="definition_foreign" placeholder="EN Definition" class="{{ chrome.input_class }}">
            <input name="context_snippet" placeholder="Satz aus dem Text (optional)" class="{{ chrome.input_class }}">
            <input type="hidden" name="chapter" value="{{ chapter }}">
            <button type="submit" class="{{ chrome.button_class }}">Senden</button>
            <p id="submission-status" class="text-sm"></p>
          </form>
        </aside>
      </div>
    </main>
    <script>
      (function () {
        const data = JSON.parse(document.getElementById("page-data").textContent);
        const flash = document.getElementById("flash");
        const panel = document.getElementById("definition-panel");
        let current = null;

        function showFlash(message) {
          flash.textContent = message;
          flash.hidden = !message;
        }

        async function postJson(url, body) {
          const response = await fetch(url, {
            method: "POST",
            headers: { "Content-Type": "application/json" },
            body: JSON.stringify(body),
          });
          const payload = await response.json().catch(() => ({}));
          return { ok: response.ok, payload };
        }

        function renderSelection(selection) {
          const list = document.getElementById("selection-list");
          list.replaceChildren();
          const chosen = new Set();
          for (const entry of selection.entries) {
            chosen.add(entry.word);
            const item = document.createElement("li");
            item.dataset.word = entry.word;
            const word = document.createElement("strong");
            word.textContent = entry.word;
            const foreign = document.createElement("em");
            foreign.textContent = entry.definition_foreign;
            item.append(word, document.createElement("br"), entry.definition_native,
              document.createElement("br"), foreign);
            list.append(item);
          }
          document.getElementById("selection-count").textContent = selection.count;
          document.getElementById("selection-empty").hidden = selection.count > 0;
          document.querySelectorAll(".vocab-word").forEach((marker) => {
            marker.classList.toggle("selected", chosen.has(marker.dataset.word));
          });
        }

        function afterMutation(result) {
          if (!result.ok) {
            showFlash(result.payload.error || "");
            return;
          }
          showFlash(result.payload.warning || result.payload.message || "");
          renderSelection(result.payload.selection);
        }

        document.getElementById("chapter-select").addEventListener("change", (event) => {
          window.location = "/chapter?n=" + event.target.value;
        });

        const text = document.getElementById("chapter-text");
        text.addEventListener("mouseover", (event) => {
          const marker = event.target.closest(".vocab-word");
          if (!marker) return;
          const entry = data.vocabulary[marker.dataset.word];
          if (!entry) return;
          current = marker.dataset.word;
          document.getElementById("definition-word").textContent = entry.word;
          document.getElementById("definition-native").textContent = entry.native;
          document.getElementById("definition-foreign").textContent = entry.foreign;
          document.getElementById("definition-context").textContent = entry.context || "";
          panel.hidden = false;
        });
        text.addEventListener("click", async (event) => {
          const marker = event.target.closest(".vocab-word");
          if (!marker) return;
          afterMutation(await postJson("/api/selection/toggle", { word: marker.dataset.word }));
        });

        document.getElementById("definition-add").addEventListener("click", async () => {
          if (!current) return;
          afterMutation(await postJson("/api/selection/add", { word: current }));
        });

        document.getElementById("clear-selection").addEventListener("click", async () => {
          if (!window.confirm(data.messages.confirmClear)) return;
          afterMutation(await postJson("/api/selection/clear", { confirm: true }));
        });

        document.getElementById("export-link").addEventListener("click", (event) => {
          if (document.getElementById("selection-list").children.length === 0) {
            event.preventDefault();
            showFlash(data.messages.emptySet);
          }
        });

        const form = document.getElementById("submission-form");
        form.addEventListener("submit", async (event) => {
          event.preventDefault();
          const fields = new FormData(form);
          const draft = {
            word: fields.get("word"),
            definition_native: fields.get("definition_native"),
            definition_foreign: fields.get("definition_foreign"),
            context_snippet: fields.get("context_snippet") || null,
            chapter: Number(fields.get("chapter")),
          };
          const status = document.getElementById("submission-status");
          const result = await postJson("/api/submissions", draft);
          if (result.ok) {
            status.textContent = result.payload.message;
            form.reset();
            form.elements.chapter.value = data.chapter;
          } else {
            status.textContent = result.payload.error || "";
          }
        });

        fetch("/api/selection").then((r) => r.json()).then(renderSelection).catch(() => {});
      })();
    </script>
  </body>
</html>"#,
    ext = "html"
)]
struct ReaderTemplate {
    chrome: Chrome,
    chapter: u32,
    chapters: Vec<ChapterOption>,
    has_text: bool,
    text_html: SafeMarkup,
    status_message: String,
    selection_count: usize,
    selection: Vec<SelectionEntry>,
    empty_message: &'static str,
    page_data: SafeMarkup,
    canonical_url: String,
}
