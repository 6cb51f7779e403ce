use std::error::Error;
use std::fs;
use std::path::PathBuf;

use atty::Stream;
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use readgloss_rs::chapter::{ChapterSource, fetch_chapter};
use readgloss_rs::config::{DEFAULT_MAX_CHAPTER, ReaderConfig};
use readgloss_rs::export::{EMPTY_SET_MESSAGE, csv_bytes_with_bom, export_filename};
use readgloss_rs::reader::render_chapter;
use readgloss_rs::selection::{Change, EMPTY_SIDEBAR_MESSAGE, SelectionEntry};
use readgloss_rs::submission::{SubmissionDraft, SubmissionQueue, thank_you_message};
use readgloss_rs::sync::run_sync;
use readgloss_rs::vocab::{Vocabulary, VocabularyEntry};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(
    name = "readgloss-rs",
    about = "Read chapters with their vocabulary highlighted",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Directory holding `chapters/` and `vocab_data/`.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
    /// Directory for the saved word set and the submission queue.
    #[arg(long, global = true, default_value = "state")]
    state_dir: PathBuf,
    /// Highest chapter number.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CHAPTER)]
    max_chapter: u32,
}

impl PathArgs {
    fn config(&self) -> ReaderConfig {
        ReaderConfig {
            data_dir: self.data_dir.clone(),
            state_dir: self.state_dir.clone(),
            max_chapter: self.max_chapter,
            ..ReaderConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reading web app.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Public base URL; defaults to `http://<addr>`.
        #[arg(long)]
        base_url: Option<String>,
        /// `tailwind` or `bootstrap`.
        #[arg(long, default_value = "tailwind")]
        theme: readgloss_rs::web::WebTheme,
    },
    /// Print a chapter with its vocabulary marked up.
    Annotate {
        chapter: u32,
    },
    /// List a chapter's vocabulary.
    Vocab {
        chapter: u32,
    },
    /// Operate on the saved word set.
    #[command(subcommand)]
    Selection(SelectionCommand),
    /// Write the word set as CSV.
    Export {
        /// Target file; defaults to `vocab_set_<date>.csv`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Suggest a new word for moderation.
    Submit {
        word: String,
        /// Definition in the reader's native language.
        #[arg(long)]
        native: String,
        /// Definition in the foreign language.
        #[arg(long)]
        foreign: String,
        #[arg(long)]
        chapter: u32,
        /// Sentence the word appeared in.
        #[arg(long)]
        context: Option<String>,
    },
    /// Merge approved submissions into the vocabulary files.
    Sync,
}

#[derive(Subcommand, Debug)]
enum SelectionCommand {
    /// Show the saved words.
    List,
    /// Add a word if absent, remove it if present.
    Toggle {
        word: String,
        /// Chapter whose vocabulary supplies the definitions.
        #[arg(long)]
        chapter: Option<u32>,
    },
    /// Add a word without toggling.
    Add {
        word: String,
        #[arg(long)]
        chapter: u32,
    },
    /// Remove every saved word.
    Clear {
        /// Confirm the removal.
        #[arg(long)]
        yes: bool,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.paths.config();
    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            base_url,
            theme,
        } => handle_serve(config, addr, base_url, theme),
        Command::Annotate { chapter } => handle_annotate(&config, chapter, cli.json),
        Command::Vocab { chapter } => handle_vocab(&config, chapter, cli.json),
        Command::Selection(SelectionCommand::List) => handle_list(&config, cli.json),
        Command::Selection(SelectionCommand::Toggle { word, chapter }) => {
            handle_toggle(&config, &word, chapter, cli.json)
        }
        Command::Selection(SelectionCommand::Add { word, chapter }) => {
            handle_add(&config, &word, chapter, cli.json)
        }
        Command::Selection(SelectionCommand::Clear { yes }) => handle_clear(&config, yes, cli.json),
        Command::Export { output } => handle_export(&config, output, cli.json),
        Command::Submit {
            word,
            native,
            foreign,
            chapter,
            context,
        } => {
            let draft = SubmissionDraft {
                word,
                definition_native: native,
                definition_foreign: foreign,
                chapter,
                context_snippet: context,
            };
            handle_submit(&config, draft, cli.json)
        }
        Command::Sync => handle_sync(&config, cli.json),
    }
}

fn runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

#[cfg(feature = "web")]
fn handle_serve(
    mut config: ReaderConfig,
    addr: std::net::SocketAddr,
    base_url: Option<String>,
    theme: readgloss_rs::web::WebTheme,
) -> Result<(), Box<dyn Error>> {
    config.addr = addr;
    config.base_url = base_url.unwrap_or_else(|| format!("http://{addr}"));
    let web_config = readgloss_rs::web::WebConfig {
        reader: config,
        theme,
    };
    runtime()?.block_on(readgloss_rs::web::serve(web_config))?;
    Ok(())
}

fn handle_annotate(config: &ReaderConfig, chapter: u32, as_json: bool) -> Result<(), Box<dyn Error>> {
    let source = config.chapter_source();
    let data = runtime()?.block_on(fetch_chapter(&source, chapter))?;
    let rendered = render_chapter(data)?;
    if as_json {
        let payload = json!({
            "chapter": rendered.chapter,
            "markers": rendered.marker_count,
            "words": rendered.vocabulary.len(),
            "html": rendered.html,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", rendered.html);
    }
    Ok(())
}

fn load_vocabulary(config: &ReaderConfig, chapter: u32) -> Result<Vocabulary, Box<dyn Error>> {
    let source = config.chapter_source();
    Ok(runtime()?.block_on(source.fetch_vocabulary(chapter))?)
}

fn handle_vocab(config: &ReaderConfig, chapter: u32, as_json: bool) -> Result<(), Box<dyn Error>> {
    let vocabulary = load_vocabulary(config, chapter)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(vocabulary.entries())?);
    } else {
        print_vocab_table(chapter, vocabulary.entries());
    }
    Ok(())
}

fn handle_list(config: &ReaderConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let store = config.selection_store();
    if as_json {
        println!("{}", serde_json::to_string_pretty(store.snapshot())?);
    } else {
        print_selection(store.snapshot());
    }
    Ok(())
}

fn handle_toggle(
    config: &ReaderConfig,
    word: &str,
    chapter: Option<u32>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut store = config.selection_store();
    let change = if store.contains(word) {
        store.toggle(word, "", "")
    } else {
        let chapter = chapter.ok_or("pass --chapter to add a word that is not saved yet")?;
        let vocabulary = load_vocabulary(config, chapter)?;
        let entry = vocabulary
            .get(word)
            .ok_or_else(|| format!("\"{word}\" is not in the vocabulary of chapter {chapter}"))?;
        store.toggle(&entry.word, &entry.definition_native, &entry.definition_foreign)
    };
    report_warning(&change);
    if as_json {
        let payload = json!({
            "word": word,
            "outcome": change.outcome,
            "persistence": change.persistence,
            "count": store.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{word}: {:?} ({} saved)", change.outcome, store.len());
    }
    Ok(())
}

fn handle_add(
    config: &ReaderConfig,
    word: &str,
    chapter: u32,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let vocabulary = load_vocabulary(config, chapter)?;
    let mut store = config.selection_store();
    let change = store.add_if_absent(word, &vocabulary);
    report_warning(&change);
    let message = change.outcome.message(word);
    if as_json {
        let payload = json!({
            "word": word,
            "outcome": change.outcome,
            "message": message,
            "persistence": change.persistence,
            "count": store.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        match message {
            Some(message) => println!("{message}"),
            None => println!("{word}: added ({} saved)", store.len()),
        }
    }
    Ok(())
}

fn handle_clear(config: &ReaderConfig, yes: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    if !yes {
        return Err("refusing to clear the word set without --yes".into());
    }
    let mut store = config.selection_store();
    let change = store.clear();
    report_warning(&change);
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "removed": change.outcome }))?
        );
    } else {
        println!("Removed {} words.", change.outcome);
    }
    Ok(())
}

fn handle_export(
    config: &ReaderConfig,
    output: Option<PathBuf>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let store = config.selection_store();
    let bytes = csv_bytes_with_bom(store.snapshot()).ok_or(EMPTY_SET_MESSAGE)?;
    let path = output.unwrap_or_else(|| PathBuf::from(export_filename(Local::now().date_naive())));
    fs::write(&path, &bytes)?;
    if as_json {
        let payload = json!({ "path": path.display().to_string(), "rows": store.len() });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Wrote {} words to {}", store.len(), path.display());
    }
    Ok(())
}

fn handle_submit(
    config: &ReaderConfig,
    draft: SubmissionDraft,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let record = draft.validate(config.max_chapter, Utc::now())?;
    let queue = config.submission_queue();
    runtime()?.block_on(queue.enqueue(&record))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", thank_you_message(&record.word));
    }
    Ok(())
}

fn handle_sync(config: &ReaderConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let report = run_sync(&config.sync_config())?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "{} approved submissions ({} outside 1..={}).",
        report.approved, report.out_of_range, config.max_chapter
    );
    if report.chapters.is_empty() {
        println!("No chapter received new vocabulary.");
    }
    for chapter in &report.chapters {
        if chapter.written {
            println!(
                "Kapitel {}: {} words ({} new)",
                chapter.chapter, chapter.merged, chapter.added
            );
        } else {
            println!("Kapitel {}: skipped", chapter.chapter);
        }
    }
    Ok(())
}

fn report_warning<T>(change: &Change<T>) {
    if let Some(warning) = change.warning() {
        eprintln!("warning: {warning}");
    }
}

fn print_vocab_table(chapter: u32, rows: &[VocabularyEntry]) {
    if rows.is_empty() {
        println!("Chapter {chapter} has no vocabulary.");
        return;
    }
    let width = rows
        .iter()
        .map(|entry| entry.word.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {}", "WORD", "DEFINITIONS", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    for entry in rows {
        println!(
            "{:<width$}  {} / {}",
            entry.word,
            entry.definition_native,
            entry.definition_foreign,
            width = width
        );
    }
}

fn print_selection(entries: &[SelectionEntry]) {
    if entries.is_empty() {
        println!("{EMPTY_SIDEBAR_MESSAGE}");
        return;
    }
    let mut table = format!(
        "**Mein Vokabel-Set** ({})\n\n|Wort|Deutsch|English|\n|-|-|-|\n",
        entries.len()
    );
    for entry in entries {
        table.push_str(&format!(
            "|{}|{}|{}|\n",
            markdown_cell(&entry.word),
            markdown_cell(&entry.definition_native),
            markdown_cell(&entry.definition_foreign)
        ));
    }
    render_markdown_block(&table);
}

fn markdown_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(body: &str) {
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, body, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{}", body.trim_end());
    }
}
