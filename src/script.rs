use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::book::{InteractiveBook, Step};
use crate::cli::ReplayArgs;
use crate::config::BookConfig;
use crate::content::{ContentResult, ScriptedContentFactory};
use crate::events::EventLog;
use crate::location::{AddressBar as _, MemoryAddressBar, SharedAddressBar};
use crate::navigation::{NavigationOutcome, NavigationTarget};
use crate::xapi::Verb;

/// One host action replayed against a book by `interactive-book replay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// A "request new chapter" signal from the book's own UI.
    Navigate {
        chapter: String,
        #[serde(default)]
        section: Option<String>,
        #[serde(default)]
        header_number: Option<u32>,
        /// Defaults to the book's own id.
        #[serde(default)]
        book_id: Option<u64>,
    },
    Next {
        #[serde(default)]
        to_top: bool,
    },
    Previous {
        #[serde(default)]
        to_top: bool,
    },
    /// Sidebar section link, by position.
    SidebarSection { chapter: usize, section: usize },
    /// The user edits the fragment by hand. An empty fragment removes it.
    HashChange { fragment: String },
    Back,
    Forward,
    /// An answered/completed report from embedded content.
    ContentEvent {
        sub_content_id: String,
        #[serde(default = "default_verb")]
        verb: String,
        #[serde(default)]
        score: Option<u32>,
        #[serde(default)]
        max_score: Option<u32>,
    },
    TransitionEnd {
        #[serde(default = "default_property")]
        property: String,
        /// Defaults to the active chapter's panel.
        #[serde(default)]
        panel: Option<usize>,
    },
    Advance { ms: u64 },
    /// Runs timers and ends any transition, like a browser left alone.
    Settle,
    MarkRead { chapter: usize },
    UnmarkRead { chapter: usize },
    RemoveCover,
    ShowSolutions,
    Reset,
    Resize,
    ChildResize { chapter: usize },
}

fn default_verb() -> String {
    Verb::Answered.as_str().to_owned()
}

fn default_property() -> String {
    "transform".to_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub actions: Vec<Action>,
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read script: {}", path.display()))?;
        let script = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).context("deserialize script json"),
            _ => serde_yaml::from_str(&raw).context("deserialize script yaml"),
        }
        .with_context(|| format!("parse script: {}", path.display()))?;
        Ok(script)
    }
}

/// `interactive-book replay`: every published event becomes one JSON line on stdout.
pub fn run(args: ReplayArgs) -> anyhow::Result<()> {
    let config = BookConfig::load(&args.book)?;
    let script = Script::load(&args.script)?;
    let page = SharedAddressBar::new(MemoryAddressBar::parse(&args.url)?);

    let mut book = InteractiveBook::new(config, Box::new(page.clone()), &ScriptedContentFactory);
    let log = book.record_events();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    book.attach();
    flush_events(&log, &mut out)?;
    for (index, action) in script.actions.iter().enumerate() {
        apply(&mut book, &page, action).with_context(|| format!("action #{}", index + 1))?;
        flush_events(&log, &mut out)?;
    }
    tracing::info!(
        actions = script.actions.len(),
        active_chapter = book.active_chapter(),
        completed = book.is_completed(),
        "replay finished"
    );

    if args.report {
        let line = serde_json::to_string(&book.xapi_data()).context("serialize report")?;
        writeln!(out, "{line}").context("write report")?;
    }
    Ok(())
}

fn flush_events(log: &EventLog, out: &mut impl std::io::Write) -> anyhow::Result<()> {
    for event in log.drain() {
        let line = serde_json::to_string(&event).context("serialize event")?;
        writeln!(out, "{line}").context("write event")?;
    }
    Ok(())
}

/// Applies one action. `page` must be the address bar the book was built with.
pub fn apply(
    book: &mut InteractiveBook,
    page: &SharedAddressBar,
    action: &Action,
) -> anyhow::Result<Option<NavigationOutcome>> {
    let outcome = match action {
        Action::Navigate {
            chapter,
            section,
            header_number,
            book_id,
        } => {
            let mut target = NavigationTarget::new(book_id.unwrap_or(book.content_id()), chapter);
            target.section = section.clone();
            target.header_number = *header_number;
            Some(book.request_navigation(target))
        }
        Action::Next { to_top } => book.navigate_sequential(Step::Next, *to_top),
        Action::Previous { to_top } => book.navigate_sequential(Step::Previous, *to_top),
        Action::SidebarSection { chapter, section } => book.navigate_to_section(*chapter, *section),
        Action::HashChange { fragment } => {
            let url = page.with(|bar| {
                let mut url = bar.current();
                let body = fragment.strip_prefix('#').unwrap_or(fragment);
                url.set_fragment((!body.is_empty()).then_some(body));
                bar.visit(url.clone());
                url
            });
            book.on_location_changed(&url)
        }
        Action::Back => match page.with(|bar| bar.back()) {
            Some(url) => book.on_location_changed(&url),
            None => None,
        },
        Action::Forward => match page.with(|bar| bar.forward()) {
            Some(url) => book.on_location_changed(&url),
            None => None,
        },
        Action::ContentEvent {
            sub_content_id,
            verb,
            score,
            max_score,
        } => {
            let verb = Verb::parse(verb).with_context(|| format!("unknown verb: {verb}"))?;
            let result = score.map(|score| ContentResult {
                score,
                max_score: *max_score,
            });
            book.on_content_event(sub_content_id, verb, result);
            None
        }
        Action::TransitionEnd { property, panel } => {
            let panel = panel.unwrap_or(book.active_chapter());
            book.on_transition_end(property, panel);
            None
        }
        Action::Advance { ms } => {
            book.advance_clock(*ms);
            None
        }
        Action::Settle => {
            settle(book);
            None
        }
        Action::MarkRead { chapter } => {
            book.set_chapter_read(*chapter);
            None
        }
        Action::UnmarkRead { chapter } => {
            book.unset_chapter_read(*chapter);
            None
        }
        Action::RemoveCover => {
            book.remove_cover();
            None
        }
        Action::ShowSolutions => {
            book.show_solutions();
            None
        }
        Action::Reset => {
            book.reset();
            None
        }
        Action::Resize => {
            book.resize();
            None
        }
        Action::ChildResize { chapter } => {
            book.on_child_resize(*chapter);
            None
        }
    };
    tracing::debug!(?action, ?outcome, "applied action");
    Ok(outcome)
}

/// Drains pending timers and delivers the transition-end of the active panel.
pub fn settle(book: &mut InteractiveBook) {
    while let Some(delay) = book.next_timer_delay_ms() {
        book.advance_clock(delay);
    }
    if book.on_transition_end("transform", book.active_chapter()) {
        while let Some(delay) = book.next_timer_delay_ms() {
            book.advance_clock(delay);
        }
    }
}
