use serde::{Deserialize, Serialize};

use crate::config::BookConfig;
use crate::content::Capability;
use crate::events::{BookEvent, Mediator};
use crate::fragment::{self, Fragment, KEY_BOOK_ID, KEY_CHAPTER, KEY_HEADER_NUMBER, KEY_SECTION};
use crate::location::LocationSync;
use crate::progress::ProgressTracker;
use crate::registry::ChapterRegistry;
use crate::scheduler::{Deferred, Timers};

pub const SECTION_TOP: &str = "top";
const TRANSITION_PROPERTY: &str = "transform";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTarget {
    pub book_id: u64,
    pub chapter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_number: Option<u32>,
}

impl NavigationTarget {
    pub fn new(book_id: u64, chapter: impl Into<String>) -> Self {
        Self {
            book_id,
            chapter: chapter.into(),
            section: None,
            header_number: None,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_header_number(mut self, header_number: u32) -> Self {
        self.header_number = Some(header_number);
        self
    }

    pub fn to_fragment(&self) -> Fragment {
        let mut fragment = Fragment::new();
        fragment.insert(KEY_BOOK_ID, self.book_id.to_string());
        fragment.insert(KEY_CHAPTER, self.chapter.clone());
        if let Some(section) = &self.section {
            fragment.insert(KEY_SECTION, section.clone());
        }
        if let Some(header) = self.header_number {
            fragment.insert(KEY_HEADER_NUMBER, header.to_string());
        }
        fragment
    }

    /// Builds an externally observed target. Requires a book id and a chapter.
    pub fn from_fragment(fragment: &Fragment) -> Option<Self> {
        Some(Self {
            book_id: fragment.book_id()?,
            chapter: fragment.chapter()?.to_owned(),
            section: fragment.section().map(str::to_owned),
            header_number: fragment.header_number(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Side the incoming panel starts from when moving `from -> to`.
    pub fn of_travel(from: usize, to: usize) -> Self {
        if from < to { Self::Right } else { Self::Left }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlidePhase {
    /// Incoming panel mounted off-screen; waiting one tick.
    Staged,
    /// Offsets swapped; waiting for the transition-end signal.
    Sliding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Transitioning {
        from: usize,
        to: usize,
        direction: Direction,
        phase: SlidePhase,
    },
}

/// Visibility and animation markers of one chapter panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Panel {
    pub visible: bool,
    pub animate_new: bool,
    pub offset: Option<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ResizeOrigin {
    /// The host asked the book to resize.
    Host,
    /// The book itself, e.g. after a transition.
    Book,
    /// An embedded instance grew or shrank.
    Child { chapter: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    ForeignBook,
    UnknownChapter,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// A transition was in flight.
    Dropped,
    Ignored { reason: IgnoreReason },
    /// Same chapter; only the section was scrolled to.
    SectionRedirect,
    /// Chapter switched without animation (load-time redirect).
    Jumped { from: usize, to: usize },
    Transition { from: usize, to: usize },
}

/// Everything the controller reads or writes besides its own state.
pub struct NavContext<'a> {
    pub config: &'a BookConfig,
    pub registry: &'a mut ChapterRegistry,
    pub progress: &'a mut ProgressTracker,
    pub location: &'a mut LocationSync,
    pub mediator: &'a mut Mediator,
    pub timers: &'a mut Timers,
    pub cover_shown: bool,
}

/// Active-chapter state machine. Either `Idle` or `Transitioning`; a request
/// that arrives mid-transition is dropped, not queued, and the transition ends
/// only on the incoming panel's `transform` transition-end.
#[derive(Debug)]
pub struct NavigationController {
    book_id: u64,
    active: usize,
    state: NavState,
    panels: Vec<Panel>,
    target: Option<NavigationTarget>,
    deep_link: Option<NavigationTarget>,
    scroll_after_cover: bool,
}

impl NavigationController {
    pub fn new(book_id: u64, chapters: usize, initial: usize) -> Self {
        let initial = initial.min(chapters.saturating_sub(1));
        let mut panels = vec![Panel::default(); chapters];
        if let Some(panel) = panels.get_mut(initial) {
            panel.visible = true;
        }
        Self {
            book_id,
            active: initial,
            state: NavState::Idle,
            panels,
            target: None,
            deep_link: None,
            scroll_after_cover: false,
        }
    }

    pub fn active_chapter(&self) -> usize {
        self.active
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self.state, NavState::Transitioning { .. })
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Attaches the initial chapter and its successor, and arms the deep-link scroll.
    pub fn start(&mut self, ctx: &mut NavContext<'_>, deep_link: Option<NavigationTarget>) {
        attach_with_lookahead(ctx, self.active);
        if let Some(link) = deep_link.filter(|l| l.section.is_some()) {
            ctx.timers
                .schedule(ctx.config.transition.deep_link_delay_ms, Deferred::DeepLinkScroll);
            self.target = Some(link.clone());
            self.deep_link = Some(link);
        }
    }

    /// Navigation requested by the book's own UI: sidebar, status bar, child content.
    pub fn request_navigation(
        &mut self,
        ctx: &mut NavContext<'_>,
        target: NavigationTarget,
    ) -> NavigationOutcome {
        if self.is_transitioning() {
            tracing::debug!(chapter = %target.chapter, "drop navigation during transition");
            return NavigationOutcome::Dropped;
        }
        if target.book_id != self.book_id {
            ctx.location.push(&target);
            return NavigationOutcome::Ignored {
                reason: IgnoreReason::ForeignBook,
            };
        }
        let Some(index) = ctx.registry.find_index_by_id(&target.chapter) else {
            tracing::debug!(chapter = %target.chapter, "drop navigation to unknown chapter");
            return NavigationOutcome::Ignored {
                reason: IgnoreReason::UnknownChapter,
            };
        };

        if index == self.active
            && fragment::equal_relevant(
                &target.to_fragment(),
                &ctx.location.observed(),
                &fragment::RELEVANT_KEYS,
            )
        {
            self.target = Some(target);
            self.deep_link = None;
            self.scroll_to_target(ctx);
            return NavigationOutcome::SectionRedirect;
        }

        if ctx.config.behaviour.progress_auto && ctx.registry.is_final_untasked_chapter(index) {
            ctx.progress
                .mark_chapter_completed(ctx.registry, ctx.mediator, index, true);
        }

        if let Some(written) = ctx.location.push(&target) {
            ctx.mediator
                .publish(BookEvent::AddressBarUpdated { fragment: written });
        }
        self.change_chapter(ctx, target, false)
    }

    /// Reacts to an address-bar change this book did not cause. Echoes of the
    /// book's own writes are filtered out by [`LocationSync`] before this runs,
    /// so `observed` is always revalidated. `None` falls back to the first chapter.
    pub fn redirect_chapter(
        &mut self,
        ctx: &mut NavContext<'_>,
        observed: Option<&Fragment>,
    ) -> NavigationOutcome {
        if self.is_transitioning() {
            return NavigationOutcome::Dropped;
        }

        let target = observed
            .filter(|f| fragment::validate(f, self.book_id))
            .and_then(NavigationTarget::from_fragment)
            .unwrap_or_else(|| self.first_chapter_target(ctx));
        self.change_chapter(ctx, target, false)
    }

    /// Switches to the target's chapter. `redirect_on_load` jumps without
    /// animation and without touching progress.
    pub fn change_chapter(
        &mut self,
        ctx: &mut NavContext<'_>,
        target: NavigationTarget,
        redirect_on_load: bool,
    ) -> NavigationOutcome {
        if self.is_transitioning() {
            return NavigationOutcome::Dropped;
        }
        let Some(new) = ctx.registry.find_index_by_id(&target.chapter) else {
            return NavigationOutcome::Ignored {
                reason: IgnoreReason::UnknownChapter,
            };
        };

        let old = self.active;
        let has_changed = old != new;
        self.target = Some(target);
        self.deep_link = None;

        let outcome = if has_changed && !redirect_on_load {
            self.begin_transition(ctx, old, new);
            NavigationOutcome::Transition { from: old, to: new }
        } else if has_changed {
            attach_with_lookahead(ctx, new);
            self.active = new;
            for (index, panel) in self.panels.iter_mut().enumerate() {
                *panel = Panel {
                    visible: index == new,
                    ..Panel::default()
                };
            }
            ctx.mediator
                .publish(BookEvent::ChapterActivated { from: old, to: new });
            self.scroll_or_wait_for_cover(ctx);
            NavigationOutcome::Jumped { from: old, to: new }
        } else {
            self.scroll_or_wait_for_cover(ctx);
            NavigationOutcome::SectionRedirect
        };

        if !redirect_on_load {
            ctx.progress
                .update_chapter_progress(ctx.registry, ctx.mediator, old, has_changed);
        }
        outcome
    }

    /// Fired one tick after staging: swap the offsets so the slide starts.
    pub fn start_slide(&mut self) -> bool {
        let NavState::Transitioning {
            from,
            to,
            direction,
            phase: SlidePhase::Staged,
        } = self.state
        else {
            return false;
        };

        if let Some(panel) = self.panels.get_mut(from) {
            panel.offset = Some(direction.opposite());
        }
        if let Some(panel) = self.panels.get_mut(to) {
            panel.offset = None;
        }
        self.state = NavState::Transitioning {
            from,
            to,
            direction,
            phase: SlidePhase::Sliding,
        };
        true
    }

    /// Ends the transition on the incoming panel's `transform` transition-end.
    /// Any other transition-end is ignored.
    pub fn on_transition_end(
        &mut self,
        ctx: &mut NavContext<'_>,
        property: &str,
        panel: usize,
    ) -> bool {
        if !self.is_transitioning() || property != TRANSITION_PROPERTY || panel != self.active {
            return false;
        }

        for (index, entry) in self.panels.iter_mut().enumerate() {
            entry.offset = None;
            entry.animate_new = false;
            entry.visible = index == self.active;
        }
        self.state = NavState::Idle;
        ctx.mediator.publish(BookEvent::TransitionFinished {
            chapter: self.active,
        });

        self.scroll_to_target(ctx);
        self.resize(ctx, ResizeOrigin::Book);
        true
    }

    /// Fired after the deep-link delay. A no-op once navigation has moved on.
    pub fn fire_deep_link(&mut self, ctx: &mut NavContext<'_>) -> bool {
        let Some(link) = self.deep_link.take() else {
            return false;
        };
        if self.is_transitioning() || self.target.as_ref() != Some(&link) {
            return false;
        }
        if ctx.registry.find_index_by_id(&link.chapter) != Some(self.active) {
            return false;
        }
        self.scroll_to_target(ctx);
        true
    }

    pub fn on_cover_removed(&mut self, ctx: &mut NavContext<'_>) {
        if std::mem::take(&mut self.scroll_after_cover) {
            self.scroll_to_target(ctx);
        }
    }

    /// Child-originated resizes go up to the host only; everything else is
    /// forwarded down to the visible chapter's instances.
    pub fn resize(&mut self, ctx: &mut NavContext<'_>, origin: ResizeOrigin) -> usize {
        ctx.mediator.publish(BookEvent::ResizeRequested { origin });
        if let ResizeOrigin::Child { .. } = origin {
            return 0;
        }

        let mut notified = 0;
        for (index, panel) in self.panels.iter().enumerate() {
            if !panel.visible {
                continue;
            }
            let Some(chapter) = ctx.registry.get_mut(index) else {
                continue;
            };
            if !chapter.is_attached() {
                continue;
            }
            for section in &mut chapter.sections {
                section.content.resize();
                notified += 1;
            }
        }
        notified
    }

    fn begin_transition(&mut self, ctx: &mut NavContext<'_>, old: usize, new: usize) {
        attach_with_lookahead(ctx, new);
        pause_chapter_media(ctx, old);

        let direction = Direction::of_travel(old, new);
        self.active = new;
        self.state = NavState::Transitioning {
            from: old,
            to: new,
            direction,
            phase: SlidePhase::Staged,
        };
        if let Some(panel) = self.panels.get_mut(new) {
            panel.animate_new = true;
            panel.offset = Some(direction);
            panel.visible = true;
        }
        ctx.timers
            .schedule(ctx.config.transition.stagger_ms, Deferred::StartSlide);

        tracing::debug!(from = old, to = new, ?direction, "chapter transition");
        ctx.mediator
            .publish(BookEvent::ChapterActivated { from: old, to: new });
        ctx.mediator.publish(BookEvent::TransitionStarted {
            from: old,
            to: new,
            direction,
        });
    }

    fn scroll_or_wait_for_cover(&mut self, ctx: &mut NavContext<'_>) {
        if ctx.cover_shown {
            self.scroll_after_cover = true;
        } else {
            self.scroll_to_target(ctx);
        }
    }

    fn scroll_to_target(&mut self, ctx: &mut NavContext<'_>) {
        let Some(target) = &self.target else {
            return;
        };
        match target.section.as_deref() {
            Some(SECTION_TOP) => ctx.mediator.publish(BookEvent::ScrollToTop),
            Some(section) => {
                let exists = ctx
                    .registry
                    .get(self.active)
                    .and_then(|c| c.section_index(section))
                    .is_some();
                if exists {
                    ctx.mediator.publish(BookEvent::ScrollToSection {
                        chapter: self.active,
                        section: section.to_owned(),
                        header_number: target.header_number,
                    });
                }
            }
            None => {}
        }
    }

    fn first_chapter_target(&self, ctx: &NavContext<'_>) -> NavigationTarget {
        let chapter = ctx
            .registry
            .get(0)
            .map(|c| c.id.clone())
            .unwrap_or_default();
        NavigationTarget::new(self.book_id, chapter)
    }
}

/// Attaches `index` and the chapter after it.
fn attach_with_lookahead(ctx: &mut NavContext<'_>, index: usize) {
    for chapter in [index, index + 1] {
        let attached = ctx
            .registry
            .get_mut(chapter)
            .is_some_and(|c| c.attach());
        if attached {
            tracing::debug!(chapter, "attach chapter");
            ctx.mediator.publish(BookEvent::ChapterAttached { chapter });
        }
    }
}

/// Best effort: a failing instance is logged and never blocks the transition.
fn pause_chapter_media(ctx: &mut NavContext<'_>, chapter: usize) {
    let Some(entry) = ctx.registry.get_mut(chapter) else {
        return;
    };
    for section in &mut entry.sections {
        if !section.content.supports(Capability::Pause) {
            continue;
        }
        if let Err(err) = section.content.pause() {
            tracing::warn!(chapter, section = %section.id, ?err, "pause on chapter exit failed");
            ctx.mediator.publish(BookEvent::ContentFault {
                chapter,
                section: section.id.clone(),
                operation: "pause".to_owned(),
                message: format!("{err:#}"),
            });
        }
    }
}
