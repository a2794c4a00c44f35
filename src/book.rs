use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::BookConfig;
use crate::content::{Capability, ContentFactory, ContentResult};
use crate::events::{BookEvent, EventKind, EventLog, Mediator, SubscriptionId};
use crate::location::{AddressBar, LocationChange, LocationSync};
use crate::navigation::{
    IgnoreReason, NavContext, NavState, NavigationController, NavigationOutcome, NavigationTarget,
    Panel, ResizeOrigin, SECTION_TOP,
};
use crate::progress::{self, ChapterStatus, ProgressTracker};
use crate::registry::ChapterRegistry;
use crate::scheduler::{Deferred, Timers};
use crate::snapshot::{BookSnapshot, ChapterSnapshot};
use crate::xapi::{Verb, XapiReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Previous,
    Next,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBarView {
    pub current: usize,
    pub total: usize,
    pub title: String,
    pub progress_percent: f64,
    pub previous_enabled: bool,
    pub next_enabled: bool,
}

/// Owns chapters, progress, location and navigation for one book, and exposes
/// the host-facing completion protocol.
#[derive(Debug)]
pub struct InteractiveBook {
    config: Arc<BookConfig>,
    registry: ChapterRegistry,
    progress: ProgressTracker,
    location: LocationSync,
    navigation: NavigationController,
    mediator: Mediator,
    timers: Timers,
    cover_shown: bool,
    attached: bool,
    destroyed: bool,
}

impl InteractiveBook {
    /// Builds the book at the page's current location. A deep link in the
    /// address bar selects the initial chapter. Nothing is attached until
    /// [`Self::attach`] so that subscribers see the startup events.
    pub fn new(
        config: BookConfig,
        address_bar: Box<dyn AddressBar>,
        factory: &dyn ContentFactory,
    ) -> Self {
        let location = LocationSync::new(config.content_id, address_bar);
        let deep_link = NavigationTarget::from_fragment(&location.observed());
        let initial = config.initial_chapter_index(deep_link.as_ref().map(|t| t.chapter.as_str()));

        let config = Arc::new(config.with_autoplay_suppressed(initial));
        let registry = ChapterRegistry::build(&config, factory);
        let progress = ProgressTracker::new(
            config.behaviour.clone(),
            config.content_id,
            config.title.clone(),
            registry.len(),
        );
        let navigation = NavigationController::new(config.content_id, registry.len(), initial);
        tracing::debug!(
            content_id = config.content_id,
            chapters = registry.len(),
            initial,
            "book created"
        );

        Self {
            cover_shown: config.show_cover_page,
            config,
            registry,
            progress,
            location,
            navigation,
            mediator: Mediator::new(),
            timers: Timers::new(),
            attached: false,
            destroyed: false,
        }
    }

    pub fn content_id(&self) -> u64 {
        self.config.content_id
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    pub fn chapters(&self) -> &ChapterRegistry {
        &self.registry
    }

    pub fn active_chapter(&self) -> usize {
        self.navigation.active_chapter()
    }

    pub fn nav_state(&self) -> NavState {
        self.navigation.state()
    }

    pub fn panels(&self) -> &[Panel] {
        self.navigation.panels()
    }

    pub fn chapter_status(&self, chapter: usize) -> Option<ChapterStatus> {
        self.progress.status(chapter)
    }

    pub fn is_completed(&self) -> bool {
        self.progress.book_completed()
    }

    pub fn cover_shown(&self) -> bool {
        self.cover_shown
    }

    pub fn current_url(&self) -> Url {
        self.location.current_url()
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&BookEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.mediator.subscribe(kind, handler)
    }

    pub fn subscribe_all(
        &mut self,
        handler: impl FnMut(&BookEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.mediator.subscribe_all(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.mediator.unsubscribe(id)
    }

    pub fn record_events(&mut self) -> EventLog {
        self.mediator.record_all()
    }

    /// Mounts the initial chapter (plus one lookahead) and arms the deep-link scroll.
    pub fn attach(&mut self) {
        if self.attached || self.destroyed {
            return;
        }
        self.attached = true;
        let deep_link = NavigationTarget::from_fragment(&self.location.observed());
        let (navigation, mut ctx) = self.parts();
        navigation.start(&mut ctx, deep_link);
    }

    pub fn request_navigation(&mut self, target: NavigationTarget) -> NavigationOutcome {
        if self.destroyed {
            return NavigationOutcome::Ignored {
                reason: IgnoreReason::Destroyed,
            };
        }
        let (navigation, mut ctx) = self.parts();
        navigation.request_navigation(&mut ctx, target)
    }

    /// Status-bar arrows. Returns `None` at the first/last chapter.
    pub fn navigate_sequential(&mut self, step: Step, to_top: bool) -> Option<NavigationOutcome> {
        let active = self.active_chapter();
        let index = match step {
            Step::Next => active.checked_add(1).filter(|i| *i < self.registry.len())?,
            Step::Previous => active.checked_sub(1)?,
        };
        let mut target = NavigationTarget::new(self.content_id(), self.registry.get(index)?.id.clone());
        if to_top {
            target = target.with_section(SECTION_TOP);
        }
        Some(self.request_navigation(target))
    }

    /// Sidebar section link.
    pub fn navigate_to_section(&mut self, chapter: usize, section: usize) -> Option<NavigationOutcome> {
        let entry = self.registry.get(chapter)?;
        let target = NavigationTarget::new(self.content_id(), entry.id.clone())
            .with_section(entry.sections.get(section)?.id.clone());
        Some(self.request_navigation(target))
    }

    /// Host notification that the page location changed (hashchange, back/forward).
    pub fn on_location_changed(&mut self, url: &Url) -> Option<NavigationOutcome> {
        if self.destroyed {
            return None;
        }
        let observed = match self.location.on_location_changed(url) {
            LocationChange::OwnEcho | LocationChange::Foreign => return None,
            LocationChange::External(fragment) => Some(fragment),
            LocationChange::Cleared => None,
        };
        let (navigation, mut ctx) = self.parts();
        Some(navigation.redirect_chapter(&mut ctx, observed.as_ref()))
    }

    pub fn on_transition_end(&mut self, property: &str, panel: usize) -> bool {
        let (navigation, mut ctx) = self.parts();
        navigation.on_transition_end(&mut ctx, property, panel)
    }

    /// Advances the logical clock and runs every task that became due.
    pub fn advance_clock(&mut self, elapsed_ms: u64) {
        for task in self.timers.advance(elapsed_ms) {
            match task {
                Deferred::StartSlide => {
                    self.navigation.start_slide();
                }
                Deferred::DeepLinkScroll => {
                    let (navigation, mut ctx) = self.parts();
                    let scrolled = navigation.fire_deep_link(&mut ctx);
                    if scrolled && self.cover_shown {
                        self.remove_cover();
                    }
                }
            }
        }
    }

    pub fn next_timer_delay_ms(&self) -> Option<u64> {
        self.timers.next_delay_ms()
    }

    pub fn remove_cover(&mut self) {
        if !self.cover_shown {
            return;
        }
        self.cover_shown = false;
        self.mediator.publish(BookEvent::CoverRemoved);
        let (navigation, mut ctx) = self.parts();
        navigation.on_cover_removed(&mut ctx);
        navigation.resize(&mut ctx, ResizeOrigin::Book);
    }

    pub fn resize(&mut self) -> usize {
        let (navigation, mut ctx) = self.parts();
        navigation.resize(&mut ctx, ResizeOrigin::Host)
    }

    /// An embedded instance resized itself; propagate upwards only.
    pub fn on_child_resize(&mut self, chapter: usize) {
        let (navigation, mut ctx) = self.parts();
        navigation.resize(&mut ctx, ResizeOrigin::Child { chapter });
    }

    /// An answered/completed report from an embedded instance. Only sections of
    /// the active chapter are matched. Returns true when a task became done.
    pub fn on_content_event(
        &mut self,
        sub_content_id: &str,
        verb: Verb,
        result: Option<ContentResult>,
    ) -> bool {
        if self.destroyed {
            return false;
        }
        tracing::debug!(sub_content_id, verb = verb.as_str(), "content event");
        let active = self.active_chapter();
        let Some(chapter) = self.registry.get_mut(active) else {
            return false;
        };
        let Some(section) = chapter.section_index(sub_content_id) else {
            tracing::debug!(sub_content_id, active, "content event outside active chapter");
            return false;
        };
        if let Some(result) = &result {
            chapter.sections[section].content.observe_result(result);
        }
        if !self.config.behaviour.progress_indicators {
            return false;
        }
        self.progress
            .record_section_task_done(&mut self.registry, &mut self.mediator, active, section)
    }

    /// "Mark as finished" for the given chapter. Only available in manual
    /// progress mode; returns false when ignored.
    pub fn set_chapter_read(&mut self, chapter: usize) -> bool {
        self.mark_chapter_read(chapter, true)
    }

    pub fn unset_chapter_read(&mut self, chapter: usize) -> bool {
        self.mark_chapter_read(chapter, false)
    }

    fn mark_chapter_read(&mut self, chapter: usize, read: bool) -> bool {
        if !self.config.behaviour.is_manual() {
            tracing::debug!(chapter, read, "ignore manual mark outside manual progress mode");
            return false;
        }
        if chapter >= self.registry.len() {
            return false;
        }
        self.progress
            .mark_chapter_completed(&mut self.registry, &mut self.mediator, chapter, read);
        true
    }

    pub fn status_bar(&self) -> StatusBarView {
        let active = self.active_chapter();
        let total = self.registry.len();
        let current = active + 1;
        StatusBarView {
            current,
            total,
            title: self
                .registry
                .get(active)
                .map(|c| c.title.clone())
                .unwrap_or_default(),
            progress_percent: current as f64 / total.max(1) as f64 * 100.0,
            previous_enabled: active > 0,
            next_enabled: current < total,
        }
    }

    pub fn answer_given(&self) -> bool {
        progress::answer_given(&self.registry)
    }

    pub fn score(&self) -> u32 {
        progress::total_score(&self.registry)
    }

    pub fn max_score(&self) -> u32 {
        progress::total_max_score(&self.registry)
    }

    pub fn xapi_data(&self) -> XapiReport {
        progress::book_report(
            &self.registry,
            self.config.content_id,
            &self.config.title,
            Verb::Answered,
        )
    }

    pub fn show_solutions(&mut self) {
        for (index, chapter) in self.registry.iter_mut().enumerate() {
            for section in &mut chapter.sections {
                let content = &mut section.content;
                if !content.supports(Capability::ShowSolutions) {
                    continue;
                }
                let speaker = content.supports(Capability::ReadSpeaker);
                if speaker {
                    content.toggle_read_speaker(true);
                }
                if let Err(err) = content.show_solutions() {
                    tracing::warn!(chapter = index, section = %section.id, ?err, "show solutions failed");
                    self.mediator.publish(fault(index, &section.id, "show_solutions", &err));
                }
                if speaker {
                    content.toggle_read_speaker(false);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        for (index, chapter) in self.registry.iter_mut().enumerate() {
            for section in &mut chapter.sections {
                if !section.content.supports(Capability::Reset) {
                    continue;
                }
                if let Err(err) = section.content.reset() {
                    tracing::warn!(chapter = index, section = %section.id, ?err, "reset failed");
                    self.mediator.publish(fault(index, &section.id, "reset", &err));
                }
            }
        }
        self.progress.reset(&mut self.registry, &mut self.mediator);
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            active_chapter: self
                .registry
                .get(self.active_chapter())
                .map(|c| c.id.clone())
                .unwrap_or_default(),
            completed: self.progress.book_completed(),
            chapters: self
                .registry
                .iter()
                .map(|c| ChapterSnapshot {
                    id: c.id.clone(),
                    completed: c.completed,
                    done_sections: c
                        .sections
                        .iter()
                        .filter(|s| s.task_done)
                        .map(|s| s.id.clone())
                        .collect(),
                })
                .collect(),
        }
    }

    /// Applies a stored snapshot without firing completion notifications.
    pub fn restore(&mut self, snapshot: &BookSnapshot) {
        for saved in &snapshot.chapters {
            let Some(index) = self.registry.find_index_by_id(&saved.id) else {
                continue;
            };
            let Some(chapter) = self.registry.get_mut(index) else {
                continue;
            };
            for section in &mut chapter.sections {
                if section.is_task && saved.done_sections.contains(&section.id) {
                    section.task_done = true;
                }
            }
            let done = chapter.sections.iter().filter(|s| s.task_done).count();
            chapter.tasks_left = chapter.max_tasks().saturating_sub(done);
            chapter.completed = saved.completed;
        }
        self.progress.restore(&self.registry, snapshot.completed);

        if !snapshot.active_chapter.is_empty() {
            let target = NavigationTarget::new(self.content_id(), snapshot.active_chapter.clone());
            let (navigation, mut ctx) = self.parts();
            navigation.change_chapter(&mut ctx, target, true);
        }
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
        for chapter in self.registry.iter_mut() {
            chapter.destroy();
        }
    }

    fn parts(&mut self) -> (&mut NavigationController, NavContext<'_>) {
        (
            &mut self.navigation,
            NavContext {
                config: &self.config,
                registry: &mut self.registry,
                progress: &mut self.progress,
                location: &mut self.location,
                mediator: &mut self.mediator,
                timers: &mut self.timers,
                cover_shown: self.cover_shown,
            },
        )
    }
}

fn fault(chapter: usize, section: &str, operation: &str, err: &anyhow::Error) -> BookEvent {
    BookEvent::ContentFault {
        chapter,
        section: section.to_owned(),
        operation: operation.to_owned(),
        message: format!("{err:#}"),
    }
}
