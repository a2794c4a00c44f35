use serde::{Deserialize, Serialize};

use crate::config::Behaviour;
use crate::events::{BookEvent, Mediator};
use crate::registry::ChapterRegistry;
use crate::xapi::{Activity, Statement, Verb, XapiReport, activity_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChapterStatus {
    Blank,
    Started,
    Done,
}

/// Task, chapter and book completion. Completion notifications fire on the
/// `completed` false -> true edge and nowhere else.
#[derive(Debug)]
pub struct ProgressTracker {
    behaviour: Behaviour,
    content_id: u64,
    title: String,
    completed: bool,
    statuses: Vec<ChapterStatus>,
}

impl ProgressTracker {
    pub fn new(behaviour: Behaviour, content_id: u64, title: impl Into<String>, chapters: usize) -> Self {
        Self {
            behaviour,
            content_id,
            title: title.into(),
            completed: false,
            statuses: vec![ChapterStatus::Blank; chapters],
        }
    }

    pub fn book_completed(&self) -> bool {
        self.completed
    }

    /// Last status shown for the chapter's indicator.
    pub fn status(&self, chapter: usize) -> Option<ChapterStatus> {
        self.statuses.get(chapter).copied()
    }

    pub fn statuses(&self) -> &[ChapterStatus] {
        &self.statuses
    }

    /// Marks a task section done. Returns false when nothing changed.
    pub fn record_section_task_done(
        &mut self,
        registry: &mut ChapterRegistry,
        mediator: &mut Mediator,
        chapter: usize,
        section: usize,
    ) -> bool {
        let Some(entry) = registry.get_mut(chapter) else {
            return false;
        };
        let Some(target) = entry.sections.get_mut(section) else {
            return false;
        };
        if !target.is_task || target.task_done {
            return false;
        }

        target.task_done = true;
        entry.tasks_left = entry.tasks_left.saturating_sub(1);
        tracing::debug!(chapter, section, tasks_left = entry.tasks_left, "task done");
        mediator.publish(BookEvent::SectionTaskDone { chapter, section });

        self.update_chapter_progress(registry, mediator, chapter, false);
        true
    }

    pub fn compute_chapter_status(
        &self,
        registry: &ChapterRegistry,
        chapter: usize,
        has_just_changed_into: bool,
    ) -> Option<ChapterStatus> {
        if !self.behaviour.progress_indicators {
            return None;
        }
        let entry = registry.get(chapter)?;

        if !self.behaviour.progress_auto {
            return Some(if entry.completed {
                ChapterStatus::Done
            } else if entry.any_task_done() {
                ChapterStatus::Started
            } else {
                ChapterStatus::Blank
            });
        }

        let status = if entry.max_tasks() > 0 {
            if entry.tasks_left == entry.max_tasks() {
                ChapterStatus::Blank
            } else if entry.tasks_left == 0 {
                ChapterStatus::Done
            } else {
                ChapterStatus::Started
            }
        } else if has_just_changed_into {
            ChapterStatus::Done
        } else {
            ChapterStatus::Blank
        };
        Some(status)
    }

    /// Recomputes the chapter's status, completing it when auto mode reaches DONE.
    pub fn update_chapter_progress(
        &mut self,
        registry: &mut ChapterRegistry,
        mediator: &mut Mediator,
        chapter: usize,
        has_just_changed_into: bool,
    ) {
        let Some(mut status) = self.compute_chapter_status(registry, chapter, has_just_changed_into)
        else {
            return;
        };

        // A completed chapter keeps its indicator; only an explicit uncomplete clears it.
        if registry.get(chapter).is_some_and(|c| c.completed) {
            status = ChapterStatus::Done;
        }

        if status == ChapterStatus::Done && self.behaviour.progress_auto {
            self.mark_chapter_completed(registry, mediator, chapter, true);
        }
        self.set_status(mediator, chapter, status);
    }

    /// The only path that flips `Chapter::completed`.
    pub fn mark_chapter_completed(
        &mut self,
        registry: &mut ChapterRegistry,
        mediator: &mut Mediator,
        chapter: usize,
        completed: bool,
    ) {
        let Some(entry) = registry.get_mut(chapter) else {
            return;
        };

        if !completed {
            if entry.completed || self.completed {
                entry.completed = false;
                self.completed = false;
                tracing::info!(chapter, "chapter marked as not finished");
            }
            if let Some(status) = self.compute_chapter_status(registry, chapter, false) {
                self.set_status(mediator, chapter, status);
            }
            return;
        }

        if !entry.completed {
            entry.completed = true;
            let score = entry.score();
            let max_score = entry.max_score();
            tracing::info!(chapter, score, max_score, "chapter completed");
            mediator.publish(BookEvent::ChapterCompleted {
                chapter,
                chapter_id: entry.id.clone(),
                score,
                max_score,
                statement: Box::new(entry.statement(self.content_id, Verb::Completed)),
            });
        }
        if self.behaviour.progress_indicators {
            self.set_status(mediator, chapter, ChapterStatus::Done);
        }

        if !self.completed && registry.all_completed() {
            self.completed = true;
            let score = total_score(registry);
            let max_score = total_max_score(registry);
            tracing::info!(score, max_score, "book completed");
            let report = book_report(registry, self.content_id, &self.title, Verb::Completed);
            mediator.publish(BookEvent::BookCompleted {
                score,
                max_score,
                report: Box::new(report),
            });
        }
    }

    /// Clears every task, chapter and book flag and resets all indicators.
    pub fn reset(&mut self, registry: &mut ChapterRegistry, mediator: &mut Mediator) {
        for chapter in registry.iter_mut() {
            for section in &mut chapter.sections {
                section.task_done = false;
            }
            chapter.tasks_left = chapter.max_tasks();
            chapter.completed = false;
        }
        self.completed = false;
        self.statuses.fill(ChapterStatus::Blank);
        mediator.publish(BookEvent::IndicatorsReset);
    }

    /// Restores flags without publishing anything.
    pub(crate) fn restore(&mut self, registry: &ChapterRegistry, completed: bool) {
        self.completed = completed && registry.all_completed();
        for index in 0..registry.len() {
            let status = match registry.get(index) {
                Some(c) if c.completed => ChapterStatus::Done,
                Some(c) if c.any_task_done() => ChapterStatus::Started,
                _ => ChapterStatus::Blank,
            };
            if let Some(slot) = self.statuses.get_mut(index) {
                *slot = status;
            }
        }
    }

    fn set_status(&mut self, mediator: &mut Mediator, chapter: usize, status: ChapterStatus) {
        let Some(slot) = self.statuses.get_mut(chapter) else {
            return;
        };
        if *slot == status {
            return;
        }
        *slot = status;
        mediator.publish(BookEvent::ChapterStatusChanged { chapter, status });
    }
}

pub fn total_score(registry: &ChapterRegistry) -> u32 {
    registry.iter().map(|c| c.score()).sum()
}

pub fn total_max_score(registry: &ChapterRegistry) -> u32 {
    registry.iter().map(|c| c.max_score()).sum()
}

/// AND over every chapter; content without the predicate counts as answered.
pub fn answer_given(registry: &ChapterRegistry) -> bool {
    registry.iter().all(|c| c.answer_given())
}

pub fn book_report(registry: &ChapterRegistry, content_id: u64, title: &str, verb: Verb) -> XapiReport {
    let score = total_score(registry);
    let max_score = total_max_score(registry);
    let statement = Statement::new(verb, Activity::compound(activity_id(content_id, None), title))
        .with_scored_result(score, max_score, true, score == max_score);
    XapiReport {
        statement,
        children: registry.iter().map(|c| c.xapi_report(content_id)).collect(),
    }
}
