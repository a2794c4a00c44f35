use std::fmt;

use serde::Serialize;

use crate::config::BookConfig;
use crate::content::{
    self, ContentFactory, EmbeddedContent, answered_or_true, max_score_or_zero, score_or_zero,
};
use crate::xapi::{Activity, Statement, Verb, XapiReport, activity_id};

/// Prefix chapter ids may carry when they are used as DOM/fragment identifiers.
pub const CHAPTER_ID_PREFIX: &str = "h5p-interactive-book-chapter-";

pub fn strip_chapter_prefix(id: &str) -> &str {
    id.strip_prefix(CHAPTER_ID_PREFIX).unwrap_or(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Unattached,
    Attached,
    Destroyed,
}

pub struct Section {
    pub id: String,
    pub title: String,
    pub is_task: bool,
    pub task_done: bool,
    pub content: Box<dyn EmbeddedContent>,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("id", &self.id)
            .field("is_task", &self.is_task)
            .field("task_done", &self.task_done)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub sections: Vec<Section>,
    pub completed: bool,
    pub tasks_left: usize,
    max_tasks: usize,
    lifecycle: Lifecycle,
}

impl Chapter {
    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_attached(&self) -> bool {
        self.lifecycle == Lifecycle::Attached
    }

    /// `Unattached -> Attached`. Returns false when nothing changed.
    pub fn attach(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Unattached {
            return false;
        }
        self.lifecycle = Lifecycle::Attached;
        true
    }

    pub fn destroy(&mut self) {
        self.lifecycle = Lifecycle::Destroyed;
    }

    pub fn any_task_done(&self) -> bool {
        self.sections.iter().any(|s| s.is_task && s.task_done)
    }

    pub fn section_index(&self, sub_content_id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == sub_content_id)
    }

    pub fn score(&self) -> u32 {
        self.sections
            .iter()
            .map(|s| score_or_zero(s.content.as_ref()))
            .sum()
    }

    pub fn max_score(&self) -> u32 {
        self.sections
            .iter()
            .map(|s| max_score_or_zero(s.content.as_ref()))
            .sum()
    }

    pub fn answer_given(&self) -> bool {
        self.sections
            .iter()
            .all(|s| answered_or_true(s.content.as_ref()))
    }

    pub fn activity(&self, content_id: u64) -> Activity {
        Activity::new(activity_id(content_id, Some(&self.id)), self.title.clone())
    }

    pub fn statement(&self, content_id: u64, verb: Verb) -> Statement {
        let score = self.score();
        let max = self.max_score();
        Statement::new(verb, self.activity(content_id))
            .with_scored_result(score, max, self.completed, score == max)
            .with_parent(activity_id(content_id, None))
    }

    /// Report for this chapter with the reports of its sections nested below.
    pub fn xapi_report(&self, content_id: u64) -> XapiReport {
        XapiReport {
            statement: self.statement(content_id, Verb::Answered),
            children: self
                .sections
                .iter()
                .filter(|s| s.content.supports(content::Capability::XapiData))
                .filter_map(|s| s.content.xapi_data())
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct ChapterRegistry {
    chapters: Vec<Chapter>,
}

impl ChapterRegistry {
    pub fn build(config: &BookConfig, factory: &dyn ContentFactory) -> Self {
        let chapters = config
            .chapters
            .iter()
            .map(|chapter| {
                let sections = chapter
                    .sections
                    .iter()
                    .map(|section| {
                        let instance = factory.create(config.content_id, section);
                        Section {
                            id: section.id.clone(),
                            title: section.title.clone(),
                            is_task: content::is_task(instance.as_ref()),
                            task_done: false,
                            content: instance,
                        }
                    })
                    .collect::<Vec<_>>();
                let tasks = sections.iter().filter(|s| s.is_task).count();
                Chapter {
                    id: chapter.id.clone(),
                    title: chapter.title.clone(),
                    sections,
                    completed: false,
                    tasks_left: tasks,
                    max_tasks: tasks,
                    lifecycle: Lifecycle::Unattached,
                }
            })
            .collect();
        Self { chapters }
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Chapter> {
        self.chapters.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Chapter> {
        self.chapters.iter_mut()
    }

    /// Linear scan by stable id; fragment-style prefixed ids are accepted.
    pub fn find_index_by_id(&self, chapter_id: &str) -> Option<usize> {
        let id = strip_chapter_prefix(chapter_id.trim());
        self.chapters.iter().position(|c| c.id == id)
    }

    /// A content-only chapter whose siblings have no tasks left.
    pub fn is_final_untasked_chapter(&self, index: usize) -> bool {
        let Some(chapter) = self.chapters.get(index) else {
            return false;
        };
        chapter.max_tasks == 0
            && self
                .chapters
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .all(|(_, c)| c.tasks_left == 0)
    }

    pub fn all_completed(&self) -> bool {
        self.chapters.iter().all(|c| c.completed)
    }
}
