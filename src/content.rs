use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::SectionConfig;
use crate::xapi::{Activity, Statement, Verb, XapiReport, activity_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Score,
    AnswerGiven,
    ShowSolutions,
    Reset,
    XapiData,
    Pause,
    ReadSpeaker,
}

/// Score carried by a child's answered/completed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResult {
    pub score: u32,
    #[serde(default)]
    pub max_score: Option<u32>,
}

/// An embedded content instance created by the host platform. The book never
/// inspects its concrete type; it asks [`EmbeddedContent::supports`] and treats
/// a missing capability as a benign default (score 0, answered).
pub trait EmbeddedContent: Send {
    fn sub_content_id(&self) -> &str;

    fn supports(&self, capability: Capability) -> bool;

    fn score(&self) -> Option<u32> {
        None
    }

    fn max_score(&self) -> Option<u32> {
        None
    }

    fn answer_given(&self) -> Option<bool> {
        None
    }

    fn xapi_data(&self) -> Option<XapiReport> {
        None
    }

    fn show_solutions(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn toggle_read_speaker(&mut self, _enabled: bool) {}

    fn resize(&mut self) {}

    /// Called when the instance reports a result through the host's event channel.
    fn observe_result(&mut self, _result: &ContentResult) {}
}

/// A section is a task iff it exposes a positive maximum score.
pub fn is_task(content: &dyn EmbeddedContent) -> bool {
    content.supports(Capability::Score) && content.max_score().unwrap_or(0) > 0
}

pub fn score_or_zero(content: &dyn EmbeddedContent) -> u32 {
    if content.supports(Capability::Score) {
        content.score().unwrap_or(0)
    } else {
        0
    }
}

pub fn max_score_or_zero(content: &dyn EmbeddedContent) -> u32 {
    if content.supports(Capability::Score) {
        content.max_score().unwrap_or(0)
    } else {
        0
    }
}

pub fn answered_or_true(content: &dyn EmbeddedContent) -> bool {
    if content.supports(Capability::AnswerGiven) {
        content.answer_given().unwrap_or(true)
    } else {
        true
    }
}

/// Instantiates content for a configured section. Stands in for the host platform.
pub trait ContentFactory {
    fn create(&self, content_id: u64, section: &SectionConfig) -> Box<dyn EmbeddedContent>;
}

const MEDIA_LIBRARIES: [&str; 3] = ["H5P.Video", "H5P.Audio", "H5P.InteractiveVideo"];

/// Content whose state is driven entirely by reported results. Used by the CLI,
/// the host binary and tests.
#[derive(Debug, Clone)]
pub struct ScriptedContent {
    content_id: u64,
    sub_content_id: String,
    title: String,
    library: String,
    max_score: u32,
    score: u32,
    answered: bool,
    autoplay: bool,
    playing: bool,
    solutions_shown: bool,
    solutions_read_aloud: bool,
    speaks: bool,
    read_speaker: bool,
    resizes: u32,
    faults: HashSet<Capability>,
}

impl ScriptedContent {
    pub fn from_section(content_id: u64, section: &SectionConfig) -> Self {
        Self {
            content_id,
            sub_content_id: section.id.clone(),
            title: section.title.clone(),
            library: section.library.clone(),
            max_score: section.max_score,
            score: 0,
            answered: false,
            autoplay: section.autoplay,
            playing: section.autoplay,
            solutions_shown: false,
            solutions_read_aloud: false,
            speaks: false,
            read_speaker: false,
            resizes: 0,
            faults: HashSet::new(),
        }
    }

    /// Makes the given operation fail, to exercise fault isolation.
    pub fn with_fault(mut self, capability: Capability) -> Self {
        self.faults.insert(capability);
        self
    }

    /// Lets the book switch read-speaker announcements on around solutions.
    pub fn with_read_speaker(mut self) -> Self {
        self.speaks = true;
        self
    }

    pub fn is_media(&self) -> bool {
        MEDIA_LIBRARIES.contains(&self.library.split(' ').next().unwrap_or_default())
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn solutions_shown(&self) -> bool {
        self.solutions_shown
    }

    /// Whether solutions were revealed while read-speaker was on.
    pub fn solutions_read_aloud(&self) -> bool {
        self.solutions_read_aloud
    }

    pub fn read_speaker_enabled(&self) -> bool {
        self.read_speaker
    }

    pub fn resize_count(&self) -> u32 {
        self.resizes
    }

    fn is_scored(&self) -> bool {
        self.max_score > 0
    }

    fn check_fault(&self, capability: Capability) -> anyhow::Result<()> {
        if self.faults.contains(&capability) {
            anyhow::bail!("{} failed in {}", self.library, self.sub_content_id);
        }
        Ok(())
    }
}

impl EmbeddedContent for ScriptedContent {
    fn sub_content_id(&self) -> &str {
        &self.sub_content_id
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Score
            | Capability::AnswerGiven
            | Capability::ShowSolutions
            | Capability::XapiData => self.is_scored(),
            Capability::Reset => true,
            Capability::Pause => self.is_media(),
            Capability::ReadSpeaker => self.speaks,
        }
    }

    fn score(&self) -> Option<u32> {
        self.is_scored().then_some(self.score)
    }

    fn max_score(&self) -> Option<u32> {
        self.is_scored().then_some(self.max_score)
    }

    fn answer_given(&self) -> Option<bool> {
        self.is_scored().then_some(self.answered)
    }

    fn xapi_data(&self) -> Option<XapiReport> {
        if !self.is_scored() {
            return None;
        }
        let object = Activity::new(
            activity_id(self.content_id, Some(&self.sub_content_id)),
            self.title.clone(),
        );
        let statement = Statement::new(Verb::Answered, object)
            .with_scored_result(
                self.score,
                self.max_score,
                self.answered,
                self.score == self.max_score,
            )
            .with_parent(activity_id(self.content_id, None));
        Some(XapiReport {
            statement,
            children: Vec::new(),
        })
    }

    fn show_solutions(&mut self) -> anyhow::Result<()> {
        self.check_fault(Capability::ShowSolutions)?;
        self.solutions_shown = true;
        self.solutions_read_aloud = self.read_speaker;
        Ok(())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.check_fault(Capability::Reset)?;
        self.score = 0;
        self.answered = false;
        self.solutions_shown = false;
        self.solutions_read_aloud = false;
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.check_fault(Capability::Pause)?;
        self.playing = false;
        Ok(())
    }

    fn toggle_read_speaker(&mut self, enabled: bool) {
        self.read_speaker = enabled;
    }

    fn resize(&mut self) {
        self.resizes += 1;
    }

    fn observe_result(&mut self, result: &ContentResult) {
        if let Some(max) = result.max_score {
            self.max_score = max;
        }
        self.score = result.score.min(self.max_score);
        self.answered = true;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedContentFactory;

impl ContentFactory for ScriptedContentFactory {
    fn create(&self, content_id: u64, section: &SectionConfig) -> Box<dyn EmbeddedContent> {
        Box::new(ScriptedContent::from_section(content_id, section))
    }
}
