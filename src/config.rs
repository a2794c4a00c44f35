use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::ValidateArgs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookConfig {
    pub content_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub show_cover_page: bool,
    #[serde(default)]
    pub behaviour: Behaviour,
    #[serde(default)]
    pub transition: TransitionTiming,
    pub chapters: Vec<ChapterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Behaviour {
    pub progress_indicators: bool,
    pub progress_auto: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            progress_indicators: true,
            progress_auto: true,
        }
    }
}

impl Behaviour {
    /// Manual mode: indicators on, completion only through "mark as finished".
    pub fn is_manual(&self) -> bool {
        self.progress_indicators && !self.progress_auto
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionTiming {
    /// Delay between staging the incoming panel and starting the slide.
    pub stagger_ms: u64,
    /// Delay before scrolling to a deep-linked section on load.
    pub deep_link_delay_ms: u64,
}

impl Default for TransitionTiming {
    fn default() -> Self {
        Self {
            stagger_ms: 50,
            deep_link_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SectionConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_library")]
    pub library: String,
    #[serde(default)]
    pub max_score: u32,
    #[serde(default)]
    pub autoplay: bool,
}

fn default_library() -> String {
    "H5P.AdvancedText".to_owned()
}

impl BookConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read book config: {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_yaml(&raw),
        }
        .with_context(|| format!("parse book config: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("deserialize book config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("deserialize book config json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chapters.is_empty() {
            anyhow::bail!("book has no chapters");
        }

        let mut chapter_ids = HashSet::new();
        for chapter in &self.chapters {
            if chapter.id.trim().is_empty() {
                anyhow::bail!("chapter id is empty (title: {:?})", chapter.title);
            }
            if !chapter_ids.insert(chapter.id.as_str()) {
                anyhow::bail!("duplicate chapter id: {}", chapter.id);
            }

            let mut section_ids = HashSet::new();
            for section in &chapter.sections {
                if section.id.trim().is_empty() {
                    anyhow::bail!("section id is empty in chapter {}", chapter.id);
                }
                if !section_ids.insert(section.id.as_str()) {
                    anyhow::bail!(
                        "duplicate section id in chapter {}: {}",
                        chapter.id,
                        section.id
                    );
                }
            }
        }
        Ok(())
    }

    /// Index of the chapter the book opens on for a given deep-link chapter id.
    pub fn initial_chapter_index(&self, deep_link_chapter: Option<&str>) -> usize {
        deep_link_chapter
            .map(crate::registry::strip_chapter_prefix)
            .and_then(|id| self.chapters.iter().position(|c| c.id == id))
            .unwrap_or(0)
    }

    /// Returns a copy where autoplay survives only in the chapter shown first, and
    /// nowhere when a cover page hides the book on arrival.
    pub fn with_autoplay_suppressed(&self, initial_chapter: usize) -> Self {
        let mut config = self.clone();
        for (index, chapter) in config.chapters.iter_mut().enumerate() {
            let keep = !self.show_cover_page && index == initial_chapter;
            if keep {
                continue;
            }
            for section in &mut chapter.sections {
                section.autoplay = false;
            }
        }
        config
    }
}

/// `interactive-book validate`: one summary line per chapter on stdout.
pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let config = BookConfig::load(&args.book)?;
    tracing::info!(
        content_id = config.content_id,
        chapters = config.chapters.len(),
        "book config is valid"
    );
    for (index, chapter) in config.chapters.iter().enumerate() {
        let tasks = chapter.sections.iter().filter(|s| s.max_score > 0).count();
        let max_score: u32 = chapter.sections.iter().map(|s| s.max_score).sum();
        println!(
            "{}\t{}\t{:?}\tsections={}\ttasks={}\tmax_score={}",
            index + 1,
            chapter.id,
            chapter.title,
            chapter.sections.len(),
            tasks,
            max_score
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
contentId: 7
title: Sample
chapters:
  - id: c1
    title: One
    sections:
      - id: s1
        autoplay: true
  - id: c2
    sections:
      - id: s2
        library: H5P.MultiChoice
        maxScore: 2
        autoplay: true
"#;

    #[test]
    fn yaml_defaults_apply() {
        let config = BookConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.content_id, 7);
        assert!(config.behaviour.progress_indicators);
        assert!(config.behaviour.progress_auto);
        assert_eq!(config.transition.stagger_ms, 50);
        assert_eq!(config.chapters[0].sections[0].library, "H5P.AdvancedText");
        assert_eq!(config.chapters[1].sections[0].max_score, 2);
    }

    #[test]
    fn duplicate_chapter_ids_are_rejected() {
        let raw = r#"{"contentId":1,"chapters":[{"id":"a"},{"id":"a"}]}"#;
        let err = BookConfig::from_json(raw).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate chapter id"));
    }

    #[test]
    fn empty_book_is_rejected() {
        let raw = r#"{"contentId":1,"chapters":[]}"#;
        assert!(BookConfig::from_json(raw).is_err());
    }

    #[test]
    fn autoplay_kept_only_in_initial_chapter() {
        let config = BookConfig::from_yaml(SAMPLE).unwrap();
        let suppressed = config.with_autoplay_suppressed(1);
        assert!(!suppressed.chapters[0].sections[0].autoplay);
        assert!(suppressed.chapters[1].sections[0].autoplay);
    }

    #[test]
    fn cover_page_disables_all_autoplay() {
        let mut config = BookConfig::from_yaml(SAMPLE).unwrap();
        config.show_cover_page = true;
        let suppressed = config.with_autoplay_suppressed(0);
        assert!(
            suppressed
                .chapters
                .iter()
                .flat_map(|c| &c.sections)
                .all(|s| !s.autoplay)
        );
    }

    #[test]
    fn initial_chapter_follows_prefixed_deep_link() {
        let config = BookConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.initial_chapter_index(None), 0);
        assert_eq!(config.initial_chapter_index(Some("c2")), 1);
        assert_eq!(
            config.initial_chapter_index(Some("h5p-interactive-book-chapter-c2")),
            1
        );
        assert_eq!(config.initial_chapter_index(Some("missing")), 0);
    }
}
