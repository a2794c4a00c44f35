use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const VERB_BASE: &str = "http://adlnet.gov/expapi/verbs";
const INTERACTION_TYPE: &str = "http://adlnet.gov/expapi/activities/cmi.interaction";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Answered,
    Completed,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.rsplit('/').next().unwrap_or(raw);
        match raw.to_ascii_lowercase().as_str() {
            "answered" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A completion statement reported to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub verb: StatementVerb,
    pub object: Activity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StatementResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<StatementContext>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementVerb {
    pub id: String,
    pub display: LanguageMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub object_type: String,
    pub definition: ActivityDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    pub name: LanguageMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LanguageMap>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LanguageMap {
    #[serde(rename = "en-US")]
    pub en_us: String,
}

impl LanguageMap {
    pub fn new(text: impl Into<String>) -> Self {
        Self { en_us: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementResult {
    pub score: ScoreResult,
    pub completion: bool,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub min: u32,
    pub max: u32,
    pub raw: u32,
    pub scaled: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementContext {
    pub parent_activity_id: String,
}

/// A statement with the reports of the instances nested below it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XapiReport {
    pub statement: Statement,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XapiReport>,
}

/// `urn:h5p:<content>` or `urn:h5p:<content>?subContentId=<sub>`.
pub fn activity_id(content_id: u64, sub_content_id: Option<&str>) -> String {
    match sub_content_id {
        Some(sub) => format!("urn:h5p:{content_id}?subContentId={sub}"),
        None => format!("urn:h5p:{content_id}"),
    }
}

impl Statement {
    pub fn new(verb: Verb, object: Activity) -> Self {
        Self {
            verb: StatementVerb {
                id: format!("{VERB_BASE}/{}", verb.as_str()),
                display: LanguageMap::new(verb.as_str()),
            },
            object,
            result: None,
            context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_scored_result(mut self, raw: u32, max: u32, completion: bool, success: bool) -> Self {
        let scaled = if max == 0 {
            0.0
        } else {
            (f64::from(raw) / f64::from(max) * 10_000.0).round() / 10_000.0
        };
        self.result = Some(StatementResult {
            score: ScoreResult {
                min: 0,
                max,
                raw,
                scaled,
            },
            completion,
            success,
        });
        self
    }

    pub fn with_parent(mut self, parent_activity_id: impl Into<String>) -> Self {
        self.context = Some(StatementContext {
            parent_activity_id: parent_activity_id.into(),
        });
        self
    }

    pub fn verb(&self) -> Option<Verb> {
        Verb::parse(&self.verb.id)
    }

    pub fn raw_score(&self) -> Option<u32> {
        self.result.as_ref().map(|r| r.score.raw)
    }

    pub fn max_score(&self) -> Option<u32> {
        self.result.as_ref().map(|r| r.score.max)
    }
}

impl Activity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: "Activity".to_owned(),
            definition: ActivityDefinition {
                name: LanguageMap::new(name),
                ..ActivityDefinition::default()
            },
        }
    }

    /// Definition used for the book itself: a compound interaction.
    pub fn compound(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut activity = Self::new(id, name);
        activity.definition.interaction_type = Some("compound".to_owned());
        activity.definition.activity_type = Some(INTERACTION_TYPE.to_owned());
        activity.definition.description = Some(LanguageMap::new(""));
        activity
    }
}
