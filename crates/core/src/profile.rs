//! Domain profiles - expertise-specific prompts selectable by name

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Placeholder shown while an answer is in flight.
pub const LOADING_PLACEHOLDER: &str = "Waiting for response...";

/// Example question of the fallback profile.
pub const SELECT_FIELD_PLACEHOLDER: &str = "Please select a field of expertise.";

/// System prompt used when no recognized profile is selected.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Your expertise fields are Natural Language Processing, Neural Networks and Large Language Models.";

/// A named area of expertise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainProfile {
    pub name: String,

    /// Example question suggested to the user
    #[serde(alias = "thematic_question")]
    pub thematic_question: String,

    /// Instruction prepended to the grounded QA prompt
    #[serde(alias = "QA_Prompt", alias = "system_prompt")]
    pub system_prompt: String,
}

impl DomainProfile {
    pub fn new(
        name: impl Into<String>,
        thematic_question: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            thematic_question: thematic_question.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Static set of profiles plus the fallback used for unknown names
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<DomainProfile>,
    fallback: DomainProfile,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileSet {
    pub fn new(profiles: Vec<DomainProfile>) -> Self {
        Self {
            profiles,
            fallback: DomainProfile::new("", SELECT_FIELD_PLACEHOLDER, DEFAULT_SYSTEM_PROMPT),
        }
    }

    /// The profiles shipped with the application
    pub fn builtin() -> Self {
        Self::new(vec![
            DomainProfile::new(
                "Large Language Models",
                "Ask about transformer neural networks architecture and its application.",
                "You are a helpful AI assistant. Your expertise fields are Natural Language Processing, Neural Networks and Large Language Models.",
            ),
            DomainProfile::new(
                "Physics",
                "Ask about quantum mechanics and its interpretations.",
                "You are a helpful AI assistant. Your expertise fields are Theoretical Physics, Quantum Mechanics and Field Theory.",
            ),
            DomainProfile::new(
                "Economy",
                "Ask about macroeconomic theories and their application.",
                "You are a helpful AI assistant. Your expertise fields are Microeconomics, Macroeconomics and Economic History.",
            ),
        ])
    }

    /// Parse a profile file.
    ///
    /// Accepts either a list of profiles or a map keyed by profile name,
    /// e.g. `{"Physics": {"thematicQuestion": "..", "QA_Prompt": ".."}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Entry {
            #[serde(alias = "thematicQuestion")]
            thematic_question: String,
            #[serde(alias = "QA_Prompt", alias = "systemPrompt")]
            system_prompt: String,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ProfileFile {
            List(Vec<DomainProfile>),
            Map(serde_json::Map<String, serde_json::Value>),
        }

        let profiles = match serde_json::from_str::<ProfileFile>(json)? {
            ProfileFile::List(profiles) => profiles,
            ProfileFile::Map(map) => map
                .into_iter()
                .map(|(name, value)| {
                    let entry: Entry = serde_json::from_value(value)?;
                    Ok(DomainProfile::new(name, entry.thematic_question, entry.system_prompt))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        if let Some(blank) = profiles.iter().find(|p| p.name.trim().is_empty()) {
            return Err(CoreError::InvalidProfiles(format!(
                "profile with example question {:?} has no name",
                blank.thematic_question
            )));
        }

        Ok(Self::new(profiles))
    }

    /// Look up a profile by exact name
    pub fn get(&self, name: &str) -> Option<&DomainProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Selected profile, or the fallback for absent/unknown names
    pub fn resolve(&self, name: Option<&str>) -> &DomainProfile {
        name.and_then(|n| self.get(n)).unwrap_or(&self.fallback)
    }

    /// Input placeholder for a front end
    pub fn placeholder(&self, loading: bool, name: Option<&str>) -> &str {
        if loading {
            LOADING_PLACEHOLDER
        } else {
            &self.resolve(name).thematic_question
        }
    }

    pub fn fallback(&self) -> &DomainProfile {
        &self.fallback
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
