//! Scenario instructions and chat-history assembly for the generation call.

use crate::inference::{ChatMessage, Chunk};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prompt/pipeline scenario selectable per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scenario {
    /// Anonymize, reformulate, then search local and internet collections together
    #[serde(rename = "v1.0")]
    V1_0,
    #[default]
    #[serde(rename = "v2.0")]
    V2_0,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::V1_0, Scenario::V2_0];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::V1_0 => "v1.0",
            Scenario::V2_0 => "v2.0",
        }
    }

    pub fn instructions(&self) -> &'static Instructions {
        match self {
            Scenario::V1_0 => &INSTRUCTIONS_V1_0,
            Scenario::V2_0 => &INSTRUCTIONS_V2_0,
        }
    }

    /// Comma separated list used in validation messages
    pub fn available_values() -> String {
        Self::ALL.iter().map(Scenario::as_str).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("Wrong config : available values are {}", Self::available_values()))
    }
}

#[derive(Debug)]
pub struct Instructions {
    pub generate_instruction: &'static str,
    pub generate_instruction_idcc: &'static str,
    pub reformulation: Option<&'static str>,
    pub split_multiple_queries: Option<&'static str>,
}

static INSTRUCTIONS_V1_0: Instructions = Instructions {
    generate_instruction: include_str!("instructions/generate_v1.md"),
    generate_instruction_idcc: include_str!("instructions/generate_idcc_v1.md"),
    reformulation: Some(include_str!("instructions/reformulation_v1.md")),
    split_multiple_queries: Some(include_str!("instructions/split_queries_v1.md")),
};

static INSTRUCTIONS_V2_0: Instructions = Instructions {
    generate_instruction: include_str!("instructions/generate_v2.md"),
    generate_instruction_idcc: include_str!("instructions/generate_idcc_v2.md"),
    reformulation: None,
    split_multiple_queries: None,
};

const AGREEMENT_URL_PLACEHOLDER: &str = "[URL_convention_collective]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    Long,
    Short,
}

impl AnswerType {
    fn directive(&self) -> &'static str {
        match self {
            AnswerType::Long => {
                "# 📏 Longueur de la réponse\n\nDonnez une réponse détaillée : exposez les conditions, \
                 les exceptions et les délais applicables."
            }
            AnswerType::Short => {
                "# 📏 Longueur de la réponse\n\nDonnez une réponse courte : une dizaine de lignes au \
                 maximum, limitée à l'essentiel."
            }
        }
    }
}

/// How the answer length variant is chosen for each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerTypePolicy {
    /// Fair coin flip per request
    Random,
    Long,
    Short,
}

impl AnswerTypePolicy {
    pub fn pick(&self) -> AnswerType {
        match self {
            AnswerTypePolicy::Random => {
                if rand::random::<bool>() {
                    AnswerType::Long
                } else {
                    AnswerType::Short
                }
            }
            AnswerTypePolicy::Long => AnswerType::Long,
            AnswerTypePolicy::Short => AnswerType::Short,
        }
    }
}

impl FromStr for AnswerTypePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(AnswerTypePolicy::Random),
            "long" => Ok(AnswerTypePolicy::Long),
            "short" => Ok(AnswerTypePolicy::Short),
            other => Err(format!("Invalid ANSWER_TYPE '{}': expected random, long or short", other)),
        }
    }
}

/// Render chunks as the source listing given to the model
pub fn format_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "Source: {} ({})\nContenu: {}\n---",
                chunk.metadata.source, chunk.metadata.url, chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sources_message(general: &[Chunk], idcc: Option<&[Chunk]>, subject: &str) -> ChatMessage {
    let content = match idcc {
        Some(idcc) => format!(
            " 2 types de documents sont ajoutées dans la base de connaissance externe :\n\n\
             ### Documents généralistes :\n{}\n\n\
             ### Documents spécifiques à la convention collective renseignée :\n{}",
            format_chunks(general),
            format_chunks(idcc)
        ),
        None => format!(
            "Voici les sources pertinentes pour répondre à {}:\n\n{}",
            subject,
            format_chunks(general)
        ),
    };
    ChatMessage::user(content)
}

/// Question followed by its sources. IDCC chunks get their own section when an agreement was given.
pub fn chat_history(query: &str, general: &[Chunk], idcc: Option<&[Chunk]>) -> Vec<ChatMessage> {
    vec![ChatMessage::user(query), sources_message(general, idcc, "la question")]
}

/// Three-turn exchange: first question, first answer, followup, then sources
pub fn followup_chat_history(
    query1: &str,
    answer1: &str,
    query2: &str,
    general: &[Chunk],
    idcc: Option<&[Chunk]>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::user(format!("Contexte - Question initiale: \"{}\"", query1)),
        ChatMessage::assistant(format!("Première réponse: \"{}\"", answer1)),
        ChatMessage::user(format!("Nouvelle question ou retour: \"{}\"", query2)),
        sources_message(general, idcc, "la nouvelle question"),
    ]
}

/// Scenario instruction, agreement link and length directive
pub fn system_prompt(
    scenario: Scenario,
    idcc: Option<&str>,
    agreements_site_url: &str,
    answer_type: AnswerType,
) -> String {
    let instructions = scenario.instructions();
    let base = match idcc {
        Some(idcc) => instructions.generate_instruction_idcc.replace(
            AGREEMENT_URL_PLACEHOLDER,
            &format!("{}/convention-collective/{}", agreements_site_url.trim_end_matches('/'), idcc),
        ),
        None => instructions.generate_instruction.to_string(),
    };
    format!("{}\n\n{}", base.trim_end(), answer_type.directive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::chunk;
    use crate::inference::Role;

    #[test]
    fn test_scenario_parsing() {
        assert_eq!("v2.0".parse::<Scenario>(), Ok(Scenario::V2_0));
        assert_eq!("v1.0".parse::<Scenario>(), Ok(Scenario::V1_0));
        let err = "v9".parse::<Scenario>().unwrap_err();
        assert_eq!(err, "Wrong config : available values are v1.0,v2.0");
        assert_eq!(Scenario::default(), Scenario::V2_0);
    }

    #[test]
    fn test_scenario_serde_names() {
        assert_eq!(serde_json::to_value(Scenario::V1_0).unwrap(), "v1.0");
        let parsed: Scenario = serde_json::from_str("\"v2.0\"").unwrap();
        assert_eq!(parsed, Scenario::V2_0);
    }

    #[test]
    fn test_only_legacy_scenario_reformulates() {
        assert!(Scenario::V1_0.instructions().reformulation.is_some());
        assert!(Scenario::V2_0.instructions().reformulation.is_none());
    }

    #[test]
    fn test_format_chunks() {
        let c = chunk("doc-1", 0.5, "Le salarié a droit à 5 semaines de congés.");
        let formatted = format_chunks(&[c.clone(), c]);
        assert_eq!(
            formatted.lines().next(),
            Some("Source: fiches_service_public (https://code.travail.gouv.fr/doc-1)")
        );
        assert_eq!(formatted.matches("---").count(), 2);
        assert_eq!(format_chunks(&[]), "");
    }

    #[test]
    fn test_chat_history_without_idcc() {
        let history = chat_history("Combien de congés ?", &[chunk("doc-1", 0.5, "5 semaines")], None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Combien de congés ?");
        assert!(history[1].content.starts_with("Voici les sources pertinentes pour répondre à la question"));
        assert!(history[1].content.contains("5 semaines"));
    }

    #[test]
    fn test_chat_history_with_idcc_sections() {
        let general = [chunk("doc-1", 0.5, "droit commun")];
        let idcc = [chunk("doc-2", 0.5, "accord de branche")];
        let history = chat_history("Préavis ?", &general, Some(&idcc));
        let sources = &history[1].content;
        let general_pos = sources.find("### Documents généralistes").unwrap();
        let idcc_pos = sources.find("### Documents spécifiques").unwrap();
        assert!(general_pos < idcc_pos);
        assert!(sources[general_pos..idcc_pos].contains("droit commun"));
        assert!(sources[idcc_pos..].contains("accord de branche"));
    }

    #[test]
    fn test_followup_history_is_three_turns_plus_sources() {
        let history = followup_chat_history("Q1", "R1", "Q2", &[chunk("doc-1", 0.5, "x")], None);
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::User]);
        assert_eq!(history[0].content, "Contexte - Question initiale: \"Q1\"");
        assert_eq!(history[1].content, "Première réponse: \"R1\"");
        assert_eq!(history[2].content, "Nouvelle question ou retour: \"Q2\"");
        assert!(history[3].content.contains("la nouvelle question"));
    }

    #[test]
    fn test_system_prompt_idcc_link() {
        let prompt = system_prompt(Scenario::V2_0, Some("1486"), "https://code.travail.gouv.fr/", AnswerType::Short);
        assert!(prompt.contains("https://code.travail.gouv.fr/convention-collective/1486"));
        assert!(!prompt.contains(AGREEMENT_URL_PLACEHOLDER));
        assert!(prompt.ends_with(AnswerType::Short.directive()));
    }

    #[test]
    fn test_system_prompt_general() {
        let prompt = system_prompt(Scenario::V2_0, None, "https://code.travail.gouv.fr", AnswerType::Long);
        assert!(prompt.starts_with(INSTRUCTIONS_V2_0.generate_instruction.trim_end()));
        assert!(prompt.contains("réponse détaillée"));
    }

    #[test]
    fn test_answer_type_policy() {
        assert_eq!("LONG".parse::<AnswerTypePolicy>(), Ok(AnswerTypePolicy::Long));
        assert!("medium".parse::<AnswerTypePolicy>().is_err());
        assert_eq!(AnswerTypePolicy::Short.pick(), AnswerType::Short);

        let picks: Vec<AnswerType> = (0..200).map(|_| AnswerTypePolicy::Random.pick()).collect();
        assert!(picks.contains(&AnswerType::Long));
        assert!(picks.contains(&AnswerType::Short));
    }
}
