use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

use crate::pipeline::AnswerTypePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub auth: AuthConfig,
    pub agreements: AgreementsConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database features are disabled when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub api_base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub chatgpt_name: String,
    pub chatgpt_api_key: String,
    pub mistral_name: String,
    pub mistral_api_key: String,
    pub albert_name: String,
    pub albert_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub app_access_key: String,
    pub session_secret: String,
    pub allowed_email_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgreementsConfig {
    pub site_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub answer_type: AnswerTypePolicy,
}

pub const DEFAULT_ALLOWED_EMAIL_DOMAINS: &[&str] = &[
    "aisne.gouv.fr",
    "bouches-du-rhone.gouv.fr",
    "calvados.gouv.fr",
    "charente-maritime.gouv.fr",
    "charente.gouv.fr",
    "correze.gouv.fr",
    "creuse.gouv.fr",
    "deux-sevres.gouv.fr",
    "dordogne.gouv.fr",
    "drieets.gouv.fr",
    "eure.gouv.fr",
    "fabrique.social.gouv.fr",
    "gironde.gouv.fr",
    "haute-vienne.gouv.fr",
    "landes.gouv.fr",
    "lot-et-garonne.gouv.fr",
    "maine-et-loire.gouv.fr",
    "manche.gouv.fr",
    "nord.gouv.fr",
    "oise.gouv.fr",
    "orne.gouv.fr",
    "pas-de-calais.gouv.fr",
    "pyrenees-atlantiques.gouv.fr",
    "seine-maritime.gouv.fr",
    "sg.social.gouv.fr",
    "somme.gouv.fr",
    "travail.gouv.fr",
    "vienne.gouv.fr",
];

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let allowed_email_domains = match env::var("ALLOWED_EMAIL_DOMAINS") {
            Ok(raw) => split_list(&raw),
            Err(_) => DEFAULT_ALLOWED_EMAIL_DOMAINS.iter().map(|d| d.to_string()).collect(),
        };

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .context("PORT must be a valid port number")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()?,
                connect_timeout_secs: 10,
                idle_timeout_secs: 30,
            },
            inference: InferenceConfig {
                api_base_url: env::var("API_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
                api_key: env::var("AUTH_API_KEY").unwrap_or_default(),
            },
            models: ModelsConfig {
                chatgpt_name: env::var("CHATGPT_MODEL_NAME").unwrap_or_default(),
                chatgpt_api_key: env::var("CHATGPT_LLM_API_KEY").unwrap_or_default(),
                mistral_name: env::var("MISTRAL_MODEL_NAME").unwrap_or_default(),
                mistral_api_key: env::var("MISTRAL_LLM_API_KEY").unwrap_or_default(),
                albert_name: env::var("ALBERT_MODEL_NAME").unwrap_or_default(),
                albert_api_key: env::var("ALBERT_LLM_API_KEY").unwrap_or_default(),
            },
            auth: AuthConfig {
                app_access_key: env::var("APP_ACCESS_KEY").unwrap_or_default(),
                session_secret: env::var("SESSION_SECRET")
                    .context("SESSION_SECRET must be set")?,
                allowed_email_domains,
            },
            agreements: AgreementsConfig {
                site_url: env::var("AGREEMENTS_SITE_URL")
                    .unwrap_or_else(|_| "https://code.travail.gouv.fr".to_string()),
            },
            pipeline: PipelineConfig {
                answer_type: env::var("ANSWER_TYPE")
                    .unwrap_or_else(|_| "random".to_string())
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?,
            },
        })
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 0,
                connect_timeout_secs: 10,
                idle_timeout_secs: 30,
            },
            inference: InferenceConfig {
                api_base_url: "http://localhost:8000".to_string(),
                api_key: "test-api-key".to_string(),
            },
            models: ModelsConfig {
                chatgpt_name: "gpt-4o".to_string(),
                chatgpt_api_key: "sk-chatgpt".to_string(),
                mistral_name: "mistral-large".to_string(),
                mistral_api_key: "sk-mistral".to_string(),
                albert_name: "albert-large".to_string(),
                albert_api_key: "sk-albert".to_string(),
            },
            auth: AuthConfig {
                app_access_key: "open-sesame".to_string(),
                session_secret: "test-session-secret".to_string(),
                allowed_email_domains: vec!["travail.gouv.fr".to_string(), "nord.gouv.fr".to_string()],
            },
            agreements: AgreementsConfig {
                site_url: "https://code.travail.gouv.fr".to_string(),
            },
            pipeline: PipelineConfig {
                answer_type: AnswerTypePolicy::Random,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_normalizes_entries() {
        assert_eq!(
            split_list(" Nord.gouv.fr, ,travail.gouv.fr "),
            vec!["nord.gouv.fr".to_string(), "travail.gouv.fr".to_string()]
        );
    }
}
