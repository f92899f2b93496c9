//! Plan and prompt generation.
//!
//! The generator turns free-form project requirements into a project plan,
//! then turns the plan into one AI prompt per main task. Both calls go to an
//! OpenAI-compatible chat-completions endpoint with a fixed role prompt. The
//! API key is supplied per call; the generator holds none of its own.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::GenerateError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 180;

/// Role prompt for the planning step.
pub const PROJECT_MANAGER_ROLE: &str = "You are a Project Manager. You oversee app development by \
coordinating multiple AI agents, managing schedules, allocating resources, and ensuring milestones \
are met on time and within scope. You have over 10 years of experience leading cross-functional \
software teams, with expertise in agile methodologies, risk management, and strategic planning.";

/// Role prompt for the prompt-writing step.
pub const PROMPT_ENGINEER_ROLE: &str = "You are a Prompt Engineer. You create effective, detailed \
AI prompts for each task in a project plan that guide AI systems to produce high-quality outputs \
aligned with the project requirements. You know how to structure prompts with the right context, \
constraints, and instructions to get optimal results.";

const VALIDATION_ROLE: &str = "You are a test agent used to verify API key validity.";

pub fn planning_request(requirements: &str) -> String {
    format!(
        "Analyze the following project requirements and create a detailed project plan:\n\n\
         {requirements}\n\n\
         The plan should include: 1) Major milestones and timeline, 2) Resource allocation, \
         3) Tasks for different phases (design, implementation, testing, deployment), \
         4) Roles and responsibilities. Make the plan specific enough for other agents to use. \
         Present each task under its own \"Task N:\" header and name who it is assigned to."
    )
}

pub fn prompts_request(plan: &str) -> String {
    format!(
        "Based on this project plan:\n\n{plan}\n\n\
         Create detailed AI prompts for each main task in the plan. Each prompt should contain: \
         1) Context about the project and task, 2) Clear instructions on what output is needed, \
         3) Constraints and requirements, 4) Evaluation criteria for good output, and \
         5) Examples of desired outputs where appropriate. Start each prompt with a \
         \"Prompt N:\" header numbered in the same order as the tasks."
    )
}

/// Produces plans and prompts from a language model.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(&self, api_key: &str, requirements: &str)
    -> Result<String, GenerateError>;

    async fn generate_prompts(&self, api_key: &str, plan: &str) -> Result<String, GenerateError>;

    /// Issue a minimal request to check that `api_key` is accepted.
    async fn validate_key(&self, api_key: &str) -> Result<(), GenerateError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// First choice's content, trimmed; empty content is an error.
    pub fn into_content(self) -> Result<String, GenerateError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(GenerateError::EmptyResponse)
    }
}

/// Map a non-success status from the provider.
pub fn classify_status(status: StatusCode, body: &str) -> GenerateError {
    match status {
        StatusCode::UNAUTHORIZED => GenerateError::InvalidKey,
        StatusCode::TOO_MANY_REQUESTS => GenerateError::RateLimited,
        _ if body.contains("Incorrect API key") || body.contains("invalid_api_key") => {
            GenerateError::InvalidKey
        }
        _ => GenerateError::Provider {
            status: status.as_u16(),
            message: body.chars().take(500).collect(),
        },
    }
}

/// `PlanGenerator` backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn complete(
        &self,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: Option<u32>,
    ) -> Result<String, GenerateError> {
        if api_key.trim().is_empty() {
            return Err(GenerateError::InvalidKey);
        }
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "could not reach model provider");
                GenerateError::Connection(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), error = %err, "model provider returned an error");
            return Err(err);
        }

        let parsed = resp
            .json::<ChatResponse>()
            .await
            .map_err(|e| GenerateError::Provider {
                status: status.as_u16(),
                message: format!("unreadable response: {}", e),
            })?;
        parsed.into_content()
    }
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    async fn generate_plan(
        &self,
        api_key: &str,
        requirements: &str,
    ) -> Result<String, GenerateError> {
        info!(model = %self.model, "generating project plan");
        let plan = self
            .complete(api_key, PROJECT_MANAGER_ROLE, &planning_request(requirements), None)
            .await?;
        debug!(chars = plan.len(), "project plan generated");
        Ok(plan)
    }

    async fn generate_prompts(&self, api_key: &str, plan: &str) -> Result<String, GenerateError> {
        info!(model = %self.model, "generating AI prompts");
        let prompts = self
            .complete(api_key, PROMPT_ENGINEER_ROLE, &prompts_request(plan), None)
            .await?;
        debug!(chars = prompts.len(), "AI prompts generated");
        Ok(prompts)
    }

    async fn validate_key(&self, api_key: &str) -> Result<(), GenerateError> {
        self.complete(
            api_key,
            VALIDATION_ROLE,
            "Respond with 'API key is valid' if you can read this message.",
            Some(16),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted generator for handler tests.

    use super::*;

    pub struct FakeGenerator {
        pub valid_key: String,
        pub plan: String,
        pub prompts: String,
    }

    impl FakeGenerator {
        pub fn new(valid_key: &str, plan: &str, prompts: &str) -> Self {
            Self {
                valid_key: valid_key.to_string(),
                plan: plan.to_string(),
                prompts: prompts.to_string(),
            }
        }

        fn check(&self, api_key: &str) -> Result<(), GenerateError> {
            match api_key {
                "sk-ratelimited" => Err(GenerateError::RateLimited),
                k if k == self.valid_key => Ok(()),
                _ => Err(GenerateError::InvalidKey),
            }
        }
    }

    #[async_trait]
    impl PlanGenerator for FakeGenerator {
        async fn generate_plan(
            &self,
            api_key: &str,
            _requirements: &str,
        ) -> Result<String, GenerateError> {
            self.check(api_key)?;
            Ok(self.plan.clone())
        }

        async fn generate_prompts(
            &self,
            api_key: &str,
            _plan: &str,
        ) -> Result<String, GenerateError> {
            self.check(api_key)?;
            Ok(self.prompts.clone())
        }

        async fn validate_key(&self, api_key: &str) -> Result<(), GenerateError> {
            self.check(api_key)
        }
    }
}
