//! WorkerInvoker over an OpenAI-compatible chat completions endpoint.
//!
//! worker_id ごとに model / base_url / api key を持つ profile を引いて、
//! 画像 URL 付きのプロンプトを投げ、json_schema で候補フォント 5 件を受け取る。

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::domain::{InvocationError, MAX_CANDIDATES, RankedLabels, Task, WorkerId};
use crate::ports::WorkerInvoker;

/// Connection settings for one worker.
#[derive(Debug, Clone)]
pub struct WorkerProfile {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Structured answer: up to five nullable candidates, best first.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateFonts {
    candidate_font_1: Option<String>,
    candidate_font_2: Option<String>,
    candidate_font_3: Option<String>,
    candidate_font_4: Option<String>,
    candidate_font_5: Option<String>,
}

impl CandidateFonts {
    fn into_ranked(self) -> RankedLabels {
        RankedLabels::from_candidates([
            self.candidate_font_1,
            self.candidate_font_2,
            self.candidate_font_3,
            self.candidate_font_4,
            self.candidate_font_5,
        ])
    }
}

fn candidate_schema() -> serde_json::Value {
    let names: Vec<String> = (1..=MAX_CANDIDATES)
        .map(|n| format!("candidate_font_{n}"))
        .collect();
    let properties: serde_json::Map<String, serde_json::Value> = names
        .iter()
        .map(|name| (name.clone(), json!({ "type": ["string", "null"] })))
        .collect();
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "font_candidates",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": properties,
                "required": names,
                "additionalProperties": false,
            }
        }
    })
}

pub(crate) fn build_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "You are an expert at identifying fonts. You are provided an image, and your goal is to \
         identify the font used in the image. The image comes from a forum where users post \
         images of fonts they are trying to identify.\n\n\
         Some images may contain multiple fonts. In that case use the context provided by the \
         user to pick the most relevant one.\n\n\
         You may give up to {MAX_CANDIDATES} guesses, best first. Leave a guess empty if you \
         are unsure.\n\n\
         The title the user chose when posting the image is {:?}.",
        task.title
    );
    if let Some(instructions) = task
        .user_instructions
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        prompt.push_str("\n\nAdditional instructions provided by the user: ");
        prompt.push_str(instructions);
    }
    prompt
}

fn build_request<'a>(task: &'a Task, model: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: build_prompt(task),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: &task.image_url,
                    },
                },
            ],
        }],
        temperature: 0.0,
        response_format: candidate_schema(),
    }
}

pub(crate) fn parse_response(body: &str) -> Result<RankedLabels, InvocationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InvocationError::Malformed(format!("response body: {e}")))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| InvocationError::Malformed("no message content".into()))?;
    let fonts: CandidateFonts = serde_json::from_str(&content)
        .map_err(|e| InvocationError::Malformed(format!("candidate payload: {e}")))?;
    Ok(fonts.into_ranked())
}

// ============================================================================
// ChatInvoker
// ============================================================================

/// Routes each call by worker id to its configured profile.
pub struct ChatInvoker {
    http: reqwest::Client,
    profiles: IndexMap<WorkerId, WorkerProfile>,
}

impl ChatInvoker {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            profiles: IndexMap::new(),
        })
    }

    pub fn with_profile(mut self, worker_id: WorkerId, profile: WorkerProfile) -> Self {
        self.profiles.insert(worker_id, profile);
        self
    }

    /// Build profiles from config, reading each api key through `lookup`
    /// (normally the process environment).
    pub fn from_config<F>(
        workers: &[WorkerConfig],
        timeout: Duration,
        lookup: F,
    ) -> Result<Self, InvocationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut invoker =
            Self::new(timeout).map_err(|e| InvocationError::Config(e.to_string()))?;
        for worker in workers {
            let api_key = lookup(&worker.api_key_env).ok_or_else(|| {
                InvocationError::Config(format!(
                    "{} is not set (api key for worker {})",
                    worker.api_key_env, worker.id
                ))
            })?;
            invoker = invoker.with_profile(
                worker.id.clone(),
                WorkerProfile {
                    model: worker.model.clone(),
                    base_url: worker.base_url.trim_end_matches('/').to_string(),
                    api_key,
                },
            );
        }
        Ok(invoker)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerId> {
        self.profiles.keys()
    }
}

#[async_trait]
impl WorkerInvoker for ChatInvoker {
    async fn invoke(
        &self,
        task: &Task,
        worker_id: &WorkerId,
    ) -> Result<RankedLabels, InvocationError> {
        let profile = self
            .profiles
            .get(worker_id)
            .ok_or_else(|| InvocationError::UnknownWorker(worker_id.clone()))?;

        debug!(task_id = %task.task_id, worker_id = %worker_id, model = %profile.model, "invoking worker");

        let response = self
            .http
            .post(format!("{}/chat/completions", profile.base_url))
            .bearer_auth(&profile.api_key)
            .json(&build_request(task, &profile.model))
            .send()
            .await
            .map_err(|e| InvocationError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(status = %status, worker_id = %worker_id, "worker api error");
            return Err(InvocationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::sample_task;

    #[test]
    fn prompt_carries_title_and_instructions() {
        let mut task = sample_task("1", None);
        task.title = "Logo lettering".into();
        assert!(build_prompt(&task).contains("\"Logo lettering\""));
        assert!(!build_prompt(&task).contains("Additional instructions"));

        task.user_instructions = Some("the lower line only".into());
        assert!(build_prompt(&task).ends_with("the lower line only"));
    }

    #[test]
    fn request_attaches_image_and_schema() {
        let task = sample_task("1", None);
        let body = serde_json::to_value(build_request(&task, "gpt-4o-mini")).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], task.image_url.as_str());

        let schema = &body["response_format"]["json_schema"]["schema"];
        assert_eq!(schema["required"].as_array().unwrap().len(), MAX_CANDIDATES);
        assert_eq!(
            schema["properties"]["candidate_font_5"]["type"],
            json!(["string", "null"])
        );
    }

    #[test]
    fn response_keeps_order_and_drops_blanks() {
        let content = json!({
            "candidate_font_1": "Futura",
            "candidate_font_2": null,
            "candidate_font_3": "  ",
            "candidate_font_4": "Avenir",
            "candidate_font_5": null,
        })
        .to_string();
        let body = json!({ "choices": [{ "message": { "content": content } }] }).to_string();

        let ranked = parse_response(&body).unwrap();
        assert_eq!(ranked.as_slice(), ["Futura", "Avenir"]);
    }

    #[test]
    fn response_without_content_is_malformed() {
        let body = json!({ "choices": [] }).to_string();
        assert!(matches!(
            parse_response(&body),
            Err(InvocationError::Malformed(_))
        ));
        assert!(matches!(
            parse_response("not json"),
            Err(InvocationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_worker_is_rejected_before_any_request() {
        let invoker = ChatInvoker::new(Duration::from_secs(1)).unwrap();
        let task = sample_task("1", None);
        let err = invoker
            .invoke(&task, &WorkerId::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownWorker(_)));
    }

    #[test]
    fn missing_api_key_fails_at_construction() {
        let workers = vec![WorkerConfig {
            id: WorkerId::new("gpt-4o-mini"),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1/".into(),
            api_key_env: "FONTBENCH_TEST_KEY".into(),
        }];

        let err = ChatInvoker::from_config(&workers, Duration::from_secs(1), |_| None)
            .err()
            .unwrap();
        assert!(matches!(err, InvocationError::Config(_)));

        let invoker = ChatInvoker::from_config(&workers, Duration::from_secs(1), |_| {
            Some("sk-test".into())
        })
        .unwrap();
        assert_eq!(invoker.workers().count(), 1);
        assert_eq!(
            invoker.profiles[&WorkerId::new("gpt-4o-mini")].base_url,
            "https://api.openai.com/v1"
        );
    }
}
