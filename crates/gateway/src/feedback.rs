//! `POST /api/feedback` — post-call transcript scoring (spec §6).
//!
//! Nine independent LLM calls (one per criterion) run concurrently via
//! `futures_util::future::join_all`, grounded on the teacher's pattern of
//! firing concurrent sub-calls and collecting them rather than awaiting each
//! in turn. The category/overall rollup is a pure function over the 9
//! booleans, unit-tested without touching the network.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use voiceagent_domain::persona::Persona;
use voiceagent_domain::stream::LlmEvent;
use voiceagent_domain::tool::Message;
use voiceagent_providers::traits::LlmProvider;
use voiceagent_providers::OpenAiCompatLlm;

use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Criterion {
    category: &'static str,
    name: &'static str,
    prompt: &'static str,
}

const CRITERIA: [Criterion; 9] = [
    Criterion {
        category: "Opener",
        name: "Introduced self and company",
        prompt: "Did the assistant clearly introduce themselves and their company at the start of the call?",
    },
    Criterion {
        category: "Opener",
        name: "Stated reason for calling",
        prompt: "Did the assistant clearly state the reason for the call early on?",
    },
    Criterion {
        category: "Social Proof",
        name: "Referenced a relevant customer or result",
        prompt: "Did the assistant reference a relevant customer, case study, or result as social proof?",
    },
    Criterion {
        category: "Social Proof",
        name: "Tied social proof to the prospect's situation",
        prompt: "Did the assistant connect the social proof back to the prospect's specific situation?",
    },
    Criterion {
        category: "Discovery",
        name: "Asked an open-ended discovery question",
        prompt: "Did the assistant ask at least one open-ended question to learn about the prospect's needs?",
    },
    Criterion {
        category: "Closing",
        name: "Proposed a concrete next step",
        prompt: "Did the assistant propose a concrete next step (e.g. a meeting or demo)?",
    },
    Criterion {
        category: "Closing",
        name: "Confirmed the next step with the prospect",
        prompt: "Did the assistant get explicit confirmation from the prospect on the proposed next step?",
    },
    Criterion {
        category: "Takeaway",
        name: "Summarized the call",
        prompt: "Did the assistant summarize the key points of the call before ending it?",
    },
    Criterion {
        category: "Takeaway",
        name: "Thanked the prospect",
        prompt: "Did the assistant thank the prospect for their time before ending the call?",
    },
];

#[derive(Debug, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub transcript: Vec<TranscriptEntry>,
    #[allow(dead_code)]
    pub persona: Persona,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Score {
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct CriterionResult {
    pub name: &'static str,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub struct CategoryResult {
    pub name: &'static str,
    pub score: Score,
    pub criteria: Vec<CriterionResult>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    #[serde(rename = "overallScore")]
    pub overall_score: Score,
    pub categories: Vec<CategoryResult>,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

pub async fn feedback_handler(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> impl IntoResponse {
    let transcript_text = render_transcript(&req.transcript);

    let judgments = join_all(
        CRITERIA
            .iter()
            .map(|criterion| evaluate_criterion(state.llm.clone(), *criterion, &transcript_text)),
    )
    .await;

    let response = assemble_response(&judgments);
    (StatusCode::OK, Json(response))
}

fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn evaluate_criterion(
    llm: std::sync::Arc<OpenAiCompatLlm>,
    criterion: Criterion,
    transcript_text: &str,
) -> (Criterion, bool) {
    let messages = vec![
        Message::system(
            "You grade sales call transcripts against a single yes/no criterion. \
             Respond with exactly one word: true or false.",
        ),
        Message::user(format!(
            "Transcript:\n{transcript_text}\n\nCriterion: {}\n\nDid the transcript clearly demonstrate this?",
            criterion.prompt
        )),
    ];

    let cancel = CancellationToken::new();
    let mut rx = match llm.open(&messages, cancel).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!(criterion = criterion.name, error = %e, "feedback llm call failed");
            return (criterion, false);
        }
    };

    let mut reply = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            Ok(LlmEvent::Token { text }) => reply.push_str(&text),
            Ok(LlmEvent::Done) => break,
            Err(e) => {
                tracing::warn!(criterion = criterion.name, error = %e, "feedback llm stream error");
                break;
            }
        }
    }

    (criterion, reply.to_lowercase().contains("true"))
}

fn assemble_response(judgments: &[(Criterion, bool)]) -> FeedbackResponse {
    let mut categories: Vec<CategoryResult> = Vec::new();
    for (criterion, passed) in judgments {
        if !categories.iter().any(|c| c.name == criterion.category) {
            categories.push(CategoryResult {
                name: criterion.category,
                score: Score { correct: 0, total: 0 },
                criteria: Vec::new(),
            });
        }
        let category = categories
            .iter_mut()
            .find(|c| c.name == criterion.category)
            .unwrap();
        category.criteria.push(CriterionResult {
            name: criterion.name,
            passed: *passed,
        });
        category.score.total += 1;
        if *passed {
            category.score.correct += 1;
        }
    }

    let overall_score = Score {
        correct: judgments.iter().filter(|(_, passed)| *passed).count() as u32,
        total: judgments.len() as u32,
    };

    let strengths = judgments
        .iter()
        .filter(|(_, passed)| *passed)
        .map(|(c, _)| c.name.to_string())
        .collect();
    let improvements = judgments
        .iter()
        .filter(|(_, passed)| !*passed)
        .map(|(c, _)| c.name.to_string())
        .collect();

    let summary = format!(
        "Met {} of {} criteria across {} categories.",
        overall_score.correct,
        overall_score.total,
        categories.len()
    );

    FeedbackResponse {
        overall_score,
        categories,
        summary,
        strengths,
        improvements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_categories_and_overall_score() {
        let judgments: Vec<(Criterion, bool)> = CRITERIA
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i % 2 == 0))
            .collect();
        let response = assemble_response(&judgments);
        assert_eq!(response.overall_score.total, 9);
        assert_eq!(response.overall_score.correct, 5);
        assert_eq!(response.categories.len(), 5);
        let opener = response
            .categories
            .iter()
            .find(|c| c.name == "Opener")
            .unwrap();
        assert_eq!(opener.score.total, 2);
    }

    #[test]
    fn strengths_and_improvements_partition_criteria() {
        let judgments: Vec<(Criterion, bool)> =
            CRITERIA.iter().map(|c| (*c, c.category == "Opener")).collect();
        let response = assemble_response(&judgments);
        assert_eq!(response.strengths.len(), 2);
        assert_eq!(response.improvements.len(), 7);
    }
}
