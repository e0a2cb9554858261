// Quiz generation shared by the HTTP endpoint and the function adapter.
//
// "ARD" is served from the local bank. Every other category goes to the LLM:
// build the prompts, request JSON, strip code fences, then check and decode
// the questions. Any failure is a `QuizError`; nothing is retried.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use quizsync_core::clock::Clock;
use quizsync_core::question::Quiz;
use quizsync_llm::prompt::{self, MIXED, SYSTEM_PROMPT};
use quizsync_llm::{ChatCompletion, LlmError};

use crate::ard::{ArdBank, ARD_CATEGORY};

#[derive(Debug, Error)]
pub enum QuizError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The completion text was not JSON.
    #[error("{0}")]
    NotJson(#[from] serde_json::Error),

    #[error("Invalid quiz structure: questions array is missing or empty")]
    MissingQuestions,

    #[error("Invalid quiz structure: {0}")]
    InvalidQuestion(String),
}

/// Request body of both quiz transports. Both fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl QuizRequest {
    /// Decode a request body. An empty body asks for a mixed quiz.
    pub fn from_body(body: &[u8]) -> Result<Self, QuizError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(body)?)
    }
}

pub struct QuizGenerator {
    bank: ArdBank,
    llm: Arc<dyn ChatCompletion>,
    clock: Arc<dyn Clock>,
}

impl QuizGenerator {
    pub fn new(bank: ArdBank, llm: Arc<dyn ChatCompletion>, clock: Arc<dyn Clock>) -> Self {
        Self { bank, llm, clock }
    }

    pub async fn generate(&self, request: &QuizRequest) -> Result<Quiz, QuizError> {
        let category = request.category.as_deref();
        let difficulty = request.difficulty.as_deref();
        let now_ms = self.clock.now_ms();

        if category == Some(ARD_CATEGORY) {
            let quiz = self.bank.draw(difficulty, now_ms, &mut rand::thread_rng());
            info!(questions = quiz.questions.len(), "ARD quiz drawn from local bank");
            return Ok(quiz);
        }

        let seed = prompt::random_seed(now_ms, &mut rand::thread_rng());
        let user_prompt = prompt::build_user_prompt(category, difficulty, &seed);
        info!(
            category = category.unwrap_or(MIXED),
            difficulty = difficulty.unwrap_or(MIXED),
            "generating quiz"
        );

        let content = self.llm.complete(SYSTEM_PROMPT, &user_prompt).await?;
        let quiz = parse_quiz(&content, now_ms)?;
        info!(questions = quiz.questions.len(), "quiz generated");
        Ok(quiz)
    }
}

/// Remove Markdown code fences the model sometimes wraps its JSON in.
pub fn strip_code_fences(content: &str) -> String {
    if !content.contains("```") {
        return content.to_string();
    }
    content
        .replace("```json\n", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Decode completion text into a quiz. `now_ms` names quizzes the model
/// returned without an id.
pub fn parse_quiz(content: &str, now_ms: i64) -> Result<Quiz, QuizError> {
    let value: Value = serde_json::from_str(&strip_code_fences(content))?;

    match value.get("questions").and_then(Value::as_array) {
        Some(questions) if !questions.is_empty() => {}
        _ => return Err(QuizError::MissingQuestions),
    }

    let mut quiz: Quiz =
        serde_json::from_value(value).map_err(|e| QuizError::InvalidQuestion(e.to_string()))?;
    for question in &quiz.questions {
        question
            .check_shape()
            .map_err(|e| QuizError::InvalidQuestion(e.to_string()))?;
    }

    if quiz.quiz_id.is_empty() {
        quiz.quiz_id = format!("quiz_{now_ms}");
        warn!(quiz_id = %quiz.quiz_id, "model omitted quiz_id, assigned one");
    }
    Ok(quiz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quizsync_core::clock::ManualClock;
    use quizsync_core::question::AnswerLetter;
    use std::sync::Mutex;

    /// Canned completion that records the prompts it was given.
    struct FakeLlm {
        reply: Mutex<Option<Result<String, LlmError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl FakeLlm {
        fn replying(reply: Result<String, LlmError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompletion for FakeLlm {
        async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push((system.to_string(), user.to_string()));
            self.reply.lock().unwrap().take().unwrap_or(Err(LlmError::EmptyContent))
        }
    }

    fn quiz_json(n: usize) -> String {
        let questions: Vec<Value> = (1..=n)
            .map(|i| {
                serde_json::json!({
                    "id": format!("q{i}"),
                    "category": "Space",
                    "difficulty": "easy",
                    "question": format!("Space question {i}?"),
                    "options": ["a", "b", "c", "d"],
                    "correct_answer": "B",
                    "explanation": "because"
                })
            })
            .collect();
        serde_json::json!({ "quiz_id": "space_1", "questions": questions }).to_string()
    }

    fn generator(llm: Arc<FakeLlm>) -> QuizGenerator {
        QuizGenerator::new(ArdBank::bundled().unwrap(), llm, Arc::new(ManualClock::new(1_000)))
    }

    // -- strip_code_fences --

    #[test]
    fn fences_are_removed() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```json{\"a\":1}``` "), "{\"a\":1}");
    }

    #[test]
    fn unfenced_content_is_untouched() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "  {\"a\":1} ");
    }

    // -- parse_quiz --

    #[test]
    fn parses_fenced_quiz() {
        let content = format!("```json\n{}\n```", quiz_json(10));
        let quiz = parse_quiz(&content, 5).unwrap();
        assert_eq!(quiz.quiz_id, "space_1");
        assert_eq!(quiz.questions.len(), 10);
        assert_eq!(quiz.questions[0].correct_answer, AnswerLetter::B);
    }

    #[test]
    fn missing_or_empty_questions_is_invalid_structure() {
        for content in [r#"{"quiz_id":"x"}"#, r#"{"questions":[]}"#, r#"{"questions":"many"}"#] {
            let err = parse_quiz(content, 0).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid quiz structure: questions array is missing or empty"
            );
        }
    }

    #[test]
    fn malformed_question_is_rejected() {
        let bad_letter = r#"{"questions":[{"id":"q1","category":"c","difficulty":"easy","question":"?","options":["a","b","c","d"],"correct_answer":"E"}]}"#;
        assert!(matches!(parse_quiz(bad_letter, 0), Err(QuizError::InvalidQuestion(_))));

        let three_options = r#"{"questions":[{"id":"q1","category":"c","difficulty":"easy","question":"?","options":["a","b","c"],"correct_answer":"A"}]}"#;
        assert!(matches!(parse_quiz(three_options, 0), Err(QuizError::InvalidQuestion(_))));
    }

    #[test]
    fn non_json_content_is_an_error() {
        assert!(matches!(parse_quiz("Sure! Here is your quiz", 0), Err(QuizError::NotJson(_))));
    }

    #[test]
    fn missing_quiz_id_is_filled_in() {
        let content = r#"{"questions":[{"id":"q1","category":"c","difficulty":"easy","question":"?","options":["a","b","c","d"],"correct_answer":"a"}]}"#;
        let quiz = parse_quiz(content, 42).unwrap();
        assert_eq!(quiz.quiz_id, "quiz_42");
        assert_eq!(quiz.questions[0].correct_answer, AnswerLetter::A);
    }

    // -- QuizRequest --

    #[test]
    fn request_body_decoding() {
        let request = QuizRequest::from_body(br#"{"category":"ARD","difficulty":"Hard"}"#).unwrap();
        assert_eq!(request.category.as_deref(), Some("ARD"));
        assert_eq!(request.difficulty.as_deref(), Some("Hard"));

        for empty in [&b""[..], b"  \n", b"{}"] {
            let request = QuizRequest::from_body(empty).unwrap();
            assert!(request.category.is_none() && request.difficulty.is_none());
        }

        assert!(matches!(QuizRequest::from_body(b"{not json"), Err(QuizError::NotJson(_))));
        assert!(matches!(QuizRequest::from_body(br#"{"category":5}"#), Err(QuizError::NotJson(_))));
    }

    // -- QuizGenerator --

    #[tokio::test]
    async fn ard_never_calls_the_llm() {
        let llm = FakeLlm::replying(Err(LlmError::NotConfigured));
        let gen = generator(llm.clone());
        let quiz = gen
            .generate(&QuizRequest {
                category: Some("ARD".into()),
                difficulty: None,
            })
            .await
            .unwrap();
        assert_eq!(quiz.questions.len(), 10);
        assert_eq!(quiz.quiz_id, "ard_quiz_1000");
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_categories_go_through_the_llm() {
        let llm = FakeLlm::replying(Ok(quiz_json(10)));
        let gen = generator(llm.clone());
        let quiz = gen
            .generate(&QuizRequest {
                category: Some("Space".into()),
                difficulty: Some("easy".into()),
            })
            .await
            .unwrap();
        assert_eq!(quiz.questions.len(), 10);

        let prompts = llm.prompts.lock().unwrap();
        let (system, user) = &prompts[0];
        assert_eq!(system, SYSTEM_PROMPT);
        assert!(user.contains("quiz about Space"));
        assert!(user.contains("MUST be EASY difficulty ONLY"));
    }

    #[tokio::test]
    async fn llm_failure_surfaces_its_message() {
        let llm = FakeLlm::replying(Err(LlmError::EmptyContent));
        let err = generator(llm).generate(&QuizRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "No content received from AI");
    }
}
