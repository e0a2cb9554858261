// The fixed "ARD" question bank served without calling the LLM.
//
// Bank entries carry the correct answer as option text. Drawing a quiz
// shuffles the bank, takes ten entries and converts each into the standard
// question schema with the answer turned into its option letter.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use quizsync_core::question::{AnswerLetter, Question, Quiz, OPTIONS_PER_QUESTION};
use quizsync_core::shuffle::shuffled;

/// Category value that selects the bank instead of the LLM.
pub const ARD_CATEGORY: &str = "ARD";

pub const ARD_QUIZ_SIZE: usize = 10;

const DEFAULT_DIFFICULTY: &str = "medium";

const BUNDLED_BANK: &str = include_str!("../data/ard.json");

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question bank {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("question bank is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question bank has {usable} usable entries, need at least {ARD_QUIZ_SIZE}")]
    TooSmall { usable: usize },
}

/// One stored question: four options and the correct option's text.
#[derive(Debug, Clone, Deserialize)]
pub struct BankEntry {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl BankEntry {
    fn answer_letter(&self) -> Option<AnswerLetter> {
        let index = self.options.iter().position(|o| *o == self.answer)?;
        AnswerLetter::from_index(index)
    }
}

#[derive(Debug, Clone)]
pub struct ArdBank {
    entries: Vec<(BankEntry, AnswerLetter)>,
}

impl ArdBank {
    /// The bank compiled into the binary.
    pub fn bundled() -> Result<Self, BankError> {
        Self::from_json(BUNDLED_BANK)
    }

    pub fn load(path: &Path) -> Result<Self, BankError> {
        let text = std::fs::read_to_string(path).map_err(|source| BankError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let bank = Self::from_json(&text)?;
        info!(path = %path.display(), entries = bank.len(), "loaded ARD question bank");
        Ok(bank)
    }

    /// Parse a bank, dropping entries whose answer is not one of exactly
    /// four options. A bank that cannot fill one quiz is rejected.
    pub fn from_json(text: &str) -> Result<Self, BankError> {
        let raw: Vec<BankEntry> = serde_json::from_str(text)?;
        let entries: Vec<_> = raw
            .into_iter()
            .filter_map(|entry| {
                let letter = match entry.answer_letter() {
                    Some(letter) if entry.options.len() == OPTIONS_PER_QUESTION => letter,
                    _ => {
                        warn!(question = %entry.question, "skipping bank entry: answer is not one of four options");
                        return None;
                    }
                };
                Some((entry, letter))
            })
            .collect();

        if entries.len() < ARD_QUIZ_SIZE {
            return Err(BankError::TooSmall {
                usable: entries.len(),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shuffle the bank and convert ten entries into a quiz.
    ///
    /// A specific difficulty is applied to every question in lowercase;
    /// none or "Mixed" labels them "medium".
    pub fn draw<R: Rng + ?Sized>(&self, difficulty: Option<&str>, now_ms: i64, rng: &mut R) -> Quiz {
        let difficulty = difficulty
            .filter(|d| !d.is_empty() && *d != quizsync_llm::prompt::MIXED)
            .map(str::to_lowercase)
            .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string());

        let questions = shuffled(&self.entries, rng)
            .into_iter()
            .take(ARD_QUIZ_SIZE)
            .enumerate()
            .map(|(i, (entry, letter))| Question {
                id: format!("q{}", i + 1),
                category: ARD_CATEGORY.to_string(),
                difficulty: difficulty.clone(),
                question: entry.question,
                options: entry.options,
                correct_answer: letter,
                explanation: format!("Зөв хариулт: {}", entry.answer),
            })
            .collect();

        Quiz {
            quiz_id: format!("ard_quiz_{now_ms}"),
            questions,
        }
    }
}
