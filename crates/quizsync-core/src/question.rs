// Quiz questions, answer letters, and the quiz payload exchanged with clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every question carries exactly this many options, addressed A through D.
pub const OPTIONS_PER_QUESTION: usize = 4;

// ---------------------------------------------------------------------------
// AnswerLetter
// ---------------------------------------------------------------------------

/// One of the four option slots of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not an answer letter (expected A, B, C or D)")]
pub struct ParseLetterError(pub String);

impl AnswerLetter {
    pub const ALL: [AnswerLetter; OPTIONS_PER_QUESTION] =
        [AnswerLetter::A, AnswerLetter::B, AnswerLetter::C, AnswerLetter::D];

    /// Letter for a zero-based option index, `None` past the fourth option.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            AnswerLetter::A => 0,
            AnswerLetter::B => 1,
            AnswerLetter::C => 2,
            AnswerLetter::D => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerLetter {
    type Err = ParseLetterError;

    /// Accepts a single letter, case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(AnswerLetter::A),
            "B" => Ok(AnswerLetter::B),
            "C" => Ok(AnswerLetter::C),
            "D" => Ok(AnswerLetter::D),
            _ => Err(ParseLetterError(s.to_string())),
        }
    }
}

impl TryFrom<String> for AnswerLetter {
    type Error = ParseLetterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnswerLetter> for String {
    fn from(letter: AnswerLetter) -> Self {
        letter.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Question / Quiz
// ---------------------------------------------------------------------------

/// A single multiple-choice question. Questions are ephemeral: they live in a
/// room's serialized question set and are never stored per player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category: String,
    pub difficulty: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: AnswerLetter,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionShapeError {
    #[error("question `{id}` has an empty id or text")]
    MissingText { id: String },

    #[error("question `{id}` has {count} options, expected {OPTIONS_PER_QUESTION}")]
    WrongOptionCount { id: String, count: usize },
}

impl Question {
    /// Text of the option behind `letter`.
    pub fn option(&self, letter: AnswerLetter) -> Option<&str> {
        self.options.get(letter.index()).map(String::as_str)
    }

    pub fn is_correct(&self, letter: AnswerLetter) -> bool {
        self.correct_answer == letter
    }

    /// Structural checks serde cannot express: non-empty id/text and exactly
    /// four options.
    pub fn check_shape(&self) -> Result<(), QuestionShapeError> {
        if self.id.trim().is_empty() || self.question.trim().is_empty() {
            return Err(QuestionShapeError::MissingText {
                id: self.id.clone(),
            });
        }
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(QuestionShapeError::WrongOptionCount {
                id: self.id.clone(),
                count: self.options.len(),
            });
        }
        Ok(())
    }
}

/// A generated quiz as returned by the quiz endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub quiz_id: String,
    pub questions: Vec<Question>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Question {
        Question {
            id: "q1".into(),
            category: "Science".into(),
            difficulty: "easy".into(),
            question: "What is H2O?".into(),
            options: vec![
                "Water".into(),
                "Salt".into(),
                "Iron".into(),
                "Helium".into(),
            ],
            correct_answer: AnswerLetter::A,
            explanation: "Two hydrogens, one oxygen.".into(),
        }
    }

    #[test]
    fn letter_index_mapping() {
        for (i, letter) in AnswerLetter::ALL.iter().enumerate() {
            assert_eq!(letter.index(), i);
            assert_eq!(AnswerLetter::from_index(i), Some(*letter));
        }
        assert_eq!(AnswerLetter::from_index(4), None);
    }

    #[test]
    fn letter_parse_is_case_insensitive() {
        assert_eq!("c".parse::<AnswerLetter>().unwrap(), AnswerLetter::C);
        assert_eq!(" D ".parse::<AnswerLetter>().unwrap(), AnswerLetter::D);
        assert!("E".parse::<AnswerLetter>().is_err());
        assert!("AB".parse::<AnswerLetter>().is_err());
    }

    #[test]
    fn question_deserializes_from_wire_shape() {
        let value = json!({
            "id": "q7",
            "category": "History",
            "difficulty": "hard",
            "question": "Who?",
            "options": ["a", "b", "c", "d"],
            "correct_answer": "b"
        });
        let q: Question = serde_json::from_value(value).unwrap();
        assert_eq!(q.correct_answer, AnswerLetter::B);
        assert!(q.explanation.is_empty());
        assert!(q.check_shape().is_ok());
    }

    #[test]
    fn letter_serializes_as_plain_string() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["correct_answer"], json!("A"));
    }

    #[test]
    fn check_shape_rejects_wrong_option_count() {
        let mut q = sample();
        q.options.pop();
        assert_eq!(
            q.check_shape(),
            Err(QuestionShapeError::WrongOptionCount {
                id: "q1".into(),
                count: 3
            })
        );
    }

    #[test]
    fn option_lookup_by_letter() {
        let q = sample();
        assert_eq!(q.option(AnswerLetter::B), Some("Salt"));
        assert!(q.is_correct(AnswerLetter::A));
        assert!(!q.is_correct(AnswerLetter::D));
    }
}
