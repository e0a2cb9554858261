// Score tally and finish-time arithmetic.

use std::collections::HashMap;

use crate::countdown::ROUND_SECS;
use crate::question::{AnswerLetter, Question};

/// Number of questions whose recorded answer equals the correct letter.
/// Unanswered questions score nothing.
pub fn tally_score(questions: &[Question], answers: &HashMap<String, AnswerLetter>) -> u32 {
    questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_answer))
        .count() as u32
}

/// Seconds spent in the round, given the whole seconds left on the shared
/// countdown when the player finished.
pub fn elapsed_secs(remaining_at_finish: u32) -> u32 {
    ROUND_SECS.saturating_sub(remaining_at_finish)
}

/// Stored form of the finish time.
pub fn time_taken_ms(elapsed_secs: u32) -> i64 {
    i64::from(elapsed_secs) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, correct: AnswerLetter) -> Question {
        Question {
            id: id.into(),
            category: "History".into(),
            difficulty: "medium".into(),
            question: format!("{id}?"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: correct,
            explanation: String::new(),
        }
    }

    #[test]
    fn tally_counts_exact_matches() {
        let questions = vec![
            q("q1", AnswerLetter::A),
            q("q2", AnswerLetter::B),
            q("q3", AnswerLetter::C),
            q("q4", AnswerLetter::D),
        ];
        let answers = HashMap::from([
            ("q1".to_string(), AnswerLetter::A),
            ("q2".to_string(), AnswerLetter::C),
            ("q4".to_string(), AnswerLetter::D),
        ]);
        assert_eq!(tally_score(&questions, &answers), 2);
    }

    #[test]
    fn answers_for_unknown_ids_are_ignored() {
        let questions = vec![q("q1", AnswerLetter::A)];
        let answers = HashMap::from([("q9".to_string(), AnswerLetter::A)]);
        assert_eq!(tally_score(&questions, &answers), 0);
    }

    #[test]
    fn elapsed_is_round_minus_remaining() {
        assert_eq!(elapsed_secs(45), 0);
        assert_eq!(elapsed_secs(30), 15);
        assert_eq!(elapsed_secs(0), 45);
        // A lagging clock can report more than a full round left.
        assert_eq!(elapsed_secs(50), 0);
        assert_eq!(time_taken_ms(15), 15_000);
    }
}
