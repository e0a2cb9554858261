// Prompt construction for quiz generation.
//
// The system prompt fixes the output schema and the content rules. The user
// prompt carries the requested category and difficulty plus a random seed so
// repeated requests do not collapse onto the same quiz.

use rand::Rng;

/// Category and difficulty value meaning "no constraint".
pub const MIXED: &str = "Mixed";

/// Questions per generated quiz.
pub const QUESTIONS_PER_QUIZ: usize = 10;

pub const SYSTEM_PROMPT: &str = r#"ROLE:
You are InfiniteQuizAI, the question engine behind the competitive game INFINITE QUIZ. You produce fair quiz data whose answers can be checked.
Your reply must follow the JSON structure below exactly.

TASK:
Produce a fresh set of quiz questions on every call.
Every answer must be factual and verifiable.
Never write anything outside the JSON.
Never change the structure or the order of fields.

OUTPUT FORMAT:
Reply with one JSON object shaped like this:
{
  "quiz_id": "unique_quiz_identifier",
  "questions": [ 10 question objects ]
}

HARD RULES:
Each question object has these fields:
- "id" (unique within the quiz: "q1", "q2", ...)
- "category" (exactly the requested category)
- "difficulty" (easy / medium / hard)
- "question" (the question text)
- "options" (exactly 4 strings)
- "correct_answer" (one of "A", "B", "C", "D")
- "explanation" (a short justification of the correct answer)

Questions must be:
- factually correct
- objective, never opinion-based
- unambiguous
- different from one call to the next

CATEGORY RULES:
Known categories:
- English: Science, History, Geography, Technology, Space, Pop Culture, Mathematics
- Mongolian: 'Өв Соёл', 'Спорт', 'Anime', 'eSports', 'Монголын Түүх', 'Поп Соёл', 'Монгол Хоол', 'Шинжлэх ухаан', 'Технологи', 'Математик', 'Ерөнхий мэдлэг'

When a specific category is requested:
- all 10 questions come from that category only;
- the "category" field of every question equals the requested category;
- a Mongolian category name means every question, option and explanation is written in Mongolian;
- an English category name means everything is written in English.
Mix categories only when the request says "Mixed".

DIFFICULTY:
For a specific difficulty (easy, medium or hard), all 10 questions have that difficulty and their "difficulty" field says so.
For mixed difficulty, use 4 easy, 4 medium and 2 hard questions.

easy = basic objective facts
medium = general knowledge
hard = multi-step reasoning or lesser-known facts

STABILITY:
- no extra fields
- no missing fields
- no reordered fields
- no text outside the JSON
- concise, factual explanations
- options are plain strings without "A.", "B." prefixes

RANDOMNESS:
- vary topics within the category
- do not repeat earlier quizzes

Reply with the JSON only."#;

/// Whether `text` contains Cyrillic letters used by Mongolian.
pub fn is_mongolian(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, 'а'..='я' | 'А'..='Я' | 'ө' | 'Ө' | 'ү' | 'Ү'))
}

/// A per-request seed: epoch milliseconds plus a random fraction.
pub fn random_seed<R: Rng + ?Sized>(now_ms: i64, rng: &mut R) -> String {
    let fraction: f64 = rng.gen();
    format!("{}", now_ms as f64 + fraction)
}

fn requested(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != MIXED)
}

/// Build the user message for one generation request.
pub fn build_user_prompt(category: Option<&str>, difficulty: Option<&str>, seed: &str) -> String {
    let mut prompt = match requested(category) {
        Some(category) => {
            let mut p = format!(
                "Generate a completely new and unique quiz about {category}. \
                 IMPORTANT: ALL {QUESTIONS_PER_QUIZ} questions MUST be ONLY about {category}. \
                 Do not include any other categories. \
                 Every question's \"category\" field must be \"{category}\". (seed: {seed})"
            );
            if is_mongolian(category) {
                p.push_str(
                    "\n\nLANGUAGE REQUIREMENT: The category is Mongolian. Therefore, ALL questions, \
                     options, and explanations MUST be in MONGOLIAN.",
                );
            }
            p
        }
        None => format!("Generate a completely new and unique quiz with mixed categories (seed: {seed})."),
    };

    match requested(difficulty) {
        Some(difficulty) => prompt.push_str(&format!(
            "\n\nDIFFICULTY REQUIREMENT: ALL {QUESTIONS_PER_QUIZ} questions MUST be {} difficulty ONLY. \
             Every question's \"difficulty\" field must be \"{}\".",
            difficulty.to_uppercase(),
            difficulty.to_lowercase()
        )),
        None => prompt.push_str(
            "\n\nDIFFICULTY REQUIREMENT: Use mixed difficulty with the standard distribution \
             (4 easy, 4 medium, 2 hard questions).",
        ),
    }
    prompt
}
