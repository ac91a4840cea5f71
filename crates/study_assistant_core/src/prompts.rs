//! crates/study_assistant_core/src/prompts.rs
//!
//! Prompt templates sent to the language model. Each builder returns a complete
//! [`GenerationRequest`], including the sampling parameters the feature uses.

use crate::domain::{ChatTurn, Difficulty, NoteLevel, TestRecord};
use crate::ports::GenerationRequest;

//=========================================================================================
// Notes
//=========================================================================================

const NOTES_STYLE: &str = r#"WRITING STYLE (THIS IS THE MOST IMPORTANT RULE):
You MUST write in NATURAL FLOWING PARAGRAPHS. Each paragraph should be 4-6 sentences that explain a concept thoroughly.

Never write glossary-style "Term: Definition" bullet lists. Students cannot learn from them.

Bold TWO types of words inline:
1. Technical terms (e.g. microphone, amplifier, acoustic)
2. Uncommon vocabulary (e.g. fortifies, perceives, spectrum)
Do NOT bold common words.

FORMATTING RULES:
1. Use ## for main topics, ### for subtopics
2. Write PARAGRAPHS of 4-6 sentences under each heading
3. NEVER use bullet points to define terms
4. Include examples and analogies"#;

fn level_instructions(level: NoteLevel, fresh_angle: bool) -> &'static str {
    match (level, fresh_angle) {
        (NoteLevel::Beginner, false) => "Create SIMPLE and EASY-TO-UNDERSTAND notes. Explain each concept in simple words, define all technical terms clearly, and use everyday examples. Make it suitable for someone new to the topic.",
        (NoteLevel::Intermediate, false) => "Create DETAILED and COMPREHENSIVE notes. Explain concepts with depth but not overly complex, include real-world applications, show connections between concepts, and include key formulas and facts.",
        (NoteLevel::Advanced, false) => "Create DEEP and ANALYTICAL notes. Include nuanced explanations, different perspectives, connections to broader fields, and challenging questions.",
        (NoteLevel::Beginner, true) => "Create SIMPLE notes with a DIFFERENT approach than before. Use different wording and DIFFERENT everyday examples.",
        (NoteLevel::Intermediate, true) => "Create DETAILED notes using a DIFFERENT structure. Explain concepts differently than the previous version and use DIFFERENT examples and applications.",
        (NoteLevel::Advanced, true) => "Create DIFFERENT DEEP and ANALYTICAL notes. Take different advanced angles, different critical-thinking points and different challenging questions.",
    }
}

/// Context for one section of a multi-chunk notes run.
#[derive(Debug, Clone, Copy)]
pub struct NotesSection<'a> {
    pub level: NoteLevel,
    /// 0-based position among the chunks actually sent.
    pub position: usize,
    pub total: usize,
    pub text: &'a str,
    pub image_markers: &'a [String],
}

fn image_instruction(markers: &[String]) -> String {
    if markers.is_empty() {
        return String::new();
    }
    format!(
        "\nIMAGES for this section: Place these image markers in your notes: {}\n- Put each image IMMEDIATELY AFTER a ### heading, BEFORE the paragraph\n- Use each EXACTLY ONCE",
        markers.join(", ")
    )
}

pub fn notes_section(section: NotesSection<'_>) -> GenerationRequest {
    let system = format!(
        "You are an expert educational note-taking assistant. Write notes the way a TOP STUDENT writes in their notebook.\n\n{}\n\n{}\n\nThe notes should read like a textbook chapter, not a dictionary or glossary.",
        level_instructions(section.level, false),
        NOTES_STYLE
    );
    let user = format!(
        "Write DETAILED study notes for this SECTION of a document ({level} level).\nThis is section {n} of {total}.\n\nWrite in FLOWING PARAGRAPHS, not \"Term: Definition\" bullet lists.\nEach section needs 2-3 paragraphs of 4-6 sentences each.{images}\n\nSECTION CONTENT:\n{text}\n\nWrite thorough notes covering ALL the content above. Start directly with headings and content.",
        level = section.level,
        n = section.position + 1,
        total = section.total,
        images = image_instruction(section.image_markers),
        text = section.text,
    );
    GenerationRequest::prompt(user)
        .with_system(system)
        .with_temperature(0.7)
        .with_max_tokens(4096)
}

pub fn notes_section_regeneration(
    section: NotesSection<'_>,
    previous_notes: &str,
) -> GenerationRequest {
    let previous = if previous_notes.trim().is_empty() {
        String::new()
    } else {
        let excerpt: String = previous_notes.chars().take(1500).collect();
        format!("\n\nPREVIOUS VERSION (do not repeat its structure or examples):\n{excerpt}")
    };
    let system = format!(
        "You are an expert educational note-taking assistant. Write COMPLETELY DIFFERENT, ALTERNATIVE study notes from the previous version.\n\n{}\n\n{}\n\nUse a DIFFERENT organizational structure and angle than the previous version.{}",
        level_instructions(section.level, true),
        NOTES_STYLE,
        previous
    );
    let user = format!(
        "Write COMPLETELY DIFFERENT study notes for this SECTION ({level} level).\nSection {n} of {total}. Use a DIFFERENT angle/structure than the previous version.\n\nWrite in FLOWING PARAGRAPHS, not \"Term: Definition\" lists.{images}\n\nSECTION CONTENT:\n{text}\n\nWrite thorough notes covering ALL content above. Start directly.",
        level = section.level,
        n = section.position + 1,
        total = section.total,
        images = image_instruction(section.image_markers),
        text = section.text,
    );
    GenerationRequest::prompt(user)
        .with_system(system)
        .with_temperature(0.8)
        .with_max_tokens(4096)
}

//=========================================================================================
// Tests
//=========================================================================================

fn difficulty_instructions(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "EASY DIFFICULTY - Focus on basic recall: test only definitions and key facts with straightforward questions. Distractors should be obviously wrong.",
        Difficulty::Normal => "NORMAL DIFFICULTY - Balance recall with basic application. Distractors should be plausible but clearly wrong on reflection.",
        Difficulty::Hard => "HARD DIFFICULTY - Every question must require analysis, application or synthesis. Ask WHY and HOW, not just WHAT. Distractors should be very plausible.",
    }
}

pub fn test_questions(content: &str, difficulty: Difficulty) -> GenerationRequest {
    let prompt = format!(
        r#"Based on the following content, generate exactly 30 multiple choice questions (MCQs) in JSON format.

IMPORTANT: Generate questions ONLY from the actual content provided below. If the content is unclear, unreadable, or too fragmented to understand, respond with EXACTLY this JSON: {{"error": "unreadable"}}

CONTENT:
{content}

DIFFICULTY LEVEL REQUIREMENTS:
{instructions}

Return ONLY a valid JSON array, nothing else. NO markdown, NO code blocks, NO extra text.

[
  {{"id": 1, "question": "Question text here?", "options": ["Option A", "Option B", "Option C", "Option D"], "correct_answer_index": 0, "explanation": "Why the correct answer is right", "wrong_explanation": "Why the student's choice was wrong and why the correct answer is right"}}
]

CRITICAL REQUIREMENTS:
- EXACTLY 30 questions with id from 1 to 30
- Distribute correct_answer_index across 0, 1, 2, 3
- Each question MUST have: id, question, options (exactly 4), correct_answer_index (0-3), explanation, wrong_explanation"#,
        instructions = difficulty_instructions(difficulty),
    );
    GenerationRequest::prompt(prompt)
        .with_temperature(0.7)
        .with_max_tokens(4096)
}

pub fn simpler_explanation(question: &str, student_answer: &str, correct_answer: &str) -> GenerationRequest {
    let prompt = format!(
        "Provide a simpler, clearer explanation for this question:\n\nQuestion: {question}\nStudent's answer: {student_answer}\nCorrect answer: {correct_answer}\n\nExplain in the simplest possible way:\n1. Why '{student_answer}' is incorrect\n2. Why '{correct_answer}' is the right answer\n3. Use a simple analogy if helpful\n\nBe direct - no greetings. Use very simple vocabulary. Short sentences."
    );
    GenerationRequest::prompt(prompt)
        .with_temperature(0.7)
        .with_max_tokens(400)
}

//=========================================================================================
// Flashcards and Flowcharts
//=========================================================================================

pub fn flashcards(content: &str) -> GenerationRequest {
    let prompt = format!(
        r#"Read the following content and generate flashcards for studying. Extract the most important terms, concepts, processes, and facts.

Content:
{content}

Generate 15-25 flashcards as a JSON array. Each flashcard has a "term" (the concept/keyword) and a "definition" (clear, concise explanation in 1-3 sentences).

Rules:
- Cover ALL major topics from the content
- Terms should be specific: names, processes, concepts, formulas, vocabulary
- Do NOT repeat similar cards

Return ONLY a valid JSON array, no markdown, no code blocks. Use this exact format:
[{{"term": "Example Term", "definition": "A clear explanation."}}]"#
    );
    GenerationRequest::prompt(prompt)
        .with_system("You generate educational flashcards from study material. Return ONLY valid JSON arrays.")
        .with_temperature(0.7)
        .with_max_tokens(3500)
}

pub fn flowchart(content: &str, fresh_layout: bool) -> GenerationRequest {
    let variation = if fresh_layout {
        "\n10. This is a REGENERATION: organise the diagram differently from a typical top-level breakdown (different grouping, different branch order)."
    } else {
        ""
    };
    let prompt = format!(
        r#"Read the following content carefully and create a DETAILED, ACCURATE Mermaid flowchart that captures ALL the key concepts, processes, and relationships.

Content:
{content}

IMPORTANT RULES:
1. Extract EVERY important concept, process, term, and relationship
2. Use FULL words in labels - NEVER abbreviate or truncate
3. Keep node labels SHORT but COMPLETE; split long labels with <br/>
4. Use graph TD (top-down layout)
5. Show the main topic at the top, then branch into sub-topics and details
6. Include 12-20 nodes
7. Use different node shapes: A[Rectangle] for concepts, A{{Diamond}} for decisions, A([Rounded]) for processes
8. Label arrows with relationships: A -->|type| B
9. Cover ALL major topics from the content{variation}

Return ONLY valid Mermaid code, no explanations."#
    );
    GenerationRequest::prompt(prompt)
        .with_system("You are an expert at creating professional flowcharts using Mermaid.js syntax. Generate clean, well-organized Mermaid code.")
        .with_temperature(if fresh_layout { 0.9 } else { 0.7 })
        .with_max_tokens(2500)
}

pub fn term_definition(term: &str, context: &str) -> GenerationRequest {
    GenerationRequest::prompt(format!(
        "Define the term '{term}' in 1-2 sentences. Context: {context}\n\nDefinition:"
    ))
    .with_temperature(0.5)
    .with_max_tokens(100)
}

//=========================================================================================
// Conversation
//=========================================================================================

pub fn document_chat(excerpts: &str, question: &str) -> GenerationRequest {
    let user = format!(
        "Document content (relevant excerpts):\n{excerpts}\n\nQuestion: {question}\n\nPlease answer based only on the document content provided above."
    );
    GenerationRequest::prompt(user)
        .with_system("You are a helpful AI assistant that answers questions based on provided document content. Answer only based on the information in the document. If the answer is not in the document, say so clearly.")
        .with_temperature(0.7)
        .with_max_tokens(1000)
}

const MATH_NOTATION: &str = "When writing mathematical expressions, do not use LaTeX, never use ^ for exponents (use Unicode superscripts such as ² and ³) and never use * for multiplication (write terms together or use ×).";

/// Where the tutor's background knowledge about the conversation comes from.
#[derive(Debug, Clone, Copy)]
pub enum TutorContext<'a> {
    /// The user's test history, newest first. Empty means a new user.
    LearningHistory(&'a [TestRecord]),
    /// The user is looking at a flowchart about this topic.
    FlowchartTopic(&'a str),
    General,
}

/// Summarises a test history into the profile the tutor sees.
pub fn learning_profile(history: &[TestRecord]) -> String {
    if history.is_empty() {
        return "This is a new user with no test history yet.".to_string();
    }

    let total = history.len();
    let average = history.iter().map(|t| t.percentage).sum::<f64>() / total as f64;
    let best = history.iter().map(|t| t.percentage).fold(f64::MIN, f64::max);
    let questions: u32 = history.iter().map(|t| t.total_questions).sum();
    let count = |tag: &str| {
        history
            .iter()
            .filter(|t| t.difficulty.as_deref() == Some(tag))
            .count()
    };

    let mut profile = format!(
        "User's Learning Profile:\n- Tests Completed: {total}\n- Average Score: {average:.1}%\n- Best Score: {best}%\n- Total Questions Answered: {questions}\n- Test Distribution: Easy ({}), Normal ({}), Hard ({})\n- Recent Tests:",
        count("easy"),
        count("normal"),
        count("hard"),
    );
    for test in history.iter().take(3) {
        profile.push_str(&format!(
            "\n  * {} ({}): {}/{} ({}%)",
            test.pdf_name.as_deref().unwrap_or("Unknown"),
            test.difficulty.as_deref().unwrap_or("unknown"),
            test.score,
            test.total_questions,
            test.percentage
        ));
    }
    profile
}

pub fn tutor(context: TutorContext<'_>, history: &[ChatTurn], message: &str) -> GenerationRequest {
    let system = match context {
        TutorContext::LearningHistory(records) => format!(
            "You are Aviator, a helpful AI tutor. You have access to this user's learning history:\n\n{}\n\nYour role is to answer questions about their learning journey, give personalized study advice based on their performance, clarify concepts they struggle with, and motivate them.\n\n{MATH_NOTATION}\n\nBe friendly and encouraging, and reference their test performance when helpful.",
            learning_profile(records)
        ),
        TutorContext::FlowchartTopic(topic) => format!(
            "You are Aviator, a helpful AI assistant for explaining and discussing concepts.\nThe user is working with a flowchart about: {topic}\n\n{MATH_NOTATION}\n\nKeep responses concise (2-3 sentences max) and conversational."
        ),
        TutorContext::General => format!(
            "You are Aviator, a helpful AI assistant for explaining and discussing concepts.\nGeneral knowledge assistant\n\n{MATH_NOTATION}\n\nKeep responses concise (2-3 sentences max) and conversational."
        ),
    };

    let mut request = GenerationRequest::prompt(message)
        .with_system(system)
        .with_temperature(0.7)
        .with_max_tokens(1000);
    let mut turns = history.to_vec();
    turns.append(&mut request.turns);
    request.turns = turns;
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, difficulty: &str, percentage: f64) -> TestRecord {
        TestRecord {
            pdf_name: Some(name.to_string()),
            difficulty: Some(difficulty.to_string()),
            percentage,
            score: 3,
            total_questions: 5,
        }
    }

    #[test]
    fn notes_prompt_mentions_section_and_markers() {
        let markers = vec!["[PDF_IMG:2]".to_string(), "[PDF_IMG:3]".to_string()];
        let request = notes_section(NotesSection {
            level: NoteLevel::Advanced,
            position: 1,
            total: 3,
            text: "chunk body",
            image_markers: &markers,
        });
        let user = request.last_user_content().unwrap();
        assert!(user.contains("section 2 of 3"));
        assert!(user.contains("[PDF_IMG:2], [PDF_IMG:3]"));
        assert!(user.contains("chunk body"));
        assert_eq!(request.max_tokens, 4096);
    }

    #[test]
    fn notes_prompt_omits_image_block_without_images() {
        let request = notes_section(NotesSection {
            level: NoteLevel::Beginner,
            position: 0,
            total: 1,
            text: "body",
            image_markers: &[],
        });
        assert!(!request.last_user_content().unwrap().contains("PDF_IMG"));
    }

    #[test]
    fn learning_profile_summarises_history() {
        let history = vec![
            record("cells.pdf", "hard", 60.0),
            record("atoms.pdf", "easy", 100.0),
        ];
        let profile = learning_profile(&history);
        assert!(profile.contains("Tests Completed: 2"));
        assert!(profile.contains("Average Score: 80.0%"));
        assert!(profile.contains("Best Score: 100%"));
        assert!(profile.contains("Easy (1), Normal (0), Hard (1)"));
        assert!(profile.contains("cells.pdf (hard): 3/5 (60%)"));
    }

    #[test]
    fn tutor_keeps_prior_turns_in_order() {
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello!")];
        let request = tutor(TutorContext::General, &history, "what is osmosis?");
        assert_eq!(request.turns.len(), 3);
        assert_eq!(request.turns[0].content, "hi");
        assert_eq!(request.last_user_content(), Some("what is osmosis?"));
    }
}
