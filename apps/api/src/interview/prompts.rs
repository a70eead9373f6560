// Interview prompts. Placeholders are filled with llm_client::prompts::render.

pub const OPENING_PROMPT_TEMPLATE: &str = "\
Start an interview about {topic}.
Introduce yourself in one or two sentences, then ask the first question.
Ask exactly one question.";

/// The first three lines of the reply are parsed positionally.
pub const TURN_PROMPT_TEMPLATE: &str = "\
Conversation so far:
{history}

Reference material:
{context}

Your last question: {question}
Candidate's answer: {answer}

Judge the answer on {focus}.
Reply with exactly three lines and nothing else:
Score: <a number from 0 to 5>
Follow-up: <your next question, building on the answer>
Comment: <one or two sentences of feedback for the candidate>";

pub const CLOSING_PROMPT_TEMPLATE: &str = "\
Conversation so far:
{history}

End the interview now. Give a short summary of how it went and thank the candidate.";

pub const FEEDBACK_PROMPT_TEMPLATE: &str = "\
Write a detailed feedback report for the interview below.

Topic: {topic}
Transcript:
{history}

Use these numbered sections, each heading on its own line:
1. Overall evaluation
2. Strengths
3. Weaknesses
4. Improvement suggestions (one suggestion per line, each starting with \"- \")
5. Interview score: <0-100>
6. Final conclusion";
