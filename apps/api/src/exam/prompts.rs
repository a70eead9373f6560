// Exam prompts. Placeholders are filled with llm_client::prompts::render.

pub const EXAM_SYSTEM: &str = "\
You are an experienced exam author and grader for professional qualification exams.";

pub const QUESTION_PROMPT_TEMPLATE: &str = "\
Write one {question_type} for the {exam_name} exam.

Topic: {topic}
Difficulty: {difficulty}
Reference material: {context}

Use exactly this format:
Question: <the question>
Options: <for multiple-choice questions, options A. to D.; otherwise leave empty>
Answer: <the correct answer; for multiple-choice, the option letter>
Explanation: <a detailed explanation>

The question must be clear and unambiguous, distractors must be plausible,
and the answer must be correct.";

pub const EVALUATION_PROMPT_TEMPLATE: &str = "\
Grade the candidate's answer.

Question: {question}
Reference answer: {correct_answer}
Candidate's answer: {user_answer}

Score each dimension out of 10, written as N/10, in this order:
1. Accuracy
2. Completeness
3. Logic
4. Standardization
Then give a detailed assessment.";
