// Prompt templates for knowledge-base question answering.
// Placeholders are filled with `llm_client::prompts::render`.

pub const QNA_SYSTEM: &str = "You are a professional knowledge assistant. \
    Answer accurately and clearly, using the supplied context.";

/// Structured answer prompt. Output is parsed by `parser::parse_answer`.
pub const QNA_PROMPT_TEMPLATE: &str = r#"Answer the user's question using the context below.

Context:
{context}

Question: {question}

Conversation so far:
{history}

Reply in exactly this format:
Answer: <your answer>
Confidence: <a number between 0 and 1 for how reliable the answer is>
Sources: <relevant sources, comma separated>

If the context does not contain the answer, say so and suggest what extra
material the user could provide."#;

/// Multi-turn prompt; the reply is returned verbatim.
pub const CONVERSATION_PROMPT_TEMPLATE: &str = r#"You are in a multi-turn conversation with the user.

Conversation so far:
{history}

Current question: {question}

Context:
{context}

Give a coherent, helpful answer that follows on from the conversation."#;

pub const EVALUATE_PROMPT_TEMPLATE: &str = r#"Evaluate the quality of this question and answer.

Question: {question}
Answer: {answer}
{expected}
Score each dimension from 1 to 10, in this order, writing each score as "N/10":
1. Accuracy: does the answer correctly address the question?
2. Completeness: does it cover the key points?
3. Clarity: is it easy to understand?
4. Relevance: does it stay on topic?
5. Usefulness: does it have practical value?

Give each score with a one-sentence justification."#;

pub const RELATED_QUESTIONS_PROMPT_TEMPLATE: &str = r#"Based on the question and context below, write 3 to 5 related questions that would deepen the learner's understanding.

Original question: {question}
Context:
{context}

List them as a numbered list, one per line ("1. ...")."#;
