//! Preambles and prompt builders for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever a preamble or a prompt
//! template changes, so logged responses can be traced to the wording that
//! produced them.

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Researcher role. Reports only what the search results support.
pub const RESEARCHER_PREAMBLE: &str = "\
You are a Senior Researcher. You turn raw web search results into concise, \
factual reports. You never invent facts that are not present in the results.";

/// Critic role. Peer review with a numeric score.
pub const CRITIC_PREAMBLE: &str = "\
You are a Peer Reviewer. You evaluate research for gaps, inaccuracies and \
depth, and you always finish with a numeric score.";

/// Synthesizer role. Writes the final document.
pub const SYNTHESIZER_PREAMBLE: &str = "\
You are a Master Synthesizer. You merge research findings and critiques into \
one professional, well-structured knowledge document.";

/// Compression role. The instruction itself travels in the prompt.
pub const COMPRESSOR_PREAMBLE: &str = "\
You compress research transcripts. You output JSON only.";

/// Label the researcher's confidence line starts with.
pub const CONFIDENCE_LABEL: &str = "Confidence";
/// Label the critic's score line starts with.
pub const SCORE_LABEL: &str = "Score";

/// Researcher task prompt.
///
/// `feedback` is the critic's last critique on a revise round.
pub fn research_prompt(topic: &str, results_json: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "Synthesize the following raw search results into a concise factual report.

Topic: {topic}
Search Results: {results_json}

Rules:
- Use only the data provided in search results.
- List key facts, statistics, and technical details.
- If the results are contradictory, note the discrepancy.
- Assign a confidence score (0.0 to 1.0) based on the quantity and quality of sources.
"
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "
A reviewer found these problems with the previous report. Address them:
{feedback}
"
        ));
    }
    prompt.push_str(
        "
Output Format:
Report: [Your Synthesis]
Confidence: [0.0-1.0]",
    );
    prompt
}

/// Critic task prompt.
pub fn critique_prompt(research: &str) -> String {
    format!(
        "Evaluate the following research for:
1. Logical gaps or missing information.
2. Potential factual inaccuracies.
3. Clarity and depth.

RESEARCH TO EVALUATE:
{research}

Provide your critique and a Confidence Score between 0.0 and 1.0.
If the research is excellent, score it > 0.8.
If it needs more data, score it < 0.5.

Format:
Critique: [Your feedback]
Score: [0.0-1.0]"
    )
}

/// Synthesizer task prompt over the full message history.
pub fn synthesis_prompt(history: &str) -> String {
    format!(
        "Combine the following research and critiques into a single, comprehensive, \
and logically structured final knowledge document.

HISTORY:
{history}

Ensure the final output is professional, cites the sources mentioned in the history, \
and addresses the gaps raised by the Critic."
    )
}
