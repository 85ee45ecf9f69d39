//! Prompt builders for the model calls made during a search.
//!
//! Each prompt kind starts its user message with a fixed header
//! ([`ELEMENT_HEADER`], [`CODE_HEADER`], [`FIX_HEADER`], [`JUDGE_HEADER`]) so
//! offline clients can tell the requests apart.

use crate::message::Message;
use crate::sandbox::ExecutionOutput;
use crate::tree::{Formulation, Layer};

pub const ELEMENT_HEADER: &str = "## Formulation element";
pub const CODE_HEADER: &str = "## Solver code";
pub const FIX_HEADER: &str = "## Fix solver code";
pub const JUDGE_HEADER: &str = "## Judge solution";

const EXPERT_SYSTEM: &str = "You are an expert in mathematical optimization modeling.";

const CODE_REQUIREMENTS: &str = "\
Requirements:
- Use scipy.optimize or PuLP (for integer programs)
- Output ONLY executable Python code, no markdown, no explanation
- Print the optimal objective value as the LAST line of output
- If infeasible or unbounded, print 0";

/// First `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Conditioning for one candidate request at `layer`.
pub struct ElementRequest<'a> {
    pub problem: &'a str,
    pub partial: &'a Formulation,
    pub layer: Layer,
    pub guidance: &'a [String],
    pub explanation: Option<&'a str>,
    pub siblings: &'a [&'a str],
}

pub fn element_messages(req: &ElementRequest<'_>) -> Vec<Message> {
    let mut prompt = format!(
        "{} {}: {}\n\nProblem:\n{}\n\nFormulation so far:\n{}\n",
        ELEMENT_HEADER,
        req.layer.key(),
        req.layer.title(),
        req.problem.trim(),
        if req.partial.is_empty() {
            "(none yet)".to_string()
        } else {
            req.partial.render()
        },
    );
    if !req.guidance.is_empty() {
        prompt.push_str(&format!("\nGuidance from previous attempts for '{}':\n", req.layer.key()));
        for g in req.guidance {
            prompt.push_str(&format!("- {}\n", g));
        }
    }
    if let Some(explanation) = req.explanation.filter(|e| !e.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nA reviewer flagged the current choices for this element: {}\n",
            explanation.trim()
        ));
    }
    if !req.siblings.is_empty() {
        prompt.push_str("\nAlternatives already proposed (write a materially different one):\n");
        for s in req.siblings {
            prompt.push_str(&format!("- {}\n", truncate_chars(s, 300)));
        }
    }
    prompt.push_str(&format!(
        "\nGenerate ONLY the \"{}\" component of the formulation: {}.\nBe concise and precise. Do not write code.",
        req.layer.key(),
        req.layer.describe()
    ));
    vec![Message::system(EXPERT_SYSTEM), Message::user(prompt)]
}

pub fn code_messages(problem: &str, formulation: &Formulation) -> Vec<Message> {
    let prompt = format!(
        "{}\n\nWrite Python code that solves the problem using the formulation below.\n\nProblem:\n{}\n\nMathematical formulation:\n{}\n\n{}",
        CODE_HEADER,
        problem.trim(),
        formulation.render(),
        CODE_REQUIREMENTS
    );
    vec![Message::system(EXPERT_SYSTEM), Message::user(prompt)]
}

pub fn fix_messages(code: &str, error: &str) -> Vec<Message> {
    let prompt = format!(
        "{}\n\nThe following Python code failed.\n\nError:\n{}\n\nOriginal code:\n{}\n\n{}",
        FIX_HEADER,
        truncate_chars(error.trim(), 500),
        truncate_chars(code, 1500),
        CODE_REQUIREMENTS
    );
    vec![Message::system(EXPERT_SYSTEM), Message::user(prompt)]
}

pub fn judge_messages(problem: &str, formulation: &Formulation, execution: &ExecutionOutput) -> Vec<Message> {
    let layer_keys = Layer::ALL
        .iter()
        .map(|l| format!("\"{}\"", l.key()))
        .collect::<Vec<_>>()
        .join(", ");
    let prompt = format!(
        "{header}\n\nProblem:\n{problem}\n\nComplete formulation:\n{formulation}\n\n\
Execution result: success={success}\nOutput:\n{stdout}\nError:\n{stderr}\n\n\
Score the overall solution quality from 0 to 100:\n\
- 0-25: poor (crashes, infeasible, or completely wrong answer)\n\
- 26-50: fair (runs but answer is significantly wrong)\n\
- 51-75: good (reasonable formulation, answer is close)\n\
- 76-100: excellent (correct formulation, correct answer)\n\n\
Then review EACH formulation element. Return a JSON object:\n\
{{\"score\": <0-100>, \"layers\": {{<element>: {{\"score\": <0-100>, \"trigger\": <true if the element needs revision>, \
\"explanation\": <one sentence>, \"guidance\": <specific advice if trigger, else \"\">}}}}}}\n\
with element keys {keys}.",
        header = JUDGE_HEADER,
        problem = problem.trim(),
        formulation = formulation.render(),
        success = execution.success,
        stdout = truncate_chars(execution.stdout.trim(), 300),
        stderr = truncate_chars(execution.stderr.trim(), 200),
        keys = layer_keys,
    );
    vec![
        Message::system("You review optimization formulations and reply with JSON only."),
        Message::user(prompt),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn element_prompt_carries_guidance_explanation_and_siblings() {
        let mut partial = Formulation::new();
        partial.push("MILP, maximize");
        let guidance = vec!["index products by i".to_string()];
        let messages = element_messages(&ElementRequest {
            problem: "Maximize profit.",
            partial: &partial,
            layer: Layer::Sets,
            guidance: &guidance,
            explanation: Some("sets miss the time index"),
            siblings: &["I = {1..n}"],
        });
        let user = messages[1].content();
        assert!(user.starts_with(ELEMENT_HEADER));
        assert!(user.contains("**Type**: MILP, maximize"));
        assert!(user.contains("- index products by i"));
        assert!(user.contains("sets miss the time index"));
        assert!(user.contains("- I = {1..n}"));
    }

    #[test]
    fn judge_prompt_lists_every_layer_key() {
        let messages = judge_messages("p", &Formulation::new(), &ExecutionOutput::ok("3"));
        let user = messages[1].content();
        assert!(user.starts_with(JUDGE_HEADER));
        for layer in Layer::ALL {
            assert!(user.contains(&format!("\"{}\"", layer.key())));
        }
    }
}
