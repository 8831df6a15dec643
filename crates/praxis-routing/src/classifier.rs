use praxis_types::{AgentContext, TaskType};

const COMPLEXITY_MODIFIERS: [(&str, i32); 12] = [
    ("deep", 2),
    ("thorough", 2),
    ("comprehensive", 3),
    ("quick", -1),
    ("simple", -1),
    ("basic", -2),
    ("exploit", 3),
    ("vulnerability", 3),
    ("security", 2),
    ("analyze", 1),
    ("review", 1),
    ("test", 1),
];

/// Rule-based task classification: fast, deterministic, zero LLM cost.
/// Returns the task label together with the enriched context (complexity,
/// confidence, and supervision forced for exploitation work). Whether the
/// routing config actually requires supervision is the router's call.
pub fn classify(ctx: &AgentContext) -> (TaskType, AgentContext) {
    let mut ctx = ctx.clone();
    if ctx.confidence_score == 0.0 {
        ctx.confidence_score = 0.5;
    }
    if ctx.task_complexity == 0 {
        ctx.task_complexity = 5;
    }

    // Explicit report request wins over everything.
    if ctx.report_requested {
        return (TaskType::ReportWriting, ctx);
    }

    // Start of session or phase change means strategy work.
    if ctx.turn_count == 0 || ctx.session_started || ctx.phase_changed {
        ctx.task_complexity = 8;
        return (TaskType::Planning, ctx);
    }

    // Large tool output is digested before anything else happens.
    if ctx.last_tool_output.len() > 10_000 {
        ctx.task_complexity = 7;
        return (TaskType::Summary, ctx);
    }
    if ctx.last_tool_output.len() > 2_000 {
        ctx.task_complexity = 4;
        return (TaskType::Parsing, ctx);
    }

    let user_lower = ctx.user_message.to_lowercase();
    for (keyword, modifier) in COMPLEXITY_MODIFIERS {
        if user_lower.contains(keyword) {
            ctx.task_complexity += modifier;
        }
    }
    ctx.task_complexity = ctx.task_complexity.clamp(1, 10);

    if user_lower.contains("analyze") || user_lower.contains("examine") {
        ctx.confidence_score = 0.7;
        return (TaskType::Analysis, ctx);
    }
    if user_lower.contains("test")
        || user_lower.contains("exploit")
        || user_lower.contains("vulnerability")
    {
        ctx.confidence_score = 0.6;
        ctx.requires_supervision = true;
        return (TaskType::Exploitation, ctx);
    }
    if user_lower.contains("javascript") || user_lower.contains("js file") {
        ctx.confidence_score = 0.75;
        return (TaskType::JsAnalysis, ctx);
    }
    if user_lower.contains("code") || user_lower.contains("review") {
        ctx.confidence_score = 0.7;
        return (TaskType::CodeReview, ctx);
    }
    if user_lower.contains("which tool") || user_lower.contains("what command") {
        ctx.confidence_score = 0.8;
        return (TaskType::ToolSelection, ctx);
    }

    // Default: treat open-ended turns as reasoning work.
    ctx.confidence_score = 0.6;
    (TaskType::Analysis, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_message(message: &str) -> AgentContext {
        AgentContext {
            turn_count: 2,
            user_message: message.to_string(),
            ..AgentContext::default()
        }
    }

    #[test]
    fn report_request_wins_over_everything() {
        let mut ctx = ctx_with_message("analyze the exploit");
        ctx.report_requested = true;
        let (task, _) = classify(&ctx);
        assert_eq!(task, TaskType::ReportWriting);
    }

    #[test]
    fn first_turn_and_phase_change_mean_planning() {
        let mut ctx = ctx_with_message("hello");
        ctx.turn_count = 0;
        let (task, enriched) = classify(&ctx);
        assert_eq!(task, TaskType::Planning);
        assert_eq!(enriched.task_complexity, 8);

        let mut ctx = ctx_with_message("keep going");
        ctx.phase_changed = true;
        let (task, _) = classify(&ctx);
        assert_eq!(task, TaskType::Planning);
    }

    #[test]
    fn tool_output_size_selects_parsing_then_summary() {
        let mut ctx = ctx_with_message("please continue");
        ctx.last_tool_output = "x".repeat(5_000);
        let (task, enriched) = classify(&ctx);
        assert_eq!(task, TaskType::Parsing);
        assert_eq!(enriched.task_complexity, 4);

        ctx.last_tool_output = "x".repeat(10_001);
        let (task, enriched) = classify(&ctx);
        assert_eq!(task, TaskType::Summary);
        assert_eq!(enriched.task_complexity, 7);
    }

    #[test]
    fn keyword_categories_map_to_expected_tasks() {
        assert_eq!(classify(&ctx_with_message("analyze this log")).0, TaskType::Analysis);
        assert_eq!(
            classify(&ctx_with_message("look at this javascript bundle")).0,
            TaskType::JsAnalysis
        );
        assert_eq!(
            classify(&ctx_with_message("review this code please")).0,
            TaskType::CodeReview
        );
        assert_eq!(
            classify(&ctx_with_message("which tool should I use here?")).0,
            TaskType::ToolSelection
        );
    }

    #[test]
    fn exploitation_forces_supervision_and_raises_complexity() {
        let (task, enriched) = classify(&ctx_with_message("exploit the login form"));
        assert_eq!(task, TaskType::Exploitation);
        assert!(enriched.requires_supervision);
        assert_eq!(enriched.task_complexity, 8);
        assert_eq!(enriched.confidence_score, 0.6);
    }

    #[test]
    fn complexity_is_clamped_to_bounds() {
        let (_, enriched) =
            classify(&ctx_with_message("comprehensive deep thorough security vulnerability exploit test"));
        assert_eq!(enriched.task_complexity, 10);

        let (_, enriched) = classify(&ctx_with_message("basic quick simple question"));
        assert_eq!(enriched.task_complexity, 1);
    }

    #[test]
    fn empty_message_defaults_to_analysis() {
        let (task, enriched) = classify(&ctx_with_message(""));
        assert_eq!(task, TaskType::Analysis);
        assert_eq!(enriched.task_complexity, 5);
        assert_eq!(enriched.confidence_score, 0.6);
    }

    #[test]
    fn classification_is_deterministic_and_idempotent() {
        let ctx = ctx_with_message("analyze this deep security issue");
        let first = classify(&ctx);
        let second = classify(&ctx);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1.task_complexity, second.1.task_complexity);
        assert_eq!(first.1.confidence_score, second.1.confidence_score);

        // Feeding the enriched context back does not change the label.
        let (again, _) = classify(&first.1);
        assert_eq!(again, first.0);
    }
}
