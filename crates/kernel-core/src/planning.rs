//! Phase *build plan*'s two helpers: the fixed per-`IntentType` step
//! expansion, and the heuristics that turn a caller-supplied
//! [`ExecutionIntent`] into the [`RiskContext`] the risk engine needs.
//! `ExecutionIntent::parameters` is deliberately opaque (`HashMap<String,
//! Value>`); these functions are the one place that reaches into it.

use std::collections::HashMap;

use kernel_model::{ExecutionIntent, ExecutionStep, IntentType, RiskContext, Sensitivity};

fn step(
    order: u32,
    action: &str,
    description: String,
    is_mutation: bool,
    rollback_action: Option<String>,
) -> ExecutionStep {
    ExecutionStep {
        order,
        action: action.to_string(),
        description,
        is_mutation,
        rollback_action,
    }
}

/// Fixed expansion table from `IntentType` to the ordered steps a plan
/// carries. Every intent type produces exactly one step in this kernel;
/// multi-step plans are a natural extension a host-specific planner could
/// add without touching anything downstream of `ToolPlan`.
pub fn build_steps(intent_type: IntentType, action: &str, target: Option<&str>) -> Vec<ExecutionStep> {
    use IntentType::*;
    let target_desc = target.unwrap_or("the target").to_string();
    match intent_type {
        ReadCalendar => vec![step(1, "read_calendar", format!("Read calendar entries for {target_desc}"), false, None)],
        ReadContacts => vec![step(1, "read_contacts", format!("Read contacts matching {target_desc}"), false, None)],
        DraftMessage => vec![step(1, "draft_message", format!("Draft a message: {action}"), false, None)],
        DraftReminder => vec![step(1, "draft_reminder", format!("Draft a reminder: {action}"), false, None)],
        CalendarCreate => vec![step(
            1,
            "calendar_create",
            format!("Create calendar event {target_desc}"),
            true,
            Some("calendar_delete".to_string()),
        )],
        CalendarUpdate => vec![step(
            1,
            "calendar_update",
            format!("Update calendar event {target_desc}"),
            true,
            Some("calendar_revert".to_string()),
        )],
        CalendarDelete => vec![step(1, "calendar_delete", format!("Delete calendar event {target_desc}"), true, None)],
        SendEmail => vec![step(1, "send_email", format!("Send email: {action}"), true, None)],
        ExternalApiCall => vec![step(1, "external_api_call", format!("Call external API {target_desc}"), true, None)],
        DatabaseMutation => vec![step(1, "database_mutation", format!("Mutate database record(s): {target_desc}"), true, None)],
        FileWrite => vec![step(
            1,
            "file_write",
            format!("Write file {target_desc}"),
            true,
            Some("file_restore_backup".to_string()),
        )],
        FileDelete => vec![step(
            1,
            "file_delete",
            format!("Delete file {target_desc}"),
            true,
            Some("file_restore_backup".to_string()),
        )],
        SystemConfig => vec![step(1, "system_config", format!("Change system configuration: {action}"), true, None)],
        Unknown => vec![step(1, "unknown_action", format!("Unclassified action: {action}"), true, None)],
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn params_bool(parameters: &HashMap<String, serde_json::Value>, key: &str) -> bool {
    parameters.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Derives risk-engine inputs from the intent's free-form action text and
/// opaque parameter bag. A host with a richer tool-calling surface may pass
/// these markers explicitly (`involvesPayment`, `recipients`, `hasBackup`,
/// `recordCount`) rather than relying on text sniffing; explicit values
/// always win over the heuristic.
pub fn build_risk_context(
    intent: &ExecutionIntent,
    intent_type: IntentType,
    sensitivity: Sensitivity,
    has_rollback_plan: bool,
) -> RiskContext {
    let lower = intent.action.to_lowercase();
    let involves_payment = params_bool(&intent.parameters, "involvesPayment")
        || contains_any(&lower, &["payment", "invoice", "charge", "pay "]);

    let external_recipient_count = intent
        .parameters
        .get("recipients")
        .and_then(|v| v.as_array())
        .map(|a| a.len() as u32)
        .unwrap_or(if intent_type.is_external_communication() { 1 } else { 0 });

    let affected_record_count = intent
        .parameters
        .get("recordCount")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(1);

    RiskContext {
        intent_type,
        sensitivity,
        involves_payment,
        external_recipient_count,
        has_rollback_plan,
        affected_record_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn payment_keyword_sets_involves_payment() {
        let intent = ExecutionIntent {
            action: "send payment to vendor".to_string(),
            target: None,
            parameters: HashMap::new(),
            requested_at: Utc::now(),
        };
        let ctx = build_risk_context(&intent, IntentType::ExternalApiCall, Sensitivity::Low, false);
        assert!(ctx.involves_payment);
    }

    #[test]
    fn recipients_array_overrides_default_external_count() {
        let mut parameters = HashMap::new();
        parameters.insert(
            "recipients".to_string(),
            serde_json::json!(["a@example.com", "b@example.com", "c@example.com"]),
        );
        let intent = ExecutionIntent {
            action: "send email".to_string(),
            target: None,
            parameters,
            requested_at: Utc::now(),
        };
        let ctx = build_risk_context(&intent, IntentType::SendEmail, Sensitivity::Low, false);
        assert_eq!(ctx.external_recipient_count, 3);
    }

    #[test]
    fn build_steps_marks_calendar_create_as_mutation_with_rollback() {
        let steps = build_steps(IntentType::CalendarCreate, "create calendar event", Some("standup"));
        assert_eq!(steps.len(), 1);
        assert!(steps[0].is_mutation);
        assert!(steps[0].rollback_action.is_some());
    }
}
