use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The caller-supplied request. Created by the caller, consumed by the
/// decision pipeline at the *intake* phase, and never persisted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionIntent {
    pub action: String,
    pub target: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

impl ExecutionIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            parameters: HashMap::new(),
            requested_at: chrono::Utc::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Closed classification of every intent the kernel recognizes. Each variant
/// carries a fixed mutation/external-communication profile and a default
/// reversibility class, used by the classifier and the risk engine's rule
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentType {
    ReadCalendar,
    ReadContacts,
    DraftMessage,
    DraftReminder,
    CalendarCreate,
    CalendarUpdate,
    CalendarDelete,
    SendEmail,
    ExternalApiCall,
    DatabaseMutation,
    FileWrite,
    FileDelete,
    SystemConfig,
    Unknown,
}

impl IntentType {
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            IntentType::ReadCalendar | IntentType::ReadContacts | IntentType::Unknown
        )
    }

    pub fn is_external_communication(self) -> bool {
        matches!(
            self,
            IntentType::SendEmail | IntentType::ExternalApiCall
        )
    }

    pub fn default_reversibility(self) -> ReversibilityClass {
        use IntentType::*;
        match self {
            ReadCalendar | ReadContacts | DraftMessage | DraftReminder => {
                ReversibilityClass::Reversible
            }
            CalendarCreate | CalendarUpdate | CalendarDelete | FileDelete => {
                ReversibilityClass::PartiallyReversible
            }
            SendEmail | ExternalApiCall | DatabaseMutation | FileWrite | SystemConfig
            | Unknown => ReversibilityClass::Irreversible,
        }
    }
}

/// `{ reversible, partiallyReversible, irreversible }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReversibilityClass {
    Reversible,
    PartiallyReversible,
    Irreversible,
}

/// Content-sensitivity bucket derived from the raw intent text, independent
/// of the risk engine's numeric scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Critical,
}

/// Deterministic keyword/heuristic classification of an intent's free-form
/// `action` string. This is the documented mapping §4.1 phase *classify*
/// calls for — no ML, no opaque scoring.
pub fn classify_action(action: &str) -> IntentType {
    let lower = action.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("read calendar") || (has("calendar") && has("read")) {
        IntentType::ReadCalendar
    } else if has("read contact") || (has("contact") && has("read")) {
        IntentType::ReadContacts
    } else if has("draft reminder") {
        IntentType::DraftReminder
    } else if has("draft") {
        IntentType::DraftMessage
    } else if has("delete calendar") || (has("calendar") && has("delete")) {
        IntentType::CalendarDelete
    } else if has("update calendar") || (has("calendar") && has("update")) {
        IntentType::CalendarUpdate
    } else if has("create calendar") || (has("calendar") && has("create")) {
        IntentType::CalendarCreate
    } else if has("send email") || has("send message") {
        IntentType::SendEmail
    } else if has("external api") || has("call api") || has("webhook") {
        IntentType::ExternalApiCall
    } else if has("database") || has("db mutation") || has("db write") {
        IntentType::DatabaseMutation
    } else if has("delete file") {
        IntentType::FileDelete
    } else if has("write file") || has("save file") {
        IntentType::FileWrite
    } else if has("system config") || has("change setting") {
        IntentType::SystemConfig
    } else {
        IntentType::Unknown
    }
}

/// Derive content-sensitivity markers from the action string, per §4.1.
pub fn classify_sensitivity(action: &str, parameters: &HashMap<String, serde_json::Value>) -> Sensitivity {
    let lower = action.to_lowercase();
    let params_text = parameters
        .values()
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let haystack = format!("{lower} {params_text}");

    if haystack.contains("password") || haystack.contains("secret") {
        Sensitivity::Critical
    } else if haystack.contains("health") || haystack.contains("medical") {
        Sensitivity::High
    } else if haystack.contains("email")
        || haystack.contains("phone")
        || haystack.contains("address")
        || haystack.contains("external")
    {
        Sensitivity::Medium
    } else {
        Sensitivity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_read_calendar() {
        assert_eq!(classify_action("read calendar"), IntentType::ReadCalendar);
    }

    #[test]
    fn classifies_send_email_as_external_communication() {
        assert!(IntentType::SendEmail.is_external_communication());
        assert!(!IntentType::ReadCalendar.is_mutation());
    }

    #[test]
    fn detects_critical_sensitivity_for_secrets() {
        let params = HashMap::new();
        assert_eq!(
            classify_sensitivity("rotate the password", &params),
            Sensitivity::Critical
        );
    }
}
