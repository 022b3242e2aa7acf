use crate::protocol::Action;

/// Default sensitive field names that should be masked in output.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passcode",
    "secret",
    "token",
    "cvv",
    "ssn",
    "card_number",
    "credit card",
    "credit_card",
];

/// One-line rendering of an action for logs, e.g. `fill "Password" = "••••••••"`.
pub fn format_action(action: &Action) -> String {
    let mut out = format!("{} {:?}", action.kind, action.target);
    if let Some(value) = action.value_str() {
        let display_val = mask_sensitive(value, &action.target, &[]);
        out.push_str(&format!(" = {:?}", display_val));
    }
    out
}

pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    let lower_field = field_name.to_lowercase();

    let is_sensitive = sensitive_fields
        .iter()
        .any(|f| lower_field.contains(&f.to_lowercase()))
        || DEFAULT_SENSITIVE_FIELDS
            .iter()
            .any(|f| lower_field.contains(*f));

    if is_sensitive {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_for_log(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
