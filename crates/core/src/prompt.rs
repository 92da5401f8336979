//! Renders a consult's preferences into the instruction sent to the provider.

use crate::domain::consult::Consult;

pub const PROMPT_PREAMBLE: &str = "You are a senior automotive consultant. Based on the \
preferences below, recommend 3-5 suitable car models. Give each recommendation a model name and \
a short reason. Reply in plain text only:";
pub const NOT_PROVIDED: &str = "not provided";
pub const ANONYMOUS_USER: &str = "anonymous user";

/// Pure and deterministic: the same consult always renders the same prompt.
pub fn build_prompt(consult: &Consult) -> String {
    let user = consult.user_id.map(|id| id.to_string());
    let preferences = &consult.preferences;

    let lines = [
        ("User", user.as_deref().unwrap_or(ANONYMOUS_USER)),
        ("Budget range", field(&preferences.budget_range)),
        ("Preferred type", field(&preferences.preferred_type)),
        ("Use case", field(&preferences.use_case)),
        ("Fuel type", field(&preferences.fuel_type)),
        ("Brand preference", field(&preferences.brand_preference)),
    ];

    let mut prompt = String::from(PROMPT_PREAMBLE);
    for (label, value) in lines {
        prompt.push('\n');
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(value);
    }
    prompt
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_PROVIDED)
}
