//! Prompt template store: role instructions and per-turn prompt builders.
//! Pure data and string formatting; no behavior.

use tariffsim_core::domain::message::{Message, MessageRole};
use tariffsim_core::domain::persona::Persona;

/// Fixed opening line from the assistant; emitted before any LLM call.
pub const ASSISTANT_GREETING: &str =
    "Hello, I am your tariff advisor. How can I help you find the right mobile plan today?";

pub const ASSISTANT_ROLE_INSTRUCTIONS: &str = "You are a skilled telecom tariff advisor. You \
    listen carefully to customer requests, address their specific questions, and recommend \
    plans only from the catalog you are given. Your primary goal is customer satisfaction, but \
    you also aim to increase value by suggesting beneficial add-ons that match customer needs.";

pub const CUSTOMER_ROLE_INSTRUCTIONS: &str = "You are a real customer looking for a new mobile \
    tariff plan. You have specific needs regarding data usage, calls, and budget. Ask questions \
    and express concerns naturally. Never give advice or recommendations as if you were an \
    advisor; only talk about your own needs, preferences, and questions.";

/// Recommendation-narrowing directive keyed by how many customer turns have
/// been taken. Early turns present a short list; later turns converge on a
/// single recommendation.
pub fn narrowing_directive(customer_turn: u32) -> &'static str {
    match customer_turn {
        0 | 1 | 2 => {
            "Present 2-3 options that match the customer's needs, including at least one \
             premium option."
        }
        3 => {
            "Narrow your recommendation to exactly one plan that best matches the features the \
             customer has shown interest in, and mention relevant add-ons."
        }
        _ => {
            "Recommend exactly one plan as the best fit for this customer, persuasively, and \
             suggest beneficial add-ons that increase value."
        }
    }
}

/// Transcript rendering used inside prompts: bounded window, oldest first,
/// log entries excluded.
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role != MessageRole::Log)
        .map(|message| format!("{}: {}", message.role.speaker_label(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn customer_intro_prompt(persona: &Persona) -> String {
    format!(
        "You are {name}. {needs}\n\
         Start the conversation by introducing yourself by name and expressing your needs and \
         what you are looking for in a new mobile tariff plan. Do NOT provide advice or \
         recommendations. Keep your response concise and natural.",
        name = persona.name,
        needs = persona.needs
    )
}

pub fn assistant_prompt(
    history: &[Message],
    catalog_markdown: &str,
    persona_line: &str,
    customer_turn: u32,
) -> String {
    format!(
        "Analyze the conversation history and respond as a telecom tariff advisor.\n\n\
         Conversation History:\n{history}\n\n\
         Available Tariff Plans:\n{catalog}\n\
         Customer: {persona}\n\n\
         IMPORTANT INSTRUCTIONS:\n\
         1. FIRST, directly address the customer's most recent question or concern\n\
         2. ALWAYS provide information about specific features when asked\n\
         3. Recommend plans that match ALL of the customer's stated requirements\n\
         4. Only recommend plans from the catalog above\n\n\
         Recommendation strategy for this turn: {directive}",
        history = format_transcript(history),
        catalog = catalog_markdown,
        persona = persona_line,
        directive = narrowing_directive(customer_turn),
    )
}

pub fn customer_reply_prompt(
    persona: &Persona,
    history: &[Message],
    assistant_message: &str,
    previous_customer_messages: &[String],
) -> String {
    let previous = if previous_customer_messages.is_empty() {
        "(none)".to_string()
    } else {
        previous_customer_messages.join(" | ")
    };

    format!(
        "Respond as a real customer named {name} with these needs: {needs}\n\n\
         Conversation History:\n{history}\n\n\
         The tariff advisor just said: {assistant_message}\n\n\
         IMPORTANT INSTRUCTIONS:\n\
         1. Respond ONLY as a real customer in a SINGLE, BRIEF response\n\
         2. DO NOT provide advice or recommendations\n\
         3. ONLY express your own needs, preferences, or questions\n\
         4. PROGRESS THE CONVERSATION - do not repeat your previous messages\n\
         5. If the advisor has recommended a specific plan multiple times, either ask about \
         that plan's features, compare it to another plan, express concerns, or make a \
         decision using CLEAR language like \"I want to purchase the [plan name]\" or \
         \"I choose the [plan name]\"\n\
         6. Keep your response under 100 words\n\
         7. Make your response DIFFERENT from your previous messages: {previous}",
        name = persona.name,
        needs = persona.needs,
        history = format_transcript(history),
    )
}

pub fn confirmation_prompt(plan_name: &str) -> String {
    format!(
        "Generate a warm, friendly confirmation message for a customer who has chosen the \
         {plan_name} plan.\n\n\
         The message should:\n\
         1. Thank them for their choice\n\
         2. Confirm their selection of the {plan_name} plan\n\
         3. Briefly mention that a customer service representative will contact them soon to \
         complete the setup\n\n\
         Keep the message concise, friendly, and professional."
    )
}
