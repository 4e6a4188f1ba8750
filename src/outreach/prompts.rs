//! Prompt construction for cold-outreach generation.
//!
//! Both builders are pure: identical input yields byte-identical output, which
//! the generator's cost estimate and the tests rely on.

use crate::outreach::types::{CompanyInfo, PromptContext};

/// Maximum words allowed in a generated body.
pub const MAX_BODY_WORDS: usize = 90;

/// Maximum characters allowed in a generated subject line.
pub const MAX_SUBJECT_CHARS: usize = 50;

/// Words and phrases that read as spam or hype. Matched case-insensitively as substrings.
pub const FORBIDDEN_WORDS: &[&str] = &[
    "revolutionary",
    "game-changer",
    "game changer",
    "cutting-edge",
    "synergy",
    "leverage",
    "guarantee",
    "act now",
    "limited time",
    "click here",
    "amazing",
    "incredible",
    "unbelievable",
    "world-class",
    "best-in-class",
    "risk-free",
    "no obligation",
    "free trial",
];

/// Build the system prompt. The company block is present only when
/// `company_name` is set.
pub fn build_system_prompt(company_info: Option<&CompanyInfo>) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You write short, personalized cold outreach emails that sound like one busy \
         professional writing to another. They must never read like marketing copy.\n\n",
    );

    prompt.push_str("Writing constraints:\n");
    prompt.push_str(&format!(
        "- Body: {MAX_BODY_WORDS} words maximum. Three short paragraphs at most.\n"
    ));
    prompt.push_str(&format!(
        "- Subject: {MAX_SUBJECT_CHARS} characters maximum, lowercase-friendly, no clickbait.\n"
    ));
    prompt.push_str("- Open with something specific to the recipient, never with \"I hope this finds you well\".\n");
    prompt.push_str("- One idea per email. Plain words, short sentences, no buzzwords.\n");
    prompt.push_str("- Never use exclamation marks.\n");
    prompt.push_str("- Match the requested tone exactly.\n\n");

    prompt.push_str("Never use these words or phrases:\n");
    prompt.push_str(&FORBIDDEN_WORDS.join(", "));
    prompt.push_str("\n\n");

    prompt.push_str(
        "Call to action: end with one low-friction question that is easy to answer.\n\
         Good examples:\n\
         - \"Worth a quick chat next week?\"\n\
         - \"Open to seeing how this could work for your team?\"\n\
         - \"Is this on your radar this quarter?\"\n\
         Avoid asking for 30-minute meetings or sending calendar links.\n\n",
    );

    prompt.push_str(
        "Output format: respond with exactly one JSON object and nothing else:\n\
         {\"subject\": \"...\", \"body\": \"...\"}\n\
         Use {{name}} in the body where the recipient's first name belongs; it is \
         replaced before sending.",
    );

    if let Some(info) = company_info
        && let Some(name) = info.company_name.as_deref().filter(|n| !n.trim().is_empty())
    {
        prompt.push_str("\n\nYou are writing on behalf of this company:\n");
        prompt.push_str(&format!("- Company: {name}\n"));
        prompt.push_str(&format!("- Description: {}\n", info.description));
        prompt.push_str(&format!("- Value proposition: {}\n", info.value_proposition));
        prompt.push_str(&format!("- Target audience: {}\n", info.target_audience));
        prompt.push_str(&format!("- Key benefits: {}", info.key_benefits));
    }

    prompt
}

/// Build the user prompt for one lead. Optional lines are omitted entirely
/// when their field is absent.
pub fn build_user_prompt(context: &PromptContext) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str("Write a cold outreach email to this lead.\n\n");
    prompt.push_str(&format!("Name: {}\n", context.lead_name));
    prompt.push_str(&format!("Role: {}\n", context.lead_position));
    if let Some(company) = &context.lead_company {
        prompt.push_str(&format!("Company: {company}\n"));
    }
    prompt.push_str(&format!("What they need: {}\n", context.lead_requirement));
    if let Some(linkedin) = &context.lead_linkedin {
        prompt.push_str(&format!("LinkedIn: {linkedin}\n"));
    }
    if let Some(website) = &context.lead_website {
        prompt.push_str(&format!("Website: {website}\n"));
    }
    prompt.push_str(&format!("Tone: {}\n", context.tone));

    if let Some(campaign) = &context.campaign_context {
        prompt.push_str(&format!("\nCampaign context: {campaign}\n"));
    }

    if let Some(persona) = &context.persona {
        prompt.push_str("\nPersona insights:\n");
        if let Some(summary) = &persona.summary {
            prompt.push_str(&format!("- Summary: {summary}\n"));
        }
        if !persona.pain_points.is_empty() {
            prompt.push_str(&format!("- Pain points: {}\n", persona.pain_points.join("; ")));
        }
        if !persona.priorities.is_empty() {
            prompt.push_str(&format!("- Priorities: {}\n", persona.priorities.join("; ")));
        }
        if !persona.icebreakers.is_empty() {
            prompt.push_str(&format!("- Icebreakers: {}\n", persona.icebreakers.join("; ")));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::PersonaInsights;
    use crate::outreach::types::Tone;

    fn base_context() -> PromptContext {
        PromptContext {
            lead_name: "Ada Lovelace".into(),
            lead_position: "CTO".into(),
            lead_requirement: "faster reporting".into(),
            tone: Tone::Casual,
            ..Default::default()
        }
    }

    #[test]
    fn system_prompt_without_company_has_no_company_block() {
        let prompt = build_system_prompt(None);
        assert!(!prompt.contains("on behalf of"));
        assert!(!prompt.contains("Company:"));
        assert!(prompt.contains("\"subject\""));
        assert!(prompt.contains("90 words"));
        assert!(prompt.contains("50 characters"));
    }

    #[test]
    fn system_prompt_with_company_name_includes_block() {
        let info = CompanyInfo {
            company_name: Some("Acme".into()),
            value_proposition: "reports in minutes".into(),
            ..Default::default()
        };
        let prompt = build_system_prompt(Some(&info));
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("reports in minutes"));
    }

    #[test]
    fn company_info_without_name_is_omitted() {
        let info = CompanyInfo {
            company_name: None,
            description: "should not appear".into(),
            ..Default::default()
        };
        let prompt = build_system_prompt(Some(&info));
        assert_eq!(prompt, build_system_prompt(None));
    }

    #[test]
    fn blank_company_name_is_omitted() {
        for blank in ["", "   "] {
            let info = CompanyInfo {
                company_name: Some(blank.into()),
                description: "Support automation".into(),
                ..Default::default()
            };
            assert_eq!(build_system_prompt(Some(&info)), build_system_prompt(None));
        }
    }

    #[test]
    fn system_prompt_lists_forbidden_words() {
        let prompt = build_system_prompt(None);
        for word in FORBIDDEN_WORDS {
            assert!(prompt.contains(word), "missing {word}");
        }
    }

    #[test]
    fn builders_are_deterministic() {
        let ctx = base_context();
        assert_eq!(build_user_prompt(&ctx), build_user_prompt(&ctx));
        assert_eq!(build_system_prompt(None), build_system_prompt(None));
    }

    #[test]
    fn user_prompt_always_has_core_fields() {
        let prompt = build_user_prompt(&base_context());
        assert!(prompt.contains("Name: Ada Lovelace"));
        assert!(prompt.contains("Role: CTO"));
        assert!(prompt.contains("What they need: faster reporting"));
        assert!(prompt.contains("Tone: casual"));
    }

    #[test]
    fn user_prompt_omits_absent_optional_lines() {
        let prompt = build_user_prompt(&base_context());
        assert!(!prompt.contains("Company:"));
        assert!(!prompt.contains("LinkedIn:"));
        assert!(!prompt.contains("Website:"));
        assert!(!prompt.contains("Campaign context"));
        assert!(!prompt.contains("Persona"));
    }

    #[test]
    fn user_prompt_includes_present_optional_lines() {
        let ctx = PromptContext {
            lead_company: Some("Analytical Engines".into()),
            lead_linkedin: Some("https://linkedin.com/in/ada".into()),
            lead_website: Some("https://engines.example".into()),
            campaign_context: Some("Intro: mention the new dashboard".into()),
            persona: Some(PersonaInsights {
                pain_points: vec!["manual exports".into()],
                icebreakers: vec!["recent talk on computing".into()],
                ..Default::default()
            }),
            ..base_context()
        };
        let prompt = build_user_prompt(&ctx);
        assert!(prompt.contains("Company: Analytical Engines"));
        assert!(prompt.contains("LinkedIn: https://linkedin.com/in/ada"));
        assert!(prompt.contains("Website: https://engines.example"));
        assert!(prompt.contains("Campaign context: Intro: mention the new dashboard"));
        assert!(prompt.contains("Pain points: manual exports"));
        assert!(prompt.contains("Icebreakers: recent talk on computing"));
        assert!(!prompt.contains("Priorities"));
    }
}
