// Prompt templates for the recommendation generator.
// The LLM client itself lives in crate::llm_client.

use std::fmt::Write;

use crate::analysis::bundle::RecommendationBundle;
use crate::models::funnel::FunnelShape;

pub const RECOMMENDATION_COUNT: usize = 10;

pub const RECOMMENDATION_SYSTEM: &str = "You are a job-search mentor. \
    You analyse a candidate's hiring funnel and give personal, concrete recommendations.";

fn funnel_description(shape: FunnelShape) -> &'static str {
    match shape {
        FunnelShape::Active => "Active search (applies to jobs)",
        FunnelShape::Passive => "Passive search (is approached by recruiters)",
    }
}

/// Renders the bundle as a plain-text request. Deterministic for a given
/// bundle, so it can be handed to the user when no generator is configured.
pub fn render_recommendation_prompt(bundle: &RecommendationBundle) -> String {
    let not_set = "not set";
    let (role, level, location, target, deadline, shape) = match &bundle.profile {
        Some(p) => (
            p.role.as_str(),
            p.level.as_str(),
            p.current_location.as_str(),
            p.target_location.as_str(),
            p.deadline_weeks.to_string(),
            bundle
                .funnel
                .as_ref()
                .map(|f| f.funnel_shape)
                .unwrap_or(p.preferred_funnel_shape),
        ),
        None => (
            not_set,
            not_set,
            not_set,
            not_set,
            not_set.to_string(),
            bundle
                .funnel
                .as_ref()
                .map(|f| f.funnel_shape)
                .unwrap_or_default(),
        ),
    };

    let mut prompt = format!(
        "Analyse the candidate's funnel and give {RECOMMENDATION_COUNT} personal recommendations.\n\
         \n\
         CANDIDATE PROFILE:\n\
         • Role: {role}\n\
         • Level: {level}\n\
         • Location: {location} → {target}\n\
         • Search deadline: {deadline} weeks\n\
         • Funnel type: {}\n",
        funnel_description(shape)
    );

    if let Some(funnel) = &bundle.funnel {
        let _ = writeln!(
            prompt,
            "• Analysed week: {} ({} channels)",
            funnel.week_start.format("%Y-%m-%d"),
            funnel.channels
        );
    }

    prompt.push_str("\nPROBLEM AREAS:");
    for flag in &bundle.problems {
        let _ = write!(
            prompt,
            "\n• {}: {}% (denominator: {})",
            flag.stage.as_str(),
            flag.cvr_value,
            flag.denominator
        );
    }

    prompt.push_str("\n\nHYPOTHESES TO CONSIDER:");
    for h in &bundle.hypotheses {
        let _ = write!(
            prompt,
            "\n\n{} — {}\n👉 {}\nQuestion: {}\nActions: {}\nEffect: {}",
            h.id, h.title, h.cvr_focus, h.question, h.actions, h.effect
        );
    }

    if !bundle.reflection_history.is_empty() {
        prompt.push_str("\n\nRECENT REFLECTIONS:");
        for record in &bundle.reflection_history {
            let _ = write!(
                prompt,
                "\n• {} ({}): overall {}/5, mood {}/5",
                record.stage.as_str(),
                record.channel,
                record.rating_overall,
                record.rating_mood
            );
            if let Some(s) = &record.strengths {
                let _ = write!(prompt, "; went well: {s}");
            }
            if let Some(w) = &record.weaknesses {
                let _ = write!(prompt, "; to improve: {w}");
            }
        }
    }

    let _ = write!(
        prompt,
        "\n\nTASK:\n\
         1. Analyse the candidate's problem stages\n\
         2. Pick the hypotheses most relevant to their situation\n\
         3. Write {RECOMMENDATION_COUNT} personal recommendations that fit the profile\n\
         \n\
         Each recommendation must be concrete and doable, tied to the role ({role}) \
         and level ({level}), aimed at one specific stage, with an example or template \
         where possible. Number them 1-{RECOMMENDATION_COUNT}."
    );

    prompt
}
