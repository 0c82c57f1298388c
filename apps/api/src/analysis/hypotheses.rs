//! Hypothesis catalog: a JSON file when one is configured, otherwise the
//! built-in table. Lookups never fail towards the caller.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hypothesis {
    #[serde(alias = "hid")]
    pub id: String,
    pub title: String,
    pub cvr_focus: String,
    pub question: String,
    pub actions: String,
    pub effect: String,
}

pub struct HypothesisCatalog {
    primary: HashMap<String, Hypothesis>,
    builtin: HashMap<String, Hypothesis>,
}

impl HypothesisCatalog {
    /// Reads the catalog file at `path`. A missing path, an unreadable file
    /// or malformed JSON falls back to the built-in table.
    pub fn load(path: Option<&Path>) -> Self {
        let primary = match path {
            Some(path) => match read_catalog(path) {
                Ok(list) => {
                    info!("Loaded {} hypotheses from {}", list.len(), path.display());
                    index(list)
                }
                Err(e) => {
                    warn!(
                        "Hypothesis catalog {} unavailable, using built-in table: {e}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };
        Self {
            primary,
            builtin: index(builtin_hypotheses()),
        }
    }

    #[cfg(test)]
    pub fn builtin() -> Self {
        Self::load(None)
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<Hypothesis>) -> Self {
        Self {
            primary: index(entries),
            builtin: index(builtin_hypotheses()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Hypothesis> {
        self.primary.get(id).or_else(|| self.builtin.get(id))
    }

    /// Looks up each id in order; unknown ids are skipped and logged.
    pub fn resolve<'a, I>(&self, ids: I) -> Vec<Hypothesis>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter_map(|id| {
                let found = self.get(id).cloned();
                if found.is_none() {
                    warn!("Unknown hypothesis id {id}");
                }
                found
            })
            .collect()
    }
}

fn index(list: Vec<Hypothesis>) -> HashMap<String, Hypothesis> {
    list.into_iter().map(|h| (h.id.clone(), h)).collect()
}

fn read_catalog(path: &Path) -> anyhow::Result<Vec<Hypothesis>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn builtin_hypotheses() -> Vec<Hypothesis> {
    let h = |id: &str, title: &str, cvr_focus: &str, question: &str, actions: &str, effect: &str| {
        Hypothesis {
            id: id.to_string(),
            title: title.to_string(),
            cvr_focus: cvr_focus.to_string(),
            question: question.to_string(),
            actions: actions.to_string(),
            effect: effect.to_string(),
        }
    };
    vec![
        h(
            "H1",
            "Profile positioning",
            "CVR1 (applications → responses)",
            "Does your profile match what employers expect?",
            "Rework the resume, LinkedIn profile and cover letters",
            "More responses per application",
        ),
        h(
            "H2",
            "Search channels",
            "CVR1-CVR2 (applications → responses → screenings)",
            "Are you using the right channels for your role?",
            "Diversify channels and focus on niche job boards",
            "Better replies and more screenings passed",
        ),
        h(
            "H3",
            "Screening preparation",
            "CVR2-CVR3 (screenings → onsites)",
            "Are you ready for the first conversations with recruiters?",
            "Prepare an elevator pitch and rehearse common questions",
            "More candidates moved on to technical interviews",
        ),
        h(
            "H4",
            "Technical preparation",
            "CVR3 (onsites → offers)",
            "Is your technical preparation sufficient?",
            "Study cases, solve problems, prepare a portfolio",
            "Higher success rate in technical interviews",
        ),
        h(
            "H5",
            "Offer negotiation",
            "CVR4 (onsites → offers)",
            "Do you close interviews well?",
            "Prepare questions for the company and practise closing techniques",
            "More onsites converted into offers",
        ),
    ]
}
