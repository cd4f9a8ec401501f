//! Page records and how they are cut into training documents.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::config::Scope;

lazy_static! {
    /// Sections whose text is citation- or list-like rather than descriptive.
    static ref FORBIDDEN_SECTIONS: HashSet<&'static str> = [
        "see also", "external links", "cast", "references", "personnel", "honours", "awards",
        "track listing", "discography", "further reading", "works", "notable people",
        "bibliography", "filmography", "people", "events", "other uses", "music", "places",
        "notable alumni", "sources", "deaths", "publications", "births", "selected filmography",
        "other", "awards and honors", "characters", "members", "incumbents", "honors",
        "citations", "source", "participants",
    ]
    .into_iter()
    .collect();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub section_idx: u32,
    #[serde(default)]
    pub section_name: String,
    pub plaintext: String,
}

/// One topic's source record: free-form metadata plus its paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

pub fn is_forbidden_section(name: &str) -> bool {
    FORBIDDEN_SECTIONS.contains(name.trim().to_lowercase().as_str())
}

impl Page {
    /// Drops paragraphs from citation- and list-like sections.
    pub fn filter_sections(&mut self) {
        self.paragraphs.retain(|p| !is_forbidden_section(&p.section_name));
    }

    /// Text of the page for the given scope. A page without paragraphs
    /// yields an empty string so it still occupies its row.
    pub fn chunk(&self, scope: Scope) -> String {
        match scope {
            Scope::Paragraph => self.paragraphs.first().map(|p| p.plaintext.clone()).unwrap_or_default(),
            Scope::Intro => join(self.paragraphs.iter().filter(|p| p.section_idx == 0)),
            Scope::Page => join(self.paragraphs.iter()),
        }
    }

    /// Splits the page into its metadata row and scoped text.
    pub fn into_parts(mut self, scope: Scope) -> (Map<String, Value>, String) {
        self.filter_sections();
        let text = self.chunk(scope);
        (self.metadata, text)
    }
}

fn join<'a>(paragraphs: impl Iterator<Item = &'a Paragraph>) -> String {
    paragraphs.map(|p| p.plaintext.as_str()).collect::<Vec<_>>().join(" ")
}
