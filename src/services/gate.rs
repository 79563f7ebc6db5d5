//! Stage eligibility, derived from a [`SessionState`] and nothing else.

use crate::core::state::{
    chapter_count_in_range, EnrichmentKind, SessionState, Stage, MAX_CHAPTERS, MIN_CHAPTERS,
};
use serde::Serialize;
use std::fmt;

/// Why a stage may not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDenial {
    Missing(&'static str),
    ChapterCountOutOfRange(usize),
    NoSuchChapter { index: usize, chapters: usize },
    EnrichmentsMissing(Vec<EnrichmentKind>),
}

impl fmt::Display for GateDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDenial::Missing(what) => write!(f, "{} is missing", what),
            GateDenial::ChapterCountOutOfRange(count) => write!(
                f,
                "chapter count must be between {} and {}, got {}",
                MIN_CHAPTERS, MAX_CHAPTERS, count
            ),
            GateDenial::NoSuchChapter { index, chapters } => write!(
                f,
                "chapter {} does not exist (table of contents has {})",
                index + 1,
                chapters
            ),
            GateDenial::EnrichmentsMissing(kinds) => {
                let names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
                write!(f, "missing {}", names.join(", "))
            }
        }
    }
}

fn require(present: bool, what: &'static str) -> Result<(), GateDenial> {
    if present {
        Ok(())
    } else {
        Err(GateDenial::Missing(what))
    }
}

fn characters_gate(state: &SessionState) -> Result<(), GateDenial> {
    require(state.outline.is_some(), "outline")?;
    require(state.narrative.technique().is_some(), "narrative technique")?;
    require(state.narrative.pov().is_some(), "point of view")
}

fn setting_gate(state: &SessionState) -> Result<(), GateDenial> {
    characters_gate(state)?;
    require(state.characters.is_some(), "characters")
}

fn plot_twist_gate(state: &SessionState) -> Result<(), GateDenial> {
    setting_gate(state)?;
    require(state.setting.is_some(), "setting")
}

fn table_of_contents_gate(state: &SessionState) -> Result<(), GateDenial> {
    require(state.plot_twist.is_some(), "plot twist")?;
    if chapter_count_in_range(state.num_chapters) {
        Ok(())
    } else {
        Err(GateDenial::ChapterCountOutOfRange(state.num_chapters))
    }
}

fn chapter_gate(state: &SessionState, index: usize) -> Result<(), GateDenial> {
    let chapters = state
        .table_of_contents
        .as_ref()
        .ok_or(GateDenial::Missing("table of contents"))?;
    if index < chapters.len() {
        Ok(())
    } else {
        Err(GateDenial::NoSuchChapter {
            index,
            chapters: chapters.len(),
        })
    }
}

fn chapter_content_gate(state: &SessionState, index: usize) -> Result<(), GateDenial> {
    chapter_gate(state, index)?;
    if state.is_chapter_ready(index) {
        return Ok(());
    }
    let missing = state
        .enrichment(index)
        .map(|e| e.missing())
        .unwrap_or_else(|| EnrichmentKind::ALL.to_vec());
    Err(GateDenial::EnrichmentsMissing(missing))
}

pub fn check(state: &SessionState, stage: Stage) -> Result<(), GateDenial> {
    match stage {
        Stage::Outline => Ok(()),
        Stage::Characters => characters_gate(state),
        Stage::Setting => setting_gate(state),
        Stage::PlotTwist => plot_twist_gate(state),
        Stage::TableOfContents => table_of_contents_gate(state),
        Stage::Enrichment(_, index) => chapter_gate(state, index),
        Stage::ChapterContent(index) => chapter_content_gate(state, index),
    }
}

pub fn is_eligible(state: &SessionState, stage: Stage) -> bool {
    check(state, stage).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterGates {
    pub index: usize,
    pub enrichment: bool,
    pub content: bool,
}

/// Eligibility of every stage at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub outline: bool,
    pub characters: bool,
    pub setting: bool,
    pub plot_twist: bool,
    pub table_of_contents: bool,
    pub chapters: Vec<ChapterGates>,
}

pub fn report(state: &SessionState) -> GateReport {
    let chapter_count = state.table_of_contents.as_ref().map_or(0, Vec::len);
    GateReport {
        outline: is_eligible(state, Stage::Outline),
        characters: is_eligible(state, Stage::Characters),
        setting: is_eligible(state, Stage::Setting),
        plot_twist: is_eligible(state, Stage::PlotTwist),
        table_of_contents: is_eligible(state, Stage::TableOfContents),
        chapters: (0..chapter_count)
            .map(|index| ChapterGates {
                index,
                enrichment: is_eligible(state, Stage::Enrichment(EnrichmentKind::Conflict, index)),
                content: is_eligible(state, Stage::ChapterContent(index)),
            })
            .collect(),
    }
}
