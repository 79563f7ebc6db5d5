use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_CHAPTERS: usize = 9;
pub const MAX_CHAPTERS: usize = 30;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NovelOutline {
    pub synthesis: String,
    pub description: String,
    pub plot: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChapterOutlineEntry {
    pub title: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeTechnique {
    FirstPerson,
    ThirdPersonOmniscient,
    ThirdPersonLimited,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FirstPersonPov {
    #[default]
    Protagonist,
    Witness,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PointOfView {
    Protagonist,
    Witness,
    Omniscient,
    Limited,
}

/// Narrative technique together with its point of view.
///
/// The point of view is never stored on its own: it is read off the variant, so it
/// cannot drift away from the technique. Only first person carries a choice.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeChoice {
    #[default]
    Unset,
    FirstPerson(FirstPersonPov),
    ThirdPersonOmniscient,
    ThirdPersonLimited,
}

impl NarrativeChoice {
    /// Choice a freshly selected technique starts with.
    pub fn for_technique(technique: Option<NarrativeTechnique>) -> Self {
        match technique {
            Some(NarrativeTechnique::FirstPerson) => {
                NarrativeChoice::FirstPerson(FirstPersonPov::default())
            }
            Some(NarrativeTechnique::ThirdPersonOmniscient) => {
                NarrativeChoice::ThirdPersonOmniscient
            }
            Some(NarrativeTechnique::ThirdPersonLimited) => NarrativeChoice::ThirdPersonLimited,
            None => NarrativeChoice::Unset,
        }
    }

    pub fn technique(&self) -> Option<NarrativeTechnique> {
        match self {
            NarrativeChoice::Unset => None,
            NarrativeChoice::FirstPerson(_) => Some(NarrativeTechnique::FirstPerson),
            NarrativeChoice::ThirdPersonOmniscient => Some(NarrativeTechnique::ThirdPersonOmniscient),
            NarrativeChoice::ThirdPersonLimited => Some(NarrativeTechnique::ThirdPersonLimited),
        }
    }

    pub fn pov(&self) -> Option<PointOfView> {
        match self {
            NarrativeChoice::Unset => None,
            NarrativeChoice::FirstPerson(FirstPersonPov::Protagonist) => {
                Some(PointOfView::Protagonist)
            }
            NarrativeChoice::FirstPerson(FirstPersonPov::Witness) => Some(PointOfView::Witness),
            NarrativeChoice::ThirdPersonOmniscient => Some(PointOfView::Omniscient),
            NarrativeChoice::ThirdPersonLimited => Some(PointOfView::Limited),
        }
    }

    pub fn is_set(&self) -> bool {
        self.technique().is_some() && self.pov().is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Conflict,
    Scene,
    Dialogue,
    SubPlot,
    KeyEvents,
}

impl EnrichmentKind {
    pub const ALL: [EnrichmentKind; 5] = [
        EnrichmentKind::Conflict,
        EnrichmentKind::Scene,
        EnrichmentKind::Dialogue,
        EnrichmentKind::SubPlot,
        EnrichmentKind::KeyEvents,
    ];
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichmentKind::Conflict => "conflict",
            EnrichmentKind::Scene => "scene description",
            EnrichmentKind::Dialogue => "dialogue snippet",
            EnrichmentKind::SubPlot => "sub-plot ideas",
            EnrichmentKind::KeyEvents => "key events",
        };
        f.write_str(name)
    }
}

/// The five supplementary texts generated for one chapter.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChapterEnrichment {
    pub conflict: Option<String>,
    pub scene_description: Option<String>,
    pub dialogue_snippet: Option<String>,
    pub sub_plot_ideas: Option<String>,
    pub key_events: Option<String>,
}

impl ChapterEnrichment {
    pub fn get(&self, kind: EnrichmentKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    /// Overwrites one field, leaving the other four untouched.
    pub fn set(&mut self, kind: EnrichmentKind, text: String) {
        *self.slot_mut(kind) = Some(text);
    }

    pub fn missing(&self) -> Vec<EnrichmentKind> {
        EnrichmentKind::ALL
            .into_iter()
            .filter(|kind| self.slot(*kind).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        EnrichmentKind::ALL
            .into_iter()
            .all(|kind| self.slot(kind).is_some())
    }

    fn slot(&self, kind: EnrichmentKind) -> &Option<String> {
        match kind {
            EnrichmentKind::Conflict => &self.conflict,
            EnrichmentKind::Scene => &self.scene_description,
            EnrichmentKind::Dialogue => &self.dialogue_snippet,
            EnrichmentKind::SubPlot => &self.sub_plot_ideas,
            EnrichmentKind::KeyEvents => &self.key_events,
        }
    }

    fn slot_mut(&mut self, kind: EnrichmentKind) -> &mut Option<String> {
        match kind {
            EnrichmentKind::Conflict => &mut self.conflict,
            EnrichmentKind::Scene => &mut self.scene_description,
            EnrichmentKind::Dialogue => &mut self.dialogue_snippet,
            EnrichmentKind::SubPlot => &mut self.sub_plot_ideas,
            EnrichmentKind::KeyEvents => &mut self.key_events,
        }
    }
}

/// Kind of a generation step, without the chapter it targets.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Outline,
    Characters,
    Setting,
    PlotTwist,
    TableOfContents,
    Enrichment(EnrichmentKind),
    ChapterContent,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Outline => f.write_str("outline"),
            StageKind::Characters => f.write_str("characters"),
            StageKind::Setting => f.write_str("setting"),
            StageKind::PlotTwist => f.write_str("plot twist"),
            StageKind::TableOfContents => f.write_str("table of contents"),
            StageKind::Enrichment(kind) => kind.fmt(f),
            StageKind::ChapterContent => f.write_str("chapter content"),
        }
    }
}

/// One concrete generation step. Chapter indices are zero-based.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Outline,
    Characters,
    Setting,
    PlotTwist,
    TableOfContents,
    Enrichment(EnrichmentKind, usize),
    ChapterContent(usize),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Outline => StageKind::Outline,
            Stage::Characters => StageKind::Characters,
            Stage::Setting => StageKind::Setting,
            Stage::PlotTwist => StageKind::PlotTwist,
            Stage::TableOfContents => StageKind::TableOfContents,
            Stage::Enrichment(kind, _) => StageKind::Enrichment(*kind),
            Stage::ChapterContent(_) => StageKind::ChapterContent,
        }
    }

    pub fn chapter(&self) -> Option<usize> {
        match self {
            Stage::Enrichment(_, index) | Stage::ChapterContent(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chapter() {
            Some(index) => write!(f, "{} (chapter {})", self.kind(), index + 1),
            None => self.kind().fmt(f),
        }
    }
}

/// In-flight marker for one stage kind. At most one instance of a kind runs at a time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageActivity {
    #[default]
    Idle,
    Running { chapter: Option<usize> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub user_theme: String,
    pub num_chapters: usize,
    pub narrative: NarrativeChoice,
    pub outline: Option<NovelOutline>,
    pub characters: Option<Vec<Character>>,
    pub setting: Option<String>,
    pub plot_twist: Option<String>,
    pub table_of_contents: Option<Vec<ChapterOutlineEntry>>,
    pub enrichments: BTreeMap<usize, ChapterEnrichment>,
    pub chapter_contents: BTreeMap<usize, String>,
    /// Bumped on every cascade reset so in-flight results can tell they are stale.
    pub revision: u64,
}

impl SessionState {
    pub fn new(num_chapters: usize) -> Self {
        Self {
            user_theme: String::new(),
            num_chapters,
            narrative: NarrativeChoice::Unset,
            outline: None,
            characters: None,
            setting: None,
            plot_twist: None,
            table_of_contents: None,
            enrichments: BTreeMap::new(),
            chapter_contents: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Drops everything derived from the outline, narrative choice included.
    /// Theme and chapter count are operator input and survive.
    pub fn cascade_reset(&mut self) {
        self.outline = None;
        self.characters = None;
        self.setting = None;
        self.plot_twist = None;
        self.table_of_contents = None;
        self.enrichments.clear();
        self.chapter_contents.clear();
        self.narrative = NarrativeChoice::Unset;
        self.revision += 1;
    }

    pub fn set_technique(&mut self, technique: Option<NarrativeTechnique>) {
        self.narrative = NarrativeChoice::for_technique(technique);
    }

    pub fn chapter(&self, index: usize) -> Option<&ChapterOutlineEntry> {
        self.table_of_contents.as_ref()?.get(index)
    }

    pub fn enrichment(&self, index: usize) -> Option<&ChapterEnrichment> {
        self.enrichments.get(&index)
    }

    pub fn enrichment_text(&self, index: usize, kind: EnrichmentKind) -> Option<&str> {
        self.enrichment(index)?.get(kind)
    }

    pub fn is_chapter_ready(&self, index: usize) -> bool {
        self.enrichment(index)
            .map(ChapterEnrichment::is_complete)
            .unwrap_or(false)
    }

    pub fn chapter_content(&self, index: usize) -> Option<&str> {
        self.chapter_contents.get(&index).map(String::as_str)
    }
}

pub fn chapter_count_in_range(count: usize) -> bool {
    (MIN_CHAPTERS..=MAX_CHAPTERS).contains(&count)
}
