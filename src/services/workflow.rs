use crate::core::config::Config;
use crate::core::error::StageError;
use crate::core::state::{
    chapter_count_in_range, ChapterOutlineEntry, Character, EnrichmentKind, FirstPersonPov,
    NarrativeChoice, NarrativeTechnique, NovelOutline, SessionState, Stage, StageActivity,
    StageKind, MAX_CHAPTERS, MIN_CHAPTERS,
};
use crate::services::gate::{self, GateDenial, GateReport};
use crate::services::generation::{GenerationClient, OutputShape};
use crate::services::llm::{create_llm, LlmClient};
use crate::services::prompts;
use anyhow::Result;
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

const MIN_CHARACTERS: usize = 3;
const MAX_CHARACTERS: usize = 5;

fn outline_shape() -> OutputShape {
    OutputShape::object(&["synthesis", "description", "plot"])
}

fn characters_shape() -> OutputShape {
    OutputShape::array_of(&["name", "role", "description"]).with_items(MIN_CHARACTERS, MAX_CHARACTERS)
}

fn table_of_contents_shape(chapters: usize) -> OutputShape {
    OutputShape::array_of(&["title", "description"]).with_items(chapters, chapters)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn validate_num_chapters(count: usize) -> std::result::Result<(), StageError> {
    if chapter_count_in_range(count) {
        Ok(())
    } else {
        Err(StageError::ValidationFailure(format!(
            "chapter count must be between {} and {}, got {}",
            MIN_CHAPTERS, MAX_CHAPTERS, count
        )))
    }
}

fn denied(stage: Stage, denial: GateDenial) -> StageError {
    match denial {
        GateDenial::ChapterCountOutOfRange(_) => StageError::ValidationFailure(denial.to_string()),
        other => StageError::precondition(stage, other.to_string()),
    }
}

/// Marks a stage kind as running for as long as it is alive.
struct RunSlot<'a> {
    activity: &'a Mutex<HashMap<StageKind, StageActivity>>,
    kind: StageKind,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        lock(self.activity).insert(self.kind, StageActivity::Idle);
    }
}

/// Drives one authoring session: owns the [`SessionState`], gates every stage
/// against it, and commits each generation result back into it.
///
/// Operations take `&self` so independent stages can be awaited together. Every
/// operation reads the state when it starts and again right before committing;
/// a result whose gate no longer holds, or that straddles an outline reset, is
/// dropped instead of committed.
#[derive(Debug)]
pub struct Workshop {
    client: GenerationClient,
    state: Mutex<SessionState>,
    activity: Mutex<HashMap<StageKind, StageActivity>>,
    last_error: Mutex<Option<String>>,
}

impl Workshop {
    pub fn new(config: &Config, llm: Box<dyn LlmClient>) -> Self {
        Self::with_state(llm, SessionState::new(config.workshop.default_chapters))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = create_llm(config)?;
        Ok(Self::new(config, llm))
    }

    pub fn with_state(llm: Box<dyn LlmClient>, state: SessionState) -> Self {
        Self {
            client: GenerationClient::new(llm),
            state: Mutex::new(state),
            activity: Mutex::new(HashMap::new()),
            last_error: Mutex::new(None),
        }
    }

    // --- Operator input ---

    pub fn set_theme(&self, theme: impl Into<String>) {
        lock(&self.state).user_theme = theme.into();
    }

    /// Stores the requested chapter count. Range is enforced when the table of
    /// contents is generated.
    pub fn set_num_chapters(&self, count: usize) {
        lock(&self.state).num_chapters = count;
    }

    pub fn set_technique(&self, technique: Option<NarrativeTechnique>) {
        let mut state = lock(&self.state);
        state.set_technique(technique);
        debug!(
            "Narrative technique {:?}, point of view {:?}",
            state.narrative.technique(),
            state.narrative.pov()
        );
    }

    pub fn set_first_person_pov(&self, pov: FirstPersonPov) -> std::result::Result<(), StageError> {
        let mut state = lock(&self.state);
        match state.narrative {
            NarrativeChoice::FirstPerson(_) => {
                state.narrative = NarrativeChoice::FirstPerson(pov);
                Ok(())
            }
            _ => Err(StageError::ValidationFailure(
                "point of view can only be chosen for first-person narration".to_string(),
            )),
        }
    }

    // --- Queries ---

    pub fn snapshot(&self) -> SessionState {
        lock(&self.state).clone()
    }

    pub fn gates(&self) -> GateReport {
        gate::report(&lock(&self.state))
    }

    pub fn is_eligible(&self, stage: Stage) -> bool {
        gate::is_eligible(&lock(&self.state), stage)
    }

    pub fn is_chapter_ready(&self, index: usize) -> bool {
        lock(&self.state).is_chapter_ready(index)
    }

    pub fn activity(&self, kind: StageKind) -> StageActivity {
        lock(&self.activity).get(&kind).copied().unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    // --- Stage plumbing ---

    fn claim(&self, stage: Stage) -> std::result::Result<RunSlot<'_>, StageError> {
        let kind = stage.kind();
        let mut activity = lock(&self.activity);
        if let Some(StageActivity::Running { .. }) = activity.get(&kind) {
            return Err(StageError::StageBusy { kind });
        }
        activity.insert(
            kind,
            StageActivity::Running {
                chapter: stage.chapter(),
            },
        );
        Ok(RunSlot {
            activity: &self.activity,
            kind,
        })
    }

    async fn track<T, F>(&self, stage: Stage, work: F) -> std::result::Result<T, StageError>
    where
        F: Future<Output = std::result::Result<T, StageError>>,
    {
        let result = match self.claim(stage) {
            Ok(slot) => {
                *lock(&self.last_error) = None;
                info!("Running {}", stage);
                let result = work.await;
                drop(slot);
                result
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!("{}", err);
            *lock(&self.last_error) = Some(err.to_string());
        }
        result
    }

    /// Checks the gate against the current state and builds the prompt from it.
    fn prepare(
        &self,
        stage: Stage,
        build: impl FnOnce(&SessionState) -> Option<String>,
    ) -> std::result::Result<(String, u64), StageError> {
        let state = lock(&self.state);
        gate::check(&state, stage).map_err(|denial| denied(stage, denial))?;
        let prompt = build(&state)
            .ok_or_else(|| StageError::precondition(stage, "session context is incomplete"))?;
        Ok((prompt, state.revision))
    }

    /// Re-checks the gate on the latest state and applies `apply` if it still holds.
    fn commit(
        &self,
        stage: Stage,
        revision: u64,
        apply: impl FnOnce(&mut SessionState) -> std::result::Result<(), StageError>,
    ) -> std::result::Result<(), StageError> {
        let mut state = lock(&self.state);
        if state.revision != revision {
            return Err(StageError::precondition(
                stage,
                "the outline was regenerated while this stage was running",
            ));
        }
        gate::check(&state, stage).map_err(|denial| denied(stage, denial))?;
        apply(&mut state)?;
        info!("Committed {}", stage);
        Ok(())
    }

    // --- Novel-wide stages ---

    /// Regenerates the outline. Everything downstream, narrative choice included,
    /// is cleared before the call whether or not it succeeds.
    pub async fn run_outline(&self) -> std::result::Result<NovelOutline, StageError> {
        let stage = Stage::Outline;
        self.track(stage, async {
            let (prompt, revision) = {
                let mut state = lock(&self.state);
                state.cascade_reset();
                info!("Session reset to revision {}", state.revision);
                (prompts::outline(&state), state.revision)
            };

            let outline: NovelOutline = self
                .client
                .generate_structured(&prompt, &outline_shape())
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state.outline = Some(outline.clone());
                Ok(())
            })?;
            Ok(outline)
        })
        .await
    }

    pub async fn run_characters(&self) -> std::result::Result<Vec<Character>, StageError> {
        let stage = Stage::Characters;
        self.track(stage, async {
            let (prompt, revision) = self.prepare(stage, prompts::characters)?;

            let characters: Vec<Character> = self
                .client
                .generate_structured(&prompt, &characters_shape())
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state.characters = Some(characters.clone());
                Ok(())
            })?;
            Ok(characters)
        })
        .await
    }

    pub async fn run_setting(&self) -> std::result::Result<String, StageError> {
        let stage = Stage::Setting;
        self.track(stage, async {
            let (prompt, revision) = self.prepare(stage, prompts::setting)?;

            let setting = self
                .client
                .generate_text(&prompt)
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state.setting = Some(setting.clone());
                Ok(())
            })?;
            Ok(setting)
        })
        .await
    }

    pub async fn run_plot_twist(&self) -> std::result::Result<String, StageError> {
        let stage = Stage::PlotTwist;
        self.track(stage, async {
            let (prompt, revision) = self.prepare(stage, prompts::plot_twist)?;

            let twist = self
                .client
                .generate_text(&prompt)
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state.plot_twist = Some(twist.clone());
                Ok(())
            })?;
            Ok(twist)
        })
        .await
    }

    pub async fn run_table_of_contents(
        &self,
    ) -> std::result::Result<Vec<ChapterOutlineEntry>, StageError> {
        let stage = Stage::TableOfContents;
        self.track(stage, async {
            let mut requested = 0;
            let (prompt, revision) = self.prepare(stage, |state| {
                requested = state.num_chapters;
                prompts::table_of_contents(state)
            })?;

            let chapters: Vec<ChapterOutlineEntry> = self
                .client
                .generate_structured(&prompt, &table_of_contents_shape(requested))
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                if state.num_chapters != requested {
                    return Err(StageError::precondition(
                        stage,
                        format!(
                            "chapter count changed from {} to {} while generating",
                            requested, state.num_chapters
                        ),
                    ));
                }
                state.table_of_contents = Some(chapters.clone());
                Ok(())
            })?;
            Ok(chapters)
        })
        .await
    }

    // --- Per-chapter stages ---

    pub async fn run_enrichment(
        &self,
        kind: EnrichmentKind,
        index: usize,
    ) -> std::result::Result<String, StageError> {
        let stage = Stage::Enrichment(kind, index);
        self.track(stage, async {
            let (prompt, revision) =
                self.prepare(stage, |state| prompts::enrichment(state, kind, index))?;

            let text = self
                .client
                .generate_text(&prompt)
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state
                    .enrichments
                    .entry(index)
                    .or_default()
                    .set(kind, text.clone());
                Ok(())
            })?;
            Ok(text)
        })
        .await
    }

    pub async fn run_conflict(&self, index: usize) -> std::result::Result<String, StageError> {
        self.run_enrichment(EnrichmentKind::Conflict, index).await
    }

    pub async fn run_scene(&self, index: usize) -> std::result::Result<String, StageError> {
        self.run_enrichment(EnrichmentKind::Scene, index).await
    }

    pub async fn run_dialogue(&self, index: usize) -> std::result::Result<String, StageError> {
        self.run_enrichment(EnrichmentKind::Dialogue, index).await
    }

    pub async fn run_sub_plot(&self, index: usize) -> std::result::Result<String, StageError> {
        self.run_enrichment(EnrichmentKind::SubPlot, index).await
    }

    pub async fn run_key_events(&self, index: usize) -> std::result::Result<String, StageError> {
        self.run_enrichment(EnrichmentKind::KeyEvents, index).await
    }

    /// Runs all five enrichments of one chapter side by side.
    pub async fn run_chapter_enrichments(
        &self,
        index: usize,
    ) -> Vec<(EnrichmentKind, std::result::Result<String, StageError>)> {
        let runs = EnrichmentKind::ALL.map(|kind| self.run_enrichment(kind, index));
        EnrichmentKind::ALL
            .into_iter()
            .zip(join_all(runs).await)
            .collect()
    }

    pub async fn run_chapter_content(&self, index: usize) -> std::result::Result<String, StageError> {
        let stage = Stage::ChapterContent(index);
        self.track(stage, async {
            let (prompt, revision) =
                self.prepare(stage, |state| prompts::chapter_content(state, index))?;

            let content = self
                .client
                .generate_text(&prompt)
                .await
                .map_err(|e| StageError::generation(stage, e))?;

            self.commit(stage, revision, |state| {
                state.chapter_contents.insert(index, content.clone());
                Ok(())
            })?;
            Ok(content)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ErrorKind, GenerationError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Notify;

    type Reply = std::result::Result<String, GenerationError>;

    /// Answers by shape: outline object, three characters, a table of contents of
    /// the requested size, or numbered text. Records every prompt it sees.
    #[derive(Debug, Default)]
    struct ScriptedLlm {
        prompts: Arc<Mutex<Vec<String>>>,
        fail_with: Option<GenerationError>,
    }

    impl ScriptedLlm {
        fn new() -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
            let llm = Self::default();
            let prompts = llm.prompts.clone();
            (Box::new(llm), prompts)
        }

        fn failing(error: GenerationError) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
            let llm = Self {
                fail_with: Some(error),
                ..Self::default()
            };
            let prompts = llm.prompts.clone();
            (Box::new(llm), prompts)
        }
    }

    fn scripted_reply(prompt: &str, shape: Option<&OutputShape>, call: usize) -> Reply {
        match shape {
            Some(OutputShape::Object { .. }) => Ok(
                r#"{"synthesis":"Síntesis","description":"Descripción","plot":"Trama"}"#.to_string(),
            ),
            Some(OutputShape::Array {
                item_fields,
                min_items,
                ..
            }) if item_fields.iter().any(|f| f == "title") => {
                let count = min_items.unwrap_or(9);
                let items: Vec<serde_json::Value> = (0..count)
                    .map(|i| {
                        serde_json::json!({
                            "title": format!("Capítulo {}", i + 1),
                            "description": format!("Sucede {}", i + 1),
                        })
                    })
                    .collect();
                Ok(serde_json::Value::Array(items).to_string())
            }
            Some(OutputShape::Array { .. }) => Ok(r#"```json
[{"name":"Inés","role":"protagonista","description":"guerrillera"},
 {"name":"Tomás","role":"aliado","description":"herrero"},
 {"name":"Duval","role":"antagonista","description":"coronel francés"}]
```"#
                .to_string()),
            None => Ok(format!("texto {} ({} chars)", call, prompt.len())),
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str, shape: Option<&OutputShape>) -> Reply {
            let call = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => scripted_reply(prompt, shape, call),
            }
        }
    }

    /// Parks every call until released, announcing that it has been entered.
    #[derive(Debug)]
    struct ParkedLlm {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl LlmClient for ParkedLlm {
        async fn generate(&self, prompt: &str, shape: Option<&OutputShape>) -> Reply {
            self.entered.notify_one();
            self.release.notified().await;
            scripted_reply(prompt, shape, 0)
        }
    }

    fn ready_for_chapters() -> SessionState {
        let mut state = SessionState::new(9);
        state.narrative = NarrativeChoice::ThirdPersonOmniscient;
        state.outline = Some(NovelOutline {
            synthesis: "s".to_string(),
            description: "d".to_string(),
            plot: "p".to_string(),
        });
        state.characters = Some(vec![]);
        state.setting = Some("Zaragoza, 1808".to_string());
        state.plot_twist = Some("El traidor es el cura".to_string());
        state.table_of_contents = Some(
            (0..9)
                .map(|i| ChapterOutlineEntry {
                    title: format!("T{}", i),
                    description: format!("D{}", i),
                })
                .collect(),
        );
        state
    }

    #[tokio::test]
    async fn test_outline_with_empty_theme_uses_default() {
        let (llm, sent) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, SessionState::new(25));

        let outline = workshop.run_outline().await.unwrap();
        assert_eq!(outline.plot, "Trama");
        assert!(sent.lock().unwrap()[0].contains(prompts::DEFAULT_THEME_PREMISE));
        assert_eq!(workshop.snapshot().outline, Some(outline));
    }

    #[tokio::test]
    async fn test_characters_require_narrative_choice() {
        let (llm, sent) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, SessionState::new(25));
        workshop.run_outline().await.unwrap();

        let err = workshop.run_characters().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotMet);
        assert_eq!(sent.lock().unwrap().len(), 1, "no call for a closed gate");
        assert!(workshop.last_error().unwrap().contains("narrative technique"));

        workshop.set_technique(Some(NarrativeTechnique::FirstPerson));
        let characters = workshop.run_characters().await.unwrap();
        assert_eq!(characters.len(), 3);
        assert!(workshop.last_error().is_none());
    }

    #[tokio::test]
    async fn test_pov_follows_technique() {
        let (llm, _) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, SessionState::new(25));
        workshop.run_outline().await.unwrap();

        workshop.set_technique(Some(NarrativeTechnique::FirstPerson));
        assert_eq!(
            workshop.snapshot().narrative,
            NarrativeChoice::FirstPerson(FirstPersonPov::Protagonist)
        );
        workshop.set_first_person_pov(FirstPersonPov::Witness).unwrap();

        workshop.set_technique(Some(NarrativeTechnique::ThirdPersonOmniscient));
        assert_eq!(
            workshop.snapshot().narrative.pov(),
            Some(crate::core::state::PointOfView::Omniscient)
        );
        let err = workshop
            .set_first_person_pov(FirstPersonPov::Witness)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    #[tokio::test]
    async fn test_rerunning_outline_cascades() {
        let (llm, _) = ScriptedLlm::new();
        let mut state = ready_for_chapters();
        for kind in EnrichmentKind::ALL {
            state.enrichments.entry(0).or_default().set(kind, "x".to_string());
        }
        state.chapter_contents.insert(0, "capítulo".to_string());
        let workshop = Workshop::with_state(llm, state);

        workshop.run_outline().await.unwrap();
        let state = workshop.snapshot();
        assert!(state.outline.is_some());
        assert!(state.characters.is_none());
        assert!(state.setting.is_none());
        assert!(state.plot_twist.is_none());
        assert!(state.table_of_contents.is_none());
        assert!(state.enrichments.is_empty());
        assert!(state.chapter_contents.is_empty());
        assert_eq!(state.narrative, NarrativeChoice::Unset);
    }

    #[tokio::test]
    async fn test_failed_call_leaves_state_untouched() {
        let (llm, sent) = ScriptedLlm::failing(GenerationError::TransportFailure(
            "Gemini response has no candidates".to_string(),
        ));
        let mut state = ready_for_chapters();
        state.setting = None;
        state.plot_twist = None;
        state.table_of_contents = None;
        let workshop = Workshop::with_state(llm, state);
        let before = serde_json::to_vec(&workshop.snapshot()).unwrap();

        let err = workshop.run_setting().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(serde_json::to_vec(&workshop.snapshot()).unwrap(), before);
        assert_eq!(workshop.activity(StageKind::Setting), StageActivity::Idle);
        assert!(workshop.last_error().unwrap().contains("no candidates"));
    }

    #[tokio::test]
    async fn test_table_of_contents_bounds_checked_before_call() {
        let (llm, sent) = ScriptedLlm::new();
        let mut state = ready_for_chapters();
        state.table_of_contents = None;
        let workshop = Workshop::with_state(llm, state);

        for count in [8, 31] {
            workshop.set_num_chapters(count);
            let err = workshop.run_table_of_contents().await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        }
        assert!(sent.lock().unwrap().is_empty());

        workshop.set_num_chapters(14);
        let chapters = workshop.run_table_of_contents().await.unwrap();
        assert_eq!(chapters.len(), 14);
        assert_eq!(workshop.gates().chapters.len(), 14);
    }

    #[tokio::test]
    async fn test_chapter_content_gated_on_all_enrichments() {
        let (llm, sent) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, ready_for_chapters());

        workshop.run_conflict(3).await.unwrap();
        workshop.run_scene(3).await.unwrap();
        workshop.run_dialogue(3).await.unwrap();
        workshop.run_sub_plot(3).await.unwrap();
        assert!(!workshop.is_chapter_ready(3));

        let err = workshop.run_chapter_content(3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotMet);
        assert!(err.to_string().contains("key events"));
        assert_eq!(sent.lock().unwrap().len(), 4);

        workshop.run_key_events(3).await.unwrap();
        assert!(workshop.is_chapter_ready(3));
        let content = workshop.run_chapter_content(3).await.unwrap();
        assert_eq!(workshop.snapshot().chapter_content(3), Some(content.as_str()));
        assert!(sent.lock().unwrap()[5].contains(prompts::DIALOGUE_DASH_RULE));
    }

    #[tokio::test]
    async fn test_enrichment_out_of_range_index() {
        let (llm, _) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, ready_for_chapters());
        let err = workshop.run_conflict(9).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotMet);
    }

    #[tokio::test]
    async fn test_regeneration_overwrites_only_its_own_field() {
        let (llm, _) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, ready_for_chapters());

        let first = workshop.run_scene(0).await.unwrap();
        let dialogue = workshop.run_dialogue(0).await.unwrap();
        let second = workshop.run_scene(0).await.unwrap();
        assert_ne!(first, second);

        let state = workshop.snapshot();
        assert_eq!(state.enrichment_text(0, EnrichmentKind::Scene), Some(second.as_str()));
        assert_eq!(state.enrichment_text(0, EnrichmentKind::Dialogue), Some(dialogue.as_str()));
    }

    #[tokio::test]
    async fn test_all_enrichments_for_a_chapter() {
        let (llm, sent) = ScriptedLlm::new();
        let workshop = Workshop::with_state(llm, ready_for_chapters());

        let results = workshop.run_chapter_enrichments(2).await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(sent.lock().unwrap().len(), 5);
        assert!(workshop.is_chapter_ready(2));
        assert!(workshop.gates().chapters[2].content);
    }

    #[tokio::test]
    async fn test_same_kind_is_exclusive_while_in_flight() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let llm = Box::new(ParkedLlm {
            entered: entered.clone(),
            release: release.clone(),
        });
        let workshop = Workshop::with_state(llm, ready_for_chapters());

        let first = workshop.run_conflict(0);
        let probe = async {
            entered.notified().await;
            assert_eq!(
                workshop.activity(StageKind::Enrichment(EnrichmentKind::Conflict)),
                StageActivity::Running { chapter: Some(0) }
            );
            let busy = workshop.run_conflict(1).await;
            release.notify_one();
            busy
        };

        let (first, busy) = tokio::join!(first, probe);
        assert!(first.is_ok());
        assert_eq!(busy.unwrap_err().kind(), ErrorKind::StageBusy);
        assert_eq!(
            workshop.activity(StageKind::Enrichment(EnrichmentKind::Conflict)),
            StageActivity::Idle
        );
        assert!(workshop.snapshot().enrichment(1).is_none());
    }

    #[tokio::test]
    async fn test_outline_reset_discards_in_flight_result() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let llm = Box::new(ParkedLlm {
            entered: entered.clone(),
            release: release.clone(),
        });
        let workshop = Workshop::with_state(llm, ready_for_chapters());

        let scene = workshop.run_scene(0);
        let reset = async {
            entered.notified().await;
            lock(&workshop.state).cascade_reset();
            release.notify_one();
        };

        let (scene, ()) = tokio::join!(scene, reset);
        assert_eq!(scene.unwrap_err().kind(), ErrorKind::PreconditionNotMet);
        assert!(workshop.snapshot().enrichments.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_table_of_contents_is_not_committed() {
        #[derive(Debug)]
        struct ShortToc;

        #[async_trait]
        impl LlmClient for ShortToc {
            async fn generate(&self, _prompt: &str, _shape: Option<&OutputShape>) -> Reply {
                Ok(r#"[{"title":"Solo uno","description":"x"}]"#.to_string())
            }
        }

        let mut state = ready_for_chapters();
        state.table_of_contents = None;
        let workshop = Workshop::with_state(Box::new(ShortToc), state);

        let err = workshop.run_table_of_contents().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(workshop.snapshot().table_of_contents.is_none());
    }

    #[test]
    fn test_validate_num_chapters() {
        assert!(validate_num_chapters(9).is_ok());
        assert!(validate_num_chapters(30).is_ok());
        assert_eq!(
            validate_num_chapters(0).unwrap_err().kind(),
            ErrorKind::ValidationFailure
        );
    }
}
