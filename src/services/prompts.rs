//! Prompt text for every stage, built only from the session fields a stage reads.
//!
//! Builders return `None` when an upstream field they need is absent. The workshop
//! checks gates first, so in practice that only happens on a caller bug.

use crate::core::state::{
    Character, ChapterOutlineEntry, EnrichmentKind, NarrativeChoice, NarrativeTechnique,
    PointOfView, SessionState,
};

pub const DEFAULT_THEME_PREMISE: &str = "una novela histórica de aventuras ambientada en la Guerra de Independencia Española (1808-1814), con un protagonista que lucha contra la ocupación napoleónica, intrigas, resistencia popular, y una visión realista de la época.";
pub const DEFAULT_THEME_LABEL: &str = "Guerra de Independencia Española";
pub const CHAPTER_TARGET_WORDS: usize = 1200;
pub const DIALOGUE_DASH_RULE: &str =
    "Asegúrate de que los diálogos utilicen rayas (guion largo '—') en lugar de comillas.";

const NOT_AVAILABLE: &str = "No disponible";

pub fn theme_premise(user_theme: &str) -> String {
    let theme = user_theme.trim();
    if theme.is_empty() {
        DEFAULT_THEME_PREMISE.to_string()
    } else {
        format!(
            "una novela histórica de aventuras ambientada en {}. La novela debe presentar un protagonista fuerte, intrigas, y una visión realista de la época.",
            theme
        )
    }
}

pub fn theme_label(user_theme: &str) -> &str {
    let theme = user_theme.trim();
    if theme.is_empty() {
        DEFAULT_THEME_LABEL
    } else {
        theme
    }
}

pub fn technique_label(technique: Option<NarrativeTechnique>) -> &'static str {
    match technique {
        Some(NarrativeTechnique::FirstPerson) => "Primera Persona",
        Some(NarrativeTechnique::ThirdPersonOmniscient) => "Tercera Persona Omnisciente",
        Some(NarrativeTechnique::ThirdPersonLimited) => "Tercera Persona Limitada",
        None => "No especificada",
    }
}

pub fn pov_label(pov: Option<PointOfView>) -> &'static str {
    match pov {
        Some(PointOfView::Protagonist) => "Protagonista",
        Some(PointOfView::Witness) => "Testigo",
        Some(PointOfView::Omniscient) => "Omnisciente",
        Some(PointOfView::Limited) => "Limitado",
        None => "No especificado",
    }
}

/// "Label: value" lines framing the novel so far.
struct Context {
    lines: Vec<String>,
}

impl Context {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn line(mut self, label: &str, value: &str) -> Self {
        self.lines.push(format!("{}: {}", label, value));
        self
    }

    fn narrative(self, narrative: NarrativeChoice) -> Self {
        self.line("Técnica Narrativa", technique_label(narrative.technique()))
            .line("Punto de Vista del Narrador", pov_label(narrative.pov()))
    }

    fn chapter(self, chapter: &ChapterOutlineEntry) -> Self {
        self.line("Capítulo", &chapter.title)
            .line("Descripción del Capítulo", &chapter.description)
    }

    fn finish(self, task: &str) -> String {
        format!(
            "Basándote en la siguiente información de la novela:\n{}\n\n{}",
            self.lines.join("\n"),
            task
        )
    }
}

fn character_names(characters: Option<&[Character]>) -> String {
    match characters {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn character_roles(characters: Option<&[Character]>) -> String {
    match characters {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(|c| format!("{} ({})", c.name, c.role))
            .collect::<Vec<_>>()
            .join(", "),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn outline(state: &SessionState) -> String {
    format!(
        "Genera la síntesis, la descripción y la trama de {} La respuesta debe estar en formato JSON con las propiedades \"synthesis\", \"description\" y \"plot\".",
        theme_premise(&state.user_theme)
    )
}

pub fn characters(state: &SessionState) -> Option<String> {
    let outline = state.outline.as_ref()?;
    Some(
        Context::new()
            .line("Síntesis General", &outline.synthesis)
            .line("Trama General", &outline.plot)
            .narrative(state.narrative)
            .finish(
                "Genera 3-5 personajes principales para esta novela. Para cada personaje, proporciona su nombre, su rol en la historia (ej. \"protagonista\", \"antagonista\", \"aliado\", \"interés amoroso\"), y una breve descripción de su personalidad y su relevancia para la trama. Responde en formato JSON como un array de objetos con las propiedades \"name\", \"role\" y \"description\".",
            ),
    )
}

pub fn setting(state: &SessionState) -> Option<String> {
    let outline = state.outline.as_ref()?;
    Some(
        Context::new()
            .line("Tema", theme_label(&state.user_theme))
            .line("Descripción General", &outline.description)
            .narrative(state.narrative)
            .finish(
                "Genera una descripción detallada de la ambientación o de un aspecto histórico/cultural clave de la novela. Incluye detalles sobre la atmósfera, la sociedad, la vida cotidiana y los elementos visuales relevantes. Aproximadamente 500-700 palabras.",
            ),
    )
}

pub fn plot_twist(state: &SessionState) -> Option<String> {
    let outline = state.outline.as_ref()?;
    let setting = state.setting.as_deref()?;
    Some(
        Context::new()
            .line("Síntesis General", &outline.synthesis)
            .line("Trama General", &outline.plot)
            .line("Personajes", &character_names(state.characters.as_deref()))
            .line("Ambientación", setting)
            .narrative(state.narrative)
            .finish(
                "Sugiere 1-2 giros argumentales sorprendentes y significativos para la novela. Describe cómo podrían impactar la trama y los personajes. Aproximadamente 300-500 palabras.",
            ),
    )
}

pub fn table_of_contents(state: &SessionState) -> Option<String> {
    let outline = state.outline.as_ref()?;
    let setting = state.setting.as_deref()?;
    let twist = state.plot_twist.as_deref()?;
    let task = format!(
        "Genera una tabla de contenidos para una novela de {} capítulos. Cada capítulo debe tener un título y una breve descripción de su contenido, siguiendo el estilo de una novela histórica de aventuras. Responde en formato JSON como un array de objetos con las propiedades \"title\" y \"description\".",
        state.num_chapters
    );
    Some(
        Context::new()
            .line("Síntesis General", &outline.synthesis)
            .line("Trama General", &outline.plot)
            .line("Ambientación", setting)
            .line("Personajes Principales", &character_names(state.characters.as_deref()))
            .line("Giros Argumentales", twist)
            .narrative(state.narrative)
            .finish(&task),
    )
}

/// Per-chapter enrichment prompt.
///
/// Scene and key events also see the setting; conflict, dialogue and sub-plot do not.
pub fn enrichment(state: &SessionState, kind: EnrichmentKind, index: usize) -> Option<String> {
    let outline = state.outline.as_ref()?;
    let chapter = state.chapter(index)?;
    let setting = state.setting.as_deref().unwrap_or(NOT_AVAILABLE);

    let context = match kind {
        EnrichmentKind::Scene => Context::new()
            .line("Tema", theme_label(&state.user_theme))
            .line("Descripción General", &outline.description)
            .line("Ambientación", setting),
        EnrichmentKind::KeyEvents => Context::new()
            .line("Síntesis General", &outline.synthesis)
            .line("Trama General", &outline.plot)
            .line("Ambientación", setting),
        EnrichmentKind::Conflict | EnrichmentKind::Dialogue | EnrichmentKind::SubPlot => {
            Context::new()
                .line("Síntesis General", &outline.synthesis)
                .line("Trama General", &outline.plot)
        }
    };

    let task = match kind {
        EnrichmentKind::Conflict => "Sugiere un conflicto o un obstáculo significativo que podría surgir en este capítulo. Describe la naturaleza del conflicto, sus posibles implicaciones para el protagonista y la trama dentro de este capítulo, y cómo podría resolverse o evolucionar. Aproximadamente 300-500 palabras.".to_string(),
        EnrichmentKind::Scene => "Genera una descripción detallada de una escena clave o un lugar significativo dentro de este capítulo. Enfócate en los detalles sensoriales (vista, sonido, olfato, tacto), la atmósfera, y cómo el entorno influye en los personajes en esta escena. Aproximadamente 500-700 palabras.".to_string(),
        EnrichmentKind::Dialogue => format!(
            "Genera un breve fragmento de diálogo (2-4 líneas) entre dos personajes relevantes para este capítulo. El diálogo debe ser relevante para la trama o los personajes en este punto de la historia. {}",
            DIALOGUE_DASH_RULE
        ),
        EnrichmentKind::SubPlot => "Sugiere 1-2 ideas para subtramas que puedan enriquecer la narrativa principal en este capítulo o en los siguientes. Para cada idea, describe brevemente la subtrama y cómo podría conectarse con la historia principal o los personajes.".to_string(),
        EnrichmentKind::KeyEvents => "Sugiere 2-3 eventos clave o puntos de inflexión que deberían ocurrir en este capítulo. Describe brevemente cada evento y cómo contribuye al avance de la trama.".to_string(),
    };

    Some(
        context
            .narrative(state.narrative)
            .chapter(chapter)
            .finish(&task),
    )
}

pub fn chapter_content(state: &SessionState, index: usize) -> Option<String> {
    let outline = state.outline.as_ref()?;
    let chapter = state.chapter(index)?;
    let enrichment = state.enrichment(index)?;
    let text = |kind: EnrichmentKind| enrichment.get(kind).unwrap_or(NOT_AVAILABLE);

    let task = format!(
        "Escribe el contenido completo para el capítulo '{}' (Capítulo {}). El capítulo debe tener aproximadamente {} palabras y expandir la descripción: '{}'. Asegúrate de que el tono y estilo sean coherentes con una novela histórica de aventuras. {}",
        chapter.title,
        index + 1,
        CHAPTER_TARGET_WORDS,
        chapter.description,
        DIALOGUE_DASH_RULE
    );

    Some(
        Context::new()
            .line("Síntesis General", &outline.synthesis)
            .line("Trama General", &outline.plot)
            .line("Ambientación", state.setting.as_deref().unwrap_or(NOT_AVAILABLE))
            .line("Personajes Principales", &character_roles(state.characters.as_deref()))
            .line(
                "Giros Argumentales de la Novela",
                state.plot_twist.as_deref().unwrap_or(NOT_AVAILABLE),
            )
            .narrative(state.narrative)
            .line("Conflicto del Capítulo", text(EnrichmentKind::Conflict))
            .line("Descripción de Escena del Capítulo", text(EnrichmentKind::Scene))
            .line("Diálogo del Capítulo", text(EnrichmentKind::Dialogue))
            .line("Subtramas del Capítulo", text(EnrichmentKind::SubPlot))
            .line("Eventos Clave del Capítulo", text(EnrichmentKind::KeyEvents))
            .finish(&task),
    )
}
