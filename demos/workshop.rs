use anyhow::Result;
use inquire::{CustomType, Select, Text};
use novel_workshop::core::state::{EnrichmentKind, FirstPersonPov, NarrativeTechnique};
use novel_workshop::{Config, Workshop};

const ACTIONS: [&str; 9] = [
    "Outline",
    "Narrative technique",
    "Characters",
    "Setting",
    "Plot twist",
    "Table of contents",
    "Chapter enrichments",
    "Chapter content",
    "Quit",
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM settings.");
            return Err(e);
        }
    };

    let workshop = Workshop::from_config(&config)?;

    let theme = Text::new("Theme (leave empty for the default):").prompt()?;
    workshop.set_theme(theme);
    let chapters = CustomType::<usize>::new("Number of chapters:")
        .with_default(config.workshop.default_chapters)
        .prompt()?;
    workshop.set_num_chapters(chapters);

    loop {
        let action = Select::new("Next step:", ACTIONS.to_vec()).prompt()?;
        match action {
            "Outline" => {
                if let Ok(outline) = workshop.run_outline().await {
                    println!("{}\n\n{}\n\n{}", outline.synthesis, outline.description, outline.plot);
                }
            }
            "Narrative technique" => choose_technique(&workshop)?,
            "Characters" => {
                if let Ok(characters) = workshop.run_characters().await {
                    for c in characters {
                        println!("- {} ({}): {}", c.name, c.role, c.description);
                    }
                }
            }
            "Setting" => print_text(workshop.run_setting().await),
            "Plot twist" => print_text(workshop.run_plot_twist().await),
            "Table of contents" => {
                if let Ok(chapters) = workshop.run_table_of_contents().await {
                    for (i, c) in chapters.iter().enumerate() {
                        println!("{}. {}: {}", i + 1, c.title, c.description);
                    }
                }
            }
            "Chapter enrichments" => {
                let Some(index) = pick_chapter(&workshop)? else { continue };
                for (kind, result) in workshop.run_chapter_enrichments(index).await {
                    if let Ok(text) = result {
                        println!("## {}\n{}\n", kind, text);
                    }
                }
            }
            "Chapter content" => {
                let Some(index) = pick_chapter(&workshop)? else { continue };
                print_text(workshop.run_chapter_content(index).await);
            }
            _ => break,
        }

        if let Some(err) = workshop.last_error() {
            eprintln!("Error: {}", err);
        }
    }

    let state = workshop.snapshot();
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn print_text<E>(result: std::result::Result<String, E>) {
    if let Ok(text) = result {
        println!("{}", text);
    }
}

fn choose_technique(workshop: &Workshop) -> Result<()> {
    let options = vec![
        "First person",
        "Third person omniscient",
        "Third person limited",
    ];
    let technique = match Select::new("Narrative technique:", options).prompt()? {
        "First person" => NarrativeTechnique::FirstPerson,
        "Third person omniscient" => NarrativeTechnique::ThirdPersonOmniscient,
        _ => NarrativeTechnique::ThirdPersonLimited,
    };
    workshop.set_technique(Some(technique));

    if technique == NarrativeTechnique::FirstPerson {
        let pov = match Select::new("Point of view:", vec!["Protagonist", "Witness"]).prompt()? {
            "Witness" => FirstPersonPov::Witness,
            _ => FirstPersonPov::Protagonist,
        };
        workshop.set_first_person_pov(pov)?;
    }
    Ok(())
}

fn pick_chapter(workshop: &Workshop) -> Result<Option<usize>> {
    let state = workshop.snapshot();
    let titles: Vec<String> = state
        .table_of_contents
        .iter()
        .flatten()
        .enumerate()
        .map(|(i, c)| {
            let done = state
                .enrichment(i)
                .map_or(0, |e| EnrichmentKind::ALL.len() - e.missing().len());
            format!("{}. {} [{}/5]", i + 1, c.title, done)
        })
        .collect();
    if titles.is_empty() {
        eprintln!("Generate the table of contents first.");
        return Ok(None);
    }
    let choice = Select::new("Chapter:", titles).raw_prompt()?;
    Ok(Some(choice.index))
}
