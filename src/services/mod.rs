pub mod gate;
pub mod generation;
pub mod llm;
pub mod prompts;
pub mod workflow;
