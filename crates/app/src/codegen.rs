use std::sync::Arc;

use kismet_llm::LlmProvider;

use crate::prompts;

/// Fixed output shown when class synthesis fails.
pub const CODEGEN_ERROR_TEXT: &str =
    "Error generating code. Please check your API key and try again.";

/// Base classes offered by the generator form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentClass {
    Actor,
    Pawn,
    Character,
    ActorComponent,
    GameModeBase,
    Object,
}

impl ParentClass {
    pub const ALL: [ParentClass; 6] = [
        Self::Actor,
        Self::Pawn,
        Self::Character,
        Self::ActorComponent,
        Self::GameModeBase,
        Self::Object,
    ];

    /// Engine type name, prefix included.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Actor => "AActor",
            Self::Pawn => "APawn",
            Self::Character => "ACharacter",
            Self::ActorComponent => "UActorComponent",
            Self::GameModeBase => "AGameModeBase",
            Self::Object => "UObject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|parent| parent.type_name().eq_ignore_ascii_case(value))
    }
}

/// Parameter set for one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRequest {
    pub class_name: String,
    pub parent: ParentClass,
    pub features: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Dropped because a generation is already in flight.
    Ignored,
    Done,
    Failed,
}

/// Single-shot class synthesis, no streaming and no history.
///
/// Each submission clears the previous output; success stores the returned
/// text verbatim, failure replaces the output with a fixed error string.
pub struct ClassGenerator {
    provider: Arc<dyn LlmProvider>,
    output: String,
    busy: bool,
}

impl ClassGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            output: String::new(),
            busy: false,
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub async fn generate(&mut self, request: &ClassRequest) -> GenerateOutcome {
        if self.busy {
            return GenerateOutcome::Ignored;
        }

        self.busy = true;
        self.output.clear();

        let prompt = prompts::class_generation_prompt(
            &request.class_name,
            request.parent.type_name(),
            &request.features,
        );

        tracing::debug!(
            class_name = %request.class_name,
            parent = request.parent.type_name(),
            "requesting class synthesis"
        );

        let outcome = match self.provider.generate(prompt).await {
            Ok(text) => {
                self.output = text;
                GenerateOutcome::Done
            }
            Err(error) => {
                tracing::warn!(error = %error, "class synthesis failed");
                self.output = CODEGEN_ERROR_TEXT.to_string();
                GenerateOutcome::Failed
            }
        };

        self.busy = false;
        outcome
    }
}
