//! Completion backend backed by an [`LlmProvider`](parley_core::llm::provider::LlmProvider).
//!
//! Adapts a provider to the stateless `CompletionBackend` seam the turn
//! orchestrator calls. Token counting uses the heuristic character estimate.

use parley_core::llm::backend::{CompletionBackend, Generation};
use parley_core::llm::provider::LlmProvider;
use parley_core::llm::token::{HeuristicTokenCounter, TokenCounter};
use parley_observe::genai_attrs::{
    GEN_AI_RESPONSE_FINISH_REASONS, GEN_AI_USAGE_INPUT_TOKENS, GEN_AI_USAGE_OUTPUT_TOKENS, OP_CHAT,
};
use parley_types::chat::ChatMessage;
use parley_types::error::{CompletionError, TokenizationError};
use parley_types::llm::CompletionRequest;
use tracing::{field, info_span, Instrument};

use super::CompletionConfig;

pub struct ProviderBackend<P> {
    provider: P,
    model: String,
    max_output_tokens: u32,
    temperature: Option<f64>,
    counter: HeuristicTokenCounter,
}

impl<P: LlmProvider> ProviderBackend<P> {
    pub fn new(provider: P, config: &CompletionConfig) -> Self {
        Self {
            provider,
            model: config.model_identifier.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            counter: HeuristicTokenCounter,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn build_request(&self, system_instruction: &str, messages: &[ChatMessage]) -> CompletionRequest {
        let system = (!system_instruction.is_empty()).then(|| system_instruction.to_string());
        CompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(ChatMessage::to_message).collect(),
            system,
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

impl<P: LlmProvider> TokenCounter for ProviderBackend<P> {
    fn count_tokens(&self, message: &ChatMessage) -> Result<u32, TokenizationError> {
        self.counter.count_tokens(message)
    }
}

impl<P: LlmProvider> CompletionBackend for ProviderBackend<P> {
    async fn generate(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
    ) -> Result<Generation, CompletionError> {
        let request = self.build_request(system_instruction, messages);

        let span = info_span!(
            "gen_ai.chat",
            gen_ai.operation.name = OP_CHAT,
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.usage.input_tokens = field::Empty,
            gen_ai.usage.output_tokens = field::Empty,
            gen_ai.response.finish_reasons = field::Empty,
        );

        let response = self
            .provider
            .complete(&request)
            .instrument(span.clone())
            .await?;

        span.record(GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
        span.record(GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
        span.record(
            GEN_AI_RESPONSE_FINISH_REASONS,
            field::display(response.stop_reason),
        );

        Ok(Generation {
            content: response.content,
            model: response.model,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            stop_reason: response.stop_reason,
        })
    }
}
