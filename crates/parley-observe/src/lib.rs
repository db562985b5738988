pub mod genai_attrs;
pub mod tracing_setup;
