//! Inference backends for models in the store.
//!
//! Architecture:
//! - `FormatDetector` maps a model directory to an `InferenceRoute`
//! - `.gguf` models run through the native BitNet runner as a child process
//! - checkpoint directories run in-process through candle
//! - both sit behind the `InferenceBackend` trait, owned by `RuntimeManager`
pub mod runtime_trait;
pub mod native_runtime;
pub mod checkpoint_runtime;
pub mod format_detector;
pub mod runtime_manager;
pub use runtime_trait::{GenerationParams, InferenceBackend, InferenceRoute, ModelFormat, RuntimeMetadata};
pub use native_runtime::{NativeRunner, NativeRuntime};
pub use checkpoint_runtime::{CheckpointCache, CheckpointRuntime};
pub use format_detector::FormatDetector;
pub use runtime_manager::{GenerationOutput, LoadedModel, ModelSnapshot, RuntimeManager};
