//! Speech synthesis backends and the audio post-processing chain that sits
//! between a backend's raw output and the job manager.

pub mod backends;
pub mod factory;
pub mod postprocess;

pub use backends::kyutai::KyutaiSynthesizer;
pub use backends::mock::MockSynthesizer;
pub use backends::qwen::QwenSynthesizer;
pub use factory::create_synthesizer;
pub use postprocess::apply_playback_settings;
