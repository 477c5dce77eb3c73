pub mod recognizer;
pub mod responder;
pub mod synthesizer;
pub mod turn;

pub use recognizer::{RecognitionError, Recognizer};
pub use responder::{CompletionError, Responder};
pub use synthesizer::{SpeechAudio, SynthesisError, Synthesizer};
pub use turn::{Role, Turn};
