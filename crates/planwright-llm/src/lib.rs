pub mod bounded;
pub mod gemini;
pub mod mock;

pub use bounded::BoundedGateway;
pub use gemini::{GeminiConfig, GeminiGateway};
pub use mock::{MockGateway, MockResponse};
