pub mod decoder;
pub mod diff;
pub mod pipeline;
pub mod translator;

pub use decoder::{queue_event_stream, QueueEventParser};
pub use translator::ChunkTranslator;
