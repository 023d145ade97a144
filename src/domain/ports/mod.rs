mod bounds_port;
mod engine_port;
mod media_element_port;

pub use bounds_port::BoundsProvider;
pub use engine_port::{EngineEvent, EnginePort, FoundMessages, SearchChatMessages};
pub use media_element_port::MediaElement;
