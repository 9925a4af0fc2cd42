pub mod consumer;
pub mod message;
pub mod producer;

pub use consumer::EditConsumer;
pub use producer::EditProducer;
