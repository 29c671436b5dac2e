pub mod buffer_set;
pub mod compressor;
pub mod gain_stage;
pub mod utils;

pub use buffer_set::BufferSet;
pub use compressor::{CompressionStage, FeedbackCompressor};
pub use gain_stage::GainStage;
