pub mod audio_sink;
pub mod download;
pub mod metadata;
pub mod sequence_counter;
