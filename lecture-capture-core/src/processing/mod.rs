pub mod stream_mixer;
pub mod wav_format;
