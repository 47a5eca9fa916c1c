pub mod recorder;
pub(crate) mod recording;
