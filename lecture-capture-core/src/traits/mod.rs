pub mod audio_backend;

#[cfg(test)]
pub(crate) mod fake_backend;
