pub mod decoder;
pub mod encoder;
pub mod resample;

pub use decoder::decode_audio;
pub use encoder::encode_audio;
pub use resample::Resampler;
