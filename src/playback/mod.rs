mod bridge;
mod mock;
mod quality;

pub use bridge::{
    MediaEvent, PlaybackState, TextureFilter, VideoElement, VideoTexture, VideoTextureBridge,
};
pub use mock::{MockVideoElement, VideoCall};
pub use quality::{select_source, EffectiveConnection, NetworkHints};
