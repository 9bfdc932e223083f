pub mod fetch;
pub mod metadata;
pub mod resolver;

pub use fetch::{AudioFetcher, YtDlpFetcher};
pub use metadata::MetadataExtractor;
pub use resolver::{
    is_supported_audio, InputItem, InputKind, InputResolver, InputSource, ResolvedInput,
    AUDIO_EXTENSIONS,
};
