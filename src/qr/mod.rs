pub mod cache;
pub mod encoder;
pub mod storage;

pub use cache::{
    build_target_url, cache_key, CacheError, CacheStats, QrAsset, QrCache, DEFAULT_PRUNE_DAYS,
    ENTRY_PATTERN, MIN_VALID_ENTRY_BYTES,
};
pub use encoder::{EncodeError, ErrorCorrection, PngQrEncoder, QrEncoder};
pub use storage::{BlobError, BlobMeta, BlobStore, FsBlobStore, MemoryBlobStore};
