use quick_cache::sync::Cache;
use quick_cache::Weighter;
use std::sync::Arc;

pub type PantryCache = Arc<Cache<CacheQuery, CacheValue, ValueWeighter>>;

pub fn new_cache() -> PantryCache {
    Arc::new(Cache::with_weighter(100, 50 << 20, ValueWeighter))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheQuery {
    StoredImage { file_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    StoredImage { image: Arc<Vec<u8>> },
}

#[derive(Clone)]
pub struct ValueWeighter;

impl Weighter<CacheQuery, CacheValue> for ValueWeighter {
    fn weight(&self, _key: &CacheQuery, val: &CacheValue) -> u64 {
        match val {
            CacheValue::StoredImage { image } => {
                tracing::debug!("Image length: {}", image.len());
                image.len() as u64
            }
        }
    }
}
