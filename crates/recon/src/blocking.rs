use std::collections::BTreeMap;

use crate::config::{BlockingConfig, BlockingKey};

/// Right-hand keys partitioned by a cheap block key.
///
/// Empty canonical keys land in the distinguished empty bucket (`""`) and are
/// never offered as candidates, since an empty key cannot match anything.
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    config: BlockingConfig,
    buckets: BTreeMap<String, Vec<usize>>,
    /// Every non-empty key index, in input order. Used for the fallback scan.
    all: Vec<usize>,
}

impl BlockingIndex {
    /// Build from canonical keys. Indices refer to positions in `keys`.
    pub fn build<S: AsRef<str>>(keys: &[S], config: &BlockingConfig) -> Self {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut all = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let key = key.as_ref();
            buckets.entry(block_key(key, config)).or_default().push(i);
            if !key.is_empty() {
                all.push(i);
            }
        }
        Self {
            config: config.clone(),
            buckets,
            all,
        }
    }

    /// Candidate indices for a left key, in ascending index order.
    ///
    /// Returns the bucket sharing the key's block key, or every non-empty
    /// right key when that bucket is absent. An empty left key has no
    /// candidates.
    pub fn candidates(&self, key: &str) -> Candidates<'_> {
        if key.is_empty() {
            return Candidates::None;
        }
        match self.buckets.get(&block_key(key, &self.config)) {
            Some(bucket) if !bucket.is_empty() => Candidates::Bucket(bucket),
            _ => Candidates::FullScan(&self.all),
        }
    }

    pub fn bucket(&self, block: &str) -> Option<&[usize]> {
        self.buckets.get(block).map(Vec::as_slice)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Where a left key's candidates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidates<'a> {
    None,
    Bucket(&'a [usize]),
    FullScan(&'a [usize]),
}

impl<'a> Candidates<'a> {
    pub fn indices(&self) -> &'a [usize] {
        match *self {
            Self::None => &[],
            Self::Bucket(ix) | Self::FullScan(ix) => ix,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FullScan(_))
    }
}

/// Block key for a canonical key. Empty keys map to `""`.
pub fn block_key(key: &str, config: &BlockingConfig) -> String {
    match config.key {
        BlockingKey::Prefix => key.chars().take(config.prefix_len).collect(),
        BlockingKey::FirstToken => key.split(' ').next().unwrap_or("").to_string(),
    }
}
