use super::AudioClip;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of decoded clips, looked up by name.
///
/// Decoding and file formats live with the implementor; EarMix only needs raw
/// PCM bytes and a channel count.
///
/// # Example
///
/// ```ignore
/// use earmix::clip::{AudioClip, ClipRepository};
/// use std::sync::Arc;
///
/// struct AssetPack { /* ... */ }
///
/// impl ClipRepository for AssetPack {
///     fn get_clip(&self, name: &str) -> Option<Arc<AudioClip>> {
///         // Decode or look up the clip here
///         todo!()
///     }
/// }
/// ```
pub trait ClipRepository {
    fn get_clip(&self, name: &str) -> Option<Arc<AudioClip>>;
}

/// In-memory clip cache keyed by name
#[derive(Debug, Default)]
pub struct ClipCache {
    clips: RwLock<HashMap<String, Arc<AudioClip>>>,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a clip, replacing any clip previously registered under `name`.
    ///
    /// Instances already playing the old clip keep their own reference.
    pub fn insert(&self, name: impl Into<String>, clip: AudioClip) -> Arc<AudioClip> {
        let clip = Arc::new(clip);
        let name = name.into();
        log::debug!(
            "Caching clip '{}' ({} frames, {} channel(s))",
            name,
            clip.total_frames(),
            clip.channel_count()
        );
        self.clips.write().insert(name, clip.clone());
        clip
    }

    pub fn remove(&self, name: &str) -> Option<Arc<AudioClip>> {
        self.clips.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.clips.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clips.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.read().is_empty()
    }
}

impl ClipRepository for ClipCache {
    fn get_clip(&self, name: &str) -> Option<Arc<AudioClip>> {
        self.clips.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipChannels;

    #[test]
    fn test_insert_and_lookup() {
        let cache = ClipCache::new();
        assert!(cache.get_clip("step").is_none());

        let stored = cache.insert("step", AudioClip::from_samples(&[1, 2], ClipChannels::Mono));
        let fetched = cache.get_clip("step").unwrap();
        assert!(Arc::ptr_eq(&stored, &fetched));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_replaced_clip_survives_for_existing_holders() {
        let cache = ClipCache::new();
        let old = cache.insert("hit", AudioClip::from_samples(&[1], ClipChannels::Mono));
        cache.insert("hit", AudioClip::from_samples(&[2, 3], ClipChannels::Mono));

        assert_eq!(old.total_frames(), 1);
        assert_eq!(cache.get_clip("hit").unwrap().total_frames(), 2);

        assert!(cache.remove("hit").is_some());
        assert!(cache.is_empty());
    }
}
