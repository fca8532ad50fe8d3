use uuid::Uuid;

/// Identity of a long-lived computation site.
///
/// Caches use their `Uuid` as the handle under which they are registered with
/// [`CacheRegistry`](crate::caching::cacheregistry::CacheRegistry), so two
/// caches wrapping the same function under the same name are still distinct.
pub trait ObjectWithUUID {
    fn uuid(&self) -> &Uuid;

    fn is_same_object(&self, other: &dyn ObjectWithUUID) -> bool {
        self.uuid() == other.uuid()
    }
}
