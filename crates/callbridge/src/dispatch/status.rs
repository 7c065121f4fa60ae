/// What a single native callback did to the registry.
///
/// Dispatch never reports failure to the native side; this status exists so
/// callers (and tests) can observe which path a delivery took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A partial chunk was queued on the operation's streaming sink.
    Chunk,
    /// The operation was removed and this delivery settled it.
    Completed,
    /// The progress hook ran successfully.
    Progress,
    /// The progress hook failed; the operation was failed and removed.
    HookFailed,
    /// No operation is registered under the id. Expected after cancellation.
    Orphaned,
    /// The operation exists but could not accept the delivery, e.g. a chunk
    /// for a single-shot operation or a chunk whose consumer is gone.
    Discarded,
}
