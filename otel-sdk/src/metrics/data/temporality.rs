/// Defines how the windows of aggregated points relate to time.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// Measurements are aggregated over the lifetime of the reader: every
    /// point's start time is the reader's start, and state is retained
    /// across collections.
    #[default]
    Cumulative,

    /// Measurements are aggregated per collection window: every point's
    /// start time is the previous collection's end time, and state resets
    /// after each collection.
    Delta,
}
