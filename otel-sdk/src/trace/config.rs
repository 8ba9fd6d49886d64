/// Default cap on attributes per span, and on elements per list value.
pub(crate) const DEFAULT_MAX_ATTRIBUTES_PER_SPAN: u32 = 128;
/// Default cap on events per span.
pub(crate) const DEFAULT_MAX_EVENT_PER_SPAN: u32 = 128;
/// Default cap on links per span.
pub(crate) const DEFAULT_MAX_LINKS_PER_SPAN: u32 = 128;
/// Default cap on attributes per event.
pub(crate) const DEFAULT_MAX_ATTRIBUTES_PER_EVENT: u32 = 128;
/// Default cap on attributes per link.
pub(crate) const DEFAULT_MAX_ATTRIBUTES_PER_LINK: u32 = 128;
/// Default cap on elements in a single list-valued attribute.
pub(crate) const DEFAULT_MAX_LIST_VALUE_LENGTH: u32 = 128;

/// Caps on the mutable collections of a live span.
///
/// Excess entries are dropped and counted in the corresponding dropped
/// counter on the exported data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpanLimits {
    /// The max events that can be added to a `Span`.
    pub max_events_per_span: u32,
    /// The max attributes that can be added to a `Span`.
    pub max_attributes_per_span: u32,
    /// The max links that can be added to a `Span`.
    pub max_links_per_span: u32,
    /// The max attributes that can be added to an `Event`.
    pub max_attributes_per_event: u32,
    /// The max attributes that can be added to a `Link`.
    pub max_attributes_per_link: u32,
    /// The max elements kept in a single list-valued attribute.
    pub max_list_value_length: u32,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_events_per_span: DEFAULT_MAX_EVENT_PER_SPAN,
            max_attributes_per_span: DEFAULT_MAX_ATTRIBUTES_PER_SPAN,
            max_links_per_span: DEFAULT_MAX_LINKS_PER_SPAN,
            max_attributes_per_event: DEFAULT_MAX_ATTRIBUTES_PER_EVENT,
            max_attributes_per_link: DEFAULT_MAX_ATTRIBUTES_PER_LINK,
            max_list_value_length: DEFAULT_MAX_LIST_VALUE_LENGTH,
        }
    }
}
