use crate::metrics::instrument::{Aggregation, InstrumentDescriptor};
use otel::Key;
use std::borrow::Cow;

/// A declarative rewrite of a matched instrument's stream.
///
/// A view matches instruments by name (exact, or with a trailing `*`
/// wildcard) and may rename the stream, replace its description, change
/// its aggregation, whitelist attribute keys, or cap its cardinality.
/// Several views may match one instrument, fanning it out into several
/// streams.
///
/// ```
/// use otel_sdk::metrics::View;
///
/// let view = View::new("http.*")
///     .with_attribute_filter(["http.route"])
///     .with_cardinality_limit(500);
/// # drop(view);
/// ```
#[derive(Clone, Debug)]
pub struct View {
    instrument_name: Cow<'static, str>,
    name: Option<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    aggregation: Option<Aggregation>,
    attribute_keys: Option<Vec<Key>>,
    cardinality_limit: Option<usize>,
}

impl View {
    /// A view matching instruments with the given name; a trailing `*`
    /// matches any suffix.
    pub fn new(instrument_name: impl Into<Cow<'static, str>>) -> Self {
        View {
            instrument_name: instrument_name.into(),
            name: None,
            description: None,
            aggregation: None,
            attribute_keys: None,
            cardinality_limit: None,
        }
    }

    /// Rename the matched stream.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the matched stream's description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the matched stream's aggregation.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Keep only the listed attribute keys; everything else is dropped at
    /// record time and feeds the exemplars' filtered attributes.
    pub fn with_attribute_filter<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.attribute_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Cap the number of distinct attribute sets of the matched stream.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, instrument_name: &str) -> bool {
        match self.instrument_name.strip_suffix('*') {
            Some(prefix) => instrument_name.starts_with(prefix),
            None => self.instrument_name == instrument_name,
        }
    }

    pub(crate) fn stream(&self, instrument: &InstrumentDescriptor) -> Stream {
        Stream {
            name: self.name.clone().unwrap_or_else(|| instrument.name.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| instrument.description.clone()),
            unit: instrument.unit.clone(),
            aggregation: self.aggregation.clone(),
            attribute_keys: self.attribute_keys.clone(),
            cardinality_limit: self.cardinality_limit,
        }
    }
}

/// The resolved shape of one stream of an instrument.
#[derive(Clone, Debug)]
pub(crate) struct Stream {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) aggregation: Option<Aggregation>,
    pub(crate) attribute_keys: Option<Vec<Key>>,
    pub(crate) cardinality_limit: Option<usize>,
}

impl Stream {
    pub(crate) fn default_for(instrument: &InstrumentDescriptor) -> Self {
        Stream {
            name: instrument.name.clone(),
            description: instrument.description.clone(),
            unit: instrument.unit.clone(),
            aggregation: None,
            attribute_keys: None,
            cardinality_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_matching() {
        assert!(View::new("requests").matches("requests"));
        assert!(!View::new("requests").matches("requests.total"));
        assert!(View::new("http.*").matches("http.server.duration"));
        assert!(!View::new("http.*").matches("rpc.server.duration"));
        assert!(View::new("*").matches("anything"));
    }

    #[test]
    fn stream_inherits_unset_fields() {
        let instrument = InstrumentDescriptor {
            name: "latency".into(),
            description: "how slow".into(),
            unit: "ms".into(),
            kind: crate::metrics::InstrumentKind::Histogram,
        };
        let stream = View::new("latency").with_name("latency_ms").stream(&instrument);
        assert_eq!(stream.name, "latency_ms");
        assert_eq!(stream.description, "how slow");
        assert_eq!(stream.unit, "ms");
        assert!(stream.aggregation.is_none());
    }
}
