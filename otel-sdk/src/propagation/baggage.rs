use otel::baggage::{BaggageExt, KeyValueMetadata};
use otel::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use otel::Context;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::OnceLock;

static BAGGAGE_HEADER: &str = "baggage";

// The separators are escaped so they survive inside values; space is
// carried as `+`, so a literal `+` must be escaped as well.
const KEY_VALUE_SET: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'=');
const METADATA_SET: &AsciiSet = &CONTROLS.add(b'%').add(b'+').add(b',').add(b';');

static BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();

#[inline]
fn baggage_fields() -> &'static [String; 1] {
    BAGGAGE_FIELDS.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

/// Propagates name/value pairs in the [W3C Baggage] format.
///
/// Serialized as `key=value[;metadata][,key=value[;metadata]]` with
/// percent-encoded entries and space carried as `+`. Extraction replaces
/// the context's baggage entirely: a missing or empty header yields an
/// empty baggage rather than preserving the original.
///
/// [W3C Baggage]: https://w3c.github.io/baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

fn encode(value: &str, set: &'static AsciiSet) -> String {
    utf8_percent_encode(value, set).to_string().replace(' ', "+")
}

fn decode(value: &str) -> Option<String> {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

impl TextMapPropagator for BaggagePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if !baggage.is_empty() {
            let header_value = baggage
                .iter()
                .map(|(name, (value, metadata))| {
                    let mut entry = format!(
                        "{}={}",
                        encode(name.as_str().trim(), KEY_VALUE_SET),
                        encode(value.as_str().trim(), KEY_VALUE_SET)
                    );
                    let metadata_str = metadata.as_str().trim();
                    if !metadata_str.is_empty() {
                        entry.push(';');
                        entry.push_str(&encode(metadata_str, METADATA_SET));
                    }
                    entry
                })
                .collect::<Vec<String>>()
                .join(",");
            injector.set(BAGGAGE_HEADER, header_value);
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let entries = extractor
            .get(BAGGAGE_HEADER)
            .into_iter()
            .flat_map(|header| header.split(','))
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                let (name_and_value, metadata) = match entry.split_once(';') {
                    Some((name_and_value, metadata)) => (name_and_value, metadata),
                    None => (entry, ""),
                };
                let (name, value) = name_and_value.split_once('=')?;
                let name = decode(name.trim())?;
                let value = decode(value.trim())?;
                let metadata = decode(metadata.trim()).unwrap_or_default();
                Some(KeyValueMetadata::new(name, value, metadata))
            })
            .collect::<Vec<_>>();

        // extraction replaces whatever baggage the context carried
        cx.with_cleared_baggage().with_baggage(entries)
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::StringValue;
    use std::collections::HashMap;

    #[test]
    fn inject_encodes_space_as_plus_and_keeps_metadata() {
        let propagator = BaggagePropagator::new();
        let cx = Context::new().with_baggage(vec![
            KeyValueMetadata::new("user.id", "u 1", ""),
            KeyValueMetadata::new("tenant", "acme", "source=mobile"),
        ]);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);

        let header = carrier.get("baggage").unwrap();
        let mut entries: Vec<&str> = header.split(',').collect();
        entries.sort_unstable();
        assert_eq!(entries, vec!["tenant=acme;source=mobile", "user.id=u+1"]);
    }

    #[test]
    fn extract_round_trips_inject() {
        let propagator = BaggagePropagator::new();
        let cx = Context::new().with_baggage(vec![
            KeyValueMetadata::new("user.id", "u 1", ""),
            KeyValueMetadata::new("commas", "a,b;c=d", ""),
            KeyValueMetadata::new("tenant", "acme", "source=mobile"),
        ]);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        let extracted = propagator.extract_with_context(&Context::new(), &carrier);

        let baggage = extracted.baggage();
        assert_eq!(baggage.get("user.id"), Some(&StringValue::from("u 1")));
        assert_eq!(baggage.get("commas"), Some(&StringValue::from("a,b;c=d")));
        let (value, metadata) = baggage.get_with_metadata("tenant").unwrap();
        assert_eq!(value, &StringValue::from("acme"));
        assert_eq!(metadata.as_str(), "source=mobile");
    }

    #[test]
    fn missing_header_produces_empty_baggage() {
        let propagator = BaggagePropagator::new();
        let cx = Context::new().with_baggage(vec![KeyValueMetadata::new("stale", "1", "")]);

        let carrier: HashMap<String, String> = HashMap::new();
        let extracted = propagator.extract_with_context(&cx, &carrier);
        assert!(extracted.baggage().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let propagator = BaggagePropagator::new();
        let mut carrier = HashMap::new();
        carrier.insert(
            "baggage".to_string(),
            "valid=1,novalue,also=fine".to_string(),
        );
        let extracted = propagator.extract_with_context(&Context::new(), &carrier);
        assert_eq!(extracted.baggage().len(), 2);
    }

    #[test]
    fn no_header_written_for_empty_baggage() {
        let propagator = BaggagePropagator::new();
        let mut carrier = HashMap::new();
        propagator.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());
    }
}
