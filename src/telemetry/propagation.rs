//! Context propagation.
//!
//! W3C `traceparent`/`tracestate` plus `baggage`, installed as the
//! process-wide propagator so inbound requests continue remote traces.

use axum::http::HeaderMap;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// Trace-context + baggage propagator.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Install [`composite_propagator`] as the global default.
pub fn install() {
    global::set_text_map_propagator(composite_propagator());
}

/// Extract the remote context carried by inbound HTTP headers.
pub fn extract_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::baggage::BaggageExt;
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry::KeyValue;
    use std::collections::HashMap;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID: &str = "00f067aa0ba902b7";

    #[test]
    fn carries_trace_context_and_baggage() {
        let propagator = composite_propagator();
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex(SPAN_ID).unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new()
            .with_remote_span_context(span_context)
            .with_baggage(vec![KeyValue::new("tenant", "acme")]);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        assert!(carrier.contains_key("traceparent"));
        assert!(carrier.contains_key("baggage"));

        let extracted = propagator.extract(&carrier);
        assert_eq!(
            extracted.span().span_context().trace_id(),
            TraceId::from_hex(TRACE_ID).unwrap()
        );
        assert_eq!(
            extracted.baggage().get("tenant").map(|v| v.to_string()),
            Some("acme".to_string())
        );
    }

    #[test]
    fn extracts_from_http_headers() {
        install();
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            format!("00-{TRACE_ID}-{SPAN_ID}-01").parse().unwrap(),
        );
        let cx = extract_context(&headers);
        assert!(cx.span().span_context().is_remote());
        assert_eq!(cx.span().span_context().span_id(), SpanId::from_hex(SPAN_ID).unwrap());
    }
}
