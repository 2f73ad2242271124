//! Custom tracing layers for qnet
//!
//! [`NodeContextLayer`] stamps every new span with the active
//! [`NodeContextGuard`] context, and [`jsonl_layer`] builds the JSON
//! formatter shared by console and file output. Every JSON line carries the
//! `node_id` and `instance_id` of the span the event was emitted in.

use std::fmt::Write as _;

use tracing::{Event, Subscriber, span};
use tracing_subscriber::fmt::{
    self, FmtContext, FormatEvent, FormatFields, MakeWriter,
    format::{Format, Json, JsonFields, Writer},
};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that attaches node context to spans
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NodeContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        // Explicit context wins; otherwise inherit from the parent span
        let data = NodeContextGuard::current().or_else(|| {
            span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<NodeContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });

        if let Some(data) = data {
            span.extensions_mut().insert(NodeContextExtension { data });
        }
    }
}

/// Node context of the innermost span of `ctx` carrying one
pub fn span_node_context<S>(span: &tracing_subscriber::registry::SpanRef<'_, S>) -> Option<NodeContextData>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    span.scope().find_map(|s| {
        s.extensions()
            .get::<NodeContextExtension>()
            .map(|ext| ext.data.clone())
    })
}

/// JSON event format that leads each line with the node context
pub struct NodeContextJson {
    inner: Format<Json>,
}

impl NodeContextJson {
    pub fn new(inner: Format<Json>) -> Self {
        Self { inner }
    }
}

impl<S, N> FormatEvent<S, N> for NodeContextJson
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;

        let node = ctx.event_scope().and_then(|scope| {
            scope.into_iter().find_map(|span| {
                span.extensions()
                    .get::<NodeContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });
        let (Some(node), Some(rest)) = (node, line.strip_prefix('{')) else {
            return writer.write_str(&line);
        };

        let node_id = serde_json::to_string(&node.node_id).map_err(|_| std::fmt::Error)?;
        write!(
            writer,
            "{{\"node_id\":{node_id},\"instance_id\":\"{}\"",
            node.instance_id
        )?;
        if !rest.starts_with('}') {
            writer.write_char(',')?;
        }
        writer.write_str(rest)
    }
}

/// JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(
    config: &JsonlConfig,
    writer: W,
) -> fmt::Layer<S, JsonFields, NodeContextJson, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    let format = fmt::format()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info);

    fmt::layer()
        .fmt_fields(JsonFields::new())
        .event_format(NodeContextJson::new(format))
        .with_writer(writer)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use qnet_core::NodeId;
    use tracing::Event;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    use super::*;

    /// Records the node context seen by each event
    #[derive(Clone, Default)]
    struct ContextRecorder {
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl<S> Layer<S> for ContextRecorder
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let node = ctx
                .event_span(event)
                .and_then(|span| span_node_context(&span))
                .map(|data| data.node_id);
            self.seen.lock().unwrap().push(node);
        }
    }

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn test_span_captures_context_at_creation() {
        let recorder = ContextRecorder::default();
        let subscriber = Registry::default()
            .with(NodeContextLayer::new())
            .with(recorder.clone());

        tracing::subscriber::with_default(subscriber, || {
            let span = {
                let _guard = NodeContextGuard::new(&id("Alice"));
                tracing::info_span!("replenisher")
            };
            // Guard is gone; the span still remembers Alice
            span.in_scope(|| tracing::info!("cycle"));

            let bare = tracing::info_span!("bare");
            bare.in_scope(|| tracing::info!("no node"));
        });

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("Alice".to_string()), None]);
    }

    #[test]
    fn test_child_span_inherits_context() {
        let recorder = ContextRecorder::default();
        let subscriber = Registry::default()
            .with(NodeContextLayer::new())
            .with(recorder.clone());

        tracing::subscriber::with_default(subscriber, || {
            let parent = {
                let _guard = NodeContextGuard::new(&id("node_1"));
                tracing::info_span!("transfer")
            };
            parent.in_scope(|| {
                let child = tracing::debug_span!("hop");
                child.in_scope(|| tracing::info!("forwarded"));
            });
        });

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("node_1".to_string())]);
    }

    /// In-memory writer for the JSON formatter
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_jsonl_lines_carry_node_context() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = Registry::default()
            .with(NodeContextLayer::new())
            .with(jsonl_layer(&JsonlConfig::default(), move || writer.clone()));

        let instance_id = uuid::Uuid::new_v4();
        tracing::subscriber::with_default(subscriber, || {
            let span = {
                let _guard = NodeContextGuard::with_instance_id(&id("node_1"), instance_id);
                tracing::info_span!("replenisher")
            };
            span.in_scope(|| tracing::info!(generated = 3, "Cycle done"));
            tracing::info!("outside any node");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2, "{output}");

        assert_eq!(lines[0]["node_id"], "node_1");
        assert_eq!(lines[0]["instance_id"], instance_id.to_string());
        assert_eq!(lines[0]["generated"], 3);
        assert_eq!(lines[0]["span"]["name"], "replenisher");

        assert!(lines[1].get("node_id").is_none());
        assert_eq!(lines[1]["message"], "outside any node");
    }
}
