// Streaming HTML transformation
//
// A RewritePlan is plain data: an ordered table of anchor selectors, each
// holding the actions to run on every element it matches. The plan is
// handed to lol_html once per response and the document is rewritten chunk
// by chunk without ever being held in memory as a whole.

use std::borrow::Cow;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use lol_html::{
    html_content::{ContentType, Element},
    ElementContentHandlers, HtmlRewriter, OutputSink, Selector, Settings,
};
use tokio::sync::mpsc;

use crate::{
    domain::{rule_selector, InjectionRule, Position, ProxyConfig},
    error::AppError,
};

/// Chunks buffered between the origin, the rewriter and the client
const CHANNEL_CAPACITY: usize = 8;

type ChunkResult = Result<Bytes, AppError>;

/// How a fragment is inserted relative to a matched element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Prepend,
    Append,
    Before,
    After,
}

impl ActionKind {
    /// `None` for positions the rewriter does not know how to honor
    pub fn from_position(position: Position) -> Option<Self> {
        match position {
            Position::InsideBefore => Some(ActionKind::Prepend),
            Position::InsideAfter => Some(ActionKind::Append),
            Position::OutsideBefore => Some(ActionKind::Before),
            Position::OutsideAfter => Some(ActionKind::After),
            Position::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub html: String,
}

impl Action {
    pub fn new(kind: ActionKind, html: impl Into<String>) -> Self {
        Self { kind, html: html.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AnchorEntry {
    selector: String,
    actions: Vec<Action>,
}

/// Fragments for one anchor, concatenated per insertion point in
/// registration order so the first registered fragment always comes first
/// in the document.
#[derive(Debug, Default)]
struct Fragments {
    before: String,
    prepend: String,
    append: String,
    after: String,
}

impl Fragments {
    fn collect(actions: &[Action]) -> Self {
        let mut fragments = Fragments::default();
        for action in actions {
            let slot = match action.kind {
                ActionKind::Before => &mut fragments.before,
                ActionKind::Prepend => &mut fragments.prepend,
                ActionKind::Append => &mut fragments.append,
                ActionKind::After => &mut fragments.after,
            };
            slot.push_str(&action.html);
        }
        fragments
    }

    fn apply(&self, element: &mut Element<'_, '_>) {
        if !self.before.is_empty() {
            element.before(&self.before, ContentType::Html);
        }
        if !self.prepend.is_empty() {
            element.prepend(&self.prepend, ContentType::Html);
        }
        if !self.append.is_empty() {
            element.append(&self.append, ContentType::Html);
        }
        if !self.after.is_empty() {
            element.after(&self.after, ContentType::Html);
        }
    }
}

/// Escape a value for use inside a double-quoted attribute
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn script_tag(src: &str) -> String {
    format!(r#"<script src="{}"></script>"#, escape_attribute(src))
}

pub fn stylesheet_tag(href: &str) -> String {
    format!(r#"<link rel="stylesheet" href="{}">"#, escape_attribute(href))
}

/// Dispatch table of anchor selectors to insertion actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewritePlan {
    entries: Vec<AnchorEntry>,
}

impl RewritePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the plan for one response: script tags, then stylesheet tags,
    /// then every injection rule selected for `path` and `status`.
    pub fn for_response(config: &ProxyConfig, path: &str, status: u16) -> Self {
        let mut plan = Self::new();

        for source in &config.script_src {
            plan.register(&source.target, Action::new(ActionKind::Append, script_tag(&source.src)));
        }
        for source in &config.style_src {
            plan.register(&source.target, Action::new(ActionKind::Append, stylesheet_tag(&source.src)));
        }

        let selected = rule_selector::select_rules(path, status, &config.html_injection);
        tracing::debug!(
            path,
            status,
            selected = selected.len(),
            configured = config.html_injection.len(),
            "Selected injection rules"
        );
        for rule in selected {
            plan.register_rule(rule);
        }

        plan
    }

    /// Register a selected rule. Rules with an unknown position are skipped.
    pub fn register_rule(&mut self, rule: &InjectionRule) {
        match ActionKind::from_position(rule.position) {
            Some(kind) => self.register(&rule.selector, Action::new(kind, rule.content.clone())),
            None => tracing::debug!(selector = %rule.selector, "Skipping injection rule without a known position"),
        }
    }

    /// Append `action` to the anchor for `selector`, creating it if needed
    pub fn register(&mut self, selector: &str, action: Action) {
        match self.entries.iter_mut().find(|entry| entry.selector == selector) {
            Some(entry) => entry.actions.push(action),
            None => self.entries.push(AnchorEntry {
                selector: selector.to_string(),
                actions: vec![action],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn selectors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.selector.as_str())
    }

    fn build_rewriter<'h, O: OutputSink>(&self, sink: O) -> Result<HtmlRewriter<'h, O>, AppError> {
        let mut handlers = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let selector: Selector = entry
                .selector
                .parse()
                .map_err(|e| AppError::Rewrite(format!("invalid selector '{}': {}", entry.selector, e)))?;
            let fragments = Fragments::collect(&entry.actions);

            handlers.push((
                Cow::Owned(selector),
                ElementContentHandlers::default().element(move |element| {
                    fragments.apply(element);
                    Ok(())
                }),
            ));
        }

        Ok(HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            sink,
        ))
    }

    /// Rewrite a complete document held in memory
    #[cfg(test)]
    fn rewrite_str(&self, html: &str) -> Result<String, AppError> {
        let mut output = Vec::with_capacity(html.len());
        let mut rewriter = self.build_rewriter(|chunk: &[u8]| output.extend_from_slice(chunk))?;
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
        String::from_utf8(output).map_err(|e| AppError::Rewrite(e.to_string()))
    }

    /// Wrap `body` in a lazily rewritten body.
    ///
    /// The rewriter runs on a blocking worker between two bounded channels,
    /// so it only advances while the consumer keeps reading. Origin and
    /// rewriter errors are yielded by the returned body.
    pub fn transform_body(self, body: Body) -> Body {
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(pump_origin(body, input_tx));
        tokio::task::spawn_blocking(move || self.run(input_rx, output_tx));

        Body::from_stream(stream::unfold(output_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    fn run(self, mut input: mpsc::Receiver<ChunkResult>, output: mpsc::Sender<ChunkResult>) {
        let sink_tx = output.clone();
        let rewriter = self.build_rewriter(move |chunk: &[u8]| {
            if !chunk.is_empty() {
                // A closed channel means the client went away; the loop below stops
                let _ = sink_tx.blocking_send(Ok(Bytes::copy_from_slice(chunk)));
            }
        });

        let mut rewriter = match rewriter {
            Ok(rewriter) => rewriter,
            Err(e) => {
                let _ = output.blocking_send(Err(e));
                return;
            }
        };

        while let Some(item) = input.blocking_recv() {
            if let Err(e) = item.and_then(|chunk| rewriter.write(&chunk).map_err(AppError::from)) {
                tracing::warn!("Aborting response body: {}", e);
                let _ = output.blocking_send(Err(e));
                return;
            }
            if output.is_closed() {
                tracing::debug!("Client disconnected, stopping rewriter");
                return;
            }
        }

        if let Err(e) = rewriter.end() {
            tracing::warn!("Rewriter failed at end of document: {}", e);
            let _ = output.blocking_send(Err(e.into()));
        }
    }
}

/// Forward origin body chunks to the rewriter worker
async fn pump_origin(body: Body, tx: mpsc::Sender<ChunkResult>) {
    let mut chunks = body.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let item = chunk.map_err(|e| AppError::Upstream(format!("origin body: {}", e)));
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}
