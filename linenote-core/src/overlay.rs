//! Comment overlays: rendering a comment into a self-contained unit and
//! mounting it under its line.
//!
//! [`render_comment`] is a pure function of `(comment, viewer, now)`. All
//! author-supplied text is sanitized while the unit is built, so nothing
//! mounted into a container can carry raw markup, scripts or terminal escape
//! sequences. [`OverlayRenderer`] only moves finished units in and out of the
//! [`LineRegistry`] containers.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use crate::annotations::AnnotationStore;
use crate::error::LookupError;
use crate::registry::{ContainerHandle, LineRegistry};
use crate::types::{can_edit, Comment, CommentId, LineNumber, Role, ViewerContext};

/// Initials badge shown next to the author name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub initials: String,
    /// Stable hue in degrees derived from the author name.
    pub hue: u16,
}

/// A fully rendered, sanitized comment ready to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentUnit {
    pub comment_id: CommentId,
    pub line: LineNumber,
    pub author: String,
    pub role: Role,
    pub avatar: Avatar,
    pub timestamp_label: Option<String>,
    /// Markdown body rendered to HTML with raw markup escaped.
    pub body_html: String,
    /// Body with control characters removed, for terminal display.
    pub body_text: String,
    pub is_auto: bool,
    /// Edit and delete affordances are present only when this is set.
    pub editable: bool,
    /// The complete HTML fragment for the unit.
    pub html: String,
}

/// Renders one comment for `viewer`.
pub fn render_comment(comment: &Comment, viewer: &ViewerContext, now: DateTime<Utc>) -> CommentUnit {
    let editable = can_edit(comment, viewer);
    let author = if comment.author_name.is_empty() {
        if comment.is_auto { "Automatic check".to_owned() } else { "Unknown".to_owned() }
    } else {
        comment.author_name.clone()
    };
    let avatar = avatar_for(&author);
    let timestamp_label = comment.timestamp.map(|ts| timestamp_label(ts, now));
    let body_html = render_markdown(&comment.text);
    let body_text = terminal_text(&comment.text);

    let mut unit = CommentUnit {
        comment_id: comment.id.clone(),
        line: comment.line_number,
        author,
        role: comment.author_role,
        avatar,
        timestamp_label,
        body_html,
        body_text,
        is_auto: comment.is_auto,
        editable,
        html: String::new(),
    };
    unit.html = unit_html(&unit, comment.timestamp);
    unit
}

fn unit_html(unit: &CommentUnit, timestamp: Option<DateTime<Utc>>) -> String {
    let id = escape_html(unit.comment_id.as_str());
    let mut out = String::with_capacity(256 + unit.body_html.len());
    let class = if unit.is_auto { "comment comment-auto" } else { "comment" };
    let _ = write!(out, r#"<div class="{class}" data-comment-id="{id}" data-line="{}""#, unit.line);
    if unit.editable {
        out.push_str(r#" draggable="true""#);
    }
    out.push_str(r#"><div class="comment-header">"#);
    let _ = write!(
        out,
        r#"<span class="avatar" style="background-color:hsl({},55%,45%)">{}</span>"#,
        unit.avatar.hue,
        escape_html(&unit.avatar.initials)
    );
    let _ = write!(
        out,
        r#"<span class="author">{}</span><span class="role">{}</span>"#,
        escape_html(&unit.author),
        unit.role.label()
    );
    if let (Some(ts), Some(label)) = (timestamp, unit.timestamp_label.as_deref()) {
        let _ = write!(out, r#"<time datetime="{}">{}</time>"#, ts.to_rfc3339(), escape_html(label));
    }
    if unit.editable {
        let _ = write!(
            out,
            r#"<span class="actions"><button class="edit-comment" data-comment-id="{id}">Edit</button><button class="delete-comment" data-comment-id="{id}">Delete</button></span>"#
        );
    }
    let _ = write!(out, r#"</div><div class="comment-body">{}</div></div>"#, unit.body_html);
    out
}

/// Renders a markdown comment body to HTML with untrusted content neutralised.
///
/// Raw HTML in the source is emitted as escaped text, and link or image
/// targets with a scheme other than `http`, `https` or `mailto` are replaced
/// by `#`.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES);
    let events = parser.map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let trimmed = url.trim_start();
    let scheme_end = trimmed.find(|c: char| matches!(c, ':' | '/' | '?' | '#'));
    let allowed = match scheme_end {
        Some(i) if trimmed[i..].starts_with(':') => {
            let scheme = trimmed[..i].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    };
    if allowed { url } else { CowStr::Borrowed("#") }
}

/// Strips control characters (escape sequences included) so author text
/// cannot restyle a terminal. Newlines and tabs survive.
pub fn terminal_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Relative label for recent timestamps, a localized date for older ones.
pub fn timestamp_label(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(ts).num_seconds();
    let plural = |n: i64, unit: &str| {
        if n == 1 { format!("1 {unit} ago") } else { format!("{n} {unit}s ago") }
    };
    match secs {
        0..=59 => "just now".to_owned(),
        60..=3_599 => plural(secs / 60, "minute"),
        3_600..=86_399 => plural(secs / 3_600, "hour"),
        86_400..=604_799 => plural(secs / 86_400, "day"),
        _ => ts.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string(),
    }
}

fn avatar_for(name: &str) -> Avatar {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    // FNV-1a; only needs to be stable, not strong.
    let hash = name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    Avatar {
        initials: if initials.is_empty() { "?".to_owned() } else { initials },
        hue: (hash % 360) as u16,
    }
}

/// Mounts and unmounts rendered units in the registry's comment containers.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    viewer: ViewerContext,
}

impl OverlayRenderer {
    pub fn new(viewer: ViewerContext) -> Self {
        Self { viewer }
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.viewer
    }

    /// Renders the stored comment `id` and appends it to its line's container.
    ///
    /// # Errors
    ///
    /// `CommentNotFound` if the store does not hold `id`, `DuplicateComment` if
    /// a unit for it is already mounted on that line.
    pub fn mount(
        &self,
        registry: &mut LineRegistry,
        store: &AnnotationStore,
        id: &CommentId,
    ) -> Result<ContainerHandle, LookupError> {
        let comment = store.get(id)?;
        self.mount_unit(registry, render_comment(comment, &self.viewer, Utc::now()))
    }

    pub fn mount_unit(
        &self,
        registry: &mut LineRegistry,
        unit: CommentUnit,
    ) -> Result<ContainerHandle, LookupError> {
        let line = unit.line;
        let handle = registry.ensure_comment_container(line)?;
        let container = registry
            .container_mut(handle)
            .ok_or(LookupError::LineNotFound(line))?;
        if container.units.iter().any(|u| u.comment_id == unit.comment_id) {
            return Err(LookupError::DuplicateComment(unit.comment_id));
        }
        container.units.push(unit);
        registry.get_mut(line)?.comment_present = true;
        Ok(handle)
    }

    /// Removes exactly the unit for `id` from `line`'s container.
    ///
    /// When that was the last unit the container itself is cleared. The
    /// line's marked state is not touched; it belongs to the store.
    pub fn unmount(
        &self,
        registry: &mut LineRegistry,
        id: &CommentId,
        line: LineNumber,
    ) -> Result<CommentUnit, LookupError> {
        let handle = registry.ensure_comment_container(line)?;
        let container = registry
            .container_mut(handle)
            .ok_or(LookupError::LineNotFound(line))?;
        let Some(pos) = container.units.iter().position(|u| &u.comment_id == id) else {
            if container.units.is_empty() {
                registry.clear_container(line);
            }
            return Err(LookupError::CommentNotFound(id.clone()));
        };
        let unit = container.units.remove(pos);
        if container.units.is_empty() {
            registry.clear_container(line);
            registry.get_mut(line)?.comment_present = false;
        }
        Ok(unit)
    }
}
