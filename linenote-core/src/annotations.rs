//! In-memory model of the comments on one file.
//!
//! Comments are kept per line in arrival order: new comments append, and a
//! reassigned comment moves to the end of its destination line. Per-line
//! visual flags live alongside them; `marked_permanently` is derived and is
//! recomputed whenever a mutation touches a line.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::LookupError;
use crate::types::{self, Comment, CommentId, LineNumber, LineVisualState, ViewerContext};

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    line_count: usize,
    viewer: ViewerContext,
    by_line: BTreeMap<LineNumber, Vec<Comment>>,
    index: HashMap<CommentId, LineNumber>,
    visual: Vec<LineVisualState>,
}

impl AnnotationStore {
    pub fn new(line_count: usize, viewer: ViewerContext) -> Self {
        Self {
            line_count,
            viewer,
            by_line: BTreeMap::new(),
            index: HashMap::new(),
            visual: vec![LineVisualState::default(); line_count],
        }
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.viewer
    }

    fn check_line(&self, line: LineNumber) -> Result<usize, LookupError> {
        if line >= 1 && (line as usize) <= self.line_count {
            Ok(line as usize - 1)
        } else {
            Err(LookupError::LineNotFound(line))
        }
    }

    /// Appends `comment` to its line.
    ///
    /// # Errors
    ///
    /// `DuplicateComment` if the id is already present anywhere, `LineNotFound`
    /// if the comment targets a line the file does not have.
    pub fn add(&mut self, comment: Comment) -> Result<(), LookupError> {
        if self.index.contains_key(&comment.id) {
            return Err(LookupError::DuplicateComment(comment.id));
        }
        let line = comment.line_number;
        self.check_line(line)?;
        debug!(id = %comment.id, line, "comment added");
        self.index.insert(comment.id.clone(), line);
        self.by_line.entry(line).or_default().push(comment);
        self.recompute(line);
        Ok(())
    }

    /// Removes a comment and returns it.
    pub fn remove(&mut self, id: &CommentId) -> Result<Comment, LookupError> {
        let line = self.line_of(id)?;
        let comments = self
            .by_line
            .get_mut(&line)
            .ok_or_else(|| LookupError::CommentNotFound(id.clone()))?;
        let pos = comments
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| LookupError::CommentNotFound(id.clone()))?;
        let removed = comments.remove(pos);
        if comments.is_empty() {
            self.by_line.remove(&line);
        }
        self.index.remove(id);
        self.recompute(line);
        debug!(%id, line, "comment removed");
        Ok(removed)
    }

    /// Moves a comment to the end of `new_line` and returns the line it left.
    ///
    /// Both lookups are validated before anything changes, so a failed
    /// reassignment leaves the store exactly as it was.
    pub fn reassign(&mut self, id: &CommentId, new_line: LineNumber) -> Result<LineNumber, LookupError> {
        let origin = self.line_of(id)?;
        self.check_line(new_line)?;

        let mut comment = self.remove(id)?;
        comment.line_number = new_line;
        self.index.insert(id.clone(), new_line);
        self.by_line.entry(new_line).or_default().push(comment);
        self.recompute(new_line);
        debug!(%id, from = origin, to = new_line, "comment reassigned");
        Ok(origin)
    }

    /// Replaces a comment's id in place, keeping its position.
    ///
    /// Used when the store answers a reassignment with a freshly assigned id.
    pub fn rekey(&mut self, old: &CommentId, new: CommentId) -> Result<(), LookupError> {
        if old == &new {
            return Ok(());
        }
        if self.index.contains_key(&new) {
            return Err(LookupError::DuplicateComment(new));
        }
        let line = self.line_of(old)?;
        let comment = self
            .by_line
            .get_mut(&line)
            .and_then(|comments| comments.iter_mut().find(|c| &c.id == old))
            .ok_or_else(|| LookupError::CommentNotFound(old.clone()))?;
        comment.id = new.clone();
        self.index.remove(old);
        self.index.insert(new, line);
        Ok(())
    }

    /// Replaces a comment's text with the one the store acknowledged.
    pub fn retext(
        &mut self,
        id: &CommentId,
        text: String,
        text_id: Option<CommentId>,
    ) -> Result<(), LookupError> {
        let line = self.line_of(id)?;
        let comment = self
            .by_line
            .get_mut(&line)
            .and_then(|comments| comments.iter_mut().find(|c| &c.id == id))
            .ok_or_else(|| LookupError::CommentNotFound(id.clone()))?;
        comment.text = text;
        comment.text_id = text_id;
        Ok(())
    }

    /// Whether `viewer` may edit or delete the comment.
    pub fn can_edit(&self, id: &CommentId, viewer: &ViewerContext) -> Result<bool, LookupError> {
        Ok(types::can_edit(self.get(id)?, viewer))
    }

    /// [`Self::can_edit`] for the viewer the store was built with.
    pub fn editable(&self, id: &CommentId) -> Result<bool, LookupError> {
        self.can_edit(id, &self.viewer)
    }

    pub fn get(&self, id: &CommentId) -> Result<&Comment, LookupError> {
        let line = self.line_of(id)?;
        self.by_line
            .get(&line)
            .and_then(|comments| comments.iter().find(|c| &c.id == id))
            .ok_or_else(|| LookupError::CommentNotFound(id.clone()))
    }

    pub fn line_of(&self, id: &CommentId) -> Result<LineNumber, LookupError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LookupError::CommentNotFound(id.clone()))
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.index.contains_key(id)
    }

    /// Comments on `line` in arrival order. Empty for lines without comments.
    pub fn comments_on(&self, line: LineNumber) -> &[Comment] {
        self.by_line.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Lines currently marked by at least one human comment, ascending.
    pub fn marked_lines(&self) -> Vec<LineNumber> {
        self.visual
            .iter()
            .zip(1..)
            .filter(|(state, _)| state.marked_permanently)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn visual(&self, line: LineNumber) -> Result<LineVisualState, LookupError> {
        let idx = self.check_line(line)?;
        Ok(self.visual[idx])
    }

    /// Moves the hover highlight. `None` clears it. At most one line is hovered.
    pub fn set_hovered(&mut self, line: Option<LineNumber>) -> Result<(), LookupError> {
        self.set_exclusive(line, |state, on| state.hovered = on)
    }

    /// Moves the drag-target highlight. `None` clears it.
    pub fn set_drag_target(&mut self, line: Option<LineNumber>) -> Result<(), LookupError> {
        self.set_exclusive(line, |state, on| state.drag_target_active = on)
    }

    pub fn drag_target(&self) -> Option<LineNumber> {
        self.visual
            .iter()
            .zip(1..)
            .find(|(state, _)| state.drag_target_active)
            .map(|(_, line)| line)
    }

    fn set_exclusive(
        &mut self,
        line: Option<LineNumber>,
        set: impl Fn(&mut LineVisualState, bool),
    ) -> Result<(), LookupError> {
        let target = line.map(|l| self.check_line(l)).transpose()?;
        for (idx, state) in self.visual.iter_mut().enumerate() {
            set(state, Some(idx) == target);
        }
        Ok(())
    }

    fn recompute(&mut self, line: LineNumber) {
        let marked = self.comments_on(line).iter().any(|c| !c.is_auto);
        if let Ok(idx) = self.check_line(line) {
            self.visual[idx].marked_permanently = marked;
        }
    }
}
