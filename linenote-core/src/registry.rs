//! Addressable index from line numbers to rendered line units and their
//! comment containers.
//!
//! The registry is the single indirection point between a line number and
//! where that line lives on screen. It is built once per loaded file; line
//! units are never recreated afterwards, only restyled.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::{LookupError, StructuralError};
use crate::overlay::CommentUnit;
use crate::reflow::{self, ReflowedLine};
use crate::types::LineNumber;

/// One self-contained rendered source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineUnit {
    pub number: LineNumber,
    /// Well-formed markup for the line, reopened prefix and closing suffix included.
    pub content: String,
    logical: Range<usize>,
    /// Set while the line's container holds at least one mounted comment unit.
    pub comment_present: bool,
}

impl LineUnit {
    /// The line's own slice of the source block.
    pub fn logical(&self) -> &str {
        &self.content[self.logical.clone()]
    }

    /// Visible text of the line with tags stripped and entities decoded.
    pub fn text(&self) -> String {
        reflow::text_content(&self.content)
    }
}

/// Handle to the comment container anchored after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerHandle(LineNumber);

impl ContainerHandle {
    pub fn line(self) -> LineNumber {
        self.0
    }
}

/// Holds the mounted comment units of one line, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentContainer {
    pub units: Vec<CommentUnit>,
}

/// A row of the rendered document, in display order.
#[derive(Debug, Clone, Copy)]
pub enum LayoutRow<'a> {
    Line(&'a LineUnit),
    /// The container anchored directly after the line with the same number.
    Container(ContainerHandle, &'a CommentContainer),
}

#[derive(Debug, Clone, Default)]
pub struct LineRegistry {
    lines: Vec<LineUnit>,
    containers: BTreeMap<LineNumber, CommentContainer>,
}

impl LineRegistry {
    /// Builds the registry from already reflowed lines.
    pub fn new(reflowed: Vec<ReflowedLine>) -> Self {
        let lines = reflowed
            .into_iter()
            .zip(1..)
            .map(|(line, number)| LineUnit {
                number,
                content: line.content,
                logical: line.logical,
                comment_present: false,
            })
            .collect();
        Self { lines, containers: BTreeMap::new() }
    }

    /// Reflows a highlighted block and builds the registry from the result.
    ///
    /// # Errors
    ///
    /// Propagates the [`StructuralError`] of a malformed block.
    pub fn from_markup(markup: &str) -> Result<Self, StructuralError> {
        reflow::reflow(markup).map(Self::new)
    }

    pub fn count(&self) -> usize {
        self.lines.len()
    }

    pub fn contains(&self, line: LineNumber) -> bool {
        line >= 1 && (line as usize) <= self.lines.len()
    }

    fn index(&self, line: LineNumber) -> Result<usize, LookupError> {
        if self.contains(line) {
            Ok(line as usize - 1)
        } else {
            Err(LookupError::LineNotFound(line))
        }
    }

    pub fn get(&self, line: LineNumber) -> Result<&LineUnit, LookupError> {
        let idx = self.index(line)?;
        Ok(&self.lines[idx])
    }

    pub(crate) fn get_mut(&mut self, line: LineNumber) -> Result<&mut LineUnit, LookupError> {
        let idx = self.index(line)?;
        Ok(&mut self.lines[idx])
    }

    pub fn lines(&self) -> &[LineUnit] {
        &self.lines
    }

    /// Returns the container for `line`, creating an empty one if needed.
    ///
    /// Idempotent: a second call for the same line returns the same handle
    /// and does not add a second container.
    pub fn ensure_comment_container(&mut self, line: LineNumber) -> Result<ContainerHandle, LookupError> {
        self.index(line)?;
        self.containers.entry(line).or_default();
        Ok(ContainerHandle(line))
    }

    pub fn container(&self, handle: ContainerHandle) -> Option<&CommentContainer> {
        self.containers.get(&handle.0)
    }

    pub(crate) fn container_mut(&mut self, handle: ContainerHandle) -> Option<&mut CommentContainer> {
        self.containers.get_mut(&handle.0)
    }

    pub fn container_for(&self, line: LineNumber) -> Option<&CommentContainer> {
        self.containers.get(&line)
    }

    /// Removes the container anchored after `line`, if there is one.
    pub fn clear_container(&mut self, line: LineNumber) -> Option<CommentContainer> {
        self.containers.remove(&line)
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Walks the document in display order: each line, then its container.
    pub fn layout(&self) -> impl Iterator<Item = LayoutRow<'_>> {
        self.lines.iter().flat_map(move |unit| {
            let container = self
                .containers
                .get(&unit.number)
                .map(|c| LayoutRow::Container(ContainerHandle(unit.number), c));
            std::iter::once(LayoutRow::Line(unit)).chain(container)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LineRegistry {
        LineRegistry::from_markup("<b>foo\nbar</b>\nbaz").unwrap()
    }

    #[test]
    fn lines_are_numbered_from_one() {
        let reg = registry();
        assert_eq!(reg.count(), 3);
        assert_eq!(reg.get(1).unwrap().content, "<b>foo</b>");
        assert_eq!(reg.get(2).unwrap().logical(), "bar</b>");
        assert_eq!(reg.get(3).unwrap().text(), "baz");
    }

    #[test]
    fn out_of_range_lookups_fail() {
        let mut reg = registry();
        assert_eq!(reg.get(0).unwrap_err(), LookupError::LineNotFound(0));
        assert_eq!(reg.get(4).unwrap_err(), LookupError::LineNotFound(4));
        assert_eq!(reg.ensure_comment_container(9).unwrap_err(), LookupError::LineNotFound(9));
    }

    #[test]
    fn ensure_comment_container_is_idempotent() {
        let mut reg = registry();
        let first = reg.ensure_comment_container(2).unwrap();
        let second = reg.ensure_comment_container(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(reg.container_count(), 1);
    }

    #[test]
    fn container_is_anchored_after_its_line() {
        let mut reg = registry();
        reg.ensure_comment_container(2).unwrap();
        let order: Vec<String> = reg
            .layout()
            .map(|row| match row {
                LayoutRow::Line(u) => format!("L{}", u.number),
                LayoutRow::Container(h, _) => format!("C{}", h.line()),
            })
            .collect();
        assert_eq!(order, ["L1", "L2", "C2", "L3"]);
    }

    #[test]
    fn malformed_markup_builds_nothing() {
        assert!(LineRegistry::from_markup("a</b>").is_err());
    }
}
