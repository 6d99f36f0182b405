//! Undo/Redo command stack.
//!
//! Every edit is recorded as a pair of full container tokens, taken before
//! and after it ran. Undo and redo replace the canvas with one of them, so
//! there is no per-edit inverse to get wrong. Item ids survive the swap
//! because a cleared canvas hands every token id back unchanged. Snapshots
//! keep scripts that have no persisted id yet.
//!
//! Drag gestures are wrapped in a batch: one snapshot is taken when the
//! gesture starts and one when it ends, giving a single undo step.

use hatch_core::{Container, ContainerDirectory, ContainerToken, GraphResult};

/// One undoable step.
#[derive(Debug, Clone)]
pub struct Snapshot {
    before: ContainerToken,
    after: ContainerToken,
    description: String,
}

impl Snapshot {
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Undo/redo history of one container.
#[derive(Debug)]
pub struct CommandStack {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Maximum undo depth.
    max_depth: usize,
    /// Batch nesting depth (0 = not batching).
    batch_depth: usize,
    /// Token captured at the start of a batch.
    batch_snapshot: Option<ContainerToken>,
    batch_dirty: bool,
}

fn snapshot_of(container: &Container) -> ContainerToken {
    container.canvas().snapshot()
}

impl CommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(64)),
            redo_stack: Vec::new(),
            max_depth,
            batch_depth: 0,
            batch_snapshot: None,
            batch_dirty: false,
        }
    }

    /// Start a batch. Edits until the matching `end_batch` become one step.
    pub fn begin_batch(&mut self, container: &Container) {
        if self.batch_depth == 0 {
            self.batch_snapshot = Some(snapshot_of(container));
            self.batch_dirty = false;
        }
        self.batch_depth += 1;
    }

    /// Close a batch. The outermost close records one step if anything
    /// changed.
    pub fn end_batch(&mut self, container: &Container, description: &str) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth > 0 {
            return;
        }
        let before = self.batch_snapshot.take();
        if self.batch_dirty {
            if let Some(before) = before {
                let after = snapshot_of(container);
                if before != after {
                    self.push(Snapshot {
                        before,
                        after,
                        description: description.to_string(),
                    });
                }
            }
        }
        self.batch_dirty = false;
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Run `edit` against `container` and record it.
    ///
    /// A failed edit records nothing. Inside a batch the edit is applied live
    /// and folded into the batch step.
    pub fn execute<T, E>(
        &mut self,
        container: &mut Container,
        description: &str,
        edit: impl FnOnce(&mut Container) -> Result<T, E>,
    ) -> Result<T, E> {
        if self.batch_depth > 0 {
            let out = edit(container)?;
            self.batch_dirty = true;
            return Ok(out);
        }

        let before = snapshot_of(container);
        let out = edit(container)?;
        let after = snapshot_of(container);
        if before != after {
            self.push(Snapshot {
                before,
                after,
                description: description.to_string(),
            });
        }
        Ok(out)
    }

    fn push(&mut self, step: Snapshot) {
        log::debug!("undo step: {}", step.description);
        self.undo_stack.push(step);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        // New edits invalidate the redo branch
        self.redo_stack.clear();
    }

    /// Undo the last step. Returns its description.
    pub fn undo(
        &mut self,
        container: &mut Container,
        directory: &dyn ContainerDirectory,
    ) -> GraphResult<Option<String>> {
        let Some(step) = self.undo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = restore(container, &step.before, directory) {
            self.undo_stack.push(step);
            return Err(err);
        }
        let description = step.description.clone();
        self.redo_stack.push(step);
        Ok(Some(description))
    }

    /// Redo the last undone step. Returns its description.
    pub fn redo(
        &mut self,
        container: &mut Container,
        directory: &dyn ContainerDirectory,
    ) -> GraphResult<Option<String>> {
        let Some(step) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = restore(container, &step.after, directory) {
            self.redo_stack.push(step);
            return Err(err);
        }
        let description = step.description.clone();
        self.undo_stack.push(step);
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Forget all history, e.g. after the container was reloaded.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch_depth = 0;
        self.batch_snapshot = None;
        self.batch_dirty = false;
    }
}

fn restore(
    container: &mut Container,
    token: &ContainerToken,
    directory: &dyn ContainerDirectory,
) -> GraphResult<()> {
    let report = container
        .canvas_mut()
        .detokenize_with(token, true, directory)?;
    if !report.is_lossless() {
        log::warn!(
            "`{}`: {} item(s) could not be restored",
            container.id,
            report.dropped.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_core::{AnyContainer, ContainerId, EngineConfig, IdGenerator, Placement};
    use pretty_assertions::assert_eq;

    fn container() -> Container {
        Container::new(
            ContainerId::new("main"),
            "Main",
            IdGenerator::new(),
            EngineConfig::default(),
        )
    }

    fn add_comment(stack: &mut CommandStack, c: &mut Container, text: &str) {
        stack
            .execute(c, "add comment", |c| {
                c.canvas_mut().add_comment(text, Placement::default())
            })
            .unwrap();
    }

    #[test]
    fn undo_then_redo() {
        let mut c = container();
        let mut stack = CommandStack::new(10);
        add_comment(&mut stack, &mut c, "one");

        assert_eq!(
            stack.undo(&mut c, &AnyContainer).unwrap().as_deref(),
            Some("add comment")
        );
        assert!(c.canvas().is_empty());
        stack.redo(&mut c, &AnyContainer).unwrap();
        assert_eq!(c.canvas().len(), 1);
    }

    #[test]
    fn failed_edit_records_nothing() {
        let mut c = container();
        let mut stack = CommandStack::new(10);
        let result = stack.execute(&mut c, "bad", |c| {
            c.canvas_mut().add_shortcut(hatch_core::ShallowId(99), Placement::default())
        });
        assert!(result.is_err());
        assert!(!stack.can_undo());
    }

    #[test]
    fn max_depth_drops_oldest() {
        let mut c = container();
        let mut stack = CommandStack::new(2);
        for text in ["a", "b", "c"] {
            add_comment(&mut stack, &mut c, text);
        }
        assert_eq!(stack.undo_len(), 2);
    }

    #[test]
    fn batch_is_one_step() {
        let mut c = container();
        let mut stack = CommandStack::new(10);
        let id = c
            .canvas_mut()
            .add_comment("drag me", Placement::default())
            .unwrap();

        stack.begin_batch(&c);
        for x in 1..=5 {
            stack
                .execute(&mut c, "move", |c| {
                    c.canvas_mut().move_item(id, Placement::new(x as f32 * 10.0, 0.0))
                })
                .unwrap();
        }
        stack.end_batch(&c, "drag");

        assert_eq!(stack.undo_len(), 1);
        stack.undo(&mut c, &AnyContainer).unwrap();
        assert_eq!(
            c.canvas().behaviour(id).unwrap().placement,
            Placement::default()
        );
    }

    #[test]
    fn undo_keeps_unsaved_scripts() {
        let mut c = container();
        let mut stack = CommandStack::new(10);
        let script = c
            .canvas_mut()
            .add_script("Logic", None, Placement::default())
            .unwrap();
        add_comment(&mut stack, &mut c, "unrelated");

        stack.undo(&mut c, &AnyContainer).unwrap();
        assert_eq!(c.canvas().len(), 1);
        assert!(c.canvas().behaviour(script).is_some());
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut c = container();
        let mut stack = CommandStack::new(10);
        add_comment(&mut stack, &mut c, "a");
        stack.undo(&mut c, &AnyContainer).unwrap();
        assert!(stack.can_redo());
        add_comment(&mut stack, &mut c, "b");
        assert!(!stack.can_redo());
    }
}
