//! Board State Model.
//!
//! [`project`] turns an owner's flat list of records into a [`Dashboard`];
//! it is what the server answers every fetch with. The remaining methods are
//! the in-place primitives the client uses to keep its optimistic mirror in
//! step with a user's gestures. Both sides agree on one invariant: a task id
//! lives in exactly one column.

use thiserror::Error;

use crate::models::{CANONICAL_COLUMNS, Column, DEFAULT_STATUS, Dashboard, JobRecord, Task};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Index {index} out of range for column '{column}' ({len} tasks)")]
    IndexOutOfRange {
        column: String,
        index: usize,
        len: usize,
    },

    #[error("Task {0} not found on board")]
    TaskNotFound(String),

    #[error("Task {0} is already on the board")]
    DuplicateTask(String),
}

/// Where a task sits on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub column: String,
    pub index: usize,
}

impl Location {
    pub fn new(column: impl Into<String>, index: usize) -> Self {
        Self {
            column: column.into(),
            index,
        }
    }
}

/// Status used for column membership; blank statuses fall back to
/// [`DEFAULT_STATUS`].
pub fn effective_status(status: &str) -> &str {
    if status.trim().is_empty() {
        DEFAULT_STATUS
    } else {
        status
    }
}

/// Project records into a dashboard, preserving record order within each
/// column. Every record yields exactly one task.
pub fn project(records: &[JobRecord]) -> Dashboard {
    let mut dashboard = Dashboard::empty();
    for record in records {
        let status = effective_status(&record.status);
        dashboard
            .column_mut_or_insert(status)
            .tasks
            .push(Task::from(record));
    }
    dashboard
}

impl Dashboard {
    /// A dashboard holding the canonical columns, all empty.
    pub fn empty() -> Self {
        let mut dashboard = Self::default();
        for (key, _) in CANONICAL_COLUMNS {
            dashboard.columns.insert(key.to_string(), Column::new(key));
        }
        dashboard
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.get(key)
    }

    /// Get a column, synthesizing it when the key has not been seen yet.
    pub fn column_mut_or_insert(&mut self, key: &str) -> &mut Column {
        self.columns
            .entry(key.to_string())
            .or_insert_with(|| Column::new(key))
    }

    pub fn task_count(&self) -> usize {
        self.columns.values().map(|c| c.tasks.len()).sum()
    }

    pub fn find(&self, task_id: &str) -> Option<Location> {
        self.columns.iter().find_map(|(key, column)| {
            column
                .tasks
                .iter()
                .position(|t| t.id == task_id)
                .map(|index| Location::new(key.clone(), index))
        })
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        let loc = self.find(task_id)?;
        self.columns.get(&loc.column)?.tasks.get(loc.index)
    }

    /// Ids of the tasks in a column, in order. Empty for unknown columns.
    pub fn task_ids(&self, key: &str) -> Vec<String> {
        self.columns
            .get(key)
            .map(|c| c.tasks.iter().map(|t| t.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove the task at `from` and insert it at `to`. Handles same-column
    /// reorders and cross-column moves alike; the destination column is
    /// synthesized when missing.
    pub fn move_task(&mut self, from: &Location, to: &Location) -> Result<Task, BoardError> {
        let source = self
            .columns
            .get(&from.column)
            .ok_or_else(|| BoardError::UnknownColumn(from.column.clone()))?;
        if from.index >= source.tasks.len() {
            return Err(BoardError::IndexOutOfRange {
                column: from.column.clone(),
                index: from.index,
                len: source.tasks.len(),
            });
        }

        let dest_len = match self.columns.get(&to.column) {
            Some(c) if c.id == from.column => c.tasks.len() - 1,
            Some(c) => c.tasks.len(),
            None => 0,
        };
        if to.index > dest_len {
            return Err(BoardError::IndexOutOfRange {
                column: to.column.clone(),
                index: to.index,
                len: dest_len,
            });
        }

        let task = self
            .columns
            .get_mut(&from.column)
            .map(|c| c.tasks.remove(from.index))
            .ok_or_else(|| BoardError::UnknownColumn(from.column.clone()))?;
        self.column_mut_or_insert(&to.column)
            .tasks
            .insert(to.index, task.clone());
        Ok(task)
    }

    /// Insert a task at `index`, clamped to the column length. Returns the
    /// index actually used.
    pub fn insert_task(
        &mut self,
        column: &str,
        index: Option<usize>,
        task: Task,
    ) -> Result<usize, BoardError> {
        if self.find(&task.id).is_some() {
            return Err(BoardError::DuplicateTask(task.id));
        }
        let tasks = &mut self.column_mut_or_insert(column).tasks;
        let index = index.map_or(tasks.len(), |i| i.min(tasks.len()));
        tasks.insert(index, task);
        Ok(index)
    }

    /// Remove a task wherever it is. Returns the task and where it was.
    pub fn remove_task(&mut self, task_id: &str) -> Result<(Task, Location), BoardError> {
        let loc = self
            .find(task_id)
            .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))?;
        let task = self
            .columns
            .get_mut(&loc.column)
            .map(|c| c.tasks.remove(loc.index))
            .ok_or_else(|| BoardError::UnknownColumn(loc.column.clone()))?;
        Ok((task, loc))
    }

    /// Replace a task's fields. When `column` differs from the task's current
    /// column it is appended there; otherwise it keeps its slot.
    pub fn replace_task(&mut self, task: Task, column: &str) -> Result<Location, BoardError> {
        let loc = self
            .find(&task.id)
            .ok_or_else(|| BoardError::TaskNotFound(task.id.clone()))?;
        if loc.column == column {
            if let Some(slot) = self
                .columns
                .get_mut(column)
                .and_then(|c| c.tasks.get_mut(loc.index))
            {
                *slot = task;
            }
            return Ok(loc);
        }
        self.remove_task(&task.id)?;
        let index = self.insert_task(column, None, task)?;
        Ok(Location::new(column, index))
    }

    /// Give a task a new id in place, keeping its position.
    pub fn rename_task(&mut self, old_id: &str, new_id: &str) -> Result<(), BoardError> {
        if self.find(new_id).is_some() {
            return Err(BoardError::DuplicateTask(new_id.to_string()));
        }
        let loc = self
            .find(old_id)
            .ok_or_else(|| BoardError::TaskNotFound(old_id.to_string()))?;
        if let Some(task) = self
            .columns
            .get_mut(&loc.column)
            .and_then(|c| c.tasks.get_mut(loc.index))
        {
            task.id = new_id.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, status: &str) -> JobRecord {
        JobRecord {
            id,
            owner: "owner-1".into(),
            title: format!("Job {id}"),
            company: "Acme".into(),
            description: None,
            status: status.into(),
            position: 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.into(),
            content: format!("Job {id}"),
            company: "Acme".into(),
            added_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            description: None,
        }
    }

    #[test]
    fn empty_projection_has_canonical_columns() {
        let dashboard = project(&[]);
        let keys: Vec<_> = dashboard.columns.keys().cloned().collect();
        assert_eq!(keys, vec!["applied", "interview", "offered", "rejected"]);
        assert_eq!(dashboard.task_count(), 0);
    }

    #[test]
    fn projection_preserves_store_order_within_column() {
        let records = vec![record(3, "applied"), record(1, "applied"), record(2, "interview")];
        let dashboard = project(&records);
        assert_eq!(dashboard.task_ids("applied"), vec!["3", "1"]);
        assert_eq!(dashboard.task_ids("interview"), vec!["2"]);
    }

    #[test]
    fn blank_status_defaults_to_applied() {
        let dashboard = project(&[record(1, ""), record(2, "  ")]);
        assert_eq!(dashboard.task_ids("applied"), vec!["1", "2"]);
    }

    #[test]
    fn unknown_status_synthesizes_column() {
        let dashboard = project(&[record(1, "ghosted")]);
        let column = dashboard.column("ghosted").expect("synthesized column");
        assert_eq!(column.name, "Ghosted");
        assert_eq!(column.id, "ghosted");
        assert_eq!(dashboard.columns.len(), 5);
    }

    #[test]
    fn projection_conserves_every_record() {
        let statuses = ["applied", "interview", "offered", "rejected", "ghosted", ""];
        let records: Vec<_> = (0..60)
            .map(|i| record(i, statuses[i as usize % statuses.len()]))
            .collect();
        let dashboard = project(&records);
        assert_eq!(dashboard.task_count(), records.len());
        for r in &records {
            let loc = dashboard.find(&r.id.to_string()).expect("task present");
            assert_eq!(loc.column, effective_status(&r.status));
        }
    }

    #[test]
    fn projection_is_deterministic() {
        let records = vec![record(1, "offered"), record(2, "x"), record(3, "applied")];
        assert_eq!(project(&records), project(&records));
        let a = serde_json::to_string(&project(&records)).unwrap();
        let b = serde_json::to_string(&project(&records)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn move_across_columns() {
        let mut dashboard = project(&[record(1, "applied"), record(2, "applied")]);
        let moved = dashboard
            .move_task(&Location::new("applied", 0), &Location::new("interview", 0))
            .unwrap();
        assert_eq!(moved.id, "1");
        assert_eq!(dashboard.task_ids("applied"), vec!["2"]);
        assert_eq!(dashboard.task_ids("interview"), vec!["1"]);
    }

    #[test]
    fn reorder_within_column() {
        let mut dashboard = project(&[record(1, "applied"), record(2, "applied"), record(3, "applied")]);
        dashboard
            .move_task(&Location::new("applied", 0), &Location::new("applied", 2))
            .unwrap();
        assert_eq!(dashboard.task_ids("applied"), vec!["2", "3", "1"]);
    }

    #[test]
    fn move_rejects_bad_indices() {
        let mut dashboard = project(&[record(1, "applied")]);
        let err = dashboard
            .move_task(&Location::new("applied", 5), &Location::new("interview", 0))
            .unwrap_err();
        assert!(matches!(err, BoardError::IndexOutOfRange { .. }));

        let err = dashboard
            .move_task(&Location::new("applied", 0), &Location::new("interview", 3))
            .unwrap_err();
        assert!(matches!(err, BoardError::IndexOutOfRange { .. }));
        assert_eq!(dashboard.task_ids("applied"), vec!["1"]);
    }

    #[test]
    fn move_from_unknown_column_fails() {
        let mut dashboard = Dashboard::empty();
        let err = dashboard
            .move_task(&Location::new("nowhere", 0), &Location::new("applied", 0))
            .unwrap_err();
        assert_eq!(err, BoardError::UnknownColumn("nowhere".into()));
    }

    #[test]
    fn insert_clamps_and_rejects_duplicates() {
        let mut dashboard = Dashboard::empty();
        assert_eq!(dashboard.insert_task("applied", Some(10), task("a")).unwrap(), 0);
        assert_eq!(dashboard.insert_task("applied", Some(0), task("b")).unwrap(), 0);
        assert_eq!(dashboard.task_ids("applied"), vec!["b", "a"]);
        assert_eq!(
            dashboard.insert_task("offered", None, task("a")).unwrap_err(),
            BoardError::DuplicateTask("a".into())
        );
    }

    #[test]
    fn replace_keeps_slot_or_relocates() {
        let mut dashboard = project(&[record(1, "applied"), record(2, "applied")]);
        let mut edited = dashboard.task("1").cloned().unwrap();
        edited.content = "Staff Engineer".into();
        let loc = dashboard.replace_task(edited.clone(), "applied").unwrap();
        assert_eq!(loc, Location::new("applied", 0));
        assert_eq!(dashboard.task("1").unwrap().content, "Staff Engineer");

        let loc = dashboard.replace_task(edited, "offered").unwrap();
        assert_eq!(loc, Location::new("offered", 0));
        assert_eq!(dashboard.task_ids("applied"), vec!["2"]);
        assert_eq!(dashboard.task_count(), 2);
    }

    #[test]
    fn rename_task_keeps_position() {
        let mut dashboard = Dashboard::empty();
        dashboard.insert_task("applied", None, task("local-1")).unwrap();
        dashboard.insert_task("applied", None, task("9")).unwrap();
        dashboard.rename_task("local-1", "10").unwrap();
        assert_eq!(dashboard.task_ids("applied"), vec!["10", "9"]);
        assert!(dashboard.rename_task("10", "9").is_err());
    }

    #[test]
    fn dashboard_round_trips_through_json_shape() {
        let dashboard = project(&[record(1, "interview")]);
        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["interview"]["id"], "interview");
        assert_eq!(json["interview"]["name"], "Interview");
        assert_eq!(json["interview"]["tasks"][0]["id"], "1");
        let back: Dashboard = serde_json::from_value(json).unwrap();
        assert_eq!(back, dashboard);
    }
}
