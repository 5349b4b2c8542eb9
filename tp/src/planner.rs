//! Planner state
//!
//! The in-memory authoritative model: members in display order, the status
//! grid, and the week cursor. Mutations here are pure in-memory updates;
//! persistence and sync are sequenced by the session.

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::codec::{self, Status};
use crate::domain::{Member, Snapshot, StatusGrid};
use crate::error::ValidationError;
use crate::week::{DayColumn, WeekDirection, WeekWindow};

/// Result of removing a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub member: Member,
    /// Number of grid entries pruned with the member
    pub pruned: usize,
}

/// One member's row in the rendered week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekRow {
    pub member: Member,
    /// One cell per day, Sunday first
    pub cells: Vec<Option<Status>>,
}

/// Render-ready projection of the current week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub columns: Vec<DayColumn>,
    pub rows: Vec<WeekRow>,
}

/// Household planner model
#[derive(Debug, Clone)]
pub struct Planner {
    members: Vec<Member>,
    grid: StatusGrid,
    week: WeekWindow,
}

impl Planner {
    /// Empty planner showing the current week
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), StatusGrid::new(), WeekWindow::current())
    }

    pub fn from_parts(members: Vec<Member>, grid: StatusGrid, week: WeekWindow) -> Self {
        debug!(members = members.len(), entries = grid.len(), "Planner::from_parts: called");
        Self { members, grid, week }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn grid(&self) -> &StatusGrid {
        &self.grid
    }

    pub fn week(&self) -> WeekWindow {
        self.week
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&Member> {
        let name = name.trim();
        self.members.iter().find(|m| m.name == name)
    }

    /// Look a member up by exact id, falling back to exact name
    pub fn find_member(&self, id_or_name: &str) -> Option<&Member> {
        self.member(id_or_name).or_else(|| self.member_by_name(id_or_name))
    }

    pub fn status_of(&self, member_id: &str, date: NaiveDate) -> Option<Status> {
        self.grid.get(&codec::make_key(member_id, date)).copied()
    }

    /// Append a member with a fresh id
    ///
    /// The name is trimmed; uniqueness is case-sensitive.
    pub fn add_member(&mut self, name: &str) -> Result<Member, ValidationError> {
        debug!(%name, "add_member: called");
        let name = name.trim();
        if name.is_empty() {
            debug!("add_member: empty name");
            return Err(ValidationError::EmptyName);
        }
        if self.members.iter().any(|m| m.name == name) {
            debug!(%name, "add_member: duplicate name");
            return Err(ValidationError::DuplicateName(name.to_string()));
        }

        let mut member = Member::new(name);
        while self.member(&member.id).is_some() {
            member.id = crate::domain::generate_member_id();
        }
        info!(id = %member.id, name = %member.name, "Member added");
        self.members.push(member.clone());
        Ok(member)
    }

    /// Remove a member and every grid entry keyed by its id
    ///
    /// Unknown ids are a no-op.
    pub fn remove_member(&mut self, id: &str) -> Option<Removal> {
        debug!(%id, "remove_member: called");
        let index = self.members.iter().position(|m| m.id == id)?;
        let member = self.members.remove(index);

        let prefix = codec::member_prefix(id);
        let before = self.grid.len();
        self.grid.retain(|key, _| !key.starts_with(&prefix));
        let pruned = before - self.grid.len();

        info!(%id, name = %member.name, pruned, "Member removed");
        Some(Removal { member, pruned })
    }

    /// Advance one cell through the status cycle, returning its new value
    ///
    /// Any member id is accepted; entries for removed members never render.
    pub fn set_status(&mut self, member_id: &str, date: NaiveDate) -> Option<Status> {
        let key = codec::make_key(member_id, date);
        let next = codec::next_status(self.grid.get(&key).copied());
        debug!(%key, ?next, "set_status: called");
        match next {
            Some(status) => {
                self.grid.insert(key, status);
            }
            None => {
                self.grid.remove(&key);
            }
        }
        next
    }

    /// Move the week cursor, returning the new Sunday
    pub fn set_week(&mut self, direction: WeekDirection) -> NaiveDate {
        self.week.shift(direction);
        debug!(start = %self.week.start(), "set_week: moved");
        self.week.start()
    }

    /// Jump the week cursor to the week containing `date`
    pub fn show_week_of(&mut self, date: NaiveDate) -> NaiveDate {
        self.week = WeekWindow::containing(date);
        self.week.start()
    }

    /// Full snapshot stamped with the current time
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            members: self.members.clone(),
            status_grid: self.grid.clone(),
            last_update: Utc::now(),
        }
    }

    /// Overwrite members and grid wholesale; the week cursor is untouched
    pub fn replace_from(&mut self, snapshot: Snapshot) {
        debug!(
            members = snapshot.members.len(),
            entries = snapshot.status_grid.len(),
            "replace_from: called"
        );
        self.members = snapshot.members;
        self.grid = snapshot.status_grid;
    }

    /// Project the current week for rendering
    pub fn week_view(&self, today: NaiveDate) -> WeekView {
        let columns = self.week.columns(today);
        let rows = self
            .members
            .iter()
            .map(|member| WeekRow {
                member: member.clone(),
                cells: columns.iter().map(|c| self.status_of(&member.id, c.date)).collect(),
            })
            .collect();
        WeekView {
            week_start: self.week.start(),
            columns,
            rows,
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(raw: &str) -> NaiveDate {
        codec::parse_iso_date(raw).unwrap()
    }

    fn planner_on(day: &str) -> Planner {
        Planner::from_parts(Vec::new(), StatusGrid::new(), WeekWindow::containing(date(day)))
    }

    #[test]
    fn test_add_member_trims_and_appends() {
        let mut planner = Planner::new();
        let mom = planner.add_member("  Mom ").unwrap();
        let dad = planner.add_member("Dad").unwrap();
        assert_eq!(mom.name, "Mom");
        assert_ne!(mom.id, dad.id);
        let names: Vec<_> = planner.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Mom", "Dad"]);
    }

    #[test]
    fn test_add_member_rejects_empty() {
        let mut planner = Planner::new();
        assert_eq!(planner.add_member("   "), Err(ValidationError::EmptyName));
        assert!(planner.members().is_empty());
    }

    #[test]
    fn test_add_member_uniqueness_is_case_sensitive() {
        let mut planner = Planner::new();
        planner.add_member("Mom").unwrap();
        planner.add_member("mom").unwrap();
        assert_eq!(
            planner.add_member(" Mom"),
            Err(ValidationError::DuplicateName("Mom".to_string()))
        );
        assert_eq!(planner.members().len(), 2);
    }

    #[test]
    fn test_remove_member_prunes_only_its_entries() {
        let mut planner = planner_on("2024-01-07");
        let mom = planner.add_member("Mom").unwrap();
        let dad = planner.add_member("Dad").unwrap();
        planner.set_status(&mom.id, date("2024-01-07"));
        planner.set_status(&mom.id, date("2024-01-08"));
        planner.set_status(&dad.id, date("2024-01-07"));

        let removal = planner.remove_member(&mom.id).unwrap();
        assert_eq!(removal.member, mom);
        assert_eq!(removal.pruned, 2);
        assert_eq!(planner.members(), &[dad.clone()]);
        assert_eq!(planner.grid().len(), 1);
        assert_eq!(planner.status_of(&dad.id, date("2024-01-07")), Some(Status::Eating));
    }

    #[test]
    fn test_remove_unknown_member_is_noop() {
        let mut planner = Planner::new();
        planner.add_member("Mom").unwrap();
        planner.set_status("ghost", date("2024-01-07"));
        assert!(planner.remove_member("ghost").is_none());
        assert_eq!(planner.members().len(), 1);
        assert_eq!(planner.grid().len(), 1);
    }

    #[test]
    fn test_set_status_full_cycle() {
        let mut planner = Planner::new();
        let day = date("2024-01-07");
        assert_eq!(planner.set_status("m1", day), Some(Status::Eating));
        assert_eq!(planner.grid().get("m1_2024-01-07"), Some(&Status::Eating));
        assert_eq!(planner.set_status("m1", day), Some(Status::NotEating));
        assert_eq!(planner.set_status("m1", day), Some(Status::Undecided));
        assert_eq!(planner.set_status("m1", day), None);
        assert!(planner.grid().is_empty());
    }

    #[test]
    fn test_set_week_round_trip() {
        let mut planner = planner_on("2024-01-10");
        let start = planner.week().start();
        assert_eq!(planner.set_week(WeekDirection::Previous), date("2023-12-31"));
        assert_eq!(planner.set_week(WeekDirection::Next), start);
    }

    #[test]
    fn test_replace_from_keeps_week() {
        let mut planner = planner_on("2024-01-10");
        planner.add_member("Mom").unwrap();
        let week = planner.week();
        planner.replace_from(Snapshot {
            members: vec![Member::with_id("r1", "Remote")],
            status_grid: StatusGrid::new(),
            last_update: Utc::now(),
        });
        assert_eq!(planner.members(), &[Member::with_id("r1", "Remote")]);
        assert_eq!(planner.week(), week);
    }

    #[test]
    fn test_week_view_rows_follow_member_order() {
        let mut planner = planner_on("2024-01-10");
        let mom = planner.add_member("Mom").unwrap();
        let dad = planner.add_member("Dad").unwrap();
        planner.set_status(&dad.id, date("2024-01-13"));
        // Outside the window
        planner.set_status(&mom.id, date("2024-01-14"));

        let view = planner.week_view(date("2024-01-10"));
        assert_eq!(view.week_start, date("2024-01-07"));
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].member, mom);
        assert!(view.rows[0].cells.iter().all(Option::is_none));
        assert_eq!(view.rows[1].cells[6], Some(Status::Eating));
    }

    #[test]
    fn test_find_member_by_id_or_name() {
        let mut planner = Planner::new();
        let mom = planner.add_member("Mom").unwrap();
        assert_eq!(planner.find_member(&mom.id), Some(&mom));
        assert_eq!(planner.find_member("Mom"), Some(&mom));
        assert!(planner.find_member("Dad").is_none());
    }

    proptest! {
        #[test]
        fn prop_duplicate_add_rejected(name in "[A-Za-z][A-Za-z ]{0,12}", pad in " {0,3}") {
            let mut planner = Planner::new();
            planner.add_member(&name).unwrap();
            let count = planner.members().len();
            let padded = format!("{pad}{name}{pad}");
            prop_assert!(planner.add_member(&padded).is_err());
            prop_assert_eq!(planner.members().len(), count);
        }

        #[test]
        fn prop_four_taps_restore_grid(taps in proptest::collection::vec((0usize..3, 0u64..10), 0..20), target in (0usize..3, 0u64..10)) {
            let ids = ["a", "b", "c"];
            let base = date("2024-01-07");
            let mut planner = Planner::new();
            for (who, offset) in taps {
                planner.set_status(ids[who], base + chrono::Days::new(offset));
            }
            let before = planner.grid().clone();
            for _ in 0..4 {
                planner.set_status(ids[target.0], base + chrono::Days::new(target.1));
            }
            prop_assert_eq!(planner.grid(), &before);
        }

        #[test]
        fn prop_remove_prunes_exact_prefix(marks in proptest::collection::vec((0usize..3, 0u64..10), 0..30), victim in 0usize..3) {
            let mut planner = Planner::new();
            let members: Vec<Member> = ["Mom", "Dad", "Kid"].iter().map(|n| planner.add_member(n).unwrap()).collect();
            let base = date("2024-01-07");
            for (who, offset) in marks {
                planner.set_status(&members[who].id, base + chrono::Days::new(offset));
            }
            let prefix = codec::member_prefix(&members[victim].id);
            let expected: StatusGrid = planner
                .grid()
                .iter()
                .filter(|(k, _)| !k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            planner.remove_member(&members[victim].id);
            prop_assert_eq!(planner.grid(), &expected);
        }
    }
}
