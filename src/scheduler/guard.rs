use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::declare::LogicalIndex;

pub const WORKING_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// When one index publishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSlot {
    pub index: LogicalIndex,
    /// Local time of day, matched to the minute.
    pub time: NaiveTime,
    /// Nominal trading weekdays.
    pub weekdays: Vec<Weekday>,
    /// The slot lands after midnight of the session it reports on.
    pub rollover: bool,
    /// Before this hour a rolled-over slot belongs to the previous date.
    pub cutoff_hour: u32,
}

impl ScheduleSlot {
    /// Weekdays the slot may fire on. A rollover slot also fires on the day
    /// after its last nominal weekday (Saturday for a Mon-Fri market).
    pub fn allowed_weekdays(&self) -> Vec<Weekday> {
        let mut days = self.weekdays.clone();
        if self.rollover {
            if let Some(last) = self
                .weekdays
                .iter()
                .max_by_key(|d| d.num_days_from_monday())
            {
                let next = last.succ();
                if !days.contains(&next) {
                    days.push(next);
                }
            }
        }
        days
    }

    /// The slot's minute has come on an allowed weekday.
    pub fn is_due(&self, now: &DateTime<FixedOffset>) -> bool {
        now.hour() == self.time.hour()
            && now.minute() == self.time.minute()
            && self.allowed_weekdays().contains(&now.weekday())
    }

    /// The trading date a message published at `now` reports on.
    pub fn session_date(&self, now: &DateTime<FixedOffset>) -> NaiveDate {
        let today = now.date_naive();
        if self.rollover && now.hour() < self.cutoff_hour {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        }
    }

    pub fn run_key(&self, now: &DateTime<FixedOffset>) -> RunKey {
        RunKey {
            index: self.index,
            date: now.date_naive(),
            slot: self.time,
        }
    }
}

/// Identifies one slot's execution on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub index: LogicalIndex,
    pub date: NaiveDate,
    pub slot: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Due,
    Dispatched,
}

#[derive(Default)]
struct GuardState {
    ran: HashSet<RunKey>,
    in_flight: HashSet<LogicalIndex>,
}

/// Decides which slots fire and remembers which already did.
///
/// One guard lives for the whole polling process; its memory is lost on
/// restart.
pub struct ScheduleGuard {
    slots: BTreeMap<LogicalIndex, ScheduleSlot>,
    state: Mutex<GuardState>,
}

impl ScheduleGuard {
    pub fn new(slots: impl IntoIterator<Item = ScheduleSlot>) -> Self {
        ScheduleGuard {
            slots: slots.into_iter().map(|s| (s.index, s)).collect(),
            state: Mutex::new(GuardState::default()),
        }
    }

    pub fn slot(&self, index: LogicalIndex) -> Option<&ScheduleSlot> {
        self.slots.get(&index)
    }

    /// Checks whether `index` should run now and, if so, marks its run key
    /// and flags it in flight in the same critical section. Only the first
    /// caller for a key gets `true`.
    pub fn should_run(&self, index: LogicalIndex, now: &DateTime<FixedOffset>) -> bool {
        let Some(slot) = self.slots.get(&index) else {
            return false;
        };

        if !slot.is_due(now) {
            return false;
        }

        let key = slot.run_key(now);
        let mut state = self.lock();
        if state.ran.contains(&key) || state.in_flight.contains(&index) {
            return false;
        }

        state.ran.insert(key);
        state.in_flight.insert(index);
        true
    }

    pub fn mark_ran(&self, key: RunKey) {
        self.lock().ran.insert(key);
    }

    pub fn has_run(&self, key: &RunKey) -> bool {
        self.lock().ran.contains(key)
    }

    /// Returns a dispatched index to `Idle`.
    pub fn finish(&self, index: LogicalIndex) {
        self.lock().in_flight.remove(&index);
    }

    pub fn state_of(&self, index: LogicalIndex, now: &DateTime<FixedOffset>) -> SlotState {
        let Some(slot) = self.slots.get(&index) else {
            return SlotState::Idle;
        };

        let state = self.lock();
        if state.in_flight.contains(&index) {
            SlotState::Dispatched
        } else if slot.is_due(now) && !state.ran.contains(&slot.run_key(now)) {
            SlotState::Due
        } else {
            SlotState::Idle
        }
    }

    /// Every index that became due at `now`, each already marked as run.
    pub fn due_indices(&self, now: &DateTime<FixedOffset>) -> Vec<LogicalIndex> {
        self.slots
            .keys()
            .copied()
            .filter(|index| self.should_run(*index, now))
            .collect()
    }

    /// Drops run keys from before `date`.
    pub fn forget_before(&self, date: NaiveDate) {
        self.lock().ran.retain(|key| key.date >= date);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
