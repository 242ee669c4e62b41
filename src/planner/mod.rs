//! Stress-aware planner: allocates active tasks into free windows of one
//! day, with a feasibility verdict.
//!
//! Pure over its input — no store, no calendar, no clock. Scoring and
//! placement are stable with respect to input order; ties break by task id.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::config::{parse_hhmm, PlannerConfig};
use crate::types::{CalendarBlock, FeasibilityState, LockLevel, Task};

/// Smallest chunk worth placing, in minutes.
const MIN_CHUNK_MINUTES: i64 = 25;
/// Floor on per-task demand, in minutes.
const MIN_DEMAND_MINUTES: i64 = 30;

/// Everything the planner needs for one day.
#[derive(Debug, Clone)]
pub struct PlannerInput {
    /// The day being planned.
    pub date: NaiveDate,
    /// Active tasks, any order.
    pub tasks: Vec<Task>,
    /// Blocks already on the calendar for this day (managed and not).
    pub existing_blocks: Vec<CalendarBlock>,
    /// Window and pacing constraints.
    pub constraints: PlannerConfig,
    /// Revision the produced blocks will carry.
    pub plan_revision: i64,
    /// Calendar the produced blocks target.
    pub calendar_name: String,
}

/// The planner's output for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    /// Blocks to place, in start order. Empty when infeasible.
    pub blocks: Vec<CalendarBlock>,
    /// Day-level verdict.
    pub feasibility: FeasibilityState,
    /// Tasks whose demand did not fully fit, in score order.
    pub unscheduled_task_ids: Vec<String>,
}

/// Plan one day.
pub fn plan(input: &PlannerInput) -> PlanOutcome {
    let windows = free_windows(input);
    let available: i64 = windows.iter().map(Window::minutes).sum::<i64>()
        .saturating_sub(input.constraints.free_space_buffer_minutes)
        .max(0);

    let mut scored: Vec<(&Task, i64)> = input
        .tasks
        .iter()
        .map(|task| (task, daily_demand(task, input.date)))
        .collect();
    scored.sort_by(|(a, _), (b, _)| {
        score(b, input.date)
            .partial_cmp(&score(a, input.date))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let required: i64 = scored.iter().map(|(_, demand)| *demand).sum();

    if required > available {
        return PlanOutcome {
            blocks: Vec::new(),
            feasibility: FeasibilityState::Infeasible,
            unscheduled_task_ids: scored.iter().map(|(t, _)| t.task_id.clone()).collect(),
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let at_risk = required as f64 > 0.9 * available as f64;
    let feasibility = if at_risk {
        FeasibilityState::AtRisk
    } else {
        FeasibilityState::OnTrack
    };

    let (blocks, unscheduled) = place(&scored, windows, input);
    PlanOutcome {
        blocks,
        feasibility,
        unscheduled_task_ids: unscheduled,
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A contiguous free range within the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Window {
    fn minutes(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_minutes().max(0)
    }
}

/// Build the day's free windows: the workday span minus every block that is
/// locked or not managed by the agent, minus the configured sleep window.
fn free_windows(input: &PlannerInput) -> Vec<Window> {
    let date = input.date;
    let constraints = &input.constraints;

    let end_hour = constraints.workday_end_hour.min(constraints.avoid_after_hour);
    let Some(day_start) = at_hour(date, constraints.workday_start_hour) else {
        return Vec::new();
    };
    let Some(day_end) = at_hour(date, end_hour) else {
        return Vec::new();
    };
    if day_start >= day_end {
        return Vec::new();
    }

    let mut occupied: Vec<(NaiveDateTime, NaiveDateTime)> = input
        .existing_blocks
        .iter()
        .filter(|b| b.lock_level == LockLevel::Locked || !b.managed_by_agent)
        .map(|b| (b.start_local, b.end_local))
        .collect();
    occupied.extend(sleep_ranges(date, constraints));
    occupied.sort();

    let mut windows = vec![Window {
        start: day_start,
        end: day_end,
    }];
    for (busy_start, busy_end) in occupied {
        windows = windows
            .into_iter()
            .flat_map(|w| subtract(w, busy_start, busy_end))
            .collect();
    }
    windows.retain(|w| w.minutes() > 0);
    windows
}

/// Subtract one busy range from one window, yielding 0–2 remainders.
fn subtract(window: Window, busy_start: NaiveDateTime, busy_end: NaiveDateTime) -> Vec<Window> {
    if busy_end <= window.start || busy_start >= window.end {
        return vec![window];
    }
    let mut out = Vec::new();
    if busy_start > window.start {
        out.push(Window {
            start: window.start,
            end: busy_start,
        });
    }
    if busy_end < window.end {
        out.push(Window {
            start: busy_end,
            end: window.end,
        });
    }
    out
}

/// The sleep window as locked ranges clipped to this day.
///
/// A window whose start is later than its end crosses midnight and
/// contributes both an early-morning and a late-night range.
fn sleep_ranges(date: NaiveDate, constraints: &PlannerConfig) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let Ok((start_h, start_m)) = parse_hhmm(&constraints.sleep_start) else {
        return Vec::new();
    };
    let Ok((end_h, end_m)) = parse_hhmm(&constraints.sleep_end) else {
        return Vec::new();
    };
    let Some(start_t) = NaiveTime::from_hms_opt(start_h, start_m, 0) else {
        return Vec::new();
    };
    let Some(end_t) = NaiveTime::from_hms_opt(end_h, end_m, 0) else {
        return Vec::new();
    };

    let day_begin = date.and_time(NaiveTime::MIN);
    let Some(day_over) = date.succ_opt().map(|d| d.and_time(NaiveTime::MIN)) else {
        return Vec::new();
    };

    if start_t <= end_t {
        vec![(date.and_time(start_t), date.and_time(end_t))]
    } else {
        vec![
            (day_begin, date.and_time(end_t)),
            (date.and_time(start_t), day_over),
        ]
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    if hour >= 24 {
        return date.succ_opt().map(|d| d.and_time(NaiveTime::MIN));
    }
    date.and_hms_opt(hour, 0, 0)
}

// ---------------------------------------------------------------------------
// Demand and scoring
// ---------------------------------------------------------------------------

/// Minutes this task wants today:
/// `min(max(30, estimated), max(min_daily_effective, base_by_urgency))`.
///
/// The effective daily minimum is floored at the smallest placeable chunk,
/// so a task priced into the feasibility sum always reaches placement — a
/// sub-chunk demand would otherwise be counted in `required` yet skipped by
/// the placement loop and vanish from the output.
fn daily_demand(task: &Task, date: NaiveDate) -> i64 {
    let min_daily_effective = task.min_daily_minutes.max(MIN_CHUNK_MINUTES);
    let base_by_urgency = match days_until_due(task, date) {
        Some(days) if days <= 1 => 120,
        Some(days) if days <= 3 => 90,
        _ => min_daily_effective,
    };
    let capped_estimate = task.estimated_minutes.max(MIN_DEMAND_MINUTES);
    capped_estimate.min(min_daily_effective.max(base_by_urgency))
}

/// Days from the planning date to the deadline, floored at zero.
fn days_until_due(task: &Task, date: NaiveDate) -> Option<i64> {
    task.due_at_local
        .map(|due| due.date().signed_duration_since(date).num_days().max(0))
}

/// Descending placement score: urgency, priority, size, minus stress.
#[allow(clippy::cast_precision_loss)]
fn score(task: &Task, date: NaiveDate) -> f64 {
    let urgency = match days_until_due(task, date) {
        Some(days) => 200.0 / ((days as f64) + 1.0),
        None => 0.0,
    };
    urgency + 20.0 * (task.priority as f64) + 0.05 * (task.estimated_minutes as f64)
        - 10.0 * task.stress_weight
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Place tasks in score order, chunked, breaks between chunks, until demand
/// or the global deep-work cap runs out.
fn place(
    scored: &[(&Task, i64)],
    mut windows: Vec<Window>,
    input: &PlannerInput,
) -> (Vec<CalendarBlock>, Vec<String>) {
    let constraints = &input.constraints;
    let chunk_size = constraints.break_every_minutes.max(MIN_DEMAND_MINUTES);
    let mut cap_remaining = constraints.max_deep_work_minutes_per_day;
    let mut blocks = Vec::new();
    let mut unscheduled = Vec::new();

    for (task, demand) in scored {
        let mut remaining = *demand;
        if cap_remaining < MIN_CHUNK_MINUTES {
            // Cap exhausted: this and every lower-scored task goes
            // unscheduled wholesale.
            unscheduled.push(task.task_id.clone());
            continue;
        }

        while remaining >= MIN_CHUNK_MINUTES && cap_remaining >= MIN_CHUNK_MINUTES {
            let desired = chunk_size.min(remaining).min(cap_remaining);
            let Some(idx) = windows.iter().position(|w| w.minutes() >= MIN_CHUNK_MINUTES) else {
                break;
            };
            let window = windows[idx];
            let chunk = desired.min(window.minutes());
            if chunk < MIN_CHUNK_MINUTES {
                break;
            }

            let start = window.start;
            let Some(end) = start.checked_add_signed(chrono::Duration::minutes(chunk)) else {
                break;
            };
            blocks.push(CalendarBlock {
                block_id: Uuid::new_v4().to_string(),
                task_id: Some(task.task_id.clone()),
                title: task.title.clone(),
                start_local: start,
                end_local: end,
                calendar_event_id: None,
                calendar_name: input.calendar_name.clone(),
                managed_by_agent: true,
                lock_level: LockLevel::Flexible,
                plan_revision: input.plan_revision,
            });

            // The break after the chunk is consumed from the same window.
            let consumed = chunk.saturating_add(constraints.break_duration_minutes);
            let new_start = window
                .start
                .checked_add_signed(chrono::Duration::minutes(consumed))
                .unwrap_or(window.end);
            if new_start >= window.end {
                windows.remove(idx);
            } else {
                windows[idx].start = new_start;
            }

            remaining = remaining.saturating_sub(chunk);
            cap_remaining = cap_remaining.saturating_sub(chunk);
        }

        if remaining >= MIN_CHUNK_MINUTES {
            unscheduled.push(task.task_id.clone());
        }
    }

    (blocks, unscheduled)
}
