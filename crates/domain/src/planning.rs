//! Planning labels for queued records
//!
//! The labels are for operators reading the queue. They never influence the
//! order in which records are posted.

use time::Date;

/// Records sharing one calendar day
pub const RECORDS_PER_DAY: usize = 2;

/// Produce `count` labels starting at `start`, two per day
///
/// Labels look like `2024-12-20-1`, `2024-12-20-2`, `2024-12-21-1`, ...
pub fn pair_date_labels(start: Date, count: usize) -> Vec<String> {
    let mut labels = Vec::with_capacity(count);
    let mut day = start;

    for index in 0..count {
        let slot = index % RECORDS_PER_DAY;
        if index > 0 && slot == 0 {
            day = match day.next_day() {
                Some(next) => next,
                None => break,
            };
        }
        labels.push(format!("{}-{}", day, slot + 1));
    }

    labels
}
