//! Time-and-progress classification.
//!
//! Everything here is a pure function of `(records, now)`. The ticker calls
//! [`classify`] on every tick; nothing is fetched and no record is mutated.

use crate::campaign::{Bucket, CampaignRecord, ClassifiedCampaign};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// `max(0, deadline - now)`.
pub fn seconds_remaining(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now)
}

/// Ended iff time is up or the goal has been reached. A zero goal is always
/// reached. The ledger's `is_active` flag is not consulted.
pub fn bucket_for(record: &CampaignRecord, seconds_remaining: u64) -> Bucket {
    if seconds_remaining == 0 || record.raised_amount >= record.goal {
        Bucket::Ended
    } else {
        Bucket::Active
    }
}

pub fn classify(records: &[CampaignRecord], now: u64) -> Vec<ClassifiedCampaign> {
    records
        .iter()
        .map(|record| {
            let seconds_remaining = seconds_remaining(record.deadline, now);
            ClassifiedCampaign {
                bucket: bucket_for(record, seconds_remaining),
                seconds_remaining,
                record: record.clone(),
            }
        })
        .collect()
}

/// Active and Ended campaigns, each in ascending-id (load) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    pub active: Vec<ClassifiedCampaign>,
    pub ended: Vec<ClassifiedCampaign>,
}

pub fn partition(classified: Vec<ClassifiedCampaign>) -> Buckets {
    let (active, ended) = classified
        .into_iter()
        .partition(|c| c.bucket == Bucket::Active);
    Buckets { active, ended }
}

/// Coarsest-unit countdown label. Always floors.
///
/// `90061` → `"1d 1h"`, `3700` → `"1h 1m"`, `61` → `"1m 1s"`, `0` → `"Ended"`.
pub fn format_time_left(seconds: u64) -> String {
    if seconds == 0 {
        return "Ended".to_string();
    }
    let days = seconds / DAY;
    let hours = (seconds % DAY) / HOUR;
    let minutes = (seconds % HOUR) / MINUTE;
    let secs = seconds % MINUTE;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
