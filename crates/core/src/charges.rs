//! Charge reporting over settled usage debits.
//!
//! `aggregate_by_day` groups charges by calendar day, stream and profile.
//! `monthly_chart` spreads those rows over the days of a month, split into
//! live and on-demand totals.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::types::Transaction;

/// Charges for one stream and profile on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCharge {
    pub date: NaiveDate,
    pub stream_id: String,
    pub stream_name: Option<String>,
    pub stream_is_live: bool,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    /// Total streamed seconds.
    pub duration_secs: i64,
    /// Average profile cost in major units, when any row carries one.
    pub cost: Option<Decimal>,
    /// Sum of charged amounts in minor units.
    pub total_cost: i64,
}

/// Live and on-demand totals for one day of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub day: NaiveDate,
    /// Minor units charged for live streams.
    pub live: i64,
    /// Minor units charged for on-demand streams.
    pub vod: i64,
}

type GroupKey = (
    NaiveDate,
    String,
    Option<String>,
    bool,
    Option<String>,
    Option<String>,
);

#[derive(Default)]
struct Group {
    duration_secs: i64,
    cost_sum: Decimal,
    cost_count: u32,
    total_cost: i64,
}

/// Groups usage charges by day, stream and profile, newest day first.
///
/// Transactions without usage details are ignored.
#[must_use]
pub fn aggregate_by_day(transactions: &[Transaction]) -> Vec<DailyCharge> {
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();

    for tx in transactions {
        let Some(usage) = &tx.usage else {
            continue;
        };
        let key = (
            tx.created_at.date_naive(),
            usage.stream_id.clone(),
            usage.stream_name.clone(),
            usage.stream_is_live,
            usage.profile_id.clone(),
            usage.profile_name.clone(),
        );

        let group = groups.entry(key).or_default();
        group.duration_secs += usage.duration_secs;
        group.total_cost += tx.amount;
        if let Some(cost) = usage.profile_cost {
            group.cost_sum += cost;
            group.cost_count += 1;
        }
    }

    let mut rows: Vec<DailyCharge> = groups
        .into_iter()
        .map(
            |((date, stream_id, stream_name, stream_is_live, profile_id, profile_name), group)| {
                DailyCharge {
                    date,
                    stream_id,
                    stream_name,
                    stream_is_live,
                    profile_id,
                    profile_name,
                    duration_secs: group.duration_secs,
                    cost: (group.cost_count > 0)
                        .then(|| group.cost_sum / Decimal::from(group.cost_count)),
                    total_cost: group.total_cost,
                }
            },
        )
        .collect();

    rows.sort_by(|a, b| b.date.cmp(&a.date));
    rows
}

/// One point per day of `today`'s month with live and on-demand totals.
#[must_use]
pub fn monthly_chart(charges: &[DailyCharge], today: NaiveDate) -> Vec<ChartPoint> {
    let first = today.with_day(1).unwrap_or(today);

    first
        .iter_days()
        .take_while(|day| day.month() == first.month())
        .map(|day| {
            let (live, vod) = charges
                .iter()
                .filter(|charge| charge.date == day)
                .fold((0, 0), |(live, vod), charge| {
                    if charge.stream_is_live {
                        (live + charge.total_cost, vod)
                    } else {
                        (live, vod + charge.total_cost)
                    }
                });
            ChartPoint { day, live, vod }
        })
        .collect()
}
