use crate::collection::{Membership, ALL_FOLDER_ID};
use crate::database::Database;
use crate::error::WaxPulseError;
use crate::prices::Observation;
use crate::releases::Release;

// Sell-score weights. The mix of raw wants, a percentage, and a raw price
// is inherited policy, tunable but kept for compatibility with existing
// rankings.
const SELL_WEIGHT_WANTS: f64 = 0.4;
const SELL_WEIGHT_CHANGE: f64 = 0.3;
const SELL_WEIGHT_PRICE: f64 = 0.3;

/// Price movement between the two most recent observations of a release.
#[derive(Debug, Clone)]
pub struct PriceTrend {
    pub release: Release,
    pub current_price: f64,
    pub previous_price: f64,
    pub price_change: f64,
    pub percentage_change: f64,
    pub wants_count: i64,
}

/// Interest-per-cost ranking entry: want count divided by current price.
#[derive(Debug, Clone)]
pub struct DemandEntry {
    pub release: Release,
    pub wants_count: i64,
    pub price: f64,
    pub demand_score: f64,
}

/// Composite-scored sell recommendation.
#[derive(Debug, Clone)]
pub struct SellCandidate {
    pub release: Release,
    pub wants_count: i64,
    pub price: f64,
    pub percentage_change: f64,
    pub sell_score: f64,
}

#[derive(Debug, Clone)]
pub struct ValueSummary {
    pub total_value: f64,
    pub priced_releases: usize,
    pub total_releases: usize,
    pub mean_price: f64,
    pub most_valuable: Vec<(Release, f64)>,
}

#[derive(Debug, Clone)]
pub struct FormatValue {
    pub format: String,
    pub release_count: usize,
    pub total_value: f64,
}

/// Read-only queries over the accumulated observations. No method mutates
/// the store.
pub struct Analytics;

impl Analytics {
    /// Price trends from the two most recent observations per release.
    /// Releases with fewer than two observations, or a zero previous
    /// price, are excluded rather than dividing by zero. The increasing
    /// view (`include_all = false`) keeps changes of at least
    /// `min_change` percent; the all-changes view keeps everything.
    /// Both sort by change descending.
    pub fn price_trends(
        db: &Database,
        min_change: f64,
        include_all: bool,
        format: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<PriceTrend>, WaxPulseError> {
        let mut trends = Vec::new();

        for release in Release::all(db, None, format)? {
            let pair = Observation::latest_two(db, release.release_id())?;
            if pair.len() < 2 {
                continue;
            }
            let (latest, previous) = (&pair[0], &pair[1]);
            if previous.price() == 0.0 {
                continue;
            }

            let price_change = latest.price() - previous.price();
            let percentage_change = price_change / previous.price() * 100.0;

            if !include_all && percentage_change < min_change {
                continue;
            }

            trends.push(PriceTrend {
                wants_count: latest.wants_count(),
                current_price: latest.price(),
                previous_price: previous.price(),
                price_change,
                percentage_change,
                release,
            });
        }

        trends.sort_by(|a, b| {
            b.percentage_change
                .partial_cmp(&a.percentage_change)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        truncate(&mut trends, limit);
        Ok(trends)
    }

    /// Demand ranking: latest want count divided by latest price. A zero
    /// price makes the ratio undefined, so those releases are excluded.
    /// Restricted to the canonical "All" folder so copies filed in other
    /// folders aren't counted twice.
    pub fn demand(
        db: &Database,
        min_wants: i64,
        format: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<DemandEntry>, WaxPulseError> {
        let mut entries = Vec::new();

        for release in Release::all(db, None, format)? {
            if !Membership::release_in_folder(db, release.release_id(), ALL_FOLDER_ID)? {
                continue;
            }
            let latest = match Observation::latest_for_release(db, release.release_id())? {
                Some(obs) => obs,
                None => continue,
            };
            if latest.wants_count() < min_wants || latest.price() <= 0.0 {
                continue;
            }

            entries.push(DemandEntry {
                wants_count: latest.wants_count(),
                price: latest.price(),
                demand_score: latest.wants_count() as f64 / latest.price(),
                release,
            });
        }

        entries.sort_by(|a, b| {
            b.demand_score
                .partial_cmp(&a.demand_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        truncate(&mut entries, limit);
        Ok(entries)
    }

    /// Sell candidates ranked by the weighted composite of want count,
    /// recent percentage change (0 without a previous observation), and
    /// current price.
    pub fn sell_candidates(
        db: &Database,
        min_wants: i64,
        format: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SellCandidate>, WaxPulseError> {
        let mut candidates = Vec::new();

        for release in Release::all(db, None, format)? {
            if !Membership::release_in_folder(db, release.release_id(), ALL_FOLDER_ID)? {
                continue;
            }
            let pair = Observation::latest_two(db, release.release_id())?;
            let latest = match pair.first() {
                Some(obs) => obs,
                None => continue,
            };
            if latest.wants_count() < min_wants {
                continue;
            }

            let percentage_change = match pair.get(1) {
                Some(previous) if previous.price() != 0.0 => {
                    (latest.price() - previous.price()) / previous.price() * 100.0
                }
                _ => 0.0,
            };

            let sell_score = SELL_WEIGHT_WANTS * latest.wants_count() as f64
                + SELL_WEIGHT_CHANGE * percentage_change
                + SELL_WEIGHT_PRICE * latest.price();

            candidates.push(SellCandidate {
                wants_count: latest.wants_count(),
                price: latest.price(),
                percentage_change,
                sell_score,
                release,
            });
        }

        candidates.sort_by(|a, b| {
            b.sell_score
                .partial_cmp(&a.sell_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        truncate(&mut candidates, limit);
        Ok(candidates)
    }

    /// Collection value from each collected release's latest observation.
    pub fn collection_value(
        db: &Database,
        top: usize,
        format: Option<&str>,
    ) -> Result<ValueSummary, WaxPulseError> {
        let mut priced = Vec::new();
        let mut total_releases = 0;

        for release in Release::all(db, None, format)? {
            if !Membership::release_in_folder(db, release.release_id(), ALL_FOLDER_ID)? {
                continue;
            }
            total_releases += 1;
            if let Some(latest) = Observation::latest_for_release(db, release.release_id())? {
                priced.push((release, latest.price()));
            }
        }

        let total_value: f64 = priced.iter().map(|(_, price)| price).sum();
        let priced_releases = priced.len();
        let mean_price = if priced_releases > 0 {
            total_value / priced_releases as f64
        } else {
            0.0
        };

        priced.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        priced.truncate(top);

        Ok(ValueSummary {
            total_value,
            priced_releases,
            total_releases,
            mean_price,
            most_valuable: priced,
        })
    }

    /// Per-format value breakdown, largest total first.
    pub fn value_by_format(db: &Database) -> Result<Vec<FormatValue>, WaxPulseError> {
        use std::collections::HashMap;

        let mut by_format: HashMap<String, (usize, f64)> = HashMap::new();

        for release in Release::all(db, None, None)? {
            if !Membership::release_in_folder(db, release.release_id(), ALL_FOLDER_ID)? {
                continue;
            }
            if let Some(latest) = Observation::latest_for_release(db, release.release_id())? {
                let format = release.format().unwrap_or("Unknown").to_string();
                let entry = by_format.entry(format).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += latest.price();
            }
        }

        let mut breakdown: Vec<FormatValue> = by_format
            .into_iter()
            .map(|(format, (release_count, total_value))| FormatValue {
                format,
                release_count,
                total_value,
            })
            .collect();

        breakdown.sort_by(|a, b| {
            b.total_value
                .partial_cmp(&a.total_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(breakdown)
    }
}

fn truncate<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
}
