use std::io::{self, Stdout};

use chrono::DateTime;
use tablestream::{Column, Stream};

use crate::analytics::{
    Analytics, DemandEntry, FormatValue, PriceTrend, SellCandidate, ValueSummary,
};
use crate::database::Database;
use crate::error::WaxPulseError;
use crate::prices::Observation;
use crate::releases::Release;
use crate::schema::MigrationStatus;

pub struct Reports {
    // No fields
}

#[derive(Clone)]
struct ReleaseRow {
    release: Release,
    latest: Option<Observation>,
}

impl Reports {
    pub fn report_releases(
        db: &Database,
        search: Option<&str>,
        format: Option<&str>,
    ) -> Result<(), WaxPulseError> {
        let mut stream = Self::begin_releases_table();

        for release in Release::all(db, search, format)? {
            let latest = Observation::latest_for_release(db, release.release_id())?;
            stream.row(ReleaseRow { release, latest })?;
        }

        stream.finish()?;
        Ok(())
    }

    pub fn report_trends(trends: &[PriceTrend]) -> Result<(), WaxPulseError> {
        let mut stream = Self::begin_trends_table();
        for trend in trends {
            stream.row(trend.clone())?;
        }
        stream.finish()?;
        Ok(())
    }

    pub fn report_demand(entries: &[DemandEntry]) -> Result<(), WaxPulseError> {
        let mut stream = Self::begin_demand_table();
        for entry in entries {
            stream.row(entry.clone())?;
        }
        stream.finish()?;
        Ok(())
    }

    pub fn report_sell_candidates(candidates: &[SellCandidate]) -> Result<(), WaxPulseError> {
        let mut stream = Self::begin_sell_table();
        for candidate in candidates {
            stream.row(candidate.clone())?;
        }
        stream.finish()?;
        Ok(())
    }

    pub fn report_history(
        db: &Database,
        release_id: i64,
        window_days: i64,
    ) -> Result<(), WaxPulseError> {
        let release = Release::get_by_id(db, release_id)?
            .ok_or_else(|| WaxPulseError::Error(format!("Release {} not found", release_id)))?;
        let history = Observation::history_since(db, release_id, window_days)?;

        let title = format!(
            "{} - {} (last {} days)",
            release.artist(),
            release.title(),
            window_days
        );
        let mut stream = Self::begin_history_table(&title);
        for observation in history {
            stream.row(observation)?;
        }
        stream.finish()?;
        Ok(())
    }

    pub fn report_value(
        db: &Database,
        summary: &ValueSummary,
        with_formats: bool,
    ) -> Result<(), WaxPulseError> {
        let width = 60;
        Self::print_center(width, "Collection Value");
        Self::hr(width);
        println!("Total value:       {:>12.2}", summary.total_value);
        println!(
            "Priced releases:   {:>12} of {}",
            summary.priced_releases, summary.total_releases
        );
        println!("Mean price:        {:>12.2}", summary.mean_price);
        Self::hr(width);

        if !summary.most_valuable.is_empty() {
            let mut stream = Self::begin_value_table();
            for row in &summary.most_valuable {
                stream.row(row.clone())?;
            }
            stream.finish()?;
        }

        if with_formats {
            let breakdown = Analytics::value_by_format(db)?;
            let mut stream = Self::begin_formats_table();
            for row in breakdown {
                stream.row(row)?;
            }
            stream.finish()?;
        }

        Ok(())
    }

    pub fn report_migrations(statuses: &[MigrationStatus]) -> Result<(), WaxPulseError> {
        let mut stream = Self::begin_migrations_table();
        for status in statuses {
            stream.row(status.clone())?;
        }
        stream.finish()?;
        Ok(())
    }

    fn begin_releases_table() -> Stream<ReleaseRow, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, r: &ReleaseRow| write!(f, "{}", r.release.release_id())).header("ID").right().min_width(9),
            Column::new(|f, r: &ReleaseRow| write!(f, "{}", r.release.artist())).header("Artist").left().min_width(20),
            Column::new(|f, r: &ReleaseRow| write!(f, "{}", r.release.title())).header("Title").left().min_width(24),
            Column::new(|f, r: &ReleaseRow| write!(f, "{}", opt_i64_or_dash(r.release.year()))).header("Year").right().min_width(5),
            Column::new(|f, r: &ReleaseRow| write!(f, "{}", r.release.format().unwrap_or("-"))).header("Format").left().min_width(8),
            Column::new(|f, r: &ReleaseRow| match &r.latest {
                Some(obs) => write!(f, "{:.2} {}", obs.price(), obs.currency()),
                None => write!(f, "-"),
            }).header("Latest Price").right().min_width(12),
            Column::new(|f, r: &ReleaseRow| match &r.latest {
                Some(obs) => write!(f, "{}", obs.wants_count()),
                None => write!(f, "-"),
            }).header("Wants").right().min_width(6),
        ]).title("Releases").empty_row("No Releases")
    }

    fn begin_trends_table() -> Stream<PriceTrend, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, t: &PriceTrend| write!(f, "{}", t.release.artist())).header("Artist").left().min_width(20),
            Column::new(|f, t: &PriceTrend| write!(f, "{}", t.release.title())).header("Title").left().min_width(24),
            Column::new(|f, t: &PriceTrend| write!(f, "{:.2}", t.previous_price)).header("Previous").right().min_width(9),
            Column::new(|f, t: &PriceTrend| write!(f, "{:.2}", t.current_price)).header("Current").right().min_width(9),
            Column::new(|f, t: &PriceTrend| write!(f, "{:+.2}", t.price_change)).header("Change").right().min_width(8),
            Column::new(|f, t: &PriceTrend| write!(f, "{:+.1}%", t.percentage_change)).header("Change %").right().min_width(9),
            Column::new(|f, t: &PriceTrend| write!(f, "{}", t.wants_count)).header("Wants").right().min_width(6),
        ]).title("Price Trends").empty_row("No Trends")
    }

    fn begin_demand_table() -> Stream<DemandEntry, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, e: &DemandEntry| write!(f, "{}", e.release.artist())).header("Artist").left().min_width(20),
            Column::new(|f, e: &DemandEntry| write!(f, "{}", e.release.title())).header("Title").left().min_width(24),
            Column::new(|f, e: &DemandEntry| write!(f, "{}", e.wants_count)).header("Wants").right().min_width(7),
            Column::new(|f, e: &DemandEntry| write!(f, "{:.2}", e.price)).header("Price").right().min_width(8),
            Column::new(|f, e: &DemandEntry| write!(f, "{:.2}", e.demand_score)).header("Demand").right().min_width(8),
        ]).title("Demand").empty_row("No Entries")
    }

    fn begin_sell_table() -> Stream<SellCandidate, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, c: &SellCandidate| write!(f, "{}", c.release.artist())).header("Artist").left().min_width(20),
            Column::new(|f, c: &SellCandidate| write!(f, "{}", c.release.title())).header("Title").left().min_width(24),
            Column::new(|f, c: &SellCandidate| write!(f, "{}", c.wants_count)).header("Wants").right().min_width(7),
            Column::new(|f, c: &SellCandidate| write!(f, "{:.2}", c.price)).header("Price").right().min_width(8),
            Column::new(|f, c: &SellCandidate| write!(f, "{:+.1}%", c.percentage_change)).header("Change %").right().min_width(9),
            Column::new(|f, c: &SellCandidate| write!(f, "{:.1}", c.sell_score)).header("Score").right().min_width(7),
        ]).title("Sell Candidates").empty_row("No Candidates")
    }

    fn begin_history_table(title: &str) -> Stream<Observation, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, o: &Observation| write!(f, "{}", format_timestamp(o.observed_at()))).header("Observed").left().min_width(17),
            Column::new(|f, o: &Observation| write!(f, "{:.2}", o.price())).header("Price").right().min_width(8),
            Column::new(|f, o: &Observation| write!(f, "{}", o.currency())).header("Currency").center().min_width(8),
            Column::new(|f, o: &Observation| write!(f, "{}", o.listing_count())).header("Listings").right().min_width(8),
            Column::new(|f, o: &Observation| write!(f, "{}", o.wants_count())).header("Wants").right().min_width(6),
        ]).title(title).empty_row("No Observations")
    }

    fn begin_value_table() -> Stream<(Release, f64), Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, r: &(Release, f64)| write!(f, "{}", r.0.artist())).header("Artist").left().min_width(20),
            Column::new(|f, r: &(Release, f64)| write!(f, "{}", r.0.title())).header("Title").left().min_width(24),
            Column::new(|f, r: &(Release, f64)| write!(f, "{:.2}", r.1)).header("Price").right().min_width(8),
        ]).title("Most Valuable").empty_row("No Priced Releases")
    }

    fn begin_formats_table() -> Stream<FormatValue, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, v: &FormatValue| write!(f, "{}", v.format)).header("Format").left().min_width(12),
            Column::new(|f, v: &FormatValue| write!(f, "{}", v.release_count)).header("Releases").right().min_width(8),
            Column::new(|f, v: &FormatValue| write!(f, "{:.2}", v.total_value)).header("Total").right().min_width(10),
        ]).title("Value by Format").empty_row("No Formats")
    }

    fn begin_migrations_table() -> Stream<MigrationStatus, Stdout> {
        let out = io::stdout();
        Stream::new(out, vec![
            Column::new(|f, m: &MigrationStatus| write!(f, "{}", m.version)).header("Version").right().min_width(7),
            Column::new(|f, m: &MigrationStatus| write!(f, "{}", m.name)).header("Name").left().min_width(20),
            Column::new(|f, m: &MigrationStatus| match m.applied_at {
                Some(ts) => write!(f, "{}", format_timestamp(ts)),
                None => write!(f, "pending"),
            }).header("Applied").left().min_width(17),
        ]).title("Migrations").empty_row("No Migrations")
    }

    fn hr(width: usize) {
        println!("{1:-<0$}", width, "");
    }

    fn print_center(width: usize, value: &str) {
        let padding = width.saturating_sub(value.len());
        let lpad = padding / 2;
        let rpad = lpad + (padding % 2);
        println!("{0:1$}{3}{0:2$}", "", lpad, rpad, value);
    }
}

fn format_timestamp(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

fn opt_i64_or_dash(value: Option<i64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}
