use std::sync::Arc;

use clap::Subcommand;
use flipfocus_core::storage::Database;
use flipfocus_core::StatsAggregator;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's focused seconds
    Today,
    /// The last seven days, oldest first
    Week,
    /// Delete every stored daily total
    Reset,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    let stats = StatsAggregator::new(db);

    match action {
        StatsAction::Today => {
            let total = stats.today_total()?;
            println!("{}", serde_json::json!({ "total_secs": total }));
        }
        StatsAction::Week => {
            let rows: Vec<_> = stats
                .week_window()?
                .into_iter()
                .map(|(day, total)| {
                    serde_json::json!({
                        "date": day.date().map(|d| d.format("%Y-%m-%d").to_string()),
                        "key": day.storage_key(),
                        "total_secs": total,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        StatsAction::Reset => {
            let days = stats.reset_all()?;
            println!("{}", serde_json::json!({ "days_cleared": days }));
        }
    }
    Ok(())
}
