//! Terminal walkthroughs of the query cache engine.
//!
//! Each scenario registers listeners that print every view change as a
//! timeline row, then drives the engine the way an interactive UI would.

mod items;
mod screenings;
mod timeline;

pub use timeline::Timeline;

use crate::config::{DemoScenario, Settings};
use crate::infra::error::AppError;

pub async fn run(settings: &Settings, scenario: DemoScenario) -> Result<(), AppError> {
    match scenario {
        DemoScenario::Items => items::run(&settings.demo).await,
        DemoScenario::Screenings => screenings::run(&settings.demo).await,
    }
}
