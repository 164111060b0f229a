//! Bot scheduling: the per-account polling loop and the runner that owns one
//! task per bot.

mod bot;
mod runner;

pub use bot::{Bot, BotSettings, CycleReport, ItemOutcome};
pub use runner::{BotRunner, ShutdownHandle};
