//! Vendor trains.

pub mod db;
pub mod icomera;
pub mod obb;
pub mod unwired;

use crate::vehicle::Vehicle;
use crate::{Error, Result};
use chrono::{DateTime, Utc};

pub use db::IcePortal;
pub use icomera::IcomeraTrain;
pub use obb::RailnetRegio;
pub use unwired::UnwiredTrain;

/// What trains know about themselves beyond a vehicle id.
pub trait Train: Vehicle {
    /// Category such as `ICE` or `RJX`
    fn train_type(&self) -> Result<String> {
        Err(Error::FeatureMissing("train type".to_string()))
    }

    fn line_number(&self) -> Result<String> {
        Err(Error::FeatureMissing("line number".to_string()))
    }
}

/// Split a line designation like `RJX162` into `("RJX", "162")`.
pub(crate) fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let split = line.find(|c: char| c.is_ascii_digit())?;
    let (category, number) = line.split_at(split);
    let category = category.trim();
    if category.is_empty() {
        return None;
    }
    Some((category, number))
}

pub(crate) fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}
