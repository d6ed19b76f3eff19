//! Semver command handlers.

use std::cmp::Ordering;

use anyhow::Result;
use serde_json::json;

use zeptogate::versions::{compare_versions, satisfies_range, UpdateType, Version};

use super::common::print_json;
use super::SemverAction;

pub(crate) fn cmd_semver(action: SemverAction, json: bool) -> Result<()> {
    match action {
        SemverAction::Compare { a, b } => {
            let ordering = compare_versions(&a, &b)?;
            let update = UpdateType::classify(&Version::parse(&a)?, &Version::parse(&b)?);
            if json {
                print_json(&json!({
                    "a": a,
                    "b": b,
                    "ordering": ordering_value(ordering),
                    "update_type": update,
                }))?;
            } else {
                println!("{}", ordering_value(ordering));
                if let Some(update) = update {
                    println!("{} -> {} is a {} update", a, b, update);
                }
            }
        }
        SemverAction::Satisfies { version, range } => {
            let matches = satisfies_range(&version, &range)?;
            if json {
                print_json(&json!({
                    "version": version,
                    "range": range,
                    "satisfies": matches,
                }))?;
            } else {
                println!("{}", matches);
            }
            if !matches {
                anyhow::bail!("{} does not satisfy '{}'", version, range);
            }
        }
    }
    Ok(())
}

fn ordering_value(ordering: Ordering) -> i8 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
