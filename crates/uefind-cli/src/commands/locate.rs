//! Locate command implementation.

use anyhow::{Result, bail};
use serde_json::json;
use uefind_core::{ImageFile, TargetClass};

use super::paint_address;
use crate::session::{Session, forward};

/// Run the locate command
pub fn run(session: &Session<ImageFile>, class: &str, json: bool) -> Result<()> {
    let class = TargetClass::from_name(class)?;
    let name: &'static str = class.into();
    let result = session.request(|finder, tx| finder.submit_locate(name, forward(tx)))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "class": class,
                "address": result.payload,
                "message": result.message(),
            }))?
        );
    } else {
        println!("{}: {}", class, paint_address(result.payload));
    }

    if !result.is_success {
        bail!("{}", result.error_message);
    }
    Ok(())
}
