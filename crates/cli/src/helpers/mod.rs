// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use cbx_evm::ContributionRecord;
use cbx_lifecycle::{funding_progress, parse_address, StatusNotifier, StatusPhase};

pub mod telemetry;

/// Clap parser for addresses in any hex case
pub fn parse_identity(s: &str) -> Result<Address> {
    parse_address(s).ok_or_else(|| anyhow!("'{s}' is not a valid address"))
}

/// Print every status message that is still live
pub fn print_status(notifier: &StatusNotifier) {
    for notification in notifier.live() {
        let marker = match notification.phase {
            StatusPhase::Pending => "…",
            StatusPhase::Success => "✓",
            StatusPhase::Error => "✗",
        };
        println!("{marker} {}", notification.message);
    }
}

/// One line per record. Amounts stay hidden until disclosed.
pub fn format_record(record: &ContributionRecord) -> String {
    let amount = match (record.decrypted_amount(), funding_progress(record)) {
        (Some(amount), Some(progress)) => format!("{amount} ({progress:.1}% of target)"),
        _ => "encrypted".to_string(),
    };
    format!(
        "{:<36} {:<28} target {:<8} {} by {}",
        record.id, record.name, record.target_amount, amount, record.creator
    )
}
