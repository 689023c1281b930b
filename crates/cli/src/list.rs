// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::{format_record, print_status};
use anyhow::{bail, Result};

pub async fn execute(ctx: &AppContext, mine: bool) -> Result<()> {
    let loaded = ctx.lifecycle.refresh(&ctx.session).await;
    print_status(ctx.session.notifier());
    let report = loaded?;

    let records = if mine {
        if !ctx.session.is_connected() {
            bail!("--mine needs an identity. Set PRIVATE_KEY or pass --address.");
        }
        ctx.session.own_history()
    } else {
        report.records.to_vec()
    };

    for record in &records {
        println!("{}", format_record(record));
    }
    for skipped in &report.skipped {
        eprintln!("skipped {}: {}", skipped.id, skipped.reason);
    }
    Ok(())
}
