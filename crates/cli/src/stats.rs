// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::print_status;
use anyhow::Result;

pub async fn execute(ctx: &AppContext) -> Result<()> {
    let loaded = ctx.lifecycle.refresh(&ctx.session).await;
    print_status(ctx.session.notifier());
    loaded?;

    let stats = ctx.session.registry().stats();
    println!("records:         {}", stats.total_records);
    println!("verified:        {}", stats.verified_records);
    println!("total disclosed: {}", stats.total_disclosed);
    println!("average:         {:.2}", stats.average_disclosed);
    Ok(())
}
